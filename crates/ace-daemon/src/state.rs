use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use ace_core::config::AceConfig;
use ace_pool::PoolScheduler;

use crate::daily::DailyScheduler;

#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<PoolScheduler>,
    pub config: Arc<AceConfig>,
    pub metrics_handle: PrometheusHandle,
    pub daily: Arc<DailyScheduler>,
}
