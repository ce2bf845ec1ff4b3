//! Daily wall-clock scheduler behind `/scheduler/start`, `/scheduler/stop`,
//! `/scheduler/status` (§6): once started, fires `runUntilEmpty` once per
//! day at `config.scheduler_local_hour` (converted to UTC via
//! `scheduler_timezone_offset_hours`), then waits for the next occurrence.
//!
//! Grounded on the Pool Scheduler's own `running`/`draining` atomic-flag
//! idiom (`ace_pool::scheduler::PoolScheduler`) rather than a cron crate,
//! since the only requirement is one fire per calendar day.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use ace_core::config::AceConfig;
use ace_pool::PoolScheduler;

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub local_hour: u32,
    pub timezone_offset_hours: i32,
}

pub struct DailyScheduler {
    scheduler: Arc<PoolScheduler>,
    config: Arc<AceConfig>,
    running: AtomicBool,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl DailyScheduler {
    pub fn new(scheduler: Arc<PoolScheduler>, config: Arc<AceConfig>) -> Arc<Self> {
        Arc::new(DailyScheduler {
            scheduler,
            config,
            running: AtomicBool::new(false),
            handle: Mutex::new(None),
        })
    }

    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            running: self.running.load(Ordering::SeqCst),
            local_hour: self.config.scheduler_local_hour,
            timezone_offset_hours: self.config.scheduler_timezone_offset_hours,
        }
    }

    pub async fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.run_loop().await });
        *self.handle.lock().await = Some(handle);
        info!("daily scheduler started");
    }

    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().await.take() {
            handle.abort();
        }
        info!("daily scheduler stopped");
    }

    async fn run_loop(&self) {
        loop {
            if !self.running.load(Ordering::SeqCst) {
                return;
            }

            let sleep_duration = time_until_next_fire(
                Utc::now(),
                self.config.scheduler_local_hour,
                self.config.scheduler_timezone_offset_hours,
            );
            tokio::time::sleep(sleep_duration).await;

            if !self.running.load(Ordering::SeqCst) {
                return;
            }

            info!("daily scheduler firing runUntilEmpty");
            if let Err(e) = self
                .scheduler
                .run_until_empty(std::time::Duration::from_secs(self.config.poll_interval_seconds))
                .await
            {
                warn!(error = %e, "daily scheduler run failed");
            }
        }
    }
}

/// Seconds until the next `local_hour` (shifted by `offset_hours` east of
/// UTC) occurs, at least one second away so a fire at exactly the target
/// second doesn't spin.
fn time_until_next_fire(
    now: chrono::DateTime<Utc>,
    local_hour: u32,
    offset_hours: i32,
) -> std::time::Duration {
    let target_utc_hour = (local_hour as i64 - offset_hours as i64).rem_euclid(24) as u32;

    let today_target = now
        .date_naive()
        .and_hms_opt(target_utc_hour.min(23), 0, 0)
        .unwrap()
        .and_utc();

    let next = if today_target > now {
        today_target
    } else {
        today_target + chrono::Duration::days(1)
    };

    (next - now).to_std().unwrap_or(std::time::Duration::from_secs(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn fires_later_today_when_target_hour_not_yet_reached() {
        let now = Utc.with_ymd_and_hms(2026, 7, 29, 3, 0, 0).unwrap();
        let delay = time_until_next_fire(now, 9, 0);
        assert_eq!(delay.as_secs(), 6 * 3600);
    }

    #[test]
    fn rolls_to_tomorrow_when_target_hour_already_passed() {
        let now = Utc.with_ymd_and_hms(2026, 7, 29, 15, 0, 0).unwrap();
        let delay = time_until_next_fire(now, 9, 0);
        assert_eq!(delay.as_secs(), 18 * 3600);
    }

    #[test]
    fn timezone_offset_shifts_the_target_utc_hour() {
        // local_hour 9 at offset +5 means UTC hour 4.
        let now = Utc.with_ymd_and_hms(2026, 7, 29, 1, 0, 0).unwrap();
        let delay = time_until_next_fire(now, 9, 5);
        assert_eq!(delay.as_secs(), 3 * 3600);
    }
}
