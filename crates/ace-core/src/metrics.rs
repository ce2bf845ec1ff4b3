//! Rate/Metrics/Logging: counters, gauges, and summaries exposed over a
//! Prometheus text endpoint (§2, §6).
//!
//! Uses the `metrics` facade + `metrics-exporter-prometheus`, grounded in
//! the wider example pack's Prometheus-exposition idiom (the teacher has no
//! metrics crate at all, since it exposes status via its TUI and `gator
//! status` rather than a `/metrics` endpoint).
//!
//! All metrics named in §6 are pre-declared at process start so `/metrics`
//! always lists them, even before first use.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub const AGENT_RUNS_TOTAL: &str = "ace_agent_runs_total";
pub const TASK_COMPLETED_TOTAL: &str = "ace_task_completed_total";
pub const TASK_NUDGES_TOTAL: &str = "ace_task_nudges_total";
pub const TASK_RESTARTS_TOTAL: &str = "ace_task_restarts_total";
pub const TASK_WAIT_TIMEOUT_TOTAL: &str = "ace_task_wait_timeout_total";
pub const TASK_NUDGE_EXCEEDED_TOTAL: &str = "ace_task_nudge_exceeded_total";
pub const TASK_VALIDATION_FAILED_TOTAL: &str = "ace_task_validation_failed_total";

pub const ACTIVE_AGENTS: &str = "ace_active_agents";

pub const AGENT_DURATION_SECONDS: &str = "ace_agent_duration_seconds";
pub const TASK_DURATION_SECONDS: &str = "ace_task_duration_seconds";

/// Install the global Prometheus recorder and pre-declare every metric
/// named in §6, returning a handle whose `render()` produces the text
/// exposition served at `/metrics`.
pub fn install() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install prometheus recorder");

    describe_all();
    handle
}

fn describe_all() {
    metrics::describe_counter!(
        AGENT_RUNS_TOTAL,
        "Total agent runs, labeled by status and backend"
    );
    metrics::describe_counter!(TASK_COMPLETED_TOTAL, "Total tasks completed successfully");
    metrics::describe_counter!(TASK_NUDGES_TOTAL, "Total nudge messages sent to sessions");
    metrics::describe_counter!(TASK_RESTARTS_TOTAL, "Total session restarts after nudge exhaustion");
    metrics::describe_counter!(TASK_WAIT_TIMEOUT_TOTAL, "Total done-marker waits that timed out");
    metrics::describe_counter!(
        TASK_NUDGE_EXCEEDED_TOTAL,
        "Total tasks that exhausted nudges and restarts"
    );
    metrics::describe_counter!(
        TASK_VALIDATION_FAILED_TOTAL,
        "Total done markers that were malformed or empty"
    );

    metrics::describe_gauge!(ACTIVE_AGENTS, "Number of agent slots currently running");

    metrics::describe_histogram!(AGENT_DURATION_SECONDS, "Agent run duration in seconds, labeled by backend");
    metrics::describe_histogram!(TASK_DURATION_SECONDS, "Task duration in seconds from claim to completion");

    // Zero out the counters so they appear in exposition before first use.
    metrics::counter!(TASK_COMPLETED_TOTAL).absolute(0);
    metrics::counter!(TASK_NUDGES_TOTAL).absolute(0);
    metrics::counter!(TASK_RESTARTS_TOTAL).absolute(0);
    metrics::counter!(TASK_WAIT_TIMEOUT_TOTAL).absolute(0);
    metrics::counter!(TASK_NUDGE_EXCEEDED_TOTAL).absolute(0);
    metrics::counter!(TASK_VALIDATION_FAILED_TOTAL).absolute(0);
    metrics::gauge!(ACTIVE_AGENTS).set(0.0);
}

/// Record one completed agent run.
pub fn record_agent_run(status: &str, backend: &str, duration_seconds: f64) {
    metrics::counter!(AGENT_RUNS_TOTAL, "status" => status.to_string(), "backend" => backend.to_string())
        .increment(1);
    metrics::histogram!(AGENT_DURATION_SECONDS, "backend" => backend.to_string())
        .record(duration_seconds);
}

/// Set the `ace_active_agents` gauge to the pool's current running-slot
/// count, called by the Pool Scheduler on every slot reservation/release.
pub fn set_active_agents(count: usize) {
    metrics::gauge!(ACTIVE_AGENTS).set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_does_not_panic_and_renders_declared_metrics() {
        // metrics-exporter-prometheus's global recorder can only be
        // installed once per process; guard with a static so repeated
        // test runs in the same binary don't panic on double-install.
        use std::sync::OnceLock;
        static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
        let handle = HANDLE.get_or_init(install);
        let rendered = handle.render();
        assert!(rendered.contains("ace_active_agents"));
        assert!(rendered.contains("ace_task_completed_total"));
    }
}
