//! Pool Scheduler (§4.8): bounded slot allocation, spawn decisions, drain
//! vs. continuous run modes, and fatal-error latching.
//!
//! Grounded on `gator-core::orchestrator::run_orchestrator`'s loop shape
//! (semaphore-style concurrency cap, `mpsc` completion channel, cancellation
//! drain with a bounded timeout) generalized from "spawn ready DAG tasks
//! against a Postgres-backed plan" to "spawn admissible `WorkItem`s against
//! an in-memory slot table" per `original_source/src/ace/runners/
//! agent_pool.py`'s `AgentPool` (`spawn_agent`/`process_work_queue`/
//! `run_continuous`/`run_until_empty`/`shutdown`). The slot table itself is
//! `ace_core::model::AgentSlot`, the single concrete record type Design Note
//! §9 calls for in place of the teacher's `Task`/`LifecycleResult` duck
//! typing.
//!
//! Every entry point takes `self: &Arc<Self>` rather than `&self`: spawned
//! workflow tasks call back into the scheduler (to finalize their slot and,
//! on a fatal error, latch the pool) after `process_work_queue` has already
//! returned, so they need an owned handle rather than a borrow tied to the
//! call stack that spawned them.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};
use uuid::Uuid;

use ace_core::error::AceError;
use ace_core::model::{AgentSlot, PoolStatus, SlotState, WorkItem, WorkKey};

use crate::queue::WorkQueueBuilder;
use crate::workflow::{run_item_workflow, BoardContext, WorkflowDeps};

/// Outcome of one `process_work_queue` pass (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Ok,
    /// `maxIssuesPerRun` was reached; the pass stopped admitting new items.
    MaxIssuesReached,
    /// A fatal error was already latched before this pass ran.
    FatalLatched,
}

#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub status: ProcessStatus,
    pub spawned: usize,
    pub skipped: usize,
    pub pool_status: PoolStatus,
}

/// Owns `[AgentSlot; maxAgents]` and drives the Work-Queue Builder against
/// it. One `PoolScheduler` exists per `target` partition (§4.7's admission
/// filter is itself target-scoped via the `WorkQueueBuilder`'s
/// `QueueSettings`). Always held behind an `Arc` by callers (see module
/// docs) — construct with [`PoolScheduler::new`] and wrap immediately.
pub struct PoolScheduler {
    slots: AsyncMutex<Vec<AgentSlot>>,
    processed: AsyncMutex<HashSet<WorkKey>>,
    queue_builder: WorkQueueBuilder,
    deps: WorkflowDeps,
    board_ctx: Option<BoardContext>,

    max_issues_per_run: AtomicUsize,
    session_processed: AtomicUsize,
    completed_count: AtomicU64,
    failed_count: AtomicU64,

    running: AtomicBool,
    draining: AtomicBool,
    fatal_error: StdMutex<Option<String>>,
}

impl PoolScheduler {
    pub fn new(
        max_agents: usize,
        queue_builder: WorkQueueBuilder,
        deps: WorkflowDeps,
        board_ctx: Option<BoardContext>,
    ) -> Arc<Self> {
        let slots = (0..max_agents).map(AgentSlot::idle).collect();
        Arc::new(PoolScheduler {
            slots: AsyncMutex::new(slots),
            processed: AsyncMutex::new(HashSet::new()),
            queue_builder,
            deps,
            board_ctx,
            max_issues_per_run: AtomicUsize::new(0),
            session_processed: AtomicUsize::new(0),
            completed_count: AtomicU64::new(0),
            failed_count: AtomicU64::new(0),
            running: AtomicBool::new(true),
            draining: AtomicBool::new(false),
            fatal_error: StdMutex::new(None),
        })
    }

    /// 0 means unlimited (§8's boundary behavior).
    pub fn set_max_issues_per_run(&self, n: usize) {
        self.max_issues_per_run.store(n, Ordering::SeqCst);
    }

    pub async fn pool_status(&self) -> PoolStatus {
        let slots = self.slots.lock().await;
        let active_agents = slots.iter().filter(|s| s.state == SlotState::Running).count();
        let idle_slots = slots.iter().filter(|s| s.state == SlotState::Idle).count();
        let active_work_keys = slots.iter().filter_map(|s| s.work_key.clone()).collect();
        PoolStatus {
            total_slots: slots.len(),
            active_agents,
            idle_slots,
            completed_count: self.completed_count.load(Ordering::Relaxed),
            failed_count: self.failed_count.load(Ordering::Relaxed),
            active_work_keys,
        }
    }

    pub fn fatal_error(&self) -> Option<String> {
        self.fatal_error.lock().unwrap().clone()
    }

    fn set_fatal(&self, message: String) {
        let mut slot = self.fatal_error.lock().unwrap();
        if slot.is_none() {
            warn!(message, "fatal error latched, stopping pool");
            *slot = Some(message);
        }
        drop(slot);
        self.stop();
    }

    /// Cooperative shutdown request (§4.8). Outer loops observe this at
    /// their next sleep boundary; in-flight workflows are not cancelled.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.draining.store(false, Ordering::SeqCst);
    }

    /// `stop()` plus a bounded wait (≤30s) for in-flight slots to drain.
    /// Does not forcibly cancel in-flight workflows.
    pub async fn shutdown(&self) {
        self.stop();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
        while tokio::time::Instant::now() < deadline {
            if self.all_slots_idle().await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }

    async fn all_slots_idle(&self) -> bool {
        self.slots.lock().await.iter().all(|s| s.state == SlotState::Idle)
    }

    /// Atomically find an idle slot and flip it to `running`, recording the
    /// `WorkKey` so no two passes can double-book it (§4.8, §5's
    /// single-writer discipline). `None` if no slot is free right now.
    async fn reserve_slot(&self, item: &WorkItem, work_key: &WorkKey) -> Option<usize> {
        let mut slots = self.slots.lock().await;
        let idx = slots.iter().position(|s| s.state == SlotState::Idle)?;
        let slot = &mut slots[idx];
        slot.state = SlotState::Running;
        slot.work_key = Some(work_key.clone());
        slot.item = Some(item.clone());
        slot.started_at = Some(chrono::Utc::now());
        slot.completed_at = None;
        slot.error = None;
        ace_core::metrics::set_active_agents(slots.iter().filter(|s| s.state == SlotState::Running).count());
        Some(idx)
    }

    async fn finalize_slot(&self, idx: usize, error: Option<&AceError>) {
        let mut slots = self.slots.lock().await;
        let slot = &mut slots[idx];
        slot.completed_at = Some(chrono::Utc::now());
        if let Some(e) = error {
            slot.state = SlotState::Failed;
            slot.error = Some(e.to_string());
            self.failed_count.fetch_add(1, Ordering::Relaxed);
        } else {
            slot.state = SlotState::Completed;
            self.completed_count.fetch_add(1, Ordering::Relaxed);
        }
        slot.reset_to_idle();
        ace_core::metrics::set_active_agents(slots.iter().filter(|s| s.state == SlotState::Running).count());
    }

    /// `spawnAgent`: reserve a slot, mark the `WorkKey` processed, and drive
    /// the Item Workflow to completion in a spawned task. Returns `true` if
    /// a slot was reserved. Reservation and the processed-set insert happen
    /// before the workflow task is ever spawned, so §8's "at most one slot
    /// per `WorkKey`" invariant holds even across overlapping calls.
    async fn try_spawn(self: &Arc<Self>, item: WorkItem, work_key: WorkKey) -> bool {
        let Some(idx) = self.reserve_slot(&item, &work_key).await else {
            return false;
        };
        self.processed.lock().await.insert(work_key.clone());

        let task_id = format!("task-{}", Uuid::new_v4());
        let deps = self.deps.clone();
        let board_ctx = self.board_ctx.clone();
        let scheduler = Arc::clone(self);

        tokio::spawn(async move {
            let (result, error) = run_item_workflow(&deps, item, board_ctx.as_ref(), &task_id).await;

            if let Some(e) = &error {
                if e.is_fatal() {
                    scheduler.set_fatal(e.fatal_message());
                }
            }

            info!(
                task_id,
                status = ?result.status,
                error = ?result.error,
                "item workflow finished"
            );

            scheduler.finalize_slot(idx, error.as_ref()).await;
        });

        true
    }

    /// `processWorkQueue` (§4.8): one pass over the Work-Queue Builder's
    /// output, spawning up to idle capacity and respecting
    /// `maxIssuesPerRun`'s `sessionProcessed` counter.
    pub async fn process_work_queue(self: &Arc<Self>) -> ProcessOutcome {
        if self.fatal_error().is_some() {
            return ProcessOutcome {
                status: ProcessStatus::FatalLatched,
                spawned: 0,
                skipped: 0,
                pool_status: self.pool_status().await,
            };
        }

        let processed_snapshot = self.processed.lock().await.clone();
        let outcome = self.queue_builder.build(&processed_snapshot).await;

        let mut spawned = 0usize;
        let mut skipped = 0usize;
        let mut status = ProcessStatus::Ok;

        for (item, work_key) in outcome.items {
            if self.fatal_error().is_some() {
                break;
            }

            let max = self.max_issues_per_run.load(Ordering::Relaxed);
            if max != 0 && self.session_processed.load(Ordering::Relaxed) >= max {
                status = ProcessStatus::MaxIssuesReached;
                skipped += 1;
                continue;
            }

            if self.try_spawn(item, work_key).await {
                spawned += 1;
                self.session_processed.fetch_add(1, Ordering::Relaxed);
            } else {
                skipped += 1;
            }
        }

        ProcessOutcome {
            status,
            spawned,
            skipped,
            pool_status: self.pool_status().await,
        }
    }

    /// `runContinuous` (§4.8): loop `processWorkQueue` until `stop()` is
    /// called or a fatal error latches. The caller is expected to also tick
    /// a [`crate::reclaimer::ResourceReclaimer`] alongside this loop (the
    /// pool and reclaimer share no state that requires them to run in the
    /// same task).
    pub async fn run_continuous(self: &Arc<Self>, poll_interval: Duration) -> Result<(), AceError> {
        self.running.store(true, Ordering::SeqCst);
        loop {
            if !self.running.load(Ordering::SeqCst) {
                return Ok(());
            }
            self.process_work_queue().await;
            if let Some(msg) = self.fatal_error() {
                return Err(AceError::Workflow(msg));
            }
            tokio::time::sleep(poll_interval).await;
            if !self.running.load(Ordering::SeqCst) {
                return Ok(());
            }
        }
    }

    /// `runUntilEmpty` (§4.8): drain mode. Loops until a pass spawns zero
    /// *and* all slots are idle *and* a re-query of the queue yields empty.
    pub async fn run_until_empty(self: &Arc<Self>, check_interval: Duration) -> Result<(), AceError> {
        self.draining.store(true, Ordering::SeqCst);
        loop {
            if !self.draining.load(Ordering::SeqCst) {
                return Ok(());
            }

            let pass = self.process_work_queue().await;
            if let Some(msg) = self.fatal_error() {
                return Err(AceError::Workflow(msg));
            }

            if pass.spawned == 0 && self.all_slots_idle().await {
                let processed_snapshot = self.processed.lock().await.clone();
                let requery = self.queue_builder.build(&processed_snapshot).await;
                if requery.items.is_empty() {
                    self.draining.store(false, Ordering::SeqCst);
                    return Ok(());
                }
            }

            tokio::time::sleep(check_interval).await;
        }
    }

    /// Whether any agent is currently running, for the `/agents/run`
    /// endpoint's `already_running` short-circuit (§6).
    pub async fn has_active_agents(&self) -> bool {
        !self.all_slots_idle().await
    }

    /// `(repoName, number)` pairs currently held by a running slot, the
    /// Resource Reclaimer's "skip if held by a running slot" guard (§4.10).
    pub async fn active_repo_numbers(&self) -> HashSet<(String, u64)> {
        self.slots
            .lock()
            .await
            .iter()
            .filter_map(|s| s.item.as_ref())
            .map(|item| (item.repo_name.clone(), item.number))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ace_core::config::AceConfig;
    use ace_core::credentials::EnvCredentialStore;
    use ace_core::model::Target;
    use ace_session::SessionSupervisor;
    use ace_workspace::WorkspaceManager;

    use super::*;
    use crate::board_source::fake::FakeBoardSource;
    use crate::queue::QueueSettings;

    fn settings() -> QueueSettings {
        QueueSettings {
            org: "acme".to_string(),
            project_name: "Board".to_string(),
            target: Target::Any,
            local_label: "agent:local".to_string(),
            remote_label: "agent:remote".to_string(),
            agent_label: "agent".to_string(),
            ready_status: "Ready".to_string(),
            resume_in_progress: true,
            mcp_enabled: false,
            mcp_url: None,
        }
    }

    fn deps() -> WorkflowDeps {
        WorkflowDeps {
            board: Arc::new(FakeBoardSource::default()),
            workspace: Arc::new(WorkspaceManager::new(std::env::temp_dir())),
            sessions: Arc::new(SessionSupervisor::new()),
            credentials: Arc::new(EnvCredentialStore),
            config: Arc::new(AceConfig::default()),
        }
    }

    #[tokio::test]
    async fn empty_queue_spawns_nothing() {
        let fake = Arc::new(FakeBoardSource::default());
        *fake.project_id.lock().unwrap() = Some("PVT_1".to_string());
        let builder = WorkQueueBuilder::new(fake, settings());
        let scheduler = PoolScheduler::new(5, builder, deps(), None);

        let outcome = scheduler.process_work_queue().await;
        assert_eq!(outcome.spawned, 0);
        assert_eq!(outcome.pool_status.total_slots, 5);
        assert_eq!(outcome.pool_status.idle_slots, 5);
    }

    #[tokio::test]
    async fn max_issues_per_run_zero_means_unlimited() {
        let fake = Arc::new(FakeBoardSource::default());
        *fake.project_id.lock().unwrap() = Some("PVT_1".to_string());
        let builder = WorkQueueBuilder::new(fake, settings());
        let scheduler = PoolScheduler::new(5, builder, deps(), None);
        scheduler.set_max_issues_per_run(0);

        // No items queued, but confirms the zero-means-unlimited branch
        // never trips `MaxIssuesReached` on an empty pass.
        let outcome = scheduler.process_work_queue().await;
        assert_eq!(outcome.status, ProcessStatus::Ok);
    }

    #[tokio::test]
    async fn stop_halts_run_continuous_promptly() {
        let fake = Arc::new(FakeBoardSource::default());
        *fake.project_id.lock().unwrap() = Some("PVT_1".to_string());
        let builder = WorkQueueBuilder::new(fake, settings());
        let scheduler = PoolScheduler::new(5, builder, deps(), None);

        let handle = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.run_continuous(Duration::from_secs(60)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        scheduler.stop();
        let result = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("run_continuous did not stop promptly")
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn shutdown_returns_once_all_slots_idle() {
        let fake = Arc::new(FakeBoardSource::default());
        *fake.project_id.lock().unwrap() = Some("PVT_1".to_string());
        let builder = WorkQueueBuilder::new(fake, settings());
        let scheduler = PoolScheduler::new(3, builder, deps(), None);

        tokio::time::timeout(Duration::from_secs(1), scheduler.shutdown())
            .await
            .expect("shutdown hung with no in-flight work");
        assert!(scheduler.all_slots_idle().await);
    }
}
