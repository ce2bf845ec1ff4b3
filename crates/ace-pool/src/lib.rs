//! Work-queue construction, bounded concurrent scheduling, the per-item
//! workflow state machine, and the stale-resource reclaimer.
//!
//! Grounded on `gator-core::orchestrator`/`gator-core::lifecycle` for the
//! Rust concurrency idiom and on `original_source/src/ace/runners/agent_pool.py`
//! for the exact classification/scheduling/reclaim API surface.

pub mod board_source;
pub mod queue;
pub mod reclaimer;
pub mod scheduler;
pub mod workflow;

pub use board_source::{BoardSource, IssueDetail, RemoteBoardSource};
pub use queue::{QueueAdvisor, QueueOutcome, QueueSettings, QueueStats, WorkQueueBuilder};
pub use reclaimer::{ReclaimOutcome, ResourceReclaimer};
pub use scheduler::{PoolScheduler, ProcessOutcome, ProcessStatus};
pub use workflow::{run_item_workflow, BoardContext, WorkflowDeps};
