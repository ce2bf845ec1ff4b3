//! The data model shared by every component: work items, board projections,
//! agent slots, workspaces, and the filesystem sentinels exchanged with the
//! external coding CLI.
//!
//! Every type here is a concrete record with all fields present — no
//! `serde_json::Value` map poking once a value has been deserialized into
//! one of these.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The three sources the Work-Queue Builder classifies items from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemKind {
    Ready,
    InProgress,
    PrComment,
}

impl fmt::Display for WorkItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkItemKind::Ready => "ready",
            WorkItemKind::InProgress => "in_progress",
            WorkItemKind::PrComment => "pr_comment",
        };
        f.write_str(s)
    }
}

/// Open/closed state of the underlying issue or pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    Open,
    Closed,
}

/// PR-review-comment specifics. Only populated for `WorkItemKind::PrComment`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrCommentExtras {
    pub comment_id: u64,
    pub path: String,
    pub line: u32,
    pub side: String,
    pub body: String,
}

/// One unit of work: an issue, an in-progress issue being resumed, or a
/// single PR review comment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub kind: WorkItemKind,
    pub repo_owner: String,
    pub repo_name: String,
    pub number: u64,
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
    pub assignee: Option<String>,
    pub state: ItemState,
    pub html_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub extras: Option<PrCommentExtras>,
}

impl WorkItem {
    /// Derive this item's identity key for dedup/"already processed" tracking.
    pub fn work_key(&self) -> WorkKey {
        match (&self.kind, &self.extras) {
            (WorkItemKind::PrComment, Some(extras)) => WorkKey::for_comment(
                &self.repo_owner,
                &self.repo_name,
                self.number,
                extras.comment_id,
            ),
            _ => WorkKey::for_issue(&self.repo_owner, &self.repo_name, self.number),
        }
    }
}

/// Opaque dedup identity for a work item within a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkKey(pub String);

impl WorkKey {
    pub fn for_issue(repo_owner: &str, repo_name: &str, number: u64) -> Self {
        WorkKey(format!("issue:{repo_owner}/{repo_name}#{number}"))
    }

    pub fn for_comment(repo_owner: &str, repo_name: &str, pr_number: u64, comment_id: u64) -> Self {
        WorkKey(format!(
            "pr_comment:{repo_owner}/{repo_name}#{pr_number}:{comment_id}"
        ))
    }

    /// The issue/PR `number` this key refers to, parsed back out of the
    /// opaque string. Used by the Work-Queue Builder's "already represented
    /// by an earlier category" dedup rule.
    pub fn number(&self) -> Option<u64> {
        let after_hash = self.0.split('#').nth(1)?;
        let digits: String = after_hash.chars().take_while(|c| c.is_ascii_digit()).collect();
        digits.parse().ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Content type of a project-board item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Issue,
    Pr,
}

/// A projection of one item on the source-control project board.
///
/// Per §4.2's invariant: `body` is intentionally absent here — the server
/// projection used by `listItemsByStatus` does not populate it, and callers
/// must hydrate separately rather than assume it is present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardItem {
    pub item_id: String,
    pub content_id: String,
    pub content_type: ContentType,
    pub title: String,
    pub number: u64,
    pub repo_owner: String,
    pub repo_name: String,
    pub status: Option<String>,
    pub labels: Vec<String>,
    pub html_url: String,
}

/// A cross-item blocking relationship: `from` is blocked on `to`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockerEdge {
    pub from: BoardItem,
    pub to: BoardItem,
}

impl BlockerEdge {
    /// Status name required for the blocker to be considered resolved.
    pub const DONE_STATUS: &'static str = "Done";

    pub fn is_resolved(&self) -> bool {
        self.to.status.as_deref() == Some(Self::DONE_STATUS)
    }
}

/// State of one slot in the agent pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotState {
    Idle,
    Running,
    Completed,
    Failed,
}

/// One of `maxAgents` concurrent execution units in the pool.
///
/// Invariant: at most one slot per `WorkKey`; `idle -> running` transitions
/// only happen while holding the slot table's single-writer lock (§5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSlot {
    pub id: usize,
    pub state: SlotState,
    pub work_key: Option<WorkKey>,
    pub item: Option<WorkItem>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl AgentSlot {
    pub fn idle(id: usize) -> Self {
        AgentSlot {
            id,
            state: SlotState::Idle,
            work_key: None,
            item: None,
            started_at: None,
            completed_at: None,
            error: None,
        }
    }

    pub fn reset_to_idle(&mut self) {
        self.state = SlotState::Idle;
        self.work_key = None;
        self.item = None;
        self.started_at = None;
        self.completed_at = None;
        self.error = None;
    }
}

/// Information about a materialized per-item workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceInfo {
    pub path: std::path::PathBuf,
    pub branch: String,
    pub repo_owner: String,
    pub repo_name: String,
    pub number: u64,
}

/// `ACE_TASK_DONE.json`: the sole authoritative success signal from the
/// external CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoneMarker {
    pub task_id: String,
    pub summary: String,
    #[serde(default)]
    pub files_changed: Vec<String>,
    #[serde(default)]
    pub commands_run: Vec<String>,
}

pub const TASK_FILE_NAME: &str = "ACE_TASK.md";
pub const DONE_FILE_NAME: &str = "ACE_TASK_DONE.json";

/// Status of an agent run as recorded by the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Success,
    Failed,
}

/// Metadata accompanying an `AgentResult`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentResultMetadata {
    pub session_name: String,
    pub worktree: String,
    pub prompt_file: String,
    pub backend: String,
    pub model: String,
    pub created: bool,
}

/// The outcome of running one item's workflow to completion (or failure).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    pub status: AgentStatus,
    pub output: String,
    pub files_changed: Vec<String>,
    pub commands_run: Vec<String>,
    pub metadata: AgentResultMetadata,
    pub error: Option<String>,
}

impl AgentResult {
    pub fn failed(error: impl Into<String>, metadata: AgentResultMetadata) -> Self {
        AgentResult {
            status: AgentStatus::Failed,
            output: String::new(),
            files_changed: Vec::new(),
            commands_run: Vec::new(),
            metadata,
            error: Some(error.into()),
        }
    }
}

/// Snapshot of the pool's current occupancy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStatus {
    pub total_slots: usize,
    pub active_agents: usize,
    pub idle_slots: usize,
    pub completed_count: u64,
    pub failed_count: u64,
    pub active_work_keys: Vec<WorkKey>,
}

/// Label-based routing partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    Local,
    Remote,
    Any,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Target::Local => "local",
            Target::Remote => "remote",
            Target::Any => "any",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Target::Local),
            "remote" => Ok(Target::Remote),
            "any" => Ok(Target::Any),
            other => Err(format!("unknown target: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_key_for_issue_matches_shape() {
        let key = WorkKey::for_issue("acme", "widgets", 42);
        assert_eq!(key.as_str(), "issue:acme/widgets#42");
        assert_eq!(key.number(), Some(42));
    }

    #[test]
    fn work_key_for_comment_matches_shape() {
        let key = WorkKey::for_comment("acme", "widgets", 7, 99);
        assert_eq!(key.as_str(), "pr_comment:acme/widgets#7:99");
        assert_eq!(key.number(), Some(7));
    }

    #[test]
    fn blocker_edge_resolved_iff_done() {
        let mut to = board_item();
        to.status = Some("In Progress".to_string());
        let from = board_item();
        let edge = BlockerEdge {
            from: from.clone(),
            to: to.clone(),
        };
        assert!(!edge.is_resolved());

        let mut done = to;
        done.status = Some("Done".to_string());
        let edge = BlockerEdge { from, to: done };
        assert!(edge.is_resolved());
    }

    fn board_item() -> BoardItem {
        BoardItem {
            item_id: "PVTI_1".to_string(),
            content_id: "I_1".to_string(),
            content_type: ContentType::Issue,
            title: "Example".to_string(),
            number: 1,
            repo_owner: "acme".to_string(),
            repo_name: "widgets".to_string(),
            status: None,
            labels: vec![],
            html_url: "https://example.invalid/1".to_string(),
        }
    }

    #[test]
    fn target_parses_case_insensitively() {
        assert_eq!("REMOTE".parse::<Target>().unwrap(), Target::Remote);
        assert_eq!("Any".parse::<Target>().unwrap(), Target::Any);
        assert!("bogus".parse::<Target>().is_err());
    }
}
