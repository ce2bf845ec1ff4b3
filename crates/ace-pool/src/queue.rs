//! Work-Queue Builder (§4.7): classifies board state into an ordered list of
//! `(WorkItem, WorkKey)` for the Pool Scheduler to spawn against.
//!
//! Grounded on `original_source/src/ace/runners/agent_pool.py`'s
//! `fetch_ready_issues` / `fetch_in_progress_issues` / `_matches_target` /
//! `_has_blockers_not_done`, generalized to cover the PR-comment-follow-up
//! category those two methods split out into a separate code path. The
//! `ManagerAgent` advisory hook is mirrored here as `QueueAdvisor`, the same
//! object-safe-trait-plus-fake-double idiom as [`crate::board_source::BoardSource`].

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};

use ace_core::model::{ItemState, Target, WorkItem, WorkItemKind, WorkKey};

use crate::board_source::BoardSource;

/// Advisory re-ordering hook (§4.7 "Optional re-ordering"). Mirrors Python's
/// `ManagerAgent.select_ready_issues`/`select_resume_issues`, collapsed into
/// one seam since both do the same thing: hand back a preferred ordering.
///
/// The advisor is purely advisory: any `WorkKey` it returns that doesn't
/// appear in the classified list is dropped with a warning rather than
/// inserted, per §4.7's "must never fabricate a WorkKey".
#[async_trait]
pub trait QueueAdvisor: Send + Sync {
    async fn reorder(&self, items: &[WorkItem]) -> Vec<WorkKey>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn QueueAdvisor) {}
};

/// Per-pool routing and label configuration the builder needs. Kept distinct
/// from [`ace_core::config::AceConfig`] so tests can construct one directly
/// without a full config resolution.
#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub org: String,
    pub project_name: String,
    pub target: Target,
    pub local_label: String,
    pub remote_label: String,
    pub agent_label: String,
    pub ready_status: String,
    pub resume_in_progress: bool,
    /// Preferred newly-ready source (§4.7 point 3): when enabled and
    /// `target` is `Remote`/`Any`, query the auxiliary protocol server's
    /// `list_ready_remote_items` tool before falling back to the direct
    /// `listItemsByStatus` board query.
    pub mcp_enabled: bool,
    pub mcp_url: Option<String>,
}

/// Counts accompanying a built queue, surfaced by `processWorkQueue`'s
/// status payload (§4.8).
#[derive(Debug, Clone, Default)]
pub struct QueueStats {
    pub pr_comments_seen: usize,
    pub in_progress_seen: usize,
    pub ready_seen: usize,
    pub blocked_skipped: usize,
}

#[derive(Debug, Clone, Default)]
pub struct QueueOutcome {
    pub items: Vec<(WorkItem, WorkKey)>,
    pub stats: QueueStats,
}

pub struct WorkQueueBuilder {
    board: Arc<dyn BoardSource>,
    settings: QueueSettings,
    advisor: Option<Arc<dyn QueueAdvisor>>,
}

impl WorkQueueBuilder {
    pub fn new(board: Arc<dyn BoardSource>, settings: QueueSettings) -> Self {
        WorkQueueBuilder {
            board,
            settings,
            advisor: None,
        }
    }

    pub fn with_advisor(mut self, advisor: Arc<dyn QueueAdvisor>) -> Self {
        self.advisor = Some(advisor);
        self
    }

    fn matches_target(&self, labels: &[String]) -> bool {
        match self.settings.target {
            Target::Any => true,
            Target::Local => labels.iter().any(|l| l == &self.settings.local_label),
            Target::Remote => labels.iter().any(|l| l == &self.settings.remote_label),
        }
    }

    async fn is_blocked(&self, repo_owner: &str, repo_name: &str, number: u64) -> bool {
        let blockers = self.board.get_issue_blockers(repo_owner, repo_name, number).await;
        let unresolved: Vec<_> = blockers.iter().filter(|e| !e.is_resolved()).collect();
        if !unresolved.is_empty() {
            debug!(
                repo_owner,
                repo_name,
                number,
                blockers = unresolved.len(),
                "item_skipped_blockers_not_done"
            );
        }
        !unresolved.is_empty()
    }

    /// Build the queue for one pass. Never fails outright: a lookup failure
    /// against any single source is logged and that source contributes
    /// nothing, mirroring `fetch_ready_issues`'/`fetch_in_progress_issues`'s
    /// try/except-and-return-empty shape.
    pub async fn build(&self, processed: &HashSet<WorkKey>) -> QueueOutcome {
        let project_id = match self
            .board
            .find_project_id(&self.settings.org, &self.settings.project_name)
            .await
        {
            Ok(Some(id)) => id,
            Ok(None) => {
                warn!(
                    org = %self.settings.org,
                    project = %self.settings.project_name,
                    "project not found, yielding empty queue"
                );
                return QueueOutcome::default();
            }
            Err(e) => {
                warn!(error = %e, "find_project_id failed, yielding empty queue");
                return QueueOutcome::default();
            }
        };

        let ready_raw = self.fetch_ready_items(&project_id).await;
        let in_progress_raw = self.fetch_status(&project_id, "In Progress").await;

        // Repos to scan for PR-comment follow-ups: the union of repos
        // already surfaced by the board's Ready/In Progress lanes. The board
        // itself has no "list all repos" primitive; scoping the scan to
        // repos the project already mentions avoids scanning repos outside
        // this project's purview.
        let mut repos: Vec<(String, String)> = Vec::new();
        for item in ready_raw.iter().chain(in_progress_raw.iter()) {
            let key = (item.repo_owner.clone(), item.repo_name.clone());
            if !repos.contains(&key) {
                repos.push(key);
            }
        }

        let mut stats = QueueStats::default();
        let mut seen: HashSet<(String, String, u64)> = HashSet::new();
        let mut items: Vec<(WorkItem, WorkKey)> = Vec::new();

        // 1. PR-comment follow-ups.
        for (owner, repo) in &repos {
            let comments = match self.board.list_pr_review_comments(owner, repo).await {
                Ok(c) => c,
                Err(e) => {
                    warn!(owner, repo, error = %e, "list_pr_review_comments failed");
                    continue;
                }
            };
            for comment in comments {
                stats.pr_comments_seen += 1;
                if !self.matches_target(&comment.pr_labels) {
                    continue;
                }
                let ident = (owner.clone(), repo.clone(), comment.pr_number);
                if seen.contains(&ident) {
                    continue;
                }
                let work_key = WorkKey::for_comment(owner, repo, comment.pr_number, comment.comment_id);
                if processed.contains(&work_key) {
                    continue;
                }
                let item = WorkItem {
                    kind: WorkItemKind::PrComment,
                    repo_owner: owner.clone(),
                    repo_name: repo.clone(),
                    number: comment.pr_number,
                    title: comment.pr_title.clone(),
                    body: String::new(),
                    labels: comment.pr_labels.clone(),
                    assignee: None,
                    state: ItemState::Open,
                    html_url: comment.pr_html_url.clone(),
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                    extras: Some(comment.extras.clone()),
                };
                seen.insert(ident);
                items.push((item, work_key));
            }
        }

        // 2. In-progress resumes.
        if self.settings.resume_in_progress {
            for board_item in &in_progress_raw {
                stats.in_progress_seen += 1;
                let ident = (board_item.repo_owner.clone(), board_item.repo_name.clone(), board_item.number);
                if seen.contains(&ident) {
                    continue;
                }
                if !self.matches_target(&board_item.labels) {
                    continue;
                }
                let work_key = WorkKey::for_issue(&board_item.repo_owner, &board_item.repo_name, board_item.number);
                if processed.contains(&work_key) {
                    continue;
                }
                if self
                    .is_blocked(&board_item.repo_owner, &board_item.repo_name, board_item.number)
                    .await
                {
                    stats.blocked_skipped += 1;
                    continue;
                }
                let detail = match self
                    .board
                    .fetch_issue_detail(&board_item.repo_owner, &board_item.repo_name, board_item.number)
                    .await
                {
                    Ok(d) => d,
                    Err(e) => {
                        warn!(number = board_item.number, error = %e, "fetch_issue_detail failed");
                        continue;
                    }
                };
                if detail.assignee.is_some() {
                    debug!(number = board_item.number, assignee = ?detail.assignee, "item_skipped_assigned");
                    continue;
                }
                let item = WorkItem {
                    kind: WorkItemKind::InProgress,
                    repo_owner: board_item.repo_owner.clone(),
                    repo_name: board_item.repo_name.clone(),
                    number: board_item.number,
                    title: detail.title,
                    body: detail.body,
                    labels: detail.labels,
                    assignee: detail.assignee,
                    state: detail.state,
                    html_url: detail.html_url,
                    created_at: detail.created_at,
                    updated_at: detail.updated_at,
                    extras: None,
                };
                seen.insert(ident);
                items.push((item, work_key));
            }
        }

        // 3. Newly ready.
        for board_item in &ready_raw {
            stats.ready_seen += 1;
            let ident = (board_item.repo_owner.clone(), board_item.repo_name.clone(), board_item.number);
            if seen.contains(&ident) {
                continue;
            }
            if !self.matches_target(&board_item.labels) {
                continue;
            }
            let work_key = WorkKey::for_issue(&board_item.repo_owner, &board_item.repo_name, board_item.number);
            if processed.contains(&work_key) {
                continue;
            }
            if self
                .is_blocked(&board_item.repo_owner, &board_item.repo_name, board_item.number)
                .await
            {
                stats.blocked_skipped += 1;
                continue;
            }
            let detail = match self
                .board
                .fetch_issue_detail(&board_item.repo_owner, &board_item.repo_name, board_item.number)
                .await
            {
                Ok(d) => d,
                Err(e) => {
                    warn!(number = board_item.number, error = %e, "fetch_issue_detail failed");
                    continue;
                }
            };
            let item = WorkItem {
                kind: WorkItemKind::Ready,
                repo_owner: board_item.repo_owner.clone(),
                repo_name: board_item.repo_name.clone(),
                number: board_item.number,
                title: detail.title,
                body: detail.body,
                labels: detail.labels,
                assignee: detail.assignee,
                state: detail.state,
                html_url: detail.html_url,
                created_at: detail.created_at,
                updated_at: detail.updated_at,
                extras: None,
            };
            seen.insert(ident);
            items.push((item, work_key));
        }

        if let Some(advisor) = &self.advisor {
            items = self.apply_advisor(advisor.as_ref(), items).await;
        }

        QueueOutcome { items, stats }
    }

    /// Newly-ready items (§4.7 point 3): prefer the auxiliary protocol
    /// server when enabled and `target` permits it; fall back to the direct
    /// board query when the server is disabled, not applicable to this
    /// pool's target, or returns nothing.
    async fn fetch_ready_items(&self, project_id: &str) -> Vec<ace_core::model::BoardItem> {
        let mcp_applicable = self.settings.mcp_enabled
            && matches!(self.settings.target, Target::Remote | Target::Any);
        if mcp_applicable {
            if let Some(mcp_url) = &self.settings.mcp_url {
                let mcp_items = self
                    .board
                    .list_ready_items_via_mcp(
                        mcp_url,
                        &self.settings.project_name,
                        &self.settings.ready_status,
                        &self.settings.remote_label,
                    )
                    .await;
                if !mcp_items.is_empty() {
                    debug!(count = mcp_items.len(), "fetched_ready_issues_via_mcp");
                    return mcp_items;
                }
            }
        }
        self.fetch_status(project_id, &self.settings.ready_status).await
    }

    async fn fetch_status(&self, project_id: &str, status_name: &str) -> Vec<ace_core::model::BoardItem> {
        match self.board.list_items_by_status(project_id, status_name).await {
            Ok(items) => items,
            Err(e) => {
                warn!(status_name, error = %e, "list_items_by_status failed");
                Vec::new()
            }
        }
    }

    async fn apply_advisor(
        &self,
        advisor: &dyn QueueAdvisor,
        items: Vec<(WorkItem, WorkKey)>,
    ) -> Vec<(WorkItem, WorkKey)> {
        let only_items: Vec<WorkItem> = items.iter().map(|(i, _)| i.clone()).collect();
        let preferred = advisor.reorder(&only_items).await;

        let mut by_key: std::collections::HashMap<WorkKey, (WorkItem, WorkKey)> = items
            .iter()
            .cloned()
            .map(|(item, key)| (key.clone(), (item, key)))
            .collect();
        let original_order: Vec<WorkKey> = items.into_iter().map(|(_, key)| key).collect();

        let mut mentioned: HashSet<WorkKey> = HashSet::new();
        let mut ordered = Vec::with_capacity(by_key.len());
        for key in preferred {
            match by_key.get(&key) {
                Some(entry) => {
                    ordered.push(entry.clone());
                    mentioned.insert(key);
                }
                None => warn!(work_key = %key, "advisor returned unknown WorkKey, ignoring"),
            }
        }

        for key in original_order {
            if mentioned.contains(&key) {
                continue;
            }
            if let Some(entry) = by_key.remove(&key) {
                ordered.push(entry);
            }
        }

        ordered
    }
}
