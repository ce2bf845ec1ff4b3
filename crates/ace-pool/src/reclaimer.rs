//! Resource Reclaimer (§4.10): periodic stale-workspace and stale-session
//! sweep.
//!
//! Grounded on `original_source/src/ace/runners/cleanup.py`'s `Cleaner`
//! (enumerate-worktrees-by-mtime / enumerate-tmux-by-last-activity sweep
//! shape) and on `ace-workspace::manager`/`ace-session::supervisor`'s
//! already-idempotent `cleanup_worktree`/`kill_session` primitives, which
//! this module calls rather than duplicating. All reclamation is
//! best-effort: a failure on one worktree or session is logged and the
//! sweep continues (§4.10's closing line).

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use ace_core::config::AceConfig;
use ace_core::model::{DONE_FILE_NAME, TASK_FILE_NAME};
use ace_core::text::session_name;
use ace_session::SessionSupervisor;
use ace_workspace::WorkspaceManager;

use crate::scheduler::PoolScheduler;

/// One sweep's tally, surfaced for logging/tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReclaimOutcome {
    pub worktrees_removed: usize,
    pub sessions_killed: usize,
}

/// Runs no more than once per `cleanupIntervalSeconds` (§4.10); the caller
/// (the CLI/daemon's outer loop) is responsible for the interval timing,
/// this type just performs one `tick()` when asked.
pub struct ResourceReclaimer {
    workspace: Arc<WorkspaceManager>,
    sessions: Arc<SessionSupervisor>,
    scheduler: Arc<PoolScheduler>,
    config: Arc<AceConfig>,
    last_tick: AsyncMutex<Option<tokio::time::Instant>>,
}

impl ResourceReclaimer {
    pub fn new(
        workspace: Arc<WorkspaceManager>,
        sessions: Arc<SessionSupervisor>,
        scheduler: Arc<PoolScheduler>,
        config: Arc<AceConfig>,
    ) -> Self {
        ResourceReclaimer {
            workspace,
            sessions,
            scheduler,
            config,
            last_tick: AsyncMutex::new(None),
        }
    }

    /// One sweep, no-op if `cleanupEnabled` is false or less than
    /// `cleanupIntervalSeconds` has elapsed since the last tick that
    /// actually ran.
    pub async fn tick(&self) -> ReclaimOutcome {
        if !self.config.cleanup_enabled {
            return ReclaimOutcome::default();
        }

        {
            let mut last = self.last_tick.lock().await;
            let interval = Duration::from_secs(self.config.cleanup_interval_seconds);
            if let Some(prev) = *last {
                if prev.elapsed() < interval {
                    return ReclaimOutcome::default();
                }
            }
            *last = Some(tokio::time::Instant::now());
        }

        let active = self.scheduler.active_repo_numbers().await;
        let worktrees_removed = self.sweep_worktrees(&active).await;
        let sessions_killed = if self.config.cleanup_tmux_enabled {
            self.sweep_sessions(&active).await
        } else {
            0
        };

        ReclaimOutcome {
            worktrees_removed,
            sessions_killed,
        }
    }

    /// Enumerate `<root>/worktrees/<repo>/<N>`, skipping any dir held by a
    /// running slot, by a live session, or (when `cleanupOnlyDone` is true)
    /// unconditionally — §9's Open Question resolves this conservatively:
    /// without a per-item completion sentinel, `cleanupOnlyDone` means
    /// "never sweep".
    async fn sweep_worktrees(&self, active: &HashSet<(String, u64)>) -> usize {
        if self.config.cleanup_only_done {
            debug!("cleanupOnlyDone is set; reclaimer never sweeps workspaces");
            return 0;
        }

        let root = self.workspace.workspace_root().join("worktrees");
        let retention = Duration::from_secs(self.config.cleanup_worktree_retention_hours * 3600);
        let mut removed = 0;

        let mut repo_dirs = match tokio::fs::read_dir(&root).await {
            Ok(rd) => rd,
            Err(_) => return 0,
        };

        while let Ok(Some(repo_entry)) = repo_dirs.next_entry().await {
            let Ok(repo_file_type) = repo_entry.file_type().await else { continue };
            if !repo_file_type.is_dir() {
                continue;
            }
            let repo_name = repo_entry.file_name().to_string_lossy().into_owned();
            let repo_path = repo_entry.path();

            let mut number_dirs = match tokio::fs::read_dir(&repo_path).await {
                Ok(rd) => rd,
                Err(_) => continue,
            };

            while let Ok(Some(number_entry)) = number_dirs.next_entry().await {
                let Ok(number_file_type) = number_entry.file_type().await else { continue };
                if !number_file_type.is_dir() {
                    continue;
                }
                let Ok(number) = number_entry.file_name().to_string_lossy().parse::<u64>() else {
                    continue;
                };
                let path = number_entry.path();

                if active.contains(&(repo_name.clone(), number)) {
                    continue;
                }
                let session = session_name(&repo_name, number);
                if matches!(self.sessions.session_exists(&session).await, Ok(true)) {
                    continue;
                }

                let age = worktree_age(&path).await;
                if age < retention {
                    continue;
                }

                info!(repo = %repo_name, number, age_secs = age.as_secs(), "reclaiming stale worktree");
                if let Err(e) = self.workspace.cleanup_worktree(&path).await {
                    warn!(path = %path.display(), error = %e, "failed to reclaim worktree, continuing sweep");
                    continue;
                }
                removed += 1;
            }
        }

        removed
    }

    /// After the worktree pass: kill any session whose last-activity age
    /// exceeds `tmuxRetention`, except one bound to an active slot or to a
    /// workspace `cleanupOnlyDone` protects.
    async fn sweep_sessions(&self, active: &HashSet<(String, u64)>) -> usize {
        let sessions = match self.sessions.list_sessions().await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "failed to list sessions for reclaim sweep");
                return 0;
            }
        };

        let retention_secs = (self.config.cleanup_tmux_retention_hours * 3600) as i64;
        let mut killed = 0;

        for (name, last_activity_epoch) in sessions {
            if !name.starts_with("ace-") {
                continue;
            }
            if active_names(active).contains(&name) {
                continue;
            }
            if self.config.cleanup_only_done && self.session_worktree_exists(&name).await {
                continue;
            }

            let now = chrono::Utc::now().timestamp();
            let age_secs = (now - last_activity_epoch).max(0);
            if age_secs < retention_secs {
                continue;
            }

            info!(session = %name, age_secs, "reclaiming stale session");
            self.sessions.kill_session(&name).await;
            killed += 1;
        }

        killed
    }

    /// Per `original_source/agent_pool.py:899`
    /// (`if worktree_path.exists() and cleanup_only_done: continue`): a
    /// session is protected whenever its worktree still exists on disk, not
    /// only when it's bound to an active slot. Reverse-parses the session
    /// name back to `(repoSlug, number)` via `parse_session_name`; a name
    /// that doesn't have the `ace-<repo>-<N>` shape is treated as
    /// unprotected (it isn't one of ours).
    async fn session_worktree_exists(&self, name: &str) -> bool {
        let Some((repo, number)) = ace_core::text::parse_session_name(name) else {
            return false;
        };
        tokio::fs::try_exists(self.workspace.worktree_path(&repo, number))
            .await
            .unwrap_or(false)
    }
}

fn active_names(active: &HashSet<(String, u64)>) -> HashSet<String> {
    active.iter().map(|(repo, number)| session_name(repo, *number)).collect()
}

/// Age from `max(mtime of directory, mtime of any known marker file)`
/// (§4.10).
async fn worktree_age(path: &PathBuf) -> Duration {
    let mut newest = mtime(path).await;
    for marker in [TASK_FILE_NAME, DONE_FILE_NAME] {
        if let Some(m) = mtime(&path.join(marker)).await {
            newest = Some(newest.map_or(m, |n: std::time::SystemTime| n.max(m)));
        }
    }
    match newest {
        Some(m) => std::time::SystemTime::now().duration_since(m).unwrap_or(Duration::ZERO),
        None => Duration::ZERO,
    }
}

async fn mtime(path: &std::path::Path) -> Option<std::time::SystemTime> {
    tokio::fs::metadata(path).await.ok()?.modified().ok()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ace_core::config::AceConfig;
    use ace_core::credentials::EnvCredentialStore;
    use ace_core::model::Target;
    use tempfile::TempDir;

    use super::*;
    use crate::board_source::fake::FakeBoardSource;
    use crate::queue::{QueueSettings, WorkQueueBuilder};
    use crate::workflow::WorkflowDeps;

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

    fn scheduler(workspace_root: &std::path::Path) -> Arc<PoolScheduler> {
        let deps = WorkflowDeps {
            board: Arc::new(FakeBoardSource::default()),
            workspace: Arc::new(WorkspaceManager::new(workspace_root)),
            sessions: Arc::new(SessionSupervisor::new()),
            credentials: Arc::new(EnvCredentialStore),
            config: Arc::new(AceConfig::default()),
        };
        let builder = WorkQueueBuilder::new(Arc::new(FakeBoardSource::default()), settings());
        PoolScheduler::new(2, builder, deps, None)
    }

    #[tokio::test]
    async fn disabled_cleanup_is_a_no_op() {
        let root = TempDir::new().unwrap();
        let workspace = Arc::new(WorkspaceManager::new(root.path()));
        let sessions = Arc::new(SessionSupervisor::new());
        let mut cfg = AceConfig::default();
        cfg.cleanup_enabled = false;
        let sched = scheduler(root.path());
        let reclaimer = ResourceReclaimer::new(workspace, sessions, sched, Arc::new(cfg));

        let outcome = reclaimer.tick().await;
        assert_eq!(outcome, ReclaimOutcome::default());
    }

    #[tokio::test]
    async fn cleanup_only_done_never_sweeps_worktrees() {
        let root = TempDir::new().unwrap();
        let stale = root.path().join("worktrees/widgets/1");
        tokio::fs::create_dir_all(&stale).await.unwrap();

        let workspace = Arc::new(WorkspaceManager::new(root.path()));
        let sessions = Arc::new(SessionSupervisor::new());
        let mut cfg = AceConfig::default();
        cfg.cleanup_only_done = true;
        cfg.cleanup_worktree_retention_hours = 0;
        let sched = scheduler(root.path());
        let reclaimer = ResourceReclaimer::new(workspace, sessions, sched, Arc::new(cfg));

        let outcome = reclaimer.tick().await;
        assert_eq!(outcome.worktrees_removed, 0);
        assert!(stale.exists());
    }

    #[tokio::test]
    async fn stale_worktree_past_retention_is_removed() {
        let root = TempDir::new().unwrap();
        let stale = root.path().join("worktrees/widgets/2");
        tokio::fs::create_dir_all(&stale).await.unwrap();

        let workspace = Arc::new(WorkspaceManager::new(root.path()));
        let sessions = Arc::new(SessionSupervisor::new());
        let mut cfg = AceConfig::default();
        cfg.cleanup_worktree_retention_hours = 0;
        let sched = scheduler(root.path());
        let reclaimer = ResourceReclaimer::new(workspace, sessions, sched, Arc::new(cfg));

        let outcome = reclaimer.tick().await;
        assert_eq!(outcome.worktrees_removed, 1);
        assert!(!stale.exists());
    }

    #[tokio::test]
    async fn second_tick_within_interval_is_a_no_op() {
        let root = TempDir::new().unwrap();
        let workspace = Arc::new(WorkspaceManager::new(root.path()));
        let sessions = Arc::new(SessionSupervisor::new());
        let mut cfg = AceConfig::default();
        cfg.cleanup_interval_seconds = 3600;
        let sched = scheduler(root.path());
        let reclaimer = ResourceReclaimer::new(workspace, sessions, sched, Arc::new(cfg));

        let _ = reclaimer.tick().await;
        let second_stale = root.path().join("worktrees/widgets/3");
        tokio::fs::create_dir_all(&second_stale).await.unwrap();
        let outcome = reclaimer.tick().await;
        assert_eq!(outcome, ReclaimOutcome::default());
        assert!(second_stale.exists());
    }
}
