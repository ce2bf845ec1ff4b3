use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;

use crate::error::WorkspaceError;
use crate::redact::redact_credentials;

const CLONE_TIMEOUT: Duration = Duration::from_secs(300);
const FETCH_TIMEOUT: Duration = Duration::from_secs(120);
const CHECKOUT_TIMEOUT: Duration = Duration::from_secs(60);
const VERIFY_TIMEOUT: Duration = Duration::from_secs(30);

/// Owns the per-item worktree and branch lifecycle on a local filesystem
/// checkout. Mirrors `git_ops.py`'s `GitOps`, restructured around the
/// teacher's closed-error-enum/idempotent-operation idiom.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    workspace_root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
        }
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// `<workspaceRoot>/worktrees/<repoName>/<number>`.
    pub fn worktree_path(&self, repo_name: &str, number: u64) -> PathBuf {
        self.workspace_root
            .join("worktrees")
            .join(repo_name)
            .join(number.to_string())
    }

    /// `agent/<number>-<slug>`.
    pub fn branch_name(number: u64, slug: &str) -> String {
        format!("agent/{number}-{slug}")
    }

    /// Clone `<repoOwner>/<repoName>` at `repoUrl` into the item's worktree
    /// path. Idempotent: a pre-existing directory is a no-op.
    pub async fn clone_repo(
        &self,
        repo_url: &str,
        repo_name: &str,
        number: u64,
    ) -> Result<PathBuf, WorkspaceError> {
        let path = self.worktree_path(repo_name, number);
        if path.exists() {
            tracing::debug!(path = %path.display(), "worktree already present, skipping clone");
            return Ok(path);
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| WorkspaceError::GitCommand {
                    command: format!("mkdir -p {}", parent.display()),
                    source,
                })?;
        }

        tracing::info!(
            repo_url = %redact_credentials(repo_url),
            path = %path.display(),
            "cloning repository"
        );

        run_git(
            &["clone", repo_url, path.to_string_lossy().as_ref()],
            None,
            CLONE_TIMEOUT,
        )
        .await?;

        Ok(path)
    }

    /// Fetch `origin`, then checkout `branchName` if it already exists
    /// locally, else create it from `origin/<baseBranch>`.
    pub async fn ensure_branch(
        &self,
        path: &Path,
        branch_name: &str,
        base_branch: &str,
    ) -> Result<(), WorkspaceError> {
        run_git(&["fetch", "origin", "--prune"], Some(path), FETCH_TIMEOUT).await?;

        let exists = run_git_allow_failure(
            &["rev-parse", "--verify", &format!("refs/heads/{branch_name}")],
            Some(path),
            VERIFY_TIMEOUT,
        )
        .await?;

        if exists {
            run_git(&["checkout", branch_name], Some(path), CHECKOUT_TIMEOUT).await?;
        } else {
            run_git(
                &[
                    "checkout",
                    "-b",
                    branch_name,
                    &format!("origin/{base_branch}"),
                ],
                Some(path),
                CHECKOUT_TIMEOUT,
            )
            .await?;
        }

        Ok(())
    }

    /// Recursively remove a worktree directory. Idempotent on missing paths.
    pub async fn cleanup_worktree(&self, path: &Path) -> Result<(), WorkspaceError> {
        if !path.exists() {
            return Ok(());
        }
        tokio::fs::remove_dir_all(path)
            .await
            .map_err(|source| WorkspaceError::Remove {
                path: path.to_path_buf(),
                source,
            })
    }
}

async fn run_git(
    args: &[&str],
    cwd: Option<&Path>,
    timeout: Duration,
) -> Result<std::process::Output, WorkspaceError> {
    let mut cmd = Command::new("git");
    cmd.args(args);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let command_str = format!("git {}", args.join(" "));
    let output = tokio::time::timeout(timeout, cmd.output())
        .await
        .map_err(|_| WorkspaceError::GitExit {
            command: command_str.clone(),
            code: None,
            stderr: "timed out".to_string(),
        })?
        .map_err(|source| WorkspaceError::GitCommand {
            command: command_str.clone(),
            source,
        })?;

    if !output.status.success() {
        return Err(WorkspaceError::GitExit {
            command: command_str,
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    Ok(output)
}

/// Like [`run_git`] but treats a non-zero exit as `Ok(false)` rather than an
/// error; used for existence checks such as `rev-parse --verify`.
async fn run_git_allow_failure(
    args: &[&str],
    cwd: Option<&Path>,
    timeout: Duration,
) -> Result<bool, WorkspaceError> {
    let mut cmd = Command::new("git");
    cmd.args(args);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let output = tokio::time::timeout(timeout, cmd.output())
        .await
        .map_err(|_| WorkspaceError::GitExit {
            command: format!("git {}", args.join(" ")),
            code: None,
            stderr: "timed out".to_string(),
        })?
        .map_err(|source| WorkspaceError::GitCommand {
            command: format!("git {}", args.join(" ")),
            source,
        })?;

    Ok(output.status.success())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command as StdCommand;
    use tempfile::TempDir;

    fn run(dir: &Path, args: &[&str]) {
        let status = StdCommand::new("git")
            .args(args)
            .current_dir(dir)
            .status()
            .unwrap_or_else(|e| panic!("git {} failed: {e}", args.join(" ")));
        assert!(status.success(), "git {} failed", args.join(" "));
    }

    fn init_bare_origin() -> TempDir {
        let origin = TempDir::new().unwrap();
        run(origin.path(), &["init", "--bare", "-b", "main"]);
        origin
    }

    fn seed_origin_with_commit(origin_path: &Path) {
        let seed = TempDir::new().unwrap();
        run(seed.path(), &["init", "-b", "main"]);
        run(seed.path(), &["config", "user.email", "a@b.c"]);
        run(seed.path(), &["config", "user.name", "tester"]);
        std::fs::write(seed.path().join("README.md"), "hi\n").unwrap();
        run(seed.path(), &["add", "."]);
        run(seed.path(), &["commit", "-m", "init"]);
        run(
            seed.path(),
            &["remote", "add", "origin", origin_path.to_str().unwrap()],
        );
        run(seed.path(), &["push", "origin", "main"]);
    }

    #[test]
    fn worktree_path_layout() {
        let mgr = WorkspaceManager::new("/tmp/ace-root");
        assert_eq!(
            mgr.worktree_path("widgets", 42),
            PathBuf::from("/tmp/ace-root/worktrees/widgets/42")
        );
    }

    #[test]
    fn branch_name_format() {
        assert_eq!(
            WorkspaceManager::branch_name(42, "add-dark-mode"),
            "agent/42-add-dark-mode"
        );
    }

    #[tokio::test]
    async fn clone_repo_is_idempotent() {
        let origin = init_bare_origin();
        seed_origin_with_commit(origin.path());

        let root = TempDir::new().unwrap();
        let mgr = WorkspaceManager::new(root.path());

        let repo_url = origin.path().to_str().unwrap();
        let first = mgr.clone_repo(repo_url, "widgets", 1).await.unwrap();
        assert!(first.join("README.md").exists());

        std::fs::write(first.join("marker.txt"), "untouched").unwrap();
        let second = mgr.clone_repo(repo_url, "widgets", 1).await.unwrap();
        assert_eq!(first, second);
        assert!(second.join("marker.txt").exists(), "second call must be a no-op");
    }

    #[tokio::test]
    async fn ensure_branch_creates_from_base_when_absent() {
        let origin = init_bare_origin();
        seed_origin_with_commit(origin.path());

        let root = TempDir::new().unwrap();
        let mgr = WorkspaceManager::new(root.path());
        let repo_url = origin.path().to_str().unwrap();
        let path = mgr.clone_repo(repo_url, "widgets", 7).await.unwrap();

        mgr.ensure_branch(&path, "agent/7-add-feature", "main")
            .await
            .unwrap();

        let output = StdCommand::new("git")
            .args(["branch", "--show-current"])
            .current_dir(&path)
            .output()
            .unwrap();
        assert_eq!(
            String::from_utf8_lossy(&output.stdout).trim(),
            "agent/7-add-feature"
        );
    }

    #[tokio::test]
    async fn ensure_branch_reuses_existing_local_branch() {
        let origin = init_bare_origin();
        seed_origin_with_commit(origin.path());

        let root = TempDir::new().unwrap();
        let mgr = WorkspaceManager::new(root.path());
        let repo_url = origin.path().to_str().unwrap();
        let path = mgr.clone_repo(repo_url, "widgets", 9).await.unwrap();

        mgr.ensure_branch(&path, "agent/9-thing", "main")
            .await
            .unwrap();
        std::fs::write(path.join("local-work.txt"), "wip").unwrap();
        run(&path, &["add", "."]);
        run(&path, &["commit", "-m", "wip"]);

        run(&path, &["checkout", "main"]);
        mgr.ensure_branch(&path, "agent/9-thing", "main")
            .await
            .unwrap();

        assert!(
            path.join("local-work.txt").exists(),
            "re-checking out the existing branch must keep its local commit"
        );
    }

    #[tokio::test]
    async fn cleanup_worktree_is_idempotent_on_missing_path() {
        let root = TempDir::new().unwrap();
        let mgr = WorkspaceManager::new(root.path());
        let missing = root.path().join("worktrees/widgets/123");
        assert!(mgr.cleanup_worktree(&missing).await.is_ok());
    }

    #[tokio::test]
    async fn cleanup_worktree_removes_existing_directory() {
        let origin = init_bare_origin();
        seed_origin_with_commit(origin.path());

        let root = TempDir::new().unwrap();
        let mgr = WorkspaceManager::new(root.path());
        let repo_url = origin.path().to_str().unwrap();
        let path = mgr.clone_repo(repo_url, "widgets", 3).await.unwrap();
        assert!(path.exists());

        mgr.cleanup_worktree(&path).await.unwrap();
        assert!(!path.exists());
    }
}
