use std::path::PathBuf;

/// Errors raised by the workspace manager.
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("failed to run `git {command}`: {source}")]
    GitCommand {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`git {command}` exited with status {code:?}: {stderr}")]
    GitExit {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("failed to remove worktree directory {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
