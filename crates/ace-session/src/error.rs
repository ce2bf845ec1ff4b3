/// Errors raised by the session supervisor.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to run `tmux {command}`: {source}")]
    TmuxCommand {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`tmux {command}` exited with status {code:?}: {stderr}")]
    TmuxExit {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("session `{session}` does not exist")]
    NotFound { session: String },

    #[error("nudge to session `{session}` failed after {attempts} attempts: {last_error}")]
    NudgeFailed {
        session: String,
        attempts: u32,
        last_error: String,
    },

    #[error("no GitHub token available to configure plugin-protocol access")]
    MissingToken,

    #[error("failed to read or write {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse TOML config: {0}")]
    TomlParse(String),
}
