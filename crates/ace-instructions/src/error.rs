/// Errors raised while building or writing a task's directive document.
#[derive(Debug, thiserror::Error)]
pub enum InstructionsError {
    #[error("instruction model returned a refusal: {reason}")]
    Refusal { reason: String },

    #[error("instruction model returned empty output")]
    EmptyOutput,

    #[error("instruction model call failed: {0}")]
    ModelCall(#[from] reqwest::Error),

    #[error("instruction model is not configured for backend `{backend}`")]
    UnknownBackend { backend: String },

    #[error("failed to write {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}
