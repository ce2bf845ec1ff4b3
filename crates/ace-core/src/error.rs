//! The closed tagged-variant error type described in §7 and Design Note §9:
//! a single enum, one arm per error kind the core can surface, with
//! fatal-vs-recoverable encoded as a boolean accessor rather than a second
//! type hierarchy.

use thiserror::Error;

/// Every error kind the orchestrator core can surface, per §7's table.
#[derive(Debug, Error)]
pub enum AceError {
    /// Secret resolution failed and no fallback was available. Fatal: the
    /// caller should latch `fatalError` and stop the pool.
    #[error("credential missing: {0}")]
    CredentialMissing(String),

    /// The remote client exhausted its retries against a rate limit.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The Instruction Builder's validation rejected the model's output.
    #[error("instruction refused: {0}")]
    InstructionRefusal(String),

    /// The session ended without ever writing the done marker.
    #[error("missing done file: {0}")]
    MissingDoneFile(String),

    /// The done-marker wait loop exceeded `taskWaitTimeoutSeconds`.
    #[error("task wait timed out after {0:?}")]
    TaskWaitTimeout(std::time::Duration),

    /// Nudges were exhausted and no restarts remain.
    #[error("nudge attempts exceeded for {0}")]
    TaskNudgeExceeded(String),

    /// The done marker was present but malformed or empty.
    #[error("task validation failed: {0}")]
    TaskValidationFailed(String),

    /// An unrecoverable project-board status update failure.
    #[error("board unreachable: {0}")]
    BoardUnreachable(String),

    /// Any other workflow exception, normalized by `evaluate_result`.
    #[error("workflow failed: {0}")]
    Workflow(String),
}

impl AceError {
    /// Whether this error kind should latch the pool's fatal-error state
    /// (per §7's Propagation column) when it escapes a workflow unhandled.
    ///
    /// `RateLimited`, `InstructionRefusal`, `MissingDoneFile`,
    /// `TaskWaitTimeout`, `TaskNudgeExceeded`, and `TaskValidationFailed`
    /// are item-level failures by design (§7, §9's refusal Open Question);
    /// `BoardUnreachable` is log-only unless the caller's own policy
    /// escalates it. Only `CredentialMissing` and the generic `Workflow`
    /// catch-all are fatal by default.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AceError::CredentialMissing(_) | AceError::Workflow(_))
    }

    /// Render this error with the "❌ ERROR:" prefix required of fatal
    /// strings propagated to the pool's latch, adding the prefix only if
    /// it is not already present.
    pub fn fatal_message(&self) -> String {
        let msg = self.to_string();
        if msg.starts_with("❌ ERROR:") {
            msg
        } else {
            format!("❌ ERROR: {msg}")
        }
    }

    /// The stable error-kind tag used in metrics labels and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            AceError::CredentialMissing(_) => "credential_missing",
            AceError::RateLimited(_) => "rate_limited",
            AceError::InstructionRefusal(_) => "instruction_refusal",
            AceError::MissingDoneFile(_) => "missing_done_file",
            AceError::TaskWaitTimeout(_) => "task_wait_timeout",
            AceError::TaskNudgeExceeded(_) => "task_nudge_exceeded",
            AceError::TaskValidationFailed(_) => "task_validation_failed",
            AceError::BoardUnreachable(_) => "board_unreachable",
            AceError::Workflow(_) => "workflow_exception",
        }
    }
}
