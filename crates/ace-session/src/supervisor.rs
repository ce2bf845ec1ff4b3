use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use tokio::process::Command;

use crate::error::SessionError;

const SHORT_TIMEOUT: Duration = Duration::from_secs(5);
const START_TIMEOUT: Duration = Duration::from_secs(10);
const NUDGE_ATTEMPT_SPACING: Duration = Duration::from_millis(200);
const NUDGE_PASTE_SETTLE: Duration = Duration::from_millis(500);
const DOUBLE_ENTER_SUB_DELAY: Duration = Duration::from_millis(150);
const PROMPT_CHUNK_SIZE: usize = 500;
const NUDGE_MAX_ATTEMPTS: u32 = 3;

/// Lifecycle and prompt delivery for detached `tmux` sessions. Every
/// operation shells out to the `tmux` binary with a bounded timeout, mirroring
/// `tmux_ops.py`'s `TmuxOps`.
#[derive(Debug, Clone, Default)]
pub struct SessionSupervisor {
    tmux_bin: String,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self {
            tmux_bin: "tmux".to_string(),
        }
    }

    pub async fn session_exists(&self, name: &str) -> Result<bool, SessionError> {
        let status = self
            .status(&["has-session", "-t", name], SHORT_TIMEOUT)
            .await?;
        Ok(status.success())
    }

    /// `(name, lastActivityEpochSeconds)` for every live session. Returns an
    /// empty list (not an error) when no `tmux` server is running.
    pub async fn list_sessions(&self) -> Result<Vec<(String, i64)>, SessionError> {
        let output = self
            .raw(
                &[
                    "list-sessions",
                    "-F",
                    "#{session_name} #{session_activity}",
                ],
                SHORT_TIMEOUT,
            )
            .await?;

        if !output.status.success() {
            // "no server running on ..." — treat as zero sessions.
            return Ok(Vec::new());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut sessions = Vec::new();
        for line in stdout.lines() {
            let mut parts = line.rsplitn(2, ' ');
            let Some(activity) = parts.next() else {
                continue;
            };
            let Some(name) = parts.next() else { continue };
            match activity.parse::<i64>() {
                Ok(epoch) => sessions.push((name.to_string(), epoch)),
                Err(_) => tracing::debug!(line, "skipping malformed tmux list-sessions line"),
            }
        }
        Ok(sessions)
    }

    /// Start a detached session running `command` in `workdir`, with `env`
    /// injected via `set-environment`. Idempotent: returns `false` without
    /// touching an existing session of the same name.
    pub async fn start_session(
        &self,
        name: &str,
        workdir: &Path,
        command: &[String],
        env: &HashMap<String, String>,
    ) -> Result<bool, SessionError> {
        if self.session_exists(name).await? {
            tracing::debug!(session = name, "session already exists, not starting");
            return Ok(false);
        }

        let mut args: Vec<&str> = vec![
            "new-session",
            "-d",
            "-s",
            name,
            "-c",
            workdir.to_str().unwrap_or("."),
            "--",
        ];
        args.extend(command.iter().map(String::as_str));
        self.run(&args, START_TIMEOUT).await?;

        for (key, value) in env {
            self.run(&["set-environment", "-t", name, key, value], SHORT_TIMEOUT)
                .await?;
        }

        Ok(true)
    }

    /// Kill a session. No-op if it does not exist; failures are logged and
    /// swallowed, matching the teacher's "reclamation is best-effort" idiom.
    pub async fn kill_session(&self, name: &str) {
        if !matches!(self.session_exists(name).await, Ok(true)) {
            return;
        }
        if let Err(err) = self.run(&["kill-session", "-t", name], SHORT_TIMEOUT).await {
            tracing::warn!(session = name, error = %err, "failed to kill tmux session");
        }
    }

    /// Deliver `text` to the session in ≤500-char literal-paste chunks, then
    /// press Enter twice with a short sub-delay between — the double Enter
    /// covers target CLIs that discard the first newline while initializing.
    pub async fn send_prompt(
        &self,
        name: &str,
        text: &str,
        delay: Duration,
    ) -> Result<(), SessionError> {
        if text.trim().is_empty() {
            return Ok(());
        }

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        for chunk in chunk_text(text, PROMPT_CHUNK_SIZE) {
            self.run(&["send-keys", "-t", name, "-l", &chunk], SHORT_TIMEOUT)
                .await?;
        }

        self.run(&["send-keys", "-t", name, "Enter"], SHORT_TIMEOUT)
            .await?;
        tokio::time::sleep(DOUBLE_ENTER_SUB_DELAY).await;
        self.run(&["send-keys", "-t", name, "Enter"], SHORT_TIMEOUT)
            .await?;

        Ok(())
    }

    /// Press Enter `repeat` times, spaced by `delay`.
    pub async fn send_enter(
        &self,
        name: &str,
        repeat: u32,
        delay: Duration,
    ) -> Result<(), SessionError> {
        for i in 0..repeat {
            if i > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            self.run(&["send-keys", "-t", name, "Enter"], SHORT_TIMEOUT)
                .await?;
        }
        Ok(())
    }

    /// Paste `message` then retry Enter up to 3 times (0.2s apart), failing
    /// hard only if every attempt fails to reach tmux.
    pub async fn nudge(&self, name: &str, message: &str) -> Result<(), SessionError> {
        if message.trim().is_empty() {
            return Ok(());
        }
        if !self.session_exists(name).await? {
            return Err(SessionError::NotFound {
                session: name.to_string(),
            });
        }

        self.run(&["send-keys", "-t", name, "-l", message], SHORT_TIMEOUT)
            .await?;
        tokio::time::sleep(NUDGE_PASTE_SETTLE).await;

        let mut last_error = String::new();
        for attempt in 0..NUDGE_MAX_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(NUDGE_ATTEMPT_SPACING).await;
            }
            match self.run(&["send-keys", "-t", name, "Enter"], SHORT_TIMEOUT).await {
                Ok(()) => return Ok(()),
                Err(err) => last_error = err.to_string(),
            }
        }

        Err(SessionError::NudgeFailed {
            session: name.to_string(),
            attempts: NUDGE_MAX_ATTEMPTS,
            last_error,
        })
    }

    /// Capture the last `last_n` lines of the session's pane.
    pub async fn capture_output(&self, name: &str, last_n: usize) -> Result<String, SessionError> {
        let start = format!("-{last_n}");
        let output = self
            .raw(
                &["capture-pane", "-t", name, "-p", "-S", &start],
                SHORT_TIMEOUT,
            )
            .await?;

        if !output.status.success() {
            return Err(SessionError::TmuxExit {
                command: "capture-pane".to_string(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn run(&self, args: &[&str], timeout: Duration) -> Result<(), SessionError> {
        let output = self.raw(args, timeout).await?;
        if !output.status.success() {
            return Err(SessionError::TmuxExit {
                command: args.join(" "),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(())
    }

    async fn status(
        &self,
        args: &[&str],
        timeout: Duration,
    ) -> Result<std::process::ExitStatus, SessionError> {
        Ok(self.raw(args, timeout).await?.status)
    }

    async fn raw(
        &self,
        args: &[&str],
        timeout: Duration,
    ) -> Result<std::process::Output, SessionError> {
        let mut cmd = Command::new(&self.tmux_bin);
        cmd.args(args);
        tokio::time::timeout(timeout, cmd.output())
            .await
            .map_err(|_| SessionError::TmuxExit {
                command: args.join(" "),
                code: None,
                stderr: "timed out".to_string(),
            })?
            .map_err(|source| SessionError::TmuxCommand {
                command: args.join(" "),
                source,
            })
    }
}

/// Split `text` into chunks of at most `max_len` characters, UTF-8-safe.
fn chunk_text(text: &str, max_len: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_len)
        .map(|c| c.iter().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_text_splits_on_500_chars() {
        let text = "x".repeat(1200);
        let chunks = chunk_text(&text, 500);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 500);
        assert_eq!(chunks[1].len(), 500);
        assert_eq!(chunks[2].len(), 200);
    }

    #[test]
    fn chunk_text_short_prompt_is_single_chunk() {
        let chunks = chunk_text("do the thing", 500);
        assert_eq!(chunks, vec!["do the thing".to_string()]);
    }

    #[tokio::test]
    async fn session_lifecycle_against_real_tmux() {
        if which_tmux().is_none() {
            eprintln!("skipping: tmux not installed");
            return;
        }

        let sup = SessionSupervisor::new();
        let name = format!("ace-test-{}", std::process::id());
        let workdir = std::env::temp_dir();

        assert!(!sup.session_exists(&name).await.unwrap());

        let mut env = HashMap::new();
        env.insert("ACE_TEST_VAR".to_string(), "1".to_string());
        let created = sup
            .start_session(&name, &workdir, &["sleep".to_string(), "60".to_string()], &env)
            .await
            .unwrap();
        assert!(created);

        let created_again = sup
            .start_session(&name, &workdir, &["sleep".to_string(), "60".to_string()], &env)
            .await
            .unwrap();
        assert!(!created_again, "starting an existing session must be a no-op");

        assert!(sup.session_exists(&name).await.unwrap());

        let sessions = sup.list_sessions().await.unwrap();
        assert!(sessions.iter().any(|(n, _)| n == &name));

        sup.kill_session(&name).await;
        assert!(!sup.session_exists(&name).await.unwrap());
    }

    fn which_tmux() -> Option<()> {
        std::process::Command::new("tmux")
            .arg("-V")
            .output()
            .ok()
            .filter(|o| o.status.success())
            .map(|_| ())
    }
}
