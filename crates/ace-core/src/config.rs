//! Configuration loading: environment variables as the primary source, an
//! optional TOML file as a lower-priority layer, matching the teacher's
//! "CLI flag > env var > config file > default" resolution chain
//! (`gator-cli::config`) with the priority order required by §6 (ACE is
//! environment-driven first).

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::model::Target;

/// Backend/model routing for one difficulty tier (§6,
/// `difficulty<X>Backend`/`difficulty<X>Model`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendModelPair {
    pub backend: String,
    pub model: String,
}

/// Execution mode for the spawned CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentExecutionMode {
    Tmux,
    Cli,
    Http,
}

impl std::str::FromStr for AgentExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tmux" => Ok(AgentExecutionMode::Tmux),
            "cli" => Ok(AgentExecutionMode::Cli),
            "http" => Ok(AgentExecutionMode::Http),
            other => Err(format!("unknown agentExecutionMode: {other}")),
        }
    }
}

/// Fully resolved configuration. Every option from §6's configuration list
/// is a field here with the stated default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AceConfig {
    pub max_agents: usize,
    pub poll_interval_seconds: u64,
    pub task_poll_interval_seconds: u64,
    /// 0 means infinite.
    pub task_wait_timeout_seconds: u64,

    pub task_nudge_enabled: bool,
    pub task_nudge_after_seconds: u64,
    pub task_nudge_interval_seconds: u64,
    pub task_nudge_max_attempts: u32,
    pub task_nudge_max_restarts: u32,
    pub task_nudge_message: String,

    pub cleanup_enabled: bool,
    pub cleanup_interval_seconds: u64,
    pub cleanup_worktree_retention_hours: u64,
    pub cleanup_tmux_retention_hours: u64,
    pub cleanup_only_done: bool,
    pub cleanup_tmux_enabled: bool,

    pub resume_in_progress_issues: bool,
    pub agent_execution_mode: AgentExecutionMode,
    pub disable_issue_comments: bool,
    pub disable_issue_status: bool,

    pub github_agent_label: String,
    pub github_local_agent_label: String,
    pub github_remote_agent_label: String,
    pub github_ready_status: String,
    pub github_base_branch: String,
    pub blocked_assignee: Option<String>,

    pub difficulty_backends: HashMap<String, BackendModelPair>,

    pub workspace_root: PathBuf,
    pub default_target: Target,

    pub secrets_backend: String,

    /// Name under which the auxiliary protocol server is registered in the
    /// spawned CLI's plugin config (§4.5). `None` URL disables the step.
    pub mcp_server_name: String,
    pub mcp_server_url: Option<String>,

    /// Preferred-data-source auxiliary protocol server for the Work-Queue
    /// Builder's newly-ready lane (§4.7 point 3). Distinct from
    /// `mcp_server_url` above, which configures what the *spawned CLI*
    /// reads on startup; this is the server the orchestrator itself queries
    /// for already-filtered ready items before falling back to the direct
    /// board query.
    pub appforge_mcp_enabled: bool,
    pub appforge_mcp_url: Option<String>,

    /// Shared secret for `/webhook/github`'s HMAC-SHA256 signature check.
    /// `None` disables signature verification (§6).
    pub github_webhook_secret: Option<String>,

    /// Local wall-clock hour (0-23) the daemon's `/scheduler/*` endpoints
    /// run `runUntilEmpty` at; `scheduler_timezone_offset_hours` (east of
    /// UTC) converts it to the UTC hour actually compared against.
    pub scheduler_local_hour: u32,
    pub scheduler_timezone_offset_hours: i32,
}

impl Default for AceConfig {
    fn default() -> Self {
        let mut difficulty_backends = HashMap::new();
        difficulty_backends.insert(
            "easy".to_string(),
            BackendModelPair {
                backend: "claude".to_string(),
                model: "claude-3-5-haiku".to_string(),
            },
        );
        difficulty_backends.insert(
            "medium".to_string(),
            BackendModelPair {
                backend: "claude".to_string(),
                model: "claude-3-5-sonnet".to_string(),
            },
        );
        difficulty_backends.insert(
            "hard".to_string(),
            BackendModelPair {
                backend: "claude".to_string(),
                model: "claude-3-opus".to_string(),
            },
        );

        AceConfig {
            max_agents: 5,
            poll_interval_seconds: 30,
            task_poll_interval_seconds: 5,
            task_wait_timeout_seconds: 0,

            task_nudge_enabled: true,
            task_nudge_after_seconds: 300,
            task_nudge_interval_seconds: 60,
            task_nudge_max_attempts: 3,
            task_nudge_max_restarts: 1,
            task_nudge_message: "Still working on task {task_id} ({task_title})? Please continue."
                .to_string(),

            cleanup_enabled: true,
            cleanup_interval_seconds: 3600,
            cleanup_worktree_retention_hours: 72,
            cleanup_tmux_retention_hours: 24,
            cleanup_only_done: false,
            cleanup_tmux_enabled: true,

            resume_in_progress_issues: true,
            agent_execution_mode: AgentExecutionMode::Tmux,
            disable_issue_comments: false,
            disable_issue_status: false,

            github_agent_label: "agent".to_string(),
            github_local_agent_label: "agent:local".to_string(),
            github_remote_agent_label: "agent:remote".to_string(),
            github_ready_status: "Ready".to_string(),
            github_base_branch: "main".to_string(),
            blocked_assignee: None,

            difficulty_backends,

            workspace_root: PathBuf::from("/tmp/ace-workspaces"),
            default_target: Target::Remote,

            secrets_backend: "env".to_string(),

            mcp_server_name: "github".to_string(),
            mcp_server_url: None,

            appforge_mcp_enabled: false,
            appforge_mcp_url: None,

            github_webhook_secret: None,
            scheduler_local_hour: 9,
            scheduler_timezone_offset_hours: 0,
        }
    }
}

/// Lower-priority TOML file layer (`~/.config/ace/config.toml`). Fields are
/// all optional; a present field overrides the built-in default but is
/// itself overridden by an environment variable of the corresponding name.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub max_agents: Option<usize>,
    #[serde(default)]
    pub workspace_root: Option<String>,
    #[serde(default)]
    pub github_ready_status: Option<String>,
    #[serde(default)]
    pub github_base_branch: Option<String>,
    #[serde(default)]
    pub secrets_backend: Option<String>,
}

pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("ace");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("ace")
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

fn load_config_file() -> Option<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(path).ok()?;
    toml::from_str(&contents).ok()
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_u64(name: &str, default: u64) -> u64 {
    env_var(name).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    env_var(name).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u32(name: &str, default: u32) -> u32 {
    env_var(name).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_bool(name: &str, default: bool) -> bool {
    env_var(name)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

impl AceConfig {
    /// Resolve configuration: environment variables, falling back to the
    /// config file, falling back to built-in defaults.
    pub fn resolve() -> Self {
        let file = load_config_file();
        let mut cfg = AceConfig::default();

        cfg.max_agents = env_usize(
            "ACE_MAX_AGENTS",
            file.as_ref().and_then(|f| f.max_agents).unwrap_or(cfg.max_agents),
        );
        cfg.poll_interval_seconds = env_u64("ACE_POLL_INTERVAL_SECONDS", cfg.poll_interval_seconds);
        cfg.task_poll_interval_seconds =
            env_u64("ACE_TASK_POLL_INTERVAL_SECONDS", cfg.task_poll_interval_seconds);
        cfg.task_wait_timeout_seconds =
            env_u64("ACE_TASK_WAIT_TIMEOUT_SECONDS", cfg.task_wait_timeout_seconds);

        cfg.task_nudge_enabled = env_bool("ACE_TASK_NUDGE_ENABLED", cfg.task_nudge_enabled);
        cfg.task_nudge_after_seconds =
            env_u64("ACE_TASK_NUDGE_AFTER_SECONDS", cfg.task_nudge_after_seconds);
        cfg.task_nudge_interval_seconds =
            env_u64("ACE_TASK_NUDGE_INTERVAL_SECONDS", cfg.task_nudge_interval_seconds);
        cfg.task_nudge_max_attempts =
            env_u32("ACE_TASK_NUDGE_MAX_ATTEMPTS", cfg.task_nudge_max_attempts);
        cfg.task_nudge_max_restarts =
            env_u32("ACE_TASK_NUDGE_MAX_RESTARTS", cfg.task_nudge_max_restarts);
        if let Some(msg) = env_var("ACE_TASK_NUDGE_MESSAGE") {
            cfg.task_nudge_message = msg;
        }

        cfg.cleanup_enabled = env_bool("ACE_CLEANUP_ENABLED", cfg.cleanup_enabled);
        cfg.cleanup_interval_seconds =
            env_u64("ACE_CLEANUP_INTERVAL_SECONDS", cfg.cleanup_interval_seconds);
        cfg.cleanup_worktree_retention_hours = env_u64(
            "ACE_CLEANUP_WORKTREE_RETENTION_HOURS",
            cfg.cleanup_worktree_retention_hours,
        );
        cfg.cleanup_tmux_retention_hours = env_u64(
            "ACE_CLEANUP_TMUX_RETENTION_HOURS",
            cfg.cleanup_tmux_retention_hours,
        );
        cfg.cleanup_only_done = env_bool("ACE_CLEANUP_ONLY_DONE", cfg.cleanup_only_done);
        cfg.cleanup_tmux_enabled = env_bool("ACE_CLEANUP_TMUX_ENABLED", cfg.cleanup_tmux_enabled);

        cfg.resume_in_progress_issues =
            env_bool("ACE_RESUME_IN_PROGRESS_ISSUES", cfg.resume_in_progress_issues);
        if let Some(mode) = env_var("ACE_AGENT_EXECUTION_MODE") {
            if let Ok(parsed) = mode.parse() {
                cfg.agent_execution_mode = parsed;
            }
        }
        cfg.disable_issue_comments =
            env_bool("ACE_DISABLE_ISSUE_COMMENTS", cfg.disable_issue_comments);
        cfg.disable_issue_status = env_bool("ACE_DISABLE_ISSUE_STATUS", cfg.disable_issue_status);

        if let Some(label) = env_var("ACE_GITHUB_AGENT_LABEL") {
            cfg.github_agent_label = label;
        }
        if let Some(label) = env_var("ACE_GITHUB_LOCAL_AGENT_LABEL") {
            cfg.github_local_agent_label = label;
        }
        if let Some(label) = env_var("ACE_GITHUB_REMOTE_AGENT_LABEL") {
            cfg.github_remote_agent_label = label;
        }
        cfg.github_ready_status = env_var("ACE_GITHUB_READY_STATUS")
            .or_else(|| file.as_ref().and_then(|f| f.github_ready_status.clone()))
            .unwrap_or(cfg.github_ready_status);
        cfg.github_base_branch = env_var("ACE_GITHUB_BASE_BRANCH")
            .or_else(|| file.as_ref().and_then(|f| f.github_base_branch.clone()))
            .unwrap_or(cfg.github_base_branch);
        cfg.blocked_assignee = env_var("ACE_BLOCKED_ASSIGNEE").or(cfg.blocked_assignee);

        for tier in ["easy", "medium", "hard"] {
            let backend_env = format!("ACE_DIFFICULTY_{}_BACKEND", tier.to_uppercase());
            let model_env = format!("ACE_DIFFICULTY_{}_MODEL", tier.to_uppercase());
            let entry = cfg.difficulty_backends.entry(tier.to_string()).or_insert(BackendModelPair {
                backend: "claude".to_string(),
                model: "claude-3-5-sonnet".to_string(),
            });
            if let Some(b) = env_var(&backend_env) {
                entry.backend = b;
            }
            if let Some(m) = env_var(&model_env) {
                entry.model = m;
            }
        }

        cfg.workspace_root = env_var("ACE_WORKSPACE_ROOT")
            .or_else(|| file.as_ref().and_then(|f| f.workspace_root.clone()))
            .map(PathBuf::from)
            .unwrap_or(cfg.workspace_root);

        cfg.secrets_backend = env_var("ACE_SECRETS_BACKEND")
            .or_else(|| file.as_ref().and_then(|f| f.secrets_backend.clone()))
            .unwrap_or(cfg.secrets_backend);

        if let Some(name) = env_var("ACE_MCP_SERVER_NAME") {
            cfg.mcp_server_name = name;
        }
        cfg.mcp_server_url = env_var("ACE_MCP_SERVER_URL").or(cfg.mcp_server_url);

        cfg.appforge_mcp_enabled = env_bool("ACE_APPFORGE_MCP_ENABLED", cfg.appforge_mcp_enabled);
        cfg.appforge_mcp_url = env_var("ACE_APPFORGE_MCP_URL").or(cfg.appforge_mcp_url);

        cfg.github_webhook_secret = env_var("ACE_GITHUB_WEBHOOK_SECRET").or(cfg.github_webhook_secret);
        cfg.scheduler_local_hour =
            env_u64("ACE_SCHEDULER_LOCAL_HOUR", cfg.scheduler_local_hour as u64) as u32;
        if let Some(offset) = env_var("ACE_SCHEDULER_TIMEZONE_OFFSET_HOURS").and_then(|v| v.parse().ok()) {
            cfg.scheduler_timezone_offset_hours = offset;
        }

        cfg
    }

    /// `select_backend`'s label-to-pair mapping (§4.9): maps
    /// `difficulty:easy|medium|hard` to a `(backend, model)` pair. Unknown
    /// or missing difficulty falls back to `easy`'s pair with a warning,
    /// never a failure.
    pub fn select_backend(&self, labels: &[String]) -> BackendModelPair {
        let difficulty = labels
            .iter()
            .find_map(|l| l.strip_prefix("difficulty:"))
            .unwrap_or("easy");

        match self.difficulty_backends.get(difficulty) {
            Some(pair) => pair.clone(),
            None => {
                tracing::warn!(difficulty, "unknown difficulty label, defaulting to easy");
                self.difficulty_backends
                    .get("easy")
                    .cloned()
                    .unwrap_or(BackendModelPair {
                        backend: "claude".to_string(),
                        model: "claude-3-5-haiku".to_string(),
                    })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = AceConfig::default();
        assert_eq!(cfg.max_agents, 5);
        assert_eq!(cfg.task_wait_timeout_seconds, 0);
        assert!(cfg.task_nudge_enabled);
    }

    #[test]
    fn select_backend_falls_back_to_easy_on_unknown_label() {
        let cfg = AceConfig::default();
        let pair = cfg.select_backend(&["difficulty:extreme".to_string()]);
        assert_eq!(pair, cfg.difficulty_backends["easy"]);
    }

    #[test]
    fn select_backend_falls_back_to_easy_when_no_label() {
        let cfg = AceConfig::default();
        let pair = cfg.select_backend(&["bug".to_string()]);
        assert_eq!(pair, cfg.difficulty_backends["easy"]);
    }

    #[test]
    fn select_backend_honors_known_label() {
        let cfg = AceConfig::default();
        let pair = cfg.select_backend(&["difficulty:hard".to_string()]);
        assert_eq!(pair, cfg.difficulty_backends["hard"]);
    }

    #[test]
    fn execution_mode_parses() {
        assert_eq!(
            "tmux".parse::<AgentExecutionMode>().unwrap(),
            AgentExecutionMode::Tmux
        );
        assert!("bogus".parse::<AgentExecutionMode>().is_err());
    }
}
