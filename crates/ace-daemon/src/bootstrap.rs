//! Wires a resolved `AceConfig` into `WorkflowDeps`, duplicated from
//! `ace-cli`'s bootstrap rather than shared: each binary is its own small
//! `main`, matching the teacher's per-command "resolve config, build a
//! pool/client, hand it to the runner" duplication in `gator-cli::main`
//! over a shared bootstrap crate.

use std::sync::Arc;

use ace_core::config::AceConfig;
use ace_core::credentials::{CredentialStore, EnvCredentialStore, SecretManagerCredentialStore};
use ace_pool::{BoardSource, QueueSettings, RemoteBoardSource, WorkQueueBuilder, WorkflowDeps};
use ace_remote::{HttpSecretFetcher, RemoteClient};
use ace_session::SessionSupervisor;
use ace_workspace::WorkspaceManager;

const GITHUB_API_BASE: &str = "https://api.github.com";
const SECRET_MANAGER_ENDPOINT_ENV: &str = "ACE_SECRET_MANAGER_ENDPOINT";

pub fn build_deps(config: &AceConfig) -> anyhow::Result<WorkflowDeps> {
    let credentials: Arc<dyn CredentialStore> = match config.secrets_backend.as_str() {
        "secret-manager" => {
            let endpoint = std::env::var(SECRET_MANAGER_ENDPOINT_ENV).map_err(|_| {
                anyhow::anyhow!("{SECRET_MANAGER_ENDPOINT_ENV} must be set for secrets_backend=secret-manager")
            })?;
            Arc::new(SecretManagerCredentialStore::new(
                endpoint,
                Arc::new(HttpSecretFetcher::new()),
            ))
        }
        _ => Arc::new(EnvCredentialStore),
    };

    let github_token = std::env::var("GITHUB_TOKEN").unwrap_or_default();
    let client = RemoteClient::new(GITHUB_API_BASE, github_token);
    let board: Arc<dyn BoardSource> = Arc::new(RemoteBoardSource::new(client));

    Ok(WorkflowDeps {
        board,
        workspace: Arc::new(WorkspaceManager::new(config.workspace_root.clone())),
        sessions: Arc::new(SessionSupervisor::new()),
        credentials,
        config: Arc::new(config.clone()),
    })
}

pub fn build_queue_builder(config: &AceConfig, board: Arc<dyn BoardSource>) -> WorkQueueBuilder {
    let settings = QueueSettings {
        org: std::env::var("ACE_GITHUB_ORG").unwrap_or_default(),
        project_name: std::env::var("ACE_GITHUB_PROJECT").unwrap_or_default(),
        target: config.default_target,
        local_label: config.github_local_agent_label.clone(),
        remote_label: config.github_remote_agent_label.clone(),
        agent_label: config.github_agent_label.clone(),
        ready_status: config.github_ready_status.clone(),
        resume_in_progress: config.resume_in_progress_issues,
        mcp_enabled: config.appforge_mcp_enabled,
        mcp_url: config.appforge_mcp_url.clone(),
    };
    WorkQueueBuilder::new(board, settings)
}
