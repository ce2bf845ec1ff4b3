//! `ace`: drain-once CLI runner (§6). Resolves configuration, builds one
//! admissible work queue, spawns agents against it until the queue and
//! every in-flight slot has drained, then exits.

mod bootstrap;

use std::time::Duration;

use clap::Parser;

use ace_core::model::Target;
use ace_pool::{PoolScheduler, ResourceReclaimer};

#[derive(Parser)]
#[command(name = "ace", about = "Autonomous coding-agent orchestrator: drain-once runner")]
struct Cli {
    /// Which board lane to pull work items from.
    #[arg(long, value_enum, default_value_t = TargetArg::Remote)]
    target: TargetArg,

    /// Maximum number of items to spawn this run. 0 means unlimited.
    #[arg(long, default_value_t = 0)]
    max_issues: usize,

    /// How often to re-check the queue while draining, in seconds.
    #[arg(long, default_value_t = 30)]
    check_interval: u64,

    /// Credential backend to resolve GitHub/model tokens from.
    #[arg(long, value_enum, default_value_t = SecretsBackendArg::Env)]
    secrets_backend: SecretsBackendArg,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum TargetArg {
    Remote,
    Local,
    Any,
}

impl From<TargetArg> for Target {
    fn from(t: TargetArg) -> Self {
        match t {
            TargetArg::Remote => Target::Remote,
            TargetArg::Local => Target::Local,
            TargetArg::Any => Target::Any,
        }
    }
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum SecretsBackendArg {
    Env,
    SecretManager,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = ace_core::config::AceConfig::resolve();
    config.default_target = cli.target.into();
    config.secrets_backend = match cli.secrets_backend {
        SecretsBackendArg::Env => "env".to_string(),
        SecretsBackendArg::SecretManager => "secret-manager".to_string(),
    };

    let deps = bootstrap::build_deps(&config)?;
    let builder = bootstrap::build_queue_builder(&config, deps.board.clone());
    let (workspace, sessions, deps_config) =
        (deps.workspace.clone(), deps.sessions.clone(), deps.config.clone());

    let scheduler = PoolScheduler::new(config.max_agents, builder, deps, None);
    scheduler.set_max_issues_per_run(cli.max_issues);

    let reclaimer = ResourceReclaimer::new(workspace, sessions, scheduler.clone(), deps_config);
    reclaimer.tick().await;

    let result = scheduler
        .run_until_empty(Duration::from_secs(cli.check_interval))
        .await;

    match result {
        Ok(()) => Ok(()),
        Err(e) => {
            eprintln!("{}", e.fatal_message());
            std::process::exit(1);
        }
    }
}
