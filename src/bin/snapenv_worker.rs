//! Runs reconciliation worker slots against the `PostgreSQL` task queue.
//!
//! Usage:
//!
//! ```text
//! snapenv_worker --database-url postgres://... --argocd-server https://argocd.example.com
//! ```
//!
//! Every flag can also be set through its environment variable (`DATABASE_URL`,
//! `ARGOCD_SERVER`, `ARGOCD_TOKEN`, `SNAPENV_*`). The worker stops on Ctrl-C
//! after the in-flight tasks of each slot settle.

use clap::Parser;
use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool, PoolError};
use mockable::DefaultClock;
use snapenv::config::{
    ConfigError, ControllerSettings, DEFAULT_APP_PREFIX, DEFAULT_CONTROLLER_SERVER,
    DEFAULT_HELM_CHART_PATH, DEFAULT_PREVIEW_DOMAIN, DispatchSettings, PreviewSettings,
    ReconcileSettings, SnapEnvConfig, StalePollPolicy, UnknownHealthPolicy,
};
use snapenv::dispatch::{Dispatcher, PostgresTaskQueue};
use snapenv::observability::{LogFormat, init_logging};
use snapenv::preview::adapters::argocd::ArgoCdClient;
use snapenv::preview::adapters::memory::BroadcastEventSink;
use snapenv::preview::adapters::postgres::PostgresPreviewStore;
use snapenv::preview::domain::{PreviewDomainError, RepositoryFullName};
use snapenv::preview::ports::ControllerError;
use snapenv::preview::services::ReconciliationService;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Command-line and environment settings of the worker.
#[derive(Parser)]
#[command(name = "snapenv_worker", about = "Reconcile preview environments")]
struct Args {
    /// `PostgreSQL` connection URL.
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: String,
    /// Maximum pooled database connections.
    #[arg(long, env = "SNAPENV_DB_POOL_SIZE", default_value_t = 8)]
    db_pool_size: u32,
    /// Argo CD API base URL.
    #[arg(long, env = "ARGOCD_SERVER", default_value = DEFAULT_CONTROLLER_SERVER)]
    argocd_server: String,
    /// Argo CD bearer token.
    #[arg(long, env = "ARGOCD_TOKEN", default_value = "", hide_env_values = true)]
    argocd_token: String,
    /// Skip TLS certificate verification for the controller.
    #[arg(long, env = "ARGOCD_INSECURE")]
    argocd_insecure: bool,
    /// Domain preview hosts are created under.
    #[arg(long, env = "SNAPENV_PREVIEW_DOMAIN", default_value = DEFAULT_PREVIEW_DOMAIN)]
    preview_domain: String,
    /// Repository to deploy instead of each pull request's own (`owner/repo`).
    #[arg(long, env = "SNAPENV_GITHUB_REPOSITORY")]
    github_repository: Option<String>,
    /// Helm chart path inside the repository.
    #[arg(long, env = "SNAPENV_HELM_CHART_PATH", default_value = DEFAULT_HELM_CHART_PATH)]
    helm_chart_path: String,
    /// Prefix of controller application names.
    #[arg(long, env = "SNAPENV_APP_PREFIX", default_value = DEFAULT_APP_PREFIX)]
    app_prefix: String,
    /// Concurrent worker slots.
    #[arg(long, env = "SNAPENV_WORKER_SLOTS", default_value_t = 4)]
    worker_slots: usize,
    /// Seconds a reserved task stays hidden before redelivery.
    #[arg(long, env = "SNAPENV_LEASE_TIMEOUT_SECS", default_value_t = 300)]
    lease_timeout_secs: u64,
    /// Treatment of `Unknown` controller health.
    #[arg(long, env = "SNAPENV_UNKNOWN_HEALTH", value_enum, default_value_t = UnknownHealthPolicy::Fail)]
    unknown_health: UnknownHealthPolicy,
    /// Treatment of polls for superseded deploys.
    #[arg(long, env = "SNAPENV_STALE_POLL", value_enum, default_value_t = StalePollPolicy::Apply)]
    stale_poll: StalePollPolicy,
    /// Log output format.
    #[arg(long, env = "SNAPENV_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

/// Errors that stop the worker before or while it runs.
#[derive(Debug, Error)]
enum StartupError {
    #[error("invalid repository override: {0}")]
    Repository(#[source] PreviewDomainError),
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to build database pool: {0}")]
    Pool(#[from] PoolError),
    #[error("failed to build controller client: {0}")]
    Controller(#[from] ControllerError),
    #[error("failed to wait for shutdown signal: {0}")]
    Signal(#[source] std::io::Error),
}

impl Args {
    fn config(&self) -> Result<SnapEnvConfig, StartupError> {
        let repository = self
            .github_repository
            .as_deref()
            .map(RepositoryFullName::new)
            .transpose()
            .map_err(StartupError::Repository)?;
        let config = SnapEnvConfig {
            preview: PreviewSettings {
                preview_domain: self.preview_domain.clone(),
                repository,
                helm_chart_path: self.helm_chart_path.clone(),
                app_prefix: self.app_prefix.clone(),
                ..PreviewSettings::default()
            },
            controller: ControllerSettings {
                server: self.argocd_server.clone(),
                token: self.argocd_token.clone(),
                insecure_tls: self.argocd_insecure,
                ..ControllerSettings::default()
            },
            dispatch: DispatchSettings {
                worker_slots: self.worker_slots,
                lease_timeout: Duration::from_secs(self.lease_timeout_secs),
                ..DispatchSettings::default()
            },
            reconcile: ReconcileSettings {
                unknown_health: self.unknown_health,
                stale_poll: self.stale_poll,
            },
        };
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.log_format);
    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "worker stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args) -> Result<(), StartupError> {
    let config = args.config()?;
    let manager = ConnectionManager::<PgConnection>::new(args.database_url.as_str());
    let pool = Pool::builder()
        .max_size(args.db_pool_size)
        .build(manager)?;

    let clock = Arc::new(DefaultClock);
    let store = Arc::new(PostgresPreviewStore::new(pool.clone()));
    let queue = Arc::new(PostgresTaskQueue::new(
        pool,
        Arc::clone(&clock),
        config.dispatch.lease_timeout,
    ));
    let controller = Arc::new(ArgoCdClient::new(&config.controller)?);
    let events = Arc::new(BroadcastEventSink::default());
    let handler = Arc::new(ReconciliationService::new(
        store,
        controller,
        events,
        clock,
        config.preview.clone(),
        config.reconcile,
    ));
    let dispatcher = Dispatcher::new(
        queue,
        handler,
        config.dispatch.retry,
        config.dispatch.idle_interval,
    );

    let shutdown = CancellationToken::new();
    let workers = dispatcher.spawn_workers(config.dispatch.worker_slots, &shutdown);
    info!(
        slots = config.dispatch.worker_slots,
        controller = %config.controller.server,
        preview_domain = %config.preview.preview_domain,
        "worker started"
    );

    let signal = tokio::signal::ctrl_c().await;
    info!("shutdown requested");
    shutdown.cancel();
    for worker in workers {
        if let Err(err) = worker.await {
            warn!(error = %err, "worker slot ended abnormally");
        }
    }
    signal.map_err(StartupError::Signal)
}
