//! merge-gate binary entry point.

use clap::Parser;
use merge_gate::config::Config;
use merge_gate::db::{self, StatusStore};
use merge_gate::services::gitlab_client::{GitLabClient, GitLabClientConfig};
use merge_gate::services::reconciler::Reconciler;
use merge_gate::services::server::{router, AppState};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// GitLab API request timeout.
const GITLAB_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Parser)]
#[command(name = "merge-gate", about = "Approval-policy gate for GitLab merge requests")]
struct Args {
    /// Address the HTTP service listens on.
    #[arg(long, env = "MERGE_GATE_LISTEN", default_value = "0.0.0.0:8080")]
    listen: SocketAddr,

    /// Path to the JSON configuration file.
    #[arg(long, env = "MERGE_GATE_CONFIG", default_value = "merge-gate.json")]
    config: PathBuf,

    /// Force debug-level logging.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run(args).await {
        error!(error = %e, "fatal startup error");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), merge_gate::AppError> {
    // Configuration failures are the only fatal errors; everything after
    // this point is logged and isolated.
    let config = Config::load(&args.config)?;
    info!(
        projects = config.projects.len(),
        config = %args.config.display(),
        "configuration loaded"
    );

    let pool = db::initialize(&config.database_url).await?;
    let store = StatusStore::new(pool);

    let client = GitLabClient::new(GitLabClientConfig {
        base_url: config.gitlab_url.clone(),
        token: config.gitlab_token.clone(),
        timeout_secs: GITLAB_TIMEOUT_SECS,
    })?;

    let reconciler = Arc::new(Reconciler::new(Arc::new(client), Arc::new(store)));

    // Re-apply policy to everything currently open before taking webhook
    // traffic, so missed webhooks during downtime cannot leave stale
    // decisions behind.
    reconciler.reconcile_all_open(&config.projects).await;

    let app = router(AppState {
        config,
        reconciler: reconciler.clone(),
    });

    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .map_err(|e| {
            merge_gate::AppError::config(format!("failed to bind {}: {}", args.listen, e))
        })?;
    info!(listen = %args.listen, "http service started");

    let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        info!("shutdown signal received, draining in-flight requests");
        reconciler.begin_shutdown();
    });

    if let Err(e) = serve.await {
        error!(error = %e, "http server error");
    }

    info!("service stopped");
    Ok(())
}

/// Resolves on ctrl-c or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
