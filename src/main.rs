use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use build_robot::config::RobotConfig;
use build_robot::git::{CloneStatus, GitCli, RepoStateTracker, ensure_cloned};
use build_robot::orchestrator::BuildOrchestrator;
use build_robot::persistence::BuildHistory;
use build_robot::pipeline::CommandPipeline;
use build_robot::server::{AppState, build_router};
use build_robot::worker::{BuildWorker, Trigger, TriggerQueue};

#[derive(Parser)]
#[command(name = "build-robot")]
#[command(version, about = "Builds and deploys git branches on startup and on push webhooks")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "ROBOT_CONFIG", default_value = "robot.toml")]
    config: PathBuf,

    /// Webhook secret; overrides `webhooks.secret` from the file.
    #[arg(long, env = "ROBOT_WEBHOOK_SECRET", hide_env_values = true)]
    webhook_secret: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "build_robot=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = RobotConfig::load(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    config.override_secret(cli.webhook_secret);
    config.validate().context("invalid configuration")?;

    let git = GitCli::new();
    match ensure_cloned(&git, &config.repository, &config.clone_dir)
        .await
        .context("failed to prepare the working copy")?
    {
        CloneStatus::Cloned => info!(clone_dir = %config.clone_dir.display(), "Repository cloned"),
        CloneStatus::AlreadyPresent => info!(
            clone_dir = %config.clone_dir.display(),
            "Directory not empty, assuming repository is cloned"
        ),
    }

    let history_path = config.history_path();
    let history = Arc::new(
        BuildHistory::open(&history_path)
            .with_context(|| format!("failed to open {}", history_path.display()))?,
    );
    let tracker = Arc::new(RepoStateTracker::new(config.clone_dir.clone(), git));
    let orchestrator = BuildOrchestrator::new(
        tracker,
        Arc::clone(&history),
        CommandPipeline::new(config.pipeline.clone()),
        config.tracking.clone(),
    );

    // The startup run is queued before the server accepts webhooks, so it
    // always runs first.
    let (queue, rx) = TriggerQueue::channel();
    queue
        .enqueue(Trigger::Startup)
        .context("failed to queue the startup run")?;

    let shutdown = CancellationToken::new();
    let worker = tokio::spawn(BuildWorker::new(orchestrator).run(rx, shutdown.clone()));

    let secret = config
        .webhook_secret()
        .context("no webhook secret configured")?;
    let app = build_router(
        AppState::new(secret.as_bytes().to_vec(), queue, history),
        &config.webhooks.path,
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.webhooks.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, path = %config.webhooks.path, "Webhooks listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .context("server error")?;

    shutdown.cancel();
    match worker.await {
        Ok(stats) => info!(
            completed = stats.completed,
            aborted = stats.aborted,
            "Shut down"
        ),
        Err(e) => error!(error = %e, "Build worker task failed"),
    }
    Ok(())
}

/// Resolves on Ctrl-C (or when something else cancels `shutdown`).
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl-C received, shutting down"),
            Err(e) => {
                error!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {}
        _ = shutdown.cancelled() => {}
    }
    shutdown.cancel();
}
