use clap::{Parser, Subcommand};
use quasar_core::secrets::MasterSecret;
use quasar_db::DbPool;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "quasar", about = "Quasar market-data ingestion runtime")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Postgres connection string. Falls back to the `DSN` environment variable.
    #[arg(long, env = "DSN")]
    dsn: Option<String>,

    /// Path to the master secret file. Falls back to `MASTER_SECRET_PATH`.
    #[arg(long, env = "MASTER_SECRET_PATH")]
    master_secret_path: Option<PathBuf>,

    /// Root directory every dynamically loaded provider file must lie under.
    #[arg(long, env = "QUASAR_ALLOWLIST_ROOT", default_value = "/app/dynamic_providers")]
    allowlist_root: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP Registry Control Plane.
    Registry {
        #[arg(long, default_value = "0.0.0.0:8080")]
        listen: String,
        #[arg(long, env = "QUASAR_COLLECTOR_URL", default_value = "http://127.0.0.1:8081")]
        collector_url: String,
        #[arg(long, env = "QUASAR_IDENTITY_MANIFESTS", default_value = "./manifests/identities")]
        identity_manifests: PathBuf,
    },
    /// Run the subscription reconciliation scheduler.
    Scheduler {
        #[arg(long, default_value = "30")]
        interval_seconds: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("LOGLEVEL")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let dsn = args
        .dsn
        .ok_or_else(|| anyhow::anyhow!("DSN not provided (set DSN or pass --dsn)"))?;
    let master_secret_path = args
        .master_secret_path
        .ok_or_else(|| anyhow::anyhow!("MASTER_SECRET_PATH not provided"))?;

    let master: &'static MasterSecret = Box::leak(Box::new(MasterSecret::load(&master_secret_path)?));
    let db = Arc::new(DbPool::new());
    db.init(&dsn).await?;

    match args.command {
        Command::Registry {
            listen,
            collector_url,
            identity_manifests,
        } => run_registry(db, master, args.allowlist_root, listen, collector_url, identity_manifests).await,
        Command::Scheduler { interval_seconds } => {
            run_scheduler(db, master, args.allowlist_root, interval_seconds).await
        }
    }
}

async fn run_registry(
    db: Arc<DbPool>,
    master: &'static MasterSecret,
    allowlist_root: PathBuf,
    listen: String,
    collector_url: String,
    identity_manifests: PathBuf,
) -> anyhow::Result<()> {
    quasar_registry::seed::seed_identities(&db, &identity_manifests).await;

    let state = quasar_registry::AppState::new(db, master, allowlist_root, collector_url);
    let router = quasar_registry::build_router(state);

    let listener = tokio::net::TcpListener::bind(&listen).await?;
    tracing::info!(addr = %listen, "registry control plane listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn run_scheduler(
    db: Arc<DbPool>,
    master: &'static MasterSecret,
    allowlist_root: PathBuf,
    interval_seconds: u64,
) -> anyhow::Result<()> {
    let providers = Arc::new(quasar_loader::ProviderCache::new(
        allowlist_root.display().to_string(),
        master,
    ));
    let mut scheduler = quasar_scheduler::Scheduler::new(db, providers);

    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_seconds));
    tracing::info!(interval_seconds, "subscription scheduler starting");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = scheduler.reconcile().await {
                    tracing::error!(error = %e, "reconciliation pass failed");
                }
            }
            _ = shutdown_signal() => {
                tracing::info!("shutdown signal received, stopping scheduler");
                return Ok(());
            }
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
