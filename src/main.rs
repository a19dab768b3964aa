use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gatekeeper::config::{GatekeeperConfig, StoreBackend};
use gatekeeper::http::HttpServer;
use gatekeeper::ratelimit::{AdmissionControl, KeyResolver, RateLimiter};
use gatekeeper::store::{CounterStore, MemoryStore, RedisStore};

#[derive(Parser, Debug)]
#[command(name = "gatekeeper")]
#[command(about = "Rate limiting admission control for HTTP services", version)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on (overrides server.listen_addr)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Counter store backend (overrides store.backend)
    #[arg(long, value_enum)]
    store: Option<StoreBackend>,

    /// Redis connection URL (overrides store.redis_url)
    #[arg(long)]
    redis_url: Option<String>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match args.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_thread_ids(true)
            .init(),
    }

    info!("Starting Gatekeeper");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = GatekeeperConfig::load(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        config.server.listen_addr = listen;
    }
    if let Some(backend) = args.store {
        config.store.backend = backend;
    }
    if let Some(url) = args.redis_url {
        config.store.redis_url = Some(url);
    }
    config.validate()?;

    info!(
        listen_addr = %config.server.listen_addr,
        ip_limit = config.rate_limiting.ip_limit,
        token_limit = config.rate_limiting.token_limit,
        block_duration_secs = config.rate_limiting.block_duration_secs,
        backend = ?config.store.backend,
        "Configuration loaded"
    );

    let store = open_store(&config).await?;
    let limiter = match config.store.operation_timeout() {
        Some(timeout) => RateLimiter::with_operation_timeout(store, timeout),
        None => RateLimiter::new(store),
    };
    info!("Rate limiter initialized");

    let resolver = KeyResolver::from_config(&config.rate_limiting)?;
    let admission = AdmissionControl::new(
        resolver,
        Arc::new(limiter),
        config.rate_limiting.block_duration(),
    );

    let server = HttpServer::new(config.server.listen_addr, admission);
    server.serve_with_shutdown(shutdown_signal()).await?;

    info!("Gatekeeper stopped");
    Ok(())
}

async fn open_store(config: &GatekeeperConfig) -> anyhow::Result<Arc<dyn CounterStore>> {
    match config.store.backend {
        StoreBackend::Redis => {
            let url = config.store.redis_url.as_deref().unwrap_or_default();
            let store = RedisStore::connect(url).await?;
            Ok(Arc::new(store))
        }
        StoreBackend::Memory => {
            let store = Arc::new(MemoryStore::new());
            spawn_purger(store.clone(), Duration::from_secs(config.store.purge_interval_secs));
            info!("Using in-memory store; limits apply to this instance only");
            Ok(store)
        }
    }
}

/// Periodically drop expired entries from the memory store.
fn spawn_purger(store: Arc<MemoryStore>, every: Duration) {
    if every.is_zero() {
        return;
    }

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            store.purge_expired();
        }
    });
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
