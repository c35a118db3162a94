//! Sync Engine Binary
//!
//! Starts the execution sync engine HTTP server.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin sync-engine
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `SCHWAB_CLIENT_ID`: Broker OAuth client id
//! - `SCHWAB_CLIENT_SECRET`: Broker OAuth client secret
//!
//! ## Optional
//! - `HTTP_PORT`: HTTP server port (default: 8080)
//! - `SCHWAB_BASE_URL`: Trader API base URL override
//! - `SCHWAB_TOKEN_URL`: OAuth token endpoint override
//! - `SYNC_RECENT_WINDOW_DAYS`: Days covered by a RECENT sync (default: 180)
//! - `SYNC_FULL_HISTORY_WINDOWS`: Twelve-month windows issued by an ALL sync (default: 10)
//! - `RUST_LOG`: Log level (default: info)

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context as _;
use sync_engine::application::sync::{SyncConfig, SyncService};
use sync_engine::infrastructure::broker::schwab::{
    SchwabBrokerageAdapter, SchwabConfig, SchwabCredentialProvider,
};
use sync_engine::infrastructure::persistence::InMemoryJournalStore;
use sync_engine::server::{SyncServer, create_router};
use tokio::net::TcpListener;
use tokio::signal;

/// Default HTTP server port.
const DEFAULT_HTTP_PORT: u16 = 8080;

/// Parsed configuration from environment variables.
struct EngineConfig {
    http_port: u16,
    client_id: String,
    client_secret: String,
    base_url: Option<String>,
    token_url: Option<String>,
    sync: SyncConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    init_tracing();

    tracing::info!("Starting sync engine");

    let config = parse_config()?;
    tracing::info!(
        http_port = config.http_port,
        recent_window_days = config.sync.recent_window_days,
        full_history_windows = config.sync.full_history_windows,
        "Configuration loaded"
    );

    let mut schwab_config =
        SchwabConfig::new(config.client_id.clone(), config.client_secret.clone());
    if let Some(base_url) = &config.base_url {
        schwab_config = schwab_config.with_base_url(base_url);
    }
    if let Some(token_url) = &config.token_url {
        schwab_config = schwab_config.with_token_url(token_url);
    }

    let store = Arc::new(InMemoryJournalStore::new());
    let broker = Arc::new(
        SchwabBrokerageAdapter::new(&schwab_config).context("failed to build broker adapter")?,
    );
    let credentials = Arc::new(
        SchwabCredentialProvider::new(Arc::clone(&store), &schwab_config)
            .context("failed to build credential provider")?,
    );
    let service = SyncService::new(broker, credentials, store, config.sync);
    let app = create_router(SyncServer::new(service));

    let addr: SocketAddr = format!("0.0.0.0:{}", config.http_port)
        .parse()
        .context("invalid HTTP bind address")?;

    tracing::info!(%addr, "HTTP server starting");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health");
    tracing::info!("  POST /v1/sync");

    let listener = TcpListener::bind(addr)
        .await
        .context("failed to bind HTTP listener")?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    tracing::info!("Sync engine stopped");
    Ok(())
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Initialize the tracing subscriber with environment filter.
///
/// Uses static directive strings that are compile-time constants guaranteed to parse.
#[allow(clippy::expect_used)]
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(
                "sync_engine=info"
                    .parse()
                    .expect("static directive 'sync_engine=info' is valid"),
            ),
        )
        .init();
}

/// Parse configuration from environment variables.
fn parse_config() -> anyhow::Result<EngineConfig> {
    let client_id = std::env::var("SCHWAB_CLIENT_ID").unwrap_or_default();
    let client_secret = std::env::var("SCHWAB_CLIENT_SECRET").unwrap_or_default();

    if client_id.is_empty() || client_secret.is_empty() {
        anyhow::bail!(
            "SCHWAB_CLIENT_ID and SCHWAB_CLIENT_SECRET environment variables are required"
        );
    }

    let http_port: u16 = std::env::var("HTTP_PORT")
        .unwrap_or_else(|_| DEFAULT_HTTP_PORT.to_string())
        .parse()
        .unwrap_or(DEFAULT_HTTP_PORT);

    let defaults = SyncConfig::default();
    let recent_window_days: u64 = std::env::var("SYNC_RECENT_WINDOW_DAYS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults.recent_window_days);
    let full_history_windows: u32 = std::env::var("SYNC_FULL_HISTORY_WINDOWS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults.full_history_windows);

    Ok(EngineConfig {
        http_port,
        client_id,
        client_secret,
        base_url: std::env::var("SCHWAB_BASE_URL").ok(),
        token_url: std::env::var("SCHWAB_TOKEN_URL").ok(),
        sync: SyncConfig {
            recent_window_days,
            full_history_windows,
            ..defaults
        },
    })
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed; a process that cannot
/// respond to termination signals should fail fast at startup.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
