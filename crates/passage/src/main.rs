//! Passage - Dual-token authentication service

use anyhow::Result;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

use config::Config;
use passage_api::{create_router, AppState, MetricsHandle};
use passage_auth::JwtManager;
use passage_core::{spawn_cleanup_task, SessionManager};
use passage_db::Database;

/// Passage - Dual-token authentication service
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/default.toml")]
    config: String,

    /// Bind address
    #[arg(long, env = "PASSAGE_BIND")]
    bind: Option<String>,

    /// Port
    #[arg(short, long, env = "PASSAGE_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration
    let config = Config::load(&args.config)?;

    // Initialize logging
    init_logging(&config.logging.level);

    info!("Starting Passage v{}", env!("CARGO_PKG_VERSION"));
    config.warn_on_dev_secrets();

    // Create the data directory
    if let Some(parent) = Path::new(&config.database.path).parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    // Initialize database (bounded retry, then fail fast)
    let db_url = format!("sqlite:{}?mode=rwc", config.database.path);
    let db = Database::connect(&db_url).await?;

    // Create a default admin user if no users exist; the admin role is
    // otherwise unreachable on a fresh database
    if !db.has_users().await? {
        info!("Creating default admin user");
        let password_hash = passage_auth::hash_password("admin")?;
        db.insert_user(passage_db::NewUser {
            email: "admin@localhost".to_string(),
            password_hash,
            display_name: "Administrator".to_string(),
            role: passage_db::UserRole::Admin,
        })
        .await?;
        info!("Default admin user created (email: admin@localhost, password: admin)");
    }

    // Initialize the token issuer
    let jwt = Arc::new(JwtManager::new(
        &config.auth.access_secret,
        &config.auth.access_ttl,
        &config.auth.refresh_secret,
        &config.auth.refresh_ttl,
    ));

    // Initialize the session manager
    let sessions = Arc::new(SessionManager::new(db.clone(), jwt.clone()));

    // Start the recurring expired-token cleanup
    spawn_cleanup_task(sessions.clone(), config.auth.cleanup_interval_hours);

    // Install the Prometheus recorder
    let metrics_handle = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(Arc::new(MetricsHandle::new(handle))),
        Err(e) => {
            warn!("Failed to install metrics recorder: {}", e);
            None
        }
    };

    // Create application state
    let state = AppState::new(db, sessions, jwt);

    // Create router
    let app = create_router(state, metrics_handle).layer(TraceLayer::new_for_http());

    // Determine bind address
    let bind_addr = args.bind.unwrap_or(config.server.bind_address);
    let port = args.port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{}:{}", bind_addr, port).parse()?;

    info!("Listening on {}", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Initialize logging
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C handler");
    info!("Shutdown signal received");
}
