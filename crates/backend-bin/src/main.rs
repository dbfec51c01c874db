// ============================
// crates/backend-bin/src/main.rs
// ============================
//! Tokio / Axum entry-point for the LMS auth backend.

use anyhow::{bail, Context, Result};
use backend_lib::{
    clock::{Clock, SystemClock},
    config::Settings,
    store::{AuthStore, SqliteStore},
    AppState,
};
use clap::{Parser, Subcommand};
use lms_common::Role;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "lms-backend", version, about = "LMS auth backend")]
struct Cli {
    /// TOML configuration file; missing files fall back to defaults
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Change the role of an existing user
    Promote {
        #[arg(long)]
        email: String,
        #[arg(long)]
        role: Role,
    },
}

fn init_tracing(settings: &Settings) {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_level));
    let registry = tracing_subscriber::registry().with(filter);
    if settings.log_format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load_from(&cli.config)
        .with_context(|| format!("loading settings from {}", cli.config.display()))?;
    init_tracing(&settings);

    let store = Arc::new(
        SqliteStore::open(&settings.database_path)
            .with_context(|| format!("opening {}", settings.database_path.display()))?,
    );

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(settings, store).await,
        Command::Promote { email, role } => promote(store.as_ref(), &email, role).await,
    }
}

async fn promote(store: &dyn AuthStore, email: &str, role: Role) -> Result<()> {
    let email = email.trim().to_lowercase();
    let Some(user) = store.user_by_email(&email).await? else {
        bail!("no user with email {email}");
    };
    let changed = store.update_role(user.id, role, SystemClock.now()).await?;
    if changed == 0 {
        bail!("user {} was not updated", user.id);
    }
    info!(user_id = user.id, %role, "role updated");
    Ok(())
}

async fn serve(settings: Settings, store: Arc<SqliteStore>) -> Result<()> {
    let addr = settings.bind_addr;
    let sweep_interval = settings.rate_limit.sweep_interval();

    let state = AppState::new(settings, store);
    let app = state.app().layer(TraceLayer::new_for_http());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = Arc::clone(&state.rate_limiter).spawn_sweeper(sweep_interval, shutdown_rx);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("server stopped, waiting for background tasks");
    if shutdown_tx.send(true).is_err() {
        warn!("rate limit sweeper already gone");
    }
    sweeper.await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "ctrl-c handler unavailable");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
