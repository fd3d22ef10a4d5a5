//! learnbot - Telegram learning bot
//!
//! Courses, learning blocks and quizzes driven by a per-user session
//! state machine.

mod api;
mod catalog;
mod config;
mod db;
mod import;
mod pagination;
mod progress;
mod quiz;
mod runtime;
mod state_machine;
mod telegram;

use api::{create_router, AppState};
use config::Config;
use db::Database;
use runtime::{RuntimeManager, RuntimeSettings};
use std::net::SocketAddr;
use std::sync::Arc;
use telegram::TelegramClient;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "learnbot=info,tower_http=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = Config::from_env()?;

    // Ensure database directory exists
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.db_path.display(), "Opening database");
    let db = Database::open(&config.db_path)?;

    for &admin_id in &config.admin_ids {
        db.grant_admin(admin_id)?;
    }
    tracing::info!(count = config.admin_ids.len(), "Admins seeded");

    let client = Arc::new(TelegramClient::new(&config.api_base, &config.bot_token)?);
    let runtime = Arc::new(RuntimeManager::new(
        db,
        client.clone(),
        RuntimeSettings::from(&config),
    ));

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown requested");
            }
            shutdown.cancel();
        });
    }

    match config.webhook_port {
        Some(port) => {
            if config.webhook_secret.is_none() {
                tracing::warn!("LEARNBOT_WEBHOOK_SECRET not set, webhook accepts any caller");
            }
            let app = create_router(AppState::new(runtime, config.webhook_secret.clone()));
            let addr = SocketAddr::from(([0, 0, 0, 0], port));
            tracing::info!("learnbot webhook listening on {}", addr);

            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await?;
        }
        None => telegram::poll(&client, &runtime, shutdown).await,
    }

    Ok(())
}
