//! Vitrine auth service
//!
//! Credential and session lifecycle management for the Vitrine backend:
//! password authentication, opaque server-validated sessions, single-use
//! reset/verification tokens, and OAuth identity federation.

mod account;
mod api;
mod auth;
mod config;
mod context;
mod db;
mod error;
mod mailer;
mod oauth;
mod rate_limit;
mod server;
mod session;
mod token;
mod utils;


use config::ServerConfig;
use context::AppContext;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vitrine_auth=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Vitrine auth service v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::from_env()?;
    let ctx = AppContext::new(config).await?;

    server::serve(ctx).await?;

    Ok(())
}
