/// HTTP server setup and routing
use crate::{context::AppContext, error::ApiResult};
use axum::{
    http::{header, Method, StatusCode},
    response::Json,
    routing::get,
    Router,
};
use serde_json::json;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

/// Build the main application router
pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/health", get(health_check))
        .merge(crate::api::routes())
        .with_state(ctx)
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .fallback(not_found)
}

/// Health check handler
async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// 404 handler
async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "NotFound",
            "message": "Endpoint not found"
        })),
    )
}

/// Interval between expired-row sweeps
const PURGE_INTERVAL_SECS: u64 = 3600;

/// Periodically reclaim expired sessions and tokens. Validation already
/// rejects expired rows; this only keeps the tables from growing.
fn spawn_purge_task(ctx: AppContext) {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(PURGE_INTERVAL_SECS));
        loop {
            interval.tick().await;
            match ctx.sessions.purge_expired().await {
                Ok(n) if n > 0 => info!("Purged {} expired sessions", n),
                Ok(_) => {}
                Err(e) => tracing::warn!("Session purge failed: {}", e),
            }
            match ctx.tokens.purge_expired().await {
                Ok(n) if n > 0 => info!("Purged {} expired tokens", n),
                Ok(_) => {}
                Err(e) => tracing::warn!("Token purge failed: {}", e),
            }
        }
    });
}

/// Bind and serve until shutdown
pub async fn serve(ctx: AppContext) -> ApiResult<()> {
    let addr = format!(
        "{}:{}",
        ctx.config.service.hostname, ctx.config.service.port
    );

    spawn_purge_task(ctx.clone());
    let router = build_router(ctx);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, router).await?;

    Ok(())
}
