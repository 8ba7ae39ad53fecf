/// API routes and handlers
pub mod admin;
pub mod auth;
pub mod oauth;

use crate::context::AppContext;
use axum::Router;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(auth::routes())
        .merge(oauth::routes())
        .merge(admin::routes())
}
