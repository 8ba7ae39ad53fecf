/// Admin account management
///
/// All handlers require an admin session. The "last admin" invariants are
/// enforced inside the mutating SQL statements (see AccountManager), so
/// concurrent demotions cannot both pass a stale admin count.
use crate::{
    account::UserView,
    auth::AdminContext,
    context::AppContext,
    db::models::Role,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, State},
    routing::{delete, get, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

/// Build admin routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/admin/users", get(list_users))
        .route("/api/admin/users/:id/role", put(change_role))
        .route("/api/admin/users/:id", delete(delete_user))
}

#[derive(Debug, Deserialize)]
struct ChangeRoleRequest {
    role: String,
}

async fn list_users(
    State(ctx): State<AppContext>,
    _admin: AdminContext,
) -> ApiResult<Json<serde_json::Value>> {
    let accounts = ctx.accounts.list_accounts().await?;
    let users: Vec<UserView> = accounts.iter().map(UserView::from).collect();

    Ok(Json(json!({ "users": users })))
}

async fn change_role(
    State(ctx): State<AppContext>,
    _admin: AdminContext,
    Path(id): Path<String>,
    Json(req): Json<ChangeRoleRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let new_role = Role::from_str(&req.role)?;

    let target = ctx
        .accounts
        .find_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Account not found".to_string()))?;

    if target.role != new_role {
        match new_role {
            Role::Admin => ctx.accounts.promote_to_admin(&id).await?,
            Role::Guest => {
                // Covers self-demotion too: the guard refuses whenever the
                // demotion would leave zero admins.
                if !ctx.accounts.demote_admin_guarded(&id).await? {
                    return Err(ApiError::Forbidden(
                        "Cannot demote the last remaining admin".to_string(),
                    ));
                }
            }
        }
    }

    let updated = ctx
        .accounts
        .find_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Account not found".to_string()))?;

    Ok(Json(json!({ "user": UserView::from(&updated) })))
}

async fn delete_user(
    State(ctx): State<AppContext>,
    admin: AdminContext,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    if admin.account.id == id {
        return Err(ApiError::Forbidden(
            "Cannot delete your own account here".to_string(),
        ));
    }

    let target = ctx
        .accounts
        .find_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Account not found".to_string()))?;

    if !ctx.accounts.delete_account_guarded(&target.id).await? {
        return Err(ApiError::Forbidden(
            "Cannot delete the last remaining admin".to_string(),
        ));
    }

    tracing::info!(account_id = %target.id, deleted_by = %admin.account.id, "Account deleted");

    Ok(Json(json!({ "success": true })))
}
