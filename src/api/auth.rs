/// Password and email verification flows
use crate::{
    account::{hash_password, normalize_email, verify_password, UserView},
    auth::AuthContext,
    context::AppContext,
    db::models::{Account, TokenPurpose},
    error::{ApiError, ApiResult},
    session::{ClientMeta, SESSION_COOKIE, SESSION_TTL_SECS},
    utils::{append_cookie, clear_cookie},
};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

/// Build auth routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/register", post(register))
        .route("/api/login", post(login))
        .route("/api/logout", post(logout))
        .route("/api/me", get(me))
        .route("/api/password/forgot", post(forgot_password))
        .route("/api/password/reset", post(reset_password))
        .route("/api/password/change", post(change_password))
        .route("/api/email/verify/request", post(request_verification))
        .route("/api/email/verify/resend", post(resend_verification))
        .route("/api/email/verify", post(verify_email))
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    email: String,
    password: String,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct EmailRequest {
    email: String,
}

#[derive(Debug, Deserialize)]
struct ResetPasswordRequest {
    token: String,
    password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangePasswordRequest {
    current_password: Option<String>,
    new_password: String,
}

#[derive(Debug, Deserialize)]
struct VerifyEmailRequest {
    token: String,
}

/// Register endpoint. No session is created; the account must verify
/// its email before it can sign in.
async fn register(
    State(ctx): State<AppContext>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<Response> {
    validate_password(&req.password)?;
    let password_hash = hash_password(&req.password)?;

    let account = ctx
        .accounts
        .create_account(&req.email, Some(password_hash), req.name, false)
        .await?;

    send_verification(&ctx, &account).await;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "verificationRequired": true,
            "email": account.email,
        })),
    )
        .into_response())
}

/// Login endpoint. "No such account", "OAuth-only account" and "wrong
/// password" are indistinguishable to the caller.
async fn login(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Response> {
    let account = ctx
        .accounts
        .find_by_email(&req.email)
        .await?
        .ok_or_else(invalid_credentials)?;

    let password_hash = account
        .password_hash
        .as_deref()
        .ok_or_else(invalid_credentials)?;

    if !verify_password(&req.password, password_hash) {
        return Err(invalid_credentials());
    }

    if !account.is_verified() {
        // Correct password, unverified address: re-issue the token so the
        // original mail going astray does not lock the account out.
        send_verification(&ctx, &account).await;
        return Ok((
            StatusCode::FORBIDDEN,
            Json(json!({
                "error": "EmailVerificationRequired",
                "message": "Please verify your email address before signing in",
                "verificationRequired": true,
            })),
        )
            .into_response());
    }

    let (secret, _session) = ctx
        .sessions
        .issue(&account.id, client_meta(&headers))
        .await?;

    let mut out = HeaderMap::new();
    append_cookie(
        &mut out,
        SESSION_COOKIE,
        &secret,
        SESSION_TTL_SECS,
        ctx.secure_cookies(),
    )?;

    Ok((out, Json(json!({ "user": UserView::from(&account) }))).into_response())
}

/// Logout endpoint: revokes the session server-side and clears the cookie
async fn logout(State(ctx): State<AppContext>, auth: AuthContext) -> ApiResult<Response> {
    ctx.sessions.revoke(&auth.session_id).await?;

    let mut out = HeaderMap::new();
    clear_cookie(&mut out, SESSION_COOKIE, ctx.secure_cookies())?;

    Ok((out, Json(json!({ "success": true }))).into_response())
}

/// Current identity endpoint
async fn me(State(ctx): State<AppContext>, auth: AuthContext) -> ApiResult<Json<serde_json::Value>> {
    let account = ctx
        .accounts
        .find_by_id(&auth.account_id)
        .await?
        .ok_or_else(|| ApiError::Auth("Invalid or expired session".to_string()))?;

    Ok(Json(json!({ "user": UserView::from(&account) })))
}

/// Forgot-password endpoint. Always answers success; whether the email
/// exists is deliberately not observable.
async fn forgot_password(
    State(ctx): State<AppContext>,
    Json(req): Json<EmailRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    if let Some(account) = ctx.accounts.find_by_email(&req.email).await? {
        let token = ctx
            .tokens
            .issue(&account.id, TokenPurpose::ResetPassword)
            .await?;
        if let Err(e) = ctx
            .mailer
            .send_password_reset_email(&account.email, &token, ctx.frontend_url())
            .await
        {
            tracing::warn!("Failed to send password reset email: {}", e);
        }
    }

    Ok(Json(json!({ "success": true })))
}

/// Reset endpoint: consumes the token, sets the new password and revokes
/// every session of the account.
async fn reset_password(
    State(ctx): State<AppContext>,
    Json(req): Json<ResetPasswordRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    validate_password(&req.password)?;

    let account_id = ctx
        .tokens
        .consume(&req.token, TokenPurpose::ResetPassword)
        .await?
        .ok_or_else(|| ApiError::Validation("Invalid or expired token".to_string()))?;

    let password_hash = hash_password(&req.password)?;
    ctx.accounts
        .set_password_hash(&account_id, &password_hash)
        .await?;

    let revoked = ctx.sessions.revoke_all(&account_id).await?;
    tracing::info!(account_id = %account_id, revoked, "Password reset, sessions revoked");

    Ok(Json(json!({ "success": true })))
}

/// Change or first-time-set password for the signed-in account.
/// OAuth-origin accounts without a hash may set one without a current
/// password; everyone else must present theirs.
async fn change_password(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<ChangePasswordRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    validate_password(&req.new_password)?;

    let account = ctx
        .accounts
        .find_by_id(&auth.account_id)
        .await?
        .ok_or_else(|| ApiError::Auth("Invalid or expired session".to_string()))?;

    if let Some(existing_hash) = &account.password_hash {
        let current = req
            .current_password
            .as_deref()
            .ok_or_else(|| ApiError::Validation("Current password is required".to_string()))?;
        if !verify_password(current, existing_hash) {
            return Err(ApiError::Auth("Current password is incorrect".to_string()));
        }
    }

    let password_hash = hash_password(&req.new_password)?;
    ctx.accounts
        .set_password_hash(&account.id, &password_hash)
        .await?;

    let revoked = ctx.sessions.revoke_all(&account.id).await?;
    tracing::info!(
        account_id = %account.id,
        revoked,
        "Password changed, sessions revoked"
    );

    Ok(Json(json!({ "success": true, "signInRequired": true })))
}

/// Authenticated re-request of the verification email
async fn request_verification(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> ApiResult<Json<serde_json::Value>> {
    let account = ctx
        .accounts
        .find_by_id(&auth.account_id)
        .await?
        .ok_or_else(|| ApiError::Auth("Invalid or expired session".to_string()))?;

    if account.is_verified() {
        return Ok(Json(json!({ "success": true, "alreadyVerified": true })));
    }

    send_verification(&ctx, &account).await;
    Ok(Json(json!({ "success": true })))
}

/// Unauthenticated resend, rate-limited per email. Nonexistent addresses
/// get the same success shape as unverified ones.
async fn resend_verification(
    State(ctx): State<AppContext>,
    Json(req): Json<EmailRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let email = normalize_email(&req.email);
    ctx.resend_limiter.check(&email)?;

    match ctx.accounts.find_by_email(&email).await? {
        Some(account) if account.is_verified() => {
            Ok(Json(json!({ "success": true, "alreadyVerified": true })))
        }
        Some(account) => {
            send_verification(&ctx, &account).await;
            Ok(Json(json!({ "success": true })))
        }
        None => Ok(Json(json!({ "success": true }))),
    }
}

/// Verification endpoint: consumes the token and stamps the account.
/// A replayed token fails cleanly with 400.
async fn verify_email(
    State(ctx): State<AppContext>,
    Json(req): Json<VerifyEmailRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let account_id = ctx
        .tokens
        .consume(&req.token, TokenPurpose::VerifyEmail)
        .await?
        .ok_or_else(|| ApiError::Validation("Invalid or expired token".to_string()))?;

    ctx.accounts.mark_email_verified(&account_id).await?;

    Ok(Json(json!({
        "success": true,
        "redirect": format!("{}/login?verified=1", ctx.frontend_url()),
    })))
}

/// Issue a fresh verification token and mail it, without failing the
/// surrounding request on delivery problems.
async fn send_verification(ctx: &AppContext, account: &Account) {
    let token = match ctx.tokens.issue(&account.id, TokenPurpose::VerifyEmail).await {
        Ok(token) => token,
        Err(e) => {
            tracing::warn!("Failed to issue verification token: {}", e);
            return;
        }
    };

    if let Err(e) = ctx
        .mailer
        .send_verification_email(&account.email, &token, ctx.frontend_url())
        .await
    {
        tracing::warn!("Failed to send verification email: {}", e);
    }
}

fn client_meta(headers: &HeaderMap) -> ClientMeta {
    ClientMeta {
        user_agent: headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|h| h.to_str().ok())
            .map(|s| s.to_string()),
        ip: headers
            .get("x-forwarded-for")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.split(',').next())
            .map(|s| s.trim().to_string()),
    }
}

fn invalid_credentials() -> ApiError {
    ApiError::Auth("Invalid credentials".to_string())
}

fn validate_password(password: &str) -> ApiResult<()> {
    let len = password.chars().count();
    if !(8..=128).contains(&len) {
        return Err(ApiError::Validation(
            "Password must be between 8 and 128 characters".to_string(),
        ));
    }
    Ok(())
}
