/// OAuth federation endpoints (Google, authorization-code grant)
///
/// `start` parks random state/nonce values in short-lived httpOnly
/// cookies and redirects to the provider. `callback` verifies the state
/// against the cookie before anything else, exchanges the code, fetches
/// userinfo, upserts account and link, and hands off to the session
/// manager.
use crate::{
    context::AppContext,
    error::{ApiError, ApiResult},
    oauth::{NONCE_COOKIE, OAUTH_COOKIE_TTL_SECS, PROVIDER_GOOGLE, STATE_COOKIE},
    session::{ClientMeta, SESSION_COOKIE, SESSION_TTL_SECS},
    utils::{append_cookie, clear_cookie, gen_random_secret, get_cookie},
};
use axum::{
    extract::{Query, State},
    http::{header::LOCATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use subtle::ConstantTimeEq;

/// Build OAuth routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/oauth/google", get(oauth_start))
        .route("/api/oauth/google/callback", get(oauth_callback))
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

async fn oauth_start(State(ctx): State<AppContext>) -> ApiResult<Response> {
    let client = ctx
        .oauth
        .as_ref()
        .ok_or_else(|| ApiError::Internal("OAuth is not configured".to_string()))?;

    let state = gen_random_secret(32);
    let nonce = gen_random_secret(32);

    let mut headers = HeaderMap::new();
    append_cookie(
        &mut headers,
        STATE_COOKIE,
        &state,
        OAUTH_COOKIE_TTL_SECS,
        ctx.secure_cookies(),
    )?;
    append_cookie(
        &mut headers,
        NONCE_COOKIE,
        &nonce,
        OAUTH_COOKIE_TTL_SECS,
        ctx.secure_cookies(),
    )?;

    let auth_url = client.authorize_url(&state, &nonce);
    headers.insert(
        LOCATION,
        auth_url
            .parse()
            .map_err(|_| ApiError::Internal("Failed to encode redirect".to_string()))?,
    );

    Ok((StatusCode::FOUND, headers).into_response())
}

async fn oauth_callback(
    State(ctx): State<AppContext>,
    request_headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> ApiResult<Response> {
    let client = ctx
        .oauth
        .as_ref()
        .ok_or_else(|| ApiError::Internal("OAuth is not configured".to_string()))?;

    if let Some(provider_error) = params.error {
        tracing::warn!("OAuth provider returned error: {}", provider_error);
        return Err(ApiError::Validation("OAuth authorization failed".to_string()));
    }

    // State check comes before touching anything else. A mismatch means the
    // callback was not initiated by a flow we started in this browser.
    let returned_state = params
        .state
        .ok_or_else(|| ApiError::Validation("Missing OAuth state".to_string()))?;
    let cookie_state = get_cookie(&request_headers, STATE_COOKIE)
        .ok_or_else(|| ApiError::Validation("Missing OAuth state cookie".to_string()))?;

    if returned_state
        .as_bytes()
        .ct_eq(cookie_state.as_bytes())
        .unwrap_u8()
        != 1
    {
        return Err(ApiError::Validation("OAuth state mismatch".to_string()));
    }

    let code = params
        .code
        .ok_or_else(|| ApiError::Validation("Missing authorization code".to_string()))?;

    let tokens = client.exchange_code(&code).await?;
    let profile = client.fetch_userinfo(&tokens.access_token).await?;

    // Never proceed on a profile without a stable subject and an email.
    let subject = profile
        .sub
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::Validation("Provider did not supply a subject".to_string()))?;
    let email = profile
        .email
        .filter(|e| !e.is_empty())
        .ok_or_else(|| ApiError::Validation("Provider did not supply an email".to_string()))?;

    if profile.email_verified == Some(false) {
        return Err(ApiError::Validation(
            "Provider reports the email address as unverified".to_string(),
        ));
    }

    let account = ctx
        .accounts
        .find_or_create_verified(&email, profile.name)
        .await?;

    ctx.oauth_links
        .upsert_link(&account.id, PROVIDER_GOOGLE, &subject, &tokens)
        .await?;

    let (secret, _session) = ctx
        .sessions
        .issue(&account.id, callback_meta(&request_headers))
        .await?;

    let mut headers = HeaderMap::new();
    append_cookie(
        &mut headers,
        SESSION_COOKIE,
        &secret,
        SESSION_TTL_SECS,
        ctx.secure_cookies(),
    )?;
    clear_cookie(&mut headers, STATE_COOKIE, ctx.secure_cookies())?;
    clear_cookie(&mut headers, NONCE_COOKIE, ctx.secure_cookies())?;
    headers.insert(
        LOCATION,
        ctx.frontend_url()
            .parse()
            .map_err(|_| ApiError::Internal("Failed to encode redirect".to_string()))?,
    );

    tracing::info!(account_id = %account.id, "OAuth login completed");

    Ok((StatusCode::FOUND, headers).into_response())
}

fn callback_meta(headers: &HeaderMap) -> ClientMeta {
    ClientMeta {
        user_agent: headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|h| h.to_str().ok())
            .map(|s| s.to_string()),
        ip: None,
    }
}
