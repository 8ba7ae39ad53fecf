/// Access guard: authentication extractors and role gate
///
/// The session secret is taken from the session cookie first, with a
/// bearer-header fallback for non-browser clients. Both transports are
/// validated through the identical hash-lookup path.
use crate::{
    context::AppContext,
    db::models::{Account, Role},
    error::ApiError,
    session::{Identity, SESSION_COOKIE},
    utils::get_cookie,
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts, http::HeaderMap};

/// Pull the raw session secret out of the request, cookie before bearer
pub fn extract_session_secret(headers: &HeaderMap) -> Option<String> {
    get_cookie(headers, SESSION_COOKIE).or_else(|| extract_bearer_token(headers))
}

/// Extract bearer token from the Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

/// Authenticated context: fails closed with 401 when identity is mandatory
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub account_id: String,
    pub session_id: String,
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let secret = extract_session_secret(&parts.headers)
            .ok_or_else(|| ApiError::Auth("Missing session credential".to_string()))?;

        let Identity {
            account_id,
            session_id,
        } = state
            .sessions
            .validate(&secret)
            .await?
            .ok_or_else(|| ApiError::Auth("Invalid or expired session".to_string()))?;

        Ok(AuthContext {
            account_id,
            session_id,
        })
    }
}

/// Admin context: resolves the account and fails with 403 on role mismatch
#[derive(Debug, Clone)]
pub struct AdminContext {
    pub account: Account,
    pub session_id: String,
}

#[async_trait]
impl FromRequestParts<AppContext> for AdminContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let auth = AuthContext::from_request_parts(parts, state).await?;

        let account = state
            .accounts
            .find_by_id(&auth.account_id)
            .await?
            .ok_or_else(|| ApiError::Auth("Invalid or expired session".to_string()))?;

        if account.role != Role::Admin {
            return Err(ApiError::Forbidden("Admin role required".to_string()));
        }

        Ok(AdminContext {
            account,
            session_id: auth.session_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::{AUTHORIZATION, COOKIE};

    #[test]
    fn bearer_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Bearer abc.def".parse().unwrap());
        assert_eq!(extract_bearer_token(&headers).as_deref(), Some("abc.def"));

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Basic dXNlcg==".parse().unwrap());
        assert_eq!(extract_bearer_token(&headers), None);
    }

    #[test]
    fn cookie_takes_precedence_over_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, "vitrine_session=from-cookie".parse().unwrap());
        headers.insert(AUTHORIZATION, "Bearer from-header".parse().unwrap());
        assert_eq!(
            extract_session_secret(&headers).as_deref(),
            Some("from-cookie")
        );
    }

    #[test]
    fn bearer_fallback_when_no_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Bearer from-header".parse().unwrap());
        assert_eq!(
            extract_session_secret(&headers).as_deref(),
            Some("from-header")
        );
    }
}
