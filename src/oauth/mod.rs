/// OAuth federation flow (authorization-code grant)
///
/// Exchanges a provider authorization code for an access token over a
/// direct server-to-server call, then fetches the userinfo profile.
/// Identity claims come solely from the authenticated userinfo endpoint;
/// the provider's ID token is never decoded.

mod store;

pub use store::OAuthLinkStore;

use crate::{
    config::OAuthConfig,
    error::{ApiError, ApiResult},
};
use serde::Deserialize;
use std::time::Duration;

/// Short-lived cookies carrying the CSRF state and nonce while the
/// browser round-trips through the provider.
pub const STATE_COOKIE: &str = "oauth_state";
pub const NONCE_COOKIE: &str = "oauth_nonce";
pub const OAUTH_COOKIE_TTL_SECS: i64 = 600;

/// Provider name recorded on link rows
pub const PROVIDER_GOOGLE: &str = "google";

const OUTBOUND_TIMEOUT: Duration = Duration::from_secs(10);

/// Token endpoint response. `expires_in` is seconds from now.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderTokens {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// Userinfo profile. `sub` is the stable provider-scoped subject; the
/// flow refuses to proceed unless both `sub` and `email` are present.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderProfile {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: Option<bool>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Server-to-server client for one OAuth provider
#[derive(Clone)]
pub struct OAuthClient {
    config: OAuthConfig,
    http: reqwest::Client,
}

impl OAuthClient {
    pub fn new(config: OAuthConfig) -> ApiResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(OUTBOUND_TIMEOUT)
            .build()
            .map_err(|e| ApiError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { config, http })
    }

    /// Provider authorization URL carrying state, nonce, scopes and the
    /// fixed redirect URI.
    pub fn authorize_url(&self, state: &str, nonce: &str) -> String {
        format!(
            "{}?response_type=code&client_id={}&redirect_uri={}&scope={}&state={}&nonce={}&access_type=offline",
            self.config.auth_url,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode("openid email profile"),
            urlencoding::encode(state),
            urlencoding::encode(nonce),
        )
    }

    /// Exchange the authorization code for tokens. Never routed through
    /// the browser.
    pub async fn exchange_code(&self, code: &str) -> ApiResult<ProviderTokens> {
        let response = self
            .http
            .post(&self.config.token_url)
            .form(&[
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| ApiError::Auth(format!("OAuth token exchange failed: {}", e)))?;

        if !response.status().is_success() {
            tracing::warn!("OAuth token exchange returned {}", response.status());
            return Err(ApiError::Auth("OAuth token exchange failed".to_string()));
        }

        response
            .json::<ProviderTokens>()
            .await
            .map_err(|e| ApiError::Auth(format!("Malformed token response: {}", e)))
    }

    /// Fetch the provider's userinfo profile with the access token
    pub async fn fetch_userinfo(&self, access_token: &str) -> ApiResult<ProviderProfile> {
        let response = self
            .http
            .get(&self.config.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| ApiError::Validation(format!("Userinfo fetch failed: {}", e)))?;

        if !response.status().is_success() {
            tracing::warn!("Userinfo fetch returned {}", response.status());
            return Err(ApiError::Validation("Userinfo fetch failed".to_string()));
        }

        response
            .json::<ProviderProfile>()
            .await
            .map_err(|e| ApiError::Validation(format!("Malformed userinfo response: {}", e)))
    }
}
