/// Application context and dependency injection
use crate::{
    account::AccountManager,
    config::ServerConfig,
    db,
    error::ApiResult,
    mailer::Mailer,
    oauth::{OAuthClient, OAuthLinkStore},
    rate_limit::ResendLimiter,
    session::SessionManager,
    token::TokenLedger,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub accounts: Arc<AccountManager>,
    pub sessions: Arc<SessionManager>,
    pub tokens: Arc<TokenLedger>,
    pub oauth_links: Arc<OAuthLinkStore>,
    /// Absent when provider credentials are not configured; the
    /// federation endpoints then answer 500 "not configured".
    pub oauth: Option<Arc<OAuthClient>>,
    pub mailer: Arc<Mailer>,
    pub resend_limiter: Arc<ResendLimiter>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> ApiResult<Self> {
        config.validate()?;

        let pool = db::create_pool(&config.storage.auth_db, db::DatabaseOptions::default()).await?;
        db::run_migrations(&pool).await?;
        db::test_connection(&pool).await?;

        let oauth = match config.oauth.clone() {
            Some(oauth_config) => Some(Arc::new(OAuthClient::new(oauth_config)?)),
            None => {
                tracing::info!("OAuth credentials not configured, federation endpoints disabled");
                None
            }
        };

        let mailer = Arc::new(Mailer::new(config.email.clone())?);
        if !mailer.is_configured() {
            tracing::info!("SMTP not configured, outbound email will be skipped");
        }

        let resend_limiter = Arc::new(ResendLimiter::new(
            config.rate_limit.resend_max,
            Duration::from_secs(config.rate_limit.resend_window_secs),
        ));

        Ok(Self {
            config: Arc::new(config),
            accounts: Arc::new(AccountManager::new(pool.clone())),
            sessions: Arc::new(SessionManager::new(pool.clone())),
            tokens: Arc::new(TokenLedger::new(pool.clone())),
            oauth_links: Arc::new(OAuthLinkStore::new(pool.clone())),
            db: pool,
            oauth,
            mailer,
            resend_limiter,
        })
    }

    /// Frontend base URL used in email links and post-OAuth redirects
    pub fn frontend_url(&self) -> &str {
        &self.config.service.frontend_url
    }

    /// Whether cookies should carry the `Secure` attribute
    pub fn secure_cookies(&self) -> bool {
        self.config.service.secure_cookies
    }
}
