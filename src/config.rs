/// Configuration management for the Vitrine auth service
use crate::error::{ApiError, ApiResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub email: Option<EmailConfig>,
    pub oauth: Option<OAuthConfig>,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    /// Base URL of the frontend application; used to build verification and
    /// reset links and as the post-OAuth redirect target.
    pub frontend_url: String,
    /// Mark session cookies `Secure` (on in production deployments)
    pub secure_cookies: bool,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub auth_db: PathBuf,
}

/// Email (SMTP) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_url: String,
    pub from_address: String,
}

/// OAuth provider configuration (Google, authorization-code grant).
/// Absent client credentials disable the federation endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
}

/// Rate limiting configuration for verification resends
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub resend_max: u32,
    pub resend_window_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> ApiResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("VITRINE_HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let port = env::var("VITRINE_PORT")
            .unwrap_or_else(|_| "4000".to_string())
            .parse()
            .map_err(|_| ApiError::Validation("Invalid port number".to_string()))?;

        let frontend_url = env::var("VITRINE_FRONTEND_URL")
            .unwrap_or_else(|_| format!("http://{}:3000", hostname));
        let secure_cookies = env::var("VITRINE_SECURE_COOKIES")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .unwrap_or(false);

        let data_directory: PathBuf = env::var("VITRINE_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let auth_db = env::var("VITRINE_AUTH_DB_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("auth.sqlite"));

        let email = if let Ok(smtp_url) = env::var("VITRINE_EMAIL_SMTP_URL") {
            Some(EmailConfig {
                smtp_url,
                from_address: env::var("VITRINE_EMAIL_FROM_ADDRESS")
                    .unwrap_or_else(|_| format!("noreply@{}", hostname)),
            })
        } else {
            None
        };

        // Both client id and secret must be present for federation to be enabled
        let oauth = match (
            env::var("VITRINE_OAUTH_GOOGLE_CLIENT_ID"),
            env::var("VITRINE_OAUTH_GOOGLE_CLIENT_SECRET"),
        ) {
            (Ok(client_id), Ok(client_secret)) => Some(OAuthConfig {
                client_id,
                client_secret,
                redirect_uri: env::var("VITRINE_OAUTH_REDIRECT_URI").unwrap_or_else(|_| {
                    format!("http://{}:{}/api/oauth/google/callback", hostname, port)
                }),
                auth_url: env::var("VITRINE_OAUTH_AUTH_URL").unwrap_or_else(|_| {
                    "https://accounts.google.com/o/oauth2/v2/auth".to_string()
                }),
                token_url: env::var("VITRINE_OAUTH_TOKEN_URL")
                    .unwrap_or_else(|_| "https://oauth2.googleapis.com/token".to_string()),
                userinfo_url: env::var("VITRINE_OAUTH_USERINFO_URL").unwrap_or_else(|_| {
                    "https://openidconnect.googleapis.com/v1/userinfo".to_string()
                }),
            }),
            _ => None,
        };

        let resend_max = env::var("VITRINE_RESEND_LIMIT")
            .unwrap_or_else(|_| "5".to_string())
            .parse()
            .unwrap_or(5);
        let resend_window_secs = env::var("VITRINE_RESEND_WINDOW_SECS")
            .unwrap_or_else(|_| "600".to_string())
            .parse()
            .unwrap_or(600);

        let level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                frontend_url,
                secure_cookies,
            },
            storage: StorageConfig {
                data_directory,
                auth_db,
            },
            email,
            oauth,
            rate_limit: RateLimitConfig {
                resend_max,
                resend_window_secs,
            },
            logging: LoggingConfig { level },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> ApiResult<()> {
        if self.service.hostname.is_empty() {
            return Err(ApiError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.service.frontend_url.is_empty() {
            return Err(ApiError::Validation(
                "Frontend URL cannot be empty".to_string(),
            ));
        }

        if let Some(ref oauth) = self.oauth {
            if oauth.redirect_uri.is_empty() {
                return Err(ApiError::Validation(
                    "OAuth redirect URI cannot be empty".to_string(),
                ));
            }
        }

        if self.rate_limit.resend_max == 0 || self.rate_limit.resend_window_secs == 0 {
            return Err(ApiError::Validation(
                "Resend rate limit must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> ServerConfig {
        ServerConfig {
            service: ServiceConfig {
                hostname: "localhost".into(),
                port: 4000,
                frontend_url: "http://localhost:3000".into(),
                secure_cookies: false,
            },
            storage: StorageConfig {
                data_directory: "./data".into(),
                auth_db: "./data/auth.sqlite".into(),
            },
            email: None,
            oauth: None,
            rate_limit: RateLimitConfig {
                resend_max: 5,
                resend_window_secs: 600,
            },
            logging: LoggingConfig {
                level: "info".into(),
            },
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn empty_frontend_url_rejected() {
        let mut config = base_config();
        config.service.frontend_url = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_rate_limit_rejected() {
        let mut config = base_config();
        config.rate_limit.resend_max = 0;
        assert!(config.validate().is_err());
    }
}
