/// Token ledger
///
/// Single-use, time-boxed credentials for password reset and email
/// verification. Consumption flips `used` exactly once via a conditional
/// UPDATE, so exactly one of N concurrent submissions succeeds.
use crate::{
    db::models::TokenPurpose,
    error::{ApiError, ApiResult},
    utils::{gen_random_secret, sha256_hex},
};
use chrono::{DateTime, Duration, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Password reset tokens expire after one hour
pub const RESET_TOKEN_TTL_SECS: i64 = 3600;

/// Email verification tokens expire after 24 hours
pub const VERIFY_TOKEN_TTL_SECS: i64 = 24 * 3600;

/// Token ledger service
#[derive(Clone)]
pub struct TokenLedger {
    db: SqlitePool,
}

impl TokenLedger {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Issue a token for an account. Returns the raw secret for
    /// out-of-band delivery; only its hash is stored.
    pub async fn issue(&self, account_id: &str, purpose: TokenPurpose) -> ApiResult<String> {
        let secret = gen_random_secret(32);
        let secret_hash = sha256_hex(&secret);

        let ttl = match purpose {
            TokenPurpose::ResetPassword => RESET_TOKEN_TTL_SECS,
            TokenPurpose::VerifyEmail => VERIFY_TOKEN_TTL_SECS,
        };

        let now = Utc::now();
        sqlx::query(
            "INSERT INTO auth_tokens (id, account_id, secret_hash, purpose, expires_at, used, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, FALSE, ?6)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(account_id)
        .bind(&secret_hash)
        .bind(purpose.as_str())
        .bind(now + Duration::seconds(ttl))
        .bind(now)
        .execute(&self.db)
        .await
        .map_err(ApiError::Database)?;

        Ok(secret)
    }

    /// Consume a token: terminal, idempotent-safe transition.
    ///
    /// Returns the owning account id on the single successful consumption.
    /// Unknown, expired and replayed tokens are indistinguishable (`None`);
    /// callers report all three as "invalid or expired".
    pub async fn consume(
        &self,
        secret: &str,
        purpose: TokenPurpose,
    ) -> ApiResult<Option<String>> {
        let secret_hash = sha256_hex(secret);

        let row = sqlx::query(
            "SELECT id, account_id, expires_at FROM auth_tokens
             WHERE secret_hash = ?1 AND purpose = ?2 AND used = FALSE",
        )
        .bind(&secret_hash)
        .bind(purpose.as_str())
        .fetch_optional(&self.db)
        .await
        .map_err(ApiError::Database)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let token_id: String = row.try_get("id")?;
        let account_id: String = row.try_get("account_id")?;
        let expires_at: DateTime<Utc> = row.try_get("expires_at")?;

        if Utc::now() > expires_at {
            return Ok(None);
        }

        // The check-not-used and mark-used happen in one statement; a
        // concurrent consumer that lost the race sees zero rows affected.
        let result = sqlx::query("UPDATE auth_tokens SET used = TRUE WHERE id = ?1 AND used = FALSE")
            .bind(&token_id)
            .execute(&self.db)
            .await
            .map_err(ApiError::Database)?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        Ok(Some(account_id))
    }

    /// Delete tokens past their expiry. Logical destruction already
    /// happened; this reclaims space.
    pub async fn purge_expired(&self) -> ApiResult<u64> {
        let result = sqlx::query("DELETE FROM auth_tokens WHERE expires_at < ?1")
            .bind(Utc::now())
            .execute(&self.db)
            .await
            .map_err(ApiError::Database)?;

        Ok(result.rows_affected())
    }
}
