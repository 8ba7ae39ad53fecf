/// Session manager
///
/// Issues, validates and revokes opaque session credentials. The raw
/// secret is returned to the caller exactly once; only its SHA-256 is
/// persisted. A session is valid iff not revoked and not expired.
use crate::{
    db::models::Session,
    error::{ApiError, ApiResult},
    utils::{gen_random_secret, sha256_hex},
};
use chrono::{DateTime, Duration, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "vitrine_session";

/// Session lifetime: 7 days, matching the cookie Max-Age
pub const SESSION_TTL_SECS: i64 = 7 * 24 * 3600;

/// Client metadata captured at issue time
#[derive(Debug, Clone, Default)]
pub struct ClientMeta {
    pub user_agent: Option<String>,
    pub ip: Option<String>,
}

/// Resolved identity of a validated session
#[derive(Debug, Clone)]
pub struct Identity {
    pub account_id: String,
    pub session_id: String,
}

/// Session manager service
#[derive(Clone)]
pub struct SessionManager {
    db: SqlitePool,
}

impl SessionManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Issue a new session. Returns the raw secret for cookie/bearer
    /// transport together with the stored record.
    pub async fn issue(
        &self,
        account_id: &str,
        meta: ClientMeta,
    ) -> ApiResult<(String, Session)> {
        let secret = gen_random_secret(32);
        let secret_hash = sha256_hex(&secret);

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let expires_at = now + Duration::seconds(SESSION_TTL_SECS);

        sqlx::query(
            "INSERT INTO sessions (id, account_id, secret_hash, user_agent, ip, expires_at, revoked, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, FALSE, ?7)",
        )
        .bind(&id)
        .bind(account_id)
        .bind(&secret_hash)
        .bind(&meta.user_agent)
        .bind(&meta.ip)
        .bind(expires_at)
        .bind(now)
        .execute(&self.db)
        .await
        .map_err(ApiError::Database)?;

        let session = Session {
            id,
            account_id: account_id.to_string(),
            secret_hash,
            user_agent: meta.user_agent,
            ip: meta.ip,
            expires_at,
            revoked: false,
            created_at: now,
        };

        Ok((secret, session))
    }

    /// Resolve a presented secret to an identity.
    ///
    /// Cookie and bearer transports both land here; there is no other
    /// path from a secret to an identity.
    pub async fn validate(&self, secret: &str) -> ApiResult<Option<Identity>> {
        let secret_hash = sha256_hex(secret);

        let row = sqlx::query(
            "SELECT id, account_id, expires_at, revoked FROM sessions WHERE secret_hash = ?1",
        )
        .bind(&secret_hash)
        .fetch_optional(&self.db)
        .await
        .map_err(ApiError::Database)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let revoked: bool = row.try_get("revoked")?;
        let expires_at: DateTime<Utc> = row.try_get("expires_at")?;

        if revoked || Utc::now() > expires_at {
            return Ok(None);
        }

        Ok(Some(Identity {
            account_id: row.try_get("account_id")?,
            session_id: row.try_get("id")?,
        }))
    }

    /// Revoke one session (logout). Idempotent.
    pub async fn revoke(&self, session_id: &str) -> ApiResult<()> {
        sqlx::query("UPDATE sessions SET revoked = TRUE WHERE id = ?1")
            .bind(session_id)
            .execute(&self.db)
            .await
            .map_err(ApiError::Database)?;

        Ok(())
    }

    /// Revoke every live session of an account. Used after password
    /// change/reset so other logged-in clients must re-authenticate.
    /// Best-effort immediate: a login racing this sweep may survive
    /// until its own expiry, gated by the new password from then on.
    pub async fn revoke_all(&self, account_id: &str) -> ApiResult<u64> {
        let result =
            sqlx::query("UPDATE sessions SET revoked = TRUE WHERE account_id = ?1 AND revoked = FALSE")
                .bind(account_id)
                .execute(&self.db)
                .await
                .map_err(ApiError::Database)?;

        Ok(result.rows_affected())
    }

    /// Delete long-expired rows. Expiry alone already invalidates them;
    /// this only reclaims space.
    pub async fn purge_expired(&self) -> ApiResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at < ?1")
            .bind(Utc::now())
            .execute(&self.db)
            .await
            .map_err(ApiError::Database)?;

        Ok(result.rows_affected())
    }
}
