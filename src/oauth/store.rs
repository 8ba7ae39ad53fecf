/// Storage for federation links
///
/// `(provider, provider_user_id)` maps to exactly one account. Re-linking
/// the same provider identity updates the existing row; the uniqueness
/// constraint plus ON CONFLICT makes concurrent duplicate callbacks safe.
use crate::{
    db::models::OAuthLink,
    error::{ApiError, ApiResult},
    oauth::ProviderTokens,
};
use chrono::{Duration, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;

#[derive(Clone)]
pub struct OAuthLinkStore {
    db: SqlitePool,
}

impl OAuthLinkStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Insert-or-update the link for a provider identity in one statement.
    pub async fn upsert_link(
        &self,
        account_id: &str,
        provider: &str,
        provider_user_id: &str,
        tokens: &ProviderTokens,
    ) -> ApiResult<OAuthLink> {
        let now = Utc::now();
        let token_expires_at = tokens.expires_in.map(|secs| now + Duration::seconds(secs));

        let row = sqlx::query(
            "INSERT INTO oauth_accounts
                 (id, account_id, provider, provider_user_id, access_token, refresh_token, token_expires_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
             ON CONFLICT(provider, provider_user_id) DO UPDATE SET
                 account_id = excluded.account_id,
                 access_token = excluded.access_token,
                 refresh_token = COALESCE(excluded.refresh_token, oauth_accounts.refresh_token),
                 token_expires_at = excluded.token_expires_at,
                 updated_at = excluded.updated_at
             RETURNING id, account_id, provider, provider_user_id, access_token, refresh_token, token_expires_at, created_at, updated_at",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(account_id)
        .bind(provider)
        .bind(provider_user_id)
        .bind(&tokens.access_token)
        .bind(&tokens.refresh_token)
        .bind(token_expires_at)
        .bind(now)
        .fetch_one(&self.db)
        .await
        .map_err(ApiError::Database)?;

        map_link(&row)
    }

    pub async fn find_link(
        &self,
        provider: &str,
        provider_user_id: &str,
    ) -> ApiResult<Option<OAuthLink>> {
        let row = sqlx::query(
            "SELECT id, account_id, provider, provider_user_id, access_token, refresh_token, token_expires_at, created_at, updated_at
             FROM oauth_accounts WHERE provider = ?1 AND provider_user_id = ?2",
        )
        .bind(provider)
        .bind(provider_user_id)
        .fetch_optional(&self.db)
        .await
        .map_err(ApiError::Database)?;

        row.as_ref().map(map_link).transpose()
    }
}

fn map_link(row: &SqliteRow) -> ApiResult<OAuthLink> {
    Ok(OAuthLink {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        provider: row.try_get("provider")?,
        provider_user_id: row.try_get("provider_user_id")?,
        access_token: row.try_get("access_token")?,
        refresh_token: row.try_get("refresh_token")?,
        token_expires_at: row.try_get("token_expires_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
