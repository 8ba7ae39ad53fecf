/// Account manager: CRUD over the accounts table plus password hashing.
///
/// Uses sqlx runtime queries; uniqueness is enforced by the database
/// constraint on `email`, not by a prior existence check.
use crate::{
    db::models::{Account, Role},
    error::{ApiError, ApiResult},
};
use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;

/// Lowercase/trim an email before any lookup or insert
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Hash a password with Argon2id and a fresh random salt
pub fn hash_password(password: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(format!("Password hashing failed: {}", e)))
}

/// Verify a password against a stored PHC hash string.
/// A malformed stored hash yields `false`, never an error.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    PasswordHash::new(stored_hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// Credential store service
#[derive(Clone)]
pub struct AccountManager {
    db: SqlitePool,
}

impl AccountManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Create a new account with `role = guest`.
    ///
    /// `password_hash` is `None` for OAuth-origin accounts; `verified`
    /// stamps `email_verified_at` immediately (the provider has already
    /// verified the address).
    pub async fn create_account(
        &self,
        email: &str,
        password_hash: Option<String>,
        name: Option<String>,
        verified: bool,
    ) -> ApiResult<Account> {
        let email = normalize_email(email);
        validate_email(&email)?;

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let verified_at = verified.then_some(now);

        sqlx::query(
            "INSERT INTO accounts (id, email, name, password_hash, email_verified_at, role, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(&id)
        .bind(&email)
        .bind(&name)
        .bind(&password_hash)
        .bind(verified_at)
        .bind(Role::Guest.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.db)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                ApiError::Conflict("Email already registered".to_string())
            }
            _ => ApiError::Database(e),
        })?;

        Ok(Account {
            id,
            email,
            name,
            password_hash,
            email_verified_at: verified_at,
            role: Role::Guest,
            created_at: now,
            updated_at: now,
        })
    }

    /// Find-or-create for OAuth callbacks: a single constraint-backed upsert
    /// so concurrent duplicate callbacks cannot create two accounts.
    /// A created account is email-verified with no password hash.
    pub async fn find_or_create_verified(
        &self,
        email: &str,
        name: Option<String>,
    ) -> ApiResult<Account> {
        let email = normalize_email(email);
        validate_email(&email)?;

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let row = sqlx::query(
            "INSERT INTO accounts (id, email, name, password_hash, email_verified_at, role, created_at, updated_at)
             VALUES (?1, ?2, ?3, NULL, ?4, ?5, ?6, ?7)
             ON CONFLICT(email) DO UPDATE SET email = excluded.email
             RETURNING id, email, name, password_hash, email_verified_at, role, created_at, updated_at",
        )
        .bind(&id)
        .bind(&email)
        .bind(&name)
        .bind(now)
        .bind(Role::Guest.as_str())
        .bind(now)
        .bind(now)
        .fetch_one(&self.db)
        .await
        .map_err(ApiError::Database)?;

        map_account(&row)
    }

    pub async fn find_by_email(&self, email: &str) -> ApiResult<Option<Account>> {
        let email = normalize_email(email);
        let row = sqlx::query(
            "SELECT id, email, name, password_hash, email_verified_at, role, created_at, updated_at
             FROM accounts WHERE email = ?1",
        )
        .bind(&email)
        .fetch_optional(&self.db)
        .await
        .map_err(ApiError::Database)?;

        row.as_ref().map(map_account).transpose()
    }

    pub async fn find_by_id(&self, id: &str) -> ApiResult<Option<Account>> {
        let row = sqlx::query(
            "SELECT id, email, name, password_hash, email_verified_at, role, created_at, updated_at
             FROM accounts WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .map_err(ApiError::Database)?;

        row.as_ref().map(map_account).transpose()
    }

    /// Persist a new password hash
    pub async fn set_password_hash(&self, id: &str, password_hash: &str) -> ApiResult<()> {
        sqlx::query("UPDATE accounts SET password_hash = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(password_hash)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(ApiError::Database)?;

        Ok(())
    }

    /// Stamp `email_verified_at` once; already-verified accounts keep the
    /// original timestamp.
    pub async fn mark_email_verified(&self, id: &str) -> ApiResult<()> {
        sqlx::query(
            "UPDATE accounts SET email_verified_at = ?1, updated_at = ?1
             WHERE id = ?2 AND email_verified_at IS NULL",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.db)
        .await
        .map_err(ApiError::Database)?;

        Ok(())
    }

    pub async fn promote_to_admin(&self, id: &str) -> ApiResult<()> {
        sqlx::query("UPDATE accounts SET role = 'admin', updated_at = ?1 WHERE id = ?2")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(ApiError::Database)?;

        Ok(())
    }

    /// Demote an admin to guest, refusing to remove the last admin.
    ///
    /// The admin-count check runs inside the same UPDATE statement, so two
    /// concurrent demotions cannot both read a stale count. Returns `false`
    /// when the guard rejected the demotion (or the target was not an admin).
    pub async fn demote_admin_guarded(&self, id: &str) -> ApiResult<bool> {
        let result = sqlx::query(
            "UPDATE accounts SET role = 'guest', updated_at = ?1
             WHERE id = ?2 AND role = 'admin'
               AND (SELECT COUNT(*) FROM accounts WHERE role = 'admin') >= 2",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.db)
        .await
        .map_err(ApiError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete an account, cascading to its sessions, tokens and OAuth links.
    /// Deleting the last remaining admin is rejected by the same in-statement
    /// guard as demotion. Returns `false` when nothing was deleted.
    pub async fn delete_account_guarded(&self, id: &str) -> ApiResult<bool> {
        let result = sqlx::query(
            "DELETE FROM accounts
             WHERE id = ?1
               AND (role = 'guest'
                    OR (SELECT COUNT(*) FROM accounts WHERE role = 'admin') >= 2)",
        )
        .bind(id)
        .execute(&self.db)
        .await
        .map_err(ApiError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn count_admins(&self) -> ApiResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM accounts WHERE role = 'admin'")
            .fetch_one(&self.db)
            .await
            .map_err(ApiError::Database)?;

        Ok(row.try_get("n")?)
    }

    pub async fn list_accounts(&self) -> ApiResult<Vec<Account>> {
        let rows = sqlx::query(
            "SELECT id, email, name, password_hash, email_verified_at, role, created_at, updated_at
             FROM accounts ORDER BY created_at ASC",
        )
        .fetch_all(&self.db)
        .await
        .map_err(ApiError::Database)?;

        rows.iter().map(map_account).collect()
    }
}

fn map_account(row: &SqliteRow) -> ApiResult<Account> {
    let role: String = row.try_get("role")?;
    Ok(Account {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        password_hash: row.try_get("password_hash")?,
        email_verified_at: row.try_get("email_verified_at")?,
        role: Role::from_str(&role)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Minimal shape check; real deliverability is proven by the verification
/// email, not by parsing.
fn validate_email(email: &str) -> ApiResult<()> {
    let valid = email.len() <= 254
        && email
            .split_once('@')
            .map(|(local, domain)| !local.is_empty() && domain.contains('.'))
            .unwrap_or(false);

    if valid {
        Ok(())
    } else {
        Err(ApiError::Validation("Invalid email address".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_normalization() {
        assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn email_shape_check() {
        assert!(validate_email("alice@example.com").is_ok());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("alice@nodot").is_err());
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("Passw0rd!").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("Passw0rd!", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn malformed_stored_hash_verifies_false() {
        assert!(!verify_password("anything", "not-a-phc-string"));
        assert!(!verify_password("anything", ""));
    }

    #[test]
    fn hashes_are_salted_per_call() {
        let a = hash_password("same").unwrap();
        let b = hash_password("same").unwrap();
        assert_ne!(a, b);
    }
}
