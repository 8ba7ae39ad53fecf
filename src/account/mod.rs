/// Credential store
///
/// Durable record of accounts: email, password hash, verification state,
/// role. Email is lowercase-normalized at every entry point.

mod manager;

pub use manager::{hash_password, normalize_email, verify_password, AccountManager};

use crate::db::models::{Account, Role};
use serde::{Deserialize, Serialize};

/// Minimal identity returned to clients. Never carries the password hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserView {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub role: Role,
    pub email_verified: bool,
}

impl From<&Account> for UserView {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id.clone(),
            email: account.email.clone(),
            name: account.name.clone(),
            role: account.role,
            email_verified: account.is_verified(),
        }
    }
}
