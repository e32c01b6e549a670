//! Durable credential store.
//! Accounts live in a single JSON document under the store root, guarded by
//! an RwLock and rewritten atomically (tmp file + rename). Exactly one
//! account may exist per email; the check-and-insert happens under the write
//! lock so duplicate registrations lose to the uniqueness invariant rather
//! than to timing.

use anyhow::{anyhow, Context, Result};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use password_hash::{PasswordHash, SaltString};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::policy::Role;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    /// PHC-format argon2 hash. Never leaves the server; clients only ever
    /// see the `UserProfile` projection.
    pub password_hash: String,
    pub mobile: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Display-safe projection of an Account: everything except the hash.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub mobile: Option<String>,
    pub role: Role,
}

impl Account {
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            mobile: self.mobile.clone(),
            role: self.role,
        }
    }
}

pub fn hash_password(password: &str) -> Result<String> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let argon2 = Argon2::default();
    let phc = argon2.hash_password(password.as_bytes(), &salt).map_err(|e| anyhow!(e.to_string()))?.to_string();
    Ok(phc)
}

pub fn verify_password(hash: &str, password: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(hash) {
        let argon2 = Argon2::default();
        argon2.verify_password(password.as_bytes(), &parsed).is_ok()
    } else { false }
}

fn accounts_path(db_root: &str) -> PathBuf { Path::new(db_root).join("accounts.json") }

fn read_accounts(path: &Path) -> Result<Vec<Account>> {
    if !path.exists() { return Ok(Vec::new()); }
    let bytes = std::fs::read(path)
        .with_context(|| format!("reading account store at {}", path.display()))?;
    let accounts: Vec<Account> = serde_json::from_slice(&bytes)
        .with_context(|| format!("parsing account store at {}", path.display()))?;
    Ok(accounts)
}

fn write_accounts(path: &Path, accounts: &[Account]) -> Result<()> {
    if let Some(dir) = path.parent() { std::fs::create_dir_all(dir).ok(); }
    let tmp = path.with_extension("json.tmp");
    let bytes = serde_json::to_vec_pretty(accounts)?;
    std::fs::write(&tmp, bytes)
        .with_context(|| format!("writing account store at {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("replacing account store at {}", path.display()))?;
    Ok(())
}

/// Shared handle to the on-disk account table.
#[derive(Clone)]
pub struct CredentialStore {
    path: PathBuf,
    accounts: Arc<RwLock<Vec<Account>>>,
}

impl CredentialStore {
    pub fn open(db_root: &str) -> Result<Self> {
        std::fs::create_dir_all(db_root)
            .with_context(|| format!("creating store root {}", db_root))?;
        let path = accounts_path(db_root);
        let accounts = read_accounts(&path)?;
        Ok(Self { path, accounts: Arc::new(RwLock::new(accounts)) })
    }

    /// Email is the case-sensitive lookup key.
    pub fn find_by_email(&self, email: &str) -> Option<Account> {
        self.accounts.read().iter().find(|a| a.email == email).cloned()
    }

    pub fn find_by_id(&self, id: Uuid) -> Option<Account> {
        self.accounts.read().iter().find(|a| a.id == id).cloned()
    }

    /// Insert a new account. The uniqueness check and the durable write both
    /// happen under the write lock, so concurrent duplicate registrations
    /// cannot interleave past the invariant.
    pub fn insert(&self, account: Account) -> AppResult<()> {
        let mut accounts = self.accounts.write();
        if accounts.iter().any(|a| a.email == account.email) {
            return Err(AppError::conflict("email_exists", "Email already exists"));
        }
        accounts.push(account);
        if let Err(e) = write_accounts(&self.path, &accounts) {
            // Roll back the in-memory row so memory and disk stay in step.
            accounts.pop();
            return Err(AppError::internal("store_write_failed".into(), e.to_string()));
        }
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.accounts.read().len()
    }
}
