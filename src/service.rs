//! Credential service: register and login against the durable store, plus
//! token verification and profile fetch for authenticated callers.
//! Password hashing is CPU-bound, so it runs under `spawn_blocking` and
//! never stalls unrelated requests.

use chrono::Utc;
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::error::{AppError, AppResult};
use crate::policy;
use crate::store::{hash_password, verify_password, Account, CredentialStore, UserProfile};
use crate::token;

/// Single message for both the unknown-email and wrong-password cases so the
/// response does not leak whether an account exists.
const INVALID_CREDENTIALS: &str = "Invalid email or password";

#[derive(Debug, Clone)]
pub struct LoginSuccess {
    pub token: String,
    pub user: UserProfile,
}

#[derive(Clone)]
pub struct CredentialService {
    store: CredentialStore,
    jwt_secret: String,
    admin_domain: String,
}

impl CredentialService {
    pub fn new(store: CredentialStore, config: &ServerConfig) -> Self {
        Self {
            store,
            jwt_secret: config.jwt_secret.clone(),
            admin_domain: config.admin_domain.clone(),
        }
    }

    pub fn store(&self) -> &CredentialStore { &self.store }

    /// Create an account. The role is derived server-side from the email
    /// domain; the server record is the sole role authority.
    pub async fn register(&self, name: &str, email: &str, password: &str, mobile: &str) -> AppResult<()> {
        if name.is_empty() || email.is_empty() || password.is_empty() || mobile.is_empty() {
            return Err(AppError::user("missing_fields", "All fields are required"));
        }
        if self.store.find_by_email(email).is_some() {
            return Err(AppError::conflict("email_exists", "Email already exists"));
        }
        let pw = password.to_string();
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&pw))
            .await
            .map_err(|e| AppError::internal("hash_task_failed".into(), e.to_string()))?
            .map_err(|e| AppError::internal("hash_failed".into(), e.to_string()))?;
        let account = Account {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            password_hash,
            mobile: Some(mobile.to_string()),
            role: policy::derive_role(email, &self.admin_domain),
            created_at: Utc::now(),
        };
        // Store insert re-checks uniqueness under its write lock; a racing
        // duplicate register loses there.
        self.store.insert(account)
    }

    /// Verify credentials and issue a one-hour session token.
    pub async fn login(&self, email: &str, password: &str) -> AppResult<LoginSuccess> {
        if email.is_empty() || password.is_empty() {
            return Err(AppError::user("missing_fields", "Email and password are required"));
        }
        let Some(account) = self.store.find_by_email(email) else {
            return Err(AppError::auth("invalid_credentials", INVALID_CREDENTIALS));
        };
        let hash = account.password_hash.clone();
        let pw = password.to_string();
        let matched = tokio::task::spawn_blocking(move || verify_password(&hash, &pw))
            .await
            .map_err(|e| AppError::internal("hash_task_failed".into(), e.to_string()))?;
        if !matched {
            return Err(AppError::auth("invalid_credentials", INVALID_CREDENTIALS));
        }
        let token = token::issue(&self.jwt_secret, account.id, &account.email)?;
        Ok(LoginSuccess { token, user: account.profile() })
    }

    /// Validate a bearer token and return the current projection of the
    /// account it binds to. Used by client startup re-validation.
    pub fn verify(&self, bearer: &str) -> AppResult<UserProfile> {
        let claims = token::verify(&self.jwt_secret, bearer)?;
        let id = claims.account_id()?;
        self.store
            .find_by_id(id)
            .map(|a| a.profile())
            .ok_or_else(|| AppError::token_invalid("token_invalid", "Invalid or expired token"))
    }

    /// Bearer-guarded profile fetch for `refresh_user`.
    pub fn get_user(&self, bearer: &str, id: Uuid) -> AppResult<UserProfile> {
        let _claims = token::verify(&self.jwt_secret, bearer)?;
        self.store
            .find_by_id(id)
            .map(|a| a.profile())
            .ok_or_else(|| AppError::not_found("user_not_found", "User not found"))
    }
}
