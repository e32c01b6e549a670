//! Session token issue and verification.
//! Tokens are stateless HS256 JWTs binding an account id and email, valid
//! for one hour from issuance and verifiable only with the server-held
//! secret. Nothing is stored server-side; expiry or client discard is the
//! whole invalidation story.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Fixed token lifetime: one hour from issuance.
pub const TOKEN_TTL_SECS: i64 = 3600;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Account id.
    pub sub: String,
    pub email: String,
    /// Issued-at (Unix seconds).
    pub iat: i64,
    /// Expiry (Unix seconds).
    pub exp: i64,
}

impl Claims {
    pub fn account_id(&self) -> AppResult<Uuid> {
        Uuid::parse_str(&self.sub)
            .map_err(|_| AppError::token_invalid("token_invalid", "Invalid or expired token"))
    }
}

pub fn issue(secret: &str, account_id: Uuid, email: &str) -> AppResult<String> {
    issue_with_ttl(secret, account_id, email, TOKEN_TTL_SECS)
}

/// Issue with an explicit lifetime. Tests use this to mint already-expired
/// tokens without a mock clock.
pub fn issue_with_ttl(secret: &str, account_id: Uuid, email: &str, ttl_secs: i64) -> AppResult<String> {
    let iat = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: account_id.to_string(),
        email: email.to_string(),
        iat,
        exp: iat + ttl_secs,
    };
    encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| AppError::internal("token_sign_failed".into(), e.to_string()))
}

/// Validate signature and expiry; no leeway, so the expiry instant is hard.
pub fn verify(secret: &str, token: &str) -> AppResult<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.leeway = 0;
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|_| AppError::token_invalid("token_invalid", "Invalid or expired token"))
}
