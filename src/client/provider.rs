//! Auth provider capability.
//! The session manager is written against `AuthProvider` and selects the
//! external fallback only when the primary credential service fails, so
//! callers never learn which path produced a session. Each session carries a
//! `ProviderKind` tag because the two paths share no token format.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::policy;
use crate::store::UserProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Primary,
    Fallback,
}

#[derive(Debug, Clone)]
pub struct ProviderSession {
    pub token: String,
    pub user: UserProfile,
    pub provider: ProviderKind,
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> AppResult<ProviderSession>;
}

/// Transport failures with no server response are distinguished from
/// responses carrying an error body; the session manager surfaces them as
/// different user-facing messages.
fn classify_transport(e: reqwest::Error) -> AppError {
    if e.is_timeout() || e.is_connect() {
        AppError::io("no_response", "No response from server")
    } else {
        AppError::internal("request_failed".into(), e.to_string())
    }
}

/// Map an error response (status + `{message}` body) back onto the error
/// taxonomy the server used to produce it.
async fn error_from_response(resp: reqwest::Response) -> AppError {
    let status = resp.status();
    let body: serde_json::Value = resp.json().await.unwrap_or_else(|_| json!({}));
    let message = body
        .get("message")
        .and_then(|m| m.as_str())
        .unwrap_or("Request failed")
        .to_string();
    match status {
        StatusCode::BAD_REQUEST => AppError::user("bad_request".into(), message),
        StatusCode::UNAUTHORIZED => AppError::auth("invalid_credentials".into(), message),
        StatusCode::NOT_FOUND => AppError::not_found("not_found".into(), message),
        StatusCode::CONFLICT => AppError::conflict("email_exists".into(), message),
        _ => AppError::internal("server_error".into(), message),
    }
}

/// Client for the primary credential service (§6 API).
#[derive(Clone)]
pub struct PrimaryProvider {
    base: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct LoginBody {
    user: UserProfile,
    token: String,
}

#[derive(Debug, Deserialize)]
struct VerifyBody {
    user: UserProfile,
}

impl PrimaryProvider {
    pub fn new(api_base: &str, client: reqwest::Client) -> Self {
        Self { base: api_base.trim_end_matches('/').to_string(), client }
    }

    pub async fn register(&self, name: &str, email: &str, password: &str, mobile: &str) -> AppResult<()> {
        let resp = self.client
            .post(format!("{}/auth/register", self.base))
            .json(&json!({"name": name, "email": email, "password": password, "mobile": mobile}))
            .send()
            .await
            .map_err(classify_transport)?;
        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }
        Ok(())
    }

    /// Startup re-validation of a stored token.
    pub async fn verify(&self, token: &str) -> AppResult<UserProfile> {
        let resp = self.client
            .get(format!("{}/auth/verify", self.base))
            .bearer_auth(token)
            .send()
            .await
            .map_err(classify_transport)?;
        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }
        let body: VerifyBody = resp.json().await
            .map_err(|e| AppError::internal("bad_payload".into(), e.to_string()))?;
        Ok(body.user)
    }

    pub async fn get_user(&self, token: &str, id: Uuid) -> AppResult<UserProfile> {
        let resp = self.client
            .get(format!("{}/users/{}", self.base, id))
            .bearer_auth(token)
            .send()
            .await
            .map_err(classify_transport)?;
        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }
        resp.json::<UserProfile>().await
            .map_err(|e| AppError::internal("bad_payload".into(), e.to_string()))
    }
}

#[async_trait]
impl AuthProvider for PrimaryProvider {
    async fn login(&self, email: &str, password: &str) -> AppResult<ProviderSession> {
        let resp = self.client
            .post(format!("{}/auth/login", self.base))
            .json(&json!({"email": email, "password": password}))
            .send()
            .await
            .map_err(classify_transport)?;
        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }
        let body: LoginBody = resp.json().await
            .map_err(|e| AppError::internal("bad_payload".into(), e.to_string()))?;
        Ok(ProviderSession { token: body.token, user: body.user, provider: ProviderKind::Primary })
    }
}

/// Independent hosted identity provider used as a best-effort secondary
/// path. Speaks the password-grant exchange; its access token shares no
/// format with the primary service and is never re-validated there.
#[derive(Clone)]
pub struct FallbackProvider {
    endpoint: String,
    api_key: String,
    admin_domain: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct FallbackUser {
    id: Uuid,
    email: String,
    #[serde(default)]
    user_metadata: serde_json::Value,
    #[serde(default)]
    phone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FallbackTokenBody {
    access_token: String,
    user: FallbackUser,
}

impl FallbackProvider {
    pub fn new(endpoint: &str, api_key: &str, admin_domain: &str, client: reqwest::Client) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            admin_domain: admin_domain.to_string(),
            client,
        }
    }
}

#[async_trait]
impl AuthProvider for FallbackProvider {
    async fn login(&self, email: &str, password: &str) -> AppResult<ProviderSession> {
        let resp = self.client
            .post(format!("{}/auth/v1/token?grant_type=password", self.endpoint))
            .header("apikey", &self.api_key)
            .json(&json!({"email": email, "password": password}))
            .send()
            .await
            .map_err(classify_transport)?;
        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }
        let body: FallbackTokenBody = resp.json().await
            .map_err(|e| AppError::internal("bad_payload".into(), e.to_string()))?;
        // The provider knows nothing of our account shape; synthesize the
        // projection from what it returns.
        let name = body.user.user_metadata
            .get("name")
            .and_then(|n| n.as_str())
            .unwrap_or_else(|| body.user.email.split('@').next().unwrap_or(""))
            .to_string();
        let user = UserProfile {
            id: body.user.id,
            name,
            email: body.user.email.clone(),
            mobile: body.user.phone.clone(),
            role: policy::derive_role(&body.user.email, &self.admin_domain),
        };
        Ok(ProviderSession { token: body.access_token, user, provider: ProviderKind::Fallback })
    }
}
