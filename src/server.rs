//! steelauth HTTP server
//! ---------------------
//! Axum-based HTTP API for the credential service.
//!
//! Responsibilities:
//! - Register/login endpoints backed by the `service` module.
//! - Bearer-token verification endpoint used by client startup re-validation.
//! - Bearer-guarded profile fetch for client-side refresh.
//! - Mapping `AppError` categories onto the `{message}` / `{message, error}`
//!   response bodies, without leaking store internals.

use std::net::SocketAddr;

use axum::{routing::{get, post}, Router, extract::{Path, State}, Json};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::error::AppError;
use crate::service::CredentialService;
use crate::store::CredentialStore;

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: CredentialService,
}

/// Build the API router. Exposed separately from `run` so tests can mount it
/// on an ephemeral listener.
pub fn router(service: CredentialService) -> Router {
    Router::new()
        .route("/", get(|| async { "steelauth ok" }))
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/verify", get(verify))
        .route("/api/users/{id}", get(get_user))
        .with_state(AppState { service })
}

/// Start the HTTP server bound to the configured port.
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let store = CredentialStore::open(&config.db_root)?;
    info!(
        target: "startup",
        "steelauth starting: http_port={}, db_root='{}', admin_domain='{}', accounts={}",
        config.http_port, config.db_root, config.admin_domain, store.count()
    );
    let service = CredentialService::new(store, &config);
    let app = router(service);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Debug, Deserialize)]
struct RegisterPayload {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    mobile: String,
}

#[derive(Debug, Deserialize)]
struct LoginPayload {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let v = headers.get("authorization").or_else(|| headers.get("Authorization"))?;
    let s = v.to_str().ok()?;
    let rest = s.strip_prefix("Bearer ").or_else(|| s.strip_prefix("bearer "))?;
    Some(rest.trim().to_string())
}

/// Render an AppError as its HTTP response. Internal failures get a fixed
/// short message plus an `error` code; everything else carries its own
/// category message.
fn error_response(op: &str, e: &AppError) -> (StatusCode, Json<serde_json::Value>) {
    let status = StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    match e {
        AppError::Internal { .. } | AppError::Io { .. } => {
            error!("{op} failed: {e}");
            (status, Json(json!({"message": "Server error", "error": e.code_str()})))
        }
        _ => (status, Json(json!({"message": e.message()}))),
    }
}

async fn register(State(state): State<AppState>, Json(payload): Json<RegisterPayload>) -> impl IntoResponse {
    match state.service.register(&payload.name, &payload.email, &payload.password, &payload.mobile).await {
        Ok(()) => {
            info!("account registered email={}", payload.email);
            (StatusCode::CREATED, Json(json!({"message": "User registered successfully"})))
        }
        Err(e) => error_response("register", &e),
    }
}

async fn login(State(state): State<AppState>, Json(payload): Json<LoginPayload>) -> impl IntoResponse {
    match state.service.login(&payload.email, &payload.password).await {
        Ok(ok) => (
            StatusCode::OK,
            Json(json!({"message": "Login successful", "user": ok.user, "token": ok.token})),
        ),
        Err(e) => error_response("login", &e),
    }
}

async fn verify(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let Some(bearer) = bearer_token(&headers) else {
        return (StatusCode::UNAUTHORIZED, Json(json!({"message": "Missing bearer token"})));
    };
    match state.service.verify(&bearer) {
        Ok(user) => (StatusCode::OK, Json(json!({"message": "Token valid", "user": user}))),
        Err(e) => error_response("verify", &e),
    }
}

async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> axum::response::Response {
    let Some(bearer) = bearer_token(&headers) else {
        return (StatusCode::UNAUTHORIZED, Json(json!({"message": "Missing bearer token"}))).into_response();
    };
    match state.service.get_user(&bearer, id) {
        Ok(user) => (StatusCode::OK, Json(user)).into_response(),
        Err(e) => error_response("get_user", &e).into_response(),
    }
}
