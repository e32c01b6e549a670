//! Client session manager tests: startup restore, persistence lifecycle,
//! redirect policy, concurrency, and the external identity fallback. Each
//! test runs the real credential service on an ephemeral listener and points
//! a `SessionManager` at it.

use axum::{routing::post, Json, Router};
use serde_json::json;
use tempfile::TempDir;

use steelauth::client::{FailureKind, ProviderKind, RegisterOutcome, SessionManager, SessionStore};
use steelauth::config::{ClientConfig, ServerConfig};
use steelauth::policy;
use steelauth::service::CredentialService;
use steelauth::store::CredentialStore;

async fn spawn_server() -> (String, TempDir) {
    let tmp = TempDir::new().unwrap();
    let config = ServerConfig { db_root: tmp.path().to_str().unwrap().to_string(), ..ServerConfig::default() };
    let store = CredentialStore::open(&config.db_root).unwrap();
    let service = CredentialService::new(store, &config);
    let app = steelauth::server::router(service);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}/api", addr), tmp)
}

fn client_config(api_base: &str, storage: &TempDir) -> ClientConfig {
    ClientConfig {
        api_base: api_base.to_string(),
        storage_dir: storage.path().to_str().unwrap().to_string(),
        verify_on_startup: false,
        ..ClientConfig::default()
    }
}

#[tokio::test]
async fn register_auto_logs_in_and_admin_redirect_ignores_request() {
    let (base, _srv) = spawn_server().await;
    let storage = TempDir::new().unwrap();
    let sm = SessionManager::new(client_config(&base, &storage)).unwrap();

    let outcome = sm
        .register("A", "a@sssteelindia.com", "secret1", Some("123"))
        .await
        .unwrap();
    let RegisterOutcome::LoggedIn(user) = outcome else {
        panic!("expected auto-login after register");
    };
    assert_eq!(user.role, policy::Role::Admin);
    assert!(sm.is_authenticated());
    assert!(sm.is_admin());
    assert_eq!(sm.session_provider(), Some(ProviderKind::Primary));
    // admins never follow a caller-supplied redirect
    assert_eq!(sm.destination_after_login(Some("/cart")), policy::ADMIN_DESTINATION);
}

#[tokio::test]
async fn register_without_auto_login_requires_login_step() {
    let (base, _srv) = spawn_server().await;
    let storage = TempDir::new().unwrap();
    let mut cfg = client_config(&base, &storage);
    cfg.auto_login_after_register = false;
    let sm = SessionManager::new(cfg).unwrap();

    let outcome = sm.register("B", "b@gmail.com", "secret1", Some("123")).await.unwrap();
    assert_eq!(outcome, RegisterOutcome::LoginRequired);
    assert!(!sm.is_authenticated());

    let user = sm.login("b@gmail.com", "secret1").await.unwrap();
    assert_eq!(user.role, policy::Role::Customer);
    assert_eq!(sm.destination_after_login(Some("/cart")), "/cart");
    assert_eq!(sm.destination_after_login(None), policy::CUSTOMER_DESTINATION);
}

#[tokio::test]
async fn failed_login_leaves_prior_session_untouched() {
    let (base, _srv) = spawn_server().await;
    let storage = TempDir::new().unwrap();
    let sm = SessionManager::new(client_config(&base, &storage)).unwrap();

    sm.register("C", "c@gmail.com", "secret1", Some("123")).await.unwrap();
    assert!(sm.is_authenticated());

    let failure = sm.login("c@gmail.com", "wrongpass").await.unwrap_err();
    assert_eq!(failure.kind, FailureKind::InvalidCredentials);
    assert_eq!(failure.message, "Invalid email or password");
    // prior authenticated state survives the failure
    assert!(sm.is_authenticated());
    assert_eq!(sm.current_user().unwrap().email, "c@gmail.com");
    assert!(!sm.loading());
}

#[tokio::test]
async fn logout_clears_storage_and_initialize_stays_unauthenticated() {
    let (base, _srv) = spawn_server().await;
    let storage = TempDir::new().unwrap();
    let sm = SessionManager::new(client_config(&base, &storage)).unwrap();

    sm.register("D", "d@gmail.com", "secret1", Some("123")).await.unwrap();
    assert!(SessionStore::open(storage.path().to_str().unwrap()).unwrap().exists());

    assert_eq!(sm.logout(), policy::LOGIN_DESTINATION);
    assert!(!sm.is_authenticated());
    assert!(!SessionStore::open(storage.path().to_str().unwrap()).unwrap().exists());
    // idempotent with no active session
    assert_eq!(sm.logout(), policy::LOGIN_DESTINATION);

    let fresh = SessionManager::new(client_config(&base, &storage)).unwrap();
    fresh.initialize().await;
    assert!(!fresh.is_authenticated());
    assert!(!fresh.loading());
}

#[tokio::test]
async fn initialize_restores_persisted_session() {
    let (base, _srv) = spawn_server().await;
    let storage = TempDir::new().unwrap();
    {
        let sm = SessionManager::new(client_config(&base, &storage)).unwrap();
        sm.register("E", "e@gmail.com", "secret1", Some("123")).await.unwrap();
    }
    // a new manager over the same storage restores the session
    let mut cfg = client_config(&base, &storage);
    cfg.verify_on_startup = true;
    let sm = SessionManager::new(cfg).unwrap();
    sm.initialize().await;
    assert!(sm.is_authenticated());
    assert_eq!(sm.current_user().unwrap().email, "e@gmail.com");
}

#[tokio::test]
async fn initialize_discards_stale_token_silently() {
    let (base, _srv) = spawn_server().await;
    let storage = TempDir::new().unwrap();
    {
        let sm = SessionManager::new(client_config(&base, &storage)).unwrap();
        sm.register("F", "f@gmail.com", "secret1", Some("123")).await.unwrap();
    }
    // corrupt the stored token; production startup must treat this as a
    // silent logout, not an error
    let store = SessionStore::open(storage.path().to_str().unwrap()).unwrap();
    let mut rec = store.load().unwrap();
    rec.token = "expired.or.tampered".to_string();
    store.save(&rec).unwrap();

    let mut cfg = client_config(&base, &storage);
    cfg.verify_on_startup = true;
    let sm = SessionManager::new(cfg).unwrap();
    sm.initialize().await;
    assert!(!sm.is_authenticated());
    assert!(!store.exists());
}

#[tokio::test]
async fn concurrent_double_login_commits_one_coherent_record() {
    let (base, _srv) = spawn_server().await;
    let storage = TempDir::new().unwrap();
    let sm = SessionManager::new(client_config(&base, &storage)).unwrap();
    sm.register("G", "g@gmail.com", "secret1", Some("123")).await.unwrap();
    sm.logout();

    let (a, b) = tokio::join!(
        sm.login("g@gmail.com", "secret1"),
        sm.login("g@gmail.com", "secret1"),
    );
    assert!(a.is_ok() && b.is_ok());
    assert!(!sm.loading());

    // exactly one coherent record: token and user were written together and
    // the in-memory state matches what was persisted
    let store = SessionStore::open(storage.path().to_str().unwrap()).unwrap();
    let rec = store.load().unwrap();
    assert_eq!(rec.user, sm.current_user().unwrap());
    assert!(!rec.token.is_empty());
}

#[tokio::test]
async fn refresh_user_failure_forces_logout() {
    let (base, _srv) = spawn_server().await;
    let storage = TempDir::new().unwrap();
    let sm = SessionManager::new(client_config(&base, &storage)).unwrap();
    sm.register("H", "h@gmail.com", "secret1", Some("123")).await.unwrap();

    // sabotage the stored token; the defensive resync must clear the session
    let store = SessionStore::open(storage.path().to_str().unwrap()).unwrap();
    let mut rec = store.load().unwrap();
    rec.token = "expired.or.tampered".to_string();
    store.save(&rec).unwrap();

    assert!(sm.refresh_user().await.is_none());
    assert!(!sm.is_authenticated());
    assert!(!store.exists());
}

#[tokio::test]
async fn unreachable_server_reports_no_response() {
    // nothing listens on the discard port; the connection is refused and the
    // failure must classify as NoResponse, not InvalidCredentials
    let storage = TempDir::new().unwrap();
    let sm = SessionManager::new(client_config("http://127.0.0.1:9/api", &storage)).unwrap();

    let failure = sm.login("a@gmail.com", "secret1").await.unwrap_err();
    assert_eq!(failure.kind, FailureKind::NoResponse);
    assert_eq!(failure.message, "No response from server");
    // the failed attempt settles cleanly: no session, loading cleared
    assert!(!sm.is_authenticated());
    assert!(!sm.loading());
    assert!(!SessionStore::open(storage.path().to_str().unwrap()).unwrap().exists());
}

#[tokio::test]
async fn refresh_user_persistence_failure_clears_session() {
    let (base, _srv) = spawn_server().await;
    let storage = TempDir::new().unwrap();
    let sm = SessionManager::new(client_config(&base, &storage)).unwrap();
    sm.register("J", "j@gmail.com", "secret1", Some("123")).await.unwrap();

    // block the record rewrite: a directory squats on the temp-file path, so
    // the refreshed session cannot be persisted
    std::fs::create_dir(storage.path().join("session.json.tmp")).unwrap();

    // memory and storage must not diverge: the refresh reports failure and
    // the session is cleared rather than left claiming a user it never saved
    assert!(sm.refresh_user().await.is_none());
    assert!(!sm.is_authenticated());
    assert!(!sm.loading());
    assert!(!SessionStore::open(storage.path().to_str().unwrap()).unwrap().exists());
}

#[tokio::test]
async fn refresh_user_updates_projection() {
    let (base, _srv) = spawn_server().await;
    let storage = TempDir::new().unwrap();
    let sm = SessionManager::new(client_config(&base, &storage)).unwrap();
    sm.register("I", "i@gmail.com", "secret1", Some("123")).await.unwrap();

    let refreshed = sm.refresh_user().await.unwrap();
    assert_eq!(refreshed.email, "i@gmail.com");
    assert!(sm.is_authenticated());
}

/// Stand-in for the hosted identity provider: accepts any credentials and
/// returns its own user shape with no shared token format.
async fn spawn_fallback_provider() -> String {
    let app = Router::new().route(
        "/auth/v1/token",
        post(|Json(body): Json<serde_json::Value>| async move {
            let email = body["email"].as_str().unwrap_or("").to_string();
            Json(json!({
                "access_token": "fallback-opaque-token",
                "user": {
                    "id": uuid::Uuid::new_v4(),
                    "email": email,
                    "user_metadata": {"name": "Fallback User"},
                    "phone": null,
                }
            }))
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn fallback_provider_rescues_failed_primary_login() {
    let (base, _srv) = spawn_server().await;
    let fallback_base = spawn_fallback_provider().await;
    let storage = TempDir::new().unwrap();
    let mut cfg = client_config(&base, &storage);
    cfg.fallback_endpoint = fallback_base;
    cfg.fallback_api_key = "anon-key".to_string();
    let sm = SessionManager::new(cfg).unwrap();

    // no such account on the primary service; the fallback takes over
    // behind the same login contract
    let user = sm.login("ops@sssteelindia.com", "whatever").await.unwrap();
    assert_eq!(user.role, policy::Role::Admin);
    assert_eq!(sm.session_provider(), Some(ProviderKind::Fallback));

    // fallback sessions survive a verify-on-startup restore: the primary
    // service cannot re-validate their tokens, so the record is trusted
    let mut cfg2 = client_config(&base, &storage);
    cfg2.verify_on_startup = true;
    let restored = SessionManager::new(cfg2).unwrap();
    restored.initialize().await;
    assert!(restored.is_authenticated());
    assert_eq!(restored.session_provider(), Some(ProviderKind::Fallback));
}
