//! Session manager: owns current-user state for the running client session.
//! An explicit object (no ambient globals) constructed from `ClientConfig`;
//! UI entry points share one instance and call its async operations.
//!
//! Ordering: every state-changing operation draws a sequence number when it
//! starts; an outcome only commits if no newer operation has already
//! committed. A stale in-flight call can therefore never overwrite the
//! effect of the most recently initiated-and-settled one, and failures never
//! mutate authenticated state at all.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::provider::{AuthProvider, FallbackProvider, PrimaryProvider, ProviderKind, ProviderSession};
use super::storage::{SessionRecord, SessionStore};
use crate::config::ClientConfig;
use crate::error::{AppError, AppResult};
use crate::policy;
use crate::store::UserProfile;

/// Hardening against a network call that never resolves; without it
/// `loading` would stay true forever.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// User-facing failure classification, decoupled from presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Wrong or missing credentials; retry needs new input.
    InvalidCredentials,
    /// Account already exists (register only).
    DuplicateAccount,
    /// No server response at all; safe to retry as-is.
    NoResponse,
    /// Error response outside the expected categories.
    Unexpected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl From<AppError> for AuthFailure {
    fn from(e: AppError) -> Self {
        let kind = match &e {
            AppError::Auth { .. } | AppError::UserInput { .. } => FailureKind::InvalidCredentials,
            AppError::Conflict { .. } => FailureKind::DuplicateAccount,
            AppError::Io { .. } => FailureKind::NoResponse,
            _ => FailureKind::Unexpected,
        };
        AuthFailure { kind, message: e.message().to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// Registration succeeded and the follow-up login established a session.
    LoggedIn(UserProfile),
    /// Registration succeeded; `auto_login_after_register` is off and the
    /// caller navigates to the login screen.
    LoginRequired,
}

#[derive(Default)]
struct SessionState {
    current_user: Option<UserProfile>,
    provider: Option<ProviderKind>,
    loading: bool,
    /// Sequence number of the operation whose effect the state reflects.
    applied_seq: u64,
    /// Operations started but not yet settled; `loading` while non-zero.
    inflight: u32,
}

pub struct SessionManager {
    config: ClientConfig,
    primary: PrimaryProvider,
    fallback: Option<FallbackProvider>,
    storage: SessionStore,
    state: Mutex<SessionState>,
    op_seq: AtomicU64,
}

impl SessionManager {
    pub fn new(config: ClientConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        let primary = PrimaryProvider::new(&config.api_base, client.clone());
        let fallback = if config.fallback_endpoint.is_empty() {
            None
        } else {
            Some(FallbackProvider::new(
                &config.fallback_endpoint,
                &config.fallback_api_key,
                &config.admin_domain,
                client,
            ))
        };
        let storage = SessionStore::open(&config.storage_dir)?;
        Ok(Self {
            config,
            primary,
            fallback,
            storage,
            state: Mutex::new(SessionState::default()),
            op_seq: AtomicU64::new(0),
        })
    }

    // --- state accessors -------------------------------------------------

    pub fn current_user(&self) -> Option<UserProfile> {
        self.state.lock().current_user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.lock().current_user.is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.state.lock().current_user.as_ref().map(|u| u.role == policy::Role::Admin).unwrap_or(false)
    }

    pub fn loading(&self) -> bool {
        self.state.lock().loading
    }

    /// Which auth path issued the current session, when one exists.
    pub fn session_provider(&self) -> Option<ProviderKind> {
        self.state.lock().provider
    }

    // --- sequencing ------------------------------------------------------

    fn next_seq(&self) -> u64 {
        self.op_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn begin_op(&self) -> u64 {
        let seq = self.next_seq();
        let mut st = self.state.lock();
        st.inflight += 1;
        st.loading = true;
        seq
    }

    /// Commit a successful session outcome. Stale settles (a newer operation
    /// already committed) leave both state and storage untouched.
    fn commit(&self, seq: u64, record: SessionRecord) -> AppResult<UserProfile> {
        let mut st = self.state.lock();
        let result = if seq >= st.applied_seq {
            match self.storage.save(&record) {
                Ok(()) => {
                    st.applied_seq = seq;
                    st.current_user = Some(record.user.clone());
                    st.provider = Some(record.provider);
                    Ok(record.user)
                }
                Err(e) => Err(AppError::internal("storage_write_failed".into(), e.to_string())),
            }
        } else {
            debug!("stale session commit superseded (seq {} < {})", seq, st.applied_seq);
            Ok(record.user)
        };
        st.inflight = st.inflight.saturating_sub(1);
        if st.inflight == 0 { st.loading = false; }
        result
    }

    /// Settle an operation that does not change the session.
    fn settle_only(&self, _seq: u64) {
        let mut st = self.state.lock();
        st.inflight = st.inflight.saturating_sub(1);
        if st.inflight == 0 { st.loading = false; }
    }

    /// Clear the session unless a newer operation already decided it.
    fn apply_logout(&self, seq: u64) {
        let mut st = self.state.lock();
        if seq >= st.applied_seq {
            st.applied_seq = seq;
            st.current_user = None;
            st.provider = None;
            self.storage.clear();
        }
    }

    // --- operations ------------------------------------------------------

    /// Restore session state from persistent storage. Invoked once at
    /// application start. With `verify_on_startup` the restored token is
    /// re-validated against the credential service and discarded silently on
    /// failure; fallback-issued sessions skip re-validation because their
    /// tokens are not verifiable by the primary service.
    pub async fn initialize(&self) {
        let seq = self.begin_op();
        let restored = match self.storage.load() {
            None => None,
            Some(rec) if rec.provider == ProviderKind::Fallback => Some(rec),
            Some(rec) if self.config.verify_on_startup => {
                match self.primary.verify(&rec.token).await {
                    Ok(user) => Some(SessionRecord { token: rec.token, user, provider: rec.provider }),
                    Err(e) => {
                        info!("startup token re-validation failed, clearing session: {e}");
                        self.storage.clear();
                        None
                    }
                }
            }
            Some(rec) => Some(rec),
        };
        match restored {
            Some(rec) => {
                if let Err(e) = self.commit(seq, rec) {
                    warn!("failed to persist restored session: {e}");
                }
            }
            None => self.settle_only(seq),
        }
    }

    /// Authenticate against the primary credential service, falling back to
    /// the external identity provider when the primary path fails. On
    /// success the session record is persisted and in-memory state updated;
    /// on failure prior state is left untouched.
    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile, AuthFailure> {
        let seq = self.begin_op();
        let outcome = self.login_via_providers(email, password).await;
        match outcome {
            Ok(session) => {
                let record = SessionRecord {
                    token: session.token,
                    user: session.user,
                    provider: session.provider,
                };
                self.commit(seq, record).map_err(AuthFailure::from)
            }
            Err(e) => {
                self.settle_only(seq);
                Err(AuthFailure::from(e))
            }
        }
    }

    async fn login_via_providers(&self, email: &str, password: &str) -> AppResult<ProviderSession> {
        match self.primary.login(email, password).await {
            Ok(session) => Ok(session),
            Err(primary_err) => {
                let Some(fallback) = &self.fallback else { return Err(primary_err) };
                debug!("primary login failed ({primary_err}); trying identity fallback");
                match fallback.login(email, password).await {
                    Ok(session) => Ok(session),
                    Err(fallback_err) => {
                        // The primary service owns the canonical error; the
                        // fallback outcome is only logged.
                        debug!("fallback login failed: {fallback_err}");
                        Err(primary_err)
                    }
                }
            }
        }
    }

    /// Register a new account, then establish a session with the same
    /// credentials when `auto_login_after_register` is set.
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
        mobile: Option<&str>,
    ) -> Result<RegisterOutcome, AuthFailure> {
        let seq = self.begin_op();
        let res = self.primary.register(name, email, password, mobile.unwrap_or("")).await;
        self.settle_only(seq);
        res.map_err(AuthFailure::from)?;
        if self.config.auto_login_after_register {
            let user = self.login(email, password).await?;
            Ok(RegisterOutcome::LoggedIn(user))
        } else {
            Ok(RegisterOutcome::LoginRequired)
        }
    }

    /// Clear in-memory state and the persisted record; returns the path the
    /// caller should navigate to. Idempotent: with no active session it is a
    /// no-op.
    pub fn logout(&self) -> &'static str {
        let seq = self.next_seq();
        self.apply_logout(seq);
        policy::LOGIN_DESTINATION
    }

    /// Defensive resync: re-fetch the account projection with the stored
    /// token. Any failure is treated as an authentication failure and forces
    /// a full session clear.
    pub async fn refresh_user(&self) -> Option<UserProfile> {
        let Some(rec) = self.storage.load() else { return None };
        let seq = self.begin_op();
        match self.primary.get_user(&rec.token, rec.user.id).await {
            Ok(user) => {
                let record = SessionRecord { token: rec.token, user, provider: rec.provider };
                match self.commit(seq, record) {
                    Ok(user) => Some(user),
                    Err(e) => {
                        // Memory and storage must never disagree about the
                        // session; an unpersistable refresh is a failed one.
                        warn!("failed to persist refreshed session, clearing it: {e}");
                        self.apply_logout(self.next_seq());
                        None
                    }
                }
            }
            Err(e) => {
                warn!("user refresh failed, logging out: {e}");
                self.apply_logout(seq);
                self.settle_only(seq);
                None
            }
        }
    }

    /// Post-login destination per the redirect policy: admins always land on
    /// the admin dashboard regardless of any requested redirect.
    pub fn destination_after_login(&self, explicit_redirect: Option<&str>) -> String {
        match self.current_user() {
            Some(user) => policy::default_destination(user.role, explicit_redirect),
            None => policy::LOGIN_DESTINATION.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_kind_mapping() {
        let auth: AuthFailure = AppError::auth("x", "Invalid email or password").into();
        assert_eq!(auth.kind, FailureKind::InvalidCredentials);
        let dup: AuthFailure = AppError::conflict("x", "Email already exists").into();
        assert_eq!(dup.kind, FailureKind::DuplicateAccount);
        let io: AuthFailure = AppError::io("x", "No response from server").into();
        assert_eq!(io.kind, FailureKind::NoResponse);
        let other: AuthFailure = AppError::internal("x", "boom").into();
        assert_eq!(other.kind, FailureKind::Unexpected);
    }

    #[test]
    fn unauthenticated_destination_is_login() {
        let tmp = tempfile::tempdir().unwrap();
        let sm = SessionManager::new(ClientConfig {
            storage_dir: tmp.path().to_str().unwrap().to_string(),
            ..ClientConfig::default()
        })
        .unwrap();
        assert_eq!(sm.destination_after_login(Some("/cart")), policy::LOGIN_DESTINATION);
        assert!(!sm.is_authenticated());
        assert!(!sm.loading());
    }
}
