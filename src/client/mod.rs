//! Client-side session management: current-user state for a running client,
//! persistence of the session record, provider selection (primary credential
//! service with an external identity fallback) and post-login routing.
//! Keep the public surface thin and split implementation across sub-modules.

mod provider;
mod session;
mod storage;

pub use provider::{AuthProvider, FallbackProvider, PrimaryProvider, ProviderKind, ProviderSession};
pub use session::{AuthFailure, FailureKind, RegisterOutcome, SessionManager};
pub use storage::{SessionRecord, SessionStore};
