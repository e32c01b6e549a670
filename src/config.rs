//! Environment-supplied configuration with development defaults.
//! Server and client read separate structs; neither touches the environment
//! after construction so tests can build configs directly.

/// Development-only signing secret. Deployments must override via
/// STEELAUTH_JWT_SECRET; `ServerConfig::from_env` warns when they do not.
pub const DEV_JWT_SECRET: &str = "steelauth_dev_secret";

pub const DEFAULT_ADMIN_DOMAIN: &str = "sssteelindia.com";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub http_port: u16,
    /// Directory holding the durable account store.
    pub db_root: String,
    /// Secret for signing session tokens.
    pub jwt_secret: String,
    /// Organizational domain whose mailboxes are administrators.
    pub admin_domain: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 5000,
            db_root: "dbs".to_string(),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            admin_domain: DEFAULT_ADMIN_DOMAIN.to_string(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let http_port = std::env::var("STEELAUTH_HTTP_PORT").ok()
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(5000);
        let db_root = std::env::var("STEELAUTH_DB_FOLDER").unwrap_or_else(|_| "dbs".to_string());
        let jwt_secret = match std::env::var("STEELAUTH_JWT_SECRET") {
            Ok(s) if !s.is_empty() => s,
            _ => {
                tracing::warn!("STEELAUTH_JWT_SECRET not set; using the development default. Override this in production.");
                DEV_JWT_SECRET.to_string()
            }
        };
        let admin_domain = std::env::var("STEELAUTH_ADMIN_DOMAIN")
            .unwrap_or_else(|_| DEFAULT_ADMIN_DOMAIN.to_string());
        Self { http_port, db_root, jwt_secret, admin_domain }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base location of the credential service API, e.g. http://localhost:5000/api
    pub api_base: String,
    /// Endpoint of the external identity fallback; empty disables the fallback.
    pub fallback_endpoint: String,
    /// Public API key for the fallback provider.
    pub fallback_api_key: String,
    /// Directory for the persisted client session record.
    pub storage_dir: String,
    /// Organizational domain used by the redirect policy.
    pub admin_domain: String,
    /// Re-validate a restored token against the verify endpoint on startup.
    /// Production builds re-validate; development builds trust the stored
    /// record. Intentional relaxation for dev/test only.
    pub verify_on_startup: bool,
    /// After a successful register, log in with the same credentials instead
    /// of sending the caller to the login screen.
    pub auto_login_after_register: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:5000/api".to_string(),
            fallback_endpoint: String::new(),
            fallback_api_key: String::new(),
            storage_dir: ".steelauth".to_string(),
            admin_domain: DEFAULT_ADMIN_DOMAIN.to_string(),
            verify_on_startup: !cfg!(debug_assertions),
            auto_login_after_register: true,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_base: std::env::var("STEELAUTH_API_BASE").unwrap_or(defaults.api_base),
            fallback_endpoint: std::env::var("STEELAUTH_FALLBACK_URL").unwrap_or_default(),
            fallback_api_key: std::env::var("STEELAUTH_FALLBACK_KEY").unwrap_or_default(),
            storage_dir: std::env::var("STEELAUTH_CLIENT_DIR").unwrap_or(defaults.storage_dir),
            admin_domain: std::env::var("STEELAUTH_ADMIN_DOMAIN").unwrap_or(defaults.admin_domain),
            verify_on_startup: defaults.verify_on_startup,
            auto_login_after_register: defaults.auto_login_after_register,
        }
    }
}
