//! Persistent client storage for the session record.
//! The token and user projection are one record in one file, so the pair is
//! written and discarded atomically; a token can never outlive its user
//! projection or vice versa. Read once at startup, rewritten by every
//! successful login/registration, removed on logout.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::provider::ProviderKind;
use crate::store::UserProfile;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionRecord {
    pub token: String,
    pub user: UserProfile,
    /// Which auth path issued this session. Startup re-validation branches
    /// on this: fallback tokens are not verifiable by the primary service.
    pub provider: ProviderKind,
}

#[derive(Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn open(dir: &str) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating client storage dir {}", dir))?;
        Ok(Self { path: Path::new(dir).join("session.json") })
    }

    pub fn load(&self) -> Option<SessionRecord> {
        let bytes = std::fs::read(&self.path).ok()?;
        // A corrupt record is the same as no record.
        serde_json::from_slice(&bytes).ok()
    }

    pub fn save(&self, record: &SessionRecord) -> Result<()> {
        let tmp = self.path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(record)?;
        std::fs::write(&tmp, bytes)
            .with_context(|| format!("writing session record at {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing session record at {}", self.path.display()))?;
        Ok(())
    }

    /// Idempotent: clearing an absent record is a no-op.
    pub fn clear(&self) {
        let _ = std::fs::remove_file(&self.path);
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}
