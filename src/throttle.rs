// src/throttle.rs
// =============================================================================
// Refresh throttle: limits how often an unqualified refresh ("give me the
// latest docs") may trigger a full discovery + fetch for one repository.
//
// The decision reads the last time the repository's documentation was
// durably persisted:
// - no record yet          -> allowed (first fetch)
// - now >= last + min_days -> allowed
// - otherwise              -> denied, with the time it opens up again
//
// Requests that name a ref or set `force` never consult it. If the
// persistence log itself can't be read, the throttle lets the request through.
// =============================================================================

use crate::models::RepositoryId;
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub const DEFAULT_MIN_DAYS_BETWEEN_REFRESHES: u32 = 3;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("persistence log I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("persistence log is malformed: {0}")]
    Format(#[from] serde_json::Error),

    #[error("persistence log lookup timed out after {0:?}")]
    Timeout(Duration),
}

/// Where "documentation for owner/name was last saved at T" lives.
#[async_trait]
pub trait PersistenceLog: Send + Sync {
    async fn last_persisted_at(
        &self,
        id: &RepositoryId,
    ) -> Result<Option<DateTime<Utc>>, PersistenceError>;

    async fn record_persisted(
        &self,
        id: &RepositoryId,
        at: DateTime<Utc>,
    ) -> Result<(), PersistenceError>;
}

/// A JSON object mapping `owner/name` to an RFC 3339 timestamp.
pub struct JsonPersistenceLog {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl JsonPersistenceLog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    async fn read_all(&self) -> Result<BTreeMap<String, DateTime<Utc>>, PersistenceError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) if raw.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(err.into()),
        }
    }
}

#[async_trait]
impl PersistenceLog for JsonPersistenceLog {
    async fn last_persisted_at(
        &self,
        id: &RepositoryId,
    ) -> Result<Option<DateTime<Utc>>, PersistenceError> {
        Ok(self.read_all().await?.get(&id.full_name()).copied())
    }

    async fn record_persisted(
        &self,
        id: &RepositoryId,
        at: DateTime<Utc>,
    ) -> Result<(), PersistenceError> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.read_all().await?;
        records.insert(id.full_name(), at);

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let temp = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp, serde_json::to_vec_pretty(&records)?).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshReason {
    /// Nothing persisted yet for this repository.
    FirstFetch,
    /// The minimum window has passed.
    WindowElapsed,
    /// Still inside the window.
    TooSoon,
    /// An explicit ref or force flag skipped the check.
    Bypassed,
    /// The persistence log could not be read; allowed anyway.
    StorageUnavailable,
}

impl std::fmt::Display for RefreshReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::FirstFetch => "no previous refresh recorded",
            Self::WindowElapsed => "minimum refresh interval has passed",
            Self::TooSoon => "refreshed too recently",
            Self::Bypassed => "explicit ref or force flag",
            Self::StorageUnavailable => "refresh history unavailable",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshDecision {
    pub allowed: bool,
    /// When a refresh is (or was) next permitted. Equal to the decision time
    /// when nothing restricts it.
    pub next_allowed_at: DateTime<Utc>,
    pub reason: RefreshReason,
}

impl RefreshDecision {
    fn allow(now: DateTime<Utc>, reason: RefreshReason) -> Self {
        Self {
            allowed: true,
            next_allowed_at: now,
            reason,
        }
    }

    /// Whole days until the next refresh, rounded up; 0 when allowed.
    pub fn days_remaining(&self, now: DateTime<Utc>) -> i64 {
        if self.allowed || self.next_allowed_at <= now {
            return 0;
        }
        let seconds = (self.next_allowed_at - now).num_seconds();
        (seconds + 86_399) / 86_400
    }
}

/// What the caller asked for. Either field makes the request "qualified".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshRequest {
    pub reference: Option<String>,
    pub force: bool,
}

impl RefreshRequest {
    pub fn is_qualified(&self) -> bool {
        self.force
            || self
                .reference
                .as_deref()
                .is_some_and(|reference| !reference.trim().is_empty())
    }
}

pub struct RefreshThrottle {
    log: Arc<dyn PersistenceLog>,
    budget: Duration,
}

impl RefreshThrottle {
    pub fn new(log: Arc<dyn PersistenceLog>, budget: Duration) -> Self {
        Self { log, budget }
    }

    pub async fn can_refresh(&self, id: &RepositoryId, min_days: u32) -> RefreshDecision {
        self.can_refresh_at(id, min_days, Utc::now()).await
    }

    pub async fn can_refresh_at(
        &self,
        id: &RepositoryId,
        min_days: u32,
        now: DateTime<Utc>,
    ) -> RefreshDecision {
        let lookup = tokio::time::timeout(self.budget, self.log.last_persisted_at(id))
            .await
            .unwrap_or(Err(PersistenceError::Timeout(self.budget)));

        let last = match lookup {
            Ok(Some(last)) => last,
            Ok(None) => {
                debug!(repo = %id, "no refresh recorded, allowing");
                return RefreshDecision::allow(now, RefreshReason::FirstFetch);
            }
            Err(err) => {
                warn!(repo = %id, error = %err, "refresh history unavailable, allowing refresh");
                return RefreshDecision::allow(now, RefreshReason::StorageUnavailable);
            }
        };

        // A window reaching past the end of representable time never elapses.
        let next_allowed_at = TimeDelta::try_days(i64::from(min_days))
            .and_then(|window| last.checked_add_signed(window))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        if now >= next_allowed_at {
            RefreshDecision {
                allowed: true,
                next_allowed_at,
                reason: RefreshReason::WindowElapsed,
            }
        } else {
            debug!(repo = %id, %next_allowed_at, "refresh throttled");
            RefreshDecision {
                allowed: false,
                next_allowed_at,
                reason: RefreshReason::TooSoon,
            }
        }
    }

    pub async fn check_refresh_allowed(
        &self,
        id: &RepositoryId,
        min_days: u32,
        forced_or_ref_specified: bool,
    ) -> RefreshDecision {
        if forced_or_ref_specified {
            return RefreshDecision::allow(Utc::now(), RefreshReason::Bypassed);
        }
        self.can_refresh(id, min_days).await
    }

    pub async fn record_persisted(
        &self,
        id: &RepositoryId,
        at: DateTime<Utc>,
    ) -> Result<(), PersistenceError> {
        self.log.record_persisted(id, at).await
    }
}
