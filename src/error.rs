// src/error.rs
// =============================================================================
// Error types shared by the discovery, fetch and service layers.
//
// Two levels:
// - DocsError: detailed, carries which path/stage failed (for logs)
// - ErrorKind: the coarse taxonomy callers branch on
//
// "Not found" is its own variant. Fallback logic asks `is_not_found()`
// instead of looking at error messages.
// =============================================================================

use crate::cache::CacheError;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T, E = DocsError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DocsError {
    /// The content store says the thing is not there (HTTP 404).
    #[error("{what} not found")]
    NotFound { what: String },

    #[error("unauthorized: invalid or missing GitHub token")]
    Unauthorized,

    #[error("access denied: {0}")]
    Forbidden(String),

    #[error("rate limit exceeded{}", reset_suffix(.reset_at))]
    RateLimited { reset_at: Option<DateTime<Utc>> },

    #[error("no documentation files found for {repository}")]
    NoDocumentation { repository: String },

    #[error("no documentation content could be retrieved for {repository}")]
    NoContent { repository: String },

    /// An unqualified refresh arrived inside the minimum refresh window.
    #[error("refresh of {repository} is throttled until {}", .next_allowed_at.to_rfc3339())]
    RefreshThrottled {
        repository: String,
        next_allowed_at: DateTime<Utc>,
    },

    #[error("failed to fetch `{path}`: {source}")]
    Fetch {
        path: String,
        #[source]
        source: Box<DocsError>,
    },

    #[error("failed to decode `{path}`: {reason}")]
    Decode { path: String, reason: String },

    #[error("{operation} timed out after {budget:?}")]
    Timeout { operation: String, budget: Duration },

    #[error("request cancelled")]
    Cancelled,

    #[error("repository {repository} has no default branch")]
    MissingDefaultBranch { repository: String },

    #[error("invalid repository reference: {0}")]
    InvalidRepository(String),

    #[error("invalid client configuration: {0}")]
    Configuration(String),

    #[error("upstream returned HTTP {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("unexpected response from content store: {0}")]
    InvalidResponse(String),

    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Coarse error classes exposed to callers (an HTTP layer would map these
/// to 404/401/429/500).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Unauthorized,
    RateLimited,
    Internal,
}

impl DocsError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn fetch(path: impl Into<String>, source: DocsError) -> Self {
        Self::Fetch {
            path: path.into(),
            source: Box::new(source),
        }
    }

    /// True for the structural "absent" signal only.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Fetch { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } | Self::NoDocumentation { .. } | Self::NoContent { .. } => {
                ErrorKind::NotFound
            }
            Self::Unauthorized | Self::Forbidden(_) => ErrorKind::Unauthorized,
            Self::RateLimited { .. } | Self::RefreshThrottled { .. } => ErrorKind::RateLimited,
            Self::Fetch { source, .. } => source.kind(),
            _ => ErrorKind::Internal,
        }
    }
}

fn reset_suffix(reset_at: &Option<DateTime<Utc>>) -> String {
    match reset_at {
        Some(at) => format!(" (resets at {})", at.to_rfc3339()),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_reduces_to_coarse_taxonomy() {
        assert_eq!(DocsError::not_found("docs").kind(), ErrorKind::NotFound);
        assert_eq!(
            DocsError::NoDocumentation { repository: "a/b".into() }.kind(),
            ErrorKind::NotFound
        );
        assert_eq!(DocsError::Forbidden("nope".into()).kind(), ErrorKind::Unauthorized);
        assert_eq!(
            DocsError::RateLimited { reset_at: None }.kind(),
            ErrorKind::RateLimited
        );
        assert_eq!(DocsError::Cancelled.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_fetch_error_delegates_kind_and_keeps_path() {
        let err = DocsError::fetch("docs/a.md", DocsError::Unauthorized);
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert!(err.to_string().contains("docs/a.md"));
        assert!(!err.is_not_found());
    }
}
