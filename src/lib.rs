// src/lib.rs
// =============================================================================
// docs-harvester finds the documentation files of a GitHub repository,
// downloads them concurrently and keeps them in a two-tier cache (a small
// index per ref, plus one content entry per file version).
//
// Module map:
// - github:    the ContentStore contract and its GitHub REST implementation
// - discovery: which paths are documentation (strategy chain)
// - fetcher:   bounded, cancellable parallel download of those paths
// - cache:     index + content entries over a pluggable backend
// - throttle:  how often an unqualified full refresh may run
// - service:   the operations that tie the above together
// - config / telemetry: settings and logging for the binary
// =============================================================================

pub(crate) mod budget;
pub mod cache;
pub mod config;
pub mod discovery;
pub mod error;
pub mod fetcher;
pub mod github;
pub mod models;
pub mod service;
pub mod telemetry;
pub mod throttle;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{DocsError, ErrorKind, Result};
pub use models::{DocumentContent, DocumentationIndex, RepositoryId, RepositoryRef};
pub use service::{DocumentationService, DocumentationSet, ServiceOptions};
