// src/cache/manager.rs
// =============================================================================
// TwoTierCache: documentation-aware wrapper around a CacheBackend.
//
// Tier 1: DocumentationIndex per RepositoryRef (short TTL)
// Tier 2: DocumentContent per (RepositoryRef, sha) (long TTL)
//
// A read walks the index and looks up each listed file on its own, which
// splits the result into "cached" and "missing". Losing some content entries
// therefore costs only those files, not the whole repository.
//
// Cache trouble never fails a request:
// - read errors and undecodable entries count as misses
// - write errors are logged and skipped
// Cancellation is the one error that propagates.
// =============================================================================

use super::{CacheBackend, KeyBuilder, NoopCache};
use crate::budget::guarded;
use crate::error::{DocsError, Result};
use crate::models::{
    DocumentContent, DocumentMetadata, DocumentationIndex, RepositoryId, RepositoryMeta,
    RepositoryRef,
};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Lifetimes of the two tiers. Repository metadata shares the index TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    pub index: Duration,
    pub content: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            index: Duration::from_secs(60 * 60),
            content: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Result of reading both tiers for one RepositoryRef.
#[derive(Debug)]
pub enum CacheLookup {
    /// No usable index.
    Miss,
    /// Index found; `cached` and `missing` together cover every entry of it.
    Hit {
        index: DocumentationIndex,
        cached: Vec<DocumentContent>,
        missing: Vec<DocumentMetadata>,
    },
}

impl CacheLookup {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Hit { missing, .. } if missing.is_empty())
    }
}

pub struct TwoTierCache {
    backend: Arc<dyn CacheBackend>,
    keys: KeyBuilder,
    ttls: CacheTtls,
    budget: Duration,
}

impl TwoTierCache {
    pub fn new(backend: Arc<dyn CacheBackend>, keys: KeyBuilder, ttls: CacheTtls, budget: Duration) -> Self {
        Self {
            backend,
            keys,
            ttls,
            budget,
        }
    }

    /// A manager whose every lookup misses.
    pub fn disabled(budget: Duration) -> Self {
        Self::new(
            Arc::new(NoopCache),
            KeyBuilder::new("disabled"),
            CacheTtls::default(),
            budget,
        )
    }

    pub fn keys(&self) -> &KeyBuilder {
        &self.keys
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_enabled()
    }

    pub async fn lookup(&self, repo: &RepositoryRef, cancel: &CancellationToken) -> Result<CacheLookup> {
        let Some(index) = self.load_index(repo, cancel).await? else {
            debug!(%repo, "documentation index not cached");
            return Ok(CacheLookup::Miss);
        };

        let mut cached = Vec::with_capacity(index.documents.len());
        let mut missing = Vec::new();
        for meta in &index.documents {
            match self.load_content(repo, meta, cancel).await? {
                Some(document) => cached.push(document),
                None => missing.push(meta.clone()),
            }
        }

        debug!(
            %repo,
            cached = cached.len(),
            missing = missing.len(),
            "documentation index cached"
        );
        Ok(CacheLookup::Hit {
            index,
            cached,
            missing,
        })
    }

    pub async fn load_index(
        &self,
        repo: &RepositoryRef,
        cancel: &CancellationToken,
    ) -> Result<Option<DocumentationIndex>> {
        self.read(&self.keys.documentation_index(repo), cancel).await
    }

    /// The cached content for `meta`, if present and still matching its
    /// identity.
    ///
    /// Byte-identical files share a blob sha, and so one content entry. The
    /// entry may have been written under a sibling path; it is handed back
    /// labelled with the path the index asked for.
    pub async fn load_content(
        &self,
        repo: &RepositoryRef,
        meta: &DocumentMetadata,
        cancel: &CancellationToken,
    ) -> Result<Option<DocumentContent>> {
        let key = self.keys.document_content(repo, &meta.sha);
        let document: Option<DocumentContent> = self.read(&key, cancel).await?;
        Ok(document
            .filter(|doc| doc.sha == meta.sha)
            .map(|doc| relabel(doc, repo, &meta.path)))
    }

    /// Writes every content entry, then a fresh index built from them.
    /// Each write stands alone; a failure is logged and the rest go ahead.
    pub async fn store_documents(
        &self,
        repo: &RepositoryRef,
        documents: &[DocumentContent],
        created_at: DateTime<Utc>,
        cancel: &CancellationToken,
    ) {
        if documents.is_empty() {
            return;
        }
        self.store_contents(repo, documents, cancel).await;
        let index = DocumentationIndex::from_documents(repo, documents, created_at);
        self.store_index(repo, &index, cancel).await;
    }

    /// Returns how many entries were written.
    pub async fn store_contents(
        &self,
        repo: &RepositoryRef,
        documents: &[DocumentContent],
        cancel: &CancellationToken,
    ) -> usize {
        let mut written = 0;
        for document in documents {
            let key = self.keys.document_content(repo, &document.sha);
            if self.write(&key, document, self.ttls.content, cancel).await {
                written += 1;
            }
        }
        written
    }

    pub async fn store_index(
        &self,
        repo: &RepositoryRef,
        index: &DocumentationIndex,
        cancel: &CancellationToken,
    ) -> bool {
        let key = self.keys.documentation_index(repo);
        self.write(&key, index, self.ttls.index, cancel).await
    }

    pub async fn load_repository_meta(
        &self,
        id: &RepositoryId,
        cancel: &CancellationToken,
    ) -> Result<Option<RepositoryMeta>> {
        self.read(&self.keys.repository(id), cancel).await
    }

    pub async fn store_repository_meta(
        &self,
        id: &RepositoryId,
        meta: &RepositoryMeta,
        cancel: &CancellationToken,
    ) -> bool {
        self.write(&self.keys.repository(id), meta, self.ttls.index, cancel)
            .await
    }

    /// Drops the index only. Content entries stay until their TTL runs out;
    /// the next full cycle downloads every file again and overwrites them.
    pub async fn invalidate_index(&self, repo: &RepositoryRef, cancel: &CancellationToken) {
        let key = self.keys.documentation_index(repo);
        let outcome = guarded(cancel, self.budget, "cache delete", async {
            self.backend.delete(&key).await.map_err(DocsError::from)
        })
        .await;
        if let Err(err) = outcome {
            warn!(key = %key, error = %err, "failed to invalidate documentation index");
        }
    }

    async fn read<T: DeserializeOwned>(&self, key: &str, cancel: &CancellationToken) -> Result<Option<T>> {
        if !self.backend.is_enabled() {
            return Ok(None);
        }

        let outcome = guarded(cancel, self.budget, "cache get", async {
            self.backend.get(key).await.map_err(DocsError::from)
        })
        .await;

        match outcome {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => Ok(Some(value)),
                Err(err) => {
                    warn!(key, error = %err, "discarding undecodable cache entry");
                    Ok(None)
                }
            },
            Ok(None) => Ok(None),
            Err(err) if err.is_cancelled() => Err(err),
            Err(err) => {
                warn!(key, error = %err, "cache read failed, treating as miss");
                Ok(None)
            }
        }
    }

    async fn write<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
        cancel: &CancellationToken,
    ) -> bool {
        if !self.backend.is_enabled() {
            return false;
        }

        let encoded = match serde_json::to_string(value) {
            Ok(encoded) => encoded,
            Err(err) => {
                warn!(key, error = %err, "failed to encode cache entry");
                return false;
            }
        };

        let outcome = guarded(cancel, self.budget, "cache set", async {
            self.backend.set(key, encoded, ttl).await.map_err(DocsError::from)
        })
        .await;

        match outcome {
            Ok(()) => true,
            Err(err) => {
                warn!(key, error = %err, "cache write failed, continuing uncached");
                false
            }
        }
    }
}

// Moves a shared content entry onto `path`. The link keeps its host and
// ref when it ends with the old path, otherwise it is rebuilt.
fn relabel(mut document: DocumentContent, repo: &RepositoryRef, path: &str) -> DocumentContent {
    if document.path == path {
        return document;
    }
    document.url = match document.url.strip_suffix(document.path.as_str()) {
        Some(base) => format!("{base}{path}"),
        None => format!(
            "https://github.com/{}/blob/{}/{}",
            repo.id,
            repo.reference(),
            path
        ),
    };
    document.path = path.to_string();
    document
}
