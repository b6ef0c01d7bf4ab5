// src/service.rs
// =============================================================================
// DocumentationService: the operations callers actually use.
//
// fetch_documentation(repo, ref, concurrency):
//   1. Pin the ref (explicit, or the default branch via cached metadata)
//   2. Read the two-tier cache
//      - complete hit -> done, no network
//      - partial hit  -> fetch only the missing files, cache them, merge
//      - miss         -> resolve paths, fetch all, cache index + contents
//
// refresh_documentation(repo, request, concurrency):
//   Same flow, but a miss on an unqualified request must first pass the
//   refresh throttle. `force` drops the cached index beforehand. A network
//   fetch is recorded in the persistence log afterwards.
//
// check_refresh_allowed(repo, min_days, forced_or_ref_specified):
//   The throttle decision on its own.
// =============================================================================

use crate::budget::guarded;
use crate::cache::{CacheLookup, TwoTierCache};
use crate::discovery::PathResolver;
use crate::error::{DocsError, Result};
use crate::fetcher::ConcurrentFetcher;
use crate::github::ContentStore;
use crate::models::{
    DocumentContent, DocumentMetadata, DocumentationIndex, RepositoryId, RepositoryRef,
};
use crate::throttle::{RefreshDecision, RefreshRequest, RefreshThrottle};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_WORKER_POOL_SIZE: usize = 5;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Knobs for a [`DocumentationService`].
#[derive(Debug, Clone, Copy)]
pub struct ServiceOptions {
    /// Fallback when a caller passes a concurrency of 0.
    pub worker_pool_size: usize,
    pub request_timeout: Duration,
    pub max_rate_limit_wait: Duration,
    pub min_days_between_refreshes: u32,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            worker_pool_size: DEFAULT_WORKER_POOL_SIZE,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_rate_limit_wait: Duration::from_secs(90),
            min_days_between_refreshes: crate::throttle::DEFAULT_MIN_DAYS_BETWEEN_REFRESHES,
        }
    }
}

/// Documentation for one pinned ref, and where it came from.
#[derive(Debug)]
pub struct DocumentationSet {
    pub repository: RepositoryRef,
    pub documents: Vec<DocumentContent>,
    /// Served entirely from cache; no content-store calls were made.
    pub from_cache: bool,
    /// Some documents came from cache, the rest were fetched.
    pub from_partial_cache: bool,
    /// Per-file failures that did not prevent a result.
    pub fetch_errors: Vec<DocsError>,
}

impl DocumentationSet {
    pub fn used_network(&self) -> bool {
        !self.from_cache
    }
}

pub struct DocumentationService {
    store: Arc<dyn ContentStore>,
    resolver: PathResolver,
    fetcher: ConcurrentFetcher,
    cache: TwoTierCache,
    throttle: RefreshThrottle,
    options: ServiceOptions,
}

impl DocumentationService {
    pub fn new(
        store: Arc<dyn ContentStore>,
        cache: TwoTierCache,
        throttle: RefreshThrottle,
        options: ServiceOptions,
    ) -> Self {
        let resolver = PathResolver::new(
            Arc::clone(&store),
            options.request_timeout,
            options.max_rate_limit_wait,
        );
        let fetcher = ConcurrentFetcher::new(Arc::clone(&store), options.request_timeout);
        Self {
            store,
            resolver,
            fetcher,
            cache,
            throttle,
            options,
        }
    }

    pub fn options(&self) -> &ServiceOptions {
        &self.options
    }

    pub async fn fetch_documentation(
        &self,
        id: &RepositoryId,
        reference: Option<&str>,
        concurrency: usize,
        cancel: &CancellationToken,
    ) -> Result<DocumentationSet> {
        let repo = self.pin_reference(id, reference, cancel).await?;
        self.fetch_pinned(&repo, concurrency, cancel, None).await
    }

    pub async fn refresh_documentation(
        &self,
        id: &RepositoryId,
        request: &RefreshRequest,
        concurrency: usize,
        cancel: &CancellationToken,
    ) -> Result<DocumentationSet> {
        let repo = self
            .pin_reference(id, request.reference.as_deref(), cancel)
            .await?;

        if request.force {
            info!(%repo, "forced refresh, dropping cached index");
            self.cache.invalidate_index(&repo, cancel).await;
        }

        let gate = (!request.is_qualified()).then_some(self.options.min_days_between_refreshes);
        let set = self.fetch_pinned(&repo, concurrency, cancel, gate).await?;

        if set.used_network() {
            if let Err(err) = self.throttle.record_persisted(id, Utc::now()).await {
                warn!(repo = %id, error = %err, "failed to record refresh time");
            }
        }
        Ok(set)
    }

    pub async fn check_refresh_allowed(
        &self,
        id: &RepositoryId,
        min_days: u32,
        forced_or_ref_specified: bool,
    ) -> RefreshDecision {
        self.throttle
            .check_refresh_allowed(id, min_days, forced_or_ref_specified)
            .await
    }

    /// Only the Path Resolver, for a pinned ref.
    pub async fn resolve_paths(
        &self,
        id: &RepositoryId,
        reference: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<(RepositoryRef, Vec<String>)> {
        let repo = self.pin_reference(id, reference, cancel).await?;
        let paths = self.resolver.resolve(&repo, cancel).await?;
        Ok((repo, paths))
    }

    /// Turns an optional ref into a concrete one. A missing or blank ref
    /// means the default branch, looked up through the metadata cache.
    pub async fn pin_reference(
        &self,
        id: &RepositoryId,
        reference: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<RepositoryRef> {
        if let Some(reference) = reference.filter(|r| !r.trim().is_empty()) {
            return id.at(reference);
        }

        let meta = match self.cache.load_repository_meta(id, cancel).await? {
            Some(meta) => meta,
            None => {
                let meta = guarded(
                    cancel,
                    self.options.request_timeout,
                    "repository metadata",
                    self.store.repository_meta(id),
                )
                .await?;
                self.cache.store_repository_meta(id, &meta, cancel).await;
                meta
            }
        };

        if meta.default_branch.trim().is_empty() {
            return Err(DocsError::MissingDefaultBranch {
                repository: id.full_name(),
            });
        }
        debug!(repo = %id, branch = %meta.default_branch, "using default branch");
        id.at(meta.default_branch)
    }

    async fn fetch_pinned(
        &self,
        repo: &RepositoryRef,
        concurrency: usize,
        cancel: &CancellationToken,
        throttle_window: Option<u32>,
    ) -> Result<DocumentationSet> {
        let concurrency = if concurrency == 0 {
            self.options.worker_pool_size.max(1)
        } else {
            concurrency
        };

        match self.cache.lookup(repo, cancel).await? {
            CacheLookup::Hit {
                cached, missing, ..
            } if missing.is_empty() => {
                info!(%repo, documents = cached.len(), "serving documentation from cache");
                Ok(DocumentationSet {
                    repository: repo.clone(),
                    documents: cached,
                    from_cache: true,
                    from_partial_cache: false,
                    fetch_errors: Vec::new(),
                })
            }
            CacheLookup::Hit {
                index,
                cached,
                missing,
            } => {
                self.complete_partial_hit(repo, index, cached, missing, concurrency, cancel)
                    .await
            }
            CacheLookup::Miss => {
                if let Some(min_days) = throttle_window {
                    let decision = self.throttle.can_refresh(&repo.id, min_days).await;
                    if !decision.allowed {
                        return Err(DocsError::RefreshThrottled {
                            repository: repo.id.full_name(),
                            next_allowed_at: decision.next_allowed_at,
                        });
                    }
                }
                self.full_cycle(repo, concurrency, cancel).await
            }
        }
    }

    async fn complete_partial_hit(
        &self,
        repo: &RepositoryRef,
        index: DocumentationIndex,
        cached: Vec<DocumentContent>,
        missing: Vec<DocumentMetadata>,
        concurrency: usize,
        cancel: &CancellationToken,
    ) -> Result<DocumentationSet> {
        let paths: Vec<String> = missing.into_iter().map(|meta| meta.path).collect();
        info!(
            %repo,
            cached = cached.len(),
            missing = paths.len(),
            "partial cache hit, fetching missing documents"
        );

        let refetch = self.fetcher.fetch_all(repo, &paths, concurrency, cancel).await;
        let (fetched, fetch_errors) = match refetch {
            Ok(report) => (report.documents, report.errors),
            Err(err) if err.is_cancelled() || cached.is_empty() => return Err(err),
            Err(err) => {
                warn!(%repo, error = %err, "refetch failed, returning cached subset");
                (Vec::new(), vec![err])
            }
        };

        self.cache.store_contents(repo, &fetched, cancel).await;

        let mut documents = cached;
        documents.extend(fetched);
        sort_like_index(&mut documents, &index);

        Ok(DocumentationSet {
            repository: repo.clone(),
            documents,
            from_cache: false,
            from_partial_cache: true,
            fetch_errors,
        })
    }

    async fn full_cycle(
        &self,
        repo: &RepositoryRef,
        concurrency: usize,
        cancel: &CancellationToken,
    ) -> Result<DocumentationSet> {
        let paths = self.resolver.resolve(repo, cancel).await?;
        let report = self.fetcher.fetch_all(repo, &paths, concurrency, cancel).await?;

        self.cache
            .store_documents(repo, &report.documents, Utc::now(), cancel)
            .await;

        info!(
            %repo,
            documents = report.documents.len(),
            errors = report.errors.len(),
            "documentation fetched"
        );
        Ok(DocumentationSet {
            repository: repo.clone(),
            documents: report.documents,
            from_cache: false,
            from_partial_cache: false,
            fetch_errors: report.errors,
        })
    }
}

// Cached and refetched halves come back in arbitrary order; put them in the
// index's order so repeated requests look the same.
fn sort_like_index(documents: &mut [DocumentContent], index: &DocumentationIndex) {
    let order: HashMap<&str, usize> = index
        .documents
        .iter()
        .enumerate()
        .map(|(position, meta)| (meta.path.as_str(), position))
        .collect();
    documents.sort_by_key(|doc| order.get(doc.path.as_str()).copied().unwrap_or(usize::MAX));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheBackend, CacheError, CacheTtls, KeyBuilder, MemoryCache};
    use crate::testing::{Call, MockStore};
    use crate::throttle::{JsonPersistenceLog, PersistenceLog};
    use async_trait::async_trait;

    struct Harness {
        store: Arc<MockStore>,
        backend: Arc<MemoryCache>,
        service: DocumentationService,
        _state: tempfile::TempDir,
        log: Arc<JsonPersistenceLog>,
    }

    fn harness(store: MockStore) -> Harness {
        let store = Arc::new(store);
        let backend = Arc::new(MemoryCache::new(256));
        let state = tempfile::tempdir().unwrap();
        let log = Arc::new(JsonPersistenceLog::new(state.path().join("persisted.json")));
        let cache = TwoTierCache::new(
            backend.clone(),
            KeyBuilder::new("test"),
            CacheTtls::default(),
            Duration::from_secs(5),
        );
        let throttle = RefreshThrottle::new(log.clone(), Duration::from_secs(5));
        let service = DocumentationService::new(
            store.clone(),
            cache,
            throttle,
            ServiceOptions::default(),
        );
        Harness {
            store,
            backend,
            service,
            _state: state,
            log,
        }
    }

    fn ten_docs() -> MockStore {
        let mut store = MockStore::new();
        for i in 0..10 {
            store = store.with_file(&format!("docs/page-{i:02}.md"), &format!("# Page {i}"));
        }
        store
    }

    fn id() -> RepositoryId {
        RepositoryId::new("acme", "widgets")
    }

    #[tokio::test]
    async fn test_miss_runs_full_cycle_and_populates_cache() {
        let h = harness(ten_docs());
        let cancel = CancellationToken::new();

        let set = h
            .service
            .fetch_documentation(&id(), Some("main"), 3, &cancel)
            .await
            .unwrap();

        assert_eq!(set.documents.len(), 10);
        assert!(!set.from_cache);
        assert!(!set.from_partial_cache);
        assert_eq!(h.store.file_fetches().len(), 10);

        let repo = id().at("main").unwrap();
        let index_key = h.service.cache.keys().documentation_index(&repo);
        assert!(h.backend.get(&index_key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_complete_hit_makes_no_store_calls() {
        let h = harness(ten_docs());
        let cancel = CancellationToken::new();
        let first = h
            .service
            .fetch_documentation(&id(), None, 3, &cancel)
            .await
            .unwrap();
        h.store.reset_calls();

        // Default branch again: repository metadata is cached too.
        let second = h
            .service
            .fetch_documentation(&id(), None, 3, &cancel)
            .await
            .unwrap();

        assert!(second.from_cache);
        assert_eq!(second.documents, first.documents);
        assert!(h.store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_identical_files_still_reach_a_complete_hit() {
        let h = harness(
            MockStore::new()
                .with_file("docs/v1/intro.md", "same text")
                .with_file("docs/v2/intro.md", "same text")
                .with_file("docs/other.md", "other text"),
        );
        let cancel = CancellationToken::new();
        let first = h
            .service
            .fetch_documentation(&id(), Some("main"), 2, &cancel)
            .await
            .unwrap();
        assert_eq!(first.documents.len(), 3);

        for _ in 0..3 {
            h.store.reset_calls();
            let again = h
                .service
                .fetch_documentation(&id(), Some("main"), 2, &cancel)
                .await
                .unwrap();

            assert!(again.from_cache);
            assert!(h.store.file_fetches().is_empty());
            assert_eq!(again.documents, first.documents);
        }

        let v2 = first
            .documents
            .iter()
            .find(|doc| doc.path == "docs/v2/intro.md")
            .unwrap();
        assert!(v2.url.ends_with("docs/v2/intro.md"));
        assert_eq!(v2.content, "same text");
    }

    #[tokio::test]
    async fn test_partial_hit_fetches_only_missing() {
        let h = harness(ten_docs());
        let cancel = CancellationToken::new();
        let first = h
            .service
            .fetch_documentation(&id(), Some("main"), 4, &cancel)
            .await
            .unwrap();

        let repo = id().at("main").unwrap();
        let evicted: Vec<&DocumentContent> = first.documents.iter().skip(7).collect();
        for doc in &evicted {
            let key = h.service.cache.keys().document_content(&repo, &doc.sha);
            h.backend.delete(&key).await.unwrap();
        }
        h.store.reset_calls();

        let second = h
            .service
            .fetch_documentation(&id(), Some("main"), 4, &cancel)
            .await
            .unwrap();

        assert!(second.from_partial_cache);
        assert!(!second.from_cache);
        assert_eq!(second.documents, first.documents);

        let mut fetched = h.store.file_fetches();
        fetched.sort();
        let mut expected: Vec<String> = evicted.iter().map(|doc| doc.path.clone()).collect();
        expected.sort();
        assert_eq!(fetched, expected);
        assert_eq!(h.store.count(|c| matches!(c, Call::PathExists(_) | Call::ListDirectory(_))), 0);

        // The refetched content is cached again: next time is a complete hit.
        h.store.reset_calls();
        let third = h
            .service
            .fetch_documentation(&id(), Some("main"), 4, &cancel)
            .await
            .unwrap();
        assert!(third.from_cache);
        assert!(h.store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_partial_hit_survives_failed_refetch() {
        let h = harness(
            MockStore::new()
                .with_file("docs/a.md", "a")
                .with_file("docs/b.md", "b"),
        );
        let cancel = CancellationToken::new();
        let first = h
            .service
            .fetch_documentation(&id(), Some("main"), 2, &cancel)
            .await
            .unwrap();

        // Evict b from the content tier; the second store fails to serve it.
        let repo = id().at("main").unwrap();
        let b = first.documents.iter().find(|d| d.path == "docs/b.md").unwrap();
        h.backend
            .delete(&h.service.cache.keys().document_content(&repo, &b.sha))
            .await
            .unwrap();

        let broken = harness(MockStore::new().with_failing_file("docs/b.md", "b"));
        let service = DocumentationService::new(
            broken.store.clone(),
            TwoTierCache::new(
                h.backend.clone(),
                KeyBuilder::new("test"),
                CacheTtls::default(),
                Duration::from_secs(5),
            ),
            RefreshThrottle::new(broken.log.clone(), Duration::from_secs(5)),
            ServiceOptions::default(),
        );

        let second = service
            .fetch_documentation(&id(), Some("main"), 2, &cancel)
            .await
            .unwrap();
        assert!(second.from_partial_cache);
        assert_eq!(second.documents.len(), 1);
        assert_eq!(second.documents[0].path, "docs/a.md");
        assert_eq!(second.fetch_errors.len(), 1);
    }

    struct ReadOnlyBackend;

    #[async_trait]
    impl CacheBackend for ReadOnlyBackend {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Ok(None)
        }

        async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("read-only".into()))
        }

        async fn delete(&self, _key: &str) -> Result<(), CacheError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_cache_write_failure_does_not_fail_request() {
        let store = Arc::new(ten_docs());
        let state = tempfile::tempdir().unwrap();
        let service = DocumentationService::new(
            store.clone(),
            TwoTierCache::new(
                Arc::new(ReadOnlyBackend),
                KeyBuilder::new("test"),
                CacheTtls::default(),
                Duration::from_secs(5),
            ),
            RefreshThrottle::new(
                Arc::new(JsonPersistenceLog::new(state.path().join("p.json"))),
                Duration::from_secs(5),
            ),
            ServiceOptions::default(),
        );

        let set = service
            .fetch_documentation(&id(), Some("main"), 5, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(set.documents.len(), 10);
    }

    #[tokio::test]
    async fn test_empty_default_branch_is_an_error() {
        let h = harness(ten_docs().with_default_branch(""));
        let err = h
            .service
            .fetch_documentation(&id(), None, 2, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DocsError::MissingDefaultBranch { .. }));
    }

    #[tokio::test]
    async fn test_default_branch_is_pinned() {
        let h = harness(ten_docs().with_default_branch("trunk"));
        let set = h
            .service
            .fetch_documentation(&id(), Some("  "), 2, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(set.repository.reference(), "trunk");
    }

    #[tokio::test]
    async fn test_unqualified_refresh_is_throttled_on_miss() {
        let h = harness(ten_docs());
        let cancel = CancellationToken::new();
        h.log.record_persisted(&id(), Utc::now()).await.unwrap();

        let err = h
            .service
            .refresh_documentation(&id(), &RefreshRequest::default(), 2, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, DocsError::RefreshThrottled { .. }));
        assert_eq!(h.store.file_fetches().len(), 0);

        // Naming a ref goes straight through.
        let request = RefreshRequest {
            reference: Some("main".into()),
            force: false,
        };
        let set = h
            .service
            .refresh_documentation(&id(), &request, 2, &cancel)
            .await
            .unwrap();
        assert_eq!(set.documents.len(), 10);
    }

    #[tokio::test]
    async fn test_forced_refresh_refetches_and_records() {
        let h = harness(ten_docs());
        let cancel = CancellationToken::new();
        h.service
            .fetch_documentation(&id(), None, 2, &cancel)
            .await
            .unwrap();
        h.store.reset_calls();

        let request = RefreshRequest {
            reference: None,
            force: true,
        };
        let set = h
            .service
            .refresh_documentation(&id(), &request, 2, &cancel)
            .await
            .unwrap();

        assert!(!set.from_cache);
        assert_eq!(h.store.file_fetches().len(), 10);
        assert!(h.log.last_persisted_at(&id()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_no_documentation_surfaces_not_found_kind() {
        let h = harness(MockStore::new().with_file("src/lib.rs", "fn f() {}"));
        let err = h
            .service
            .fetch_documentation(&id(), Some("main"), 2, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);
    }
}
