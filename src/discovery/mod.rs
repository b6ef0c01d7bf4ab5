// src/discovery/mod.rs
// =============================================================================
// Finds where documentation lives in a repository whose layout is unknown.
//
// The resolver walks an ordered list of strategies and stops at the first one
// that finds at least one file:
//   1. KnownFolderProbe  - does docs/, src/content/, ... exist?
//   2. RootScanProbe     - any Docs/DOCUMENTATION/doc folder at the root?
//   3. TreeScan          - one recursive tree call, filter by extension
//   4. CodeSearch        - search API, last resort
//
// "Not found" and "failed" both move on to the next strategy. Only
// cancellation stops the chain early.
// =============================================================================

mod filter;
mod strategies;

pub use filter::{
    is_documentation_file, is_markdown_file, is_well_known_doc, KNOWN_DOC_FOLDERS,
    MARKDOWN_EXTENSIONS, ROOT_DOC_FOLDERS, SEARCH_EXTENSIONS,
};
pub use strategies::{CodeSearch, KnownFolderProbe, RootScanProbe, TreeScan};

use crate::budget::guarded;
use crate::error::{DocsError, Result};
use crate::github::ContentStore;
use crate::models::RepositoryRef;
use async_trait::async_trait;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Outcome of one strategy.
#[derive(Debug)]
pub enum Resolution {
    Found(Vec<String>),
    NotFound,
    Failed(DocsError),
}

/// Everything a strategy needs for one resolution run.
pub struct ResolveContext<'a> {
    pub store: &'a dyn ContentStore,
    pub repo: &'a RepositoryRef,
    pub budget: Duration,
    pub cancel: &'a CancellationToken,
}

impl ResolveContext<'_> {
    /// Runs a content-store call under the timeout budget and the request's
    /// cancellation token.
    pub async fn call<T, F>(&self, operation: &str, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        guarded(self.cancel, self.budget, operation, future).await
    }
}

#[async_trait]
pub trait ResolveStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn resolve(&self, ctx: &ResolveContext<'_>) -> Resolution;
}

/// The standard fallback chain.
pub fn default_strategies(max_rate_limit_wait: Duration) -> Vec<Box<dyn ResolveStrategy>> {
    vec![
        Box::new(KnownFolderProbe::default()),
        Box::new(RootScanProbe::default()),
        Box::new(TreeScan),
        Box::new(CodeSearch::new(max_rate_limit_wait)),
    ]
}

pub struct PathResolver {
    store: Arc<dyn ContentStore>,
    strategies: Vec<Box<dyn ResolveStrategy>>,
    budget: Duration,
}

impl PathResolver {
    pub fn new(store: Arc<dyn ContentStore>, budget: Duration, max_rate_limit_wait: Duration) -> Self {
        Self::with_strategies(store, budget, default_strategies(max_rate_limit_wait))
    }

    pub fn with_strategies(
        store: Arc<dyn ContentStore>,
        budget: Duration,
        strategies: Vec<Box<dyn ResolveStrategy>>,
    ) -> Self {
        Self {
            store,
            strategies,
            budget,
        }
    }

    /// Ordered, de-duplicated documentation paths for `repo`.
    ///
    /// Returns [`DocsError::NoDocumentation`] when every strategy comes up
    /// empty; that outcome is terminal for this ref.
    pub async fn resolve(&self, repo: &RepositoryRef, cancel: &CancellationToken) -> Result<Vec<String>> {
        let ctx = ResolveContext {
            store: self.store.as_ref(),
            repo,
            budget: self.budget,
            cancel,
        };

        for strategy in &self.strategies {
            if cancel.is_cancelled() {
                return Err(DocsError::Cancelled);
            }

            match strategy.resolve(&ctx).await {
                Resolution::Found(paths) => {
                    let paths = dedupe(paths);
                    if paths.is_empty() {
                        debug!(strategy = strategy.name(), %repo, "strategy returned no paths");
                        continue;
                    }
                    info!(
                        strategy = strategy.name(),
                        %repo,
                        count = paths.len(),
                        "documentation paths resolved"
                    );
                    return Ok(paths);
                }
                Resolution::NotFound => {
                    debug!(strategy = strategy.name(), %repo, "nothing found, trying next strategy");
                }
                Resolution::Failed(err) if err.is_cancelled() => return Err(err),
                Resolution::Failed(err) => {
                    warn!(strategy = strategy.name(), %repo, error = %err, "strategy failed, trying next");
                }
            }
        }

        info!(%repo, "no documentation found");
        Err(DocsError::NoDocumentation {
            repository: repo.to_string(),
        })
    }
}

fn dedupe(mut paths: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    paths.retain(|path| seen.insert(path.clone()));
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RepositoryId;
    use crate::testing::{Call, MockStore};

    fn repo() -> RepositoryRef {
        RepositoryId::new("acme", "widgets").at("main").unwrap()
    }

    fn resolver(store: Arc<MockStore>) -> PathResolver {
        PathResolver::new(store, Duration::from_secs(5), Duration::from_secs(30))
    }

    #[tokio::test]
    async fn test_known_folder_short_circuits_the_chain() {
        let store = Arc::new(
            MockStore::new()
                .with_file("docs/intro.md", "# Intro")
                .with_file("docs/guide/setup.mdx", "setup")
                .with_file("docs/logo.png", "png")
                .with_file("README.md", "# Widgets")
                .with_tree_sha("tree-1"),
        );

        let paths = resolver(store.clone())
            .resolve(&repo(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(paths, vec!["docs/intro.md", "docs/guide/setup.mdx"]);
        assert_eq!(store.count(|c| matches!(c, Call::CommitTree | Call::RecursiveTree)), 0);
        assert_eq!(store.count(|c| matches!(c, Call::SearchCode { .. })), 0);
        // Only the first folder needed probing.
        assert_eq!(store.count(|c| matches!(c, Call::PathExists(_))), 1);
    }

    #[tokio::test]
    async fn test_root_scan_matches_case_insensitively() {
        let store = Arc::new(
            MockStore::new()
                .with_file("DOCS/index.md", "# Index")
                .with_file("DOCS/api/reference.md", "ref")
                .with_file("src/lib.rs", "fn main() {}"),
        );

        let paths = resolver(store.clone())
            .resolve(&repo(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(paths, vec!["DOCS/index.md", "DOCS/api/reference.md"]);
        assert!(store.calls().contains(&Call::ListDirectory(String::new())));
    }

    #[tokio::test]
    async fn test_tree_scan_when_no_folder_exists() {
        let store = Arc::new(
            MockStore::new()
                .with_file("README.md", "# Top")
                .with_file("packages/core/GUIDE.md", "guide")
                .with_file("packages/core/index.ts", "export {}")
                .with_tree_sha("tree-1"),
        );

        let mut paths = resolver(store.clone())
            .resolve(&repo(), &CancellationToken::new())
            .await
            .unwrap();
        paths.sort();

        assert_eq!(paths, vec!["README.md", "packages/core/GUIDE.md"]);
        assert_eq!(store.count(|c| matches!(c, Call::SearchCode { .. })), 0);
    }

    #[tokio::test]
    async fn test_search_fallback_paginates_and_filters() {
        let store = Arc::new(
            MockStore::new()
                .with_file("src/main.rs", "fn main() {}")
                .with_search_page("extension:md", 1, &["README.md", "a/notes.md"], Some(2))
                .with_search_page("extension:md", 2, &["b/more.md", "README.md"], None)
                .with_search_page("extension:mdx", 1, &["site/page.mdx"], None),
        );

        let paths = resolver(store.clone())
            .resolve(&repo(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(paths, vec!["README.md", "a/notes.md", "b/more.md", "site/page.mdx"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_retries_same_page_once_after_rate_limit() {
        let store = Arc::new(
            MockStore::new()
                .with_search_page("extension:md", 1, &["README.md"], None)
                .with_rate_limit_once("extension:md", 1),
        );

        let paths = resolver(store.clone())
            .resolve(&repo(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(paths, vec!["README.md"]);
        let page_one_calls = store.count(|c| {
            matches!(c, Call::SearchCode { query, page: 1 } if query == "extension:md")
        });
        assert_eq!(page_one_calls, 2);
    }

    #[tokio::test]
    async fn test_probe_errors_fall_through() {
        let store = Arc::new(
            MockStore::new()
                .with_failing_probe("docs")
                .with_file("documentation/usage.md", "usage"),
        );

        let paths = resolver(store)
            .resolve(&repo(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(paths, vec!["documentation/usage.md"]);
    }

    #[tokio::test]
    async fn test_known_folder_keeps_well_known_plain_files() {
        let store = Arc::new(
            MockStore::new()
                .with_file("docs/guide.md", "# Guide")
                .with_file("docs/README", "read me")
                .with_file("docs/CHANGELOG.txt", "1.0: first")
                .with_file("docs/build.sh", "#!/bin/sh"),
        );

        let mut paths = resolver(store)
            .resolve(&repo(), &CancellationToken::new())
            .await
            .unwrap();
        paths.sort();

        assert_eq!(paths, vec!["docs/CHANGELOG.txt", "docs/README", "docs/guide.md"]);
    }

    #[tokio::test]
    async fn test_folder_without_docs_falls_through() {
        let store = Arc::new(
            MockStore::new()
                .with_file("docs/diagram.svg", "<svg/>")
                .with_file("CONTRIBUTING.md", "be nice")
                .with_tree_sha("tree-1"),
        );

        let paths = resolver(store)
            .resolve(&repo(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(paths, vec!["CONTRIBUTING.md"]);
    }

    #[tokio::test]
    async fn test_nothing_found_is_terminal() {
        let store = Arc::new(MockStore::new().with_file("src/lib.rs", "pub fn f() {}"));

        let err = resolver(store)
            .resolve(&repo(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, DocsError::NoDocumentation { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let store = Arc::new(MockStore::new().with_file("docs/a.md", "a"));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = resolver(store.clone()).resolve(&repo(), &cancel).await.unwrap_err();

        assert!(err.is_cancelled());
        assert!(store.calls().is_empty());
    }
}
