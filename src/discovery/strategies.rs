// src/discovery/strategies.rs
// =============================================================================
// The four path-resolution strategies, cheapest first.
//
// Rust concepts:
// - #[async_trait] impls: each strategy is a small struct behind
//   `Box<dyn ResolveStrategy>`
// - VecDeque as a work queue for walking a folder breadth-first
// - tokio::select! to make the rate-limit sleep cancellable
// =============================================================================

use super::filter::{
    is_documentation_file, is_markdown_file, KNOWN_DOC_FOLDERS, ROOT_DOC_FOLDERS,
    SEARCH_EXTENSIONS,
};
use super::{Resolution, ResolveContext, ResolveStrategy};
use crate::error::{DocsError, Result};
use crate::models::{EntryKind, TreeEntryKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, info, warn};

// Used when a rate-limit response carries no reset time.
const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

/// Probes a fixed list of well-known folders and adopts the first one that
/// exists.
pub struct KnownFolderProbe {
    folders: &'static [&'static str],
}

impl Default for KnownFolderProbe {
    fn default() -> Self {
        Self {
            folders: KNOWN_DOC_FOLDERS,
        }
    }
}

#[async_trait]
impl ResolveStrategy for KnownFolderProbe {
    fn name(&self) -> &'static str {
        "known-folder"
    }

    async fn resolve(&self, ctx: &ResolveContext<'_>) -> Resolution {
        let mut first_error = None;

        for folder in self.folders {
            let probe = ctx
                .call("path probe", ctx.store.path_exists(ctx.repo, folder))
                .await;
            match probe {
                Ok(true) => {
                    debug!(folder, repo = %ctx.repo, "adopting documentation folder");
                    // Adopted even if it turns out to hold no documentation;
                    // the next strategy takes over in that case.
                    return collect_folder(ctx, folder).await;
                }
                Ok(false) => {}
                Err(err) if err.is_cancelled() => return Resolution::Failed(err),
                Err(err) => {
                    warn!(folder, error = %err, "folder probe failed");
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Resolution::Failed(err),
            None => Resolution::NotFound,
        }
    }
}

/// Lists the repository root and collects from any top-level folder whose
/// name matches a documentation folder name, ignoring case.
pub struct RootScanProbe {
    names: &'static [&'static str],
}

impl Default for RootScanProbe {
    fn default() -> Self {
        Self {
            names: ROOT_DOC_FOLDERS,
        }
    }
}

#[async_trait]
impl ResolveStrategy for RootScanProbe {
    fn name(&self) -> &'static str {
        "root-scan"
    }

    async fn resolve(&self, ctx: &ResolveContext<'_>) -> Resolution {
        let root = match ctx
            .call("root listing", ctx.store.list_directory(ctx.repo, ""))
            .await
        {
            Ok(entries) => entries,
            Err(err) if err.is_not_found() => return Resolution::NotFound,
            Err(err) => return Resolution::Failed(err),
        };

        let candidates: Vec<String> = root
            .into_iter()
            .filter(|entry| entry.kind == EntryKind::Dir)
            .filter(|entry| self.names.iter().any(|name| name.eq_ignore_ascii_case(&entry.name)))
            .map(|entry| entry.path)
            .collect();

        let mut paths = Vec::new();
        for folder in &candidates {
            match collect_folder(ctx, folder).await {
                Resolution::Found(found) => paths.extend(found),
                Resolution::NotFound => {}
                Resolution::Failed(err) if err.is_cancelled() => return Resolution::Failed(err),
                Resolution::Failed(err) => warn!(folder = %folder, error = %err, "root folder scan failed"),
            }
        }

        if paths.is_empty() {
            Resolution::NotFound
        } else {
            Resolution::Found(paths)
        }
    }
}

/// One recursive tree call for the whole ref, filtered by extension.
pub struct TreeScan;

#[async_trait]
impl ResolveStrategy for TreeScan {
    fn name(&self) -> &'static str {
        "tree-scan"
    }

    async fn resolve(&self, ctx: &ResolveContext<'_>) -> Resolution {
        let tree_sha = match ctx
            .call("commit lookup", ctx.store.commit_tree_sha(ctx.repo))
            .await
        {
            Ok(sha) => sha,
            Err(err) if err.is_not_found() => return Resolution::NotFound,
            Err(err) => return Resolution::Failed(err),
        };

        let tree = match ctx
            .call("tree listing", ctx.store.recursive_tree(&ctx.repo.id, &tree_sha))
            .await
        {
            Ok(tree) => tree,
            Err(err) if err.is_not_found() => return Resolution::NotFound,
            Err(err) => return Resolution::Failed(err),
        };

        if tree.truncated {
            warn!(repo = %ctx.repo, "recursive tree was truncated, results are partial");
        }

        let paths: Vec<String> = tree
            .entries
            .into_iter()
            .filter(|entry| entry.kind == TreeEntryKind::Blob && is_markdown_file(&entry.path))
            .map(|entry| entry.path)
            .collect();

        if paths.is_empty() {
            Resolution::NotFound
        } else {
            Resolution::Found(paths)
        }
    }
}

/// Last resort: the code search API, one query per extension, all pages.
///
/// A rate-limited page is retried once after waiting for the reset time, as
/// long as that wait fits inside `max_wait`.
pub struct CodeSearch {
    max_wait: Duration,
}

impl CodeSearch {
    pub fn new(max_wait: Duration) -> Self {
        Self { max_wait }
    }

    async fn search_all_pages(&self, ctx: &ResolveContext<'_>, query: &str) -> Result<Vec<String>> {
        let mut paths = Vec::new();
        let mut page = 1;
        let mut retried = false;

        loop {
            let result = ctx
                .call("code search", ctx.store.search_code(&ctx.repo.id, query, page))
                .await;
            let hits = match result {
                Ok(hits) => hits,
                Err(DocsError::RateLimited { reset_at }) if !retried => {
                    retried = true;
                    self.wait_for_reset(ctx, reset_at).await?;
                    continue;
                }
                Err(err) => return Err(err),
            };
            retried = false;

            paths.extend(hits.paths.into_iter().filter(|path| is_documentation_file(path)));

            match hits.next_page {
                Some(next) if next > page => page = next,
                _ => break,
            }
        }

        Ok(paths)
    }

    async fn wait_for_reset(&self, ctx: &ResolveContext<'_>, reset_at: Option<DateTime<Utc>>) -> Result<()> {
        let wait = match reset_at {
            Some(at) => (at - Utc::now()).to_std().unwrap_or(Duration::ZERO),
            None => DEFAULT_RATE_LIMIT_WAIT,
        };
        if wait > self.max_wait {
            return Err(DocsError::RateLimited { reset_at });
        }

        info!(wait_secs = wait.as_secs(), "search rate limited, waiting for reset");
        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => Err(DocsError::Cancelled),
            _ = tokio::time::sleep(wait) => Ok(()),
        }
    }
}

#[async_trait]
impl ResolveStrategy for CodeSearch {
    fn name(&self) -> &'static str {
        "code-search"
    }

    async fn resolve(&self, ctx: &ResolveContext<'_>) -> Resolution {
        let mut paths = Vec::new();
        let mut first_error = None;

        for extension in SEARCH_EXTENSIONS {
            let query = format!("extension:{extension}");
            match self.search_all_pages(ctx, &query).await {
                Ok(found) => paths.extend(found),
                Err(err) if err.is_cancelled() => return Resolution::Failed(err),
                Err(err) => {
                    warn!(%query, error = %err, "code search failed");
                    first_error.get_or_insert(err);
                }
            }
        }

        match (paths.is_empty(), first_error) {
            (false, _) => Resolution::Found(paths),
            (true, Some(err)) => Resolution::Failed(err),
            (true, None) => Resolution::NotFound,
        }
    }
}

/// Walks `folder` breadth-first and keeps markdown files.
///
/// A failure listing `folder` itself fails the strategy. Failures further
/// down only drop that subtree.
async fn collect_folder(ctx: &ResolveContext<'_>, folder: &str) -> Resolution {
    let mut paths = Vec::new();
    let mut queue = VecDeque::from([folder.to_string()]);

    while let Some(current) = queue.pop_front() {
        let listing = ctx
            .call("directory listing", ctx.store.list_directory(ctx.repo, &current))
            .await;
        let entries = match listing {
            Ok(entries) => entries,
            Err(err) if err.is_cancelled() => return Resolution::Failed(err),
            Err(err) if current == folder => {
                if err.is_not_found() {
                    return Resolution::NotFound;
                }
                return Resolution::Failed(err);
            }
            Err(err) if err.is_not_found() => continue,
            Err(err) => {
                warn!(directory = %current, error = %err, "skipping unreadable directory");
                continue;
            }
        };

        for entry in entries {
            match entry.kind {
                EntryKind::File if is_documentation_file(&entry.path) => paths.push(entry.path),
                EntryKind::Dir => queue.push_back(entry.path),
                _ => {}
            }
        }
    }

    if paths.is_empty() {
        debug!(folder, "folder holds no documentation");
        Resolution::NotFound
    } else {
        Resolution::Found(paths)
    }
}
