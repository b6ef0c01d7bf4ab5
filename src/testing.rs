// src/testing.rs
// =============================================================================
// In-memory ContentStore for unit tests.
//
// Builds a fake repository from `with_file` / `with_dir` calls and records
// every call made against it, so tests can assert which network calls a code
// path would have made (and how many ran at once).
// =============================================================================

use crate::error::{DocsError, Result};
use crate::github::ContentStore;
use crate::models::{
    DirEntry, EntryKind, RecursiveTree, RemoteFile, RepositoryId, RepositoryMeta, RepositoryRef,
    SearchPage, TreeEntry, TreeEntryKind,
};
use async_trait::async_trait;
use base64::Engine;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    RepositoryMeta,
    CommitTree,
    PathExists(String),
    ListDirectory(String),
    FileContent(String),
    RecursiveTree,
    SearchCode { query: String, page: u32 },
}

pub(crate) fn sha_of(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

pub(crate) struct MockStore {
    default_branch: String,
    // directory path ("" = root) -> children by name
    dirs: BTreeMap<String, BTreeMap<String, DirEntry>>,
    files: HashMap<String, String>,
    tree_sha: Option<String>,
    search: HashMap<(String, u32), SearchPage>,
    rate_limited_once: Mutex<HashSet<(String, u32)>>,
    failing_files: HashSet<String>,
    failing_listings: HashSet<String>,
    failing_probes: HashSet<String>,
    bad_encoding: HashSet<String>,
    delay: Duration,
    calls: Mutex<Vec<Call>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl MockStore {
    pub(crate) fn new() -> Self {
        let mut dirs = BTreeMap::new();
        dirs.insert(String::new(), BTreeMap::new());
        Self {
            default_branch: "main".to_string(),
            dirs,
            files: HashMap::new(),
            tree_sha: None,
            search: HashMap::new(),
            rate_limited_once: Mutex::new(HashSet::new()),
            failing_files: HashSet::new(),
            failing_listings: HashSet::new(),
            failing_probes: HashSet::new(),
            bad_encoding: HashSet::new(),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_default_branch(mut self, branch: &str) -> Self {
        self.default_branch = branch.to_string();
        self
    }

    pub(crate) fn with_dir(mut self, path: &str) -> Self {
        self.register(path, EntryKind::Dir);
        self
    }

    pub(crate) fn with_file(mut self, path: &str, content: &str) -> Self {
        self.register(path, EntryKind::File);
        self.files.insert(path.to_string(), content.to_string());
        self
    }

    /// Listed in its directory, but 404s when fetched.
    pub(crate) fn with_vanished_file(mut self, path: &str) -> Self {
        self.register(path, EntryKind::File);
        self
    }

    pub(crate) fn with_failing_file(mut self, path: &str, content: &str) -> Self {
        self.failing_files.insert(path.to_string());
        self.with_file(path, content)
    }

    pub(crate) fn with_bad_encoding(mut self, path: &str, content: &str) -> Self {
        self.bad_encoding.insert(path.to_string());
        self.with_file(path, content)
    }

    pub(crate) fn with_failing_listing(mut self, path: &str) -> Self {
        self.failing_listings.insert(path.to_string());
        self
    }

    pub(crate) fn with_failing_probe(mut self, path: &str) -> Self {
        self.failing_probes.insert(path.to_string());
        self
    }

    pub(crate) fn with_tree_sha(mut self, sha: &str) -> Self {
        self.tree_sha = Some(sha.to_string());
        self
    }

    pub(crate) fn with_search_page(
        mut self,
        query: &str,
        page: u32,
        paths: &[&str],
        next_page: Option<u32>,
    ) -> Self {
        self.search.insert(
            (query.to_string(), page),
            SearchPage {
                paths: paths.iter().map(|path| path.to_string()).collect(),
                next_page,
            },
        );
        self
    }

    pub(crate) fn with_rate_limit_once(self, query: &str, page: u32) -> Self {
        self.rate_limited_once
            .lock()
            .unwrap()
            .insert((query.to_string(), page));
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn file_fetches(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::FileContent(path) => Some(path),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|call| predicate(call)).count()
    }

    pub(crate) fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub(crate) fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn register(&mut self, path: &str, kind: EntryKind) {
        let mut current = String::new();
        let segments: Vec<&str> = path.split('/').collect();
        for (position, segment) in segments.iter().enumerate() {
            let child_path = if current.is_empty() {
                segment.to_string()
            } else {
                format!("{current}/{segment}")
            };
            let child_kind = if position + 1 == segments.len() {
                kind
            } else {
                EntryKind::Dir
            };
            self.dirs.entry(current.clone()).or_default().insert(
                segment.to_string(),
                DirEntry {
                    name: segment.to_string(),
                    path: child_path.clone(),
                    kind: child_kind,
                },
            );
            if child_kind == EntryKind::Dir {
                self.dirs.entry(child_path.clone()).or_default();
            }
            current = child_path;
        }
    }
}

// Decrements the in-flight counter even when the task is aborted mid-sleep.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ContentStore for MockStore {
    async fn repository_meta(&self, repo: &RepositoryId) -> Result<RepositoryMeta> {
        self.record(Call::RepositoryMeta);
        Ok(RepositoryMeta {
            full_name: repo.full_name(),
            default_branch: self.default_branch.clone(),
            description: None,
            html_url: format!("https://github.com/{repo}"),
            stars: 0,
        })
    }

    async fn commit_tree_sha(&self, repo: &RepositoryRef) -> Result<String> {
        self.record(Call::CommitTree);
        self.tree_sha
            .clone()
            .ok_or_else(|| DocsError::not_found(format!("commit {repo}")))
    }

    async fn path_exists(&self, _repo: &RepositoryRef, path: &str) -> Result<bool> {
        self.record(Call::PathExists(path.to_string()));
        if self.failing_probes.contains(path) {
            return Err(DocsError::Upstream {
                status: 502,
                message: "bad gateway".into(),
            });
        }
        Ok(self.dirs.contains_key(path) || self.files.contains_key(path))
    }

    async fn list_directory(&self, _repo: &RepositoryRef, path: &str) -> Result<Vec<DirEntry>> {
        self.record(Call::ListDirectory(path.to_string()));
        if self.failing_listings.contains(path) {
            return Err(DocsError::Upstream {
                status: 500,
                message: "listing failed".into(),
            });
        }
        self.dirs
            .get(path)
            .map(|children| children.values().cloned().collect())
            .ok_or_else(|| DocsError::not_found(path))
    }

    async fn file_content(&self, _repo: &RepositoryRef, path: &str) -> Result<Option<RemoteFile>> {
        self.record(Call::FileContent(path.to_string()));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if self.failing_files.contains(path) {
            return Err(DocsError::Upstream {
                status: 500,
                message: format!("boom fetching {path}"),
            });
        }
        let Some(content) = self.files.get(path) else {
            return Ok(None);
        };

        let encoded = if self.bad_encoding.contains(path) {
            "%%% not base64 %%%".to_string()
        } else {
            format!("{}\n", base64::engine::general_purpose::STANDARD.encode(content))
        };

        Ok(Some(RemoteFile {
            path: path.to_string(),
            encoding: Some("base64".into()),
            content: encoded,
            sha: sha_of(content),
            size: content.len() as u64,
            html_url: Some(format!("https://github.com/mock/blob/{path}")),
        }))
    }

    async fn recursive_tree(&self, _repo: &RepositoryId, _tree_sha: &str) -> Result<RecursiveTree> {
        self.record(Call::RecursiveTree);
        let mut entries = Vec::new();
        for children in self.dirs.values() {
            for entry in children.values() {
                let kind = match entry.kind {
                    EntryKind::Dir => TreeEntryKind::Tree,
                    _ => TreeEntryKind::Blob,
                };
                entries.push(TreeEntry {
                    path: entry.path.clone(),
                    kind,
                });
            }
        }
        Ok(RecursiveTree {
            entries,
            truncated: false,
        })
    }

    async fn search_code(&self, _repo: &RepositoryId, query: &str, page: u32) -> Result<SearchPage> {
        self.record(Call::SearchCode {
            query: query.to_string(),
            page,
        });
        let key = (query.to_string(), page);
        if self.rate_limited_once.lock().unwrap().remove(&key) {
            return Err(DocsError::RateLimited {
                reset_at: Some(chrono::Utc::now() + chrono::Duration::seconds(1)),
            });
        }
        Ok(self.search.get(&key).cloned().unwrap_or_default())
    }
}
