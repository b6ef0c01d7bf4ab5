// src/github/mod.rs
// =============================================================================
// This module talks to the content store (GitHub).
//
// - ContentStore: the narrow contract the rest of the crate depends on
// - GitHubClient: the reqwest implementation of that contract
// - parse_repository: turns "owner/name" or a GitHub URL into a RepositoryId
//
// Discovery, fetching and the service only ever see `dyn ContentStore`, so
// tests swap in an in-memory store without touching the network.
// =============================================================================

mod client;
mod repo_url;

pub use client::{next_page_from_link, GitHubClient, GitHubClientConfig};
pub use repo_url::parse_repository;

use crate::error::Result;
use crate::models::{
    DirEntry, RecursiveTree, RemoteFile, RepositoryId, RepositoryMeta, RepositoryRef, SearchPage,
};
use async_trait::async_trait;

/// Individual network calls against a source-hosting provider.
///
/// Absence is reported structurally: `path_exists` returns `Ok(false)`,
/// `file_content` returns `Ok(None)`, everything else returns
/// [`DocsError::NotFound`](crate::error::DocsError::NotFound).
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn repository_meta(&self, repo: &RepositoryId) -> Result<RepositoryMeta>;

    /// Root tree identity of the commit `repo.reference` points at.
    async fn commit_tree_sha(&self, repo: &RepositoryRef) -> Result<String>;

    async fn path_exists(&self, repo: &RepositoryRef, path: &str) -> Result<bool>;

    /// Lists a directory; `""` is the repository root.
    async fn list_directory(&self, repo: &RepositoryRef, path: &str) -> Result<Vec<DirEntry>>;

    async fn file_content(&self, repo: &RepositoryRef, path: &str) -> Result<Option<RemoteFile>>;

    async fn recursive_tree(&self, repo: &RepositoryId, tree_sha: &str) -> Result<RecursiveTree>;

    /// Code search scoped to `repo`. `query` holds the extra qualifiers
    /// (e.g. `extension:md`); pages start at 1.
    async fn search_code(&self, repo: &RepositoryId, query: &str, page: u32) -> Result<SearchPage>;
}
