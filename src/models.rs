// src/models.rs
// =============================================================================
// Data types shared by every layer.
//
// - RepositoryId / RepositoryRef: which repository, and which snapshot of it
// - Content store shapes: RepositoryMeta, DirEntry, RecursiveTree, RemoteFile,
//   SearchPage
// - Documentation shapes: DocumentContent (the artifact), DocumentMetadata and
//   DocumentationIndex (the cached "table of contents")
// =============================================================================

use crate::error::{DocsError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An `owner/name` pair, without any version information.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryId {
    pub owner: String,
    pub name: String,
}

impl RepositoryId {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// Pins this repository to a concrete ref.
    ///
    /// A blank ref is rejected: "use the default branch" has to be resolved
    /// before a `RepositoryRef` exists, so it can never leak into a cache key.
    pub fn at(&self, reference: impl Into<String>) -> Result<RepositoryRef> {
        let reference = reference.into();
        let trimmed = reference.trim();
        if trimmed.is_empty() {
            return Err(DocsError::InvalidRepository(format!(
                "{} requires a concrete ref",
                self.full_name()
            )));
        }
        Ok(RepositoryRef {
            id: self.clone(),
            reference: trimmed.to_string(),
        })
    }
}

impl fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// A repository snapshot: (owner, name, concrete ref).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryRef {
    pub id: RepositoryId,
    pub reference: String,
}

impl RepositoryRef {
    pub fn owner(&self) -> &str {
        &self.id.owner
    }

    pub fn name(&self) -> &str {
        &self.id.name
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }
}

impl fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.reference)
    }
}

/// The subset of repository metadata the core needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryMeta {
    pub full_name: String,
    pub default_branch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub stars: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Other,
}

impl EntryKind {
    pub fn from_api(kind: &str) -> Self {
        match kind {
            "file" => Self::File,
            "dir" => Self::Dir,
            _ => Self::Other,
        }
    }
}

/// One row of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub path: String,
    pub kind: EntryKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeEntryKind {
    Blob,
    Tree,
    Commit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: String,
    pub kind: TreeEntryKind,
}

/// Full recursive listing of a git tree.
#[derive(Debug, Clone, Default)]
pub struct RecursiveTree {
    pub entries: Vec<TreeEntry>,
    /// GitHub caps recursive trees; when set, `entries` is incomplete.
    pub truncated: bool,
}

/// A file as returned by the content store, still encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub path: String,
    /// `Some("base64")` for normal files, `Some("none")` for files too large
    /// for inline content, `None` when the content is already plain text.
    pub encoding: Option<String>,
    pub content: String,
    pub sha: String,
    pub size: u64,
    pub html_url: Option<String>,
}

/// One page of code-search results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPage {
    pub paths: Vec<String>,
    pub next_page: Option<u32>,
}

/// A fetched documentation file.
///
/// `sha` is the content store's identity token: same path + same ref + same
/// sha means byte-identical content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentContent {
    pub repository: String,
    pub path: String,
    pub content: String,
    pub size: u64,
    pub sha: String,
    pub url: String,
}

impl DocumentContent {
    pub fn metadata(&self, created_at: DateTime<Utc>) -> DocumentMetadata {
        DocumentMetadata {
            path: self.path.clone(),
            size: self.size,
            sha: self.sha.clone(),
            created_at,
        }
    }
}

/// Lightweight manifest entry pointing at a cached `DocumentContent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub path: String,
    pub size: u64,
    pub sha: String,
    pub created_at: DateTime<Utc>,
}

/// The cached table of contents for one `RepositoryRef`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentationIndex {
    pub repository_owner: String,
    pub repository_name: String,
    pub repository_ref: String,
    pub document_count: usize,
    pub created_at: DateTime<Utc>,
    pub documents: Vec<DocumentMetadata>,
}

impl DocumentationIndex {
    /// Builds the manifest from content that was just fetched, so every
    /// entry is backed by a real `DocumentContent`.
    pub fn from_documents(
        repo: &RepositoryRef,
        documents: &[DocumentContent],
        created_at: DateTime<Utc>,
    ) -> Self {
        let documents: Vec<DocumentMetadata> =
            documents.iter().map(|doc| doc.metadata(created_at)).collect();
        Self {
            repository_owner: repo.owner().to_string(),
            repository_name: repo.name().to_string(),
            repository_ref: repo.reference().to_string(),
            document_count: documents.len(),
            created_at,
            documents,
        }
    }
}
