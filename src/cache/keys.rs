// src/cache/keys.rs
// =============================================================================
// Cache key layout:
//
//   <prefix>:repo:<owner>:<name>                      repository metadata
//   <prefix>:doc_metadata:<owner>:<name>:<ref>        documentation index
//   <prefix>:doc_content:<owner>:<name>:<ref>:<sha>   one file's content
//
// Keys are built from RepositoryRef, which can't hold an empty ref, so an
// unresolved "default branch" request never gets a key of its own.
// =============================================================================

use crate::models::{RepositoryId, RepositoryRef};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBuilder {
    prefix: String,
}

impl KeyBuilder {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn repository(&self, id: &RepositoryId) -> String {
        format!("{}:repo:{}:{}", self.prefix, id.owner, id.name)
    }

    pub fn documentation_index(&self, repo: &RepositoryRef) -> String {
        format!(
            "{}:doc_metadata:{}:{}:{}",
            self.prefix,
            repo.owner(),
            repo.name(),
            repo.reference()
        )
    }

    pub fn document_content(&self, repo: &RepositoryRef, sha: &str) -> String {
        format!(
            "{}:doc_content:{}:{}:{}:{}",
            self.prefix,
            repo.owner(),
            repo.name(),
            repo.reference(),
            sha
        )
    }
}
