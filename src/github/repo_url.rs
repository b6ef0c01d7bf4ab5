// src/github/repo_url.rs
// =============================================================================
// Parses repository arguments into a RepositoryId.
//
// Supported formats:
//   - owner/repo
//   - https://github.com/owner/repo
//   - https://github.com/owner/repo.git
//   - github.com/owner/repo/tree/main/docs   (extra segments are ignored)
// =============================================================================

use crate::error::{DocsError, Result};
use crate::models::RepositoryId;

/// Parses `input` into owner and repository name.
///
/// Example:
///   "https://github.com/rust-lang/rust" -> ("rust-lang", "rust")
pub fn parse_repository(input: &str) -> Result<RepositoryId> {
    let trimmed = input.trim().trim_end_matches('/');

    // Remove common prefixes
    let stripped = trimmed
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_start_matches("www.");

    let path = match stripped.strip_prefix("github.com/") {
        Some(rest) => rest,
        None if stripped.contains("://") || !looks_like_slug(stripped) => {
            return Err(DocsError::InvalidRepository(format!(
                "expected owner/name or a GitHub URL, got: {input}"
            )));
        }
        None => stripped,
    };

    let mut parts = path.split('/').filter(|part| !part.is_empty());
    let owner = parts.next();
    let name = parts.next();

    match (owner, name) {
        (Some(owner), Some(name)) => {
            let name = name.trim_end_matches(".git");
            if name.is_empty() {
                return Err(DocsError::InvalidRepository(format!("missing repository name: {input}")));
            }
            Ok(RepositoryId::new(owner, name))
        }
        _ => Err(DocsError::InvalidRepository(format!(
            "expected owner/name or a GitHub URL, got: {input}"
        ))),
    }
}

// "vercel/next.js" is a slug; in "gitlab.com/owner/repo" the dot sits before
// the first slash, so it is a host.
fn looks_like_slug(value: &str) -> bool {
    match value.split_once('/') {
        Some((head, _)) => !head.contains('.'),
        None => false,
    }
}
