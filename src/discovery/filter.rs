// src/discovery/filter.rs
// =============================================================================
// Which folders and files count as documentation.
// =============================================================================

/// Probed in this order; the first one that exists is adopted.
pub const KNOWN_DOC_FOLDERS: &[&str] = &[
    "docs",
    "src/content",
    "src/docs",
    "Documentation",
    "documentation",
    "doc",
];

/// Top-level folder names matched case-insensitively when scanning the root.
pub const ROOT_DOC_FOLDERS: &[&str] = &["docs", "documentation", "doc"];

/// Extensions used for the tree scan and for search queries.
pub const MARKDOWN_EXTENSIONS: &[&str] = &["md", "mdx", "markdown"];

/// Extensions the code-search fallback queries for.
pub const SEARCH_EXTENSIONS: &[&str] = &["md", "mdx"];

const WELL_KNOWN_STEMS: &[&str] = &[
    "readme",
    "contributing",
    "changelog",
    "changes",
    "license",
    "code_of_conduct",
];

// Plain-text variants of the well-known files ("README", "CHANGELOG.txt").
const WELL_KNOWN_PLAIN_EXTENSIONS: &[&str] = &["", "txt", "rst"];

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

// (stem, extension) split on the last dot; dotfiles have no stem.
fn split_name(name: &str) -> (&str, &str) {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, ext),
        _ => (name, ""),
    }
}

pub fn is_markdown_file(path: &str) -> bool {
    let (stem, ext) = split_name(file_name(path));
    !stem.is_empty()
        && !ext.is_empty()
        && MARKDOWN_EXTENSIONS
            .iter()
            .any(|known| known.eq_ignore_ascii_case(ext))
}

/// README / CONTRIBUTING / CHANGELOG style files in any common text format.
pub fn is_well_known_doc(path: &str) -> bool {
    let (stem, ext) = split_name(file_name(path));
    let stem = stem.to_ascii_lowercase();
    // "README.zh-CN.md" -> "readme"
    let base = stem.split('.').next().unwrap_or(&stem);
    WELL_KNOWN_STEMS.contains(&base)
        && (is_markdown_file(path)
            || WELL_KNOWN_PLAIN_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext)))
}

pub fn is_documentation_file(path: &str) -> bool {
    is_markdown_file(path) || is_well_known_doc(path)
}
