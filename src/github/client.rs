// src/github/client.rs
// =============================================================================
// GitHub REST implementation of ContentStore.
//
// Endpoints used:
// - GET /repos/{owner}/{repo}                       -> default branch
// - GET /repos/{owner}/{repo}/commits/{ref}         -> root tree sha
// - GET /repos/{owner}/{repo}/contents/{path}?ref=  -> file or directory
// - GET /repos/{owner}/{repo}/git/trees/{sha}?recursive=1
// - GET /search/code?q=repo:{owner}/{repo}+...      -> paginated via Link
//
// Every non-2xx response is classified into a DocsError variant right here,
// using the status code and rate-limit headers. Nothing downstream ever
// inspects an error message.
// =============================================================================

use super::ContentStore;
use crate::error::{DocsError, Result};
use crate::models::{
    DirEntry, EntryKind, RecursiveTree, RemoteFile, RepositoryId, RepositoryMeta, RepositoryRef,
    SearchPage, TreeEntry, TreeEntryKind,
};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LINK, RETRY_AFTER};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

const SEARCH_PAGE_SIZE: &str = "100";

/// Connection settings for [`GitHubClient`].
#[derive(Debug, Clone)]
pub struct GitHubClientConfig {
    pub api_url: String,
    pub token: Option<String>,
    pub user_agent: String,
    pub request_timeout: Duration,
}

/// reqwest-backed content store.
///
/// Cheap to share: `reqwest::Client` pools connections internally, so one
/// instance is built at startup and handed to every component.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: Client,
    api_base: Url,
}

impl GitHubClient {
    pub fn new(config: &GitHubClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(
            "x-github-api-version",
            HeaderValue::from_static("2022-11-28"),
        );

        if let Some(token) = config.token.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| DocsError::Configuration("GitHub token contains invalid characters".into()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let http = Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()?;

        let api_base = Url::parse(&config.api_url).map_err(|err| {
            DocsError::Configuration(format!("invalid GitHub API url `{}`: {err}", config.api_url))
        })?;
        if api_base.cannot_be_a_base() {
            return Err(DocsError::Configuration(format!(
                "GitHub API url `{}` cannot be used as a base",
                config.api_url
            )));
        }

        Ok(Self { http, api_base })
    }

    // Appends percent-encoded path segments to the API base.
    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| DocsError::Configuration("GitHub API url cannot be a base".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn contents_url(&self, repo: &RepositoryRef, path: &str) -> Result<Url> {
        let prefix = ["repos", repo.owner(), repo.name(), "contents"];
        let pieces = path.split('/').filter(|piece| !piece.is_empty());
        self.endpoint(prefix.into_iter().chain(pieces))
    }

    async fn get(&self, url: Url, query: &[(&str, &str)], what: &str) -> Result<Response> {
        debug!(%url, "GET");
        let response = self.http.get(url).query(query).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();
        Err(classify_failure(status, &headers, &body, what, Utc::now()))
    }

    async fn contents(&self, repo: &RepositoryRef, path: &str) -> Result<RawContents> {
        let url = self.contents_url(repo, path)?;
        let what = format!("{repo}:{}", display_path(path));
        let response = self.get(url, &[("ref", repo.reference())], &what).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl ContentStore for GitHubClient {
    async fn repository_meta(&self, repo: &RepositoryId) -> Result<RepositoryMeta> {
        let url = self.endpoint(["repos", repo.owner.as_str(), repo.name.as_str()])?;
        let raw: RawRepository = self
            .get(url, &[], &format!("repository {repo}"))
            .await?
            .json()
            .await?;

        Ok(RepositoryMeta {
            full_name: raw.full_name,
            default_branch: raw.default_branch.unwrap_or_default(),
            description: raw.description,
            html_url: raw.html_url,
            stars: raw.stargazers_count,
        })
    }

    async fn commit_tree_sha(&self, repo: &RepositoryRef) -> Result<String> {
        let url = self.endpoint(["repos", repo.owner(), repo.name(), "commits", repo.reference()])?;
        let raw: RawCommit = self
            .get(url, &[], &format!("commit {repo}"))
            .await?
            .json()
            .await?;
        Ok(raw.commit.tree.sha)
    }

    async fn path_exists(&self, repo: &RepositoryRef, path: &str) -> Result<bool> {
        let url = self.contents_url(repo, path)?;
        let what = format!("{repo}:{}", display_path(path));
        match self.get(url, &[("ref", repo.reference())], &what).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn list_directory(&self, repo: &RepositoryRef, path: &str) -> Result<Vec<DirEntry>> {
        match self.contents(repo, path).await? {
            RawContents::Listing(entries) => Ok(entries
                .into_iter()
                .map(|entry| DirEntry {
                    kind: EntryKind::from_api(&entry.kind),
                    name: entry.name,
                    path: entry.path,
                })
                .collect()),
            RawContents::Item(_) => Err(DocsError::InvalidResponse(format!(
                "`{}` is a file, not a directory",
                display_path(path)
            ))),
        }
    }

    async fn file_content(&self, repo: &RepositoryRef, path: &str) -> Result<Option<RemoteFile>> {
        let raw = match self.contents(repo, path).await {
            Ok(RawContents::Item(file)) => file,
            Ok(RawContents::Listing(_)) => {
                return Err(DocsError::InvalidResponse(format!(
                    "`{path}` is a directory, not a file"
                )))
            }
            // A file that vanished between discovery and fetch.
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err),
        };

        Ok(Some(RemoteFile {
            path: raw.path,
            encoding: raw.encoding,
            content: raw.content.unwrap_or_default(),
            sha: raw.sha,
            size: raw.size,
            html_url: raw.html_url,
        }))
    }

    async fn recursive_tree(&self, repo: &RepositoryId, tree_sha: &str) -> Result<RecursiveTree> {
        let url = self.endpoint([
            "repos",
            repo.owner.as_str(),
            repo.name.as_str(),
            "git",
            "trees",
            tree_sha,
        ])?;
        let raw: RawTree = self
            .get(url, &[("recursive", "1")], &format!("tree {tree_sha} of {repo}"))
            .await?
            .json()
            .await?;

        let entries = raw
            .tree
            .into_iter()
            .filter_map(|entry| {
                let kind = match entry.kind.as_str() {
                    "blob" => TreeEntryKind::Blob,
                    "tree" => TreeEntryKind::Tree,
                    "commit" => TreeEntryKind::Commit,
                    _ => return None,
                };
                Some(TreeEntry {
                    path: entry.path,
                    kind,
                })
            })
            .collect();

        Ok(RecursiveTree {
            entries,
            truncated: raw.truncated,
        })
    }

    async fn search_code(&self, repo: &RepositoryId, query: &str, page: u32) -> Result<SearchPage> {
        let url = self.endpoint(["search", "code"])?;
        let q = format!("repo:{repo} {query}");
        let page_param = page.max(1).to_string();
        let response = self
            .get(
                url,
                &[("q", q.as_str()), ("per_page", SEARCH_PAGE_SIZE), ("page", page_param.as_str())],
                &format!("code search in {repo}"),
            )
            .await?;

        let next_page = response
            .headers()
            .get(LINK)
            .and_then(|value| value.to_str().ok())
            .and_then(next_page_from_link);
        let raw: RawSearch = response.json().await?;

        Ok(SearchPage {
            paths: raw.items.into_iter().map(|item| item.path).collect(),
            next_page,
        })
    }
}

/// Extracts the `page` number of the `rel="next"` target from a Link header.
///
/// Example:
///   `<https://api.github.com/search/code?q=x&page=2>; rel="next"` -> Some(2)
pub fn next_page_from_link(header: &str) -> Option<u32> {
    header.split(',').find_map(|link| {
        let mut parts = link.split(';');
        let target = parts.next()?.trim().trim_start_matches('<').trim_end_matches('>');
        let is_next = parts.any(|param| param.trim() == "rel=\"next\"");
        if !is_next {
            return None;
        }
        let url = Url::parse(target).ok()?;
        url.query_pairs()
            .find(|(key, _)| key == "page")
            .and_then(|(_, value)| value.parse().ok())
    })
}

// Maps a non-success response onto the error taxonomy.
pub(crate) fn classify_failure(
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
    what: &str,
    now: DateTime<Utc>,
) -> DocsError {
    match status {
        StatusCode::NOT_FOUND => DocsError::not_found(what),
        StatusCode::UNAUTHORIZED => DocsError::Unauthorized,
        StatusCode::TOO_MANY_REQUESTS => DocsError::RateLimited {
            reset_at: rate_limit_reset(headers, now),
        },
        StatusCode::FORBIDDEN if is_rate_limited(headers) => DocsError::RateLimited {
            reset_at: rate_limit_reset(headers, now),
        },
        StatusCode::FORBIDDEN => DocsError::Forbidden(api_message(body)),
        _ => DocsError::Upstream {
            status: status.as_u16(),
            message: api_message(body),
        },
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn is_rate_limited(headers: &HeaderMap) -> bool {
    header_str(headers, "x-ratelimit-remaining").map(str::trim) == Some("0")
        || headers.contains_key(RETRY_AFTER)
}

fn rate_limit_reset(headers: &HeaderMap, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if let Some(seconds) = header_str(headers, RETRY_AFTER.as_str())
        .and_then(|value| value.trim().parse::<i64>().ok())
    {
        // An absurd delay means "unknown", not a crash.
        return TimeDelta::try_seconds(seconds).and_then(|delay| now.checked_add_signed(delay));
    }
    header_str(headers, "x-ratelimit-reset")
        .and_then(|value| value.trim().parse::<i64>().ok())
        .and_then(|epoch| DateTime::from_timestamp(epoch, 0))
}

// GitHub error bodies look like {"message": "...", "documentation_url": "..."}
fn api_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ApiError {
        message: String,
    }

    match serde_json::from_str::<ApiError>(body) {
        Ok(parsed) => parsed.message,
        Err(_) => body.chars().take(200).collect(),
    }
}

fn display_path(path: &str) -> &str {
    if path.is_empty() {
        "/"
    } else {
        path
    }
}

// -----------------------------------------------------------------------------
// Wire formats (only the fields we read)
// -----------------------------------------------------------------------------

#[derive(Deserialize)]
struct RawRepository {
    full_name: String,
    default_branch: Option<String>,
    description: Option<String>,
    #[serde(default)]
    html_url: String,
    #[serde(default)]
    stargazers_count: u64,
}

#[derive(Deserialize)]
struct RawCommit {
    commit: RawCommitDetail,
}

#[derive(Deserialize)]
struct RawCommitDetail {
    tree: RawTreeRef,
}

#[derive(Deserialize)]
struct RawTreeRef {
    sha: String,
}

#[derive(Deserialize)]
struct RawEntry {
    name: String,
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
struct RawFile {
    path: String,
    sha: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
    #[serde(default)]
    html_url: Option<String>,
}

// The contents endpoint answers with an array for directories and an object
// for everything else.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawContents {
    Listing(Vec<RawEntry>),
    Item(RawFile),
}

#[derive(Deserialize)]
struct RawTree {
    tree: Vec<RawTreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Deserialize)]
struct RawTreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
struct RawSearch {
    #[serde(default)]
    items: Vec<RawSearchItem>,
}

#[derive(Deserialize)]
struct RawSearchItem {
    path: String,
}
