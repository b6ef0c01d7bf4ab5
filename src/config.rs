// src/config.rs
// =============================================================================
// Layered settings: built-in defaults, then an optional `docs-harvester.toml`
// in the working directory, then an explicit --config-file, then
// DOCS_HARVESTER__SECTION__KEY environment variables, then CLI flags.
//
// Everything is read into "raw" structs of Options first and validated in
// one place, so a bad value names the key it came from.
// =============================================================================

use crate::cache::CacheTtls;
use crate::github::GitHubClientConfig;
use crate::service::{ServiceOptions, DEFAULT_REQUEST_TIMEOUT, DEFAULT_WORKER_POOL_SIZE};
use crate::throttle::DEFAULT_MIN_DAYS_BETWEEN_REFRESHES;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const LOCAL_CONFIG_BASENAME: &str = "docs-harvester";
const ENV_PREFIX: &str = "DOCS_HARVESTER";

const DEFAULT_API_URL: &str = "https://api.github.com/";
const DEFAULT_MAX_RATE_LIMIT_WAIT_SECS: u64 = 90;
const DEFAULT_CACHE_PREFIX: &str = "docsharvester";
const DEFAULT_CACHE_DIRECTORY: &str = ".docs-harvester/cache";
const DEFAULT_CACHE_CAPACITY: usize = 2048;
const DEFAULT_INDEX_TTL_SECS: u64 = 60 * 60;
const DEFAULT_CONTENT_TTL_SECS: u64 = 24 * 60 * 60;
const DEFAULT_STATE_FILE: &str = ".docs-harvester/persisted.json";

/// Values supplied on the command line; they win over every other layer.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub config_file: Option<PathBuf>,
    pub github_token: Option<String>,
    pub log_level: Option<String>,
    pub cache_backend: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub github: GitHubSettings,
    pub fetch: FetchSettings,
    pub cache: CacheSettings,
    pub refresh: RefreshSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone)]
pub struct GitHubSettings {
    pub api_url: String,
    pub token: Option<String>,
    pub user_agent: String,
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub worker_pool_size: usize,
    pub request_timeout: Duration,
    pub max_rate_limit_wait: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackendKind {
    Memory,
    Disk,
    Disabled,
}

impl FromStr for CacheBackendKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "disk" => Ok(Self::Disk),
            "disabled" | "none" | "off" => Ok(Self::Disabled),
            other => Err(format!("unknown cache backend `{other}` (memory|disk|disabled)")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub backend: CacheBackendKind,
    pub prefix: String,
    pub directory: PathBuf,
    pub capacity: usize,
    pub ttls: CacheTtls,
}

#[derive(Debug, Clone)]
pub struct RefreshSettings {
    pub min_days_between: u32,
    pub state_file: PathBuf,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

impl Settings {
    pub fn github_client_config(&self) -> GitHubClientConfig {
        GitHubClientConfig {
            api_url: self.github.api_url.clone(),
            token: self.github.token.clone(),
            user_agent: self.github.user_agent.clone(),
            request_timeout: self.fetch.request_timeout,
        }
    }

    pub fn service_options(&self) -> ServiceOptions {
        ServiceOptions {
            worker_pool_size: self.fetch.worker_pool_size,
            request_timeout: self.fetch.request_timeout,
            max_rate_limit_wait: self.fetch.max_rate_limit_wait,
            min_days_between_refreshes: self.refresh.min_days_between,
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(overrides: &Overrides) -> Result<Settings, LoadError> {
    let mut builder =
        Config::builder().add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = overrides.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(overrides);
    Settings::from_raw(raw)
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        Ok(Self {
            github: build_github_settings(raw.github)?,
            fetch: build_fetch_settings(raw.fetch),
            cache: build_cache_settings(raw.cache)?,
            refresh: build_refresh_settings(raw.refresh),
            logging: build_logging_settings(raw.logging)?,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn build_github_settings(github: RawGitHubSettings) -> Result<GitHubSettings, LoadError> {
    let api_url = non_blank(github.api_url).unwrap_or_else(|| DEFAULT_API_URL.to_string());
    let parsed = url::Url::parse(&api_url)
        .map_err(|err| LoadError::invalid("github.api_url", format!("failed to parse: {err}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(LoadError::invalid("github.api_url", "must be an http(s) URL"));
    }

    let user_agent = non_blank(github.user_agent)
        .unwrap_or_else(|| format!("docs-harvester/{}", env!("CARGO_PKG_VERSION")));

    Ok(GitHubSettings {
        api_url,
        token: non_blank(github.token),
        user_agent,
    })
}

// Zero means "use the default" for every numeric knob here.
fn build_fetch_settings(fetch: RawFetchSettings) -> FetchSettings {
    let worker_pool_size = fetch
        .worker_pool_size
        .filter(|size| *size > 0)
        .unwrap_or(DEFAULT_WORKER_POOL_SIZE);
    let request_timeout = fetch
        .request_timeout_secs
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT);
    let max_rate_limit_wait = Duration::from_secs(
        fetch
            .max_rate_limit_wait_secs
            .unwrap_or(DEFAULT_MAX_RATE_LIMIT_WAIT_SECS),
    );

    FetchSettings {
        worker_pool_size,
        request_timeout,
        max_rate_limit_wait,
    }
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let backend = match non_blank(cache.backend) {
        Some(value) => value
            .parse()
            .map_err(|reason| LoadError::invalid("cache.backend", reason))?,
        None => CacheBackendKind::Disk,
    };

    let prefix = non_blank(cache.prefix).unwrap_or_else(|| DEFAULT_CACHE_PREFIX.to_string());
    if prefix.contains(char::is_whitespace) {
        return Err(LoadError::invalid("cache.prefix", "must not contain whitespace"));
    }

    let index_ttl = Duration::from_secs(cache.index_ttl_secs.unwrap_or(DEFAULT_INDEX_TTL_SECS));
    let content_ttl =
        Duration::from_secs(cache.content_ttl_secs.unwrap_or(DEFAULT_CONTENT_TTL_SECS));

    Ok(CacheSettings {
        backend,
        prefix,
        directory: cache
            .directory
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIRECTORY)),
        capacity: cache
            .capacity
            .filter(|capacity| *capacity > 0)
            .unwrap_or(DEFAULT_CACHE_CAPACITY),
        ttls: CacheTtls {
            index: index_ttl,
            content: content_ttl,
        },
    })
}

fn build_refresh_settings(refresh: RawRefreshSettings) -> RefreshSettings {
    RefreshSettings {
        min_days_between: refresh
            .min_days_between
            .unwrap_or(DEFAULT_MIN_DAYS_BETWEEN_REFRESHES),
        state_file: refresh
            .state_file
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_FILE)),
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match non_blank(logging.level) {
        Some(level) => LevelFilter::from_str(&level).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = match non_blank(logging.format).as_deref() {
        None | Some("compact") => LogFormat::Compact,
        Some("json") => LogFormat::Json,
        Some(other) => {
            return Err(LoadError::invalid(
                "logging.format",
                format!("unknown format `{other}` (compact|json)"),
            ))
        }
    };

    Ok(LoggingSettings { level, format })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    github: RawGitHubSettings,
    fetch: RawFetchSettings,
    cache: RawCacheSettings,
    refresh: RawRefreshSettings,
    logging: RawLoggingSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(token) = overrides.github_token.clone() {
            self.github.token = Some(token);
        }
        if let Some(level) = overrides.log_level.clone() {
            self.logging.level = Some(level);
        }
        if let Some(backend) = overrides.cache_backend.clone() {
            self.cache.backend = Some(backend);
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawGitHubSettings {
    api_url: Option<String>,
    token: Option<String>,
    user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawFetchSettings {
    worker_pool_size: Option<usize>,
    request_timeout_secs: Option<u64>,
    max_rate_limit_wait_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    backend: Option<String>,
    prefix: Option<String>,
    directory: Option<PathBuf>,
    capacity: Option<usize>,
    index_ttl_secs: Option<u64>,
    content_ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRefreshSettings {
    min_days_between: Option<u32>,
    state_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    format: Option<String>,
}
