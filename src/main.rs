// src/main.rs
// =============================================================================
// This is the entry point of our CLI application.
//
// What happens here:
// 1. Parse command-line arguments using clap
// 2. Load settings (config file -> environment -> CLI flags) and logging
// 3. Build the service: GitHub client, cache backend, refresh log
// 4. Dispatch to the subcommand handler
// 5. Exit with proper code (0 = success, 1 = nothing produced or refresh
//    denied, 2 = error)
//
// Rust concepts used:
// - async/await: Many repositories and files are fetched concurrently
// - Arc<dyn Trait>: One shared value behind an interface (cache backend)
// - Streams: `buffer_unordered` runs a bounded number of futures at once
// =============================================================================

mod cli; // src/cli.rs - command-line parsing

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use cli::{Cli, Commands};
use docs_harvester::cache::{CacheBackend, DiskCache, KeyBuilder, MemoryCache, TwoTierCache};
use docs_harvester::config::{self, CacheBackendKind, Overrides, Settings};
use docs_harvester::github::{parse_repository, GitHubClient};
use docs_harvester::throttle::{JsonPersistenceLog, RefreshRequest, RefreshThrottle};
use docs_harvester::{telemetry, DocsError, DocumentationService, DocumentationSet, RepositoryId};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

// The #[tokio::main] attribute transforms our async main into a real main function
#[tokio::main]
async fn main() {
    let exit_code = match run().await {
        Ok(code) => code,
        Err(e) => {
            // {:#} prints the whole anyhow context chain on one line
            eprintln!("Error: {:#}", e);
            2
        }
    };

    std::process::exit(exit_code);
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();

    let settings = config::load(&Overrides {
        config_file: cli.config_file.clone(),
        github_token: cli.github_token.clone(),
        log_level: cli.log_level.clone(),
        cache_backend: cli.cache_backend.clone(),
    })
    .context("failed to load configuration")?;
    telemetry::init(&settings.logging)?;

    let service = build_service(&settings)?;

    // One token for the whole run; Ctrl-C cancels every in-flight request
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    match cli.command {
        Commands::Fetch {
            repos,
            reference,
            tag,
            force,
            concurrency,
            json,
            parallel_repos,
        } => {
            let request = RefreshRequest {
                reference: Commands::fetch_reference(reference, tag),
                force,
            };
            handle_fetch(&service, &repos, &request, concurrency, json, parallel_repos, &cancel)
                .await
        }
        Commands::CanRefresh { repo, min_days } => {
            let min_days = min_days.unwrap_or(settings.refresh.min_days_between);
            handle_can_refresh(&service, &repo, min_days).await
        }
        Commands::Resolve { repo, reference } => {
            handle_resolve(&service, &repo, reference.as_deref(), &cancel).await
        }
    }
}

// Wires the concrete pieces together. Everything below the service only sees
// traits, so this is the one place that knows about reqwest, files on disk
// and the chosen cache backend.
fn build_service(settings: &Settings) -> Result<DocumentationService> {
    let options = settings.service_options();

    let store = GitHubClient::new(&settings.github_client_config())
        .context("failed to build GitHub client")?;

    let backend: Option<Arc<dyn CacheBackend>> = match settings.cache.backend {
        CacheBackendKind::Memory => Some(Arc::new(MemoryCache::new(settings.cache.capacity))),
        CacheBackendKind::Disk => Some(Arc::new(DiskCache::new(&settings.cache.directory))),
        CacheBackendKind::Disabled => None,
    };
    let cache = match backend {
        Some(backend) => TwoTierCache::new(
            backend,
            KeyBuilder::new(settings.cache.prefix.clone()),
            settings.cache.ttls,
            options.request_timeout,
        ),
        None => TwoTierCache::disabled(options.request_timeout),
    };
    debug!(backend = ?settings.cache.backend, "cache configured");

    let log = Arc::new(JsonPersistenceLog::new(&settings.refresh.state_file));
    let throttle = RefreshThrottle::new(log, options.request_timeout);

    Ok(DocumentationService::new(
        Arc::new(store),
        cache,
        throttle,
        options,
    ))
}

fn cancel_on_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling in-flight requests");
            cancel.cancel();
        }
    });
}

// Handles the 'fetch' subcommand
//
// Repositories are processed `parallel_repos` at a time. Each one goes
// through the refresh path, so an unqualified re-fetch after the cached
// index expired still has to pass the refresh throttle.
async fn handle_fetch(
    service: &DocumentationService,
    repos: &[String],
    request: &RefreshRequest,
    concurrency: usize,
    json: bool,
    parallel_repos: usize,
    cancel: &CancellationToken,
) -> Result<i32> {
    if !json {
        println!("🔍 Fetching documentation for {} repository(ies)", repos.len());
    }

    let mut reports: Vec<RepoReport> = stream::iter(repos)
        .map(|input| async move {
            let outcome = match parse_repository(input) {
                Ok(id) => {
                    service
                        .refresh_documentation(&id, request, concurrency, cancel)
                        .await
                }
                Err(err) => Err(err),
            };
            RepoReport::new(input, outcome)
        })
        .buffer_unordered(parallel_repos.max(1))
        .collect()
        .await;

    // buffer_unordered yields in completion order; print in argument order
    reports.sort_by_key(|report| repos.iter().position(|r| *r == report.input));

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            print_report(report);
        }
    }

    Ok(reports.iter().map(|report| report.exit_code).max().unwrap_or(0))
}

// Handles the 'can-refresh' subcommand
async fn handle_can_refresh(
    service: &DocumentationService,
    repo: &str,
    min_days: u32,
) -> Result<i32> {
    let id = parse_repository(repo)?;
    let decision = service.check_refresh_allowed(&id, min_days, false).await;

    if decision.allowed {
        println!("✅ {} can be refreshed ({})", id, decision.reason);
        Ok(0)
    } else {
        let days = decision.days_remaining(Utc::now());
        println!(
            "⏳ {} was refreshed recently, try again in {} day(s) (after {})",
            id,
            days,
            decision.next_allowed_at.to_rfc3339()
        );
        Ok(1)
    }
}

// Handles the 'resolve' subcommand
async fn handle_resolve(
    service: &DocumentationService,
    repo: &str,
    reference: Option<&str>,
    cancel: &CancellationToken,
) -> Result<i32> {
    let id: RepositoryId = parse_repository(repo)?;

    match service.resolve_paths(&id, reference, cancel).await {
        Ok((pinned, paths)) => {
            println!("📄 {} documentation file(s) in {}", paths.len(), pinned);
            for path in &paths {
                println!("   {}", path);
            }
            Ok(0)
        }
        Err(err) => {
            eprintln!("❌ {}: {}", id, err);
            Ok(exit_code_for(&err))
        }
    }
}

/// Library errors that mean "nothing to give you" rather than "broken".
fn exit_code_for(err: &DocsError) -> i32 {
    match err {
        DocsError::NoDocumentation { .. }
        | DocsError::NoContent { .. }
        | DocsError::RefreshThrottled { .. } => 1,
        _ => 2,
    }
}

// What one repository produced, shaped for both the table and --json
#[derive(Debug, Serialize)]
struct RepoReport {
    input: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    repository: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reference: Option<String>,
    from_cache: bool,
    from_partial_cache: bool,
    documents: Vec<DocumentReport>,
    fetch_errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip)]
    exit_code: i32,
}

#[derive(Debug, Serialize)]
struct DocumentReport {
    path: String,
    size: u64,
    sha: String,
    url: String,
    content: String,
}

impl RepoReport {
    fn new(input: &str, outcome: docs_harvester::Result<DocumentationSet>) -> Self {
        match outcome {
            Ok(set) => Self {
                input: input.to_string(),
                repository: Some(set.repository.id.full_name()),
                reference: Some(set.repository.reference().to_string()),
                from_cache: set.from_cache,
                from_partial_cache: set.from_partial_cache,
                fetch_errors: set.fetch_errors.iter().map(ToString::to_string).collect(),
                documents: set
                    .documents
                    .into_iter()
                    .map(|doc| DocumentReport {
                        path: doc.path,
                        size: doc.size,
                        sha: doc.sha,
                        url: doc.url,
                        content: doc.content,
                    })
                    .collect(),
                error: None,
                exit_code: 0,
            },
            Err(err) => Self {
                input: input.to_string(),
                repository: None,
                reference: None,
                from_cache: false,
                from_partial_cache: false,
                documents: Vec::new(),
                fetch_errors: Vec::new(),
                exit_code: exit_code_for(&err),
                error: Some(err.to_string()),
            },
        }
    }
}

// Prints one repository as a human-readable table
fn print_report(report: &RepoReport) {
    println!();
    let (Some(repository), Some(reference)) = (&report.repository, &report.reference) else {
        println!("❌ {}: {}", report.input, report.error.as_deref().unwrap_or("failed"));
        return;
    };

    let source = if report.from_cache {
        "cache"
    } else if report.from_partial_cache {
        "cache + network"
    } else {
        "network"
    };
    println!("📦 {}@{} ({})", repository, reference, source);
    println!("{:<60} {:>10} {:<12}", "PATH", "BYTES", "SHA");
    println!("{}", "=".repeat(84));

    for doc in &report.documents {
        // Truncate long paths so the columns stay aligned
        let path_display = if doc.path.chars().count() > 57 {
            let head: String = doc.path.chars().take(57).collect();
            format!("{}...", head)
        } else {
            doc.path.clone()
        };
        let sha_display: String = doc.sha.chars().take(12).collect();
        println!("{:<60} {:>10} {:<12}", path_display, doc.size, sha_display);
    }

    println!("📊 {} document(s)", report.documents.len());
    for error in &report.fetch_errors {
        println!("   ⚠️  {}", error);
    }
}

// -----------------------------------------------------------------------------
// BEGINNER NOTES:
//
// 1. Why `mod cli;` here but not in lib.rs?
//    - The library (src/lib.rs) is the reusable core. The CLI is only one
//      way to drive it, so its argument parsing lives with the binary.
//
// 2. What does `.map(...).buffer_unordered(n)` do?
//    - `map` turns each repository into a future (not started yet).
//    - `buffer_unordered(n)` polls up to n of them at a time and yields
//      results as they finish.
//
// 3. Why `async move` inside the map closure?
//    - It moves the copied references (`service`, `request`, `cancel`) into
//      each future. They are all borrowed from run(), which outlives the
//      stream, so nothing needs to be cloned.
// -----------------------------------------------------------------------------
