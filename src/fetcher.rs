// src/fetcher.rs
// =============================================================================
// Fetches the content of many files at once, with a hard cap on how many
// requests are in flight.
//
// How it works:
// 1. A Semaphore with N permits; a permit is acquired BEFORE a task is
//    spawned, so at most N tasks ever exist at the same time
// 2. Each task fetches and decodes one file, then pushes its result into a
//    shared Mutex<Vec<_>>
// 3. Errors go into a bounded mpsc channel sized to the path count (try_send,
//    never blocks)
// 4. We wait for every task; one failure never stops the others
//
// Rust concepts:
// - Arc: share the store / semaphore / result list between tasks
// - JoinSet: owns the spawned tasks so they can all be aborted on cancel
// - OwnedSemaphorePermit: dropped when the task ends, freeing the slot
// =============================================================================

use crate::budget::guarded;
use crate::error::{DocsError, Result};
use crate::github::ContentStore;
use crate::models::{DocumentContent, RemoteFile, RepositoryRef};
use base64::Engine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Successful documents plus the errors that did not prevent them.
#[derive(Debug, Default)]
pub struct FetchReport {
    pub documents: Vec<DocumentContent>,
    pub errors: Vec<DocsError>,
}

pub struct ConcurrentFetcher {
    store: Arc<dyn ContentStore>,
    budget: Duration,
}

impl ConcurrentFetcher {
    pub fn new(store: Arc<dyn ContentStore>, budget: Duration) -> Self {
        Self { store, budget }
    }

    /// Fetches every path in `paths` with at most `concurrency` requests in
    /// flight.
    ///
    /// - some content: `Ok`, with the per-path errors attached
    /// - no content, some errors: the first error
    /// - no content, no errors: [`DocsError::NoContent`]
    ///
    /// Documents come back in the order of `paths`, minus the ones that
    /// vanished or failed.
    pub async fn fetch_all(
        &self,
        repo: &RepositoryRef,
        paths: &[String],
        concurrency: usize,
        cancel: &CancellationToken,
    ) -> Result<FetchReport> {
        if paths.is_empty() {
            return Ok(FetchReport::default());
        }

        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let collected = Arc::new(Mutex::new(Vec::with_capacity(paths.len())));
        let (error_tx, mut error_rx) = mpsc::channel::<DocsError>(paths.len());
        let mut tasks = JoinSet::new();

        for (position, path) in paths.iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    shutdown(&mut tasks).await;
                    return Err(DocsError::Cancelled);
                }
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    // Only happens if the semaphore is closed, which we never do.
                    Err(_) => {
                        shutdown(&mut tasks).await;
                        return Err(DocsError::Cancelled);
                    }
                },
            };

            let store = Arc::clone(&self.store);
            let collected = Arc::clone(&collected);
            let error_tx = error_tx.clone();
            let repo = repo.clone();
            let path = path.clone();
            let cancel = cancel.clone();
            let budget = self.budget;

            tasks.spawn(async move {
                let _permit = permit;
                match fetch_one(store.as_ref(), &repo, &path, budget, &cancel).await {
                    Ok(Some(document)) => collected.lock().await.push((position, document)),
                    Ok(None) => debug!(path = %path, "file no longer exists, skipping"),
                    Err(err) => {
                        warn!(path = %path, error = %err, "failed to fetch document");
                        if let Err(TrySendError::Full(dropped) | TrySendError::Closed(dropped)) =
                            error_tx.try_send(err)
                        {
                            warn!(error = %dropped, "error channel full, dropping error");
                        }
                    }
                }
            });
        }
        drop(error_tx);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    shutdown(&mut tasks).await;
                    return Err(DocsError::Cancelled);
                }
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok(())) => {}
                    Some(Err(err)) if err.is_panic() => error!(error = %err, "fetch task panicked"),
                    Some(Err(_)) => {}
                },
            }
        }

        let mut ordered = std::mem::take(&mut *collected.lock().await);
        ordered.sort_by_key(|(position, _)| *position);
        let documents: Vec<DocumentContent> = ordered.into_iter().map(|(_, doc)| doc).collect();

        let mut errors = Vec::new();
        while let Ok(err) = error_rx.try_recv() {
            errors.push(err);
        }

        debug!(
            repo = %repo,
            requested = paths.len(),
            fetched = documents.len(),
            failed = errors.len(),
            "fetch finished"
        );

        if !documents.is_empty() {
            return Ok(FetchReport { documents, errors });
        }

        let failed = errors.len();
        match errors.into_iter().next() {
            Some(first) => {
                warn!(repo = %repo, failed, "every document fetch failed");
                Err(first)
            }
            None => Err(DocsError::NoContent {
                repository: repo.to_string(),
            }),
        }
    }
}

// Aborts what is still running and waits for it, so no permits or tasks
// outlive the call.
async fn shutdown(tasks: &mut JoinSet<()>) {
    tasks.abort_all();
    while tasks.join_next().await.is_some() {}
}

/// `Ok(None)` when the file is gone; anything else is an error tagged with
/// the path.
async fn fetch_one(
    store: &dyn ContentStore,
    repo: &RepositoryRef,
    path: &str,
    budget: Duration,
    cancel: &CancellationToken,
) -> Result<Option<DocumentContent>> {
    let file = match guarded(cancel, budget, "file fetch", store.file_content(repo, path)).await {
        Ok(Some(file)) => file,
        Ok(None) => return Ok(None),
        Err(err) if err.is_not_found() => return Ok(None),
        Err(err) => return Err(DocsError::fetch(path, err)),
    };

    let content = decode_content(&file)?;
    let url = file.html_url.clone().unwrap_or_else(|| {
        format!(
            "https://github.com/{}/blob/{}/{}",
            repo.id,
            repo.reference(),
            file.path
        )
    });

    Ok(Some(DocumentContent {
        repository: repo.id.full_name(),
        path: file.path,
        content,
        size: file.size,
        sha: file.sha,
        url,
    }))
}

fn decode_content(file: &RemoteFile) -> Result<String> {
    let decode_error = |reason: String| DocsError::Decode {
        path: file.path.clone(),
        reason,
    };

    match file.encoding.as_deref() {
        Some(encoding) if encoding.eq_ignore_ascii_case("base64") => {
            // GitHub wraps base64 at 60 columns.
            let compact: String = file
                .content
                .chars()
                .filter(|c| !c.is_ascii_whitespace())
                .collect();
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(compact)
                .map_err(|err| decode_error(err.to_string()))?;
            String::from_utf8(bytes).map_err(|_| decode_error("content is not valid UTF-8".into()))
        }
        None | Some("") | Some("utf-8") => Ok(file.content.clone()),
        Some("none") => Err(decode_error("file is too large for inline content".into())),
        Some(other) => Err(decode_error(format!("unsupported encoding `{other}`"))),
    }
}
