//! Entry point: run every adapter's pipeline over the same ranges

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;

use crate::adapter::SourceAdapter;
use crate::decode::DecodePool;
use crate::error::{Error, Result};
use crate::pipeline::{RunReport, run_pipeline};
use crate::time_key::TimeRange;

/// Result of one adapter's run
#[derive(Debug)]
pub struct AdapterOutcome {
    /// Adapter name
    pub adapter: String,
    /// Report, or the run error that aborted it
    pub result: Result<RunReport>,
}

/// Per-adapter outcomes of a [`fetch`] call, in adapter order
#[must_use]
#[derive(Debug, Default)]
pub struct FetchSummary {
    /// One entry per adapter
    pub outcomes: Vec<AdapterOutcome>,
}

impl FetchSummary {
    /// Reports of the runs that finished
    pub fn reports(&self) -> impl Iterator<Item = &RunReport> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }

    /// Outcome for the adapter called `name`
    pub fn outcome(&self, name: &str) -> Option<&AdapterOutcome> {
        self.outcomes.iter().find(|o| o.adapter == name)
    }

    /// Artifacts written across all adapters
    pub fn transformed(&self) -> usize {
        self.reports().map(|r| r.transformed).sum()
    }

    /// True when no run aborted and no item was dropped
    pub fn is_complete(&self) -> bool {
        self.outcomes
            .iter()
            .all(|o| o.result.as_ref().is_ok_and(RunReport::is_complete))
    }
}

/// Fetch `ranges` from every adapter concurrently, decoding on a default-sized pool
///
/// See [`fetch_with_pool`].
pub async fn fetch(
    ranges: &[TimeRange],
    adapters: &[Arc<dyn SourceAdapter>],
) -> Result<FetchSummary> {
    fetch_with_pool(ranges, adapters, &DecodePool::default()).await
}

/// Fetch `ranges` from every adapter concurrently
///
/// Returns once every adapter has finished. An adapter whose run aborts is
/// recorded in the summary without affecting the others.
///
/// # Errors
///
/// Only for problems detectable before any work starts: an invalid adapter
/// configuration or two adapters sharing a name.
pub async fn fetch_with_pool(
    ranges: &[TimeRange],
    adapters: &[Arc<dyn SourceAdapter>],
    pool: &DecodePool,
) -> Result<FetchSummary> {
    validate_adapters(adapters)?;

    tracing::info!(
        adapters = adapters.len(),
        ranges = ranges.len(),
        decode_workers = pool.workers(),
        "Starting fetch"
    );

    let outcomes = join_all(adapters.iter().map(|adapter| async move {
        let result = run_pipeline(adapter.as_ref(), ranges, pool).await;
        if let Err(e) = &result {
            tracing::error!(adapter = adapter.name(), error = %e, "Adapter run aborted");
        }
        AdapterOutcome {
            adapter: adapter.name().to_string(),
            result,
        }
    }))
    .await;

    Ok(FetchSummary { outcomes })
}

/// Like [`fetch_with_pool`], but stop early when `shutdown` completes
///
/// Returns `Ok(None)` when stopped. In-flight items of the current batches are
/// abandoned; artifacts already written stay, and the next run resumes from them.
pub async fn fetch_until<S>(
    ranges: &[TimeRange],
    adapters: &[Arc<dyn SourceAdapter>],
    pool: &DecodePool,
    shutdown: S,
) -> Result<Option<FetchSummary>>
where
    S: Future<Output = ()>,
{
    validate_adapters(adapters)?;

    tokio::select! {
        summary = fetch_with_pool(ranges, adapters, pool) => summary.map(Some),
        _ = shutdown => {
            tracing::warn!("Fetch interrupted, unfinished items will be fetched on the next run");
            Ok(None)
        }
    }
}

/// Run [`fetch_with_pool`] until SIGTERM or SIGINT (Ctrl+C elsewhere)
///
/// # Example
///
/// ```no_run
/// use starstream::fetch::fetch_until_interrupted;
/// use starstream::decode::DecodePool;
///
/// # async fn example(
/// #     ranges: Vec<starstream::time_key::TimeRange>,
/// #     adapters: Vec<std::sync::Arc<dyn starstream::adapter::SourceAdapter>>,
/// # ) -> starstream::Result<()> {
/// match fetch_until_interrupted(&ranges, &adapters, &DecodePool::new(4)).await? {
///     Some(summary) => println!("{} artifacts written", summary.transformed()),
///     None => println!("interrupted, re-run to resume"),
/// }
/// # Ok(())
/// # }
/// ```
pub async fn fetch_until_interrupted(
    ranges: &[TimeRange],
    adapters: &[Arc<dyn SourceAdapter>],
    pool: &DecodePool,
) -> Result<Option<FetchSummary>> {
    fetch_until(ranges, adapters, pool, wait_for_signal()).await
}

fn validate_adapters(adapters: &[Arc<dyn SourceAdapter>]) -> Result<()> {
    let mut names = HashSet::new();
    for adapter in adapters {
        adapter.config().validate()?;
        if !names.insert(adapter.name()) {
            return Err(Error::config(
                "name",
                format!("adapter name {} is used more than once", adapter.name()),
            ));
        }
    }
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Signal handlers may fail to register in restricted environments
    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(
                error = %e,
                "Could not register SIGTERM handler, waiting for SIGINT only"
            );
            sigint.recv().await;
            tracing::info!("Received SIGINT signal (Ctrl+C)");
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(
                error = %e,
                "Could not register SIGINT handler, waiting for SIGTERM only"
            );
            sigterm.recv().await;
            tracing::info!("Received SIGTERM signal");
        }
        (Err(e), Err(_)) => {
            tracing::error!(
                error = %e,
                "Could not register any signal handlers, using ctrl_c fallback"
            );
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
