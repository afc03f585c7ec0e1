//! Stage tasks: one batch of discover, retrieve or transform
//!
//! Each function fans a batch out with `join_all` and returns one result per
//! item once every task has settled. That return is the barrier: nothing of the
//! next stage starts before it.

use futures::future::join_all;
use std::path::{Path, PathBuf};

use crate::adapter::{Location, RawPayload, SourceAdapter, TransformContext};
use crate::config::RetryConfig;
use crate::decode::DecodePool;
use crate::error::Result;
use crate::retry::with_retry;
use crate::time_key::TimeKey;

/// What every stage task needs from the run
pub(crate) struct StageContext<'a> {
    pub(crate) adapter: &'a dyn SourceAdapter,
    pub(crate) retry: &'a RetryConfig,
    pub(crate) pool: &'a DecodePool,
}

/// Discover locations for every key in the batch
pub(crate) async fn discover_batch(
    ctx: &StageContext<'_>,
    keys: Vec<TimeKey>,
) -> Vec<(TimeKey, Result<Vec<Location>>)> {
    join_all(keys.into_iter().map(|key| async move {
        let result = with_retry(ctx.retry, || ctx.adapter.discover(&key)).await;
        (key, result)
    }))
    .await
}

/// Retrieve every location in the batch into its staging file
pub(crate) async fn retrieve_batch(
    ctx: &StageContext<'_>,
    batch: Vec<(Location, PathBuf)>,
) -> Vec<(Location, Result<RawPayload>)> {
    join_all(batch.into_iter().map(|(location, staged)| async move {
        let result = retrieve_one(ctx, &location, staged).await;
        (location, result)
    }))
    .await
}

async fn retrieve_one(
    ctx: &StageContext<'_>,
    location: &Location,
    staged: PathBuf,
) -> Result<RawPayload> {
    let bytes = with_retry(ctx.retry, || ctx.adapter.retrieve(location)).await?;
    tokio::fs::write(&staged, &bytes).await?;
    tracing::trace!(url = %location.url, bytes = bytes.len(), "Payload staged");
    Ok(RawPayload::new(location.clone(), staged))
}

/// Transform every staged payload in the batch
///
/// The staging file is removed whatever the outcome; on failure any partial
/// artifact at the target is removed too.
pub(crate) async fn transform_batch(
    ctx: &StageContext<'_>,
    batch: Vec<RawPayload>,
) -> Vec<(Location, Result<()>)> {
    join_all(batch.into_iter().map(|payload| async move {
        let location = payload.location().clone();
        let transform_ctx = TransformContext::new(ctx.pool.clone(), location.target.clone());

        let result = ctx.adapter.transform(&payload, &transform_ctx).await;

        remove_if_exists(payload.staged_path()).await;
        if result.is_err() {
            remove_if_exists(&location.target).await;
        }
        (location, result)
    }))
    .await
}

/// Best-effort delete of a file; a missing file is fine
pub(crate) async fn remove_if_exists(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove file");
        }
    }
}
