//! Batched pipeline engine
//!
//! One run of one adapter over a set of time ranges:
//!
//! 1. decompose the ranges into candidate keys
//! 2. probe local state and keep the pending keys
//! 3. for each batch of `batch_size` pending keys: discover concurrently,
//!    then retrieve the discovered locations in batches, then transform the
//!    staged payloads in batches
//! 4. optionally give permanent misses extra rounds ([`MissPolicy`](crate::config::MissPolicy))
//!
//! A barrier separates every batch from the next, so at most `batch_size`
//! connections per stage are ever in flight. Item errors are reported in the
//! [`RunReport`] and never stop siblings; run errors (local I/O, bad
//! configuration) abort the run. Artifacts written before an abort stay in
//! place and the next run resumes from them.

mod report;
mod stages;
mod state;


pub use report::{ItemFailure, RunReport, Stage};

use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::adapter::SourceAdapter;
use crate::decode::DecodePool;
use crate::error::{Error, ErrorScope, Result};
use crate::probe::pending_keys;
use crate::time_key::{Interval, TimeKey, TimeRange};

use stages::{StageContext, discover_batch, retrieve_batch, transform_batch};
use state::PipelineState;

/// Name prefix of the per-run staging directory created under an adapter's root
///
/// Each run gets its own directory, so adapters sharing a root never see each
/// other's payloads. It is removed when the run ends, aborts or is dropped.
pub const STAGING_PREFIX: &str = ".staging-";

/// Run one adapter's pipeline over `ranges`
///
/// # Errors
///
/// Run-scoped failures only: invalid configuration or range, or a local
/// filesystem error. Per-item failures are in the returned report.
pub async fn run_pipeline(
    adapter: &dyn SourceAdapter,
    ranges: &[TimeRange],
    pool: &DecodePool,
) -> Result<RunReport> {
    let config = adapter.config();
    config.validate()?;
    let name = adapter.name();
    let mut report = RunReport::new(name);

    // Phase 1: Decompose
    let candidates = Interval::decompose_all(ranges, config.step, &config.key_format)?;
    report.candidates = candidates.len();

    // Phase 2: Probe local state
    let pending = pending_keys(candidates, |key| adapter.probe(key), &config.root_dir)?;
    report.pending = pending.len();
    tracing::info!(
        adapter = name,
        candidates = report.candidates,
        pending = report.pending,
        already_present = report.candidates - report.pending,
        "Local state probed"
    );
    if pending.is_empty() {
        return Ok(report);
    }

    // Phase 3: Batch loop
    let staging = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(&config.root_dir)?;
    let ctx = StageContext {
        adapter,
        retry: &config.retry,
        pool,
    };
    let mut run = Run::new(ctx, config.batch_size, staging, pending, report);
    run.drive().await?;

    // Phase 4: Requeue permanent misses
    for round in 1..=config.miss_policy.rounds() {
        let requeued = run.state.requeue_misses();
        if requeued == 0 {
            break;
        }
        tracing::info!(adapter = name, round, items = requeued, "Requeueing permanent misses");
        run.drive().await?;
    }

    Ok(run.finish())
}

/// State and settings of one in-progress run
struct Run<'a> {
    ctx: StageContext<'a>,
    name: &'a str,
    batch_size: usize,
    /// Dropping it deletes every payload still staged
    staging: TempDir,
    state: PipelineState,
    report: RunReport,
}

impl<'a> Run<'a> {
    fn new(
        ctx: StageContext<'a>,
        batch_size: usize,
        staging: TempDir,
        pending: Vec<TimeKey>,
        report: RunReport,
    ) -> Self {
        let adapter = ctx.adapter;
        Self {
            name: adapter.name(),
            ctx,
            batch_size,
            staging,
            state: PipelineState::new(pending),
            report,
        }
    }

    /// Process queued items until every stage queue is empty
    ///
    /// On abort the misses held so far are reported before the error is
    /// handed back; staged payloads go with the staging directory.
    async fn drive(&mut self) -> Result<()> {
        let result = self.drive_queues().await;
        if result.is_err() {
            self.state.staged.clear();
            self.report_misses();
        }
        result
    }

    async fn drive_queues(&mut self) -> Result<()> {
        while !self.state.is_drained() {
            let keys = self.state.next_keys(self.batch_size);
            if !keys.is_empty() {
                tracing::debug!(adapter = self.name, keys = keys.len(), "Discovering");
                for (key, result) in discover_batch(&self.ctx, keys).await {
                    match result {
                        Ok(locations) if locations.is_empty() => {
                            tracing::debug!(
                                adapter = self.name,
                                key = %key,
                                "No remote data for key"
                            );
                        }
                        Ok(locations) => {
                            self.report.discovered += locations.len();
                            self.state.discovered.extend(locations);
                        }
                        Err(e) if e.is_permanent_miss() => self.state.missed_keys.push((key, e)),
                        Err(e) => self.settle(Stage::Discover, key.to_string(), e)?,
                    }
                }
            }

            self.retrieve_discovered().await?;
            self.transform_staged().await?;
        }
        Ok(())
    }

    async fn retrieve_discovered(&mut self) -> Result<()> {
        loop {
            let locations = self.state.next_locations(self.batch_size);
            if locations.is_empty() {
                return Ok(());
            }
            let batch = locations
                .into_iter()
                .map(|location| {
                    let id = self.state.staging_id();
                    (location, staging_path(self.staging.path(), id))
                })
                .collect();

            tracing::debug!(adapter = self.name, "Retrieving");
            for (location, result) in retrieve_batch(&self.ctx, batch).await {
                match result {
                    Ok(payload) => {
                        self.report.retrieved += 1;
                        self.state.staged.push(payload);
                    }
                    Err(e) if e.is_permanent_miss() => {
                        self.state.missed_locations.push((location, e));
                    }
                    Err(e) => self.settle(Stage::Retrieve, location.url, e)?,
                }
            }
        }
    }

    async fn transform_staged(&mut self) -> Result<()> {
        loop {
            let payloads = self.state.next_staged(self.batch_size);
            if payloads.is_empty() {
                return Ok(());
            }

            tracing::debug!(adapter = self.name, payloads = payloads.len(), "Transforming");
            for (location, result) in transform_batch(&self.ctx, payloads).await {
                match result {
                    Ok(()) => {
                        self.report.transformed += 1;
                        tracing::info!(
                            adapter = self.name,
                            key = %location.key,
                            target = %location.target.display(),
                            "Artifact written"
                        );
                    }
                    Err(e) => self.settle(Stage::Transform, location.url, e)?,
                }
            }
        }
    }

    /// Report an item error, or hand back a run error to abort
    fn settle(&mut self, stage: Stage, item: String, error: Error) -> Result<()> {
        if error.scope() == ErrorScope::Run {
            tracing::error!(
                adapter = self.name,
                stage = %stage,
                item = %item,
                error = %error,
                "Aborting run"
            );
            return Err(error);
        }

        tracing::warn!(
            adapter = self.name,
            stage = %stage,
            item = %item,
            error = %error,
            "Item dropped"
        );
        self.report
            .failures
            .push(ItemFailure::new(stage, item, &error));
        Ok(())
    }

    /// Report misses that never resolved and remove the staging directory
    fn finish(mut self) -> RunReport {
        self.report_misses();

        let staging = self.staging.path().to_path_buf();
        if let Err(e) = self.staging.close() {
            tracing::warn!(
                adapter = self.name,
                path = %staging.display(),
                error = %e,
                "Failed to remove staging directory"
            );
        }

        tracing::info!(
            adapter = self.name,
            discovered = self.report.discovered,
            retrieved = self.report.retrieved,
            transformed = self.report.transformed,
            failed = self.report.failures.len(),
            "Run finished"
        );
        self.report
    }

    /// Report every held miss once, emptying the miss lists
    fn report_misses(&mut self) {
        for (key, error) in std::mem::take(&mut self.state.missed_keys) {
            self.report_miss(Stage::Discover, key.to_string(), &error);
        }
        for (location, error) in std::mem::take(&mut self.state.missed_locations) {
            self.report_miss(Stage::Retrieve, location.url, &error);
        }
    }

    fn report_miss(&mut self, stage: Stage, item: String, error: &Error) {
        tracing::warn!(
            adapter = self.name,
            stage = %stage,
            item = %item,
            error = %error,
            "Permanent miss, item dropped"
        );
        self.report
            .failures
            .push(ItemFailure::new(stage, item, error));
    }
}

fn staging_path(dir: &Path, id: u64) -> PathBuf {
    dir.join(format!("{id}.part"))
}
