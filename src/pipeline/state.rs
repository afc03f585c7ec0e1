//! Working set of a single pipeline run

use crate::adapter::{Location, RawPayload};
use crate::error::Error;
use crate::time_key::TimeKey;

/// Items waiting for each stage, owned by exactly one run
///
/// Stage tasks never touch this directly: they return their results and the
/// run merges them here between barriers.
#[derive(Debug, Default)]
pub(crate) struct PipelineState {
    /// Keys awaiting discovery
    pub(crate) pending: Vec<TimeKey>,
    /// Locations awaiting retrieval
    pub(crate) discovered: Vec<Location>,
    /// Staged payloads awaiting transform
    pub(crate) staged: Vec<RawPayload>,
    /// Keys the remote side reported missing during discovery
    pub(crate) missed_keys: Vec<(TimeKey, Error)>,
    /// Locations the remote side reported missing during retrieval
    pub(crate) missed_locations: Vec<(Location, Error)>,
    next_staging_id: u64,
}

impl PipelineState {
    pub(crate) fn new(pending: Vec<TimeKey>) -> Self {
        Self {
            pending,
            ..Self::default()
        }
    }

    /// Nothing left for any stage
    pub(crate) fn is_drained(&self) -> bool {
        self.pending.is_empty() && self.discovered.is_empty() && self.staged.is_empty()
    }

    /// Take up to `n` keys from the front of the pending queue
    pub(crate) fn next_keys(&mut self, n: usize) -> Vec<TimeKey> {
        take_front(&mut self.pending, n)
    }

    /// Take up to `n` discovered locations
    pub(crate) fn next_locations(&mut self, n: usize) -> Vec<Location> {
        take_front(&mut self.discovered, n)
    }

    /// Take up to `n` staged payloads
    pub(crate) fn next_staged(&mut self, n: usize) -> Vec<RawPayload> {
        take_front(&mut self.staged, n)
    }

    /// Reserve a fresh staging file number
    pub(crate) fn staging_id(&mut self) -> u64 {
        let id = self.next_staging_id;
        self.next_staging_id += 1;
        id
    }

    /// Move every held miss back into its stage queue, returning how many moved
    pub(crate) fn requeue_misses(&mut self) -> usize {
        let keys = std::mem::take(&mut self.missed_keys);
        let locations = std::mem::take(&mut self.missed_locations);
        let moved = keys.len() + locations.len();
        self.pending.extend(keys.into_iter().map(|(key, _)| key));
        self.discovered
            .extend(locations.into_iter().map(|(location, _)| location));
        moved
    }
}

fn take_front<T>(items: &mut Vec<T>, n: usize) -> Vec<T> {
    let n = n.min(items.len());
    items.drain(..n).collect()
}
