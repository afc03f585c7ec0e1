//! Bounded worker pool for CPU-bound transform work
//!
//! Decoding runs on tokio's blocking pool so it never stalls the tasks driving
//! network I/O. A semaphore caps how many decodes run at once across every
//! adapter sharing the pool.

use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::error::{Error, Result};

/// Shared, cloneable handle to the decode workers
#[derive(Clone, Debug)]
pub struct DecodePool {
    permits: Arc<Semaphore>,
    workers: usize,
}

impl DecodePool {
    /// Pool allowing `workers` concurrent decodes (at least one)
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    /// Configured number of workers
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `job` on a blocking worker and await its result
    ///
    /// The calling task is suspended, not blocked, while the job runs. A job
    /// that panics surfaces as [`Error::Decode`].
    pub async fn run<F, R>(&self, job: F) -> Result<R>
    where
        F: FnOnce() -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| Error::Other("decode pool closed".into()))?;

        tokio::task::spawn_blocking(job)
            .await
            .map_err(|e| Error::Decode(format!("decode worker failed: {e}")))?
    }
}

impl Default for DecodePool {
    fn default() -> Self {
        Self::new(crate::config::DecodeConfig::default().workers)
    }
}
