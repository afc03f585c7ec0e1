//! # starstream
//!
//! Incremental, resumable retrieval of time-indexed datasets from remote archives.
//!
//! ## Design Philosophy
//!
//! starstream is designed to be:
//! - **Incremental** - Artifacts already on disk are never fetched again
//! - **Resilient** - Transient network failures are retried with backoff; missing data is reported, not fatal
//! - **Bounded** - At most `batch_size` connections per stage, decoding on a capped worker pool
//! - **Library-first** - Adapters are plain trait implementations; no CLI or global state
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use chrono::NaiveDate;
//! use starstream::config::{AdapterConfig, HttpConfig};
//! use starstream::http::HttpFetcher;
//! use starstream::sources::SingleFileSource;
//! use starstream::time_key::{KeyFormat, Step, TimeRange};
//! use starstream::{SourceAdapter, fetch};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let http = HttpFetcher::new(&HttpConfig::default())?;
//!
//!     let mut dst = AdapterConfig::new("dst", "./data/Dst");
//!     dst.step = Step::months(1);
//!     dst.key_format = KeyFormat::monthly();
//!     let dst = SingleFileSource::new(
//!         dst,
//!         http,
//!         |key| format!("https://wdc.example.org/dst_realtime/{key}/index.html"),
//!         |key| format!("{key}.html"),
//!     );
//!
//!     let adapters: Vec<Arc<dyn SourceAdapter>> = vec![Arc::new(dst)];
//!     let range = TimeRange::days(
//!         NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(),
//!         NaiveDate::from_ymd_opt(2021, 6, 1).unwrap(),
//!     )?;
//!
//!     let summary = fetch(&[range], &adapters).await?;
//!     println!("{} artifacts written", summary.transformed());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Source adapter contract
pub mod adapter;
/// Configuration types
pub mod config;
/// Worker pool for CPU-bound decoding
pub mod decode;
/// Error types
pub mod error;
/// Fetch entry points
pub mod fetch;
/// HTTP client with payload classification
pub mod http;
/// Batched pipeline engine
pub mod pipeline;
/// Local-state probing
pub mod probe;
/// Retry logic with linear or exponential backoff
pub mod retry;
/// Ready-made adapters and decoders
pub mod sources;
/// Time keys and interval decomposition
pub mod time_key;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use adapter::{Location, RawPayload, SourceAdapter, TransformContext};
pub use config::{AdapterConfig, Backoff, Config, MissPolicy, RetryConfig};
pub use decode::DecodePool;
pub use error::{Error, ErrorScope, Result};
pub use fetch::{FetchSummary, fetch, fetch_until_interrupted, fetch_with_pool};
pub use pipeline::{ItemFailure, RunReport, Stage, run_pipeline};
pub use probe::Presence;
pub use time_key::{Interval, KeyFormat, Step, TimeKey, TimeRange};
