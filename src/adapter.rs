//! The per-source adapter contract
//!
//! A [`SourceAdapter`] knows one remote catalogue: how a [`TimeKey`] maps to
//! remote locations and local artifacts, and how raw payloads become canonical
//! files. The pipeline engine owns everything else (batching, retry, staging
//! files, cleanup), so adapters stay stateless per call.

use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::AdapterConfig;
use crate::decode::DecodePool;
use crate::error::{Error, Result};
use crate::probe::Presence;
use crate::time_key::TimeKey;

/// One retrievable remote item and where its artifact belongs
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Location {
    /// Key this location was discovered for
    pub key: TimeKey,
    /// Remote identifier, usually a URL
    pub url: String,
    /// Final artifact path
    pub target: PathBuf,
}

impl Location {
    /// Create a location
    pub fn new(key: TimeKey, url: impl Into<String>, target: impl Into<PathBuf>) -> Self {
        Self {
            key,
            url: url.into(),
            target: target.into(),
        }
    }
}

/// Bytes retrieved for a [`Location`], staged on local disk until transformed
#[derive(Clone, Debug)]
pub struct RawPayload {
    location: Location,
    staged: PathBuf,
}

impl RawPayload {
    pub(crate) fn new(location: Location, staged: PathBuf) -> Self {
        Self { location, staged }
    }

    /// Where the payload came from and where its artifact goes
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Staging file holding the raw bytes
    ///
    /// The engine deletes it once transform has settled, whatever the outcome.
    pub fn staged_path(&self) -> &Path {
        &self.staged
    }

    /// Read the staged bytes
    pub async fn read(&self) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(&self.staged).await?)
    }
}

/// What a transform may use: the decode workers and the destination
#[derive(Clone, Debug)]
pub struct TransformContext {
    pool: DecodePool,
    target: PathBuf,
}

impl TransformContext {
    pub(crate) fn new(pool: DecodePool, target: PathBuf) -> Self {
        Self { pool, target }
    }

    /// Final artifact path
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Run CPU-bound decoding on the worker pool
    pub async fn decode<F, R>(&self, job: F) -> Result<R>
    where
        F: FnOnce() -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        self.pool.run(job).await
    }

    /// Write the finished artifact to [`target`](Self::target) atomically
    pub async fn write_artifact(&self, bytes: Vec<u8>) -> Result<()> {
        let target = self.target.clone();
        self.pool.run(move || write_atomic(&target, &bytes)).await
    }
}

/// Write `bytes` to a temp file beside `target`, then rename it into place
///
/// Readers never observe a half-written artifact, so an interrupted write
/// cannot make a key look present.
pub fn write_atomic(target: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(target).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// Trait for a pluggable data source
///
/// Implementations are created once and shared across runs (`&self` only).
/// Network calls in [`discover`](Self::discover) and
/// [`retrieve`](Self::retrieve) are wrapped in
/// [`with_retry`](crate::retry::with_retry) by the engine using the
/// adapter's retry policy, so they should surface connection trouble as
/// [`Error::Transient`] and absent data as [`Error::PermanentMiss`].
///
/// # Examples
///
/// ```no_run
/// use async_trait::async_trait;
/// use starstream::adapter::{Location, SourceAdapter};
/// use starstream::config::AdapterConfig;
/// use starstream::http::HttpFetcher;
/// use starstream::probe::{probe_path, Presence};
/// use starstream::time_key::TimeKey;
///
/// struct Kyoto {
///     config: AdapterConfig,
///     http: HttpFetcher,
/// }
///
/// #[async_trait]
/// impl SourceAdapter for Kyoto {
///     fn config(&self) -> &AdapterConfig {
///         &self.config
///     }
///
///     fn probe(&self, key: &TimeKey) -> starstream::Result<Presence> {
///         Ok(probe_path(&self.config.root_dir.join(format!("{key}.txt"))))
///     }
///
///     async fn discover(&self, key: &TimeKey) -> starstream::Result<Vec<Location>> {
///         let url = format!("https://wdc.example.org/dst/{key}/index.html");
///         let target = self.config.root_dir.join(format!("{key}.txt"));
///         Ok(vec![Location::new(key.clone(), url, target)])
///     }
///
///     async fn retrieve(&self, location: &Location) -> starstream::Result<Vec<u8>> {
///         self.http.get_bytes(&location.url).await
///     }
/// }
/// ```
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Pipeline settings for this source
    fn config(&self) -> &AdapterConfig;

    /// Name used in logs and reports
    fn name(&self) -> &str {
        &self.config().name
    }

    /// Local state of `key`. Must not touch the network.
    fn probe(&self, key: &TimeKey) -> Result<Presence>;

    /// Enumerate the remote locations holding data for `key`
    ///
    /// An empty result is not an error: the key is dropped for this run.
    async fn discover(&self, key: &TimeKey) -> Result<Vec<Location>>;

    /// Fetch the raw bytes of one location
    async fn retrieve(&self, location: &Location) -> Result<Vec<u8>>;

    /// Turn a staged payload into the artifact at `ctx.target()`
    ///
    /// Decoding belongs in [`TransformContext::decode`]. The default stores
    /// the payload unchanged.
    async fn transform(&self, payload: &RawPayload, ctx: &TransformContext) -> Result<()> {
        let bytes = payload.read().await?;
        ctx.write_artifact(bytes).await
    }
}
