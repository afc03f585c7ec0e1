//! Configuration types for starstream

use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, time::Duration};

use crate::error::{Error, Result};
use crate::time_key::{KeyFormat, Step};

/// Largest batch size accepted for an adapter.
///
/// Batch size is the only bound on simultaneous connections per stage, so it
/// stays small enough for public science archives.
pub const MAX_BATCH_SIZE: usize = 25;

/// Shape of the delay curve between retries
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// `2n + base` seconds before attempt `n + 1`
    Linear,
    /// `2^n + base` seconds before attempt `n + 1`
    #[default]
    #[serde(alias = "exp")]
    Exponential,
}

/// Retry configuration for transient network failures
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Constant part of every delay (default: 5 seconds)
    #[serde(default = "default_base_cooldown", with = "duration_serde")]
    pub base_cooldown: Duration,

    /// Consecutive transient failures tolerated before giving up (default: 5)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay curve (default: exponential)
    #[serde(default)]
    pub backoff: Backoff,

    /// Add random jitter on top of each delay (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_cooldown: default_base_cooldown(),
            max_retries: default_max_retries(),
            backoff: Backoff::default(),
            jitter: false,
        }
    }
}

/// HTTP client settings shared by all adapters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout (default: 60 seconds)
    #[serde(default = "default_http_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Skip TLS certificate verification (default: false)
    ///
    /// Some archive mirrors serve expired or self-signed certificates.
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: default_http_timeout(),
            user_agent: default_user_agent(),
            accept_invalid_certs: false,
        }
    }
}

/// Worker pool for CPU-bound transform work
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeConfig {
    /// Maximum transforms decoding at once (default: available parallelism)
    #[serde(default = "default_decode_workers")]
    pub workers: usize,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            workers: default_decode_workers(),
        }
    }
}

/// What to do with a location the remote side reported as missing
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "policy")]
pub enum MissPolicy {
    /// Report and drop immediately (default)
    #[default]
    Drop,
    /// Re-attempt missed items after the main pass, up to `rounds` times
    Requeue {
        /// Number of extra passes over the missed items
        rounds: u32,
    },
}

impl MissPolicy {
    /// Extra passes granted to missed items
    pub fn rounds(&self) -> u32 {
        match self {
            MissPolicy::Drop => 0,
            MissPolicy::Requeue { rounds } => *rounds,
        }
    }
}

/// Per-source pipeline settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Name used in logs and run reports
    pub name: String,

    /// Directory holding this source's artifacts
    pub root_dir: PathBuf,

    /// Items processed concurrently per stage (default: 8, max: 25)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Sampling granularity of the source (default: 1 day)
    #[serde(default = "default_step")]
    pub step: Step,

    /// Rendering rule for time keys (default: `%Y%m%d`)
    #[serde(default)]
    pub key_format: KeyFormat,

    /// Finest step the source can serve (None = unrestricted)
    #[serde(default, with = "optional_duration_serde")]
    pub min_resolution: Option<Duration>,

    /// Retry policy for this source's network operations
    #[serde(default)]
    pub retry: RetryConfig,

    /// Handling of permanent misses
    #[serde(default)]
    pub miss_policy: MissPolicy,
}

impl AdapterConfig {
    /// Settings with defaults for everything but name and root directory
    pub fn new(name: impl Into<String>, root_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root_dir: root_dir.into(),
            batch_size: default_batch_size(),
            step: default_step(),
            key_format: KeyFormat::default(),
            min_resolution: None,
            retry: RetryConfig::default(),
            miss_policy: MissPolicy::default(),
        }
    }

    /// Check the settings before any run starts
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::config("name", "adapter name must not be empty"));
        }
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(Error::config(
                "batch_size",
                format!(
                    "batch size for {} must be between 1 and {MAX_BATCH_SIZE}, got {}",
                    self.name, self.batch_size
                ),
            ));
        }
        if self.retry.max_retries == 0 {
            return Err(Error::config(
                "max_retries",
                format!("{} must allow at least one attempt", self.name),
            ));
        }
        self.step.validate(self.min_resolution)
    }
}

/// Top-level configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Transform worker pool
    #[serde(default)]
    pub decode: DecodeConfig,

    /// Per-source settings, looked up by name when adapters are built
    #[serde(default)]
    pub adapters: Vec<AdapterConfig>,
}

impl Config {
    /// Load and validate a JSON configuration file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Settings for the adapter called `name`
    pub fn adapter(&self, name: &str) -> Option<&AdapterConfig> {
        self.adapters.iter().find(|a| a.name == name)
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        if self.http.timeout.is_zero() {
            return Err(Error::config("timeout", "HTTP timeout must be non-zero"));
        }
        if self.decode.workers == 0 {
            return Err(Error::config("workers", "decode pool needs at least one worker"));
        }
        for adapter in &self.adapters {
            adapter.validate()?;
        }
        Ok(())
    }
}

fn default_base_cooldown() -> Duration {
    Duration::from_secs(5)
}

fn default_max_retries() -> u32 {
    5
}

fn default_http_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_user_agent() -> String {
    format!("starstream/{}", env!("CARGO_PKG_VERSION"))
}

fn default_decode_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_batch_size() -> usize {
    8
}

fn default_step() -> Step {
    Step::days(1)
}

// Duration serialization helper (whole seconds)
pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
