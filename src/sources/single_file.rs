//! Sources with exactly one remote file per time key
//!
//! Covers catalogues whose URLs can be computed from the key alone, such as
//! yearly OMNI CDF files, monthly Dst tables or daily compressed DSCOVR
//! products. Discovery needs no network round trip.

use async_trait::async_trait;
use std::sync::Arc;

use super::KeyTemplate;
use super::decoders::{Decoder, PassThrough};
use crate::adapter::{Location, RawPayload, SourceAdapter, TransformContext};
use crate::config::AdapterConfig;
use crate::error::Result;
use crate::http::HttpFetcher;
use crate::probe::{Presence, probe_path};
use crate::time_key::TimeKey;

/// One URL and one artifact per key, both computed from the key
pub struct SingleFileSource {
    config: AdapterConfig,
    http: HttpFetcher,
    url: KeyTemplate,
    file_name: KeyTemplate,
    decoder: Arc<dyn Decoder>,
}

impl SingleFileSource {
    /// Create a source
    ///
    /// * `url` - remote URL for a key
    /// * `file_name` - artifact file name under `config.root_dir`
    pub fn new<U, F>(config: AdapterConfig, http: HttpFetcher, url: U, file_name: F) -> Self
    where
        U: Fn(&TimeKey) -> String + Send + Sync + 'static,
        F: Fn(&TimeKey) -> String + Send + Sync + 'static,
    {
        Self {
            config,
            http,
            url: Arc::new(url),
            file_name: Arc::new(file_name),
            decoder: Arc::new(PassThrough),
        }
    }

    /// Decode payloads with `decoder` before writing
    pub fn with_decoder(mut self, decoder: impl Decoder + 'static) -> Self {
        self.decoder = Arc::new(decoder);
        self
    }

    fn target(&self, key: &TimeKey) -> std::path::PathBuf {
        self.config.root_dir.join((self.file_name)(key))
    }
}

#[async_trait]
impl SourceAdapter for SingleFileSource {
    fn config(&self) -> &AdapterConfig {
        &self.config
    }

    fn probe(&self, key: &TimeKey) -> Result<Presence> {
        Ok(probe_path(&self.target(key)))
    }

    async fn discover(&self, key: &TimeKey) -> Result<Vec<Location>> {
        Ok(vec![Location::new(
            key.clone(),
            (self.url)(key),
            self.target(key),
        )])
    }

    async fn retrieve(&self, location: &Location) -> Result<Vec<u8>> {
        self.http.get_bytes(&location.url).await
    }

    async fn transform(&self, payload: &RawPayload, ctx: &TransformContext) -> Result<()> {
        let raw = payload.read().await?;
        let decoder = Arc::clone(&self.decoder);
        let decoded = ctx.decode(move || decoder.decode(raw)).await?;
        ctx.write_artifact(decoded).await
    }
}
