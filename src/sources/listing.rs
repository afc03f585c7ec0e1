//! Sources discovered by scraping a per-key directory index
//!
//! Sub-daily image archives (EUVI wavelets, XRT synoptics, GOES XRS files)
//! publish one HTML index per day. Discovery lists that index, keeps the links
//! matching a pattern, optionally keeps only every `stride`-th one, and maps
//! each link to an artifact named after the remote file.

use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;

use super::KeyTemplate;
use super::decoders::{Decoder, PassThrough};
use crate::adapter::{Location, RawPayload, SourceAdapter, TransformContext};
use crate::config::AdapterConfig;
use crate::error::{Error, Result};
use crate::http::HttpFetcher;
use crate::probe::{Presence, probe_matching};
use crate::time_key::TimeKey;

/// Many remote files per key, enumerated from an HTML index
pub struct ListingSource {
    config: AdapterConfig,
    http: HttpFetcher,
    index_url: KeyTemplate,
    link_pattern: Regex,
    local_prefix: KeyTemplate,
    stride: usize,
    decoder: Arc<dyn Decoder>,
}

impl ListingSource {
    /// Create a source listing `index_url(key)` for links whose file name matches `link_pattern`
    ///
    /// Artifacts of a key are expected to start with the rendered key; see
    /// [`with_local_prefix`](Self::with_local_prefix) when they do not.
    pub fn new<U>(
        config: AdapterConfig,
        http: HttpFetcher,
        index_url: U,
        link_pattern: &str,
    ) -> Result<Self>
    where
        U: Fn(&TimeKey) -> String + Send + Sync + 'static,
    {
        Ok(Self {
            config,
            http,
            index_url: Arc::new(index_url),
            link_pattern: Regex::new(link_pattern)?,
            local_prefix: Arc::new(TimeKey::render),
            stride: 1,
            decoder: Arc::new(PassThrough),
        })
    }

    /// File-name prefix shared by all artifacts of a key
    pub fn with_local_prefix<P>(mut self, prefix: P) -> Self
    where
        P: Fn(&TimeKey) -> String + Send + Sync + 'static,
    {
        self.local_prefix = Arc::new(prefix);
        self
    }

    /// Keep only every `stride`-th matching link (cadence thinning)
    pub fn with_stride(mut self, stride: usize) -> Result<Self> {
        if stride == 0 {
            return Err(Error::config("stride", "stride must be at least 1"));
        }
        self.stride = stride;
        Ok(self)
    }

    /// Decode payloads with `decoder` before writing
    pub fn with_decoder(mut self, decoder: impl Decoder + 'static) -> Self {
        self.decoder = Arc::new(decoder);
        self
    }
}

#[async_trait]
impl SourceAdapter for ListingSource {
    fn config(&self) -> &AdapterConfig {
        &self.config
    }

    fn probe(&self, key: &TimeKey) -> Result<Presence> {
        let prefix = (self.local_prefix)(key);
        let pattern = Regex::new(&format!("^{}", regex::escape(&prefix)))?;
        probe_matching(&self.config.root_dir, &pattern)
    }

    async fn discover(&self, key: &TimeKey) -> Result<Vec<Location>> {
        let index = (self.index_url)(key);
        let links = self.http.list(&index, &self.link_pattern).await?;
        let total = links.len();

        let locations: Vec<Location> = links
            .into_iter()
            .step_by(self.stride)
            .filter_map(|link| {
                let remote_name = link.path_segments()?.next_back()?.to_string();
                let target = self
                    .config
                    .root_dir
                    .join(self.decoder.artifact_name(&remote_name));
                Some(Location::new(key.clone(), link.to_string(), target))
            })
            .collect();

        tracing::debug!(
            adapter = %self.config.name,
            key = %key,
            listed = total,
            kept = locations.len(),
            "Index listed"
        );
        Ok(locations)
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

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpConfig;
    use crate::sources::decoders::Gzip;
    use crate::time_key::KeyFormat;
    use chrono::NaiveDate;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn day(d: u32) -> TimeKey {
        TimeKey::new(
            NaiveDate::from_ymd_opt(2016, 10, d).unwrap().and_hms_opt(0, 0, 0).unwrap(),
            KeyFormat::daily(),
        )
    }

    fn euvi(server: &MockServer, root: &std::path::Path) -> ListingSource {
        let base = server.uri();
        ListingSource::new(
            AdapterConfig::new("euvi", root),
            HttpFetcher::new(&HttpConfig::default()).unwrap(),
            move |key| {
                format!(
                    "{base}/pngs/{}/{}/195_A/",
                    key.render_with("%Y%m"),
                    key.render_with("%d")
                )
            },
            r"^\d{8}_\d{6}_\d{3}eu_R\.png$",
        )
        .unwrap()
    }

    const INDEX: &str = r#"
        <a href="../">Parent</a>
        <a href="20161010_000530_195eu_R.png">0005</a>
        <a href="20161010_010530_195eu_R.png">0105</a>
        <a href="20161010_020530_195eu_R.png">0205</a>
        <a href="20161010_030530_195eu_R.png">0305</a>
        <a href="20161010_030530_195eu_R.fts">fits</a>
    "#;

    #[tokio::test]
    async fn discovery_lists_the_index_with_stride() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pngs/201610/10/195_A/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(INDEX))
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();

        let all = euvi(&server, dir.path()).discover(&day(10)).await.unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].target, dir.path().join("20161010_000530_195eu_R.png"));

        let thinned = euvi(&server, dir.path())
            .with_stride(2)
            .unwrap()
            .discover(&day(10))
            .await
            .unwrap();
        let names: Vec<_> = thinned
            .iter()
            .map(|l| l.target.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["20161010_000530_195eu_R.png", "20161010_020530_195eu_R.png"]);
    }

    #[tokio::test]
    async fn missing_index_is_permanent_miss() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();

        let err = euvi(&server, dir.path()).discover(&day(11)).await.unwrap_err();
        assert!(err.is_permanent_miss());
    }

    #[tokio::test]
    async fn decoder_decides_the_artifact_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<a href="oe_m1m_dscovr_s20161010000000.nc.gz">m1m</a>"#,
            ))
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let base = server.uri();
        let source = ListingSource::new(
            AdapterConfig::new("dscovr", dir.path()),
            HttpFetcher::new(&HttpConfig::default()).unwrap(),
            move |key| format!("{base}/dscovr/{}/", key.render_with("%Y/%m")),
            r"\.nc\.gz$",
        )
        .unwrap()
        .with_local_prefix(|key| format!("oe_m1m_dscovr_s{key}"))
        .with_decoder(Gzip);

        let locations = source.discover(&day(10)).await.unwrap();
        assert_eq!(locations[0].target, dir.path().join("oe_m1m_dscovr_s20161010000000.nc"));

        std::fs::write(&locations[0].target, b"nc").unwrap();
        assert!(source.probe(&day(10)).unwrap().is_present());
        assert!(!source.probe(&day(11)).unwrap().is_present());
    }

    #[test]
    fn zero_stride_is_rejected() {
        let source = ListingSource::new(
            AdapterConfig::new("x", "/tmp/x"),
            HttpFetcher::new(&HttpConfig::default()).unwrap(),
            |key| key.render(),
            ".*",
        )
        .unwrap();
        assert!(matches!(source.with_stride(0), Err(Error::Config { .. })));
    }

    #[test]
    fn bad_link_pattern_is_rejected() {
        let result = ListingSource::new(
            AdapterConfig::new("x", "/tmp/x"),
            HttpFetcher::new(&HttpConfig::default()).unwrap(),
            |key| key.render(),
            "(unclosed",
        );
        assert!(matches!(result, Err(Error::Pattern(_))));
    }
}
