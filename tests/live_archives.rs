#![cfg(feature = "live-tests")]

//! Live tests against a real public archive.
//!
//! Fetches two months of the Kyoto realtime Dst index, then repeats the fetch
//! and checks that nothing is retrieved the second time.
//!
//! Gated behind the `live-tests` feature flag. Requires network access.
//!
//! ```bash
//! cargo test --features live-tests --test live_archives -- --nocapture
//! ```

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::NaiveDate;
use std::sync::Arc;
use starstream::config::{AdapterConfig, HttpConfig};
use starstream::http::HttpFetcher;
use starstream::sources::SingleFileSource;
use starstream::{DecodePool, KeyFormat, SourceAdapter, Step, TimeRange, fetch_with_pool};

fn kyoto_dst(root: &std::path::Path) -> SingleFileSource {
    let mut config = AdapterConfig::new("dst", root);
    config.step = Step::months(1);
    config.key_format = KeyFormat::monthly();
    config.batch_size = 2;
    SingleFileSource::new(
        config,
        HttpFetcher::new(&HttpConfig::default()).expect("HTTP client"),
        |key| {
            format!(
                "https://wdc.kugi.kyoto-u.ac.jp/dst_realtime/{key}/dst{}.for.request",
                key.render_with("%y%m")
            )
        },
        |key| format!("{key}.txt"),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn live_dst_months_are_fetched_once() {
    let dir = tempfile::tempdir().unwrap();
    let adapters: Vec<Arc<dyn SourceAdapter>> = vec![Arc::new(kyoto_dst(dir.path()))];
    let range = TimeRange::days(
        NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2021, 2, 1).unwrap(),
    )
    .unwrap();
    let pool = DecodePool::new(2);

    let first = fetch_with_pool(&[range], &adapters, &pool).await.unwrap();
    let report = first.reports().next().expect("dst report");
    println!("first run: {report:?}");
    assert_eq!(report.candidates, 2);
    assert_eq!(report.transformed, 2, "failures: {:?}", report.failures);

    let table = std::fs::read_to_string(dir.path().join("202101.txt")).unwrap();
    assert!(table.starts_with("DST2101"), "unexpected content: {}", &table[..table.len().min(80)]);

    let second = fetch_with_pool(&[range], &adapters, &pool).await.unwrap();
    let report = second.reports().next().expect("dst report");
    assert_eq!(report.pending, 0);
    assert_eq!(report.transformed, 0);
}
