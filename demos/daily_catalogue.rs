//! Keep a local mirror of three space-weather catalogues up to date
//!
//! This example shows how to:
//! - Load per-source settings from a JSON config (or fall back to defaults)
//! - Build sources with single-file and directory-listing shapes
//! - Fetch a date range with Ctrl+C handling
//!
//! ```bash
//! cargo run --example daily_catalogue -- 2021-01-01 2021-01-31 [config.json]
//! ```
//!
//! Re-running the same command only fetches what is still missing.

use chrono::NaiveDate;
use std::sync::Arc;
use starstream::config::{AdapterConfig, Config};
use starstream::http::HttpFetcher;
use starstream::sources::{ListingSource, SingleFileSource};
use starstream::{DecodePool, KeyFormat, SourceAdapter, Step, TimeRange, fetch_until_interrupted};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing (optional)
    // Uncomment if you add tracing-subscriber to your dependencies:
    // tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let start: NaiveDate = args.next().unwrap_or_else(|| "2021-01-01".into()).parse()?;
    let end: NaiveDate = args.next().unwrap_or_else(|| "2021-01-31".into()).parse()?;
    let config = match args.next() {
        Some(path) => Config::from_json_file(path)?,
        None => Config::default(),
    };

    let http = HttpFetcher::new(&config.http)?;
    let settings = |name: &str, fallback: AdapterConfig| {
        config.adapter(name).cloned().unwrap_or(fallback)
    };

    // OMNI: one CDF per year
    let mut omni = AdapterConfig::new("omni", "./data/OMNI");
    omni.step = Step::years(1);
    omni.key_format = KeyFormat::yearly();
    let omni = SingleFileSource::new(
        settings("omni", omni),
        http.clone(),
        |key| {
            format!(
                "https://cdaweb.gsfc.nasa.gov/sp_phys/data/omni/hro2_5min/{key}/omni_hro2_5min_{key}0101_v01.cdf"
            )
        },
        |key| format!("omni_hro2_5min_{key}.cdf"),
    );

    // Dst: realtime monthly tables
    let mut dst = AdapterConfig::new("dst", "./data/Dst");
    dst.step = Step::months(1);
    dst.key_format = KeyFormat::monthly();
    let dst = SingleFileSource::new(
        settings("dst", dst),
        http.clone(),
        |key| {
            format!(
                "https://wdc.kugi.kyoto-u.ac.jp/dst_realtime/{key}/dst{}.for.request",
                key.render_with("%y%m")
            )
        },
        |key| format!("dst_{key}.txt"),
    );

    // EUVI: daily index of 195 Å images, every 4th frame
    let euvi = ListingSource::new(
        settings("euvi", AdapterConfig::new("euvi", "./data/EUVI")),
        http,
        |key| {
            format!(
                "https://stereo-ssc.nascom.nasa.gov/browse/{}/ahead/euvi/195/512/",
                key.render_with("%Y/%m/%d")
            )
        },
        r"^\d{8}_\d{6}_\w+\.jpg$",
    )?
    .with_stride(4)?;

    let adapters: Vec<Arc<dyn SourceAdapter>> = vec![Arc::new(omni), Arc::new(dst), Arc::new(euvi)];
    let pool = DecodePool::new(config.decode.workers);
    let range = TimeRange::days(start, end)?;

    match fetch_until_interrupted(&[range], &adapters, &pool).await? {
        Some(summary) => {
            for outcome in &summary.outcomes {
                match &outcome.result {
                    Ok(report) => println!(
                        "{:>5}: {} candidates, {} pending, {} written, {} failed",
                        report.adapter,
                        report.candidates,
                        report.pending,
                        report.transformed,
                        report.failures.len()
                    ),
                    Err(e) => println!("{:>5}: aborted ({e})", outcome.adapter),
                }
            }
        }
        None => println!("Interrupted, run again to resume"),
    }

    Ok(())
}
