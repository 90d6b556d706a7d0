//! Cartographer load generator
//!
//! Reads a CSV of coordinates and posts them to a running server as fast as
//! its advertised concurrency allows.

use carto_bench::driver::BenchmarkDriver;
use carto_bench::target::HttpTarget;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::BufReader;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

/// Replay a coordinate file against a Cartographer server
#[derive(Parser, Debug)]
#[command(name = "carto-bench")]
#[command(version, about, long_about = None)]
struct Args {
    /// CSV file to import, one `lat,lon[,...]` record per line
    #[arg(short, long, default_value = "cities5.csv")]
    file: PathBuf,

    /// Scheme, host and port of the server under load
    #[arg(short = 'H', long, default_value = "http://localhost:8080")]
    host: Url,

    /// Path of the write endpoint on the host
    #[arg(short, long, default_value = "/geo")]
    write_endpoint: String,

    /// Path of the info endpoint on the host
    #[arg(short, long, default_value = "/info")]
    info_endpoint: String,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 5)]
    timeout_secs: u64,

    /// Also write the JSON report to this file
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    init_tracing();

    // Parse command line arguments
    let args = Args::parse();

    let target = HttpTarget::new(
        args.host,
        &args.write_endpoint,
        &args.info_endpoint,
        Duration::from_secs(args.timeout_secs),
    );
    let driver = BenchmarkDriver::connect(target).await.map_err(|e| {
        tracing::error!("Failed to query target: {}", e);
        e
    })?;

    let file = File::open(&args.file).await.map_err(|e| {
        tracing::error!("Failed to open {:?}: {}", args.file, e);
        e
    })?;
    tracing::info!("Replaying {:?}", args.file);

    let stats = driver.run(BufReader::new(file)).await?;
    let report = driver.report(stats);
    let json = serde_json::to_string_pretty(&report)?;

    tracing::info!("Done. {:?}", report);
    println!("{json}");

    if let Some(path) = &args.output {
        tokio::fs::write(path, &json).await?;
        tracing::info!("Report written to {:?}", path);
    }

    Ok(())
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
