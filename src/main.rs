mod context;
mod engine;
mod models;
mod probe;
mod report;
mod scrapers;
mod session;
mod store;

use anyhow::Result;
use clap::Parser;
use probe::HttpStatusProbe;
use scrapers::IdealistaScraper;
use session::TrackerSession;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};

/// Price and availability tracker for idealista.pt search results
#[derive(Debug, Parser)]
#[command(name = "idealista-tracker")]
struct Cli {
    /// Search-results URL to track
    url: String,

    /// Directory holding the persisted partitions
    #[arg(long, default_value = "tracker_data")]
    data_dir: PathBuf,

    /// Keep polling the search and refresh when results change
    #[arg(long)]
    watch: bool,

    /// Poll interval in seconds for --watch
    #[arg(long, default_value_t = 60)]
    interval: u64,

    /// Write the tracked records as CSV to this file
    #[arg(long)]
    export: Option<PathBuf>,

    /// Delete everything stored for this search and exit
    #[arg(long)]
    clear: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();

    info!("🏠 Idealista Tracker");
    info!("====================");

    let probe = Arc::new(HttpStatusProbe::new()?);
    let scraper = Arc::new(IdealistaScraper::new()?);
    let mut session = TrackerSession::start(&cli.data_dir, probe, scraper).await?;

    if cli.clear {
        let key = session.clear(&cli.url).await?;
        info!("🗑️ Cleared stored data for {key}");
        return session.shutdown().await;
    }

    if cli.watch {
        info!("Watching {} every {}s", cli.url, cli.interval);
        session
            .run_watch(&cli.url, Duration::from_secs(cli.interval), |summary| {
                println!("{}", report::render_summary(summary));
            })
            .await?;
    } else if let Some(summary) = session.run_once(&cli.url).await? {
        println!("{}", report::render_summary(&summary));

        if let Some(path) = &cli.export {
            let csv = report::to_csv(&summary.display);
            tokio::fs::write(path, csv).await?;
            info!("💾 Exported {} records to {}", summary.display.len(), path.display());
        }
    } else {
        info!("Nothing to track at {}", cli.url);
    }

    session.shutdown().await
}
