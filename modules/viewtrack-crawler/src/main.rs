use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use bitable_client::BitableClient;
use sheets_client::SheetsClient;
use viewtrack_crawler::config::Config;
use viewtrack_crawler::cycle::{CrawlCycle, CycleError, CycleOptions};
use viewtrack_crawler::extract::{AbbreviationTable, StatsExtractor};
use viewtrack_crawler::fetch::{BrowserlessFetcher, ChromeFetcher};
use viewtrack_crawler::pool::CrawlConfig;
use viewtrack_crawler::traits::{BitableSource, PageFetcher};
use viewtrack_crawler::upsert::SheetUpserter;

/// Crawl TikTok view counts and sync them into the tracking sheet.
#[derive(Parser, Debug)]
#[command(name = "viewtrack-crawler")]
struct Args {
    /// Crawl only these record ids (comma-separated). Default: all records.
    #[arg(long, value_delimiter = ',')]
    record_ids: Vec<String>,

    /// Cap the number of videos crawled this cycle.
    #[arg(long)]
    max_videos: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("viewtrack_crawler=info".parse()?),
        )
        .init();

    let args = Args::parse();

    info!("ViewTrack crawler starting...");

    // Load config
    let config = Config::from_env();
    config.log_redacted();

    // Pick the browser engine: remote browserless when configured, local
    // headless chromium otherwise.
    let fetcher: Arc<dyn PageFetcher> = match &config.browserless_url {
        Some(url) => Arc::new(BrowserlessFetcher::new(
            url,
            config.browserless_token.as_deref(),
            config.page_timeout_ms,
        )),
        None => Arc::new(ChromeFetcher::new(
            &config.chrome_bin,
            // Navigation budget plus slack for process startup.
            Duration::from_millis(config.page_timeout_ms + 5_000),
            config.crawl_permits,
        )),
    };
    let extractor = Arc::new(StatsExtractor::new(fetcher, AbbreviationTable::default()));

    let source = Arc::new(BitableSource::new(
        BitableClient::new(
            &config.bitable_base_url,
            &config.bitable_app_id,
            &config.bitable_app_secret,
            &config.bitable_app_token,
            &config.bitable_table_id,
        ),
        config.fields.clone(),
    ));

    let sheet = Arc::new(SheetsClient::new(
        &config.sheets_api_token,
        &config.spreadsheet_id,
        &config.sheet_tab,
        config.sheet_gid,
        config.sheet_writes_per_minute,
    ));
    let upserter = SheetUpserter::new(sheet);

    let crawl = CrawlConfig {
        permits: config.crawl_permits,
        attempts: config.crawl_attempts,
        delay_min_ms: config.delay_min_ms,
        delay_max_ms: config.delay_max_ms,
        recycle_every: config.recycle_every,
        ..CrawlConfig::default()
    };
    let cycle = CrawlCycle::new(
        source,
        extractor,
        upserter,
        crawl,
        config.failure_rate_alert,
    );

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown requested, keeping completed results");
                cancel.cancel();
            }
        });
    }

    let options = CycleOptions {
        record_ids: (!args.record_ids.is_empty()).then(|| args.record_ids.into_iter().collect()),
        max_videos: args.max_videos,
    };

    match cycle.run(&options, &cancel).await {
        Ok(summary) => {
            info!("Crawl cycle complete. {summary}");
            Ok(())
        }
        Err(e) => {
            error!("Crawl cycle failed: {e}");
            if let CycleError::ElevatedFailureRate { summary, .. } = &e {
                // The sheet was still written; surface what landed.
                info!("{summary}");
            }
            // Distinct exit codes so the scheduler can tell outage kinds apart.
            let code = match e {
                CycleError::SourceUnreachable(_) => 2,
                CycleError::SheetUnreachable(_) => 3,
                CycleError::ElevatedFailureRate { .. } => 4,
            };
            std::process::exit(code);
        }
    }
}
