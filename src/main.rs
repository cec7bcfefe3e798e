use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{Days, NaiveDate};
use clap::Parser;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use sector_rebalance::config::{load_settings, DataSourceKind, Settings};
use sector_rebalance::weighting::{sector_frame, weights_to_dataframe};
use sector_rebalance::{yahoo, Portfolio, SectorDataset, Usd};

/// Values a sector portfolio and rebalances it on a schedule.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file (TOML). Defaults to ./config.toml when present.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Rebalance date (format: YYYY-MM-DD). Repeat to replace the configured schedule.
    #[arg(long = "date")]
    dates: Vec<NaiveDate>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    let mut settings = load_settings(cli.config.as_deref())?;
    if !cli.dates.is_empty() {
        settings.schedule = cli.dates;
        settings.validate()?;
    }

    let dataset = load_dataset(&settings).await?;
    let mut portfolio = Portfolio::builder()
        .start_amount(settings.portfolio.start_amount)
        .anchor_date(settings.portfolio.anchor_date)
        .benchmark(settings.portfolio.benchmark.clone())
        .window(settings.window)
        .build(dataset, settings.strategy.build())?;

    println!("Start: {}", sector_frame(portfolio.allocations(), "amount")?);
    println!("START: {}\n", Usd(portfolio.total_allocated()));

    for date in &settings.schedule {
        let report = portfolio
            .rebalance(*date)
            .with_context(|| format!("rebalancing on {date}"))?;
        println!(
            "Rebalanced {} (effective {}): {}",
            report.requested,
            report.effective,
            Usd(report.total_value)
        );
    }

    if let Some(weights) = portfolio.weight_history().last() {
        println!("\nTarget weights: {}", weights_to_dataframe(weights)?);
    }
    println!("End: {}", sector_frame(portfolio.allocations(), "amount")?);
    println!("FINAL: {}", Usd(portfolio.total_allocated()));
    Ok(())
}

async fn load_dataset(settings: &Settings) -> Result<SectorDataset> {
    let benchmark = settings.portfolio.benchmark.clone();
    let dataset = match settings.data.source {
        DataSourceKind::Csv => {
            let path = settings.data.csv_path.clone();
            tokio::task::spawn_blocking(move || SectorDataset::from_csv(&path, &benchmark))
                .await?
                .with_context(|| format!("loading {}", settings.data.csv_path.display()))?
        }
        DataSourceKind::Yahoo => {
            let (start, end) = fetch_range(settings);
            yahoo::load_sector_dataset(start, end, &benchmark).await?
        }
    };
    Ok(dataset.with_max_staleness(settings.data.max_staleness_days))
}

/// Span of prices the schedule can touch: the first lookback window through
/// the furthest date the window search may drift to.
fn fetch_range(settings: &Settings) -> (NaiveDate, NaiveDate) {
    let anchor = settings.portfolio.anchor_date;
    let first = settings.schedule.first().copied().unwrap_or(anchor).min(anchor);
    let last = settings.schedule.last().copied().unwrap_or(anchor);
    let start = first
        .checked_sub_days(Days::new(settings.window.lookback_days + 7))
        .unwrap_or(first);
    let end = last
        .checked_add_days(Days::new(settings.window.max_attempts as u64 + 1))
        .unwrap_or(last);
    (start, end)
}
