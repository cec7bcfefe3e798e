use std::collections::{BTreeMap, BTreeSet, HashMap};

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, NaiveDate};
use futures::{stream::FuturesUnordered, StreamExt};
use time::{Date, Month, OffsetDateTime};
use yahoo_finance_api::YahooConnector;

use crate::data::SectorDataset;
use crate::sector::{Sector, SectorMap};

pub const BENCHMARK_TICKER: &str = "^GSPC";

type Closes = BTreeMap<NaiveDate, f64>;

/// Daily adjusted closes for `ticker` between `start` and `end`.
pub async fn fetch_closes(
    client: &YahooConnector,
    ticker: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Closes> {
    let res = client
        .get_quote_history(ticker, to_offset(start)?, to_offset(end)?)
        .await?;
    let mut closes = Closes::new();
    for quote in res.quotes()? {
        let date = DateTime::from_timestamp(quote.timestamp as i64, 0)
            .context("quote timestamp out of range")?
            .date_naive();
        closes.insert(date, quote.adjclose);
    }
    Ok(closes)
}

/// Downloads every S&P 500 sector index plus the S&P 500 itself and builds a dataset whose
/// benchmark column is named `benchmark`.
pub async fn load_sector_dataset(
    start: NaiveDate,
    end: NaiveDate,
    benchmark: &str,
) -> Result<SectorDataset> {
    let client = YahooConnector::new();
    let tickers = Sector::ALL
        .iter()
        .map(|s| (Some(*s), s.ticker()))
        .chain(std::iter::once((None, BENCHMARK_TICKER)));

    let mut futures: FuturesUnordered<_> = tickers
        .map(|(sector, ticker)| {
            let client = &client;
            async move {
                let closes = fetch_closes(client, ticker, start, end)
                    .await
                    .with_context(|| format!("fetching {ticker}"));
                (sector, closes)
            }
        })
        .collect();

    let mut sectors = HashMap::new();
    let mut index = None;
    while let Some((sector, closes)) = futures.next().await {
        let closes = closes?;
        tracing::debug!(?sector, rows = closes.len(), "Fetched closes");
        match sector {
            Some(sector) => {
                sectors.insert(sector, closes);
            }
            None => index = Some(closes),
        }
    }

    let dataset = assemble(&sectors, index.as_ref(), benchmark)?;
    tracing::info!(rows = dataset.len(), %start, %end, "Loaded sector prices from Yahoo");
    Ok(dataset)
}

/// Lines the per-ticker closes up on the union of their dates. A ticker with
/// no close on a date (e.g. a series that starts later) has no data there.
fn assemble(
    sectors: &HashMap<Sector, Closes>,
    index: Option<&Closes>,
    benchmark: &str,
) -> Result<SectorDataset> {
    let dates: Vec<NaiveDate> = sectors
        .values()
        .chain(index)
        .flat_map(|closes| closes.keys().copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let column = |closes: Option<&Closes>| -> Vec<Option<f64>> {
        dates
            .iter()
            .map(|d| closes.and_then(|c| c.get(d).copied()))
            .collect()
    };
    let prices = SectorMap::from_fn(|sector| column(sectors.get(&sector)));
    let benchmark = index.map(|closes| (benchmark.to_string(), column(Some(closes))));

    Ok(SectorDataset::from_parts(dates, prices, benchmark)?)
}

fn to_offset(date: NaiveDate) -> Result<OffsetDateTime> {
    let month = Month::try_from(date.month() as u8)?;
    let date = Date::from_calendar_date(date.year(), month, date.day() as u8)?;
    Ok(date.midnight().assume_utc())
}

#[cfg(test)]
mod tests {
    use chrono::Weekday;
    use config::FileFormat;

    use super::*;
    use crate::config::Settings;
    use crate::data::{PriceSource, DEFAULT_BENCHMARK};
    use crate::error::EngineError;
    use crate::portfolio::Portfolio;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_assemble_unions_dates() {
        let mut sectors = HashMap::new();
        for sector in Sector::ALL {
            let mut closes = Closes::new();
            closes.insert(date("2021-01-05"), 2.0);
            if sector != Sector::Communication {
                closes.insert(date("2021-01-04"), 1.0);
            }
            sectors.insert(sector, closes);
        }
        let dataset = assemble(&sectors, None, DEFAULT_BENCHMARK).unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.price(Sector::Energy, date("2021-01-04")), Some(1.0));
        assert_eq!(dataset.price(Sector::Communication, date("2021-01-04")), None);
        assert_eq!(dataset.price(Sector::Communication, date("2021-01-05")), Some(2.0));
    }

    fn shipped_settings() -> Settings {
        config::Config::builder()
            .add_source(config::File::from_str(
                include_str!("../config.toml"),
                FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    /// Weekday closes from 2017 to mid 2021, shaped like a Yahoo download.
    /// Communication only trades from 2018-06-19 on.
    fn downloaded_history(benchmark: &str) -> SectorDataset {
        let first_listing = date("2018-06-19");
        let trading_days: Vec<NaiveDate> = date("2017-01-02")
            .iter_days()
            .take_while(|d| *d <= date("2021-06-30"))
            .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
            .collect();
        let series = |phase: f64, listed: NaiveDate| -> Closes {
            trading_days
                .iter()
                .enumerate()
                .filter(|(_, d)| **d >= listed)
                .map(|(i, d)| (*d, 100.0 * (1.0 + 0.2 * (i as f64 * 0.05 + phase).sin())))
                .collect()
        };

        let sectors: HashMap<Sector, Closes> = Sector::ALL
            .iter()
            .enumerate()
            .map(|(k, sector)| {
                let listed = if *sector == Sector::Communication {
                    first_listing
                } else {
                    trading_days[0]
                };
                (*sector, series(k as f64, listed))
            })
            .collect();
        let index = series(0.5, trading_days[0]);
        assemble(&sectors, Some(&index), benchmark).unwrap()
    }

    #[test]
    fn test_shipped_config_runs_on_downloaded_history() {
        let settings = shipped_settings();
        settings.validate().unwrap();
        let dataset = downloaded_history(&settings.portfolio.benchmark)
            .with_max_staleness(settings.data.max_staleness_days);

        let mut portfolio = Portfolio::builder()
            .start_amount(settings.portfolio.start_amount)
            .anchor_date(settings.portfolio.anchor_date)
            .window(settings.window)
            .benchmark(settings.portfolio.benchmark.clone())
            .build(dataset, settings.strategy.build())
            .unwrap();

        for rebalance_date in &settings.schedule {
            let before = portfolio.portfolio_value(*rebalance_date).unwrap();
            let report = portfolio.rebalance(*rebalance_date).unwrap();
            assert_eq!(report.effective, *rebalance_date);
            assert!((report.total_value - before).abs() < 1e-9);
            assert!((portfolio.total_allocated() - before).abs() < 1e-9);
        }
        assert_eq!(portfolio.weight_history().len(), settings.schedule.len());
        assert_eq!(Some(&portfolio.anchor_date()), settings.schedule.last());
    }

    #[test]
    fn test_anchor_before_listing_has_no_basis_price() {
        let settings = shipped_settings();
        let dataset = downloaded_history(DEFAULT_BENCHMARK)
            .with_max_staleness(settings.data.max_staleness_days);
        let portfolio = Portfolio::builder()
            .anchor_date(date("2018-06-15"))
            .build(dataset, settings.strategy.build())
            .unwrap();

        let err = portfolio.portfolio_value(date("2019-06-28")).unwrap_err();
        assert!(matches!(
            err,
            EngineError::DataUnavailable { sector: Sector::Communication, .. }
        ));
    }

    #[test]
    fn test_to_offset() {
        let dt = to_offset(date("2021-04-30")).unwrap();
        assert_eq!(dt.year(), 2021);
        assert_eq!(dt.month(), Month::April);
        assert_eq!(dt.day(), 30);
    }
}
