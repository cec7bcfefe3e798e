use std::cell::RefCell;
use std::collections::HashMap;

use chrono::NaiveDate;
use polars::prelude::*;

use sector_rebalance::data::{DATE_COLUMN, DEFAULT_BENCHMARK};
use sector_rebalance::{
    DeltaSource, EngineError, EqualWeight, InverseVolatility, Portfolio, PriceSource, Sector,
    SectorDataset, SectorMap, WeightingStrategy, WindowSearch,
};

fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

/// Flat prices everywhere; delta data only once the window reaches `data_from`.
struct StubSource {
    price: f64,
    data_from: NaiveDate,
    queries: RefCell<Vec<(NaiveDate, NaiveDate)>>,
}

impl StubSource {
    fn new(data_from: NaiveDate) -> Self {
        Self {
            price: 1.0,
            data_from,
            queries: RefCell::new(Vec::new()),
        }
    }
}

impl PriceSource for StubSource {
    fn price(&self, _sector: Sector, _date: NaiveDate) -> Option<f64> {
        Some(self.price)
    }
}

impl DeltaSource for StubSource {
    fn deltas(&self, begin: NaiveDate, end: NaiveDate) -> sector_rebalance::Result<DataFrame> {
        self.queries.borrow_mut().push((begin, end));
        let rows = usize::from(end >= self.data_from);
        let mut columns = vec![Series::new(DATE_COLUMN, vec![end.to_string(); rows])];
        for sector in Sector::ALL {
            columns.push(Series::new(sector.column_name(), vec![0.0; rows]));
        }
        columns.push(Series::new(DEFAULT_BENCHMARK, vec![0.0; rows]));
        Ok(DataFrame::new(columns)?)
    }
}

/// Fails unless it is handed exactly the eleven sector columns.
struct SectorsOnly;

impl WeightingStrategy for SectorsOnly {
    fn weights(&self, deltas: &DataFrame) -> anyhow::Result<HashMap<String, f64>> {
        let names = deltas.get_column_names();
        anyhow::ensure!(names.len() == 11, "unexpected columns {names:?}");
        anyhow::ensure!(!names.contains(&DEFAULT_BENCHMARK), "benchmark leaked");
        EqualWeight.weights(deltas)
    }
}

/// Two years of daily prices where each sector trends and wobbles differently.
fn trending_dataset() -> SectorDataset {
    let start = date("2019-01-01");
    let dates: Vec<NaiveDate> = (0..730).map(|i| start + chrono::Days::new(i)).collect();
    let prices = SectorMap::from_fn(|sector| {
        let k = Sector::ALL.iter().position(|s| *s == sector).unwrap() as f64;
        dates
            .iter()
            .enumerate()
            .map(|(i, _)| {
                let t = i as f64;
                Some(50.0 + k + t * 0.01 * (k - 5.0) + (t * (0.3 + k * 0.05)).sin() * (1.0 + k * 0.2))
            })
            .collect()
    });
    let benchmark = Some((
        DEFAULT_BENCHMARK.to_string(),
        (0..dates.len()).map(|i| Some(3000.0 + i as f64)).collect(),
    ));
    SectorDataset::from_parts(dates, prices, benchmark).unwrap()
}

#[test]
fn uniform_weights_at_flat_prices_keep_allocations() {
    let mut portfolio = Portfolio::builder()
        .start_amount(100.0)
        .anchor_date(date("2011-04-01"))
        .build(StubSource::new(date("2000-01-01")), EqualWeight)
        .unwrap();

    let report = portfolio.rebalance(date("2021-04-30")).unwrap();

    for (_, amount) in portfolio.allocations().iter() {
        assert!((amount - 100.0).abs() < 1e-9);
    }
    assert!((portfolio.total_allocated() - 1100.0).abs() < 1e-9);
    assert_eq!(report.effective, date("2021-04-30"));
    assert_eq!(portfolio.anchor_date(), report.effective);
    assert_eq!(portfolio.weight_history().len(), 1);
}

#[test]
fn empty_window_resolves_by_moving_end_forward() {
    let requested = date("2021-04-30");
    let mut portfolio = Portfolio::builder()
        .anchor_date(date("2011-04-01"))
        .build(StubSource::new(date("2021-05-01")), SectorsOnly)
        .unwrap();

    let report = portfolio.rebalance(requested).unwrap();

    assert_eq!(report.attempts, 1);
    assert_eq!(report.window_begin, date("2020-04-30"));
    assert_eq!(report.effective, date("2021-05-01"));
    assert_eq!(portfolio.anchor_date(), date("2021-05-01"));
}

#[test]
fn window_that_never_fills_leaves_state_untouched() {
    let mut portfolio = Portfolio::builder()
        .anchor_date(date("2011-04-01"))
        .window(WindowSearch {
            lookback_days: 365,
            max_attempts: 6,
        })
        .build(StubSource::new(date("2099-01-01")), EqualWeight)
        .unwrap();
    let before = portfolio.state().clone();

    let err = portfolio.rebalance(date("2021-04-30")).unwrap_err();

    assert!(matches!(err, EngineError::WindowNotFound { attempts: 6, .. }));
    assert_eq!(*portfolio.state(), before);
}

#[test]
fn rebalances_conserve_value_and_advance_anchor() {
    let mut portfolio = Portfolio::builder()
        .anchor_date(date("2019-01-01"))
        .build(trending_dataset(), InverseVolatility)
        .unwrap();

    let mut previous_anchor = portfolio.anchor_date();
    for requested in ["2019-06-28", "2019-12-31", "2020-06-30", "2020-12-30"] {
        let requested = date(requested);
        let before = portfolio.portfolio_value(requested).unwrap();
        let report = portfolio.rebalance(requested).unwrap();

        assert!((portfolio.total_allocated() - before).abs() <= before * 1e-9);
        assert!((report.total_value - before).abs() <= before * 1e-9);
        assert!(portfolio.allocations().values().all(|a| *a >= 0.0));
        assert!(portfolio.anchor_date() >= previous_anchor);
        previous_anchor = portfolio.anchor_date();
    }
    assert_eq!(portfolio.weight_history().len(), 4);
    for weights in portfolio.weight_history() {
        assert!((weights.sum() - 1.0).abs() < 1e-9);
    }
}

#[test]
fn valuation_is_read_only() {
    let portfolio = Portfolio::builder()
        .anchor_date(date("2019-01-01"))
        .build(trending_dataset(), InverseVolatility)
        .unwrap();
    let before = portfolio.state().clone();

    let first = portfolio.portfolio_value(date("2020-03-02")).unwrap();
    let second = portfolio.portfolio_value(date("2020-03-02")).unwrap();

    assert_eq!(first, second);
    assert_eq!(*portfolio.state(), before);
}

#[test]
fn sector_values_report_raw_prices() {
    let data = trending_dataset();
    let expected = data.price(Sector::Materials, date("2019-03-01"));
    let portfolio = Portfolio::builder().build(data, EqualWeight).unwrap();

    let values = portfolio.sector_values(date("2019-03-01")).unwrap();
    assert_eq!(Some(values[Sector::Materials]), expected);
}
