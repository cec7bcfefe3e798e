use std::path::Path;

use chrono::NaiveDate;
use polars::prelude::*;

use crate::error::Result;
use crate::sector::{Sector, SectorMap};

pub const DATE_COLUMN: &str = "date";
pub const DEFAULT_BENCHMARK: &str = "S&P_500";

/// Scalar price lookup keyed by sector and date.
pub trait PriceSource {
    /// Price of `sector` on `date`, or `None` when there is no data for that day.
    fn price(&self, sector: Sector, date: NaiveDate) -> Option<f64>;
}

/// Table of per-sector price deltas over a date range.
pub trait DeltaSource {
    /// Rows for every trading day in `[begin, end]`. An empty frame means the
    /// range holds no trading data; `Err` is reserved for real failures.
    fn deltas(&self, begin: NaiveDate, end: NaiveDate) -> Result<DataFrame>;
}

/// Daily sector prices held in memory, sorted by date.
#[derive(Debug, Clone)]
pub struct SectorDataset {
    dates: Vec<NaiveDate>,
    prices: SectorMap<Vec<Option<f64>>>,
    benchmark: Option<(String, Vec<Option<f64>>)>,
    max_staleness_days: i64,
}

impl SectorDataset {
    /// Builds a dataset from a price table with a `date` column holding
    /// `YYYY-MM-DD` strings, one column per sector and optionally `benchmark`.
    pub fn from_frame(df: &DataFrame, benchmark: &str) -> Result<Self> {
        let dates = df
            .column(DATE_COLUMN)?
            .cast(&DataType::String)?
            .str()?
            .into_iter()
            .map(|value| parse_date(value.unwrap_or_default()))
            .collect::<Result<Vec<_>>>()?;

        let prices = SectorMap::try_from_fn(|sector| float_column(df, sector.column_name()))?;
        let benchmark = if df.get_column_names().contains(&benchmark) {
            Some((benchmark.to_string(), float_column(df, benchmark)?))
        } else {
            None
        };

        Self::from_parts(dates, prices, benchmark)
    }

    pub fn from_csv(path: impl AsRef<Path>, benchmark: &str) -> Result<Self> {
        let df = CsvReader::from_path(path.as_ref())?
            .has_header(true)
            .finish()?;
        tracing::info!(
            path = %path.as_ref().display(),
            rows = df.height(),
            "Loaded sector price table"
        );
        Self::from_frame(&df, benchmark)
    }

    /// Assembles a dataset from already-aligned columns. Rows are sorted by
    /// date; a repeated date is rejected.
    pub fn from_parts(
        dates: Vec<NaiveDate>,
        prices: SectorMap<Vec<Option<f64>>>,
        benchmark: Option<(String, Vec<Option<f64>>)>,
    ) -> Result<Self> {
        let len = dates.len();
        if let Some((sector, _)) = prices.iter().find(|(_, col)| col.len() != len) {
            return Err(shape_error(format!("column {sector} does not match date count {len}")));
        }
        if let Some((name, col)) = &benchmark {
            if col.len() != len {
                return Err(shape_error(format!("column {name} does not match date count {len}")));
            }
        }

        let mut order: Vec<usize> = (0..len).collect();
        order.sort_by_key(|&i| dates[i]);
        if let Some(pair) = order.windows(2).find(|w| dates[w[0]] == dates[w[1]]) {
            return Err(shape_error(format!("duplicate date {}", dates[pair[0]])));
        }

        let reorder = |col: &Vec<Option<f64>>| order.iter().map(|&i| col[i]).collect::<Vec<_>>();
        Ok(Self {
            dates: order.iter().map(|&i| dates[i]).collect(),
            prices: prices.map(|_, col| reorder(col)),
            benchmark: benchmark.map(|(name, col)| {
                let col = reorder(&col);
                (name, col)
            }),
            max_staleness_days: 0,
        })
    }

    /// Lets price lookups fall back to the latest earlier row no more than
    /// `days` calendar days old (weekends, holidays).
    pub fn with_max_staleness(mut self, days: u32) -> Self {
        self.max_staleness_days = i64::from(days);
        self
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    /// Index of the latest row on or before `date`.
    fn row_at_or_before(&self, date: NaiveDate) -> Option<usize> {
        self.dates.partition_point(|d| *d <= date).checked_sub(1)
    }
}

impl PriceSource for SectorDataset {
    fn price(&self, sector: Sector, date: NaiveDate) -> Option<f64> {
        let row = self.row_at_or_before(date)?;
        if (date - self.dates[row]).num_days() > self.max_staleness_days {
            return None;
        }
        self.prices[sector][row]
    }
}

impl DeltaSource for SectorDataset {
    fn deltas(&self, begin: NaiveDate, end: NaiveDate) -> Result<DataFrame> {
        // A row needs its predecessor for a return, so the first row never qualifies.
        let start = self.dates.partition_point(|d| *d < begin).max(1);
        let stop = self.dates.partition_point(|d| *d <= end);
        let rows = start..stop.max(start);

        let returns = |col: &Vec<Option<f64>>| -> Vec<Option<f64>> {
            rows.clone()
                .map(|i| match (col[i - 1], col[i]) {
                    (Some(prev), Some(cur)) if prev != 0.0 => Some(cur / prev - 1.0),
                    _ => None,
                })
                .collect()
        };

        let dates: Vec<String> = rows.clone().map(|i| self.dates[i].to_string()).collect();
        let mut columns = vec![Series::new(DATE_COLUMN, dates)];
        for (sector, col) in self.prices.iter() {
            columns.push(Series::new(sector.column_name(), returns(col)));
        }
        if let Some((name, col)) = &self.benchmark {
            columns.push(Series::new(name.as_str(), returns(col)));
        }
        Ok(DataFrame::new(columns)?)
    }
}

fn float_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let series = df.column(name)?.cast(&DataType::Float64)?;
    Ok(series.f64()?.into_iter().collect())
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|e| shape_error(format!("invalid date {value:?}: {e}")))
}

fn shape_error(msg: String) -> crate::error::EngineError {
    PolarsError::ComputeError(msg.into()).into()
}
