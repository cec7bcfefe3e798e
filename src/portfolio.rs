use std::sync::{Arc, Mutex, MutexGuard};

use chrono::NaiveDate;
use polars::prelude::*;

use crate::data::{DeltaSource, PriceSource, DEFAULT_BENCHMARK};
use crate::error::{EngineError, Result};
use crate::sector::{Sector, SectorMap};
use crate::weighting::WeightingStrategy;
use crate::window::WindowSearch;

/// Weights may drift this far from summing to one.
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

/// What the portfolio holds and since when.
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioState {
    /// Dollars per sector as of `anchor_date`.
    pub allocations: SectorMap<f64>,
    /// Date the allocations were bought at; valuation basis.
    pub anchor_date: NaiveDate,
    /// One entry per successful rebalance, oldest first.
    pub weight_history: Vec<SectorMap<f64>>,
}

/// Outcome of a successful [`Portfolio::rebalance`].
#[derive(Debug, Clone, PartialEq)]
pub struct RebalanceReport {
    pub requested: NaiveDate,
    pub effective: NaiveDate,
    pub window_begin: NaiveDate,
    pub attempts: usize,
    /// Portfolio value at `effective`, before and after redistribution.
    pub total_value: f64,
    pub weights: SectorMap<f64>,
}

pub struct Portfolio<S, W> {
    state: PortfolioState,
    source: S,
    strategy: W,
    window: WindowSearch,
    benchmark: String,
}

impl Portfolio<(), ()> {
    pub fn builder() -> PortfolioBuilder {
        PortfolioBuilder::new()
    }
}

impl<S, W> Portfolio<S, W>
where
    S: PriceSource + DeltaSource,
    W: WeightingStrategy,
{
    pub fn state(&self) -> &PortfolioState {
        &self.state
    }

    pub fn allocations(&self) -> &SectorMap<f64> {
        &self.state.allocations
    }

    pub fn anchor_date(&self) -> NaiveDate {
        self.state.anchor_date
    }

    pub fn weight_history(&self) -> &[SectorMap<f64>] {
        &self.state.weight_history
    }

    /// Sum of allocations, i.e. portfolio value at the anchor date.
    pub fn total_allocated(&self) -> f64 {
        self.state.allocations.sum()
    }

    /// Fraction of the allocated total held in each sector.
    pub fn actual_weights(&self) -> SectorMap<f64> {
        let total = self.total_allocated();
        self.state.allocations.map(|_, amount| {
            if total > 0.0 {
                amount / total
            } else {
                0.0
            }
        })
    }

    /// Raw price of every sector on `date`.
    pub fn sector_values(&self, date: NaiveDate) -> Result<SectorMap<f64>> {
        SectorMap::try_from_fn(|sector| self.price(sector, date))
    }

    /// Value of the current holdings on `date`.
    ///
    /// Each allocation buys `amount / price(anchor_date)` shares, which are then
    /// priced at `date`.
    pub fn portfolio_value(&self, date: NaiveDate) -> Result<f64> {
        let anchor = self.state.anchor_date;
        let mut value = 0.0;
        for sector in Sector::ALL {
            let basis = self.price(sector, anchor)?;
            if basis <= 0.0 {
                return Err(EngineError::DataUnavailable {
                    sector,
                    date: anchor,
                });
            }
            let shares = self.state.allocations[sector] / basis;
            value += shares * self.price(sector, date)?;
        }
        Ok(value)
    }

    /// Recomputes target weights over a lookback window ending at (or just
    /// after) `date` and redistributes the portfolio value across sectors.
    ///
    /// Nothing in the state changes unless the whole rebalance succeeds.
    pub fn rebalance(&mut self, date: NaiveDate) -> Result<RebalanceReport> {
        let window = self.window.resolve(&self.source, date)?;
        let effective = window.end;
        if effective < self.state.anchor_date {
            return Err(EngineError::DateRegression {
                anchor: self.state.anchor_date,
                requested: effective,
            });
        }

        let deltas = self.sector_columns(&window.deltas)?;
        let named = self
            .strategy
            .weights(&deltas)
            .map_err(EngineError::Strategy)?;
        let weights = validate_weights(SectorMap::try_from_named(&named)?)?;

        let total_value = self.portfolio_value(effective)?;
        let allocations = weights.map(|_, weight| total_value * weight);

        self.state.weight_history.push(weights.clone());
        self.state.allocations = allocations;
        self.state.anchor_date = effective;

        tracing::info!(
            requested = %date,
            effective = %effective,
            total_value,
            rebalances = self.state.weight_history.len(),
            "Rebalanced portfolio"
        );

        Ok(RebalanceReport {
            requested: date,
            effective,
            window_begin: window.begin,
            attempts: window.attempts,
            total_value,
            weights,
        })
    }

    /// Strips the benchmark and date columns, leaving one column per sector.
    fn sector_columns(&self, deltas: &DataFrame) -> Result<DataFrame> {
        let deltas = if deltas.get_column_names().contains(&self.benchmark.as_str()) {
            deltas.drop(&self.benchmark)?
        } else {
            deltas.clone()
        };
        Ok(deltas.select(Sector::ALL.map(|s| s.column_name()))?)
    }

    fn price(&self, sector: Sector, date: NaiveDate) -> Result<f64> {
        match self.source.price(sector, date) {
            Some(price) if price.is_finite() && price >= 0.0 => Ok(price),
            _ => Err(EngineError::DataUnavailable { sector, date }),
        }
    }
}

fn validate_weights(weights: SectorMap<f64>) -> Result<SectorMap<f64>> {
    if let Some((sector, w)) = weights.iter().find(|(_, w)| !w.is_finite() || **w < 0.0) {
        return Err(EngineError::WeightMismatch(format!(
            "weight for {sector} is {w}"
        )));
    }
    let total = weights.sum();
    if (total - 1.0).abs() > WEIGHT_TOLERANCE {
        return Err(EngineError::WeightMismatch(format!(
            "weights sum to {total}"
        )));
    }
    Ok(weights)
}

pub struct PortfolioBuilder {
    allocations: Option<SectorMap<f64>>,
    start_amount: f64,
    anchor_date: NaiveDate,
    window: WindowSearch,
    benchmark: String,
}

impl Default for PortfolioBuilder {
    fn default() -> Self {
        Self {
            allocations: None,
            start_amount: 100.0,
            anchor_date: NaiveDate::from_ymd_opt(2011, 4, 1).unwrap_or_default(),
            window: WindowSearch::default(),
            benchmark: DEFAULT_BENCHMARK.to_string(),
        }
    }
}

impl PortfolioBuilder {
    pub fn new() -> PortfolioBuilder {
        PortfolioBuilder::default()
    }

    /// Dollars placed in every sector at the anchor date.
    pub fn start_amount(mut self, amount: f64) -> Self {
        self.start_amount = amount;
        self
    }

    /// Explicit starting allocations; overrides `start_amount`.
    pub fn allocations(mut self, allocations: SectorMap<f64>) -> Self {
        self.allocations = Some(allocations);
        self
    }

    pub fn anchor_date(mut self, date: NaiveDate) -> Self {
        self.anchor_date = date;
        self
    }

    pub fn window(mut self, window: WindowSearch) -> Self {
        self.window = window;
        self
    }

    /// Name of the market index column that is dropped before weighting.
    pub fn benchmark(mut self, column: impl Into<String>) -> Self {
        self.benchmark = column.into();
        self
    }

    pub fn build<S, W>(self, source: S, strategy: W) -> Result<Portfolio<S, W>> {
        let allocations = self
            .allocations
            .unwrap_or_else(|| SectorMap::uniform(self.start_amount));
        if let Some((sector, amount)) = allocations
            .iter()
            .find(|(_, a)| !a.is_finite() || **a < 0.0)
        {
            return Err(EngineError::InvalidAllocation(format!(
                "{sector} starts with {amount}"
            )));
        }

        Ok(Portfolio {
            state: PortfolioState {
                allocations,
                anchor_date: self.anchor_date,
                weight_history: Vec::new(),
            },
            source,
            strategy,
            window: self.window,
            benchmark: self.benchmark,
        })
    }
}

/// A [`Portfolio`] that can be shared between callers. Every operation takes
/// the same lock, so rebalances never interleave with each other or with reads.
pub struct SharedPortfolio<S, W> {
    inner: Arc<Mutex<Portfolio<S, W>>>,
}

impl<S, W> Clone for SharedPortfolio<S, W> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, W> SharedPortfolio<S, W>
where
    S: PriceSource + DeltaSource,
    W: WeightingStrategy,
{
    pub fn new(portfolio: Portfolio<S, W>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(portfolio)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Portfolio<S, W>>> {
        self.inner.lock().map_err(|_| EngineError::Lock)
    }

    pub fn rebalance(&self, date: NaiveDate) -> Result<RebalanceReport> {
        self.lock()?.rebalance(date)
    }

    pub fn portfolio_value(&self, date: NaiveDate) -> Result<f64> {
        self.lock()?.portfolio_value(date)
    }

    pub fn sector_values(&self, date: NaiveDate) -> Result<SectorMap<f64>> {
        self.lock()?.sector_values(date)
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> Result<PortfolioState> {
        Ok(self.lock()?.state().clone())
    }
}
