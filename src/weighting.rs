use std::collections::HashMap;

use anyhow::{bail, Result};
use polars::prelude::*;
use serde::Deserialize;

use crate::sector::SectorMap;

/// Turns a table of sector deltas into target weights.
///
/// The table holds one `Float64` column per sector, named by
/// [`Sector::column_name`](crate::sector::Sector::column_name), and nothing else.
/// The result is keyed by column name; the portfolio checks that it covers
/// every sector and sums to one before using it.
pub trait WeightingStrategy {
    fn weights(&self, deltas: &DataFrame) -> Result<HashMap<String, f64>>;
}

impl<W: WeightingStrategy + ?Sized> WeightingStrategy for Box<W> {
    fn weights(&self, deltas: &DataFrame) -> Result<HashMap<String, f64>> {
        (**self).weights(deltas)
    }
}

/// Same weight for every column.
#[derive(Debug, Clone, Copy, Default)]
pub struct EqualWeight;

impl WeightingStrategy for EqualWeight {
    fn weights(&self, deltas: &DataFrame) -> Result<HashMap<String, f64>> {
        let names = deltas.get_column_names();
        if names.is_empty() {
            bail!("no columns to weight");
        }
        let weight = 1.0 / names.len() as f64;
        Ok(names.into_iter().map(|name| (name.to_string(), weight)).collect())
    }
}

/// Weights proportional to the inverse of each column's standard deviation.
#[derive(Debug, Clone, Copy, Default)]
pub struct InverseVolatility;

impl WeightingStrategy for InverseVolatility {
    fn weights(&self, deltas: &DataFrame) -> Result<HashMap<String, f64>> {
        let mut inv_vols = Vec::with_capacity(deltas.width());
        for series in deltas.get_columns() {
            let values = series.f64()?;
            if values.len() - values.null_count() < 2 {
                bail!("column {} has fewer than two observations", series.name());
            }
            let vol = values.std(1).unwrap_or(f64::NAN);
            if vol <= 0.0 || !vol.is_finite() {
                bail!("column {} has no usable volatility ({vol})", series.name());
            }
            inv_vols.push((series.name().to_string(), 1.0 / vol));
        }

        let total: f64 = inv_vols.iter().map(|(_, iv)| iv).sum();
        if total == 0.0 {
            bail!("no columns to weight");
        }
        Ok(inv_vols.into_iter().map(|(name, iv)| (name, iv / total)).collect())
    }
}

/// Strategy selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Equal,
    #[default]
    InverseVolatility,
}

impl StrategyKind {
    pub fn build(self) -> Box<dyn WeightingStrategy + Send + Sync> {
        match self {
            StrategyKind::Equal => Box::new(EqualWeight),
            StrategyKind::InverseVolatility => Box::new(InverseVolatility),
        }
    }
}

/// Two-column `sector`/`weight` table for display.
pub fn weights_to_dataframe(weights: &SectorMap<f64>) -> PolarsResult<DataFrame> {
    sector_frame(weights, "weight")
}

/// Two-column table of `sector` and `value_column`, one row per sector.
pub fn sector_frame(values: &SectorMap<f64>, value_column: &str) -> PolarsResult<DataFrame> {
    let sectors: Vec<_> = values.iter().map(|(s, _)| s.column_name()).collect();
    let values: Vec<_> = values.values().copied().collect();
    df!(
        "sector" => sectors,
        value_column => values
    )
}
