//! Sector portfolio valuation and risk-weighted rebalancing.
//!
//! A [`Portfolio`] holds a dollar allocation per [`Sector`] anchored at a date.
//! It values those holdings at later dates from a [`PriceSource`] and, on
//! rebalance, asks a [`WeightingStrategy`] for new target weights over a
//! lookback window of sector deltas from a [`DeltaSource`].

pub mod config;
pub mod data;
pub mod error;
pub mod money;
pub mod portfolio;
pub mod sector;
pub mod weighting;
pub mod window;
pub mod yahoo;

pub use data::{DeltaSource, PriceSource, SectorDataset};
pub use error::{ConfigError, EngineError, Result};
pub use money::Usd;
pub use portfolio::{Portfolio, PortfolioBuilder, PortfolioState, RebalanceReport, SharedPortfolio};
pub use sector::{ParseSectorError, Sector, SectorMap};
pub use weighting::{EqualWeight, InverseVolatility, StrategyKind, WeightingStrategy};
pub use window::{Adjustment, ResolvedWindow, WindowSearch};
