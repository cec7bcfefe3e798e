use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Deserialize;

use crate::data::DEFAULT_BENCHMARK;
use crate::error::ConfigError;
use crate::weighting::StrategyKind;
use crate::window::WindowSearch;

/// Prefix for environment overrides, e.g. `SECTOR_REBALANCE__PORTFOLIO__START_AMOUNT=250`.
pub const ENV_PREFIX: &str = "SECTOR_REBALANCE";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub portfolio: PortfolioSettings,
    pub window: WindowSearch,
    pub data: DataSettings,
    pub strategy: StrategyKind,
    /// Rebalance dates, in order.
    pub schedule: Vec<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PortfolioSettings {
    /// Dollars placed in each sector at the anchor date.
    pub start_amount: f64,
    pub anchor_date: NaiveDate,
    /// Market index column excluded from weighting.
    pub benchmark: String,
}

impl Default for PortfolioSettings {
    fn default() -> Self {
        Self {
            start_amount: 100.0,
            anchor_date: NaiveDate::from_ymd_opt(2011, 4, 1).unwrap_or_default(),
            benchmark: DEFAULT_BENCHMARK.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSourceKind {
    #[default]
    Csv,
    Yahoo,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub source: DataSourceKind,
    /// Price table with a `date` column and one column per sector.
    pub csv_path: PathBuf,
    /// How many calendar days a price lookup may reach back for the last close.
    pub max_staleness_days: u32,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            source: DataSourceKind::Csv,
            csv_path: PathBuf::from("data/sector_prices.csv"),
            max_staleness_days: 4,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::ValidationError(msg));

        let amount = self.portfolio.start_amount;
        if !amount.is_finite() || amount <= 0.0 {
            return invalid(format!("portfolio.start_amount must be positive, got {amount}"));
        }
        if self.window.lookback_days == 0 {
            return invalid("window.lookback_days must be at least 1".into());
        }
        if self.window.max_attempts == 0 {
            return invalid("window.max_attempts must be at least 1".into());
        }
        if let Some(pair) = self.schedule.windows(2).find(|w| w[0] >= w[1]) {
            return invalid(format!("schedule is not increasing at {} -> {}", pair[0], pair[1]));
        }
        if let Some(first) = self.schedule.first() {
            if *first < self.portfolio.anchor_date {
                return invalid(format!(
                    "schedule starts at {first}, before anchor date {}",
                    self.portfolio.anchor_date
                ));
            }
        }
        Ok(())
    }
}

/// Loads settings from `path` (or an optional `config.toml` in the working
/// directory) layered with environment overrides, then validates them.
pub fn load_settings(path: Option<&Path>) -> Result<Settings, ConfigError> {
    let file = match path {
        Some(path) => config::File::from(path),
        None => config::File::with_name("config").required(false),
    };
    let settings = config::Config::builder()
        .add_source(file)
        .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?
        .try_deserialize::<Settings>()?;

    settings.validate()?;
    Ok(settings)
}
