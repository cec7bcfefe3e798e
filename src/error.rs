use chrono::NaiveDate;
use thiserror::Error;

use crate::sector::Sector;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("no usable price for {sector} on {date}")]
    DataUnavailable { sector: Sector, date: NaiveDate },

    #[error("no delta data found for rebalance on {requested} after {attempts} window adjustments")]
    WindowNotFound { requested: NaiveDate, attempts: usize },

    #[error("weight mismatch: {0}")]
    WeightMismatch(String),

    #[error("weighting strategy failed: {0}")]
    Strategy(anyhow::Error),

    #[error("rebalance date {requested} is earlier than anchor date {anchor}")]
    DateRegression { anchor: NaiveDate, requested: NaiveDate },

    #[error("invalid allocation: {0}")]
    InvalidAllocation(String),

    #[error("data table error: {0}")]
    Data(#[from] polars::prelude::PolarsError),

    #[error("portfolio lock poisoned")]
    Lock,
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}
