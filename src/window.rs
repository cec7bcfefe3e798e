use chrono::{Days, NaiveDate};
use polars::prelude::DataFrame;
use serde::Deserialize;

use crate::data::DeltaSource;
use crate::error::{EngineError, Result};

/// Which bound of the lookback window the next retry moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    EndAdjust,
    BeginAdjust,
}

impl Adjustment {
    pub fn next(self) -> Self {
        match self {
            Adjustment::EndAdjust => Adjustment::BeginAdjust,
            Adjustment::BeginAdjust => Adjustment::EndAdjust,
        }
    }
}

/// Finds a lookback window with delta data, ending at or after the requested
/// rebalance date.
///
/// The first query covers `[date - lookback_days, date]`. While the result is
/// empty the search pushes the end forward one day, then the beginning, and
/// keeps alternating. Each move counts as one attempt; after `max_attempts`
/// moves the search gives up with [`EngineError::WindowNotFound`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WindowSearch {
    pub lookback_days: u64,
    pub max_attempts: usize,
}

impl Default for WindowSearch {
    fn default() -> Self {
        Self {
            lookback_days: 365,
            max_attempts: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedWindow {
    pub begin: NaiveDate,
    /// Effective rebalance date.
    pub end: NaiveDate,
    pub deltas: DataFrame,
    /// Number of bound adjustments made before data was found.
    pub attempts: usize,
}

impl WindowSearch {
    pub fn resolve<D: DeltaSource + ?Sized>(
        &self,
        source: &D,
        requested: NaiveDate,
    ) -> Result<ResolvedWindow> {
        let not_found = |attempts| EngineError::WindowNotFound {
            requested,
            attempts,
        };

        let mut begin = requested
            .checked_sub_days(Days::new(self.lookback_days))
            .ok_or(not_found(0))?;
        let mut end = requested;
        let mut deltas = source.deltas(begin, end)?;
        let mut attempts = 0;
        let mut adjustment = Adjustment::EndAdjust;

        while deltas.height() == 0 {
            if attempts == self.max_attempts {
                return Err(not_found(attempts));
            }
            match adjustment {
                Adjustment::EndAdjust => {
                    end = end.succ_opt().ok_or(not_found(attempts))?;
                }
                Adjustment::BeginAdjust => {
                    begin = begin.succ_opt().ok_or(not_found(attempts))?;
                }
            }
            attempts += 1;
            tracing::debug!(%begin, %end, attempts, ?adjustment, "Empty delta window, retrying");
            deltas = source.deltas(begin, end)?;
            adjustment = adjustment.next();
        }

        if end != requested {
            tracing::warn!(%requested, effective = %end, attempts, "Rebalance date shifted to find data");
        }

        Ok(ResolvedWindow {
            begin,
            end,
            deltas,
            attempts,
        })
    }
}
