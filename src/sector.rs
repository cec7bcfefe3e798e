use std::collections::HashMap;
use std::fmt;
use std::ops::{Index, IndexMut};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{EngineError, Result};

/// The eleven market sectors the portfolio allocates across.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Sector {
    Communication,
    Utilities,
    Energy,
    RealEstate,
    ConsumerStaples,
    Healthcare,
    Financials,
    Industrials,
    Materials,
    ConsumerDiscretionary,
    InformationTechnology,
}

pub const SECTOR_COUNT: usize = 11;

impl Sector {
    pub const ALL: [Sector; SECTOR_COUNT] = [
        Sector::Communication,
        Sector::Utilities,
        Sector::Energy,
        Sector::RealEstate,
        Sector::ConsumerStaples,
        Sector::Healthcare,
        Sector::Financials,
        Sector::Industrials,
        Sector::Materials,
        Sector::ConsumerDiscretionary,
        Sector::InformationTechnology,
    ];

    /// Column name used for this sector in price and delta tables.
    pub fn column_name(&self) -> &'static str {
        match self {
            Sector::Communication => COMM,
            Sector::Utilities => UTIL,
            Sector::Energy => ENER,
            Sector::RealEstate => RE,
            Sector::ConsumerStaples => CONS,
            Sector::Healthcare => HC,
            Sector::Financials => FIN,
            Sector::Industrials => IND,
            Sector::Materials => MAT,
            Sector::ConsumerDiscretionary => COND,
            Sector::InformationTechnology => IT,
        }
    }

    /// Yahoo symbol of the S&P 500 sector index for this sector.
    pub fn ticker(&self) -> &'static str {
        match self {
            Sector::Communication => "^SP500-50",
            Sector::Utilities => "^SP500-55",
            Sector::Energy => "^SP500-10",
            Sector::RealEstate => "^SP500-60",
            Sector::ConsumerStaples => "^SP500-30",
            Sector::Healthcare => "^SP500-35",
            Sector::Financials => "^SP500-40",
            Sector::Industrials => "^SP500-20",
            Sector::Materials => "^SP500-15",
            Sector::ConsumerDiscretionary => "^SP500-25",
            Sector::InformationTechnology => "^SP500-45",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Sector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column_name())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown sector column {0:?}")]
pub struct ParseSectorError(pub String);

impl FromStr for Sector {
    type Err = ParseSectorError;

    fn from_str(s: &str) -> std::result::Result<Self, ParseSectorError> {
        Sector::ALL
            .into_iter()
            .find(|sector| sector.column_name() == s)
            .ok_or_else(|| ParseSectorError(s.to_string()))
    }
}

/// A total mapping from every [`Sector`] to a value.
///
/// Backed by a fixed array indexed by the sector discriminant, so a map with a
/// missing or duplicated sector cannot be constructed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SectorMap<T> {
    values: [T; SECTOR_COUNT],
}

impl<T> SectorMap<T> {
    pub fn from_fn(f: impl FnMut(Sector) -> T) -> Self {
        Self {
            values: Sector::ALL.map(f),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Sector, &T)> {
        Sector::ALL.into_iter().zip(self.values.iter())
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.values.iter()
    }

    pub fn map<U>(&self, mut f: impl FnMut(Sector, &T) -> U) -> SectorMap<U> {
        SectorMap::from_fn(|sector| f(sector, &self[sector]))
    }

    /// Like [`SectorMap::from_fn`] but stops at the first error.
    pub fn try_from_fn<E>(
        mut f: impl FnMut(Sector) -> std::result::Result<T, E>,
    ) -> std::result::Result<Self, E>
    where
        T: Default,
    {
        let mut values: [T; SECTOR_COUNT] = std::array::from_fn(|_| T::default());
        for sector in Sector::ALL {
            values[sector.index()] = f(sector)?;
        }
        Ok(Self { values })
    }
}

impl<T: Clone> SectorMap<T> {
    pub fn uniform(value: T) -> Self {
        Self::from_fn(|_| value.clone())
    }
}

impl SectorMap<f64> {
    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }

    /// Builds a map from column-name keyed values, as returned by a weighting
    /// strategy. Every sector must be present exactly once and nothing else.
    pub fn try_from_named(named: &HashMap<String, f64>) -> Result<Self> {
        let mut values = [None; SECTOR_COUNT];
        let mut extra = Vec::new();
        for (name, value) in named {
            match name.parse::<Sector>() {
                Ok(sector) => values[sector.index()] = Some(*value),
                Err(_) => extra.push(name.clone()),
            }
        }

        let missing: Vec<_> = Sector::ALL
            .into_iter()
            .filter(|s| values[s.index()].is_none())
            .map(|s| s.column_name())
            .collect();
        if !missing.is_empty() || !extra.is_empty() {
            extra.sort();
            return Err(EngineError::WeightMismatch(format!(
                "missing sectors {missing:?}, unexpected keys {extra:?}"
            )));
        }

        SectorMap::try_from_fn(|sector| {
            values[sector.index()]
                .ok_or_else(|| EngineError::WeightMismatch(format!("missing sector {sector}")))
        })
    }
}

impl<T> Index<Sector> for SectorMap<T> {
    type Output = T;

    fn index(&self, sector: Sector) -> &T {
        &self.values[sector.index()]
    }
}

impl<T> IndexMut<Sector> for SectorMap<T> {
    fn index_mut(&mut self, sector: Sector) -> &mut T {
        &mut self.values[sector.index()]
    }
}

const COMM: &str = "Communication";
const UTIL: &str = "Utilities";
const ENER: &str = "Energy";
const RE: &str = "Real_Estate";
const CONS: &str = "Cons_Staples";
const HC: &str = "Healthcare";
const FIN: &str = "Financials";
const IND: &str = "Industrials";
const MAT: &str = "Materials";
const COND: &str = "Cons_Disc";
const IT: &str = "Info_Tech";
