//! Calendar groupings of the time axis.
//!
//! A [`TimeGrouping`] maps every timestamp onto a [`GroupKey`]; climatologies are
//! averages over all samples sharing a key.

use crate::axis::Timestamp;
use crate::errors::{RClimError, RClimResult};
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Meteorological season
///
/// December is part of DJF; when grouping climatologically the December of every
/// year joins the January and February of every year.
#[allow(clippy::upper_case_acronyms)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Season {
    DJF,
    MAM,
    JJA,
    SON,
}

impl Season {
    pub const ALL: [Season; 4] = [Season::DJF, Season::MAM, Season::JJA, Season::SON];

    /// Season containing a calendar month (1-12)
    ///
    /// # Panics
    ///
    /// Panics if `month` is outside 1..=12
    pub fn from_month(month: u32) -> Self {
        match month {
            12 | 1 | 2 => Season::DJF,
            3..=5 => Season::MAM,
            6..=8 => Season::JJA,
            9..=11 => Season::SON,
            _ => panic!("Invalid month {month}"),
        }
    }

    /// Calendar months of the season, in chronological order
    pub fn months(&self) -> [u32; 3] {
        match self {
            Season::DJF => [12, 1, 2],
            Season::MAM => [3, 4, 5],
            Season::JJA => [6, 7, 8],
            Season::SON => [9, 10, 11],
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Season::DJF => "DJF",
            Season::MAM => "MAM",
            Season::JJA => "JJA",
            Season::SON => "SON",
        };
        write!(f, "{label}")
    }
}

/// How time steps are grouped before averaging
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeGrouping {
    /// A single group: the overall mean
    #[default]
    All,
    /// Meteorological seasons
    Season,
    /// Calendar months
    Month,
    /// Calendar years
    Year,
}

impl TimeGrouping {
    pub fn key(&self, t: &Timestamp) -> GroupKey {
        match self {
            TimeGrouping::All => GroupKey::All,
            TimeGrouping::Season => GroupKey::Season(Season::from_month(t.month())),
            TimeGrouping::Month => GroupKey::Month(t.month()),
            TimeGrouping::Year => GroupKey::Year(t.year()),
        }
    }
}

impl FromStr for TimeGrouping {
    type Err = RClimError;

    fn from_str(s: &str) -> RClimResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "all" | "time" => Ok(TimeGrouping::All),
            "season" => Ok(TimeGrouping::Season),
            "month" => Ok(TimeGrouping::Month),
            "year" => Ok(TimeGrouping::Year),
            other => Err(RClimError::Error(format!("Unknown time grouping '{other}'"))),
        }
    }
}

/// Label of one group
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GroupKey {
    All,
    Season(Season),
    Month(u32),
    Year(i32),
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKey::All => write!(f, "all"),
            GroupKey::Season(s) => write!(f, "{s}"),
            GroupKey::Month(m) => write!(f, "month {m:02}"),
            GroupKey::Year(y) => write!(f, "{y}"),
        }
    }
}
