//! Temperature units.
//!
//! Reanalysis and model output store near-surface temperature in Kelvin; the
//! analyses are usually reported in degrees Celsius. Only these two units are
//! understood; anything else is passed through untouched by the reductions and
//! rejected by conversions.
//!
//! # Example
//!
//! ```
//! use rclim_core::units::TemperatureUnit;
//!
//! let k = TemperatureUnit::parse("K").unwrap();
//! let c = TemperatureUnit::parse("degC").unwrap();
//! assert_eq!(k.convert(273.15, c), 0.0);
//! ```

use crate::errors::{RClimError, RClimResult};
use crate::timeseries::FloatValue;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Offset between the Kelvin and Celsius scales.
pub const KELVIN_OFFSET: FloatValue = 273.15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TemperatureUnit {
    Kelvin,
    Celsius,
}

impl TemperatureUnit {
    /// Parse a units attribute as found in NetCDF/Zarr metadata
    pub fn parse(units: &str) -> RClimResult<Self> {
        match units.trim() {
            "K" | "kelvin" | "Kelvin" | "degK" | "deg_K" => Ok(Self::Kelvin),
            "degC" | "deg_C" | "°C" | "C" | "celsius" | "Celsius" | "degrees_Celsius" => {
                Ok(Self::Celsius)
            }
            other => Err(RClimError::UnsupportedUnits(other.to_string())),
        }
    }

    /// Canonical units string written to converted fields
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Kelvin => "K",
            Self::Celsius => "degC",
        }
    }

    /// Convert a value from `self` to `target`
    ///
    /// Missing values stay missing.
    pub fn convert(&self, value: FloatValue, target: TemperatureUnit) -> FloatValue {
        match (self, target) {
            (Self::Kelvin, Self::Celsius) => value - KELVIN_OFFSET,
            (Self::Celsius, Self::Kelvin) => value + KELVIN_OFFSET,
            _ => value,
        }
    }
}

impl FromStr for TemperatureUnit {
    type Err = RClimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TemperatureUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}
