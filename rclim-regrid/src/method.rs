use rclim_core::errors::{RClimError, RClimResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Interpolation scheme of a [`Regridder`](crate::Regridder)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegridMethod {
    /// Value of the closest source cell
    Nearest,
    /// Bilinear interpolation between the four surrounding cell centres
    #[default]
    Bilinear,
    /// First-order conservative remapping: mean of the overlapping source
    /// cells, weighted by their overlap area on the sphere
    Conservative,
}

impl RegridMethod {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Nearest => "nearest",
            Self::Bilinear => "bilinear",
            Self::Conservative => "conservative",
        }
    }

    /// Typical number of source cells contributing to a target cell
    pub fn expected_weights(&self) -> usize {
        match self {
            Self::Nearest => 1,
            Self::Bilinear => 4,
            Self::Conservative => 9,
        }
    }
}

impl FromStr for RegridMethod {
    type Err = RClimError;

    fn from_str(s: &str) -> RClimResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "nearest" | "nearest_s2d" => Ok(Self::Nearest),
            "bilinear" => Ok(Self::Bilinear),
            "conservative" => Ok(Self::Conservative),
            other => Err(RClimError::Error(format!(
                "Unknown regrid method '{other}'"
            ))),
        }
    }
}

impl fmt::Display for RegridMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_names() {
        assert_eq!("Bilinear".parse::<RegridMethod>().unwrap(), RegridMethod::Bilinear);
        assert_eq!("nearest_s2d".parse::<RegridMethod>().unwrap(), RegridMethod::Nearest);
        assert!("patch".parse::<RegridMethod>().is_err());
        assert_eq!(RegridMethod::default(), RegridMethod::Bilinear);
        assert_eq!(RegridMethod::Conservative.to_string(), "conservative");
    }
}
