//! Analysis configuration
//!
//! An [`AnalysisConfig`] collects the knobs of a typical climatology/trend
//! analysis so that they can be kept in a TOML file next to the data:
//!
//! ```toml
//! grouping = "season"
//! significance = 0.05
//! baseline = { start = 1981, end = 2010 }
//! period = { start = 1979, end = 2020 }
//!
//! [block]
//! lat = 90
//! lon = 180
//!
//! [regions.arctic]
//! lat_min = 66.5
//! lat_max = 90.0
//! lon_west = 0.0
//! lon_east = 360.0
//! ```
//!
//! Every key is optional; missing keys take the values of [`AnalysisConfig::default`].

use crate::calendar::TimeGrouping;
use crate::errors::{RClimError, RClimResult};
use crate::plan::BlockShape;
use crate::spatial::RegionBounds;
use crate::timeseries::FloatValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Inclusive range of calendar years
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    pub start: i32,
    pub end: i32,
}

impl YearRange {
    pub fn new(start: i32, end: i32) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, year: i32) -> bool {
        (self.start..=self.end).contains(&year)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Spatial block shape used by [`BlockPlan`](crate::plan::BlockPlan)
    pub block: BlockShape,
    /// Reference period for climatologies and anomalies
    pub baseline: Option<YearRange>,
    /// Years to analyse; all years when absent
    pub period: Option<YearRange>,
    pub grouping: TimeGrouping,
    /// Significance level for trend maps
    pub significance: FloatValue,
    /// Minimum number of valid points for a cell's trend to be defined
    pub min_samples: usize,
    pub convert_to_celsius: bool,
    /// Named boxes for regional means
    pub regions: BTreeMap<String, RegionBounds>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            block: BlockShape::default(),
            baseline: None,
            period: None,
            grouping: TimeGrouping::All,
            significance: 0.05,
            min_samples: 2,
            convert_to_celsius: true,
            regions: BTreeMap::new(),
        }
    }
}

impl AnalysisConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> RClimResult<Self> {
        let config: AnalysisConfig =
            toml::from_str(text).map_err(|e| RClimError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> RClimResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> RClimResult<String> {
        toml::to_string(self).map_err(|e| RClimError::Config(e.to_string()))
    }

    pub fn validate(&self) -> RClimResult<()> {
        if self.block.lat == 0 || self.block.lon == 0 {
            return Err(RClimError::Config(format!(
                "block shape must be non-empty, got {}x{}",
                self.block.lat, self.block.lon
            )));
        }
        for (label, range) in [("baseline", self.baseline), ("period", self.period)] {
            if let Some(range) = range {
                if range.start > range.end {
                    return Err(RClimError::Config(format!(
                        "{label} starts after it ends ({}..={})",
                        range.start, range.end
                    )));
                }
            }
        }
        if !(self.significance > 0.0 && self.significance < 1.0) {
            return Err(RClimError::Config(format!(
                "significance must lie in (0, 1), got {}",
                self.significance
            )));
        }
        if self.min_samples < 2 {
            return Err(RClimError::Config(
                "min_samples must be at least 2".to_string(),
            ));
        }
        for (name, bounds) in &self.regions {
            if bounds.lat_min > bounds.lat_max {
                return Err(RClimError::Config(format!(
                    "region '{name}' has lat_min > lat_max"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let config = AnalysisConfig::from_toml_str("").unwrap();
        assert_eq!(config, AnalysisConfig::default());
        assert!(config.convert_to_celsius);
    }

    #[test]
    fn full_document() {
        let config = AnalysisConfig::from_toml_str(
            r#"
grouping = "month"
significance = 0.01
min_samples = 10
convert_to_celsius = false
baseline = { start = 1981, end = 2010 }

[block]
lat = 10
lon = 20

[regions.nino34]
lat_min = -5.0
lat_max = 5.0
lon_west = 190.0
lon_east = 240.0
"#,
        )
        .unwrap();
        assert_eq!(config.grouping, TimeGrouping::Month);
        assert_eq!(config.block, BlockShape::new(10, 20));
        assert_eq!(config.baseline, Some(YearRange::new(1981, 2010)));
        assert!(config.period.is_none());
        assert_eq!(config.regions["nino34"].lon_east, 240.0);
    }

    #[test]
    fn round_trip() {
        let mut config = AnalysisConfig {
            period: Some(YearRange::new(1979, 2020)),
            ..AnalysisConfig::default()
        };
        config
            .regions
            .insert("tropics".to_string(), RegionBounds::new(-23.5, 23.5, 0.0, 360.0));
        let text = config.to_toml_string().unwrap();
        assert_eq!(AnalysisConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn invalid_documents() {
        for text in [
            "significance = 1.5",
            "min_samples = 1",
            "baseline = { start = 2010, end = 1981 }",
            "[block]\nlat = 0\nlon = 10",
            "unknown_key = 3",
            "grouping = \"decade\"",
        ] {
            assert!(
                matches!(
                    AnalysisConfig::from_toml_str(text),
                    Err(RClimError::Config(_))
                ),
                "{text}"
            );
        }
    }
}
