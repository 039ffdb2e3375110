//! Coordinate axes for gridded fields
//!
//! A [`GridField`](crate::field::GridField) is indexed by three axes:
//!
//! - [`TimeAxis`]: strictly increasing timestamps
//! - [`LatitudeAxis`]: strictly monotonic latitudes in degrees, ascending or descending
//!   (ERA5 files are stored north to south)
//! - [`LongitudeAxis`]: strictly increasing longitudes in degrees, periodic at 360°
//!
//! # Examples
//!
//! ```rust
//! use rclim_core::axis::{LatitudeAxis, LongitudeAxis, TimeAxis};
//!
//! let time = TimeAxis::monthly(1979, 1, 24).unwrap();
//! assert_eq!(time.len(), 24);
//! assert_eq!(time.years()[23], 1980);
//!
//! let lat = LatitudeAxis::new(vec![90.0, 45.0, 0.0, -45.0, -90.0]).unwrap();
//! assert!(lat.is_descending());
//!
//! let lon = LongitudeAxis::regular(0.0, 90.0, 4).unwrap();
//! assert!(lon.is_global());
//! ```

use crate::errors::{RClimError, RClimResult};
use crate::timeseries::FloatValue;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

/// Tolerance (in degrees) used when comparing coordinates of two axes.
pub const COORDINATE_TOLERANCE: FloatValue = 1e-6;

/// Timestamp of a single time step.
pub type Timestamp = NaiveDateTime;

/// Midnight on the first day of the given month.
pub fn first_of_month(year: i32, month: u32) -> RClimResult<Timestamp> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| RClimError::InvalidAxis {
            axis: "time",
            reason: format!("{year}-{month:02} is not a valid calendar month"),
        })
}

/// Ordered sequence of timestamps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeAxis {
    values: Vec<Timestamp>,
}

impl TimeAxis {
    /// Create a time axis, rejecting timestamps that are not strictly increasing
    pub fn new(values: Vec<Timestamp>) -> RClimResult<Self> {
        if let Some(i) = values.windows(2).position(|w| w[1] <= w[0]) {
            return Err(RClimError::InvalidAxis {
                axis: "time",
                reason: format!(
                    "timestamps must be strictly increasing ({} is followed by {})",
                    values[i],
                    values[i + 1]
                ),
            });
        }
        Ok(Self { values })
    }

    /// Monthly axis stamped at the first of each month
    pub fn monthly(start_year: i32, start_month: u32, n: usize) -> RClimResult<Self> {
        if !(1..=12).contains(&start_month) {
            return Err(RClimError::InvalidAxis {
                axis: "time",
                reason: format!("month {start_month} is outside 1..=12"),
            });
        }
        let values = (0..n)
            .map(|i| {
                let months = (start_month - 1) as i64 + i as i64;
                let year = start_year as i64 + months.div_euclid(12);
                first_of_month(year as i32, (months.rem_euclid(12) + 1) as u32)
            })
            .collect::<RClimResult<Vec<_>>>()?;
        Self::new(values)
    }

    /// Yearly axis stamped at 1 January of each year
    pub fn yearly(start_year: i32, n: usize) -> RClimResult<Self> {
        let values = (0..n)
            .map(|i| first_of_month(start_year + i as i32, 1))
            .collect::<RClimResult<Vec<_>>>()?;
        Self::new(values)
    }

    /// Axis from seconds since 1970-01-01 UTC
    pub fn from_unix_seconds(seconds: &[i64]) -> RClimResult<Self> {
        let values = seconds
            .iter()
            .map(|&s| {
                DateTime::from_timestamp(s, 0)
                    .map(|t| t.naive_utc())
                    .ok_or_else(|| RClimError::InvalidAxis {
                        axis: "time",
                        reason: format!("{s} seconds is outside the supported date range"),
                    })
            })
            .collect::<RClimResult<Vec<_>>>()?;
        Self::new(values)
    }

    /// Seconds since 1970-01-01 UTC of every time step
    pub fn unix_seconds(&self) -> Vec<i64> {
        self.values.iter().map(|t| t.and_utc().timestamp()).collect()
    }

    pub fn values(&self) -> &[Timestamp] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn at(&self, index: usize) -> Option<Timestamp> {
        self.values.get(index).copied()
    }

    /// Calendar year of every time step
    pub fn years(&self) -> Vec<i32> {
        self.values.iter().map(|t| t.year()).collect()
    }

    /// Decimal year of every time step, e.g. 1 July 2000 is roughly 2000.5
    ///
    /// Useful as a regression covariate for sub-annual data.
    pub fn fractional_years(&self) -> Vec<FloatValue> {
        self.values
            .iter()
            .map(|t| {
                let days_in_year = if NaiveDate::from_ymd_opt(t.year(), 2, 29).is_some() {
                    366.0
                } else {
                    365.0
                };
                let seconds = t.num_seconds_from_midnight() as FloatValue;
                t.year() as FloatValue
                    + (t.ordinal0() as FloatValue + seconds / 86_400.0) / days_in_year
            })
            .collect()
    }

    /// Axis restricted to the given positions (which must be increasing)
    pub fn take(&self, indices: &[usize]) -> Self {
        Self {
            values: indices.iter().map(|&i| self.values[i]).collect(),
        }
    }
}

/// Latitude coordinates in degrees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatitudeAxis {
    values: Vec<FloatValue>,
}

impl LatitudeAxis {
    /// Create a latitude axis
    ///
    /// Values must lie in [-90, 90] and be strictly monotonic in either direction.
    pub fn new(values: Vec<FloatValue>) -> RClimResult<Self> {
        if values.is_empty() {
            return Err(invalid("latitude", "axis must not be empty"));
        }
        if let Some(v) = values
            .iter()
            .find(|v| !v.is_finite() || v.abs() > 90.0 + COORDINATE_TOLERANCE)
        {
            return Err(invalid(
                "latitude",
                &format!("{v} is outside [-90, 90]"),
            ));
        }
        if !strictly_monotonic(&values) {
            return Err(invalid("latitude", "values must be strictly monotonic"));
        }
        Ok(Self { values })
    }

    /// Evenly spaced latitudes starting at `start`, `step` may be negative
    pub fn regular(start: FloatValue, step: FloatValue, n: usize) -> RClimResult<Self> {
        Self::new((0..n).map(|i| start + step * i as FloatValue).collect())
    }

    pub fn values(&self) -> &[FloatValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_descending(&self) -> bool {
        self.values.len() > 1 && self.values[1] < self.values[0]
    }

    /// Cell edges, halfway between neighbouring coordinates and clamped to the poles
    ///
    /// Returns `len() + 1` edges ordered like the axis itself.
    pub fn bounds(&self) -> Vec<FloatValue> {
        edges(&self.values, None)
            .into_iter()
            .map(|e| e.clamp(-90.0, 90.0))
            .collect()
    }

    /// Positions of coordinates inside the closed interval `[lo, hi]`
    pub fn indices_within(&self, lo: FloatValue, hi: FloatValue) -> Vec<usize> {
        let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
        self.values
            .iter()
            .enumerate()
            .filter(|(_, v)| **v >= lo && **v <= hi)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn approx_eq(&self, other: &Self) -> bool {
        approx_eq(&self.values, &other.values)
    }

    pub fn slice(&self, range: std::ops::Range<usize>) -> Self {
        Self {
            values: self.values[range].to_vec(),
        }
    }
}

/// Longitude coordinates in degrees, periodic at 360°
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongitudeAxis {
    values: Vec<FloatValue>,
}

impl LongitudeAxis {
    /// Create a longitude axis
    ///
    /// Values must be strictly increasing and span less than 360°. Both the
    /// `[0, 360)` and the `[-180, 180)` conventions are accepted.
    pub fn new(values: Vec<FloatValue>) -> RClimResult<Self> {
        if values.is_empty() {
            return Err(invalid("longitude", "axis must not be empty"));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(invalid("longitude", "values must be finite"));
        }
        if values.windows(2).any(|w| w[1] <= w[0]) {
            return Err(invalid("longitude", "values must be strictly increasing"));
        }
        let span = values[values.len() - 1] - values[0];
        if span >= 360.0 {
            return Err(invalid(
                "longitude",
                &format!("axis spans {span}°, which wraps onto itself"),
            ));
        }
        Ok(Self { values })
    }

    /// Evenly spaced longitudes starting at `start`
    pub fn regular(start: FloatValue, step: FloatValue, n: usize) -> RClimResult<Self> {
        Self::new((0..n).map(|i| start + step * i as FloatValue).collect())
    }

    pub fn values(&self) -> &[FloatValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether the axis covers the full circle
    ///
    /// True when the gap between the last coordinate and the first one (going
    /// across the seam) is no wider than 1.5 times the mean spacing, so the last
    /// cell neighbours the first.
    pub fn is_global(&self) -> bool {
        let n = self.values.len();
        if n < 2 {
            return false;
        }
        let span = self.values[n - 1] - self.values[0];
        let mean_step = span / (n - 1) as FloatValue;
        360.0 - span <= 1.5 * mean_step + COORDINATE_TOLERANCE
    }

    /// Width of the seam gap between the last and first coordinates
    pub fn seam_gap(&self) -> FloatValue {
        360.0 - (self.values[self.values.len() - 1] - self.values[0])
    }

    /// Offset of `lon` east of the first coordinate, in `[0, 360)`
    pub fn offset_from_start(&self, lon: FloatValue) -> FloatValue {
        (lon - self.values[0]).rem_euclid(360.0)
    }

    /// Cell edges, halfway between neighbouring coordinates
    ///
    /// For a global axis the outer edges sit halfway across the seam.
    pub fn bounds(&self) -> Vec<FloatValue> {
        let seam = if self.is_global() {
            Some(self.seam_gap())
        } else {
            None
        };
        edges(&self.values, seam)
    }

    /// Positions of coordinates inside `[west, east]` going eastwards
    ///
    /// `west > east` selects a box that crosses the 0/360 seam.
    pub fn indices_within(&self, west: FloatValue, east: FloatValue) -> Vec<usize> {
        let width = (east - west).rem_euclid(360.0);
        let full_circle = (east - west).abs() >= 360.0;
        self.values
            .iter()
            .enumerate()
            .filter(|(_, v)| full_circle || (**v - west).rem_euclid(360.0) <= width)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn approx_eq(&self, other: &Self) -> bool {
        self.values.len() == other.values.len()
            && self.values.iter().zip(other.values.iter()).all(|(a, b)| {
                let d = (a - b).rem_euclid(360.0);
                d.min(360.0 - d) <= COORDINATE_TOLERANCE
            })
    }

    pub fn slice(&self, range: std::ops::Range<usize>) -> Self {
        Self {
            values: self.values[range].to_vec(),
        }
    }
}

fn invalid(axis: &'static str, reason: &str) -> RClimError {
    RClimError::InvalidAxis {
        axis,
        reason: reason.to_string(),
    }
}

fn strictly_monotonic(values: &[FloatValue]) -> bool {
    values.windows(2).all(|w| w[1] > w[0]) || values.windows(2).all(|w| w[1] < w[0])
}

fn approx_eq(a: &[FloatValue], b: &[FloatValue]) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b.iter())
            .all(|(x, y)| (x - y).abs() <= COORDINATE_TOLERANCE)
}

/// Midpoint edges of a monotonic coordinate vector
///
/// A single coordinate gets a 1° wide cell unless `seam` says otherwise.
fn edges(values: &[FloatValue], seam: Option<FloatValue>) -> Vec<FloatValue> {
    let n = values.len();
    if n == 1 {
        let half = seam.map(|s| s / 2.0).unwrap_or(0.5);
        return vec![values[0] - half, values[0] + half];
    }
    let mut out = Vec::with_capacity(n + 1);
    let first_half = seam.map(|s| s / 2.0).unwrap_or((values[1] - values[0]) / 2.0);
    let last_half = seam
        .map(|s| s / 2.0)
        .unwrap_or((values[n - 1] - values[n - 2]) / 2.0);
    out.push(values[0] - first_half);
    out.extend(values.windows(2).map(|w| (w[0] + w[1]) / 2.0));
    out.push(values[n - 1] + last_half);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monthly_axis_rolls_over_years() {
        let axis = TimeAxis::monthly(1979, 11, 4).unwrap();
        let months: Vec<(i32, u32)> = axis
            .values()
            .iter()
            .map(|t| (t.year(), t.month()))
            .collect();
        assert_eq!(months, vec![(1979, 11), (1979, 12), (1980, 1), (1980, 2)]);
    }

    #[test]
    fn time_axis_rejects_unsorted() {
        let a = first_of_month(2000, 2).unwrap();
        let b = first_of_month(2000, 1).unwrap();
        assert!(matches!(
            TimeAxis::new(vec![a, b]),
            Err(RClimError::InvalidAxis { axis: "time", .. })
        ));
    }

    #[test]
    fn time_axis_rejects_duplicates() {
        let a = first_of_month(2000, 1).unwrap();
        assert!(TimeAxis::new(vec![a, a]).is_err());
    }

    #[test]
    fn unix_seconds_round_trip() {
        // 1979-01-01 and 1979-02-01
        let axis = TimeAxis::from_unix_seconds(&[283_996_800, 286_675_200]).unwrap();
        assert_eq!(axis.values()[0], first_of_month(1979, 1).unwrap());
        assert_eq!(axis.values()[1], first_of_month(1979, 2).unwrap());
        assert_eq!(axis.unix_seconds(), vec![283_996_800, 286_675_200]);

        assert!(TimeAxis::from_unix_seconds(&[0, -86_400]).is_err());
        assert!(matches!(
            TimeAxis::from_unix_seconds(&[i64::MAX]),
            Err(RClimError::InvalidAxis { axis: "time", .. })
        ));
    }

    #[test]
    fn invalid_month_is_rejected() {
        assert!(TimeAxis::monthly(2000, 13, 2).is_err());
        assert!(first_of_month(2000, 0).is_err());
    }

    #[test]
    fn fractional_years() {
        let axis = TimeAxis::new(vec![
            first_of_month(2001, 1).unwrap(),
            NaiveDate::from_ymd_opt(2001, 7, 2)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
        ])
        .unwrap();
        let years = axis.fractional_years();
        assert_eq!(years[0], 2001.0);
        // 2 July is day 182 (0-based) of a non-leap year, plus half a day
        assert!((years[1] - (2001.0 + 182.5 / 365.0)).abs() < 1e-12);
    }

    #[test]
    fn latitude_validation() {
        assert!(LatitudeAxis::new(vec![]).is_err());
        assert!(LatitudeAxis::new(vec![0.0, 91.0]).is_err());
        assert!(LatitudeAxis::new(vec![0.0, 10.0, 5.0]).is_err());
        assert!(LatitudeAxis::new(vec![10.0, 0.0, -10.0]).is_ok());
    }

    #[test]
    fn latitude_bounds_are_clamped() {
        let lat = LatitudeAxis::new(vec![90.0, 0.0, -90.0]).unwrap();
        assert_eq!(lat.bounds(), vec![90.0, 45.0, -45.0, -90.0]);
    }

    #[test]
    fn latitude_indices_within_ignores_order_of_bounds() {
        let lat = LatitudeAxis::regular(60.0, -30.0, 5).unwrap();
        assert_eq!(lat.indices_within(-30.0, 30.0), vec![1, 2, 3]);
        assert_eq!(lat.indices_within(30.0, -30.0), vec![1, 2, 3]);
    }

    #[test]
    fn longitude_validation() {
        assert!(LongitudeAxis::new(vec![0.0, 360.0]).is_err());
        assert!(LongitudeAxis::new(vec![10.0, 5.0]).is_err());
        assert!(LongitudeAxis::new(vec![-180.0, 0.0, 179.0]).is_ok());
    }

    #[test]
    fn longitude_global_detection() {
        assert!(LongitudeAxis::regular(0.0, 0.25, 1440).unwrap().is_global());
        assert!(LongitudeAxis::regular(-180.0, 1.0, 360).unwrap().is_global());
        assert!(!LongitudeAxis::regular(0.0, 1.0, 90).unwrap().is_global());
    }

    #[test]
    fn longitude_bounds_wrap_for_global_axis() {
        let lon = LongitudeAxis::regular(0.0, 90.0, 4).unwrap();
        assert_eq!(lon.bounds(), vec![-45.0, 45.0, 135.0, 225.0, 315.0]);
    }

    #[test]
    fn longitude_box_across_seam() {
        let lon = LongitudeAxis::regular(0.0, 30.0, 12).unwrap();
        assert_eq!(lon.indices_within(300.0, 30.0), vec![0, 1, 10, 11]);
        assert_eq!(lon.indices_within(-60.0, 30.0), vec![0, 1, 10, 11]);
        assert_eq!(lon.indices_within(0.0, 360.0).len(), 12);
    }

    #[test]
    fn longitude_comparison_is_periodic() {
        let a = LongitudeAxis::new(vec![-10.0, 0.0, 10.0]).unwrap();
        let b = LongitudeAxis::new(vec![350.0, 360.0, 370.0]).unwrap();
        assert!(a.approx_eq(&b));
    }
}
