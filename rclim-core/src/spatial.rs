//! Spatial grid types for latitude/longitude fields
//!
//! This module provides [`LatLonGrid`], the horizontal grid shared by every
//! [`GridField`](crate::field::GridField), and the area weighting used when
//! reducing a grid to a single value:
//!
//! - each cell is weighted by `cos(latitude)`, the relative area of a longitude
//!   band at that latitude
//! - missing cells are dropped from both the weighted sum and the sum of weights,
//!   so the effective weights of the remaining cells always sum to 1
//!
//! # Examples
//!
//! ```rust
//! use ndarray::array;
//! use rclim_core::axis::{LatitudeAxis, LongitudeAxis};
//! use rclim_core::spatial::LatLonGrid;
//!
//! let grid = LatLonGrid::new(
//!     LatitudeAxis::new(vec![60.0, 0.0]).unwrap(),
//!     LongitudeAxis::new(vec![0.0, 180.0]).unwrap(),
//! );
//! assert_eq!(grid.shape(), (2, 2));
//!
//! // cos(60°) = 0.5, cos(0°) = 1
//! let values = array![[10.0, 10.0], [1.0, 1.0]];
//! let mean = grid.weighted_mean(values.view());
//! assert!((mean - 4.0).abs() < 1e-12);
//! ```

use crate::axis::{LatitudeAxis, LongitudeAxis};
use crate::errors::{RClimError, RClimResult};
use crate::timeseries::FloatValue;
use crate::utils::nanops::WeightedAccumulator;
use ndarray::{Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};

/// Cosine weights below this value are treated as exactly zero (cos 90° is ~6e-17)
const POLE_WEIGHT_EPSILON: FloatValue = 1e-12;

/// Hemisphere of the globe
///
/// The equator belongs to the Northern hemisphere.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Hemisphere {
    Northern = 0,
    Southern = 1,
}

impl Hemisphere {
    pub fn of(latitude: FloatValue) -> Self {
        if latitude >= 0.0 {
            Hemisphere::Northern
        } else {
            Hemisphere::Southern
        }
    }
}

impl From<Hemisphere> for usize {
    fn from(h: Hemisphere) -> usize {
        h as usize
    }
}

/// A latitude/longitude box
///
/// `west > east` describes a box crossing the 0/360 seam, e.g. `west = 340, east = 20`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegionBounds {
    pub lat_min: FloatValue,
    pub lat_max: FloatValue,
    pub lon_west: FloatValue,
    pub lon_east: FloatValue,
}

impl RegionBounds {
    pub fn new(
        lat_min: FloatValue,
        lat_max: FloatValue,
        lon_west: FloatValue,
        lon_east: FloatValue,
    ) -> Self {
        Self {
            lat_min,
            lat_max,
            lon_west,
            lon_east,
        }
    }

    /// The whole globe
    pub fn global() -> Self {
        Self::new(-90.0, 90.0, 0.0, 360.0)
    }
}

/// Regular latitude/longitude grid
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LatLonGrid {
    lat: LatitudeAxis,
    lon: LongitudeAxis,
}

impl LatLonGrid {
    pub fn new(lat: LatitudeAxis, lon: LongitudeAxis) -> Self {
        Self { lat, lon }
    }

    /// Grid from raw coordinate arrays, validating both axes
    pub fn from_coordinates(lat: Vec<FloatValue>, lon: Vec<FloatValue>) -> RClimResult<Self> {
        Ok(Self::new(LatitudeAxis::new(lat)?, LongitudeAxis::new(lon)?))
    }

    /// Regular grid of `nlat` by `nlon` cell centres
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rclim_core::spatial::LatLonGrid;
    ///
    /// // ERA5-like layout: north to south, 0..360
    /// let grid = LatLonGrid::regular(90.0, -30.0, 7, 0.0, 30.0, 12).unwrap();
    /// assert_eq!(grid.shape(), (7, 12));
    /// assert!(grid.lon().is_global());
    /// ```
    pub fn regular(
        lat_start: FloatValue,
        lat_step: FloatValue,
        nlat: usize,
        lon_start: FloatValue,
        lon_step: FloatValue,
        nlon: usize,
    ) -> RClimResult<Self> {
        Ok(Self::new(
            LatitudeAxis::regular(lat_start, lat_step, nlat)?,
            LongitudeAxis::regular(lon_start, lon_step, nlon)?,
        ))
    }

    pub fn lat(&self) -> &LatitudeAxis {
        &self.lat
    }

    pub fn lon(&self) -> &LongitudeAxis {
        &self.lon
    }

    /// `(nlat, nlon)`
    pub fn shape(&self) -> (usize, usize) {
        (self.lat.len(), self.lon.len())
    }

    pub fn size(&self) -> usize {
        self.lat.len() * self.lon.len()
    }

    /// Whether both axes match within [`COORDINATE_TOLERANCE`](crate::axis::COORDINATE_TOLERANCE)
    pub fn is_compatible(&self, other: &Self) -> bool {
        self.lat.approx_eq(&other.lat) && self.lon.approx_eq(&other.lon)
    }

    /// Fail with [`RClimError::GridMismatch`] unless the grids are compatible
    pub fn check_compatible(&self, other: &Self) -> RClimResult<()> {
        if self.is_compatible(other) {
            Ok(())
        } else {
            Err(RClimError::GridMismatch(format!(
                "{}x{} grid starting at ({}, {}) vs {}x{} grid starting at ({}, {})",
                self.lat.len(),
                self.lon.len(),
                self.lat.values()[0],
                self.lon.values()[0],
                other.lat.len(),
                other.lon.len(),
                other.lat.values()[0],
                other.lon.values()[0],
            )))
        }
    }

    /// Sub-grid over contiguous index ranges
    ///
    /// # Panics
    ///
    /// Panics if a range is out of bounds
    pub fn subgrid(&self, lat: std::ops::Range<usize>, lon: std::ops::Range<usize>) -> Self {
        Self {
            lat: self.lat.slice(lat),
            lon: self.lon.slice(lon),
        }
    }

    /// Un-normalised area weight of each latitude row, `cos(latitude)`
    pub fn latitude_weights(&self) -> Array1<FloatValue> {
        self.lat
            .values()
            .iter()
            .map(|lat| {
                let w = lat.to_radians().cos();
                if w < POLE_WEIGHT_EPSILON {
                    0.0
                } else {
                    w
                }
            })
            .collect()
    }

    /// Un-normalised area weight of every cell, broadcast over longitude
    pub fn cell_weights(&self) -> Array2<FloatValue> {
        let weights = self.latitude_weights();
        Array2::from_shape_fn(self.shape(), |(i, _)| weights[i])
    }

    /// Cells inside a latitude/longitude box
    pub fn region_mask(&self, bounds: &RegionBounds) -> Array2<bool> {
        let mut mask = Array2::from_elem(self.shape(), false);
        let rows = self.lat.indices_within(bounds.lat_min, bounds.lat_max);
        let cols = self.lon.indices_within(bounds.lon_west, bounds.lon_east);
        for &i in &rows {
            for &j in &cols {
                mask[[i, j]] = true;
            }
        }
        mask
    }

    /// Cells in one hemisphere
    pub fn hemisphere_mask(&self, hemisphere: Hemisphere) -> Array2<bool> {
        let lats = self.lat.values();
        Array2::from_shape_fn(self.shape(), |(i, _)| Hemisphere::of(lats[i]) == hemisphere)
    }

    /// Partial weighted sums of one (lat, lon) slice, restricted to `mask` when given
    ///
    /// # Panics
    ///
    /// Panics if `values` (or `mask`) does not have the grid's shape
    pub fn weighted_sums(
        &self,
        values: ArrayView2<FloatValue>,
        mask: Option<&Array2<bool>>,
    ) -> WeightedAccumulator {
        assert_eq!(
            values.dim(),
            self.shape(),
            "Values shape must match grid shape"
        );
        let weights = self.latitude_weights();
        let mut acc = WeightedAccumulator::default();
        for ((i, j), v) in values.indexed_iter() {
            if mask.map_or(true, |m| m[[i, j]]) {
                acc.push(*v, weights[i]);
            }
        }
        acc
    }

    /// Area-weighted mean of one (lat, lon) slice, `NaN` when every cell is missing
    pub fn weighted_mean(&self, values: ArrayView2<FloatValue>) -> FloatValue {
        self.weighted_sums(values, None).mean()
    }

    /// Area-weighted mean over the cells selected by `mask`
    pub fn masked_weighted_mean(
        &self,
        values: ArrayView2<FloatValue>,
        mask: &Array2<bool>,
    ) -> FloatValue {
        self.weighted_sums(values, Some(mask)).mean()
    }
}
