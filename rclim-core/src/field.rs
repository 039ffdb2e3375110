//! Gridded (time, latitude, longitude) fields
//!
//! [`GridField`] is the input to every reduction in this crate. It is produced
//! by an external loader (NetCDF, Zarr, ...) and is never mutated by the
//! reductions: each operation returns a new value.
//!
//! # Examples
//!
//! ```rust
//! use rclim_core::axis::TimeAxis;
//! use rclim_core::field::GridField;
//! use rclim_core::spatial::LatLonGrid;
//!
//! let time = TimeAxis::monthly(1979, 1, 12).unwrap();
//! let grid = LatLonGrid::regular(45.0, -90.0, 2, 0.0, 180.0, 2).unwrap();
//! let field = GridField::from_fn("t2m", "K", time, grid, |t, _, _| 273.15 + t as f64);
//!
//! let celsius = field.to_celsius().unwrap();
//! assert_eq!(celsius.units(), "degC");
//! assert!((celsius.get(3, 0, 1).unwrap() - 3.0).abs() < 1e-9);
//! ```

use crate::axis::{LatitudeAxis, LongitudeAxis, TimeAxis};
use crate::errors::{RClimError, RClimResult};
use crate::spatial::LatLonGrid;
use crate::timeseries::FloatValue;
use crate::units::TemperatureUnit;
use chrono::Datelike;
use ndarray::{s, Array3, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Dense array of samples indexed by (time, latitude, longitude)
///
/// Missing samples are `NaN`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridField {
    name: String,
    units: String,
    time: TimeAxis,
    grid: LatLonGrid,
    values: Array3<FloatValue>,
}

impl GridField {
    /// Create a field, checking that the array shape matches the axes
    pub fn new(
        name: &str,
        units: &str,
        time: TimeAxis,
        grid: LatLonGrid,
        values: Array3<FloatValue>,
    ) -> RClimResult<Self> {
        let (nlat, nlon) = grid.shape();
        let expected = [time.len(), nlat, nlon];
        if values.shape() != expected {
            return Err(RClimError::ShapeMismatch {
                expected: expected.to_vec(),
                actual: values.shape().to_vec(),
            });
        }
        Ok(Self {
            name: name.to_string(),
            units: units.to_string(),
            time,
            grid,
            values,
        })
    }

    /// Create a field by evaluating `f(t, lat_index, lon_index)` for every sample
    pub fn from_fn<F>(name: &str, units: &str, time: TimeAxis, grid: LatLonGrid, mut f: F) -> Self
    where
        F: FnMut(usize, usize, usize) -> FloatValue,
    {
        let (nlat, nlon) = grid.shape();
        let values = Array3::from_shape_fn((time.len(), nlat, nlon), |(t, i, j)| f(t, i, j));
        Self {
            name: name.to_string(),
            units: units.to_string(),
            time,
            grid,
            values,
        }
    }

    /// Field holding the same value everywhere
    pub fn filled(
        name: &str,
        units: &str,
        time: TimeAxis,
        grid: LatLonGrid,
        value: FloatValue,
    ) -> Self {
        Self::from_fn(name, units, time, grid, |_, _, _| value)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn units(&self) -> &str {
        &self.units
    }

    pub fn time(&self) -> &TimeAxis {
        &self.time
    }

    pub fn grid(&self) -> &LatLonGrid {
        &self.grid
    }

    pub fn lat(&self) -> &LatitudeAxis {
        self.grid.lat()
    }

    pub fn lon(&self) -> &LongitudeAxis {
        self.grid.lon()
    }

    pub fn values(&self) -> &Array3<FloatValue> {
        &self.values
    }

    pub fn into_values(self) -> Array3<FloatValue> {
        self.values
    }

    pub(crate) fn values_mut(&mut self) -> &mut Array3<FloatValue> {
        &mut self.values
    }

    /// `(ntime, nlat, nlon)`
    pub fn shape(&self) -> (usize, usize, usize) {
        self.values.dim()
    }

    pub fn get(&self, t: usize, lat: usize, lon: usize) -> Option<FloatValue> {
        self.values.get([t, lat, lon]).copied()
    }

    /// The (lat, lon) slice at one time step
    ///
    /// # Panics
    ///
    /// Panics if `t` is out of bounds
    pub fn time_slice(&self, t: usize) -> ArrayView2<FloatValue> {
        self.values.index_axis(Axis(0), t)
    }

    /// The time series of one cell
    ///
    /// # Panics
    ///
    /// Panics if the cell is out of bounds
    pub fn cell_series(&self, lat: usize, lon: usize) -> ArrayView1<FloatValue> {
        self.values.slice(s![.., lat, lon])
    }

    /// Number of missing samples
    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_nan()).count()
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Apply `f` to every sample, keeping the axes
    pub fn map_values<F>(&self, units: &str, f: F) -> Self
    where
        F: Fn(FloatValue) -> FloatValue,
    {
        Self {
            name: self.name.clone(),
            units: units.to_string(),
            time: self.time.clone(),
            grid: self.grid.clone(),
            values: self.values.mapv(f),
        }
    }

    /// Convert a temperature field to `target` units
    ///
    /// Fails with [`RClimError::UnsupportedUnits`] if the field's units are not a
    /// temperature scale.
    pub fn to_units(&self, target: TemperatureUnit) -> RClimResult<Self> {
        let source = TemperatureUnit::parse(&self.units)?;
        Ok(self.map_values(target.symbol(), |v| source.convert(v, target)))
    }

    /// Convert a Kelvin (or already Celsius) field to degrees Celsius
    pub fn to_celsius(&self) -> RClimResult<Self> {
        self.to_units(TemperatureUnit::Celsius)
    }

    /// Keep the time steps whose calendar year lies in `[start, end]`
    ///
    /// The result may have an empty time axis.
    pub fn select_years(&self, start: i32, end: i32) -> RClimResult<Self> {
        if start > end {
            return Err(RClimError::Error(format!(
                "Invalid year range {start}..={end}"
            )));
        }
        let indices: Vec<usize> = self
            .time
            .values()
            .iter()
            .enumerate()
            .filter(|(_, t)| (start..=end).contains(&t.year()))
            .map(|(i, _)| i)
            .collect();
        Ok(self.select_time(&indices))
    }

    /// Keep the given (increasing) time steps
    pub fn select_time(&self, indices: &[usize]) -> Self {
        Self {
            name: self.name.clone(),
            units: self.units.clone(),
            time: self.time.take(indices),
            grid: self.grid.clone(),
            values: self.values.select(Axis(0), indices),
        }
    }

    /// Spatial block over contiguous index ranges, all time steps
    ///
    /// # Panics
    ///
    /// Panics if a range is out of bounds
    pub fn subgrid(&self, lat: Range<usize>, lon: Range<usize>) -> Self {
        Self {
            name: self.name.clone(),
            units: self.units.clone(),
            time: self.time.clone(),
            grid: self.grid.subgrid(lat.clone(), lon.clone()),
            values: self.values.slice(s![.., lat, lon]).to_owned(),
        }
    }

    /// Fail with [`RClimError::GridMismatch`] unless `other` shares this field's grid
    pub fn check_same_grid(&self, other: &GridField) -> RClimResult<()> {
        self.grid.check_compatible(&other.grid)
    }
}
