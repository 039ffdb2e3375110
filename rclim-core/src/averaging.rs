//! Area-weighted spatial means
//!
//! Collapse the spatial axes of a [`GridField`] to one value per time step,
//! weighting each cell by `cos(latitude)`. Missing cells drop out of both the
//! weighted sum and the sum of weights of their own time step.

use crate::errors::{RClimError, RClimResult};
use crate::field::GridField;
use crate::spatial::{Hemisphere, RegionBounds};
use crate::timeseries::{FloatValue, TimeSeries};
use crate::utils::nanops::WeightedAccumulator;
use log::{debug, warn};
use ndarray::parallel::prelude::*;
use ndarray::{Array1, Array2, Axis};

/// Weighted partial sums of every time step, optionally restricted to `mask`
///
/// Sums over disjoint sets of cells can be merged step by step with
/// [`WeightedAccumulator::merge`].
pub fn weighted_partial_sums(
    field: &GridField,
    mask: Option<&Array2<bool>>,
) -> Vec<WeightedAccumulator> {
    let grid = field.grid();
    field
        .values()
        .axis_iter(Axis(0))
        .into_par_iter()
        .map(|slice| grid.weighted_sums(slice, mask))
        .collect()
}

fn series_from_sums(field: &GridField, sums: &[WeightedAccumulator]) -> RClimResult<TimeSeries> {
    let values: Array1<FloatValue> = sums.iter().map(|acc| acc.mean()).collect();
    let missing = values.iter().filter(|v| v.is_nan()).count();
    if missing > 0 {
        debug!(
            "{} of {} time steps of '{}' have no valid cells",
            missing,
            values.len(),
            field.name()
        );
    }
    TimeSeries::new(field.time().clone(), values, field.units())
}

/// Area-weighted global mean of every time step
///
/// # Examples
///
/// ```rust
/// use rclim_core::averaging::weighted_mean;
/// use rclim_core::axis::TimeAxis;
/// use rclim_core::field::GridField;
/// use rclim_core::spatial::LatLonGrid;
///
/// let field = GridField::filled(
///     "t2m",
///     "K",
///     TimeAxis::monthly(2000, 1, 6).unwrap(),
///     LatLonGrid::regular(80.0, -20.0, 9, 0.0, 45.0, 8).unwrap(),
///     288.0,
/// );
/// let series = weighted_mean(&field).unwrap();
/// assert!(series.values().iter().all(|v| (v - 288.0).abs() < 1e-9));
/// ```
pub fn weighted_mean(field: &GridField) -> RClimResult<TimeSeries> {
    series_from_sums(field, &weighted_partial_sums(field, None))
}

/// Area-weighted mean over the cells of a latitude/longitude box
///
/// Fails if the box contains no cell of the grid.
pub fn region_mean(field: &GridField, bounds: &RegionBounds) -> RClimResult<TimeSeries> {
    let mask = field.grid().region_mask(bounds);
    if !mask.iter().any(|m| *m) {
        return Err(RClimError::Error(format!(
            "Region {:?} contains no cells of the grid",
            bounds
        )));
    }
    series_from_sums(field, &weighted_partial_sums(field, Some(&mask)))
}

/// Northern and southern hemisphere means, indexed by [`Hemisphere`]
///
/// A hemisphere without any grid row yields an all-missing series.
pub fn hemispheric_means(field: &GridField) -> RClimResult<[TimeSeries; 2]> {
    let mean_of = |hemisphere: Hemisphere| {
        let mask = field.grid().hemisphere_mask(hemisphere);
        if !mask.iter().any(|m| *m) {
            warn!(
                "Grid of '{}' has no rows in the {:?} hemisphere",
                field.name(),
                hemisphere
            );
        }
        series_from_sums(field, &weighted_partial_sums(field, Some(&mask)))
    };
    Ok([
        mean_of(Hemisphere::Northern)?,
        mean_of(Hemisphere::Southern)?,
    ])
}
