use crate::method::RegridMethod;
use crate::weights::{lat_weights, lon_weights};
use log::{debug, warn};
use ndarray::parallel::prelude::*;
use ndarray::{Array2, Array3, ArrayView2, ArrayViewMut2, Axis};
use rclim_core::errors::{RClimError, RClimResult};
use rclim_core::field::GridField;
use rclim_core::spatial::LatLonGrid;
use rclim_core::timeseries::FloatValue;
use rclim_core::utils::nanops::WeightedAccumulator;

#[derive(Debug, Clone, Copy)]
struct Weight {
    /// Flat (row-major) index of the source cell
    src: usize,
    val: FloatValue,
}

/// Precomputed mapping from one latitude/longitude grid to another
///
/// The weights are computed once in [`Regridder::new`] and applied to every
/// time step of every field on the source grid.
///
/// Missing source cells are dropped and the weights of the remaining
/// contributors renormalised. Target cells without any valid contributor,
/// including cells outside the source coverage, are missing.
#[derive(Debug, Clone)]
pub struct Regridder {
    source: LatLonGrid,
    target: LatLonGrid,
    method: RegridMethod,
    flat_weights: Vec<Weight>,
    /// `offsets[k]..offsets[k + 1]` are the weights of target cell `k`
    offsets: Vec<usize>,
}

impl Regridder {
    pub fn new(source: &LatLonGrid, target: &LatLonGrid, method: RegridMethod) -> Self {
        let latw = lat_weights(source.lat(), target.lat(), method);
        let lonw = lon_weights(source.lon(), target.lon(), method);
        let source_nlon = source.lon().len();

        let mut flat_weights = Vec::with_capacity(target.size() * method.expected_weights());
        let mut offsets = Vec::with_capacity(target.size() + 1);
        offsets.push(0);
        let mut uncovered = 0;
        for row in &latw {
            for col in &lonw {
                let start = flat_weights.len();
                for &(p, wp) in row {
                    for &(q, wq) in col {
                        let val = wp * wq;
                        if val > 0.0 {
                            flat_weights.push(Weight {
                                src: p * source_nlon + q,
                                val,
                            });
                        }
                    }
                }
                if flat_weights.len() == start {
                    uncovered += 1;
                }
                offsets.push(flat_weights.len());
            }
        }

        debug!(
            "Precomputed {} {} weights from {:?} to {:?} cells",
            flat_weights.len(),
            method,
            source.shape(),
            target.shape()
        );
        if uncovered > 0 {
            warn!(
                "{} of {} target cells lie outside the source grid and will be missing",
                uncovered,
                target.size()
            );
        }

        Self {
            source: source.clone(),
            target: target.clone(),
            method,
            flat_weights,
            offsets,
        }
    }

    pub fn source(&self) -> &LatLonGrid {
        &self.source
    }

    pub fn target(&self) -> &LatLonGrid {
        &self.target
    }

    pub fn method(&self) -> RegridMethod {
        self.method
    }

    /// Total number of stored weights
    pub fn weight_count(&self) -> usize {
        self.flat_weights.len()
    }

    fn apply_into(&self, values: ArrayView2<FloatValue>, mut out: ArrayViewMut2<FloatValue>) {
        let nlon = self.source.lon().len();
        for (k, cell) in out.iter_mut().enumerate() {
            let mut acc = WeightedAccumulator::default();
            for w in &self.flat_weights[self.offsets[k]..self.offsets[k + 1]] {
                acc.push(values[[w.src / nlon, w.src % nlon]], w.val);
            }
            *cell = acc.mean();
        }
    }

    /// Regrid one (lat, lon) slice
    pub fn apply_slice(&self, values: ArrayView2<FloatValue>) -> RClimResult<Array2<FloatValue>> {
        if values.dim() != self.source.shape() {
            let (nlat, nlon) = self.source.shape();
            return Err(RClimError::ShapeMismatch {
                expected: vec![nlat, nlon],
                actual: values.shape().to_vec(),
            });
        }
        let mut out = Array2::from_elem(self.target.shape(), FloatValue::NAN);
        self.apply_into(values, out.view_mut());
        Ok(out)
    }

    /// Regrid every time step of a field on the source grid
    ///
    /// Name, units and time axis are kept.
    pub fn regrid(&self, field: &GridField) -> RClimResult<GridField> {
        field.grid().check_compatible(&self.source)?;
        let (nlat, nlon) = self.target.shape();
        let mut values = Array3::from_elem((field.time().len(), nlat, nlon), FloatValue::NAN);
        values
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .zip(field.values().axis_iter(Axis(0)).into_par_iter())
            .for_each(|(out, slice)| self.apply_into(slice, out));
        GridField::new(
            field.name(),
            field.units(),
            field.time().clone(),
            self.target.clone(),
            values,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use is_close::is_close;
    use ndarray::array;

    fn lon_ring(nlon: usize, start: FloatValue) -> LatLonGrid {
        LatLonGrid::regular(0.0, 1.0, 1, start, 360.0 / nlon as FloatValue, nlon).unwrap()
    }

    #[test]
    fn conservative_halves_longitude_resolution() {
        let source = lon_ring(4, 0.0);
        let target = lon_ring(2, 45.0);
        let regridder = Regridder::new(&source, &target, RegridMethod::Conservative);
        let out = regridder
            .apply_slice(array![[1.0, 2.0, 3.0, 4.0]].view())
            .unwrap();
        assert!(is_close!(out[[0, 0]], 1.5));
        assert!(is_close!(out[[0, 1]], 3.5));
    }

    #[test]
    fn bilinear_wraps_across_the_seam() {
        let source = lon_ring(4, 0.0);
        let target = LatLonGrid::regular(0.0, 1.0, 1, 315.0, 10.0, 1).unwrap();
        let regridder = Regridder::new(&source, &target, RegridMethod::Bilinear);
        let out = regridder
            .apply_slice(array![[10.0, 0.0, 0.0, 20.0]].view())
            .unwrap();
        // Halfway between 270 (20) and 360 (10)
        assert!(is_close!(out[[0, 0]], 15.0));
    }

    #[test]
    fn missing_neighbours_are_dropped() {
        let source = lon_ring(4, 0.0);
        let target = LatLonGrid::regular(0.0, 1.0, 1, 45.0, 180.0, 2).unwrap();
        let regridder = Regridder::new(&source, &target, RegridMethod::Bilinear);
        let out = regridder
            .apply_slice(array![[FloatValue::NAN, 2.0, FloatValue::NAN, FloatValue::NAN]].view())
            .unwrap();
        assert_eq!(out[[0, 0]], 2.0);
        assert!(out[[0, 1]].is_nan());
    }

    #[test]
    fn nearest_picks_closest_cell() {
        let source = LatLonGrid::regular(60.0, -30.0, 5, 0.0, 90.0, 4).unwrap();
        let target = LatLonGrid::regular(50.0, -50.0, 3, 80.0, 100.0, 3).unwrap();
        let values = Array2::from_shape_fn(source.shape(), |(i, j)| (10 * i + j) as FloatValue);
        let out = Regridder::new(&source, &target, RegridMethod::Nearest)
            .apply_slice(values.view())
            .unwrap();
        // 50N -> 60N (row 0); 80E -> 90E (col 1)
        assert_eq!(out[[0, 0]], 1.0);
        // 0 -> row 2; 180E -> col 2
        assert_eq!(out[[1, 1]], 22.0);
        // 50S -> 60S (row 4); 280E -> 270E (col 3)
        assert_eq!(out[[2, 2]], 43.0);
    }

    #[test]
    fn target_outside_latitude_coverage_is_missing() {
        let source = LatLonGrid::regular(-60.0, 30.0, 5, 0.0, 90.0, 4).unwrap();
        let target = LatLonGrid::regular(-80.0, 80.0, 3, 0.0, 90.0, 4).unwrap();
        let out = Regridder::new(&source, &target, RegridMethod::Bilinear)
            .apply_slice(Array2::from_elem(source.shape(), 1.0).view())
            .unwrap();
        assert!(out.row(0).iter().all(|v| v.is_nan()));
        assert!(out.row(1).iter().all(|v| *v == 1.0));
    }

    #[test]
    fn wrong_shape_is_rejected() {
        let source = lon_ring(4, 0.0);
        let regridder = Regridder::new(&source, &source, RegridMethod::Nearest);
        assert!(matches!(
            regridder.apply_slice(Array2::zeros((2, 2)).view()),
            Err(RClimError::ShapeMismatch { .. })
        ));
    }
}
