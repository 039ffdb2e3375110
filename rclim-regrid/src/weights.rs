//! One-dimensional interpolation weights
//!
//! Every method is separable in latitude and longitude, so the weights of a
//! target cell are the outer product of one weight list per axis. A target
//! coordinate that the source axis does not cover gets an empty list.

use crate::method::RegridMethod;
use rclim_core::axis::{LatitudeAxis, LongitudeAxis, COORDINATE_TOLERANCE};
use rclim_core::timeseries::FloatValue;

/// Source indices and weights for each target coordinate of one axis
pub(crate) type AxisWeights = Vec<Vec<(usize, FloatValue)>>;

/// A coordinate lying between source coordinates `lo` and `hi`
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Bracket {
    pub lo: usize,
    pub hi: usize,
    /// Position between `lo` (0) and `hi` (1)
    pub frac: FloatValue,
}

impl Bracket {
    fn exact(index: usize) -> Self {
        Self {
            lo: index,
            hi: index,
            frac: 0.0,
        }
    }

    pub fn nearest(&self) -> usize {
        if self.frac <= 0.5 {
            self.lo
        } else {
            self.hi
        }
    }

    pub fn linear(&self) -> Vec<(usize, FloatValue)> {
        if self.lo == self.hi {
            return vec![(self.lo, 1.0)];
        }
        [(self.lo, 1.0 - self.frac), (self.hi, self.frac)]
            .into_iter()
            .filter(|(_, w)| *w > 0.0)
            .collect()
    }
}

pub(crate) fn bracket_lat(axis: &LatitudeAxis, y: FloatValue) -> Option<Bracket> {
    let v = axis.values();
    if v.len() == 1 {
        return ((v[0] - y).abs() <= COORDINATE_TOLERANCE).then_some(Bracket::exact(0));
    }
    v.windows(2).enumerate().find_map(|(k, w)| {
        let (lo, hi) = (w[0].min(w[1]), w[0].max(w[1]));
        if y < lo - COORDINATE_TOLERANCE || y > hi + COORDINATE_TOLERANCE {
            return None;
        }
        Some(Bracket {
            lo: k,
            hi: k + 1,
            frac: ((y - w[0]) / (w[1] - w[0])).clamp(0.0, 1.0),
        })
    })
}

/// Locate a longitude, wrapping across the seam only for a global axis
pub(crate) fn bracket_lon(axis: &LongitudeAxis, x: FloatValue) -> Option<Bracket> {
    let v = axis.values();
    let n = v.len();
    let mut offset = axis.offset_from_start(x);
    if 360.0 - offset <= COORDINATE_TOLERANCE {
        offset = 0.0;
    }
    if n == 1 {
        return (offset <= COORDINATE_TOLERANCE).then_some(Bracket::exact(0));
    }

    let span = v[n - 1] - v[0];
    if offset <= span + COORDINATE_TOLERANCE {
        let offset = offset.min(span);
        for k in 0..n - 1 {
            let (a, b) = (v[k] - v[0], v[k + 1] - v[0]);
            if offset <= b {
                return Some(Bracket {
                    lo: k,
                    hi: k + 1,
                    frac: ((offset - a) / (b - a)).clamp(0.0, 1.0),
                });
            }
        }
    }
    if axis.is_global() {
        Some(Bracket {
            lo: n - 1,
            hi: 0,
            frac: ((offset - span) / axis.seam_gap()).clamp(0.0, 1.0),
        })
    } else {
        None
    }
}

/// Overlap of two latitude bands in units of `sin(latitude)`
pub(crate) fn lat_overlap(a: (FloatValue, FloatValue), b: (FloatValue, FloatValue)) -> FloatValue {
    let lo = a.0.min(a.1).max(b.0.min(b.1));
    let hi = a.0.max(a.1).min(b.0.max(b.1));
    if hi <= lo {
        0.0
    } else {
        hi.to_radians().sin() - lo.to_radians().sin()
    }
}

/// Overlap in degrees of two increasing longitude intervals on the circle
pub(crate) fn lon_overlap(a: (FloatValue, FloatValue), b: (FloatValue, FloatValue)) -> FloatValue {
    [-720.0, -360.0, 0.0, 360.0, 720.0]
        .iter()
        .map(|shift| (a.1.min(b.1 + shift) - a.0.max(b.0 + shift)).max(0.0))
        .sum()
}

fn cells(edges: &[FloatValue]) -> impl Iterator<Item = (FloatValue, FloatValue)> + '_ {
    edges.windows(2).map(|w| (w[0], w[1]))
}

pub(crate) fn lat_weights(
    source: &LatitudeAxis,
    target: &LatitudeAxis,
    method: RegridMethod,
) -> AxisWeights {
    match method {
        RegridMethod::Nearest => target
            .values()
            .iter()
            .map(|y| bracket_lat(source, *y).map_or_else(Vec::new, |b| vec![(b.nearest(), 1.0)]))
            .collect(),
        RegridMethod::Bilinear => target
            .values()
            .iter()
            .map(|y| bracket_lat(source, *y).map_or_else(Vec::new, |b| b.linear()))
            .collect(),
        RegridMethod::Conservative => {
            let source_edges = source.bounds();
            let target_edges = target.bounds();
            cells(&target_edges)
                .map(|t| {
                    cells(&source_edges)
                        .enumerate()
                        .map(|(p, s)| (p, lat_overlap(t, s)))
                        .filter(|(_, w)| *w > 0.0)
                        .collect()
                })
                .collect()
        }
    }
}

pub(crate) fn lon_weights(
    source: &LongitudeAxis,
    target: &LongitudeAxis,
    method: RegridMethod,
) -> AxisWeights {
    match method {
        RegridMethod::Nearest => target
            .values()
            .iter()
            .map(|x| bracket_lon(source, *x).map_or_else(Vec::new, |b| vec![(b.nearest(), 1.0)]))
            .collect(),
        RegridMethod::Bilinear => target
            .values()
            .iter()
            .map(|x| bracket_lon(source, *x).map_or_else(Vec::new, |b| b.linear()))
            .collect(),
        RegridMethod::Conservative => {
            let source_edges = source.bounds();
            let target_edges = target.bounds();
            cells(&target_edges)
                .map(|t| {
                    cells(&source_edges)
                        .enumerate()
                        .map(|(q, s)| (q, lon_overlap(t, s)))
                        .filter(|(_, w)| *w > 0.0)
                        .collect()
                })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use is_close::is_close;

    #[test]
    fn latitude_brackets_on_descending_axis() {
        let lat = LatitudeAxis::regular(60.0, -30.0, 5).unwrap();
        let b = bracket_lat(&lat, 45.0).unwrap();
        assert_eq!((b.lo, b.hi), (0, 1));
        assert!(is_close!(b.frac, 0.5));
        assert_eq!(bracket_lat(&lat, -60.0).unwrap().nearest(), 4);
        assert!(bracket_lat(&lat, 75.0).is_none());
    }

    #[test]
    fn longitude_wraps_only_on_global_axis() {
        let global = LongitudeAxis::regular(0.0, 90.0, 4).unwrap();
        let b = bracket_lon(&global, 315.0).unwrap();
        assert_eq!((b.lo, b.hi), (3, 0));
        assert!(is_close!(b.frac, 0.5));
        // -45 is the same point
        assert_eq!(bracket_lon(&global, -45.0), Some(b));

        let regional = LongitudeAxis::regular(0.0, 10.0, 5).unwrap();
        assert!(bracket_lon(&regional, 45.0).is_none());
        assert_eq!(bracket_lon(&regional, 360.0).unwrap().lo, 0);
    }

    #[test]
    fn longitude_conventions_agree() {
        let source = LongitudeAxis::regular(0.0, 1.0, 360).unwrap();
        let b = bracket_lon(&source, -179.5).unwrap();
        assert_eq!((b.lo, b.hi), (180, 181));
        assert!(is_close!(b.frac, 0.5));
    }

    #[test]
    fn overlaps() {
        // Northern hemisphere is half of the sphere: sin(90) - sin(0) = 1
        assert!(is_close!(lat_overlap((0.0, 90.0), (-90.0, 90.0)), 1.0));
        assert_eq!(lat_overlap((0.0, 10.0), (10.0, 20.0)), 0.0);
        assert!(is_close!(lon_overlap((-45.0, 45.0), (315.0, 405.0)), 90.0));
        assert!(is_close!(lon_overlap((350.0, 370.0), (0.0, 5.0)), 5.0));
        assert_eq!(lon_overlap((0.0, 10.0), (20.0, 30.0)), 0.0);
    }

    #[test]
    fn bilinear_weights_sum_to_one() {
        let source = LatitudeAxis::regular(-80.0, 20.0, 9).unwrap();
        let target = LatitudeAxis::regular(-75.0, 15.0, 11).unwrap();
        for weights in lat_weights(&source, &target, RegridMethod::Bilinear) {
            let total: FloatValue = weights.iter().map(|(_, w)| w).sum();
            assert!(is_close!(total, 1.0));
        }
    }
}
