//! Per-cell linear trends
//!
//! Ordinary least squares of a cell's values against a covariate shared by all
//! cells (usually the year). Every cell is fitted independently; time steps where
//! a cell is missing are dropped from that cell's fit only.
//!
//! The statistics follow the usual definitions:
//!
//! - slope and intercept of the least-squares line
//! - Pearson correlation `r`
//! - two-sided p-value of `H0: slope = 0` from Student's t with `n - 2` degrees of freedom
//! - standard error of the slope
//!
//! Cells with fewer than two valid points, or whose covariate is constant over
//! the valid points, get an undefined (all `NaN`) result.

use crate::errors::{RClimError, RClimResult};
use crate::field::GridField;
use crate::spatial::LatLonGrid;
use crate::timeseries::FloatValue;
use crate::utils::special::two_sided_p_value;
use log::{debug, warn};
use ndarray::{s, Array2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::ops::Range;

/// Keeps the t statistic finite when `|r| = 1`
const TINY: FloatValue = 1.0e-20;

/// Least-squares fit of one series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendResult {
    /// Value units per covariate unit
    pub slope: FloatValue,
    pub intercept: FloatValue,
    /// Pearson correlation coefficient
    pub rvalue: FloatValue,
    /// Two-sided p-value for a zero slope
    pub pvalue: FloatValue,
    /// Standard error of the slope
    pub stderr: FloatValue,
    /// Number of valid points used in the fit
    pub n: usize,
}

impl TrendResult {
    pub fn undefined(n: usize) -> Self {
        Self {
            slope: FloatValue::NAN,
            intercept: FloatValue::NAN,
            rvalue: FloatValue::NAN,
            pvalue: FloatValue::NAN,
            stderr: FloatValue::NAN,
            n,
        }
    }

    pub fn is_defined(&self) -> bool {
        !self.slope.is_nan()
    }
}

/// Least-squares regression of `y` on `x`
///
/// Pairs where either value is `NaN` are skipped.
///
/// # Examples
///
/// ```rust
/// use rclim_core::trend::linregress;
///
/// let x = [1.0, 2.0, 3.0, 4.0];
/// let y = [2.0, 4.1, 5.9, 8.0];
/// let fit = linregress(&x, &y).unwrap();
/// assert!((fit.slope - 1.98).abs() < 1e-12);
/// assert!(fit.pvalue < 0.001);
/// ```
pub fn linregress(x: &[FloatValue], y: &[FloatValue]) -> RClimResult<TrendResult> {
    if x.len() != y.len() {
        return Err(RClimError::ShapeMismatch {
            expected: vec![x.len()],
            actual: vec![y.len()],
        });
    }
    Ok(fit(x.iter().copied().zip(y.iter().copied()), 2))
}

/// Fit the valid pairs, undefined when fewer than `min_samples` (at least 2) remain
fn fit<I>(pairs: I, min_samples: usize) -> TrendResult
where
    I: Iterator<Item = (FloatValue, FloatValue)>,
{
    let (x, y): (Vec<FloatValue>, Vec<FloatValue>) = pairs
        .filter(|(x, y)| !x.is_nan() && !y.is_nan())
        .unzip();
    let n = x.len();
    if n < min_samples.max(2) {
        return TrendResult::undefined(n);
    }

    let nf = n as FloatValue;
    let xm = x.iter().sum::<FloatValue>() / nf;
    let ym = y.iter().sum::<FloatValue>() / nf;
    let (mut ssxm, mut ssym, mut ssxym) = (0.0, 0.0, 0.0);
    for (xi, yi) in x.iter().zip(y.iter()) {
        let dx = xi - xm;
        let dy = yi - ym;
        ssxm += dx * dx;
        ssym += dy * dy;
        ssxym += dx * dy;
    }
    ssxm /= nf;
    ssym /= nf;
    ssxym /= nf;

    if ssxm == 0.0 {
        return TrendResult::undefined(n);
    }

    let r_den = (ssxm * ssym).sqrt();
    let rvalue = if r_den == 0.0 {
        0.0
    } else {
        (ssxym / r_den).clamp(-1.0, 1.0)
    };
    let slope = ssxym / ssxm;
    let intercept = ym - slope * xm;

    let (pvalue, stderr) = if n == 2 {
        // Any two points lie on a line
        (if y[0] == y[1] { 1.0 } else { 0.0 }, 0.0)
    } else {
        let df = (n - 2) as FloatValue;
        let t = rvalue * (df / ((1.0 - rvalue + TINY) * (1.0 + rvalue + TINY))).sqrt();
        let stderr = ((1.0 - rvalue * rvalue).max(0.0) * ssym / ssxm / df).sqrt();
        (two_sided_p_value(t, df), stderr)
    };

    TrendResult {
        slope,
        intercept,
        rvalue,
        pvalue,
        stderr,
        n,
    }
}

/// Trend statistics for every cell of a grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendField {
    grid: LatLonGrid,
    /// Units of the fitted values; slopes are in these units per covariate unit
    units: String,
    slope: Array2<FloatValue>,
    intercept: Array2<FloatValue>,
    rvalue: Array2<FloatValue>,
    pvalue: Array2<FloatValue>,
    stderr: Array2<FloatValue>,
    counts: Array2<usize>,
}

#[derive(Serialize)]
struct CsvRow {
    lat: FloatValue,
    lon: FloatValue,
    slope: FloatValue,
    intercept: FloatValue,
    rvalue: FloatValue,
    pvalue: FloatValue,
    stderr: FloatValue,
    n: usize,
}

impl TrendField {
    /// Trend field with every cell undefined
    pub(crate) fn undefined(grid: LatLonGrid, units: &str) -> Self {
        let shape = grid.shape();
        let nan = || Array2::from_elem(shape, FloatValue::NAN);
        Self {
            grid,
            units: units.to_string(),
            slope: nan(),
            intercept: nan(),
            rvalue: nan(),
            pvalue: nan(),
            stderr: nan(),
            counts: Array2::zeros(shape),
        }
    }

    fn from_results(grid: LatLonGrid, units: &str, results: &[TrendResult]) -> Self {
        let shape = grid.shape();
        let nlon = shape.1;
        let stat = |f: fn(&TrendResult) -> FloatValue| {
            Array2::from_shape_fn(shape, |(i, j)| f(&results[i * nlon + j]))
        };
        Self {
            slope: stat(|r| r.slope),
            intercept: stat(|r| r.intercept),
            rvalue: stat(|r| r.rvalue),
            pvalue: stat(|r| r.pvalue),
            stderr: stat(|r| r.stderr),
            counts: Array2::from_shape_fn(shape, |(i, j)| results[i * nlon + j].n),
            units: units.to_string(),
            grid,
        }
    }

    /// Copy the cells of `block` into the given index ranges
    pub(crate) fn assign_block(&mut self, lat: Range<usize>, lon: Range<usize>, block: &TrendField) {
        let region = s![lat, lon];
        self.slope.slice_mut(region).assign(&block.slope);
        self.intercept.slice_mut(region).assign(&block.intercept);
        self.rvalue.slice_mut(region).assign(&block.rvalue);
        self.pvalue.slice_mut(region).assign(&block.pvalue);
        self.stderr.slice_mut(region).assign(&block.stderr);
        self.counts.slice_mut(region).assign(&block.counts);
    }

    pub fn grid(&self) -> &LatLonGrid {
        &self.grid
    }

    pub fn units(&self) -> &str {
        &self.units
    }

    pub fn slope(&self) -> &Array2<FloatValue> {
        &self.slope
    }

    pub fn intercept(&self) -> &Array2<FloatValue> {
        &self.intercept
    }

    pub fn rvalue(&self) -> &Array2<FloatValue> {
        &self.rvalue
    }

    pub fn pvalue(&self) -> &Array2<FloatValue> {
        &self.pvalue
    }

    pub fn stderr(&self) -> &Array2<FloatValue> {
        &self.stderr
    }

    /// Number of valid points in each cell's fit
    pub fn counts(&self) -> &Array2<usize> {
        &self.counts
    }

    /// The fit of one cell, `None` when out of bounds
    pub fn get(&self, lat: usize, lon: usize) -> Option<TrendResult> {
        Some(TrendResult {
            slope: *self.slope.get([lat, lon])?,
            intercept: self.intercept[[lat, lon]],
            rvalue: self.rvalue[[lat, lon]],
            pvalue: self.pvalue[[lat, lon]],
            stderr: self.stderr[[lat, lon]],
            n: self.counts[[lat, lon]],
        })
    }

    /// Slopes and standard errors per ten covariate units (per decade for yearly covariates)
    pub fn per_decade(&self) -> Self {
        Self {
            slope: &self.slope * 10.0,
            stderr: &self.stderr * 10.0,
            ..self.clone()
        }
    }

    /// Cells whose p-value is below `alpha`; undefined cells are never significant
    pub fn significant(&self, alpha: FloatValue) -> Array2<bool> {
        self.pvalue.mapv(|p| p < alpha)
    }

    /// Number of cells with a defined trend
    pub fn defined_count(&self) -> usize {
        self.slope.iter().filter(|s| !s.is_nan()).count()
    }

    /// Write one `lat,lon,slope,intercept,rvalue,pvalue,stderr,n` row per cell
    pub fn write_csv<W: Write>(&self, writer: W) -> RClimResult<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        let lats = self.grid.lat().values();
        let lons = self.grid.lon().values();
        for (i, lat) in lats.iter().enumerate() {
            for (j, lon) in lons.iter().enumerate() {
                wtr.serialize(CsvRow {
                    lat: *lat,
                    lon: *lon,
                    slope: self.slope[[i, j]],
                    intercept: self.intercept[[i, j]],
                    rvalue: self.rvalue[[i, j]],
                    pvalue: self.pvalue[[i, j]],
                    stderr: self.stderr[[i, j]],
                    n: self.counts[[i, j]],
                })?;
            }
        }
        wtr.flush()?;
        Ok(())
    }
}

/// Fit every cell of `field` against `covariate`
///
/// `covariate` holds one value per time step of the field, e.g. the years of an
/// annual-mean field. A length mismatch is rejected with
/// [`RClimError::GridMismatch`].
pub fn trend(field: &GridField, covariate: &[FloatValue]) -> RClimResult<TrendField> {
    trend_with_min_samples(field, covariate, 2)
}

/// As [`trend`], treating cells with fewer than `min_samples` valid points as undefined
pub fn trend_with_min_samples(
    field: &GridField,
    covariate: &[FloatValue],
    min_samples: usize,
) -> RClimResult<TrendField> {
    if covariate.len() != field.time().len() {
        return Err(RClimError::GridMismatch(format!(
            "covariate has {} values but '{}' has {} time steps",
            covariate.len(),
            field.name(),
            field.time().len()
        )));
    }
    let (_, nlat, nlon) = field.shape();
    debug!(
        "Fitting trends for {} cells over {} time steps",
        nlat * nlon,
        covariate.len()
    );

    let values = field.values();
    let results: Vec<TrendResult> = (0..nlat * nlon)
        .into_par_iter()
        .map(|k| {
            let series = values.slice(s![.., k / nlon, k % nlon]);
            fit(
                covariate.iter().copied().zip(series.iter().copied()),
                min_samples,
            )
        })
        .collect();

    let trends = TrendField::from_results(field.grid().clone(), field.units(), &results);
    let undefined = nlat * nlon - trends.defined_count();
    if undefined > 0 {
        warn!(
            "{} of {} cells of '{}' have too few valid points for a trend",
            undefined,
            nlat * nlon,
            field.name()
        );
    }
    Ok(trends)
}

/// Fit every cell against the calendar year of each time step
pub fn trend_by_year(field: &GridField) -> RClimResult<TrendField> {
    let years: Vec<FloatValue> = field
        .time()
        .years()
        .into_iter()
        .map(FloatValue::from)
        .collect();
    trend(field, &years)
}
