//! Climatological means
//!
//! Reductions along the time axis of a [`GridField`]:
//!
//! - [`climatology`]: one [`ClimatologyField`] per group of a [`TimeGrouping`]
//!   (overall mean, seasonal or monthly climatology, per-year means)
//! - [`annual_mean`] and [`seasonal_means`]: resampling to one time step per year
//!   (or per season of each year), keeping a [`GridField`]
//! - [`anomalies`]: departures from a climatology
//!
//! All means skip missing samples: a cell's mean is the sum of its valid samples
//! divided by their count. A cell without any valid sample in a group is `NaN`.
//!
//! # Examples
//!
//! ```rust
//! use rclim_core::axis::TimeAxis;
//! use rclim_core::calendar::{GroupKey, Season, TimeGrouping};
//! use rclim_core::climatology::climatology;
//! use rclim_core::field::GridField;
//! use rclim_core::spatial::LatLonGrid;
//!
//! let field = GridField::from_fn(
//!     "t2m",
//!     "degC",
//!     TimeAxis::monthly(1981, 1, 48).unwrap(),
//!     LatLonGrid::regular(30.0, -30.0, 3, 0.0, 120.0, 3).unwrap(),
//!     |t, _, _| (t % 12) as f64,
//! );
//!
//! let seasonal = climatology(&field, TimeGrouping::Season);
//! assert_eq!(seasonal.len(), 4);
//! // JJA: months 6, 7, 8 stored as 5, 6, 7
//! let jja = seasonal.get(&GroupKey::Season(Season::JJA)).unwrap();
//! assert_eq!(jja.get(0, 0), Some(6.0));
//! ```

use crate::axis::{first_of_month, TimeAxis, Timestamp};
use crate::calendar::{GroupKey, Season, TimeGrouping};
use crate::errors::{RClimError, RClimResult};
use crate::field::GridField;
use crate::spatial::LatLonGrid;
use crate::timeseries::FloatValue;
use chrono::Datelike;
use log::debug;
use ndarray::parallel::prelude::*;
use ndarray::{s, Array2, Array3, Axis, Zip};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::ops::Range;

/// A field collapsed along time for one group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClimatologyField {
    key: GroupKey,
    units: String,
    grid: LatLonGrid,
    values: Array2<FloatValue>,
    /// Number of valid samples averaged into each cell
    counts: Array2<usize>,
}

impl ClimatologyField {
    pub fn new(
        key: GroupKey,
        units: &str,
        grid: LatLonGrid,
        values: Array2<FloatValue>,
        counts: Array2<usize>,
    ) -> RClimResult<Self> {
        for shape in [values.dim(), counts.dim()] {
            if shape != grid.shape() {
                return Err(RClimError::ShapeMismatch {
                    expected: vec![grid.shape().0, grid.shape().1],
                    actual: vec![shape.0, shape.1],
                });
            }
        }
        Ok(Self {
            key,
            units: units.to_string(),
            grid,
            values,
            counts,
        })
    }

    /// Climatology field with every cell missing
    pub(crate) fn empty(key: GroupKey, units: &str, grid: LatLonGrid) -> Self {
        let shape = grid.shape();
        Self {
            key,
            units: units.to_string(),
            grid,
            values: Array2::from_elem(shape, FloatValue::NAN),
            counts: Array2::zeros(shape),
        }
    }

    pub fn key(&self) -> GroupKey {
        self.key
    }

    pub fn units(&self) -> &str {
        &self.units
    }

    pub fn grid(&self) -> &LatLonGrid {
        &self.grid
    }

    pub fn values(&self) -> &Array2<FloatValue> {
        &self.values
    }

    pub fn counts(&self) -> &Array2<usize> {
        &self.counts
    }

    pub(crate) fn parts_mut(&mut self) -> (&mut Array2<FloatValue>, &mut Array2<usize>) {
        (&mut self.values, &mut self.counts)
    }

    pub fn get(&self, lat: usize, lon: usize) -> Option<FloatValue> {
        self.values.get([lat, lon]).copied()
    }

    /// Area-weighted mean over the grid
    pub fn weighted_mean(&self) -> FloatValue {
        self.grid.weighted_mean(self.values.view())
    }

    /// Cell-wise `self - other`, e.g. a model bias against observations
    ///
    /// Both fields must be on the same grid and in the same units. A cell is
    /// missing if it is missing in either operand.
    pub fn difference(&self, other: &ClimatologyField) -> RClimResult<ClimatologyField> {
        self.grid.check_compatible(&other.grid)?;
        if self.units != other.units {
            return Err(RClimError::WrongUnits(
                self.units.clone(),
                other.units.clone(),
            ));
        }
        let values = &self.values - &other.values;
        let counts = Zip::from(&self.counts)
            .and(&other.counts)
            .map_collect(|a, b| *a.min(b));
        Ok(ClimatologyField {
            key: self.key,
            units: self.units.clone(),
            grid: self.grid.clone(),
            values,
            counts,
        })
    }
}

/// Missing-aware cell-wise mean of several climatology fields (e.g. a model ensemble)
///
/// `counts` of the result hold the number of members that were valid at each cell.
pub fn ensemble_mean(fields: &[ClimatologyField]) -> RClimResult<ClimatologyField> {
    let first = fields
        .first()
        .ok_or_else(|| RClimError::Error("Ensemble mean of zero fields".to_string()))?;
    for member in &fields[1..] {
        first.grid.check_compatible(&member.grid)?;
        if member.units != first.units {
            return Err(RClimError::WrongUnits(
                first.units.clone(),
                member.units.clone(),
            ));
        }
    }

    let shape = first.grid.shape();
    let mut sums = Array2::<FloatValue>::zeros(shape);
    let mut counts = Array2::<usize>::zeros(shape);
    for member in fields {
        Zip::from(&mut sums)
            .and(&mut counts)
            .and(&member.values)
            .for_each(|s, c, &v| {
                if !v.is_nan() {
                    *s += v;
                    *c += 1;
                }
            });
    }
    let values = mean_from_sums(&sums, &counts);
    ClimatologyField::new(first.key, &first.units, first.grid.clone(), values, counts)
}

/// The climatology fields of one grouping, ordered by group key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Climatology {
    grouping: TimeGrouping,
    fields: Vec<ClimatologyField>,
}

impl Climatology {
    pub(crate) fn from_fields(grouping: TimeGrouping, fields: Vec<ClimatologyField>) -> Self {
        Self { grouping, fields }
    }

    pub fn grouping(&self) -> TimeGrouping {
        self.grouping
    }

    pub fn fields(&self) -> &[ClimatologyField] {
        &self.fields
    }

    pub fn into_fields(self) -> Vec<ClimatologyField> {
        self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn keys(&self) -> Vec<GroupKey> {
        self.fields.iter().map(|f| f.key).collect()
    }

    pub fn get(&self, key: &GroupKey) -> Option<&ClimatologyField> {
        self.fields.iter().find(|f| f.key == *key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClimatologyField> {
        self.fields.iter()
    }

    /// Grid shared by the fields, `None` for an empty climatology
    pub fn grid(&self) -> Option<&LatLonGrid> {
        self.fields.first().map(|f| &f.grid)
    }

    /// The fields restricted to contiguous index ranges
    ///
    /// # Panics
    ///
    /// Panics if a range is out of bounds
    pub fn subgrid(&self, lat: Range<usize>, lon: Range<usize>) -> Climatology {
        let fields = self
            .fields
            .iter()
            .map(|f| ClimatologyField {
                key: f.key,
                units: f.units.clone(),
                grid: f.grid.subgrid(lat.clone(), lon.clone()),
                values: f.values.slice(s![lat.clone(), lon.clone()]).to_owned(),
                counts: f.counts.slice(s![lat.clone(), lon.clone()]).to_owned(),
            })
            .collect();
        Climatology::from_fields(self.grouping, fields)
    }
}

fn mean_from_sums(sums: &Array2<FloatValue>, counts: &Array2<usize>) -> Array2<FloatValue> {
    Zip::from(sums).and(counts).map_collect(|&s, &c| {
        if c == 0 {
            FloatValue::NAN
        } else {
            s / c as FloatValue
        }
    })
}

/// Missing-aware mean over the given time steps
fn group_mean(
    values: &Array3<FloatValue>,
    indices: &[usize],
) -> (Array2<FloatValue>, Array2<usize>) {
    let (_, nlat, nlon) = values.dim();
    let mut sums = Array2::<FloatValue>::zeros((nlat, nlon));
    let mut counts = Array2::<usize>::zeros((nlat, nlon));
    for &t in indices {
        Zip::from(&mut sums)
            .and(&mut counts)
            .and(values.index_axis(Axis(0), t))
            .for_each(|s, c, &v| {
                if !v.is_nan() {
                    *s += v;
                    *c += 1;
                }
            });
    }
    (mean_from_sums(&sums, &counts), counts)
}

/// Mean of every group of time steps, ordered by key
fn grouped_means<K, F>(field: &GridField, key: F) -> Vec<(K, Array2<FloatValue>, Array2<usize>)>
where
    K: Ord + Send,
    F: Fn(&Timestamp) -> K,
{
    let mut groups: BTreeMap<K, Vec<usize>> = BTreeMap::new();
    for (t, stamp) in field.time().values().iter().enumerate() {
        groups.entry(key(stamp)).or_default().push(t);
    }
    let groups: Vec<(K, Vec<usize>)> = groups.into_iter().collect();
    groups
        .into_par_iter()
        .map(|(k, indices)| {
            let (means, counts) = group_mean(field.values(), &indices);
            (k, means, counts)
        })
        .collect()
}

/// Climatological mean of `field` for every group of `grouping`
///
/// Groups without any time step do not appear in the result; a field with an
/// empty time axis yields an empty climatology.
pub fn climatology(field: &GridField, grouping: TimeGrouping) -> Climatology {
    debug!(
        "Computing {:?} climatology of '{}' over {} time steps",
        grouping,
        field.name(),
        field.time().len()
    );
    let fields = grouped_means(field, |t| grouping.key(t))
        .into_iter()
        .map(|(key, values, counts)| ClimatologyField {
            key,
            units: field.units().to_string(),
            grid: field.grid().clone(),
            values,
            counts,
        })
        .collect();
    Climatology::from_fields(grouping, fields)
}

/// Resample to one time step per group, stamped by `stamp`
fn resample<F>(field: &GridField, stamp: F) -> RClimResult<GridField>
where
    F: Fn(&Timestamp) -> RClimResult<Timestamp>,
{
    // Validate every stamp up front so the grouping key itself is infallible
    let stamps = field
        .time()
        .values()
        .iter()
        .map(&stamp)
        .collect::<RClimResult<Vec<_>>>()?;
    let lookup: HashMap<Timestamp, Timestamp> = field
        .time()
        .values()
        .iter()
        .copied()
        .zip(stamps)
        .collect();

    let groups = grouped_means(field, |t| lookup[t]);
    let (nlat, nlon) = field.grid().shape();
    let mut values = Array3::from_elem((groups.len(), nlat, nlon), FloatValue::NAN);
    let mut times = Vec::with_capacity(groups.len());
    for (g, (time, means, _)) in groups.into_iter().enumerate() {
        values.index_axis_mut(Axis(0), g).assign(&means);
        times.push(time);
    }
    GridField::new(
        field.name(),
        field.units(),
        TimeAxis::new(times)?,
        field.grid().clone(),
        values,
    )
}

/// Calendar-year means, stamped at 1 January of each year
pub fn annual_mean(field: &GridField) -> RClimResult<GridField> {
    resample(field, |t| first_of_month(t.year(), 1))
}

/// Means of every season of every year, stamped at the first month of the season
///
/// December is averaged with the following January and February, so the DJF
/// of winter 1979/80 is stamped 1 December 1979. Seasons cut by the ends of the
/// record are averaged over the months available.
pub fn seasonal_means(field: &GridField) -> RClimResult<GridField> {
    resample(field, season_start)
}

fn season_start(t: &Timestamp) -> RClimResult<Timestamp> {
    let season = Season::from_month(t.month());
    let year = if season == Season::DJF && t.month() != 12 {
        t.year() - 1
    } else {
        t.year()
    };
    first_of_month(year, season.months()[0])
}

/// Departures of `field` from `climatology`
///
/// Every time step has the climatology field of its group subtracted (e.g. its
/// calendar month for a [`TimeGrouping::Month`] climatology). Time steps whose
/// group is absent from the climatology become missing.
pub fn anomalies(field: &GridField, climatology: &Climatology) -> RClimResult<GridField> {
    if let Some(grid) = climatology.grid() {
        field.grid().check_compatible(grid)?;
    }
    if let Some(other) = climatology
        .iter()
        .map(|f| f.units())
        .find(|u| *u != field.units())
    {
        return Err(RClimError::WrongUnits(
            field.units().to_string(),
            other.to_string(),
        ));
    }

    let by_key: HashMap<GroupKey, &ClimatologyField> =
        climatology.iter().map(|f| (f.key, f)).collect();
    let grouping = climatology.grouping();
    let times = field.time().values();

    let mut values = field.values().clone();
    values
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(t, mut slice)| match by_key.get(&grouping.key(&times[t])) {
            Some(reference) => slice -= &reference.values,
            None => slice.fill(FloatValue::NAN),
        });

    GridField::new(
        &format!("{} anomaly", field.name()),
        field.units(),
        field.time().clone(),
        field.grid().clone(),
        values,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::TimeAxis;
    use crate::calendar::Season;

    fn grid() -> LatLonGrid {
        LatLonGrid::regular(45.0, -90.0, 2, 0.0, 120.0, 3).unwrap()
    }

    fn monthly_field(years: usize) -> GridField {
        GridField::from_fn(
            "t2m",
            "K",
            TimeAxis::monthly(2001, 1, 12 * years).unwrap(),
            grid(),
            |t, i, j| t as f64 + i as f64 * 1000.0 + j as f64 * 100.0,
        )
    }

    #[test]
    fn overall_mean_matches_naive_mean() {
        let field = monthly_field(2);
        let clim = climatology(&field, TimeGrouping::All);
        assert_eq!(clim.keys(), vec![GroupKey::All]);
        let all = clim.get(&GroupKey::All).unwrap();
        // mean of 0..24 is 11.5
        assert_eq!(all.get(0, 0), Some(11.5));
        assert_eq!(all.get(1, 2), Some(1211.5));
        assert!(all.counts().iter().all(|c| *c == 24));
    }

    #[test]
    fn missing_values_are_not_counted() {
        let mut field = monthly_field(1);
        field.values_mut()[[0, 0, 0]] = FloatValue::NAN;
        let all = climatology(&field, TimeGrouping::All).into_fields().remove(0);
        // mean of 1..=11
        assert_eq!(all.get(0, 0), Some(6.0));
        assert_eq!(all.counts()[[0, 0]], 11);
        assert_eq!(all.get(0, 1), Some(105.5));
    }

    #[test]
    fn all_missing_group_is_nan() {
        let mut field = monthly_field(1);
        for t in 0..12 {
            field.values_mut()[[t, 1, 1]] = FloatValue::NAN;
        }
        let all = climatology(&field, TimeGrouping::All).into_fields().remove(0);
        assert!(all.get(1, 1).unwrap().is_nan());
        assert_eq!(all.counts()[[1, 1]], 0);
        assert!(!all.get(1, 0).unwrap().is_nan());
    }

    #[test]
    fn monthly_climatology() {
        let clim = climatology(&monthly_field(3), TimeGrouping::Month);
        assert_eq!(clim.len(), 12);
        let march = clim.get(&GroupKey::Month(3)).unwrap();
        // indices 2, 14, 26
        assert_eq!(march.get(0, 0), Some(14.0));
        assert_eq!(march.counts()[[0, 0]], 3);
    }

    #[test]
    fn year_grouping() {
        let clim = climatology(&monthly_field(2), TimeGrouping::Year);
        assert_eq!(clim.keys(), vec![GroupKey::Year(2001), GroupKey::Year(2002)]);
        assert_eq!(clim.get(&GroupKey::Year(2002)).unwrap().get(0, 0), Some(17.5));
    }

    #[test]
    fn empty_time_axis_gives_empty_climatology() {
        let field = monthly_field(1).select_years(1900, 1900).unwrap();
        assert!(climatology(&field, TimeGrouping::Season).is_empty());
    }

    #[test]
    fn annual_mean_resamples() {
        let annual = annual_mean(&monthly_field(3)).unwrap();
        assert_eq!(annual.time().years(), vec![2001, 2002, 2003]);
        assert_eq!(annual.shape(), (3, 2, 3));
        assert_eq!(annual.get(0, 0, 0), Some(5.5));
        assert_eq!(annual.get(2, 1, 0), Some(1029.5));
    }

    #[test]
    fn seasonal_means_join_december_with_next_year() {
        let seasons = seasonal_means(&monthly_field(2)).unwrap();
        let stamps: Vec<(i32, u32)> = seasons
            .time()
            .values()
            .iter()
            .map(|t| (t.year(), t.month()))
            .collect();
        assert_eq!(
            stamps,
            vec![
                (2000, 12), // Jan, Feb 2001
                (2001, 3),
                (2001, 6),
                (2001, 9),
                (2001, 12), // Dec 2001, Jan, Feb 2002
                (2002, 3),
                (2002, 6),
                (2002, 9),
                (2002, 12), // Dec 2002 only
            ]
        );
        assert_eq!(seasons.get(0, 0, 0), Some(0.5));
        assert_eq!(seasons.get(4, 0, 0), Some((11.0 + 12.0 + 13.0) / 3.0));
        assert_eq!(seasons.get(8, 0, 0), Some(23.0));
    }

    #[test]
    fn anomalies_against_monthly_climatology() {
        let field = monthly_field(2);
        let clim = climatology(&field, TimeGrouping::Month);
        let anomaly = anomalies(&field, &clim).unwrap();
        // Each month is 6 away from its two-year mean
        assert_eq!(anomaly.get(0, 1, 1), Some(-6.0));
        assert_eq!(anomaly.get(13, 0, 2), Some(6.0));
    }

    #[test]
    fn anomalies_with_missing_group() {
        let field = monthly_field(2);
        let clim = climatology(&field.select_years(2001, 2001).unwrap(), TimeGrouping::Year);
        let anomaly = anomalies(&field, &clim).unwrap();
        assert_eq!(anomaly.get(0, 0, 0), Some(-5.5));
        assert!(anomaly.get(12, 0, 0).unwrap().is_nan());
    }

    #[test]
    fn anomalies_reject_other_grid() {
        let field = monthly_field(1);
        let other = GridField::filled(
            "t2m",
            "K",
            TimeAxis::monthly(2001, 1, 12).unwrap(),
            LatLonGrid::regular(40.0, -80.0, 2, 0.0, 120.0, 3).unwrap(),
            1.0,
        );
        let clim = climatology(&other, TimeGrouping::Month);
        assert!(matches!(
            anomalies(&field, &clim),
            Err(RClimError::GridMismatch(_))
        ));
    }

    #[test]
    fn bias_between_fields() {
        let obs = climatology(&monthly_field(1), TimeGrouping::Season);
        let model_field = monthly_field(1).map_values("K", |v| v + 1.5);
        let model = climatology(&model_field, TimeGrouping::Season);
        let key = GroupKey::Season(Season::SON);
        let bias = model
            .get(&key)
            .unwrap()
            .difference(obs.get(&key).unwrap())
            .unwrap();
        assert!(bias.values().iter().all(|b| (b - 1.5).abs() < 1e-12));
        assert_eq!(bias.key(), key);
    }

    #[test]
    fn bias_rejects_mismatched_units() {
        let obs = climatology(&monthly_field(1), TimeGrouping::All);
        let model = climatology(&monthly_field(1).to_celsius().unwrap(), TimeGrouping::All);
        assert!(matches!(
            model.fields()[0].difference(&obs.fields()[0]),
            Err(RClimError::WrongUnits(_, _))
        ));
    }

    #[test]
    fn ensemble_mean_skips_missing_members() {
        let a = ClimatologyField::new(
            GroupKey::All,
            "K",
            LatLonGrid::regular(0.0, 10.0, 1, 0.0, 10.0, 2).unwrap(),
            ndarray::array![[1.0, FloatValue::NAN]],
            ndarray::array![[1, 0]],
        )
        .unwrap();
        let mut b = a.clone();
        b.parts_mut().0[[0, 0]] = 3.0;
        b.parts_mut().0[[0, 1]] = 4.0;
        let mean = ensemble_mean(&[a, b]).unwrap();
        assert_eq!(mean.values(), &ndarray::array![[2.0, 4.0]]);
        assert_eq!(mean.counts(), &ndarray::array![[2usize, 1]]);
        assert!(ensemble_mean(&[]).is_err());
    }
}
