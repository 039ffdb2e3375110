//! Scalar time series produced by spatial reductions

use crate::axis::{TimeAxis, Timestamp};
use crate::errors::{RClimError, RClimResult};
use crate::trend::{linregress, TrendResult};
use crate::utils::nanops::MeanAccumulator;
use chrono::Datelike;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;

pub type FloatValue = f64;

/// A 1-D ordered sequence of (timestamp, value) pairs
///
/// Missing values are stored as `NaN`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    time: TimeAxis,
    values: Array1<FloatValue>,
    units: String,
}

#[derive(Serialize)]
struct CsvRow {
    time: String,
    value: FloatValue,
}

impl TimeSeries {
    pub fn new(time: TimeAxis, values: Array1<FloatValue>, units: &str) -> RClimResult<Self> {
        if time.len() != values.len() {
            return Err(RClimError::ShapeMismatch {
                expected: vec![time.len()],
                actual: vec![values.len()],
            });
        }
        Ok(Self {
            time,
            values,
            units: units.to_string(),
        })
    }

    pub fn time(&self) -> &TimeAxis {
        &self.time
    }

    pub fn values(&self) -> &Array1<FloatValue> {
        &self.values
    }

    pub fn units(&self) -> &str {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn at(&self, index: usize) -> Option<FloatValue> {
        self.values.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Timestamp, FloatValue)> + '_ {
        self.time
            .values()
            .iter()
            .copied()
            .zip(self.values.iter().copied())
    }

    /// Mean over all non-missing values, `NaN` if there are none
    pub fn mean(&self) -> FloatValue {
        self.values
            .iter()
            .fold(MeanAccumulator::default(), |acc, v| acc.with(*v))
            .mean()
    }

    /// Series relative to its mean over the inclusive year range `[start, end]`
    pub fn anomaly(&self, start: i32, end: i32) -> TimeSeries {
        let baseline = self
            .iter()
            .filter(|(t, _)| (start..=end).contains(&t.year()))
            .fold(MeanAccumulator::default(), |acc, (_, v)| acc.with(v))
            .mean();
        Self {
            time: self.time.clone(),
            values: self.values.mapv(|v| v - baseline),
            units: self.units.clone(),
        }
    }

    /// Calendar-year means, stamped at 1 January
    pub fn annual_mean(&self) -> RClimResult<TimeSeries> {
        let mut years: BTreeMap<i32, MeanAccumulator> = BTreeMap::new();
        for (t, v) in self.iter() {
            years.entry(t.year()).or_default().push(v);
        }
        let time = TimeAxis::new(
            years
                .keys()
                .map(|y| crate::axis::first_of_month(*y, 1))
                .collect::<RClimResult<Vec<_>>>()?,
        )?;
        let values = years.values().map(|acc| acc.mean()).collect();
        TimeSeries::new(time, values, &self.units)
    }

    /// Least-squares trend against decimal years
    pub fn trend(&self) -> TrendResult {
        let x = self.time.fractional_years();
        let y = self.values.to_vec();
        linregress(&x, &y).unwrap_or_else(|_| TrendResult::undefined(0))
    }

    /// Write the series as a `time,value` table
    pub fn write_csv<W: Write>(&self, writer: W) -> RClimResult<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        for (t, value) in self.iter() {
            wtr.serialize(CsvRow {
                time: t.format("%Y-%m-%dT%H:%M:%S").to_string(),
                value,
            })?;
        }
        wtr.flush()?;
        Ok(())
    }
}
