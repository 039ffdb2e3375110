//! Block-partitioned lazy evaluation
//!
//! Fields that do not fit in memory are processed in spatial blocks: every
//! block covers a contiguous range of latitudes and longitudes and the whole
//! time axis. Since the reductions of this crate are independent per cell (or,
//! for spatial means, additive over cells) the results of the blocks can be
//! stitched together without any coordination.
//!
//! A [`BlockPlan`] records the transformations to apply to every block and is
//! consumed by one terminal reduction. Nothing is read from the
//! [`FieldSource`] before the terminal call; blocks are then loaded,
//! transformed and reduced in parallel, so at most one block per worker thread
//! is held in memory next to the output.
//!
//! A block that fails to load or transform leaves its cells missing (or its
//! partial sums out of a spatial mean). The failure is logged and returned in
//! the [`BlockReport`]. The call itself only fails when every block failed.
//!
//! # Examples
//!
//! ```rust
//! use rclim_core::axis::TimeAxis;
//! use rclim_core::calendar::TimeGrouping;
//! use rclim_core::field::GridField;
//! use rclim_core::plan::{BlockPlan, BlockShape, InMemorySource};
//! use rclim_core::spatial::LatLonGrid;
//!
//! let field = GridField::from_fn(
//!     "t2m",
//!     "K",
//!     TimeAxis::monthly(1990, 1, 120).unwrap(),
//!     LatLonGrid::regular(85.0, -10.0, 18, 0.0, 10.0, 36).unwrap(),
//!     |t, i, j| 273.15 + (t % 12) as f64 + i as f64 - j as f64,
//! );
//! let source = InMemorySource::new(field);
//!
//! let result = BlockPlan::new(&source, BlockShape::new(8, 8))
//!     .select_years(1991, 2000)
//!     .to_celsius()
//!     .climatology(TimeGrouping::Season)
//!     .unwrap();
//! assert!(result.report.is_complete());
//! assert_eq!(result.report.blocks, 15);
//! assert_eq!(result.value.len(), 4);
//! ```

use crate::averaging::weighted_partial_sums;
use crate::axis::TimeAxis;
use crate::calendar::TimeGrouping;
use crate::climatology::{self, Climatology, ClimatologyField};
use crate::config::AnalysisConfig;
use crate::errors::{RClimError, RClimResult};
use crate::field::GridField;
use crate::spatial::{LatLonGrid, RegionBounds};
use crate::timeseries::{FloatValue, TimeSeries};
use crate::trend::{trend_with_min_samples, TrendField};
use crate::units::TemperatureUnit;
use crate::utils::nanops::WeightedAccumulator;
use log::{debug, warn};
use ndarray::{s, Array3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

/// A contiguous spatial block, covering the whole time axis
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Block {
    pub lat: Range<usize>,
    pub lon: Range<usize>,
}

impl Block {
    pub fn new(lat: Range<usize>, lon: Range<usize>) -> Self {
        Self { lat, lon }
    }

    /// `(nlat, nlon)`
    pub fn shape(&self) -> (usize, usize) {
        (self.lat.len(), self.lon.len())
    }

    pub fn fits(&self, grid: &LatLonGrid) -> bool {
        let (nlat, nlon) = grid.shape();
        self.lat.end <= nlat && self.lon.end <= nlon
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lat {}..{}, lon {}..{}",
            self.lat.start, self.lat.end, self.lon.start, self.lon.end
        )
    }
}

/// Number of cells along each axis of a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockShape {
    pub lat: usize,
    pub lon: usize,
}

impl BlockShape {
    pub fn new(lat: usize, lon: usize) -> Self {
        Self { lat, lon }
    }
}

impl Default for BlockShape {
    fn default() -> Self {
        Self { lat: 90, lon: 180 }
    }
}

/// Split a grid into row-major blocks of at most `shape` cells
///
/// Blocks at the end of an axis are truncated. A zero extent is treated as one.
pub fn partition(grid: &LatLonGrid, shape: BlockShape) -> Vec<Block> {
    let (nlat, nlon) = grid.shape();
    let (step_lat, step_lon) = (shape.lat.max(1), shape.lon.max(1));
    let mut blocks = Vec::new();
    for lat0 in (0..nlat).step_by(step_lat) {
        for lon0 in (0..nlon).step_by(step_lon) {
            blocks.push(Block::new(
                lat0..(lat0 + step_lat).min(nlat),
                lon0..(lon0 + step_lon).min(nlon),
            ));
        }
    }
    blocks
}

/// Something that can load spatial blocks of a field on demand
///
/// Implemented by loaders of chunked on-disk formats; [`InMemorySource`] wraps
/// a field that is already loaded.
pub trait FieldSource: Send + Sync {
    fn name(&self) -> &str;
    fn units(&self) -> &str;
    fn time(&self) -> &TimeAxis;
    fn grid(&self) -> &LatLonGrid;
    /// Load every time step of one block
    fn read_block(&self, block: &Block) -> RClimResult<GridField>;
}

#[derive(Debug, Clone)]
pub struct InMemorySource {
    field: GridField,
}

impl InMemorySource {
    pub fn new(field: GridField) -> Self {
        Self { field }
    }

    pub fn field(&self) -> &GridField {
        &self.field
    }
}

impl From<GridField> for InMemorySource {
    fn from(field: GridField) -> Self {
        Self::new(field)
    }
}

impl FieldSource for InMemorySource {
    fn name(&self) -> &str {
        self.field.name()
    }

    fn units(&self) -> &str {
        self.field.units()
    }

    fn time(&self) -> &TimeAxis {
        self.field.time()
    }

    fn grid(&self) -> &LatLonGrid {
        self.field.grid()
    }

    fn read_block(&self, block: &Block) -> RClimResult<GridField> {
        if !block.fits(self.field.grid()) {
            return Err(RClimError::Error(format!(
                "Block {} is outside the {:?} grid",
                block,
                self.field.grid().shape()
            )));
        }
        Ok(self.field.subgrid(block.lat.clone(), block.lon.clone()))
    }
}

/// A deferred transformation applied to every block
#[derive(Debug, Clone)]
pub enum Step {
    SelectYears { start: i32, end: i32 },
    ToCelsius,
    AnnualMean,
    SeasonalMeans,
    /// Departures from a climatology on the source grid
    Anomalies(Arc<Climatology>),
}

impl Step {
    fn apply(&self, field: GridField, block: &Block) -> RClimResult<GridField> {
        match self {
            Step::SelectYears { start, end } => field.select_years(*start, *end),
            Step::ToCelsius => field.to_celsius(),
            Step::AnnualMean => climatology::annual_mean(&field),
            Step::SeasonalMeans => climatology::seasonal_means(&field),
            Step::Anomalies(reference) => {
                let reference = reference.subgrid(block.lat.clone(), block.lon.clone());
                climatology::anomalies(&field, &reference)
            }
        }
    }

    /// Check the step against the source grid and the units reaching it
    ///
    /// Returns the units of the step's output.
    fn check(&self, grid: &LatLonGrid, units: &str) -> RClimResult<String> {
        match self {
            Step::ToCelsius => {
                TemperatureUnit::parse(units)?;
                Ok(TemperatureUnit::Celsius.symbol().to_string())
            }
            Step::Anomalies(reference) => {
                if let Some(other) = reference.grid() {
                    grid.check_compatible(other)?;
                }
                if let Some(other) = reference.iter().map(|f| f.units()).find(|u| *u != units) {
                    return Err(RClimError::WrongUnits(units.to_string(), other.to_string()));
                }
                Ok(units.to_string())
            }
            _ => Ok(units.to_string()),
        }
    }
}

/// Independent variable of a blocked trend
#[derive(Debug, Clone, PartialEq)]
pub enum Covariate {
    /// Calendar year of each time step
    Years,
    /// Decimal year of each time step
    FractionalYears,
    /// Explicit values, one per time step after the plan's transformations
    Values(Vec<FloatValue>),
}

impl Covariate {
    pub fn values(&self, time: &TimeAxis) -> Vec<FloatValue> {
        match self {
            Covariate::Years => time.years().into_iter().map(FloatValue::from).collect(),
            Covariate::FractionalYears => time.fractional_years(),
            Covariate::Values(values) => values.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockFailure {
    pub block: Block,
    pub error: String,
}

/// Outcome of the blocks of one evaluation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockReport {
    /// Number of blocks evaluated
    pub blocks: usize,
    pub failed: Vec<BlockFailure>,
}

impl BlockReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Result of a terminal reduction along with the block report
#[derive(Debug, Clone)]
pub struct Computed<T> {
    pub value: T,
    pub report: BlockReport,
}

/// Deferred pipeline over the blocks of a [`FieldSource`]
pub struct BlockPlan<'a> {
    source: &'a dyn FieldSource,
    shape: BlockShape,
    steps: Vec<Step>,
    min_samples: usize,
}

impl<'a> BlockPlan<'a> {
    pub fn new(source: &'a dyn FieldSource, shape: BlockShape) -> Self {
        Self {
            source,
            shape,
            steps: Vec::new(),
            min_samples: 2,
        }
    }

    /// Plan with the block shape, analysis period, unit conversion and trend
    /// sample threshold of `config`
    pub fn from_config(source: &'a dyn FieldSource, config: &AnalysisConfig) -> Self {
        let mut plan = Self::new(source, config.block).min_samples(config.min_samples);
        if let Some(period) = config.period {
            plan = plan.select_years(period.start, period.end);
        }
        if config.convert_to_celsius {
            plan = plan.to_celsius();
        }
        plan
    }

    /// Plan restricted to the baseline period of `config`, `None` when it has none
    pub fn baseline_from_config(
        source: &'a dyn FieldSource,
        config: &AnalysisConfig,
    ) -> Option<Self> {
        let baseline = config.baseline?;
        let mut plan = Self::new(source, config.block).select_years(baseline.start, baseline.end);
        if config.convert_to_celsius {
            plan = plan.to_celsius();
        }
        Some(plan)
    }

    fn then(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn select_years(self, start: i32, end: i32) -> Self {
        self.then(Step::SelectYears { start, end })
    }

    pub fn to_celsius(self) -> Self {
        self.then(Step::ToCelsius)
    }

    pub fn annual_mean(self) -> Self {
        self.then(Step::AnnualMean)
    }

    pub fn seasonal_means(self) -> Self {
        self.then(Step::SeasonalMeans)
    }

    pub fn anomalies(self, reference: Arc<Climatology>) -> Self {
        self.then(Step::Anomalies(reference))
    }

    /// Minimum number of valid points for a cell's trend to be defined
    pub fn min_samples(mut self, min_samples: usize) -> Self {
        self.min_samples = min_samples;
        self
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn blocks(&self) -> Vec<Block> {
        partition(self.source.grid(), self.shape)
    }

    /// Reject steps that cannot apply to the source, before any block is read
    fn validate(&self) -> RClimResult<()> {
        let grid = self.source.grid();
        self.steps
            .iter()
            .try_fold(self.source.units().to_string(), |units, step| {
                step.check(grid, &units)
            })
            .map(|_| ())
    }

    fn load(&self, block: &Block) -> RClimResult<GridField> {
        let field = self.source.read_block(block)?;
        self.steps
            .iter()
            .try_fold(field, |field, step| step.apply(field, block))
    }

    /// Load, transform and reduce every block in parallel
    ///
    /// Returns the successful blocks in partition order.
    fn evaluate<T, F>(&self, reduce: F) -> RClimResult<(Vec<(Block, T)>, BlockReport)>
    where
        T: Send,
        F: Fn(GridField) -> RClimResult<T> + Send + Sync,
    {
        self.validate()?;
        let blocks = self.blocks();
        debug!(
            "Evaluating '{}' in {} blocks with {} steps",
            self.source.name(),
            blocks.len(),
            self.steps.len()
        );

        let outcomes: Vec<(Block, RClimResult<T>)> = blocks
            .into_par_iter()
            .map(|block| {
                let outcome = self.load(&block).and_then(&reduce);
                (block, outcome)
            })
            .collect();

        let mut report = BlockReport {
            blocks: outcomes.len(),
            failed: Vec::new(),
        };
        let mut done = Vec::with_capacity(outcomes.len());
        for (block, outcome) in outcomes {
            match outcome {
                Ok(value) => done.push((block, value)),
                Err(e) => {
                    warn!("Block {} of '{}' failed: {}", block, self.source.name(), e);
                    report.failed.push(BlockFailure {
                        block,
                        error: e.to_string(),
                    });
                }
            }
        }

        if done.is_empty() && !report.failed.is_empty() {
            return Err(RClimError::Error(format!(
                "All {} blocks of '{}' failed, first error: {}",
                report.blocks,
                self.source.name(),
                report.failed[0].error
            )));
        }
        Ok((done, report))
    }

    /// Climatology of the transformed field
    pub fn climatology(&self, grouping: TimeGrouping) -> RClimResult<Computed<Climatology>> {
        let (done, report) =
            self.evaluate(|field| Ok(climatology::climatology(&field, grouping)))?;

        let keys: BTreeSet<_> = done.iter().flat_map(|(_, c)| c.keys()).collect();
        let units = done
            .iter()
            .flat_map(|(_, c)| c.iter())
            .map(|f| f.units().to_string())
            .next()
            .unwrap_or_else(|| self.source.units().to_string());

        let grid = self.source.grid();
        let fields = keys
            .into_iter()
            .map(|key| {
                let mut out = ClimatologyField::empty(key, &units, grid.clone());
                let (values, counts) = out.parts_mut();
                for (block, clim) in &done {
                    if let Some(part) = clim.get(&key) {
                        let region = s![block.lat.clone(), block.lon.clone()];
                        values.slice_mut(region).assign(part.values());
                        counts.slice_mut(region).assign(part.counts());
                    }
                }
                out
            })
            .collect();

        Ok(Computed {
            value: Climatology::from_fields(grouping, fields),
            report,
        })
    }

    /// Per-cell trends of the transformed field against `covariate`
    pub fn trend(&self, covariate: &Covariate) -> RClimResult<Computed<TrendField>> {
        let min_samples = self.min_samples;
        let (done, report) = self.evaluate(|field| {
            trend_with_min_samples(&field, &covariate.values(field.time()), min_samples)
        })?;

        let units = done
            .first()
            .map(|(_, t)| t.units().to_string())
            .unwrap_or_else(|| self.source.units().to_string());
        let mut out = TrendField::undefined(self.source.grid().clone(), &units);
        for (block, part) in &done {
            out.assign_block(block.lat.clone(), block.lon.clone(), part);
        }
        Ok(Computed { value: out, report })
    }

    /// Area-weighted global mean of the transformed field
    ///
    /// Partial sums of the blocks are merged per time step, so the result equals
    /// the mean of the whole field up to rounding.
    pub fn weighted_mean(&self) -> RClimResult<Computed<TimeSeries>> {
        let (done, report) = self.evaluate(|field| {
            let sums = weighted_partial_sums(&field, None);
            Ok((field.time().clone(), field.units().to_string(), sums))
        })?;

        let mut parts = done.into_iter().map(|(_, part)| part);
        let (time, units, mut total) = match parts.next() {
            Some(first) => first,
            None => (
                self.source.time().clone(),
                self.source.units().to_string(),
                vec![WeightedAccumulator::default(); self.source.time().len()],
            ),
        };
        for (_, _, sums) in parts {
            for (acc, part) in total.iter_mut().zip(sums.iter()) {
                acc.merge(part);
            }
        }
        let values = total.iter().map(|acc| acc.mean()).collect();
        Ok(Computed {
            value: TimeSeries::new(time, values, &units)?,
            report,
        })
    }

    /// Area-weighted mean of every named region, read in one pass over the blocks
    ///
    /// Fails before reading any block if a region contains no cell of the grid.
    pub fn region_means(
        &self,
        regions: &BTreeMap<String, RegionBounds>,
    ) -> RClimResult<Computed<BTreeMap<String, TimeSeries>>> {
        for (name, bounds) in regions {
            if !self.source.grid().region_mask(bounds).iter().any(|m| *m) {
                return Err(RClimError::Error(format!(
                    "Region '{name}' contains no cells of the grid"
                )));
            }
        }
        if regions.is_empty() {
            return Ok(Computed {
                value: BTreeMap::new(),
                report: BlockReport::default(),
            });
        }

        let (done, report) = self.evaluate(|field| {
            let sums: Vec<Vec<WeightedAccumulator>> = regions
                .values()
                .map(|bounds| {
                    let mask = field.grid().region_mask(bounds);
                    weighted_partial_sums(&field, Some(&mask))
                })
                .collect();
            Ok((field.time().clone(), field.units().to_string(), sums))
        })?;

        let (time, units) = match done.first() {
            Some((_, (time, units, _))) => (time.clone(), units.clone()),
            None => (self.source.time().clone(), self.source.units().to_string()),
        };
        let mut totals = vec![vec![WeightedAccumulator::default(); time.len()]; regions.len()];
        for (_, (_, _, sums)) in &done {
            for (total, part) in totals.iter_mut().zip(sums) {
                for (acc, p) in total.iter_mut().zip(part) {
                    acc.merge(p);
                }
            }
        }

        let value = regions
            .keys()
            .zip(totals)
            .map(|(name, total)| -> RClimResult<(String, TimeSeries)> {
                let values = total.iter().map(|acc| acc.mean()).collect();
                Ok((name.clone(), TimeSeries::new(time.clone(), values, &units)?))
            })
            .collect::<RClimResult<BTreeMap<_, _>>>()?;
        Ok(Computed { value, report })
    }

    /// Materialise the transformed field on the whole grid
    pub fn collect(&self) -> RClimResult<Computed<GridField>> {
        let (done, report) = self.evaluate(Ok)?;

        let grid = self.source.grid().clone();
        let Some((_, first)) = done.first() else {
            return Ok(Computed {
                value: GridField::new(
                    self.source.name(),
                    self.source.units(),
                    self.source.time().clone(),
                    grid.clone(),
                    Array3::from_elem(
                        (self.source.time().len(), grid.shape().0, grid.shape().1),
                        FloatValue::NAN,
                    ),
                )?,
                report,
            });
        };

        let (name, units, time) = (
            first.name().to_string(),
            first.units().to_string(),
            first.time().clone(),
        );
        let (nlat, nlon) = grid.shape();
        let mut values = Array3::from_elem((time.len(), nlat, nlon), FloatValue::NAN);
        for (block, part) in &done {
            values
                .slice_mut(s![.., block.lat.clone(), block.lon.clone()])
                .assign(part.values());
        }
        Ok(Computed {
            value: GridField::new(&name, &units, time, grid, values)?,
            report,
        })
    }
}
