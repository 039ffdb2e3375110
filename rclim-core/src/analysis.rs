//! Standard analysis of a field, driven by an [`AnalysisConfig`]
//!
//! [`Analysis::run`] evaluates the usual set of products over the analysis
//! period in blocks:
//!
//! - the climatology for the configured grouping (and of the baseline period, if any)
//! - the global area-weighted mean and the mean of every configured region
//! - per-cell trends of the annual means against the year, with the cells
//!   significant at the configured level

use crate::calendar::TimeGrouping;
use crate::climatology::Climatology;
use crate::config::AnalysisConfig;
use crate::errors::RClimResult;
use crate::plan::{BlockFailure, BlockPlan, BlockReport, Covariate, FieldSource};
use crate::timeseries::TimeSeries;
use crate::trend::TrendField;
use log::info;
use ndarray::Array2;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct Analysis {
    pub grouping: TimeGrouping,
    pub climatology: Climatology,
    pub baseline: Option<Climatology>,
    pub global_mean: TimeSeries,
    pub regional_means: BTreeMap<String, TimeSeries>,
    /// Trends of the annual means, per year
    pub trend: TrendField,
    /// Cells whose trend p-value is below the configured significance level
    pub significant: Array2<bool>,
    /// Blocks that failed in any of the evaluations, once each
    pub failed: Vec<BlockFailure>,
}

impl Analysis {
    pub fn run(source: &dyn FieldSource, config: &AnalysisConfig) -> RClimResult<Self> {
        config.validate()?;
        let mut failed: Vec<BlockFailure> = Vec::new();
        let mut record = |report: BlockReport| {
            for failure in report.failed {
                if !failed.iter().any(|f| f.block == failure.block) {
                    failed.push(failure);
                }
            }
        };

        let plan = BlockPlan::from_config(source, config);
        let climatology = plan.climatology(config.grouping)?;
        record(climatology.report);

        let baseline = match BlockPlan::baseline_from_config(source, config) {
            Some(baseline) => {
                let computed = baseline.climatology(config.grouping)?;
                record(computed.report);
                Some(computed.value)
            }
            None => None,
        };

        let global_mean = plan.weighted_mean()?;
        record(global_mean.report);
        let regional_means = plan.region_means(&config.regions)?;
        record(regional_means.report);

        let trend = plan.annual_mean().trend(&Covariate::Years)?;
        record(trend.report);
        let significant = trend.value.significant(config.significance);

        info!(
            "Analysed '{}': {} {:?} groups, {} regions, {} significant trend cells, {} failed blocks",
            source.name(),
            climatology.value.len(),
            config.grouping,
            regional_means.value.len(),
            significant.iter().filter(|s| **s).count(),
            failed.len()
        );

        Ok(Self {
            grouping: config.grouping,
            climatology: climatology.value,
            baseline,
            global_mean: global_mean.value,
            regional_means: regional_means.value,
            trend: trend.value,
            significant,
            failed,
        })
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}
