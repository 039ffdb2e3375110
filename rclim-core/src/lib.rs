pub mod analysis;
pub mod averaging;
pub mod axis;
pub mod calendar;
pub mod climatology;
pub mod config;
pub mod field;
pub mod plan;
pub mod spatial;
pub mod timeseries;
pub mod trend;
pub mod units;
pub mod utils;

pub mod errors;
