//! Gridded climate statistics
//!
//! Re-exports the analysis crates of the workspace. Enable the `python` feature
//! to build the `rclim._lib` extension module.

pub use rclim_core as core;
pub use rclim_regrid as regrid;

#[cfg(feature = "python")]
mod python;
