//! Regridding of latitude/longitude fields
//!
//! Fields from different sources (a reanalysis and a climate model, say) rarely
//! share a grid, and every cell-wise comparison in `rclim-core` rejects
//! incompatible grids. This crate resamples a [`GridField`] onto another
//! regular grid with one of three [`RegridMethod`]s.
//!
//! Longitude is periodic when the source longitude axis is global: target
//! points in the seam gap interpolate between the last and the first source
//! column. For a regional source, points outside its longitude span are missing.
//!
//! # Examples
//!
//! ```rust
//! use rclim_core::axis::TimeAxis;
//! use rclim_core::field::GridField;
//! use rclim_core::spatial::LatLonGrid;
//! use rclim_regrid::{regrid, RegridMethod};
//!
//! let field = GridField::filled(
//!     "tas",
//!     "K",
//!     TimeAxis::monthly(2000, 1, 3).unwrap(),
//!     LatLonGrid::regular(-89.0, 2.0, 90, 1.0, 2.0, 180).unwrap(),
//!     287.0,
//! );
//! let target = LatLonGrid::regular(-88.0, 4.0, 45, 2.0, 4.0, 90).unwrap();
//! let coarse = regrid(&field, &target, RegridMethod::Conservative).unwrap();
//! assert_eq!(coarse.shape(), (3, 45, 90));
//! assert!(coarse.values().iter().all(|v| (v - 287.0).abs() < 1e-9));
//! ```

mod method;
mod regridder;
mod weights;

pub use method::RegridMethod;
pub use regridder::Regridder;

use rclim_core::errors::RClimResult;
use rclim_core::field::GridField;
use rclim_core::spatial::LatLonGrid;

/// Regrid a field onto `target`
///
/// Builds a [`Regridder`] for this one field; reuse a [`Regridder`] when
/// regridding several fields between the same grids.
pub fn regrid(field: &GridField, target: &LatLonGrid, method: RegridMethod) -> RClimResult<GridField> {
    Regridder::new(field.grid(), target, method).regrid(field)
}
