//! # Cuenca Core
//!
//! Core types and I/O for the cuenca watershed delineation toolkit.
//!
//! This crate provides:
//! - `Raster<T>`: in-memory georeferenced grid (masks, output windows, fixtures)
//! - `RasterSource`: windowed, read-only access to rasters that may be far
//!   larger than memory
//! - `GeoTransform`: affine transformation for georeferencing
//! - `Crs`: coordinate reference system handling
//! - GeoTIFF I/O (GDAL when the `gdal` feature is enabled, a native `tiff`
//!   based path otherwise)
//! - A minimal vector feature model with GeoJSON output

pub mod crs;
pub mod error;
pub mod io;
pub mod raster;
pub mod vector;

pub use crs::Crs;
pub use error::{Error, Result};
pub use raster::{GeoTransform, Raster, RasterElement, RasterSource};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::Crs;
    pub use crate::error::{Error, Result};
    pub use crate::raster::{GeoTransform, Raster, RasterElement, RasterSource};
}
