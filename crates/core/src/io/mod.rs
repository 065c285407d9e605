//! I/O for reading and writing geospatial rasters
//!
//! Two backends, selected at compile time like the rest of the crate's
//! feature split: GDAL (`gdal` feature) for full GeoTIFF support, and a
//! native path built on the `tiff` crate. Both serve windowed reads through
//! [`crate::raster::RasterSource`], so the delineation engine never loads a
//! whole grid.

#[cfg(feature = "gdal")]
mod gdal_io;
mod native;

use std::path::Path;

use crate::error::Result;
use crate::raster::RasterSource;

#[cfg(feature = "gdal")]
pub use gdal_io::{write_geotiff_u32, GdalSource};
pub use native::NativeSource;
#[cfg(not(feature = "gdal"))]
pub use native::write_geotiff_u32;

/// Options for writing GeoTIFF files.
///
/// The native writer honors neither compression nor tiling; it exists so the
/// toolkit works without a system GDAL, at the cost of plain uncompressed
/// output.
#[derive(Debug, Clone)]
pub struct GeoTiffOptions {
    /// Compression type: "LZW", "DEFLATE", "NONE"
    pub compression: String,
    /// Tile size for tiled TIFFs (0 for strips)
    pub tile_size: usize,
}

impl Default for GeoTiffOptions {
    fn default() -> Self {
        Self {
            compression: "LZW".to_string(),
            tile_size: 256,
        }
    }
}

/// Open a raster file for windowed reading with the configured backend.
pub fn open_raster<P: AsRef<Path>>(path: P) -> Result<Box<dyn RasterSource>> {
    #[cfg(feature = "gdal")]
    {
        Ok(Box::new(GdalSource::open(path)?))
    }
    #[cfg(not(feature = "gdal"))]
    {
        Ok(Box::new(NativeSource::open(path)?))
    }
}
