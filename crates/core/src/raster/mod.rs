//! Raster grid types and windowed access

mod element;
mod geotransform;
mod grid;
mod source;

pub(crate) use source::check_window;

pub use element::RasterElement;
pub use geotransform::GeoTransform;
pub use grid::Raster;
pub use source::RasterSource;
