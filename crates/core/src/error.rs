//! Error types for cuenca

use thiserror::Error;

/// Main error type for cuenca operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot open raster grid {path}: {reason}")]
    GridUnreadable { path: String, reason: String },

    #[error("cannot read the flow-direction tile containing the seed cell ({row}, {col})")]
    SeedUnreadable { row: usize, col: usize },

    #[error(
        "no drainage-network cell with accumulated area >= {threshold_km2} km2 \
         within {max_radius} cells of ({row}, {col})"
    )]
    NetworkNotFound {
        row: usize,
        col: usize,
        threshold_km2: f64,
        max_radius: usize,
    },

    #[error("basin mask vectorized to an empty geometry")]
    EmptyGeometry,

    #[error("invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("window out of bounds: offset ({col_off}, {row_off}) size {w}x{h} in raster of size {cols}x{rows}")]
    WindowOutOfBounds {
        col_off: usize,
        row_off: usize,
        w: usize,
        h: usize,
        rows: usize,
        cols: usize,
    },

    #[error("CRS mismatch: {0} vs {1}")]
    CrsMismatch(String, String),

    #[error("projection error: {0}")]
    Projection(String),

    #[error("unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("GDAL error: {0}")]
    #[cfg(feature = "gdal")]
    Gdal(String),

    #[error("{0}")]
    Other(String),
}

#[cfg(feature = "gdal")]
impl From<gdal::errors::GdalError> for Error {
    fn from(e: gdal::errors::GdalError) -> Self {
        Error::Gdal(e.to_string())
    }
}

/// Result type alias for cuenca operations
pub type Result<T> = std::result::Result<T, Error>;
