//! # Cuenca Delineation
//!
//! Streaming watershed delineation from co-registered D8 flow-direction and
//! flow-accumulation grids:
//!
//! - `tiles`: LRU-cached tile reads over a windowed raster source
//! - `pixel_area`: km² per cell for geographic and projected grids
//! - `stats`: streaming grid statistics (global maximum)
//! - `snap`: expanding-window snap of an outlet point onto the drainage network
//! - `basin`: upstream breadth-first traversal producing the basin mask
//! - `vectorize`: basin mask to polygon rings
//! - `export`: clipped/scaled accumulation raster + basin polygon artifacts
//! - `pipeline`: the end-to-end delineation run
//!
//! Grids are only ever touched through bounded windows, so inputs may be far
//! larger than available memory.

pub mod basin;
pub mod d8;
pub mod export;
pub mod pipeline;
pub mod pixel_area;
pub mod snap;
pub mod stats;
pub mod tiles;
pub mod vectorize;

pub use basin::{delineate, BasinMask, Mbr};
pub use export::{export, BasinAttributes, ExportParams, OutputArtifacts};
pub use pipeline::{
    delineate_files, delineate_watershed, DelineationParams, RunSummary, SnapPolicy,
};
pub use pixel_area::pixel_area_km2;
pub use snap::{snap_to_network, SnapParams, SnapResult};
pub use stats::global_max;
pub use vectorize::mask_to_polygons;
pub use tiles::{TileStore, TileStoreParams};
