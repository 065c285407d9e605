//! End-to-end watershed delineation
//!
//! Orchestrates a full run: estimate per-cell areas, snap the outlet onto
//! the drainage network, trace the basin upstream, and write the vector and
//! raster artifacts into the run's output directory.

use std::fs;
use std::path::Path;

use tracing::{info, warn};

use cuenca_core::{crs, io, Error, RasterSource, Result};

use crate::basin::delineate;
use crate::export::{export, BasinAttributes, ExportParams, OutputArtifacts};
use crate::pixel_area::pixel_area_km2;
use crate::snap::{snap_to_network, SnapParams, SnapResult};
use crate::stats::global_max;
use crate::tiles::{TileStore, TileStoreParams};

const VECTOR_DIR: &str = "01-Watershed";
const RASTER_DIR: &str = "02-Rasters";
const VECTOR_FILE: &str = "Watershed.geojson";
const RASTER_FILE: &str = "AccumArea.tif";

/// What to do when no network cell meets the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SnapPolicy {
    /// Fail the run with `NetworkNotFound`
    #[default]
    Strict,
    /// Delineate from the requested point unchanged
    AcceptOriginal,
}

/// Parameters of a delineation run
#[derive(Debug, Clone, Default)]
pub struct DelineationParams {
    pub snap: SnapParams,
    pub snap_policy: SnapPolicy,
    pub tiles: TileStoreParams,
    pub export: ExportParams,
}

/// Outcome of a completed run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub snap: SnapResult,
    pub area_km2: f64,
    pub area_cells: u64,
    /// Largest valid value in the accumulation grid, for reporting
    pub accum_max: f64,
    pub artifacts: OutputArtifacts,
}

/// Delineate the watershed draining to (lat, lon) and write its artifacts
/// under `out_dir`.
///
/// The outlet is given in EPSG:4326; grids in a projected CRS have it
/// transformed into grid coordinates first. Outputs land in
/// `out_dir/01-Watershed/` (GeoJSON) and `out_dir/02-Rasters/` (GeoTIFF).
pub fn delineate_watershed(
    flow_dir: &dyn RasterSource,
    accum: &dyn RasterSource,
    lat: f64,
    lon: f64,
    params: &DelineationParams,
    out_dir: &Path,
) -> Result<RunSummary> {
    let km2_per_flow_cell = pixel_area_km2(flow_dir);
    let km2_per_accum_cell = pixel_area_km2(accum);
    let accum_max = global_max(accum)?;
    info!(
        km2_per_flow_cell,
        km2_per_accum_cell,
        accum_max,
        max_area_km2 = accum_max * km2_per_accum_cell,
        lat,
        lon,
        "starting delineation"
    );

    let (orig_x, orig_y) = to_grid_coords(accum.crs().as_ref(), lat, lon)?;
    let snap = match snap_to_network(accum, orig_x, orig_y, km2_per_accum_cell, &params.snap) {
        Ok(snap) => snap,
        Err(Error::NetworkNotFound { .. }) if params.snap_policy == SnapPolicy::AcceptOriginal => {
            warn!(lat, lon, "no network cell met the threshold, keeping the requested outlet");
            unsnapped_result(accum, orig_x, orig_y, km2_per_accum_cell)?
        }
        Err(e) => return Err(e),
    };
    info!(row = snap.row, col = snap.col, accum_km2 = snap.accum_km2, "outlet snapped");

    // The snap lives in accumulation grid space; the traversal runs on the
    // flow-direction grid, which may differ in resolution and extent.
    let (seed_row, seed_col) = flow_dir.transform().geo_to_cell(snap.x, snap.y);
    if seed_row < 0
        || seed_col < 0
        || seed_row as usize >= flow_dir.height()
        || seed_col as usize >= flow_dir.width()
    {
        return Err(Error::SeedUnreadable {
            row: seed_row.max(0) as usize,
            col: seed_col.max(0) as usize,
        });
    }

    let mut store = TileStore::new(flow_dir, &params.tiles);
    let basin = delineate(&mut store, seed_row as usize, seed_col as usize)?;
    let area_km2 = basin.cell_count as f64 * km2_per_flow_cell;
    info!(cells = basin.cell_count, area_km2, "basin traced");

    let (lon_snap, lat_snap) = to_wgs84(accum.crs().as_ref(), snap.x, snap.y)?;
    let attrs = BasinAttributes {
        area_km2,
        area_cells: basin.cell_count,
        lat_orig: lat,
        lon_orig: lon,
        lat_snap,
        lon_snap,
        threshold_km2: params.snap.threshold_km2,
        accum_km2: snap.accum_km2,
    };

    let vector_dir = out_dir.join(VECTOR_DIR);
    let raster_dir = out_dir.join(RASTER_DIR);
    fs::create_dir_all(&vector_dir)?;
    fs::create_dir_all(&raster_dir)?;
    let vector_path = vector_dir.join(VECTOR_FILE);
    let raster_path = raster_dir.join(RASTER_FILE);

    let artifacts = export(
        flow_dir,
        accum,
        &basin,
        km2_per_accum_cell,
        &attrs,
        &params.export,
        &vector_path,
        &raster_path,
    )?;

    Ok(RunSummary {
        snap,
        area_km2,
        area_cells: basin.cell_count,
        accum_max,
        artifacts,
    })
}

/// Open both grids from disk and run [`delineate_watershed`].
pub fn delineate_files(
    flow_dir_path: &Path,
    accum_path: &Path,
    lat: f64,
    lon: f64,
    params: &DelineationParams,
    out_dir: &Path,
) -> Result<RunSummary> {
    let flow_dir = io::open_raster(flow_dir_path)?;
    let accum = io::open_raster(accum_path)?;
    delineate_watershed(flow_dir.as_ref(), accum.as_ref(), lat, lon, params, out_dir)
}

fn to_grid_coords(grid_crs: Option<&cuenca_core::Crs>, lat: f64, lon: f64) -> Result<(f64, f64)> {
    let mut xs = [lon];
    let mut ys = [lat];
    crs::reproject_from_wgs84(grid_crs, &mut xs, &mut ys)?;
    Ok((xs[0], ys[0]))
}

fn to_wgs84(grid_crs: Option<&cuenca_core::Crs>, x: f64, y: f64) -> Result<(f64, f64)> {
    let mut xs = [x];
    let mut ys = [y];
    crs::reproject_to_wgs84(grid_crs, &mut xs, &mut ys)?;
    Ok((xs[0], ys[0]))
}

fn unsnapped_result(
    accum: &dyn RasterSource,
    x: f64,
    y: f64,
    km2_per_cell: f64,
) -> Result<SnapResult> {
    let (row, col) = accum.transform().geo_to_cell(x, y);
    if row < 0 || col < 0 || row as usize >= accum.height() || col as usize >= accum.width() {
        return Err(Error::SeedUnreadable {
            row: row.max(0) as usize,
            col: col.max(0) as usize,
        });
    }
    let (row, col) = (row as usize, col as usize);
    let value = accum.read_cell(row, col)?;
    let accum_km2 = if accum.is_nodata(value) {
        0.0
    } else {
        value * km2_per_cell
    };
    // Report the center of the cell the request landed in, the same
    // coordinates snapping onto that cell would have produced.
    let (x, y) = accum.transform().pixel_to_geo(col, row);
    Ok(SnapResult {
        x,
        y,
        row,
        col,
        accum_km2,
    })
}

