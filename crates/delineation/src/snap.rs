//! Outlet snapping onto the drainage network
//!
//! Hydrological analysis needs the outlet to sit exactly on a mapped
//! channel. The snapper searches expanding square windows of the
//! flow-accumulation grid around the requested point for the nearest cell
//! whose accumulated area meets the threshold.

use cuenca_core::{Error, RasterSource, Result};
use serde::Serialize;
use tracing::debug;

/// Search configuration
#[derive(Debug, Clone)]
pub struct SnapParams {
    /// Minimum accumulated drainage area, km²
    pub threshold_km2: f64,
    /// First search window half-size, cells
    pub initial_radius: usize,
    /// Hard cap on the search half-size, cells
    pub max_radius: usize,
}

impl Default for SnapParams {
    fn default() -> Self {
        Self {
            threshold_km2: 1.0,
            initial_radius: 256,
            max_radius: 16384,
        }
    }
}

/// The network point nearest the requested outlet.
#[derive(Debug, Clone, Serialize)]
pub struct SnapResult {
    /// Snapped world coordinates (cell center)
    pub x: f64,
    pub y: f64,
    /// Snapped cell in the accumulation grid
    pub row: usize,
    pub col: usize,
    /// Accumulated area at the snapped cell, km²
    pub accum_km2: f64,
}

/// Snap world point (x, y) onto the drainage network of `accum`.
///
/// Windows of radius `initial_radius` cells double until a qualifying cell
/// appears or the radius would exceed the grid span or `max_radius`. Among
/// qualifying cells the one with minimum squared grid distance wins; exact
/// ties keep the first cell in array scan order (equidistant candidates are
/// geometrically symmetric, so the choice does not affect correctness).
pub fn snap_to_network(
    accum: &dyn RasterSource,
    x: f64,
    y: f64,
    km2_per_cell: f64,
    params: &SnapParams,
) -> Result<SnapResult> {
    let height = accum.height();
    let width = accum.width();
    let transform = accum.transform();

    let (row0, col0) = transform.geo_to_cell(x, y);
    let row0 = row0.clamp(0, height as isize - 1) as usize;
    let col0 = col0.clamp(0, width as isize - 1) as usize;

    // The first window is always read (clamped to the grid); doubling stops
    // once the radius exceeds the grid span or the configured cap.
    let bound = height.max(width).min(params.max_radius);
    let mut radius = params.initial_radius.max(1);

    loop {
        let rmin = row0.saturating_sub(radius);
        let rmax = (row0 + radius + 1).min(height);
        let cmin = col0.saturating_sub(radius);
        let cmax = (col0 + radius + 1).min(width);

        let window = accum.read_window(cmin, rmin, cmax - cmin, rmax - rmin)?;

        let mut best: Option<(usize, usize, u64)> = None;
        for ((wr, wc), &value) in window.indexed_iter() {
            if accum.is_nodata(value) || value * km2_per_cell < params.threshold_km2 {
                continue;
            }
            let row = rmin + wr;
            let col = cmin + wc;
            let dr = row as i64 - row0 as i64;
            let dc = col as i64 - col0 as i64;
            let d2 = (dr * dr + dc * dc) as u64;
            if best.map_or(true, |(_, _, b)| d2 < b) {
                best = Some((row, col, d2));
            }
        }

        if let Some((row, col, d2)) = best {
            let (sx, sy) = transform.pixel_to_geo(col, row);
            let accum_km2 = accum.read_cell(row, col)? * km2_per_cell;
            debug!(row, col, d2, accum_km2, radius, "snapped outlet to network");
            return Ok(SnapResult {
                x: sx,
                y: sy,
                row,
                col,
                accum_km2,
            });
        }

        radius *= 2;
        if radius > bound {
            break;
        }
        debug!(radius, "no qualifying cell, expanding search window");
    }

    Err(Error::NetworkNotFound {
        row: row0,
        col: col0,
        threshold_km2: params.threshold_km2,
        max_radius: params.max_radius,
    })
}
