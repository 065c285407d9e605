//! Streaming grid statistics

use cuenca_core::{RasterSource, Result};
use tracing::debug;

/// Block size used when the source reports no native blocking.
const FALLBACK_BLOCK: usize = 1024;

/// Maximum valid value in a grid, streamed block by block.
///
/// No-data and NaN cells are ignored; a grid with no valid cells reports 0.0.
/// Reads follow the source's native block shape, so the grid is never held
/// in memory at once. Diagnostic only; the delineation itself does not
/// depend on this value.
pub fn global_max(source: &dyn RasterSource) -> Result<f64> {
    let (block_h, block_w) = source
        .block_size()
        .unwrap_or((FALLBACK_BLOCK, FALLBACK_BLOCK));

    let height = source.height();
    let width = source.width();
    let mut max: Option<f64> = None;
    let mut blocks = 0usize;

    let mut row_off = 0;
    while row_off < height {
        let h = block_h.min(height - row_off);
        let mut col_off = 0;
        while col_off < width {
            let w = block_w.min(width - col_off);
            let block = source.read_window(col_off, row_off, w, h)?;
            for &value in block.iter() {
                if value.is_nan() || source.is_nodata(value) {
                    continue;
                }
                if max.map_or(true, |m| value > m) {
                    max = Some(value);
                }
            }
            blocks += 1;
            col_off += w;
        }
        row_off += h;
    }

    debug!(blocks, max = ?max, "streamed global maximum");
    Ok(max.unwrap_or(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cuenca_core::Raster;

    #[test]
    fn finds_maximum_ignoring_nodata() {
        let mut r: Raster<f64> = Raster::new(8, 8);
        r.set_nodata(Some(-9999.0));
        r.set(0, 0, -9999.0).unwrap();
        r.set(3, 4, 41.5).unwrap();
        r.set(7, 7, 12.0).unwrap();
        assert_eq!(global_max(&r).unwrap(), 41.5);
    }

    #[test]
    fn all_invalid_grid_reports_zero() {
        let mut r: Raster<f64> = Raster::new(4, 4);
        r.set_nodata(Some(0.0));
        assert_eq!(global_max(&r).unwrap(), 0.0);

        let mut nan: Raster<f64> = Raster::new(2, 2);
        for row in 0..2 {
            for col in 0..2 {
                nan.set(row, col, f64::NAN).unwrap();
            }
        }
        assert_eq!(global_max(&nan).unwrap(), 0.0);
    }

    #[test]
    fn negative_values_beat_the_zero_default() {
        let mut r: Raster<f64> = Raster::new(2, 2);
        for row in 0..2 {
            for col in 0..2 {
                r.set(row, col, -5.0).unwrap();
            }
        }
        assert_eq!(global_max(&r).unwrap(), -5.0);
    }
}
