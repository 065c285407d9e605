//! Windowed, read-only raster access

use crate::crs::Crs;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster};
use ndarray::{s, Array2};

/// Read-only access to a raster by rectangular window.
///
/// This is the seam between the delineation engine and storage: the engine
/// never asks for more than one window at a time, so implementations can back
/// a grid far larger than memory. Cell values are surfaced as `f64`, which
/// holds D8 direction codes and upstream cell counts exactly.
pub trait RasterSource {
    /// Grid width in cells
    fn width(&self) -> usize;

    /// Grid height in cells
    fn height(&self) -> usize;

    /// Affine cell-to-world transform
    fn transform(&self) -> GeoTransform;

    /// Coordinate reference system, if recorded
    fn crs(&self) -> Option<Crs>;

    /// No-data value, if recorded
    fn nodata(&self) -> Option<f64>;

    /// Native block shape as (height, width), if the backing store is
    /// tiled or striped. `None` means the store has no natural blocking.
    fn block_size(&self) -> Option<(usize, usize)>;

    /// Read a rectangular window. The window must lie fully inside the grid
    /// and have non-zero size; callers clamp before asking.
    fn read_window(&self, col_off: usize, row_off: usize, w: usize, h: usize)
        -> Result<Array2<f64>>;

    /// Read a single cell
    fn read_cell(&self, row: usize, col: usize) -> Result<f64> {
        let win = self.read_window(col, row, 1, 1)?;
        Ok(win[(0, 0)])
    }

    /// World bounds (min_x, min_y, max_x, max_y)
    fn bounds(&self) -> (f64, f64, f64, f64) {
        self.transform().bounds(self.width(), self.height())
    }

    /// Whether a value should be treated as missing
    fn is_nodata(&self, value: f64) -> bool {
        if value.is_nan() {
            return true;
        }
        match self.nodata() {
            Some(nd) => value == nd,
            None => false,
        }
    }
}

/// Helper shared by implementations: reject windows that leave the grid.
pub(crate) fn check_window(
    cols: usize,
    rows: usize,
    col_off: usize,
    row_off: usize,
    w: usize,
    h: usize,
) -> Result<()> {
    if w == 0 || h == 0 || col_off + w > cols || row_off + h > rows {
        return Err(Error::WindowOutOfBounds {
            col_off,
            row_off,
            w,
            h,
            rows,
            cols,
        });
    }
    Ok(())
}

/// In-memory rasters serve windows by slicing; used by tests and by the
/// native I/O fallback for small grids.
impl RasterSource for Raster<f64> {
    fn width(&self) -> usize {
        self.cols()
    }

    fn height(&self) -> usize {
        self.rows()
    }

    fn transform(&self) -> GeoTransform {
        *Raster::transform(self)
    }

    fn crs(&self) -> Option<Crs> {
        Raster::crs(self).cloned()
    }

    fn nodata(&self) -> Option<f64> {
        Raster::nodata(self)
    }

    fn block_size(&self) -> Option<(usize, usize)> {
        None
    }

    fn read_window(
        &self,
        col_off: usize,
        row_off: usize,
        w: usize,
        h: usize,
    ) -> Result<Array2<f64>> {
        check_window(self.cols(), self.rows(), col_off, row_off, w, h)?;
        Ok(self
            .data()
            .slice(s![row_off..row_off + h, col_off..col_off + w])
            .to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Raster<f64> {
        let mut r = Raster::new(4, 5);
        for row in 0..4 {
            for col in 0..5 {
                r.set(row, col, (row * 5 + col) as f64).unwrap();
            }
        }
        r
    }

    #[test]
    fn window_reads_slice() {
        let r = sample();
        let win = r.read_window(1, 2, 3, 2).unwrap();
        assert_eq!(win.dim(), (2, 3));
        assert_eq!(win[(0, 0)], 11.0);
        assert_eq!(win[(1, 2)], 18.0);
    }

    #[test]
    fn window_out_of_bounds_is_rejected() {
        let r = sample();
        assert!(r.read_window(3, 0, 3, 1).is_err());
        assert!(r.read_window(0, 0, 0, 1).is_err());
    }

    #[test]
    fn read_cell_matches_get() {
        let r = sample();
        assert_eq!(r.read_cell(2, 3).unwrap(), 13.0);
    }
}
