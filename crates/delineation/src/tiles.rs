//! LRU tile cache over a windowed raster source
//!
//! The traversal reads the flow-direction grid one fixed-size tile at a time;
//! this store keeps the most recently touched tiles resident and re-reads
//! evicted ones transparently. Tile geometry is resolved once at
//! construction from the source's native block shape.

use std::num::NonZeroUsize;

use cuenca_core::{RasterSource, Result};
use lru::LruCache;
use ndarray::Array2;

/// Tiles are never smaller than this in either dimension; striped files
/// report 1-row blocks that would make reads pathologically small.
pub const MIN_TILE_DIM: usize = 512;

/// Tile cache configuration
#[derive(Debug, Clone)]
pub struct TileStoreParams {
    /// Tile size used when the source reports no native block shape
    pub preferred_block: usize,
    /// Maximum number of resident tiles
    pub max_tiles: usize,
}

impl Default for TileStoreParams {
    fn default() -> Self {
        Self {
            preferred_block: 1024,
            max_tiles: 64,
        }
    }
}

/// Bounded cache of raster tiles with least-recently-used eviction.
pub struct TileStore<'a> {
    source: &'a dyn RasterSource,
    tile_h: usize,
    tile_w: usize,
    tiles_down: usize,
    tiles_across: usize,
    cache: LruCache<(usize, usize), Array2<f64>>,
}

impl<'a> TileStore<'a> {
    /// Create a store over `source`, resolving tile geometry from its native
    /// block shape (falling back to `preferred_block`, floored at
    /// [`MIN_TILE_DIM`]).
    pub fn new(source: &'a dyn RasterSource, params: &TileStoreParams) -> Self {
        let (block_h, block_w) = source
            .block_size()
            .unwrap_or((params.preferred_block, params.preferred_block));
        let tile_h = block_h.max(MIN_TILE_DIM);
        let tile_w = block_w.max(MIN_TILE_DIM);

        let capacity = NonZeroUsize::new(params.max_tiles.max(1)).unwrap();
        Self {
            source,
            tile_h,
            tile_w,
            tiles_down: source.height().div_ceil(tile_h),
            tiles_across: source.width().div_ceil(tile_w),
            cache: LruCache::new(capacity),
        }
    }

    /// Tile height in cells
    pub fn tile_height(&self) -> usize {
        self.tile_h
    }

    /// Tile width in cells
    pub fn tile_width(&self) -> usize {
        self.tile_w
    }

    /// Number of tile rows covering the grid
    pub fn tiles_down(&self) -> usize {
        self.tiles_down
    }

    /// Number of tile columns covering the grid
    pub fn tiles_across(&self) -> usize {
        self.tiles_across
    }

    /// Grid height in cells
    pub fn grid_height(&self) -> usize {
        self.source.height()
    }

    /// Grid width in cells
    pub fn grid_width(&self) -> usize {
        self.source.width()
    }

    /// Number of currently resident tiles
    pub fn resident(&self) -> usize {
        self.cache.len()
    }

    /// Whether `value` is the source's nodata sentinel
    pub fn is_nodata(&self, value: f64) -> bool {
        self.source.is_nodata(value)
    }

    /// Map a grid cell to (tile_row, tile_col, local_row, local_col).
    pub fn tile_index(&self, row: usize, col: usize) -> (usize, usize, usize, usize) {
        let tr = row / self.tile_h;
        let tc = col / self.tile_w;
        (tr, tc, row - tr * self.tile_h, col - tc * self.tile_w)
    }

    /// Fetch a tile, reading it from the source on a miss. Returns `None`
    /// for tile coordinates entirely outside the grid. Edge tiles are
    /// clamped to the grid and therefore smaller than the nominal size.
    pub fn get(&mut self, tr: usize, tc: usize) -> Result<Option<&Array2<f64>>> {
        if tr >= self.tiles_down || tc >= self.tiles_across {
            return Ok(None);
        }
        let key = (tr, tc);
        if !self.cache.contains(&key) {
            let tile = self.read_tile(tr, tc)?;
            self.cache.put(key, tile);
        }
        Ok(self.cache.get(&key).map(|t| &*t))
    }

    fn read_tile(&self, tr: usize, tc: usize) -> Result<Array2<f64>> {
        let row_off = tr * self.tile_h;
        let col_off = tc * self.tile_w;
        let h = self.tile_h.min(self.source.height() - row_off);
        let w = self.tile_w.min(self.source.width() - col_off);
        self.source.read_window(col_off, row_off, w, h)
    }
}
