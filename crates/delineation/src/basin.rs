//! Upstream basin delineation over a tiled D8 grid
//!
//! Starting from the outlet cell, a breadth-first search walks against the
//! flow directions: a neighbor joins the basin when its D8 code points at
//! the cell being expanded. Visited and membership state live in per-tile
//! bitmaps so memory tracks the tiles the basin actually touches rather
//! than the whole grid.

use std::collections::VecDeque;

use ndarray::Array2;
use tracing::debug;

use cuenca_core::{Error, Result};

use crate::d8::{code_of, UPSTREAM_NEIGHBORS};
use crate::tiles::TileStore;

const PROGRESS_INTERVAL: u64 = 500_000;

/// Minimum bounding rectangle of the basin, inclusive cell indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mbr {
    pub min_row: usize,
    pub max_row: usize,
    pub min_col: usize,
    pub max_col: usize,
}

impl Mbr {
    fn seed(row: usize, col: usize) -> Self {
        Self {
            min_row: row,
            max_row: row,
            min_col: col,
            max_col: col,
        }
    }

    fn grow(&mut self, row: usize, col: usize) {
        self.min_row = self.min_row.min(row);
        self.max_row = self.max_row.max(row);
        self.min_col = self.min_col.min(col);
        self.max_col = self.max_col.max(col);
    }

    pub fn height(&self) -> usize {
        self.max_row - self.min_row + 1
    }

    pub fn width(&self) -> usize {
        self.max_col - self.min_col + 1
    }
}

/// Dense membership mask over the basin's bounding rectangle.
///
/// `mask[(r, c)]` is 1 when grid cell `(mbr.min_row + r, mbr.min_col + c)`
/// belongs to the basin.
#[derive(Debug, Clone)]
pub struct BasinMask {
    pub mask: Array2<u8>,
    pub mbr: Mbr,
    /// Number of cells in the basin
    pub cell_count: u64,
}

impl BasinMask {
    pub fn contains(&self, row: usize, col: usize) -> bool {
        if row < self.mbr.min_row
            || row > self.mbr.max_row
            || col < self.mbr.min_col
            || col > self.mbr.max_col
        {
            return false;
        }
        self.mask[(row - self.mbr.min_row, col - self.mbr.min_col)] == 1
    }
}

/// Visited and membership bits for one tile.
struct TileFlags {
    visited: Vec<u64>,
    in_basin: Vec<u64>,
}

impl TileFlags {
    fn new(cells: usize) -> Self {
        let words = cells.div_ceil(64);
        Self {
            visited: vec![0; words],
            in_basin: vec![0; words],
        }
    }
}

/// Per-tile flag arena keyed by linear tile index.
///
/// Flags are never dropped during a run; a tile the search has touched
/// keeps its bitmaps even after the tile data is evicted from the LRU
/// cache, so re-reading a tile never re-expands its cells.
struct FlagArena {
    tiles: Vec<Option<Box<TileFlags>>>,
    tile_h: usize,
    tile_w: usize,
    tiles_across: usize,
}

impl FlagArena {
    fn new(store: &TileStore<'_>) -> Self {
        Self {
            tiles: (0..store.tiles_down() * store.tiles_across())
                .map(|_| None)
                .collect(),
            tile_h: store.tile_height(),
            tile_w: store.tile_width(),
            tiles_across: store.tiles_across(),
        }
    }

    fn locate(&self, row: usize, col: usize) -> (usize, usize) {
        let key = (row / self.tile_h) * self.tiles_across + col / self.tile_w;
        let bit = (row % self.tile_h) * self.tile_w + col % self.tile_w;
        (key, bit)
    }

    fn flags(&mut self, key: usize) -> &mut TileFlags {
        self.tiles[key].get_or_insert_with(|| Box::new(TileFlags::new(self.tile_h * self.tile_w)))
    }

    fn visited(&self, row: usize, col: usize) -> bool {
        let (key, bit) = self.locate(row, col);
        match &self.tiles[key] {
            Some(f) => f.visited[bit / 64] >> (bit % 64) & 1 == 1,
            None => false,
        }
    }

    fn mark_visited(&mut self, row: usize, col: usize) {
        let (key, bit) = self.locate(row, col);
        self.flags(key).visited[bit / 64] |= 1 << (bit % 64);
    }

    fn mark_in_basin(&mut self, row: usize, col: usize) {
        let (key, bit) = self.locate(row, col);
        self.flags(key).in_basin[bit / 64] |= 1 << (bit % 64);
    }
}

/// Delineate the basin draining through cell `(seed_row, seed_col)`.
///
/// The returned mask covers exactly the basin's bounding rectangle. The seed
/// always belongs to the basin, even when its own cell holds nodata; the
/// outlet may sit on an accumulation channel that falls outside the valid
/// flow-direction margin. Every other cell holding nodata or an unrecognized
/// direction code never joins; the search simply does not cross it.
pub fn delineate(
    store: &mut TileStore<'_>,
    seed_row: usize,
    seed_col: usize,
) -> Result<BasinMask> {
    let height = store.grid_height();
    let width = store.grid_width();
    if seed_row >= height || seed_col >= width {
        return Err(Error::SeedUnreadable {
            row: seed_row,
            col: seed_col,
        });
    }
    // Force the seed tile in before the traversal starts.
    let (seed_tr, seed_tc, _, _) = store.tile_index(seed_row, seed_col);
    store.get(seed_tr, seed_tc).map_err(|_| Error::SeedUnreadable {
        row: seed_row,
        col: seed_col,
    })?;

    let mut arena = FlagArena::new(store);
    let mut mbr = Mbr::seed(seed_row, seed_col);
    let mut cell_count: u64 = 0;

    let mut queue: VecDeque<(usize, usize)> = VecDeque::new();
    arena.mark_visited(seed_row, seed_col);
    arena.mark_in_basin(seed_row, seed_col);
    queue.push_back((seed_row, seed_col));
    cell_count += 1;

    while let Some((row, col)) = queue.pop_front() {
        for &(dr, dc, code_toward_here) in UPSTREAM_NEIGHBORS.iter() {
            let nr = row as isize + dr;
            let nc = col as isize + dc;
            if nr < 0 || nc < 0 || nr as usize >= height || nc as usize >= width {
                continue;
            }
            let (nr, nc) = (nr as usize, nc as usize);
            if arena.visited(nr, nc) {
                continue;
            }
            arena.mark_visited(nr, nc);
            if read_code(store, nr, nc)? == Some(code_toward_here) {
                arena.mark_in_basin(nr, nc);
                mbr.grow(nr, nc);
                cell_count += 1;
                queue.push_back((nr, nc));
                if cell_count % PROGRESS_INTERVAL == 0 {
                    debug!(
                        cells = cell_count,
                        frontier = queue.len(),
                        resident_tiles = store.resident(),
                        "delineation in progress"
                    );
                }
            }
        }
    }

    debug!(cells = cell_count, "delineation complete");

    let mut mask = Array2::<u8>::zeros((mbr.height(), mbr.width()));
    for (key, flags) in arena.tiles.iter().enumerate() {
        let Some(flags) = flags else { continue };
        let base_row = key / arena.tiles_across * arena.tile_h;
        let base_col = key % arena.tiles_across * arena.tile_w;
        for (word_idx, &word) in flags.in_basin.iter().enumerate() {
            if word == 0 {
                continue;
            }
            for b in 0..64 {
                if word >> b & 1 == 0 {
                    continue;
                }
                let bit = word_idx * 64 + b;
                let row = base_row + bit / arena.tile_w;
                let col = base_col + bit % arena.tile_w;
                mask[(row - mbr.min_row, col - mbr.min_col)] = 1;
            }
        }
    }

    Ok(BasinMask {
        mask,
        mbr,
        cell_count,
    })
}

fn read_code(store: &mut TileStore<'_>, row: usize, col: usize) -> Result<Option<u16>> {
    let tr = row / store.tile_height();
    let tc = col / store.tile_width();
    let lr = row % store.tile_height();
    let lc = col % store.tile_width();
    let Some(tile) = store.get(tr, tc)? else {
        return Ok(None);
    };
    let Some(&value) = tile.get((lr, lc)) else {
        return Ok(None);
    };
    if store.is_nodata(value) {
        return Ok(None);
    }
    Ok(code_of(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::d8::downstream_offset;
    use crate::tiles::TileStoreParams;
    use cuenca_core::{GeoTransform, Raster};

    /// 10x10 flow grid: column 5 flows south (4), everything else flows
    /// away from the channel (west of it flows west, east of it east).
    fn channel_flow() -> Raster<f64> {
        let mut r = Raster::new(10, 10);
        r.set_transform(GeoTransform::new(0.0, 10.0, 1.0, -1.0));
        for row in 0..10 {
            for col in 0..10 {
                let code = match col {
                    5 => 4.0,
                    c if c < 5 => 16.0,
                    _ => 1.0,
                };
                r.set(row, col, code).unwrap();
            }
        }
        r
    }

    fn store(grid: &Raster<f64>) -> TileStore<'_> {
        TileStore::new(grid, &TileStoreParams::default())
    }

    #[test]
    fn straight_channel_collects_every_channel_cell() {
        let grid = channel_flow();
        let mut store = store(&grid);
        let basin = delineate(&mut store, 9, 5).unwrap();

        assert_eq!(basin.cell_count, 10);
        assert_eq!(
            basin.mbr,
            Mbr {
                min_row: 0,
                max_row: 9,
                min_col: 5,
                max_col: 5
            }
        );
        for row in 0..10 {
            assert!(basin.contains(row, 5));
            assert!(!basin.contains(row, 6));
        }
    }

    #[test]
    fn every_basin_cell_drains_to_the_seed() {
        let grid = channel_flow();
        let mut store = store(&grid);
        let basin = delineate(&mut store, 9, 5).unwrap();

        for row in basin.mbr.min_row..=basin.mbr.max_row {
            for col in basin.mbr.min_col..=basin.mbr.max_col {
                if !basin.contains(row, col) {
                    continue;
                }
                // Walk downstream until the seed is reached.
                let (mut r, mut c) = (row, col);
                for _ in 0..200 {
                    if (r, c) == (9, 5) {
                        break;
                    }
                    let code = code_of(grid.get(r, c).unwrap()).unwrap();
                    let (dr, dc) = downstream_offset(code).unwrap();
                    r = (r as isize + dr) as usize;
                    c = (c as isize + dc) as usize;
                }
                assert_eq!((r, c), (9, 5), "cell ({row}, {col}) does not reach the seed");
            }
        }
    }

    #[test]
    fn seed_on_nodata_still_delineates_upstream() {
        let mut grid = channel_flow();
        grid.set_nodata(Some(255.0));
        grid.set(4, 5, 255.0).unwrap();
        let mut store = store(&grid);
        let basin = delineate(&mut store, 4, 5).unwrap();
        // The seed plus the four channel cells above it.
        assert_eq!(basin.cell_count, 5);
        assert!(basin.contains(4, 5));
        assert!(basin.contains(0, 5));
        assert!(!basin.contains(5, 5));
    }

    #[test]
    fn seed_outside_grid_is_rejected() {
        let grid = channel_flow();
        let mut store = store(&grid);
        assert!(matches!(
            delineate(&mut store, 42, 0).unwrap_err(),
            Error::SeedUnreadable { .. }
        ));
    }

    #[test]
    fn corner_seed_does_not_walk_off_the_grid() {
        let mut grid = Raster::new(4, 4);
        grid.set_transform(GeoTransform::new(0.0, 4.0, 1.0, -1.0));
        // Row 0 flows west and column 0 flows north, both into (0, 0).
        // The interior flows south, off the bottom edge.
        for row in 0..4 {
            for col in 0..4 {
                let code = if row == 0 {
                    16.0
                } else if col == 0 {
                    64.0
                } else {
                    4.0
                };
                grid.set(row, col, code).unwrap();
            }
        }
        let mut store = store(&grid);
        let basin = delineate(&mut store, 0, 0).unwrap();
        assert_eq!(basin.cell_count, 7); // row 0 plus column 0
        assert!(basin.contains(0, 3));
        assert!(basin.contains(3, 0));
        assert!(!basin.contains(3, 3));
    }

    #[test]
    fn nodata_cells_break_connectivity() {
        let mut grid = channel_flow();
        grid.set_nodata(Some(255.0));
        grid.set(5, 5, 255.0).unwrap();
        let mut store = store(&grid);
        let basin = delineate(&mut store, 9, 5).unwrap();
        // Only the four channel cells below the gap remain reachable.
        assert_eq!(basin.cell_count, 4);
        assert!(!basin.contains(5, 5));
        assert!(!basin.contains(0, 5));
    }
}
