//! Raster mask to polygon conversion
//!
//! Traces the boundary edges of a binary mask into closed rings, then
//! assembles exterior rings and their holes into polygons in world
//! coordinates. Cells are squares; diagonal adjacency does not merge
//! components, matching the 4-connected boundary of the D8 basin mask.

use std::collections::HashMap;

use geo::Contains;
use geo_types::{Coord, LineString, MultiPolygon, Point, Polygon};
use ndarray::Array2;

use cuenca_core::GeoTransform;

/// Trace `mask` (1 = inside) into a multipolygon in the world coordinates
/// of `transform`. Returns an empty multipolygon for an all-zero mask.
pub fn mask_to_polygons(mask: &Array2<u8>, transform: &GeoTransform) -> MultiPolygon<f64> {
    let rings = trace_rings(mask);
    if rings.is_empty() {
        return MultiPolygon(vec![]);
    }

    let mut exteriors: Vec<Polygon<f64>> = Vec::new();
    let mut holes: Vec<LineString<f64>> = Vec::new();

    for ring in rings {
        let coords: Vec<Coord<f64>> = ring
            .iter()
            .map(|&(col, row)| {
                let (x, y) = transform.pixel_to_geo_corner(col, row);
                Coord { x, y }
            })
            .collect();
        let ls = LineString::from(coords);
        // Grid-space shoelace sign distinguishes exteriors from holes
        // independently of the transform's orientation.
        if grid_signed_area(&ring) > 0.0 {
            exteriors.push(Polygon::new(ls, vec![]));
        } else {
            holes.push(ls);
        }
    }

    for hole in holes {
        let probe = Point::from(hole.0[0]);
        if let Some(poly) = exteriors
            .iter_mut()
            .find(|poly| poly.contains(&probe) || poly.exterior().contains(&probe))
        {
            poly.interiors_push(hole);
        }
    }

    MultiPolygon(exteriors)
}

/// Directed boundary edge in grid corner coordinates, keyed by start corner.
///
/// Edges are oriented with the interior on the right in (col, row) space, so
/// following them yields clockwise exterior rings (positive shoelace area
/// with our y-down grid convention) and counterclockwise holes.
fn boundary_edges(mask: &Array2<u8>) -> HashMap<(usize, usize), Vec<(usize, usize)>> {
    let (rows, cols) = mask.dim();
    let inside = |r: isize, c: isize| -> bool {
        r >= 0 && c >= 0 && (r as usize) < rows && (c as usize) < cols && mask[(r as usize, c as usize)] == 1
    };

    let mut edges: HashMap<(usize, usize), Vec<(usize, usize)>> = HashMap::new();
    let mut add = |from: (usize, usize), to: (usize, usize)| {
        edges.entry(from).or_default().push(to);
    };

    for r in 0..rows {
        for c in 0..cols {
            if mask[(r, c)] != 1 {
                continue;
            }
            let (ri, ci) = (r as isize, c as isize);
            if !inside(ri - 1, ci) {
                add((c, r), (c + 1, r)); // top edge, eastward
            }
            if !inside(ri, ci + 1) {
                add((c + 1, r), (c + 1, r + 1)); // right edge, southward
            }
            if !inside(ri + 1, ci) {
                add((c + 1, r + 1), (c, r + 1)); // bottom edge, westward
            }
            if !inside(ri, ci - 1) {
                add((c, r + 1), (c, r)); // left edge, northward
            }
        }
    }
    edges
}

/// Stitch directed edges into closed rings of corner coordinates.
///
/// At corners where two basin cells touch only diagonally, two outgoing
/// edges share a start corner. Taking the sharpest right turn relative to
/// the incoming edge keeps the diagonal components in separate rings.
fn trace_rings(mask: &Array2<u8>) -> Vec<Vec<(usize, usize)>> {
    let mut edges = boundary_edges(mask);
    let mut rings = Vec::new();

    let mut starts: Vec<(usize, usize)> = edges.keys().copied().collect();
    starts.sort_unstable();

    for start in starts {
        loop {
            let Some(first) = edges.get_mut(&start).and_then(|v| v.pop()) else {
                break;
            };
            let mut ring = vec![start, first];
            let mut prev = start;
            let mut current = first;

            while current != start {
                let outgoing = edges.get_mut(&current).map(|v| std::mem::take(v)).unwrap_or_default();
                let next = match outgoing.len() {
                    0 => break,
                    1 => outgoing[0],
                    _ => {
                        let dx = current.0 as i64 - prev.0 as i64;
                        let dy = current.1 as i64 - prev.1 as i64;
                        // With y growing downward, the rightmost turn
                        // maximizes the cross product dx*oy - dy*ox.
                        let (idx, _) = outgoing
                            .iter()
                            .enumerate()
                            .max_by_key(|(_, o)| {
                                let ox = o.0 as i64 - current.0 as i64;
                                let oy = o.1 as i64 - current.1 as i64;
                                dx * oy - dy * ox
                            })
                            .unwrap();
                        for (i, o) in outgoing.iter().enumerate() {
                            if i != idx {
                                edges.entry(current).or_default().push(*o);
                            }
                        }
                        outgoing[idx]
                    }
                };
                ring.push(next);
                prev = current;
                current = next;
            }
            rings.push(ring);
        }
    }
    rings
}

/// Shoelace area of a closed ring in grid corner space (y grows downward,
/// so clockwise-on-screen rings come out positive).
fn grid_signed_area(ring: &[(usize, usize)]) -> f64 {
    let mut acc: i64 = 0;
    for pair in ring.windows(2) {
        let (x0, y0) = (pair[0].0 as i64, pair[0].1 as i64);
        let (x1, y1) = (pair[1].0 as i64, pair[1].1 as i64);
        acc += x0 * y1 - x1 * y0;
    }
    acc as f64 / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Area;

    fn unit_transform() -> GeoTransform {
        // 1 m cells, origin at (0, 100), north-up
        GeoTransform::new(0.0, 100.0, 1.0, -1.0)
    }

    fn mask_from(rows: usize, cols: usize, ones: &[(usize, usize)]) -> Array2<u8> {
        let mut m = Array2::zeros((rows, cols));
        for &(r, c) in ones {
            m[(r, c)] = 1;
        }
        m
    }

    #[test]
    fn single_cell_is_a_unit_square() {
        let mask = mask_from(3, 3, &[(1, 1)]);
        let mp = mask_to_polygons(&mask, &unit_transform());
        assert_eq!(mp.0.len(), 1);
        assert_eq!(mp.unsigned_area(), 1.0);
        let poly = &mp.0[0];
        assert_eq!(poly.exterior().0.len(), 5);
        assert!(poly.interiors().is_empty());
        // Corners of cell (1, 1) in world coordinates
        let xs: Vec<f64> = poly.exterior().0.iter().map(|c| c.x).collect();
        let ys: Vec<f64> = poly.exterior().0.iter().map(|c| c.y).collect();
        assert_eq!(xs.iter().cloned().fold(f64::INFINITY, f64::min), 1.0);
        assert_eq!(xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max), 2.0);
        assert_eq!(ys.iter().cloned().fold(f64::INFINITY, f64::min), 98.0);
        assert_eq!(ys.iter().cloned().fold(f64::NEG_INFINITY, f64::max), 99.0);
    }

    #[test]
    fn l_shape_is_one_polygon_with_matching_area() {
        let mask = mask_from(3, 3, &[(0, 0), (1, 0), (2, 0), (2, 1), (2, 2)]);
        let mp = mask_to_polygons(&mask, &unit_transform());
        assert_eq!(mp.0.len(), 1);
        assert_eq!(mp.unsigned_area(), 5.0);
    }

    #[test]
    fn ring_mask_produces_a_hole() {
        // 3x3 block with the center cell missing
        let mut mask = Array2::ones((3, 3));
        mask[(1, 1)] = 0;
        let mp = mask_to_polygons(&mask, &unit_transform());
        assert_eq!(mp.0.len(), 1);
        assert_eq!(mp.0[0].interiors().len(), 1);
        assert_eq!(mp.unsigned_area(), 8.0);
    }

    #[test]
    fn disjoint_components_become_separate_polygons() {
        let mask = mask_from(4, 4, &[(0, 0), (3, 3)]);
        let mp = mask_to_polygons(&mask, &unit_transform());
        assert_eq!(mp.0.len(), 2);
        assert_eq!(mp.unsigned_area(), 2.0);
    }

    #[test]
    fn diagonal_cells_stay_separate() {
        let mask = mask_from(2, 2, &[(0, 0), (1, 1)]);
        let mp = mask_to_polygons(&mask, &unit_transform());
        assert_eq!(mp.0.len(), 2);
        assert_eq!(mp.unsigned_area(), 2.0);
        for poly in &mp.0 {
            assert!(poly.interiors().is_empty());
        }
    }

    #[test]
    fn empty_mask_yields_empty_multipolygon() {
        let mask = Array2::zeros((5, 5));
        let mp = mask_to_polygons(&mask, &unit_transform());
        assert!(mp.0.is_empty());
    }
}
