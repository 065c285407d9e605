//! Real-world area per raster cell
//!
//! Grids in degrees get a local UTM approximation around the grid center;
//! grids already projected in meters use the cell size directly. The result
//! is an estimate with a few percent of error, good enough for thresholding
//! and reporting but not for cadastral claims.

use cuenca_core::RasterSource;

/// Meters per degree of latitude before projection scaling.
const METERS_PER_DEGREE: f64 = 111_320.0;

/// The UTM zone containing a point, with its hemisphere.
pub fn utm_zone(lon: f64, lat: f64) -> (u32, char) {
    let zone = ((lon + 180.0) / 6.0) as u32 + 1;
    let hemisphere = if lat >= 0.0 { 'N' } else { 'S' };
    (zone, hemisphere)
}

/// Whether a grid should be treated as degree-based: an explicitly
/// geographic CRS, or an extent that only makes sense in lat/lon.
pub fn treat_as_geographic(source: &dyn RasterSource) -> bool {
    if let Some(crs) = source.crs() {
        if crs.is_geographic() {
            return true;
        }
        // A projected CRS in meters never fits inside lat/lon ranges.
    }
    let (min_x, min_y, _max_x, _max_y) = source.bounds();
    min_x.abs() <= 180.0 && min_y.abs() <= 90.0
}

/// Estimate the area of one cell in km².
pub fn pixel_area_km2(source: &dyn RasterSource) -> f64 {
    let transform = source.transform();
    let res_x = transform.pixel_width.abs();
    let res_y = transform.pixel_height.abs();

    if !treat_as_geographic(source) {
        return (res_x * res_y) / 1e6;
    }

    let (min_x, min_y, max_x, max_y) = source.bounds();
    let lon_center = (min_x + max_x) / 2.0;
    let lat_center = (min_y + max_y) / 2.0;

    // Approximate UTM scale factor: 0.9996 on the central meridian, growing
    // with distance from it.
    let (zone, _) = utm_zone(lon_center, lat_center);
    let central_meridian = (zone as f64 - 1.0) * 6.0 - 180.0 + 3.0;
    let lon_diff = (lon_center - central_meridian).abs();
    let scale_factor = 0.9996 + (lon_diff / 3.0) * 0.0004;

    let deg_to_m_lat = METERS_PER_DEGREE * scale_factor;
    let deg_to_m_lon = METERS_PER_DEGREE * lat_center.to_radians().cos() * scale_factor;

    let px_m = res_y * deg_to_m_lat;
    let py_m = res_x * deg_to_m_lon;
    (px_m * py_m) / 1e6
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use cuenca_core::{Crs, GeoTransform, Raster};

    #[test]
    fn utm_zones() {
        assert_eq!(utm_zone(-70.65, -33.45), (19, 'S')); // Santiago
        assert_eq!(utm_zone(2.35, 48.85), (31, 'N')); // Paris
        assert_eq!(utm_zone(-179.9, 10.0), (1, 'N'));
    }

    #[test]
    fn projected_grid_uses_cell_size() {
        let mut r: Raster<f64> = Raster::new(10, 10);
        r.set_transform(GeoTransform::new(350_000.0, 6_300_000.0, 30.0, -30.0));
        r.set_crs(Some(Crs::from_epsg(32719)));
        assert_relative_eq!(pixel_area_km2(&r), 900.0 / 1e6, epsilon = 1e-12);
    }

    #[test]
    fn geographic_grid_near_equator() {
        // ~0.001 degree cells centered on the equator at a zone's central
        // meridian: scale factor 0.9996, no cosine shrink.
        let mut r: Raster<f64> = Raster::new(10, 10);
        r.set_transform(GeoTransform::new(-75.005, 0.005, 0.001, -0.001));
        r.set_crs(Some(Crs::wgs84()));

        let side_m = 0.001 * 111_320.0 * 0.9996;
        let expected = side_m * side_m / 1e6;
        assert_relative_eq!(pixel_area_km2(&r), expected, max_relative = 1e-3);
    }

    #[test]
    fn extent_heuristic_applies_without_crs() {
        let mut r: Raster<f64> = Raster::new(10, 10);
        r.set_transform(GeoTransform::new(-70.0, -33.0, 0.001, -0.001));
        assert!(treat_as_geographic(&r));

        let mut p: Raster<f64> = Raster::new(10, 10);
        p.set_transform(GeoTransform::new(350_000.0, 6_300_000.0, 30.0, -30.0));
        assert!(!treat_as_geographic(&p));
    }

    #[test]
    fn higher_latitude_shrinks_cells() {
        let mut eq: Raster<f64> = Raster::new(10, 10);
        eq.set_transform(GeoTransform::new(-70.0, 0.005, 0.001, -0.001));
        eq.set_crs(Some(Crs::wgs84()));

        let mut south: Raster<f64> = Raster::new(10, 10);
        south.set_transform(GeoTransform::new(-70.0, -45.0, 0.001, -0.001));
        south.set_crs(Some(Crs::wgs84()));

        assert!(pixel_area_km2(&south) < pixel_area_km2(&eq));
    }
}
