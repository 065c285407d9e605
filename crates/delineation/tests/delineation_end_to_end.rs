//! Full pipeline run over synthetic grids: snap, trace, export, then read
//! both artifacts back and cross-check areas.

use cuenca_delineation::{
    delineate_watershed, pixel_area_km2, snap_to_network, DelineationParams, SnapParams,
    SnapPolicy,
};
use geo::Area;
use geo_types::Geometry;

use cuenca_core::{Crs, GeoTransform, Raster};

const ROWS: usize = 20;
const COLS: usize = 20;
const CHANNEL_COL: usize = 10;
const CHANNEL_COUNT: f64 = 2000.0;
const CELL_DEG: f64 = 0.001;

/// North-up geographic grid near Santiago, 0.001 degree cells.
fn georeference(r: &mut Raster<f64>) {
    r.set_transform(GeoTransform::new(-70.0, -33.0, CELL_DEG, -CELL_DEG));
    r.set_crs(Some(Crs::wgs84()));
}

/// Flow directions: column 10 is a channel flowing south; everything west
/// of it drains west, everything east drains east.
fn flow_grid() -> Raster<f64> {
    let mut r = Raster::new(ROWS, COLS);
    georeference(&mut r);
    for row in 0..ROWS {
        for col in 0..COLS {
            let code = match col {
                c if c == CHANNEL_COL => 4.0,
                c if c < CHANNEL_COL => 16.0,
                _ => 1.0,
            };
            r.set(row, col, code).unwrap();
        }
    }
    r
}

/// Accumulation counts: the channel carries a large constant count,
/// everything else a single cell.
fn accum_grid() -> Raster<f64> {
    let mut r = Raster::new(ROWS, COLS);
    georeference(&mut r);
    for row in 0..ROWS {
        for col in 0..COLS {
            let count = if col == CHANNEL_COL { CHANNEL_COUNT } else { 1.0 };
            r.set(row, col, count).unwrap();
        }
    }
    r
}

/// Outlet request three cells west of the channel mouth.
fn outlet_request() -> (f64, f64) {
    let lat = -33.0 - 19.5 * CELL_DEG;
    let lon = -70.0 + 7.5 * CELL_DEG;
    (lat, lon)
}

#[test]
fn full_run_produces_consistent_artifacts() {
    let flow = flow_grid();
    let accum = accum_grid();
    let (lat, lon) = outlet_request();
    let out = tempfile::tempdir().unwrap();

    let params = DelineationParams::default();
    let summary =
        delineate_watershed(&flow, &accum, lat, lon, &params, out.path()).unwrap();

    // The outlet snaps sideways onto the channel mouth.
    assert_eq!((summary.snap.row, summary.snap.col), (19, CHANNEL_COL));
    assert_eq!(summary.area_cells, ROWS as u64);

    let km2_per_cell = pixel_area_km2(&flow);
    assert!((summary.area_km2 - ROWS as f64 * km2_per_cell).abs() < 1e-9);

    // Vector artifact: one feature, attributes matching the summary, and a
    // planar geometry area equal to the cell count times the cell size.
    let text = std::fs::read_to_string(&summary.artifacts.vector_path).unwrap();
    let parsed: geojson::GeoJson = text.parse().unwrap();
    let fc = match parsed {
        geojson::GeoJson::FeatureCollection(fc) => fc,
        other => panic!("expected a FeatureCollection, got {:?}", other),
    };
    assert_eq!(fc.features.len(), 1);
    let feature = &fc.features[0];
    let props = feature.properties.as_ref().unwrap();
    assert_eq!(props["area_cells"], serde_json::json!(ROWS as u64));
    assert_eq!(props["threshold"], serde_json::json!(1.0));
    let area_km2 = props["area_km2"].as_f64().unwrap();
    assert!((area_km2 - summary.area_km2).abs() < 1e-9);

    let geometry: Geometry<f64> = feature
        .geometry
        .as_ref()
        .unwrap()
        .value
        .clone()
        .try_into()
        .unwrap();
    let planar_deg2 = geometry.unsigned_area();
    let expected_deg2 = ROWS as f64 * CELL_DEG * CELL_DEG;
    assert!(
        (planar_deg2 - expected_deg2).abs() < 1e-12,
        "geometry area {} != {}",
        planar_deg2,
        expected_deg2
    );

    // Raster artifact: bounding window plus the 5-cell buffer, channel cells
    // scaled, everything off-basin nodata.
    let raster = cuenca_core::io::open_raster(&summary.artifacts.raster_path).unwrap();
    assert_eq!(raster.height(), ROWS); // buffer clamps at the grid edge
    assert_eq!(raster.width(), 11); // 5 + channel + 5
    let window = raster.read_window(0, 0, raster.width(), raster.height()).unwrap();
    let km2_per_accum_cell = pixel_area_km2(&accum);
    let expected = (CHANNEL_COUNT * km2_per_accum_cell * 1000.0).round();
    for row in 0..ROWS {
        assert_eq!(window[(row, 5)], expected);
        assert_eq!(window[(row, 4)], 0.0);
        assert_eq!(window[(row, 6)], 0.0);
    }

    let t = raster.transform();
    assert!((t.origin_x - (-70.0 + 5.0 * CELL_DEG)).abs() < 1e-12);
    assert!((t.origin_y - (-33.0)).abs() < 1e-12);
}

#[test]
fn accepted_unsnapped_outlet_delineates_from_its_cell_center() {
    let flow = flow_grid();
    let accum = accum_grid();
    let out = tempfile::tempdir().unwrap();

    // Request a point off the cell center, with a threshold nothing meets.
    let lat = -33.0 - 19.2 * CELL_DEG;
    let lon = -70.0 + 7.2 * CELL_DEG;
    let params = DelineationParams {
        snap: SnapParams {
            threshold_km2: 1.0e9,
            ..SnapParams::default()
        },
        snap_policy: SnapPolicy::AcceptOriginal,
        ..DelineationParams::default()
    };
    let summary = delineate_watershed(&flow, &accum, lat, lon, &params, out.path()).unwrap();

    assert_eq!((summary.snap.row, summary.snap.col), (19, 7));
    // Reported coordinates are the requested cell's center.
    assert!((summary.snap.x - (-70.0 + 7.5 * CELL_DEG)).abs() < 1e-12);
    assert!((summary.snap.y - (-33.0 - 19.5 * CELL_DEG)).abs() < 1e-12);

    // Cell (19, 7) flows west; its two east neighbors drain through it.
    assert_eq!(summary.area_cells, 3);
    let km2_per_accum_cell = pixel_area_km2(&accum);
    assert!((summary.snap.accum_km2 - km2_per_accum_cell).abs() < 1e-12);
    assert!(summary.artifacts.vector_path.exists());
}

#[test]
fn snapping_the_snapped_outlet_is_a_fixed_point() {
    let accum = accum_grid();
    let km2_per_cell = pixel_area_km2(&accum);
    let (lat, lon) = outlet_request();

    let params = SnapParams::default();
    let first = snap_to_network(&accum, lon, lat, km2_per_cell, &params).unwrap();
    let again = snap_to_network(&accum, first.x, first.y, km2_per_cell, &params).unwrap();
    assert_eq!((first.row, first.col), (again.row, again.col));
    assert_eq!((first.x, first.y), (again.x, again.y));
}

#[test]
fn missing_input_file_fails_before_any_output_exists() {
    let out = tempfile::tempdir().unwrap();
    let err = cuenca_delineation::delineate_files(
        std::path::Path::new("/nonexistent/fdir.tif"),
        std::path::Path::new("/nonexistent/facc.tif"),
        -33.0,
        -70.0,
        &DelineationParams::default(),
        out.path(),
    )
    .unwrap_err();
    assert!(matches!(err, cuenca_core::Error::GridUnreadable { .. }));
    assert!(std::fs::read_dir(out.path()).unwrap().next().is_none());
}
