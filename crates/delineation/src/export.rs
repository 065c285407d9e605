//! Basin output artifacts
//!
//! Produces the two deliverables of a delineation run: a clipped, scaled
//! accumulated-area GeoTIFF aligned with the flow-direction grid, and a
//! GeoJSON polygon of the basin boundary in EPSG:4326. Both are written to
//! temporary paths and renamed on success so a failed run leaves no partial
//! artifacts behind.

use std::fs;
use std::path::{Path, PathBuf};

use geo_types::{Geometry, LineString};
use ndarray::Array2;
use tracing::info;

use cuenca_core::io::{write_geotiff_u32, GeoTiffOptions};
use cuenca_core::vector::{write_geojson, AttributeValue, Feature};
use cuenca_core::{crs, Crs, Error, Raster, RasterSource, Result};

use crate::basin::BasinMask;
use crate::vectorize::mask_to_polygons;

/// Export configuration
#[derive(Debug, Clone)]
pub struct ExportParams {
    /// Padding around the basin's bounding rectangle, cells
    pub buffer_cells: usize,
    /// Fixed-point scale applied to km² before the u32 cast
    pub scale_factor: f64,
}

impl Default for ExportParams {
    fn default() -> Self {
        Self {
            buffer_cells: 5,
            scale_factor: 1000.0,
        }
    }
}

/// Attributes carried on the basin polygon record.
#[derive(Debug, Clone)]
pub struct BasinAttributes {
    pub area_km2: f64,
    pub area_cells: u64,
    pub lat_orig: f64,
    pub lon_orig: f64,
    pub lat_snap: f64,
    pub lon_snap: f64,
    pub threshold_km2: f64,
    pub accum_km2: f64,
}

/// Paths of the finalized output files.
#[derive(Debug, Clone)]
pub struct OutputArtifacts {
    pub vector_path: PathBuf,
    pub raster_path: PathBuf,
}

/// Write both artifacts for a delineated basin.
///
/// The raster covers the basin's bounding rectangle padded by
/// `buffer_cells`, holds accumulated area in km² scaled by `scale_factor`
/// as u32 with nodata 0, and is aligned to the flow-direction grid. Cells
/// outside the unbuffered mask are nodata. The vector file carries the
/// unbuffered boundary as a single multipolygon feature reprojected to
/// EPSG:4326.
pub fn export(
    flow_dir: &dyn RasterSource,
    accum: &dyn RasterSource,
    basin: &BasinMask,
    km2_per_accum_cell: f64,
    attrs: &BasinAttributes,
    params: &ExportParams,
    vector_path: &Path,
    raster_path: &Path,
) -> Result<OutputArtifacts> {
    let raster = clip_accumulation(flow_dir, accum, basin, km2_per_accum_cell, params)?;
    let feature = basin_feature(flow_dir, basin, attrs)?;

    let raster_tmp = temp_sibling(raster_path);
    let vector_tmp = temp_sibling(vector_path);

    let tags = metadata_tags(params, attrs);
    write_geotiff_u32(&raster, &raster_tmp, Some(GeoTiffOptions::default()), &tags)?;
    if let Err(e) = write_geojson(std::slice::from_ref(&feature), &vector_tmp) {
        let _ = fs::remove_file(&raster_tmp);
        return Err(e);
    }

    fs::rename(&raster_tmp, raster_path)?;
    fs::rename(&vector_tmp, vector_path)?;
    info!(
        raster = %raster_path.display(),
        vector = %vector_path.display(),
        "wrote basin artifacts"
    );

    Ok(OutputArtifacts {
        vector_path: vector_path.to_path_buf(),
        raster_path: raster_path.to_path_buf(),
    })
}

/// Accumulated area clipped to the basin, on the flow-direction grid.
///
/// The accumulation grid need not share resolution or extent with the
/// direction grid; counts are resampled nearest-neighbor so integer values
/// are preserved rather than blended. Both grids must be in the same CRS.
pub fn clip_accumulation(
    flow_dir: &dyn RasterSource,
    accum: &dyn RasterSource,
    basin: &BasinMask,
    km2_per_accum_cell: f64,
    params: &ExportParams,
) -> Result<Raster<u32>> {
    if let (Some(a), Some(b)) = (flow_dir.crs(), accum.crs()) {
        if !a.is_equivalent(&b) {
            return Err(Error::CrsMismatch(a.identifier(), b.identifier()));
        }
    }

    let mbr = &basin.mbr;
    let row0 = mbr.min_row.saturating_sub(params.buffer_cells);
    let col0 = mbr.min_col.saturating_sub(params.buffer_cells);
    let row1 = (mbr.max_row + 1 + params.buffer_cells).min(flow_dir.height());
    let col1 = (mbr.max_col + 1 + params.buffer_cells).min(flow_dir.width());
    let out_rows = row1 - row0;
    let out_cols = col1 - col0;

    let flow_t = flow_dir.transform();
    let accum_t = accum.transform();

    // One covering read of the accumulation grid: map the output window's
    // corners into accumulation cells, pad by a cell, clamp.
    let mut acc_rows = (isize::MAX, isize::MIN);
    let mut acc_cols = (isize::MAX, isize::MIN);
    for &(c, r) in &[(col0, row0), (col1, row0), (col0, row1), (col1, row1)] {
        let (x, y) = flow_t.pixel_to_geo_corner(c, r);
        let (ar, ac) = accum_t.geo_to_cell(x, y);
        acc_rows = (acc_rows.0.min(ar), acc_rows.1.max(ar));
        acc_cols = (acc_cols.0.min(ac), acc_cols.1.max(ac));
    }
    let acc_row0 = (acc_rows.0 - 1).clamp(0, accum.height() as isize - 1) as usize;
    let acc_row1 = (acc_rows.1 + 2).clamp(1, accum.height() as isize) as usize;
    let acc_col0 = (acc_cols.0 - 1).clamp(0, accum.width() as isize - 1) as usize;
    let acc_col1 = (acc_cols.1 + 2).clamp(1, accum.width() as isize) as usize;
    let acc_window = accum.read_window(
        acc_col0,
        acc_row0,
        acc_col1 - acc_col0,
        acc_row1 - acc_row0,
    )?;

    let mut out = Array2::<u32>::zeros((out_rows, out_cols));
    for wr in 0..out_rows {
        for wc in 0..out_cols {
            let (grid_row, grid_col) = (row0 + wr, col0 + wc);
            if !basin.contains(grid_row, grid_col) {
                continue;
            }
            let (x, y) = flow_t.pixel_to_geo(grid_col, grid_row);
            let (ar, ac) = accum_t.geo_to_cell(x, y);
            if ar < acc_row0 as isize
                || ar >= acc_row1 as isize
                || ac < acc_col0 as isize
                || ac >= acc_col1 as isize
            {
                continue;
            }
            let count = acc_window[(ar as usize - acc_row0, ac as usize - acc_col0)];
            if accum.is_nodata(count) || count < 0.0 {
                continue;
            }
            let scaled = (count * km2_per_accum_cell * params.scale_factor).round();
            out[(wr, wc)] = scaled.min(u32::MAX as f64) as u32;
        }
    }

    let mut raster = Raster::from_array(out);
    raster.set_transform(flow_t.window(col0, row0));
    raster.set_crs(flow_dir.crs());
    raster.set_nodata(Some(0));
    Ok(raster)
}

/// Vectorize the unbuffered mask into a single feature in EPSG:4326.
pub fn basin_feature(
    flow_dir: &dyn RasterSource,
    basin: &BasinMask,
    attrs: &BasinAttributes,
) -> Result<Feature> {
    let mask_t = flow_dir.transform().window(basin.mbr.min_col, basin.mbr.min_row);
    let mut boundary = mask_to_polygons(&basin.mask, &mask_t);
    if boundary.0.is_empty() {
        return Err(Error::EmptyGeometry);
    }

    let grid_crs = flow_dir.crs();
    for poly in boundary.0.iter_mut() {
        let mut status = Ok(());
        poly.exterior_mut(|ring| status = reproject_ring(grid_crs.as_ref(), ring));
        status?;
        let mut status = Ok(());
        poly.interiors_mut(|rings| {
            for ring in rings.iter_mut() {
                if let Err(e) = reproject_ring(grid_crs.as_ref(), ring) {
                    status = Err(e);
                    return;
                }
            }
        });
        status?;
    }

    let mut feature = Feature::new(Geometry::MultiPolygon(boundary));
    feature.set_property("area_km2", AttributeValue::Float(attrs.area_km2));
    feature.set_property("area_cells", AttributeValue::Int(attrs.area_cells as i64));
    feature.set_property("lat_orig", AttributeValue::Float(attrs.lat_orig));
    feature.set_property("lon_orig", AttributeValue::Float(attrs.lon_orig));
    feature.set_property("lat_snap", AttributeValue::Float(attrs.lat_snap));
    feature.set_property("lon_snap", AttributeValue::Float(attrs.lon_snap));
    feature.set_property("threshold", AttributeValue::Float(attrs.threshold_km2));
    feature.set_property("accum_km2", AttributeValue::Float(attrs.accum_km2));
    Ok(feature)
}

fn reproject_ring(grid_crs: Option<&Crs>, ring: &mut LineString<f64>) -> Result<()> {
    let mut xs: Vec<f64> = ring.0.iter().map(|c| c.x).collect();
    let mut ys: Vec<f64> = ring.0.iter().map(|c| c.y).collect();
    crs::reproject_to_wgs84(grid_crs, &mut xs, &mut ys)?;
    for (coord, (x, y)) in ring.0.iter_mut().zip(xs.into_iter().zip(ys)) {
        coord.x = x;
        coord.y = y;
    }
    Ok(())
}

fn metadata_tags(params: &ExportParams, attrs: &BasinAttributes) -> Vec<(&'static str, String)> {
    vec![
        ("scale_factor", format!("{}", params.scale_factor)),
        ("units", "km2_x1000".to_string()),
        (
            "description",
            "Accumulated drainage area clipped to watershed".to_string(),
        ),
        ("watershed_lat", format!("{}", attrs.lat_snap)),
        ("watershed_lon", format!("{}", attrs.lon_snap)),
    ]
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
