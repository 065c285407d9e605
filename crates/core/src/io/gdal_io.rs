//! GeoTIFF access through GDAL
//!
//! Preferred backend: windowed reads honor the file's native block layout,
//! and outputs are LZW-compressed tiled GeoTIFFs with metadata tags.

use std::path::Path;

use gdal::raster::{Buffer, RasterCreationOption};
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager, Metadata};
use ndarray::Array2;

use crate::crs::Crs;
use crate::error::{Error, Result};
use crate::io::GeoTiffOptions;
use crate::raster::check_window;
use crate::raster::{GeoTransform, Raster, RasterSource};

/// A raster dataset opened read-only through GDAL, serving windowed reads.
pub struct GdalSource {
    dataset: Dataset,
    width: usize,
    height: usize,
    transform: GeoTransform,
    crs: Option<Crs>,
    nodata: Option<f64>,
    /// (height, width) of the band's native block
    block: (usize, usize),
}

impl GdalSource {
    /// Open a raster file; band 1 is the data band.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let dataset = Dataset::open(path).map_err(|e| Error::GridUnreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let (width, height) = dataset.raster_size();
        let transform = dataset
            .geo_transform()
            .map(GeoTransform::from_gdal)
            .unwrap_or_default();
        let crs = read_crs(&dataset);

        let (nodata, block) = {
            let band = dataset.rasterband(1)?;
            let (block_x, block_y) = band.block_size();
            (band.no_data_value(), (block_y, block_x))
        };

        Ok(Self {
            dataset,
            width,
            height,
            transform,
            crs,
            nodata,
            block,
        })
    }
}

impl RasterSource for GdalSource {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn transform(&self) -> GeoTransform {
        self.transform
    }

    fn crs(&self) -> Option<Crs> {
        self.crs.clone()
    }

    fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    fn block_size(&self) -> Option<(usize, usize)> {
        Some(self.block)
    }

    fn read_window(
        &self,
        col_off: usize,
        row_off: usize,
        w: usize,
        h: usize,
    ) -> Result<Array2<f64>> {
        check_window(self.width, self.height, col_off, row_off, w, h)?;
        let band = self.dataset.rasterband(1)?;
        let buffer = band.read_as::<f64>(
            (col_off as isize, row_off as isize),
            (w, h),
            (w, h),
            None,
        )?;
        Array2::from_shape_vec((h, w), buffer.data).map_err(|e| Error::Other(e.to_string()))
    }
}

fn read_crs(dataset: &Dataset) -> Option<Crs> {
    let srs = dataset.spatial_ref().ok()?;
    if let Ok(code) = srs.auth_code() {
        return Some(Crs::from_epsg(code as u32));
    }
    srs.to_wkt().ok().map(Crs::from_wkt)
}

/// Write a u32 raster as a compressed, tiled GeoTIFF with metadata tags.
pub fn write_geotiff_u32<P: AsRef<Path>>(
    raster: &Raster<u32>,
    path: P,
    options: Option<GeoTiffOptions>,
    tags: &[(&str, String)],
) -> Result<()> {
    let opts = options.unwrap_or_default();
    let driver = DriverManager::get_driver_by_name("GTiff")?;

    let (rows, cols) = raster.shape();

    let tile_size = opts.tile_size.to_string();
    let mut create_options = vec![RasterCreationOption {
        key: "COMPRESS",
        value: &opts.compression,
    }];
    if opts.tile_size > 0 {
        create_options.push(RasterCreationOption {
            key: "TILED",
            value: "YES",
        });
        create_options.push(RasterCreationOption {
            key: "BLOCKXSIZE",
            value: &tile_size,
        });
        create_options.push(RasterCreationOption {
            key: "BLOCKYSIZE",
            value: &tile_size,
        });
    }
    create_options.push(RasterCreationOption {
        key: "BIGTIFF",
        value: "IF_SAFER",
    });

    let mut dataset = driver.create_with_band_type_with_options::<u32, _>(
        path.as_ref(),
        cols as isize,
        rows as isize,
        1,
        &create_options,
    )?;

    dataset.set_geo_transform(&raster.transform().to_gdal())?;

    if let Some(crs) = raster.crs() {
        if let Some(epsg) = crs.epsg() {
            let srs = SpatialRef::from_epsg(epsg)?;
            dataset.set_spatial_ref(&srs)?;
        } else if let Some(wkt) = crs.wkt() {
            let srs = SpatialRef::from_wkt(wkt)?;
            dataset.set_spatial_ref(&srs)?;
        }
    }

    for (key, value) in tags {
        dataset.set_metadata_item(key, value, "")?;
    }

    let mut band = dataset.rasterband(1)?;
    if let Some(nodata) = raster.nodata() {
        band.set_no_data_value(Some(nodata as f64))?;
    }

    let data: Vec<u32> = raster.data().iter().copied().collect();
    let buffer = Buffer::new((cols, rows), data);
    band.write((0, 0), (cols, rows), &buffer)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_read_roundtrip() {
        let mut raster: Raster<u32> = Raster::new(64, 48);
        raster.set_transform(GeoTransform::new(-70.0, -33.0, 0.001, -0.001));
        raster.set_crs(Some(Crs::wgs84()));
        raster.set_nodata(Some(0));
        for row in 0..64 {
            for col in 0..48 {
                raster.set(row, col, (row * 48 + col) as u32).unwrap();
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tif");
        write_geotiff_u32(
            &raster,
            &path,
            None,
            &[("units", "km2_x1000".to_string())],
        )
        .unwrap();

        let source = GdalSource::open(&path).unwrap();
        assert_eq!(source.width(), 48);
        assert_eq!(source.height(), 64);
        assert_eq!(source.nodata(), Some(0.0));

        let win = source.read_window(10, 20, 8, 4).unwrap();
        assert_eq!(win[(0, 0)], (20 * 48 + 10) as f64);
        assert_eq!(win[(3, 7)], (23 * 48 + 17) as f64);
    }
}
