//! Native GeoTIFF reading/writing (without GDAL)
//!
//! Uses the `tiff` crate. Reads are chunk-streamed: only the strips/tiles
//! overlapping a requested window are decoded, so large grids never have to
//! fit in memory. Metadata support is limited to the common GeoTIFF tags;
//! for full CRS handling enable the `gdal` feature.

use std::cell::RefCell;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use ndarray::Array2;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::Gray32;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

use crate::crs::Crs;
use crate::error::{Error, Result};
use crate::io::GeoTiffOptions;
use crate::raster::check_window;
use crate::raster::{GeoTransform, Raster, RasterSource};

// GeoTIFF tag ids
const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_METADATA: u16 = 42112;
const GDAL_NODATA: u16 = 42113;

// GeoKey ids
const GT_MODEL_TYPE: u16 = 1024;
const GT_RASTER_TYPE: u16 = 1025;
const GEOGRAPHIC_TYPE: u16 = 2048;
const PROJECTED_CS_TYPE: u16 = 3072;

/// A GeoTIFF opened for windowed reading.
///
/// The decoder seeks and decodes one strip/tile at a time; the tile cache in
/// the delineation crate keeps recently used chunks resident, so this type
/// deliberately does no caching of its own.
#[derive(Debug)]
pub struct NativeSource {
    decoder: RefCell<Decoder<BufReader<File>>>,
    width: usize,
    height: usize,
    transform: GeoTransform,
    crs: Option<Crs>,
    nodata: Option<f64>,
    /// (height, width) of a decoded chunk
    chunk: (usize, usize),
    chunks_across: usize,
}

impl NativeSource {
    /// Open a GeoTIFF file for windowed reads.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let unreadable = |reason: String| Error::GridUnreadable {
            path: path.display().to_string(),
            reason,
        };

        let file = File::open(path).map_err(|e| unreadable(e.to_string()))?;
        let mut decoder =
            Decoder::new(BufReader::new(file)).map_err(|e| unreadable(e.to_string()))?;

        let (width, height) = decoder
            .dimensions()
            .map_err(|e| unreadable(e.to_string()))?;
        let width = width as usize;
        let height = height as usize;
        if width == 0 || height == 0 {
            return Err(unreadable(format!("empty raster {}x{}", width, height)));
        }

        let transform = read_geotransform(&mut decoder).unwrap_or_default();
        let crs = read_crs(&mut decoder);
        let nodata = decoder
            .get_tag_ascii_string(Tag::GdalNodata)
            .ok()
            .and_then(|s| s.trim().parse::<f64>().ok());

        let (chunk_w, chunk_h) = decoder.chunk_dimensions();
        let chunk = (chunk_h as usize, chunk_w as usize);
        let chunks_across = width.div_ceil(chunk.1);

        Ok(Self {
            decoder: RefCell::new(decoder),
            width,
            height,
            transform,
            crs,
            nodata,
            chunk,
            chunks_across,
        })
    }

    /// Decode one chunk into f64 cell values with its clamped dimensions.
    fn read_chunk(&self, chunk_row: usize, chunk_col: usize) -> Result<(Array2<f64>, usize, usize)> {
        let index = (chunk_row * self.chunks_across + chunk_col) as u32;
        let mut decoder = self.decoder.borrow_mut();
        let (data_w, data_h) = decoder.chunk_data_dimensions(index);
        let decoded = decoder
            .read_chunk(index)
            .map_err(|e| Error::Other(format!("TIFF chunk read error: {}", e)))?;
        drop(decoder);

        let values = decoding_to_f64(decoded)?;
        let (data_w, data_h) = (data_w as usize, data_h as usize);
        if values.len() != data_w * data_h {
            return Err(Error::Other(format!(
                "TIFF chunk size mismatch: {} values for {}x{}",
                values.len(),
                data_w,
                data_h
            )));
        }
        let array = Array2::from_shape_vec((data_h, data_w), values)
            .map_err(|e| Error::Other(e.to_string()))?;
        Ok((array, data_h, data_w))
    }
}

impl RasterSource for NativeSource {
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
        Some(self.chunk)
    }

    fn read_window(
        &self,
        col_off: usize,
        row_off: usize,
        w: usize,
        h: usize,
    ) -> Result<Array2<f64>> {
        check_window(self.width, self.height, col_off, row_off, w, h)?;

        let (chunk_h, chunk_w) = self.chunk;
        let mut out = Array2::<f64>::zeros((h, w));

        let first_cr = row_off / chunk_h;
        let last_cr = (row_off + h - 1) / chunk_h;
        let first_cc = col_off / chunk_w;
        let last_cc = (col_off + w - 1) / chunk_w;

        for cr in first_cr..=last_cr {
            for cc in first_cc..=last_cc {
                let (data, data_h, data_w) = self.read_chunk(cr, cc)?;
                let chunk_row0 = cr * chunk_h;
                let chunk_col0 = cc * chunk_w;

                let r0 = row_off.max(chunk_row0);
                let r1 = (row_off + h).min(chunk_row0 + data_h);
                let c0 = col_off.max(chunk_col0);
                let c1 = (col_off + w).min(chunk_col0 + data_w);

                for r in r0..r1 {
                    for c in c0..c1 {
                        out[(r - row_off, c - col_off)] =
                            data[(r - chunk_row0, c - chunk_col0)];
                    }
                }
            }
        }

        Ok(out)
    }
}

fn decoding_to_f64(result: DecodingResult) -> Result<Vec<f64>> {
    Ok(match result {
        DecodingResult::U8(buf) => buf.iter().map(|&v| v as f64).collect(),
        DecodingResult::U16(buf) => buf.iter().map(|&v| v as f64).collect(),
        DecodingResult::U32(buf) => buf.iter().map(|&v| v as f64).collect(),
        DecodingResult::U64(buf) => buf.iter().map(|&v| v as f64).collect(),
        DecodingResult::I8(buf) => buf.iter().map(|&v| v as f64).collect(),
        DecodingResult::I16(buf) => buf.iter().map(|&v| v as f64).collect(),
        DecodingResult::I32(buf) => buf.iter().map(|&v| v as f64).collect(),
        DecodingResult::I64(buf) => buf.iter().map(|&v| v as f64).collect(),
        DecodingResult::F32(buf) => buf.iter().map(|&v| v as f64).collect(),
        DecodingResult::F64(buf) => buf,
    })
}

/// Attempt to read a GeoTransform from ModelPixelScaleTag + ModelTiepointTag.
fn read_geotransform<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> Option<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(Tag::ModelPixelScaleTag).ok()?;
    let tiepoint = decoder.get_tag_f64_vec(Tag::ModelTiepointTag).ok()?;

    if scale.len() >= 2 && tiepoint.len() >= 6 {
        // tiepoint: [I, J, K, X, Y, Z]; scale: [ScaleX, ScaleY, ScaleZ]
        let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
        let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
        return Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]));
    }
    None
}

/// Attempt to read an EPSG code from the GeoKeyDirectoryTag.
fn read_crs<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Option<Crs> {
    let keys = decoder
        .get_tag_f64_vec(Tag::GeoKeyDirectoryTag)
        .ok()?;
    // Header (4 shorts), then (key_id, location, count, value) entries.
    let mut geographic = None;
    let mut projected = None;
    for entry in keys[4..].chunks_exact(4) {
        let (key_id, location, value) = (entry[0] as u16, entry[1] as u16, entry[3] as u32);
        if location != 0 {
            continue;
        }
        match key_id {
            GEOGRAPHIC_TYPE => geographic = Some(value),
            PROJECTED_CS_TYPE => projected = Some(value),
            _ => {}
        }
    }
    // A projected CRS also carries its datum's geographic key; prefer the
    // projection.
    projected
        .or(geographic)
        .filter(|&code| code != 0 && code != 32767)
        .map(Crs::from_epsg)
}

/// Write a u32 raster as an uncompressed GeoTIFF.
///
/// The nodata value goes into the GDAL_NODATA ASCII tag and metadata items
/// into GDAL_METADATA, the same tags GDAL itself uses. Compression and tiling
/// options are accepted for signature parity with the GDAL writer but not
/// applied; the native encoder writes plain strips.
pub fn write_geotiff_u32<P: AsRef<Path>>(
    raster: &Raster<u32>,
    path: P,
    _options: Option<GeoTiffOptions>,
    tags: &[(&str, String)],
) -> Result<()> {
    let file = File::create(path.as_ref())?;
    let mut encoder =
        TiffEncoder::new(file).map_err(|e| Error::Other(format!("TIFF encoder error: {}", e)))?;

    let (rows, cols) = raster.shape();
    let data: Vec<u32> = raster.data().iter().copied().collect();

    let mut image = encoder
        .new_image::<Gray32>(cols as u32, rows as u32)
        .map_err(|e| Error::Other(format!("cannot create TIFF image: {}", e)))?;

    let gt = raster.transform();

    let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
    image
        .encoder()
        .write_tag(Tag::Unknown(MODEL_PIXEL_SCALE), &scale[..])
        .map_err(|e| Error::Other(format!("cannot write scale tag: {}", e)))?;

    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    image
        .encoder()
        .write_tag(Tag::Unknown(MODEL_TIEPOINT), &tiepoint[..])
        .map_err(|e| Error::Other(format!("cannot write tiepoint tag: {}", e)))?;

    // Minimal GeoKeyDirectory: model type + raster type, plus the EPSG code
    // when one is known.
    let is_geographic = raster.crs().map(Crs::is_geographic).unwrap_or(false);
    let model_type: u16 = if is_geographic { 2 } else { 1 };
    let epsg_key: u16 = if is_geographic {
        GEOGRAPHIC_TYPE
    } else {
        PROJECTED_CS_TYPE
    };
    let mut geokeys: Vec<u16> = vec![
        1, 1, 0, 2, // version 1.1.0, 2 keys
        GT_MODEL_TYPE, 0, 1, model_type,
        GT_RASTER_TYPE, 0, 1, 1, // RasterPixelIsArea
    ];
    if let Some(code) = raster.crs().and_then(Crs::epsg) {
        if code <= u16::MAX as u32 {
            geokeys[3] += 1; // one more key
            geokeys.extend_from_slice(&[epsg_key, 0, 1, code as u16]);
        }
    }
    image
        .encoder()
        .write_tag(Tag::Unknown(GEO_KEY_DIRECTORY), &geokeys[..])
        .map_err(|e| Error::Other(format!("cannot write geokey tag: {}", e)))?;

    if let Some(nodata) = raster.nodata() {
        image
            .encoder()
            .write_tag(Tag::Unknown(GDAL_NODATA), nodata.to_string().as_str())
            .map_err(|e| Error::Other(format!("cannot write nodata tag: {}", e)))?;
    }

    if !tags.is_empty() {
        let mut xml = String::from("<GDALMetadata>\n");
        for (key, value) in tags {
            xml.push_str(&format!("  <Item name=\"{}\">{}</Item>\n", key, value));
        }
        xml.push_str("</GDALMetadata>\n");
        image
            .encoder()
            .write_tag(Tag::Unknown(GDAL_METADATA), xml.as_str())
            .map_err(|e| Error::Other(format!("cannot write metadata tag: {}", e)))?;
    }

    image
        .write_data(&data)
        .map_err(|e| Error::Other(format!("cannot write image data: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_stream_windows() {
        let mut raster: Raster<u32> = Raster::new(30, 20);
        raster.set_transform(GeoTransform::new(100.0, 500.0, 2.0, -2.0));
        raster.set_crs(Some(Crs::wgs84()));
        for row in 0..30 {
            for col in 0..20 {
                raster.set(row, col, (row * 20 + col) as u32).unwrap();
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.tif");
        write_geotiff_u32(&raster, &path, None, &[]).unwrap();

        let source = NativeSource::open(&path).unwrap();
        assert_eq!(source.width(), 20);
        assert_eq!(source.height(), 30);
        assert_eq!(source.transform().origin_x, 100.0);
        assert_eq!(source.transform().pixel_height, -2.0);

        let win = source.read_window(3, 7, 5, 4).unwrap();
        assert_eq!(win.dim(), (4, 5));
        for r in 0..4 {
            for c in 0..5 {
                assert_eq!(win[(r, c)], ((r + 7) * 20 + c + 3) as f64);
            }
        }

        // Single-cell read
        assert_eq!(source.read_cell(29, 19).unwrap(), (29 * 20 + 19) as f64);
    }

    #[test]
    fn nodata_and_metadata_tags_survive_a_roundtrip() {
        let mut raster: Raster<u32> = Raster::new(8, 8);
        raster.set_transform(GeoTransform::new(0.0, 8.0, 1.0, -1.0));
        raster.set_nodata(Some(0));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tagged.tif");
        write_geotiff_u32(
            &raster,
            &path,
            None,
            &[("units", "km2_x1000".to_string())],
        )
        .unwrap();

        let source = NativeSource::open(&path).unwrap();
        assert_eq!(source.nodata(), Some(0.0));

        let file = File::open(&path).unwrap();
        let mut decoder = Decoder::new(BufReader::new(file)).unwrap();
        let xml = decoder
            .get_tag_ascii_string(Tag::Unknown(GDAL_METADATA))
            .unwrap();
        assert!(xml.contains("<Item name=\"units\">km2_x1000</Item>"));
    }

    #[test]
    fn missing_file_is_grid_unreadable() {
        let err = NativeSource::open("/nonexistent/file.tif").unwrap_err();
        assert!(matches!(err, Error::GridUnreadable { .. }));
    }
}
