//! Coordinate Reference System handling

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;

/// Coordinate Reference System representation.
///
/// Carries an EPSG code and/or a WKT string, whichever the data source
/// provided. Both grids of a delineation run usually share one CRS, but the
/// two are treated as independent and compared with [`Crs::is_equivalent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Crs {
    /// EPSG code if known
    epsg: Option<u32>,
    /// WKT representation if available
    wkt: Option<String>,
}

impl Crs {
    /// Create a CRS from an EPSG code
    pub fn from_epsg(code: u32) -> Self {
        Self {
            epsg: Some(code),
            wkt: None,
        }
    }

    /// Create a CRS from a WKT string
    pub fn from_wkt(wkt: impl Into<String>) -> Self {
        Self {
            epsg: None,
            wkt: Some(wkt.into()),
        }
    }

    /// WGS84 geographic CRS (EPSG:4326)
    pub fn wgs84() -> Self {
        Self::from_epsg(4326)
    }

    /// Get EPSG code if known
    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    /// Get WKT representation
    pub fn wkt(&self) -> Option<&str> {
        self.wkt.as_deref()
    }

    /// Whether this CRS uses angular (degree) units.
    ///
    /// Recognizes the common geographic EPSG codes and WKT headers; grids
    /// with no CRS at all fall back to the extent heuristic applied by the
    /// pixel-area estimator.
    pub fn is_geographic(&self) -> bool {
        if let Some(code) = self.epsg {
            return matches!(code, 4326 | 4269 | 4267 | 4258 | 4283 | 4618);
        }
        if let Some(wkt) = &self.wkt {
            let head = wkt.trim_start();
            return head.starts_with("GEOGCS") || head.starts_with("GEOGCRS");
        }
        false
    }

    /// Check if two CRS are equivalent.
    ///
    /// EPSG codes compare exactly; WKT comparison is textual and therefore
    /// conservative (equal text means equal CRS, unequal text is inconclusive
    /// but treated as a mismatch).
    pub fn is_equivalent(&self, other: &Crs) -> bool {
        if let (Some(a), Some(b)) = (self.epsg, other.epsg) {
            return a == b;
        }
        if let (Some(a), Some(b)) = (&self.wkt, &other.wkt) {
            return a == b;
        }
        false
    }

    /// A short identifier for diagnostics
    pub fn identifier(&self) -> String {
        if let Some(code) = self.epsg {
            return format!("EPSG:{}", code);
        }
        if let Some(wkt) = &self.wkt {
            return format!("WKT:{}", &wkt[..wkt.len().min(40)]);
        }
        "unknown".to_string()
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

/// Reproject coordinate pairs to EPSG:4326 in place.
///
/// Geographic sources pass through unchanged. Projected sources go through
/// GDAL's coordinate transformation, which requires the `gdal` feature; the
/// native build reports a projection error instead of guessing.
pub fn reproject_to_wgs84(crs: Option<&Crs>, xs: &mut [f64], ys: &mut [f64]) -> Result<()> {
    debug_assert_eq!(xs.len(), ys.len());
    let crs = match crs {
        // No CRS recorded: assume the grid is already in lat/lon, which is
        // what the extent heuristic elsewhere assumes too.
        None => return Ok(()),
        Some(c) => c,
    };
    if crs.is_geographic() {
        return Ok(());
    }
    reproject_to_wgs84_impl(crs, xs, ys)
}

/// Reproject EPSG:4326 coordinate pairs into `crs` in place.
///
/// The inverse of [`reproject_to_wgs84`], with the same feature split.
pub fn reproject_from_wgs84(crs: Option<&Crs>, xs: &mut [f64], ys: &mut [f64]) -> Result<()> {
    debug_assert_eq!(xs.len(), ys.len());
    let crs = match crs {
        None => return Ok(()),
        Some(c) => c,
    };
    if crs.is_geographic() {
        return Ok(());
    }
    reproject_impl(crs, xs, ys, false)
}

#[cfg(feature = "gdal")]
fn reproject_to_wgs84_impl(crs: &Crs, xs: &mut [f64], ys: &mut [f64]) -> Result<()> {
    reproject_impl(crs, xs, ys, true)
}

#[cfg(feature = "gdal")]
fn reproject_impl(crs: &Crs, xs: &mut [f64], ys: &mut [f64], to_wgs84: bool) -> Result<()> {
    use crate::error::Error;
    use gdal::spatial_ref::{AxisMappingStrategy, CoordTransform, SpatialRef};

    let mut grid = if let Some(code) = crs.epsg() {
        SpatialRef::from_epsg(code)?
    } else if let Some(wkt) = crs.wkt() {
        SpatialRef::from_wkt(wkt)?
    } else {
        return Err(Error::Projection("source CRS is undefined".into()));
    };
    let mut wgs84 = SpatialRef::from_epsg(4326)?;
    // Keep x=lon, y=lat ordering regardless of authority axis order.
    grid.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
    wgs84.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);

    let transform = if to_wgs84 {
        CoordTransform::new(&grid, &wgs84)?
    } else {
        CoordTransform::new(&wgs84, &grid)?
    };
    let mut zs = vec![0.0; xs.len()];
    transform.transform_coords(xs, ys, &mut zs)?;
    Ok(())
}

#[cfg(not(feature = "gdal"))]
fn reproject_to_wgs84_impl(crs: &Crs, xs: &mut [f64], ys: &mut [f64]) -> Result<()> {
    reproject_impl(crs, xs, ys, true)
}

#[cfg(not(feature = "gdal"))]
fn reproject_impl(crs: &Crs, _xs: &mut [f64], _ys: &mut [f64], _to_wgs84: bool) -> Result<()> {
    Err(crate::error::Error::Projection(format!(
        "cannot reproject {} without the `gdal` feature",
        crs.identifier()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geographic_detection() {
        assert!(Crs::wgs84().is_geographic());
        assert!(Crs::from_wkt("GEOGCS[\"WGS 84\"]").is_geographic());
        assert!(!Crs::from_epsg(32719).is_geographic());
    }

    #[test]
    fn equivalence_by_epsg() {
        assert!(Crs::from_epsg(4326).is_equivalent(&Crs::wgs84()));
        assert!(!Crs::from_epsg(4326).is_equivalent(&Crs::from_epsg(3857)));
    }

    #[test]
    fn wgs84_reprojection_is_identity_for_geographic() {
        let mut xs = vec![-70.5];
        let mut ys = vec![-33.4];
        reproject_to_wgs84(Some(&Crs::wgs84()), &mut xs, &mut ys).unwrap();
        assert_eq!(xs[0], -70.5);
        assert_eq!(ys[0], -33.4);
    }
}
