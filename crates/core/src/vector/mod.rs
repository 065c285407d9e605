//! Minimal vector feature model with GeoJSON output
//!
//! Just enough to carry the basin polygon and its summary attributes out of
//! a delineation run. Attribute order is preserved so output files list
//! fields the way callers declared them.

use std::fs;
use std::path::Path;

use geo_types::Geometry;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Attribute value types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl AttributeValue {
    fn to_json(&self) -> serde_json::Value {
        match self {
            AttributeValue::Null => serde_json::Value::Null,
            AttributeValue::Bool(b) => serde_json::Value::Bool(*b),
            AttributeValue::Int(i) => serde_json::Value::from(*i),
            AttributeValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            AttributeValue::String(s) => serde_json::Value::String(s.clone()),
        }
    }
}

/// A geographic feature: one geometry plus ordered attributes.
#[derive(Debug, Clone)]
pub struct Feature {
    pub geometry: Geometry<f64>,
    pub properties: Vec<(String, AttributeValue)>,
}

impl Feature {
    /// Create a new feature with geometry and no attributes
    pub fn new(geometry: Geometry<f64>) -> Self {
        Self {
            geometry,
            properties: Vec::new(),
        }
    }

    /// Append an attribute
    pub fn set_property(&mut self, key: impl Into<String>, value: AttributeValue) {
        self.properties.push((key.into(), value));
    }

    fn to_geojson(&self) -> geojson::Feature {
        let mut map = serde_json::Map::new();
        for (key, value) in &self.properties {
            map.insert(key.clone(), value.to_json());
        }
        geojson::Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::from(&self.geometry))),
            id: None,
            properties: Some(map),
            foreign_members: None,
        }
    }
}

/// Write features as a GeoJSON FeatureCollection.
///
/// GeoJSON coordinates are EPSG:4326 by specification; callers reproject
/// geometries before handing them over.
pub fn write_geojson<P: AsRef<Path>>(features: &[Feature], path: P) -> Result<()> {
    if features.is_empty() {
        return Err(Error::EmptyGeometry);
    }
    let collection = geojson::FeatureCollection {
        bbox: None,
        features: features.iter().map(Feature::to_geojson).collect(),
        foreign_members: None,
    };
    let text = geojson::GeoJson::FeatureCollection(collection).to_string();
    fs::write(path.as_ref(), text)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{polygon, Geometry};

    #[test]
    fn feature_roundtrips_through_geojson() {
        let poly = polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 1.0),
            (x: 0.0, y: 0.0),
        ];
        let mut feature = Feature::new(Geometry::Polygon(poly));
        feature.set_property("area_km2", AttributeValue::Float(2.5));
        feature.set_property("area_cells", AttributeValue::Int(10));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("basin.geojson");
        write_geojson(&[feature], &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let parsed: geojson::GeoJson = text.parse().unwrap();
        match parsed {
            geojson::GeoJson::FeatureCollection(fc) => {
                assert_eq!(fc.features.len(), 1);
                let props = fc.features[0].properties.as_ref().unwrap();
                assert_eq!(props["area_cells"], serde_json::json!(10));
            }
            other => panic!("expected FeatureCollection, got {:?}", other),
        }
    }

    #[test]
    fn empty_collection_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = write_geojson(&[], dir.path().join("x.geojson")).unwrap_err();
        assert!(matches!(err, Error::EmptyGeometry));
    }
}
