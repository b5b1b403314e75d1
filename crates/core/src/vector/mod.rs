//! Vector features: geometry plus attributes, read from GeoJSON

use crate::crs::CRS;
use crate::error::{Error, Result};
use geo_types::{Coord, Geometry, LineString, Polygon};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

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
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    fn from_json(v: &serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => AttributeValue::Null,
            serde_json::Value::Bool(b) => AttributeValue::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => AttributeValue::Int(i),
                None => AttributeValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => AttributeValue::String(s.clone()),
            other => AttributeValue::String(other.to_string()),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(s)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(v)
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Float(v)
    }
}

/// A geographic feature with geometry and attributes
#[derive(Debug, Clone)]
pub struct Feature {
    pub geometry: Option<Geometry<f64>>,
    pub properties: HashMap<String, AttributeValue>,
    pub id: Option<String>,
}

impl Feature {
    pub fn new(geometry: Geometry<f64>) -> Self {
        Self {
            geometry: Some(geometry),
            properties: HashMap::new(),
            id: None,
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn get_property(&self, key: &str) -> Option<&AttributeValue> {
        self.properties.get(key)
    }
}

/// Collection of features in one CRS
#[derive(Debug, Clone, Default)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
    pub crs: Option<CRS>,
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>, crs: Option<CRS>) -> Self {
        Self { features, crs }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }

    /// Features whose attribute `key` equals `value`.
    pub fn filter_eq(&self, key: &str, value: impl Into<AttributeValue>) -> FeatureCollection {
        let value = value.into();
        FeatureCollection {
            features: self
                .features
                .iter()
                .filter(|f| f.get_property(key) == Some(&value))
                .cloned()
                .collect(),
            crs: self.crs.clone(),
        }
    }

    /// Concatenate two collections. The CRS of `self` wins when both are set.
    pub fn union(mut self, other: FeatureCollection) -> FeatureCollection {
        self.features.extend(other.features);
        if self.crs.is_none() {
            self.crs = other.crs;
        }
        self
    }

    /// All polygons, with multi-polygons and collections flattened.
    pub fn polygons(&self) -> Vec<Polygon<f64>> {
        let mut out = Vec::new();
        for g in self.features.iter().filter_map(|f| f.geometry.as_ref()) {
            collect_polygons(g, &mut out);
        }
        out
    }

    /// All line strings, with multi-lines and collections flattened.
    pub fn lines(&self) -> Vec<LineString<f64>> {
        let mut out = Vec::new();
        for g in self.features.iter().filter_map(|f| f.geometry.as_ref()) {
            collect_lines(g, &mut out);
        }
        out
    }

    /// Bounding box `(min_x, min_y, max_x, max_y)` of every coordinate.
    pub fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        let mut coords = Vec::new();
        for g in self.features.iter().filter_map(|f| f.geometry.as_ref()) {
            collect_coords(g, &mut coords);
        }
        let first = coords.first()?;
        Some(coords.iter().fold(
            (first.x, first.y, first.x, first.y),
            |(x0, y0, x1, y1), c| (x0.min(c.x), y0.min(c.y), x1.max(c.x), y1.max(c.y)),
        ))
    }
}

fn collect_polygons(g: &Geometry<f64>, out: &mut Vec<Polygon<f64>>) {
    match g {
        Geometry::Polygon(p) => out.push(p.clone()),
        Geometry::MultiPolygon(mp) => out.extend(mp.0.iter().cloned()),
        Geometry::Rect(r) => out.push(r.to_polygon()),
        Geometry::Triangle(t) => out.push(t.to_polygon()),
        Geometry::GeometryCollection(gc) => gc.0.iter().for_each(|g| collect_polygons(g, out)),
        _ => {}
    }
}

fn collect_lines(g: &Geometry<f64>, out: &mut Vec<LineString<f64>>) {
    match g {
        Geometry::LineString(l) => out.push(l.clone()),
        Geometry::Line(l) => out.push(LineString::from(vec![l.start, l.end])),
        Geometry::MultiLineString(ml) => out.extend(ml.0.iter().cloned()),
        Geometry::GeometryCollection(gc) => gc.0.iter().for_each(|g| collect_lines(g, out)),
        _ => {}
    }
}

fn collect_coords(g: &Geometry<f64>, out: &mut Vec<Coord<f64>>) {
    match g {
        Geometry::Point(p) => out.push(p.0),
        Geometry::MultiPoint(mp) => out.extend(mp.0.iter().map(|p| p.0)),
        Geometry::Line(l) => out.extend([l.start, l.end]),
        Geometry::LineString(l) => out.extend(l.0.iter().copied()),
        Geometry::MultiLineString(ml) => ml.0.iter().for_each(|l| out.extend(l.0.iter().copied())),
        Geometry::Polygon(p) => out.extend(p.exterior().0.iter().copied()),
        Geometry::MultiPolygon(mp) => mp.0.iter().for_each(|p| out.extend(p.exterior().0.iter().copied())),
        Geometry::Rect(r) => out.extend([r.min(), r.max()]),
        Geometry::Triangle(t) => out.extend(t.to_array()),
        Geometry::GeometryCollection(gc) => gc.0.iter().for_each(|g| collect_coords(g, out)),
    }
}

/// Read a GeoJSON FeatureCollection (or single Feature/Geometry) from a file.
pub fn read_geojson<P: AsRef<Path>>(path: P) -> Result<FeatureCollection> {
    let text = std::fs::read_to_string(path.as_ref())?;
    parse_geojson(&text)
}

/// Parse GeoJSON text. A legacy `crs` member naming an EPSG code is honoured.
pub fn parse_geojson(text: &str) -> Result<FeatureCollection> {
    let gj: geojson::GeoJson = text.parse()?;

    let (features, crs) = match gj {
        geojson::GeoJson::FeatureCollection(fc) => {
            let crs = fc
                .foreign_members
                .as_ref()
                .and_then(|m| m.get("crs"))
                .and_then(legacy_crs);
            (fc.features, crs)
        }
        geojson::GeoJson::Feature(f) => (vec![f], None),
        geojson::GeoJson::Geometry(g) => (
            vec![geojson::Feature {
                geometry: Some(g),
                ..Default::default()
            }],
            None,
        ),
    };

    let features = features
        .into_iter()
        .map(convert_feature)
        .collect::<Result<Vec<_>>>()?;
    Ok(FeatureCollection::new(features, crs))
}

fn convert_feature(f: geojson::Feature) -> Result<Feature> {
    let geometry = match f.geometry {
        Some(g) => Some(
            Geometry::<f64>::try_from(g.value)
                .map_err(|e| Error::Other(format!("unsupported geometry: {}", e)))?,
        ),
        None => None,
    };
    let properties = f
        .properties
        .unwrap_or_default()
        .iter()
        .map(|(k, v)| (k.clone(), AttributeValue::from_json(v)))
        .collect();
    let id = f.id.map(|id| match id {
        geojson::feature::Id::String(s) => s,
        geojson::feature::Id::Number(n) => n.to_string(),
    });
    Ok(Feature {
        geometry,
        properties,
        id,
    })
}

/// `{"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::31983"}}`
fn legacy_crs(v: &serde_json::Value) -> Option<CRS> {
    let name = v.get("properties")?.get("name")?.as_str()?;
    let code = name.rsplit(':').find(|s| !s.is_empty())?;
    match code.parse::<u32>() {
        Ok(epsg) => Some(CRS::from_epsg(epsg)),
        Err(_) if name.contains("CRS84") => Some(CRS::wgs84()),
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RISK: &str = r#"{
        "type": "FeatureCollection",
        "crs": {"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::31983"}},
        "features": [
            {"type": "Feature", "properties": {"tipolo_g1": "Inundação", "id": 1},
             "geometry": {"type": "Polygon", "coordinates": [[[0,0],[100,0],[100,100],[0,100],[0,0]]]}},
            {"type": "Feature", "properties": {"tipolo_g1": "Deslizamento", "id": 2},
             "geometry": {"type": "Polygon", "coordinates": [[[200,200],[300,200],[300,300],[200,300],[200,200]]]}},
            {"type": "Feature", "properties": {"name": "rio"},
             "geometry": {"type": "MultiLineString", "coordinates": [[[0,50],[400,50]],[[50,0],[50,400]]]}}
        ]
    }"#;

    #[test]
    fn test_parse_and_filter() {
        let fc = parse_geojson(RISK).unwrap();
        assert_eq!(fc.len(), 3);
        assert_eq!(fc.crs.as_ref().and_then(|c| c.epsg()), Some(31983));

        let flood = fc.filter_eq("tipolo_g1", "Inundação");
        assert_eq!(flood.len(), 1);
        assert_eq!(flood.polygons().len(), 1);
        assert_eq!(fc.lines().len(), 2);
        assert_eq!(fc.bounds(), Some((0.0, 0.0, 400.0, 400.0)));
    }

    #[test]
    fn test_filter_on_int_attribute() {
        let fc = parse_geojson(RISK).unwrap();
        assert_eq!(fc.filter_eq("id", 2i64).len(), 1);
        assert!(fc.filter_eq("tipolo_g1", "Alagamento").is_empty());
    }
}
