//! Minimal GeoJSON encoding for (multi)polygons.

use geo::{Coord, LineString, MultiPolygon, Polygon};
use serde_json::{json, Value};

use super::{Artifact, ArtifactKey, Properties};
use crate::{Error, Result};

fn ring_to_value(ring: &LineString<f64>) -> Value {
    Value::Array(ring.0.iter().map(|c| json!([c.x, c.y])).collect())
}

fn polygon_to_value(polygon: &Polygon<f64>) -> Value {
    Value::Array(
        std::iter::once(polygon.exterior())
            .chain(polygon.interiors())
            .map(ring_to_value)
            .collect(),
    )
}

/// GeoJSON `MultiPolygon` geometry object.
pub fn geometry_to_value(mp: &MultiPolygon<f64>) -> Value {
    json!({
        "type": "MultiPolygon",
        "coordinates": mp.0.iter().map(polygon_to_value).collect::<Vec<_>>(),
    })
}

fn ring_from_value(v: &Value, origin: &str) -> Result<LineString<f64>> {
    let points = v
        .as_array()
        .ok_or_else(|| Error::geojson(origin, "ring is not an array"))?;
    let coords = points
        .iter()
        .map(|p| match p.as_array().map(Vec::as_slice) {
            Some([x, y, ..]) => match (x.as_f64(), y.as_f64()) {
                (Some(x), Some(y)) => Ok(Coord { x, y }),
                _ => Err(Error::geojson(origin, "non-numeric coordinate")),
            },
            _ => Err(Error::geojson(origin, "position needs two numbers")),
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(LineString::from(coords))
}

fn polygon_from_value(v: &Value, origin: &str) -> Result<Polygon<f64>> {
    let rings = v
        .as_array()
        .ok_or_else(|| Error::geojson(origin, "polygon is not an array of rings"))?;
    let mut rings = rings.iter().map(|r| ring_from_value(r, origin));
    let exterior = rings
        .next()
        .ok_or_else(|| Error::geojson(origin, "polygon has no exterior ring"))??;
    let interiors = rings.collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(exterior, interiors))
}

/// Decode a `Polygon` or `MultiPolygon` geometry object.
pub fn geometry_from_value(v: &Value, origin: &str) -> Result<MultiPolygon<f64>> {
    let coordinates = v
        .get("coordinates")
        .ok_or_else(|| Error::geojson(origin, "geometry has no coordinates"))?;
    match v.get("type").and_then(Value::as_str) {
        Some("Polygon") => Ok(MultiPolygon::new(vec![polygon_from_value(coordinates, origin)?])),
        Some("MultiPolygon") => {
            let polygons = coordinates
                .as_array()
                .ok_or_else(|| Error::geojson(origin, "multipolygon is not an array"))?;
            Ok(MultiPolygon::new(
                polygons
                    .iter()
                    .map(|p| polygon_from_value(p, origin))
                    .collect::<Result<_>>()?,
            ))
        }
        other => Err(Error::geojson(
            origin,
            format!("unsupported geometry type {:?}", other),
        )),
    }
}

pub fn feature(geometry: &MultiPolygon<f64>, properties: &Properties) -> Value {
    json!({
        "type": "Feature",
        "geometry": geometry_to_value(geometry),
        "properties": properties,
    })
}

pub fn feature_collection(features: Vec<Value>) -> Value {
    json!({
        "type": "FeatureCollection",
        "features": features,
    })
}

/// Features of a FeatureCollection as `(geometry, properties)` pairs.
/// Features without a geometry are returned with `None`.
pub fn features(collection: &Value, origin: &str) -> Result<Vec<(Option<MultiPolygon<f64>>, Properties)>> {
    if collection.get("type").and_then(Value::as_str) != Some("FeatureCollection") {
        return Err(Error::geojson(origin, "not a FeatureCollection"));
    }
    let features = collection
        .get("features")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::geojson(origin, "FeatureCollection has no features array"))?;
    features
        .iter()
        .map(|f| {
            let properties = match f.get("properties") {
                Some(Value::Object(map)) => map.clone().into_iter().collect(),
                _ => Properties::new(),
            };
            let geometry = match f.get("geometry") {
                None | Some(Value::Null) => None,
                Some(g) => Some(geometry_from_value(g, origin)?),
            };
            Ok((geometry, properties))
        })
        .collect()
}

/// A one-feature collection holding an artifact.
pub fn encode_artifact(geometry: &MultiPolygon<f64>, properties: &Properties) -> Value {
    feature_collection(vec![feature(geometry, properties)])
}

pub fn decode_artifact(key: &ArtifactKey, value: &Value) -> Result<Artifact> {
    let origin = key.to_string();
    let mut features = features(value, &origin)?;
    if features.len() != 1 {
        return Err(Error::geojson(
            &origin,
            format!("expected one feature, found {}", features.len()),
        ));
    }
    let (geometry, properties) = features.remove(0);
    Ok(Artifact {
        key: key.clone(),
        geometry: geometry.unwrap_or_else(|| MultiPolygon::new(Vec::new())),
        properties,
    })
}
