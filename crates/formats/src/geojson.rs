use scene::{Feature, Geometry, Position};
use serde_json::{Map, Value};

/// Payload carried by features decoded from GeoJSON.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureProperties {
    pub id: Option<String>,
    pub properties: Map<String, Value>,
}

impl FeatureProperties {
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.properties.get(key).and_then(Value::as_f64)
    }

    /// Reads `{ "r", "g", "b", "a"? }` or `[r, g, b, a?]`.
    pub fn get_rgba(&self, key: &str) -> Option<([f64; 3], Option<f64>)> {
        match self.properties.get(key)? {
            Value::Object(obj) => {
                let channel = |k: &str| obj.get(k).and_then(Value::as_f64);
                Some(([channel("r")?, channel("g")?, channel("b")?], channel("a")))
            }
            Value::Array(arr) if arr.len() >= 3 => {
                let channel = |i: usize| arr.get(i).and_then(Value::as_f64);
                Some(([channel(0)?, channel(1)?, channel(2)?], channel(3)))
            }
            _ => None,
        }
    }
}

pub type GeoJsonFeature = Feature<FeatureProperties>;

#[derive(Debug)]
pub enum GeoJsonError {
    Json(String),
    UnsupportedDocument(String),
    InvalidFeature { index: usize, reason: String },
}

impl std::fmt::Display for GeoJsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeoJsonError::Json(e) => write!(f, "JSON parse error: {e}"),
            GeoJsonError::UnsupportedDocument(ty) => {
                write!(f, "unsupported GeoJSON document: {ty}")
            }
            GeoJsonError::InvalidFeature { index, reason } => {
                write!(f, "invalid feature at index {index}: {reason}")
            }
        }
    }
}

impl std::error::Error for GeoJsonError {}

/// Decodes a FeatureCollection, a single Feature, a bare geometry, or an
/// array of coordinate tuples (one point feature per tuple).
///
/// Coordinates are kept as raw tuples: a non-numeric entry becomes NaN so the
/// vertex builder reports (and skips) the feature instead of failing the
/// whole document here.
pub fn parse_features(payload: &str) -> Result<Vec<GeoJsonFeature>, GeoJsonError> {
    let value: Value = serde_json::from_str(payload).map_err(|e| GeoJsonError::Json(e.to_string()))?;
    features_from_value(&value)
}

pub fn features_from_value(value: &Value) -> Result<Vec<GeoJsonFeature>, GeoJsonError> {
    if let Value::Array(tuples) = value {
        let mut out = Vec::with_capacity(tuples.len());
        for (index, tuple) in tuples.iter().enumerate() {
            let position =
                parse_position(tuple).map_err(|reason| GeoJsonError::InvalidFeature { index, reason })?;
            out.push(Feature::point(position, FeatureProperties::default()));
        }
        return Ok(out);
    }

    let obj = value
        .as_object()
        .ok_or_else(|| GeoJsonError::UnsupportedDocument("not an object or array".to_string()))?;
    let ty = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| GeoJsonError::UnsupportedDocument("missing type".to_string()))?;

    match ty {
        "FeatureCollection" => {
            let features = obj.get("features").and_then(Value::as_array).ok_or_else(|| {
                GeoJsonError::UnsupportedDocument("FeatureCollection without features".to_string())
            })?;
            let mut out = Vec::with_capacity(features.len());
            for (index, feature) in features.iter().enumerate() {
                out.push(parse_feature(feature).map_err(|reason| GeoJsonError::InvalidFeature { index, reason })?);
            }
            Ok(out)
        }
        "Feature" => {
            let feature =
                parse_feature(value).map_err(|reason| GeoJsonError::InvalidFeature { index: 0, reason })?;
            Ok(vec![feature])
        }
        _ => {
            let geometry =
                parse_geometry(value).map_err(|reason| GeoJsonError::InvalidFeature { index: 0, reason })?;
            Ok(vec![Feature::new(geometry, FeatureProperties::default())])
        }
    }
}

fn parse_feature(value: &Value) -> Result<GeoJsonFeature, String> {
    let obj = value
        .as_object()
        .ok_or("feature must be an object".to_string())?;
    let ty = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or("feature missing type".to_string())?;
    if ty != "Feature" {
        return Err(format!("unexpected feature type: {ty}"));
    }

    let id = match obj.get("id") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };
    let properties = obj
        .get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    let geometry = obj
        .get("geometry")
        .ok_or("feature missing geometry".to_string())?;
    Ok(Feature::new(
        parse_geometry(geometry)?,
        FeatureProperties { id, properties },
    ))
}

fn parse_geometry(value: &Value) -> Result<Geometry, String> {
    let obj = value
        .as_object()
        .ok_or("geometry must be an object".to_string())?;
    let ty = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or("geometry missing type".to_string())?;
    let coords = obj
        .get("coordinates")
        .ok_or("geometry missing coordinates".to_string())?;

    match ty {
        "Point" => Ok(Geometry::Point(parse_position(coords)?)),
        "MultiPoint" => Ok(Geometry::MultiPoint(parse_positions(coords)?)),
        "LineString" => Ok(Geometry::LineString(parse_positions(coords)?)),
        "MultiLineString" => Ok(Geometry::MultiLineString(parse_nested(coords, parse_positions)?)),
        "Polygon" => Ok(Geometry::Polygon(parse_nested(coords, parse_positions)?)),
        "MultiPolygon" => Ok(Geometry::MultiPolygon(parse_nested(coords, |rings| {
            parse_nested(rings, parse_positions)
        })?)),
        other => Err(format!("unsupported geometry type: {other}")),
    }
}

fn parse_position(value: &Value) -> Result<Position, String> {
    let arr = value
        .as_array()
        .ok_or("position must be an array".to_string())?;
    Ok(arr.iter().map(|v| v.as_f64().unwrap_or(f64::NAN)).collect())
}

fn parse_positions(value: &Value) -> Result<Vec<Position>, String> {
    parse_nested(value, parse_position)
}

fn parse_nested<T>(
    value: &Value,
    item: impl Fn(&Value) -> Result<T, String>,
) -> Result<Vec<T>, String> {
    let arr = value
        .as_array()
        .ok_or("coordinates must be an array".to_string())?;
    arr.iter().map(item).collect()
}

#[cfg(test)]
mod tests {
    use super::{GeoJsonError, parse_features};
    use pretty_assertions::assert_eq;
    use scene::Geometry;

    const CITIES: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            { "type": "Feature", "id": 7,
              "properties": { "labelText": "Paris", "labelColor": { "r": 1, "g": 0, "b": 0 } },
              "geometry": { "type": "Point", "coordinates": [2.35, 48.85] } },
            { "type": "Feature",
              "properties": { "labelColor": [0, 0.5, 1, 0.25] },
              "geometry": { "type": "LineString", "coordinates": [[0, 0], [1, 1]] } }
        ]
    }"#;

    #[test]
    fn parses_feature_collection_with_properties() {
        let features = parse_features(CITIES).expect("parse");
        assert_eq!(features.len(), 2);
        assert_eq!(features[0].geometry, Geometry::Point(vec![2.35, 48.85]));
        assert_eq!(features[0].payload.id.as_deref(), Some("7"));
        assert_eq!(features[0].payload.get_str("labelText"), Some("Paris"));
        assert_eq!(
            features[0].payload.get_rgba("labelColor"),
            Some(([1.0, 0.0, 0.0], None))
        );
        assert_eq!(
            features[1].payload.get_rgba("labelColor"),
            Some(([0.0, 0.5, 1.0], Some(0.25)))
        );
    }

    #[test]
    fn parses_raw_tuple_arrays_and_bare_geometry() {
        let tuples = parse_features("[[10, 20], [30, 40, 5]]").expect("parse");
        assert_eq!(tuples.len(), 2);
        assert_eq!(tuples[1].geometry, Geometry::Point(vec![30.0, 40.0, 5.0]));

        let poly = parse_features(
            r#"{ "type": "Polygon", "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 0]]] }"#,
        )
        .expect("parse");
        assert!(matches!(poly[0].geometry, Geometry::Polygon(ref rings) if rings[0].len() == 4));
    }

    #[test]
    fn non_numeric_coordinates_become_nan() {
        let features = parse_features(r#"[[null, 1]]"#).expect("parse");
        let Geometry::Point(p) = &features[0].geometry else {
            panic!("expected point");
        };
        assert!(p[0].is_nan());
    }

    #[test]
    fn structural_errors_are_reported() {
        assert!(matches!(parse_features("{"), Err(GeoJsonError::Json(_))));
        let err = parse_features(r#"{ "type": "FeatureCollection", "features": [ { "type": "Nope" } ] }"#)
            .expect_err("invalid");
        assert!(matches!(err, GeoJsonError::InvalidFeature { index: 0, .. }));
    }
}
