//! String formats and JSON-shaped types (object, array, geopoint, geojson).

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value as JsonValue;

use crate::schema::Field;

use super::Value;

static EMAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());
static URI: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://\S+$").unwrap());
static UUID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .unwrap()
});

const GEOMETRY_TYPES: &[&str] = &[
    "Point",
    "MultiPoint",
    "LineString",
    "MultiLineString",
    "Polygon",
    "MultiPolygon",
];

pub(super) fn decode_string(raw: &str, field: &Field) -> Option<Value> {
    let ok = match field.format.as_str() {
        "email" => EMAIL.is_match(raw),
        "uri" => URI.is_match(raw),
        "uuid" => UUID.is_match(raw),
        "binary" => STANDARD.decode(raw).is_ok(),
        _ => true,
    };
    ok.then(|| Value::String(raw.to_string()))
}

pub(super) fn encode_string(value: &Value, _field: &Field) -> Option<String> {
    value.as_str().map(str::to_string)
}

pub(super) fn decode_any(raw: &str, _field: &Field) -> Option<Value> {
    Some(Value::String(raw.to_string()))
}

pub(super) fn encode_any(value: &Value, _field: &Field) -> Option<String> {
    Some(value.to_string())
}

pub(super) fn decode_object(raw: &str, _field: &Field) -> Option<Value> {
    match serde_json::from_str::<JsonValue>(raw).ok()? {
        JsonValue::Object(map) => Some(Value::Object(map)),
        _ => None,
    }
}

pub(super) fn encode_object(value: &Value, _field: &Field) -> Option<String> {
    match value {
        Value::Object(map) => serde_json::to_string(map).ok(),
        _ => None,
    }
}

pub(super) fn decode_array(raw: &str, _field: &Field) -> Option<Value> {
    match serde_json::from_str::<JsonValue>(raw).ok()? {
        JsonValue::Array(items) => Some(Value::Array(items)),
        _ => None,
    }
}

pub(super) fn encode_array(value: &Value, _field: &Field) -> Option<String> {
    match value {
        Value::Array(items) => serde_json::to_string(items).ok(),
        _ => None,
    }
}

pub(super) fn decode_geopoint(raw: &str, field: &Field) -> Option<Value> {
    let (lon, lat) = match field.format.as_str() {
        "array" => match serde_json::from_str::<JsonValue>(raw).ok()? {
            JsonValue::Array(items) if items.len() == 2 => (items[0].as_f64()?, items[1].as_f64()?),
            _ => return None,
        },
        "object" => match serde_json::from_str::<JsonValue>(raw).ok()? {
            JsonValue::Object(map) if map.len() == 2 => {
                (map.get("lon")?.as_f64()?, map.get("lat")?.as_f64()?)
            }
            _ => return None,
        },
        _ => {
            let (lon, lat) = raw.split_once(',')?;
            (lon.trim().parse().ok()?, lat.trim().parse().ok()?)
        }
    };
    let in_range = (-180.0..=180.0).contains(&lon) && (-90.0..=90.0).contains(&lat);
    in_range.then_some(Value::GeoPoint { lon, lat })
}

pub(super) fn encode_geopoint(value: &Value, field: &Field) -> Option<String> {
    let Value::GeoPoint { lon, lat } = value else {
        return None;
    };
    Some(match field.format.as_str() {
        "array" => format!("[{}, {}]", lon, lat),
        "object" => format!("{{\"lon\": {}, \"lat\": {}}}", lon, lat),
        _ => format!("{}, {}", lon, lat),
    })
}

pub(super) fn decode_geojson(raw: &str, field: &Field) -> Option<Value> {
    let json = serde_json::from_str::<JsonValue>(raw).ok()?;
    let valid = match field.format.as_str() {
        "topojson" => {
            json.get("type").and_then(JsonValue::as_str) == Some("Topology")
                && json.get("objects").is_some_and(JsonValue::is_object)
        }
        _ => is_geojson(&json),
    };
    valid.then_some(Value::GeoJson(json))
}

fn is_geojson(json: &JsonValue) -> bool {
    let Some(kind) = json.get("type").and_then(JsonValue::as_str) else {
        return false;
    };
    match kind {
        k if GEOMETRY_TYPES.contains(&k) => json.get("coordinates").is_some_and(JsonValue::is_array),
        "GeometryCollection" => json
            .get("geometries")
            .and_then(JsonValue::as_array)
            .is_some_and(|items| items.iter().all(is_geojson)),
        "Feature" => json
            .get("geometry")
            .is_some_and(|g| g.is_null() || is_geojson(g)),
        "FeatureCollection" => json
            .get("features")
            .and_then(JsonValue::as_array)
            .is_some_and(|items| items.iter().all(is_geojson)),
        _ => false,
    }
}

pub(super) fn encode_geojson(value: &Value, _field: &Field) -> Option<String> {
    match value {
        Value::GeoJson(json) => serde_json::to_string(json).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldType;

    #[test]
    fn test_string_formats() {
        let email = Field::new("e", FieldType::String).with_format("email");
        assert!(decode_string("ann@example.com", &email).is_some());
        assert!(decode_string("not-an-email", &email).is_none());

        let uuid = Field::new("u", FieldType::String).with_format("uuid");
        assert!(decode_string("123e4567-e89b-12d3-a456-426614174000", &uuid).is_some());
        assert!(decode_string("123e4567", &uuid).is_none());

        let binary = Field::new("b", FieldType::String).with_format("binary");
        assert!(decode_string("aGVsbG8=", &binary).is_some());
        assert!(decode_string("***", &binary).is_none());
    }

    #[test]
    fn test_object_and_array_shapes() {
        let f = Field::new("o", FieldType::Object);
        assert!(decode_object(r#"{"a":1}"#, &f).is_some());
        assert!(decode_object("[1,2]", &f).is_none());
        assert!(decode_array("[1,2]", &f).is_some());
        assert!(decode_array("1", &f).is_none());
    }

    #[test]
    fn test_geopoint_formats_and_ranges() {
        let f = Field::new("p", FieldType::GeoPoint);
        assert_eq!(
            decode_geopoint("90, 45", &f),
            Some(Value::GeoPoint { lon: 90.0, lat: 45.0 })
        );
        assert!(decode_geopoint("200, 45", &f).is_none());

        let arr = Field::new("p", FieldType::GeoPoint).with_format("array");
        assert!(decode_geopoint("[90, 45]", &arr).is_some());
        let obj = Field::new("p", FieldType::GeoPoint).with_format("object");
        assert!(decode_geopoint(r#"{"lon": 90, "lat": 45}"#, &obj).is_some());
    }

    #[test]
    fn test_geojson_structure() {
        let f = Field::new("g", FieldType::GeoJson);
        assert!(decode_geojson(r#"{"type":"Point","coordinates":[1,2]}"#, &f).is_some());
        assert!(decode_geojson(r#"{"type":"Point"}"#, &f).is_none());
        assert!(decode_geojson(
            r#"{"type":"Feature","geometry":null,"properties":{}}"#,
            &f
        )
        .is_some());

        let topo = Field::new("g", FieldType::GeoJson).with_format("topojson");
        assert!(decode_geojson(r#"{"type":"Topology","objects":{}}"#, &topo).is_some());
    }
}
