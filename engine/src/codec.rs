//! Wire codec.
//!
//! Maps [`Value`]s to and from the tagged JSON representation used by the
//! document store. Typed values carry a `__type` discriminator:
//!
//! ```json
//! {"__type": "Date", "iso": "2024-02-01T00:00:00.000Z"}
//! {"__type": "Pointer", "className": "Post", "objectId": "abc"}
//! {"__type": "GeoPoint", "latitude": 35.0, "longitude": 139.0}
//! {"__type": "Relation", "className": "Post"}
//! ```
//!
//! Relations are only meaningful as a field of a specific record, so
//! [`decode`] rejects them; [`decode_field`] supplies the owning context.

use crate::error::{Error, Result};
use crate::relation::RelationHandle;
use crate::{GeoPoint, Pointer, Value};
use chrono::{DateTime, Utc};
use serde_json::{json, Map};

const TYPE_KEY: &str = "__type";

/// Types with their own wire encoding.
pub trait Encodable {
    /// Encode into the tagged wire representation.
    fn encode(&self) -> Result<serde_json::Value>;
}

impl Encodable for Value {
    fn encode(&self) -> Result<serde_json::Value> {
        encode(self)
    }
}

impl Encodable for GeoPoint {
    fn encode(&self) -> Result<serde_json::Value> {
        Ok(json!({
            TYPE_KEY: "GeoPoint",
            "latitude": self.latitude(),
            "longitude": self.longitude(),
        }))
    }
}

impl Encodable for Pointer {
    fn encode(&self) -> Result<serde_json::Value> {
        let object_id = self.require_id()?;
        Ok(json!({
            TYPE_KEY: "Pointer",
            "className": self.class_name,
            "objectId": object_id,
        }))
    }
}

/// Encode a value into its wire form.
///
/// Fails with [`Error::UnassignedReference`] for a pointer without an
/// object id, since such a reference cannot be round-tripped.
pub fn encode(value: &Value) -> Result<serde_json::Value> {
    Ok(match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => serde_json::Value::Number(n.clone()),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::List(items) => serde_json::Value::Array(encode_list(items)?),
        Value::Map(map) => {
            let mut out = Map::new();
            for (key, item) in map {
                out.insert(key.clone(), encode(item)?);
            }
            serde_json::Value::Object(out)
        }
        Value::Date(date) => json!({TYPE_KEY: "Date", "iso": encode_date(date)}),
        Value::GeoPoint(point) => point.encode()?,
        Value::Pointer(pointer) => pointer.encode()?,
        Value::Relation(relation) => relation.encode()?,
    })
}

/// Encode every item of a list.
pub fn encode_list(items: &[Value]) -> Result<Vec<serde_json::Value>> {
    items.iter().map(encode).collect()
}

/// Decode a wire value.
///
/// Maps without a recognized `__type` decode element-wise. A `Relation` tag
/// is an error here; use [`decode_field`] when the owning record is known.
pub fn decode(value: &serde_json::Value) -> Result<Value> {
    Ok(match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => Value::Number(n.clone()),
        serde_json::Value::String(s) => Value::String(s.clone()),
        serde_json::Value::Array(items) => {
            Value::List(items.iter().map(decode).collect::<Result<_>>()?)
        }
        serde_json::Value::Object(map) => match map.get(TYPE_KEY).and_then(|t| t.as_str()) {
            Some("Date") => Value::Date(decode_date(required_str(map, "iso", "Date")?)?),
            Some("Pointer") => Value::Pointer(Pointer::new(
                required_str(map, "className", "Pointer")?,
                required_str(map, "objectId", "Pointer")?,
            )),
            Some("GeoPoint") => Value::GeoPoint(GeoPoint::new(
                required_f64(map, "latitude")?,
                required_f64(map, "longitude")?,
            )?),
            Some("Relation") => {
                return Err(Error::Codec(
                    "a Relation can only be decoded as a field of its owning record".into(),
                ))
            }
            _ => Value::Map(
                map.iter()
                    .map(|(key, item)| Ok((key.clone(), decode(item)?)))
                    .collect::<Result<_>>()?,
            ),
        },
    })
}

/// Decode a top-level record field.
///
/// Relation-shaped values become a [`RelationHandle`] bound to `parent` and
/// `key`; everything else goes through [`decode`].
pub fn decode_field(value: &serde_json::Value, parent: &Pointer, key: &str) -> Result<Value> {
    if let Some(map) = value.as_object() {
        if map.get(TYPE_KEY).and_then(|t| t.as_str()) == Some("Relation") {
            let target_class = map
                .get("className")
                .and_then(|c| c.as_str())
                .map(str::to_string);
            return Ok(Value::Relation(RelationHandle::new(
                parent.clone(),
                key,
                target_class,
            )));
        }
    }
    decode(value)
}

/// Format a timestamp as `YYYY-MM-DDTHH:mm:ss.mmmZ`.
pub fn encode_date(date: &DateTime<Utc>) -> String {
    date.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Parse an RFC 3339 timestamp into UTC.
pub fn decode_date(iso: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(iso)
        .map(|date| date.with_timezone(&Utc))
        .map_err(|e| Error::Codec(format!("invalid date '{}': {}", iso, e)))
}

/// Decode a timestamp that may be tagged or a bare string.
pub(crate) fn decode_timestamp(value: &serde_json::Value) -> Result<DateTime<Utc>> {
    match value {
        serde_json::Value::String(iso) => decode_date(iso),
        other => match decode(other)? {
            Value::Date(date) => Ok(date),
            decoded => Err(Error::Codec(format!(
                "expected a timestamp, got {}",
                decoded.type_name()
            ))),
        },
    }
}

/// Render an encodable as compact JSON text.
pub fn to_json<T: Encodable + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(&value.encode()?).map_err(|e| Error::Codec(e.to_string()))
}

fn required_str<'a>(
    map: &'a Map<String, serde_json::Value>,
    field: &str,
    tag: &str,
) -> Result<&'a str> {
    map.get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::Codec(format!("{} is missing '{}'", tag, field)))
}

fn required_f64(map: &Map<String, serde_json::Value>, field: &str) -> Result<f64> {
    map.get(field)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| Error::Codec(format!("GeoPoint is missing '{}'", field)))
}
