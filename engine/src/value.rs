//! The closed value model stored in record fields.
//!
//! Every field value is one of a fixed set of variants so the codec and the
//! operation algebra can match on them exhaustively.

use crate::error::{Error, Result};
use crate::relation::RelationHandle;
use crate::{ClassName, GeoPoint, ObjectId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A value held by a record field.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    /// Integer and float numbers stay distinct (`1` is not `1.0`)
    Number(serde_json::Number),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Date(DateTime<Utc>),
    GeoPoint(GeoPoint),
    Pointer(Pointer),
    Relation(RelationHandle),
}

impl Value {
    /// Name of the variant, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Number(_) => "Number",
            Value::String(_) => "String",
            Value::List(_) => "List",
            Value::Map(_) => "Map",
            Value::Date(_) => "Date",
            Value::GeoPoint(_) => "GeoPoint",
            Value::Pointer(_) => "Pointer",
            Value::Relation(_) => "Relation",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<&DateTime<Utc>> {
        match self {
            Value::Date(date) => Some(date),
            _ => None,
        }
    }

    pub fn as_geo_point(&self) -> Option<&GeoPoint> {
        match self {
            Value::GeoPoint(point) => Some(point),
            _ => None,
        }
    }

    pub fn as_pointer(&self) -> Option<&Pointer> {
        match self {
            Value::Pointer(pointer) => Some(pointer),
            _ => None,
        }
    }

    pub fn as_relation(&self) -> Option<&RelationHandle> {
        match self {
            Value::Relation(relation) => Some(relation),
            _ => None,
        }
    }

    /// View this value as the item list an array operation works on.
    ///
    /// `Null` is the empty list and any other non-list value is a list of
    /// one element.
    pub fn into_items(self) -> Vec<Value> {
        match self {
            Value::Null => Vec::new(),
            Value::List(items) => items,
            other => vec![other],
        }
    }

    /// Identity comparison used by array operations.
    ///
    /// Pointers that both carry an object id match on the id alone; every
    /// other pair must be structurally equal.
    pub fn same_item(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Pointer(a), Value::Pointer(b)) => match (&a.object_id, &b.object_id) {
                (Some(a), Some(b)) => a == b,
                _ => a == b,
            },
            _ => self == other,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n.into())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n.into())
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(n.into())
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Number(n.into())
    }
}

/// Floats go through `TryFrom` because NaN and the infinities have no wire
/// representation.
impl TryFrom<f64> for Value {
    type Error = Error;

    fn try_from(n: f64) -> Result<Self> {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .ok_or_else(|| Error::Codec(format!("{} is not a representable number", n)))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Value::Map(map)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(date: DateTime<Utc>) -> Self {
        Value::Date(date)
    }
}

impl From<GeoPoint> for Value {
    fn from(point: GeoPoint) -> Self {
        Value::GeoPoint(point)
    }
}

impl From<Pointer> for Value {
    fn from(pointer: Pointer) -> Self {
        Value::Pointer(pointer)
    }
}

impl From<RelationHandle> for Value {
    fn from(relation: RelationHandle) -> Self {
        Value::Relation(relation)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// A lightweight reference to another record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pointer {
    pub class_name: ClassName,
    /// `None` for a record that has not been saved yet
    pub object_id: Option<ObjectId>,
}

impl Pointer {
    /// Reference to a saved record.
    pub fn new(class_name: impl Into<ClassName>, object_id: impl Into<ObjectId>) -> Self {
        Self {
            class_name: class_name.into(),
            object_id: Some(object_id.into()),
        }
    }

    /// Reference to a record that has no object id yet.
    pub fn unassigned(class_name: impl Into<ClassName>) -> Self {
        Self {
            class_name: class_name.into(),
            object_id: None,
        }
    }

    /// The object id, or [`Error::UnassignedReference`] if there is none.
    pub fn require_id(&self) -> Result<&str> {
        self.object_id
            .as_deref()
            .ok_or_else(|| Error::UnassignedReference(self.class_name.clone()))
    }
}
