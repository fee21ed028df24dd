//! Field operations.
//!
//! Local changes are recorded as operations, not raw overwrites. Each record
//! keeps at most one pending operation per field; a new operation is merged
//! with the pending one through [`FieldOperation::merge_with_previous`],
//! where the newest operation is always the receiver.
//!
//! The merge table is partial. Sequences it does not define, such as a
//! `Remove` straight after an `Add`, fail with
//! [`Error::InvalidOperationSequence`] instead of guessing an order-sensitive
//! result.

use crate::codec::{self, Encodable};
use crate::error::{Error, Result};
use crate::relation::RelationHandle;
use crate::{ClassName, ObjectId, Pointer, Value};
use serde_json::json;
use std::collections::BTreeSet;

/// A pending change to one field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOperation {
    /// Unconditional overwrite. `map_like` forces the wire form to a JSON
    /// object even when the value is empty.
    Set { value: Value, map_like: bool },
    /// Append items to an array field.
    Add(Vec<Value>),
    /// Append items not already present.
    AddUnique(Vec<Value>),
    /// Drop matching items from an array field.
    Remove(Vec<Value>),
    /// Remove the field entirely.
    Delete,
    /// Incremental change to a many-to-many relation.
    Relation(RelationOp),
}

impl FieldOperation {
    /// A plain `Set`.
    pub fn set(value: impl Into<Value>) -> Self {
        FieldOperation::Set {
            value: value.into(),
            map_like: false,
        }
    }

    /// A `Set` whose wire form is always a JSON object.
    pub fn set_map_like(value: impl Into<Value>) -> Self {
        FieldOperation::Set {
            value: value.into(),
            map_like: true,
        }
    }

    /// Name of the variant, as used on the wire where applicable.
    pub fn name(&self) -> &'static str {
        match self {
            FieldOperation::Set { .. } => "Set",
            FieldOperation::Add(_) => "Add",
            FieldOperation::AddUnique(_) => "AddUnique",
            FieldOperation::Remove(_) => "Remove",
            FieldOperation::Delete => "Delete",
            FieldOperation::Relation(_) => "Relation",
        }
    }

    /// Apply this operation to a field's previous value.
    ///
    /// `None` means "no value", both as input and output. The previous value
    /// is never modified. `parent` and `key` identify the owning field, which
    /// relation operations need to bind their handle.
    pub fn apply(&self, old: Option<&Value>, parent: &Pointer, key: &str) -> Result<Option<Value>> {
        Ok(match self {
            FieldOperation::Set { value, .. } => Some(value.clone()),
            FieldOperation::Delete => None,
            FieldOperation::Add(items) => {
                let mut list = items_of(old);
                list.extend(items.iter().cloned());
                Some(Value::List(list))
            }
            FieldOperation::AddUnique(items) => Some(Value::List(add_unique(items_of(old), items))),
            FieldOperation::Remove(items) => Some(Value::List(remove_items(items_of(old), items))),
            FieldOperation::Relation(op) => Some(Value::Relation(op.apply(old, parent, key)?)),
        })
    }

    /// Combine this (newer) operation with the pending `previous` one.
    ///
    /// The result replaces `previous` in the record's operation set.
    pub fn merge_with_previous(&self, previous: Option<&FieldOperation>) -> Result<FieldOperation> {
        use FieldOperation::*;

        let Some(previous) = previous else {
            return Ok(self.clone());
        };

        let invalid = || Error::InvalidOperationSequence {
            previous: previous.name(),
            next: self.name(),
        };

        match (self, previous) {
            (Set { .. }, _) | (Delete, _) => Ok(self.clone()),

            (Add(items), Delete) => Ok(FieldOperation::set(items.clone())),
            (Add(items), Set { value, .. }) => {
                let mut list = value.clone().into_items();
                list.extend(items.iter().cloned());
                Ok(FieldOperation::set(list))
            }
            (Add(items), Add(prev)) | (Add(items), AddUnique(prev)) => {
                let mut list = prev.clone();
                list.extend(items.iter().cloned());
                Ok(FieldOperation::set(list))
            }

            (AddUnique(items), Delete) => Ok(FieldOperation::set(add_unique(Vec::new(), items))),
            (AddUnique(items), Set { value, .. }) => Ok(FieldOperation::set(add_unique(
                value.clone().into_items(),
                items,
            ))),
            (AddUnique(items), Add(prev)) => {
                Ok(FieldOperation::set(add_unique(prev.clone(), items)))
            }
            (AddUnique(items), AddUnique(prev)) => Ok(AddUnique(add_unique(prev.clone(), items))),

            (Remove(_), Delete) => Ok(Delete),
            (Remove(items), Set { value, .. }) => Ok(FieldOperation::set(remove_items(
                value.clone().into_items(),
                items,
            ))),
            (Remove(items), Remove(prev)) => {
                let mut list = prev.clone();
                list.extend(items.iter().cloned());
                Ok(Remove(list))
            }

            (Relation(op), Relation(prev)) => Ok(Relation(op.merge_with_previous(prev)?)),

            _ => Err(invalid()),
        }
    }
}

impl Encodable for FieldOperation {
    fn encode(&self) -> Result<serde_json::Value> {
        match self {
            FieldOperation::Set { value, map_like } => match value {
                Value::List(items) if *map_like && items.is_empty() => {
                    Ok(serde_json::Value::Object(serde_json::Map::new()))
                }
                Value::Null if *map_like => Ok(serde_json::Value::Object(serde_json::Map::new())),
                other => codec::encode(other),
            },
            FieldOperation::Add(items) => encode_objects("Add", items),
            FieldOperation::AddUnique(items) => encode_objects("AddUnique", items),
            FieldOperation::Remove(items) => encode_objects("Remove", items),
            FieldOperation::Delete => Ok(json!({"__op": "Delete"})),
            FieldOperation::Relation(op) => op.encode(),
        }
    }
}

fn encode_objects(op: &str, items: &[Value]) -> Result<serde_json::Value> {
    Ok(json!({"__op": op, "objects": codec::encode_list(items)?}))
}

fn items_of(old: Option<&Value>) -> Vec<Value> {
    old.cloned().map(Value::into_items).unwrap_or_default()
}

fn add_unique(mut base: Vec<Value>, items: &[Value]) -> Vec<Value> {
    for item in items {
        if !base.iter().any(|existing| existing.same_item(item)) {
            base.push(item.clone());
        }
    }
    base
}

fn remove_items(base: Vec<Value>, items: &[Value]) -> Vec<Value> {
    base.into_iter()
        .filter(|existing| !items.iter().any(|item| existing.same_item(item)))
        .collect()
}

/// Pending additions to and removals from a relation field.
///
/// All members belong to one target class. The add and remove sets are
/// always disjoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationOp {
    target_class: ClassName,
    adds: BTreeSet<ObjectId>,
    removes: BTreeSet<ObjectId>,
}

impl RelationOp {
    /// Build an operation from saved records of a single class.
    pub fn new(adds: &[Pointer], removes: &[Pointer]) -> Result<Self> {
        let target_class = adds
            .iter()
            .chain(removes)
            .next()
            .map(|p| p.class_name.clone())
            .ok_or_else(|| {
                Error::InvalidRelation("cannot create a relation operation with no objects".into())
            })?;

        let collect = |pointers: &[Pointer]| -> Result<BTreeSet<ObjectId>> {
            pointers
                .iter()
                .map(|p| {
                    if p.class_name != target_class {
                        return Err(Error::RelationClassMismatch {
                            expected: target_class.clone(),
                            actual: p.class_name.clone(),
                        });
                    }
                    p.require_id().map(str::to_string)
                })
                .collect()
        };
        let adds = collect(adds)?;
        let removes = collect(removes)?;

        if let Some(id) = adds.intersection(&removes).next() {
            return Err(Error::InvalidRelation(format!(
                "object '{}' is both added and removed",
                id
            )));
        }

        Ok(Self {
            target_class,
            adds,
            removes,
        })
    }

    pub fn target_class(&self) -> &str {
        &self.target_class
    }

    pub fn adds(&self) -> &BTreeSet<ObjectId> {
        &self.adds
    }

    pub fn removes(&self) -> &BTreeSet<ObjectId> {
        &self.removes
    }

    /// Merge with an earlier relation operation on the same field.
    ///
    /// A newly added id cancels a pending removal of that id and vice versa.
    pub fn merge_with_previous(&self, previous: &RelationOp) -> Result<RelationOp> {
        if previous.target_class != self.target_class {
            return Err(Error::RelationClassMismatch {
                expected: previous.target_class.clone(),
                actual: self.target_class.clone(),
            });
        }

        let adds = previous
            .adds
            .difference(&self.removes)
            .chain(&self.adds)
            .cloned()
            .collect();
        let removes = previous
            .removes
            .difference(&self.adds)
            .chain(&self.removes)
            .cloned()
            .collect();

        Ok(RelationOp {
            target_class: self.target_class.clone(),
            adds,
            removes,
        })
    }

    fn apply(&self, old: Option<&Value>, parent: &Pointer, key: &str) -> Result<RelationHandle> {
        match old {
            None | Some(Value::Null) => Ok(RelationHandle::new(
                parent.clone(),
                key,
                Some(self.target_class.clone()),
            )),
            Some(Value::Relation(existing)) => match existing.target_class() {
                Some(class) if class != self.target_class => Err(Error::RelationClassMismatch {
                    expected: class.to_string(),
                    actual: self.target_class.clone(),
                }),
                _ => Ok(RelationHandle::new(
                    parent.clone(),
                    key,
                    Some(self.target_class.clone()),
                )),
            },
            Some(other) => Err(Error::InvalidRelation(format!(
                "field '{}' holds a {}, not a relation",
                key,
                other.type_name()
            ))),
        }
    }

    fn encode_side(&self, op: &str, ids: &BTreeSet<ObjectId>) -> Result<serde_json::Value> {
        let objects = ids
            .iter()
            .map(|id| Pointer::new(self.target_class.clone(), id.clone()).encode())
            .collect::<Result<Vec<_>>>()?;
        Ok(json!({"__op": op, "objects": objects}))
    }
}

impl Encodable for RelationOp {
    fn encode(&self) -> Result<serde_json::Value> {
        match (self.adds.is_empty(), self.removes.is_empty()) {
            (false, false) => Ok(json!({
                "__op": "Batch",
                "ops": [
                    self.encode_side("AddRelation", &self.adds)?,
                    self.encode_side("RemoveRelation", &self.removes)?,
                ],
            })),
            (true, false) => self.encode_side("RemoveRelation", &self.removes),
            _ => self.encode_side("AddRelation", &self.adds),
        }
    }
}
