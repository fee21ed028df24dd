//! Many-to-many relation handles.

use crate::codec::Encodable;
use crate::error::{Error, Result};
use crate::operation::{FieldOperation, RelationOp};
use crate::{ClassName, Pointer, QueryBuilder, Record};
use serde_json::json;

/// A navigable reference from one record field to a set of related records.
///
/// The handle does not own its parent. It remembers which record and key it
/// belongs to and only changes the parent by submitting a
/// [`RelationOp`] through [`Record::perform_operation`].
#[derive(Debug, Clone, PartialEq)]
pub struct RelationHandle {
    parent: Pointer,
    key: String,
    target_class: Option<ClassName>,
}

impl RelationHandle {
    pub fn new(parent: Pointer, key: impl Into<String>, target_class: Option<ClassName>) -> Self {
        Self {
            parent,
            key: key.into(),
            target_class,
        }
    }

    /// The record this relation belongs to.
    pub fn parent(&self) -> &Pointer {
        &self.parent
    }

    /// The parent field holding this relation.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Class of the related records, once known.
    pub fn target_class(&self) -> Option<&str> {
        self.target_class.as_deref()
    }

    /// Add saved records to the relation.
    pub fn add(&mut self, parent: &mut Record, objects: &[Pointer]) -> Result<()> {
        self.submit(parent, RelationOp::new(objects, &[])?)
    }

    /// Remove saved records from the relation.
    pub fn remove(&mut self, parent: &mut Record, objects: &[Pointer]) -> Result<()> {
        self.submit(parent, RelationOp::new(&[], objects)?)
    }

    /// A query over the related records.
    ///
    /// Needs a known target class and a saved parent.
    pub fn query(&self) -> Result<QueryBuilder> {
        let target = self.target_class.as_deref().ok_or_else(|| {
            Error::InvalidRelation(format!("relation '{}' has no target class", self.key))
        })?;
        let mut query = QueryBuilder::new(target);
        query.related_to(&self.parent, &self.key)?;
        Ok(query)
    }

    fn submit(&mut self, parent: &mut Record, op: RelationOp) -> Result<()> {
        self.check_parent(parent)?;
        if let Some(expected) = &self.target_class {
            if expected != op.target_class() {
                return Err(Error::RelationClassMismatch {
                    expected: expected.clone(),
                    actual: op.target_class().to_string(),
                });
            }
        }
        let target = op.target_class().to_string();
        parent.perform_operation(&self.key, FieldOperation::Relation(op))?;
        self.target_class = Some(target);
        Ok(())
    }

    /// The parent must be the record the handle was taken from: same class
    /// and the same object id, or unsaved on both sides.
    fn check_parent(&self, parent: &Record) -> Result<()> {
        let same_class = parent.class_name() == self.parent.class_name;
        let same_id = parent.object_id() == self.parent.object_id.as_deref();
        if same_class && same_id {
            Ok(())
        } else {
            Err(Error::InvalidRelation(format!(
                "relation '{}' belongs to a different {} record",
                self.key, self.parent.class_name
            )))
        }
    }
}

impl Encodable for RelationHandle {
    fn encode(&self) -> Result<serde_json::Value> {
        let target = self.target_class.as_deref().ok_or_else(|| {
            Error::InvalidRelation(format!("relation '{}' has no target class", self.key))
        })?;
        Ok(json!({"__type": "Relation", "className": target}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Value;

    #[test]
    fn add_goes_through_parent_operations() {
        let mut user = Record::pointer("user", "u1");
        let mut likes = user.relation("likes").unwrap();
        likes
            .add(&mut user, &[Pointer::new("Post", "p1"), Pointer::new("Post", "p2")])
            .unwrap();

        assert_eq!(likes.target_class(), Some("Post"));
        assert!(user.is_dirty("likes"));
        assert_eq!(
            user.operation("likes").unwrap().encode().unwrap(),
            json!({
                "__op": "AddRelation",
                "objects": [
                    {"__type": "Pointer", "className": "Post", "objectId": "p1"},
                    {"__type": "Pointer", "className": "Post", "objectId": "p2"}
                ]
            })
        );

        let estimated = user.get("likes").unwrap().unwrap();
        assert!(matches!(estimated, Value::Relation(r) if r.target_class() == Some("Post")));
    }

    #[test]
    fn rejects_mismatched_target_class() {
        let mut user = Record::pointer("user", "u1");
        let mut likes = user.relation("likes").unwrap();
        likes.add(&mut user, &[Pointer::new("Post", "p1")]).unwrap();

        let err = likes
            .add(&mut user, &[Pointer::new("Comment", "c1")])
            .unwrap_err();
        assert_eq!(
            err,
            Error::RelationClassMismatch {
                expected: "Post".into(),
                actual: "Comment".into(),
            }
        );
    }

    #[test]
    fn rejects_foreign_parent() {
        let mut owner = Record::pointer("user", "u1");
        let mut other = Record::pointer("user", "u2");
        let mut likes = owner.relation("likes").unwrap();
        likes.add(&mut owner, &[Pointer::new("Post", "p1")]).unwrap();

        assert!(matches!(
            likes.add(&mut other, &[Pointer::new("Post", "p2")]),
            Err(Error::InvalidRelation(_))
        ));
        assert!(!other.is_dirty("likes"));
    }

    #[test]
    fn unsaved_handle_rejects_saved_record() {
        let mut draft = Record::new("Post");
        let mut likes = draft.relation("likes").unwrap();
        let mut saved = Record::pointer("Post", "other");

        assert!(matches!(
            likes.add(&mut saved, &[Pointer::new("user", "u1")]),
            Err(Error::InvalidRelation(_))
        ));
        assert!(!saved.is_dirty("likes"));

        likes.add(&mut draft, &[Pointer::new("user", "u1")]).unwrap();
        assert!(draft.is_dirty("likes"));
    }

    #[test]
    fn saved_handle_rejects_unsaved_record() {
        let owner = Record::pointer("Post", "p1");
        let mut likes = owner.relation("likes").unwrap();
        let mut draft = Record::new("Post");

        assert!(matches!(
            likes.remove(&mut draft, &[Pointer::new("user", "u1")]),
            Err(Error::InvalidRelation(_))
        ));
        assert!(!draft.is_dirty("likes"));
    }

    #[test]
    fn query_targets_related_class() {
        let handle = RelationHandle::new(Pointer::new("user", "u1"), "likes", Some("Post".into()));
        let query = handle.query().unwrap();
        assert_eq!(query.class_name(), Some("Post"));
        assert_eq!(
            query.options()["where"],
            json!({
                "$relatedTo": {
                    "object": {"__type": "Pointer", "className": "user", "objectId": "u1"},
                    "key": "likes"
                }
            })
        );

        let untyped = RelationHandle::new(Pointer::new("user", "u1"), "likes", None);
        assert!(untyped.query().is_err());
    }

    #[test]
    fn encodes_relation_tag() {
        let handle = RelationHandle::new(Pointer::new("user", "u1"), "likes", Some("Post".into()));
        assert_eq!(
            handle.encode().unwrap(),
            json!({"__type": "Relation", "className": "Post"})
        );
    }
}
