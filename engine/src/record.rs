//! Records: local mirrors of remote documents.
//!
//! A record keeps three views of its fields:
//!
//! - **server data**: the last values known to have round-tripped through the
//!   backend
//! - **operation set**: at most one pending [`FieldOperation`] per field
//! - **estimated data**: server data with every pending operation applied,
//!   which is what [`Record::get`] returns
//!
//! Estimated data is only a cache. It can be rebuilt from server data and the
//! operation set at any time, and every mutation keeps it in sync.

use crate::codec::{self, Encodable};
use crate::error::{Error, Result};
use crate::operation::FieldOperation;
use crate::relation::RelationHandle;
use crate::session::SessionContext;
use crate::transport::{Method, Request, Transport};
use crate::{Acl, ClassName, ObjectId, Pointer, Value};
use chrono::{DateTime, Utc};
use serde_json::Map;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Fields owned by the backend; no operation may target them.
pub const RESERVED_FIELDS: [&str; 4] = ["objectId", "createdAt", "updatedAt", "className"];

/// Field holding a record's access control list.
pub const ACL_FIELD: &str = "acl";

/// Field holding an authenticated user's session token.
pub const SESSION_TOKEN_FIELD: &str = "sessionToken";

/// API path for a class.
///
/// Built-in classes live at their own top-level paths; everything else is
/// under `classes/`.
pub fn api_path_for_class(class_name: &str) -> String {
    match class_name {
        "user" => "users".to_string(),
        "role" => "roles".to_string(),
        "installation" => "installations".to_string(),
        other => format!("classes/{}", other),
    }
}

/// A local mirror of one remote document.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    class_name: ClassName,
    object_id: Option<ObjectId>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    session_token: Option<String>,
    server_data: BTreeMap<String, Value>,
    operation_set: BTreeMap<String, FieldOperation>,
    estimated_data: BTreeMap<String, Value>,
    available: BTreeSet<String>,
    fully_fetched: bool,
}

/// An immutable view of a record's pending operations, taken when a save
/// starts.
///
/// The request can be sent while the record keeps changing;
/// [`Record::complete_save`] then folds in exactly what was sent.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveSnapshot {
    pub request: Request,
    operations: BTreeMap<String, FieldOperation>,
}

impl SaveSnapshot {
    /// The operations carried by the request.
    pub fn operations(&self) -> &BTreeMap<String, FieldOperation> {
        &self.operations
    }
}

impl Record {
    /// A new, unsaved record.
    ///
    /// Nothing exists on the server yet, so every field is known.
    pub fn new(class_name: impl Into<ClassName>) -> Self {
        Self {
            class_name: class_name.into(),
            object_id: None,
            created_at: None,
            updated_at: None,
            session_token: None,
            server_data: BTreeMap::new(),
            operation_set: BTreeMap::new(),
            estimated_data: BTreeMap::new(),
            available: BTreeSet::new(),
            fully_fetched: true,
        }
    }

    /// A reference to a saved record, with no fields.
    pub fn pointer(class_name: impl Into<ClassName>, object_id: impl Into<ObjectId>) -> Self {
        let mut record = Self::new(class_name);
        record.object_id = Some(object_id.into());
        record
    }

    /// Build a record from a server document.
    ///
    /// With `complete` false only the fields present in the document become
    /// readable.
    pub fn from_server(
        class_name: impl Into<ClassName>,
        document: &serde_json::Value,
        complete: bool,
    ) -> Result<Self> {
        let mut record = Self::new(class_name);
        record.fully_fetched = false;
        record.merge_from_server(document, complete)?;
        Ok(record)
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn object_id(&self) -> Option<&str> {
        self.object_id.as_deref()
    }

    /// Assign the object id. It can be set only once.
    pub fn set_object_id(&mut self, object_id: impl Into<ObjectId>) -> Result<()> {
        if let Some(existing) = &self.object_id {
            return Err(Error::ObjectIdAlreadySet(existing.clone()));
        }
        self.object_id = Some(object_id.into());
        Ok(())
    }

    pub fn created_at(&self) -> Option<&DateTime<Utc>> {
        self.created_at.as_ref()
    }

    pub fn updated_at(&self) -> Option<&DateTime<Utc>> {
        self.updated_at.as_ref()
    }

    /// Session token, for authenticated user records.
    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    /// API path of this record's class.
    pub fn api_path(&self) -> String {
        api_path_for_class(&self.class_name)
    }

    /// API path of this record. Requires an object id.
    pub fn object_path(&self) -> Result<String> {
        let object_id = self.require_object_id()?;
        Ok(format!("{}/{}", self.api_path(), object_id))
    }

    /// A pointer to this record. Requires an object id.
    pub fn to_pointer(&self) -> Result<Pointer> {
        let object_id = self.require_object_id()?;
        Ok(Pointer::new(self.class_name.clone(), object_id))
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Current value of a field.
    ///
    /// Fails with [`Error::FieldUnavailable`] unless the record has been fully
    /// fetched or the field is known locally. `Ok(None)` means the field has
    /// no value.
    pub fn get(&self, key: &str) -> Result<Option<&Value>> {
        if !self.is_available(key) {
            return Err(Error::FieldUnavailable(key.to_string()));
        }
        Ok(self.estimated_data.get(key))
    }

    /// Whether the field is readable and holds a value.
    pub fn has(&self, key: &str) -> bool {
        self.is_available(key) && self.estimated_data.contains_key(key)
    }

    /// Whether reading the field is allowed.
    pub fn is_available(&self, key: &str) -> bool {
        self.fully_fetched || self.available.contains(key)
    }

    /// Whether the field has a pending operation.
    pub fn is_dirty(&self, key: &str) -> bool {
        self.operation_set.contains_key(key)
    }

    /// Whether any field has a pending operation.
    pub fn has_pending_operations(&self) -> bool {
        !self.operation_set.is_empty()
    }

    pub fn is_fully_fetched(&self) -> bool {
        self.fully_fetched
    }

    /// The pending operation for a field.
    pub fn operation(&self, key: &str) -> Option<&FieldOperation> {
        self.operation_set.get(key)
    }

    /// All pending operations, in key order.
    pub fn operations(&self) -> &BTreeMap<String, FieldOperation> {
        &self.operation_set
    }

    /// Confirmed server value of a field, ignoring pending operations.
    pub fn server_value(&self, key: &str) -> Option<&Value> {
        self.server_data.get(key)
    }

    /// Names of readable fields that hold a value.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.estimated_data
            .keys()
            .filter(|key| self.is_available(key))
            .map(String::as_str)
    }

    /// The record's current ACL, if one is set.
    pub fn acl(&self) -> Result<Option<Acl>> {
        self.get(ACL_FIELD)?.map(Acl::from_value).transpose()
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    /// Overwrite a field.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> Result<()> {
        self.perform_operation(key, FieldOperation::set(value))
    }

    /// Overwrite a field with a list.
    pub fn set_array(&mut self, key: &str, values: Vec<Value>) -> Result<()> {
        self.perform_operation(key, FieldOperation::set(Value::List(values)))
    }

    /// Overwrite a field with a map. The wire form is always a JSON object.
    pub fn set_map(&mut self, key: &str, entries: BTreeMap<String, Value>) -> Result<()> {
        self.perform_operation(key, FieldOperation::set_map_like(Value::Map(entries)))
    }

    /// Append items to an array field.
    pub fn add(&mut self, key: &str, items: Vec<Value>) -> Result<()> {
        self.perform_operation(key, FieldOperation::Add(items))
    }

    /// Append items not already in an array field.
    pub fn add_unique(&mut self, key: &str, items: Vec<Value>) -> Result<()> {
        self.perform_operation(key, FieldOperation::AddUnique(items))
    }

    /// Remove items from an array field.
    pub fn remove(&mut self, key: &str, items: Vec<Value>) -> Result<()> {
        self.perform_operation(key, FieldOperation::Remove(items))
    }

    /// Delete a field.
    pub fn delete(&mut self, key: &str) -> Result<()> {
        self.perform_operation(key, FieldOperation::Delete)
    }

    /// Replace the record's ACL.
    pub fn set_acl(&mut self, acl: &Acl) -> Result<()> {
        self.perform_operation(ACL_FIELD, FieldOperation::set_map_like(acl.to_value()))
    }

    /// Handle to the relation stored in `key`.
    ///
    /// The target class is taken from the current value when there is one.
    pub fn relation(&self, key: &str) -> Result<RelationHandle> {
        validate_key(key)?;
        match self.get(key)? {
            Some(Value::Relation(existing)) => Ok(existing.clone()),
            None | Some(Value::Null) => Ok(RelationHandle::new(self.self_pointer(), key, None)),
            Some(other) => Err(Error::InvalidRelation(format!(
                "field '{}' holds a {}, not a relation",
                key,
                other.type_name()
            ))),
        }
    }

    /// Merge an operation into the pending set and refresh the field.
    ///
    /// Nothing changes if the merge or the apply fails.
    pub fn perform_operation(&mut self, key: &str, operation: FieldOperation) -> Result<()> {
        validate_key(key)?;

        let merged = operation.merge_with_previous(self.operation_set.get(key))?;
        let estimated = merged.apply(self.server_data.get(key), &self.self_pointer(), key)?;

        match estimated {
            Some(value) => self.estimated_data.insert(key.to_string(), value),
            None => self.estimated_data.remove(key),
        };
        self.operation_set.insert(key.to_string(), merged);
        self.available.insert(key.to_string());
        Ok(())
    }

    /// Drop all pending operations and restore the server values.
    ///
    /// Fields that were only known through a local edit become unavailable
    /// again.
    pub fn revert(&mut self) -> Result<()> {
        let estimated = estimate(&self.server_data, &BTreeMap::new(), &self.self_pointer())?;
        for key in std::mem::take(&mut self.operation_set).into_keys() {
            if !self.server_data.contains_key(&key) {
                self.available.remove(&key);
            }
        }
        self.estimated_data = estimated;
        Ok(())
    }

    /// Recompute estimated data from server data and pending operations.
    pub fn rebuild_estimated_data(&mut self) -> Result<()> {
        self.estimated_data = estimate(&self.server_data, &self.operation_set, &self.self_pointer())?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Server merges
    // ------------------------------------------------------------------------

    /// Fold a server document into the record.
    ///
    /// Magic fields (`objectId`, `createdAt`, `updatedAt`, `acl`,
    /// `sessionToken`) are extracted first; the rest are decoded, with
    /// relation-shaped values bound to this record.
    ///
    /// A complete merge replaces server data wholesale and marks the record
    /// fully fetched. A partial merge only overwrites the fields present. Once
    /// fully fetched, a record never becomes partial again. The merge is
    /// all-or-nothing.
    pub fn merge_from_server(&mut self, document: &serde_json::Value, complete: bool) -> Result<()> {
        let fields = document
            .as_object()
            .ok_or_else(|| Error::InvalidResponse("server document must be an object".into()))?;

        let magic = MagicFields::extract(fields, self.object_id.as_deref())?;
        let object_id = magic.object_id.clone().or_else(|| self.object_id.clone());
        let parent = Pointer {
            class_name: self.class_name.clone(),
            object_id: object_id.clone(),
        };

        let mut decoded = BTreeMap::new();
        for (key, raw) in fields {
            if is_magic(key) {
                continue;
            }
            decoded.insert(key.clone(), codec::decode_field(raw, &parent, key)?);
        }
        if let Some(acl) = magic.acl {
            decoded.insert(ACL_FIELD.to_string(), acl.to_value());
        }

        let mut server_data = if complete {
            BTreeMap::new()
        } else {
            self.server_data.clone()
        };
        let mut available = if complete {
            BTreeSet::new()
        } else {
            self.available.clone()
        };
        available.extend(decoded.keys().cloned());
        server_data.extend(decoded);

        let estimated = estimate(&server_data, &self.operation_set, &parent)?;

        debug!(
            class = %self.class_name,
            object_id = ?object_id,
            fields = server_data.len(),
            complete,
            "merged server document"
        );

        self.object_id = object_id;
        if magic.created_at.is_some() {
            self.created_at = magic.created_at;
        }
        if magic.updated_at.is_some() {
            self.updated_at = magic.updated_at;
        }
        if magic.session_token.is_some() {
            self.session_token = magic.session_token;
        }
        // Pending operations keep their fields readable.
        available.extend(self.operation_set.keys().cloned());
        self.server_data = server_data;
        self.available = available;
        self.estimated_data = estimated;
        self.fully_fetched = self.fully_fetched || complete;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------------

    /// Snapshot the pending operations into a save request.
    ///
    /// Unsaved records are created with `POST`; saved ones are updated with
    /// `PUT`.
    pub fn prepare_save(&self, context: &SessionContext) -> Result<SaveSnapshot> {
        let mut body = Map::new();
        for (key, operation) in &self.operation_set {
            body.insert(key.clone(), operation.encode()?);
        }

        let (method, path) = match &self.object_id {
            Some(_) => (Method::Put, self.object_path()?),
            None => (Method::Post, self.api_path()),
        };
        let request = Request::new(method, path)
            .with_body(serde_json::Value::Object(body))
            .with_session_token(context.session_token().map(str::to_string));

        Ok(SaveSnapshot {
            request,
            operations: self.operation_set.clone(),
        })
    }

    /// Fold a successful save response into the record.
    ///
    /// Every snapshotted operation is applied to server data. An operation is
    /// dropped from the pending set only if it is still the one that was
    /// sent; newer local edits stay pending. The response is then merged
    /// partially.
    pub fn complete_save(&mut self, snapshot: SaveSnapshot, response: &serde_json::Value) -> Result<()> {
        let mut next = self.clone();

        if let Some(object_id) = response.get("objectId").and_then(|id| id.as_str()) {
            if next.object_id.is_none() {
                next.object_id = Some(object_id.to_string());
            }
        }

        let parent = next.self_pointer();
        for (key, operation) in &snapshot.operations {
            match operation.apply(next.server_data.get(key), &parent, key)? {
                Some(value) => next.server_data.insert(key.clone(), value),
                None => next.server_data.remove(key),
            };
            next.available.insert(key.clone());
            if next.operation_set.get(key) == Some(operation) {
                next.operation_set.remove(key);
            }
        }

        next.merge_from_server(response, false)?;
        *self = next;
        Ok(())
    }

    /// Save pending operations through a transport.
    ///
    /// A saved record without pending operations sends nothing.
    pub fn save<T: Transport + ?Sized>(&mut self, transport: &T, context: &SessionContext) -> Result<()> {
        if self.object_id.is_some() && self.operation_set.is_empty() {
            return Ok(());
        }
        let snapshot = self.prepare_save(context)?;
        debug!(
            class = %self.class_name,
            method = %snapshot.request.method,
            path = %snapshot.request.path,
            operations = snapshot.operations.len(),
            "saving record"
        );
        let response = transport.send(&snapshot.request)?;
        self.complete_save(snapshot, &response)
    }

    /// Fetch the full document. Pending operations are kept and re-applied.
    pub fn fetch<T: Transport + ?Sized>(&mut self, transport: &T, context: &SessionContext) -> Result<()> {
        let request = Request::new(Method::Get, self.object_path()?)
            .with_session_token(context.session_token().map(str::to_string));
        debug!(class = %self.class_name, path = %request.path, "fetching record");
        let response = transport.send(&request)?;
        self.merge_from_server(&response, true)
    }

    /// Delete the record on the server.
    pub fn destroy<T: Transport + ?Sized>(&self, transport: &T, context: &SessionContext) -> Result<()> {
        let request = Request::new(Method::Delete, self.object_path()?)
            .with_session_token(context.session_token().map(str::to_string));
        debug!(class = %self.class_name, path = %request.path, "deleting record");
        transport.send(&request)?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Encoding
    // ------------------------------------------------------------------------

    /// The full wire document.
    ///
    /// For a key present in several layers, encoded pending operations win
    /// over estimated values, which win over server data, which wins over the
    /// reserved fields.
    pub fn encode(&self) -> Result<serde_json::Value> {
        let mut document = self.reserved_fields();
        for (key, value) in &self.server_data {
            document.insert(key.clone(), codec::encode(value)?);
        }
        for (key, value) in &self.estimated_data {
            if !self.operation_set.contains_key(key) {
                document.insert(key.clone(), codec::encode(value)?);
            }
        }
        for (key, operation) in &self.operation_set {
            document.insert(key.clone(), operation.encode()?);
        }
        Ok(serde_json::Value::Object(document))
    }

    /// The confirmed state only: reserved fields, session token and server
    /// data. Suitable for [`Record::from_server`].
    pub fn server_document(&self) -> Result<serde_json::Value> {
        let mut document = self.reserved_fields();
        if let Some(token) = &self.session_token {
            document.insert(SESSION_TOKEN_FIELD.to_string(), token.clone().into());
        }
        for (key, value) in &self.server_data {
            document.insert(key.clone(), codec::encode(value)?);
        }
        Ok(serde_json::Value::Object(document))
    }

    fn reserved_fields(&self) -> Map<String, serde_json::Value> {
        let mut document = Map::new();
        document.insert("className".into(), self.class_name.clone().into());
        if let Some(object_id) = &self.object_id {
            document.insert("objectId".into(), object_id.clone().into());
        }
        if let Some(created_at) = &self.created_at {
            document.insert("createdAt".into(), codec::encode_date(created_at).into());
        }
        if let Some(updated_at) = &self.updated_at {
            document.insert("updatedAt".into(), codec::encode_date(updated_at).into());
        }
        document
    }

    fn self_pointer(&self) -> Pointer {
        Pointer {
            class_name: self.class_name.clone(),
            object_id: self.object_id.clone(),
        }
    }

    fn require_object_id(&self) -> Result<&str> {
        self.object_id
            .as_deref()
            .ok_or_else(|| Error::UnassignedReference(self.class_name.clone()))
    }
}

impl From<&Record> for Value {
    fn from(record: &Record) -> Self {
        Value::Pointer(record.self_pointer())
    }
}

/// Reject empty and reserved keys.
pub(crate) fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::EmptyKey);
    }
    if RESERVED_FIELDS.contains(&key) {
        return Err(Error::ReservedField(key.to_string()));
    }
    Ok(())
}

fn is_magic(key: &str) -> bool {
    RESERVED_FIELDS.contains(&key) || key == ACL_FIELD || key == SESSION_TOKEN_FIELD
}

/// Fields extracted from a server document before generic decoding.
struct MagicFields {
    object_id: Option<ObjectId>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    session_token: Option<String>,
    acl: Option<Acl>,
}

impl MagicFields {
    fn extract(fields: &Map<String, serde_json::Value>, current_id: Option<&str>) -> Result<Self> {
        let object_id = match fields.get("objectId") {
            None | Some(serde_json::Value::Null) => None,
            Some(raw) => {
                let id = raw
                    .as_str()
                    .ok_or_else(|| Error::InvalidResponse("objectId must be a string".into()))?;
                match current_id {
                    Some(existing) if existing != id => {
                        return Err(Error::ObjectIdAlreadySet(existing.to_string()))
                    }
                    _ => Some(id.to_string()),
                }
            }
        };

        let timestamp = |name: &str| -> Result<Option<DateTime<Utc>>> {
            match fields.get(name) {
                None | Some(serde_json::Value::Null) => Ok(None),
                Some(raw) => codec::decode_timestamp(raw).map(Some),
            }
        };

        let session_token = fields
            .get(SESSION_TOKEN_FIELD)
            .and_then(|token| token.as_str())
            .map(str::to_string);

        let acl = match fields.get(ACL_FIELD) {
            None | Some(serde_json::Value::Null) => None,
            // An empty ACL may arrive as `[]`
            Some(serde_json::Value::Array(items)) if items.is_empty() => Some(Acl::new()),
            Some(raw) => Some(Acl::from_data(raw)?),
        };

        Ok(Self {
            object_id,
            created_at: timestamp("createdAt")?,
            updated_at: timestamp("updatedAt")?,
            session_token,
            acl,
        })
    }
}

/// Apply every pending operation, in key order, on top of server data.
fn estimate(
    server_data: &BTreeMap<String, Value>,
    operations: &BTreeMap<String, FieldOperation>,
    parent: &Pointer,
) -> Result<BTreeMap<String, Value>> {
    let mut estimated = server_data.clone();
    for (key, operation) in operations {
        match operation.apply(server_data.get(key), parent, key)? {
            Some(value) => estimated.insert(key.clone(), value),
            None => estimated.remove(key),
        };
    }
    Ok(estimated)
}
