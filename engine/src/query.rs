//! Query construction and execution.
//!
//! A [`QueryBuilder`] accumulates a `where` constraint document plus paging
//! and ordering directives. Constraint methods mutate the builder in place
//! and return it for chaining:
//!
//! ```rust
//! use mbaas_engine::QueryBuilder;
//! use serde_json::json;
//!
//! let mut query = QueryBuilder::new("Post");
//! query
//!     .greater_than("score", 10)?
//!     .equal_to("author", "alice")?
//!     .descending("createdAt")
//!     .limit(20);
//!
//! assert_eq!(
//!     query.options(),
//!     json!({
//!         "where": {"author": "alice", "score": {"$gt": 10}},
//!         "order": "-createdAt",
//!         "limit": 20
//!     })
//! );
//! # Ok::<(), mbaas_engine::Error>(())
//! ```

use crate::codec::{self, Encodable};
use crate::error::{Error, Result};
use crate::record::api_path_for_class;
use crate::session::SessionContext;
use crate::transport::{Method, Request, Transport};
use crate::{ClassName, Pointer, Record, Value};
use serde_json::{json, Map};
use tracing::debug;

/// Builder for a class query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryBuilder {
    class_name: Option<ClassName>,
    api_path: Option<String>,
    where_: Map<String, serde_json::Value>,
    order: Vec<String>,
    include: Vec<String>,
    limit: Option<u32>,
    skip: u32,
    count: bool,
}

impl QueryBuilder {
    /// A query over one class.
    pub fn new(class_name: impl Into<ClassName>) -> Self {
        Self {
            class_name: Some(class_name.into()),
            ..Self::default()
        }
    }

    pub fn class_name(&self) -> Option<&str> {
        self.class_name.as_deref()
    }

    /// Override the request path.
    pub fn set_api_path(&mut self, path: impl Into<String>) -> &mut Self {
        self.api_path = Some(path.into());
        self
    }

    /// Request path: the override if set, otherwise the class path.
    pub fn api_path(&self) -> Result<String> {
        match (&self.api_path, &self.class_name) {
            (Some(path), _) => Ok(path.clone()),
            (None, Some(class_name)) => Ok(api_path_for_class(class_name)),
            (None, None) => Err(Error::InvalidQuery("query has no class name or path".into())),
        }
    }

    // ------------------------------------------------------------------------
    // Constraints
    // ------------------------------------------------------------------------

    /// Require `key` to equal `value`. Equality with null means the field
    /// does not exist.
    pub fn equal_to(&mut self, key: &str, value: impl Into<Value>) -> Result<&mut Self> {
        let value = value.into();
        if value.is_null() {
            return Ok(self.does_not_exist(key));
        }
        self.where_.insert(key.to_string(), codec::encode(&value)?);
        Ok(self)
    }

    pub fn not_equal_to(&mut self, key: &str, value: impl Into<Value>) -> Result<&mut Self> {
        self.add_condition(key, "$ne", &value.into())
    }

    pub fn less_than(&mut self, key: &str, value: impl Into<Value>) -> Result<&mut Self> {
        self.add_condition(key, "$lt", &value.into())
    }

    pub fn greater_than(&mut self, key: &str, value: impl Into<Value>) -> Result<&mut Self> {
        self.add_condition(key, "$gt", &value.into())
    }

    pub fn less_than_or_equal_to(&mut self, key: &str, value: impl Into<Value>) -> Result<&mut Self> {
        self.add_condition(key, "$lte", &value.into())
    }

    pub fn greater_than_or_equal_to(
        &mut self,
        key: &str,
        value: impl Into<Value>,
    ) -> Result<&mut Self> {
        self.add_condition(key, "$gte", &value.into())
    }

    /// Field value is one of `values`.
    pub fn contained_in(&mut self, key: &str, values: Vec<Value>) -> Result<&mut Self> {
        self.add_condition(key, "$in", &Value::List(values))
    }

    pub fn not_contained_in(&mut self, key: &str, values: Vec<Value>) -> Result<&mut Self> {
        self.add_condition(key, "$nin", &Value::List(values))
    }

    pub fn exists(&mut self, key: &str) -> &mut Self {
        self.set_condition(key, "$exists", json!(true))
    }

    pub fn does_not_exist(&mut self, key: &str) -> &mut Self {
        self.set_condition(key, "$exists", json!(false))
    }

    pub fn regex(&mut self, key: &str, pattern: &str) -> &mut Self {
        self.set_condition(key, "$regex", json!(pattern))
    }

    /// Array field contains any of `values`.
    pub fn in_array(&mut self, key: &str, values: Vec<Value>) -> Result<&mut Self> {
        self.add_condition(key, "$inArray", &Value::List(values))
    }

    pub fn not_in_array(&mut self, key: &str, values: Vec<Value>) -> Result<&mut Self> {
        self.add_condition(key, "$ninArray", &Value::List(values))
    }

    /// Array field contains every one of `values`.
    pub fn contains_all(&mut self, key: &str, values: Vec<Value>) -> Result<&mut Self> {
        self.add_condition(key, "$all", &Value::List(values))
    }

    /// Pointer field refers to a record matched by `query`.
    pub fn matches_query(&mut self, key: &str, query: &QueryBuilder) -> Result<&mut Self> {
        let nested = query.nested_document()?;
        Ok(self.set_condition(key, "$inQuery", nested))
    }

    pub fn does_not_match_query(&mut self, key: &str, query: &QueryBuilder) -> Result<&mut Self> {
        let nested = query.nested_document()?;
        Ok(self.set_condition(key, "$notInQuery", nested))
    }

    /// Field value equals `query_key` of some record matched by `query`.
    pub fn matches_key_in_query(
        &mut self,
        key: &str,
        query_key: &str,
        query: &QueryBuilder,
    ) -> Result<&mut Self> {
        let nested = query.nested_document()?;
        Ok(self.set_condition(key, "$select", json!({"key": query_key, "query": nested})))
    }

    /// Records of `parent`'s relation stored in `key`.
    pub fn related_to(&mut self, parent: &Pointer, key: &str) -> Result<&mut Self> {
        let object = parent.encode()?;
        self.where_.insert(
            "$relatedTo".to_string(),
            json!({"object": object, "key": key}),
        );
        Ok(self)
    }

    /// A query matching any of `queries`.
    ///
    /// Only the `where` documents are combined; ordering and paging of the
    /// inputs are dropped.
    pub fn or_queries(queries: &[QueryBuilder]) -> Result<QueryBuilder> {
        let first = queries
            .first()
            .ok_or_else(|| Error::InvalidQuery("or_queries needs at least one query".into()))?;
        if queries.iter().any(|q| q.class_name != first.class_name) {
            return Err(Error::InvalidQuery(
                "all queries must be for the same class".into(),
            ));
        }

        let mut query = QueryBuilder {
            class_name: first.class_name.clone(),
            ..Self::default()
        };
        let branches = queries
            .iter()
            .map(|q| serde_json::Value::Object(q.where_.clone()))
            .collect();
        query
            .where_
            .insert("$or".to_string(), serde_json::Value::Array(branches));
        Ok(query)
    }

    // ------------------------------------------------------------------------
    // Directives
    // ------------------------------------------------------------------------

    /// Sort by `key`, replacing any previous order.
    pub fn ascending(&mut self, key: &str) -> &mut Self {
        self.order.clear();
        self.add_ascending(key)
    }

    pub fn descending(&mut self, key: &str) -> &mut Self {
        self.order.clear();
        self.add_descending(key)
    }

    /// Add a secondary sort key.
    pub fn add_ascending(&mut self, key: &str) -> &mut Self {
        self.order.push(key.to_string());
        self
    }

    pub fn add_descending(&mut self, key: &str) -> &mut Self {
        self.order.push(format!("-{}", key));
        self
    }

    /// Embed the records referenced by a pointer field.
    pub fn include(&mut self, key: &str) -> &mut Self {
        if !self.include.iter().any(|k| k == key) {
            self.include.push(key.to_string());
        }
        self
    }

    pub fn limit(&mut self, limit: u32) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(&mut self, skip: u32) -> &mut Self {
        self.skip = skip;
        self
    }

    /// Ask the server for the total number of matches.
    pub fn count(&mut self, count: bool) -> &mut Self {
        self.count = count;
        self
    }

    // ------------------------------------------------------------------------
    // Output
    // ------------------------------------------------------------------------

    /// The raw constraint document.
    pub fn where_document(&self) -> &Map<String, serde_json::Value> {
        &self.where_
    }

    /// The option document. Empty and default directives are omitted.
    pub fn options(&self) -> serde_json::Value {
        let mut options = Map::new();
        if !self.where_.is_empty() {
            options.insert("where".into(), serde_json::Value::Object(self.where_.clone()));
        }
        if !self.include.is_empty() {
            options.insert("include".into(), self.include.join(",").into());
        }
        if let Some(limit) = self.limit {
            options.insert("limit".into(), limit.into());
        }
        if self.skip > 0 {
            options.insert("skip".into(), self.skip.into());
        }
        if !self.order.is_empty() {
            options.insert("order".into(), self.order.join(",").into());
        }
        if self.count {
            options.insert("count".into(), 1.into());
        }
        serde_json::Value::Object(options)
    }

    /// The option document as query string parameters, `where` JSON-encoded.
    pub fn query_params(&self) -> Vec<(String, String)> {
        let serde_json::Value::Object(options) = self.options() else {
            return Vec::new();
        };
        options
            .into_iter()
            .map(|(name, value)| {
                let rendered = match value {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (name, rendered)
            })
            .collect()
    }

    /// The request this query sends.
    pub fn request(&self, context: &SessionContext) -> Result<Request> {
        Ok(Request::new(Method::Get, self.api_path()?)
            .with_query(self.query_params())
            .with_session_token(context.session_token().map(str::to_string)))
    }

    // ------------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------------

    /// Run the query. Results are fully fetched records.
    pub fn find<T: Transport + ?Sized>(
        &self,
        transport: &T,
        context: &SessionContext,
    ) -> Result<Vec<Record>> {
        let class_name = self.require_class()?;
        let request = self.request(context)?;
        debug!(class = %class_name, path = %request.path, "running query");

        let response = transport.send(&request)?;
        let rows = response
            .get("results")
            .and_then(|results| results.as_array())
            .ok_or_else(|| Error::InvalidResponse("query response has no results array".into()))?;

        rows.iter()
            .map(|row| Record::from_server(class_name, row, true))
            .collect()
    }

    /// Run the query for at most one record.
    pub fn first<T: Transport + ?Sized>(
        &self,
        transport: &T,
        context: &SessionContext,
    ) -> Result<Option<Record>> {
        let mut query = self.clone();
        query.limit(1);
        Ok(query.find(transport, context)?.into_iter().next())
    }

    /// Count matching records without fetching them.
    pub fn count_results<T: Transport + ?Sized>(
        &self,
        transport: &T,
        context: &SessionContext,
    ) -> Result<u64> {
        let mut query = self.clone();
        query.count(true).limit(0);
        let response = transport.send(&query.request(context)?)?;
        response
            .get("count")
            .and_then(|count| count.as_u64())
            .ok_or_else(|| Error::InvalidResponse("count response has no count".into()))
    }

    fn add_condition(&mut self, key: &str, operator: &str, value: &Value) -> Result<&mut Self> {
        let encoded = codec::encode(value)?;
        Ok(self.set_condition(key, operator, encoded))
    }

    fn set_condition(&mut self, key: &str, operator: &str, value: serde_json::Value) -> &mut Self {
        let entry = self
            .where_
            .entry(key.to_string())
            .or_insert_with(|| serde_json::Value::Object(Map::new()));
        // A literal equality is replaced by the operator map
        if !entry.is_object() {
            *entry = serde_json::Value::Object(Map::new());
        }
        if let serde_json::Value::Object(conditions) = entry {
            conditions.insert(operator.to_string(), value);
        }
        self
    }

    fn nested_document(&self) -> Result<serde_json::Value> {
        let class_name = self.require_class()?;
        let mut document = match self.options() {
            serde_json::Value::Object(options) => options,
            _ => Map::new(),
        };
        document.insert("className".into(), class_name.into());
        Ok(serde_json::Value::Object(document))
    }

    fn require_class(&self) -> Result<&str> {
        self.class_name
            .as_deref()
            .ok_or_else(|| Error::InvalidQuery("query has no class name".into()))
    }
}
