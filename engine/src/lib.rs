//! # mbaas Engine
//!
//! Client-side object model for a document-store backend.
//!
//! This crate mirrors remote documents locally, tracks pending changes as
//! mergeable field operations, and turns them into wire documents. It never
//! performs IO itself: every request goes through a [`Transport`] supplied by
//! the caller.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine builds requests and folds responses; transports
//!   live elsewhere
//! - **Explicit identity**: no global "current user"; requests take a
//!   [`SessionContext`]
//! - **Closed values**: stored data is a [`Value`], so the codec and the
//!   operation algebra are exhaustively matchable
//!
//! ## Core Concepts
//!
//! ### Records
//!
//! A [`Record`] keeps three views of its fields:
//! - Server data, last confirmed by the backend
//! - Pending operations, at most one per field
//! - Estimated data, server data with the pending operations applied
//!
//! ### Field Operations
//!
//! Local edits become [`FieldOperation`]s. A new edit on a dirty field is
//! merged with the pending one, so a field never carries more than one:
//! - `Set` overwrites, `Delete` removes
//! - `Add`, `AddUnique` and `Remove` edit array fields
//! - `Relation` adds and removes members of a many-to-many relation
//!
//! Some sequences have no sound merge (e.g. `Remove` right after `Add`) and
//! are rejected with [`Error::InvalidOperationSequence`].
//!
//! ### Codec
//!
//! The [`codec`] module maps values to the tagged JSON wire form
//! (`{"__type": "Date" | "Pointer" | "GeoPoint" | "Relation", ...}`).
//!
//! ## Quick Start
//!
//! ```rust
//! use mbaas_engine::{MockTransport, Record, SessionContext, Value};
//! use serde_json::json;
//!
//! // 1. Edit a new record
//! let mut post = Record::new("Post");
//! post.set("title", "Hello")?;
//! post.add_unique("tags", vec!["rust".into(), "sync".into()])?;
//!
//! // 2. Save it through a transport
//! let transport = MockTransport::new();
//! transport.push_response(json!({
//!     "objectId": "p1",
//!     "createdAt": "2024-02-01T00:00:00.000Z"
//! }));
//! post.save(&transport, &SessionContext::anonymous())?;
//!
//! let request = transport.last_request().unwrap();
//! assert_eq!(request.path, "classes/Post");
//! assert_eq!(
//!     request.body,
//!     Some(json!({
//!         "tags": {"__op": "AddUnique", "objects": ["rust", "sync"]},
//!         "title": "Hello"
//!     }))
//! );
//!
//! // 3. Read back the confirmed state
//! assert_eq!(post.object_id(), Some("p1"));
//! assert_eq!(post.get("title")?, Some(&Value::from("Hello")));
//! assert!(!post.has_pending_operations());
//! # Ok::<(), mbaas_engine::Error>(())
//! ```
//!
//! ## Sessions
//!
//! [`CurrentUser`] signs users in and out and persists the signed-in user
//! through any [`SessionStorage`].

pub mod acl;
pub mod codec;
pub mod error;
pub mod geo;
pub mod operation;
pub mod query;
pub mod record;
pub mod relation;
pub mod session;
pub mod transport;
pub mod user;
pub mod value;

// Re-export main types at crate root
pub use acl::{AccessKind, Acl, Subject};
pub use codec::Encodable;
pub use error::{Error, Result};
pub use geo::GeoPoint;
pub use operation::{FieldOperation, RelationOp};
pub use query::QueryBuilder;
pub use record::{Record, SaveSnapshot};
pub use relation::RelationHandle;
pub use session::{CurrentUser, MemoryStorage, SessionContext, SessionStorage};
pub use transport::{Method, MockTransport, Request, Transport, TransportError};
pub use value::{Pointer, Value};

/// Type aliases for clarity
pub type ClassName = String;
pub type ObjectId = String;
