//! Edge case tests for mbaas-engine
//!
//! These tests drive records, queries and sessions through the public API
//! and a mock transport.

use mbaas_engine::{
    codec, Acl, CurrentUser, Error, FieldOperation, GeoPoint, MemoryStorage, Method,
    MockTransport, Pointer, QueryBuilder, Record, SessionContext, Subject, TransportError, Value,
};
use serde_json::json;

fn fetched_post(document: serde_json::Value) -> Record {
    Record::from_server("Post", &document, true).unwrap()
}

// ============================================================================
// String Edge Cases
// ============================================================================

#[test]
fn unicode_field_values() {
    let values = [
        "日本語テスト",
        "Привет мир",
        "🎉🚀💯",
        "Hello\nWorld\tTab",
        "Null\0Test",
    ];

    for (i, text) in values.iter().enumerate() {
        let key = format!("field_{}", i);
        let mut record = Record::new("Post");
        record.set(&key, *text).unwrap();

        let encoded = record.encode().unwrap();
        assert_eq!(encoded[&key], json!(text));

        let restored = Record::from_server("Post", &encoded, true).unwrap();
        assert_eq!(restored.get(&key).unwrap(), Some(&Value::from(*text)));
    }
}

#[test]
fn unicode_keys_are_allowed() {
    let mut record = Record::new("Post");
    record.set("名前", "value").unwrap();
    assert!(record.has("名前"));
}

#[test]
fn empty_string_value_is_not_null() {
    let mut record = Record::new("Post");
    record.set("title", "").unwrap();
    assert_eq!(record.get("title").unwrap(), Some(&Value::from("")));
}

// ============================================================================
// Numeric Edge Cases
// ============================================================================

#[test]
fn integer_and_float_are_distinct() {
    let record = fetched_post(json!({"objectId": "p1", "i": 1, "f": 1.0}));
    assert_eq!(record.get("i").unwrap().and_then(Value::as_i64), Some(1));
    assert_ne!(record.get("i").unwrap(), record.get("f").unwrap());
}

#[test]
fn large_integers_survive_roundtrip() {
    let record = fetched_post(json!({"objectId": "p1", "big": i64::MAX, "small": i64::MIN}));
    let encoded = record.encode().unwrap();
    assert_eq!(encoded["big"], json!(i64::MAX));
    assert_eq!(encoded["small"], json!(i64::MIN));
}

#[test]
fn non_finite_floats_are_rejected() {
    assert!(matches!(Value::try_from(f64::NAN), Err(Error::Codec(_))));
    assert!(matches!(Value::try_from(f64::INFINITY), Err(Error::Codec(_))));
}

#[test]
fn non_finite_float_never_reaches_a_query() {
    let mut query = QueryBuilder::new("Post");
    let result = Value::try_from(f64::NAN).and_then(|score| {
        query.equal_to("score", score)?;
        Ok(())
    });
    assert!(matches!(result, Err(Error::Codec(_))));
    assert!(query.where_document().is_empty());
}

#[test]
fn finite_float_is_stored_as_number() {
    let mut post = Record::new("Post");
    post.set("score", Value::try_from(2.5).unwrap()).unwrap();
    assert_eq!(post.get("score").unwrap().and_then(Value::as_f64), Some(2.5));
}

// ============================================================================
// GeoPoint Edge Cases
// ============================================================================

#[test]
fn geo_point_bounds_are_inclusive() {
    assert!(GeoPoint::new(90.0, 180.0).is_ok());
    assert!(GeoPoint::new(-90.0, -180.0).is_ok());
    assert_eq!(GeoPoint::new(91.0, 0.0), Err(Error::LatitudeOutOfRange(91.0)));
    assert_eq!(
        GeoPoint::new(0.0, -180.5),
        Err(Error::LongitudeOutOfRange(-180.5))
    );
}

// ============================================================================
// Operation Sequences
// ============================================================================

#[test]
fn set_absorbs_later_array_operations() {
    let mut record = Record::new("Post");
    record
        .set_array("tags", vec!["x".into(), "y".into()])
        .unwrap();
    record.remove("tags", vec!["x".into()]).unwrap();

    assert_eq!(
        record.operation("tags"),
        Some(&FieldOperation::set(Value::List(vec!["y".into()])))
    );
}

#[test]
fn delete_then_add_becomes_set() {
    let mut record = fetched_post(json!({"objectId": "p1", "tags": ["old"]}));
    record.delete("tags").unwrap();
    record.add("tags", vec!["new".into()]).unwrap();

    assert_eq!(
        record.get("tags").unwrap(),
        Some(&Value::List(vec!["new".into()]))
    );
    assert_eq!(record.encode().unwrap()["tags"], json!(["new"]));
}

#[test]
fn add_unique_is_idempotent() {
    let mut once = fetched_post(json!({"objectId": "p1", "tags": ["a"]}));
    once.add_unique("tags", vec!["b".into()]).unwrap();

    let mut twice = once.clone();
    twice.add_unique("tags", vec!["b".into()]).unwrap();

    assert_eq!(once.get("tags").unwrap(), twice.get("tags").unwrap());
}

#[test]
fn add_unique_compares_pointers_by_id() {
    let mut record = fetched_post(json!({
        "objectId": "p1",
        "readers": [{"__type": "Pointer", "className": "user", "objectId": "u1"}]
    }));
    record
        .add_unique("readers", vec![Pointer::new("user", "u1").into()])
        .unwrap();
    assert_eq!(
        record.get("readers").unwrap().and_then(Value::as_list).map(<[Value]>::len),
        Some(1)
    );
}

#[test]
fn remove_after_add_is_rejected() {
    let mut record = Record::new("Post");
    record.add("tags", vec!["a".into()]).unwrap();
    let err = record.remove("tags", vec!["a".into()]).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Remove operation is invalid after previous Add operation"
    );
}

#[test]
fn scalar_field_is_treated_as_single_item_list() {
    let mut record = fetched_post(json!({"objectId": "p1", "n": 5}));
    record.add("n", vec![6.into()]).unwrap();
    assert_eq!(
        record.get("n").unwrap(),
        Some(&Value::List(vec![5.into(), 6.into()]))
    );
}

// ============================================================================
// Availability and Server Merges
// ============================================================================

#[test]
fn partial_record_fetch_makes_everything_available() {
    let transport = MockTransport::new();
    transport.push_response(json!({"objectId": "p1", "a": 1, "b": 2}));

    let mut record = Record::from_server("Post", &json!({"objectId": "p1", "a": 1}), false).unwrap();
    assert_eq!(record.get("b"), Err(Error::FieldUnavailable("b".into())));

    record.fetch(&transport, &SessionContext::anonymous()).unwrap();
    assert_eq!(record.get("b").unwrap(), Some(&Value::from(2)));
}

#[test]
fn remove_flush_with_empty_response() {
    let transport = MockTransport::new();
    transport.push_response(json!({}));

    let mut record = fetched_post(json!({"objectId": "p1", "a": 1, "b": 2}));
    record.remove("b", vec![2.into()]).unwrap();
    record.save(&transport, &SessionContext::anonymous()).unwrap();

    let request = transport.last_request().unwrap();
    assert_eq!(request.method, Method::Put);
    assert_eq!(
        request.body,
        Some(json!({"b": {"__op": "Remove", "objects": [2]}}))
    );
    // The save response is merged partially; the folded value stays readable
    assert_eq!(record.get("b").unwrap(), Some(&Value::List(vec![])));
    assert!(!record.is_dirty("b"));
}

#[test]
fn save_response_overrides_folded_value() {
    let transport = MockTransport::new();
    transport.push_response(json!({"b": [9]}));

    let mut record = fetched_post(json!({"objectId": "p1", "b": [1, 2]}));
    record.remove("b", vec![2.into()]).unwrap();
    record.save(&transport, &SessionContext::anonymous()).unwrap();

    assert_eq!(
        record.get("b").unwrap(),
        Some(&Value::List(vec![9.into()]))
    );
}

#[test]
fn malformed_server_document() {
    let mut record = Record::new("Post");
    assert!(matches!(
        record.merge_from_server(&json!([1, 2]), true),
        Err(Error::InvalidResponse(_))
    ));
    assert!(matches!(
        record.merge_from_server(&json!({"createdAt": "yesterday"}), true),
        Err(Error::Codec(_))
    ));
    assert!(matches!(
        record.merge_from_server(&json!({"acl": {"*": {"read": "yes"}}}), true),
        Err(Error::InvalidAcl(_))
    ));
}

#[test]
fn transport_failure_is_reported() {
    let transport = MockTransport::new();
    transport.push_error(TransportError::new(Some(404), "not found"));

    let mut record = Record::pointer("Post", "missing");
    let err = record
        .fetch(&transport, &SessionContext::anonymous())
        .unwrap_err();
    assert_eq!(err.to_string(), "transport error (status 404): not found");
}

// ============================================================================
// Relations
// ============================================================================

#[test]
fn relation_add_and_remove_merge() {
    let mut user = Record::pointer("user", "u1");
    let mut likes = user.relation("likes").unwrap();
    likes
        .add(&mut user, &[Pointer::new("Post", "p1"), Pointer::new("Post", "p2")])
        .unwrap();
    likes.remove(&mut user, &[Pointer::new("Post", "p1")]).unwrap();

    assert_eq!(
        user.encode().unwrap()["likes"],
        json!({
            "__op": "Batch",
            "ops": [
                {
                    "__op": "AddRelation",
                    "objects": [{"__type": "Pointer", "className": "Post", "objectId": "p2"}]
                },
                {
                    "__op": "RemoveRelation",
                    "objects": [{"__type": "Pointer", "className": "Post", "objectId": "p1"}]
                }
            ]
        })
    );
}

#[test]
fn relation_requires_saved_targets() {
    let mut user = Record::pointer("user", "u1");
    let mut likes = user.relation("likes").unwrap();
    assert_eq!(
        likes.add(&mut user, &[Pointer::unassigned("Post")]),
        Err(Error::UnassignedReference("Post".into()))
    );
    assert!(!user.is_dirty("likes"));
}

#[test]
fn relation_handle_follows_record_through_first_save() {
    let mut post = Record::new("Post");
    let mut draft_likes = post.relation("likes").unwrap();
    draft_likes
        .add(&mut post, &[Pointer::new("user", "u1")])
        .unwrap();

    let transport = MockTransport::new();
    transport.push_response(json!({"objectId": "p9", "createdAt": "2024-01-01T00:00:00.000Z"}));
    post.save(&transport, &SessionContext::anonymous()).unwrap();

    // the draft handle no longer matches the saved record
    assert!(matches!(
        draft_likes.add(&mut post, &[Pointer::new("user", "u2")]),
        Err(Error::InvalidRelation(_))
    ));

    let mut likes = post.relation("likes").unwrap();
    assert_eq!(likes.parent(), &Pointer::new("Post", "p9"));
    likes.add(&mut post, &[Pointer::new("user", "u2")]).unwrap();
    assert!(post.is_dirty("likes"));
}

#[test]
fn relation_after_plain_operation_is_rejected() {
    let mut user = Record::pointer("user", "u1");
    user.add("likes", vec!["x".into()]).unwrap();
    assert!(user.relation("likes").is_err());
}

#[test]
fn fetched_relation_queries_its_members() {
    let user = Record::from_server(
        "user",
        &json!({
            "objectId": "u1",
            "likes": {"__type": "Relation", "className": "Post"}
        }),
        true,
    )
    .unwrap();
    let query = user.relation("likes").unwrap().query().unwrap();
    assert_eq!(query.api_path().unwrap(), "classes/Post");
    assert_eq!(
        query.options()["where"]["$relatedTo"]["key"],
        json!("likes")
    );
}

// ============================================================================
// ACL
// ============================================================================

#[test]
fn acl_revoke_unknown_subject_is_noop() {
    let mut acl = Acl::new();
    acl.set_write_access(&Subject::User("u1".into()), false)
        .unwrap();
    assert!(acl.is_empty());
    assert_eq!(acl.to_data(), json!({}));
}

#[test]
fn acl_last_permission_removes_subject() {
    let mut acl = Acl::new();
    let admins = Subject::Role("admins".into());
    acl.set_read_access(&admins, true).unwrap();
    acl.set_read_access(&admins, false).unwrap();
    assert!(acl.is_empty());
    assert!(!acl.read_access(&admins));
}

#[test]
fn acl_roundtrip() {
    let mut acl = Acl::new();
    acl.set_public_read_access(true);
    acl.set_role_write_access("editors", true).unwrap();
    acl.set_write_access(&Subject::User("u1".into()), true)
        .unwrap();

    assert_eq!(Acl::from_data(&acl.to_data()).unwrap(), acl);
    assert_eq!(
        acl.to_data(),
        json!({
            "*": {"read": true},
            "role:editors": {"write": true},
            "u1": {"write": true}
        })
    );
}

#[test]
fn empty_acl_saves_as_object() {
    let transport = MockTransport::new();
    transport.push_response(json!({"objectId": "p1"}));

    let mut record = Record::new("Post");
    record.set_acl(&Acl::new()).unwrap();
    record.save(&transport, &SessionContext::anonymous()).unwrap();

    assert_eq!(
        transport.last_request().unwrap().body,
        Some(json!({"acl": {}}))
    );
}

// ============================================================================
// Codec
// ============================================================================

#[test]
fn date_fields_roundtrip_through_records() {
    let record = fetched_post(json!({
        "objectId": "p1",
        "publishedAt": {"__type": "Date", "iso": "2024-02-01T09:00:00.123+09:00"}
    }));
    assert_eq!(
        record.encode().unwrap()["publishedAt"],
        json!({"__type": "Date", "iso": "2024-02-01T00:00:00.123Z"})
    );
}

#[test]
fn to_json_renders_compactly() {
    let pointer = Pointer::new("Post", "p1");
    assert_eq!(
        codec::to_json(&pointer).unwrap(),
        r#"{"__type":"Pointer","className":"Post","objectId":"p1"}"#
    );
}

// ============================================================================
// Queries and Sessions
// ============================================================================

#[test]
fn query_with_session_token() {
    let transport = MockTransport::new();
    transport.push_response(json!({"results": [{"objectId": "p1"}]}));

    let mut query = QueryBuilder::new("Post");
    query.equal_to("author", Pointer::new("user", "u1")).unwrap();
    let found = query
        .first(&transport, &SessionContext::with_token("t1"))
        .unwrap()
        .unwrap();

    assert_eq!(found.object_id(), Some("p1"));
    let request = transport.last_request().unwrap();
    assert_eq!(request.session_token.as_deref(), Some("t1"));
}

#[test]
fn session_survives_restore() {
    let transport = MockTransport::new();
    transport
        .push_response(json!({"objectId": "u1", "userName": "alice", "sessionToken": "t1"}))
        .push_response(json!({"objectId": "p1"}));

    let mut current = CurrentUser::new(MemoryStorage::new());
    current.log_in(&transport, "alice", "secret").unwrap();

    // A later run restores the user from storage
    let current = CurrentUser::new(current.into_storage());
    let (user, context) = current.current().unwrap().unwrap();
    assert_eq!(user.user_name().unwrap(), Some("alice"));

    let mut post = Record::new("Post");
    post.set_acl(&Acl::for_user(&user).unwrap()).unwrap();
    post.save(&transport, &context).unwrap();

    let request = transport.last_request().unwrap();
    assert_eq!(request.session_token.as_deref(), Some("t1"));
    assert_eq!(
        request.body,
        Some(json!({"acl": {"u1": {"read": true, "write": true}}}))
    );
}
