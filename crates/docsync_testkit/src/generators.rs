//! Property-based test generators using proptest.
//!
//! Provides strategies for documents, attachments, fingerprints and
//! replica layouts.

use bytes::Bytes;
use docsync_replicate::ConflictHandling;
use docsync_storage::{Attachment, Document};
use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Strategy for document ids.
pub fn doc_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_-]{0,11}").expect("Invalid regex")
}

/// Strategy for attachment names.
pub fn attachment_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z]{1,8}(\\.[a-z]{2,3})?").expect("Invalid regex")
}

/// Strategy for scalar JSON values.
pub fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        "[ -~]{0,16}".prop_map(Value::String),
    ]
}

/// Strategy for JSON values up to a small nesting depth.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    scalar_strategy().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

/// Strategy for documents.
pub fn document_strategy() -> impl Strategy<Value = Document> {
    prop::collection::btree_map("[a-z]{1,8}", value_strategy(), 0..6)
        .prop_map(|map| map.into_iter().collect())
}

/// Strategy for attachments.
pub fn attachment_strategy() -> impl Strategy<Value = Attachment> {
    (
        prop_oneof![
            Just("application/octet-stream"),
            Just("text/plain"),
            Just("image/png")
        ],
        prop::collection::vec(any::<u8>(), 0..256),
    )
        .prop_map(|(content_type, data)| Attachment::new(content_type, Bytes::from(data)))
}

/// Strategy for optional fingerprints drawn from a small alphabet, so that
/// equal fingerprints are frequent.
pub fn fingerprint_strategy() -> impl Strategy<Value = Option<String>> {
    prop::option::of(prop_oneof![Just("h1"), Just("h2"), Just("h3")].prop_map(String::from))
}

/// Strategy for conflict policies.
pub fn conflict_handling_strategy() -> impl Strategy<Value = ConflictHandling> {
    prop_oneof![
        Just(ConflictHandling::Raise),
        Just(ConflictHandling::KeepLocal),
        Just(ConflictHandling::KeepRemote),
        Just(ConflictHandling::Continue),
    ]
}

/// Where a document lives before the first repair.
#[derive(Debug, Clone)]
pub enum Placement {
    /// Only on the local side.
    Local(Document),
    /// Only on the remote side.
    Remote(Document),
    /// On both sides with the same content.
    Both(Document),
}

/// Strategy for sets of never-synchronized documents, none of which
/// conflicts with another.
pub fn placement_strategy() -> impl Strategy<Value = BTreeMap<String, Placement>> {
    let placement = prop_oneof![
        document_strategy().prop_map(Placement::Local),
        document_strategy().prop_map(Placement::Remote),
        document_strategy().prop_map(Placement::Both),
    ];
    prop::collection::btree_map(doc_id_strategy(), placement, 0..12)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::strategy::ValueTree;
    use proptest::test_runner::TestRunner;

    #[test]
    fn ids_are_never_empty() {
        let mut runner = TestRunner::default();
        for _ in 0..50 {
            let id = doc_id_strategy().new_tree(&mut runner).unwrap().current();
            assert!(!id.is_empty());
        }
    }

    proptest! {
        #[test]
        fn documents_are_objects(d in document_strategy()) {
            prop_assert!(d.len() < 6);
        }

        #[test]
        fn attachments_keep_their_type(a in attachment_strategy()) {
            prop_assert!(!a.content_type.is_empty());
            prop_assert!(a.len() < 256);
        }
    }
}
