//! Integration tests for attachment replication.

use docsync_replicate::hash::hash_attachment;
use docsync_replicate::{Checks, Origin, ReplicateConfig};
use docsync_storage::{Attachment, DocumentStorage, StorageError};
use docsync_testkit::prelude::*;
use serde_json::json;

fn both_sides(config: ReplicateConfig) -> ReplicateConfig {
    config
        .with_attachment_checks(Origin::Local, Checks::all())
        .with_attachment_checks(Origin::Remote, Checks::all())
}

/// A pair where document `a` exists and is synchronized on both sides.
fn pair_with_doc(configure: impl FnOnce(ReplicateConfig) -> ReplicateConfig) -> ReplicaPair {
    init_tracing();
    let pair = ReplicaPair::with_config(configure);
    pair.local.put("a", doc(json!({"title": "a"}))).unwrap();
    pair.storage.repair().unwrap();
    pair
}

#[test]
fn remote_attachment_reaches_local() {
    let pair = pair_with_doc(|c| c.with_attachment_checks(Origin::Remote, Checks::all()));
    let attachment = Attachment::new("image/png", vec![1u8, 2, 3]);
    pair.remote
        .put_attachment("a", "img", attachment.clone())
        .unwrap();

    let report = pair.storage.repair().unwrap();

    assert_eq!(report.attachments_propagated, 1);
    assert_eq!(report.documents_propagated, 0);
    assert_eq!(pair.local.get_attachment("a", "img").unwrap(), attachment);
    assert_eq!(
        pair.storage
            .signatures()
            .get_attachment("a", "img")
            .unwrap()
            .hash,
        hash_attachment(&attachment.data)
    );
}

#[test]
fn attachments_are_ignored_by_default() {
    let pair = pair_with_doc(|c| c);
    pair.local
        .put_attachment("a", "img", Attachment::binary(vec![1u8]))
        .unwrap();

    let report = pair.storage.repair().unwrap();

    assert!(report.is_noop());
    assert!(pair
        .remote
        .get_attachment("a", "img")
        .unwrap_err()
        .is_not_found());
}

#[test]
fn second_repair_writes_nothing() {
    let pair = pair_with_doc(both_sides);
    pair.local
        .put_attachment("a", "one", Attachment::binary(vec![1u8]))
        .unwrap();
    pair.remote
        .put_attachment("a", "two", Attachment::binary(vec![2u8]))
        .unwrap();
    pair.storage.repair().unwrap();
    pair.reset_writes();

    let report = pair.storage.repair().unwrap();

    assert!(report.is_noop());
    assert_eq!(pair.writes(), 0);
    assert_eq!(
        pair.local.all_attachments("a").unwrap(),
        pair.remote.all_attachments("a").unwrap()
    );
}

#[test]
fn attachment_removal_propagates() {
    let pair = pair_with_doc(both_sides);
    pair.local
        .put_attachment("a", "img", Attachment::binary(vec![1u8]))
        .unwrap();
    pair.storage.repair().unwrap();

    pair.remote.remove_attachment("a", "img").unwrap();
    let report = pair.storage.repair().unwrap();

    assert_eq!(report.attachments_deleted, 1);
    assert!(pair.local.all_attachments("a").unwrap().is_empty());
    assert!(pair
        .storage
        .signatures()
        .all_attachments("a")
        .unwrap()
        .is_empty());
}

#[test]
fn document_deletion_empties_attachments_first() {
    let pair = pair_with_doc(both_sides);
    pair.local
        .put_attachment("a", "img", Attachment::binary(vec![1u8]))
        .unwrap();
    pair.storage.repair().unwrap();
    assert!(pair.remote.get_attachment("a", "img").is_ok());

    pair.local.remove("a").unwrap();
    let report = pair.storage.repair().unwrap();

    assert_eq!(report.attachments_deleted, 1);
    assert_eq!(report.documents_deleted, 1);
    assert!(pair.remote.get("a").unwrap_err().is_not_found());
    assert!(pair.storage.signatures().get("a").unwrap_err().is_not_found());
}

#[test]
fn divergent_attachment_edits_raise_conflict() {
    let pair = pair_with_doc(both_sides);
    pair.local
        .put_attachment("a", "img", Attachment::binary(vec![0u8]))
        .unwrap();
    pair.storage.repair().unwrap();

    pair.local
        .put_attachment("a", "img", Attachment::binary(vec![1u8]))
        .unwrap();
    pair.remote
        .put_attachment("a", "img", Attachment::binary(vec![2u8]))
        .unwrap();
    let err = pair.storage.repair().unwrap_err();

    match err {
        StorageError::Conflict { id, attachment, .. } => {
            assert_eq!(id, "a");
            assert_eq!(attachment.as_deref(), Some("img"));
        }
        other => panic!("expected a conflict, got {other}"),
    }
}

#[test]
fn parallel_attachment_jobs_copy_everything() {
    let pair = pair_with_doc(|c| both_sides(c).with_parallelism(2, 4));
    for i in 0..12u8 {
        pair.local
            .put_attachment("a", &format!("file{i}"), Attachment::binary(vec![i]))
            .unwrap();
    }

    let report = pair.storage.repair().unwrap();

    assert_eq!(report.attachments_propagated, 12);
    assert_eq!(pair.remote.all_attachments("a").unwrap().len(), 12);
    assert_eq!(
        pair.remote.get_attachment("a", "file7").unwrap().data[..],
        [7u8]
    );
}
