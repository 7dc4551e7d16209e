//! Property tests for whole repair cycles.

use docsync_replicate::hash::hash_document;
use docsync_replicate::ConflictHandling;
use docsync_storage::DocumentStorage;
use docsync_testkit::prelude::*;
use proptest::prelude::*;
use std::collections::BTreeMap;

fn seed(pair: &ReplicaPair, placements: &BTreeMap<String, Placement>) {
    for (id, placement) in placements {
        match placement {
            Placement::Local(d) => {
                pair.local.put(id, d.clone()).unwrap();
            }
            Placement::Remote(d) => {
                pair.remote.put(id, d.clone()).unwrap();
            }
            Placement::Both(d) => {
                pair.local.put(id, d.clone()).unwrap();
                pair.remote.put(id, d.clone()).unwrap();
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn repair_converges(placements in placement_strategy()) {
        let pair = ReplicaPair::new();
        seed(&pair, &placements);

        pair.storage.repair().unwrap();

        prop_assert_eq!(pair.local_ids(), pair.remote_ids());
        prop_assert_eq!(pair.local_ids().len(), placements.len());
        for id in placements.keys() {
            let local = pair.local.get(id).unwrap();
            prop_assert_eq!(&local, &pair.remote.get(id).unwrap());
            let record = pair.storage.signatures().get(id).unwrap();
            prop_assert_eq!(record.hash, hash_document(&local));
        }
    }

    #[test]
    fn repair_is_idempotent(
        placements in placement_strategy(),
        workers in 1usize..4,
    ) {
        let pair = ReplicaPair::with_config(|c| c.with_parallelism(workers, 1));
        seed(&pair, &placements);
        pair.storage.repair().unwrap();
        pair.reset_writes();

        let report = pair.storage.repair().unwrap();

        prop_assert!(report.is_noop());
        prop_assert_eq!(pair.writes(), 0);
    }

    #[test]
    fn policies_settle_divergent_edits(
        handling in conflict_handling_strategy(),
        local in document_strategy(),
        remote in document_strategy(),
    ) {
        let original = doc(serde_json::json!({"v": 0}));
        prop_assume!(local != remote && local != original && remote != original);
        let pair = ReplicaPair::with_config(|c| c.with_conflict_handling(handling));
        pair.local.put("a", original).unwrap();
        pair.storage.repair().unwrap();
        pair.local.put("a", local.clone()).unwrap();
        pair.remote.put("a", remote.clone()).unwrap();

        let result = pair.storage.repair();

        let (local_after, remote_after) =
            (pair.local.get("a").unwrap(), pair.remote.get("a").unwrap());
        match handling {
            ConflictHandling::Raise => {
                prop_assert!(result.unwrap_err().is_conflict());
                prop_assert_eq!(local_after, local);
                prop_assert_eq!(remote_after, remote);
            }
            ConflictHandling::KeepLocal => {
                prop_assert!(result.is_ok());
                prop_assert_eq!(&remote_after, &local);
                prop_assert_eq!(local_after, local);
            }
            ConflictHandling::KeepRemote => {
                prop_assert!(result.is_ok());
                prop_assert_eq!(&local_after, &remote);
                prop_assert_eq!(remote_after, remote);
            }
            ConflictHandling::Continue => {
                prop_assert!(result.is_ok());
                prop_assert_eq!(local_after, local);
                prop_assert_eq!(remote_after, remote);
            }
        }
    }
}
