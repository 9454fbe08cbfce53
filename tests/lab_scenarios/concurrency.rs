//! Concurrent writers

use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

use labcore::{
    EntityFilter, EntityId, EntityStatus, EventDraft, EventQuery, LabError, TenantScope,
};
use serde_json::json;

use crate::common::{lab, tenant};

#[test]
fn concurrent_appends_get_unique_ids() {
    let lab = lab();
    let threads = 8;
    let per_thread = 50;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let events = lab.events().clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                (0..per_thread)
                    .map(|i| {
                        events
                            .append(
                                EventDraft::new("probe.reading")
                                    .payload(json!({"thread": t, "seq": i})),
                            )
                            .unwrap()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut ids = HashSet::new();
    for handle in handles {
        let mine = handle.join().unwrap();
        // Ids are increasing within one thread
        assert!(mine.windows(2).all(|w| w[0] < w[1]));
        ids.extend(mine);
    }
    assert_eq!(ids.len(), threads * per_thread);
    assert_eq!(lab.events().len(), threads * per_thread);

    let all = lab.events().query(EventQuery::new()).collect_all().unwrap();
    assert!(all
        .windows(2)
        .all(|w| (w[0].timestamp, w[0].id) < (w[1].timestamp, w[1].id)));
}

#[test]
fn stale_conditional_update_conflicts() {
    let lab = lab();
    let t1 = tenant(&lab, "Acme Labs");
    let sample = lab
        .entities()
        .create("sample", "S1", json!({"volume_ml": 5}), Some(t1.id))
        .unwrap();

    let first = lab
        .entities()
        .update_attributes_if_unmodified(sample.id, json!({"volume_ml": 4}), sample.updated_at)
        .unwrap();
    assert!(first.updated_at > sample.updated_at);

    let err = lab
        .entities()
        .update_attributes_if_unmodified(sample.id, json!({"volume_ml": 3}), sample.updated_at)
        .unwrap_err();
    assert!(matches!(err, LabError::Conflict { .. }));
    assert!(err.is_retryable());
    assert_eq!(lab.entities().get(sample.id).unwrap().attributes["volume_ml"], json!(4));
}

#[test]
fn racing_conditional_updates_admit_one_winner() {
    let lab = lab();
    let t1 = tenant(&lab, "Acme Labs");
    let sample = lab
        .entities()
        .create("sample", "S1", json!({"owner": "none"}), Some(t1.id))
        .unwrap();

    let threads = 6;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let entities = lab.entities().clone();
            let barrier = Arc::clone(&barrier);
            let (id, stamp) = (sample.id, sample.updated_at);
            thread::spawn(move || {
                barrier.wait();
                entities.update_attributes_if_unmodified(id, json!({"owner": t}), stamp)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    for result in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(matches!(result, LabError::Conflict { .. }), "{result:?}");
    }
}

#[test]
fn racing_registrations_of_one_version_admit_one_contract() {
    let lab = lab();
    let threads = 4;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let schemas = lab.schemas().clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let mut contract = serde_json::Map::new();
                contract.insert(
                    format!("field_{t}"),
                    json!({"type": "string", "required": true}),
                );
                schemas.register("instrument", 1, serde_json::Value::Object(contract))
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(
            matches!(
                err,
                LabError::ConflictingSchemaVersion { .. } | LabError::Conflict { .. }
            ),
            "{err:?}"
        );
    }
    assert_eq!(lab.schemas().versions("instrument").unwrap().len(), 1);
}

#[test]
fn plain_updates_racing_reassignment_keep_tenancy_consistent() {
    let lab = lab();
    let t1 = tenant(&lab, "Acme Labs");
    let t2 = tenant(&lab, "Globex");
    let sample = lab
        .entities()
        .create("sample", "S1", json!({"reading": 0}), Some(t1.id))
        .unwrap();

    let updaters = 3;
    let rounds = 200;
    let barrier = Arc::new(Barrier::new(updaters + 1));

    let mut handles: Vec<_> = (0..updaters)
        .map(|t| {
            let entities = lab.entities().clone();
            let barrier = Arc::clone(&barrier);
            let id = sample.id;
            thread::spawn(move || {
                barrier.wait();
                (0..rounds)
                    .filter_map(|i| {
                        entities
                            .update_attributes(id, json!({ "reading": i, "writer": t }))
                            .err()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    handles.push({
        let entities = lab.entities().clone();
        let barrier = Arc::clone(&barrier);
        let (id, tenants) = (sample.id, [t2.id, t1.id]);
        thread::spawn(move || {
            barrier.wait();
            (0..rounds)
                .filter_map(|i| entities.reassign_tenant(id, tenants[i % 2]).err())
                .collect::<Vec<_>>()
        })
    });

    for handle in handles {
        for err in handle.join().unwrap() {
            assert!(matches!(err, LabError::Conflict { .. }), "{err:?}");
        }
    }

    let current = lab.entities().get(sample.id).unwrap();
    assert!(current.active);
    let owner = current.owning_tenant.unwrap();
    let other = if owner == t1.id { t2.id } else { t1.id };
    assert!(lab.entities().get(owner).unwrap().active);

    let listed_in = |scope: EntityId| -> bool {
        lab.entities()
            .list(TenantScope::Tenant(scope), EntityFilter::new())
            .unwrap()
            .collect_all()
            .unwrap()
            .iter()
            .any(|e| e.id == sample.id)
    };
    assert!(listed_in(owner));
    assert!(!listed_in(other));

    // The tenant that lost the sample has no active members left
    lab.entities().set_status(other, EntityStatus::Inactive).unwrap();
    let err = lab
        .entities()
        .set_status(owner, EntityStatus::Inactive)
        .unwrap_err();
    assert!(matches!(err, LabError::TenantIsolationViolation { .. }));
}
