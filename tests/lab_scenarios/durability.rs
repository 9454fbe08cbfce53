//! Reopen after writes: the WAL restores every component

use std::time::Duration;

use labcore::{
    EntityFilter, EntityStatus, EventDraft, EventQuery, Lab, LabConfig, LinkData, NeighborQuery,
    OpenOptions, TenantScope, Timestamp, CONFIG_FILE_NAME, WAL_FILE_NAME,
};
use serde_json::json;
use tempfile::TempDir;

use crate::common::{init_tracing, register_sensor_schema};

#[test]
fn reopen_restores_entities_relationships_schemas_and_events() {
    init_tracing();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("lab");

    let (t1, sensor, rel, last_event) = {
        let lab = Lab::open(&path).unwrap();
        register_sensor_schema(&lab);
        let t1 = lab.entities().create_tenant("Acme Labs", json!({"region": "eu"})).unwrap();
        let sensor = lab
            .entities()
            .create("device.sensor", "Probe", json!({"serial": "SN-9"}), Some(t1.id))
            .unwrap();
        let sensor = lab
            .entities()
            .update_attributes(sensor.id, json!({"range_max": 250}))
            .unwrap();
        let project = lab
            .entities()
            .create("project", "Assay", json!({}), Some(t1.id))
            .unwrap();
        let rel = lab
            .graph()
            .link(project.id, sensor.id, "uses", LinkData::default().strength(0.5))
            .unwrap();
        lab.flush().unwrap();
        (t1, sensor, rel, lab.events().last_id())
    };

    assert!(path.join(WAL_FILE_NAME).exists());

    let lab = Lab::open(&path).unwrap();
    assert!(lab.database().recovery_stats().commits > 0);

    assert_eq!(lab.entities().get(sensor.id).unwrap(), sensor);
    assert_eq!(lab.graph().get(rel.id).unwrap(), rel);
    assert_eq!(lab.schemas().get_active("device.sensor").unwrap().version, 1);
    assert_eq!(lab.events().last_id(), last_event);

    let members = lab
        .entities()
        .list(TenantScope::Tenant(t1.id), EntityFilter::new())
        .unwrap()
        .collect_all()
        .unwrap();
    // Root, sensor and project
    assert_eq!(members.len(), 3);

    let neighbors = lab
        .graph()
        .neighbors(TenantScope::Tenant(t1.id), rel.from, NeighborQuery::new())
        .unwrap()
        .collect_all()
        .unwrap();
    assert_eq!(neighbors.len(), 1);
    assert_eq!(neighbors[0].entity_id, sensor.id);

    // The restored schema still gates writes
    let err = lab
        .entities()
        .create("device.sensor", "Bare", json!({}), Some(t1.id))
        .unwrap_err();
    assert_eq!(err.field(), Some("serial"));

    // New ids continue after the restored ones
    let next = lab.events().append(EventDraft::new("lab.reopened")).unwrap();
    assert!(next > last_event);
}

#[test]
fn pruned_events_stay_pruned_after_reopen() {
    init_tracing();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("lab");

    let (old, recent) = {
        let lab = Lab::open(&path).unwrap();
        let old = lab
            .events()
            .append(EventDraft::new("probe.reading").at(Timestamp::from_secs(10)))
            .unwrap();
        let recent = lab.events().append(EventDraft::new("probe.reading")).unwrap();
        let report = lab.events().apply_retention(Duration::from_secs(3600)).unwrap();
        assert_eq!(report.events_pruned, 1);
        (old, recent)
    };

    let lab = Lab::open(&path).unwrap();
    assert_eq!(lab.database().recovery_stats().prunes, 1);
    assert!(lab.events().get(old).unwrap_err().is_not_found());
    assert!(lab.events().get(recent).is_ok());
    assert_eq!(lab.events().len(), 1);
    assert_eq!(lab.events().last_id(), recent);
}

#[test]
fn status_changes_survive_reopen() {
    init_tracing();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("lab");

    let project = {
        let lab = Lab::open(&path).unwrap();
        let t1 = lab.entities().create_tenant("Acme Labs", json!({})).unwrap();
        let project = lab
            .entities()
            .create("project", "Assay", json!({}), Some(t1.id))
            .unwrap();
        lab.entities()
            .set_status(project.id, EntityStatus::Archived)
            .unwrap()
    };

    let lab = Lab::open(&path).unwrap();
    let restored = lab.entities().get(project.id).unwrap();
    assert_eq!(restored.status, EntityStatus::Archived);
    assert!(!restored.active);

    let updates = lab
        .events()
        .query(EventQuery::new().entity(project.id).event_type("project.updated"))
        .collect_all()
        .unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].payload["status"], json!("archived"));
}

#[test]
fn config_file_in_directory_is_honored() {
    init_tracing();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("lab");
    std::fs::create_dir_all(&path).unwrap();
    std::fs::write(
        path.join(CONFIG_FILE_NAME),
        "[events]\npartition_window_secs = 60\n\n[query]\npage_size = 2\n",
    )
    .unwrap();

    let lab = Lab::open(&path).unwrap();
    assert_eq!(lab.database().config().events.partition_window_secs, 60);
    assert_eq!(lab.database().config().query.page_size, 2);

    for secs in [0, 61, 122] {
        lab.events()
            .append(EventDraft::new("tick").at(Timestamp::from_secs(secs)))
            .unwrap();
    }
    assert_eq!(lab.events().partition_count(), 3);
}

#[test]
fn read_only_reopen_serves_reads_and_rejects_writes() {
    init_tracing();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("lab");

    let t1 = {
        let lab = Lab::open(&path).unwrap();
        lab.entities().create_tenant("Acme Labs", json!({})).unwrap()
    };

    let lab = Lab::open_with(&path, LabConfig::default(), OpenOptions::new().read_only()).unwrap();
    assert_eq!(lab.entities().get(t1.id).unwrap().name, "Acme Labs");

    let err = lab
        .entities()
        .create("project", "Assay", json!({}), Some(t1.id))
        .unwrap_err();
    assert!(matches!(err, labcore::LabError::ReadOnly));
    assert!(matches!(
        lab.events().append(EventDraft::new("x")).unwrap_err(),
        labcore::LabError::ReadOnly
    ));
    assert!(matches!(
        lab.schemas().register("project", 1, json!({})).unwrap_err(),
        labcore::LabError::ReadOnly
    ));
}
