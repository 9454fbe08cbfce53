//! Cross-component behavior through the public API

use labcore::{
    Direction, Endpoint, EntityFilter, EntityId, EntityStatus, EventDraft, EventQuery, LabError,
    LinkData, NeighborQuery, TenantScope, TenantViolation, Timestamp, TypeTag, ValidationReason,
};
use serde_json::json;

use crate::common::{lab, register_sensor_schema, tenant};

#[test]
fn sensor_without_serial_is_rejected_and_leaves_no_trace() {
    let lab = lab();
    register_sensor_schema(&lab);
    let t1 = tenant(&lab, "Acme Labs");
    let events_before = lab.events().len();

    let err = lab
        .entities()
        .create("device.sensor", "Probe", json!({"range_max": 10}), Some(t1.id))
        .unwrap_err();
    match &err {
        LabError::ValidationFailure { type_tag, issue } => {
            assert_eq!(type_tag, "device.sensor");
            assert_eq!(issue.field, "serial");
            assert_eq!(issue.reason, ValidationReason::MissingRequired);
        }
        other => panic!("expected validation failure, got {other:?}"),
    }

    let sensors = lab
        .entities()
        .list(
            TenantScope::Tenant(t1.id),
            EntityFilter::new().with_type(TypeTag::new("device.sensor").unwrap()),
        )
        .unwrap()
        .collect_all()
        .unwrap();
    assert!(sensors.is_empty());
    assert_eq!(lab.events().len(), events_before);
}

#[test]
fn sensor_with_serial_is_created_and_logged() {
    let lab = lab();
    register_sensor_schema(&lab);
    let t1 = tenant(&lab, "Acme Labs");

    let sensor = lab
        .entities()
        .create(
            "device.sensor",
            "Probe",
            json!({"serial": "SN-001", "calibrated_at": "2026-01-01T00:00:00Z"}),
            Some(t1.id),
        )
        .unwrap();

    let events = lab
        .events()
        .query(EventQuery::new().entity(sensor.id))
        .collect_all()
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "device.sensor.created");
    assert_eq!(events[0].payload["attributes"]["serial"], json!("SN-001"));
}

#[test]
fn out_of_range_update_keeps_previous_attributes() {
    let lab = lab();
    register_sensor_schema(&lab);
    let t1 = tenant(&lab, "Acme Labs");
    let sensor = lab
        .entities()
        .create("device.sensor", "Probe", json!({"serial": "SN-1"}), Some(t1.id))
        .unwrap();

    let err = lab
        .entities()
        .update_attributes(sensor.id, json!({"range_max": 5000}))
        .unwrap_err();
    assert_eq!(err.field(), Some("range_max"));
    assert_eq!(lab.entities().get(sensor.id).unwrap(), sensor);
}

#[test]
fn unregistered_types_accept_any_attributes() {
    let lab = lab();
    let t1 = tenant(&lab, "Acme Labs");
    let sample = lab
        .entities()
        .create(
            "sample",
            "Blood 7",
            json!({"volume_ml": 4.5, "tags": ["urgent"], "nested": {"a": 1}}),
            Some(t1.id),
        )
        .unwrap();
    assert_eq!(sample.attributes["nested"]["a"], json!(1));
}

#[test]
fn project_under_unknown_tenant_is_rejected() {
    let lab = lab();
    let err = lab
        .entities()
        .create("project", "Ghost", json!({}), Some(EntityId::new()))
        .unwrap_err();
    assert!(matches!(
        err,
        LabError::TenantIsolationViolation {
            reason: TenantViolation::UnknownTenant,
            ..
        }
    ));

    let err = lab
        .entities()
        .create("project", "Ghost", json!({}), None)
        .unwrap_err();
    assert!(matches!(
        err,
        LabError::TenantIsolationViolation {
            reason: TenantViolation::MissingTenant,
            ..
        }
    ));
}

#[test]
fn tenants_see_only_their_own_entities() {
    let lab = lab();
    let t1 = tenant(&lab, "Acme Labs");
    let t2 = tenant(&lab, "Globex");
    let p1 = lab
        .entities()
        .create("project", "Assay", json!({}), Some(t1.id))
        .unwrap();
    lab.entities()
        .create("project", "Rival", json!({}), Some(t2.id))
        .unwrap();

    let projects = lab
        .entities()
        .list(
            TenantScope::Tenant(t1.id),
            EntityFilter::new().with_type(TypeTag::new("project").unwrap()),
        )
        .unwrap()
        .collect_all()
        .unwrap();
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0].id, p1.id);

    let err = lab
        .entities()
        .list(
            TenantScope::Tenant(t1.id),
            EntityFilter::new().with_owning_tenant(t2.id),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        LabError::TenantIsolationViolation {
            reason: TenantViolation::OutOfScope,
            ..
        }
    ));
}

#[test]
fn tenant_with_active_members_cannot_be_deactivated() {
    let lab = lab();
    let t1 = tenant(&lab, "Acme Labs");
    let project = lab
        .entities()
        .create("project", "Assay", json!({}), Some(t1.id))
        .unwrap();

    let err = lab
        .entities()
        .set_status(t1.id, EntityStatus::Inactive)
        .unwrap_err();
    assert!(matches!(
        err,
        LabError::TenantIsolationViolation {
            reason: TenantViolation::ActiveMembers { count: 1 },
            ..
        }
    ));

    lab.entities()
        .set_status(project.id, EntityStatus::Archived)
        .unwrap();
    let t1 = lab
        .entities()
        .set_status(t1.id, EntityStatus::Inactive)
        .unwrap();
    assert!(!t1.active);

    // Inactive tenants take no new members
    let err = lab
        .entities()
        .create("project", "Late", json!({}), Some(t1.id))
        .unwrap_err();
    assert!(matches!(
        err,
        LabError::TenantIsolationViolation {
            reason: TenantViolation::InactiveTenant,
            ..
        }
    ));
}

#[test]
fn graph_respects_tenant_boundaries() {
    let lab = lab();
    let t1 = tenant(&lab, "Acme Labs");
    let t2 = tenant(&lab, "Globex");
    let project = lab
        .entities()
        .create("project", "Assay", json!({}), Some(t1.id))
        .unwrap();
    let sample = lab
        .entities()
        .create("sample", "S1", json!({}), Some(t1.id))
        .unwrap();
    let foreign = lab
        .entities()
        .create("sample", "S2", json!({}), Some(t2.id))
        .unwrap();

    let rel = lab
        .graph()
        .link(project.id, sample.id, "contains", LinkData::default().strength(0.8))
        .unwrap();
    assert_eq!(rel.strength, 0.8);

    let err = lab
        .graph()
        .link(project.id, foreign.id, "contains", LinkData::default())
        .unwrap_err();
    assert!(matches!(
        err,
        LabError::TenantIsolationViolation {
            reason: TenantViolation::CrossTenantLink,
            ..
        }
    ));

    let missing = EntityId::new();
    let err = lab
        .graph()
        .link(project.id, missing, "contains", LinkData::default())
        .unwrap_err();
    assert!(matches!(
        err,
        LabError::DanglingReference {
            endpoint: Endpoint::To,
            entity_id,
        } if entity_id == missing
    ));

    let neighbors = lab
        .graph()
        .neighbors(TenantScope::Tenant(t1.id), project.id, NeighborQuery::new())
        .unwrap()
        .collect_all()
        .unwrap();
    assert_eq!(neighbors.len(), 1);
    assert_eq!(neighbors[0].entity_id, sample.id);

    // Foreign tenant cannot start a traversal inside t1
    assert!(lab
        .graph()
        .neighbors(TenantScope::Tenant(t2.id), project.id, NeighborQuery::new())
        .is_err());
}

#[test]
fn unlinked_relationships_stay_in_history() {
    let lab = lab();
    let t1 = tenant(&lab, "Acme Labs");
    let a = lab
        .entities()
        .create("project", "A", json!({}), Some(t1.id))
        .unwrap();
    let b = lab
        .entities()
        .create("sample", "B", json!({}), Some(t1.id))
        .unwrap();

    let start = Timestamp::from_secs(1_000);
    let rel = lab
        .graph()
        .link(a.id, b.id, "uses", LinkData::default().valid_from(start))
        .unwrap();
    let closed = lab
        .graph()
        .unlink_at(rel.id, Timestamp::from_secs(2_000))
        .unwrap();
    assert!(closed.is_closed());

    let scope = TenantScope::Tenant(t1.id);
    let during = lab
        .graph()
        .neighbors(
            scope,
            b.id,
            NeighborQuery::new()
                .direction(Direction::Incoming)
                .at(Timestamp::from_secs(1_500)),
        )
        .unwrap()
        .collect_all()
        .unwrap();
    assert_eq!(during.len(), 1);
    assert_eq!(during[0].entity_id, a.id);

    let now = lab
        .graph()
        .neighbors(scope, a.id, NeighborQuery::new())
        .unwrap()
        .collect_all()
        .unwrap();
    assert!(now.is_empty());

    let history = lab.graph().history(scope, a.id).unwrap().collect_all().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].valid_to, Some(Timestamp::from_secs(2_000)));

    let types: Vec<String> = lab
        .events()
        .query(EventQuery::new().entity(a.id))
        .map(|e| e.unwrap().event_type)
        .collect();
    assert_eq!(
        types,
        vec!["project.created", "relationship.linked", "relationship.unlinked"]
    );
}

#[test]
fn schema_versions_supersede_in_order() {
    let lab = lab();
    register_sensor_schema(&lab);
    let v2 = lab
        .schemas()
        .register(
            "device.sensor",
            2,
            json!({
                "serial": {"type": "string", "required": true},
                "vendor": {"type": "string", "required": true, "enum": ["acme", "globex"]},
            }),
        )
        .unwrap();
    assert_eq!(lab.schemas().get_active("device.sensor").unwrap().version, 2);

    let versions = lab.schemas().versions("device.sensor").unwrap();
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[0].valid_to, Some(v2.valid_from));

    let t1 = tenant(&lab, "Acme Labs");
    let err = lab
        .entities()
        .create("device.sensor", "Probe", json!({"serial": "S", "vendor": "initech"}), Some(t1.id))
        .unwrap_err();
    assert_eq!(err.field(), Some("vendor"));

    let err = lab
        .schemas()
        .register("device.sensor", 2, json!({}))
        .unwrap_err();
    assert!(matches!(err, LabError::ConflictingSchemaVersion { version: 2, .. }));

    let registered = lab
        .events()
        .query(EventQuery::new().event_type("schema.registered"))
        .collect_all()
        .unwrap();
    assert_eq!(registered.len(), 2);
}

#[test]
fn standalone_events_are_queryable_by_time() {
    let lab = lab();
    for secs in [500, 100, 300] {
        lab.events()
            .append(
                EventDraft::new("instrument.reading")
                    .payload(json!({"value": secs}))
                    .at(Timestamp::from_secs(secs)),
            )
            .unwrap();
    }
    let values: Vec<i64> = lab
        .events()
        .query(EventQuery::new().event_type("instrument.reading"))
        .map(|e| e.unwrap().payload["value"].as_i64().unwrap())
        .collect();
    assert_eq!(values, vec![100, 300, 500]);
}
