//! Operator scope and read-only databases

use labcore::{
    EntityFilter, LabConfig, LabError, Lab, NeighborQuery, OpenOptions, TenantScope,
    TenantViolation, TypeTag,
};
use serde_json::json;

use crate::common::{init_tracing, lab, operator_lab, tenant};

#[test]
fn operator_scope_requires_operator_mode() {
    let lab = lab();
    let t1 = tenant(&lab, "Acme Labs");
    lab.entities()
        .create("project", "Assay", json!({}), Some(t1.id))
        .unwrap();

    let err = lab
        .entities()
        .list(TenantScope::Operator, EntityFilter::new())
        .unwrap_err();
    assert!(matches!(
        err,
        LabError::TenantIsolationViolation {
            reason: TenantViolation::OperatorModeDisabled,
            ..
        }
    ));
    assert!(lab
        .graph()
        .neighbors(TenantScope::Operator, t1.id, NeighborQuery::new())
        .is_err());
}

#[test]
fn operator_scope_spans_tenants() {
    let lab = operator_lab();
    let t1 = tenant(&lab, "Acme Labs");
    let t2 = tenant(&lab, "Globex");
    for (t, name) in [(t1.id, "A"), (t2.id, "B")] {
        lab.entities()
            .create("project", name, json!({}), Some(t))
            .unwrap();
    }

    let projects = lab
        .entities()
        .list(
            TenantScope::Operator,
            EntityFilter::new().with_type(TypeTag::new("project").unwrap()),
        )
        .unwrap()
        .collect_all()
        .unwrap();
    assert_eq!(projects.len(), 2);

    let only_t2 = lab
        .entities()
        .list(
            TenantScope::Operator,
            EntityFilter::new()
                .with_type(TypeTag::new("project").unwrap())
                .with_owning_tenant(t2.id),
        )
        .unwrap()
        .collect_all()
        .unwrap();
    assert_eq!(only_t2.len(), 1);
    assert_eq!(only_t2[0].name, "B");

    // Operator scope does not loosen write-side isolation
    let a = projects.iter().find(|p| p.name == "A").unwrap();
    let b = projects.iter().find(|p| p.name == "B").unwrap();
    assert!(lab
        .graph()
        .link(a.id, b.id, "related_to", Default::default())
        .is_err());
}

#[test]
fn unknown_tenant_scope_is_rejected() {
    let lab = lab();
    let err = lab
        .entities()
        .list(TenantScope::Tenant(labcore::EntityId::new()), EntityFilter::new())
        .unwrap_err();
    assert!(matches!(err, LabError::TenantIsolationViolation { .. }));
}

#[test]
fn read_only_cache_rejects_every_write() {
    init_tracing();
    let lab = Lab::cache_with(LabConfig::default(), OpenOptions::new().read_only()).unwrap();
    assert!(lab.retention().is_none());

    assert!(matches!(
        lab.entities().create_tenant("Acme Labs", json!({})).unwrap_err(),
        LabError::ReadOnly
    ));
    assert!(lab.events().is_empty());
    assert!(lab.schemas().versions("project").unwrap().is_empty());
}
