//! Property checks over generated inputs

use std::collections::BTreeMap;

use labcore::{EventDraft, EventQuery, Lab, LinkData, Timestamp};
use proptest::prelude::*;
use serde_json::{json, Value};

fn fresh_lab() -> Lab {
    Lab::cache().unwrap()
}

fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
        "[a-z0-9 ]{0,12}".prop_map(Value::from),
        Just(Value::Null),
    ]
}

fn attribute_map() -> impl Strategy<Value = BTreeMap<String, Value>> {
    prop::collection::btree_map("[a-z][a-z_]{0,8}", scalar(), 0..8)
}

fn to_object(map: BTreeMap<String, Value>) -> Value {
    Value::Object(map.into_iter().collect())
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 48,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    #[test]
    fn unregistered_types_store_attributes_verbatim(attrs in attribute_map()) {
        let lab = fresh_lab();
        let t1 = lab.entities().create_tenant("Acme Labs", json!({})).unwrap();
        let attributes = to_object(attrs);
        let sample = lab
            .entities()
            .create("sample", "S", attributes.clone(), Some(t1.id))
            .unwrap();
        let fetched = lab.entities().get(sample.id).unwrap();
        prop_assert_eq!(fetched.attributes.as_inner(), &attributes);
    }

    #[test]
    fn reapplying_a_patch_changes_nothing(base in attribute_map(), patch in attribute_map()) {
        let lab = fresh_lab();
        let t1 = lab.entities().create_tenant("Acme Labs", json!({})).unwrap();
        let sample = lab
            .entities()
            .create("sample", "S", to_object(base), Some(t1.id))
            .unwrap();
        let patch = to_object(patch);

        let once = lab.entities().update_attributes(sample.id, patch.clone()).unwrap();
        let events_after_once = lab.events().len();
        let twice = lab.entities().update_attributes(sample.id, patch).unwrap();

        prop_assert_eq!(&twice, &once);
        prop_assert_eq!(lab.events().len(), events_after_once);
    }

    #[test]
    fn registered_contracts_reject_wrong_kinds(value in scalar()) {
        let lab = fresh_lab();
        lab.schemas()
            .register("instrument", 1, json!({"serial": {"type": "string", "required": true}}))
            .unwrap();
        let t1 = lab.entities().create_tenant("Acme Labs", json!({})).unwrap();

        let result = lab
            .entities()
            .create("instrument", "I", json!({"serial": value.clone()}), Some(t1.id));
        prop_assert_eq!(result.is_ok(), value.is_string());
        if let Err(err) = result {
            prop_assert_eq!(err.field(), Some("serial"));
        }
    }

    #[test]
    fn events_come_back_in_time_order(secs in prop::collection::vec(0i64..100_000, 1..40)) {
        let lab = fresh_lab();
        for s in &secs {
            lab.events()
                .append(EventDraft::new("tick").at(Timestamp::from_secs(*s)))
                .unwrap();
        }
        let events = lab.events().query(EventQuery::new()).collect_all().unwrap();
        prop_assert_eq!(events.len(), secs.len());
        prop_assert!(events
            .windows(2)
            .all(|w| (w[0].timestamp, w[0].id) < (w[1].timestamp, w[1].id)));
    }

    #[test]
    fn strength_outside_unit_interval_is_rejected(strength in -2.0f64..3.0) {
        let lab = fresh_lab();
        let t1 = lab.entities().create_tenant("Acme Labs", json!({})).unwrap();
        let a = lab.entities().create("project", "A", json!({}), Some(t1.id)).unwrap();
        let b = lab.entities().create("sample", "B", json!({}), Some(t1.id)).unwrap();

        let result = lab
            .graph()
            .link(a.id, b.id, "uses", LinkData::default().strength(strength));
        prop_assert_eq!(result.is_ok(), (0.0..=1.0).contains(&strength));
    }
}
