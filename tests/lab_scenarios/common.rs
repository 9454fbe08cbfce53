//! Shared fixtures

use std::sync::Once;

use labcore::{Entity, Lab, LabConfig, OpenOptions};
use serde_json::json;

static TRACING: Once = Once::new();

/// Route library logs through the test harness
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

pub fn lab() -> Lab {
    init_tracing();
    Lab::cache().unwrap()
}

pub fn operator_lab() -> Lab {
    init_tracing();
    Lab::cache_with(LabConfig::default(), OpenOptions::new().operator_mode(true)).unwrap()
}

/// `device.sensor` v1: serial required, optional bounded range
pub fn register_sensor_schema(lab: &Lab) {
    lab.schemas()
        .register(
            "device.sensor",
            1,
            json!({
                "serial": {"type": "string", "required": true},
                "range_max": {"type": "number", "min": 0, "max": 1000},
                "calibrated_at": {"type": "datetime"},
            }),
        )
        .unwrap();
}

pub fn tenant(lab: &Lab, name: &str) -> Entity {
    lab.entities().create_tenant(name, json!({})).unwrap()
}
