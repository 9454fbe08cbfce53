//! Retention through the `Lab` entry point

use std::time::{Duration, Instant};

use labcore::{
    EventDraft, EventQuery, Lab, LabConfig, OpenOptions, RetentionConfig, TimeRange, Timestamp,
};

use crate::common::{init_tracing, lab};

fn wait_until(mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    done()
}

#[test]
fn enabled_retention_starts_with_the_lab() {
    init_tracing();
    let config = LabConfig {
        retention: RetentionConfig {
            enabled: true,
            max_age_secs: 3600,
            interval_secs: 3600,
        },
        ..Default::default()
    };
    let mut lab = Lab::cache_with(config, OpenOptions::default()).unwrap();
    assert!(lab.retention().is_some());

    lab.events()
        .append(EventDraft::new("probe.reading").at(Timestamp::from_secs(1)))
        .unwrap();
    let fresh = lab.events().append(EventDraft::new("probe.reading")).unwrap();

    lab.retention().unwrap().run_now();
    assert!(wait_until(|| lab.events().len() == 1));
    assert!(lab.events().get(fresh).is_ok());

    lab.stop_retention();
    assert!(lab.retention().is_none());
}

#[test]
fn retention_is_off_by_default() {
    let lab = lab();
    assert!(lab.retention().is_none());
}

#[test]
fn manual_retention_keeps_recent_events_queryable() {
    let lab = lab();
    let now = Timestamp::now();
    for hours_ago in [100u64, 50, 10, 1] {
        lab.events()
            .append(
                EventDraft::new("probe.reading")
                    .at(now.saturating_sub(Duration::from_secs(hours_ago * 3600))),
            )
            .unwrap();
    }

    let report = lab
        .events()
        .apply_retention(Duration::from_secs(24 * 3600))
        .unwrap();
    assert_eq!(report.events_pruned, 2);

    let remaining = lab
        .events()
        .query(EventQuery::new().range(TimeRange::since(report.cutoff)))
        .collect_all()
        .unwrap();
    assert_eq!(remaining.len(), 2);

    let second = lab
        .events()
        .apply_retention(Duration::from_secs(24 * 3600))
        .unwrap();
    assert!(second.is_empty());
}
