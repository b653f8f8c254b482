//! BDD step definitions for the poll pipeline feature

use chrono::{Duration, Utc};
use cucumber::{given, then, when};

use uptime_tracker::pipeline::OFFLINE_STATUS_TEXT;
use uptime_tracker::registry::TrackedWorkload;
use uptime_tracker::store::{ObservationPoint, Store};
use uptime_tracker::UptimeError;

use crate::world::UptimeWorld;

#[given(expr = "a tracked workload {string} named {string}")]
fn tracked_workload(world: &mut UptimeWorld, id: String, display_name: String) {
    world.workloads.push(TrackedWorkload::new(id, display_name));
}

#[given(expr = "the runtime reports {string} as running")]
fn runtime_reports_running(world: &mut UptimeWorld, id: String) {
    world.runtime.set_running(&id);
}

#[given("the runtime is unavailable")]
fn runtime_unavailable(world: &mut UptimeWorld) {
    world.runtime.set_unavailable();
}

#[given(expr = "{string} was online for {int} polls and offline for {int} poll(s) in the last hour")]
async fn recent_history(world: &mut UptimeWorld, id: String, online: usize, offline: usize) {
    let now = Utc::now();
    let flags = std::iter::repeat_n(true, online).chain(std::iter::repeat_n(false, offline));
    for (i, is_online) in flags.enumerate() {
        let point = ObservationPoint {
            timestamp: now - Duration::minutes(i as i64 + 1),
            is_online,
        };
        world.store.append_point(&id, point).await.unwrap();
    }
}

#[when("the service is polled")]
async fn service_polled(world: &mut UptimeWorld) {
    let state = world.state();
    world.statuses = Some(state.pipeline.run().await);
}

#[then(expr = "the status list has {int} entries")]
fn status_list_len(world: &mut UptimeWorld, expected: usize) {
    assert_eq!(world.statuses().len(), expected);
}

#[then(expr = "status entry {int} is {string}")]
fn status_entry(world: &mut UptimeWorld, position: usize, id: String) {
    assert_eq!(world.statuses()[position - 1].id, id);
}

#[then(expr = "{string} is online")]
fn workload_online(world: &mut UptimeWorld, id: String) {
    assert!(world.status_of(&id).is_online, "'{}' should be online", id);
}

#[then(expr = "{string} is offline with status text {string}")]
fn workload_offline(world: &mut UptimeWorld, id: String, text: String) {
    let status = world.status_of(&id);
    assert!(!status.is_online, "'{}' should be offline", id);
    assert_eq!(status.status_text, text);
    assert_eq!(text, OFFLINE_STATUS_TEXT);
}

#[then(expr = "{string} has {int} recorded point(s)")]
async fn recorded_points(world: &mut UptimeWorld, id: String, expected: usize) {
    let history = world.store.find_history(&id).await.unwrap();
    let count = history.map(|h| h.points.len()).unwrap_or(0);
    assert_eq!(count, expected, "points recorded for '{}'", id);
}

#[then(expr = "{string} has no recorded points")]
async fn no_recorded_points(world: &mut UptimeWorld, id: String) {
    let history = world.store.find_history(&id).await.unwrap();
    assert!(history.is_none_or(|h| h.points.is_empty()));
}

#[then(expr = "{string} has last day uptime of {float} percent")]
fn last_day_uptime(world: &mut UptimeWorld, id: String, expected: f64) {
    let actual = world.status_of(&id).stats.last_day;
    assert!((actual - expected).abs() < 1e-9, "last day uptime {}", actual);
}

#[then(expr = "{string} has overall uptime of {float} percent")]
fn overall_uptime(world: &mut UptimeWorld, id: String, expected: f64) {
    let actual = world.status_of(&id).stats.overall;
    assert!((actual - expected).abs() < 1e-9, "overall uptime {}", actual);
}

#[then("the poll fails with a runtime error")]
fn poll_fails(world: &mut UptimeWorld) {
    match world.statuses.as_ref().expect("no poll was made") {
        Err(UptimeError::SnapshotUnavailable(_)) => {}
        other => panic!("expected runtime error, got {:?}", other),
    }
}
