//! BDD step definitions for the history retention feature

use chrono::{Duration, Utc};
use cucumber::{given, then, when};

use uptime_tracker::stats::compute_stats;
use uptime_tracker::store::{ObservationPoint, Store};

use crate::world::UptimeWorld;

#[given(expr = "{string} has {int} points spread evenly over the last {int} days")]
async fn spread_history(world: &mut UptimeWorld, id: String, count: i64, days: i64) {
    let now = Utc::now();
    let step = Duration::days(days) / count as i32;
    for i in 0..count {
        let point = ObservationPoint {
            timestamp: now - step * i as i32,
            is_online: i % 3 != 0,
        };
        world.store.append_point(&id, point).await.unwrap();
    }
}

#[when(expr = "a cleanup runs with a maximum age of {int} days")]
async fn cleanup_runs(world: &mut UptimeWorld, days: u32) {
    let state = world.state();
    world.cleanup = Some(state.retention.delete_older_than_at(days, Utc::now()).await);
}

#[then(expr = "{int} point(s) were deleted")]
fn points_deleted(world: &mut UptimeWorld, expected: u64) {
    let report = world
        .cleanup
        .as_ref()
        .expect("no cleanup ran")
        .as_ref()
        .expect("cleanup failed");
    assert_eq!(report.deleted_count, expected);
}

#[then(expr = "no point of {string} is older than {int} days")]
async fn nothing_older_than(world: &mut UptimeWorld, id: String, days: i64) {
    let report = world
        .cleanup
        .as_ref()
        .expect("no cleanup ran")
        .as_ref()
        .expect("cleanup failed");
    assert_eq!(report.max_age_days as i64, days);
    let history = world.store.find_history(&id).await.unwrap().unwrap();
    assert!(history
        .points
        .iter()
        .all(|p| p.timestamp >= report.cutoff_timestamp));
}

#[then(expr = "the stored uptime of {string} is {float} percent over {int} points")]
async fn stored_uptime(world: &mut UptimeWorld, id: String, expected: f64, count: usize) {
    let history = world.store.find_history(&id).await.unwrap().unwrap();
    assert_eq!(history.points.len(), count);

    let stats = compute_stats(&history.points, Utc::now());
    assert!(
        (stats.overall - expected).abs() < 1e-9,
        "overall uptime {}",
        stats.overall
    );
}
