//! BDD step definitions for the status cache feature

use std::time::Duration;

use cucumber::{given, when};

use crate::world::UptimeWorld;

#[given(expr = "a status cache TTL of {int} seconds")]
fn cache_ttl(world: &mut UptimeWorld, seconds: u64) {
    world.config.polling.cache_ttl = Duration::from_secs(seconds);
}

#[when("the status is requested")]
async fn status_requested(world: &mut UptimeWorld) {
    let state = world.state();
    world.statuses = Some(state.current_status().await.map(|list| list.to_vec()));
}

#[when("the runtime becomes unavailable")]
fn runtime_becomes_unavailable(world: &mut UptimeWorld) {
    world.runtime.set_unavailable();
}
