//! BDD step definitions for the HTTP API feature

use axum::body::Body;
use axum::http::Request;
use cucumber::{given, then, when};
use tower::ServiceExt;

use uptime_tracker::api::build_router;

use crate::world::UptimeWorld;

#[given(expr = "the API key {string} is configured")]
fn api_key_configured(world: &mut UptimeWorld, key: String) {
    world.config.server.api_key = Some(key);
}

async fn send(world: &mut UptimeWorld, method: &str, uri: &str, api_key: Option<&str>) {
    let app = build_router(world.state());

    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(key) = api_key {
        builder = builder.header("x-api-key", key);
    }
    let response = app
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap();

    world.response_status = Some(response.status().as_u16());
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    world.response_body = serde_json::from_slice(&body).ok();
}

#[when(expr = "a GET request is sent to {string}")]
async fn get_request(world: &mut UptimeWorld, uri: String) {
    send(world, "GET", &uri, None).await;
}

#[when(expr = "a POST request is sent to {string}")]
async fn post_request(world: &mut UptimeWorld, uri: String) {
    send(world, "POST", &uri, None).await;
}

#[when(expr = "a POST request is sent to {string} with API key {string}")]
async fn post_request_with_key(world: &mut UptimeWorld, uri: String, key: String) {
    send(world, "POST", &uri, Some(&key)).await;
}

#[then(expr = "the response status is {int}")]
fn response_status(world: &mut UptimeWorld, expected: u16) {
    assert_eq!(world.response_status, Some(expected));
}

fn body(world: &UptimeWorld) -> &serde_json::Value {
    world.response_body.as_ref().expect("response body is not JSON")
}

#[then(expr = "the response lists {int} workload(s)")]
fn response_lists(world: &mut UptimeWorld, expected: usize) {
    let list = body(world).as_array().expect("expected a JSON array");
    assert_eq!(list.len(), expected);
}

#[then(expr = "the response reports {int} deleted point(s)")]
fn response_deleted(world: &mut UptimeWorld, expected: u64) {
    assert_eq!(body(world)["success"], true);
    assert_eq!(body(world)["deletedCount"], expected);
}

#[then(expr = "the response names are {string}")]
fn response_names(world: &mut UptimeWorld, expected: String) {
    let expected: Vec<&str> = expected.split(", ").collect();
    let names: Vec<&str> = body(world)
        .as_array()
        .expect("expected a JSON array")
        .iter()
        .filter_map(|v| v.as_str())
        .collect();
    assert_eq!(names, expected);
}

#[then("the store is reported healthy")]
fn store_reported_healthy(world: &mut UptimeWorld) {
    assert_eq!(body(world)["store_healthy"], true);
}
