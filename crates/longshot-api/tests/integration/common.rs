//! Shared test helpers for Longshot API integration tests
//!
//! Each helper mounts one endpoint on a wiremock server. Request bodies are
//! matched on the credentials so a client sending the wrong identity gets a
//! 404 from wiremock instead of the canned answer.

use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use longshot_api::LongshotClient;
use longshot_core::domain::Credentials;

pub const DEVICE_ID: &str = "long1";
pub const SECRET: &str = "s3cret";

pub fn credentials() -> Credentials {
    Credentials::new(DEVICE_ID, SECRET)
}

/// Starts a mock server and returns a client pointing at it.
pub async fn setup_api_mock() -> (MockServer, LongshotClient) {
    let server = MockServer::start().await;
    let client = LongshotClient::with_base_url(server.uri());
    (server, client)
}

/// Mounts `POST {endpoint}` answering `status` with `body`, expecting the
/// device credentials (plus `extra`) in the request body.
pub async fn mount_endpoint(
    server: &MockServer,
    endpoint: &str,
    extra: Value,
    status: u16,
    body: Value,
) {
    let mut expected = json!({ "device_id": DEVICE_ID, "secret": SECRET });
    if let (Some(expected), Some(extra)) = (expected.as_object_mut(), extra.as_object()) {
        for (k, v) in extra {
            expected.insert(k.clone(), v.clone());
        }
    }

    Mock::given(method("POST"))
        .and(path(endpoint))
        .and(body_partial_json(expected))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .expect(1)
        .mount(server)
        .await;
}

/// Returns the JSON body of the single request the server received.
pub async fn only_request_body(server: &MockServer) -> Value {
    let requests = server
        .received_requests()
        .await
        .expect("request recording is enabled");
    assert_eq!(requests.len(), 1, "expected exactly one request");
    serde_json::from_slice(&requests[0].body).expect("request body is JSON")
}
