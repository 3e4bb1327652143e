//! Integration tests for sample upload (`/v1/sync_values/`)

use serde_json::json;

use longshot_core::domain::{Sample, Timestamp};
use longshot_core::ports::{IRemoteApi, WireSample, WireValues};

use crate::common;

#[tokio::test]
async fn test_sync_values_sends_millisecond_samples() {
    let (server, client) = common::setup_api_mock().await;
    common::mount_endpoint(&server, "/v1/sync_values/", json!({}), 200, json!({})).await;

    let mut values = WireValues::new();
    values.insert(
        "Wltemp".into(),
        vec![
            WireSample::from_sample(&Sample::new(Timestamp::from_secs(10.0), json!(20))),
            WireSample::from_sample(&Sample::new(Timestamp::from_secs(10.5), json!(21))),
        ],
    );

    client
        .sync_values(&common::credentials(), &values)
        .await
        .expect("sync_values failed");

    let body = common::only_request_body(&server).await;
    assert_eq!(
        body["values"],
        json!({ "Wltemp": [[10000.0, 20], [10500.0, 21]] })
    );
}

#[tokio::test]
async fn test_sync_values_accepts_empty_success_body() {
    let (server, client) = common::setup_api_mock().await;
    wiremock::Mock::given(wiremock::matchers::method("POST"))
        .and(wiremock::matchers::path("/v1/sync_values/"))
        .respond_with(wiremock::ResponseTemplate::new(204))
        .mount(&server)
        .await;

    client
        .sync_values(&common::credentials(), &WireValues::new())
        .await
        .expect("sync_values failed");
}
