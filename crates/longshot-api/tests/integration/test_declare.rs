//! Integration tests for path declaration (`/v1/redefine_paths/`)

use serde_json::json;

use longshot_core::domain::{DevicePrefix, Timestamp};
use longshot_core::ports::IRemoteApi;

use crate::common;

#[tokio::test]
async fn test_declare_sends_prefix_and_paths() {
    let (server, client) = common::setup_api_mock().await;
    common::mount_endpoint(
        &server,
        "/v1/redefine_paths/",
        json!({ "prefix": "l", "paths": ["Wltemp", "Wlhum"] }),
        200,
        json!({ "values": {} }),
    )
    .await;

    let response = client
        .declare_paths(
            &common::credentials(),
            DevicePrefix::new('l'),
            &["Wltemp".to_string(), "Wlhum".to_string()],
        )
        .await
        .expect("declare_paths failed");

    assert!(response.values.is_empty());
}

#[tokio::test]
async fn test_declare_returns_server_values_in_millis() {
    let (server, client) = common::setup_api_mock().await;
    common::mount_endpoint(
        &server,
        "/v1/redefine_paths/",
        json!({}),
        200,
        json!({ "values": { "Wltemp": [100000, "x"], "Wlhum": null } }),
    )
    .await;

    let response = client
        .declare_paths(
            &common::credentials(),
            DevicePrefix::new('l'),
            &["Wltemp".to_string(), "Wlhum".to_string()],
        )
        .await
        .expect("declare_paths failed");

    let temp = response.values["Wltemp"].clone().expect("server value");
    assert_eq!(temp.timestamp_ms(), 100_000.0);
    let sample = temp.into_sample();
    assert_eq!(sample.timestamp, Timestamp::from_secs(100.0));
    assert_eq!(sample.value, json!("x"));

    assert_eq!(response.values["Wlhum"], None);
}

#[tokio::test]
async fn test_declare_tolerates_missing_values_field() {
    let (server, client) = common::setup_api_mock().await;
    common::mount_endpoint(&server, "/v1/redefine_paths/", json!({}), 200, json!({})).await;

    let response = client
        .declare_paths(&common::credentials(), DevicePrefix::new('l'), &[])
        .await
        .expect("declare_paths failed");

    assert!(response.values.is_empty());
}
