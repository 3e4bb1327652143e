//! Integration tests for order polling and confirmation

use serde_json::json;

use longshot_core::domain::Timestamp;
use longshot_core::ports::{IRemoteApi, OrderAck};

use crate::common;

#[tokio::test]
async fn test_get_orders_parses_writes_reads_and_token() {
    let (server, client) = common::setup_api_mock().await;
    common::mount_endpoint(
        &server,
        "/v1/get_orders/",
        json!({}),
        200,
        json!({
            "writes": { "Wlrelay": [1500, true] },
            "reads": ["Wltemp"],
            "ack_token": "batch-7"
        }),
    )
    .await;

    let orders = client
        .get_orders(&common::credentials())
        .await
        .expect("get_orders failed");

    assert_eq!(orders.len(), 2);
    assert_eq!(orders.reads, vec!["Wltemp".to_string()]);
    assert_eq!(orders.ack_token.as_deref(), Some("batch-7"));

    let write = orders.writes["Wlrelay"].clone().into_sample();
    assert_eq!(write.timestamp, Timestamp::from_secs(1.5));
    assert_eq!(write.value, json!(true));
}

#[tokio::test]
async fn test_get_orders_empty_body_object() {
    let (server, client) = common::setup_api_mock().await;
    common::mount_endpoint(&server, "/v1/get_orders/", json!({}), 200, json!({})).await;

    let orders = client
        .get_orders(&common::credentials())
        .await
        .expect("get_orders failed");

    assert!(orders.is_empty());
    assert_eq!(orders.ack_token, None);
}

#[tokio::test]
async fn test_confirm_orders_sends_token_and_paths() {
    let (server, client) = common::setup_api_mock().await;
    common::mount_endpoint(
        &server,
        "/v1/confirm_orders/",
        json!({ "ack_token": "batch-7" }),
        200,
        json!({}),
    )
    .await;

    let ack = OrderAck {
        ack_token: Some("batch-7".into()),
        paths_processed: vec!["Wlrelay".into(), "Wltemp".into()],
    };
    client
        .confirm_orders(&common::credentials(), &ack)
        .await
        .expect("confirm_orders failed");

    let body = common::only_request_body(&server).await;
    assert_eq!(body["paths_processed"], json!(["Wlrelay", "Wltemp"]));
}
