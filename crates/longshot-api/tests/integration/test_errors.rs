//! Integration tests for status-to-error mapping

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use longshot_api::{ApiError, LongshotClient};
use longshot_core::config::ApiConfig;

use crate::common;

async fn orders_error(status: u16) -> ApiError {
    let (server, client) = common::setup_api_mock().await;
    Mock::given(method("POST"))
        .and(path("/v1/get_orders/"))
        .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
        .mount(&server)
        .await;

    client
        .fetch_orders(&common::credentials())
        .await
        .expect_err("request should fail")
}

#[tokio::test]
async fn test_unauthorized_maps_to_variant() {
    assert!(matches!(orders_error(401).await, ApiError::Unauthorized(m) if m == "nope"));
}

#[tokio::test]
async fn test_forbidden_and_not_found_map_to_variants() {
    assert!(matches!(orders_error(403).await, ApiError::Forbidden(_)));
    assert!(matches!(orders_error(404).await, ApiError::NotFound(_)));
}

#[tokio::test]
async fn test_server_error_keeps_status() {
    let err = orders_error(503).await;
    assert!(matches!(err, ApiError::ServerError { status: 503, .. }));
}

#[tokio::test]
async fn test_other_status_is_unexpected() {
    let err = orders_error(409).await;
    assert!(matches!(err, ApiError::UnexpectedStatus { status: 409, .. }));
}

#[tokio::test]
async fn test_too_many_requests_reads_retry_after() {
    let (server, client) = common::setup_api_mock().await;
    Mock::given(method("POST"))
        .and(path("/v1/get_orders/"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
        .mount(&server)
        .await;

    let err = client
        .fetch_orders(&common::credentials())
        .await
        .expect_err("request should fail");
    assert!(matches!(
        err,
        ApiError::TooManyRequests { retry_after: Some(d) } if d == Duration::from_secs(7)
    ));
}

#[tokio::test]
async fn test_malformed_body_is_invalid_response() {
    let (server, client) = common::setup_api_mock().await;
    Mock::given(method("POST"))
        .and(path("/v1/get_orders/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let err = client
        .fetch_orders(&common::credentials())
        .await
        .expect_err("request should fail");
    assert!(matches!(err, ApiError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_slow_server_hits_request_timeout() {
    let (server, _) = common::setup_api_mock().await;
    Mock::given(method("POST"))
        .and(path("/v1/get_orders/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let config = ApiConfig {
        base_url: server.uri(),
        request_timeout_secs: 1,
    };
    let client = LongshotClient::new(&config).expect("client builds");

    let err = client
        .fetch_orders(&common::credentials())
        .await
        .expect_err("request should time out");
    assert!(matches!(err, ApiError::NetworkError(e) if e.is_timeout()));
}

#[tokio::test]
async fn test_port_errors_downcast_to_api_error() {
    use longshot_core::ports::IRemoteApi;

    let (server, client) = common::setup_api_mock().await;
    Mock::given(method("POST"))
        .and(path("/v1/get_orders/"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = client
        .get_orders(&common::credentials())
        .await
        .expect_err("request should fail");
    assert!(matches!(
        err.downcast_ref::<ApiError>(),
        Some(ApiError::ServerError { status: 500, .. })
    ));
}
