//! Write path against a mocked HTTP server.
//!
//! Checks that the headers on the wire are the negotiated ones and that
//! server-side rejections surface as client errors.

use esc_client::{ClientError, ClientSettings, EsClient, HttpTransport, Transport, WriteMode};
use esc_negotiation::{ContentTypePolicy, OverrideMediaType, ServerEpoch};
use httpmock::prelude::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn transport(server: &MockServer) -> Arc<dyn Transport> {
    Arc::new(HttpTransport::new(server.base_url(), Duration::from_secs(5)).unwrap())
}

async fn mock_version(server: &MockServer, version: &str) {
    let version = version.to_string();
    server
        .mock_async(move |when, then| {
            when.method(GET).path("/");
            then.status(200)
                .json_body(json!({"cluster_name": "compat", "version": {"number": version}}));
        })
        .await;
}

#[tokio::test]
async fn connect_detects_epoch_and_rewrites_bulk_headers() {
    let server = MockServer::start_async().await;
    mock_version(&server, "7.17.22").await;
    let bulk = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/_bulk")
                .header("Content-Type", "application/x-ndjson")
                .header("Accept", "application/json");
            then.status(200).json_body(json!({"errors": false, "items": [{"index": {"status": 201}}]}));
        })
        .await;

    let client = EsClient::connect(transport(&server), ClientSettings::new()).await;
    assert_eq!(client.detected(), Some(ServerEpoch::V7));

    let written = client.bulk_index("compat-logs", &[json!({"message": "hello"})]).await.unwrap();
    assert_eq!(written, 1);
    bulk.assert_async().await;
}

#[tokio::test]
async fn override_skips_detection() {
    let server = MockServer::start_async().await;
    let probe = server
        .mock_async(|when, then| {
            when.method(GET).path("/");
            then.status(200).json_body(json!({"version": {"number": "8.13.4"}}));
        })
        .await;
    let doc = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/compat-logs/_doc")
                .header("Content-Type", "application/json");
            then.status(201).json_body(json!({"result": "created"}));
        })
        .await;

    let settings = ClientSettings::new()
        .with_write_mode(WriteMode::Index)
        .with_policy(ContentTypePolicy::new().with_override(OverrideMediaType::Json));
    let client = EsClient::connect(transport(&server), settings).await;

    assert_eq!(client.detected(), None);
    client.write("compat-logs", &[json!({"n": 1}), json!({"n": 2})]).await.unwrap();
    probe.assert_hits_async(0).await;
    doc.assert_hits_async(2).await;
}

#[tokio::test]
async fn unsupported_media_type_is_rejected() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/_bulk");
            then.status(406).json_body(json!({
                "error": {"reason": "Content-Type header [application/vnd.elasticsearch+x-ndjson; compatible-with=9] is not supported"},
                "status": 406
            }));
        })
        .await;

    // No version endpoint: detection fails and negotiation leaves the headers alone.
    let client = EsClient::connect(transport(&server), ClientSettings::new()).await;
    assert_eq!(client.detected(), None);

    let err = client.bulk_index("compat-logs", &[json!({})]).await.unwrap_err();
    assert_eq!(err.status(), Some(406));
    assert!(err.to_string().contains("not supported"));
}

#[tokio::test]
async fn bulk_item_failures_are_reported() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/_bulk");
            then.status(200).json_body(json!({
                "errors": true,
                "items": [
                    {"index": {"status": 201}},
                    {"index": {"status": 400, "error": {"type": "mapper_parsing_exception", "reason": "failed to parse"}}}
                ]
            }));
        })
        .await;

    let client = EsClient::new(transport(&server), ClientSettings::new());
    let err = client
        .bulk_index("compat-logs", &[json!({"a": 1}), json!({"a": "x"})])
        .await
        .unwrap_err();
    match err {
        ClientError::BulkRejected { failed, total, reason } => {
            assert_eq!(failed, 1);
            assert_eq!(total, 2);
            assert_eq!(reason, "failed to parse");
        }
        other => panic!("expected BulkRejected, got {other:?}"),
    }
}

#[tokio::test]
async fn count_and_health() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/compat-logs/_count");
            then.status(200).json_body(json!({"count": 10}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/absent/_count");
            then.status(404).json_body(json!({"error": {"reason": "no such index"}}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/_cluster/health");
            then.status(200).json_body(json!({"status": "yellow"}));
        })
        .await;

    let client = EsClient::new(transport(&server), ClientSettings::new());
    assert_eq!(client.count("compat-logs").await.unwrap(), 10);
    assert_eq!(client.count("absent").await.unwrap(), 0);
    assert!(client.ping().await.unwrap());
}
