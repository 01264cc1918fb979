//! Wire-level tests: requests through the actix service exactly as a client
//! would send them, header routing and both body encodings included.

use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use chrono::DateTime;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::api::routes;
use crate::api::server::AppState;
use crate::config::Config;
use crate::models::dto::{CreateStreamInput, DescribeStreamSummaryOutput};
use crate::services::cache::Cache;
use crate::utils::clock::ManualClock;

const JSON_CONTENT_TYPE: &str = "application/x-amz-json-1.1";
const CBOR_CONTENT_TYPE: &str = "application/x-amz-cbor-1.1";

fn test_cache() -> (Arc<Cache>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(
        DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
    ));
    let cache = Cache::new(Arc::new(Config::default()), clock.clone());
    (cache, clock)
}

macro_rules! service {
    ($cache:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new(AppState {
                    cache: $cache.clone(),
                }))
                .configure(routes::configure),
        )
        .await
    };
}

fn json_request(op: &str, body: Value) -> test::TestRequest {
    test::TestRequest::post()
        .uri("/")
        .insert_header(("x-amz-target", format!("Kinesis_20131202.{}", op)))
        .insert_header(("content-type", JSON_CONTENT_TYPE))
        .set_payload(body.to_string())
}

#[actix_rt::test]
async fn create_then_describe_over_json() {
    let (cache, _clock) = test_cache();
    let app = service!(cache);

    let resp = test::call_service(
        &app,
        json_request("CreateStream", json!({"StreamName": "orders", "ShardCount": 1}))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = test::call_service(
        &app,
        json_request("DescribeStreamSummary", json!({"StreamName": "orders"})).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        JSON_CONTENT_TYPE
    );
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(
        body["StreamDescriptionSummary"]["StreamStatus"],
        "CREATING"
    );
    assert_eq!(
        body["StreamDescriptionSummary"]["StreamARN"],
        "arn:aws:kinesis:us-east-1:000000000000:stream/orders"
    );
}

#[actix_rt::test]
async fn missing_target_header_is_a_client_error() {
    let (cache, _clock) = test_cache();
    let app = service!(cache);

    let req = test::TestRequest::post()
        .uri("/")
        .insert_header(("content-type", JSON_CONTENT_TYPE))
        .set_payload("{}")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["__type"], "InvalidArgumentException");
}

#[actix_rt::test]
async fn unknown_operation_is_rejected() {
    let (cache, _clock) = test_cache();
    let app = service!(cache);

    let resp =
        test::call_service(&app, json_request("TeleportStream", json!({})).to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["__type"], "InvalidArgumentException");
}

#[actix_rt::test]
async fn validation_reports_every_field_error() {
    let (cache, _clock) = test_cache();
    let app = service!(cache);

    // neither StreamName nor ShardCount
    let resp = test::call_service(&app, json_request("CreateStream", json!({})).to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["__type"], "ValidationException");
    let message = body["message"].as_str().unwrap();
    assert!(message.starts_with("2 validation error(s) detected:"));
    assert!(message.contains("StreamName"));
    assert!(message.contains("ShardCount"));
}

#[actix_rt::test]
async fn not_found_maps_to_the_kinesis_error_body() {
    let (cache, _clock) = test_cache();
    let app = service!(cache);

    let resp = test::call_service(
        &app,
        json_request("DescribeStreamSummary", json!({"StreamName": "ghost"})).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["__type"], "ResourceNotFoundException");
    assert!(body["message"].as_str().unwrap().contains("ghost"));
}

#[actix_rt::test]
async fn region_header_and_sigv4_scope_select_the_store() {
    let (cache, _clock) = test_cache();
    let app = service!(cache);

    let resp = test::call_service(
        &app,
        json_request("CreateStream", json!({"StreamName": "orders", "ShardCount": 1}))
            .insert_header(("x-amz-region", "eu-west-1"))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    // the default region knows nothing about it
    let resp = test::call_service(
        &app,
        json_request("DescribeStreamSummary", json!({"StreamName": "orders"})).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // the SigV4 credential scope routes to the right region
    let resp = test::call_service(
        &app,
        json_request("DescribeStreamSummary", json!({"StreamName": "orders"}))
            .insert_header((
                "authorization",
                "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20260801/eu-west-1/kinesis/aws4_request, \
                 SignedHeaders=host;x-amz-date, Signature=0000",
            ))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_rt::test]
async fn cbor_requests_get_cbor_responses() {
    let (cache, _clock) = test_cache();
    let app = service!(cache);

    let input = CreateStreamInput {
        stream_name: Some("orders".to_string()),
        shard_count: Some(1),
        stream_mode_details: None,
    };
    let req = test::TestRequest::post()
        .uri("/")
        .insert_header(("x-amz-target", "Kinesis_20131202.CreateStream"))
        .insert_header(("content-type", CBOR_CONTENT_TYPE))
        .set_payload(serde_cbor::to_vec(&input).unwrap())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        CBOR_CONTENT_TYPE
    );

    let req = test::TestRequest::post()
        .uri("/")
        .insert_header(("x-amz-target", "Kinesis_20131202.DescribeStreamSummary"))
        .insert_header(("content-type", CBOR_CONTENT_TYPE))
        .set_payload(
            serde_cbor::to_vec(&serde_json::json!({"StreamName": "orders"})).unwrap(),
        )
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = test::read_body(resp).await;
    let summary: DescribeStreamSummaryOutput = serde_cbor::from_slice(&body).unwrap();
    assert_eq!(summary.stream_description_summary.stream_name, "orders");
}

#[actix_rt::test]
async fn subscribe_to_shard_is_declared_unsupported() {
    let (cache, _clock) = test_cache();
    let app = service!(cache);

    let resp = test::call_service(
        &app,
        json_request("SubscribeToShard", json!({})).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["__type"], "InvalidArgumentException");
    assert!(body["message"].as_str().unwrap().contains("not supported"));
}
