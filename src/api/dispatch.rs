// Copyright (c) 2025 Rajan Panneer Selvam
//
// Licensed under the Business Source License 1.1 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.mariadb.com/bsl11
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use actix_web::http::header::CONTENT_TYPE;
use actix_web::{web, HttpRequest, HttpResponse};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, Instrument};
use uuid::Uuid;

use crate::api::server::AppState;
use crate::controllers::{
    consumers, encryption, monitoring, records, retention, shards, streams, tags,
};
use crate::errors::KinesisError;
use crate::services::cache::Cache;

/// All operations arrive as `X-Amz-Target: Kinesis_20131202.<OperationName>`.
const TARGET_PREFIX: &str = "Kinesis_20131202.";

const JSON_CONTENT_TYPE: &str = "application/x-amz-json-1.1";
const CBOR_CONTENT_TYPE: &str = "application/x-amz-cbor-1.1";

/// Region inside a SigV4 credential scope:
/// `Credential=<key>/<date>/<region>/kinesis/aws4_request`.
static CREDENTIAL_SCOPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Credential=[^/]+/\d{8}/([a-z0-9-]+)/kinesis/aws4_request").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    Json,
    Cbor,
}

impl WireFormat {
    fn content_type(&self) -> &'static str {
        match self {
            WireFormat::Json => JSON_CONTENT_TYPE,
            WireFormat::Cbor => CBOR_CONTENT_TYPE,
        }
    }
}

fn wire_format(req: &HttpRequest) -> WireFormat {
    req.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .filter(|v| v.contains("cbor"))
        .map(|_| WireFormat::Cbor)
        .unwrap_or(WireFormat::Json)
}

fn operation_name(req: &HttpRequest) -> Result<String, KinesisError> {
    let target = req
        .headers()
        .get("x-amz-target")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            KinesisError::InvalidArgument("Missing X-Amz-Target header".to_string())
        })?;
    target
        .strip_prefix(TARGET_PREFIX)
        .map(|op| op.to_string())
        .ok_or_else(|| {
            KinesisError::InvalidArgument(format!("Unexpected X-Amz-Target: {}", target))
        })
}

/// Region override header first, then the SigV4 credential scope.
fn region_from(req: &HttpRequest) -> Option<String> {
    if let Some(region) = req
        .headers()
        .get("x-amz-region")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    {
        return Some(region.to_string());
    }
    req.headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| CREDENTIAL_SCOPE_RE.captures(auth))
        .map(|captures| captures[1].to_string())
}

pub fn decode<T: DeserializeOwned + Default>(
    fmt: WireFormat,
    body: &[u8],
) -> Result<T, KinesisError> {
    if body.is_empty() {
        return serde_json::from_slice(b"{}").map_err(|e| {
            KinesisError::InvalidArgument(format!("Unable to parse request: {}", e))
        });
    }
    match fmt {
        WireFormat::Json => serde_json::from_slice(body).map_err(|e| {
            KinesisError::InvalidArgument(format!("Unable to parse request: {}", e))
        }),
        WireFormat::Cbor => serde_cbor::from_slice(body).map_err(|e| {
            KinesisError::InvalidArgument(format!("Unable to parse request: {}", e))
        }),
    }
}

pub fn encode<T: Serialize>(fmt: WireFormat, value: &T) -> Result<Vec<u8>, KinesisError> {
    match fmt {
        WireFormat::Json => serde_json::to_vec(value)
            .map_err(|e| KinesisError::InternalFailure(format!("Response encoding failed: {}", e))),
        WireFormat::Cbor => serde_cbor::to_vec(value)
            .map_err(|e| KinesisError::InternalFailure(format!("Response encoding failed: {}", e))),
    }
}

fn ok_response<T: Serialize>(fmt: WireFormat, value: &T, request_id: &str) -> HttpResponse {
    match encode(fmt, value) {
        Ok(body) => HttpResponse::Ok()
            .insert_header((CONTENT_TYPE, fmt.content_type()))
            .insert_header(("x-amzn-RequestId", request_id))
            .body(body),
        Err(e) => error_response(fmt, &e, request_id),
    }
}

fn error_response(fmt: WireFormat, error: &KinesisError, request_id: &str) -> HttpResponse {
    use actix_web::error::ResponseError;

    debug!(code = error.code(), "request failed: {}", error);
    let body = encode(fmt, &error.body()).unwrap_or_default();
    HttpResponse::build(error.status_code())
        .insert_header((CONTENT_TYPE, fmt.content_type()))
        .insert_header(("x-amzn-RequestId", request_id))
        .body(body)
}

/// Single wire entry point: map the target header to a handler, decode the
/// body in the request's encoding, and answer in kind.
pub async fn dispatch(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> HttpResponse {
    let fmt = wire_format(&req);
    let request_id = Uuid::new_v4().to_string();

    let op = match operation_name(&req) {
        Ok(op) => op,
        Err(e) => return error_response(fmt, &e, &request_id),
    };
    let region = state.cache.resolve_region(region_from(&req).as_deref());
    let cache: &Cache = &state.cache;

    let span =
        tracing::info_span!("request", op = %op, region = %region, request_id = %request_id);

    async move {
        macro_rules! handle {
            ($handler:path) => {{
                match decode(fmt, &body) {
                    Ok(input) => match $handler(cache, &region, input).await {
                        Ok(output) => ok_response(fmt, &output, &request_id),
                        Err(e) => error_response(fmt, &e, &request_id),
                    },
                    Err(e) => error_response(fmt, &e, &request_id),
                }
            }};
        }

        match op.as_str() {
            "CreateStream" => handle!(streams::create_stream),
            "DeleteStream" => handle!(streams::delete_stream),
            "DescribeStream" => handle!(streams::describe_stream),
            "DescribeStreamSummary" => handle!(streams::describe_stream_summary),
            "ListStreams" => handle!(streams::list_streams),
            "UpdateStreamMode" => handle!(streams::update_stream_mode),
            "DescribeLimits" => handle!(streams::describe_limits),
            "ListShards" => handle!(shards::list_shards),
            "SplitShard" => handle!(shards::split_shard),
            "MergeShards" => handle!(shards::merge_shards),
            "UpdateShardCount" => handle!(shards::update_shard_count),
            "PutRecord" => handle!(records::put_record),
            "PutRecords" => handle!(records::put_records),
            "GetShardIterator" => handle!(records::get_shard_iterator),
            "GetRecords" => handle!(records::get_records),
            "IncreaseStreamRetentionPeriod" => {
                handle!(retention::increase_stream_retention_period)
            }
            "DecreaseStreamRetentionPeriod" => {
                handle!(retention::decrease_stream_retention_period)
            }
            "AddTagsToStream" => handle!(tags::add_tags_to_stream),
            "RemoveTagsFromStream" => handle!(tags::remove_tags_from_stream),
            "ListTagsForStream" => handle!(tags::list_tags_for_stream),
            "StartStreamEncryption" => handle!(encryption::start_stream_encryption),
            "StopStreamEncryption" => handle!(encryption::stop_stream_encryption),
            "EnableEnhancedMonitoring" => handle!(monitoring::enable_enhanced_monitoring),
            "DisableEnhancedMonitoring" => handle!(monitoring::disable_enhanced_monitoring),
            "RegisterStreamConsumer" => handle!(consumers::register_stream_consumer),
            "DeregisterStreamConsumer" => handle!(consumers::deregister_stream_consumer),
            "DescribeStreamConsumer" => handle!(consumers::describe_stream_consumer),
            "ListStreamConsumers" => handle!(consumers::list_stream_consumers),
            "SubscribeToShard" => error_response(
                fmt,
                &KinesisError::InvalidArgument(
                    "SubscribeToShard is not supported".to_string(),
                ),
                &request_id,
            ),
            other => error_response(
                fmt,
                &KinesisError::InvalidArgument(format!("Unknown operation: {}", other)),
                &request_id,
            ),
        }
    }
    .instrument(span)
    .await
}
