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


use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::KinesisError;
use crate::models::consumer::MAX_CONSUMER_NAME_LEN;
use crate::models::record::{MAX_PARTITION_KEY_LEN, MIN_PARTITION_KEY_LEN};
use crate::models::stream::{StreamModel, StreamStatus, MAX_STREAM_NAME_LEN};

static NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_.-]+$").unwrap());
static STREAM_ARN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^arn:aws:kinesis:([a-z0-9-]+):(\d{12}):stream/([a-zA-Z0-9_.-]+)$").unwrap()
});
static CONSUMER_ARN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^arn:aws:kinesis:([a-z0-9-]+):(\d{12}):stream/([a-zA-Z0-9_.-]+)/consumer/([a-zA-Z0-9_.-]+):(\d+)$",
    )
    .unwrap()
});
static TAG_CHARS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\p{L}\p{Z}\p{N}_.:/=+\-@]*$").unwrap());

/// Collects every field failure in a request so the response carries the
/// full diagnostics instead of the first one found.
#[derive(Debug, Default)]
pub struct FieldErrors {
    errors: Vec<String>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_result(self) -> Result<(), KinesisError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(KinesisError::Validation(format!(
                "{} validation error(s) detected: {}",
                self.errors.len(),
                self.errors.join(", ")
            )))
        }
    }
}

pub fn validate_stream_name(name: &str, errors: &mut FieldErrors) {
    if name.is_empty() || name.len() > MAX_STREAM_NAME_LEN {
        errors.push(format!(
            "StreamName must be between 1 and {} characters",
            MAX_STREAM_NAME_LEN
        ));
    } else if !NAME_RE.is_match(name) {
        errors.push(format!(
            "StreamName {} must match [a-zA-Z0-9_.-]+",
            name
        ));
    }
}

pub fn validate_consumer_name(name: &str, errors: &mut FieldErrors) {
    if name.is_empty() || name.len() > MAX_CONSUMER_NAME_LEN {
        errors.push(format!(
            "ConsumerName must be between 1 and {} characters",
            MAX_CONSUMER_NAME_LEN
        ));
    } else if !NAME_RE.is_match(name) {
        errors.push(format!(
            "ConsumerName {} must match [a-zA-Z0-9_.-]+",
            name
        ));
    }
}

pub fn validate_partition_key(key: &str, errors: &mut FieldErrors) {
    if key.len() < MIN_PARTITION_KEY_LEN || key.len() > MAX_PARTITION_KEY_LEN {
        errors.push(format!(
            "PartitionKey must be between {} and {} characters",
            MIN_PARTITION_KEY_LEN, MAX_PARTITION_KEY_LEN
        ));
    }
}

/// Parse a 128-bit decimal hash key, recording a field error on failure.
pub fn parse_hash_key(value: &str, field: &str, errors: &mut FieldErrors) -> Option<u128> {
    match value.parse::<u128>() {
        Ok(v) => Some(v),
        Err(_) => {
            errors.push(format!("{} must be a 128-bit unsigned decimal", field));
            None
        }
    }
}

pub fn validate_tag_key(key: &str, errors: &mut FieldErrors) {
    if key.is_empty() || key.len() > 128 {
        errors.push("Tag keys must be between 1 and 128 characters".to_string());
    } else if !TAG_CHARS_RE.is_match(key) {
        errors.push(format!("Tag key {} contains invalid characters", key));
    }
}

pub fn validate_tag_value(value: &str, errors: &mut FieldErrors) {
    if value.len() > 256 {
        errors.push("Tag values must be at most 256 characters".to_string());
    } else if !TAG_CHARS_RE.is_match(value) {
        errors.push("Tag value contains invalid characters".to_string());
    }
}

pub fn stream_name_from_arn(arn: &str) -> Result<String, KinesisError> {
    STREAM_ARN_RE
        .captures(arn)
        .map(|c| c[3].to_string())
        .ok_or_else(|| KinesisError::InvalidArgument(format!("Invalid StreamARN: {}", arn)))
}

/// (stream name, consumer name) out of a consumer ARN.
pub fn consumer_ref_from_arn(arn: &str) -> Result<(String, String), KinesisError> {
    CONSUMER_ARN_RE
        .captures(arn)
        .map(|c| (c[3].to_string(), c[4].to_string()))
        .ok_or_else(|| KinesisError::InvalidArgument(format!("Invalid ConsumerARN: {}", arn)))
}

/// Target stream out of the StreamName/StreamARN pair every request carries.
pub fn resolve_stream_name(
    stream_name: &Option<String>,
    stream_arn: &Option<String>,
) -> Result<String, KinesisError> {
    if let Some(name) = stream_name {
        return Ok(name.clone());
    }
    if let Some(arn) = stream_arn {
        return stream_name_from_arn(arn);
    }
    Err(KinesisError::Validation(
        "1 validation error(s) detected: StreamName or StreamARN is required".to_string(),
    ))
}

pub fn require_active(stream: &StreamModel) -> Result<(), KinesisError> {
    if stream.status != StreamStatus::Active {
        return Err(KinesisError::ResourceInUse(format!(
            "Stream {} is in status {}; it must be ACTIVE",
            stream.stream_name,
            stream.status.as_str()
        )));
    }
    Ok(())
}

pub fn require_not_deleting(stream: &StreamModel) -> Result<(), KinesisError> {
    if stream.status == StreamStatus::Deleting {
        return Err(KinesisError::ResourceInUse(format!(
            "Stream {} is in status DELETING",
            stream.stream_name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;

    #[rstest]
    #[case("orders", true)]
    #[case("orders-v2.raw_events", true)]
    #[case("", false)]
    #[case("bad name", false)]
    #[case("emoji🎉", false)]
    fn stream_name_charset(#[case] name: &str, #[case] ok: bool) {
        let mut errors = FieldErrors::new();
        validate_stream_name(name, &mut errors);
        assert_eq!(errors.is_empty(), ok, "name {:?}", name);
    }

    #[test]
    fn errors_are_collected_not_short_circuited() {
        let mut errors = FieldErrors::new();
        validate_stream_name("", &mut errors);
        validate_partition_key("", &mut errors);
        let err = errors.into_result().unwrap_err();
        assert_matches!(err, KinesisError::Validation(msg) => {
            assert!(msg.starts_with("2 validation error(s) detected:"));
            assert!(msg.contains(", "));
        });
    }

    #[test]
    fn arn_parsing_extracts_the_stream_name() {
        let arn = "arn:aws:kinesis:us-east-1:000000000000:stream/orders";
        assert_eq!(stream_name_from_arn(arn).unwrap(), "orders");
        assert!(stream_name_from_arn("arn:aws:sqs:us-east-1:000000000000:queue").is_err());
    }

    #[test]
    fn consumer_arn_parsing_extracts_both_names() {
        let arn =
            "arn:aws:kinesis:us-east-1:000000000000:stream/orders/consumer/archiver:1700000000";
        assert_eq!(
            consumer_ref_from_arn(arn).unwrap(),
            ("orders".to_string(), "archiver".to_string())
        );
    }

    #[test]
    fn resolve_prefers_the_explicit_name() {
        let name = resolve_stream_name(
            &Some("orders".into()),
            &Some("arn:aws:kinesis:us-east-1:000000000000:stream/other".into()),
        )
        .unwrap();
        assert_eq!(name, "orders");
    }
}
