use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MAX_CONSUMERS_PER_STREAM: usize = 20;
pub const MAX_CONSUMER_NAME_LEN: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsumerStatus {
    Creating,
    Active,
    Deleting,
}

impl ConsumerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsumerStatus::Creating => "CREATING",
            ConsumerStatus::Active => "ACTIVE",
            ConsumerStatus::Deleting => "DELETING",
        }
    }
}

/// An enhanced fan-out registration on a stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Consumer {
    pub consumer_name: String,
    pub consumer_arn: String,
    pub consumer_status: ConsumerStatus,
    pub consumer_creation_timestamp: DateTime<Utc>,
    pub stream_arn: String,
}

impl Consumer {
    pub fn new(consumer_name: &str, stream_arn: &str, now: DateTime<Utc>) -> Self {
        let consumer_arn = format!(
            "{}/consumer/{}:{}",
            stream_arn,
            consumer_name,
            now.timestamp()
        );
        Self {
            consumer_name: consumer_name.to_string(),
            consumer_arn,
            consumer_status: ConsumerStatus::Creating,
            consumer_creation_timestamp: now,
            stream_arn: stream_arn.to_string(),
        }
    }
}
