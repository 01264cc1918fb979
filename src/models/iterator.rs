use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::KinesisError;
use crate::models::u128_str;
use crate::utils::token;

/// Server-side content of a shard iterator. The token carries no state
/// beyond this payload; it is sealed so clients can neither forge nor
/// inspect it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShardIteratorToken {
    pub stream_name: String,
    pub shard_id: String,
    /// Reads resume at the first record whose sequence number is >= this.
    #[serde(with = "u128_str")]
    pub starting_sequence: u128,
    pub issued_at: DateTime<Utc>,
}

impl ShardIteratorToken {
    pub fn seal(&self) -> Result<String, KinesisError> {
        let payload = serde_json::to_vec(self)?;
        token::seal(&payload)
    }

    pub fn unseal(sealed: &str) -> Result<Self, KinesisError> {
        let payload = token::unseal(sealed)
            .map_err(|_| KinesisError::InvalidArgument("Invalid ShardIterator".to_string()))?;
        serde_json::from_slice(&payload)
            .map_err(|_| KinesisError::InvalidArgument("Invalid ShardIterator".to_string()))
    }

    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.issued_at > chrono::Duration::from_std(ttl).unwrap_or_else(|_| {
            chrono::Duration::seconds(300)
        })
    }
}

/// Pagination cursor for the List* operations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NextTokenPayload {
    /// Operation family the token belongs to; a token from one List call is
    /// not valid for another.
    pub scope: String,
    pub stream_name: Option<String>,
    /// Last key already returned to the caller.
    pub exclusive_start: String,
    pub issued_at: DateTime<Utc>,
}

impl NextTokenPayload {
    pub fn new(
        scope: &str,
        stream_name: Option<&str>,
        exclusive_start: &str,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            scope: scope.to_string(),
            stream_name: stream_name.map(|s| s.to_string()),
            exclusive_start: exclusive_start.to_string(),
            issued_at,
        }
    }

    pub fn seal(&self) -> Result<String, KinesisError> {
        let payload = serde_json::to_vec(self)?;
        token::seal(&payload)
    }

    /// Open and validate a token for `scope`; expired tokens fail with
    /// ExpiredNextTokenException.
    pub fn unseal(
        sealed: &str,
        scope: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Self, KinesisError> {
        let payload = token::unseal(sealed)
            .map_err(|_| KinesisError::InvalidArgument("Invalid NextToken".to_string()))?;
        let parsed: NextTokenPayload = serde_json::from_slice(&payload)
            .map_err(|_| KinesisError::InvalidArgument("Invalid NextToken".to_string()))?;
        if parsed.scope != scope {
            return Err(KinesisError::InvalidArgument(
                "NextToken was issued for a different operation".to_string(),
            ));
        }
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(300));
        if now - parsed.issued_at > ttl {
            return Err(KinesisError::ExpiredNextToken(
                "NextToken has expired".to_string(),
            ));
        }
        Ok(parsed)
    }
}
