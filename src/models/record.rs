use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::stream::EncryptionType;
use crate::models::{opt_u128_str, u128_str};

/// Upper bound on a single record's payload.
pub const MAX_DATA_BYTES: usize = 1024 * 1024;
pub const MIN_PARTITION_KEY_LEN: usize = 1;
pub const MAX_PARTITION_KEY_LEN: usize = 256;

/// A record at rest inside a shard. Payloads are immutable once appended;
/// readers share them without copying the shard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredRecord {
    #[serde(with = "u128_str")]
    pub sequence_number: u128,
    pub approximate_arrival_timestamp: DateTime<Utc>,
    pub data: Vec<u8>,
    pub partition_key: String,
    #[serde(with = "opt_u128_str")]
    pub explicit_hash_key: Option<u128>,
    pub encryption_type: EncryptionType,
}

impl StoredRecord {
    /// Bytes this record counts against the shard's write quota.
    pub fn billed_bytes(&self) -> usize {
        self.data.len() + self.partition_key.len()
    }
}
