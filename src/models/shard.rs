use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::KinesisError;
use crate::models::record::StoredRecord;
use crate::models::sequence::SequenceNumber;
use crate::models::throughput::{
    TokenBucket, READ_TRANSACTIONS_PER_SECOND, WRITE_BYTES_PER_SECOND, WRITE_RECORDS_PER_SECOND,
};
use crate::models::u128_str;

pub const MAX_HASH_KEY: u128 = u128::MAX;

/// A contiguous, inclusive slice of the 128-bit hash-key space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashKeyRange {
    #[serde(with = "u128_str")]
    pub starting_hash_key: u128,
    #[serde(with = "u128_str")]
    pub ending_hash_key: u128,
}

impl HashKeyRange {
    pub fn full() -> Self {
        Self {
            starting_hash_key: 0,
            ending_hash_key: MAX_HASH_KEY,
        }
    }

    pub fn contains(&self, hash_key: u128) -> bool {
        self.starting_hash_key <= hash_key && hash_key <= self.ending_hash_key
    }

    pub fn is_adjacent_to(&self, other: &HashKeyRange) -> bool {
        self.ending_hash_key
            .checked_add(1)
            .map(|next| next == other.starting_hash_key)
            .unwrap_or(false)
            || other
                .ending_hash_key
                .checked_add(1)
                .map(|next| next == self.starting_hash_key)
                .unwrap_or(false)
    }

    /// Union of two adjacent ranges.
    pub fn union(&self, other: &HashKeyRange) -> HashKeyRange {
        HashKeyRange {
            starting_hash_key: self.starting_hash_key.min(other.starting_hash_key),
            ending_hash_key: self.ending_hash_key.max(other.ending_hash_key),
        }
    }

    /// Split into `[start, at-1]` and `[at, end]`. `at` must lie strictly
    /// inside `(start, end)`.
    pub fn split_at(&self, at: u128) -> Result<(HashKeyRange, HashKeyRange), KinesisError> {
        if at <= self.starting_hash_key || at >= self.ending_hash_key {
            return Err(KinesisError::InvalidArgument(format!(
                "NewStartingHashKey {} must be strictly between {} and {}",
                at, self.starting_hash_key, self.ending_hash_key
            )));
        }
        Ok((
            HashKeyRange {
                starting_hash_key: self.starting_hash_key,
                ending_hash_key: at - 1,
            },
            HashKeyRange {
                starting_hash_key: at,
                ending_hash_key: self.ending_hash_key,
            },
        ))
    }
}

/// Divide the full hash-key space into `count` contiguous disjoint ranges
/// whose sizes differ by at most one.
pub fn even_ranges(count: u32) -> Vec<HashKeyRange> {
    assert!(count > 0);
    let n = count as u128;
    // sum of range sizes (each size excluding its start) must be 2^128 - n
    let spread = MAX_HASH_KEY - (n - 1);
    let base = spread / n;
    let remainder = spread % n;

    let mut ranges = Vec::with_capacity(count as usize);
    let mut start: u128 = 0;
    for i in 0..n {
        let size = base + if i < remainder { 1 } else { 0 };
        let end = start + size;
        ranges.push(HashKeyRange {
            starting_hash_key: start,
            ending_hash_key: end,
        });
        start = end.wrapping_add(1);
    }
    ranges
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SequenceNumberRange {
    pub starting_sequence_number: String,
    pub ending_sequence_number: Option<String>,
}

/// One shard of a stream: a hash-key slice, its records, the sequence-number
/// counters, and the write/read token buckets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shard {
    pub shard_id: String,
    pub shard_index: u32,
    pub hash_key_range: HashKeyRange,
    pub sequence_number_range: SequenceNumberRange,
    pub parent_shard_id: Option<String>,
    pub adjacent_parent_shard_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    /// Cumulative byte length of all records appended since creation.
    pub next_byte_offset: u64,
    /// Disambiguates records that share a byte offset; resets when the
    /// offset advances.
    pub sub_sequence: u32,
    pub records: Vec<StoredRecord>,
    pub write_bytes: TokenBucket,
    pub write_records: TokenBucket,
    pub read_transactions: TokenBucket,
}

impl Shard {
    pub fn shard_id_for_index(index: u32) -> String {
        format!("shardId-{:012}", index)
    }

    pub fn new(index: u32, hash_key_range: HashKeyRange, now: DateTime<Utc>) -> Self {
        let starting = SequenceNumber::starting(index, now.timestamp() as u32);
        Self {
            shard_id: Self::shard_id_for_index(index),
            shard_index: index,
            hash_key_range,
            sequence_number_range: SequenceNumberRange {
                starting_sequence_number: starting.to_decimal(),
                ending_sequence_number: None,
            },
            parent_shard_id: None,
            adjacent_parent_shard_id: None,
            created_at: now,
            closed_at: None,
            next_byte_offset: 0,
            sub_sequence: 0,
            records: Vec::new(),
            write_bytes: TokenBucket::new(WRITE_BYTES_PER_SECOND, WRITE_BYTES_PER_SECOND, now),
            write_records: TokenBucket::new(
                WRITE_RECORDS_PER_SECOND,
                WRITE_RECORDS_PER_SECOND,
                now,
            ),
            read_transactions: TokenBucket::new(
                READ_TRANSACTIONS_PER_SECOND,
                READ_TRANSACTIONS_PER_SECOND,
                now,
            ),
        }
    }

    pub fn is_open(&self) -> bool {
        self.sequence_number_range.ending_sequence_number.is_none()
    }

    fn created_secs(&self) -> u32 {
        self.created_at.timestamp() as u32
    }

    /// The sequence number the next accepted record will get.
    pub fn next_sequence(&self) -> SequenceNumber {
        SequenceNumber {
            shard_index: self.shard_index,
            byte_offset: self.next_byte_offset,
            sub_sequence: self.sub_sequence,
            shard_create_secs: self.created_secs(),
        }
    }

    /// Allocate the sequence number for a record of `data_len` bytes and
    /// advance the per-shard counters.
    pub fn assign_sequence(&mut self, data_len: usize) -> SequenceNumber {
        let assigned = self.next_sequence();
        if data_len == 0 {
            self.sub_sequence += 1;
        } else {
            self.next_byte_offset += data_len as u64;
            self.sub_sequence = 0;
        }
        assigned
    }

    /// Close the shard. The ending sequence number is the next unassigned
    /// one, so it is >= every record stored here.
    pub fn close(&mut self, now: DateTime<Utc>) {
        self.sequence_number_range.ending_sequence_number =
            Some(self.next_sequence().to_decimal());
        self.closed_at = Some(now);
    }

    /// Debit the write quota for one record of `billed_bytes`. Both buckets
    /// must have room or neither is debited.
    pub fn try_debit_write(&mut self, billed_bytes: usize, now: DateTime<Utc>) -> bool {
        if self.write_records.has_capacity(1.0, now)
            && self.write_bytes.has_capacity(billed_bytes as f64, now)
        {
            self.write_records.try_consume(1.0, now);
            self.write_bytes.try_consume(billed_bytes as f64, now);
            true
        } else {
            false
        }
    }

    pub fn last_arrival(&self) -> Option<DateTime<Utc>> {
        self.records
            .last()
            .map(|r| r.approximate_arrival_timestamp)
    }
}
