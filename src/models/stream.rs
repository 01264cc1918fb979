use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::errors::KinesisError;
use crate::models::consumer::Consumer;
use crate::models::shard::{even_ranges, HashKeyRange, Shard};

pub const MAX_TAGS_PER_STREAM: usize = 50;
pub const MAX_STREAM_NAME_LEN: usize = 128;
pub const MIN_RETENTION_HOURS: i32 = 24;
pub const MAX_RETENTION_HOURS: i32 = 8760;
pub const MAX_SHARDS_PER_CREATE: i32 = 10000;
/// Shard count used when a stream is created in on-demand mode.
pub const ON_DEMAND_DEFAULT_SHARD_COUNT: u32 = 4;

/// The shard-level metrics enhanced monitoring can enable; "ALL" expands to
/// the whole set.
pub const SHARD_LEVEL_METRICS: [&str; 7] = [
    "IncomingBytes",
    "IncomingRecords",
    "OutgoingBytes",
    "OutgoingRecords",
    "WriteProvisionedThroughputExceeded",
    "ReadProvisionedThroughputExceeded",
    "IteratorAgeMilliseconds",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamStatus {
    Creating,
    Active,
    Updating,
    Deleting,
}

impl StreamStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamStatus::Creating => "CREATING",
            StreamStatus::Active => "ACTIVE",
            StreamStatus::Updating => "UPDATING",
            StreamStatus::Deleting => "DELETING",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamMode {
    Provisioned,
    OnDemand,
}

impl StreamMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamMode::Provisioned => "PROVISIONED",
            StreamMode::OnDemand => "ON_DEMAND",
        }
    }

    pub fn parse(s: &str) -> Result<Self, KinesisError> {
        match s {
            "PROVISIONED" => Ok(StreamMode::Provisioned),
            "ON_DEMAND" => Ok(StreamMode::OnDemand),
            other => Err(KinesisError::Validation(format!(
                "StreamMode {} is not one of PROVISIONED, ON_DEMAND",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EncryptionType {
    None,
    Kms,
}

impl EncryptionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EncryptionType::None => "NONE",
            EncryptionType::Kms => "KMS",
        }
    }
}

/// Audit-log entry for shard-count changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShardCountEntry {
    pub timestamp: DateTime<Utc>,
    pub shard_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamModel {
    pub stream_name: String,
    pub stream_arn: String,
    pub region: String,
    pub account_id: String,
    pub status: StreamStatus,
    pub mode: StreamMode,
    pub creation_timestamp: DateTime<Utc>,
    pub retention_period_hours: i32,
    pub encryption_type: EncryptionType,
    pub key_id: Option<String>,
    pub enhanced_monitoring: BTreeSet<String>,
    pub tags: BTreeMap<String, String>,
    pub consumers: BTreeMap<String, Consumer>,
    pub shards: Vec<Shard>,
    pub shard_count_history: Vec<ShardCountEntry>,
}

impl StreamModel {
    pub fn arn_for(region: &str, account_id: &str, stream_name: &str) -> String {
        format!(
            "arn:aws:kinesis:{}:{}:stream/{}",
            region, account_id, stream_name
        )
    }

    pub fn new(
        stream_name: &str,
        region: &str,
        account_id: &str,
        shard_count: u32,
        mode: StreamMode,
        now: DateTime<Utc>,
    ) -> Self {
        let shards = even_ranges(shard_count)
            .into_iter()
            .enumerate()
            .map(|(i, range)| Shard::new(i as u32, range, now))
            .collect::<Vec<_>>();

        let mut stream = Self {
            stream_name: stream_name.to_string(),
            stream_arn: Self::arn_for(region, account_id, stream_name),
            region: region.to_string(),
            account_id: account_id.to_string(),
            status: StreamStatus::Creating,
            mode,
            creation_timestamp: now,
            retention_period_hours: MIN_RETENTION_HOURS,
            encryption_type: EncryptionType::None,
            key_id: None,
            enhanced_monitoring: BTreeSet::new(),
            tags: BTreeMap::new(),
            consumers: BTreeMap::new(),
            shards,
            shard_count_history: Vec::new(),
        };
        stream.record_shard_count(now);
        stream
    }

    pub fn open_shards(&self) -> impl Iterator<Item = &Shard> {
        self.shards.iter().filter(|s| s.is_open())
    }

    pub fn open_shard_count(&self) -> usize {
        self.open_shards().count()
    }

    pub fn shard(&self, shard_id: &str) -> Option<&Shard> {
        self.shards.iter().find(|s| s.shard_id == shard_id)
    }

    pub fn shard_mut(&mut self, shard_id: &str) -> Option<&mut Shard> {
        self.shards.iter_mut().find(|s| s.shard_id == shard_id)
    }

    /// Index of the unique open shard owning `hash_key`.
    pub fn route(&self, hash_key: u128) -> Option<usize> {
        self.shards
            .iter()
            .position(|s| s.is_open() && s.hash_key_range.contains(hash_key))
    }

    /// Shards whose parent pointers reference `shard_id`.
    pub fn child_shards_of(&self, shard_id: &str) -> Vec<&Shard> {
        self.shards
            .iter()
            .filter(|s| {
                s.parent_shard_id.as_deref() == Some(shard_id)
                    || s.adjacent_parent_shard_id.as_deref() == Some(shard_id)
            })
            .collect()
    }

    fn next_shard_index(&self) -> u32 {
        self.shards.len() as u32
    }

    pub fn record_shard_count(&mut self, now: DateTime<Utc>) {
        let shard_count = self.open_shard_count();
        self.shard_count_history.push(ShardCountEntry {
            timestamp: now,
            shard_count,
        });
    }

    /// Close the parent and allocate two open children at the split point.
    pub fn apply_split(
        &mut self,
        shard_id: &str,
        new_starting_hash_key: u128,
        now: DateTime<Utc>,
    ) -> Result<(), KinesisError> {
        let parent_index = self
            .shards
            .iter()
            .position(|s| s.shard_id == shard_id)
            .ok_or_else(|| {
                KinesisError::ResourceNotFound(format!(
                    "Could not find shard {} in stream {}",
                    shard_id, self.stream_name
                ))
            })?;

        let (low_range, high_range) = self.shards[parent_index]
            .hash_key_range
            .split_at(new_starting_hash_key)?;

        self.shards[parent_index].close(now);
        let parent_id = self.shards[parent_index].shard_id.clone();

        let mut low = Shard::new(self.next_shard_index(), low_range, now);
        low.parent_shard_id = Some(parent_id.clone());
        self.shards.push(low);

        let mut high = Shard::new(self.next_shard_index(), high_range, now);
        high.parent_shard_id = Some(parent_id);
        self.shards.push(high);

        self.record_shard_count(now);
        Ok(())
    }

    /// Close both parents and allocate one open child spanning their union.
    pub fn apply_merge(
        &mut self,
        shard_id: &str,
        adjacent_shard_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), KinesisError> {
        let first = self
            .shard(shard_id)
            .ok_or_else(|| {
                KinesisError::ResourceNotFound(format!(
                    "Could not find shard {} in stream {}",
                    shard_id, self.stream_name
                ))
            })?
            .hash_key_range;
        let second = self
            .shard(adjacent_shard_id)
            .ok_or_else(|| {
                KinesisError::ResourceNotFound(format!(
                    "Could not find shard {} in stream {}",
                    adjacent_shard_id, self.stream_name
                ))
            })?
            .hash_key_range;

        let merged_range = first.union(&second);

        if let Some(shard) = self.shard_mut(shard_id) {
            shard.close(now);
        }
        if let Some(shard) = self.shard_mut(adjacent_shard_id) {
            shard.close(now);
        }

        let mut child = Shard::new(self.next_shard_index(), merged_range, now);
        child.parent_shard_id = Some(shard_id.to_string());
        child.adjacent_parent_shard_id = Some(adjacent_shard_id.to_string());
        self.shards.push(child);

        self.record_shard_count(now);
        Ok(())
    }

    /// Rebalance to `target` open shards with even ranges; every open shard
    /// is closed and each child points at the closed shard that contained
    /// its starting hash key.
    pub fn rebalance(&mut self, target: u32, now: DateTime<Utc>) {
        let closing: Vec<(String, HashKeyRange)> = self
            .open_shards()
            .map(|s| (s.shard_id.clone(), s.hash_key_range))
            .collect();

        for (shard_id, _) in &closing {
            if let Some(shard) = self.shard_mut(shard_id) {
                shard.close(now);
            }
        }

        for range in even_ranges(target) {
            let parent = closing
                .iter()
                .find(|(_, r)| r.contains(range.starting_hash_key))
                .map(|(id, _)| id.clone());
            let mut child = Shard::new(self.next_shard_index(), range, now);
            child.parent_shard_id = parent;
            self.shards.push(child);
        }

        self.record_shard_count(now);
    }

    /// Drop records whose arrival is older than the retention window.
    /// Returns how many records were purged.
    pub fn purge_expired_records(&mut self, now: DateTime<Utc>) -> usize {
        let cutoff = now - chrono::Duration::hours(self.retention_period_hours as i64);
        let mut purged = 0;
        for shard in &mut self.shards {
            let before = shard.records.len();
            shard
                .records
                .retain(|r| r.approximate_arrival_timestamp >= cutoff);
            purged += before - shard.records.len();
        }
        purged
    }
}
