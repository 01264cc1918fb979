//! End-to-end engine scenarios: stream lifecycle, the write/read paths, the
//! split/merge geometry, iterator expiry, and write throttling, all under a
//! manual clock.

use assert_matches::assert_matches;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::DateTime;
use std::sync::Arc;

use kinesim::config::Config;
use kinesim::controllers::{records, shards, streams};
use kinesim::errors::KinesisError;
use kinesim::models::dto::{
    CreateStreamInput, DescribeStreamInput, DescribeStreamSummaryInput, GetRecordsInput,
    GetShardIteratorInput, PutRecordInput, PutRecordsInput, PutRecordsRequestEntryDto,
    ShardDto, SplitShardInput, MergeShardsInput,
};
use kinesim::models::sequence::SequenceNumber;
use kinesim::services::cache::Cache;
use kinesim::utils::clock::ManualClock;

const REGION: &str = "us-east-1";
const MAX_HASH: u128 = u128::MAX;
const MIDPOINT: u128 = 1u128 << 127;

fn test_cache() -> (Arc<Cache>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(
        DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
    ));
    let cache = Cache::new(Arc::new(Config::default()), clock.clone());
    (cache, clock)
}

async fn summary_status(cache: &Cache, name: &str) -> String {
    streams::describe_stream_summary(
        cache,
        REGION,
        DescribeStreamSummaryInput {
            stream_name: Some(name.to_string()),
            stream_arn: None,
        },
    )
    .await
    .unwrap()
    .stream_description_summary
    .stream_status
}

async fn shards_of(cache: &Cache, name: &str) -> Vec<ShardDto> {
    streams::describe_stream(
        cache,
        REGION,
        DescribeStreamInput {
            stream_name: Some(name.to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap()
    .stream_description
    .shards
}

fn open_shards(shards: &[ShardDto]) -> Vec<&ShardDto> {
    shards
        .iter()
        .filter(|s| s.sequence_number_range.ending_sequence_number.is_none())
        .collect()
}

async fn settle(cache: &Arc<Cache>, clock: &ManualClock) {
    clock.advance_millis(600);
    cache.scheduler().fire_due(cache).await;
}

async fn create_active(cache: &Arc<Cache>, clock: &ManualClock, name: &str, count: i32) {
    streams::create_stream(
        cache,
        REGION,
        CreateStreamInput {
            stream_name: Some(name.to_string()),
            shard_count: Some(count),
            stream_mode_details: None,
        },
    )
    .await
    .unwrap();
    settle(cache, clock).await;
    assert_eq!(summary_status(cache, name).await, "ACTIVE");
}

async fn iterator_for(cache: &Cache, name: &str, shard_id: &str, kind: &str) -> String {
    records::get_shard_iterator(
        cache,
        REGION,
        GetShardIteratorInput {
            stream_name: Some(name.to_string()),
            shard_id: Some(shard_id.to_string()),
            shard_iterator_type: Some(kind.to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap()
    .shard_iterator
}

#[tokio::test]
async fn new_stream_becomes_active_with_one_full_range_shard() {
    let (cache, clock) = test_cache();
    streams::create_stream(
        &cache,
        REGION,
        CreateStreamInput {
            stream_name: Some("s1".to_string()),
            shard_count: Some(1),
            stream_mode_details: None,
        },
    )
    .await
    .unwrap();

    // immediately CREATING, ACTIVE only after the configured delay
    assert_eq!(summary_status(&cache, "s1").await, "CREATING");
    settle(&cache, &clock).await;
    assert_eq!(summary_status(&cache, "s1").await, "ACTIVE");

    let shards = shards_of(&cache, "s1").await;
    let open = open_shards(&shards);
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].hash_key_range.starting_hash_key, "0");
    assert_eq!(open[0].hash_key_range.ending_hash_key, MAX_HASH.to_string());
}

#[tokio::test]
async fn first_record_round_trips_with_a_zero_origin_sequence() {
    let (cache, clock) = test_cache();
    create_active(&cache, &clock, "s1", 1).await;

    records::put_record(
        &cache,
        REGION,
        PutRecordInput {
            stream_name: Some("s1".to_string()),
            data: Some(BASE64.encode(b"hello")),
            partition_key: Some("pk1".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let iterator = iterator_for(&cache, "s1", "shardId-000000000000", "TRIM_HORIZON").await;
    let out = records::get_records(
        &cache,
        REGION,
        GetRecordsInput {
            shard_iterator: Some(iterator),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(out.records.len(), 1);
    let record = &out.records[0];
    assert_eq!(BASE64.decode(&record.data).unwrap(), b"hello");
    assert_eq!(record.partition_key, "pk1");

    let decoded = SequenceNumber::parse(&record.sequence_number).unwrap();
    assert_eq!(decoded.shard_index, 0);
    assert_eq!(decoded.byte_offset, 0);
    assert_eq!(decoded.sub_sequence, 0);

    assert_eq!(out.millis_behind_latest, 0);
    assert!(out.next_shard_iterator.is_some());
}

#[tokio::test]
async fn split_closes_the_parent_and_partitions_its_range() {
    let (cache, clock) = test_cache();
    create_active(&cache, &clock, "s1", 1).await;

    shards::split_shard(
        &cache,
        REGION,
        SplitShardInput {
            stream_name: Some("s1".to_string()),
            shard_to_split: Some("shardId-000000000000".to_string()),
            new_starting_hash_key: Some(MIDPOINT.to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(summary_status(&cache, "s1").await, "UPDATING");
    settle(&cache, &clock).await;
    assert_eq!(summary_status(&cache, "s1").await, "ACTIVE");

    let shards = shards_of(&cache, "s1").await;
    let parent = shards
        .iter()
        .find(|s| s.shard_id == "shardId-000000000000")
        .unwrap();
    assert!(parent
        .sequence_number_range
        .ending_sequence_number
        .is_some());

    let open = open_shards(&shards);
    assert_eq!(open.len(), 2);
    assert_eq!(open[0].hash_key_range.starting_hash_key, "0");
    assert_eq!(
        open[0].hash_key_range.ending_hash_key,
        (MIDPOINT - 1).to_string()
    );
    assert_eq!(open[1].hash_key_range.starting_hash_key, MIDPOINT.to_string());
    assert_eq!(open[1].hash_key_range.ending_hash_key, MAX_HASH.to_string());
    for child in open {
        assert_eq!(
            child.parent_shard_id.as_deref(),
            Some("shardId-000000000000")
        );
    }
}

#[tokio::test]
async fn merge_reunites_adjacent_children() {
    let (cache, clock) = test_cache();
    create_active(&cache, &clock, "s1", 1).await;
    shards::split_shard(
        &cache,
        REGION,
        SplitShardInput {
            stream_name: Some("s1".to_string()),
            shard_to_split: Some("shardId-000000000000".to_string()),
            new_starting_hash_key: Some(MIDPOINT.to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    settle(&cache, &clock).await;

    shards::merge_shards(
        &cache,
        REGION,
        MergeShardsInput {
            stream_name: Some("s1".to_string()),
            shard_to_merge: Some("shardId-000000000001".to_string()),
            adjacent_shard_to_merge: Some("shardId-000000000002".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    settle(&cache, &clock).await;
    assert_eq!(summary_status(&cache, "s1").await, "ACTIVE");

    let shards = shards_of(&cache, "s1").await;
    let open = open_shards(&shards);
    assert_eq!(open.len(), 1);
    let child = open[0];
    assert_eq!(child.hash_key_range.starting_hash_key, "0");
    assert_eq!(child.hash_key_range.ending_hash_key, MAX_HASH.to_string());
    assert_eq!(
        child.parent_shard_id.as_deref(),
        Some("shardId-000000000001")
    );
    assert_eq!(
        child.adjacent_parent_shard_id.as_deref(),
        Some("shardId-000000000002")
    );

    for closed_id in ["shardId-000000000001", "shardId-000000000002"] {
        let closed = shards.iter().find(|s| s.shard_id == closed_id).unwrap();
        assert!(closed
            .sequence_number_range
            .ending_sequence_number
            .is_some());
    }
}

#[tokio::test]
async fn iterators_expire_after_five_minutes() {
    let (cache, clock) = test_cache();
    create_active(&cache, &clock, "s1", 1).await;

    let iterator = iterator_for(&cache, "s1", "shardId-000000000000", "LATEST").await;
    clock.advance(chrono::Duration::seconds(301));

    let err = records::get_records(
        &cache,
        REGION,
        GetRecordsInput {
            shard_iterator: Some(iterator),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert_matches!(err, KinesisError::ExpiredIterator(_));
}

#[tokio::test]
async fn put_records_burst_is_throttled_per_shard() {
    let (cache, clock) = test_cache();
    create_active(&cache, &clock, "s1", 1).await;

    let data = BASE64.encode(vec![0u8; 2048]);
    let entries: Vec<PutRecordsRequestEntryDto> = (0..600)
        .map(|i| PutRecordsRequestEntryDto {
            data: Some(data.clone()),
            partition_key: Some(format!("pk{}", i)),
            explicit_hash_key: None,
        })
        .collect();

    let out = records::put_records(
        &cache,
        REGION,
        PutRecordsInput {
            stream_name: Some("s1".to_string()),
            stream_arn: None,
            records: Some(entries),
        },
    )
    .await
    .unwrap();

    assert_eq!(out.records.len(), 600);
    assert!(out.failed_record_count > 0);

    let mut successful_bytes = 0usize;
    let mut successful = 0;
    for entry in &out.records {
        match (&entry.sequence_number, &entry.error_code) {
            (Some(_), None) => {
                successful += 1;
                successful_bytes += 2048;
            }
            (None, Some(code)) => {
                assert_eq!(code, "ProvisionedThroughputExceededException");
                assert!(entry.error_message.is_some());
            }
            other => panic!("entry is neither success nor failure: {:?}", other),
        }
    }
    assert!(successful > 0);
    assert_eq!(successful + out.failed_record_count as usize, 600);
    assert!(successful_bytes <= 1024 * 1024);

    // the successes keep strictly increasing sequence numbers in order
    let sequences: Vec<u128> = out
        .records
        .iter()
        .filter_map(|e| e.sequence_number.as_ref())
        .map(|s| s.parse::<u128>().unwrap())
        .collect();
    let mut sorted = sequences.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(sequences, sorted);
}

#[tokio::test]
async fn at_timestamp_iterator_starts_at_the_first_late_record() {
    let (cache, clock) = test_cache();
    create_active(&cache, &clock, "s1", 1).await;

    for payload in [b"one".as_slice(), b"two".as_slice()] {
        records::put_record(
            &cache,
            REGION,
            PutRecordInput {
                stream_name: Some("s1".to_string()),
                data: Some(BASE64.encode(payload)),
                partition_key: Some("pk".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        clock.advance(chrono::Duration::seconds(10));
    }

    // between the two arrivals
    let cutoff = DateTime::from_timestamp(1_700_000_000, 0).unwrap()
        + chrono::Duration::milliseconds(600)
        + chrono::Duration::seconds(5);
    let iterator = records::get_shard_iterator(
        &cache,
        REGION,
        GetShardIteratorInput {
            stream_name: Some("s1".to_string()),
            shard_id: Some("shardId-000000000000".to_string()),
            shard_iterator_type: Some("AT_TIMESTAMP".to_string()),
            timestamp: Some(cutoff),
            ..Default::default()
        },
    )
    .await
    .unwrap()
    .shard_iterator;

    let out = records::get_records(
        &cache,
        REGION,
        GetRecordsInput {
            shard_iterator: Some(iterator),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(out.records.len(), 1);
    assert_eq!(BASE64.decode(&out.records[0].data).unwrap(), b"two");
}

#[tokio::test]
async fn after_sequence_number_resumes_past_the_given_record() {
    let (cache, clock) = test_cache();
    create_active(&cache, &clock, "s1", 1).await;

    let mut sequences = Vec::new();
    for payload in [b"a".as_slice(), b"b".as_slice()] {
        let out = records::put_record(
            &cache,
            REGION,
            PutRecordInput {
                stream_name: Some("s1".to_string()),
                data: Some(BASE64.encode(payload)),
                partition_key: Some("pk".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        sequences.push(out.sequence_number);
    }

    let iterator = records::get_shard_iterator(
        &cache,
        REGION,
        GetShardIteratorInput {
            stream_name: Some("s1".to_string()),
            shard_id: Some("shardId-000000000000".to_string()),
            shard_iterator_type: Some("AFTER_SEQUENCE_NUMBER".to_string()),
            starting_sequence_number: Some(sequences[0].clone()),
            ..Default::default()
        },
    )
    .await
    .unwrap()
    .shard_iterator;

    let out = records::get_records(
        &cache,
        REGION,
        GetRecordsInput {
            shard_iterator: Some(iterator),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(out.records.len(), 1);
    assert_eq!(out.records[0].sequence_number, sequences[1]);
}
