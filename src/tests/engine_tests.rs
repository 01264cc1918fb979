//! Engine-level tests: controllers driven directly against the cache, with
//! a manual clock standing in for wall time and `fire_due` standing in for
//! the scheduler loop.

use assert_matches::assert_matches;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::DateTime;
use std::sync::Arc;

use crate::config::Config;
use crate::controllers::{consumers, records, retention, shards, streams, tags};
use crate::errors::KinesisError;
use crate::models::dto::{
    AddTagsToStreamInput, CreateStreamInput, DeleteStreamInput, DescribeStreamInput,
    DescribeStreamSummaryInput, GetRecordsInput, GetShardIteratorInput, ListStreamsInput,
    ListTagsForStreamInput, PutRecordInput, RegisterStreamConsumerInput, RemoveTagsFromStreamInput,
    RetentionPeriodInput, SplitShardInput, UpdateShardCountInput,
};
use crate::models::stream::StreamModel;
use crate::services::cache::Cache;
use crate::utils::clock::ManualClock;

const REGION: &str = "us-east-1";

fn test_cache() -> (Arc<Cache>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(
        DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
    ));
    let cache = Cache::new(Arc::new(Config::default()), clock.clone());
    (cache, clock)
}

fn create_input(name: &str, shard_count: i32) -> CreateStreamInput {
    CreateStreamInput {
        stream_name: Some(name.to_string()),
        shard_count: Some(shard_count),
        stream_mode_details: None,
    }
}

async fn status_of(cache: &Cache, name: &str) -> String {
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

async fn create_active_stream(cache: &Arc<Cache>, clock: &ManualClock, name: &str, count: i32) {
    streams::create_stream(cache, REGION, create_input(name, count))
        .await
        .unwrap();
    clock.advance_millis(600);
    cache.scheduler().fire_due(cache).await;
    assert_eq!(status_of(cache, name).await, "ACTIVE");
}

async fn put(cache: &Cache, name: &str, data: &[u8], pk: &str) -> Result<String, KinesisError> {
    records::put_record(
        cache,
        REGION,
        PutRecordInput {
            stream_name: Some(name.to_string()),
            data: Some(BASE64.encode(data)),
            partition_key: Some(pk.to_string()),
            ..Default::default()
        },
    )
    .await
    .map(|out| out.sequence_number)
}

#[tokio::test]
async fn stream_flips_to_active_only_after_the_delay() {
    let (cache, clock) = test_cache();
    streams::create_stream(&cache, REGION, create_input("orders", 2))
        .await
        .unwrap();

    assert_eq!(status_of(&cache, "orders").await, "CREATING");

    // not due yet
    clock.advance_millis(400);
    cache.scheduler().fire_due(&cache).await;
    assert_eq!(status_of(&cache, "orders").await, "CREATING");

    clock.advance_millis(200);
    cache.scheduler().fire_due(&cache).await;
    assert_eq!(status_of(&cache, "orders").await, "ACTIVE");
}

#[tokio::test]
async fn duplicate_create_conflicts() {
    let (cache, _clock) = test_cache();
    streams::create_stream(&cache, REGION, create_input("orders", 1))
        .await
        .unwrap();
    let err = streams::create_stream(&cache, REGION, create_input("orders", 1))
        .await
        .unwrap_err();
    assert_matches!(err, KinesisError::ResourceInUse(_));
}

#[tokio::test]
async fn delete_is_asynchronous_and_idempotent() {
    let (cache, clock) = test_cache();
    create_active_stream(&cache, &clock, "orders", 1).await;

    let input = DeleteStreamInput {
        stream_name: Some("orders".to_string()),
        ..Default::default()
    };
    streams::delete_stream(&cache, REGION, input.clone())
        .await
        .unwrap();
    assert_eq!(status_of(&cache, "orders").await, "DELETING");

    // a second delete while DELETING is accepted and does nothing
    streams::delete_stream(&cache, REGION, input).await.unwrap();

    clock.advance_millis(600);
    cache.scheduler().fire_due(&cache).await;
    let err = streams::describe_stream_summary(
        &cache,
        REGION,
        DescribeStreamSummaryInput {
            stream_name: Some("orders".to_string()),
            stream_arn: None,
        },
    )
    .await
    .unwrap_err();
    assert_matches!(err, KinesisError::ResourceNotFound(_));
}

#[tokio::test]
async fn writes_require_an_active_stream() {
    let (cache, _clock) = test_cache();
    streams::create_stream(&cache, REGION, create_input("orders", 1))
        .await
        .unwrap();
    let err = put(&cache, "orders", b"x", "pk").await.unwrap_err();
    assert_matches!(err, KinesisError::ResourceInUse(_));
}

#[tokio::test]
async fn stale_activation_after_delete_is_a_noop() {
    let (cache, clock) = test_cache();
    create_active_stream(&cache, &clock, "orders", 1).await;

    // split leaves a pending UPDATING -> ACTIVE flip in the queue
    shards::split_shard(
        &cache,
        REGION,
        SplitShardInput {
            stream_name: Some("orders".to_string()),
            shard_to_split: Some("shardId-000000000000".to_string()),
            new_starting_hash_key: Some((1u128 << 127).to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    streams::delete_stream(
        &cache,
        REGION,
        DeleteStreamInput {
            stream_name: Some("orders".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    // both the stale activation and the removal fire; the stream must not
    // resurrect as ACTIVE
    clock.advance_millis(600);
    cache.scheduler().fire_due(&cache).await;
    let err = status_of_result(&cache, "orders").await.unwrap_err();
    assert_matches!(err, KinesisError::ResourceNotFound(_));
}

async fn status_of_result(cache: &Cache, name: &str) -> Result<String, KinesisError> {
    streams::describe_stream_summary(
        cache,
        REGION,
        DescribeStreamSummaryInput {
            stream_name: Some(name.to_string()),
            stream_arn: None,
        },
    )
    .await
    .map(|out| out.stream_description_summary.stream_status)
}

#[tokio::test]
async fn consumer_lifecycle_and_limits() {
    let (cache, clock) = test_cache();
    create_active_stream(&cache, &clock, "orders", 1).await;
    let arn = StreamModel::arn_for(REGION, "000000000000", "orders");

    let out = consumers::register_stream_consumer(
        &cache,
        REGION,
        RegisterStreamConsumerInput {
            stream_arn: Some(arn.clone()),
            consumer_name: Some("archiver".to_string()),
        },
    )
    .await
    .unwrap();
    assert_eq!(out.consumer.consumer_status, "CREATING");

    let err = consumers::register_stream_consumer(
        &cache,
        REGION,
        RegisterStreamConsumerInput {
            stream_arn: Some(arn.clone()),
            consumer_name: Some("archiver".to_string()),
        },
    )
    .await
    .unwrap_err();
    assert_matches!(err, KinesisError::ResourceInUse(_));

    clock.advance_millis(600);
    cache.scheduler().fire_due(&cache).await;

    let described = consumers::describe_stream_consumer(
        &cache,
        REGION,
        crate::models::dto::DescribeStreamConsumerInput {
            stream_arn: Some(arn.clone()),
            consumer_name: Some("archiver".to_string()),
            consumer_arn: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(described.consumer_description.consumer_status, "ACTIVE");

    // consumers block stream deletion unless enforced
    let err = streams::delete_stream(
        &cache,
        REGION,
        DeleteStreamInput {
            stream_name: Some("orders".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert_matches!(err, KinesisError::ResourceInUse(_));

    consumers::deregister_stream_consumer(
        &cache,
        REGION,
        crate::models::dto::DeregisterStreamConsumerInput {
            stream_arn: Some(arn.clone()),
            consumer_name: Some("archiver".to_string()),
            consumer_arn: None,
        },
    )
    .await
    .unwrap();
    clock.advance_millis(600);
    cache.scheduler().fire_due(&cache).await;

    let err = consumers::describe_stream_consumer(
        &cache,
        REGION,
        crate::models::dto::DescribeStreamConsumerInput {
            stream_arn: Some(arn),
            consumer_name: Some("archiver".to_string()),
            consumer_arn: None,
        },
    )
    .await
    .unwrap_err();
    assert_matches!(err, KinesisError::ResourceNotFound(_));
}

#[tokio::test]
async fn tag_updates_are_idempotent_and_listable() {
    let (cache, clock) = test_cache();
    create_active_stream(&cache, &clock, "orders", 1).await;

    let add = AddTagsToStreamInput {
        stream_name: Some("orders".to_string()),
        tags: Some(
            [("team".to_string(), "data".to_string())]
                .into_iter()
                .collect(),
        ),
        ..Default::default()
    };
    tags::add_tags_to_stream(&cache, REGION, add.clone())
        .await
        .unwrap();
    tags::add_tags_to_stream(&cache, REGION, add).await.unwrap();

    let listed = tags::list_tags_for_stream(
        &cache,
        REGION,
        ListTagsForStreamInput {
            stream_name: Some("orders".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(listed.tags.len(), 1);
    assert_eq!(listed.tags[0].key, "team");
    assert!(!listed.has_more_tags);

    tags::remove_tags_from_stream(
        &cache,
        REGION,
        RemoveTagsFromStreamInput {
            stream_name: Some("orders".to_string()),
            tag_keys: Some(vec!["team".to_string()]),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let listed = tags::list_tags_for_stream(
        &cache,
        REGION,
        ListTagsForStreamInput {
            stream_name: Some("orders".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert!(listed.tags.is_empty());
}

#[tokio::test]
async fn retention_changes_are_direction_checked() {
    let (cache, clock) = test_cache();
    create_active_stream(&cache, &clock, "orders", 1).await;

    let increase = |hours| RetentionPeriodInput {
        stream_name: Some("orders".to_string()),
        retention_period_hours: Some(hours),
        ..Default::default()
    };

    // lowering through the increase op is rejected
    let err = retention::increase_stream_retention_period(&cache, REGION, increase(24))
        .await
        .unwrap_err();
    assert_matches!(err, KinesisError::InvalidArgument(_));

    retention::increase_stream_retention_period(&cache, REGION, increase(48))
        .await
        .unwrap();
    clock.advance_millis(600);
    cache.scheduler().fire_due(&cache).await;

    let err = retention::decrease_stream_retention_period(&cache, REGION, increase(72))
        .await
        .unwrap_err();
    assert_matches!(err, KinesisError::InvalidArgument(_));

    let err = retention::increase_stream_retention_period(&cache, REGION, increase(9000))
        .await
        .unwrap_err();
    assert_matches!(err, KinesisError::Validation(_));
}

#[tokio::test]
async fn update_shard_count_enforces_the_doubling_window() {
    let (cache, clock) = test_cache();
    create_active_stream(&cache, &clock, "orders", 4).await;

    let input = |target| UpdateShardCountInput {
        stream_name: Some("orders".to_string()),
        target_shard_count: Some(target),
        scaling_type: Some("UNIFORM_SCALING".to_string()),
        ..Default::default()
    };

    let err = shards::update_shard_count(&cache, REGION, input(1))
        .await
        .unwrap_err();
    assert_matches!(err, KinesisError::InvalidArgument(_));
    let err = shards::update_shard_count(&cache, REGION, input(9))
        .await
        .unwrap_err();
    assert_matches!(err, KinesisError::InvalidArgument(_));

    let out = shards::update_shard_count(&cache, REGION, input(8))
        .await
        .unwrap();
    assert_eq!(out.current_shard_count, 4);
    assert_eq!(out.target_shard_count, 8);

    clock.advance_millis(600);
    cache.scheduler().fire_due(&cache).await;
    let description = streams::describe_stream(
        &cache,
        REGION,
        DescribeStreamInput {
            stream_name: Some("orders".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap()
    .stream_description;
    assert_eq!(description.stream_status, "ACTIVE");
    let open = description
        .shards
        .iter()
        .filter(|s| s.sequence_number_range.ending_sequence_number.is_none())
        .count();
    assert_eq!(open, 8);
}

#[tokio::test]
async fn exhausted_closed_shard_hands_out_children() {
    let (cache, clock) = test_cache();
    create_active_stream(&cache, &clock, "orders", 1).await;
    put(&cache, "orders", b"hello", "pk").await.unwrap();

    shards::split_shard(
        &cache,
        REGION,
        SplitShardInput {
            stream_name: Some("orders".to_string()),
            shard_to_split: Some("shardId-000000000000".to_string()),
            new_starting_hash_key: Some((1u128 << 127).to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    clock.advance_millis(600);
    cache.scheduler().fire_due(&cache).await;

    let iterator = records::get_shard_iterator(
        &cache,
        REGION,
        GetShardIteratorInput {
            stream_name: Some("orders".to_string()),
            shard_id: Some("shardId-000000000000".to_string()),
            shard_iterator_type: Some("TRIM_HORIZON".to_string()),
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
    assert!(out.next_shard_iterator.is_none());
    let children = out.child_shards.unwrap();
    assert_eq!(children.len(), 2);
    for child in &children {
        assert_eq!(child.parent_shards, vec!["shardId-000000000000".to_string()]);
    }
}

#[tokio::test]
async fn write_quota_refills_continuously() {
    let (cache, clock) = test_cache();
    create_active_stream(&cache, &clock, "orders", 1).await;

    let payload = vec![0u8; 400 * 1024];
    put(&cache, "orders", &payload, "pk").await.unwrap();
    put(&cache, "orders", &payload, "pk").await.unwrap();
    let err = put(&cache, "orders", &payload, "pk").await.unwrap_err();
    assert_matches!(err, KinesisError::ProvisionedThroughputExceeded(_));

    // a second of refill restores the full budget
    clock.advance_millis(1000);
    put(&cache, "orders", &payload, "pk").await.unwrap();
}

#[tokio::test]
async fn list_streams_paginates_with_a_sealed_token() {
    let (cache, _clock) = test_cache();
    for name in ["alpha", "beta", "gamma"] {
        streams::create_stream(&cache, REGION, create_input(name, 1))
            .await
            .unwrap();
    }

    let first = streams::list_streams(
        &cache,
        REGION,
        ListStreamsInput {
            limit: Some(2),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(first.stream_names, vec!["alpha", "beta"]);
    assert!(first.has_more_streams);

    let second = streams::list_streams(
        &cache,
        REGION,
        ListStreamsInput {
            limit: Some(2),
            next_token: first.next_token,
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(second.stream_names, vec!["gamma"]);
    assert!(!second.has_more_streams);
    assert!(second.next_token.is_none());
}

#[tokio::test]
async fn regions_are_isolated() {
    let (cache, _clock) = test_cache();
    streams::create_stream(&cache, "us-east-1", create_input("orders", 1))
        .await
        .unwrap();

    let err = streams::describe_stream_summary(
        &cache,
        "eu-west-1",
        DescribeStreamSummaryInput {
            stream_name: Some("orders".to_string()),
            stream_arn: None,
        },
    )
    .await
    .unwrap_err();
    assert_matches!(err, KinesisError::ResourceNotFound(_));
}

#[tokio::test]
async fn retention_sweep_purges_old_records() {
    let (cache, clock) = test_cache();
    create_active_stream(&cache, &clock, "orders", 1).await;
    put(&cache, "orders", b"old", "pk").await.unwrap();

    // past the 24h retention window the periodic sweep drops the record
    clock.advance(chrono::Duration::hours(25));
    cache.scheduler().fire_due(&cache).await;

    let iterator = records::get_shard_iterator(
        &cache,
        REGION,
        GetShardIteratorInput {
            stream_name: Some("orders".to_string()),
            shard_id: Some("shardId-000000000000".to_string()),
            shard_iterator_type: Some("TRIM_HORIZON".to_string()),
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
    assert!(out.records.is_empty());
}
