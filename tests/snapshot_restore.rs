//! Snapshot/restore: the persisted file must reproduce the engine,
//! scheduler queue included.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::DateTime;
use std::path::Path;
use std::sync::Arc;

use kinesim::config::Config;
use kinesim::controllers::{records, streams, tags};
use kinesim::models::dto::{
    AddTagsToStreamInput, CreateStreamInput, DeleteStreamInput, DescribeStreamInput,
    DescribeStreamSummaryInput, GetRecordsInput, GetShardIteratorInput, PutRecordInput,
};
use kinesim::services::cache::Cache;
use kinesim::services::snapshot;
use kinesim::utils::clock::{Clock, ManualClock};

const REGION: &str = "us-east-1";

fn test_cache() -> (Arc<Cache>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(
        DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
    ));
    let cache = Cache::new(Arc::new(Config::default()), clock.clone());
    (cache, clock)
}

async fn create_active(cache: &Arc<Cache>, clock: &ManualClock, name: &str) {
    streams::create_stream(
        cache,
        REGION,
        CreateStreamInput {
            stream_name: Some(name.to_string()),
            shard_count: Some(2),
            stream_mode_details: None,
        },
    )
    .await
    .unwrap();
    clock.advance_millis(600);
    cache.scheduler().fire_due(cache).await;
}

#[tokio::test]
async fn restored_engine_is_equivalent_to_the_original() {
    let (cache, clock) = test_cache();
    create_active(&cache, &clock, "orders").await;

    records::put_record(
        &cache,
        REGION,
        PutRecordInput {
            stream_name: Some("orders".to_string()),
            data: Some(BASE64.encode(b"persisted")),
            partition_key: Some("pk".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    tags::add_tags_to_stream(
        &cache,
        REGION,
        AddTagsToStreamInput {
            stream_name: Some("orders".to_string()),
            tags: Some(
                [("env".to_string(), "test".to_string())]
                    .into_iter()
                    .collect(),
            ),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("engine.snapshot");
    snapshot::write_snapshot(&path, &cache.snapshot().await).unwrap();

    let restored_state = snapshot::load_snapshot(Path::new(&path)).unwrap().unwrap();
    let clock2 = Arc::new(ManualClock::new(clock.now()));
    let restored = Cache::with_snapshot(Arc::new(Config::default()), clock2, restored_state);

    let before = streams::describe_stream(
        &cache,
        REGION,
        DescribeStreamInput {
            stream_name: Some("orders".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let after = streams::describe_stream(
        &restored,
        REGION,
        DescribeStreamInput {
            stream_name: Some("orders".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(before, after);

    // every shard's content reads back identically through fresh iterators
    async fn drain_shard(cache: &Cache, shard_id: &str) -> Vec<kinesim::models::dto::RecordDto> {
        let iterator = records::get_shard_iterator(
            cache,
            REGION,
            GetShardIteratorInput {
                stream_name: Some("orders".to_string()),
                shard_id: Some(shard_id.to_string()),
                shard_iterator_type: Some("TRIM_HORIZON".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .shard_iterator;
        records::get_records(
            cache,
            REGION,
            GetRecordsInput {
                shard_iterator: Some(iterator),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .records
    }

    let mut total_restored = 0;
    for shard in &before.stream_description.shards {
        let original = drain_shard(&cache, &shard.shard_id).await;
        let reloaded = drain_shard(&restored, &shard.shard_id).await;
        assert_eq!(original, reloaded, "shard {}", shard.shard_id);
        total_restored += reloaded.len();
    }
    assert_eq!(total_restored, 1);
}

#[tokio::test]
async fn pending_transitions_survive_a_restore() {
    let (cache, clock) = test_cache();
    create_active(&cache, &clock, "orders").await;

    // leave a DELETING stream with its removal still queued
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

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("engine.snapshot");
    snapshot::write_snapshot(&path, &cache.snapshot().await).unwrap();

    let restored_state = snapshot::load_snapshot(&path).unwrap().unwrap();
    let clock2 = Arc::new(ManualClock::new(clock.now()));
    let restored = Cache::with_snapshot(
        Arc::new(Config::default()),
        clock2.clone(),
        restored_state,
    );

    assert_eq!(
        streams::describe_stream_summary(
            &restored,
            REGION,
            DescribeStreamSummaryInput {
                stream_name: Some("orders".to_string()),
                stream_arn: None,
            },
        )
        .await
        .unwrap()
        .stream_description_summary
        .stream_status,
        "DELETING"
    );

    // the queued removal fires on the restored engine
    clock2.advance_millis(600);
    restored.scheduler().fire_due(&restored).await;
    assert!(streams::describe_stream_summary(
        &restored,
        REGION,
        DescribeStreamSummaryInput {
            stream_name: Some("orders".to_string()),
            stream_arn: None,
        },
    )
    .await
    .is_err());
}
