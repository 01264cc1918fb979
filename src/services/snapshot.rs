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


use anyhow::Context;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, error, info};

use crate::config::PersistConfig;
use crate::services::cache::Cache;
use crate::services::scheduler::DelayedTransition;
use crate::services::store::RegionState;

/// The whole engine at one point in time: every region's streams plus the
/// pending scheduler queue. Gzip-framed CBOR on disk; the layout is stable
/// within a release.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub regions: BTreeMap<String, RegionState>,
    pub pending: Vec<DelayedTransition>,
}

/// Write the snapshot with an atomic replace: serialize to a temp file in
/// the target directory, then rename over the destination.
pub fn write_snapshot(path: &Path, snapshot: &CacheSnapshot) -> anyhow::Result<()> {
    let bytes = serde_cbor::to_vec(snapshot).context("serializing snapshot")?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&bytes)?;
    let compressed = encoder.finish()?;

    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    let mut tmp = match dir {
        Some(dir) => NamedTempFile::new_in(dir)?,
        None => NamedTempFile::new_in(".")?,
    };
    tmp.write_all(&compressed)?;
    tmp.flush()?;
    tmp.persist(path)
        .with_context(|| format!("replacing snapshot at {}", path.display()))?;
    Ok(())
}

pub fn load_snapshot(path: &Path) -> anyhow::Result<Option<CacheSnapshot>> {
    if !path.exists() {
        return Ok(None);
    }
    let compressed = std::fs::read(path)
        .with_context(|| format!("reading snapshot at {}", path.display()))?;
    let mut decoder = GzDecoder::new(compressed.as_slice());
    let mut bytes = Vec::new();
    decoder.read_to_end(&mut bytes)?;
    let snapshot = serde_cbor::from_slice(&bytes).context("deserializing snapshot")?;
    Ok(Some(snapshot))
}

/// Capture and persist the current engine state once.
pub async fn persist_now(cache: &Cache, persist: &PersistConfig) -> anyhow::Result<()> {
    let snapshot = cache.snapshot().await;
    write_snapshot(Path::new(&persist.path), &snapshot)
}

/// Supervised background task: snapshot the engine every interval.
pub async fn persistence_loop(cache: Arc<Cache>, persist: PersistConfig) {
    info!(
        path = %persist.path,
        interval_ms = persist.interval_ms,
        "persistence loop started"
    );
    let mut interval = tokio::time::interval(persist.interval());
    // the immediate first tick would snapshot boot state; skip it
    interval.tick().await;
    loop {
        interval.tick().await;
        match persist_now(&cache, &persist).await {
            Ok(()) => debug!(path = %persist.path, "snapshot written"),
            Err(e) => error!("periodic snapshot failed: {:#}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::stream::{StreamMode, StreamModel};
    use chrono::DateTime;

    #[test]
    fn snapshot_file_round_trips() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let mut state = RegionState::default();
        let mut stream = StreamModel::new(
            "orders",
            "us-east-1",
            "000000000000",
            2,
            StreamMode::Provisioned,
            now,
        );
        stream.tags.insert("team".into(), "data".into());
        state.streams.insert("orders".into(), stream);

        let mut regions = BTreeMap::new();
        regions.insert("us-east-1".to_string(), state);
        let snapshot = CacheSnapshot {
            regions,
            pending: Vec::new(),
        };

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.snapshot");
        write_snapshot(&path, &snapshot).unwrap();
        let restored = load_snapshot(&path).unwrap().unwrap();

        let original = &snapshot.regions["us-east-1"].streams["orders"];
        let loaded = &restored.regions["us-east-1"].streams["orders"];
        assert_eq!(original.stream_arn, loaded.stream_arn);
        assert_eq!(original.tags, loaded.tags);
        assert_eq!(original.shards.len(), loaded.shards.len());
        assert_eq!(
            original.shards[0].hash_key_range,
            loaded.shards[0].hash_key_range
        );
    }

    #[test]
    fn missing_file_loads_as_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.snapshot");
        assert!(load_snapshot(&path).unwrap().is_none());
    }
}
