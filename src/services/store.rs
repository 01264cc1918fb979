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


use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::errors::KinesisError;
use crate::models::stream::{StreamMode, StreamModel};
use crate::services::scheduler::DelayedTransition;

/// All streams of one region. This is the unit of consistency: everything a
/// handler observes or changes lives in one of these.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegionState {
    pub streams: BTreeMap<String, StreamModel>,
}

impl RegionState {
    pub fn stream(&self, stream_name: &str) -> Result<&StreamModel, KinesisError> {
        self.streams.get(stream_name).ok_or_else(|| {
            KinesisError::ResourceNotFound(format!("Stream {} not found", stream_name))
        })
    }

    pub fn stream_mut(&mut self, stream_name: &str) -> Result<&mut StreamModel, KinesisError> {
        self.streams.get_mut(stream_name).ok_or_else(|| {
            KinesisError::ResourceNotFound(format!("Stream {} not found", stream_name))
        })
    }

    /// Open shards across every stream in the region; the account limit is
    /// checked against this.
    pub fn open_shard_total(&self) -> usize {
        self.streams.values().map(|s| s.open_shard_count()).sum()
    }

    pub fn on_demand_stream_count(&self) -> usize {
        self.streams
            .values()
            .filter(|s| s.mode == StreamMode::OnDemand)
            .count()
    }
}

/// Per-region store. Mutations within a region are totally ordered by the
/// write lock; reads see the last committed state.
pub struct RegionStore {
    region: String,
    state: RwLock<RegionState>,
}

impl RegionStore {
    pub fn new(region: &str) -> Self {
        Self::from_state(region, RegionState::default())
    }

    pub fn from_state(region: &str, state: RegionState) -> Self {
        Self {
            region: region.to_string(),
            state: RwLock::new(state),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Run a read-only operation under a read view of the region.
    pub async fn read<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&RegionState) -> T,
    {
        let state = self.state.read().await;
        f(&state)
    }

    /// Run a mutation under the region's write lock. Mutation closures
    /// validate before touching state, so an Err leaves the region
    /// unchanged; on commit any returned transitions are handed to the
    /// scheduler by the caller.
    pub async fn mutate<F, T>(&self, f: F) -> Result<(T, Vec<DelayedTransition>), KinesisError>
    where
        F: FnOnce(&mut RegionState) -> Result<(T, Vec<DelayedTransition>), KinesisError>,
    {
        let mut state = self.state.write().await;
        f(&mut state)
    }

    pub async fn snapshot_state(&self) -> RegionState {
        self.state.read().await.clone()
    }
}
