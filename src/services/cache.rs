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


use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::errors::KinesisError;
use crate::models::consumer::ConsumerStatus;
use crate::models::stream::StreamStatus;
use crate::services::scheduler::{DelayedTransition, Scheduler, TransitionAction};
use crate::services::snapshot::CacheSnapshot;
use crate::services::store::{RegionState, RegionStore};
use crate::utils::clock::SharedClock;

/// Top-level coordinator: one store per region, created on first touch.
/// Operations against different regions proceed concurrently; within a
/// region the store's write lock serializes mutations.
pub struct Cache {
    stores: DashMap<String, Arc<RegionStore>>,
    scheduler: Arc<Scheduler>,
    clock: SharedClock,
    config: Arc<Config>,
}

impl Cache {
    pub fn new(config: Arc<Config>, clock: SharedClock) -> Arc<Self> {
        Arc::new(Self {
            stores: DashMap::new(),
            scheduler: Arc::new(Scheduler::new(clock.clone())),
            clock,
            config,
        })
    }

    /// Rebuild the coordinator from a restored snapshot, re-enqueueing the
    /// pending transitions it carried.
    pub fn with_snapshot(
        config: Arc<Config>,
        clock: SharedClock,
        snapshot: CacheSnapshot,
    ) -> Arc<Self> {
        let cache = Self::new(config, clock);
        for (region, state) in snapshot.regions {
            cache
                .stores
                .insert(region.clone(), Arc::new(RegionStore::from_state(&region, state)));
        }
        cache.scheduler.submit_all(snapshot.pending);
        cache
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn scheduler(&self) -> Arc<Scheduler> {
        self.scheduler.clone()
    }

    pub fn account_id(&self) -> &str {
        &self.config.aws.account_id
    }

    pub fn default_region(&self) -> &str {
        &self.config.aws.region
    }

    pub fn resolve_region(&self, requested: Option<&str>) -> String {
        requested
            .filter(|r| !r.is_empty())
            .unwrap_or(self.default_region())
            .to_string()
    }

    pub fn store(&self, region: &str) -> Arc<RegionStore> {
        self.stores
            .entry(region.to_string())
            .or_insert_with(|| Arc::new(RegionStore::new(region)))
            .clone()
    }

    pub fn regions(&self) -> Vec<String> {
        self.stores.iter().map(|e| e.key().clone()).collect()
    }

    pub async fn read<F, T>(&self, region: &str, f: F) -> T
    where
        F: FnOnce(&RegionState) -> T,
    {
        self.store(region).read(f).await
    }

    /// Commit a mutation against one region and forward any delayed
    /// transitions it produced to the scheduler.
    pub async fn mutate<F, T>(&self, region: &str, f: F) -> Result<T, KinesisError>
    where
        F: FnOnce(&mut RegionState) -> Result<(T, Vec<DelayedTransition>), KinesisError>,
    {
        let (value, transitions) = self.store(region).mutate(f).await?;
        self.scheduler.submit_all(transitions);
        Ok(value)
    }

    /// Realize one delayed transition. Every arm checks its precondition
    /// and quietly does nothing when state has moved on.
    pub async fn apply_transition(&self, transition: DelayedTransition) {
        let DelayedTransition { region, action, .. } = transition;
        let result: Result<(), KinesisError> = self
            .mutate(&region, |state| {
                let mut followups = Vec::new();
                match &action {
                    TransitionAction::StreamToActive { stream_name } => {
                        if let Some(stream) = state.streams.get_mut(stream_name) {
                            if matches!(
                                stream.status,
                                StreamStatus::Creating | StreamStatus::Updating
                            ) {
                                stream.status = StreamStatus::Active;
                                info!(stream = %stream_name, region = %region, "stream is now ACTIVE");
                            }
                        }
                    }
                    TransitionAction::StreamRemoval { stream_name } => {
                        let deleting = state
                            .streams
                            .get(stream_name)
                            .map(|s| s.status == StreamStatus::Deleting)
                            .unwrap_or(false);
                        if deleting {
                            state.streams.remove(stream_name);
                            info!(stream = %stream_name, region = %region, "stream removed");
                        }
                    }
                    TransitionAction::ConsumerToActive {
                        stream_name,
                        consumer_name,
                    } => {
                        if let Some(consumer) = state
                            .streams
                            .get_mut(stream_name)
                            .and_then(|s| s.consumers.get_mut(consumer_name))
                        {
                            if consumer.consumer_status == ConsumerStatus::Creating {
                                consumer.consumer_status = ConsumerStatus::Active;
                            }
                        }
                    }
                    TransitionAction::ConsumerRemoval {
                        stream_name,
                        consumer_name,
                    } => {
                        if let Some(stream) = state.streams.get_mut(stream_name) {
                            let deleting = stream
                                .consumers
                                .get(consumer_name)
                                .map(|c| c.consumer_status == ConsumerStatus::Deleting)
                                .unwrap_or(false);
                            if deleting {
                                stream.consumers.remove(consumer_name);
                            }
                        }
                    }
                    TransitionAction::RetentionSweep { stream_name } => {
                        let now = self.clock.now();
                        if let Some(stream) = state.streams.get_mut(stream_name) {
                            let purged = stream.purge_expired_records(now);
                            if purged > 0 {
                                info!(
                                    stream = %stream_name,
                                    region = %region,
                                    purged,
                                    "retention sweep purged records"
                                );
                            }
                            // streams keep sweeping until they disappear
                            followups.push(DelayedTransition {
                                due_at: now
                                    + chrono::Duration::from_std(
                                        self.config.streams.retention_sweep_interval(),
                                    )
                                    .unwrap_or_else(|_| chrono::Duration::seconds(30)),
                                region: region.clone(),
                                action: TransitionAction::RetentionSweep {
                                    stream_name: stream_name.clone(),
                                },
                            });
                        }
                    }
                }
                Ok(((), followups))
            })
            .await;

        if let Err(e) = result {
            warn!(region = %region, "delayed transition failed: {}", e);
        }
    }

    /// A consistent per-region snapshot of everything, plus the pending
    /// scheduler queue. Regions are captured one at a time, so different
    /// regions may be from slightly different instants.
    pub async fn snapshot(&self) -> CacheSnapshot {
        let mut regions = BTreeMap::new();
        let stores: Vec<Arc<RegionStore>> = self.stores.iter().map(|e| e.value().clone()).collect();
        for store in stores {
            regions.insert(store.region().to_string(), store.snapshot_state().await);
        }
        CacheSnapshot {
            regions,
            pending: self.scheduler.pending(),
        }
    }
}
