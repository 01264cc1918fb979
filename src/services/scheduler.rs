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
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::services::cache::Cache;
use crate::utils::clock::SharedClock;

/// A future state mutation modeling the service's eventual consistency.
/// Every action is idempotent: firing one whose precondition no longer
/// holds (stream deleted, status already advanced) is a no-op.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TransitionAction {
    /// CREATING or UPDATING -> ACTIVE.
    StreamToActive { stream_name: String },
    /// DELETING -> removed from the store.
    StreamRemoval { stream_name: String },
    ConsumerToActive {
        stream_name: String,
        consumer_name: String,
    },
    ConsumerRemoval {
        stream_name: String,
        consumer_name: String,
    },
    /// Purge records past the stream's retention window, then reschedule.
    RetentionSweep { stream_name: String },
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DelayedTransition {
    pub due_at: DateTime<Utc>,
    pub region: String,
    pub action: TransitionAction,
}

/// Time-ordered queue of delayed transitions plus the loop that realizes
/// them. Deleted streams need no cancellation here; stale entries fall out
/// through the idempotency checks when they fire.
pub struct Scheduler {
    queue: Mutex<BinaryHeap<Reverse<DelayedTransition>>>,
    notify: Notify,
    clock: SharedClock,
}

impl Scheduler {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            queue: Mutex::new(BinaryHeap::new()),
            notify: Notify::new(),
            clock,
        }
    }

    pub fn submit(&self, transition: DelayedTransition) {
        debug!(
            region = %transition.region,
            due_at = %transition.due_at,
            "scheduling delayed transition"
        );
        self.queue.lock().unwrap().push(Reverse(transition));
        self.notify.notify_one();
    }

    pub fn submit_all(&self, transitions: Vec<DelayedTransition>) {
        for transition in transitions {
            self.submit(transition);
        }
    }

    /// Pending entries, earliest first. Serialized into snapshots.
    pub fn pending(&self) -> Vec<DelayedTransition> {
        let queue = self.queue.lock().unwrap();
        let mut entries: Vec<DelayedTransition> =
            queue.iter().map(|Reverse(t)| t.clone()).collect();
        entries.sort();
        entries
    }

    fn next_due(&self) -> Option<DateTime<Utc>> {
        self.queue
            .lock()
            .unwrap()
            .peek()
            .map(|Reverse(t)| t.due_at)
    }

    fn pop_due(&self, now: DateTime<Utc>) -> Vec<DelayedTransition> {
        let mut queue = self.queue.lock().unwrap();
        let mut due = Vec::new();
        while let Some(Reverse(next)) = queue.peek() {
            if next.due_at > now {
                break;
            }
            due.push(queue.pop().unwrap().0);
        }
        due
    }

    /// Apply every entry that is due per the injected clock. Tests drive
    /// this directly; the run loop calls it on wake-up.
    pub async fn fire_due(&self, cache: &Cache) -> usize {
        let due = self.pop_due(self.clock.now());
        let fired = due.len();
        for transition in due {
            cache.apply_transition(transition).await;
        }
        fired
    }

    /// The scheduling loop: sleep until the earliest due entry (or until a
    /// submission arrives), then realize everything that is due.
    pub async fn run(self: Arc<Self>, cache: Arc<Cache>) {
        info!("scheduler loop started");
        loop {
            let wait = self.next_due().map(|due| {
                (due - self.clock.now())
                    .to_std()
                    .unwrap_or(std::time::Duration::ZERO)
            });

            match wait {
                Some(delay) if delay.is_zero() => {
                    self.fire_due(&cache).await;
                }
                Some(delay) => {
                    tokio::select! {
                        _ = self.notify.notified() => {}
                        _ = tokio::time::sleep(delay) => {
                            self.fire_due(&cache).await;
                        }
                    }
                }
                None => self.notify.notified().await,
            }
        }
    }
}
