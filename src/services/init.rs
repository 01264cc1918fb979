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


use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::controllers::streams;
use crate::errors::KinesisError;
use crate::models::dto::{CreateStreamInput, DescribeStreamSummaryInput, StreamModeDetails};
use crate::services::cache::Cache;
use crate::utils::retry::{retry_fixed, RetryConfig};

/// Concurrent creations per region during boot.
const MAX_CONCURRENT_CREATES: usize = 5;
const CREATE_POLL_ATTEMPTS: u32 = 3;

/// Create the configured streams on boot. Regions run in parallel; within a
/// region a semaphore bounds concurrency, and each creation is followed by a
/// bounded poll of DescribeStreamSummary until the stream leaves CREATING.
pub async fn initialize_streams(cache: &Arc<Cache>, config: &Config) {
    let mut region_tasks = Vec::new();

    for (region, stream_configs) in config.initialize_streams.clone() {
        let cache = cache.clone();
        let poll = RetryConfig {
            max_attempts: CREATE_POLL_ATTEMPTS,
            delay: config.streams.create_stream_duration(),
        };

        region_tasks.push(tokio::spawn(async move {
            let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_CREATES));
            let mut tasks = Vec::new();

            for stream_config in stream_configs {
                let cache = cache.clone();
                let region = region.clone();
                let semaphore = semaphore.clone();
                let poll = poll.clone();

                tasks.push(tokio::spawn(async move {
                    let Ok(_permit) = semaphore.acquire().await else {
                        return;
                    };

                    let name = stream_config.stream_name.clone();
                    let input = CreateStreamInput {
                        stream_name: Some(name.clone()),
                        shard_count: stream_config.shard_count,
                        stream_mode_details: stream_config
                            .stream_mode
                            .map(|mode| StreamModeDetails { stream_mode: mode }),
                    };

                    match streams::create_stream(&cache, &region, input).await {
                        Ok(_) => info!(stream = %name, region = %region, "pre-initialized stream"),
                        Err(KinesisError::ResourceInUse(_)) => {
                            debug!(stream = %name, region = %region, "stream already exists")
                        }
                        Err(e) => {
                            warn!(stream = %name, region = %region, "pre-init create failed: {}", e);
                            return;
                        }
                    }

                    let wait = retry_fixed(&poll, || {
                        let cache = cache.clone();
                        let region = region.clone();
                        let name = name.clone();
                        async move {
                            let summary = streams::describe_stream_summary(
                                &cache,
                                &region,
                                DescribeStreamSummaryInput {
                                    stream_name: Some(name),
                                    stream_arn: None,
                                },
                            )
                            .await
                            .map_err(|e| e.message())?;
                            if summary.stream_description_summary.stream_status == "CREATING" {
                                Err("still CREATING".to_string())
                            } else {
                                Ok(())
                            }
                        }
                    })
                    .await;

                    if wait.is_err() {
                        warn!(stream = %name, region = %region, "stream did not leave CREATING during pre-init");
                    }
                }));
            }

            futures::future::join_all(tasks).await;
        }));
    }

    futures::future::join_all(region_tasks).await;
}
