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


use tracing::info;

use crate::controllers::as_chrono;
use crate::controllers::validation::{
    parse_hash_key, require_active, require_not_deleting, resolve_stream_name, FieldErrors,
};
use crate::errors::KinesisError;
use crate::models::dto::{
    EmptyOutput, ListShardsInput, ListShardsOutput, MergeShardsInput, ShardDto, SplitShardInput,
    UpdateShardCountInput, UpdateShardCountOutput,
};
use crate::models::iterator::NextTokenPayload;
use crate::models::shard::Shard;
use crate::models::stream::{StreamMode, StreamStatus, MAX_SHARDS_PER_CREATE};
use crate::services::cache::Cache;
use crate::services::scheduler::{DelayedTransition, TransitionAction};

const LIST_SHARDS_SCOPE: &str = "ListShards";
const DEFAULT_LIST_SHARDS_LIMIT: usize = 1000;

/// Per-stream soft limit on open shards; on-demand streams get ten times
/// the provisioned budget.
fn effective_stream_shard_limit(mode: StreamMode, account_limit: usize) -> usize {
    match mode {
        StreamMode::Provisioned => account_limit,
        StreamMode::OnDemand => account_limit * 10,
    }
}

fn shard_passes_filter(shard: &Shard, filter_type: Option<&str>) -> Result<bool, KinesisError> {
    match filter_type {
        None | Some("AT_TRIM_HORIZON") | Some("FROM_TRIM_HORIZON") => Ok(true),
        Some("AT_LATEST") => Ok(shard.is_open()),
        Some(other) => Err(KinesisError::Validation(format!(
            "1 validation error(s) detected: ShardFilter type {} is not supported",
            other
        ))),
    }
}

pub async fn list_shards(
    cache: &Cache,
    region: &str,
    input: ListShardsInput,
) -> Result<ListShardsOutput, KinesisError> {
    let mut errors = FieldErrors::new();
    if input.next_token.is_some()
        && (input.stream_name.is_some()
            || input.stream_arn.is_some()
            || input.exclusive_start_shard_id.is_some()
            || input.stream_creation_timestamp.is_some())
    {
        errors.push("NextToken cannot be combined with other selection parameters");
    }
    let max_results = match input.max_results {
        None => DEFAULT_LIST_SHARDS_LIMIT,
        Some(max) if (1..=10000).contains(&max) => max as usize,
        Some(max) => {
            errors.push(format!("MaxResults {} must be between 1 and 10000", max));
            DEFAULT_LIST_SHARDS_LIMIT
        }
    };
    errors.into_result()?;

    let now = cache.now();
    let ttl = cache.config().streams.iterator_ttl();
    let (name, exclusive_start) = match &input.next_token {
        Some(token) => {
            let payload = NextTokenPayload::unseal(token, LIST_SHARDS_SCOPE, now, ttl)?;
            let name = payload.stream_name.clone().ok_or_else(|| {
                KinesisError::InvalidArgument("Invalid NextToken".to_string())
            })?;
            (name, Some(payload.exclusive_start))
        }
        None => (
            resolve_stream_name(&input.stream_name, &input.stream_arn)?,
            input.exclusive_start_shard_id.clone(),
        ),
    };
    let filter_type = input
        .shard_filter
        .as_ref()
        .and_then(|f| f.filter_type.clone());

    cache
        .read(region, move |state| {
            let stream = state.stream(&name)?;
            require_not_deleting(stream)?;

            let mut eligible = Vec::new();
            for shard in &stream.shards {
                if let Some(start) = &exclusive_start {
                    if shard.shard_id.as_str() <= start.as_str() {
                        continue;
                    }
                }
                if shard_passes_filter(shard, filter_type.as_deref())? {
                    eligible.push(shard);
                }
            }

            let has_more = eligible.len() > max_results;
            let page: Vec<&Shard> = eligible.into_iter().take(max_results).collect();
            let next_token = match (has_more, page.last()) {
                (true, Some(last)) => Some(
                    NextTokenPayload::new(LIST_SHARDS_SCOPE, Some(&name), &last.shard_id, now)
                        .seal()?,
                ),
                _ => None,
            };

            Ok(ListShardsOutput {
                shards: page.into_iter().map(ShardDto::from).collect(),
                next_token,
            })
        })
        .await
}

pub async fn split_shard(
    cache: &Cache,
    region: &str,
    input: SplitShardInput,
) -> Result<EmptyOutput, KinesisError> {
    let mut errors = FieldErrors::new();
    let name = match resolve_stream_name(&input.stream_name, &input.stream_arn) {
        Ok(name) => name,
        Err(e) => {
            errors.push(e.message());
            String::new()
        }
    };
    let shard_to_split = match input.shard_to_split.clone() {
        Some(id) => id,
        None => {
            errors.push("ShardToSplit is required");
            String::new()
        }
    };
    let new_starting_hash_key = match input.new_starting_hash_key.as_deref() {
        Some(value) => parse_hash_key(value, "NewStartingHashKey", &mut errors),
        None => {
            errors.push("NewStartingHashKey is required");
            None
        }
    };
    errors.into_result()?;
    let Some(new_starting_hash_key) = new_starting_hash_key else {
        return Err(KinesisError::InternalFailure(
            "NewStartingHashKey missing after validation".to_string(),
        ));
    };

    let cfg = cache.config().streams.clone();
    let now = cache.now();
    let region_owned = region.to_string();

    cache
        .mutate(region, move |state| {
            let open_total = state.open_shard_total();
            let stream = state.stream_mut(&name)?;
            require_active(stream)?;

            let shard = stream.shard(&shard_to_split).ok_or_else(|| {
                KinesisError::ResourceNotFound(format!(
                    "Could not find shard {} in stream {}",
                    shard_to_split, name
                ))
            })?;
            if !shard.is_open() {
                return Err(KinesisError::InvalidArgument(format!(
                    "Shard {} is closed and cannot be split",
                    shard_to_split
                )));
            }

            let stream_limit = effective_stream_shard_limit(stream.mode, cfg.shard_limit);
            if stream.open_shard_count() + 1 > stream_limit {
                return Err(KinesisError::LimitExceeded(format!(
                    "Splitting would exceed the stream limit of {} open shards",
                    stream_limit
                )));
            }
            if open_total + 1 > cfg.shard_limit {
                return Err(KinesisError::LimitExceeded(format!(
                    "Splitting would exceed the account limit of {} open shards",
                    cfg.shard_limit
                )));
            }

            stream.apply_split(&shard_to_split, new_starting_hash_key, now)?;
            stream.status = StreamStatus::Updating;
            info!(stream = %name, region = %region_owned, shard = %shard_to_split, "split shard");

            let transitions = vec![DelayedTransition {
                due_at: now + as_chrono(cfg.update_stream_duration()),
                region: region_owned,
                action: TransitionAction::StreamToActive { stream_name: name },
            }];
            Ok((EmptyOutput {}, transitions))
        })
        .await
}

pub async fn merge_shards(
    cache: &Cache,
    region: &str,
    input: MergeShardsInput,
) -> Result<EmptyOutput, KinesisError> {
    let mut errors = FieldErrors::new();
    let name = match resolve_stream_name(&input.stream_name, &input.stream_arn) {
        Ok(name) => name,
        Err(e) => {
            errors.push(e.message());
            String::new()
        }
    };
    let shard_to_merge = match input.shard_to_merge.clone() {
        Some(id) => id,
        None => {
            errors.push("ShardToMerge is required");
            String::new()
        }
    };
    let adjacent = match input.adjacent_shard_to_merge.clone() {
        Some(id) => id,
        None => {
            errors.push("AdjacentShardToMerge is required");
            String::new()
        }
    };
    if !shard_to_merge.is_empty() && shard_to_merge == adjacent {
        errors.push("ShardToMerge and AdjacentShardToMerge must differ");
    }
    errors.into_result()?;

    let cfg = cache.config().streams.clone();
    let now = cache.now();
    let region_owned = region.to_string();

    cache
        .mutate(region, move |state| {
            let stream = state.stream_mut(&name)?;
            require_active(stream)?;

            let mut ranges = Vec::with_capacity(2);
            for shard_id in [&shard_to_merge, &adjacent] {
                let shard = stream.shard(shard_id).ok_or_else(|| {
                    KinesisError::ResourceNotFound(format!(
                        "Could not find shard {} in stream {}",
                        shard_id, name
                    ))
                })?;
                if !shard.is_open() {
                    return Err(KinesisError::InvalidArgument(format!(
                        "Shard {} is closed and cannot be merged",
                        shard_id
                    )));
                }
                ranges.push(shard.hash_key_range);
            }
            let (first, second) = (ranges[0], ranges[1]);
            if !first.is_adjacent_to(&second) {
                return Err(KinesisError::InvalidArgument(format!(
                    "Shards {} and {} have non-adjacent hash key ranges",
                    shard_to_merge, adjacent
                )));
            }

            stream.apply_merge(&shard_to_merge, &adjacent, now)?;
            stream.status = StreamStatus::Updating;
            info!(
                stream = %name,
                region = %region_owned,
                shard = %shard_to_merge,
                adjacent = %adjacent,
                "merged shards"
            );

            let transitions = vec![DelayedTransition {
                due_at: now + as_chrono(cfg.update_stream_duration()),
                region: region_owned,
                action: TransitionAction::StreamToActive { stream_name: name },
            }];
            Ok((EmptyOutput {}, transitions))
        })
        .await
}

pub async fn update_shard_count(
    cache: &Cache,
    region: &str,
    input: UpdateShardCountInput,
) -> Result<UpdateShardCountOutput, KinesisError> {
    let mut errors = FieldErrors::new();
    let name = match resolve_stream_name(&input.stream_name, &input.stream_arn) {
        Ok(name) => name,
        Err(e) => {
            errors.push(e.message());
            String::new()
        }
    };
    match input.scaling_type.as_deref() {
        Some("UNIFORM_SCALING") => {}
        Some(other) => errors.push(format!(
            "ScalingType {} is not one of UNIFORM_SCALING",
            other
        )),
        None => errors.push("ScalingType is required"),
    }
    let target = match input.target_shard_count {
        Some(target) if (1..=MAX_SHARDS_PER_CREATE).contains(&target) => target as u32,
        Some(target) => {
            errors.push(format!(
                "TargetShardCount {} must be between 1 and {}",
                target, MAX_SHARDS_PER_CREATE
            ));
            1
        }
        None => {
            errors.push("TargetShardCount is required");
            1
        }
    };
    errors.into_result()?;

    let cfg = cache.config().streams.clone();
    let now = cache.now();
    let region_owned = region.to_string();

    cache
        .mutate(region, move |state| {
            let open_total = state.open_shard_total();
            let stream = state.stream_mut(&name)?;
            require_active(stream)?;

            if stream.mode != StreamMode::Provisioned {
                return Err(KinesisError::Validation(format!(
                    "1 validation error(s) detected: UpdateShardCount requires StreamMode PROVISIONED, stream {} is {}",
                    name,
                    stream.mode.as_str()
                )));
            }

            let current = stream.open_shard_count() as u32;
            let lower = std::cmp::max(1, (current + 1) / 2);
            let upper = current * 2;
            if target < lower || target > upper {
                return Err(KinesisError::InvalidArgument(format!(
                    "TargetShardCount {} must be between {} and {} for a stream with {} shards",
                    target, lower, upper, current
                )));
            }
            if open_total - current as usize + target as usize > cfg.shard_limit {
                return Err(KinesisError::LimitExceeded(format!(
                    "Scaling to {} shards would exceed the account limit of {} open shards",
                    target, cfg.shard_limit
                )));
            }

            stream.rebalance(target, now);
            stream.status = StreamStatus::Updating;
            info!(stream = %name, region = %region_owned, current, target, "updating shard count");

            let transitions = vec![DelayedTransition {
                due_at: now + as_chrono(cfg.update_stream_duration()),
                region: region_owned,
                action: TransitionAction::StreamToActive {
                    stream_name: name.clone(),
                },
            }];
            Ok((
                UpdateShardCountOutput {
                    stream_name: name.clone(),
                    stream_arn: stream.stream_arn.clone(),
                    current_shard_count: current as i32,
                    target_shard_count: target as i32,
                },
                transitions,
            ))
        })
        .await
}
