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
    require_active, require_not_deleting, resolve_stream_name, validate_stream_name, FieldErrors,
};
use crate::errors::KinesisError;
use crate::models::dto::{
    CreateStreamInput, DeleteStreamInput, DescribeLimitsInput, DescribeLimitsOutput,
    DescribeStreamInput, DescribeStreamOutput, DescribeStreamSummaryInput,
    DescribeStreamSummaryOutput, EmptyOutput, EnhancedMetricsDto, ListStreamsInput,
    ListStreamsOutput, ShardDto, StreamDescriptionDto, StreamDescriptionSummaryDto,
    StreamModeDetails, StreamSummaryDto, UpdateStreamModeInput,
};
use crate::models::iterator::NextTokenPayload;
use crate::models::stream::{
    StreamMode, StreamModel, StreamStatus, MAX_SHARDS_PER_CREATE, ON_DEMAND_DEFAULT_SHARD_COUNT,
};
use crate::services::cache::Cache;
use crate::services::scheduler::{DelayedTransition, TransitionAction};

const LIST_STREAMS_SCOPE: &str = "ListStreams";
const DEFAULT_LIST_LIMIT: usize = 100;
const MAX_DESCRIBE_SHARDS: usize = 10000;

fn mode_details(stream: &StreamModel) -> StreamModeDetails {
    StreamModeDetails {
        stream_mode: stream.mode.as_str().to_string(),
    }
}

fn enhanced_monitoring(stream: &StreamModel) -> Vec<EnhancedMetricsDto> {
    vec![EnhancedMetricsDto {
        shard_level_metrics: stream.enhanced_monitoring.iter().cloned().collect(),
    }]
}

fn stream_summary(stream: &StreamModel) -> StreamSummaryDto {
    StreamSummaryDto {
        stream_name: stream.stream_name.clone(),
        stream_arn: stream.stream_arn.clone(),
        stream_status: stream.status.as_str().to_string(),
        stream_mode_details: mode_details(stream),
        stream_creation_timestamp: stream.creation_timestamp,
    }
}

pub async fn create_stream(
    cache: &Cache,
    region: &str,
    input: CreateStreamInput,
) -> Result<EmptyOutput, KinesisError> {
    let mut errors = FieldErrors::new();

    let name = match input.stream_name.as_deref() {
        Some(name) => {
            validate_stream_name(name, &mut errors);
            name.to_string()
        }
        None => {
            errors.push("StreamName is required");
            String::new()
        }
    };

    let mode = match input.stream_mode_details.as_ref() {
        Some(details) => match StreamMode::parse(&details.stream_mode) {
            Ok(mode) => mode,
            Err(e) => {
                errors.push(e.message());
                StreamMode::Provisioned
            }
        },
        None => StreamMode::Provisioned,
    };

    let shard_count = match (mode, input.shard_count) {
        (StreamMode::OnDemand, None) => ON_DEMAND_DEFAULT_SHARD_COUNT,
        (StreamMode::OnDemand, Some(_)) => {
            errors.push("ShardCount must not be set when StreamMode is ON_DEMAND");
            ON_DEMAND_DEFAULT_SHARD_COUNT
        }
        (StreamMode::Provisioned, Some(count)) if (1..=MAX_SHARDS_PER_CREATE).contains(&count) => {
            count as u32
        }
        (StreamMode::Provisioned, Some(count)) => {
            errors.push(format!(
                "ShardCount {} must be between 1 and {}",
                count, MAX_SHARDS_PER_CREATE
            ));
            1
        }
        (StreamMode::Provisioned, None) => {
            errors.push("ShardCount is required when StreamMode is PROVISIONED");
            1
        }
    };

    errors.into_result()?;

    let account_id = cache.account_id().to_string();
    let cfg = cache.config().streams.clone();
    let now = cache.now();
    let region_owned = region.to_string();

    cache
        .mutate(region, move |state| {
            if state.streams.contains_key(&name) {
                return Err(KinesisError::ResourceInUse(format!(
                    "Stream {} already exists",
                    name
                )));
            }
            if mode == StreamMode::OnDemand
                && state.on_demand_stream_count() >= cfg.on_demand_stream_count_limit
            {
                return Err(KinesisError::LimitExceeded(format!(
                    "This account already has {} on-demand streams; the limit is {}",
                    state.on_demand_stream_count(),
                    cfg.on_demand_stream_count_limit
                )));
            }
            if state.open_shard_total() + shard_count as usize > cfg.shard_limit {
                return Err(KinesisError::LimitExceeded(format!(
                    "Creating {} shards would exceed the account limit of {} open shards",
                    shard_count, cfg.shard_limit
                )));
            }

            let stream = StreamModel::new(&name, &region_owned, &account_id, shard_count, mode, now);
            info!(stream = %name, region = %region_owned, shard_count, "creating stream");
            state.streams.insert(name.clone(), stream);

            let transitions = vec![
                DelayedTransition {
                    due_at: now + as_chrono(cfg.create_stream_duration()),
                    region: region_owned.clone(),
                    action: TransitionAction::StreamToActive {
                        stream_name: name.clone(),
                    },
                },
                DelayedTransition {
                    due_at: now + as_chrono(cfg.retention_sweep_interval()),
                    region: region_owned,
                    action: TransitionAction::RetentionSweep { stream_name: name },
                },
            ];
            Ok((EmptyOutput {}, transitions))
        })
        .await
}

pub async fn delete_stream(
    cache: &Cache,
    region: &str,
    input: DeleteStreamInput,
) -> Result<EmptyOutput, KinesisError> {
    let name = resolve_stream_name(&input.stream_name, &input.stream_arn)?;
    let enforce = input.enforce_consumer_deletion.unwrap_or(false);
    let cfg = cache.config().streams.clone();
    let now = cache.now();
    let region_owned = region.to_string();

    cache
        .mutate(region, move |state| {
            let stream = state.stream_mut(&name)?;

            // a second DeleteStream on a DELETING stream is a no-op
            if stream.status == StreamStatus::Deleting {
                return Ok((EmptyOutput {}, vec![]));
            }
            if stream.status == StreamStatus::Creating {
                return Err(KinesisError::ResourceInUse(format!(
                    "Stream {} is in status CREATING; it must be ACTIVE",
                    name
                )));
            }
            if !stream.consumers.is_empty() && !enforce {
                return Err(KinesisError::ResourceInUse(format!(
                    "Stream {} has registered consumers; set EnforceConsumerDeletion",
                    name
                )));
            }

            stream.status = StreamStatus::Deleting;
            info!(stream = %name, region = %region_owned, "deleting stream");

            let transitions = vec![DelayedTransition {
                due_at: now + as_chrono(cfg.delete_stream_duration()),
                region: region_owned,
                action: TransitionAction::StreamRemoval { stream_name: name },
            }];
            Ok((EmptyOutput {}, transitions))
        })
        .await
}

pub async fn describe_stream(
    cache: &Cache,
    region: &str,
    input: DescribeStreamInput,
) -> Result<DescribeStreamOutput, KinesisError> {
    let name = resolve_stream_name(&input.stream_name, &input.stream_arn)?;
    let limit = match input.limit {
        None => DEFAULT_LIST_LIMIT,
        Some(limit) if (1..=MAX_DESCRIBE_SHARDS as i32).contains(&limit) => limit as usize,
        Some(limit) => {
            return Err(KinesisError::Validation(format!(
                "1 validation error(s) detected: Limit {} must be between 1 and {}",
                limit, MAX_DESCRIBE_SHARDS
            )))
        }
    };
    let exclusive_start = input.exclusive_start_shard_id;

    cache
        .read(region, move |state| {
            let stream = state.stream(&name)?;
            require_not_deleting(stream)?;

            let eligible: Vec<&_> = stream
                .shards
                .iter()
                .filter(|s| match &exclusive_start {
                    Some(start) => s.shard_id.as_str() > start.as_str(),
                    None => true,
                })
                .collect();
            let has_more_shards = eligible.len() > limit;
            let shards: Vec<ShardDto> =
                eligible.into_iter().take(limit).map(ShardDto::from).collect();

            Ok(DescribeStreamOutput {
                stream_description: StreamDescriptionDto {
                    stream_name: stream.stream_name.clone(),
                    stream_arn: stream.stream_arn.clone(),
                    stream_status: stream.status.as_str().to_string(),
                    stream_mode_details: mode_details(stream),
                    shards,
                    has_more_shards,
                    retention_period_hours: stream.retention_period_hours,
                    stream_creation_timestamp: stream.creation_timestamp,
                    enhanced_monitoring: enhanced_monitoring(stream),
                    encryption_type: stream.encryption_type.as_str().to_string(),
                    key_id: stream.key_id.clone(),
                },
            })
        })
        .await
}

pub async fn describe_stream_summary(
    cache: &Cache,
    region: &str,
    input: DescribeStreamSummaryInput,
) -> Result<DescribeStreamSummaryOutput, KinesisError> {
    let name = resolve_stream_name(&input.stream_name, &input.stream_arn)?;

    cache
        .read(region, move |state| {
            // summaries stay readable in every status, DELETING included
            let stream = state.stream(&name)?;
            Ok(DescribeStreamSummaryOutput {
                stream_description_summary: StreamDescriptionSummaryDto {
                    stream_name: stream.stream_name.clone(),
                    stream_arn: stream.stream_arn.clone(),
                    stream_status: stream.status.as_str().to_string(),
                    stream_mode_details: mode_details(stream),
                    retention_period_hours: stream.retention_period_hours,
                    stream_creation_timestamp: stream.creation_timestamp,
                    enhanced_monitoring: enhanced_monitoring(stream),
                    encryption_type: stream.encryption_type.as_str().to_string(),
                    key_id: stream.key_id.clone(),
                    open_shard_count: stream.open_shard_count() as i32,
                    consumer_count: stream.consumers.len() as i32,
                },
            })
        })
        .await
}

pub async fn list_streams(
    cache: &Cache,
    region: &str,
    input: ListStreamsInput,
) -> Result<ListStreamsOutput, KinesisError> {
    let mut errors = FieldErrors::new();
    if input.next_token.is_some() && input.exclusive_start_stream_name.is_some() {
        errors.push("NextToken and ExclusiveStartStreamName cannot both be set");
    }
    let limit = match input.limit {
        None => DEFAULT_LIST_LIMIT,
        Some(limit) if (1..=10000).contains(&limit) => limit as usize,
        Some(limit) => {
            errors.push(format!("Limit {} must be between 1 and 10000", limit));
            DEFAULT_LIST_LIMIT
        }
    };
    errors.into_result()?;

    let now = cache.now();
    let ttl = cache.config().streams.iterator_ttl();
    let exclusive_start = match &input.next_token {
        Some(token) => Some(
            NextTokenPayload::unseal(token, LIST_STREAMS_SCOPE, now, ttl)?.exclusive_start,
        ),
        None => input.exclusive_start_stream_name.clone(),
    };

    cache
        .read(region, move |state| {
            let eligible: Vec<&StreamModel> = state
                .streams
                .values()
                .filter(|s| match &exclusive_start {
                    Some(start) => s.stream_name.as_str() > start.as_str(),
                    None => true,
                })
                .collect();
            let has_more_streams = eligible.len() > limit;
            let page: Vec<&StreamModel> = eligible.into_iter().take(limit).collect();

            let next_token = match (has_more_streams, page.last()) {
                (true, Some(last)) => Some(
                    NextTokenPayload::new(LIST_STREAMS_SCOPE, None, &last.stream_name, now)
                        .seal()?,
                ),
                _ => None,
            };

            Ok(ListStreamsOutput {
                stream_names: page.iter().map(|s| s.stream_name.clone()).collect(),
                has_more_streams,
                next_token,
                stream_summaries: page.iter().map(|s| stream_summary(s)).collect(),
            })
        })
        .await
}

pub async fn update_stream_mode(
    cache: &Cache,
    region: &str,
    input: UpdateStreamModeInput,
) -> Result<EmptyOutput, KinesisError> {
    let mut errors = FieldErrors::new();
    let name = match &input.stream_arn {
        Some(arn) => match crate::controllers::validation::stream_name_from_arn(arn) {
            Ok(name) => name,
            Err(e) => {
                errors.push(e.message());
                String::new()
            }
        },
        None => {
            errors.push("StreamARN is required");
            String::new()
        }
    };
    let target_mode = match input.stream_mode_details.as_ref() {
        Some(details) => match StreamMode::parse(&details.stream_mode) {
            Ok(mode) => mode,
            Err(e) => {
                errors.push(e.message());
                StreamMode::Provisioned
            }
        },
        None => {
            errors.push("StreamModeDetails is required");
            StreamMode::Provisioned
        }
    };
    errors.into_result()?;

    let cfg = cache.config().streams.clone();
    let now = cache.now();
    let region_owned = region.to_string();

    cache
        .mutate(region, move |state| {
            let on_demand_count = state.on_demand_stream_count();
            let stream = state.stream_mut(&name)?;
            require_active(stream)?;

            if stream.mode == target_mode {
                return Err(KinesisError::InvalidArgument(format!(
                    "Stream {} is already in mode {}",
                    name,
                    target_mode.as_str()
                )));
            }
            if target_mode == StreamMode::OnDemand
                && on_demand_count >= cfg.on_demand_stream_count_limit
            {
                return Err(KinesisError::LimitExceeded(format!(
                    "This account already has {} on-demand streams; the limit is {}",
                    on_demand_count, cfg.on_demand_stream_count_limit
                )));
            }

            stream.mode = target_mode;
            stream.status = StreamStatus::Updating;
            info!(stream = %name, region = %region_owned, mode = target_mode.as_str(), "updating stream mode");

            let transitions = vec![DelayedTransition {
                due_at: now + as_chrono(cfg.update_stream_duration()),
                region: region_owned,
                action: TransitionAction::StreamToActive { stream_name: name },
            }];
            Ok((EmptyOutput {}, transitions))
        })
        .await
}

pub async fn describe_limits(
    cache: &Cache,
    region: &str,
    _input: DescribeLimitsInput,
) -> Result<DescribeLimitsOutput, KinesisError> {
    let cfg = cache.config().streams.clone();
    cache
        .read(region, move |state| {
            Ok(DescribeLimitsOutput {
                shard_limit: cfg.shard_limit as i32,
                open_shard_count: state.open_shard_total() as i32,
                on_demand_stream_count: state.on_demand_stream_count() as i32,
                on_demand_stream_count_limit: cfg.on_demand_stream_count_limit as i32,
            })
        })
        .await
}
