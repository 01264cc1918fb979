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
    consumer_ref_from_arn, require_active, require_not_deleting, stream_name_from_arn,
    validate_consumer_name, FieldErrors,
};
use crate::errors::KinesisError;
use crate::models::consumer::{Consumer, ConsumerStatus, MAX_CONSUMERS_PER_STREAM};
use crate::models::dto::{
    ConsumerDescriptionDto, ConsumerDto, DeregisterStreamConsumerInput,
    DescribeStreamConsumerInput, DescribeStreamConsumerOutput, EmptyOutput,
    ListStreamConsumersInput, ListStreamConsumersOutput, RegisterStreamConsumerInput,
    RegisterStreamConsumerOutput,
};
use crate::models::iterator::NextTokenPayload;
use crate::services::cache::Cache;
use crate::services::scheduler::{DelayedTransition, TransitionAction};

const LIST_CONSUMERS_SCOPE: &str = "ListStreamConsumers";
const DEFAULT_LIST_CONSUMERS_LIMIT: usize = 100;

/// The target of a consumer request: a (stream, consumer) pair named either
/// directly or through a consumer ARN.
fn resolve_consumer_ref(
    stream_arn: &Option<String>,
    consumer_name: &Option<String>,
    consumer_arn: &Option<String>,
) -> Result<(String, String), KinesisError> {
    if let Some(arn) = consumer_arn {
        return consumer_ref_from_arn(arn);
    }
    match (stream_arn, consumer_name) {
        (Some(arn), Some(name)) => Ok((stream_name_from_arn(arn)?, name.clone())),
        _ => Err(KinesisError::Validation(
            "1 validation error(s) detected: ConsumerARN or StreamARN and ConsumerName are required"
                .to_string(),
        )),
    }
}

pub async fn register_stream_consumer(
    cache: &Cache,
    region: &str,
    input: RegisterStreamConsumerInput,
) -> Result<RegisterStreamConsumerOutput, KinesisError> {
    let mut errors = FieldErrors::new();
    let name = match &input.stream_arn {
        Some(arn) => match stream_name_from_arn(arn) {
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
    let consumer_name = match input.consumer_name.clone() {
        Some(consumer_name) => {
            validate_consumer_name(&consumer_name, &mut errors);
            consumer_name
        }
        None => {
            errors.push("ConsumerName is required");
            String::new()
        }
    };
    errors.into_result()?;

    let cfg = cache.config().streams.clone();
    let now = cache.now();
    let region_owned = region.to_string();

    cache
        .mutate(region, move |state| {
            let stream = state.stream_mut(&name)?;
            require_active(stream)?;

            if stream.consumers.len() >= MAX_CONSUMERS_PER_STREAM {
                return Err(KinesisError::LimitExceeded(format!(
                    "Stream {} already has {} consumers",
                    name, MAX_CONSUMERS_PER_STREAM
                )));
            }
            if stream.consumers.contains_key(&consumer_name) {
                return Err(KinesisError::ResourceInUse(format!(
                    "Consumer {} already exists on stream {}",
                    consumer_name, name
                )));
            }

            let consumer = Consumer::new(&consumer_name, &stream.stream_arn, now);
            let dto = ConsumerDto::from(&consumer);
            stream.consumers.insert(consumer_name.clone(), consumer);
            info!(stream = %name, consumer = %consumer_name, region = %region_owned, "registering consumer");

            let transitions = vec![DelayedTransition {
                due_at: now + as_chrono(cfg.register_consumer_duration()),
                region: region_owned,
                action: TransitionAction::ConsumerToActive {
                    stream_name: name,
                    consumer_name,
                },
            }];
            Ok((RegisterStreamConsumerOutput { consumer: dto }, transitions))
        })
        .await
}

pub async fn deregister_stream_consumer(
    cache: &Cache,
    region: &str,
    input: DeregisterStreamConsumerInput,
) -> Result<EmptyOutput, KinesisError> {
    let (name, consumer_name) =
        resolve_consumer_ref(&input.stream_arn, &input.consumer_name, &input.consumer_arn)?;

    let cfg = cache.config().streams.clone();
    let now = cache.now();
    let region_owned = region.to_string();

    cache
        .mutate(region, move |state| {
            let stream = state.stream_mut(&name)?;
            let consumer = stream.consumers.get_mut(&consumer_name).ok_or_else(|| {
                KinesisError::ResourceNotFound(format!(
                    "Consumer {} not found on stream {}",
                    consumer_name, name
                ))
            })?;

            if consumer.consumer_status != ConsumerStatus::Active {
                return Err(KinesisError::ResourceInUse(format!(
                    "Consumer {} is in status {}",
                    consumer_name,
                    consumer.consumer_status.as_str()
                )));
            }

            consumer.consumer_status = ConsumerStatus::Deleting;
            info!(stream = %name, consumer = %consumer_name, region = %region_owned, "deregistering consumer");

            let transitions = vec![DelayedTransition {
                due_at: now + as_chrono(cfg.deregister_consumer_duration()),
                region: region_owned,
                action: TransitionAction::ConsumerRemoval {
                    stream_name: name,
                    consumer_name,
                },
            }];
            Ok((EmptyOutput {}, transitions))
        })
        .await
}

pub async fn describe_stream_consumer(
    cache: &Cache,
    region: &str,
    input: DescribeStreamConsumerInput,
) -> Result<DescribeStreamConsumerOutput, KinesisError> {
    let (name, consumer_name) =
        resolve_consumer_ref(&input.stream_arn, &input.consumer_name, &input.consumer_arn)?;

    cache
        .read(region, move |state| {
            let stream = state.stream(&name)?;
            require_not_deleting(stream)?;
            let consumer = stream.consumers.get(&consumer_name).ok_or_else(|| {
                KinesisError::ResourceNotFound(format!(
                    "Consumer {} not found on stream {}",
                    consumer_name, name
                ))
            })?;
            Ok(DescribeStreamConsumerOutput {
                consumer_description: ConsumerDescriptionDto::from(consumer),
            })
        })
        .await
}

pub async fn list_stream_consumers(
    cache: &Cache,
    region: &str,
    input: ListStreamConsumersInput,
) -> Result<ListStreamConsumersOutput, KinesisError> {
    let mut errors = FieldErrors::new();
    if input.next_token.is_some() && input.stream_arn.is_some() {
        errors.push("NextToken and StreamARN cannot both be set");
    }
    let max_results = match input.max_results {
        None => DEFAULT_LIST_CONSUMERS_LIMIT,
        Some(max) if (1..=10000).contains(&max) => max as usize,
        Some(max) => {
            errors.push(format!("MaxResults {} must be between 1 and 10000", max));
            DEFAULT_LIST_CONSUMERS_LIMIT
        }
    };
    errors.into_result()?;

    let now = cache.now();
    let ttl = cache.config().streams.iterator_ttl();
    let (name, exclusive_start) = match &input.next_token {
        Some(token) => {
            let payload = NextTokenPayload::unseal(token, LIST_CONSUMERS_SCOPE, now, ttl)?;
            let name = payload.stream_name.clone().ok_or_else(|| {
                KinesisError::InvalidArgument("Invalid NextToken".to_string())
            })?;
            (name, Some(payload.exclusive_start))
        }
        None => {
            let arn = input.stream_arn.as_ref().ok_or_else(|| {
                KinesisError::Validation(
                    "1 validation error(s) detected: StreamARN is required".to_string(),
                )
            })?;
            (stream_name_from_arn(arn)?, None)
        }
    };

    cache
        .read(region, move |state| {
            let stream = state.stream(&name)?;
            require_not_deleting(stream)?;

            let eligible: Vec<&Consumer> = stream
                .consumers
                .values()
                .filter(|c| match &exclusive_start {
                    Some(start) => c.consumer_name.as_str() > start.as_str(),
                    None => true,
                })
                .collect();
            let has_more = eligible.len() > max_results;
            let page: Vec<&Consumer> = eligible.into_iter().take(max_results).collect();
            let next_token = match (has_more, page.last()) {
                (true, Some(last)) => Some(
                    NextTokenPayload::new(
                        LIST_CONSUMERS_SCOPE,
                        Some(&name),
                        &last.consumer_name,
                        now,
                    )
                    .seal()?,
                ),
                _ => None,
            };

            Ok(ListStreamConsumersOutput {
                consumers: page.into_iter().map(ConsumerDto::from).collect(),
                next_token,
            })
        })
        .await
}
