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
use crate::controllers::validation::{require_active, resolve_stream_name, FieldErrors};
use crate::errors::KinesisError;
use crate::models::dto::{EmptyOutput, RetentionPeriodInput};
use crate::models::stream::{StreamStatus, MAX_RETENTION_HOURS, MIN_RETENTION_HOURS};
use crate::services::cache::Cache;
use crate::services::scheduler::{DelayedTransition, TransitionAction};

fn validated_hours(input: &RetentionPeriodInput) -> Result<(String, i32), KinesisError> {
    let mut errors = FieldErrors::new();
    let name = match resolve_stream_name(&input.stream_name, &input.stream_arn) {
        Ok(name) => name,
        Err(e) => {
            errors.push(e.message());
            String::new()
        }
    };
    let hours = match input.retention_period_hours {
        Some(hours) if (MIN_RETENTION_HOURS..=MAX_RETENTION_HOURS).contains(&hours) => hours,
        Some(hours) => {
            errors.push(format!(
                "RetentionPeriodHours {} must be between {} and {}",
                hours, MIN_RETENTION_HOURS, MAX_RETENTION_HOURS
            ));
            MIN_RETENTION_HOURS
        }
        None => {
            errors.push("RetentionPeriodHours is required");
            MIN_RETENTION_HOURS
        }
    };
    errors.into_result()?;
    Ok((name, hours))
}

async fn apply_retention_change(
    cache: &Cache,
    region: &str,
    name: String,
    hours: i32,
    increase: bool,
) -> Result<EmptyOutput, KinesisError> {
    let cfg = cache.config().streams.clone();
    let now = cache.now();
    let region_owned = region.to_string();

    cache
        .mutate(region, move |state| {
            let stream = state.stream_mut(&name)?;
            require_active(stream)?;

            if increase && hours <= stream.retention_period_hours {
                return Err(KinesisError::InvalidArgument(format!(
                    "RetentionPeriodHours {} must be greater than the current period of {}",
                    hours, stream.retention_period_hours
                )));
            }
            if !increase && hours >= stream.retention_period_hours {
                return Err(KinesisError::InvalidArgument(format!(
                    "RetentionPeriodHours {} must be less than the current period of {}",
                    hours, stream.retention_period_hours
                )));
            }

            stream.retention_period_hours = hours;
            stream.status = StreamStatus::Updating;
            info!(stream = %name, region = %region_owned, hours, "changed retention period");

            let transitions = vec![DelayedTransition {
                due_at: now + as_chrono(cfg.update_stream_duration()),
                region: region_owned,
                action: TransitionAction::StreamToActive { stream_name: name },
            }];
            Ok((EmptyOutput {}, transitions))
        })
        .await
}

pub async fn increase_stream_retention_period(
    cache: &Cache,
    region: &str,
    input: RetentionPeriodInput,
) -> Result<EmptyOutput, KinesisError> {
    let (name, hours) = validated_hours(&input)?;
    apply_retention_change(cache, region, name, hours, true).await
}

pub async fn decrease_stream_retention_period(
    cache: &Cache,
    region: &str,
    input: RetentionPeriodInput,
) -> Result<EmptyOutput, KinesisError> {
    let (name, hours) = validated_hours(&input)?;
    apply_retention_change(cache, region, name, hours, false).await
}
