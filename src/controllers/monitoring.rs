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


use std::collections::BTreeSet;

use crate::controllers::validation::{require_active, resolve_stream_name, FieldErrors};
use crate::errors::KinesisError;
use crate::models::dto::{EnhancedMonitoringInput, EnhancedMonitoringOutput};
use crate::models::stream::SHARD_LEVEL_METRICS;
use crate::services::cache::Cache;

/// Expand and validate the requested metric names; "ALL" means every
/// shard-level metric.
fn requested_metrics(
    metrics: &Option<Vec<String>>,
    errors: &mut FieldErrors,
) -> BTreeSet<String> {
    let Some(metrics) = metrics else {
        errors.push("ShardLevelMetrics is required");
        return BTreeSet::new();
    };
    if metrics.is_empty() {
        errors.push("ShardLevelMetrics must contain at least 1 entry");
        return BTreeSet::new();
    }

    let mut expanded = BTreeSet::new();
    for metric in metrics {
        if metric == "ALL" {
            expanded.extend(SHARD_LEVEL_METRICS.iter().map(|m| m.to_string()));
        } else if SHARD_LEVEL_METRICS.contains(&metric.as_str()) {
            expanded.insert(metric.clone());
        } else {
            errors.push(format!("{} is not a shard-level metric", metric));
        }
    }
    expanded
}

pub async fn enable_enhanced_monitoring(
    cache: &Cache,
    region: &str,
    input: EnhancedMonitoringInput,
) -> Result<EnhancedMonitoringOutput, KinesisError> {
    let mut errors = FieldErrors::new();
    let name = match resolve_stream_name(&input.stream_name, &input.stream_arn) {
        Ok(name) => name,
        Err(e) => {
            errors.push(e.message());
            String::new()
        }
    };
    let requested = requested_metrics(&input.shard_level_metrics, &mut errors);
    errors.into_result()?;

    cache
        .mutate(region, move |state| {
            let stream = state.stream_mut(&name)?;
            require_active(stream)?;

            let current: Vec<String> = stream.enhanced_monitoring.iter().cloned().collect();
            stream.enhanced_monitoring.extend(requested);
            let desired: Vec<String> = stream.enhanced_monitoring.iter().cloned().collect();

            Ok((
                EnhancedMonitoringOutput {
                    stream_name: stream.stream_name.clone(),
                    stream_arn: stream.stream_arn.clone(),
                    current_shard_level_metrics: current,
                    desired_shard_level_metrics: desired,
                },
                vec![],
            ))
        })
        .await
}

pub async fn disable_enhanced_monitoring(
    cache: &Cache,
    region: &str,
    input: EnhancedMonitoringInput,
) -> Result<EnhancedMonitoringOutput, KinesisError> {
    let mut errors = FieldErrors::new();
    let name = match resolve_stream_name(&input.stream_name, &input.stream_arn) {
        Ok(name) => name,
        Err(e) => {
            errors.push(e.message());
            String::new()
        }
    };
    let requested = requested_metrics(&input.shard_level_metrics, &mut errors);
    errors.into_result()?;

    cache
        .mutate(region, move |state| {
            let stream = state.stream_mut(&name)?;
            require_active(stream)?;

            let current: Vec<String> = stream.enhanced_monitoring.iter().cloned().collect();
            for metric in &requested {
                stream.enhanced_monitoring.remove(metric);
            }
            let desired: Vec<String> = stream.enhanced_monitoring.iter().cloned().collect();

            Ok((
                EnhancedMonitoringOutput {
                    stream_name: stream.stream_name.clone(),
                    stream_arn: stream.stream_arn.clone(),
                    current_shard_level_metrics: current,
                    desired_shard_level_metrics: desired,
                },
                vec![],
            ))
        })
        .await
}
