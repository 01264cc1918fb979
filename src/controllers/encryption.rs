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
use crate::models::dto::{EmptyOutput, StartStreamEncryptionInput, StopStreamEncryptionInput};
use crate::models::stream::{EncryptionType, StreamStatus};
use crate::services::cache::Cache;
use crate::services::scheduler::{DelayedTransition, TransitionAction};

const MAX_KEY_ID_LEN: usize = 2048;

pub async fn start_stream_encryption(
    cache: &Cache,
    region: &str,
    input: StartStreamEncryptionInput,
) -> Result<EmptyOutput, KinesisError> {
    let mut errors = FieldErrors::new();
    let name = match resolve_stream_name(&input.stream_name, &input.stream_arn) {
        Ok(name) => name,
        Err(e) => {
            errors.push(e.message());
            String::new()
        }
    };
    match input.encryption_type.as_deref() {
        Some("KMS") => {}
        Some(other) => errors.push(format!("EncryptionType {} is not one of KMS", other)),
        None => errors.push("EncryptionType is required"),
    }
    let key_id = match input.key_id.clone() {
        Some(key_id) if !key_id.is_empty() && key_id.len() <= MAX_KEY_ID_LEN => key_id,
        Some(_) => {
            errors.push(format!(
                "KeyId must be between 1 and {} characters",
                MAX_KEY_ID_LEN
            ));
            String::new()
        }
        None => {
            errors.push("KeyId is required");
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

            if stream.encryption_type == EncryptionType::Kms {
                return Err(KinesisError::ResourceInUse(format!(
                    "Stream {} is already encrypted",
                    name
                )));
            }

            stream.encryption_type = EncryptionType::Kms;
            stream.key_id = Some(key_id);
            stream.status = StreamStatus::Updating;
            info!(stream = %name, region = %region_owned, "starting stream encryption");

            let transitions = vec![DelayedTransition {
                due_at: now + as_chrono(cfg.update_stream_duration()),
                region: region_owned,
                action: TransitionAction::StreamToActive { stream_name: name },
            }];
            Ok((EmptyOutput {}, transitions))
        })
        .await
}

pub async fn stop_stream_encryption(
    cache: &Cache,
    region: &str,
    input: StopStreamEncryptionInput,
) -> Result<EmptyOutput, KinesisError> {
    let mut errors = FieldErrors::new();
    let name = match resolve_stream_name(&input.stream_name, &input.stream_arn) {
        Ok(name) => name,
        Err(e) => {
            errors.push(e.message());
            String::new()
        }
    };
    match input.encryption_type.as_deref() {
        Some("KMS") => {}
        Some(other) => errors.push(format!("EncryptionType {} is not one of KMS", other)),
        None => errors.push("EncryptionType is required"),
    }
    errors.into_result()?;

    let cfg = cache.config().streams.clone();
    let now = cache.now();
    let region_owned = region.to_string();

    cache
        .mutate(region, move |state| {
            let stream = state.stream_mut(&name)?;
            require_active(stream)?;

            if stream.encryption_type == EncryptionType::None {
                return Err(KinesisError::ResourceInUse(format!(
                    "Stream {} is not encrypted",
                    name
                )));
            }

            stream.encryption_type = EncryptionType::None;
            stream.key_id = None;
            stream.status = StreamStatus::Updating;
            info!(stream = %name, region = %region_owned, "stopping stream encryption");

            let transitions = vec![DelayedTransition {
                due_at: now + as_chrono(cfg.update_stream_duration()),
                region: region_owned,
                action: TransitionAction::StreamToActive { stream_name: name },
            }];
            Ok((EmptyOutput {}, transitions))
        })
        .await
}
