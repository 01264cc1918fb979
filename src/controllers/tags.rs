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


use crate::controllers::validation::{
    require_active, require_not_deleting, resolve_stream_name, validate_tag_key,
    validate_tag_value, FieldErrors,
};
use crate::errors::KinesisError;
use crate::models::dto::{
    AddTagsToStreamInput, EmptyOutput, ListTagsForStreamInput, ListTagsForStreamOutput,
    RemoveTagsFromStreamInput, TagDto,
};
use crate::models::stream::MAX_TAGS_PER_STREAM;
use crate::services::cache::Cache;

/// Tags added or removed per call.
const MAX_TAGS_PER_REQUEST: usize = 10;
const DEFAULT_LIST_TAGS_LIMIT: usize = 50;

pub async fn add_tags_to_stream(
    cache: &Cache,
    region: &str,
    input: AddTagsToStreamInput,
) -> Result<EmptyOutput, KinesisError> {
    let mut errors = FieldErrors::new();
    let name = match resolve_stream_name(&input.stream_name, &input.stream_arn) {
        Ok(name) => name,
        Err(e) => {
            errors.push(e.message());
            String::new()
        }
    };
    let tags = input.tags.unwrap_or_default();
    if tags.is_empty() {
        errors.push("Tags must contain at least 1 entry");
    } else if tags.len() > MAX_TAGS_PER_REQUEST {
        errors.push(format!(
            "Tags must contain at most {} entries per request",
            MAX_TAGS_PER_REQUEST
        ));
    }
    for (key, value) in &tags {
        validate_tag_key(key, &mut errors);
        validate_tag_value(value, &mut errors);
    }
    errors.into_result()?;

    cache
        .mutate(region, move |state| {
            let stream = state.stream_mut(&name)?;
            require_active(stream)?;

            // overwriting an existing key is not growth, so adding the same
            // tags twice is idempotent
            let new_keys = tags
                .keys()
                .filter(|k| !stream.tags.contains_key(*k))
                .count();
            if stream.tags.len() + new_keys > MAX_TAGS_PER_STREAM {
                return Err(KinesisError::LimitExceeded(format!(
                    "Stream {} cannot have more than {} tags",
                    name, MAX_TAGS_PER_STREAM
                )));
            }

            stream.tags.extend(tags);
            Ok((EmptyOutput {}, vec![]))
        })
        .await
}

pub async fn remove_tags_from_stream(
    cache: &Cache,
    region: &str,
    input: RemoveTagsFromStreamInput,
) -> Result<EmptyOutput, KinesisError> {
    let mut errors = FieldErrors::new();
    let name = match resolve_stream_name(&input.stream_name, &input.stream_arn) {
        Ok(name) => name,
        Err(e) => {
            errors.push(e.message());
            String::new()
        }
    };
    let tag_keys = input.tag_keys.unwrap_or_default();
    if tag_keys.is_empty() {
        errors.push("TagKeys must contain at least 1 entry");
    } else if tag_keys.len() > MAX_TAGS_PER_REQUEST {
        errors.push(format!(
            "TagKeys must contain at most {} entries per request",
            MAX_TAGS_PER_REQUEST
        ));
    }
    errors.into_result()?;

    cache
        .mutate(region, move |state| {
            let stream = state.stream_mut(&name)?;
            require_active(stream)?;
            for key in &tag_keys {
                stream.tags.remove(key);
            }
            Ok((EmptyOutput {}, vec![]))
        })
        .await
}

pub async fn list_tags_for_stream(
    cache: &Cache,
    region: &str,
    input: ListTagsForStreamInput,
) -> Result<ListTagsForStreamOutput, KinesisError> {
    let name = resolve_stream_name(&input.stream_name, &input.stream_arn)?;
    let limit = match input.limit {
        None => DEFAULT_LIST_TAGS_LIMIT,
        Some(limit) if (1..=MAX_TAGS_PER_STREAM as i32).contains(&limit) => limit as usize,
        Some(limit) => {
            return Err(KinesisError::Validation(format!(
                "1 validation error(s) detected: Limit {} must be between 1 and {}",
                limit, MAX_TAGS_PER_STREAM
            )))
        }
    };
    let exclusive_start = input.exclusive_start_tag_key;

    cache
        .read(region, move |state| {
            let stream = state.stream(&name)?;
            require_not_deleting(stream)?;

            let eligible: Vec<(&String, &String)> = stream
                .tags
                .iter()
                .filter(|(key, _)| match &exclusive_start {
                    Some(start) => key.as_str() > start.as_str(),
                    None => true,
                })
                .collect();
            let has_more_tags = eligible.len() > limit;
            let tags = eligible
                .into_iter()
                .take(limit)
                .map(|(key, value)| TagDto {
                    key: key.clone(),
                    value: value.clone(),
                })
                .collect();

            Ok(ListTagsForStreamOutput {
                tags,
                has_more_tags,
            })
        })
        .await
}
