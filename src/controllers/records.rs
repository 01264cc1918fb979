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


use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::controllers::validation::{
    parse_hash_key, require_active, require_not_deleting, resolve_stream_name,
    validate_partition_key, FieldErrors,
};
use crate::errors::KinesisError;
use crate::models::dto::{
    ChildShardDto, GetRecordsInput, GetRecordsOutput, GetShardIteratorInput,
    GetShardIteratorOutput, PutRecordInput, PutRecordOutput, PutRecordsInput, PutRecordsOutput,
    PutRecordsResultEntryDto, RecordDto,
};
use crate::models::iterator::ShardIteratorToken;
use crate::models::record::{StoredRecord, MAX_DATA_BYTES};
use crate::models::sequence::{self, SequenceNumber};
use crate::models::stream::{EncryptionType, StreamModel};
use crate::services::cache::Cache;

const MAX_GET_RECORDS_LIMIT: usize = 10000;
const MAX_GET_RECORDS_BYTES: usize = 10 * 1024 * 1024;
const MAX_PUT_RECORDS_ENTRIES: usize = 500;

/// MD5 of the partition key, read as a 128-bit big-endian unsigned, unless
/// the caller routed explicitly.
fn route_hash(partition_key: &str, explicit_hash_key: Option<u128>) -> u128 {
    match explicit_hash_key {
        Some(hash) => hash,
        None => u128::from_be_bytes(md5::compute(partition_key.as_bytes()).0),
    }
}

fn decode_data(data: &str, field: &str, errors: &mut FieldErrors) -> Option<Vec<u8>> {
    match BASE64.decode(data) {
        Ok(bytes) if bytes.len() <= MAX_DATA_BYTES => Some(bytes),
        Ok(_) => {
            errors.push(format!("{} must be at most 1 MiB", field));
            None
        }
        Err(_) => {
            errors.push(format!("{} is not valid base64", field));
            None
        }
    }
}

fn wire_encryption(stream: &StreamModel) -> Option<String> {
    match stream.encryption_type {
        EncryptionType::None => None,
        EncryptionType::Kms => Some(EncryptionType::Kms.as_str().to_string()),
    }
}

/// Arrival timestamps are monotone per shard even if the clock regresses.
fn arrival_for(shard_last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    match shard_last {
        Some(last) if last > now => last,
        _ => now,
    }
}

pub async fn put_record(
    cache: &Cache,
    region: &str,
    input: PutRecordInput,
) -> Result<PutRecordOutput, KinesisError> {
    let mut errors = FieldErrors::new();
    let name = match resolve_stream_name(&input.stream_name, &input.stream_arn) {
        Ok(name) => name,
        Err(e) => {
            errors.push(e.message());
            String::new()
        }
    };
    let data = match input.data.as_deref() {
        Some(data) => decode_data(data, "Data", &mut errors),
        None => {
            errors.push("Data is required");
            None
        }
    };
    let partition_key = match input.partition_key.clone() {
        Some(key) => {
            validate_partition_key(&key, &mut errors);
            key
        }
        None => {
            errors.push("PartitionKey is required");
            String::new()
        }
    };
    let explicit_hash_key = match input.explicit_hash_key.as_deref() {
        Some(value) => parse_hash_key(value, "ExplicitHashKey", &mut errors),
        None => None,
    };
    if let Some(seq) = input.sequence_number_for_ordering.as_deref() {
        if sequence::parse_raw(seq).is_err() {
            errors.push("SequenceNumberForOrdering is not a valid sequence number");
        }
    }
    errors.into_result()?;
    let Some(data) = data else {
        return Err(KinesisError::InternalFailure(
            "Data missing after validation".to_string(),
        ));
    };

    let now = cache.now();

    cache
        .mutate(region, move |state| {
            let stream = state.stream_mut(&name)?;
            require_active(stream)?;

            let hash = route_hash(&partition_key, explicit_hash_key);
            let index = stream.route(hash).ok_or_else(|| {
                KinesisError::InternalFailure(format!(
                    "No open shard owns hash key {} in stream {}",
                    hash, name
                ))
            })?;
            let encryption_type = stream.encryption_type;
            let wire = wire_encryption(stream);
            let shard = &mut stream.shards[index];

            let billed = data.len() + partition_key.len();
            if !shard.try_debit_write(billed, now) {
                return Err(KinesisError::ProvisionedThroughputExceeded(format!(
                    "Rate exceeded for shard {} in stream {}",
                    shard.shard_id, name
                )));
            }

            let arrival = arrival_for(shard.last_arrival(), now);
            let sequence = shard.assign_sequence(data.len());
            shard.records.push(StoredRecord {
                sequence_number: sequence.encode(),
                approximate_arrival_timestamp: arrival,
                data,
                partition_key,
                explicit_hash_key,
                encryption_type,
            });
            debug!(stream = %name, shard = %shard.shard_id, "accepted record");

            Ok((
                PutRecordOutput {
                    shard_id: shard.shard_id.clone(),
                    sequence_number: sequence.to_decimal(),
                    encryption_type: wire,
                },
                vec![],
            ))
        })
        .await
}

pub async fn put_records(
    cache: &Cache,
    region: &str,
    input: PutRecordsInput,
) -> Result<PutRecordsOutput, KinesisError> {
    let mut errors = FieldErrors::new();
    let name = match resolve_stream_name(&input.stream_name, &input.stream_arn) {
        Ok(name) => name,
        Err(e) => {
            errors.push(e.message());
            String::new()
        }
    };
    let entries = input.records.unwrap_or_default();
    if entries.is_empty() {
        errors.push("Records must contain at least 1 entry");
    } else if entries.len() > MAX_PUT_RECORDS_ENTRIES {
        errors.push(format!(
            "Records must contain at most {} entries",
            MAX_PUT_RECORDS_ENTRIES
        ));
    }

    let mut parsed = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        let data = match entry.data.as_deref() {
            Some(data) => decode_data(data, &format!("Records.{}.Data", i), &mut errors),
            None => {
                errors.push(format!("Records.{}.Data is required", i));
                None
            }
        };
        let partition_key = match entry.partition_key.clone() {
            Some(key) => {
                validate_partition_key(&key, &mut errors);
                key
            }
            None => {
                errors.push(format!("Records.{}.PartitionKey is required", i));
                String::new()
            }
        };
        let explicit_hash_key = match entry.explicit_hash_key.as_deref() {
            Some(value) => parse_hash_key(
                value,
                &format!("Records.{}.ExplicitHashKey", i),
                &mut errors,
            ),
            None => None,
        };
        if let Some(data) = data {
            parsed.push((data, partition_key, explicit_hash_key));
        }
    }
    errors.into_result()?;

    let now = cache.now();

    cache
        .mutate(region, move |state| {
            let stream = state.stream_mut(&name)?;
            require_active(stream)?;

            let encryption_type = stream.encryption_type;
            let wire = wire_encryption(stream);
            let mut results = Vec::with_capacity(parsed.len());
            let mut failed = 0;

            // request order is preserved; each entry routes and debits its
            // own shard so a throttled entry never blocks later ones
            for (data, partition_key, explicit_hash_key) in parsed {
                let hash = route_hash(&partition_key, explicit_hash_key);
                let Some(index) = stream.route(hash) else {
                    return Err(KinesisError::InternalFailure(format!(
                        "No open shard owns hash key {} in stream {}",
                        hash, name
                    )));
                };
                let shard = &mut stream.shards[index];

                let billed = data.len() + partition_key.len();
                if !shard.try_debit_write(billed, now) {
                    failed += 1;
                    results.push(PutRecordsResultEntryDto {
                        sequence_number: None,
                        shard_id: None,
                        error_code: Some("ProvisionedThroughputExceededException".to_string()),
                        error_message: Some(format!(
                            "Rate exceeded for shard {} in stream {}",
                            shard.shard_id, name
                        )),
                    });
                    continue;
                }

                let arrival = arrival_for(shard.last_arrival(), now);
                let sequence = shard.assign_sequence(data.len());
                shard.records.push(StoredRecord {
                    sequence_number: sequence.encode(),
                    approximate_arrival_timestamp: arrival,
                    data,
                    partition_key,
                    explicit_hash_key,
                    encryption_type,
                });
                results.push(PutRecordsResultEntryDto {
                    sequence_number: Some(sequence.to_decimal()),
                    shard_id: Some(shard.shard_id.clone()),
                    error_code: None,
                    error_message: None,
                });
            }

            Ok((
                PutRecordsOutput {
                    failed_record_count: failed,
                    records: results,
                    encryption_type: wire,
                },
                vec![],
            ))
        })
        .await
}

pub async fn get_shard_iterator(
    cache: &Cache,
    region: &str,
    input: GetShardIteratorInput,
) -> Result<GetShardIteratorOutput, KinesisError> {
    let mut errors = FieldErrors::new();
    let name = match resolve_stream_name(&input.stream_name, &input.stream_arn) {
        Ok(name) => name,
        Err(e) => {
            errors.push(e.message());
            String::new()
        }
    };
    let shard_id = match input.shard_id.clone() {
        Some(id) => id,
        None => {
            errors.push("ShardId is required");
            String::new()
        }
    };
    let iterator_type = input.shard_iterator_type.clone().unwrap_or_default();
    match iterator_type.as_str() {
        "TRIM_HORIZON" | "LATEST" => {}
        "AT_SEQUENCE_NUMBER" | "AFTER_SEQUENCE_NUMBER" => {
            if input.starting_sequence_number.is_none() {
                errors.push(format!(
                    "StartingSequenceNumber is required for {}",
                    iterator_type
                ));
            }
        }
        "AT_TIMESTAMP" => {
            if input.timestamp.is_none() {
                errors.push("Timestamp is required for AT_TIMESTAMP");
            }
        }
        "" => errors.push("ShardIteratorType is required"),
        other => errors.push(format!(
            "ShardIteratorType {} is not one of TRIM_HORIZON, LATEST, AT_SEQUENCE_NUMBER, AFTER_SEQUENCE_NUMBER, AT_TIMESTAMP",
            other
        )),
    }
    errors.into_result()?;

    let now = cache.now();
    let starting_sequence_number = input.starting_sequence_number.clone();
    let timestamp = input.timestamp;

    cache
        .read(region, move |state| {
            let stream = state.stream(&name)?;
            require_not_deleting(stream)?;
            let shard = stream.shard(&shard_id).ok_or_else(|| {
                KinesisError::ResourceNotFound(format!(
                    "Could not find shard {} in stream {}",
                    shard_id, name
                ))
            })?;

            let starting_sequence = match iterator_type.as_str() {
                "TRIM_HORIZON" => {
                    sequence::parse_raw(&shard.sequence_number_range.starting_sequence_number)?
                }
                "LATEST" => shard.next_sequence().encode(),
                "AT_SEQUENCE_NUMBER" | "AFTER_SEQUENCE_NUMBER" => {
                    let raw = starting_sequence_number
                        .as_deref()
                        .map(sequence::parse_raw)
                        .transpose()?
                        .unwrap_or_default();
                    let decoded = SequenceNumber::decode(raw)?;
                    if decoded.shard_index != shard.shard_index {
                        return Err(KinesisError::InvalidArgument(format!(
                            "Sequence number does not belong to shard {}",
                            shard_id
                        )));
                    }
                    if iterator_type == "AFTER_SEQUENCE_NUMBER" {
                        raw + 1
                    } else {
                        raw
                    }
                }
                // first record at or past the timestamp; an empty tail reads
                // from the next write
                _ => shard
                    .records
                    .iter()
                    .find(|r| {
                        timestamp
                            .map(|t| r.approximate_arrival_timestamp >= t)
                            .unwrap_or(false)
                    })
                    .map(|r| r.sequence_number)
                    .unwrap_or_else(|| shard.next_sequence().encode()),
            };

            let token = ShardIteratorToken {
                stream_name: name.clone(),
                shard_id: shard_id.clone(),
                starting_sequence,
                issued_at: now,
            };
            Ok(GetShardIteratorOutput {
                shard_iterator: token.seal()?,
            })
        })
        .await
}

pub async fn get_records(
    cache: &Cache,
    region: &str,
    input: GetRecordsInput,
) -> Result<GetRecordsOutput, KinesisError> {
    let iterator = input.shard_iterator.as_deref().ok_or_else(|| {
        KinesisError::Validation(
            "1 validation error(s) detected: ShardIterator is required".to_string(),
        )
    })?;
    let limit = match input.limit {
        None => MAX_GET_RECORDS_LIMIT,
        Some(limit) if (1..=MAX_GET_RECORDS_LIMIT as i32).contains(&limit) => limit as usize,
        Some(limit) => {
            return Err(KinesisError::Validation(format!(
                "1 validation error(s) detected: Limit {} must be between 1 and {}",
                limit, MAX_GET_RECORDS_LIMIT
            )))
        }
    };

    let token = ShardIteratorToken::unseal(iterator)?;
    let now = cache.now();
    let ttl = cache.config().streams.iterator_ttl();
    if token.is_expired(now, ttl) {
        return Err(KinesisError::ExpiredIterator(format!(
            "Iterator issued at {} has expired",
            token.issued_at
        )));
    }

    cache
        .mutate(region, move |state| {
            let stream = state.stream_mut(&token.stream_name)?;
            require_not_deleting(stream)?;
            let stream_name = stream.stream_name.clone();

            let Some(shard) = stream.shard_mut(&token.shard_id) else {
                return Err(KinesisError::ResourceNotFound(format!(
                    "Could not find shard {} in stream {}",
                    token.shard_id, stream_name
                )));
            };

            if !shard.read_transactions.try_consume(1.0, now) {
                return Err(KinesisError::ProvisionedThroughputExceeded(format!(
                    "Rate exceeded for shard {} in stream {}",
                    token.shard_id, stream_name
                )));
            }

            let mut selected = Vec::new();
            let mut total_bytes = 0usize;
            for record in shard
                .records
                .iter()
                .filter(|r| r.sequence_number >= token.starting_sequence)
            {
                if selected.len() >= limit
                    || (total_bytes > 0 && total_bytes + record.data.len() > MAX_GET_RECORDS_BYTES)
                {
                    break;
                }
                total_bytes += record.data.len();
                selected.push(record);
            }

            let next_position = selected
                .last()
                .map(|r| r.sequence_number + 1)
                .unwrap_or(token.starting_sequence);
            let caught_up = !shard
                .records
                .iter()
                .any(|r| r.sequence_number >= next_position);

            let millis_behind_latest = if caught_up {
                0
            } else {
                shard
                    .last_arrival()
                    .map(|arrival| (now - arrival).num_milliseconds().max(0))
                    .unwrap_or(0)
            };

            let records: Vec<RecordDto> = selected
                .iter()
                .map(|r| RecordDto {
                    sequence_number: r.sequence_number.to_string(),
                    approximate_arrival_timestamp: r.approximate_arrival_timestamp,
                    data: BASE64.encode(&r.data),
                    partition_key: r.partition_key.clone(),
                    encryption_type: match r.encryption_type {
                        EncryptionType::None => None,
                        EncryptionType::Kms => Some("KMS".to_string()),
                    },
                })
                .collect();

            let shard_closed = !shard.is_open();
            let shard_id = shard.shard_id.clone();

            // a closed, fully drained shard ends the iterator chain and
            // hands the caller its children
            let (next_shard_iterator, child_shards) = if shard_closed && caught_up {
                let children: Vec<ChildShardDto> = stream
                    .child_shards_of(&shard_id)
                    .into_iter()
                    .map(ChildShardDto::from)
                    .collect();
                (None, Some(children))
            } else {
                let renewed = ShardIteratorToken {
                    stream_name: token.stream_name.clone(),
                    shard_id: token.shard_id.clone(),
                    starting_sequence: next_position,
                    issued_at: now,
                };
                (Some(renewed.seal()?), None)
            };

            Ok((
                GetRecordsOutput {
                    records,
                    next_shard_iterator,
                    millis_behind_latest,
                    child_shards,
                },
                vec![],
            ))
        })
        .await
}
