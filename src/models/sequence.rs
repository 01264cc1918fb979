use crate::errors::KinesisError;

/// Sequence numbers are opaque decimal strings to clients; internally they
/// are a `u128` with a fixed field packing. The layout is a stable contract:
/// snapshots written by one build must decode in the next.
///
/// MSB → LSB:
///   version       4 bits  (always 2)
///   shard_index  20 bits
///   byte_offset  44 bits
///   sub_sequence 20 bits
///   shard_create 32 bits  (shard creation, seconds since epoch)
///   reserved      8 bits
///
/// The constant version nibble keeps every encoded value at the same digit
/// count, so decimal-string comparison, numeric comparison, and
/// (shard_index, byte_offset, sub_sequence) tuple order all agree.
pub const SEQUENCE_VERSION: u8 = 2;

pub const MAX_SHARD_INDEX: u32 = (1 << 20) - 1;
pub const MAX_BYTE_OFFSET: u64 = (1 << 44) - 1;
pub const MAX_SUB_SEQUENCE: u32 = (1 << 20) - 1;

const VERSION_SHIFT: u32 = 124;
const SHARD_INDEX_SHIFT: u32 = 104;
const BYTE_OFFSET_SHIFT: u32 = 60;
const SUB_SEQUENCE_SHIFT: u32 = 40;
const SHARD_CREATE_SHIFT: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SequenceNumber {
    pub shard_index: u32,
    pub byte_offset: u64,
    pub sub_sequence: u32,
    pub shard_create_secs: u32,
}

impl SequenceNumber {
    pub fn starting(shard_index: u32, shard_create_secs: u32) -> Self {
        Self {
            shard_index,
            byte_offset: 0,
            sub_sequence: 0,
            shard_create_secs,
        }
    }

    pub fn encode(&self) -> u128 {
        ((SEQUENCE_VERSION as u128) << VERSION_SHIFT)
            | (((self.shard_index & MAX_SHARD_INDEX) as u128) << SHARD_INDEX_SHIFT)
            | (((self.byte_offset & MAX_BYTE_OFFSET) as u128) << BYTE_OFFSET_SHIFT)
            | (((self.sub_sequence & MAX_SUB_SEQUENCE) as u128) << SUB_SEQUENCE_SHIFT)
            | ((self.shard_create_secs as u128) << SHARD_CREATE_SHIFT)
    }

    pub fn to_decimal(&self) -> String {
        self.encode().to_string()
    }

    pub fn decode(value: u128) -> Result<Self, KinesisError> {
        let version = (value >> VERSION_SHIFT) as u8;
        if version != SEQUENCE_VERSION {
            return Err(KinesisError::InvalidArgument(format!(
                "Invalid sequence number version: {}",
                version
            )));
        }
        Ok(Self {
            shard_index: ((value >> SHARD_INDEX_SHIFT) as u32) & MAX_SHARD_INDEX,
            byte_offset: ((value >> BYTE_OFFSET_SHIFT) as u64) & MAX_BYTE_OFFSET,
            sub_sequence: ((value >> SUB_SEQUENCE_SHIFT) as u32) & MAX_SUB_SEQUENCE,
            shard_create_secs: (value >> SHARD_CREATE_SHIFT) as u32,
        })
    }

    pub fn parse(s: &str) -> Result<Self, KinesisError> {
        let value = parse_raw(s)?;
        Self::decode(value)
    }
}

/// Parse a wire sequence-number string into its raw numeric form without
/// interpreting the fields.
pub fn parse_raw(s: &str) -> Result<u128, KinesisError> {
    s.parse::<u128>().map_err(|_| {
        KinesisError::InvalidArgument(format!("Invalid sequence number: {}", s))
    })
}
