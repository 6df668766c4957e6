use crate::schema::types::{DecodeError, Value};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

const HEADER_SIZE_LENGTH: usize = 2;
const HEADER_ELT_LENGTH: usize = 2;
const COUNTER_ID_LENGTH: usize = 16;
const STEP_LENGTH: usize = COUNTER_ID_LENGTH + 8 + 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ShardKind {
    Global,
    Local,
    Remote,
}

impl ShardKind {
    pub fn tag(self) -> u8 {
        match self {
            ShardKind::Global => b'g',
            ShardKind::Local => b'l',
            ShardKind::Remote => b'r',
        }
    }
}

impl fmt::Display for ShardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShardKind::Global => "Global",
            ShardKind::Local => "Local",
            ShardKind::Remote => "Remote",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterShard {
    pub kind: ShardKind,
    pub id: Uuid,
    pub clock: i64,
    pub count: i64,
}

impl CounterShard {
    pub fn global(id: Uuid, clock: i64, count: i64) -> Self {
        Self {
            kind: ShardKind::Global,
            id,
            clock,
            count,
        }
    }

    /// `(tag, counter id, clock, count)` as bound into a shard list.
    pub fn to_value(&self) -> Value {
        Value::Tuple(vec![
            Value::Int(i32::from(self.kind.tag())),
            Value::Uuid(self.id),
            Value::BigInt(self.clock),
            Value::BigInt(self.count),
        ])
    }
}

/// Decodes a serialized counter context: a header listing which shards are
/// global (negative entries) or local, followed by fixed-size shards. Shards
/// absent from the header are remote.
pub fn decode_context(bytes: &[u8]) -> Result<Vec<CounterShard>, DecodeError> {
    let header = bytes
        .get(..HEADER_SIZE_LENGTH)
        .ok_or(DecodeError::Truncated("counter context header"))?;
    let header_count = i16::from_be_bytes([header[0], header[1]]);
    let header_count = usize::try_from(header_count)
        .map_err(|_| DecodeError::CounterContext(format!("negative header size {header_count}")))?;
    let body_offset = HEADER_SIZE_LENGTH + header_count * HEADER_ELT_LENGTH;
    let body = bytes
        .get(body_offset..)
        .ok_or(DecodeError::Truncated("counter context header"))?;
    if body.len() % STEP_LENGTH != 0 {
        return Err(DecodeError::CounterContext(format!(
            "body of {} bytes is not a whole number of shards",
            body.len()
        )));
    }
    let shard_count = body.len() / STEP_LENGTH;

    let mut kinds = vec![ShardKind::Remote; shard_count];
    for entry in bytes[HEADER_SIZE_LENGTH..body_offset].chunks_exact(HEADER_ELT_LENGTH) {
        let raw = i16::from_be_bytes([entry[0], entry[1]]);
        let (index, kind) = if raw < 0 {
            (i32::from(raw) - i32::from(i16::MIN), ShardKind::Global)
        } else {
            (i32::from(raw), ShardKind::Local)
        };
        let slot = usize::try_from(index)
            .ok()
            .and_then(|index| kinds.get_mut(index))
            .ok_or_else(|| {
                DecodeError::CounterContext(format!(
                    "header references shard {index} of {shard_count}"
                ))
            })?;
        *slot = kind;
    }

    let shards = body
        .chunks_exact(STEP_LENGTH)
        .zip(kinds)
        .map(|(chunk, kind)| {
            let mut id = [0u8; COUNTER_ID_LENGTH];
            id.copy_from_slice(&chunk[..COUNTER_ID_LENGTH]);
            let mut clock = [0u8; 8];
            clock.copy_from_slice(&chunk[COUNTER_ID_LENGTH..COUNTER_ID_LENGTH + 8]);
            let mut count = [0u8; 8];
            count.copy_from_slice(&chunk[COUNTER_ID_LENGTH + 8..]);
            CounterShard {
                kind,
                id: Uuid::from_bytes(id),
                clock: i64::from_be_bytes(clock),
                count: i64::from_be_bytes(count),
            }
        })
        .collect();
    Ok(shards)
}

pub fn encode_context(shards: &[CounterShard]) -> Vec<u8> {
    let header: Vec<i16> = shards
        .iter()
        .enumerate()
        .filter_map(|(index, shard)| {
            let index = i16::try_from(index).ok()?;
            match shard.kind {
                ShardKind::Global => Some(index.wrapping_add(i16::MIN)),
                ShardKind::Local => Some(index),
                ShardKind::Remote => None,
            }
        })
        .collect();
    let header_len = i16::try_from(header.len()).unwrap_or(i16::MAX);

    let body_len = shards.len() * STEP_LENGTH;
    let mut out =
        Vec::with_capacity(HEADER_SIZE_LENGTH + header.len() * HEADER_ELT_LENGTH + body_len);
    out.extend_from_slice(&header_len.to_be_bytes());
    for entry in &header {
        out.extend_from_slice(&entry.to_be_bytes());
    }
    for shard in shards {
        out.extend_from_slice(shard.id.as_bytes());
        out.extend_from_slice(&shard.clock.to_be_bytes());
        out.extend_from_slice(&shard.count.to_be_bytes());
    }
    out
}
