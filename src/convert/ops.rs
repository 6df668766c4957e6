use crate::convert::decode_failure;
use crate::convert::stats::Statistics;
use crate::error::ConvertError;
use crate::schema::types::{CqlType, Value};
use crate::schema::{ColumnDef, ColumnKind};
use crate::sstable::counter::{self, CounterShard, ShardKind};
use crate::sstable::row::Cell;
use tracing::warn;

/// One mutation fragment derived from a cell.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnOp {
    SetScalar(Value),
    SetMapEntry { key: Value, value: Value },
    /// `key` is the element's timeuuid ordering key, not a position.
    SetListEntry { key: Value, value: Value },
    SetAdd(Value),
    SetRemove(Value),
    SetCounterShards(Vec<CounterShard>),
    /// Collection-wide deletion; only valid in a DELETE.
    ClearCollection,
}

impl ColumnOp {
    /// Null overwrites need UPDATE: an INSERT of null writes nothing.
    pub fn can_do_insert(&self) -> bool {
        matches!(self, ColumnOp::SetScalar(value) if !value.is_null())
    }

    pub fn forbids_ttl(&self) -> bool {
        matches!(self, ColumnOp::SetCounterShards(_))
    }
}

pub(crate) fn decode_cell(
    column: &ColumnDef,
    cell: &Cell,
    ignore_dropped_counter_data: bool,
    stats: &mut Statistics,
) -> Result<ColumnOp, ConvertError> {
    if let Some(path) = cell.element_path() {
        let key_type = column
            .cql_type
            .element_key_type()
            .ok_or_else(|| ConvertError::InvalidCell {
                column: column.name.clone(),
                message: format!("element path on non-collection type {}", column.cql_type),
            })?;
        let key = compose(column, key_type, path)?;
        return match column.kind() {
            ColumnKind::Map => Ok(ColumnOp::SetMapEntry {
                key,
                value: element_value(column, cell)?,
            }),
            ColumnKind::List => Ok(ColumnOp::SetListEntry {
                key,
                value: element_value(column, cell)?,
            }),
            ColumnKind::Set if cell.is_live() => Ok(ColumnOp::SetAdd(key)),
            ColumnKind::Set => Ok(ColumnOp::SetRemove(key)),
            ColumnKind::Scalar | ColumnKind::Counter => Err(ConvertError::InvalidCell {
                column: column.name.clone(),
                message: "element path on a single-cell column".into(),
            }),
        };
    }

    match cell.value.as_deref() {
        Some(bytes) if column.cql_type.is_counter() => Ok(ColumnOp::SetCounterShards(
            global_shards(column, bytes, ignore_dropped_counter_data, stats)?,
        )),
        Some(bytes) => Ok(ColumnOp::SetScalar(compose(column, &column.cql_type, bytes)?)),
        None => Ok(ColumnOp::SetScalar(Value::Null)),
    }
}

fn compose(column: &ColumnDef, cql_type: &CqlType, bytes: &[u8]) -> Result<Value, ConvertError> {
    cql_type
        .decode(bytes)
        .map_err(|source| decode_failure(&column.name, source))
}

fn element_value(column: &ColumnDef, cell: &Cell) -> Result<Value, ConvertError> {
    match (cell.value.as_deref(), column.cql_type.element_value_type()) {
        (Some(bytes), Some(value_type)) => compose(column, value_type, bytes),
        _ => Ok(Value::Null),
    }
}

fn global_shards(
    column: &ColumnDef,
    bytes: &[u8],
    ignore_dropped_counter_data: bool,
    stats: &mut Statistics,
) -> Result<Vec<CounterShard>, ConvertError> {
    let shards =
        counter::decode_context(bytes).map_err(|source| decode_failure(&column.name, source))?;
    let mut kept = Vec::with_capacity(shards.len());
    for shard in shards {
        match shard.kind {
            ShardKind::Global => kept.push(shard),
            kind if !ignore_dropped_counter_data => {
                return Err(ConvertError::DataLossRisk {
                    column: column.name.clone(),
                    shard: kind,
                });
            }
            ShardKind::Local => {
                stats.local_counters_skipped += 1;
                warn!(column = %column.name, id = %shard.id, "skipping local counter shard");
            }
            ShardKind::Remote => {
                stats.remote_counters_skipped += 1;
                warn!(column = %column.name, id = %shard.id, "skipping remote counter shard");
            }
        }
    }
    Ok(kept)
}
