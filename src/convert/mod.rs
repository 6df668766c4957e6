pub mod ops;
pub mod pending;
pub mod render;
pub mod stats;
pub mod tombstone;
pub mod where_clause;

use crate::config::{Clock, ConverterConfig};
use crate::error::ConvertError;
use crate::schema::types::{DecodeError, Value};
use crate::schema::{ColumnDef, ColumnKind, TableSchema};
use crate::sink::StatementSink;
use crate::source::Partition;
use crate::sstable::clustering::{Clustering, ClusteringComparator};
use crate::sstable::key::PartitionKey;
use crate::sstable::row::{
    Cell, ColumnData, DeletionTime, LivenessInfo, RangeTombstoneMarker, Row, Ttl, Unfiltered,
};
use std::sync::Arc;
use tracing::{debug, error, trace};

pub use ops::ColumnOp;
pub use pending::{FlushTrigger, OpKind, PendingStatement};
pub use render::{RenderContext, effective_ttl};
pub use stats::Statistics;
pub use tombstone::{ChainState, DeleteRange, TombstoneChain};
pub use where_clause::{ClusteringWhere, Comparator};

/// Logs a value that failed to decode and wraps it with its column.
pub(crate) fn decode_failure(column: &str, source: DecodeError) -> ConvertError {
    error!(column = %column, error = %source, "could not compose value");
    ConvertError::ValueDecode {
        column: column.to_string(),
        source,
    }
}

struct PartitionContext {
    schema: Arc<TableSchema>,
    key: PartitionKey,
    key_values: Vec<Value>,
}

struct RowContext {
    clustering: Option<Clustering>,
    liveness_timestamp: Option<i64>,
}

/// Accumulates the column operations of one partition into as few statements
/// as timestamps, TTLs and statement kinds allow, handing each finished
/// statement to the sink.
pub struct RowBuilder<'a, S: StatementSink + ?Sized> {
    config: &'a ConverterConfig,
    clock: Clock,
    sink: &'a mut S,
    stats: Statistics,
    partition: Option<PartitionContext>,
    row: Option<RowContext>,
    pending: PendingStatement,
    chain: TombstoneChain,
}

impl<'a, S: StatementSink + ?Sized> RowBuilder<'a, S> {
    pub fn new(config: &'a ConverterConfig, clock: Clock, sink: &'a mut S) -> Self {
        Self {
            config,
            clock,
            sink,
            stats: Statistics::default(),
            partition: None,
            row: None,
            pending: PendingStatement::default(),
            chain: TombstoneChain::new(),
        }
    }

    pub fn statistics(&self) -> &Statistics {
        &self.stats
    }

    pub fn into_statistics(self) -> Statistics {
        self.stats
    }

    pub fn pending(&self) -> &PendingStatement {
        &self.pending
    }

    pub fn chain_state(&self) -> ChainState {
        self.chain.state()
    }

    /// Converts one partition, start to end.
    pub fn process_partition(&mut self, partition: Partition) -> Result<(), ConvertError> {
        let Partition {
            schema,
            key,
            deletion,
            static_row,
            unfiltered,
        } = partition;
        self.begin_partition(key, schema)?;
        if let Some(deletion) = deletion {
            return self.delete_partition(deletion);
        }
        if let Some(row) = static_row {
            self.process_row(row)?;
        }
        for item in unfiltered {
            match item? {
                Unfiltered::Row(row) => self.process_row(row)?,
                Unfiltered::RangeTombstone(marker) => self.process_marker(marker)?,
            }
        }
        self.end_partition()
    }

    pub fn begin_partition(
        &mut self,
        key: PartitionKey,
        schema: Arc<TableSchema>,
    ) -> Result<(), ConvertError> {
        self.pending.clear();
        self.chain.reset();
        self.row = None;
        let key_values = key.decode(&schema)?;
        debug!(table = %schema.qualified_name(), key = %key, "begin partition");
        self.partition = Some(PartitionContext {
            schema,
            key,
            key_values,
        });
        self.stats.partitions_processed += 1;
        Ok(())
    }

    pub fn end_partition(&mut self) -> Result<(), ConvertError> {
        if let Some(range) = self.chain.finish_partition()? {
            self.delete_row(range)?;
        }
        self.finish()
    }

    pub fn delete_partition(&mut self, deletion: DeletionTime) -> Result<(), ConvertError> {
        self.set_op(OpKind::Delete, Some(deletion.marked_for_delete_at), None)?;
        self.finish()?;
        self.stats.partition_deletes += 1;
        Ok(())
    }

    pub fn process_row(&mut self, row: Row) -> Result<(), ConvertError> {
        self.stats.rows_processed += 1;
        self.row = Some(RowContext {
            clustering: row.clustering.clone(),
            liveness_timestamp: row.liveness.timestamp,
        });
        let result = self.process_row_body(row);
        self.row = None;
        result
    }

    fn process_row_body(&mut self, row: Row) -> Result<(), ConvertError> {
        let schema = self.schema()?;
        let row_deletion = row.effective_deletion();
        let Row {
            clustering,
            liveness,
            columns,
            ..
        } = row;

        let mut deleted_by_chain = false;
        if let Some(clustering) = &clustering {
            let link = match row_deletion {
                Some(deletion) if !self.chain.is_idle() => {
                    let cmp = ClusteringComparator::new(&schema);
                    self.chain.link_row_delete(clustering, deletion, &cmp)?
                }
                _ => None,
            };
            match link {
                Some(link) => {
                    if let Some(range) = link.emitted {
                        self.delete_row(range)?;
                    }
                    deleted_by_chain = !link.needs_own_delete;
                }
                None => {
                    if let Some(range) = self.chain.flush_closed() {
                        self.delete_row(range)?;
                    }
                }
            }
        }

        self.update_timestamp(liveness.timestamp)?;
        self.update_ttl(liveness.ttl)?;
        let has_columns = !columns.is_empty();
        for data in columns {
            self.process_column_data(&schema, data)?;
        }

        match row_deletion {
            Some(deletion) if !deleted_by_chain => {
                if self.pending.has_ops() {
                    self.finish()?;
                }
                self.set_op(OpKind::Delete, Some(deletion.marked_for_delete_at), None)?;
                self.stats.rows_deleted += 1;
            }
            Some(_) => {}
            None => {
                let is_static = clustering.is_none();
                if !has_columns && Self::wants_row_marker(&schema, is_static, &liveness) {
                    self.pending.set_kind(OpKind::Insert);
                }
            }
        }
        self.finish()
    }

    // Empty regular rows still exist through their liveness info.
    fn wants_row_marker(schema: &TableSchema, is_static: bool, liveness: &LivenessInfo) -> bool {
        !is_static && !schema.is_counter() && !liveness.is_empty()
    }

    pub fn process_marker(&mut self, marker: RangeTombstoneMarker) -> Result<(), ConvertError> {
        let schema = self.schema()?;
        let cmp = ClusteringComparator::new(&schema);
        if let Some(range) = self.chain.feed(marker, &cmp)? {
            self.delete_row(range)?;
        }
        Ok(())
    }

    fn process_column_data(
        &mut self,
        schema: &TableSchema,
        data: ColumnData,
    ) -> Result<(), ConvertError> {
        match data {
            ColumnData::Simple(cell) => {
                let (ordinal, column) = schema.resolve(&cell.column)?;
                self.process_cell(ordinal, column, cell)
            }
            ColumnData::Complex(complex) => {
                let (ordinal, column) = schema.resolve(&complex.column)?;
                // Each collection column starts its own statement.
                self.finish()?;
                if let Some(deletion) = complex.deletion {
                    self.delete_column(ordinal, deletion)?;
                }
                for cell in complex.cells {
                    self.process_cell(ordinal, column, cell)?;
                }
                Ok(())
            }
        }
    }

    pub fn process_cell(
        &mut self,
        ordinal: usize,
        column: &ColumnDef,
        cell: Cell,
    ) -> Result<(), ConvertError> {
        trace!(column = %column.name, timestamp = cell.timestamp, live = cell.is_live(), "cell");
        if column.kind() == ColumnKind::Counter && cell.is_live() {
            self.finish()?;
        }
        let op = ops::decode_cell(
            column,
            &cell,
            self.config.ignore_dropped_counter_data,
            &mut self.stats,
        )?;
        let forbids_ttl = op.forbids_ttl();
        self.update_column(ordinal, op, cell.timestamp, cell.ttl)?;
        if forbids_ttl {
            self.pending.forbid_ttl();
        }
        Ok(())
    }

    pub fn update_column(
        &mut self,
        ordinal: usize,
        op: ColumnOp,
        timestamp: i64,
        ttl: Option<Ttl>,
    ) -> Result<(), ConvertError> {
        let kind = if op.can_do_insert() && self.can_do_insert(timestamp) {
            OpKind::Insert
        } else {
            OpKind::Update
        };
        self.set_op(kind, Some(timestamp), ttl)?;
        self.pending.push(ordinal, op);
        Ok(())
    }

    // An INSERT also writes the row marker, so the cell must share the
    // row's liveness timestamp.
    fn can_do_insert(&self, timestamp: i64) -> bool {
        self.pending.kind() != OpKind::Update
            && self
                .row
                .as_ref()
                .is_some_and(|row| row.liveness_timestamp == Some(timestamp))
    }

    /// Collection-wide deletion of one column of the current row.
    pub fn delete_column(
        &mut self,
        ordinal: usize,
        deletion: DeletionTime,
    ) -> Result<(), ConvertError> {
        self.set_op(OpKind::Delete, Some(deletion.marked_for_delete_at), None)?;
        self.pending.push(ordinal, ColumnOp::ClearCollection);
        Ok(())
    }

    pub fn delete_row(&mut self, range: DeleteRange) -> Result<(), ConvertError> {
        let schema = self.schema()?;
        if self.pending.has_ops() {
            self.finish()?;
        }
        debug!(start = %range.start, end = %range.end, timestamp = range.timestamp, "range delete");
        self.set_op(OpKind::Delete, Some(range.timestamp), None)?;
        let clustering = ClusteringWhere::new(&schema, &range.start, &range.end)?;
        self.pending.set_clustering(clustering)?;
        self.finish()?;
        self.stats.rows_deleted += 1;
        Ok(())
    }

    pub fn set_op(
        &mut self,
        kind: OpKind,
        timestamp: Option<i64>,
        ttl: Option<Ttl>,
    ) -> Result<(), ConvertError> {
        if let Some(trigger) = self.pending.kind_trigger(kind) {
            self.flush(trigger)?;
        }
        self.update_timestamp(timestamp)?;
        self.update_ttl(ttl)?;
        self.pending.set_kind(kind);
        Ok(())
    }

    fn update_timestamp(&mut self, timestamp: Option<i64>) -> Result<(), ConvertError> {
        if let Some(trigger) = self.pending.timestamp_trigger(timestamp) {
            self.flush(trigger)?;
        }
        self.pending.set_timestamp(timestamp);
        Ok(())
    }

    fn update_ttl(&mut self, ttl: Option<Ttl>) -> Result<(), ConvertError> {
        if let Some(trigger) = self.pending.ttl_trigger(ttl) {
            self.flush(trigger)?;
        }
        self.pending.set_ttl(ttl);
        Ok(())
    }

    fn flush(&mut self, trigger: FlushTrigger) -> Result<(), ConvertError> {
        trace!(trigger = trigger.as_str(), "flush");
        self.finish()
    }

    /// Renders and submits the pending statement, if any, and clears it.
    pub fn finish(&mut self) -> Result<(), ConvertError> {
        if self.pending.kind() == OpKind::None {
            self.pending.clear();
            return Ok(());
        }
        let Some(partition) = self.partition.as_ref() else {
            self.pending.clear();
            return Err(ConvertError::invariant("statement flushed outside a partition"));
        };
        if self.pending.clustering().is_none()
            && let Some(RowContext {
                clustering: Some(clustering),
                ..
            }) = &self.row
        {
            let point = ClusteringWhere::point(&partition.schema, clustering);
            match point {
                Ok(point) => self.pending.set_clustering(point)?,
                Err(err) => {
                    self.pending.clear();
                    return Err(err);
                }
            }
        }

        let ctx = RenderContext {
            schema: &partition.schema,
            config: self.config,
            now_micros: self.clock.now_micros(),
            partition_key: &partition.key_values,
        };
        let rendered = render::render(&self.pending, &ctx);
        self.pending.clear();
        self.sink.submit(&partition.key, rendered?)?;
        self.stats.statements_generated += 1;
        Ok(())
    }

    fn schema(&self) -> Result<Arc<TableSchema>, ConvertError> {
        self.partition
            .as_ref()
            .map(|p| Arc::clone(&p.schema))
            .ok_or_else(|| ConvertError::invariant("row processed outside a partition"))
    }
}

#[cfg(test)]
mod tests {
    use super::{OpKind, RowBuilder};
    use crate::config::{Clock, ConverterConfig};
    use crate::schema::TableSchema;
    use crate::schema::types::{CqlType, Value};
    use crate::sink::{MemorySink, StatementKind};
    use crate::sstable::clustering::Clustering;
    use crate::sstable::key::PartitionKey;
    use crate::sstable::row::{Cell, DeletionTime, LivenessInfo, Row, Ttl};
    use std::sync::Arc;

    fn schema() -> Arc<TableSchema> {
        Arc::new(
            TableSchema::builder("ks", "t")
                .partition_key("k", CqlType::Int)
                .clustering("c", CqlType::Int)
                .column("a", CqlType::Int)
                .column("b", CqlType::Int)
                .build()
                .expect("schema"),
        )
    }

    fn row(c: i32) -> Row {
        Row::new(Clustering::from_values(&[Value::Int(c)]))
    }

    fn int(column: &str, v: i32, ts: i64) -> Cell {
        Cell::live(column, Value::Int(v).to_bytes(), ts)
    }

    fn run(rows: Vec<Row>) -> MemorySink {
        let config = ConverterConfig::default();
        let mut sink = MemorySink::new();
        let mut builder = RowBuilder::new(&config, Clock::Fixed(0), &mut sink);
        builder
            .begin_partition(PartitionKey::from_values(&[Value::Int(1)]), schema())
            .expect("begin");
        for row in rows {
            builder.process_row(row).expect("row");
            assert_eq!(builder.pending().kind(), OpKind::None);
        }
        builder.end_partition().expect("end");
        sink
    }

    #[test]
    fn cells_matching_row_liveness_become_one_insert() {
        let sink = run(vec![
            row(5)
                .with_liveness(LivenessInfo::new(10))
                .with_cell(int("a", 1, 10))
                .with_cell(int("b", 2, 10)),
        ]);
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.statements()[0].1.kind, StatementKind::Insert);
    }

    #[test]
    fn timestamp_changes_split_statements() {
        let sink = run(vec![
            row(5)
                .with_liveness(LivenessInfo::new(10))
                .with_cell(int("a", 1, 10))
                .with_cell(int("b", 2, 11)),
        ]);
        let kinds: Vec<StatementKind> = sink.statements().iter().map(|(_, s)| s.kind).collect();
        assert_eq!(kinds, vec![StatementKind::Insert, StatementKind::Update]);
        assert_eq!(sink.statements()[1].1.timestamp, Some(11));
    }

    #[test]
    fn ttl_changes_split_statements() {
        let sink = run(vec![
            row(5)
                .with_cell(int("a", 1, 10).with_ttl(Ttl::Seconds(100)))
                .with_cell(int("b", 2, 10)),
        ]);
        assert_eq!(sink.len(), 2);
        assert!(sink.statements()[0].1.cql.contains("TTL :ttl"));
        assert!(!sink.statements()[1].1.cql.contains("TTL"));
    }

    #[test]
    fn cells_without_row_liveness_are_updates() {
        let sink = run(vec![row(5).with_cell(int("a", 1, 10))]);
        assert_eq!(sink.statements()[0].1.kind, StatementKind::Update);
    }

    #[test]
    fn empty_live_rows_insert_a_row_marker() {
        let sink = run(vec![row(5).with_liveness(LivenessInfo::new(10))]);
        assert_eq!(
            sink.cql(),
            vec![
                "INSERT INTO \"ks\".\"t\" (\"k\", \"c\") VALUES (:v0, :v1) USING TIMESTAMP :timestamp;"
            ]
        );
    }

    #[test]
    fn deleted_rows_flush_cells_then_delete() {
        let sink = run(vec![
            row(5)
                .with_deletion(DeletionTime::at(20))
                .with_cell(int("a", 1, 25)),
        ]);
        let kinds: Vec<StatementKind> = sink.statements().iter().map(|(_, s)| s.kind).collect();
        assert_eq!(kinds, vec![StatementKind::Update, StatementKind::Delete]);
        assert_eq!(sink.statements()[1].1.timestamp, Some(20));
    }

    #[test]
    fn statements_outside_a_partition_are_invariant_violations() {
        let config = ConverterConfig::default();
        let mut sink = MemorySink::new();
        let mut builder = RowBuilder::new(&config, Clock::Fixed(0), &mut sink);
        let err = builder.process_row(row(1).with_cell(int("a", 1, 1))).expect_err("no partition");
        assert_eq!(err.code_str(), "invariant_violation");
        assert_eq!(builder.statistics().rows_processed, 1);
    }
}
