use crate::config::{ConverterConfig, escape_identifier};
use crate::convert::ops::ColumnOp;
use crate::convert::pending::{OpKind, PendingStatement};
use crate::convert::where_clause::Comparator;
use crate::error::ConvertError;
use crate::schema::types::Value;
use crate::schema::{ColumnDef, TableSchema};
use crate::sink::{BoundVariables, Statement, StatementKind};
use crate::sstable::row::Ttl;
use compact_str::{CompactString, format_compact};
use std::collections::HashMap;

pub const TIMESTAMP_VAR: &str = "timestamp";
pub const TTL_VAR: &str = "ttl";
pub const LIST_INDEX_FN: &str = "SCYLLA_TIMEUUID_LIST_INDEX";
pub const COUNTER_SHARD_FN: &str = "SCYLLA_COUNTER_SHARD_LIST";
pub const CLUSTERING_BOUND_FN: &str = "SCYLLA_CLUSTERING_BOUND";

const MICROS_PER_SECOND: i64 = 1_000_000;

pub struct RenderContext<'a> {
    pub schema: &'a TableSchema,
    pub config: &'a ConverterConfig,
    pub now_micros: i64,
    /// Decoded partition key values, in partition key column order.
    pub partition_key: &'a [Value],
}

/// TTL to render for data written at `timestamp`: the lifetime left at
/// `now_micros`, never below 1 second.
pub fn effective_ttl(ttl: Ttl, timestamp: Option<i64>, now_micros: i64) -> i32 {
    let seconds = match ttl {
        Ttl::Expired => return 1,
        Ttl::Seconds(seconds) => i64::from(seconds),
    };
    let remaining = match timestamp {
        Some(written) => {
            let elapsed = now_micros.div_euclid(MICROS_PER_SECOND)
                - written.div_euclid(MICROS_PER_SECOND);
            seconds.saturating_sub(elapsed).min(seconds)
        }
        None => seconds,
    };
    i32::try_from(remaining.max(1)).unwrap_or(i32::MAX)
}

pub fn render(
    pending: &PendingStatement,
    ctx: &RenderContext<'_>,
) -> Result<Statement, ConvertError> {
    let kind = match pending.kind() {
        OpKind::None => return Err(ConvertError::invariant("rendering an empty statement")),
        OpKind::Insert => StatementKind::Insert,
        OpKind::Update => StatementKind::Update,
        OpKind::Delete => StatementKind::Delete,
    };
    let mut writer = StatementWriter::new(ctx, pending);
    match kind {
        StatementKind::Insert => writer.insert()?,
        StatementKind::Update => writer.update()?,
        StatementKind::Delete => writer.delete()?,
    }
    Ok(Statement {
        kind,
        cql: writer.cql,
        variables: writer.variables,
        timestamp: pending.timestamp(),
        counter: ctx.schema.is_counter(),
    })
}

/// Bind names for one render call, keyed by (column ordinal, instance).
#[derive(Debug, Default)]
struct VariableNames {
    names: HashMap<(usize, usize), CompactString>,
}

impl VariableNames {
    fn name(&mut self, ordinal: usize, instance: usize) -> CompactString {
        let next = self.names.len();
        self.names
            .entry((ordinal, instance))
            .or_insert_with(|| format_compact!("v{next}"))
            .clone()
    }
}

struct StatementWriter<'a> {
    ctx: &'a RenderContext<'a>,
    pending: &'a PendingStatement,
    cql: String,
    variables: BoundVariables,
    names: VariableNames,
}

impl<'a> StatementWriter<'a> {
    fn new(ctx: &'a RenderContext<'a>, pending: &'a PendingStatement) -> Self {
        Self {
            ctx,
            pending,
            cql: String::with_capacity(128),
            variables: BoundVariables::new(),
            names: VariableNames::default(),
        }
    }

    fn update(&mut self) -> Result<(), ConvertError> {
        self.cql.push_str("UPDATE ");
        self.table();
        self.using(true);
        self.cql.push_str(" SET ");
        let (pending, config) = (self.pending, self.ctx.config);
        let mut first = true;
        for (ordinal, ops) in pending.ops() {
            let column = self.column(ordinal)?;
            let name = config.column_names.identifier(&column.name);
            for (instance, op) in ops.iter().enumerate() {
                if !first {
                    self.cql.push_str(", ");
                }
                first = false;
                let var = self.names.name(ordinal, instance);
                self.fragment(&name, &var, op, column)?;
            }
        }
        if first {
            return Err(ConvertError::invariant("UPDATE without column operations"));
        }
        self.where_clause()?;
        self.cql.push(';');
        Ok(())
    }

    fn fragment(
        &mut self,
        name: &str,
        var: &str,
        op: &ColumnOp,
        column: &ColumnDef,
    ) -> Result<(), ConvertError> {
        match op {
            ColumnOp::SetScalar(value) => {
                self.variables.insert(var, value.clone());
                self.cql.push_str(&format!("{name} = :{var}"));
            }
            ColumnOp::SetMapEntry { key, value } => {
                self.bind_entry(var, key, value);
                self.cql.push_str(&format!("{name}[:{var}_k] = :{var}_v"));
            }
            ColumnOp::SetListEntry { key, value } => {
                self.bind_entry(var, key, value);
                self.cql.push_str(&format!("{name}[{LIST_INDEX_FN}(:{var}_k)] = :{var}_v"));
            }
            ColumnOp::SetAdd(key) => {
                self.variables.insert(var, Value::Set(vec![key.clone()]));
                self.cql.push_str(&format!("{name} = {name} + :{var}"));
            }
            ColumnOp::SetRemove(key) => {
                self.variables.insert(var, Value::Set(vec![key.clone()]));
                self.cql.push_str(&format!("{name} = {name} - :{var}"));
            }
            ColumnOp::SetCounterShards(shards) => {
                let list = shards.iter().map(|shard| shard.to_value()).collect();
                self.variables.insert(var, Value::List(list));
                self.cql.push_str(&format!("{name} = {COUNTER_SHARD_FN}(:{var})"));
            }
            ColumnOp::ClearCollection => {
                return Err(ConvertError::invariant(format!(
                    "collection deletion of '{}' inside an UPDATE",
                    column.name
                )));
            }
        }
        Ok(())
    }

    fn bind_entry(&mut self, var: &str, key: &Value, value: &Value) {
        self.variables.insert(format_compact!("{var}_k"), key.clone());
        self.variables.insert(format_compact!("{var}_v"), value.clone());
    }

    fn insert(&mut self) -> Result<(), ConvertError> {
        let pending = self.pending;
        let clustering_values = match pending.clustering() {
            None => &[][..],
            Some(clustering) if clustering.is_equal() => clustering.low_values(),
            Some(_) => {
                return Err(ConvertError::invariant(
                    "INSERT with a clustering range restriction",
                ));
            }
        };
        let schema = self.ctx.schema;
        let key_len = schema.partition_key_columns().len();

        let mut ordinals: Vec<usize> = (0..key_len).collect();
        ordinals.extend((0..clustering_values.len()).map(|i| schema.clustering_ordinal(i)));
        let touched: Vec<usize> = pending.ops().map(|(ordinal, _)| ordinal).collect();
        if self.ctx.config.apply_to_all_columns {
            ordinals = (0..schema.columns().len()).collect();
        } else {
            ordinals.extend(touched.iter().copied());
        }

        let mut columns = Vec::with_capacity(ordinals.len());
        let mut vars = Vec::with_capacity(ordinals.len());
        for &ordinal in &ordinals {
            let column = self.column(ordinal)?;
            columns.push(self.ctx.config.column_names.identifier(&column.name).into_owned());
            vars.push(format!(":{}", self.names.name(ordinal, 0)));
        }

        for (i, value) in self.ctx.partition_key.iter().enumerate() {
            let var = self.names.name(i, 0);
            self.variables.insert(var, value.clone());
        }
        for (i, value) in clustering_values.iter().enumerate() {
            let var = self.names.name(schema.clustering_ordinal(i), 0);
            self.variables.insert(var, value.clone());
        }
        for (ordinal, ops) in pending.ops() {
            let [ColumnOp::SetScalar(value)] = ops else {
                let column = self.column(ordinal)?;
                return Err(ConvertError::invariant(format!(
                    "column '{}' cannot be written by an INSERT",
                    column.name
                )));
            };
            let var = self.names.name(ordinal, 0);
            self.variables.insert(var, value.clone());
        }

        self.cql.push_str("INSERT INTO ");
        self.table();
        self.cql.push_str(&format!(
            " ({}) VALUES ({})",
            columns.join(", "),
            vars.join(", ")
        ));
        self.using(true);
        self.cql.push(';');
        Ok(())
    }

    fn delete(&mut self) -> Result<(), ConvertError> {
        self.cql.push_str("DELETE");
        let (pending, config) = (self.pending, self.ctx.config);
        let mut first = true;
        for (ordinal, ops) in pending.ops() {
            let column = self.column(ordinal)?;
            if ops.iter().any(|op| *op != ColumnOp::ClearCollection) {
                return Err(ConvertError::invariant(format!(
                    "column '{}' has value operations inside a DELETE",
                    column.name
                )));
            }
            self.cql.push_str(if first { " " } else { ", " });
            first = false;
            self.cql.push_str(&config.column_names.identifier(&column.name));
        }
        self.cql.push_str(" FROM ");
        self.table();
        self.using(false);
        self.where_clause()?;
        self.cql.push(';');
        Ok(())
    }

    fn table(&mut self) {
        let schema = self.ctx.schema;
        self.cql.push_str(&format!(
            "{}.{}",
            escape_identifier(&schema.keyspace),
            escape_identifier(&schema.table)
        ));
    }

    fn using(&mut self, with_ttl: bool) {
        let mut clauses: Vec<String> = Vec::with_capacity(2);
        if let Some(clause) = self.timestamp_clause() {
            clauses.push(clause);
        }
        if with_ttl && let Some(clause) = self.ttl_clause() {
            clauses.push(clause);
        }
        if !clauses.is_empty() {
            self.cql.push_str(&format!(" USING {}", clauses.join(" AND ")));
        }
    }

    fn timestamp_clause(&mut self) -> Option<String> {
        if self.ctx.schema.is_counter() {
            return None;
        }
        match self.pending.timestamp() {
            Some(timestamp) => {
                self.variables.insert(TIMESTAMP_VAR, Value::BigInt(timestamp));
            }
            None if self.ctx.config.apply_to_all_columns => {}
            None => return None,
        }
        Some(format!("TIMESTAMP :{TIMESTAMP_VAR}"))
    }

    fn ttl_clause(&mut self) -> Option<String> {
        if self.pending.ttl_forbidden() {
            return None;
        }
        match self.pending.ttl() {
            Some(ttl) => {
                let seconds = effective_ttl(ttl, self.pending.timestamp(), self.ctx.now_micros);
                self.variables.insert(TTL_VAR, Value::Int(seconds));
            }
            None if self.ctx.config.apply_to_all_columns => {}
            None => return None,
        }
        Some(format!("TTL :{TTL_VAR}"))
    }

    fn where_clause(&mut self) -> Result<(), ConvertError> {
        let (ctx, pending) = (self.ctx, self.pending);
        self.cql.push_str(" WHERE ");
        for (i, column) in ctx.schema.partition_key_columns().iter().enumerate() {
            let value = ctx.partition_key.get(i).ok_or_else(|| {
                ConvertError::invariant(format!(
                    "no value for partition key column '{}'",
                    column.name
                ))
            })?;
            if i > 0 {
                self.cql.push_str(" AND ");
            }
            let var = self.names.name(i, 0);
            let name = ctx.config.column_names.identifier(&column.name);
            self.cql.push_str(&format!("{name} = :{var}"));
            self.variables.insert(var, value.clone());
        }

        let Some(clustering) = pending.clustering() else {
            return Ok(());
        };
        let sides = [
            (clustering.low_values(), clustering.low()),
            (clustering.high_values(), clustering.high()),
        ];
        for (instance, (values, comparator)) in sides.into_iter().enumerate() {
            if !values.is_empty() {
                self.clustering_clause(instance, values, comparator);
            }
            if comparator == Comparator::Equal {
                break;
            }
        }
        Ok(())
    }

    fn clustering_clause(&mut self, instance: usize, values: &[Value], comparator: Comparator) {
        let schema = self.ctx.schema;
        let mut names = Vec::with_capacity(values.len());
        let mut vars = Vec::with_capacity(values.len());
        for (i, value) in values.iter().enumerate() {
            let ordinal = schema.clustering_ordinal(i);
            let column = &schema.clustering_columns()[i];
            names.push(self.ctx.config.column_names.identifier(&column.name).into_owned());
            let var = self.names.name(ordinal, instance);
            vars.push(format!(":{var}"));
            self.variables.insert(var, value.clone());
        }
        let bound_fn = if comparator == Comparator::Equal {
            ""
        } else {
            CLUSTERING_BOUND_FN
        };
        self.cql.push_str(&format!(
            " AND ({}) {} {bound_fn}({})",
            names.join(", "),
            comparator.as_str(),
            vars.join(", ")
        ));
    }

    fn column(&self, ordinal: usize) -> Result<&'a ColumnDef, ConvertError> {
        self.ctx
            .schema
            .column(ordinal)
            .ok_or_else(|| ConvertError::invariant(format!("no column with ordinal {ordinal}")))
    }
}

#[cfg(test)]
mod tests {
    use super::{RenderContext, effective_ttl, render};
    use crate::config::ConverterConfig;
    use crate::convert::ops::ColumnOp;
    use crate::convert::pending::{OpKind, PendingStatement};
    use crate::convert::where_clause::ClusteringWhere;
    use crate::schema::TableSchema;
    use crate::schema::types::{CqlType, Value};
    use crate::sink::StatementKind;
    use crate::sstable::clustering::{BoundKind, Clustering, ClusteringBound};
    use crate::sstable::row::Ttl;
    use proptest::prelude::*;

    const NOW: i64 = 1_000_000 * 1_000_000;

    fn schema() -> TableSchema {
        TableSchema::builder("ks", "t")
            .partition_key("k", CqlType::Int)
            .clustering("c", CqlType::Int)
            .column("v", CqlType::Int)
            .column("m", CqlType::map(CqlType::Text, CqlType::Int))
            .column("s", CqlType::set(CqlType::Text))
            .build()
            .expect("schema")
    }

    fn ctx<'a>(schema: &'a TableSchema, config: &'a ConverterConfig) -> RenderContext<'a> {
        RenderContext {
            schema,
            config,
            now_micros: NOW,
            partition_key: &[Value::Int(1)],
        }
    }

    fn point(schema: &TableSchema, c: i32) -> ClusteringWhere {
        ClusteringWhere::point(schema, &Clustering::from_values(&[Value::Int(c)])).expect("point")
    }

    #[test]
    fn update_orders_using_before_set() {
        let schema = schema();
        let config = ConverterConfig::default();
        let mut pending = PendingStatement::default();
        pending.set_kind(OpKind::Update);
        pending.set_timestamp(Some(NOW));
        pending.set_ttl(Some(Ttl::Seconds(60)));
        pending.set_clustering(point(&schema, 5)).expect("where");
        pending.push(2, ColumnOp::SetScalar(Value::Null));
        pending.push(
            3,
            ColumnOp::SetMapEntry {
                key: Value::text("a"),
                value: Value::Int(4),
            },
        );

        let statement = render(&pending, &ctx(&schema, &config)).expect("render");
        assert_eq!(statement.kind, StatementKind::Update);
        assert_eq!(
            statement.cql,
            "UPDATE \"ks\".\"t\" USING TIMESTAMP :timestamp AND TTL :ttl \
             SET \"v\" = :v0, \"m\"[:v1_k] = :v1_v WHERE \"k\" = :v2 AND (\"c\") = (:v3);"
        );
        assert_eq!(statement.variables.get("ttl"), Some(&Value::Int(60)));
        assert_eq!(statement.variables.get("v1_k"), Some(&Value::text("a")));
        assert_eq!(statement.variables.get("v3"), Some(&Value::Int(5)));
        assert_eq!(statement.timestamp, Some(NOW));
    }

    #[test]
    fn insert_lists_key_and_touched_columns() {
        let schema = schema();
        let config = ConverterConfig::default();
        let mut pending = PendingStatement::default();
        pending.set_kind(OpKind::Insert);
        pending.set_timestamp(Some(7));
        pending.set_clustering(point(&schema, 5)).expect("where");
        pending.push(2, ColumnOp::SetScalar(Value::Int(10)));

        let statement = render(&pending, &ctx(&schema, &config)).expect("render");
        assert_eq!(
            statement.cql,
            "INSERT INTO \"ks\".\"t\" (\"k\", \"c\", \"v\") VALUES (:v0, :v1, :v2) \
             USING TIMESTAMP :timestamp;"
        );
        assert_eq!(statement.variables.get("v2"), Some(&Value::Int(10)));
        assert!(!statement.variables.contains("ttl"));
    }

    #[test]
    fn full_row_inserts_list_every_column_and_leave_unset_clauses_unbound() {
        let schema = schema();
        let config = ConverterConfig::snapshot_export();
        let mut pending = PendingStatement::default();
        pending.set_kind(OpKind::Insert);
        pending.set_timestamp(Some(7));
        pending.set_clustering(point(&schema, 5)).expect("where");
        pending.push(2, ColumnOp::SetScalar(Value::Int(10)));

        let statement = render(&pending, &ctx(&schema, &config)).expect("render");
        assert_eq!(
            statement.cql,
            "INSERT INTO \"ks\".\"t\" (\"k\", \"c\", \"v\", \"m\", \"s\") \
             VALUES (:v0, :v1, :v2, :v3, :v4) USING TIMESTAMP :timestamp AND TTL :ttl;"
        );
        assert!(!statement.variables.contains("ttl"));
        assert!(!statement.variables.contains("v3"));
    }

    #[test]
    fn ranges_render_bound_functions_per_side() {
        let schema = schema();
        let config = ConverterConfig::default();
        let mut pending = PendingStatement::default();
        pending.set_kind(OpKind::Delete);
        pending.set_timestamp(Some(9));
        let range = ClusteringWhere::new(
            &schema,
            &ClusteringBound::from_values(BoundKind::InclStart, &[Value::Int(2)]),
            &ClusteringBound::from_values(BoundKind::ExclEnd, &[Value::Int(8)]),
        )
        .expect("range");
        pending.set_clustering(range).expect("where");

        let statement = render(&pending, &ctx(&schema, &config)).expect("render");
        assert_eq!(
            statement.cql,
            "DELETE FROM \"ks\".\"t\" USING TIMESTAMP :timestamp WHERE \"k\" = :v0 \
             AND (\"c\") >= SCYLLA_CLUSTERING_BOUND(:v1) AND (\"c\") < SCYLLA_CLUSTERING_BOUND(:v2);"
        );
        assert_eq!(statement.variables.get("v1"), Some(&Value::Int(2)));
        assert_eq!(statement.variables.get("v2"), Some(&Value::Int(8)));
    }

    #[test]
    fn collection_deletes_name_their_columns() {
        let schema = schema();
        let config = ConverterConfig::default().with_column_name("s", "tags");
        let mut pending = PendingStatement::default();
        pending.set_kind(OpKind::Delete);
        pending.set_timestamp(Some(9));
        pending.set_clustering(point(&schema, 1)).expect("where");
        pending.push(4, ColumnOp::ClearCollection);

        let statement = render(&pending, &ctx(&schema, &config)).expect("render");
        assert_eq!(
            statement.cql,
            "DELETE tags FROM \"ks\".\"t\" USING TIMESTAMP :timestamp WHERE \"k\" = :v0 \
             AND (\"c\") = (:v1);"
        );
    }

    #[test]
    fn set_fragments_reference_the_mapped_column() {
        let schema = schema();
        let config = ConverterConfig::default().with_column_name("s", "tags");
        let mut pending = PendingStatement::default();
        pending.set_kind(OpKind::Update);
        pending.push(4, ColumnOp::SetRemove(Value::text("x")));
        pending.push(4, ColumnOp::SetAdd(Value::text("y")));

        let statement = render(&pending, &ctx(&schema, &config)).expect("render");
        assert_eq!(
            statement.cql,
            "UPDATE \"ks\".\"t\" SET tags = tags - :v0, tags = tags + :v1 WHERE \"k\" = :v2;"
        );
        assert_eq!(
            statement.variables.get("v1"),
            Some(&Value::Set(vec![Value::text("y")]))
        );
    }

    #[test]
    fn inserts_reject_range_restrictions_and_collection_ops() {
        let schema = schema();
        let config = ConverterConfig::default();
        let mut pending = PendingStatement::default();
        pending.set_kind(OpKind::Insert);
        pending.push(4, ColumnOp::SetAdd(Value::text("x")));
        let err = render(&pending, &ctx(&schema, &config)).expect_err("set add in insert");
        assert_eq!(err.code_str(), "invariant_violation");

        assert!(render(&PendingStatement::default(), &ctx(&schema, &config)).is_err());
    }

    #[test]
    fn expired_and_elapsed_ttls_clamp_to_one() {
        assert_eq!(effective_ttl(Ttl::Expired, Some(NOW), NOW), 1);
        assert_eq!(effective_ttl(Ttl::Seconds(60), Some(NOW - 120 * 1_000_000), NOW), 1);
        assert_eq!(effective_ttl(Ttl::Seconds(60), Some(NOW - 20 * 1_000_000), NOW), 40);
        assert_eq!(effective_ttl(Ttl::Seconds(60), Some(NOW + 20 * 1_000_000), NOW), 60);
        assert_eq!(effective_ttl(Ttl::Seconds(60), None, NOW), 60);
    }

    proptest! {
        #[test]
        fn rendered_ttl_is_positive_and_bounded(
            ttl in 0u32..=u32::MAX,
            written in any::<i64>(),
            now in any::<i64>(),
        ) {
            let rendered = effective_ttl(Ttl::Seconds(ttl), Some(written), now);
            prop_assert!(rendered >= 1);
            prop_assert!(i64::from(rendered) <= i64::from(ttl).max(1));
        }
    }
}
