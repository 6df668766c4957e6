pub mod types;

use crate::error::ConvertError;
use crate::schema::types::CqlType;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Scalar,
    Map,
    List,
    Set,
    Counter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    PartitionKey,
    Clustering,
    Static,
    Regular,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClusteringOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub cql_type: CqlType,
    pub role: ColumnRole,
    pub order: ClusteringOrder,
}

impl ColumnDef {
    pub fn kind(&self) -> ColumnKind {
        match &self.cql_type {
            CqlType::Map(_, _) => ColumnKind::Map,
            CqlType::List(_) => ColumnKind::List,
            CqlType::Set(_) => ColumnKind::Set,
            CqlType::Counter => ColumnKind::Counter,
            _ => ColumnKind::Scalar,
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(
            self.kind(),
            ColumnKind::Map | ColumnKind::List | ColumnKind::Set
        )
    }

    pub fn is_static(&self) -> bool {
        self.role == ColumnRole::Static
    }
}

/// Immutable description of one table. Columns are addressed by ordinal:
/// partition key, then clustering, then static, then regular columns, each
/// group in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub keyspace: String,
    pub table: String,
    columns: Vec<ColumnDef>,
    by_name: HashMap<String, usize>,
    partition_key_len: usize,
    clustering_len: usize,
    counter: bool,
}

impl TableSchema {
    pub fn builder(keyspace: impl Into<String>, table: impl Into<String>) -> TableSchemaBuilder {
        TableSchemaBuilder {
            keyspace: keyspace.into(),
            table: table.into(),
            partition_key: Vec::new(),
            clustering: Vec::new(),
            statics: Vec::new(),
            regular: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn column(&self, ordinal: usize) -> Option<&ColumnDef> {
        self.columns.get(ordinal)
    }

    pub fn ordinal_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn resolve(&self, name: &str) -> Result<(usize, &ColumnDef), ConvertError> {
        self.ordinal_of(name)
            .and_then(|ordinal| self.columns.get(ordinal).map(|c| (ordinal, c)))
            .ok_or_else(|| ConvertError::UnknownColumn {
                table: self.qualified_name(),
                column: name.to_string(),
            })
    }

    pub fn partition_key_columns(&self) -> &[ColumnDef] {
        &self.columns[..self.partition_key_len]
    }

    pub fn clustering_columns(&self) -> &[ColumnDef] {
        &self.columns[self.partition_key_len..self.partition_key_len + self.clustering_len]
    }

    /// Ordinal of the clustering column at `position` in the clustering key.
    pub fn clustering_ordinal(&self, position: usize) -> usize {
        self.partition_key_len + position
    }

    pub fn is_counter(&self) -> bool {
        self.counter
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.keyspace, self.table)
    }
}

#[derive(Debug, Clone)]
pub struct TableSchemaBuilder {
    keyspace: String,
    table: String,
    partition_key: Vec<ColumnDef>,
    clustering: Vec<ColumnDef>,
    statics: Vec<ColumnDef>,
    regular: Vec<ColumnDef>,
}

fn column(name: impl Into<String>, cql_type: CqlType, role: ColumnRole) -> ColumnDef {
    ColumnDef {
        name: name.into(),
        cql_type,
        role,
        order: ClusteringOrder::Asc,
    }
}

impl TableSchemaBuilder {
    pub fn partition_key(mut self, name: impl Into<String>, cql_type: CqlType) -> Self {
        self.partition_key
            .push(column(name, cql_type, ColumnRole::PartitionKey));
        self
    }

    pub fn clustering(mut self, name: impl Into<String>, cql_type: CqlType) -> Self {
        self.clustering
            .push(column(name, cql_type, ColumnRole::Clustering));
        self
    }

    pub fn clustering_desc(mut self, name: impl Into<String>, cql_type: CqlType) -> Self {
        let mut def = column(name, cql_type, ColumnRole::Clustering);
        def.order = ClusteringOrder::Desc;
        self.clustering.push(def);
        self
    }

    pub fn static_column(mut self, name: impl Into<String>, cql_type: CqlType) -> Self {
        self.statics.push(column(name, cql_type, ColumnRole::Static));
        self
    }

    pub fn column(mut self, name: impl Into<String>, cql_type: CqlType) -> Self {
        self.regular
            .push(column(name, cql_type, ColumnRole::Regular));
        self
    }

    pub fn build(self) -> Result<TableSchema, ConvertError> {
        let invalid = |message: String| ConvertError::InvalidSchema { message };
        let qualified = format!("{}.{}", self.keyspace, self.table);
        if self.partition_key.is_empty() {
            return Err(invalid(format!("{qualified}: no partition key columns")));
        }
        for key in self.partition_key.iter().chain(&self.clustering) {
            if key.cql_type.is_multi_cell() || key.cql_type.is_counter() {
                return Err(invalid(format!(
                    "{qualified}: key column '{}' cannot be of type {}",
                    key.name, key.cql_type
                )));
            }
        }

        let value_columns = self.statics.iter().chain(&self.regular);
        let counters = value_columns.clone().filter(|c| c.cql_type.is_counter()).count();
        let counter = counters > 0;
        if counter && counters != value_columns.count() {
            return Err(invalid(format!(
                "{qualified}: counter and non-counter columns cannot be mixed"
            )));
        }

        let partition_key_len = self.partition_key.len();
        let clustering_len = self.clustering.len();
        let columns: Vec<ColumnDef> = self
            .partition_key
            .into_iter()
            .chain(self.clustering)
            .chain(self.statics)
            .chain(self.regular)
            .collect();

        let mut by_name = HashMap::with_capacity(columns.len());
        for (ordinal, def) in columns.iter().enumerate() {
            if by_name.insert(def.name.clone(), ordinal).is_some() {
                return Err(invalid(format!(
                    "{qualified}: duplicate column '{}'",
                    def.name
                )));
            }
        }

        Ok(TableSchema {
            keyspace: self.keyspace,
            table: self.table,
            columns,
            by_name,
            partition_key_len,
            clustering_len,
            counter,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{ClusteringOrder, ColumnKind, TableSchema};
    use crate::schema::types::CqlType;

    #[test]
    fn ordinals_follow_role_then_declaration_order() {
        let schema = TableSchema::builder("ks", "t")
            .column("v", CqlType::Int)
            .static_column("s", CqlType::Text)
            .clustering_desc("c", CqlType::Int)
            .partition_key("k", CqlType::Int)
            .build()
            .expect("schema");

        let names: Vec<&str> = schema.columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["k", "c", "s", "v"]);
        assert_eq!(schema.ordinal_of("v"), Some(3));
        assert_eq!(schema.clustering_columns()[0].order, ClusteringOrder::Desc);
        assert_eq!(schema.clustering_ordinal(0), 1);
        assert!(!schema.is_counter());
    }

    #[test]
    fn column_kind_distinguishes_multi_cell_from_frozen() {
        let schema = TableSchema::builder("ks", "t")
            .partition_key("k", CqlType::Int)
            .column("tags", CqlType::set(CqlType::Text))
            .column("frozen_tags", CqlType::frozen(CqlType::set(CqlType::Text)))
            .build()
            .expect("schema");
        assert_eq!(schema.columns()[1].kind(), ColumnKind::Set);
        assert_eq!(schema.columns()[2].kind(), ColumnKind::Scalar);
    }

    #[test]
    fn counter_tables_cannot_mix_column_types() {
        let counter = TableSchema::builder("ks", "hits")
            .partition_key("k", CqlType::Text)
            .column("n", CqlType::Counter)
            .build()
            .expect("counter schema");
        assert!(counter.is_counter());

        let err = TableSchema::builder("ks", "mixed")
            .partition_key("k", CqlType::Text)
            .column("n", CqlType::Counter)
            .column("label", CqlType::Text)
            .build()
            .expect_err("mixed counter table");
        assert_eq!(err.code_str(), "invalid_schema");
    }

    #[test]
    fn duplicate_and_collection_keys_are_rejected() {
        assert!(
            TableSchema::builder("ks", "t")
                .partition_key("k", CqlType::Int)
                .column("k", CqlType::Int)
                .build()
                .is_err()
        );
        assert!(
            TableSchema::builder("ks", "t")
                .partition_key("k", CqlType::list(CqlType::Int))
                .build()
                .is_err()
        );
        assert!(TableSchema::builder("ks", "t").build().is_err());
    }

    #[test]
    fn unknown_columns_report_the_table() {
        let schema = TableSchema::builder("ks", "t")
            .partition_key("k", CqlType::Int)
            .build()
            .expect("schema");
        let err = schema.resolve("missing").expect_err("unknown");
        assert_eq!(err.to_string(), "unknown column 'missing' in table 'ks.t'");
    }
}
