use crate::convert::decode_failure;
use crate::error::ConvertError;
use crate::schema::TableSchema;
use crate::schema::types::Value;
use crate::sstable::clustering::{Clustering, ClusteringBound};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Equal,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
}

impl Comparator {
    pub fn as_str(self) -> &'static str {
        match self {
            Comparator::Equal => "=",
            Comparator::Greater => ">",
            Comparator::GreaterEqual => ">=",
            Comparator::Less => "<",
            Comparator::LessEqual => "<=",
        }
    }
}

/// Clustering restriction of a statement: a low and a high side, each over a
/// clustering-column prefix. A point restriction collapses both sides to
/// `Equal` and is rendered once.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusteringWhere {
    low_values: Vec<Value>,
    high_values: Vec<Value>,
    low: Comparator,
    high: Comparator,
}

impl ClusteringWhere {
    pub fn new(
        schema: &TableSchema,
        start: &ClusteringBound,
        end: &ClusteringBound,
    ) -> Result<Self, ConvertError> {
        let low_values = decode_prefix(schema, start.values())?;
        let high_values = decode_prefix(schema, end.values())?;
        let (low, high) =
            if start.is_inclusive() && end.is_inclusive() && low_values == high_values {
                (Comparator::Equal, Comparator::Equal)
            } else {
                (
                    if start.is_inclusive() {
                        Comparator::GreaterEqual
                    } else {
                        Comparator::Greater
                    },
                    if end.is_inclusive() {
                        Comparator::LessEqual
                    } else {
                        Comparator::Less
                    },
                )
            };
        Ok(Self {
            low_values,
            high_values,
            low,
            high,
        })
    }

    /// Restriction to exactly one row.
    pub fn point(schema: &TableSchema, clustering: &Clustering) -> Result<Self, ConvertError> {
        Self::new(
            schema,
            &ClusteringBound::inclusive_start_of(clustering),
            &ClusteringBound::inclusive_end_of(clustering),
        )
    }

    pub fn low(&self) -> Comparator {
        self.low
    }

    pub fn high(&self) -> Comparator {
        self.high
    }

    pub fn low_values(&self) -> &[Value] {
        &self.low_values
    }

    pub fn high_values(&self) -> &[Value] {
        &self.high_values
    }

    pub fn is_equal(&self) -> bool {
        self.low == Comparator::Equal
    }

    /// True when neither side restricts anything (full partition range).
    pub fn is_unbounded(&self) -> bool {
        self.low_values.is_empty() && self.high_values.is_empty()
    }
}

fn decode_prefix(schema: &TableSchema, raw: &[Vec<u8>]) -> Result<Vec<Value>, ConvertError> {
    let columns = schema.clustering_columns();
    if raw.len() > columns.len() {
        return Err(ConvertError::invariant(format!(
            "clustering prefix of {} values for {} clustering columns",
            raw.len(),
            columns.len()
        )));
    }
    columns
        .iter()
        .zip(raw)
        .map(|(column, bytes)| {
            column
                .cql_type
                .decode(bytes)
                .map_err(|source| decode_failure(&column.name, source))
        })
        .collect()
}
