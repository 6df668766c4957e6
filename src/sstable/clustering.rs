use crate::convert::decode_failure;
use crate::error::ConvertError;
use crate::schema::types::Value;
use crate::schema::{ClusteringOrder, ColumnDef, TableSchema};
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::fmt;

pub type ClusteringValues = SmallVec<[Vec<u8>; 4]>;

/// Full clustering key of a row, one serialized value per clustering column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clustering {
    values: ClusteringValues,
}

impl Clustering {
    pub fn new(values: impl IntoIterator<Item = Vec<u8>>) -> Self {
        Self {
            values: values.into_iter().collect(),
        }
    }

    pub fn from_values(values: &[Value]) -> Self {
        Self::new(values.iter().map(Value::to_bytes))
    }

    pub fn values(&self) -> &[Vec<u8>] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundKind {
    InclStart,
    ExclStart,
    InclEnd,
    ExclEnd,
}

impl BoundKind {
    pub fn is_start(self) -> bool {
        matches!(self, BoundKind::InclStart | BoundKind::ExclStart)
    }

    pub fn is_inclusive(self) -> bool {
        matches!(self, BoundKind::InclStart | BoundKind::InclEnd)
    }

    // An exclusive end sorts with an inclusive start at the same prefix, and an
    // inclusive end with an exclusive start; rows sort between the two pairs.
    fn comparison_order(self) -> u8 {
        match self {
            BoundKind::ExclEnd | BoundKind::InclStart => 0,
            BoundKind::InclEnd | BoundKind::ExclStart => 3,
        }
    }

    fn compared_to_clustering(self) -> Ordering {
        match self {
            BoundKind::InclStart | BoundKind::ExclEnd => Ordering::Less,
            BoundKind::InclEnd | BoundKind::ExclStart => Ordering::Greater,
        }
    }
}

/// Range endpoint over a (possibly partial) clustering prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusteringBound {
    kind: BoundKind,
    values: ClusteringValues,
}

impl ClusteringBound {
    pub fn new(kind: BoundKind, values: impl IntoIterator<Item = Vec<u8>>) -> Self {
        Self {
            kind,
            values: values.into_iter().collect(),
        }
    }

    pub fn from_values(kind: BoundKind, values: &[Value]) -> Self {
        Self::new(kind, values.iter().map(Value::to_bytes))
    }

    pub fn bottom() -> Self {
        Self::new(BoundKind::InclStart, [])
    }

    pub fn top() -> Self {
        Self::new(BoundKind::InclEnd, [])
    }

    pub fn inclusive_start_of(clustering: &Clustering) -> Self {
        Self::new(BoundKind::InclStart, clustering.values.iter().cloned())
    }

    pub fn inclusive_end_of(clustering: &Clustering) -> Self {
        Self::new(BoundKind::InclEnd, clustering.values.iter().cloned())
    }

    pub fn exclusive_start_of(clustering: &Clustering) -> Self {
        Self::new(BoundKind::ExclStart, clustering.values.iter().cloned())
    }

    pub fn kind(&self) -> BoundKind {
        self.kind
    }

    pub fn values(&self) -> &[Vec<u8>] {
        &self.values
    }

    pub fn is_start(&self) -> bool {
        self.kind.is_start()
    }

    pub fn is_inclusive(&self) -> bool {
        self.kind.is_inclusive()
    }
}

impl fmt::Display for ClusteringBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let open = match self.kind {
            BoundKind::InclStart => "[",
            BoundKind::ExclStart => "(",
            _ => "",
        };
        let close = match self.kind {
            BoundKind::InclEnd => "]",
            BoundKind::ExclEnd => ")",
            _ => "",
        };
        write!(f, "{open}")?;
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ":")?;
            }
            write!(f, "0x")?;
            for byte in value {
                write!(f, "{byte:02x}")?;
            }
        }
        write!(f, "{close}")
    }
}

/// Orders clustering bounds the way the storage engine does, honoring
/// descending clustering columns.
#[derive(Debug, Clone, Copy)]
pub struct ClusteringComparator<'a> {
    columns: &'a [ColumnDef],
}

impl<'a> ClusteringComparator<'a> {
    pub fn new(schema: &'a TableSchema) -> Self {
        Self {
            columns: schema.clustering_columns(),
        }
    }

    pub fn compare(
        &self,
        a: &ClusteringBound,
        b: &ClusteringBound,
    ) -> Result<Ordering, ConvertError> {
        let common = a.values.len().min(b.values.len());
        for i in 0..common {
            let ord = self.compare_component(i, &a.values[i], &b.values[i])?;
            if ord != Ordering::Equal {
                return Ok(ord);
            }
        }
        Ok(match a.values.len().cmp(&b.values.len()) {
            Ordering::Equal => a
                .kind
                .comparison_order()
                .cmp(&b.kind.comparison_order()),
            Ordering::Less => a.kind.compared_to_clustering(),
            Ordering::Greater => b.kind.compared_to_clustering().reverse(),
        })
    }

    fn compare_component(&self, i: usize, a: &[u8], b: &[u8]) -> Result<Ordering, ConvertError> {
        let column = self.columns.get(i).ok_or_else(|| {
            ConvertError::invariant(format!(
                "clustering prefix has more than {} components",
                self.columns.len()
            ))
        })?;
        let ord = column
            .cql_type
            .compare_bytes(a, b)
            .map_err(|source| decode_failure(&column.name, source))?;
        Ok(match column.order {
            ClusteringOrder::Asc => ord,
            ClusteringOrder::Desc => ord.reverse(),
        })
    }
}
