use crate::sstable::clustering::{Clustering, ClusteringBound};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    Seconds(u32),
    /// The data already outlived its TTL when it was flushed.
    Expired,
}

/// Row-level liveness. `timestamp` is `None` for rows that only exist through
/// their cells or their deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LivenessInfo {
    pub timestamp: Option<i64>,
    pub ttl: Option<Ttl>,
}

impl LivenessInfo {
    pub fn new(timestamp: i64) -> Self {
        Self {
            timestamp: Some(timestamp),
            ttl: None,
        }
    }

    pub fn expiring(timestamp: i64, ttl_seconds: u32) -> Self {
        Self {
            timestamp: Some(timestamp),
            ttl: Some(Ttl::Seconds(ttl_seconds)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.timestamp.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeletionTime {
    pub marked_for_delete_at: i64,
    pub local_deletion_time: i64,
}

impl DeletionTime {
    pub fn new(marked_for_delete_at: i64, local_deletion_time: i64) -> Self {
        Self {
            marked_for_delete_at,
            local_deletion_time,
        }
    }

    pub fn at(marked_for_delete_at: i64) -> Self {
        Self::new(marked_for_delete_at, marked_for_delete_at / 1_000_000)
    }

    pub fn deletes(&self, liveness: &LivenessInfo) -> bool {
        match liveness.timestamp {
            Some(timestamp) => timestamp <= self.marked_for_delete_at,
            None => true,
        }
    }
}

/// One cell. A cell without a value is a tombstone; collection cells carry
/// the serialized element key in `path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub column: String,
    pub path: Option<Vec<u8>>,
    pub value: Option<Vec<u8>>,
    pub timestamp: i64,
    pub ttl: Option<Ttl>,
}

impl Cell {
    pub fn live(column: impl Into<String>, value: Vec<u8>, timestamp: i64) -> Self {
        Self {
            column: column.into(),
            path: None,
            value: Some(value),
            timestamp,
            ttl: None,
        }
    }

    pub fn tombstone(column: impl Into<String>, timestamp: i64) -> Self {
        Self {
            column: column.into(),
            path: None,
            value: None,
            timestamp,
            ttl: None,
        }
    }

    pub fn with_path(mut self, path: Vec<u8>) -> Self {
        self.path = Some(path);
        self
    }

    pub fn with_ttl(mut self, ttl: Ttl) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn is_live(&self) -> bool {
        self.value.is_some()
    }

    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }

    pub fn element_path(&self) -> Option<&[u8]> {
        self.path.as_deref().filter(|path| !path.is_empty())
    }
}

/// All cells of one multi-cell collection column, with an optional
/// collection-wide deletion that shadows older elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplexColumn {
    pub column: String,
    pub deletion: Option<DeletionTime>,
    pub cells: Vec<Cell>,
}

impl ComplexColumn {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            deletion: None,
            cells: Vec::new(),
        }
    }

    pub fn with_deletion(mut self, deletion: DeletionTime) -> Self {
        self.deletion = Some(deletion);
        self
    }

    pub fn with_cell(mut self, cell: Cell) -> Self {
        self.cells.push(cell);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnData {
    Simple(Cell),
    Complex(ComplexColumn),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    /// `None` for the partition's static row.
    pub clustering: Option<Clustering>,
    pub liveness: LivenessInfo,
    pub deletion: Option<DeletionTime>,
    pub columns: Vec<ColumnData>,
}

impl Row {
    pub fn new(clustering: Clustering) -> Self {
        Self {
            clustering: Some(clustering),
            liveness: LivenessInfo::default(),
            deletion: None,
            columns: Vec::new(),
        }
    }

    pub fn static_row() -> Self {
        Self {
            clustering: None,
            liveness: LivenessInfo::default(),
            deletion: None,
            columns: Vec::new(),
        }
    }

    pub fn with_liveness(mut self, liveness: LivenessInfo) -> Self {
        self.liveness = liveness;
        self
    }

    pub fn with_deletion(mut self, deletion: DeletionTime) -> Self {
        self.deletion = Some(deletion);
        self
    }

    pub fn with_cell(mut self, cell: Cell) -> Self {
        self.columns.push(ColumnData::Simple(cell));
        self
    }

    pub fn with_complex(mut self, column: ComplexColumn) -> Self {
        self.columns.push(ColumnData::Complex(column));
        self
    }

    pub fn is_static(&self) -> bool {
        self.clustering.is_none()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() && self.liveness.is_empty() && self.deletion.is_none()
    }

    /// The row deletion, if it shadows the row's own liveness.
    pub fn effective_deletion(&self) -> Option<DeletionTime> {
        self.deletion.filter(|d| d.deletes(&self.liveness))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeTombstoneMarker {
    Bound {
        bound: ClusteringBound,
        deletion: DeletionTime,
    },
    /// Closes one range and opens the next at the same clustering position.
    Boundary {
        close: ClusteringBound,
        open: ClusteringBound,
        close_deletion: DeletionTime,
        open_deletion: DeletionTime,
    },
}

impl RangeTombstoneMarker {
    pub fn open(bound: ClusteringBound, deletion: DeletionTime) -> Self {
        RangeTombstoneMarker::Bound { bound, deletion }
    }

    pub fn close(bound: ClusteringBound, deletion: DeletionTime) -> Self {
        RangeTombstoneMarker::Bound { bound, deletion }
    }

    pub fn boundary(
        close: ClusteringBound,
        open: ClusteringBound,
        close_deletion: DeletionTime,
        open_deletion: DeletionTime,
    ) -> Self {
        RangeTombstoneMarker::Boundary {
            close,
            open,
            close_deletion,
            open_deletion,
        }
    }

    pub fn open_bound(&self) -> Option<&ClusteringBound> {
        match self {
            RangeTombstoneMarker::Bound { bound, .. } if bound.is_start() => Some(bound),
            RangeTombstoneMarker::Bound { .. } => None,
            RangeTombstoneMarker::Boundary { open, .. } => Some(open),
        }
    }

    pub fn close_bound(&self) -> Option<&ClusteringBound> {
        match self {
            RangeTombstoneMarker::Bound { bound, .. } if !bound.is_start() => Some(bound),
            RangeTombstoneMarker::Bound { .. } => None,
            RangeTombstoneMarker::Boundary { close, .. } => Some(close),
        }
    }

    pub fn open_deletion(&self) -> Option<DeletionTime> {
        match self {
            RangeTombstoneMarker::Bound { bound, deletion } if bound.is_start() => Some(*deletion),
            RangeTombstoneMarker::Bound { .. } => None,
            RangeTombstoneMarker::Boundary { open_deletion, .. } => Some(*open_deletion),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unfiltered {
    Row(Row),
    RangeTombstone(RangeTombstoneMarker),
}

impl From<Row> for Unfiltered {
    fn from(row: Row) -> Self {
        Unfiltered::Row(row)
    }
}

impl From<RangeTombstoneMarker> for Unfiltered {
    fn from(marker: RangeTombstoneMarker) -> Self {
        Unfiltered::RangeTombstone(marker)
    }
}
