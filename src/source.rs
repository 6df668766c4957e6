use crate::error::ConvertError;
use crate::schema::TableSchema;
use crate::sstable::key::PartitionKey;
use crate::sstable::row::{DeletionTime, Row, Unfiltered};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

pub type UnfilteredIter = Box<dyn Iterator<Item = Result<Unfiltered, ConvertError>>>;

/// One partition as read from storage. Rows and range tombstone markers
/// arrive in clustering order.
pub struct Partition {
    pub schema: Arc<TableSchema>,
    pub key: PartitionKey,
    pub deletion: Option<DeletionTime>,
    pub static_row: Option<Row>,
    pub unfiltered: UnfilteredIter,
}

impl fmt::Debug for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Partition")
            .field("table", &self.schema.qualified_name())
            .field("key", &self.key)
            .field("deletion", &self.deletion)
            .field("static_row", &self.static_row.is_some())
            .finish_non_exhaustive()
    }
}

pub trait EventSource {
    type Scanner: PartitionScanner;

    fn scanner(&self) -> Result<Self::Scanner, ConvertError>;
}

pub trait PartitionScanner {
    fn backing_files(&self) -> Vec<String> {
        Vec::new()
    }

    fn next_partition(&mut self) -> Result<Option<Partition>, ConvertError>;

    fn close(&mut self) -> Result<(), ConvertError>;
}

/// Closes the wrapped scanner exactly once: explicitly through `close`, or on
/// drop when a run is aborted by an error.
pub struct ScannerGuard<S: PartitionScanner> {
    scanner: S,
    closed: bool,
}

impl<S: PartitionScanner> ScannerGuard<S> {
    pub fn new(scanner: S) -> Self {
        Self {
            scanner,
            closed: false,
        }
    }

    pub fn backing_files(&self) -> Vec<String> {
        self.scanner.backing_files()
    }

    pub fn next_partition(&mut self) -> Result<Option<Partition>, ConvertError> {
        self.scanner.next_partition()
    }

    pub fn close(mut self) -> Result<(), ConvertError> {
        self.closed = true;
        self.scanner.close()
    }
}

impl<S: PartitionScanner> Drop for ScannerGuard<S> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(err) = self.scanner.close() {
            warn!(error = %err, "failed to close scanner after aborted run");
        }
    }
}
