use crate::error::ConvertError;
use crate::schema::TableSchema;
use crate::source::{EventSource, Partition, PartitionScanner};
use crate::sstable::key::PartitionKey;
use crate::sstable::row::{DeletionTime, RangeTombstoneMarker, Row, Unfiltered};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone)]
pub struct MemoryPartition {
    pub schema: Arc<TableSchema>,
    pub key: PartitionKey,
    pub deletion: Option<DeletionTime>,
    pub static_row: Option<Row>,
    pub unfiltered: Vec<Unfiltered>,
}

impl MemoryPartition {
    pub fn new(schema: Arc<TableSchema>, key: PartitionKey) -> Self {
        Self {
            schema,
            key,
            deletion: None,
            static_row: None,
            unfiltered: Vec::new(),
        }
    }

    pub fn with_deletion(mut self, deletion: DeletionTime) -> Self {
        self.deletion = Some(deletion);
        self
    }

    pub fn with_static_row(mut self, row: Row) -> Self {
        self.static_row = Some(row);
        self
    }

    pub fn with_row(mut self, row: Row) -> Self {
        self.unfiltered.push(Unfiltered::Row(row));
        self
    }

    pub fn with_marker(mut self, marker: RangeTombstoneMarker) -> Self {
        self.unfiltered.push(Unfiltered::RangeTombstone(marker));
        self
    }
}

/// In-memory event source, used for tests, benches and callers that decode
/// sstables elsewhere. Tracks how many scanners were opened and closed.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    name: String,
    partitions: Vec<MemoryPartition>,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn push(&mut self, partition: MemoryPartition) {
        self.partitions.push(partition);
    }

    pub fn with_partition(mut self, partition: MemoryPartition) -> Self {
        self.push(partition);
        self
    }

    pub fn opened_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl EventSource for MemorySource {
    type Scanner = MemoryScanner;

    fn scanner(&self) -> Result<MemoryScanner, ConvertError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryScanner {
            name: self.name.clone(),
            partitions: self.partitions.clone().into_iter(),
            closed: Arc::clone(&self.closed),
        })
    }
}

#[derive(Debug)]
pub struct MemoryScanner {
    name: String,
    partitions: std::vec::IntoIter<MemoryPartition>,
    closed: Arc<AtomicUsize>,
}

impl PartitionScanner for MemoryScanner {
    fn backing_files(&self) -> Vec<String> {
        vec![self.name.clone()]
    }

    fn next_partition(&mut self) -> Result<Option<Partition>, ConvertError> {
        Ok(self.partitions.next().map(|p| Partition {
            schema: p.schema,
            key: p.key,
            deletion: p.deletion,
            static_row: p.static_row,
            unfiltered: Box::new(p.unfiltered.into_iter().map(Ok)),
        }))
    }

    fn close(&mut self) -> Result<(), ConvertError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
