pub mod clustering;
pub mod counter;
pub mod key;
pub mod memory;
pub mod row;

pub use clustering::{BoundKind, Clustering, ClusteringBound, ClusteringComparator};
pub use counter::{CounterShard, ShardKind};
pub use key::PartitionKey;
pub use memory::{MemoryPartition, MemoryScanner, MemorySource};
pub use row::{
    Cell, ColumnData, ComplexColumn, DeletionTime, LivenessInfo, RangeTombstoneMarker, Row, Ttl,
    Unfiltered,
};
