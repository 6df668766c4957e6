use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub partitions_processed: u64,
    pub rows_processed: u64,
    pub rows_deleted: u64,
    pub partition_deletes: u64,
    pub statements_generated: u64,
    pub local_counters_skipped: u64,
    pub remote_counters_skipped: u64,
}

impl Statistics {
    pub fn merge(&mut self, other: &Statistics) {
        self.partitions_processed += other.partitions_processed;
        self.rows_processed += other.rows_processed;
        self.rows_deleted += other.rows_deleted;
        self.partition_deletes += other.partition_deletes;
        self.statements_generated += other.statements_generated;
        self.local_counters_skipped += other.local_counters_skipped;
        self.remote_counters_skipped += other.remote_counters_skipped;
    }

    pub fn counters_skipped(&self) -> u64 {
        self.local_counters_skipped + self.remote_counters_skipped
    }
}

impl AddAssign for Statistics {
    fn add_assign(&mut self, other: Statistics) {
        self.merge(&other);
    }
}

impl Add for Statistics {
    type Output = Statistics;

    fn add(mut self, other: Statistics) -> Statistics {
        self.merge(&other);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::Statistics;

    #[test]
    fn merge_sums_every_field() {
        let a = Statistics {
            partitions_processed: 1,
            rows_processed: 2,
            rows_deleted: 3,
            partition_deletes: 4,
            statements_generated: 5,
            local_counters_skipped: 6,
            remote_counters_skipped: 7,
        };
        let mut total = a + a;
        assert_eq!(total.statements_generated, 10);
        total += Statistics::default();
        assert_eq!(total.remote_counters_skipped, 14);
        assert_eq!(total.counters_skipped(), 26);
    }
}
