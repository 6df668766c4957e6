pub mod config;
pub mod convert;
pub mod error;
pub mod schema;
pub mod sink;
pub mod source;
pub mod sstable;

pub use crate::config::{Clock, ColumnNameMapping, ConverterConfig};
pub use crate::convert::{RowBuilder, Statistics};
pub use crate::error::{ConvertError, ConvertErrorCode};
pub use crate::schema::TableSchema;
pub use crate::schema::types::{CqlType, Value};
pub use crate::sink::{
    BoundVariables, JsonLinesSink, MemorySink, Statement, StatementKind, StatementSink,
};
pub use crate::source::{EventSource, Partition, PartitionScanner, ScannerGuard};

use tracing::info;

/// Converts every partition of an event source into CQL write statements.
pub struct SstableToCql<E: EventSource> {
    source: E,
    config: ConverterConfig,
    clock: Clock,
}

impl<E: EventSource> SstableToCql<E> {
    pub fn new(source: E) -> Self {
        Self {
            source,
            config: ConverterConfig::default(),
            clock: Clock::System,
        }
    }

    pub fn with_config(mut self, config: ConverterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    /// Drains the source into `sink`. The scanner is closed on every exit
    /// path; on error the statistics are lost along with the partial run.
    pub fn run<S>(self, sink: &mut S) -> Result<Statistics, ConvertError>
    where
        S: StatementSink + ?Sized,
    {
        self.config.validate()?;
        let mut scanner = ScannerGuard::new(self.source.scanner()?);
        info!(
            files = ?scanner.backing_files(),
            apply_to_all_columns = self.config.apply_to_all_columns,
            ignore_dropped_counter_data = self.config.ignore_dropped_counter_data,
            "converting sstables"
        );

        let mut builder = RowBuilder::new(&self.config, self.clock, sink);
        while let Some(partition) = scanner.next_partition()? {
            builder.process_partition(partition)?;
        }
        let stats = builder.into_statistics();
        scanner.close()?;

        info!(
            partitions = stats.partitions_processed,
            rows = stats.rows_processed,
            rows_deleted = stats.rows_deleted,
            partition_deletes = stats.partition_deletes,
            statements = stats.statements_generated,
            counters_skipped = stats.counters_skipped(),
            "conversion finished"
        );
        Ok(stats)
    }
}
