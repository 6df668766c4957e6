use sstable2cql::config::Clock;
use sstable2cql::schema::TableSchema;
use sstable2cql::schema::types::{CqlType, Value};
use sstable2cql::sink::{JsonLinesSink, Statement};
use sstable2cql::sstable::{
    Cell, Clustering, DeletionTime, LivenessInfo, MemoryPartition, MemorySource, PartitionKey, Row,
};
use sstable2cql::{ConvertError, SstableToCql};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter};
use std::sync::Arc;

const T: i64 = 1_700_000_000_000_000;

fn source() -> MemorySource {
    let schema = Arc::new(
        TableSchema::builder("ks", "t")
            .partition_key("k", CqlType::Int)
            .clustering("c", CqlType::Int)
            .column("v", CqlType::Int)
            .build()
            .expect("schema"),
    );
    MemorySource::new("sinks")
        .with_partition(
            MemoryPartition::new(schema.clone(), PartitionKey::from_values(&[Value::Int(1)]))
                .with_row(
                    Row::new(Clustering::from_values(&[Value::Int(2)]))
                        .with_liveness(LivenessInfo::new(T))
                        .with_cell(Cell::live("v", Value::Int(7).to_bytes(), T)),
                ),
        )
        .with_partition(
            MemoryPartition::new(schema, PartitionKey::from_values(&[Value::Int(2)]))
                .with_deletion(DeletionTime::at(T + 1)),
        )
}

#[test]
fn json_lines_round_trip_through_a_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("statements.jsonl");
    let file = File::create(&path).expect("create");

    let mut sink = JsonLinesSink::new(BufWriter::new(file));
    let stats = SstableToCql::new(source())
        .with_clock(Clock::Fixed(T))
        .run(&mut sink)
        .expect("run");
    assert_eq!(sink.written(), 2);
    assert_eq!(stats.statements_generated, 2);
    sink.into_inner().expect("flush");

    let reader = BufReader::new(File::open(&path).expect("open"));
    let lines: Vec<serde_json::Value> = reader
        .lines()
        .map(|line| serde_json::from_str(&line.expect("line")).expect("json"))
        .collect();
    assert_eq!(lines.len(), 2);

    let insert = &lines[0];
    assert_eq!(insert["partition_key"], "00000001");
    assert_eq!(insert["kind"], "INSERT");
    assert_eq!(
        insert["cql"],
        "INSERT INTO \"ks\".\"t\" (\"k\", \"c\", \"v\") VALUES (:v0, :v1, :v2) \
         USING TIMESTAMP :timestamp;"
    );
    assert_eq!(insert["variables"]["v2"]["Int"], 7);
    assert_eq!(insert["variables"]["timestamp"]["BigInt"], T);
    assert_eq!(insert["timestamp"], T);
    assert_eq!(insert["counter"], false);

    let delete = &lines[1];
    assert_eq!(delete["partition_key"], "00000002");
    assert_eq!(delete["kind"], "DELETE");
    assert_eq!(delete["timestamp"], T + 1);
}

#[test]
fn closure_sinks_can_stop_a_run() {
    let source = source();
    let probe = source.clone();
    let mut seen = Vec::new();
    let mut sink = |key: &PartitionKey, statement: Statement| -> Result<(), ConvertError> {
        if !seen.is_empty() {
            return Err(ConvertError::Sink("downstream closed".into()));
        }
        seen.push((key.clone(), statement.kind));
        Ok(())
    };

    let err = SstableToCql::new(source)
        .with_clock(Clock::Fixed(T))
        .run(&mut sink)
        .expect_err("sink failure");
    assert_eq!(err.code_str(), "sink");
    assert_eq!(seen.len(), 1);
    assert_eq!(probe.opened_count(), probe.closed_count());
}
