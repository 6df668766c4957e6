use crate::error::ConvertError;
use crate::schema::types::Value;
use crate::sstable::key::PartitionKey;
use compact_str::CompactString;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatementKind {
    Insert,
    Update,
    Delete,
}

impl StatementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StatementKind::Insert => "INSERT",
            StatementKind::Update => "UPDATE",
            StatementKind::Delete => "DELETE",
        }
    }
}

/// Bind-variable values in first-bound order. A variable named in the
/// statement text but missing here is left unset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundVariables {
    entries: Vec<(CompactString, Value)>,
}

impl BoundVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<CompactString>, value: Value) {
        let name = name.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }
}

impl Serialize for BoundVariables {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name.as_str(), value)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statement {
    pub kind: StatementKind,
    pub cql: String,
    pub variables: BoundVariables,
    /// Write timestamp of the statement, when it has one.
    pub timestamp: Option<i64>,
    pub counter: bool,
}

/// Receives every flushed statement, synchronously and in clustering order.
pub trait StatementSink {
    fn submit(&mut self, key: &PartitionKey, statement: Statement) -> Result<(), ConvertError>;
}

impl<F> StatementSink for F
where
    F: FnMut(&PartitionKey, Statement) -> Result<(), ConvertError>,
{
    fn submit(&mut self, key: &PartitionKey, statement: Statement) -> Result<(), ConvertError> {
        self(key, statement)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    statements: Vec<(PartitionKey, Statement)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn statements(&self) -> &[(PartitionKey, Statement)] {
        &self.statements
    }

    pub fn cql(&self) -> Vec<&str> {
        self.statements.iter().map(|(_, s)| s.cql.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn into_statements(self) -> Vec<(PartitionKey, Statement)> {
        self.statements
    }
}

impl StatementSink for MemorySink {
    fn submit(&mut self, key: &PartitionKey, statement: Statement) -> Result<(), ConvertError> {
        self.statements.push((key.clone(), statement));
        Ok(())
    }
}

#[derive(Serialize)]
struct JsonLine<'a> {
    partition_key: &'a PartitionKey,
    #[serde(flatten)]
    statement: &'a Statement,
}

/// Writes one JSON object per statement, newline separated.
#[derive(Debug)]
pub struct JsonLinesSink<W: Write> {
    writer: W,
    written: u64,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(mut self) -> Result<W, ConvertError> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

impl<W: Write> StatementSink for JsonLinesSink<W> {
    fn submit(&mut self, key: &PartitionKey, statement: Statement) -> Result<(), ConvertError> {
        let line = JsonLine {
            partition_key: key,
            statement: &statement,
        };
        serde_json::to_writer(&mut self.writer, &line)
            .map_err(|e| ConvertError::Encode(e.to_string()))?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{BoundVariables, JsonLinesSink, Statement, StatementKind, StatementSink};
    use crate::error::ConvertError;
    use crate::schema::types::Value;
    use crate::sstable::key::PartitionKey;

    fn statement() -> Statement {
        let mut variables = BoundVariables::new();
        variables.insert("v0", Value::Int(1));
        variables.insert("timestamp", Value::BigInt(7));
        Statement {
            kind: StatementKind::Delete,
            cql: "DELETE FROM \"ks\".\"t\" USING TIMESTAMP :timestamp WHERE \"k\" = :v0;".into(),
            variables,
            timestamp: Some(7),
            counter: false,
        }
    }

    #[test]
    fn bound_variables_replace_in_place() {
        let mut vars = BoundVariables::new();
        vars.insert("a", Value::Int(1));
        vars.insert("b", Value::Int(2));
        vars.insert("a", Value::Int(3));
        let names: Vec<&str> = vars.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(vars.get("a"), Some(&Value::Int(3)));
        assert!(!vars.contains("ttl"));
    }

    #[test]
    fn json_lines_sink_writes_one_object_per_statement() {
        let mut sink = JsonLinesSink::new(Vec::new());
        let key = PartitionKey::from_values(&[Value::Int(1)]);
        sink.submit(&key, statement()).expect("submit");
        sink.submit(&key, statement()).expect("submit");
        assert_eq!(sink.written(), 2);

        let bytes = sink.into_inner().expect("flush");
        let text = String::from_utf8(bytes).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: serde_json::Value = serde_json::from_str(lines[0]).expect("json");
        assert_eq!(parsed["partition_key"], "00000001");
        assert_eq!(parsed["kind"], "DELETE");
        assert_eq!(parsed["timestamp"], 7);
        assert_eq!(parsed["variables"]["timestamp"]["BigInt"], 7);
    }

    #[test]
    fn closures_are_sinks() {
        let mut seen = Vec::new();
        let mut sink = |_: &PartitionKey, statement: Statement| -> Result<(), ConvertError> {
            seen.push(statement.kind);
            Ok(())
        };
        sink.submit(&PartitionKey::default(), statement()).expect("submit");
        assert_eq!(seen, vec![StatementKind::Delete]);
    }
}
