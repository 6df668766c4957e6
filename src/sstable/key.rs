use crate::convert::decode_failure;
use crate::error::ConvertError;
use crate::schema::TableSchema;
use crate::schema::types::{DecodeError, Value};
use serde::{Serialize, Serializer};
use std::fmt;

/// Raw partition key. Multi-column keys use the composite layout
/// `<u16 length><bytes><end-of-component byte>` per component.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartitionKey {
    bytes: Vec<u8>,
}

impl PartitionKey {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn from_values(values: &[Value]) -> Self {
        if let [single] = values {
            return Self::from_bytes(single.to_bytes());
        }
        let mut out = Vec::new();
        for value in values {
            let bytes = value.to_bytes();
            let len = u16::try_from(bytes.len()).unwrap_or(u16::MAX);
            out.extend_from_slice(&len.to_be_bytes());
            out.extend_from_slice(&bytes[..usize::from(len)]);
            out.push(0);
        }
        Self { bytes: out }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(self.bytes.len() * 2);
        for byte in &self.bytes {
            out.push_str(&format!("{byte:02x}"));
        }
        out
    }

    pub fn components(&self, count: usize) -> Result<Vec<&[u8]>, DecodeError> {
        if count == 1 {
            return Ok(vec![self.bytes.as_slice()]);
        }
        let mut parts = Vec::with_capacity(count);
        let mut pos = 0;
        while pos < self.bytes.len() {
            let header = self
                .bytes
                .get(pos..pos + 2)
                .ok_or_else(|| DecodeError::Composite("truncated component length".into()))?;
            let len = usize::from(u16::from_be_bytes([header[0], header[1]]));
            let start = pos + 2;
            let part = self
                .bytes
                .get(start..start + len)
                .ok_or_else(|| DecodeError::Composite("truncated component".into()))?;
            if self.bytes.get(start + len).is_none() {
                return Err(DecodeError::Composite("missing end-of-component byte".into()));
            }
            parts.push(part);
            pos = start + len + 1;
        }
        if parts.len() != count {
            return Err(DecodeError::Composite(format!(
                "expected {count} components, found {}",
                parts.len()
            )));
        }
        Ok(parts)
    }

    /// Splits and decodes the key against the schema's partition key columns.
    pub fn decode(&self, schema: &TableSchema) -> Result<Vec<Value>, ConvertError> {
        let columns = schema.partition_key_columns();
        let parts = self.components(columns.len()).map_err(|source| {
            let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
            decode_failure(&names.join(","), source)
        })?;
        columns
            .iter()
            .zip(parts)
            .map(|(column, raw)| {
                column
                    .cql_type
                    .decode(raw)
                    .map_err(|source| decode_failure(&column.name, source))
            })
            .collect()
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl Serialize for PartitionKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}
