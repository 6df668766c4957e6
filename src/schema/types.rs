use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

static TIMEUUID: CqlType = CqlType::TimeUuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CqlType {
    Boolean,
    Int,
    BigInt,
    Counter,
    Float,
    Double,
    Text,
    Blob,
    Uuid,
    TimeUuid,
    Timestamp,
    List(Box<CqlType>),
    Set(Box<CqlType>),
    Map(Box<CqlType>, Box<CqlType>),
    Tuple(Vec<CqlType>),
    Frozen(Box<CqlType>),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("{cql_type} value must be {expected} bytes, got {actual}")]
    Length {
        cql_type: String,
        expected: usize,
        actual: usize,
    },
    #[error("invalid utf-8 in text value")]
    InvalidUtf8,
    #[error("timeuuid value has version {0}, expected 1")]
    NotTimeUuid(usize),
    #[error("truncated {0}")]
    Truncated(&'static str),
    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),
    #[error("negative collection size {0}")]
    NegativeSize(i32),
    #[error("malformed counter context: {0}")]
    CounterContext(String),
    #[error("malformed composite key: {0}")]
    Composite(String),
}

impl CqlType {
    pub fn list(element: CqlType) -> Self {
        CqlType::List(Box::new(element))
    }

    pub fn set(element: CqlType) -> Self {
        CqlType::Set(Box::new(element))
    }

    pub fn map(key: CqlType, value: CqlType) -> Self {
        CqlType::Map(Box::new(key), Box::new(value))
    }

    pub fn frozen(inner: CqlType) -> Self {
        CqlType::Frozen(Box::new(inner))
    }

    /// Multi-cell types store one cell per element, addressed by a cell path.
    pub fn is_multi_cell(&self) -> bool {
        matches!(self, CqlType::List(_) | CqlType::Set(_) | CqlType::Map(_, _))
    }

    pub fn is_counter(&self) -> bool {
        matches!(self, CqlType::Counter)
    }

    /// Type of the cell path of a multi-cell collection. Lists are keyed by
    /// the timeuuid the element was written with.
    pub fn element_key_type(&self) -> Option<&CqlType> {
        match self {
            CqlType::Map(key, _) => Some(key),
            CqlType::List(_) => Some(&TIMEUUID),
            CqlType::Set(element) => Some(element),
            _ => None,
        }
    }

    /// Type of the cell value of a multi-cell collection. Set cells carry no value.
    pub fn element_value_type(&self) -> Option<&CqlType> {
        match self {
            CqlType::Map(_, value) => Some(value),
            CqlType::List(element) => Some(element),
            _ => None,
        }
    }

    fn allows_empty(&self) -> bool {
        matches!(self, CqlType::Text | CqlType::Blob)
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<Value, DecodeError> {
        if bytes.is_empty() && !self.allows_empty() {
            return Ok(Value::Null);
        }
        match self {
            CqlType::Boolean => {
                let [b] = fixed::<1>(self, bytes)?;
                Ok(Value::Boolean(b != 0))
            }
            CqlType::Int => Ok(Value::Int(i32::from_be_bytes(fixed(self, bytes)?))),
            CqlType::BigInt | CqlType::Counter => {
                Ok(Value::BigInt(i64::from_be_bytes(fixed(self, bytes)?)))
            }
            CqlType::Timestamp => Ok(Value::Timestamp(i64::from_be_bytes(fixed(self, bytes)?))),
            CqlType::Float => Ok(Value::Float(f32::from_be_bytes(fixed(self, bytes)?))),
            CqlType::Double => Ok(Value::Double(f64::from_be_bytes(fixed(self, bytes)?))),
            CqlType::Text => std::str::from_utf8(bytes)
                .map(|s| Value::Text(s.into()))
                .map_err(|_| DecodeError::InvalidUtf8),
            CqlType::Blob => Ok(Value::Blob(bytes.to_vec())),
            CqlType::Uuid => Ok(Value::Uuid(Uuid::from_bytes(fixed(self, bytes)?))),
            CqlType::TimeUuid => {
                let uuid = Uuid::from_bytes(fixed(self, bytes)?);
                if uuid.get_version_num() != 1 {
                    return Err(DecodeError::NotTimeUuid(uuid.get_version_num()));
                }
                Ok(Value::Uuid(uuid))
            }
            CqlType::List(element) => {
                let mut reader = Reader::new(bytes);
                let values = reader.read_elements(element)?;
                reader.finish()?;
                Ok(Value::List(values))
            }
            CqlType::Set(element) => {
                let mut reader = Reader::new(bytes);
                let values = reader.read_elements(element)?;
                reader.finish()?;
                Ok(Value::Set(values))
            }
            CqlType::Map(key, value) => {
                let mut reader = Reader::new(bytes);
                let count = reader.read_size()?;
                let mut entries = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    let k = reader.read_value(key)?;
                    let v = reader.read_value(value)?;
                    entries.push((k, v));
                }
                reader.finish()?;
                Ok(Value::Map(entries))
            }
            CqlType::Tuple(types) => {
                let mut reader = Reader::new(bytes);
                let mut values = Vec::with_capacity(types.len());
                for ty in types {
                    if reader.is_exhausted() {
                        values.push(Value::Null);
                    } else {
                        values.push(reader.read_value(ty)?);
                    }
                }
                reader.finish()?;
                Ok(Value::Tuple(values))
            }
            CqlType::Frozen(inner) => inner.decode(bytes),
        }
    }

    /// Orders two serialized values of this type.
    pub fn compare_bytes(&self, a: &[u8], b: &[u8]) -> Result<Ordering, DecodeError> {
        Ok(self.decode(a)?.cmp(&self.decode(b)?))
    }
}

impl fmt::Display for CqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CqlType::Boolean => write!(f, "boolean"),
            CqlType::Int => write!(f, "int"),
            CqlType::BigInt => write!(f, "bigint"),
            CqlType::Counter => write!(f, "counter"),
            CqlType::Float => write!(f, "float"),
            CqlType::Double => write!(f, "double"),
            CqlType::Text => write!(f, "text"),
            CqlType::Blob => write!(f, "blob"),
            CqlType::Uuid => write!(f, "uuid"),
            CqlType::TimeUuid => write!(f, "timeuuid"),
            CqlType::Timestamp => write!(f, "timestamp"),
            CqlType::List(e) => write!(f, "list<{e}>"),
            CqlType::Set(e) => write!(f, "set<{e}>"),
            CqlType::Map(k, v) => write!(f, "map<{k}, {v}>"),
            CqlType::Tuple(types) => {
                write!(f, "tuple<")?;
                for (i, ty) in types.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{ty}")?;
                }
                write!(f, ">")
            }
            CqlType::Frozen(inner) => write!(f, "frozen<{inner}>"),
        }
    }
}

fn fixed<const N: usize>(ty: &CqlType, bytes: &[u8]) -> Result<[u8; N], DecodeError> {
    bytes.try_into().map_err(|_| DecodeError::Length {
        cql_type: ty.to_string(),
        expected: N,
        actual: bytes.len(),
    })
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn is_exhausted(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn read_i32(&mut self) -> Result<i32, DecodeError> {
        let end = self.pos + 4;
        let raw = self
            .buf
            .get(self.pos..end)
            .ok_or(DecodeError::Truncated("length prefix"))?;
        self.pos = end;
        let mut out = [0u8; 4];
        out.copy_from_slice(raw);
        Ok(i32::from_be_bytes(out))
    }

    fn read_size(&mut self) -> Result<usize, DecodeError> {
        let size = self.read_i32()?;
        usize::try_from(size).map_err(|_| DecodeError::NegativeSize(size))
    }

    fn read_value(&mut self, ty: &CqlType) -> Result<Value, DecodeError> {
        let len = self.read_i32()?;
        // A negative length marks a null element.
        let Ok(len) = usize::try_from(len) else {
            return Ok(Value::Null);
        };
        let end = self.pos + len;
        let raw = self
            .buf
            .get(self.pos..end)
            .ok_or(DecodeError::Truncated("element"))?;
        self.pos = end;
        ty.decode(raw)
    }

    fn read_elements(&mut self, ty: &CqlType) -> Result<Vec<Value>, DecodeError> {
        let count = self.read_size()?;
        let mut values = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            values.push(self.read_value(ty)?);
        }
        Ok(values)
    }

    fn finish(&self) -> Result<(), DecodeError> {
        if self.pos < self.buf.len() {
            return Err(DecodeError::TrailingBytes(self.buf.len() - self.pos));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Null,
    Boolean(bool),
    Int(i32),
    BigInt(i64),
    Float(f32),
    Double(f64),
    Text(CompactString),
    Blob(Vec<u8>),
    Uuid(Uuid),
    Timestamp(i64),
    List(Vec<Value>),
    Set(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Tuple(Vec<Value>),
}

impl Value {
    pub fn text(s: &str) -> Self {
        Value::Text(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Serialized form as stored in cells and read back by [`CqlType::decode`].
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_to(&mut out);
        out
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            Value::Null => {}
            Value::Boolean(b) => out.push(u8::from(*b)),
            Value::Int(v) => out.extend_from_slice(&v.to_be_bytes()),
            Value::BigInt(v) | Value::Timestamp(v) => out.extend_from_slice(&v.to_be_bytes()),
            Value::Float(v) => out.extend_from_slice(&v.to_be_bytes()),
            Value::Double(v) => out.extend_from_slice(&v.to_be_bytes()),
            Value::Text(s) => out.extend_from_slice(s.as_bytes()),
            Value::Blob(b) => out.extend_from_slice(b),
            Value::Uuid(u) => out.extend_from_slice(u.as_bytes()),
            Value::List(values) | Value::Set(values) => {
                write_len(out, values.len());
                for v in values {
                    write_element(out, v);
                }
            }
            Value::Map(entries) => {
                write_len(out, entries.len());
                for (k, v) in entries {
                    write_element(out, k);
                    write_element(out, v);
                }
            }
            Value::Tuple(values) => {
                for v in values {
                    write_element(out, v);
                }
            }
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Int(_) => 2,
            Value::BigInt(_) => 3,
            Value::Timestamp(_) => 4,
            Value::Float(_) => 5,
            Value::Double(_) => 6,
            Value::Uuid(_) => 7,
            Value::Text(_) => 8,
            Value::Blob(_) => 9,
            Value::Tuple(_) => 10,
            Value::List(_) => 11,
            Value::Set(_) => 12,
            Value::Map(_) => 13,
        }
    }
}

fn write_len(out: &mut Vec<u8>, len: usize) {
    let len = i32::try_from(len).unwrap_or(i32::MAX);
    out.extend_from_slice(&len.to_be_bytes());
}

fn write_element(out: &mut Vec<u8>, value: &Value) {
    if value.is_null() {
        out.extend_from_slice(&(-1i32).to_be_bytes());
        return;
    }
    let bytes = value.to_bytes();
    write_len(out, bytes.len());
    out.extend_from_slice(&bytes);
}

fn time_of(uuid: &Uuid) -> Option<u64> {
    if uuid.get_version_num() != 1 {
        return None;
    }
    let b = uuid.as_bytes();
    let low = u64::from(u32::from_be_bytes([b[0], b[1], b[2], b[3]]));
    let mid = u64::from(u16::from_be_bytes([b[4], b[5]]));
    let high = u64::from(u16::from_be_bytes([b[6], b[7]]) & 0x0fff);
    Some((high << 48) | (mid << 32) | low)
}

fn cmp_uuid(a: &Uuid, b: &Uuid) -> Ordering {
    match (time_of(a), time_of(b)) {
        (Some(ta), Some(tb)) => ta.cmp(&tb).then_with(|| a.as_bytes().cmp(b.as_bytes())),
        _ => a.as_bytes().cmp(b.as_bytes()),
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        let rank_cmp = self.kind_rank().cmp(&other.kind_rank());
        if rank_cmp != Ordering::Equal {
            return rank_cmp;
        }

        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::BigInt(a), Value::BigInt(b)) => a.cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Double(a), Value::Double(b)) => a.total_cmp(b),
            (Value::Uuid(a), Value::Uuid(b)) => cmp_uuid(a, b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Blob(a), Value::Blob(b)) => a.cmp(b),
            (Value::Tuple(a), Value::Tuple(b))
            | (Value::List(a), Value::List(b))
            | (Value::Set(a), Value::Set(b)) => a.cmp(b),
            (Value::Map(a), Value::Map(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }
}
