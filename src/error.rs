use crate::schema::types::DecodeError;
use crate::sstable::counter::ShardKind;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertErrorCode {
    DataLossRisk,
    UnexpectedTombstone,
    ValueDecode,
    UnknownColumn,
    InvalidCell,
    InvariantViolation,
    InvalidSchema,
    InvalidConfig,
    Source,
    Sink,
    Encode,
    Io,
}

impl ConvertErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ConvertErrorCode::DataLossRisk => "data_loss_risk",
            ConvertErrorCode::UnexpectedTombstone => "unexpected_tombstone",
            ConvertErrorCode::ValueDecode => "value_decode",
            ConvertErrorCode::UnknownColumn => "unknown_column",
            ConvertErrorCode::InvalidCell => "invalid_cell",
            ConvertErrorCode::InvariantViolation => "invariant_violation",
            ConvertErrorCode::InvalidSchema => "invalid_schema",
            ConvertErrorCode::InvalidConfig => "invalid_config",
            ConvertErrorCode::Source => "source",
            ConvertErrorCode::Sink => "sink",
            ConvertErrorCode::Encode => "encode",
            ConvertErrorCode::Io => "io",
        }
    }
}

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("{shard} counter shard found in column '{column}'. Data loss may occur")]
    DataLossRisk { column: String, shard: ShardKind },
    #[error("unexpected tombstone: {message}")]
    UnexpectedTombstone { message: String },
    #[error("could not compose value for column '{column}': {source}")]
    ValueDecode {
        column: String,
        #[source]
        source: DecodeError,
    },
    #[error("unknown column '{column}' in table '{table}'")]
    UnknownColumn { table: String, column: String },
    #[error("invalid cell for column '{column}': {message}")]
    InvalidCell { column: String, message: String },
    #[error("invariant violation: {message}")]
    InvariantViolation { message: String },
    #[error("invalid schema: {message}")]
    InvalidSchema { message: String },
    #[error("invalid config: {message}")]
    InvalidConfig { message: String },
    #[error("event source error: {0}")]
    Source(String),
    #[error("statement sink error: {0}")]
    Sink(String),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConvertError {
    pub fn code(&self) -> ConvertErrorCode {
        match self {
            ConvertError::DataLossRisk { .. } => ConvertErrorCode::DataLossRisk,
            ConvertError::UnexpectedTombstone { .. } => ConvertErrorCode::UnexpectedTombstone,
            ConvertError::ValueDecode { .. } => ConvertErrorCode::ValueDecode,
            ConvertError::UnknownColumn { .. } => ConvertErrorCode::UnknownColumn,
            ConvertError::InvalidCell { .. } => ConvertErrorCode::InvalidCell,
            ConvertError::InvariantViolation { .. } => ConvertErrorCode::InvariantViolation,
            ConvertError::InvalidSchema { .. } => ConvertErrorCode::InvalidSchema,
            ConvertError::InvalidConfig { .. } => ConvertErrorCode::InvalidConfig,
            ConvertError::Source(_) => ConvertErrorCode::Source,
            ConvertError::Sink(_) => ConvertErrorCode::Sink,
            ConvertError::Encode(_) => ConvertErrorCode::Encode,
            ConvertError::Io(_) => ConvertErrorCode::Io,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }

    /// True for failures caused by the input data itself rather than by the
    /// environment (sink, source, io). Rerunning over the same data fails again.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            ConvertError::DataLossRisk { .. }
                | ConvertError::UnexpectedTombstone { .. }
                | ConvertError::ValueDecode { .. }
                | ConvertError::UnknownColumn { .. }
                | ConvertError::InvalidCell { .. }
        )
    }

    pub(crate) fn unexpected_tombstone(message: impl Into<String>) -> Self {
        ConvertError::UnexpectedTombstone {
            message: message.into(),
        }
    }

    pub(crate) fn invariant(message: impl Into<String>) -> Self {
        ConvertError::InvariantViolation {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConvertError, ConvertErrorCode};
    use crate::schema::types::DecodeError;
    use crate::sstable::counter::ShardKind;

    #[test]
    fn error_code_strings_are_stable() {
        assert_eq!(ConvertErrorCode::DataLossRisk.as_str(), "data_loss_risk");
        assert_eq!(
            ConvertErrorCode::UnexpectedTombstone.as_str(),
            "unexpected_tombstone"
        );
        assert_eq!(ConvertErrorCode::ValueDecode.as_str(), "value_decode");
    }

    #[test]
    fn data_loss_message_names_the_shard() {
        let err = ConvertError::DataLossRisk {
            column: "hits".into(),
            shard: ShardKind::Local,
        };
        assert_eq!(err.code_str(), "data_loss_risk");
        assert_eq!(
            err.to_string(),
            "Local counter shard found in column 'hits'. Data loss may occur"
        );
        assert!(err.is_data_error());
    }

    #[test]
    fn decode_failures_keep_column_context() {
        let err = ConvertError::ValueDecode {
            column: "v".into(),
            source: DecodeError::InvalidUtf8,
        };
        assert!(err.to_string().contains("'v'"));
        assert!(err.is_data_error());
        assert!(!ConvertError::Sink("closed".into()).is_data_error());
    }
}
