use crate::error::ConvertError;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Quotes an identifier, doubling embedded quotes.
pub fn escape_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Column name to output identifier. Mapped identifiers are written as-is;
/// unmapped columns are quoted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnNameMapping {
    names: HashMap<String, String>,
}

impl ColumnNameMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, identifier: impl Into<String>) {
        self.names.insert(column.into(), identifier.into());
    }

    pub fn identifier<'a>(&'a self, column: &str) -> Cow<'a, str> {
        match self.names.get(column) {
            Some(identifier) => Cow::Borrowed(identifier.as_str()),
            None => Cow::Owned(escape_identifier(column)),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Source of "now" for TTL clamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Clock {
    #[default]
    System,
    Fixed(i64),
}

impl Clock {
    pub fn now_micros(&self) -> i64 {
        match self {
            Clock::System => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_micros()
                .try_into()
                .unwrap_or(i64::MAX),
            Clock::Fixed(micros) => *micros,
        }
    }
}

/// Runtime configuration for a conversion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    /// Render every statement as a full row: INSERTs list all columns and the
    /// timestamp/ttl clauses are always present.
    pub apply_to_all_columns: bool,
    pub column_names: ColumnNameMapping,
    /// Skip non-global counter shards instead of failing the run.
    pub ignore_dropped_counter_data: bool,
}

impl ConverterConfig {
    pub fn snapshot_export() -> Self {
        Self {
            apply_to_all_columns: true,
            ..Self::default()
        }
    }

    pub fn tolerant() -> Self {
        Self {
            ignore_dropped_counter_data: true,
            ..Self::default()
        }
    }

    pub fn with_apply_to_all_columns(mut self, enabled: bool) -> Self {
        self.apply_to_all_columns = enabled;
        self
    }

    pub fn with_ignore_dropped_counter_data(mut self, enabled: bool) -> Self {
        self.ignore_dropped_counter_data = enabled;
        self
    }

    pub fn with_column_name(
        mut self,
        column: impl Into<String>,
        identifier: impl Into<String>,
    ) -> Self {
        self.column_names.insert(column, identifier);
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConvertError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ConvertError::InvalidConfig {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConvertError> {
        for (column, identifier) in &self.column_names.names {
            if column.is_empty() {
                return Err(ConvertError::InvalidConfig {
                    message: "column name mapping contains an empty column name".into(),
                });
            }
            if identifier.trim().is_empty() {
                return Err(ConvertError::InvalidConfig {
                    message: format!("column '{column}' is mapped to an empty identifier"),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Clock, ConverterConfig, escape_identifier};

    #[test]
    fn identifiers_are_quoted_unless_mapped() {
        let config = ConverterConfig::default().with_column_name("Value", "val");
        assert_eq!(config.column_names.identifier("Value"), "val");
        assert_eq!(config.column_names.identifier("other"), "\"other\"");
        assert_eq!(escape_identifier("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn profiles_set_their_flags() {
        assert!(ConverterConfig::snapshot_export().apply_to_all_columns);
        assert!(ConverterConfig::tolerant().ignore_dropped_counter_data);
        assert!(!ConverterConfig::default().apply_to_all_columns);
    }

    #[test]
    fn json_config_fills_defaults_and_validates() {
        let config = ConverterConfig::from_json_str(
            r#"{"ignore_dropped_counter_data": true, "column_names": {"v": "\"V\""}}"#,
        )
        .expect("config");
        assert!(config.ignore_dropped_counter_data);
        assert!(!config.apply_to_all_columns);
        assert_eq!(config.column_names.identifier("v"), "\"V\"");

        let err = ConverterConfig::from_json_str(r#"{"column_names": {"v": " "}}"#)
            .expect_err("empty identifier");
        assert_eq!(err.code_str(), "invalid_config");
        assert!(ConverterConfig::from_json_str("{").is_err());
    }

    #[test]
    fn fixed_clock_is_deterministic() {
        assert_eq!(Clock::Fixed(42).now_micros(), 42);
        assert!(Clock::System.now_micros() > 0);
    }
}
