use serde::{Deserialize, Serialize};
use std::fmt;

use crate::api::ColumnInfo;

/// Represents the data type of a column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    String,
    Integer,
    Float,
    Boolean,
    DateTime,
}

impl DataType {
    /// Map a declared column type (`bigint`, `decimal(10,2)`, `timestamp`, ...)
    pub fn from_column_type(column_type: &str) -> Self {
        let lower = column_type.trim().to_ascii_lowercase();
        // Strip precision/scale: decimal(10,2) -> decimal
        let base = lower.split('(').next().unwrap_or("").trim();

        match base {
            "tinyint" | "smallint" | "integer" | "int" | "bigint" => DataType::Integer,
            "float" | "real" | "double" | "decimal" => DataType::Float,
            "boolean" => DataType::Boolean,
            "date" | "time" | "timestamp" => DataType::DateTime,
            _ if base.starts_with("timestamp") || base.starts_with("time ") => DataType::DateTime,
            _ => DataType::String,
        }
    }
}

/// Column metadata as exposed to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataColumn {
    pub name: String,
    /// Type name as declared by the service
    pub column_type: String,
    pub data_type: DataType,
}

impl DataColumn {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: "varchar".to_string(),
            data_type: DataType::String,
        }
    }

    pub fn with_type(mut self, column_type: impl Into<String>) -> Self {
        self.column_type = column_type.into();
        self.data_type = DataType::from_column_type(&self.column_type);
        self
    }
}

impl From<&ColumnInfo> for DataColumn {
    fn from(info: &ColumnInfo) -> Self {
        DataColumn::new(info.name.clone()).with_type(info.column_type.clone())
    }
}

/// A single cell value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    DateTime(String), // Kept as the service's text rendering
    Null,
}

impl DataValue {
    /// Convert a wire cell. Values that don't parse as the declared type stay strings.
    pub fn from_cell(cell: Option<&str>, data_type: &DataType) -> Self {
        let Some(s) = cell else {
            return DataValue::Null;
        };

        match data_type {
            DataType::String => DataValue::String(s.to_string()),
            _ if s.is_empty() => DataValue::Null,
            DataType::Integer => s
                .parse::<i64>()
                .map(DataValue::Integer)
                .unwrap_or_else(|_| DataValue::String(s.to_string())),
            DataType::Float => s
                .parse::<f64>()
                .map(DataValue::Float)
                .unwrap_or_else(|_| DataValue::String(s.to_string())),
            DataType::Boolean => match s.to_ascii_lowercase().as_str() {
                "true" => DataValue::Boolean(true),
                "false" => DataValue::Boolean(false),
                _ => DataValue::String(s.to_string()),
            },
            DataType::DateTime => DataValue::DateTime(s.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, DataValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DataValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DataValue::String(s) | DataValue::DateTime(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataValue::String(s) => write!(f, "{}", s),
            DataValue::Integer(i) => write!(f, "{}", i),
            DataValue::Float(fl) => write!(f, "{}", fl),
            DataValue::Boolean(b) => write!(f, "{}", b),
            DataValue::DateTime(dt) => write!(f, "{}", dt),
            DataValue::Null => write!(f, ""),
        }
    }
}

/// One result row, typed by its columns' declared types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub values: Vec<DataValue>,
    raw: Vec<Option<String>>,
}

impl Row {
    pub(crate) fn from_cells(cells: Vec<Option<String>>, columns: &[DataColumn]) -> Self {
        let values = cells
            .iter()
            .zip(columns)
            .map(|(cell, column)| DataValue::from_cell(cell.as_deref(), &column.data_type))
            .collect();
        Self { values, raw: cells }
    }

    pub fn get(&self, index: usize) -> Option<&DataValue> {
        self.values.get(index)
    }

    /// Cell exactly as the service sent it; `None` is SQL NULL
    pub fn raw(&self, index: usize) -> Option<&str> {
        self.raw.get(index)?.as_deref()
    }

    pub fn raw_values(&self) -> &[Option<String>] {
        &self.raw
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
