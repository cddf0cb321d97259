//! Logical schema types. Pure data; no Arrow dependency here.
//!
//! `DataType::Extension` is a logical type layered over one of the physical
//! types; it never has its own buffer layout.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Null,
    Boolean,
    Int32,
    Int64,
    UInt32,
    UInt64,
    Float32,
    Float64,
    String,
    Binary,
    /// Days since the Unix epoch, stored as `i32`.
    Date,
    Extension { name: String, storage: Box<DataType> },
}

impl DataType {
    /// Everything except `Extension` is a physical encoding.
    pub fn is_physical(&self) -> bool {
        !matches!(self, DataType::Extension { .. })
    }

    pub fn is_extension(&self) -> bool {
        matches!(self, DataType::Extension { .. })
    }

    /// Physical encoding backing this type (itself for physical types).
    pub fn storage(&self) -> &DataType {
        match self {
            DataType::Extension { storage, .. } => storage.storage(),
            other => other,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            DataType::Int32
                | DataType::Int64
                | DataType::UInt32
                | DataType::UInt64
                | DataType::Float32
                | DataType::Float64
        )
    }

    /// Resolve a dtype by name.
    ///
    /// Lookup order: the primary table, then the deprecated alias table (which
    /// logs a deprecation warning). Anything else is a configuration error.
    pub fn from_name(name: &str) -> Result<DataType> {
        if let Some((_, dt)) = PRIMARY_NAMES.iter().find(|(n, _)| *n == name) {
            return Ok(dt.clone());
        }
        if let Some((_, canonical)) = DEPRECATED_ALIASES.iter().find(|(n, _)| *n == name) {
            tracing::warn!(
                alias = name,
                canonical = canonical,
                "data type alias is deprecated; use the canonical name instead"
            );
            return DataType::from_name(canonical);
        }
        Err(Error::Config(format!("unknown data type name: '{}'", name)))
    }

    /// Canonical name of a physical type; extension types report their own name.
    pub fn name(&self) -> &str {
        match self {
            DataType::Extension { name, .. } => name,
            other => PRIMARY_NAMES
                .iter()
                .find(|(_, dt)| dt == other)
                .map(|(n, _)| *n)
                .unwrap_or("unknown"),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Extension { name, storage } => write!(f, "Extension({}, {})", name, storage),
            other => f.write_str(other.name()),
        }
    }
}

const PRIMARY_NAMES: &[(&str, DataType)] = &[
    ("Null", DataType::Null),
    ("Boolean", DataType::Boolean),
    ("Int32", DataType::Int32),
    ("Int64", DataType::Int64),
    ("UInt32", DataType::UInt32),
    ("UInt64", DataType::UInt64),
    ("Float32", DataType::Float32),
    ("Float64", DataType::Float64),
    ("String", DataType::String),
    ("Binary", DataType::Binary),
    ("Date", DataType::Date),
];

const DEPRECATED_ALIASES: &[(&str, &str)] = &[
    ("Utf8", "String"),
    ("Int", "Int64"),
    ("Float", "Float64"),
    ("Bool", "Boolean"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn field(&self, idx: usize) -> Option<&Field> {
        self.fields.get(idx)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}
