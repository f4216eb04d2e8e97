//! Attribute metadata.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Declared type of an attribute, used to type literals from condition strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    Integer,
    Float,
    Boolean,
    String,
    Text,
    Date,
    DateTime,
}

impl AttributeType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, AttributeType::Integer | AttributeType::Float)
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttributeType::Integer => "integer",
            AttributeType::Float => "float",
            AttributeType::Boolean => "boolean",
            AttributeType::String => "string",
            AttributeType::Text => "text",
            AttributeType::Date => "date",
            AttributeType::DateTime => "datetime",
        };
        f.write_str(name)
    }
}

/// Describes a persistent attribute of a type and the column it is stored in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDescription {
    pub name: String,
    /// Column name, defaults to the attribute name
    #[serde(default)]
    pub column: String,
    #[serde(rename = "type")]
    pub attr_type: AttributeType,
    #[serde(default)]
    pub is_primary_key: bool,
    #[serde(default = "default_editable")]
    pub is_editable: bool,
}

fn default_editable() -> bool {
    true
}

impl AttributeDescription {
    pub fn new(name: &str, attr_type: AttributeType) -> Self {
        Self {
            name: name.to_string(),
            column: name.to_string(),
            attr_type,
            is_primary_key: false,
            is_editable: true,
        }
    }

    /// An integer primary key attribute. Primary keys are not editable.
    pub fn primary_key(name: &str) -> Self {
        Self {
            is_primary_key: true,
            is_editable: false,
            ..Self::new(name, AttributeType::Integer)
        }
    }

    #[must_use]
    pub fn with_column(mut self, column: &str) -> Self {
        self.column = column.to_string();
        self
    }

    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.is_editable = false;
        self
    }

    /// Column name, falling back to the attribute name for metadata loaded without one.
    pub fn column_name(&self) -> &str {
        if self.column.is_empty() {
            &self.name
        } else {
            &self.column
        }
    }
}
