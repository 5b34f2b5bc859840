//! Tagged value model for store records.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Attribute type of a stored value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttrType {
    Bool,
    Int,
    Float,
    Text,
    Timestamp,
    /// Reference to a record of another entity
    Ref { entity: String },
}

impl fmt::Display for AttrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrType::Bool => write!(f, "bool"),
            AttrType::Int => write!(f, "int"),
            AttrType::Float => write!(f, "float"),
            AttrType::Text => write!(f, "text"),
            AttrType::Timestamp => write!(f, "timestamp"),
            AttrType::Ref { entity } => write!(f, "ref({})", entity),
        }
    }
}

/// A single stored value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Absent value for an optional attribute
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Seconds since the Unix epoch
    Timestamp(i64),
    /// Reference to a record of another entity
    Ref { entity: String, id: u64 },
}

impl Value {
    /// Returns the attribute type this value carries, or `None` for `Null`.
    pub fn attr_type(&self) -> Option<AttrType> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(AttrType::Bool),
            Value::Int(_) => Some(AttrType::Int),
            Value::Float(_) => Some(AttrType::Float),
            Value::Text(_) => Some(AttrType::Text),
            Value::Timestamp(_) => Some(AttrType::Timestamp),
            Value::Ref { entity, .. } => Some(AttrType::Ref {
                entity: entity.clone(),
            }),
        }
    }

    /// Returns true if this value conforms to the given attribute type.
    ///
    /// `Null` never conforms; whether an absent value is acceptable depends
    /// on the attribute being optional, which the caller decides.
    pub fn conforms_to(&self, ty: &AttrType) -> bool {
        match self.attr_type() {
            Some(actual) => actual == *ty,
            None => false,
        }
    }

    /// Short type name for error messages.
    pub fn type_name(&self) -> String {
        match self.attr_type() {
            Some(ty) => ty.to_string(),
            None => "null".to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "'{}'", v),
            Value::Timestamp(v) => write!(f, "@{}", v),
            Value::Ref { entity, id } => write!(f, "{}#{}", entity, id),
        }
    }
}

/// One row of one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Record id, unique per entity within a store
    pub id: u64,
    /// Attribute values keyed by attribute name
    pub values: BTreeMap<String, Value>,
}

impl Record {
    /// Creates a record with the given id and no values.
    pub fn new(id: u64) -> Self {
        Self {
            id,
            values: BTreeMap::new(),
        }
    }

    /// Sets an attribute value, consuming and returning the record.
    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.values.insert(name.into(), value);
        self
    }
}
