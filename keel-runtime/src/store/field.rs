use serde::{Deserialize, Serialize};

use super::StoreError;

/// Semantic type tag for a stored field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Integer,
    Float,
    Boolean,
    Text,
    /// Arbitrary JSON, entered and exported as a JSON string.
    Structured,
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FieldKind::Integer => "integer",
            FieldKind::Float => "float",
            FieldKind::Boolean => "boolean",
            FieldKind::Text => "text",
            FieldKind::Structured => "structured",
        };
        f.write_str(name)
    }
}

/// A concrete field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Text(String),
    Structured(serde_json::Value),
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Integer(_) => FieldKind::Integer,
            FieldValue::Float(_) => FieldKind::Float,
            FieldValue::Boolean(_) => FieldKind::Boolean,
            FieldValue::Text(_) => FieldKind::Text,
            FieldValue::Structured(_) => FieldKind::Structured,
        }
    }

    /// Parse operator-supplied text into a value of the given kind.
    pub fn parse(kind: FieldKind, field: &str, raw: &str) -> Result<Self, StoreError> {
        let validation = |message: String| StoreError::Validation {
            field: field.to_string(),
            expected: kind,
            message,
        };
        match kind {
            FieldKind::Integer => raw
                .trim()
                .parse::<i64>()
                .map(FieldValue::Integer)
                .map_err(|e| validation(e.to_string())),
            FieldKind::Float => raw
                .trim()
                .parse::<f64>()
                .map(FieldValue::Float)
                .map_err(|e| validation(e.to_string())),
            FieldKind::Boolean => match raw.trim() {
                "true" => Ok(FieldValue::Boolean(true)),
                "false" => Ok(FieldValue::Boolean(false)),
                other => Err(validation(format!("'{other}' is not 'true' or 'false'"))),
            },
            FieldKind::Text => Ok(FieldValue::Text(raw.to_string())),
            FieldKind::Structured => serde_json::from_str(raw)
                .map(FieldValue::Structured)
                .map_err(|e| validation(e.to_string())),
        }
    }

    pub(crate) fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Integer(v) => serde_json::json!(v),
            FieldValue::Float(v) => serde_json::json!(v),
            FieldValue::Boolean(v) => serde_json::json!(v),
            FieldValue::Text(v) => serde_json::json!(v),
            FieldValue::Structured(v) => v.clone(),
        }
    }

    /// Decode a stored document back into a value of the declared kind.
    pub(crate) fn from_json(kind: FieldKind, value: &serde_json::Value) -> Option<Self> {
        match kind {
            FieldKind::Integer => value.as_i64().map(FieldValue::Integer),
            FieldKind::Float => value.as_f64().map(FieldValue::Float),
            FieldKind::Boolean => value.as_bool().map(FieldValue::Boolean),
            FieldKind::Text => value.as_str().map(|s| FieldValue::Text(s.to_string())),
            FieldKind::Structured => Some(FieldValue::Structured(value.clone())),
        }
    }

    /// Text rendering used by the TOML export. Structured values export as
    /// their JSON text so the import path can parse them back.
    pub(crate) fn to_toml(&self) -> toml::Value {
        match self {
            FieldValue::Integer(v) => toml::Value::Integer(*v),
            FieldValue::Float(v) => toml::Value::Float(*v),
            FieldValue::Boolean(v) => toml::Value::Boolean(*v),
            FieldValue::Text(v) => toml::Value::String(v.clone()),
            FieldValue::Structured(v) => toml::Value::String(v.to_string()),
        }
    }
}

/// Declaration of one field: name, kind, description, flags, default.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub description: &'static str,
    /// Excluded from the text export (secrets).
    pub hidden: bool,
    /// When false the field lives in memory only and resets to its default
    /// on every boot.
    pub persistent: bool,
    pub default: FieldValue,
}

impl FieldSpec {
    pub fn new(name: &'static str, kind: FieldKind, default: FieldValue, description: &'static str) -> Self {
        Self {
            name,
            kind,
            description,
            hidden: false,
            persistent: true,
            default,
        }
    }

    pub fn integer(name: &'static str, default: i64, description: &'static str) -> Self {
        Self::new(name, FieldKind::Integer, FieldValue::Integer(default), description)
    }

    pub fn float(name: &'static str, default: f64, description: &'static str) -> Self {
        Self::new(name, FieldKind::Float, FieldValue::Float(default), description)
    }

    pub fn boolean(name: &'static str, default: bool, description: &'static str) -> Self {
        Self::new(name, FieldKind::Boolean, FieldValue::Boolean(default), description)
    }

    pub fn text(name: &'static str, default: &str, description: &'static str) -> Self {
        Self::new(name, FieldKind::Text, FieldValue::Text(default.to_string()), description)
    }

    pub fn structured(name: &'static str, default: serde_json::Value, description: &'static str) -> Self {
        Self::new(name, FieldKind::Structured, FieldValue::Structured(default), description)
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn volatile(mut self) -> Self {
        self.persistent = false;
        self
    }
}

/// A closed, ordered set of field declarations.
#[derive(Debug, Clone)]
pub struct Schema {
    name: &'static str,
    fields: Vec<FieldSpec>,
}

impl Schema {
    pub fn new(name: &'static str) -> Self {
        Self { name, fields: Vec::new() }
    }

    pub fn field(mut self, spec: FieldSpec) -> Self {
        debug_assert!(
            !self.fields.iter().any(|f| f.name == spec.name),
            "duplicate field '{}' in schema '{}'",
            spec.name,
            self.name
        );
        self.fields.push(spec);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}
