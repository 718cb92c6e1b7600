//! Preference entries: a name, a typed storage cell and a found flag

use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared kind of a preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrefKind {
    Double,
    Int,
    Bool,
    /// Free text; rejected by the parser
    Text,
}

impl fmt::Display for PrefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrefKind::Double => write!(f, "double"),
            PrefKind::Int => write!(f, "int"),
            PrefKind::Bool => write!(f, "bool"),
            PrefKind::Text => write!(f, "string"),
        }
    }
}

/// Typed storage cell of a preference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PrefValue {
    Double(f64),
    Int(i64),
    Bool(bool),
    Text(String),
}

impl PrefValue {
    pub fn kind(&self) -> PrefKind {
        match self {
            PrefValue::Double(_) => PrefKind::Double,
            PrefValue::Int(_) => PrefKind::Int,
            PrefValue::Bool(_) => PrefKind::Bool,
            PrefValue::Text(_) => PrefKind::Text,
        }
    }
}

/// One preference the caller wants read from the blob.
///
/// The cell starts out holding the caller's default and is only overwritten
/// when the tag is present and its value coerces to the declared kind.
#[derive(Debug, Clone, PartialEq)]
pub struct PreferenceEntry {
    name: String,
    value: PrefValue,
    found: bool,
}

impl PreferenceEntry {
    pub fn new(name: impl Into<String>, default: PrefValue) -> Self {
        Self {
            name: name.into(),
            value: default,
            found: false,
        }
    }

    pub fn double(name: impl Into<String>, default: f64) -> Self {
        Self::new(name, PrefValue::Double(default))
    }

    pub fn int(name: impl Into<String>, default: i64) -> Self {
        Self::new(name, PrefValue::Int(default))
    }

    pub fn bool(name: impl Into<String>, default: bool) -> Self {
        Self::new(name, PrefValue::Bool(default))
    }

    pub fn text(name: impl Into<String>, default: impl Into<String>) -> Self {
        Self::new(name, PrefValue::Text(default.into()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> PrefKind {
        self.value.kind()
    }

    pub fn value(&self) -> &PrefValue {
        &self.value
    }

    /// True once the tag was located and its value coerced
    pub fn found(&self) -> bool {
        self.found
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self.value {
            PrefValue::Double(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self.value {
            PrefValue::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.value {
            PrefValue::Bool(v) => Some(v),
            _ => None,
        }
    }

    /// Forget an earlier successful read. The cell keeps its value.
    pub(crate) fn clear_found(&mut self) {
        self.found = false;
    }

    /// Store a coerced value. The kind must match the declared kind.
    pub(crate) fn store(&mut self, value: PrefValue) {
        debug_assert_eq!(value.kind(), self.kind());
        self.value = value;
        self.found = true;
    }
}
