//! Host-side argument values.
//!
//! The host hands an instance its arguments as a flat list of values. Only
//! strings and lists exist; everything else the host might know about is
//! irrelevant to this crate.

/// A single argument value as passed in by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    String(String),
    List(Vec<Value>),
}

impl Value {
    /// Returns the string contents if this is a string without embedded nul bytes.
    pub fn as_str_no_nulls(&self) -> Option<&str> {
        match self {
            Value::String(s) if !s.contains('\0') => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items.as_slice()),
            Value::String(_) => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}
