use serde::{Deserialize, Serialize};

/// Dynamic value carried along edges and stored as a node's output.
///
/// Media travels as strings: a URL, or a data URL (`data:<mime>;base64,<data>`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Json(serde_json::Value),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Value::Json(j) => Some(j),
            _ => None,
        }
    }

    /// Loose truthiness: null, false, 0, NaN and the empty string are falsy.
    /// Any JSON array or object is truthy, even when empty.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Json(j) => match j {
                serde_json::Value::Null => false,
                serde_json::Value::Bool(b) => *b,
                serde_json::Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
                serde_json::Value::String(s) => !s.is_empty(),
                serde_json::Value::Array(_) | serde_json::Value::Object(_) => true,
            },
        }
    }

    /// Render the value as prompt text.
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.clone(),
            Value::Json(serde_json::Value::String(s)) => s.clone(),
            Value::Json(j) => j.to_string(),
        }
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<serde_json::Value> for Value {
    fn from(j: serde_json::Value) -> Self {
        Value::Json(j)
    }
}

/// A decoded `data:<mime>;base64,<data>` image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl<'a> {
    pub mime_type: &'a str,
    pub data: &'a str,
}

impl<'a> DataUrl<'a> {
    /// Split a base64 data URL. Returns `None` for plain URLs or malformed input.
    pub fn parse(input: &'a str) -> Option<Self> {
        let rest = input.strip_prefix("data:")?;
        let (mime_type, data) = rest.split_once(";base64,")?;

        let (kind, subtype) = mime_type.split_once('/')?;
        let valid_kind = !kind.is_empty() && kind.chars().all(|c| c.is_ascii_alphanumeric());
        let valid_subtype = !subtype.is_empty()
            && subtype
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '+'));

        if !valid_kind || !valid_subtype || data.is_empty() {
            return None;
        }

        Some(Self { mime_type, data })
    }
}
