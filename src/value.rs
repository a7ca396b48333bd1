//! The engine's data model.
//!
//! Template data is JSON-shaped. Objects keep insertion order so that
//! wildcard selectors visit members deterministically when the
//! nondeterministic environment mode is off.

use core::fmt;

use indexmap::IndexMap;

use crate::tokenizer::Span;

/// An insertion-ordered string-keyed map of values.
pub type Object = IndexMap<String, Value>;

/// A JSON-like template value, plus the undefined sentinel produced when a
/// variable lookup finds nothing.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Object(Object),
    Undefined(Undefined),
}

/// Placeholder for a variable that could not be resolved. Carries the query
/// it came from and the token it was referenced at. Renders as an empty
/// string, is falsy and iterates as an empty collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Undefined {
    pub path: String,
    pub span: Span,
}

impl Value {
    pub fn undefined(path: impl Into<String>, span: Span) -> Self {
        Self::Undefined(Undefined {
            path: path.into(),
            span,
        })
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined(_))
    }

    /// Liquid truthiness: everything is truthy except `false`, nil and
    /// undefined. Empty strings and empty collections are truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Self::Null | Self::Bool(false) | Self::Undefined(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// The number of items a `size` filter or slice normalization sees.
    pub fn size(&self) -> Option<usize> {
        match self {
            Self::String(s) => Some(s.chars().count()),
            Self::Array(items) => Some(items.len()),
            Self::Object(members) => Some(members.len()),
            _ => None,
        }
    }

    /// Stringify for template output, without escaping.
    pub fn render_str(&self) -> String {
        match self {
            Self::Null | Self::Undefined(_) => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Integer(n) => n.to_string(),
            Self::Float(f) => render_float(*f),
            Self::String(s) => s.clone(),
            Self::Array(items) => items.iter().map(Value::render_str).collect(),
            Self::Object(_) => self.to_json().to_string(),
        }
    }

    /// Convert back to `serde_json::Value`. Undefined becomes `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null | Self::Undefined(_) => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Integer(n) => serde_json::Value::from(*n),
            Self::Float(f) => serde_json::Value::from(*f),
            Self::String(s) => serde_json::Value::from(s.clone()),
            Self::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Self::Object(members) => serde_json::Value::Object(
                members
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Move this value out as an [`Object`], if it is one.
    pub fn into_object(self) -> Option<Object> {
        match self {
            Self::Object(members) => Some(members),
            _ => None,
        }
    }
}

/// Escape the five HTML-significant characters.
pub fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

fn render_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 {
        format!("{f:.1}")
    } else {
        f.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_str())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            // The undefined sentinel compares equal to nil and to any other
            // undefined, mirroring how lenient rendering treats it.
            (Self::Undefined(_), Self::Undefined(_) | Self::Null) => true,
            (Self::Null, Self::Undefined(_)) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Integer(a), Self::Float(b)) | (Self::Float(b), Self::Integer(a)) => {
                *a as f64 == *b
            }
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => {
                a.len() == b.len() && a.iter().all(|(k, v)| b.get(k) == Some(v))
            }
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::Array(items)
    }
}

impl From<Object> for Value {
    fn from(members: Object) -> Self {
        Self::Object(members)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Integer(i)
                } else {
                    Self::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(members) => Self::Object(
                members
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}
