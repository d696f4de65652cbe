use indexmap::IndexMap;
use serde::Serialize;

use super::diffractometer::Diffractometer;

/// The typed value stored under an attribute name on a Record.
///
/// Serializes untagged, so a tree of Values reads like plain YAML.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Text(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
    Geometry(Box<Diffractometer>),
}

impl Value {
    /// Numeric-looking tokens become Numbers, everything else stays literal text
    pub fn from_token(token: &str) -> Self {
        match token.parse::<f64>() {
            Ok(number) => Self::Number(number),
            Err(_) => Self::Text(token.to_string()),
        }
    }

    /// Split on whitespace, converting each word with `from_token`
    pub fn from_words(text: &str) -> Self {
        Self::List(text.split_whitespace().map(Self::from_token).collect())
    }

    pub fn text_list<'a, I: IntoIterator<Item = &'a str>>(items: I) -> Self {
        Self::List(items.into_iter().map(Self::from).collect())
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Vec<Value>> {
        match self {
            Self::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_geometry(&self) -> Option<&Diffractometer> {
        match self {
            Self::Geometry(d) => Some(d),
            _ => None,
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<f64>> for Value {
    fn from(value: Vec<f64>) -> Self {
        Self::List(value.into_iter().map(Self::Number).collect())
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(value: IndexMap<String, Value>) -> Self {
        Self::Map(value)
    }
}
