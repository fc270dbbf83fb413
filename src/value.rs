//! Value model for bindings.
//!
//! Every prop, fence variable and evaluated expression is one of these
//! variants. The two formatters are total: any value can be written back as a
//! script literal (`to_literal`) or as interpolated text (`to_display`).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name → value map visible during one render call frame.
pub type Bindings = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

/// Variant tag used for the homogeneity check on loop collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Null,
    Bool,
    Number,
    String,
    List,
    Map,
}

impl Value {
    fn kind(&self) -> Kind {
        match self {
            Value::Null => Kind::Null,
            Value::Bool(_) => Kind::Bool,
            Value::Int(_) | Value::Float(_) => Kind::Number,
            Value::String(_) => Kind::String,
            Value::List(_) => Kind::List,
            Value::Map(_) => Kind::Map,
        }
    }

    /// Strict truthiness for control directives: only an actual `true`.
    pub fn is_true(&self) -> bool {
        matches!(self, Value::Bool(true))
    }

    /// The list items, if this is a list whose elements all share one kind.
    pub fn as_homogeneous_list(&self) -> Option<&[Value]> {
        let Value::List(items) = self else {
            return None;
        };
        let mut kinds = items.iter().map(Value::kind);
        match kinds.next() {
            None => Some(items),
            Some(first) if kinds.all(|k| k == first) => Some(items),
            Some(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Number conversion used by arithmetic and comparisons.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Normalizes a float into `Int` when it carries no fractional part.
    pub fn number(n: f64) -> Value {
        if n.is_finite() && n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
            Value::Int(n as i64)
        } else {
            Value::Float(n)
        }
    }

    /// Script literal form: `"text"`, `42`, `true`, `null`, `[a, b]`, `{k: v}`.
    pub fn to_literal(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format_float(*f),
            Value::String(s) => quote(s),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(Value::to_literal).collect();
                format!("[{}]", parts.join(", "))
            }
            Value::Map(map) => {
                let parts: Vec<String> = map
                    .iter()
                    .map(|(k, v)| format!("{}: {}", object_key(k), v.to_literal()))
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
        }
    }

    /// Text form used when a value is interpolated into markup.
    pub fn to_display(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            Value::List(items) => items
                .iter()
                .map(Value::to_display)
                .collect::<Vec<_>>()
                .join(","),
            other => other.to_literal(),
        }
    }
}

fn format_float(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f.is_infinite() {
        let sign = if f > 0.0 { "" } else { "-" };
        format!("{}Infinity", sign)
    } else {
        f.to_string()
    }
}

fn quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s.replace('"', "\\\"")))
}

fn object_key(key: &str) -> String {
    let mut chars = key.chars();
    let is_ident = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        }
        _ => false,
    };
    if is_ident {
        key.to_string()
    } else {
        quote(key)
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

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_formatting() {
        assert_eq!(Value::from("Sam").to_literal(), "\"Sam\"");
        assert_eq!(Value::Int(17).to_literal(), "17");
        assert_eq!(Value::Float(2.5).to_literal(), "2.5");
        assert_eq!(Value::Bool(false).to_literal(), "false");
        assert_eq!(Value::Null.to_literal(), "null");
        assert_eq!(
            Value::from(vec!["cat", "dog"]).to_literal(),
            "[\"cat\", \"dog\"]"
        );
    }

    #[test]
    fn test_map_keys_sorted() {
        let mut map = BTreeMap::new();
        map.insert("zeta".to_string(), Value::Int(1));
        map.insert("alpha".to_string(), Value::from("a"));
        map.insert("data-x".to_string(), Value::Bool(true));
        assert_eq!(
            Value::Map(map).to_literal(),
            "{alpha: \"a\", \"data-x\": true, zeta: 1}"
        );
    }

    #[test]
    fn test_string_escaping() {
        assert_eq!(Value::from("say \"hi\"").to_literal(), r#""say \"hi\"""#);
    }

    #[test]
    fn test_display_formatting() {
        assert_eq!(Value::from("Sam").to_display(), "Sam");
        assert_eq!(Value::Null.to_display(), "");
        assert_eq!(Value::from(vec![1i64, 2, 3]).to_display(), "1,2,3");
    }

    #[test]
    fn test_strict_truthiness() {
        assert!(Value::Bool(true).is_true());
        assert!(!Value::Int(1).is_true());
        assert!(!Value::from("true").is_true());
        assert!(!Value::Null.is_true());
    }

    #[test]
    fn test_homogeneous_list() {
        assert!(Value::from(vec!["a", "b"]).as_homogeneous_list().is_some());
        assert!(Value::List(vec![Value::Int(1), Value::Float(2.5)])
            .as_homogeneous_list()
            .is_some());
        assert!(Value::List(vec![]).as_homogeneous_list().is_some());
        assert!(Value::List(vec![Value::Int(1), Value::from("x")])
            .as_homogeneous_list()
            .is_none());
        assert!(Value::from("abc").as_homogeneous_list().is_none());
    }

    #[test]
    fn test_number_normalization() {
        assert_eq!(Value::number(3.0), Value::Int(3));
        assert_eq!(Value::number(0.5), Value::Float(0.5));
    }

    #[test]
    fn test_json_conversion_keeps_integers() {
        let json: serde_json::Value = serde_json::json!({"age": 17, "ratio": 0.5, "tags": ["a"]});
        let Value::Map(map) = Value::from(json) else {
            panic!("expected map");
        };
        assert_eq!(map["age"], Value::Int(17));
        assert_eq!(map["ratio"], Value::Float(0.5));
        assert_eq!(map["tags"], Value::from(vec!["a"]));
    }
}
