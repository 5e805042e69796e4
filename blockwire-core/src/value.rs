//! Values carried by blocks: stored readings, converted arguments and wire literals.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize, Serializer};

/// A dynamically typed block value. Untagged on the wire (`null`, `true`, `1.5`, `"x"`, `[..]`).
/// Integral numbers serialize as integers.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Truth value: null, false, 0, "" and [] are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::Text(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

// Numbers compare by bit pattern so argument tuples can key hash maps.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a.to_bits() == b.to_bits(),
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Number(n) => n.to_bits().hash(state),
            Value::Text(s) => s.hash(state),
            Value::List(items) => items.hash(state),
        }
    }
}

// Largest magnitude an f64 holds without losing integer precision.
const EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) if n.fract() == 0.0 && n.abs() <= EXACT_INTEGER => {
                serializer.serialize_i64(*n as i64)
            }
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::Text(s) => serializer.serialize_str(s),
            Value::List(items) => items.serialize(serializer),
        }
    }
}

/// Plain-text rendering used in HTTP bodies and poll lines.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => f.write_str(s),
            Value::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n.into())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<u16> for Value {
    fn from(n: u16) -> Self {
        Value::Number(n.into())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Objects have no block representation; they are kept as their JSON text.
impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Null),
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            obj @ serde_json::Value::Object(_) => Value::Text(obj.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Leaf(Value),
    Tree(ValueTree),
}

/// Nested per-argument store for argumented reporters.
///
/// Each level maps one converted argument to either a stored value or a deeper level.
/// A level may carry a fallback; lookups that miss return the fallback of the most
/// specific level walked so far, and finally the empty string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueTree {
    fallback: Option<Value>,
    children: HashMap<Value, Node>,
}

impl ValueTree {
    pub fn with_fallback(fallback: Value) -> Self {
        Self {
            fallback: Some(fallback),
            children: HashMap::new(),
        }
    }

    pub fn fallback(&self) -> Option<&Value> {
        self.fallback.as_ref()
    }

    /// Resolve the value stored at `args`. An empty path resolves to the root fallback.
    pub fn resolve(&self, args: &[Value]) -> Value {
        let mut default = Value::Text(String::new());
        let mut tree = self;
        for arg in args {
            if let Some(f) = &tree.fallback {
                default = f.clone();
            }
            match tree.children.get(arg) {
                None => return default,
                // A value stored above the full depth covers every deeper cell.
                Some(Node::Leaf(v)) => return v.clone(),
                Some(Node::Tree(t)) => tree = t,
            }
        }
        tree.fallback.clone().unwrap_or(default)
    }

    /// Store `value` at `args`, creating intermediate levels. An empty path sets the root fallback.
    pub fn store(&mut self, value: Value, args: &[Value]) {
        let Some((last, path)) = args.split_last() else {
            self.fallback = Some(value);
            return;
        };
        let mut tree = self;
        for arg in path {
            let node = tree
                .children
                .entry(arg.clone())
                .or_insert_with(|| Node::Tree(ValueTree::default()));
            if let Node::Leaf(v) = node {
                let v = std::mem::take(v);
                *node = Node::Tree(ValueTree::with_fallback(v));
            }
            tree = match node {
                Node::Tree(t) => t,
                Node::Leaf(_) => return,
            };
        }
        tree.children.insert(last.clone(), Node::Leaf(value));
    }

    /// Keys present at this level.
    pub fn keys(&self) -> impl Iterator<Item = &Value> {
        self.children.keys()
    }

    /// The deeper level stored under `key`, if any.
    pub fn child(&self, key: &Value) -> Option<&ValueTree> {
        match self.children.get(key) {
            Some(Node::Tree(t)) => Some(t),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integral_numbers_serialize_as_integers() {
        let json = serde_json::to_string(&Value::List(vec![
            Value::from(1),
            Value::from(2.5),
            Value::from(-3.0),
            Value::from(f64::NAN),
        ]))
        .unwrap();
        assert_eq!(json, "[1,2.5,-3,null]");
        let back: Value = serde_json::from_str("[1,2.5]").unwrap();
        assert_eq!(back, Value::List(vec![Value::from(1.0), Value::from(2.5)]));
    }

    #[test]
    fn display_is_plain_text() {
        assert_eq!(Value::from(3.0).to_string(), "3");
        assert_eq!(Value::from(2.5).to_string(), "2.5");
        assert_eq!(Value::from(true).to_string(), "true");
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(
            Value::List(vec!["a".into(), 1.into()]).to_string(),
            "a 1"
        );
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(Value::from("false").is_truthy());
        assert!(!Value::from(0).is_truthy());
        assert!(Value::from(-1).is_truthy());
        assert!(!Value::List(vec![]).is_truthy());
    }

    #[test]
    fn numbers_hash_by_bits() {
        let mut m = HashMap::new();
        m.insert(vec![Value::from(3.0)], "three");
        assert_eq!(m.get(&vec![Value::from(3)]), Some(&"three"));
        assert_ne!(Value::from(1), Value::from("1"));
    }

    #[test]
    fn untagged_json_form() {
        let v: Vec<Value> = serde_json::from_str(r#"["r", 12, true, null, [1, "x"]]"#).unwrap();
        assert_eq!(
            v,
            vec![
                Value::from("r"),
                Value::from(12),
                Value::from(true),
                Value::Null,
                Value::List(vec![Value::from(1), Value::from("x")]),
            ]
        );
        assert_eq!(serde_json::to_string(&Value::from("a")).unwrap(), r#""a""#);
    }

    #[test]
    fn tree_resolves_through_fallback_chain() {
        let mut t = ValueTree::with_fallback(Value::from("d"));
        let a = Value::from("a");
        let b = Value::from("b");
        assert_eq!(t.resolve(&[a.clone(), b.clone()]), Value::from("d"));
        t.store(Value::from("x"), &[a.clone(), b.clone()]);
        assert_eq!(t.resolve(&[a.clone(), b.clone()]), Value::from("x"));
        assert_eq!(t.resolve(&[a.clone(), a.clone()]), Value::from("d"));
        assert_eq!(t.resolve(&[b.clone(), b.clone()]), Value::from("d"));
    }

    #[test]
    fn tree_without_fallback_resolves_empty_text() {
        let t = ValueTree::default();
        assert_eq!(t.resolve(&[Value::from(1)]), Value::from(""));
        assert_eq!(t.resolve(&[]), Value::from(""));
    }

    #[test]
    fn shallow_value_becomes_level_fallback() {
        let mut t = ValueTree::default();
        let a = Value::from("a");
        t.store(Value::from(1), &[a.clone()]);
        assert_eq!(t.resolve(&[a.clone(), Value::from("z")]), Value::from(1));
        t.store(Value::from(2), &[a.clone(), Value::from("y")]);
        assert_eq!(t.resolve(&[a.clone(), Value::from("y")]), Value::from(2));
        assert_eq!(t.resolve(&[a.clone(), Value::from("z")]), Value::from(1));
    }

    #[test]
    fn empty_path_sets_root() {
        let mut t = ValueTree::with_fallback(Value::from(1));
        t.store(Value::from(7), &[]);
        assert_eq!(t.resolve(&[]), Value::from(7));
        assert_eq!(t.fallback(), Some(&Value::from(7)));
    }
}
