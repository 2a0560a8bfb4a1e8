//! # Values
//!
//! Everything the engine stores, composes or evaluates is a [`Value`]. Arrays
//! and objects sit behind `Rc` and are copied on write (`Rc::make_mut`), so a
//! state snapshot is cheap to clone and unchanged sub-trees keep their identity
//! between commits. The memo cache relies on that: a shallow comparison can
//! treat two containers as equal when they are the same allocation.
//!
//! ```rust
//! use strata_core::Value;
//!
//! let v = Value::from(serde_json::json!({ "count": 1, "tags": ["a"] }));
//! assert_eq!(v.get("count"), Value::from(1));
//! assert_eq!(v.to_json(), serde_json::json!({ "count": 1, "tags": ["a"] }));
//! ```

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::ast::ArrowExpr;
use crate::error::EvalError;
use crate::interp::Frame;

pub type Object = IndexMap<String, Value>;

pub type NativeFn = dyn Fn(&[Value]) -> Result<Value, EvalError>;

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Array(Rc<Vec<Value>>),
    Object(Rc<Object>),
    Function(Function),
}

/// A callable value.
#[derive(Clone)]
pub enum Function {
    /// An arrow expression together with the block locals it closed over.
    Arrow(Rc<Closure>),
    Native(NativeFunction),
}

pub struct Closure {
    pub arrow: Rc<ArrowExpr>,
    /// The enclosing block scopes, shared rather than copied.
    pub captured: Vec<Frame>,
}

#[derive(Clone)]
pub struct NativeFunction {
    pub name: Rc<str>,
    f: Rc<NativeFn>,
}

impl NativeFunction {
    pub fn new(
        name: impl Into<Rc<str>>,
        f: impl Fn(&[Value]) -> Result<Value, EvalError> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            f: Rc::new(f),
        }
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, EvalError> {
        (self.f)(args)
    }
}

impl Function {
    pub fn ptr_eq(&self, other: &Function) -> bool {
        match (self, other) {
            (Function::Arrow(a), Function::Arrow(b)) => Rc::ptr_eq(a, b),
            (Function::Native(a), Function::Native(b)) => Rc::ptr_eq(&a.f, &b.f),
            _ => false,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Function::Arrow(_) => "anonymous",
            Function::Native(n) => &n.name,
        }
    }
}

impl Value {
    pub fn string(s: impl AsRef<str>) -> Value {
        Value::String(Rc::from(s.as_ref()))
    }

    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(Rc::new(items))
    }

    pub fn object(entries: impl IntoIterator<Item = (String, Value)>) -> Value {
        Value::Object(Rc::new(entries.into_iter().collect()))
    }

    pub fn native(
        name: &str,
        f: impl Fn(&[Value]) -> Result<Value, EvalError> + 'static,
    ) -> Value {
        Value::Function(Function::Native(NativeFunction::new(name, f)))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) | Value::Function(_) => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) | Value::Object(_) => "object",
            Value::Function(_) => "function",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Numeric coercion (`+value`).
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::String(s) => {
                let t = s.trim();
                if t.is_empty() {
                    0.0
                } else {
                    t.parse().unwrap_or(f64::NAN)
                }
            }
            Value::Array(a) if a.is_empty() => 0.0,
            Value::Array(a) if a.len() == 1 => a[0].to_number(),
            _ => f64::NAN,
        }
    }

    /// Property read: object keys, array indices and `length`, string `length`.
    /// Missing properties read as `Undefined`.
    pub fn get(&self, key: &str) -> Value {
        match self {
            Value::Object(o) => o.get(key).cloned().unwrap_or_default(),
            Value::Array(a) => {
                if key == "length" {
                    Value::Number(a.len() as f64)
                } else {
                    key.parse::<usize>()
                        .ok()
                        .and_then(|i| a.get(i).cloned())
                        .unwrap_or_default()
                }
            }
            Value::String(s) => {
                if key == "length" {
                    Value::Number(s.chars().count() as f64)
                } else {
                    key.parse::<usize>()
                        .ok()
                        .and_then(|i| s.chars().nth(i))
                        .map(|c| Value::string(c.to_string()))
                        .unwrap_or_default()
                }
            }
            _ => Value::Undefined,
        }
    }

    pub fn get_index(&self, index: usize) -> Value {
        match self {
            Value::Array(a) => a.get(index).cloned().unwrap_or_default(),
            other => other.get(&index.to_string()),
        }
    }

    /// String form used by templates: `undefined` and `null` render empty.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Undefined | Value::Null => String::new(),
            other => other.to_js_string(),
        }
    }

    /// `String(value)` coercion.
    pub fn to_js_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".into(),
            Value::Null => "null".into(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => number_to_string(*n),
            Value::String(s) => s.to_string(),
            Value::Array(a) => a
                .iter()
                .map(Value::to_display_string)
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(_) => "[object Object]".into(),
            Value::Function(f) => format!("function {}() {{ [code] }}", f.name()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Undefined | Value::Null | Value::Function(_) => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 9.0e15 {
                    serde_json::Value::from(*n as i64)
                } else {
                    serde_json::Number::from_f64(*n)
                        .map(serde_json::Value::Number)
                        .unwrap_or(serde_json::Value::Null)
                }
            }
            Value::String(s) => serde_json::Value::String(s.to_string()),
            Value::Array(a) => serde_json::Value::Array(a.iter().map(Value::to_json).collect()),
            Value::Object(o) => serde_json::Value::Object(
                o.iter()
                    .filter(|(_, v)| !v.is_undefined())
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".into()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity".into() } else { "-Infinity".into() }
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i128)
    } else {
        format!("{n}")
    }
}

/// Identity-or-primitive equality: primitives compare by value, containers
/// and functions by allocation.
pub fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x == y || (x.is_nan() && y.is_nan()),
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => Rc::ptr_eq(x, y),
        (Value::Object(x), Value::Object(y)) => Rc::ptr_eq(x, y),
        (Value::Function(x), Value::Function(y)) => x.ptr_eq(y),
        _ => false,
    }
}

/// One-level structural comparison. Top-level arrays and objects are compared
/// element-wise, each element with [`same_value`].
pub fn shallow_eq(a: &Value, b: &Value) -> bool {
    if same_value(a, b) {
        return true;
    }
    match (a, b) {
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(l, r)| same_value(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, l)| y.get(k).is_some_and(|r| same_value(l, r)))
        }
        _ => false,
    }
}

/// Deep merge used when two state layers collide: objects merge key-wise,
/// arrays index-wise, anything else is replaced by `incoming`.
pub fn deep_merge(existing: &Value, incoming: &Value) -> Value {
    match (existing, incoming) {
        (Value::Object(base), Value::Object(new)) => {
            let mut merged = (**base).clone();
            for (k, v) in new.iter() {
                let next = match merged.get(k) {
                    Some(old) => deep_merge(old, v),
                    None => v.clone(),
                };
                merged.insert(k.clone(), next);
            }
            Value::Object(Rc::new(merged))
        }
        (Value::Array(base), Value::Array(new)) => {
            let mut merged = (**base).clone();
            for (i, v) in new.iter().enumerate() {
                if i < merged.len() {
                    merged[i] = deep_merge(&merged[i], v);
                } else {
                    merged.push(v.clone());
                }
            }
            Value::Array(Rc::new(merged))
        }
        (_, new) => new.clone(),
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Array(x), Value::Array(y)) => Rc::ptr_eq(x, y) || x == y,
            (Value::Object(x), Value::Object(y)) => Rc::ptr_eq(x, y) || x == y,
            (Value::Number(x), Value::Number(y)) => x == y,
            _ => same_value(self, other),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{}", number_to_string(*n)),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Array(a) => f.debug_list().entries(a.iter()).finish(),
            Value::Object(o) => f.debug_map().entries(o.iter()).finish(),
            Value::Function(func) => write!(f, "<fn {}>", func.name()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_js_string())
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Undefined | Value::Null | Value::Function(_) => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 9.0e15 {
                    serializer.serialize_i64(*n as i64)
                } else {
                    serializer.serialize_f64(*n)
                }
            }
            Value::String(s) => serializer.serialize_str(s),
            Value::Array(a) => {
                let mut seq = serializer.serialize_seq(Some(a.len()))?;
                for item in a.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Object(o) => {
                let mut map = serializer.serialize_map(None)?;
                for (k, v) in o.iter().filter(|(_, v)| !v.is_undefined()) {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(Rc::from(s)),
            serde_json::Value::Array(a) => {
                Value::Array(Rc::new(a.into_iter().map(Value::from).collect()))
            }
            serde_json::Value::Object(o) => Value::Object(Rc::new(
                o.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
            )),
        }
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

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::array(items)
    }
}

impl From<Object> for Value {
    fn from(o: Object) -> Self {
        Value::Object(Rc::new(o))
    }
}

impl From<Function> for Value {
    fn from(f: Function) -> Self {
        Value::Function(f)
    }
}
