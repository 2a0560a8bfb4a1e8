//! Member paths into nested values (`a.b[0].c`) and the copy-on-write
//! path-set used by the reducer.

use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::error::StateError;
use crate::value::{Object, Value};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Largest number a computed member treats as an array index.
pub const MAX_INDEX: usize = u32::MAX as usize - 1;

/// How far past the end of an array a write may land. The gap is filled with
/// `undefined`, so it is kept small.
pub const MAX_ARRAY_GAP: usize = 1 << 16;

impl PathSegment {
    pub fn as_key(&self) -> String {
        match self {
            PathSegment::Key(k) => k.clone(),
            PathSegment::Index(i) => i.to_string(),
        }
    }

    /// Segment for a computed member: non-negative integral numbers up to
    /// [`MAX_INDEX`] index, everything else is a key.
    pub fn from_value(v: &Value) -> PathSegment {
        match v {
            Value::Number(n) if *n >= 0.0 && n.fract() == 0.0 && *n <= MAX_INDEX as f64 => {
                PathSegment::Index(*n as usize)
            }
            other => PathSegment::Key(other.to_js_string()),
        }
    }
}

pub type Path = SmallVec<[PathSegment; 4]>;

pub fn format_path(root: &str, rest: &[PathSegment]) -> String {
    let mut out = root.to_string();
    for seg in rest {
        match seg {
            PathSegment::Key(k) => {
                out.push('.');
                out.push_str(k);
            }
            PathSegment::Index(i) => {
                out.push('[');
                out.push_str(&i.to_string());
                out.push(']');
            }
        }
    }
    out
}

pub struct DisplayPath<'a>(pub &'a [PathSegment]);

impl fmt::Display for DisplayPath<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.split_first() {
            Some((first, rest)) => f.write_str(&format_path(&first.as_key(), rest)),
            None => Ok(()),
        }
    }
}

pub fn get_path(value: &Value, segments: &[PathSegment]) -> Value {
    let mut current = value.clone();
    for seg in segments {
        current = match seg {
            PathSegment::Key(k) => current.get(k),
            PathSegment::Index(i) => current.get_index(*i),
        };
        if current.is_undefined() {
            break;
        }
    }
    current
}

/// Writes `new_value` at `segments` below `root`, materializing missing
/// intermediates. `shape` is the declared default of the root variable: a
/// missing intermediate whose declared counterpart is an object becomes an
/// object even when the following segment looks like an index.
pub fn set_path(
    root: &mut Value,
    segments: &[PathSegment],
    new_value: Value,
    shape: Option<&Value>,
) -> Result<(), StateError> {
    let Some((first, rest)) = segments.split_first() else {
        *root = new_value;
        return Ok(());
    };

    if root.is_nullish() {
        let wants_object = matches!(shape, Some(Value::Object(_)));
        *root = if !wants_object && matches!(first, PathSegment::Index(_)) {
            Value::array(Vec::new())
        } else {
            Value::Object(Rc::new(Object::new()))
        };
    }

    let child_shape = shape.map(|s| get_path(s, std::slice::from_ref(first)));
    let child_shape = child_shape.as_ref().filter(|s| !s.is_undefined());

    match root {
        Value::Object(map) => {
            let map = Rc::make_mut(map);
            let key = first.as_key();
            let slot = map.entry(key).or_insert(Value::Undefined);
            set_path(slot, rest, new_value, child_shape)
        }
        Value::Array(items) => {
            let index = match first {
                PathSegment::Index(i) => *i,
                PathSegment::Key(k) => k.parse().map_err(|_| StateError::InvalidPath {
                    path: DisplayPath(segments).to_string(),
                    reason: "non-numeric key on an array",
                })?,
            };
            if index.saturating_sub(items.len()) > MAX_ARRAY_GAP {
                return Err(StateError::InvalidPath {
                    path: DisplayPath(segments).to_string(),
                    reason: "array index too far past the end",
                });
            }
            let items = Rc::make_mut(items);
            if index >= items.len() {
                items.resize(index + 1, Value::Undefined);
            }
            set_path(&mut items[index], rest, new_value, child_shape)
        }
        _ => Err(StateError::InvalidPath {
            path: DisplayPath(segments).to_string(),
            reason: "cannot create a member on a primitive",
        }),
    }
}

/// Removes the entry at `segments`; missing intermediates are a no-op.
pub fn unset_path(root: &mut Value, segments: &[PathSegment]) {
    let Some((first, rest)) = segments.split_first() else {
        *root = Value::Undefined;
        return;
    };
    match root {
        Value::Object(map) => {
            let key = first.as_key();
            if !map.contains_key(&key) {
                return;
            }
            let map = Rc::make_mut(map);
            if rest.is_empty() {
                map.shift_remove(&key);
            } else if let Some(child) = map.get_mut(&key) {
                unset_path(child, rest);
            }
        }
        Value::Array(items) => {
            let index = match first {
                PathSegment::Index(i) => *i,
                PathSegment::Key(k) => match k.parse::<usize>() {
                    Ok(i) => i,
                    Err(_) => return,
                },
            };
            if index >= items.len() {
                return;
            }
            let items = Rc::make_mut(items);
            if rest.is_empty() {
                items.remove(index);
            } else {
                unset_path(&mut items[index], rest);
            }
        }
        _ => {}
    }
}
