//! Globals (`Math`, `JSON`, `console`, ...) and the methods of arrays,
//! strings and numbers.

use std::rc::Rc;

use crate::error::EvalError;
use crate::interp::{Interpreter, strict_equals};
use crate::value::{Object, Value, number_to_string, same_value};

thread_local! {
    static GLOBALS: Object = build_globals();
}

pub fn global(name: &str) -> Option<Value> {
    GLOBALS.with(|g| g.get(name).cloned())
}

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or_default()
}

fn math1(name: &str, f: fn(f64) -> f64) -> (String, Value) {
    (
        name.to_string(),
        Value::native(name, move |args| Ok(Value::Number(f(arg(args, 0).to_number())))),
    )
}

fn build_globals() -> Object {
    let math = Value::object([
        math1("abs", f64::abs),
        math1("floor", f64::floor),
        math1("ceil", f64::ceil),
        math1("round", |n| (n + 0.5).floor()),
        math1("sqrt", f64::sqrt),
        math1("trunc", f64::trunc),
        math1("sign", |n| if n == 0.0 || n.is_nan() { n } else { n.signum() }),
        (
            "min".into(),
            Value::native("min", |args| {
                Ok(Value::Number(
                    args.iter().map(Value::to_number).fold(f64::INFINITY, f64::min),
                ))
            }),
        ),
        (
            "max".into(),
            Value::native("max", |args| {
                Ok(Value::Number(
                    args.iter()
                        .map(Value::to_number)
                        .fold(f64::NEG_INFINITY, f64::max),
                ))
            }),
        ),
        (
            "pow".into(),
            Value::native("pow", |args| {
                Ok(Value::Number(
                    arg(args, 0).to_number().powf(arg(args, 1).to_number()),
                ))
            }),
        ),
        ("PI".into(), Value::Number(std::f64::consts::PI)),
    ]);

    let json = Value::object([
        (
            "stringify".into(),
            Value::native("stringify", |args| {
                let v = arg(args, 0);
                if v.is_undefined() {
                    return Ok(Value::Undefined);
                }
                serde_json::to_string(&v)
                    .map(Value::from)
                    .map_err(|e| EvalError::Native(e.to_string()))
            }),
        ),
        (
            "parse".into(),
            Value::native("parse", |args| {
                serde_json::from_str::<serde_json::Value>(&arg(args, 0).to_js_string())
                    .map(Value::from)
                    .map_err(|e| EvalError::Thrown(Value::from(format!("SyntaxError: {e}"))))
            }),
        ),
    ]);

    let console = Value::object([
        (
            "log".into(),
            Value::native("log", |args| {
                log::info!("{}", join_args(args));
                Ok(Value::Undefined)
            }),
        ),
        (
            "warn".into(),
            Value::native("warn", |args| {
                log::warn!("{}", join_args(args));
                Ok(Value::Undefined)
            }),
        ),
        (
            "error".into(),
            Value::native("error", |args| {
                log::error!("{}", join_args(args));
                Ok(Value::Undefined)
            }),
        ),
    ]);

    let array = Value::object([(
        "isArray".into(),
        Value::native("isArray", |args| {
            Ok(Value::Bool(matches!(arg(args, 0), Value::Array(_))))
        }),
    )]);

    let object = Value::object([
        (
            "keys".into(),
            Value::native("keys", |args| {
                Ok(match arg(args, 0) {
                    Value::Object(o) => Value::array(o.keys().map(|k| Value::from(k.as_str())).collect()),
                    Value::Array(a) => Value::array((0..a.len()).map(|i| Value::from(i.to_string())).collect()),
                    _ => Value::array(Vec::new()),
                })
            }),
        ),
        (
            "values".into(),
            Value::native("values", |args| {
                Ok(match arg(args, 0) {
                    Value::Object(o) => Value::array(o.values().cloned().collect()),
                    Value::Array(a) => Value::Array(a),
                    _ => Value::array(Vec::new()),
                })
            }),
        ),
        (
            "entries".into(),
            Value::native("entries", |args| {
                Ok(match arg(args, 0) {
                    Value::Object(o) => Value::array(
                        o.iter()
                            .map(|(k, v)| Value::array(vec![Value::from(k.as_str()), v.clone()]))
                            .collect(),
                    ),
                    _ => Value::array(Vec::new()),
                })
            }),
        ),
    ]);

    let mut g = Object::new();
    g.insert("Math".into(), math);
    g.insert("JSON".into(), json);
    g.insert("console".into(), console);
    g.insert("Array".into(), array);
    g.insert("Object".into(), object);
    g.insert("undefined".into(), Value::Undefined);
    g.insert("NaN".into(), Value::Number(f64::NAN));
    g.insert("Infinity".into(), Value::Number(f64::INFINITY));
    g.insert(
        "String".into(),
        Value::native("String", |args| Ok(Value::from(arg(args, 0).to_js_string()))),
    );
    g.insert(
        "Number".into(),
        Value::native("Number", |args| Ok(Value::Number(arg(args, 0).to_number()))),
    );
    g.insert(
        "Boolean".into(),
        Value::native("Boolean", |args| Ok(Value::Bool(arg(args, 0).is_truthy()))),
    );
    g.insert(
        "isNaN".into(),
        Value::native("isNaN", |args| Ok(Value::Bool(arg(args, 0).to_number().is_nan()))),
    );
    g.insert(
        "parseInt".into(),
        Value::native("parseInt", |args| {
            let s = arg(args, 0).to_js_string();
            let s = s.trim();
            let end = s
                .char_indices()
                .take_while(|(i, c)| c.is_ascii_digit() || (*i == 0 && (*c == '-' || *c == '+')))
                .map(|(i, c)| i + c.len_utf8())
                .last()
                .unwrap_or(0);
            Ok(Value::Number(s[..end].parse::<f64>().unwrap_or(f64::NAN)))
        }),
    );
    g.insert(
        "parseFloat".into(),
        Value::native("parseFloat", |args| {
            Ok(Value::Number(
                arg(args, 0).to_js_string().trim().parse::<f64>().unwrap_or(f64::NAN),
            ))
        }),
    );
    g
}

fn join_args(args: &[Value]) -> String {
    args.iter()
        .map(|a| match a {
            Value::String(s) => s.to_string(),
            other => serde_json::to_string(other).unwrap_or_else(|_| other.to_js_string()),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalizes a relative `slice`/`splice` index.
fn rel_index(v: &Value, len: usize, default: usize) -> usize {
    if v.is_undefined() {
        return default;
    }
    let n = v.to_number();
    if n.is_nan() {
        return 0;
    }
    let n = n.trunc();
    if n < 0.0 {
        (len as f64 + n).max(0.0) as usize
    } else {
        (n as usize).min(len)
    }
}

impl Interpreter {
    /// Calls a built-in method. The second element carries the receiver's new
    /// value when the method mutates it in place (`push`, `pop`, ...); the
    /// caller writes it back if the receiver is assignable.
    pub(crate) fn call_method(
        &mut self,
        receiver: &Value,
        name: &str,
        args: Vec<Value>,
    ) -> Result<(Value, Option<Value>), EvalError> {
        match receiver {
            Value::Array(items) => self.array_method(receiver, items, name, args),
            Value::String(s) => Ok((string_method(s, name, &args)?, None)),
            Value::Number(n) => Ok((number_method(*n, name, &args)?, None)),
            Value::Undefined | Value::Null => Err(EvalError::CannotRead {
                property: name.to_string(),
                target: if receiver.is_undefined() { "undefined" } else { "null" },
            }),
            _ => Err(EvalError::NotAFunction(name.to_string())),
        }
    }

    fn array_method(
        &mut self,
        receiver: &Value,
        items: &Rc<Vec<Value>>,
        name: &str,
        args: Vec<Value>,
    ) -> Result<(Value, Option<Value>), EvalError> {
        let callback = arg(&args, 0);
        let each = |this: &mut Self, i: usize, item: &Value| {
            this.call(
                &callback,
                vec![item.clone(), Value::from(i), receiver.clone()],
            )
        };
        let len = items.len();
        Ok(match name {
            "push" => {
                let mut next = items.to_vec();
                next.extend(args);
                (Value::from(next.len()), Some(Value::array(next)))
            }
            "pop" => {
                let mut next = items.to_vec();
                let popped = next.pop().unwrap_or_default();
                (popped, Some(Value::array(next)))
            }
            "shift" => {
                let mut next = items.to_vec();
                let first = if next.is_empty() {
                    Value::Undefined
                } else {
                    next.remove(0)
                };
                (first, Some(Value::array(next)))
            }
            "unshift" => {
                let mut next = args;
                next.extend(items.iter().cloned());
                (Value::from(next.len()), Some(Value::array(next)))
            }
            "reverse" => {
                let mut next = items.to_vec();
                next.reverse();
                let next = Value::array(next);
                (next.clone(), Some(next))
            }
            "splice" => {
                let start = rel_index(&arg(&args, 0), len, 0);
                let count = if args.len() < 2 {
                    len - start
                } else {
                    (arg(&args, 1).to_number().max(0.0) as usize).min(len - start)
                };
                let mut next = items.to_vec();
                let removed: Vec<Value> = next
                    .splice(start..start + count, args.into_iter().skip(2))
                    .collect();
                (Value::array(removed), Some(Value::array(next)))
            }
            "map" => {
                let mut out = Vec::with_capacity(len);
                for (i, item) in items.iter().enumerate() {
                    out.push(each(self, i, item)?);
                }
                (Value::array(out), None)
            }
            "filter" => {
                let mut out = Vec::new();
                for (i, item) in items.iter().enumerate() {
                    if each(self, i, item)?.is_truthy() {
                        out.push(item.clone());
                    }
                }
                (Value::array(out), None)
            }
            "find" | "findIndex" => {
                let mut found = None;
                for (i, item) in items.iter().enumerate() {
                    if each(self, i, item)?.is_truthy() {
                        found = Some((i, item.clone()));
                        break;
                    }
                }
                let v = match (name, found) {
                    ("find", Some((_, item))) => item,
                    ("find", None) => Value::Undefined,
                    (_, Some((i, _))) => Value::from(i),
                    (_, None) => Value::Number(-1.0),
                };
                (v, None)
            }
            "some" | "every" => {
                let want = name == "some";
                let mut result = !want;
                for (i, item) in items.iter().enumerate() {
                    if each(self, i, item)?.is_truthy() == want {
                        result = want;
                        break;
                    }
                }
                (Value::Bool(result), None)
            }
            "forEach" => {
                for (i, item) in items.iter().enumerate() {
                    each(self, i, item)?;
                }
                (Value::Undefined, None)
            }
            "reduce" => {
                let mut iter = items.iter().enumerate();
                let mut acc = if args.len() > 1 {
                    arg(&args, 1)
                } else {
                    match iter.next() {
                        Some((_, first)) => first.clone(),
                        None => {
                            return Err(EvalError::Native(
                                "reduce of empty array with no initial value".into(),
                            ));
                        }
                    }
                };
                for (i, item) in iter {
                    acc = self.call(
                        &callback,
                        vec![acc, item.clone(), Value::from(i), receiver.clone()],
                    )?;
                }
                (acc, None)
            }
            "includes" => (
                Value::Bool(items.iter().any(|v| same_value(v, &callback))),
                None,
            ),
            "indexOf" => (
                items
                    .iter()
                    .position(|v| strict_equals(v, &callback))
                    .map(Value::from)
                    .unwrap_or(Value::Number(-1.0)),
                None,
            ),
            "join" => {
                let sep = match arg(&args, 0) {
                    Value::Undefined => ",".to_string(),
                    other => other.to_js_string(),
                };
                (
                    Value::from(
                        items
                            .iter()
                            .map(Value::to_display_string)
                            .collect::<Vec<_>>()
                            .join(&sep),
                    ),
                    None,
                )
            }
            "slice" => {
                let start = rel_index(&arg(&args, 0), len, 0);
                let end = rel_index(&arg(&args, 1), len, len);
                let out = if start < end {
                    items[start..end].to_vec()
                } else {
                    Vec::new()
                };
                (Value::array(out), None)
            }
            "concat" => {
                let mut out = items.to_vec();
                for a in args {
                    match a {
                        Value::Array(more) => out.extend(more.iter().cloned()),
                        other => out.push(other),
                    }
                }
                (Value::array(out), None)
            }
            _ => return Err(EvalError::NotAFunction(format!("array.{name}"))),
        })
    }
}

fn string_method(s: &str, name: &str, args: &[Value]) -> Result<Value, EvalError> {
    let a0 = arg(args, 0).to_js_string();
    Ok(match name {
        "toUpperCase" => Value::from(s.to_uppercase()),
        "toLowerCase" => Value::from(s.to_lowercase()),
        "trim" => Value::from(s.trim()),
        "includes" => Value::Bool(s.contains(a0.as_str())),
        "startsWith" => Value::Bool(s.starts_with(a0.as_str())),
        "endsWith" => Value::Bool(s.ends_with(a0.as_str())),
        "indexOf" => match s.find(a0.as_str()) {
            Some(byte) => Value::from(s[..byte].chars().count()),
            None => Value::Number(-1.0),
        },
        "split" => {
            if arg(args, 0).is_undefined() {
                Value::array(vec![Value::from(s)])
            } else if a0.is_empty() {
                Value::array(s.chars().map(|c| Value::from(c.to_string())).collect())
            } else {
                Value::array(s.split(a0.as_str()).map(Value::from).collect())
            }
        }
        "replace" => Value::from(s.replacen(a0.as_str(), &arg(args, 1).to_js_string(), 1)),
        "charAt" => {
            let i = arg(args, 0).to_number();
            let i = if i.is_nan() { 0 } else { i as usize };
            Value::from(s.chars().nth(i).map(String::from).unwrap_or_default())
        }
        "slice" | "substring" => {
            let chars: Vec<char> = s.chars().collect();
            let len = chars.len();
            let start = rel_index(&arg(args, 0), len, 0);
            let end = rel_index(&arg(args, 1), len, len);
            if start < end {
                Value::from(chars[start..end].iter().collect::<String>())
            } else {
                Value::from("")
            }
        }
        "concat" => {
            let mut out = s.to_string();
            for a in args {
                out.push_str(&a.to_js_string());
            }
            Value::from(out)
        }
        "toString" => Value::from(s),
        _ => return Err(EvalError::NotAFunction(format!("string.{name}"))),
    })
}

fn number_method(n: f64, name: &str, args: &[Value]) -> Result<Value, EvalError> {
    Ok(match name {
        "toFixed" => {
            let digits = arg(args, 0).to_number();
            let digits = if digits.is_nan() { 0 } else { digits as usize };
            Value::from(format!("{n:.digits$}"))
        }
        "toString" => Value::from(number_to_string(n)),
        _ => return Err(EvalError::NotAFunction(format!("number.{name}"))),
    })
}
