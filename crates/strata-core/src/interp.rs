//! Tree-walking interpreter for bindings and handler statements.
//!
//! Reads go through a layered view: block locals, then state written during
//! this run, then the base snapshot, then the built-in globals. Every write to
//! state lands in the working copy *and* in an explicit [`ChangeRecorder`], so
//! the executor can turn one interval of writes into a single patch.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::ast::{
    ArrowBody, AssignOp, BinaryOp, Binding, Element, Expr, LogicalOp, Property, Stmt,
    TemplatePart, UnaryOp, UpdateOp,
};
use crate::builtins;
use crate::compose::StateMap;
use crate::config::is_read_only_name;
use crate::error::EvalError;
use crate::key::StateKey;
use crate::path::{Path, PathSegment, get_path, set_path, unset_path};
use crate::value::{Closure, Function, Object, Value, same_value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Set,
    Unset,
}

/// One recorded write: `root` is the state variable, `path` the member path
/// below it.
#[derive(Clone, Debug)]
pub struct Change {
    pub root: String,
    pub path: Path,
    pub value: Value,
    pub kind: ChangeKind,
}

#[derive(Default, Debug)]
pub struct ChangeRecorder {
    changes: Vec<Change>,
}

impl ChangeRecorder {
    pub fn record(&mut self, change: Change) {
        log::trace!("recorded {:?} {}", change.kind, change.root);
        self.changes.push(change);
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn take(&mut self) -> Vec<Change> {
        std::mem::take(&mut self.changes)
    }
}

/// Control-flow outcome of a statement.
#[derive(Clone, Debug)]
pub enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

struct Local {
    value: Value,
    constant: bool,
}

/// One block scope. Closures created inside a block hold the same frame, so
/// writes on either side are visible to the other.
#[derive(Clone, Default)]
pub struct Frame(Rc<RefCell<IndexMap<String, Local>>>);

impl Frame {
    fn get(&self, name: &str) -> Option<Value> {
        self.0.borrow().get(name).map(|l| l.value.clone())
    }

    fn contains(&self, name: &str) -> bool {
        self.0.borrow().contains_key(name)
    }

    /// Called when the block ends. A closure stored in its own frame keeps
    /// that frame alive through a cycle, so the frame is emptied once those
    /// closures are the only thing holding it.
    fn release(self) {
        let inner = self.0.borrow();
        let self_held = inner
            .values()
            .filter(|l| match &l.value {
                Value::Function(Function::Arrow(c)) => {
                    Rc::strong_count(c) == 1
                        && c.captured.iter().any(|f| Rc::ptr_eq(&f.0, &self.0))
                }
                _ => false,
            })
            .count();
        let unreachable = Rc::strong_count(&self.0) == 1 + self_held;
        drop(inner);
        if unreachable && self_held > 0 {
            self.0.borrow_mut().clear();
        }
    }
}

pub struct Interpreter {
    base: Rc<StateMap>,
    written: HashMap<String, Value>,
    recorder: ChangeRecorder,
    frames: Vec<Frame>,
}

impl Interpreter {
    pub fn new(base: Rc<StateMap>) -> Self {
        Self {
            base,
            written: HashMap::new(),
            recorder: ChangeRecorder::default(),
            frames: Vec::new(),
        }
    }

    /// Pushes a frame of read-only-by-convention bindings (`$param`, row
    /// variables, ...).
    pub fn with_frame(mut self, vars: Object) -> Self {
        self.push_frame_with(vars);
        self
    }

    pub fn has_changes(&self) -> bool {
        !self.recorder.is_empty()
    }

    pub fn take_changes(&mut self) -> Vec<Change> {
        self.recorder.take()
    }

    /// Drops pending writes and continues against a fresh snapshot. Block
    /// locals survive.
    pub fn rebase(&mut self, base: Rc<StateMap>) {
        self.base = base;
        self.written.clear();
        self.recorder.take();
    }

    pub fn lookup(&self, name: &str) -> Value {
        for frame in self.frames.iter().rev() {
            if let Some(value) = frame.get(name) {
                return value;
            }
        }
        self.read_state(name)
            .or_else(|| builtins::global(name))
            .unwrap_or_default()
    }

    fn read_state(&self, name: &str) -> Option<Value> {
        if let Some(v) = self.written.get(name) {
            return Some(v.clone());
        }
        self.base.get(&StateKey::named(name)).cloned()
    }

    pub(crate) fn push_frame(&mut self) {
        self.frames.push(Frame::default());
    }

    pub(crate) fn push_frame_with(&mut self, vars: Object) {
        let locals = vars
            .into_iter()
            .map(|(k, value)| {
                (
                    k,
                    Local {
                        value,
                        constant: false,
                    },
                )
            })
            .collect();
        self.frames.push(Frame(Rc::new(RefCell::new(locals))));
    }

    pub(crate) fn pop_frame(&mut self) {
        if let Some(frame) = self.frames.pop() {
            frame.release();
        }
    }

    pub(crate) fn declare(&mut self, name: &str, value: Value, constant: bool) {
        if self.frames.is_empty() {
            self.push_frame();
        }
        if let Some(top) = self.frames.last() {
            top.0
                .borrow_mut()
                .insert(name.to_string(), Local { value, constant });
        }
    }

    pub fn eval_binding(&mut self, binding: &Binding) -> Result<Value, EvalError> {
        match binding {
            Binding::Literal(v) => Ok(v.clone()),
            Binding::Expr { expr, .. } => self.eval(expr),
            Binding::Template(t) => {
                if let Some(e) = t.single_expr() {
                    return self.eval(e);
                }
                let mut out = String::new();
                for part in &t.parts {
                    match part {
                        TemplatePart::Text(s) => out.push_str(s),
                        TemplatePart::Expr(e) => out.push_str(&self.eval(e)?.to_display_string()),
                    }
                }
                Ok(Value::from(out))
            }
        }
    }

    /// Runs statements to completion and returns the `return` value, if any.
    pub fn run(&mut self, stmts: &[Stmt]) -> Result<Value, EvalError> {
        for stmt in stmts {
            match self.exec(stmt)? {
                Flow::Normal => {}
                Flow::Return(v) => return Ok(v),
                Flow::Break => return Err(EvalError::IllegalJump("break")),
                Flow::Continue => return Err(EvalError::IllegalJump("continue")),
            }
        }
        Ok(Value::Undefined)
    }

    pub fn exec(&mut self, stmt: &Stmt) -> Result<Flow, EvalError> {
        match stmt {
            Stmt::Empty => Ok(Flow::Normal),
            Stmt::Expr(e) => {
                self.eval(e)?;
                Ok(Flow::Normal)
            }
            Stmt::Let {
                name,
                init,
                constant,
            } => {
                let value = match init {
                    Some(e) => self.eval(e)?,
                    None => Value::Undefined,
                };
                self.declare(name, value, *constant);
                Ok(Flow::Normal)
            }
            Stmt::Block(body) => {
                self.push_frame();
                let result = self.exec_all(body);
                self.pop_frame();
                result
            }
            Stmt::If {
                test,
                then,
                otherwise,
            } => {
                if self.eval(test)?.is_truthy() {
                    self.exec(then)
                } else if let Some(o) = otherwise {
                    self.exec(o)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::While { test, body } => {
                while self.eval(test)?.is_truthy() {
                    match self.exec(body)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::DoWhile { body, test } => {
                loop {
                    match self.exec(body)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                    if !self.eval(test)?.is_truthy() {
                        break;
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::For {
                init,
                test,
                update,
                body,
            } => {
                self.push_frame();
                let result = self.exec_for(init.as_deref(), test.as_ref(), update.as_ref(), body);
                self.pop_frame();
                result
            }
            Stmt::ForOf {
                binding,
                iterable,
                body,
            } => {
                let items = self.iterate(iterable)?;
                for item in items {
                    self.push_frame();
                    self.declare(binding, item, false);
                    let flow = self.exec(body);
                    self.pop_frame();
                    match flow? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Return(e) => Ok(Flow::Return(match e {
                Some(e) => self.eval(e)?,
                None => Value::Undefined,
            })),
            Stmt::Break => Ok(Flow::Break),
            Stmt::Continue => Ok(Flow::Continue),
            Stmt::Throw(e) => Err(EvalError::Thrown(self.eval(e)?)),
            Stmt::Try {
                block,
                catch,
                finally,
            } => {
                self.push_frame();
                let mut result = self.exec_all(block);
                self.pop_frame();
                let handler = match (&result, catch) {
                    (Err(err), Some(clause)) if is_catchable(err) => Some((error_value(err), clause)),
                    _ => None,
                };
                if let Some((caught, clause)) = handler {
                    self.push_frame();
                    if let Some(p) = &clause.param {
                        self.declare(p, caught, false);
                    }
                    result = self.exec_all(&clause.body);
                    self.pop_frame();
                }
                if let Some(fin) = finally {
                    self.push_frame();
                    let fin_flow = self.exec_all(fin);
                    self.pop_frame();
                    match fin_flow? {
                        Flow::Normal => {}
                        other => return Ok(other),
                    }
                }
                result
            }
        }
    }

    fn exec_all(&mut self, stmts: &[Stmt]) -> Result<Flow, EvalError> {
        for stmt in stmts {
            match self.exec(stmt)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_for(
        &mut self,
        init: Option<&Stmt>,
        test: Option<&Expr>,
        update: Option<&Expr>,
        body: &Stmt,
    ) -> Result<Flow, EvalError> {
        if let Some(init) = init {
            self.exec(init)?;
        }
        loop {
            if let Some(t) = test
                && !self.eval(t)?.is_truthy()
            {
                break;
            }
            match self.exec(body)? {
                Flow::Break => break,
                Flow::Return(v) => return Ok(Flow::Return(v)),
                Flow::Normal | Flow::Continue => {}
            }
            if let Some(u) = update {
                self.eval(u)?;
            }
        }
        Ok(Flow::Normal)
    }

    /// Values a `for..of` walks: array items, string characters or object
    /// values.
    pub(crate) fn iterate(&mut self, iterable: &Expr) -> Result<Vec<Value>, EvalError> {
        Ok(match self.eval(iterable)? {
            Value::Array(a) => a.to_vec(),
            Value::String(s) => s.chars().map(|c| Value::from(c.to_string())).collect(),
            Value::Object(o) => o.values().cloned().collect(),
            Value::Undefined | Value::Null => {
                return Err(EvalError::CannotRead {
                    property: "Symbol.iterator".into(),
                    target: "undefined",
                });
            }
            other => return Err(EvalError::NotAFunction(format!("{other:?}[Symbol.iterator]"))),
        })
    }

    pub fn eval(&mut self, expr: &Expr) -> Result<Value, EvalError> {
        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Identifier(name) => Ok(self.lookup(name)),
            Expr::Member {
                object,
                property,
                optional,
            } => {
                let obj = self.eval(object)?;
                read_member(&obj, property, *optional)
            }
            Expr::Index {
                object,
                index,
                optional,
            } => {
                let obj = self.eval(object)?;
                let key = self.eval(index)?;
                match PathSegment::from_value(&key) {
                    PathSegment::Index(i) if matches!(obj, Value::Array(_)) => Ok(obj.get_index(i)),
                    seg => read_member(&obj, &seg.as_key(), *optional),
                }
            }
            Expr::Call { callee, args } => self.eval_call(callee, args),
            Expr::Arrow(arrow) => Ok(Value::Function(Function::Arrow(Rc::new(Closure {
                arrow: arrow.clone(),
                captured: self.capture(),
            })))),
            Expr::Unary { op, operand } => self.eval_unary(*op, operand),
            Expr::Binary { op, left, right } => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                Ok(binary(*op, &l, &r))
            }
            Expr::Logical { op, left, right } => {
                let l = self.eval(left)?;
                match op {
                    LogicalOp::And if !l.is_truthy() => Ok(l),
                    LogicalOp::Or if l.is_truthy() => Ok(l),
                    LogicalOp::Nullish if !l.is_nullish() => Ok(l),
                    _ => self.eval(right),
                }
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test)?.is_truthy() {
                    self.eval(consequent)
                } else {
                    self.eval(alternate)
                }
            }
            Expr::Object(props) => {
                let mut out = Object::new();
                for prop in props {
                    match prop {
                        Property::KeyValue(k, e) => {
                            let v = self.eval(e)?;
                            out.insert(k.clone(), v);
                        }
                        Property::Spread(e) => {
                            if let Value::Object(o) = self.eval(e)? {
                                for (k, v) in o.iter() {
                                    out.insert(k.clone(), v.clone());
                                }
                            }
                        }
                    }
                }
                Ok(Value::from(out))
            }
            Expr::Array(items) => Ok(Value::array(self.eval_elements(items)?)),
            Expr::Template(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        TemplatePart::Text(s) => out.push_str(s),
                        TemplatePart::Expr(e) => out.push_str(&self.eval(e)?.to_js_string()),
                    }
                }
                Ok(Value::from(out))
            }
            Expr::Assign { op, target, value } => self.eval_assign(*op, target, value),
            Expr::Update { op, prefix, target } => {
                let (root, path) = self.resolve_target(target)?;
                let old = self.read_target(&root, &path).to_number();
                let new = match op {
                    UpdateOp::Inc => old + 1.0,
                    UpdateOp::Dec => old - 1.0,
                };
                self.write(&root, path, Value::Number(new))?;
                Ok(Value::Number(if *prefix { new } else { old }))
            }
            Expr::Sequence(items) => {
                let mut last = Value::Undefined;
                for e in items {
                    last = self.eval(e)?;
                }
                Ok(last)
            }
        }
    }

    fn eval_elements(&mut self, items: &[Element]) -> Result<Vec<Value>, EvalError> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Element::Item(e) => out.push(self.eval(e)?),
                Element::Spread(e) => match self.eval(e)? {
                    Value::Array(a) => out.extend(a.iter().cloned()),
                    Value::String(s) => out.extend(s.chars().map(|c| Value::from(c.to_string()))),
                    Value::Undefined | Value::Null => {}
                    other => out.push(other),
                },
            }
        }
        Ok(out)
    }

    fn eval_unary(&mut self, op: UnaryOp, operand: &Expr) -> Result<Value, EvalError> {
        if op == UnaryOp::Delete {
            let (root, path) = self.resolve_target(operand)?;
            if path.is_empty() {
                return Ok(Value::Bool(false));
            }
            self.unset(&root, path)?;
            return Ok(Value::Bool(true));
        }
        let v = self.eval(operand)?;
        Ok(match op {
            UnaryOp::Not => Value::Bool(!v.is_truthy()),
            UnaryOp::Neg => Value::Number(-v.to_number()),
            UnaryOp::Plus => Value::Number(v.to_number()),
            UnaryOp::TypeOf => Value::from(v.type_name()),
            UnaryOp::Void | UnaryOp::Delete => Value::Undefined,
        })
    }

    fn eval_assign(&mut self, op: AssignOp, target: &Expr, value: &Expr) -> Result<Value, EvalError> {
        let (root, path) = self.resolve_target(target)?;
        let new = match op {
            AssignOp::Assign => self.eval(value)?,
            AssignOp::And | AssignOp::Or | AssignOp::Nullish => {
                let old = self.read_target(&root, &path);
                let keep = match op {
                    AssignOp::And => !old.is_truthy(),
                    AssignOp::Or => old.is_truthy(),
                    _ => !old.is_nullish(),
                };
                if keep {
                    return Ok(old);
                }
                self.eval(value)?
            }
            arith => {
                let old = self.read_target(&root, &path);
                let rhs = self.eval(value)?;
                let bop = match arith {
                    AssignOp::Add => BinaryOp::Add,
                    AssignOp::Sub => BinaryOp::Sub,
                    AssignOp::Mul => BinaryOp::Mul,
                    AssignOp::Div => BinaryOp::Div,
                    _ => BinaryOp::Rem,
                };
                binary(bop, &old, &rhs)
            }
        };
        self.write(&root, path, new.clone())?;
        Ok(new)
    }

    fn eval_call(&mut self, callee: &Expr, args: &[Element]) -> Result<Value, EvalError> {
        let (object, property, optional) = match callee {
            Expr::Member {
                object,
                property,
                optional,
            } => (object.as_ref(), property.clone(), *optional),
            Expr::Index {
                object,
                index,
                optional,
            } => {
                let key = self.eval(index)?;
                (object.as_ref(), key.to_js_string(), *optional)
            }
            other => {
                let f = self.eval(other)?;
                let args = self.eval_elements(args)?;
                return self.call(&f, args).map_err(|e| match e {
                    EvalError::NotAFunction(_) => EvalError::NotAFunction(describe(other)),
                    e => e,
                });
            }
        };

        let receiver = self.eval(object)?;
        if optional && receiver.is_nullish() {
            return Ok(Value::Undefined);
        }
        let args = self.eval_elements(args)?;

        if let Value::Object(o) = &receiver
            && let Some(f) = o.get(&property)
        {
            let f = f.clone();
            return self.call(&f, args);
        }

        let (result, mutated) = self.call_method(&receiver, &property, args)?;
        if let Some(new_receiver) = mutated
            && let Ok((root, path)) = self.resolve_target(object)
        {
            self.write(&root, path, new_receiver)?;
        }
        Ok(result)
    }

    /// Invokes a function value.
    pub fn call(&mut self, f: &Value, args: Vec<Value>) -> Result<Value, EvalError> {
        match f {
            Value::Function(Function::Native(n)) => n.call(&args),
            Value::Function(Function::Arrow(closure)) => self.call_closure(closure, args),
            other => Err(EvalError::NotAFunction(format!("{other:?}"))),
        }
    }

    fn call_closure(&mut self, closure: &Closure, args: Vec<Value>) -> Result<Value, EvalError> {
        let saved = std::mem::replace(&mut self.frames, closure.captured.clone());
        self.push_frame();
        let mut args = args.into_iter();
        for p in &closure.arrow.params {
            self.declare(p, args.next().unwrap_or_default(), false);
        }
        let result = match &closure.arrow.body {
            ArrowBody::Expr(e) => self.eval(e),
            ArrowBody::Block(body) => self.exec_all(body).map(|flow| match flow {
                Flow::Return(v) => v,
                _ => Value::Undefined,
            }),
        };
        let mut own = std::mem::replace(&mut self.frames, saved);
        let shared = closure.captured.len().min(own.len());
        for frame in own.drain(shared..).rev() {
            frame.release();
        }
        result
    }

    fn capture(&self) -> Vec<Frame> {
        self.frames.clone()
    }

    /// Resolves an assignment target to `(root variable, member path)`,
    /// evaluating computed members on the way.
    fn resolve_target(&mut self, target: &Expr) -> Result<(String, Path), EvalError> {
        match target {
            Expr::Identifier(name) => Ok((name.clone(), Path::new())),
            Expr::Member {
                object, property, ..
            } => {
                let (root, mut path) = self.resolve_target(object)?;
                path.push(PathSegment::Key(property.clone()));
                Ok((root, path))
            }
            Expr::Index { object, index, .. } => {
                let (root, mut path) = self.resolve_target(object)?;
                let key = self.eval(index)?;
                path.push(PathSegment::from_value(&key));
                Ok((root, path))
            }
            _ => Err(EvalError::InvalidAssignmentTarget),
        }
    }

    fn read_target(&self, root: &str, path: &[PathSegment]) -> Value {
        get_path(&self.lookup(root), path)
    }

    fn frame_of(&self, name: &str) -> Option<Frame> {
        self.frames.iter().rev().find(|f| f.contains(name)).cloned()
    }

    fn write(&mut self, root: &str, path: Path, value: Value) -> Result<(), EvalError> {
        if let Some(frame) = self.frame_of(root) {
            let mut locals = frame.0.borrow_mut();
            let Some(local) = locals.get_mut(root) else {
                return Ok(());
            };
            if local.constant && path.is_empty() {
                return Err(EvalError::ConstAssignment(root.to_string()));
            }
            return set_path(&mut local.value, &path, value, None)
                .map_err(|e| EvalError::Native(e.to_string()));
        }
        if is_read_only_name(root) {
            return Err(EvalError::ReadOnly(root.to_string()));
        }
        let mut current = self.read_state(root).unwrap_or_default();
        set_path(&mut current, &path, value.clone(), None)
            .map_err(|e| EvalError::Native(e.to_string()))?;
        self.written.insert(root.to_string(), current);
        self.recorder.record(Change {
            root: root.to_string(),
            path,
            value,
            kind: ChangeKind::Set,
        });
        Ok(())
    }

    fn unset(&mut self, root: &str, path: Path) -> Result<(), EvalError> {
        if let Some(frame) = self.frame_of(root) {
            if let Some(local) = frame.0.borrow_mut().get_mut(root) {
                unset_path(&mut local.value, &path);
            }
            return Ok(());
        }
        if is_read_only_name(root) {
            return Err(EvalError::ReadOnly(root.to_string()));
        }
        let mut current = self.read_state(root).unwrap_or_default();
        unset_path(&mut current, &path);
        self.written.insert(root.to_string(), current);
        self.recorder.record(Change {
            root: root.to_string(),
            path,
            value: Value::Undefined,
            kind: ChangeKind::Unset,
        });
        Ok(())
    }
}

impl Drop for Interpreter {
    fn drop(&mut self) {
        while let Some(frame) = self.frames.pop() {
            frame.release();
        }
    }
}

fn read_member(obj: &Value, property: &str, optional: bool) -> Result<Value, EvalError> {
    match obj {
        Value::Undefined | Value::Null if optional => Ok(Value::Undefined),
        Value::Undefined | Value::Null => Err(EvalError::CannotRead {
            property: property.to_string(),
            target: if obj.is_undefined() { "undefined" } else { "null" },
        }),
        other => Ok(other.get(property)),
    }
}

fn describe(expr: &Expr) -> String {
    match expr {
        Expr::Identifier(name) => name.clone(),
        Expr::Member {
            object, property, ..
        } => format!("{}.{property}", describe(object)),
        _ => "expression".into(),
    }
}

/// Read-only violations abort the whole run and cannot be caught.
pub(crate) fn is_catchable(err: &EvalError) -> bool {
    !matches!(err, EvalError::ReadOnly(_))
}

pub(crate) fn error_value(err: &EvalError) -> Value {
    match err {
        EvalError::Thrown(v) => v.clone(),
        other => Value::object([("message".to_string(), Value::from(other.to_string()))]),
    }
}

pub fn strict_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x == y,
        _ => same_value(a, b),
    }
}

pub fn loose_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (x, y) if x.is_nullish() && y.is_nullish() => true,
        (x, _) | (_, x) if x.is_nullish() => false,
        (Value::Number(_), Value::String(_))
        | (Value::String(_), Value::Number(_))
        | (Value::Bool(_), _)
        | (_, Value::Bool(_)) => a.to_number() == b.to_number(),
        _ => strict_equals(a, b),
    }
}

pub fn binary(op: BinaryOp, l: &Value, r: &Value) -> Value {
    let num = |f: fn(f64, f64) -> f64| Value::Number(f(l.to_number(), r.to_number()));
    match op {
        BinaryOp::Add => {
            let stringy = |v: &Value| {
                matches!(
                    v,
                    Value::String(_) | Value::Array(_) | Value::Object(_) | Value::Function(_)
                )
            };
            if stringy(l) || stringy(r) {
                Value::from(format!("{}{}", l.to_js_string(), r.to_js_string()))
            } else {
                num(|a, b| a + b)
            }
        }
        BinaryOp::Sub => num(|a, b| a - b),
        BinaryOp::Mul => num(|a, b| a * b),
        BinaryOp::Div => num(|a, b| a / b),
        BinaryOp::Rem => num(|a, b| a % b),
        BinaryOp::Pow => num(f64::powf),
        BinaryOp::StrictEq => Value::Bool(strict_equals(l, r)),
        BinaryOp::StrictNotEq => Value::Bool(!strict_equals(l, r)),
        BinaryOp::Eq => Value::Bool(loose_equals(l, r)),
        BinaryOp::NotEq => Value::Bool(!loose_equals(l, r)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ord = match (l, r) {
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => l.to_number().partial_cmp(&r.to_number()),
            };
            Value::Bool(match ord {
                None => false,
                Some(o) => match op {
                    BinaryOp::Lt => o.is_lt(),
                    BinaryOp::Le => o.is_le(),
                    BinaryOp::Gt => o.is_gt(),
                    _ => o.is_ge(),
                },
            })
        }
        BinaryOp::In => Value::Bool(match r {
            Value::Object(o) => o.contains_key(&l.to_js_string()),
            Value::Array(a) => {
                let n = l.to_number();
                n >= 0.0 && n.fract() == 0.0 && (n as usize) < a.len()
            }
            _ => false,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{CatchClause, Expr as E, Stmt as S};
    use serde_json::json;

    fn state(v: serde_json::Value) -> Rc<StateMap> {
        let Value::Object(o) = Value::from(v) else {
            panic!("state fixture must be an object")
        };
        Rc::new(
            o.iter()
                .map(|(k, v)| (StateKey::named(k.as_str()), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn evaluates_arithmetic_and_members() {
        let mut it = Interpreter::new(state(json!({ "a": 2, "user": { "name": "Ada" } })));
        let e = E::binary(BinaryOp::Mul, E::ident("a"), E::lit(21));
        assert_eq!(it.eval(&e).unwrap(), Value::from(42));
        let e = E::binary(
            BinaryOp::Add,
            E::lit("hi "),
            E::member(E::ident("user"), "name"),
        );
        assert_eq!(it.eval(&e).unwrap(), Value::from("hi Ada"));
        assert!(it.eval(&E::member(E::ident("missing"), "x")).is_err());
    }

    #[test]
    fn assignments_are_recorded_and_visible() {
        let mut it = Interpreter::new(state(json!({ "x": 0, "obj": { "a": 1 } })));
        it.run(&[
            S::expr(E::assign(E::ident("x"), E::lit(1))),
            S::expr(E::assign(E::member(E::ident("obj"), "b"), E::ident("x"))),
        ])
        .unwrap();
        assert_eq!(it.lookup("obj").to_json(), json!({ "a": 1, "b": 1 }));
        let changes = it.take_changes();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[1].root, "obj");
        assert_eq!(changes[1].path.as_slice(), &[PathSegment::Key("b".into())]);
    }

    #[test]
    fn locals_do_not_touch_state() {
        let mut it = Interpreter::new(state(json!({})));
        let v = it
            .run(&[
                S::let_("i", E::lit(0)),
                S::while_(
                    E::binary(BinaryOp::Lt, E::ident("i"), E::lit(5)),
                    vec![S::expr(E::increment(E::ident("i")))],
                ),
                S::ret(E::ident("i")),
            ])
            .unwrap();
        assert_eq!(v, Value::from(5));
        assert!(!it.has_changes());
    }

    #[test]
    fn read_only_roots_are_rejected_and_uncatchable() {
        let mut it = Interpreter::new(state(json!({ "$item": { "a": 1 } })));
        let attempt = S::Try {
            block: vec![S::expr(E::assign(
                E::member(E::ident("$item"), "a"),
                E::lit(2),
            ))],
            catch: Some(CatchClause {
                param: None,
                body: vec![],
            }),
            finally: None,
        };
        assert!(matches!(it.run(&[attempt]), Err(EvalError::ReadOnly(name)) if name == "$item"));
        assert!(!it.has_changes());
    }

    #[test]
    fn arrows_capture_locals_and_mutate_arrays_in_state() {
        let mut it = Interpreter::new(state(json!({ "items": [1, 2] })));
        let v = it
            .run(&[
                S::const_("k", E::lit(10)),
                S::const_(
                    "scale",
                    E::arrow(&["n"], E::binary(BinaryOp::Mul, E::ident("n"), E::ident("k"))),
                ),
                S::expr(E::call(
                    E::member(E::ident("items"), "push"),
                    vec![E::call(E::ident("scale"), vec![E::lit(3)])],
                )),
                S::ret(E::member(E::ident("items"), "length")),
            ])
            .unwrap();
        assert_eq!(v, Value::from(3));
        assert_eq!(it.lookup("items").to_json(), json!([1, 2, 30]));
        assert_eq!(it.take_changes().len(), 1);
    }

    #[test]
    fn closures_share_the_enclosing_block() {
        let mut it = Interpreter::new(state(json!({})));
        let v = it
            .run(&[
                S::let_("count", E::lit(0)),
                S::const_("bump", E::arrow(&[], E::increment(E::ident("count")))),
                S::const_("later", E::arrow(&[], E::ident("next"))),
                S::let_("next", E::lit(5)),
                S::expr(E::call(E::ident("bump"), vec![])),
                S::expr(E::call(E::ident("bump"), vec![])),
                S::ret(E::binary(
                    BinaryOp::Add,
                    E::ident("count"),
                    E::call(E::ident("later"), vec![]),
                )),
            ])
            .unwrap();
        assert_eq!(v, Value::from(7));
        assert!(!it.has_changes());
    }

    #[test]
    fn ending_a_block_frees_closures_stored_in_it() {
        let mut it = Interpreter::new(state(json!({})));
        it.push_frame();
        it.exec(&S::const_("f", E::arrow(&[], E::ident("f")))).unwrap();
        let Value::Function(Function::Arrow(f)) = it.lookup("f") else {
            panic!("f should be an arrow")
        };
        let weak = Rc::downgrade(&f);
        drop(f);
        it.pop_frame();
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn try_catch_binds_thrown_value() {
        let mut it = Interpreter::new(state(json!({})));
        let v = it
            .run(&[
                S::Try {
                    block: vec![S::Throw(E::lit("boom"))],
                    catch: Some(CatchClause {
                        param: Some("e".into()),
                        body: vec![S::ret(E::ident("e"))],
                    }),
                    finally: None,
                },
            ])
            .unwrap();
        assert_eq!(v, Value::from("boom"));
    }

    #[test]
    fn loose_and_strict_equality() {
        assert!(loose_equals(&Value::Null, &Value::Undefined));
        assert!(!strict_equals(&Value::Null, &Value::Undefined));
        assert!(loose_equals(&Value::from("1"), &Value::from(1)));
        assert!(!strict_equals(&Value::from("1"), &Value::from(1)));
    }
}
