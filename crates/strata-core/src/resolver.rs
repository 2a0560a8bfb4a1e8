//! Resolution of a container's local variables and functions.
//!
//! Declarations may reference each other in any order, so resolution runs in
//! two passes over the declaration list. The first pass is tolerant: a
//! declaration that reads a local declared further down is skipped, and an
//! evaluation error yields `Undefined`. The second pass sees every local and
//! is authoritative; its errors are returned with the failing source text.
//!
//! Both passes share the memo cache. An entry is reused when each of its
//! dependencies extracts a value [`shallow_eq`] to the recorded one, which is
//! why unchanged sub-trees of the store must keep their allocation.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};

use crate::ast::Binding;
use crate::compose::StateMap;
use crate::deps::{DepSet, Dependency, collect, substitute_functions};
use crate::error::{EvalError, ResolveError};
use crate::interp::Interpreter;
use crate::key::StateKey;
use crate::value::{Object, Value, shallow_eq};

/// Evaluates one binding against a scope. The interpreter is the only
/// production implementation; tests swap in counting evaluators.
pub trait BindingEvaluator {
    fn evaluate(&self, binding: &Binding, scope: &Rc<StateMap>) -> Result<Value, EvalError>;
}

#[derive(Default)]
pub struct InterpreterEvaluator;

impl BindingEvaluator for InterpreterEvaluator {
    fn evaluate(&self, binding: &Binding, scope: &Rc<StateMap>) -> Result<Value, EvalError> {
        Interpreter::new(scope.clone()).eval_binding(binding)
    }
}

/// One declared local.
#[derive(Clone, Debug)]
pub struct Declaration {
    pub name: String,
    pub binding: Binding,
    pub function: bool,
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct MemoKey {
    name: String,
    source: String,
}

struct MemoEntry {
    deps: Vec<Dependency>,
    values: Vec<Value>,
    result: Value,
}

impl MemoEntry {
    fn is_valid(&self, scope: &StateMap) -> bool {
        self.deps
            .iter()
            .zip(&self.values)
            .all(|(dep, old)| shallow_eq(&dep.extract(scope), old))
    }
}

pub struct Resolver {
    evaluator: Rc<dyn BindingEvaluator>,
    memo: RefCell<HashMap<MemoKey, MemoEntry>>,
    evaluations: Cell<usize>,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(Rc::new(InterpreterEvaluator))
    }
}

impl Resolver {
    pub fn new(evaluator: Rc<dyn BindingEvaluator>) -> Self {
        Self {
            evaluator,
            memo: RefCell::new(HashMap::new()),
            evaluations: Cell::new(0),
        }
    }

    /// Number of bindings actually evaluated so far (cache misses).
    pub fn evaluations(&self) -> usize {
        self.evaluations.get()
    }

    pub fn clear(&self) {
        self.memo.borrow_mut().clear();
    }

    /// Resolves `decls` against `scope`. A declaration named in `overrides`
    /// is not evaluated; it takes the override value (state written by a
    /// handler into a declared variable).
    pub fn resolve(
        &self,
        decls: &[Declaration],
        scope: &StateMap,
        overrides: &StateMap,
    ) -> Result<Object, ResolveError> {
        let names: IndexSet<String> = decls.iter().map(|d| d.name.clone()).collect();
        let functions: IndexSet<String> = decls
            .iter()
            .filter(|d| d.function || d.binding.is_function())
            .map(|d| d.name.clone())
            .collect();

        let direct: IndexMap<String, DepSet> = decls
            .iter()
            .map(|d| (d.name.clone(), collect(&d.binding)))
            .collect();
        let mut deps = direct.clone();
        substitute_functions(&mut deps, &functions);

        let mut working = scope.clone();
        let mut out = Object::new();

        // Pass 1: tolerant.
        for (position, decl) in decls.iter().enumerate() {
            let value = if let Some(v) = overrides.get(&StateKey::named(decl.name.as_str())) {
                v.clone()
            } else if let Binding::Literal(v) = &decl.binding {
                v.clone()
            } else if reads_forward(&direct[&decl.name], &names, position) {
                self.cached(decl).unwrap_or_default()
            } else {
                let scope = Rc::new(working.clone());
                self.evaluate(decl, &deps[&decl.name], &scope)
                    .unwrap_or_else(|e| {
                        log::debug!("'{}' unresolved in first pass: {e}", decl.name);
                        Value::Undefined
                    })
            };
            working.insert(StateKey::named(decl.name.as_str()), value);
        }

        // Pass 2: authoritative.
        for decl in decls {
            let value = if let Some(v) = overrides.get(&StateKey::named(decl.name.as_str())) {
                v.clone()
            } else if let Binding::Literal(v) = &decl.binding {
                v.clone()
            } else {
                let scope = Rc::new(working.clone());
                self.evaluate(decl, &deps[&decl.name], &scope)
                    .map_err(|error| ResolveError::Binding {
                        name: decl.name.clone(),
                        source_text: decl.binding.source_text(),
                        error,
                    })?
            };
            working.insert(StateKey::named(decl.name.as_str()), value.clone());
            out.insert(decl.name.clone(), value);
        }
        Ok(out)
    }

    fn key(decl: &Declaration) -> MemoKey {
        MemoKey {
            name: decl.name.clone(),
            source: decl.binding.source_text(),
        }
    }

    fn cached(&self, decl: &Declaration) -> Option<Value> {
        self.memo
            .borrow()
            .get(&Self::key(decl))
            .map(|e| e.result.clone())
    }

    fn evaluate(
        &self,
        decl: &Declaration,
        deps: &DepSet,
        scope: &Rc<StateMap>,
    ) -> Result<Value, EvalError> {
        let key = Self::key(decl);
        if let Some(entry) = self.memo.borrow().get(&key)
            && entry.is_valid(scope)
        {
            return Ok(entry.result.clone());
        }

        self.evaluations.set(self.evaluations.get() + 1);
        let result = self.evaluator.evaluate(&decl.binding, scope)?;
        let deps: Vec<Dependency> = deps.iter().cloned().collect();
        let values = deps.iter().map(|d| d.extract(scope)).collect();
        self.memo.borrow_mut().insert(
            key,
            MemoEntry {
                deps,
                values,
                result: result.clone(),
            },
        );
        Ok(result)
    }
}

/// True when a declaration reads a local that is declared after it and so
/// has not been resolved yet in the first pass.
fn reads_forward(deps: &DepSet, names: &IndexSet<String>, position: usize) -> bool {
    deps.iter()
        .any(|d| names.get_index_of(&d.root).is_some_and(|i| i > position))
}
