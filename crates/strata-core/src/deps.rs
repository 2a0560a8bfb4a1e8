//! Dependency collection.
//!
//! A dependency is a member path rooted at a free identifier (`user.name`),
//! cut at the first computed member. Names bound by arrow parameters, block
//! declarations, loop variables or catch clauses are not dependencies.

use std::fmt;

use indexmap::{IndexMap, IndexSet};

use crate::ast::{ArrowBody, Binding, Element, Expr, Property, Stmt, TemplatePart};
use crate::compose::StateMap;
use crate::key::StateKey;
use crate::path::{Path, PathSegment, format_path, get_path};
use crate::value::Value;

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Dependency {
    pub root: String,
    pub path: Path,
}

impl Dependency {
    pub fn root(name: &str) -> Self {
        Self {
            root: name.to_string(),
            path: Path::new(),
        }
    }

    /// Current value of this dependency in `scope`.
    pub fn extract(&self, scope: &StateMap) -> Value {
        let root = scope
            .get(&StateKey::named(self.root.as_str()))
            .cloned()
            .unwrap_or_default();
        get_path(&root, &self.path)
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_path(&self.root, &self.path))
    }
}

pub type DepSet = IndexSet<Dependency>;

struct Collector {
    bound: Vec<Vec<String>>,
    out: DepSet,
}

impl Collector {
    fn is_bound(&self, name: &str) -> bool {
        self.bound.iter().any(|scope| scope.iter().any(|n| n == name))
    }

    fn bind(&mut self, name: &str) {
        if let Some(top) = self.bound.last_mut() {
            top.push(name.to_string());
        }
    }

    fn scoped(&mut self, f: impl FnOnce(&mut Self)) {
        self.bound.push(Vec::new());
        f(self);
        self.bound.pop();
    }

    /// Member chain `a.b.c` as `(root, [b, c])`; `None` when it is not rooted
    /// at an identifier. Computed members end the path but their index
    /// expression is still visited.
    fn member_path(&mut self, expr: &Expr) -> Option<(String, Path, bool)> {
        match expr {
            Expr::Identifier(name) => Some((name.clone(), Path::new(), false)),
            Expr::Member {
                object, property, ..
            } => {
                let (root, mut path, cut) = self.member_path(object)?;
                if !cut {
                    path.push(PathSegment::Key(property.clone()));
                }
                Some((root, path, cut))
            }
            Expr::Index { object, index, .. } => {
                self.expr(index);
                let (root, path, _) = self.member_path(object)?;
                Some((root, path, true))
            }
            _ => None,
        }
    }

    fn member(&mut self, expr: &Expr) {
        match self.member_path(expr) {
            Some((root, path, _)) => {
                if !self.is_bound(&root) {
                    self.out.insert(Dependency { root, path });
                }
            }
            None => match expr {
                Expr::Member { object, .. } => self.expr(object),
                Expr::Index { object, index, .. } => {
                    self.expr(object);
                    self.expr(index);
                }
                _ => self.expr(expr),
            },
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Literal(_) => {}
            Expr::Identifier(_) | Expr::Member { .. } | Expr::Index { .. } => self.member(expr),
            Expr::Call { callee, args } => {
                // `list.map(f)` depends on `list`, not on `list.map`
                match callee.as_ref() {
                    Expr::Member { object, .. } => self.member(object),
                    other => self.expr(other),
                }
                self.elements(args);
            }
            Expr::Arrow(arrow) => self.scoped(|c| {
                for p in &arrow.params {
                    c.bind(p);
                }
                match &arrow.body {
                    ArrowBody::Expr(e) => c.expr(e),
                    ArrowBody::Block(stmts) => c.stmts(stmts),
                }
            }),
            Expr::Unary { operand, .. } => self.expr(operand),
            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.expr(left);
                self.expr(right);
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                self.expr(test);
                self.expr(consequent);
                self.expr(alternate);
            }
            Expr::Object(props) => {
                for p in props {
                    match p {
                        Property::KeyValue(_, e) | Property::Spread(e) => self.expr(e),
                    }
                }
            }
            Expr::Array(items) => self.elements(items),
            Expr::Template(parts) => {
                for part in parts {
                    if let TemplatePart::Expr(e) = part {
                        self.expr(e);
                    }
                }
            }
            Expr::Assign { target, value, .. } => {
                self.member(target);
                self.expr(value);
            }
            Expr::Update { target, .. } => self.member(target),
            Expr::Sequence(items) => {
                for e in items {
                    self.expr(e);
                }
            }
        }
    }

    fn elements(&mut self, items: &[Element]) {
        for item in items {
            match item {
                Element::Item(e) | Element::Spread(e) => self.expr(e),
            }
        }
    }

    fn stmts(&mut self, stmts: &[Stmt]) {
        for s in stmts {
            self.stmt(s);
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Expr(e) | Stmt::Throw(e) => self.expr(e),
            Stmt::Let { name, init, .. } => {
                if let Some(e) = init {
                    self.expr(e);
                }
                self.bind(name);
            }
            Stmt::Block(body) => self.scoped(|c| c.stmts(body)),
            Stmt::If {
                test,
                then,
                otherwise,
            } => {
                self.expr(test);
                self.stmt(then);
                if let Some(o) = otherwise {
                    self.stmt(o);
                }
            }
            Stmt::While { test, body } | Stmt::DoWhile { body, test } => {
                self.expr(test);
                self.stmt(body);
            }
            Stmt::For {
                init,
                test,
                update,
                body,
            } => self.scoped(|c| {
                if let Some(i) = init {
                    c.stmt(i);
                }
                if let Some(t) = test {
                    c.expr(t);
                }
                if let Some(u) = update {
                    c.expr(u);
                }
                c.stmt(body);
            }),
            Stmt::ForOf {
                binding,
                iterable,
                body,
            } => {
                self.expr(iterable);
                self.scoped(|c| {
                    c.bind(binding);
                    c.stmt(body);
                });
            }
            Stmt::Return(e) => {
                if let Some(e) = e {
                    self.expr(e);
                }
            }
            Stmt::Try {
                block,
                catch,
                finally,
            } => {
                self.scoped(|c| c.stmts(block));
                if let Some(clause) = catch {
                    self.scoped(|c| {
                        if let Some(p) = &clause.param {
                            c.bind(p);
                        }
                        c.stmts(&clause.body);
                    });
                }
                if let Some(f) = finally {
                    self.scoped(|c| c.stmts(f));
                }
            }
            Stmt::Break | Stmt::Continue | Stmt::Empty => {}
        }
    }
}

fn collector() -> Collector {
    Collector {
        bound: vec![Vec::new()],
        out: DepSet::new(),
    }
}

pub fn collect_expr(expr: &Expr) -> DepSet {
    let mut c = collector();
    c.expr(expr);
    c.out
}

pub fn collect_statements(stmts: &[Stmt]) -> DepSet {
    let mut c = collector();
    c.stmts(stmts);
    c.out
}

pub fn collect(binding: &Binding) -> DepSet {
    match binding {
        Binding::Literal(_) => DepSet::new(),
        Binding::Expr { expr, .. } => collect_expr(expr),
        Binding::Template(t) => {
            let mut c = collector();
            for part in &t.parts {
                if let TemplatePart::Expr(e) = part {
                    c.expr(e);
                }
            }
            c.out
        }
    }
}

/// Substitutes the dependencies of function-valued declarations into every
/// declaration that reads them, transitively, until nothing changes.
pub fn substitute_functions(deps: &mut IndexMap<String, DepSet>, functions: &IndexSet<String>) {
    loop {
        let mut changed = false;
        let names: Vec<String> = deps.keys().cloned().collect();
        for name in names {
            let callees: Vec<String> = deps[&name]
                .iter()
                .filter(|d| functions.contains(&d.root) && d.root != name)
                .map(|d| d.root.clone())
                .collect();
            for callee in callees {
                let Some(extra) = deps.get(&callee).cloned() else {
                    continue;
                };
                if let Some(set) = deps.get_mut(&name) {
                    for d in extra {
                        changed |= set.insert(d);
                    }
                }
            }
        }
        if !changed {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, Expr as E, Stmt as S};

    fn names(set: &DepSet) -> Vec<String> {
        set.iter().map(|d| format!("{d:?}")).collect()
    }

    #[test]
    fn member_paths_are_cut_at_computed_members() {
        let e = E::binary(
            BinaryOp::Add,
            E::member(E::ident("user"), "name"),
            E::member(E::index(E::ident("rows"), E::ident("i")), "label"),
        );
        assert_eq!(names(&collect_expr(&e)), ["user.name", "i", "rows"]);
    }

    #[test]
    fn bound_names_are_not_dependencies() {
        let e = E::call(
            E::member(E::ident("items"), "map"),
            vec![E::arrow(&["x"], E::binary(BinaryOp::Mul, E::ident("x"), E::ident("factor")))],
        );
        assert_eq!(names(&collect_expr(&e)), ["items", "factor"]);

        let stmts = vec![
            S::let_("tmp", E::ident("a")),
            S::for_of("row", E::ident("rows"), vec![S::expr(E::ident("row"))]),
            S::ret(E::ident("tmp")),
        ];
        assert_eq!(names(&collect_statements(&stmts)), ["a", "rows"]);
    }

    #[test]
    fn templates_contribute_segments() {
        let b = Binding::text("Hi {user.name}, you have {inbox.count}").unwrap();
        assert_eq!(names(&collect(&b)), ["user.name", "inbox.count"]);
    }

    #[test]
    fn function_dependencies_are_substituted_transitively() {
        let mut deps = IndexMap::new();
        deps.insert("total".to_string(), DepSet::from_iter([Dependency::root("sum")]));
        deps.insert("sum".to_string(), DepSet::from_iter([Dependency::root("base"), Dependency::root("items")]));
        deps.insert("base".to_string(), DepSet::from_iter([Dependency::root("offset")]));
        let functions = IndexSet::from_iter(["sum".to_string(), "base".to_string()]);
        substitute_functions(&mut deps, &functions);
        assert_eq!(names(&deps["total"]), ["sum", "base", "items", "offset"]);
    }
}
