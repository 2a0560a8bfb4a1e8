//! # Containers, Bindings, and Handlers
//!
//! Strata is the state engine behind a declarative component tree. The markup
//! layer hands it definition trees whose bindings and handlers are already
//! parsed; the engine decides what every component sees and what a handler's
//! writes do. There are three main pieces:
//!
//! - [`Container`]: a state boundary. It layers parent state, its own store,
//!   context variables, resolved locals and routing parameters into one
//!   composed state.
//! - [`Resolver`]: resolves declared variables and functions with dependency
//!   tracking and a memo cache, in two passes so declarations may reference
//!   each other in any order.
//! - [`execute_async`]: runs handler statements, committing writes as atomic
//!   patches through a host [`Scheduler`] and suspending between them.
//!
//! ## Composing state
//!
//! ```rust
//! use std::rc::Rc;
//! use strata_core::*;
//!
//! let engine = Rc::new(Engine::default());
//! let root = Container::root(engine, "root");
//! root.define(
//!     &ComponentDef::new("App")
//!         .var("count", Binding::literal(1))
//!         .var(
//!             "double",
//!             Binding::expr("count * 2", Expr::binary(BinaryOp::Mul, Expr::ident("count"), Expr::lit(2))),
//!         ),
//! );
//! let state = root.compose(Rc::default(), Rc::default()).unwrap();
//! assert_eq!(state[&StateKey::named("double")], Value::from(2));
//! ```
//!
//! Locals win over same-named parent state, and a container that declares
//! `uses` only inherits the names it lists (`uses: []` inherits nothing).
//! Routing parameters (`$pathname`, `$routeParams`, ...) are never filtered.
//!
//! ## Running handlers
//!
//! A handler's writes are recorded, not applied. At each top-level statement
//! boundary, and after each iteration of a top-level loop, the writes made
//! since the last boundary become one [`Patch`]. The executor submits it to
//! the scheduler and waits until it is applied, then continues against the
//! freshly composed state:
//!
//! ```rust
//! use std::rc::Rc;
//! use strata_core::*;
//!
//! let root = Container::root(Rc::new(Engine::default()), "root");
//! root.define(&ComponentDef::new("App").var("x", Binding::literal(0)));
//! root.compose(Rc::default(), Rc::default()).unwrap();
//!
//! let handler = root
//!     .lookup_action(
//!         Some(&ActionSource::statements(
//!             "x = x + 1",
//!             vec![Stmt::expr(Expr::assign(
//!                 Expr::ident("x"),
//!                 Expr::binary(BinaryOp::Add, Expr::ident("x"), Expr::lit(1)),
//!             ))],
//!         )),
//!         &ComponentUid::named("btn"),
//!         &LookupOptions::event("click"),
//!     )
//!     .unwrap();
//! pollster::block_on(handler(vec![])).unwrap();
//! assert_eq!(root.get("x"), Value::from(1));
//! ```
//!
//! Writes to a name starting with `$` (`$item`, `$routeParams`, ...) abort the
//! handler with [`ExecError::ReadOnly`] and cannot be caught by `try`.
//!
//! ## Diagnostics
//!
//! Every [`Engine`] carries a [`Diagnostics`] handle: render counts per
//! container, commits, handler errors and registration gaps. Inject one per
//! application run and `reset()` it between tests.

pub mod action;
pub mod ast;
pub mod builtins;
pub mod compose;
pub mod config;
pub mod container;
pub mod definition;
pub mod deps;
pub mod diagnostics;
pub mod error;
pub mod executor;
pub mod interp;
pub mod key;
pub mod path;
pub mod reducer;
pub mod resolver;
pub mod scheduler;
pub mod value;

#[cfg(test)]
mod tests;

pub use action::{ActionSource, AsyncHandler, HandlerCode, LookupOptions, SyncHandler};
pub use ast::*;
pub use compose::{ApiRegistry, StateMap};
pub use config::*;
pub use container::{Container, Engine};
pub use definition::{ComponentDef, Script};
pub use diagnostics::{Diagnostics, DiagnosticsSnapshot, HandlerErrorRecord};
pub use error::*;
pub use executor::{Lifecycle, execute_async, execute_sync};
pub use interp::{Change, ChangeKind, Interpreter};
pub use key::{ComponentUid, StateKey};
pub use path::{Path, PathSegment};
pub use reducer::{ContainerAction, ContainerReducer, ContainerState, StateHolder};
pub use resolver::{BindingEvaluator, Declaration, InterpreterEvaluator, Resolver};
pub use scheduler::{ImmediateScheduler, Patch, QueuedScheduler, Scheduler, YieldNow};
pub use value::{Function, Object, Value};
