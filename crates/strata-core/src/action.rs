//! Turning an event's handler source into something callable.
//!
//! Sources are either host callables, passed through as they are, or parsed
//! code. Parsed statement lists run on the async executor; synchronous
//! callbacks must be a single arrow expression. A component without an
//! explicit handler falls back to the conventional `<uid>_on<Event>`
//! function if its container declares one.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use futures::FutureExt;
use futures::future::LocalBoxFuture;

use crate::ast::{ArrowBody, ArrowExpr, Element, Expr, Stmt};
use crate::container::Container;
use crate::error::{ActionError, ExecError, StateError};
use crate::executor::{Lifecycle, execute_async, execute_sync};
use crate::key::{ComponentUid, StateKey};
use crate::value::{Object, Value};

pub type AsyncHandler = Rc<dyn Fn(Vec<Value>) -> LocalBoxFuture<'static, Result<Value, ExecError>>>;
pub type SyncHandler = Rc<dyn Fn(Vec<Value>) -> Result<Value, ExecError>>;

/// Parsed handler code.
#[derive(Debug)]
pub struct HandlerCode {
    pub source: Rc<str>,
    statements: Rc<Vec<Stmt>>,
    params: Vec<String>,
    arrow: bool,
}

impl HandlerCode {
    pub fn statements(source: &str, statements: Vec<Stmt>) -> Self {
        Self {
            source: Rc::from(source),
            statements: Rc::new(statements),
            params: Vec::new(),
            arrow: false,
        }
    }

    pub fn arrow(source: &str, arrow: &ArrowExpr) -> Self {
        let statements = match &arrow.body {
            ArrowBody::Expr(e) => vec![Stmt::Return(Some((**e).clone()))],
            ArrowBody::Block(stmts) => stmts.clone(),
        };
        Self {
            source: Rc::from(source),
            statements: Rc::new(statements),
            params: arrow.params.clone(),
            arrow: true,
        }
    }

    pub fn is_arrow(&self) -> bool {
        self.arrow
    }

    /// Handler locals: extra context, `$param`/`$params`, then the arrow's
    /// own parameters bound positionally.
    fn frame(&self, args: &[Value], context: &Object) -> Object {
        let mut frame = context.clone();
        frame.insert(
            "$param".into(),
            args.first().cloned().unwrap_or_default(),
        );
        frame.insert("$params".into(), Value::array(args.to_vec()));
        for (i, p) in self.params.iter().enumerate() {
            frame.insert(p.clone(), args.get(i).cloned().unwrap_or_default());
        }
        frame
    }
}

#[derive(Clone)]
pub enum ActionSource {
    Callable(AsyncHandler),
    SyncCallable(SyncHandler),
    Code(Rc<HandlerCode>),
}

impl ActionSource {
    pub fn statements(source: &str, statements: Vec<Stmt>) -> Self {
        ActionSource::Code(Rc::new(HandlerCode::statements(source, statements)))
    }

    /// Wraps an arrow expression; any other expression becomes a single
    /// expression statement.
    pub fn expr(source: &str, expr: Expr) -> Self {
        if let Some(arrow) = expr.as_arrow() {
            return ActionSource::Code(Rc::new(HandlerCode::arrow(source, arrow)));
        }
        Self::statements(source, vec![Stmt::Expr(expr)])
    }

    pub fn callable(
        f: impl Fn(Vec<Value>) -> LocalBoxFuture<'static, Result<Value, ExecError>> + 'static,
    ) -> Self {
        ActionSource::Callable(Rc::new(f))
    }

    pub fn sync(f: impl Fn(Vec<Value>) -> Result<Value, ExecError> + 'static) -> Self {
        ActionSource::SyncCallable(Rc::new(f))
    }

    fn source_text(&self) -> Option<&str> {
        match self {
            ActionSource::Code(code) => Some(&code.source),
            _ => None,
        }
    }
}

impl fmt::Debug for ActionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionSource::Callable(_) => f.write_str("Callable"),
            ActionSource::SyncCallable(_) => f.write_str("SyncCallable"),
            ActionSource::Code(code) => write!(f, "Code({:?})", code.source),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct LookupOptions {
    pub event: Option<String>,
    /// Skip the cache; used for one-off handlers built during a render.
    pub ephemeral: bool,
    pub context: Object,
}

impl LookupOptions {
    pub fn event(event: &str) -> Self {
        Self {
            event: Some(event.to_string()),
            ..Self::default()
        }
    }

    pub fn ephemeral(mut self) -> Self {
        self.ephemeral = true;
        self
    }

    pub fn with_context(mut self, name: &str, value: Value) -> Self {
        self.context.insert(name.to_string(), value);
        self
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct ActionKey {
    owner: u64,
    event: String,
    source: String,
}

/// Per-container cache of handlers built from code.
#[derive(Default)]
pub struct ActionCache {
    entries: RefCell<HashMap<ActionKey, AsyncHandler>>,
}

impl ActionCache {
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

pub(crate) fn lookup_action(
    container: &Rc<Container>,
    source: Option<&ActionSource>,
    owner: &ComponentUid,
    options: &LookupOptions,
) -> Option<AsyncHandler> {
    let source = match source {
        Some(ActionSource::Callable(f)) => return Some(f.clone()),
        Some(ActionSource::SyncCallable(f)) => {
            let f = f.clone();
            return Some(Rc::new(move |args: Vec<Value>| {
                let result = f(args);
                async move { result }.boxed_local()
            }));
        }
        Some(code) => code.clone(),
        None => convention_source(container, owner, options.event.as_deref()?)?,
    };
    let ActionSource::Code(code) = source else {
        return None;
    };

    let key = ActionKey {
        owner: owner.id(),
        event: options.event.clone().unwrap_or_default(),
        source: code.source.to_string(),
    };
    if !options.ephemeral
        && let Some(cached) = container.actions().entries.borrow().get(&key)
    {
        return Some(cached.clone());
    }

    let handler = code_handler(container, code, owner, options);
    if !options.ephemeral {
        container
            .actions()
            .entries
            .borrow_mut()
            .insert(key, handler.clone());
    }
    Some(handler)
}

/// `btn` + `click` resolves to the function `btn_onClick` when it is in
/// scope.
fn convention_source(
    container: &Container,
    owner: &ComponentUid,
    event: &str,
) -> Option<ActionSource> {
    let name = container
        .engine()
        .config
        .convention_handler_name(owner.description()?, event);
    let composed = container.composed();
    match composed.get(&StateKey::named(name.as_str())) {
        Some(Value::Function(_)) => {
            log::debug!("using conventional handler {name}");
            let call = Expr::Call {
                callee: Box::new(Expr::ident(&name)),
                args: vec![Element::Spread(Expr::ident("$params"))],
            };
            Some(ActionSource::statements(&name, vec![Stmt::Return(Some(call))]))
        }
        _ => None,
    }
}

fn code_handler(
    container: &Rc<Container>,
    code: Rc<HandlerCode>,
    owner: &ComponentUid,
    options: &LookupOptions,
) -> AsyncHandler {
    let weak = Rc::downgrade(container);
    let owner = owner.clone();
    let event = options.event.clone();
    let context = options.context.clone();
    Rc::new(move |args: Vec<Value>| {
        let Some(container) = weak.upgrade() else {
            return async { Err(ExecError::State(StateError::ContainerGone)) }.boxed_local();
        };
        let frame = code.frame(&args, &context);
        let lifecycle = event.clone().map(|event| Lifecycle {
            owner: owner.clone(),
            event,
        });
        execute_async(container, code.statements.clone(), frame, lifecycle).boxed_local()
    })
}

pub(crate) fn lookup_sync_callback(
    container: &Rc<Container>,
    source: &ActionSource,
) -> Result<SyncHandler, ActionError> {
    match source {
        ActionSource::Callable(_) => Err(ActionError::NotSynchronous),
        ActionSource::SyncCallable(f) => Ok(f.clone()),
        ActionSource::Code(code) if code.is_arrow() => {
            let weak = Rc::downgrade(container);
            let code = code.clone();
            Ok(Rc::new(move |args: Vec<Value>| -> Result<Value, ExecError> {
                let container = weak.upgrade().ok_or(StateError::ContainerGone)?;
                execute_sync(&container, &code.statements, code.frame(&args, &Object::new()))
            }))
        }
        other => Err(ActionError::ArrowRequired(
            other.source_text().unwrap_or_default().to_string(),
        )),
    }
}
