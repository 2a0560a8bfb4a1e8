//! Statement execution for event handlers.
//!
//! The synchronous path evaluates against one snapshot and discards writes.
//! The asynchronous path commits: at every top-level statement boundary and
//! after every iteration of a loop, at any nesting depth, it turns the
//! writes recorded since the last checkpoint into one [`Patch`], hands it to
//! the scheduler and suspends until it is applied (or the container
//! unmounts). Execution then continues against the freshly composed state.
//! Checkpoints without writes only yield every `yield_every` times.

use std::rc::Rc;

use futures::FutureExt;
use futures::future::{Either, LocalBoxFuture, select};

use crate::ast::{CatchClause, Expr, Stmt};
use crate::container::{Container, Engine};
use crate::error::{EvalError, ExecError};
use crate::interp::{Flow, Interpreter, error_value, is_catchable};
use crate::key::ComponentUid;
use crate::reducer::ContainerAction;
use crate::scheduler::{Patch, YieldNow};
use crate::value::{Object, Value};

/// Owner and event a handler run reports its progress flags under.
#[derive(Clone, Debug)]
pub struct Lifecycle {
    pub owner: ComponentUid,
    pub event: String,
}

impl Lifecycle {
    /// Flags are only tracked for owners that can be addressed by name.
    fn is_tracked(&self) -> bool {
        self.owner.description().is_some() && !self.event.is_empty()
    }
}

/// Runs `statements` to completion against a single snapshot of the
/// container's state. Writes are visible to later statements of the same run
/// and are then dropped. Failures are reported like async handler failures.
pub fn execute_sync(
    container: &Container,
    statements: &[Stmt],
    frame: Object,
) -> Result<Value, ExecError> {
    let mut interp = Interpreter::new(container.composed()).with_frame(frame);
    interp.run(statements).map_err(|e| {
        container
            .engine()
            .diagnostics
            .record_handler_error(container.label(), "", &e.to_string());
        ExecError::from(e)
    })
}

pub async fn execute_async(
    container: Rc<Container>,
    statements: Rc<Vec<Stmt>>,
    frame: Object,
    lifecycle: Option<Lifecycle>,
) -> Result<Value, ExecError> {
    let engine = container.engine().clone();
    let lifecycle = lifecycle.filter(Lifecycle::is_tracked);

    if let Some(l) = &lifecycle {
        container.dispatch(ContainerAction::EventHandlerStarted {
            uid: l.owner.clone(),
            event: l.event.clone(),
        })?;
    }

    let result = match container.refresh() {
        Ok(base) => {
            let mut run = AsyncRun {
                interp: Interpreter::new(base).with_frame(frame),
                container: container.clone(),
                engine: engine.clone(),
                idle: 0,
            };
            run.run(&statements).await
        }
        Err(e) => Err(e.into()),
    };

    match result {
        Ok(value) => {
            if let Some(l) = lifecycle {
                container.dispatch(ContainerAction::EventHandlerCompleted {
                    uid: l.owner,
                    event: l.event,
                })?;
            }
            Ok(value)
        }
        Err(err) => {
            let (owner, event) = match &lifecycle {
                Some(l) => (
                    l.owner.description().unwrap_or_default().to_string(),
                    l.event.clone(),
                ),
                None => (container.label().to_string(), String::new()),
            };
            engine
                .diagnostics
                .record_handler_error(&owner, &event, &err.to_string());
            if let Some(l) = lifecycle {
                let dispatched = container.dispatch(ContainerAction::EventHandlerError {
                    uid: l.owner,
                    event: l.event,
                    error: Value::from(err.to_string()),
                });
                if let Err(e) = dispatched {
                    log::warn!("could not record handler error: {e}");
                }
            }
            Err(err)
        }
    }
}

struct AsyncRun {
    interp: Interpreter,
    container: Rc<Container>,
    engine: Rc<Engine>,
    idle: usize,
}

impl AsyncRun {
    async fn run(&mut self, statements: &[Stmt]) -> Result<Value, ExecError> {
        for stmt in statements {
            match self.exec(stmt).await? {
                Flow::Normal => self.checkpoint().await?,
                Flow::Return(value) => {
                    self.checkpoint().await?;
                    return Ok(value);
                }
                Flow::Break => return Err(EvalError::IllegalJump("break").into()),
                Flow::Continue => return Err(EvalError::IllegalJump("continue").into()),
            }
        }
        Ok(Value::Undefined)
    }

    /// Walks the statements that can contain a loop, so that a loop at any
    /// depth checkpoints after each iteration. Everything else goes straight
    /// to the interpreter.
    fn exec<'a>(&'a mut self, stmt: &'a Stmt) -> LocalBoxFuture<'a, Result<Flow, ExecError>> {
        async move {
            match stmt {
                Stmt::Block(body) => {
                    self.interp.push_frame();
                    let result = self.exec_all(body).await;
                    self.interp.pop_frame();
                    result
                }
                Stmt::If {
                    test,
                    then,
                    otherwise,
                } => {
                    if self.interp.eval(test)?.is_truthy() {
                        self.exec(then).await
                    } else if let Some(o) = otherwise {
                        self.exec(o).await
                    } else {
                        Ok(Flow::Normal)
                    }
                }
                Stmt::While { .. } | Stmt::DoWhile { .. } | Stmt::For { .. } | Stmt::ForOf { .. } => {
                    self.run_loop(stmt).await
                }
                Stmt::Try {
                    block,
                    catch,
                    finally,
                } => self.run_try(block, catch.as_ref(), finally.as_deref()).await,
                other => Ok(self.interp.exec(other)?),
            }
        }
        .boxed_local()
    }

    async fn exec_all(&mut self, stmts: &[Stmt]) -> Result<Flow, ExecError> {
        for stmt in stmts {
            match self.exec(stmt).await? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    /// A loop, with a checkpoint after each iteration.
    async fn run_loop(&mut self, stmt: &Stmt) -> Result<Flow, ExecError> {
        match stmt {
            Stmt::While { test, body } => {
                while self.interp.eval(test)?.is_truthy() {
                    match self.exec(body).await? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                    self.checkpoint().await?;
                }
            }
            Stmt::DoWhile { body, test } => loop {
                match self.exec(body).await? {
                    Flow::Break => break,
                    Flow::Return(v) => return Ok(Flow::Return(v)),
                    Flow::Normal | Flow::Continue => {}
                }
                self.checkpoint().await?;
                if !self.interp.eval(test)?.is_truthy() {
                    break;
                }
            },
            Stmt::For {
                init,
                test,
                update,
                body,
            } => {
                self.interp.push_frame();
                let result = self
                    .run_for(init.as_deref(), test.as_ref(), update.as_ref(), body)
                    .await;
                self.interp.pop_frame();
                return result;
            }
            Stmt::ForOf {
                binding,
                iterable,
                body,
            } => {
                let items = self.interp.iterate(iterable)?;
                for item in items {
                    self.interp.push_frame();
                    self.interp.declare(binding, item, false);
                    let flow = self.exec(body).await;
                    self.interp.pop_frame();
                    match flow? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                    self.checkpoint().await?;
                }
            }
            other => return Ok(self.interp.exec(other)?),
        }
        Ok(Flow::Normal)
    }

    async fn run_for(
        &mut self,
        init: Option<&Stmt>,
        test: Option<&Expr>,
        update: Option<&Expr>,
        body: &Stmt,
    ) -> Result<Flow, ExecError> {
        if let Some(init) = init {
            self.interp.exec(init)?;
        }
        loop {
            if let Some(t) = test
                && !self.interp.eval(t)?.is_truthy()
            {
                break;
            }
            match self.exec(body).await? {
                Flow::Break => break,
                Flow::Return(v) => return Ok(Flow::Return(v)),
                Flow::Normal | Flow::Continue => {}
            }
            if let Some(u) = update {
                self.interp.eval(u)?;
            }
            self.checkpoint().await?;
        }
        Ok(Flow::Normal)
    }

    /// Same catch rules as the interpreter: read-only aborts and failed
    /// commits are not catchable.
    async fn run_try(
        &mut self,
        block: &[Stmt],
        catch: Option<&CatchClause>,
        finally: Option<&[Stmt]>,
    ) -> Result<Flow, ExecError> {
        self.interp.push_frame();
        let mut result = self.exec_all(block).await;
        self.interp.pop_frame();
        let handler = match (&result, catch) {
            (Err(ExecError::Eval(err)), Some(clause)) if is_catchable(err) => {
                Some((error_value(err), clause))
            }
            _ => None,
        };
        if let Some((caught, clause)) = handler {
            self.interp.push_frame();
            if let Some(p) = &clause.param {
                self.interp.declare(p, caught, false);
            }
            result = self.exec_all(&clause.body).await;
            self.interp.pop_frame();
        }
        if let Some(fin) = finally {
            self.interp.push_frame();
            let fin_flow = self.exec_all(fin).await;
            self.interp.pop_frame();
            match fin_flow? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        result
    }

    async fn checkpoint(&mut self) -> Result<(), ExecError> {
        if !self.interp.has_changes() {
            self.idle += 1;
            if self.idle >= self.engine.config.yield_every {
                self.idle = 0;
                self.engine.scheduler.yield_low_priority().await;
            }
            return Ok(());
        }
        self.idle = 0;

        let patch = Patch::new(&self.container, self.interp.take_changes());
        log::debug!(
            "committing {} change(s) from '{}'",
            patch.len(),
            self.container.label()
        );
        if self.container.is_mounted() {
            let released = self.container.suspend();
            match select(self.engine.scheduler.commit(patch), released).await {
                Either::Left((result, _)) => result?,
                Either::Right(_) => log::debug!("'{}' unmounted while suspended", self.container.label()),
            }
        } else {
            patch.apply()?;
            YieldNow::default().await;
        }

        let fresh = self.container.refresh()?;
        self.interp.rebase(fresh);
        Ok(())
    }
}
