//! Host capability the async executor suspends on.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll};

use futures::channel::oneshot;
use futures::future::LocalBoxFuture;
use futures::FutureExt;

use crate::container::Container;
use crate::error::StateError;
use crate::interp::Change;

/// Changes produced during one suspension interval, in write order.
pub struct Patch {
    target: Weak<Container>,
    pub changes: Vec<Change>,
}

impl Patch {
    pub fn new(target: &Rc<Container>, changes: Vec<Change>) -> Self {
        Self {
            target: Rc::downgrade(target),
            changes: coalesce(changes),
        }
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn apply(self) -> Result<(), StateError> {
        let target = self.target.upgrade().ok_or(StateError::ContainerGone)?;
        target.apply_patch(self.changes)
    }
}

/// Drops writes that a later whole-root write to the same variable
/// supersedes, so the store never sees the intermediate values.
fn coalesce(changes: Vec<Change>) -> Vec<Change> {
    let mut out: Vec<Change> = Vec::with_capacity(changes.len());
    for change in changes {
        if change.path.is_empty() {
            out.retain(|earlier| earlier.root != change.root);
        }
        out.push(change);
    }
    out
}

pub trait Scheduler {
    /// Resolves at the host's next idle opportunity.
    fn yield_low_priority(&self) -> LocalBoxFuture<'static, ()>;

    /// Resolves once `patch` has been applied.
    fn commit(&self, patch: Patch) -> LocalBoxFuture<'static, Result<(), StateError>>;
}

/// Applies every patch on the spot.
#[derive(Default)]
pub struct ImmediateScheduler;

impl Scheduler for ImmediateScheduler {
    fn yield_low_priority(&self) -> LocalBoxFuture<'static, ()> {
        YieldNow::default().boxed_local()
    }

    fn commit(&self, patch: Patch) -> LocalBoxFuture<'static, Result<(), StateError>> {
        let result = patch.apply();
        async move {
            result?;
            YieldNow::default().await;
            Ok(())
        }
        .boxed_local()
    }
}

/// Holds patches until the host calls [`QueuedScheduler::flush`], typically
/// once per frame.
#[derive(Default)]
pub struct QueuedScheduler {
    queue: RefCell<VecDeque<(Patch, oneshot::Sender<Result<(), StateError>>)>>,
    render_requested: Cell<bool>,
}

impl QueuedScheduler {
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Whether a flush has applied changes since the last call.
    pub fn take_render_request(&self) -> bool {
        self.render_requested.replace(false)
    }

    /// Applies queued patches in submission order and wakes their handlers.
    pub fn flush(&self) -> usize {
        let mut applied = 0;
        loop {
            let next = self.queue.borrow_mut().pop_front();
            let Some((patch, done)) = next else {
                break;
            };
            let result = patch.apply();
            if let Err(e) = &result {
                log::warn!("queued patch rejected: {e}");
            }
            applied += 1;
            self.render_requested.set(true);
            let _ = done.send(result);
        }
        applied
    }
}

impl Scheduler for QueuedScheduler {
    fn yield_low_priority(&self) -> LocalBoxFuture<'static, ()> {
        YieldNow::default().boxed_local()
    }

    fn commit(&self, patch: Patch) -> LocalBoxFuture<'static, Result<(), StateError>> {
        let (tx, rx) = oneshot::channel();
        self.queue.borrow_mut().push_back((patch, tx));
        async move { rx.await.unwrap_or(Err(StateError::ContainerGone)) }.boxed_local()
    }
}

/// Returns `Pending` once, waking itself, then completes.
#[derive(Default)]
pub struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            Poll::Ready(())
        } else {
            self.yielded = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}
