//! The render-pass host.
//!
//! A [`Runtime`] owns everything that outlives one pass: the registry, the
//! engine (scheduler and diagnostics), the routing layer and the container
//! of every state boundary, keyed by tree position. A container visited in a
//! pass is reused by the next one; a container not visited is unmounted.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use slotmap::{SlotMap, new_key_type};
use strata_core::{
    AsyncHandler, ComponentDef, Container, Diagnostics, Engine, ExecError, StateMap, Value,
};

use crate::error::RenderError;
use crate::node::{Node, NodeRef};
use crate::registry::Registry;
use crate::walker::{BoundaryFlags, Scope, Walker, check_unique_uids};

new_key_type! {
    pub struct ContainerKey;
}

struct Slot {
    at: NodeRef,
    container: Rc<Container>,
    seen: u64,
}

/// Containers by tree position.
#[derive(Default)]
pub struct ContainerStore {
    slots: SlotMap<ContainerKey, Slot>,
    by_ref: HashMap<NodeRef, ContainerKey>,
}

impl ContainerStore {
    /// The container at `at`, created on first visit. A container whose
    /// parent or label no longer matches is unmounted and replaced.
    pub(crate) fn obtain(
        &mut self,
        at: &NodeRef,
        parent: &Rc<Container>,
        label: &str,
        pass: u64,
    ) -> Rc<Container> {
        if let Some(&key) = self.by_ref.get(at)
            && let Some(slot) = self.slots.get_mut(key)
        {
            let same_parent = slot
                .container
                .parent()
                .is_some_and(|p| Rc::ptr_eq(&p, parent));
            if same_parent && slot.container.label() == label {
                slot.seen = pass;
                return slot.container.clone();
            }
            log::debug!("container at {at} changed from '{}' to '{label}'", slot.container.label());
            slot.container.unmount();
            self.slots.remove(key);
        }

        let container = Container::child(parent, label);
        let key = self.slots.insert(Slot {
            at: at.clone(),
            container: container.clone(),
            seen: pass,
        });
        self.by_ref.insert(at.clone(), key);
        container
    }

    /// Unmounts and forgets every container not seen in `pass`.
    pub(crate) fn sweep(&mut self, pass: u64) -> usize {
        let stale: Vec<ContainerKey> = self
            .slots
            .iter()
            .filter(|(_, s)| s.seen != pass)
            .map(|(k, _)| k)
            .collect();
        for key in &stale {
            if let Some(slot) = self.slots.remove(*key) {
                self.by_ref.remove(&slot.at);
                slot.container.unmount();
            }
        }
        stale.len()
    }

    pub fn get(&self, at: &NodeRef) -> Option<Rc<Container>> {
        let key = self.by_ref.get(at)?;
        self.slots.get(*key).map(|s| s.container.clone())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn clear(&mut self) {
        for (_, slot) in self.slots.drain() {
            slot.container.unmount();
        }
        self.by_ref.clear();
    }
}

pub struct Runtime {
    engine: Rc<Engine>,
    registry: Registry,
    root: Rc<Container>,
    store: RefCell<ContainerStore>,
    routing: Rc<StateMap>,
    pass: u64,
    last: Option<Node>,
}

impl Runtime {
    pub fn new(registry: Registry) -> Self {
        Self::with_engine(registry, Rc::new(Engine::default()))
    }

    pub fn with_engine(registry: Registry, engine: Rc<Engine>) -> Self {
        Self {
            root: Container::root(engine.clone(), "root"),
            engine,
            registry,
            store: RefCell::new(ContainerStore::default()),
            routing: Rc::default(),
            pass: 0,
            last: None,
        }
    }

    pub fn engine(&self) -> &Rc<Engine> {
        &self.engine
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.engine.diagnostics
    }

    /// The application-level container every tree renders under. Writes to
    /// names no container declares land here.
    pub fn root(&self) -> &Rc<Container> {
        &self.root
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Replaces the routing layer seen by every container from the next pass.
    pub fn set_routing(&mut self, routing: StateMap) {
        self.routing = Rc::new(routing);
    }

    pub fn container_at(&self, at: &str) -> Option<Rc<Container>> {
        self.store.borrow().get(&NodeRef::from(at))
    }

    pub fn container_count(&self) -> usize {
        self.store.borrow().len()
    }

    pub fn pass(&self) -> u64 {
        self.pass
    }

    /// Renders `def` as the whole tree. On failure the previous tree and
    /// all containers are kept.
    pub fn render(&mut self, def: &ComponentDef) -> Result<Node, RenderError> {
        self.pass += 1;
        log::trace!("render pass {}", self.pass);
        let state = self.root.compose(Rc::default(), self.routing.clone())?;
        if !BoundaryFlags::of(def).is_boundary() {
            check_unique_uids(def, self.root.label())?;
        }

        let walker = Walker {
            registry: &self.registry,
            store: &self.store,
            routing: &self.routing,
            diagnostics: &self.engine.diagnostics,
            pass: self.pass,
        };
        let scope = Scope::new(self.root.clone(), state);
        let node = walker
            .render_node(def, &scope, NodeRef::root())?
            .unwrap_or_else(|| Node::new(NodeRef::root(), "Fragment"));

        let swept = self.store.borrow_mut().sweep(self.pass);
        if swept > 0 {
            log::debug!("pass {} unmounted {swept} container(s)", self.pass);
        }
        self.last = Some(node.clone());
        Ok(node)
    }

    /// The tree of the last successful pass.
    pub fn last(&self) -> Option<&Node> {
        self.last.as_ref()
    }

    pub fn handler(&self, uid: &str, event: &str) -> Option<AsyncHandler> {
        self.last.as_ref()?.find(uid)?.handlers.get(event).cloned()
    }

    /// Invokes the `event` handler of the node with `uid` in the last tree.
    pub fn fire(
        &self,
        uid: &str,
        event: &str,
        args: Vec<Value>,
    ) -> Option<LocalBoxFuture<'static, Result<Value, ExecError>>> {
        let handler = self.handler(uid, event);
        if handler.is_none() {
            log::debug!("no '{event}' handler on '{uid}'");
        }
        handler.map(|h| h(args))
    }

    /// Like [`Runtime::fire`], addressing the node by position.
    pub fn fire_at(
        &self,
        at: &str,
        event: &str,
        args: Vec<Value>,
    ) -> Option<LocalBoxFuture<'static, Result<Value, ExecError>>> {
        let h = self.last.as_ref()?.find_at(at)?.handlers.get(event)?.clone();
        Some(h(args))
    }

    /// Unmounts every container, releasing suspended handlers.
    pub fn unmount(&mut self) {
        self.store.borrow_mut().clear();
        self.root.unmount();
        self.last = None;
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.unmount();
    }
}
