//! State boundaries.
//!
//! Every component that declares state (loaders, variables, functions, a
//! script, `uses`, context variables, or an explicit container flag) gets a
//! [`Container`]. Plain components share their nearest ancestor's. A
//! container owns its reducer store, memo cache, action cache and component
//! API registry, and remembers the inputs of its last composition so a
//! running handler can recompose it after each commit.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use futures::channel::oneshot;

use crate::action::{self, ActionCache, ActionSource, AsyncHandler, LookupOptions, SyncHandler};
use crate::ast::Binding;
use crate::compose::{ApiRegistry, Layers, StateMap, compose, resolution_scope};
use crate::config::EngineConfig;
use crate::definition::ComponentDef;
use crate::diagnostics::Diagnostics;
use crate::error::{ActionError, ResolveError, StateError};
use crate::interp::{Change, ChangeKind};
use crate::key::{ComponentUid, StateKey};
use crate::path::Path;
use crate::reducer::{ContainerAction, ContainerReducer, ContainerState, StateHolder};
use crate::resolver::{BindingEvaluator, Declaration, InterpreterEvaluator, Resolver};
use crate::scheduler::{ImmediateScheduler, Scheduler};
use crate::value::{Object, Value};

/// Collaborators shared by every container of one application run.
pub struct Engine {
    pub config: EngineConfig,
    pub scheduler: Rc<dyn Scheduler>,
    pub diagnostics: Diagnostics,
    evaluator: Rc<dyn BindingEvaluator>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(Rc::new(ImmediateScheduler))
    }
}

impl Engine {
    pub fn new(scheduler: Rc<dyn Scheduler>) -> Self {
        Self {
            config: EngineConfig::default(),
            scheduler,
            diagnostics: Diagnostics::new(),
            evaluator: Rc::new(InterpreterEvaluator),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn with_evaluator(mut self, evaluator: Rc<dyn BindingEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }
}

/// What a container declares, refreshed from its definition every pass.
#[derive(Default)]
struct Declared {
    declarations: Vec<Declaration>,
    uses: Option<Vec<String>>,
    context: Object,
}

impl Declared {
    fn declares(&self, name: &str) -> bool {
        self.declarations.iter().any(|d| d.name == name)
    }

    fn literal_default(&self, name: &str) -> Option<Value> {
        self.declarations.iter().find_map(|d| match &d.binding {
            Binding::Literal(v) if d.name == name => Some(v.clone()),
            _ => None,
        })
    }
}

pub struct Container {
    engine: Rc<Engine>,
    label: String,
    parent: Option<Weak<Container>>,
    declared: RefCell<Declared>,
    state: RefCell<ContainerState>,
    apis: RefCell<ApiRegistry>,
    resolver: Resolver,
    actions: ActionCache,
    uids: RefCell<HashMap<String, ComponentUid>>,
    parent_state: RefCell<Rc<StateMap>>,
    routing: RefCell<Rc<StateMap>>,
    composed: RefCell<Rc<StateMap>>,
    mounted: Cell<bool>,
    suspensions: RefCell<Vec<oneshot::Sender<()>>>,
}

impl Container {
    pub fn root(engine: Rc<Engine>, label: &str) -> Rc<Container> {
        Self::create(engine, label, None)
    }

    pub fn child(parent: &Rc<Container>, label: &str) -> Rc<Container> {
        Self::create(parent.engine.clone(), label, Some(Rc::downgrade(parent)))
    }

    fn create(engine: Rc<Engine>, label: &str, parent: Option<Weak<Container>>) -> Rc<Container> {
        log::debug!("mounting container '{label}'");
        Rc::new(Container {
            resolver: Resolver::new(engine.evaluator.clone()),
            engine,
            label: label.to_string(),
            parent,
            declared: RefCell::new(Declared::default()),
            state: RefCell::new(ContainerReducer::initial_state()),
            apis: RefCell::new(ApiRegistry::new()),
            actions: ActionCache::default(),
            uids: RefCell::new(HashMap::new()),
            parent_state: RefCell::new(Rc::new(StateMap::new())),
            routing: RefCell::new(Rc::new(StateMap::new())),
            composed: RefCell::new(Rc::new(StateMap::new())),
            mounted: Cell::new(true),
            suspensions: RefCell::new(Vec::new()),
        })
    }

    pub fn engine(&self) -> &Rc<Engine> {
        &self.engine
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn parent(&self) -> Option<Rc<Container>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub(crate) fn actions(&self) -> &ActionCache {
        &self.actions
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.get()
    }

    /// Snapshot of the reducer store.
    pub fn state(&self) -> ContainerState {
        self.state.borrow().clone()
    }

    /// State as of the last composition.
    pub fn composed(&self) -> Rc<StateMap> {
        self.composed.borrow().clone()
    }

    pub fn get(&self, name: &str) -> Value {
        self.composed
            .borrow()
            .get(&StateKey::named(name))
            .cloned()
            .unwrap_or_default()
    }

    /// Takes the declarations of `def` for the coming compositions.
    pub fn define(&self, def: &ComponentDef) {
        *self.declared.borrow_mut() = Declared {
            declarations: def.declarations(),
            uses: def.uses.clone(),
            context: def.context_vars.clone(),
        };
    }

    pub fn declares(&self, name: &str) -> bool {
        self.declared.borrow().declares(name)
    }

    /// Stable identity for the component keyed `key` inside this container.
    pub fn uid_for(&self, key: &str, description: Option<&str>) -> ComponentUid {
        self.uids
            .borrow_mut()
            .entry(key.to_string())
            .or_insert_with(|| ComponentUid::new(description))
            .clone()
    }

    /// Composes this container's state from its parent's and the routing
    /// layer, counting one render.
    pub fn compose(
        &self,
        parent: Rc<StateMap>,
        routing: Rc<StateMap>,
    ) -> Result<Rc<StateMap>, ResolveError> {
        *self.parent_state.borrow_mut() = parent;
        *self.routing.borrow_mut() = routing;
        self.engine.diagnostics.record_render(&self.label);
        self.recompose()
    }

    /// Recomposes from the stored inputs after refreshing every ancestor, so
    /// changes committed anywhere above are visible.
    pub fn refresh(&self) -> Result<Rc<StateMap>, ResolveError> {
        if let Some(parent) = self.parent() {
            let fresh = parent.refresh()?;
            *self.parent_state.borrow_mut() = fresh;
        }
        self.recompose()
    }

    /// Recomposes from the stored inputs, leaving the ancestors alone.
    pub fn recompose(&self) -> Result<Rc<StateMap>, ResolveError> {
        let declared = self.declared.borrow();
        let state = self.state();
        let apis = self.apis.borrow().clone();
        let parent = self.parent_state.borrow().clone();
        let routing = self.routing.borrow().clone();
        let empty = Object::new();

        let layers = Layers {
            parent: &parent,
            uses: declared.uses.as_deref(),
            reducer: state.map(),
            apis: &apis,
            context: &declared.context,
            locals: &empty,
            routing: &routing,
        };
        let scope = resolution_scope(&layers);
        let locals = self
            .resolver
            .resolve(&declared.declarations, &scope, state.map())?;
        let composed = Rc::new(compose(&Layers {
            locals: &locals,
            ..layers
        }));
        *self.composed.borrow_mut() = composed.clone();
        Ok(composed)
    }

    pub fn dispatch(&self, action: ContainerAction) -> Result<(), StateError> {
        let next = ContainerReducer::reduce(&self.state.borrow(), action)?;
        *self.state.borrow_mut() = next;
        Ok(())
    }

    /// Merges `api` into the methods registered for `uid`; existing methods
    /// not named in `api` are kept.
    pub fn register_component_api(&self, uid: &ComponentUid, api: Object) {
        let mut apis = self.apis.borrow_mut();
        let entry = apis.entry(uid.clone()).or_default();
        for (name, f) in api {
            entry.insert(name, f);
        }
    }

    pub fn lookup_action(
        self: &Rc<Self>,
        source: Option<&ActionSource>,
        owner: &ComponentUid,
        options: &LookupOptions,
    ) -> Option<AsyncHandler> {
        action::lookup_action(self, source, owner, options)
    }

    pub fn lookup_sync_callback(
        self: &Rc<Self>,
        source: &ActionSource,
    ) -> Result<SyncHandler, ActionError> {
        action::lookup_sync_callback(self, source)
    }

    /// Applies committed changes. Each change goes to the nearest container,
    /// starting here, that declares its root variable or already stores it;
    /// otherwise to the outermost container.
    pub fn apply_patch(self: &Rc<Self>, changes: Vec<Change>) -> Result<(), StateError> {
        let count = changes.len();
        for change in changes {
            let target = self.owner_of(&change.root);
            if !target.is_mounted() {
                log::warn!(
                    "applying change to '{}' in unmounted container '{}'",
                    change.root,
                    target.label
                );
            }
            target.apply_change(change)?;
        }
        self.engine.diagnostics.record_commit(count);
        Ok(())
    }

    fn owner_of(self: &Rc<Self>, root: &str) -> Rc<Container> {
        let mut current = self.clone();
        loop {
            if current.declares(root) || current.state.borrow().get_named(root).is_some() {
                return current;
            }
            match current.parent() {
                Some(parent) => current = parent,
                None => return current,
            }
        }
    }

    fn apply_change(&self, change: Change) -> Result<(), StateError> {
        let Change {
            root,
            path,
            value,
            kind,
        } = change;
        let resolved = self.get(&root);
        let declared_shape = self
            .declared
            .borrow()
            .literal_default(&root)
            .or_else(|| (!resolved.is_undefined()).then(|| resolved.clone()));

        // A partial write to a declared variable starts from its resolved
        // value so sibling members survive.
        if !path.is_empty()
            && self.state.borrow().get_named(&root).is_none()
            && !resolved.is_undefined()
        {
            self.dispatch(ContainerAction::StatePartChanged {
                root: root.clone(),
                path: Path::new(),
                value: resolved,
                kind: ChangeKind::Set,
                declared_shape: None,
            })?;
        }
        self.dispatch(ContainerAction::StatePartChanged {
            root,
            path,
            value,
            kind,
            declared_shape,
        })
    }

    /// Parks a running handler until its commit lands or this container
    /// unmounts.
    pub(crate) fn suspend(&self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.suspensions.borrow_mut();
        pending.retain(|s| !s.is_canceled());
        pending.push(tx);
        rx
    }

    pub fn pending_suspensions(&self) -> usize {
        self.suspensions
            .borrow()
            .iter()
            .filter(|s| !s.is_canceled())
            .count()
    }

    /// Marks the container unmounted and releases every suspended handler.
    pub fn unmount(&self) {
        if !self.mounted.replace(false) {
            return;
        }
        let pending = std::mem::take(&mut *self.suspensions.borrow_mut());
        log::debug!(
            "unmounting container '{}' ({} suspended handler(s))",
            self.label,
            pending.len()
        );
        for tx in pending {
            let _ = tx.send(());
        }
        self.actions.clear();
    }
}
