//! Recursive descent over definition trees.
//!
//! For each definition node the walker decides whether the node is a state
//! boundary. Boundaries get their own [`Container`] (reused across passes by
//! tree position); plain nodes render against their nearest ancestor's. The
//! renderer registered for the node's kind then produces the rendered node,
//! descending into children through its [`RenderContext`].

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use bitflags::bitflags;
use indexmap::IndexMap;
use strata_core::{
    ActionError, AsyncHandler, Binding, BindingEvaluator, ComponentDef, ComponentUid, Container,
    ContainerAction, Diagnostics, InterpreterEvaluator, Interpreter, LookupOptions, Object,
    StateMap, SyncHandler, Value,
};

use crate::error::RenderError;
use crate::loader;
use crate::node::{Node, NodeRef};
use crate::registry::Registry;
use crate::runtime::ContainerStore;

bitflags! {
    /// Which declarations make a node a state boundary.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct BoundaryFlags: u8 {
        const LOADERS = 1 << 0;
        const VARS = 1 << 1;
        const USES = 1 << 2;
        const CONTEXT_VARS = 1 << 3;
        const FUNCTIONS = 1 << 4;
        const SCRIPT = 1 << 5;
        const CONTAINER = 1 << 6;
    }
}

impl BoundaryFlags {
    pub fn of(def: &ComponentDef) -> Self {
        let mut flags = BoundaryFlags::empty();
        flags.set(BoundaryFlags::LOADERS, !def.loaders.is_empty());
        flags.set(BoundaryFlags::VARS, !def.vars.is_empty());
        flags.set(BoundaryFlags::USES, def.uses.is_some());
        flags.set(BoundaryFlags::CONTEXT_VARS, !def.context_vars.is_empty());
        flags.set(BoundaryFlags::FUNCTIONS, !def.functions.is_empty());
        flags.set(BoundaryFlags::SCRIPT, def.script.is_some());
        flags.set(BoundaryFlags::CONTAINER, def.container);
        flags
    }

    pub fn is_boundary(self) -> bool {
        !self.is_empty()
    }
}

/// The container a node renders against, with its composed state.
#[derive(Clone)]
pub struct Scope {
    pub container: Rc<Container>,
    pub state: Rc<StateMap>,
    claims: UidClaims,
}

impl Scope {
    pub(crate) fn new(container: Rc<Container>, state: Rc<StateMap>) -> Self {
        Self {
            container,
            state,
            claims: UidClaims::default(),
        }
    }
}

/// Uids taken in one container during the current pass, evaluated ones
/// included.
#[derive(Clone, Default)]
pub(crate) struct UidClaims(Rc<RefCell<HashSet<String>>>);

impl UidClaims {
    pub(crate) fn claim(&self, uid: &str, container: &Container) -> Result<(), RenderError> {
        if self.0.borrow_mut().insert(uid.to_string()) {
            Ok(())
        } else {
            Err(RenderError::DuplicateUid {
                uid: uid.to_string(),
                container: container.label().to_string(),
            })
        }
    }
}

fn literal_uid(def: &ComponentDef) -> Option<String> {
    match &def.uid {
        Some(Binding::Literal(v)) if !v.is_nullish() => Some(v.to_display_string()),
        _ => None,
    }
}

/// Fails if two loaders, or two handler-carrying nodes that would share this
/// node's container, declare the same literal uid. Evaluated uids are claimed
/// during the pass.
pub fn check_unique_uids(def: &ComponentDef, container: &str) -> Result<(), RenderError> {
    let mut seen = HashSet::new();
    let mut claim = |uid: String| {
        if seen.insert(uid.clone()) {
            Ok(())
        } else {
            Err(RenderError::DuplicateUid {
                uid,
                container: container.to_string(),
            })
        }
    };
    for l in &def.loaders {
        if let Some(uid) = literal_uid(l) {
            claim(uid)?;
        }
    }
    if !def.events.is_empty()
        && let Some(uid) = literal_uid(def)
    {
        claim(uid)?;
    }
    let mut stack: Vec<&ComponentDef> = def.children.iter().map(|c| c.as_ref()).collect();
    while let Some(node) = stack.pop() {
        if BoundaryFlags::of(node).is_boundary() {
            continue;
        }
        if !node.events.is_empty()
            && let Some(uid) = literal_uid(node)
        {
            claim(uid)?;
        }
        stack.extend(node.children.iter().map(|c| c.as_ref()));
    }
    Ok(())
}

pub(crate) fn evaluate(
    binding: &Binding,
    state: &Rc<StateMap>,
    kind: &str,
    name: &str,
) -> Result<Value, RenderError> {
    match binding {
        Binding::Literal(v) => Ok(v.clone()),
        other => InterpreterEvaluator
            .evaluate(other, state)
            .map_err(|error| RenderError::Prop {
                kind: kind.to_string(),
                name: name.to_string(),
                error,
            }),
    }
}

/// One render pass over a tree.
pub struct Walker<'a> {
    pub(crate) registry: &'a Registry,
    pub(crate) store: &'a RefCell<ContainerStore>,
    pub(crate) routing: &'a Rc<StateMap>,
    pub(crate) diagnostics: &'a Diagnostics,
    pub(crate) pass: u64,
}

impl Walker<'_> {
    pub(crate) fn uid_text(
        &self,
        def: &ComponentDef,
        state: &Rc<StateMap>,
    ) -> Result<Option<String>, RenderError> {
        let Some(binding) = &def.uid else {
            return Ok(None);
        };
        let v = evaluate(binding, state, &def.kind, "uid")?;
        Ok((!v.is_nullish()).then(|| v.to_display_string()))
    }

    pub fn render_node(
        &self,
        def: &ComponentDef,
        scope: &Scope,
        at: NodeRef,
    ) -> Result<Option<Node>, RenderError> {
        if let Some(when) = &def.when
            && !evaluate(when, &scope.state, &def.kind, "when")?.is_truthy()
        {
            log::trace!("{at} hidden by its guard");
            return Ok(None);
        }
        let uid_text = self.uid_text(def, &scope.state)?;

        let own = if BoundaryFlags::of(def).is_boundary() {
            self.enter(def, scope, &at, uid_text.as_deref())?
        } else {
            scope.clone()
        };
        if !def.events.is_empty()
            && let Some(uid) = &uid_text
        {
            own.claims.claim(uid, &own.container)?;
        }
        if !def.api.is_empty() {
            self.publish_api(def, scope, &own, &at, uid_text.as_deref())?;
        }

        let Some(renderer) = self.registry.renderer(&def.kind) else {
            self.diagnostics.record_missing_renderer(&def.kind);
            return Ok(None);
        };
        let uid = own.container.uid_for(at.as_str(), uid_text.as_deref());
        let ctx = RenderContext {
            walker: self,
            def,
            scope: own,
            at,
            uid,
            uid_text,
        };
        let mut node = renderer.render(&ctx)?;
        node.at = ctx.at.clone();
        node.uid = ctx.uid_text.clone();
        Ok(Some(node))
    }

    /// Sets up the container of a boundary node. Structural checks run
    /// before the container is touched.
    fn enter(
        &self,
        def: &ComponentDef,
        scope: &Scope,
        at: &NodeRef,
        uid_text: Option<&str>,
    ) -> Result<Scope, RenderError> {
        let label = uid_text.unwrap_or(&def.kind);
        check_unique_uids(def, label)?;
        if let Some(message) = def.script.as_ref().and_then(|s| s.parse_error.as_ref()) {
            return Err(RenderError::Script {
                container: label.to_string(),
                message: message.clone(),
            });
        }

        let container = self
            .store
            .borrow_mut()
            .obtain(at, &scope.container, label, self.pass);
        container.define(def);
        let mut state = container.compose(scope.state.clone(), self.routing.clone())?;
        let claims = UidClaims::default();
        if loader::render_loaders(self, &container, def, &state, &claims)? {
            state = container.recompose()?;
        }
        Ok(Scope {
            container,
            state,
            claims,
        })
    }

    /// Registers the node's `api` methods with the enclosing container. Each
    /// method runs against the node's own state at call time.
    fn publish_api(
        &self,
        def: &ComponentDef,
        outer: &Scope,
        own: &Scope,
        at: &NodeRef,
        uid_text: Option<&str>,
    ) -> Result<(), RenderError> {
        let mut api = Object::new();
        for (name, binding) in &def.api {
            let f = evaluate(binding, &own.state, &def.kind, name)?;
            let home = Rc::downgrade(&own.container);
            let method = Value::native(name, move |args| {
                let state = home.upgrade().map(|c| c.composed()).unwrap_or_default();
                Interpreter::new(state).call(&f, args.to_vec())
            });
            api.insert(name.clone(), method);
        }
        let uid = outer.container.uid_for(at.as_str(), uid_text);
        outer.container.register_component_api(&uid, api);
        Ok(())
    }
}

/// What a [`Renderer`](crate::registry::Renderer) sees of the node it
/// renders.
pub struct RenderContext<'a> {
    walker: &'a Walker<'a>,
    def: &'a ComponentDef,
    scope: Scope,
    at: NodeRef,
    uid: ComponentUid,
    uid_text: Option<String>,
}

impl RenderContext<'_> {
    pub fn def(&self) -> &ComponentDef {
        self.def
    }

    pub fn at(&self) -> &NodeRef {
        &self.at
    }

    pub fn uid(&self) -> &ComponentUid {
        &self.uid
    }

    pub fn state(&self) -> &Rc<StateMap> {
        &self.scope.state
    }

    pub fn container(&self) -> &Rc<Container> {
        &self.scope.container
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        self.walker.diagnostics
    }

    /// An empty node of this definition's kind, at this position.
    pub fn node(&self) -> Node {
        let mut node = Node::new(self.at.clone(), &self.def.kind);
        node.uid = self.uid_text.clone();
        node
    }

    /// Evaluates a property binding; absent properties are `Undefined`.
    pub fn prop(&self, name: &str) -> Result<Value, RenderError> {
        match self.def.props.get(name) {
            Some(binding) => evaluate(binding, &self.scope.state, &self.def.kind, name),
            None => Ok(Value::Undefined),
        }
    }

    pub fn props(&self) -> Result<Object, RenderError> {
        self.def
            .props
            .keys()
            .map(|name| Ok((name.clone(), self.prop(name)?)))
            .collect()
    }

    /// Renders a single child into the named slot.
    pub fn render_child(&self, slot: &str, def: &ComponentDef) -> Result<Option<Node>, RenderError> {
        self.render_at(self.at.join(slot), def)
    }

    /// Renders a multi-child slot. Each child is keyed `{index}:{uid}`;
    /// hidden and unregistered children are left out.
    pub fn render_children(&self, defs: &[Rc<ComponentDef>]) -> Result<Vec<Node>, RenderError> {
        let mut out = Vec::with_capacity(defs.len());
        for (i, def) in defs.iter().enumerate() {
            let uid = self.walker.uid_text(def, &self.scope.state)?;
            let at = self.at.indexed(i, uid.as_deref());
            if let Some(node) = self.render_at(at, def)? {
                out.push(node);
            }
        }
        Ok(out)
    }

    pub fn render_at(&self, at: NodeRef, def: &ComponentDef) -> Result<Option<Node>, RenderError> {
        self.walker.render_node(def, &self.scope, at)
    }

    pub fn register_component_api(&self, api: Object) {
        self.scope.container.register_component_api(&self.uid, api);
    }

    pub fn dispatch(&self, action: ContainerAction) -> Result<(), RenderError> {
        Ok(self.scope.container.dispatch(action)?)
    }

    /// The live handler for `event`: the declared one, else a
    /// convention-named function in scope.
    pub fn lookup_action(&self, event: &str) -> Option<AsyncHandler> {
        self.scope.container.lookup_action(
            self.def.events.get(event),
            &self.uid,
            &LookupOptions::event(event),
        )
    }

    pub fn lookup_sync_callback(&self, event: &str) -> Result<Option<SyncHandler>, ActionError> {
        self.def
            .events
            .get(event)
            .map(|source| self.scope.container.lookup_sync_callback(source))
            .transpose()
    }

    /// Handlers for every declared event plus the convention-wired `extra`
    /// events.
    pub fn handlers(&self, extra: &[&str]) -> IndexMap<String, AsyncHandler> {
        let events = self
            .def
            .events
            .keys()
            .map(String::as_str)
            .chain(extra.iter().copied());
        let mut out = IndexMap::new();
        for event in events {
            if out.contains_key(event) {
                continue;
            }
            if let Some(h) = self.lookup_action(event) {
                out.insert(event.to_string(), h);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::{ActionSource, Expr, Script, Stmt};

    fn click() -> ActionSource {
        ActionSource::statements("noop", vec![Stmt::Empty])
    }

    #[test]
    fn boundary_flags_follow_declarations() {
        assert!(!BoundaryFlags::of(&ComponentDef::new("Text")).is_boundary());
        let def = ComponentDef::new("Panel")
            .var("a", Binding::literal(1))
            .uses(&[]);
        assert_eq!(
            BoundaryFlags::of(&def),
            BoundaryFlags::VARS | BoundaryFlags::USES
        );
        assert_eq!(
            BoundaryFlags::of(&ComponentDef::new("X").script(Script::new())),
            BoundaryFlags::SCRIPT
        );
        assert!(BoundaryFlags::of(&ComponentDef::new("X").as_container()).is_boundary());
    }

    #[test]
    fn duplicate_loader_uids_are_rejected() {
        let def = ComponentDef::new("Page")
            .loader(ComponentDef::new("DataSource").uid("users"))
            .loader(ComponentDef::new("DataSource").uid("users"));
        let err = check_unique_uids(&def, "Page").unwrap_err();
        assert!(matches!(err, RenderError::DuplicateUid { ref uid, .. } if uid == "users"));
    }

    #[test]
    fn handler_uids_are_checked_up_to_the_next_boundary() {
        let nested = ComponentDef::new("Panel")
            .var("v", Binding::literal(0))
            .child(ComponentDef::new("Button").uid("save").on("click", click()));
        let def = ComponentDef::new("Page")
            .child(ComponentDef::new("Button").uid("save").on("click", click()))
            .child(nested)
            // no handlers, so no claim on the uid
            .child(ComponentDef::new("Text").uid("save"));
        assert!(check_unique_uids(&def, "Page").is_ok());

        let def = def.child(
            ComponentDef::new("Stack")
                .child(ComponentDef::new("Button").uid("save").on("click", click())),
        );
        assert!(check_unique_uids(&def, "Page").is_err());
    }

    #[test]
    fn computed_uids_are_not_prechecked() {
        // claimed while the container renders instead
        let def = ComponentDef::new("Page")
            .loader(ComponentDef::new("DataSource").uid_binding(Binding::expr("id", Expr::ident("id"))))
            .loader(ComponentDef::new("DataSource").uid_binding(Binding::expr("id", Expr::ident("id"))));
        assert!(check_unique_uids(&def, "Page").is_ok());
    }
}
