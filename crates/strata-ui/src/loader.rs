//! Loader nodes: data-fetch and side-effect declarations of a container.
//!
//! Loaders are walked apart from visual children. They share the uid and
//! `when` rules of components, but an unregistered loader kind is a
//! registration gap: it is logged and skipped and the rest of the
//! container renders as usual.

use std::rc::Rc;

use strata_core::{
    ComponentDef, ComponentUid, Container, ContainerAction, StateKey, StateMap, Value,
};

use crate::error::RenderError;
use crate::registry::LoaderRenderer;
use crate::walker::{UidClaims, Walker, evaluate};

pub struct LoaderContext<'a> {
    pub container: &'a Rc<Container>,
    pub def: &'a ComponentDef,
    pub uid: ComponentUid,
    state: &'a Rc<StateMap>,
}

impl LoaderContext<'_> {
    pub fn prop(&self, name: &str) -> Result<Value, RenderError> {
        match self.def.props.get(name) {
            Some(binding) => evaluate(binding, self.state, &self.def.kind, name),
            None => Ok(Value::Undefined),
        }
    }

    /// The loader's entry in the container store.
    pub fn current(&self) -> Value {
        self.container
            .state()
            .get(&StateKey::Identity(self.uid.clone()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn dispatch(&self, action: ContainerAction) -> Result<(), RenderError> {
        Ok(self.container.dispatch(action)?)
    }
}

/// Runs every visible loader of `def`. Every uid is evaluated and claimed
/// before the first loader runs. Returns whether the container store
/// changed, in which case the caller recomposes.
pub(crate) fn render_loaders(
    walker: &Walker<'_>,
    container: &Rc<Container>,
    def: &ComponentDef,
    state: &Rc<StateMap>,
    claims: &UidClaims,
) -> Result<bool, RenderError> {
    let mut visible = Vec::new();
    for (i, l) in def.loaders.iter().enumerate() {
        if let Some(when) = &l.when
            && !evaluate(when, state, &l.kind, "when")?.is_truthy()
        {
            continue;
        }
        let Some(renderer) = walker.registry.loader(&l.kind) else {
            walker.diagnostics.record_skipped_loader(&l.kind);
            continue;
        };
        let uid_text = walker.uid_text(l, state)?;
        if let Some(uid) = &uid_text {
            claims.claim(uid, container)?;
        }
        let uid = container.uid_for(
            &format!("loader:{i}:{}", uid_text.as_deref().unwrap_or_default()),
            uid_text.as_deref(),
        );
        visible.push((renderer, l, uid));
    }

    let before = container.state();
    for (renderer, l, uid) in visible {
        renderer.load(&LoaderContext {
            container,
            def: l,
            uid,
            state,
        })?;
    }
    Ok(!before.same_allocation(&container.state()))
}

/// Publishes its `data` property as loaded data. A truthy `error` property
/// is published as a loader error instead. Unchanged data is not
/// re-dispatched.
pub struct DataSource;

impl LoaderRenderer for DataSource {
    fn load(&self, ctx: &LoaderContext<'_>) -> Result<(), RenderError> {
        let current = ctx.current();
        let error = ctx.prop("error")?;
        if error.is_truthy() {
            if current.get("error") != error {
                ctx.dispatch(ContainerAction::LoaderError {
                    uid: ctx.uid.clone(),
                    error,
                })?;
            }
            return Ok(());
        }

        let data = ctx.prop("data")?;
        if current.get("loaded").is_truthy() && current.get("value") == data {
            return Ok(());
        }
        log::debug!("loader {:?} publishing data", ctx.uid);
        ctx.dispatch(ContainerAction::LoaderInProgressChanged {
            uid: ctx.uid.clone(),
            in_progress: true,
        })?;
        let page_info = ctx.prop("pageInfo")?;
        ctx.dispatch(ContainerAction::LoaderLoaded {
            uid: ctx.uid.clone(),
            data,
            page_info: (!page_info.is_undefined()).then_some(page_info),
        })
    }
}
