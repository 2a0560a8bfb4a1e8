//! Renderer lookup by component kind.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::builtins;
use crate::error::RenderError;
use crate::loader::{DataSource, LoaderContext};
use crate::node::Node;
use crate::walker::RenderContext;

/// Turns one definition node into a rendered node. Children are rendered
/// through the context, so a renderer decides which slots exist.
pub trait Renderer {
    fn render(&self, ctx: &RenderContext<'_>) -> Result<Node, RenderError>;
}

impl<F> Renderer for F
where
    F: Fn(&RenderContext<'_>) -> Result<Node, RenderError>,
{
    fn render(&self, ctx: &RenderContext<'_>) -> Result<Node, RenderError> {
        self(ctx)
    }
}

/// Drives one loader: publishes its data through the loader lifecycle
/// actions of the owning container.
pub trait LoaderRenderer {
    fn load(&self, ctx: &LoaderContext<'_>) -> Result<(), RenderError>;
}

#[derive(Default, Clone)]
pub struct Registry {
    components: IndexMap<String, Rc<dyn Renderer>>,
    loaders: IndexMap<String, Rc<dyn LoaderRenderer>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in components and the `DataSource` loader.
    pub fn with_builtins() -> Self {
        let mut r = Self::new();
        builtins::register(&mut r);
        r.register_loader("DataSource", DataSource);
        r
    }

    pub fn register(&mut self, kind: &str, renderer: impl Renderer + 'static) -> &mut Self {
        if self
            .components
            .insert(kind.to_string(), Rc::new(renderer))
            .is_some()
        {
            log::debug!("renderer for '{kind}' replaced");
        }
        self
    }

    pub fn register_loader(
        &mut self,
        kind: &str,
        loader: impl LoaderRenderer + 'static,
    ) -> &mut Self {
        self.loaders.insert(kind.to_string(), Rc::new(loader));
        self
    }

    pub fn renderer(&self, kind: &str) -> Option<Rc<dyn Renderer>> {
        self.components.get(kind).cloned()
    }

    pub fn loader(&self, kind: &str) -> Option<Rc<dyn LoaderRenderer>> {
        self.loaders.get(kind).cloned()
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.components.keys().map(String::as_str)
    }
}
