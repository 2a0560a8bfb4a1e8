//! Error boundaries: a failed subtree renders as a fallback node while the
//! rest of the tree carries on.

use strata_core::ComponentDef;

use crate::error::RenderError;
use crate::node::{Node, NodeRef};
use crate::registry::Renderer;
use crate::walker::RenderContext;

/// Renders `def` at `at`, converting a failure into a fallback node.
/// Hidden or unregistered nodes come back as `None`, as with
/// [`RenderContext::render_at`].
pub fn render_with_boundary(ctx: &RenderContext<'_>, at: NodeRef, def: &ComponentDef) -> Option<Node> {
    match ctx.render_at(at.clone(), def) {
        Ok(node) => node,
        Err(e) => Some(fallback(ctx, at, &e)),
    }
}

fn fallback(ctx: &RenderContext<'_>, at: NodeRef, e: &RenderError) -> Node {
    let message = e.to_string();
    ctx.diagnostics().record_render_error(at.as_str(), &message);
    Node::fallback(at, &message)
}

/// Renders its children as one unit; if any of them fails, the boundary
/// shows a single fallback instead.
pub struct ErrorBoundary;

impl Renderer for ErrorBoundary {
    fn render(&self, ctx: &RenderContext<'_>) -> Result<Node, RenderError> {
        let node = ctx.node();
        let children = match ctx.render_children(&ctx.def().children) {
            Ok(children) => children,
            Err(e) => vec![fallback(ctx, ctx.at().join("fallback"), &e)],
        };
        Ok(node.children(children))
    }
}
