#![allow(non_snake_case)]
//! Kinds every registry starts with. They carry no visuals; a host maps the
//! rendered nodes onto its own widgets.

use strata_core::{ComponentDef, ID_FIELD, Value};

use crate::boundary::ErrorBoundary;
use crate::error::RenderError;
use crate::node::Node;
use crate::registry::Registry;
use crate::walker::RenderContext;

pub(crate) fn register(r: &mut Registry) {
    r.register("Fragment", Fragment)
        .register("Stack", Stack)
        .register("Text", Text)
        .register("Button", Button)
        .register("Items", Items)
        .register("ErrorBoundary", ErrorBoundary);
}

/// Renders its children and nothing else.
pub fn Fragment(ctx: &RenderContext<'_>) -> Result<Node, RenderError> {
    Ok(ctx.node().children(ctx.render_children(&ctx.def().children)?))
}

/// Children plus every evaluated property.
pub fn Stack(ctx: &RenderContext<'_>) -> Result<Node, RenderError> {
    let mut node = ctx.node();
    node.props = ctx.props()?;
    Ok(node.children(ctx.render_children(&ctx.def().children)?))
}

/// `value` rendered as a display string under `text`.
pub fn Text(ctx: &RenderContext<'_>) -> Result<Node, RenderError> {
    let value = ctx.prop("value")?;
    Ok(ctx.node().prop("text", value.to_display_string()))
}

pub fn Button(ctx: &RenderContext<'_>) -> Result<Node, RenderError> {
    let mut node = ctx.node();
    let label = ctx.prop("label")?;
    if !label.is_undefined() {
        node = node.prop("text", label.to_display_string());
    }
    let enabled = ctx.prop("enabled")?;
    node = node.prop("enabled", enabled.is_undefined() || enabled.is_truthy());
    node.handlers = ctx.handlers(&["click"]);
    Ok(node)
}

/// Renders its children once per element of `items`, with `$item` and
/// `$itemIndex` in scope. Rows are keyed by the element's `$id` when it has
/// one.
pub fn Items(ctx: &RenderContext<'_>) -> Result<Node, RenderError> {
    let items = ctx.prop("items")?;
    let Some(items) = items.as_array() else {
        if !items.is_nullish() {
            log::warn!("{}: 'items' is a {}, not an array", ctx.at(), items.type_name());
        }
        return Ok(ctx.node());
    };

    let mut rows = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let id = item.get(ID_FIELD);
        let key = (!id.is_nullish()).then(|| id.to_display_string());
        let mut row = ComponentDef::new("Fragment")
            .context_var("$item", item.clone())
            .context_var("$itemIndex", Value::from(i));
        row.children = ctx.def().children.clone();
        if let Some(node) = ctx.render_at(ctx.at().indexed(i, key.as_deref()), &row)? {
            rows.push(node);
        }
    }
    Ok(ctx.node().children(rows))
}
