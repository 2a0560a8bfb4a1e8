//! Render passes over definition trees.
//!
//! [`Runtime::render`] walks a [`ComponentDef`](strata_core::ComponentDef)
//! tree, giving every state boundary a container that survives across
//! passes, and produces a [`Node`] tree with live event handlers attached.
//! What each kind renders to is up to the [`Renderer`] registered for it.
//!
//! ```rust
//! use strata_core::{Binding, ComponentDef};
//! use strata_ui::{Registry, Runtime};
//!
//! let mut rt = Runtime::new(Registry::with_builtins());
//! let app = ComponentDef::new("Stack")
//!     .var("name", Binding::literal("world"))
//!     .child(ComponentDef::new("Text").prop("value", Binding::text("hello {name}").unwrap()));
//! let tree = rt.render(&app).unwrap();
//! assert_eq!(tree.text(), "hello world");
//! ```

pub mod boundary;
pub mod builtins;
pub mod error;
pub mod loader;
pub mod node;
pub mod registry;
pub mod runtime;
pub mod walker;

pub use boundary::{ErrorBoundary, render_with_boundary};
pub use error::RenderError;
pub use loader::{DataSource, LoaderContext};
pub use node::{Node, NodeRef};
pub use registry::{LoaderRenderer, Registry, Renderer};
pub use runtime::{ContainerStore, Runtime};
pub use walker::{BoundaryFlags, RenderContext, Scope, check_unique_uids};
