use strata_core::{EvalError, ResolveError, StateError};
use thiserror::Error;

/// Failure of a render pass, or of the subtree an error boundary caught.
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    /// Two loaders or handler-carrying components of one container share a
    /// uid. Raised before the container does anything else.
    #[error("duplicate uid '{uid}' in container '{container}'")]
    DuplicateUid { uid: String, container: String },

    #[error("script of '{container}' failed to parse: {message}")]
    Script { container: String, message: String },

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("property '{name}' of '{kind}': {error}")]
    Prop {
        kind: String,
        name: String,
        #[source]
        error: EvalError,
    },

    #[error(transparent)]
    State(#[from] StateError),
}
