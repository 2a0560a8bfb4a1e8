use thiserror::Error;

use crate::value::Value;

/// Failure while evaluating an expression or running a statement.
#[derive(Debug, Clone, Error)]
pub enum EvalError {
    #[error("cannot read property '{property}' of {target}")]
    CannotRead {
        property: String,
        target: &'static str,
    },

    #[error("{0} is not a function")]
    NotAFunction(String),

    #[error("cannot assign to read-only variable '{0}'")]
    ReadOnly(String),

    #[error("assignment to constant variable '{0}'")]
    ConstAssignment(String),

    #[error("invalid assignment target")]
    InvalidAssignmentTarget,

    #[error("'{0}' used outside of a loop")]
    IllegalJump(&'static str),

    #[error("template segment '{0}' is not a member path")]
    InvalidTemplate(String),

    #[error("uncaught {0}")]
    Thrown(Value),

    #[error("{0}")]
    Native(String),
}

/// Rejected state transition.
#[derive(Debug, Clone, Error)]
pub enum StateError {
    #[error("cannot write read-only state '{0}'")]
    ReadOnly(String),

    #[error("invalid state path '{path}': {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("target container is gone")]
    ContainerGone,
}

/// A local variable failed to resolve during composition.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    #[error("error evaluating '{name}' ({source_text}): {error}")]
    Binding {
        name: String,
        source_text: String,
        #[source]
        error: EvalError,
    },
}

/// Failure of one handler run.
#[derive(Debug, Clone, Error)]
pub enum ExecError {
    /// Kept apart from [`ExecError::Eval`] so callers can tell an aborted
    /// write to reserved state from an ordinary script error.
    #[error("cannot assign to read-only variable '{0}'")]
    ReadOnly(String),

    #[error(transparent)]
    Eval(EvalError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

impl From<EvalError> for ExecError {
    fn from(e: EvalError) -> Self {
        match e {
            EvalError::ReadOnly(name) => ExecError::ReadOnly(name),
            other => ExecError::Eval(other),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ActionError {
    #[error("only an arrow expression is permitted as a synchronous callback: {0}")]
    ArrowRequired(String),

    #[error("an asynchronous callable cannot be used as a synchronous callback")]
    NotSynchronous,
}
