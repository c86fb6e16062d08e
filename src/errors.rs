//! Error taxonomy for the schema model, its listeners and the application layer

use std::path::PathBuf;
use thiserror::Error;

use crate::arena::{NodeId, NodeKind};

/// Domain errors raised by tree lookups, structural validation and dispatch.
///
/// A vetoed mutation is not an error; see [`crate::events::MutationOutcome`].
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("index {index} out of bounds for {parent} with {len} children")]
    IndexOutOfBounds {
        parent: NodeId,
        index: usize,
        len: usize,
    },

    #[error("{child} is not a child of {parent}")]
    NotAChild { parent: NodeId, child: NodeId },

    #[error("{node} is already attached to {parent}")]
    AlreadyAttached { node: NodeId, parent: NodeId },

    #[error("node listed twice in one batch: {0}")]
    DuplicateChild(NodeId),

    #[error("attaching {0} would create a cycle")]
    CycleDetected(NodeId),

    #[error("{kind} node {node} cannot have children")]
    ChildrenNotAllowed { node: NodeId, kind: NodeKind },

    #[error("not a column: {0}")]
    NotAColumn(NodeId),

    #[error("node is still attached to the tree: {0}")]
    StillAttached(NodeId),

    #[error("invalid property '{name}': {reason}")]
    InvalidProperty { name: String, reason: String },

    #[error("no node at path: {0}")]
    PathNotFound(String),

    #[error("listener '{listener}' failed: {source}")]
    ListenerFault {
        listener: String,
        #[source]
        source: ListenerError,
    },
}

/// Result type for schema model operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Failure reported by a listener while handling an event.
#[derive(Error, Debug)]
pub enum ListenerError {
    #[error("{0}")]
    Schema(#[from] Box<SchemaError>),

    #[error("{0}")]
    Failed(String),
}

impl From<SchemaError> for ListenerError {
    fn from(e: SchemaError) -> Self {
        ListenerError::Schema(Box::new(e))
    }
}

/// Result type for listener callbacks.
pub type ListenerResult<T> = Result<T, ListenerError>;

/// Application errors wrap schema errors and add loading/config concerns.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Schema(#[from] SchemaError),

    #[error("config error: {message}")]
    Config { message: String },

    #[error("I/O error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid model description {}: {reason}", path.display())]
    InvalidModel { path: PathBuf, reason: String },
}

impl AppError {
    /// Create an I/O error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Result type for application layer operations.
pub type AppResult<T> = Result<T, AppError>;
