//! Error types for graph construction and execution

use crate::status::StatusCode;
use thiserror::Error;

/// Errors raised while building, validating or walking a graph.
///
/// Everything except [`GraphError::Observer`] is a configuration error
/// and is reported before any action runs.
#[derive(Debug, Error)]
pub enum GraphError {
    /// A step with this name is already registered
    #[error("duplicate step: {0}")]
    DuplicateStep(String),

    /// A lookup or target referenced a step that does not exist
    #[error("step not found: {0}")]
    StepNotFound(String),

    /// An edge points at a step that is not part of the graph
    #[error("step '{step}' depends on unknown step '{dependency}'")]
    DanglingDependency {
        /// Step declaring the edge
        step: String,
        /// Missing endpoint
        dependency: String,
    },

    /// A step listed itself in `requires` or `required_by`
    #[error("step '{0}' cannot depend on itself")]
    SelfDependency(String),

    /// The edge relation is not acyclic
    #[error("dependency cycle detected: {}", .path.join(" -> "))]
    Cycle {
        /// Cycle path, first and last element are the same step
        path: Vec<String>,
    },

    /// A status change the state machine does not allow
    #[error("step '{step}' cannot move from {from} to {to}")]
    InvalidTransition {
        step: String,
        from: StatusCode,
        to: StatusCode,
    },

    /// The serialized graph could not be parsed
    #[error("invalid graph document: {0}")]
    Json(#[from] serde_json::Error),

    /// The step observer failed; the walk was stopped
    #[error("observer failed after step '{step}': {message}")]
    Observer { step: String, message: String },

    /// The worker pool could not be created
    #[error("failed to create worker pool: {0}")]
    WorkerPool(String),
}

impl GraphError {
    /// Whether this error comes from the declared configuration rather
    /// than from running it.
    pub fn is_configuration(&self) -> bool {
        !matches!(self, Self::Observer { .. } | Self::WorkerPool(_))
    }

    /// A step that is part of a reported cycle, if this is a cycle error.
    pub fn cycle_member(&self) -> Option<&str> {
        match self {
            Self::Cycle { path } => path.first().map(String::as_str),
            _ => None,
        }
    }
}

/// Result type for graph operations
pub type Result<T> = std::result::Result<T, GraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_error_renders_path() {
        let err = GraphError::Cycle {
            path: vec!["a".into(), "b".into(), "c".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "dependency cycle detected: a -> b -> c -> a");
        assert_eq!(err.cycle_member(), Some("a"));
        assert!(err.is_configuration());
    }

    #[test]
    fn observer_error_is_not_configuration() {
        let err = GraphError::Observer {
            step: "vpc".into(),
            message: "save failed".into(),
        };
        assert!(!err.is_configuration());
        assert!(err.cycle_member().is_none());
    }
}
