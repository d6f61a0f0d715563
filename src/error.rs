use crate::parameters::bounds::BoundsError;
use thiserror::Error;

/// Error types for the paramz-rs library.
#[derive(Error, Debug)]
pub enum ParamzError {
    /// Adding a node that is the target container itself or one of its ancestors.
    #[error("Hierarchy cycle: '{child}' is an ancestor of '{parent}'")]
    HierarchyCycle { parent: String, child: String },

    /// Adding a node that already lives in this part of the hierarchy.
    #[error("Parameter '{name}' was already added to '{container}'")]
    DuplicateParameter { name: String, container: String },

    /// Removing a node that is not a direct child of the container.
    #[error("Parameter '{name}' does not belong to '{container}', remove it from its own parent")]
    ForeignParameter { name: String, container: String },

    /// Assigning a value of incompatible size.
    #[error("Shape mismatch for '{name}': expected {expected} values, got {actual}")]
    ShapeMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    /// Structural operation on a leaf node.
    #[error("'{name}' is a leaf parameter and cannot hold children")]
    NotAContainer { name: String },

    /// Name lookup failed.
    #[error("Parameter not found: {0}")]
    ParameterNotFound(String),

    /// Invalid transform construction.
    #[error("Invalid transform: {0}")]
    InvalidTransform(String),

    /// Invalid prior construction.
    #[error("Invalid prior: {0}")]
    InvalidPrior(String),

    /// Bounds error from the bounded transform.
    #[error("Bounds error: {0}")]
    Bounds(#[from] BoundsError),

    /// Snapshot produced by an incompatible version.
    #[error("Unsupported snapshot version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    /// I/O error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for paramz-rs operations.
pub type Result<T> = std::result::Result<T, ParamzError>;
