//! Error types for the taint domain

use thiserror::Error;

/// Result type alias for taint domain operations
pub type TaintResult<T> = Result<T, TaintError>;

/// Top-level error type.
///
/// The lattice algebra itself is infallible; errors only arise on the
/// parsing surfaces (access paths, port roots) used when loading models.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaintError {
    /// Malformed port root (e.g. `Argument(x)` with a non-numeric index)
    #[error("invalid port root `{root}`: {reason}")]
    InvalidRoot { root: String, reason: String },

    /// Malformed access path
    #[error("invalid access path `{path}`: {reason}")]
    InvalidAccessPath { path: String, reason: String },
}

impl TaintError {
    pub(crate) fn invalid_root(root: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRoot {
            root: root.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_access_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAccessPath {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
