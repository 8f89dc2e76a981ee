//! Error types for cluster interaction

use thiserror::Error;

/// Result type alias for controller operations.
pub type Result<T> = std::result::Result<T, QuarantineError>;

/// Errors surfaced by the cluster collaborators.
///
/// None of these are fatal to the controller; the evaluation loop logs them
/// and backs off before the next cycle.
#[derive(Debug, Error)]
pub enum QuarantineError {
    #[error("kubernetes API request failed: {0}")]
    Kube(#[from] kube::Error),

    #[error("invalid resource quantity {value:?}: {reason}")]
    InvalidQuantity { value: String, reason: &'static str },

    #[error("node object has no name")]
    MissingName,
}
