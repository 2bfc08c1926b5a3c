//! Errors reported at the boundary of the owning collections.

use thiserror::Error;

/// Errors returned by fallible tree operations.
///
/// Lookups and removals of absent keys are not errors; they report `None` or `false`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvlError {
    /// The value to insert was absent
    #[error("invalid value: an absent value cannot be ordered")]
    InvalidValue,
}

/// Result type for tree operations
pub type Result<T, E = AvlError> = core::result::Result<T, E>;
