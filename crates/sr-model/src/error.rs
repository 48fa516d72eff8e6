//! Model construction errors.

use thiserror::Error;

/// Errors raised while constructing model values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// A principal was constructed without a name.
    #[error("principal name must not be empty")]
    EmptyName,

    /// A property was added twice to the same list.
    #[error("duplicate property: {0}")]
    DuplicateProperty(String),
}

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

impl From<ModelError> for sr_core::Error {
    fn from(err: ModelError) -> Self {
        Self::ConfigurationInvalid(err.to_string())
    }
}
