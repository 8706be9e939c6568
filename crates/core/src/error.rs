//! Error taxonomy shared by every stage of the pipeline.

use thiserror::Error;

/// Typed error for the core, config, resource and transform layers.
///
/// Upper layers (plugins, accumulator, CLI) wrap these in `anyhow` with
/// context; callers can still `downcast_ref::<Error>()` to branch on the kind.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Two sources disagree (field spec create flags, duplicate ids, undeclared collisions).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Malformed input: bad paths, annotation values, documents or schema references.
    #[error("validation error: {0}")]
    Validation(String),

    /// Loader, filesystem or subprocess failure.
    #[error("io error: {0}")]
    Io(String),

    /// A reference could not be resolved unambiguously.
    #[error("reference error: {0}")]
    Reference(String),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    pub fn reference(msg: impl Into<String>) -> Self {
        Self::Reference(msg.into())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Self::Reference(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
