use crate::aspect::AdviceKind;
use crate::lifecycle::LifecycleError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ContainerError>;

/// A type-erased error raised by user code (advice, operations, handlers).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("Definition already registered: {id}")]
    DuplicateId { id: String },

    #[error("No definition found for {what}")]
    NotFound { what: String },

    #[error("Ambiguous dependency {type_name}: candidates {candidates:?}")]
    Ambiguous {
        type_name: String,
        candidates: Vec<String>,
    },

    #[error("Circular dependency detected: {cycle}")]
    CyclicDependency { cycle: String },

    #[error("Failed to construct '{id}': {source}")]
    Construction {
        id: String,
        #[source]
        source: BoxError,
    },

    #[error("Advice '{kind}' of rule '{rule}' failed: {source}")]
    Interception {
        rule: String,
        kind: AdviceKind,
        #[source]
        source: BoxError,
    },

    #[error("'{id}' does not expose type {type_name}")]
    TypeMismatch { id: String, type_name: String },

    #[error("Scope mismatch: {message}")]
    ScopeMismatch { message: String },

    #[error("'{id}' has already been destroyed")]
    Destroyed { id: String },

    /// Raised by destroy hooks; init hook failures surface as `Construction`.
    #[error("Lifecycle hook failed for '{id}': {source}")]
    HookFailed {
        id: String,
        #[source]
        source: LifecycleError,
    },

    #[error("Invalid definition '{id}': {message}")]
    InvalidDefinition { id: String, message: String },

    #[error("Invalid interception rule '{rule}': {message}")]
    InvalidRule { rule: String, message: String },

    /// For modules rejecting their own configuration; errors from the
    /// registry pass through a module unchanged.
    #[error("Module registration failed: {message}")]
    ModuleRegistrationFailed { message: String },

    #[error("Container is closed")]
    Closed,
}

impl ContainerError {
    pub(crate) fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Whether the error reports a configuration defect rather than a
    /// failure inside user code.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateId { .. }
                | Self::NotFound { .. }
                | Self::Ambiguous { .. }
                | Self::CyclicDependency { .. }
                | Self::InvalidDefinition { .. }
                | Self::InvalidRule { .. }
                | Self::ModuleRegistrationFailed { .. }
        )
    }
}
