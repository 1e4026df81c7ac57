//! Lifecycle-specific error types

use crate::error::BoxError;
use thiserror::Error;

/// Errors raised by init and destroy hooks
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Service initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// Teardown failed
    #[error("Shutdown failed: {0}")]
    ShutdownFailed(String),

    /// A named hook returned an error
    #[error("Hook '{hook}' failed: {source}")]
    HookFailed {
        /// Name of the hook that failed
        hook: String,
        /// Underlying failure
        #[source]
        source: BoxError,
    },
}

impl LifecycleError {
    /// Create an initialization failure error
    pub fn init_failed(msg: impl Into<String>) -> Self {
        Self::InitializationFailed(msg.into())
    }

    /// Create a shutdown failure error
    pub fn shutdown_failed(msg: impl Into<String>) -> Self {
        Self::ShutdownFailed(msg.into())
    }

    /// Create a hook failure error
    pub fn hook_failed(hook: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::HookFailed {
            hook: hook.into(),
            source: source.into(),
        }
    }
}

/// A specialized Result type for lifecycle operations
pub type Result<T> = std::result::Result<T, LifecycleError>;
