//! Lifecycle hook traits
//!
//! Objects implementing these traits can opt into the init/destroy chain with
//! [`DefinitionBuilder::initializing`](crate::di::DefinitionBuilder::initializing)
//! and [`DefinitionBuilder::disposable`](crate::di::DefinitionBuilder::disposable)
//! instead of passing closures.

use super::LifecycleError;

/// Called once the object is constructed, before it is published.
///
/// The object is still exclusively owned at this point, so the hook receives
/// `&mut self`.
///
/// # Example
///
/// ```rust,ignore
/// use beanstack::lifecycle::{Initialize, LifecycleError};
///
/// impl Initialize for Cat {
///     fn initialize(&mut self) -> Result<(), LifecycleError> {
///         tracing::info!("cat afterPropertiesSet...");
///         self.ready = true;
///         Ok(())
///     }
/// }
/// ```
pub trait Initialize: Send + Sync {
    fn initialize(&mut self) -> Result<(), LifecycleError>;
}

/// Called when a singleton is destroyed.
///
/// The object may still be shared, so the hook only receives `&self`.
/// Singletons are destroyed in **reverse dependency order**: an object is
/// disposed before anything it depends on.
pub trait Dispose: Send + Sync {
    fn dispose(&self) -> Result<(), LifecycleError>;
}
