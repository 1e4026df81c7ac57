use crate::di::resolver::Resolver;
use crate::error::{ContainerError, Result};
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

/// A handle to an object that is resolved on first use.
///
/// `Lazy<T>` breaks construction cycles: a constructor can hold a handle to
/// an object that depends on it, as long as it does not call [`get`](Self::get)
/// before construction finishes. The handle does not keep the container alive;
/// after the container is dropped `get` fails with [`ContainerError::Closed`].
pub struct Lazy<T: ?Sized + Send + Sync + 'static> {
    resolver: Weak<Resolver>,
    id: String,
    instance: OnceLock<Arc<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> Lazy<T> {
    pub(crate) fn new(resolver: Weak<Resolver>, id: impl Into<String>) -> Self {
        Self {
            resolver,
            id: id.into(),
            instance: OnceLock::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Resolve on the first call, then return the cached object.
    pub fn get(&self) -> Result<Arc<T>> {
        if let Some(instance) = self.instance.get() {
            return Ok(Arc::clone(instance));
        }
        let resolver = self.resolver.upgrade().ok_or(ContainerError::Closed)?;
        let resolved = resolver.resolve_typed::<T>(&self.id)?;
        Ok(Arc::clone(self.instance.get_or_init(|| resolved)))
    }

    pub fn is_resolved(&self) -> bool {
        self.instance.get().is_some()
    }
}

impl<T: ?Sized + Send + Sync + 'static> Clone for Lazy<T> {
    fn clone(&self) -> Self {
        Self {
            resolver: self.resolver.clone(),
            id: self.id.clone(),
            instance: self.instance.clone(),
        }
    }
}

impl<T: ?Sized + Send + Sync + 'static> fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lazy")
            .field("id", &self.id)
            .field("type", &std::any::type_name::<T>())
            .field("resolved", &self.is_resolved())
            .finish()
    }
}
