use crate::config::Environment;
use crate::di::resolver::Resolver;
use crate::di::{ContainerBuilder, Instance, InstanceState, Lazy, Registry};
use crate::error::{ContainerError, Result};
use crate::messaging::{ContainerEvent, Event, EventBus};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Thread-safe dependency injection container.
///
/// Cheap to clone; clones share the same singletons.
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

pub(crate) struct ContainerInner {
    pub(crate) resolver: Arc<Resolver>,
    pub(crate) closing: AtomicBool,
}

impl Container {
    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::new()
    }

    pub(crate) fn from_inner(inner: ContainerInner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Resolve `id` as `T`, its concrete type or an exposed view.
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self, id: &str) -> Result<Arc<T>> {
        self.inner.resolver.resolve_typed::<T>(id)
    }

    pub fn resolve_instance(&self, id: &str) -> Result<Instance> {
        self.inner.resolver.resolve(id)
    }

    /// Resolve the single definition obtainable as `T`, or the primary one.
    pub fn resolve_by_type<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        let id = self.inner.resolver.select::<T>(None)?.id().to_string();
        self.resolve::<T>(&id)
    }

    /// Resolve the definition obtainable as `T` named `qualifier`.
    pub fn resolve_qualified<T: ?Sized + Send + Sync + 'static>(
        &self,
        qualifier: &str,
    ) -> Result<Arc<T>> {
        let id = self
            .inner
            .resolver
            .select::<T>(Some(qualifier))?
            .id()
            .to_string();
        self.resolve::<T>(&id)
    }

    /// A handle that resolves `id` on first use.
    pub fn lazy<T: ?Sized + Send + Sync + 'static>(&self, id: &str) -> Lazy<T> {
        Lazy::new(self.inner.resolver.handle(), id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.registry().contains(id)
    }

    pub fn registry(&self) -> &Registry {
        self.inner.resolver.registry()
    }

    pub fn environment(&self) -> &Environment {
        self.inner.resolver.environment()
    }

    pub fn event_bus(&self) -> &EventBus {
        self.inner.resolver.event_bus()
    }

    /// State of a singleton's record. Prototypes have none.
    pub fn state(&self, id: &str) -> Result<InstanceState> {
        self.inner.resolver.state(id)
    }

    /// Identifiers of the singletons `id` was wired to.
    pub fn dependencies_of(&self, id: &str) -> Vec<String> {
        self.inner.resolver.dependencies_of(id)
    }

    /// Ready singletons in the order [`destroy_all`](Self::destroy_all) would take them.
    pub fn destroy_order(&self) -> Vec<String> {
        self.inner.resolver.destroy_order()
    }

    /// Run the destroy hooks of one singleton.
    ///
    /// Calling it again, or on a singleton never created, does nothing.
    pub fn destroy(&self, id: &str) -> Result<()> {
        self.inner.resolver.destroy(id).map(|_| ())
    }

    /// Publish `container.closed`, then destroy every ready singleton,
    /// dependents before their dependencies: when `a` depends on `b` and `b`
    /// on `c`, the hooks of `a` run first and those of `c` last.
    ///
    /// Runs once; later calls return 0. Hook failures are logged and do not
    /// stop the sweep. Returns how many singletons were destroyed.
    pub fn destroy_all(&self) -> usize {
        if self.inner.closing.swap(true, Ordering::SeqCst) {
            return 0;
        }
        let order = self.destroy_order();
        tracing::info!("Closing container ({} ready singletons)", order.len());
        self.event_bus().publish(&Event::new(
            ContainerEvent::Closed.to_string(),
            json!({ "singletons": order }),
        ));
        self.inner.resolver.close();

        let mut destroyed = 0;
        // Re-read: closed-event handlers may have created more singletons.
        for id in self.destroy_order() {
            match self.inner.resolver.destroy(&id) {
                Ok(true) => destroyed += 1,
                Ok(false) => {}
                Err(e @ ContainerError::HookFailed { .. }) => {
                    tracing::error!("{}", e);
                    destroyed += 1;
                }
                Err(e) => tracing::error!("Failed to destroy '{}': {}", id, e),
            }
        }
        tracing::info!("Container closed");
        destroyed
    }

    pub fn is_closed(&self) -> bool {
        self.inner.resolver.is_closed()
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("definitions", &self.registry().ids())
            .field("closed", &self.is_closed())
            .finish()
    }
}
