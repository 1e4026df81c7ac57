use crate::aspect::InterceptionRule;
use crate::config::Environment;
use crate::di::container::ContainerInner;
use crate::di::resolver::Resolver;
use crate::di::{Container, Definition, Registry, Scope};
use crate::error::Result;
use crate::interceptor::InterceptorChain;
use crate::lifecycle::{self, BeanPostProcessor};
use crate::messaging::{ContainerEvent, Event, EventBus, EventFilter, SubscriptionId};
use crate::module::{Module, Registrar, RegistryPostProcessor};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Builder for constructing a dependency injection container
///
/// Collects definitions, modules, post-processors, interception rules and
/// event subscriptions, then [`build`](Self::build)s an immutable container.
///
/// # Example
/// ```
/// use beanstack::di::{Container, Definition};
///
/// struct Database;
///
/// let container = Container::builder()
///     .register(Definition::builder::<Database>("db").constructor(|_| Ok(Database)).build().unwrap())
///     .unwrap()
///     .build()
///     .unwrap();
/// assert!(container.resolve::<Database>("db").is_ok());
/// ```
pub struct ContainerBuilder {
    registry: Registry,
    environment: Environment,
    imported: HashSet<String>,
    registry_post_processors: Vec<Box<dyn RegistryPostProcessor>>,
    bean_post_processors: Vec<Arc<dyn BeanPostProcessor>>,
    interceptors: InterceptorChain,
    event_bus: EventBus,
}

impl Default for ContainerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerBuilder {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            environment: Environment::new(),
            imported: HashSet::new(),
            registry_post_processors: Vec::new(),
            bean_post_processors: Vec::new(),
            interceptors: InterceptorChain::new(),
            event_bus: EventBus::new(),
        }
    }

    /// Property source for conditions and factories.
    ///
    /// Conditions are evaluated as definitions are registered, so set the
    /// environment first.
    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    fn registrar(&mut self) -> Registrar<'_> {
        Registrar::new(&mut self.registry, &self.environment, &mut self.imported)
    }

    /// Register a definition, unless its condition rejects the environment.
    pub fn register(mut self, definition: Definition) -> Result<Self> {
        self.registrar().register(definition)?;
        Ok(self)
    }

    pub fn import(mut self, module: &dyn Module) -> Result<Self> {
        self.registrar().import(module)?;
        Ok(self)
    }

    pub fn module<M: Module + Default>(self) -> Result<Self> {
        self.import(&M::default())
    }

    pub fn registry_post_processor<P>(mut self, processor: P) -> Self
    where
        P: RegistryPostProcessor + 'static,
    {
        self.registry_post_processors.push(Box::new(processor));
        self
    }

    pub fn bean_post_processor<P>(mut self, processor: P) -> Self
    where
        P: BeanPostProcessor + 'static,
    {
        self.bean_post_processors.push(Arc::new(processor));
        self
    }

    pub fn rule(mut self, rule: InterceptionRule) -> Result<Self> {
        self.interceptors.add(rule)?;
        Ok(self)
    }

    /// Subscribe before startup, so `container.refreshed` is observed.
    pub fn subscribe<F>(self, filter: impl Into<EventFilter>, handler: F) -> Self
    where
        F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe_with_id(filter, handler).0
    }

    pub fn subscribe_with_id<F>(self, filter: impl Into<EventFilter>, handler: F) -> (Self, SubscriptionId)
    where
        F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.event_bus.subscribe(filter, handler);
        (self, id)
    }

    /// Run registry post-processors, instantiate eager singletons and
    /// publish `container.refreshed`.
    ///
    /// If an eager singleton fails, the ones already created are destroyed
    /// and the error is returned.
    pub fn build(mut self) -> Result<Container> {
        let processors = std::mem::take(&mut self.registry_post_processors);
        for processor in &processors {
            processor.post_process_registry(&mut self.registrar())?;
        }

        let Self {
            registry,
            environment,
            mut bean_post_processors,
            interceptors,
            event_bus,
            ..
        } = self;
        lifecycle::sort_by_order(&mut bean_post_processors);

        let registry = Arc::new(registry);
        let resolver = Resolver::new(
            Arc::clone(&registry),
            bean_post_processors,
            interceptors,
            environment,
            event_bus,
        );

        let eager: Vec<&str> = registry
            .iter()
            .filter(|d| d.scope() == Scope::Singleton && !d.is_lazy())
            .map(|d| d.id())
            .collect();
        for id in &eager {
            if let Err(e) = resolver.resolve(id) {
                tracing::error!("Failed to instantiate '{}': {}", id, e);
                for created in resolver.destroy_order() {
                    if let Err(e) = resolver.destroy(&created) {
                        tracing::error!("Failed to destroy '{}': {}", created, e);
                    }
                }
                resolver.close();
                return Err(e);
            }
        }

        let container = Container::from_inner(ContainerInner {
            resolver,
            closing: AtomicBool::new(false),
        });
        tracing::info!(
            "Container started: {} definitions, {} eager singletons",
            registry.len(),
            eager.len()
        );
        container.event_bus().publish(&Event::new(
            ContainerEvent::Refreshed.to_string(),
            json!({
                "definitions": registry.len(),
                "singletons": eager.len(),
            }),
        ));
        Ok(container)
    }
}
