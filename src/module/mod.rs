//! Grouped registration.
//!
//! A [`Module`] registers related definitions and may import other modules.
//! [`RegistryPostProcessor`]s run after every module and may inspect the
//! registry and add more definitions before anything is instantiated.

use crate::config::Environment;
use crate::di::{Definition, Registry};
use crate::error::Result;
use std::collections::HashSet;

/// Trait for application modules
///
/// # Example
/// ```
/// use beanstack::di::{Container, Definition};
/// use beanstack::module::{Module, Registrar};
///
/// struct Engine;
///
/// #[derive(Default)]
/// struct EngineModule;
///
/// impl Module for EngineModule {
///     fn register(&self, registrar: &mut Registrar<'_>) -> beanstack::Result<()> {
///         registrar.register(Definition::builder::<Engine>("engine").constructor(|_| Ok(Engine)).build()?)?;
///         Ok(())
///     }
/// }
///
/// let container = Container::builder().module::<EngineModule>().unwrap().build().unwrap();
/// assert!(container.contains("engine"));
/// ```
pub trait Module {
    /// Used to import each module at most once.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Modules registered before this one; an import selector returns the
    /// modules it selects.
    fn imports(&self) -> Vec<Box<dyn Module>> {
        Vec::new()
    }

    fn register(&self, registrar: &mut Registrar<'_>) -> Result<()>;
}

/// Registration access handed to modules and registry post-processors.
pub struct Registrar<'a> {
    registry: &'a mut Registry,
    environment: &'a Environment,
    imported: &'a mut HashSet<String>,
}

impl<'a> Registrar<'a> {
    pub(crate) fn new(
        registry: &'a mut Registry,
        environment: &'a Environment,
        imported: &'a mut HashSet<String>,
    ) -> Self {
        Self {
            registry,
            environment,
            imported,
        }
    }

    /// Register `definition` unless its condition rejects the environment.
    ///
    /// Returns whether it was registered.
    pub fn register(&mut self, definition: Definition) -> Result<bool> {
        if let Some(condition) = definition.condition() {
            if !condition.matches(self.environment) {
                tracing::debug!(
                    "Skipping '{}': condition {} not met",
                    definition.id(),
                    condition.name()
                );
                return Ok(false);
            }
        }
        self.registry.register(definition)?;
        Ok(true)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.registry.contains(id)
    }

    pub fn registry(&self) -> &Registry {
        self.registry
    }

    pub fn environment(&self) -> &Environment {
        self.environment
    }

    /// Register a module and, first, everything it imports.
    ///
    /// Returns `false` if the module had already been imported.
    pub fn import(&mut self, module: &dyn Module) -> Result<bool> {
        let name = module.name().to_string();
        if !self.imported.insert(name.clone()) {
            tracing::debug!("Module {} already imported", name);
            return Ok(false);
        }
        for import in module.imports() {
            self.import(import.as_ref())?;
        }
        tracing::debug!("Importing module {}", name);
        if let Err(e) = module.register(self) {
            tracing::error!("Module {} failed to register: {}", name, e);
            return Err(e);
        }
        Ok(true)
    }
}

/// Runs once every module is registered, before instantiation.
pub trait RegistryPostProcessor: Send + Sync {
    fn post_process_registry(&self, registrar: &mut Registrar<'_>) -> Result<()>;
}

impl<F> RegistryPostProcessor for F
where
    F: Fn(&mut Registrar<'_>) -> Result<()> + Send + Sync,
{
    fn post_process_registry(&self, registrar: &mut Registrar<'_>) -> Result<()> {
        self(registrar)
    }
}
