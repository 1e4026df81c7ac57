//! Definitions, resolution and the container facade.

mod builder;
mod container;
mod definition;
mod instance;
mod lazy;
mod registry;
mod resolver;

use std::any::Any;
use std::sync::Arc;

/// A shared object with its type erased.
pub type Erased = Arc<dyn Any + Send + Sync>;

pub use builder::ContainerBuilder;
pub use container::Container;
pub use definition::{Condition, Construction, Definition, DefinitionBuilder, Dependency, Scope};
pub use instance::Instance;
pub use lazy::Lazy;
pub use registry::Registry;
pub use resolver::{Args, InstanceState, ResolutionContext};
