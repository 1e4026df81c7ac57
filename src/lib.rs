//! # beanstack
//!
//! A minimal object container with lifecycle management and method
//! interception.
//!
//! ## Features
//!
//! - **Definitions**: declarative descriptions of objects, their scope,
//!   dependencies and hooks, kept in a [`Registry`](di::Registry)
//! - **Resolution**: singleton and prototype scopes, dependency injection by
//!   id or type, primary/qualified selection, cycle detection
//! - **Lifecycle**: post-processors, init hooks and destroy hooks run in
//!   reverse dependency order at shutdown
//! - **Interception**: before / around / after-return / after-throw / after
//!   advice applied through proxies
//! - **Events**: a synchronous event bus with container lifecycle events
//! - **Modules**: grouped and conditional registration
//!
//! ## Quick Start
//!
//! ```rust
//! use beanstack::prelude::*;
//!
//! trait Engine: Send + Sync {
//!     fn start(&self) -> String;
//! }
//!
//! struct Petrol;
//!
//! impl Engine for Petrol {
//!     fn start(&self) -> String {
//!         "vroom".to_string()
//!     }
//! }
//!
//! struct Car {
//!     engine: Arc<dyn Engine>,
//! }
//!
//! fn main() -> beanstack::Result<()> {
//!     let container = Container::builder()
//!         .register(
//!             Definition::builder::<Petrol>("engine")
//!                 .constructor(|_| Ok(Petrol))
//!                 .expose::<dyn Engine, _>(|e| e as Arc<dyn Engine>)
//!                 .build()?,
//!         )?
//!         .register(
//!             Definition::builder::<Car>("car")
//!                 .depends_on(Dependency::of_type::<dyn Engine>())
//!                 .constructor(|args| Ok(Car { engine: args.get::<dyn Engine>(0)? }))
//!                 .destroy_hook("park", |_car| Ok(()))
//!                 .build()?,
//!         )?
//!         .build()?;
//!
//!     let car = container.resolve::<Car>("car")?;
//!     assert_eq!(car.engine.start(), "vroom");
//!     assert_eq!(container.destroy_all(), 2);
//!     Ok(())
//! }
//! ```

pub mod aspect;
pub mod config;
pub mod di;
pub mod error;
pub mod interceptor;
pub mod lifecycle;
pub mod messaging;
pub mod module;
pub mod transactional;

// Re-export core types
pub use di::{Container, ContainerBuilder, Definition, Lazy};
pub use error::{ContainerError, Result};
pub use module::Module;

/// Prelude module for convenient imports
///
/// ```
/// use beanstack::prelude::*;
/// ```
pub mod prelude {
    pub use crate::aspect::{AdviceKind, InterceptionRule, Pointcut, ThrowOutcome};
    pub use crate::config::Environment;
    pub use crate::di::{
        Args, Condition, Container, ContainerBuilder, Definition, Dependency, Instance,
        InstanceState, Lazy, ResolutionContext, Scope,
    };
    pub use crate::error::ContainerError;
    pub use crate::interceptor::{
        Advisor, InterceptorError, InvocationResult, JoinPoint, ReturnValue, logging_rule,
    };
    pub use crate::lifecycle::{
        BeanPostProcessor, Dispose, Initialize, LifecycleError, ShutdownHandler, shutdown_signal,
    };
    pub use crate::messaging::{ContainerEvent, Event, EventBus, EventFilter};
    pub use crate::module::{Module, Registrar, RegistryPostProcessor};
    pub use crate::transactional::{
        ActiveTransaction, Propagation, Transaction, TransactionManager, TransactionOptions,
        current_transaction, transactional_rule,
    };
    pub use std::sync::Arc;
}
