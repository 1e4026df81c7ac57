//! Lifecycle Hooks Module
//!
//! Everything that happens to an object between construction and teardown.
//!
//! # Lifecycle Phases
//!
//! ```text
//! 1. Dependencies resolved (depth-first, declaration order)
//!    ↓
//! 2. Construction strategy (constructor or factory)
//!    ↓
//! 3. BeanPostProcessor::before_initialization
//!    ↓
//! 4. Init hooks (declaration order)            ← Lifecycle Hook
//!    ↓
//! 5. BeanPostProcessor::after_initialization
//!    ↓
//! 6. Interceptor chain wraps matching objects
//!    ↓
//! [Ready]
//!    ↓
//! 7. container.closed event
//!    ↓
//! 8. Destroy hooks, dependents first           ← Lifecycle Hook
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use beanstack::di::Definition;
//!
//! let car = Definition::builder::<Car>("car")
//!     .constructor(|_| Ok(Car::new("Han DM-P")))
//!     .init_hook("init", |car| {
//!         tracing::info!("car init...");
//!         Ok(())
//!     })
//!     .destroy_hook("destroy", |car| {
//!         tracing::info!("car destroy...");
//!         Ok(())
//!     })
//!     .build()?;
//! ```

mod error;
mod post_processor;
mod shutdown;
mod traits;

pub use error::{LifecycleError, Result};
pub use post_processor::BeanPostProcessor;
pub(crate) use post_processor::sort_by_order;
pub use shutdown::{ShutdownHandler, run_until, shutdown_signal};
pub use traits::{Dispose, Initialize};
