//! Method interception.
//!
//! Proxies built by a definition's proxy factories receive an [`Advisor`].
//! Each intercepted call describes itself as a [`JoinPoint`] and hands the
//! real operation to the advisor, which runs the matching advice around it.
//!
//! ```text
//! before* → around(entry)* → operation → after-return* | after-throw* → after* → around(exit)*
//! ```
//!
//! # Example
//! ```rust,ignore
//! struct CalculatorProxy {
//!     target: Arc<dyn Calculator>,
//!     advisor: Advisor,
//! }
//!
//! impl Calculator for CalculatorProxy {
//!     fn div(&self, a: i32, b: i32) -> Result<i32, InterceptorError> {
//!         let jp = self.advisor.join_point("div").arg(&a).arg(&b);
//!         self.advisor.invoke(jp, || self.target.div(a, b))
//!     }
//! }
//! ```

mod chain;
mod invocation;
mod logging;

pub use chain::{Advisor, InterceptorChain};
pub use invocation::{InvocationState, Proceed};
pub use logging::logging_rule;

use std::any::Any;
use std::fmt;

/// A type-erased error for interceptors
pub type InterceptorError = Box<dyn std::error::Error + Send + Sync>;

/// Outcome of an intercepted operation.
pub type InvocationResult = Result<ReturnValue, InterceptorError>;

/// Description of one intercepted call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinPoint {
    /// Identifier of the target definition.
    pub bean: String,
    /// Concrete type of the target.
    pub type_name: &'static str,
    pub operation: String,
    /// Arguments rendered with `Debug`.
    pub args: Vec<String>,
}

impl JoinPoint {
    pub fn new(bean: impl Into<String>, type_name: &'static str, operation: impl Into<String>) -> Self {
        Self {
            bean: bean.into(),
            type_name,
            operation: operation.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, value: &dyn fmt::Debug) -> Self {
        self.args.push(format!("{:?}", value));
        self
    }

    /// `bean.operation`
    pub fn signature(&self) -> String {
        format!("{}.{}", self.bean, self.operation)
    }
}

impl fmt::Display for JoinPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.signature(), self.args.join(", "))
    }
}

/// Type-erased value returned by an operation.
pub struct ReturnValue {
    value: Box<dyn Any + Send>,
    repr: String,
}

impl ReturnValue {
    pub fn new<T: Any + Send + fmt::Debug>(value: T) -> Self {
        let repr = format!("{:?}", value);
        Self {
            value: Box::new(value),
            repr,
        }
    }

    /// `Debug` rendering of the value, for logging.
    pub fn repr(&self) -> &str {
        &self.repr
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    /// Take the value back out, or get `self` back if it is not a `T`.
    pub fn downcast<T: Any>(self) -> Result<T, Self> {
        let Self { value, repr } = self;
        match value.downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(value) => Err(Self { value, repr }),
        }
    }
}

impl fmt::Debug for ReturnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReturnValue").field(&self.repr).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_point_display() {
        let jp = JoinPoint::new("calc", "app::Calc", "div").arg(&10).arg(&"two");
        assert_eq!(jp.signature(), "calc.div");
        assert_eq!(jp.to_string(), "calc.div(10, \"two\")");
    }

    #[test]
    fn test_return_value_downcast() {
        let value = ReturnValue::new(42i32);
        assert_eq!(value.repr(), "42");
        assert_eq!(value.downcast_ref::<i32>(), Some(&42));
        let value = value.downcast::<String>().unwrap_err();
        assert!(value.is::<i32>());
        assert_eq!(value.downcast::<i32>().unwrap(), 42);
    }
}
