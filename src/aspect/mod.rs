//! Interception rules: pointcut plus advice.
//!
//! A rule names the objects and operations it applies to and the advice
//! that runs around them. Rules are registered on the container builder and
//! applied by the [`InterceptorChain`](crate::interceptor::InterceptorChain)
//! when objects are resolved.
//!
//! ### Example
//!
//! ```rust
//! use beanstack::aspect::{InterceptionRule, Pointcut, ThrowOutcome};
//!
//! let rule = InterceptionRule::builder("audit", Pointcut::bean("calculator").operations("div"))
//!     .before(|jp| {
//!         tracing::info!("before {}", jp.signature());
//!         Ok(())
//!     })
//!     .after_throwing(|jp, error| {
//!         tracing::warn!("{} failed: {}", jp.operation, error);
//!         Ok(ThrowOutcome::Propagate)
//!     })
//!     .build()
//!     .unwrap();
//! assert_eq!(rule.name(), "audit");
//! ```

mod pointcut;

pub use pointcut::{Pointcut, TargetMatcher};

use crate::di::Definition;
use crate::error::{ContainerError, Result};
use crate::interceptor::{InterceptorError, InvocationResult, JoinPoint, Proceed, ReturnValue};
use pointcut::CompiledPointcut;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use strum_macros::{Display, EnumString, IntoStaticStr};

/// Result of advice that does not produce a value.
pub type AdviceResult = std::result::Result<(), InterceptorError>;

type BeforeFn = dyn Fn(&JoinPoint) -> AdviceResult + Send + Sync;
type AroundFn = dyn Fn(&JoinPoint, Proceed<'_>) -> InvocationResult + Send + Sync;
type AfterReturnFn = dyn Fn(&JoinPoint, &ReturnValue) -> AdviceResult + Send + Sync;
type AfterThrowFn = dyn Fn(&JoinPoint, &(dyn Error + Send + Sync + 'static)) -> std::result::Result<ThrowOutcome, InterceptorError>
    + Send
    + Sync;
type AfterFn = dyn Fn(&JoinPoint) -> AdviceResult + Send + Sync;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum AdviceKind {
    Before,
    Around,
    AfterReturn,
    AfterThrow,
    After,
}

/// What after-throw advice decided about a failure.
#[derive(Debug)]
pub enum ThrowOutcome {
    /// Let the failure continue to the caller.
    Propagate,
    /// Swallow the failure and return this value instead.
    Recover(ReturnValue),
}

#[derive(Clone)]
pub enum Advice {
    Before(Arc<BeforeFn>),
    Around(Arc<AroundFn>),
    AfterReturn(Arc<AfterReturnFn>),
    AfterThrow(Arc<AfterThrowFn>),
    After(Arc<AfterFn>),
}

impl Advice {
    pub fn kind(&self) -> AdviceKind {
        match self {
            Self::Before(_) => AdviceKind::Before,
            Self::Around(_) => AdviceKind::Around,
            Self::AfterReturn(_) => AdviceKind::AfterReturn,
            Self::AfterThrow(_) => AdviceKind::AfterThrow,
            Self::After(_) => AdviceKind::After,
        }
    }
}

impl fmt::Debug for Advice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Advice({})", self.kind())
    }
}

/// A named pointcut with its advice.
pub struct InterceptionRule {
    name: String,
    pointcut: Pointcut,
    compiled: CompiledPointcut,
    advice: Vec<Advice>,
}

impl InterceptionRule {
    pub fn builder(name: impl Into<String>, pointcut: Pointcut) -> InterceptionRuleBuilder {
        InterceptionRuleBuilder {
            name: name.into(),
            pointcut,
            advice: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pointcut(&self) -> &Pointcut {
        &self.pointcut
    }

    pub fn advice(&self) -> &[Advice] {
        &self.advice
    }

    pub fn kinds(&self) -> Vec<AdviceKind> {
        self.advice.iter().map(Advice::kind).collect()
    }

    pub fn matches_target(&self, definition: &Definition) -> bool {
        self.compiled.matches_target(definition)
    }

    pub fn matches_operation(&self, operation: &str) -> bool {
        self.compiled.matches_operation(operation)
    }
}

impl fmt::Debug for InterceptionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptionRule")
            .field("name", &self.name)
            .field("pointcut", &self.pointcut.to_string())
            .field("advice", &self.kinds())
            .finish()
    }
}

/// Builder for an [`InterceptionRule`]. Advice keeps the order it is added in.
pub struct InterceptionRuleBuilder {
    name: String,
    pointcut: Pointcut,
    advice: Vec<Advice>,
}

impl InterceptionRuleBuilder {
    pub fn before<F>(mut self, f: F) -> Self
    where
        F: Fn(&JoinPoint) -> AdviceResult + Send + Sync + 'static,
    {
        self.advice.push(Advice::Before(Arc::new(f)));
        self
    }

    /// The advice must call [`Proceed::proceed`] to run the operation;
    /// returning without it short-circuits the call.
    pub fn around<F>(mut self, f: F) -> Self
    where
        F: Fn(&JoinPoint, Proceed<'_>) -> InvocationResult + Send + Sync + 'static,
    {
        self.advice.push(Advice::Around(Arc::new(f)));
        self
    }

    pub fn after_returning<F>(mut self, f: F) -> Self
    where
        F: Fn(&JoinPoint, &ReturnValue) -> AdviceResult + Send + Sync + 'static,
    {
        self.advice.push(Advice::AfterReturn(Arc::new(f)));
        self
    }

    pub fn after_throwing<F>(mut self, f: F) -> Self
    where
        F: Fn(
                &JoinPoint,
                &(dyn Error + Send + Sync + 'static),
            ) -> std::result::Result<ThrowOutcome, InterceptorError>
            + Send
            + Sync
            + 'static,
    {
        self.advice.push(Advice::AfterThrow(Arc::new(f)));
        self
    }

    /// Runs once per invocation, on success and failure alike.
    pub fn after<F>(mut self, f: F) -> Self
    where
        F: Fn(&JoinPoint) -> AdviceResult + Send + Sync + 'static,
    {
        self.advice.push(Advice::After(Arc::new(f)));
        self
    }

    pub fn build(self) -> Result<InterceptionRule> {
        let invalid = |message: String| ContainerError::InvalidRule {
            rule: self.name.clone(),
            message,
        };
        if self.name.trim().is_empty() {
            return Err(invalid("rule name must not be empty".to_string()));
        }
        if self.advice.is_empty() {
            return Err(invalid("rule has no advice".to_string()));
        }
        let arounds = self
            .advice
            .iter()
            .filter(|a| a.kind() == AdviceKind::Around)
            .count();
        if arounds > 1 {
            return Err(invalid(format!(
                "{} around advice given; a rule may wrap an operation once",
                arounds
            )));
        }
        let compiled = self
            .pointcut
            .compile()
            .map_err(|e| invalid(format!("bad pattern in {}: {}", self.pointcut, e)))?;

        Ok(InterceptionRule {
            name: self.name,
            pointcut: self.pointcut,
            compiled,
            advice: self.advice,
        })
    }
}
