use crate::aspect::InterceptionRule;
use crate::di::{Definition, Instance};
use crate::error::{ContainerError, Result};
use crate::interceptor::invocation::{Invocation, InvocationState};
use crate::interceptor::{InterceptorError, InvocationResult, JoinPoint, ReturnValue};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Runs the advice of every rule that matched one object.
///
/// Handed to proxy factories; cloning is cheap.
#[derive(Clone)]
pub struct Advisor {
    inner: Arc<AdvisorInner>,
}

struct AdvisorInner {
    bean: String,
    type_name: &'static str,
    rules: Vec<Arc<InterceptionRule>>,
}

impl Advisor {
    pub(crate) fn new(
        bean: impl Into<String>,
        type_name: &'static str,
        rules: Vec<Arc<InterceptionRule>>,
    ) -> Self {
        Self {
            inner: Arc::new(AdvisorInner {
                bean: bean.into(),
                type_name,
                rules,
            }),
        }
    }

    pub fn bean(&self) -> &str {
        &self.inner.bean
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.inner.rules.iter().map(|r| r.name()).collect()
    }

    pub fn join_point(&self, operation: impl Into<String>) -> JoinPoint {
        JoinPoint::new(self.inner.bean.clone(), self.inner.type_name, operation)
    }

    /// Run `operation` under the advice that applies to `join_point`.
    pub fn proceed<F>(&self, join_point: &JoinPoint, operation: F) -> InvocationResult
    where
        F: FnOnce() -> InvocationResult,
    {
        self.proceed_traced(join_point, operation).0
    }

    /// Like [`proceed`](Self::proceed), also returning the states the call went through.
    pub fn proceed_traced<F>(
        &self,
        join_point: &JoinPoint,
        operation: F,
    ) -> (InvocationResult, Vec<InvocationState>)
    where
        F: FnOnce() -> InvocationResult,
    {
        Invocation::new(join_point, &self.inner.rules, Box::new(operation)).run()
    }

    /// Typed front end to [`proceed`](Self::proceed) for proxy methods.
    ///
    /// A value recovered by after-throw or around advice must have type `R`.
    pub fn invoke<R, E, F>(&self, join_point: JoinPoint, operation: F) -> std::result::Result<R, InterceptorError>
    where
        R: Any + Send + fmt::Debug,
        E: Into<InterceptorError>,
        F: FnOnce() -> std::result::Result<R, E>,
    {
        let value = self.proceed(&join_point, || {
            operation().map(ReturnValue::new).map_err(Into::into)
        })?;
        value.downcast::<R>().map_err(|value| {
            Box::new(ContainerError::TypeMismatch {
                id: self.inner.bean.clone(),
                type_name: format!(
                    "{} (advice returned {})",
                    std::any::type_name::<R>(),
                    value.repr()
                ),
            }) as InterceptorError
        })
    }
}

impl fmt::Debug for Advisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Advisor")
            .field("bean", &self.inner.bean)
            .field("rules", &self.rule_names())
            .finish()
    }
}

/// Ordered set of interception rules applied to resolved objects.
#[derive(Clone, Default)]
pub struct InterceptorChain {
    rules: Vec<Arc<InterceptionRule>>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule. Rule names must be unique.
    pub fn add(&mut self, rule: InterceptionRule) -> Result<()> {
        if self.rules.iter().any(|r| r.name() == rule.name()) {
            return Err(ContainerError::InvalidRule {
                rule: rule.name().to_string(),
                message: "a rule with this name is already registered".to_string(),
            });
        }
        self.rules.push(Arc::new(rule));
        Ok(())
    }

    pub fn rules(&self) -> &[Arc<InterceptionRule>] {
        &self.rules
    }

    /// Rules whose target matcher selects `definition`, in registration order.
    pub fn matching(&self, definition: &Definition) -> Vec<Arc<InterceptionRule>> {
        self.rules
            .iter()
            .filter(|r| r.matches_target(definition))
            .cloned()
            .collect()
    }

    /// Replace proxied views of `instance` with their proxies.
    ///
    /// Views without a proxy factory are withheld from an advised instance.
    pub fn wrap(&self, instance: Instance, definition: &Definition) -> Result<Instance> {
        let rules = self.matching(definition);
        if rules.is_empty() {
            return Ok(instance);
        }
        if !definition.has_proxies() {
            tracing::warn!(
                "Rules {:?} match '{}' but it declares no proxy; leaving it unadvised",
                rules.iter().map(|r| r.name()).collect::<Vec<_>>(),
                definition.id()
            );
            return Ok(instance);
        }

        let advisor = Advisor::new(definition.id(), definition.type_name(), rules);
        let mut views = HashMap::new();
        for view in definition.views() {
            let Some(proxy) = &view.proxy else {
                continue;
            };
            let mismatch = || ContainerError::TypeMismatch {
                id: definition.id().to_string(),
                type_name: view.type_name.to_string(),
            };
            let target = instance.view(view.type_id).ok_or_else(mismatch)?;
            let proxied = proxy(Arc::clone(target), advisor.clone()).ok_or_else(mismatch)?;
            views.insert(view.type_id, proxied);
        }
        tracing::debug!(
            "Advised '{}' with {:?}",
            definition.id(),
            advisor.rule_names()
        );
        Ok(instance.advised(views))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.rules.iter().map(|r| r.name()))
            .finish()
    }
}
