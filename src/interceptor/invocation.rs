use crate::aspect::{Advice, AdviceKind, InterceptionRule, ThrowOutcome};
use crate::error::ContainerError;
use crate::interceptor::{InterceptorError, InvocationResult, JoinPoint, ReturnValue};
use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::sync::Arc;
use strum_macros::Display;

/// Where one intercepted call is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
pub enum InvocationState {
    Entered,
    BeforeRun,
    Invoking,
    ShortCircuited,
    Succeeded,
    Failed,
    AfterRun,
    Returned,
    Rethrown,
}

/// The rest of the chain, handed to around advice.
///
/// Consumed by [`proceed`](Self::proceed), so an around can run the
/// operation at most once. Dropping it short-circuits the call.
pub struct Proceed<'p> {
    chain: &'p dyn ProceedChain,
    next: usize,
}

impl Proceed<'_> {
    pub fn proceed(self) -> InvocationResult {
        self.chain.proceed_from(self.next)
    }
}

trait ProceedChain {
    fn proceed_from(&self, index: usize) -> InvocationResult;
}

type Operation<'a> = Box<dyn FnOnce() -> InvocationResult + 'a>;

/// One run of the advice chain around one operation.
pub(crate) struct Invocation<'a> {
    join_point: &'a JoinPoint,
    rules: Vec<&'a InterceptionRule>,
    arounds: Vec<(&'a str, &'a Advice)>,
    operation: Cell<Option<Operation<'a>>>,
    trail: RefCell<Vec<InvocationState>>,
    invoked: Cell<bool>,
    after_ran: Cell<bool>,
}

impl<'a> Invocation<'a> {
    /// Keeps only the rules whose operation pattern matches the join point.
    pub(crate) fn new(
        join_point: &'a JoinPoint,
        rules: &'a [Arc<InterceptionRule>],
        operation: Operation<'a>,
    ) -> Self {
        let rules: Vec<&'a InterceptionRule> = rules
            .iter()
            .map(Arc::as_ref)
            .filter(|r| r.matches_operation(&join_point.operation))
            .collect();
        let arounds = rules
            .iter()
            .copied()
            .flat_map(|r| {
                r.advice()
                    .iter()
                    .filter(|a| a.kind() == AdviceKind::Around)
                    .map(move |a| (r.name(), a))
            })
            .collect();
        Self {
            join_point,
            rules,
            arounds,
            operation: Cell::new(Some(operation)),
            trail: RefCell::new(Vec::new()),
            invoked: Cell::new(false),
            after_ran: Cell::new(false),
        }
    }

    pub(crate) fn run(self) -> (InvocationResult, Vec<InvocationState>) {
        self.transition(InvocationState::Entered);

        let result = match self.run_before() {
            Err(e) => {
                self.transition(InvocationState::Failed);
                Err(e)
            }
            Ok(()) => {
                self.transition(InvocationState::BeforeRun);
                let result = self.proceed_from(0);
                if !self.invoked.get() {
                    self.transition(InvocationState::ShortCircuited);
                    self.settle(&result);
                }
                result
            }
        };

        let result = if self.after_ran.get() {
            result
        } else {
            self.transition(InvocationState::AfterRun);
            self.run_after(result)
        };
        self.transition(match result {
            Ok(_) => InvocationState::Returned,
            Err(_) => InvocationState::Rethrown,
        });
        (result, self.trail.into_inner())
    }

    fn transition(&self, state: InvocationState) {
        self.trail.borrow_mut().push(state);
        tracing::trace!(
            "{} [{}] -> {}",
            self.join_point.signature(),
            self.join_point.type_name,
            state
        );
    }

    fn settle(&self, result: &InvocationResult) {
        self.transition(match result {
            Ok(_) => InvocationState::Succeeded,
            Err(_) => InvocationState::Failed,
        });
    }

    fn advice(&self) -> impl Iterator<Item = (&'a str, &'a Advice)> + '_ {
        self.rules
            .iter()
            .copied()
            .flat_map(|r| r.advice().iter().map(move |a| (r.name(), a)))
    }

    fn run_before(&self) -> Result<(), InterceptorError> {
        for (rule, advice) in self.advice() {
            if let Advice::Before(f) = advice {
                f(self.join_point).map_err(|e| interception(rule, AdviceKind::Before, e))?;
            }
        }
        Ok(())
    }

    fn run_after_return(&self, value: ReturnValue) -> InvocationResult {
        for (rule, advice) in self.advice() {
            if let Advice::AfterReturn(f) = advice {
                f(self.join_point, &value)
                    .map_err(|e| interception(rule, AdviceKind::AfterReturn, e))?;
            }
        }
        Ok(value)
    }

    fn run_after_throw(&self, error: InterceptorError) -> InvocationResult {
        for (rule, advice) in self.advice() {
            if let Advice::AfterThrow(f) = advice {
                match f(self.join_point, error.as_ref()) {
                    Ok(ThrowOutcome::Propagate) => {}
                    Ok(ThrowOutcome::Recover(value)) => {
                        tracing::debug!("'{}' recovered {}", rule, self.join_point.signature());
                        return Ok(value);
                    }
                    Err(e) => return Err(interception(rule, AdviceKind::AfterThrow, e)),
                }
            }
        }
        Err(error)
    }

    /// Every `after` runs; the last failure, if any, governs.
    fn run_after(&self, mut result: InvocationResult) -> InvocationResult {
        self.after_ran.set(true);
        for (rule, advice) in self.advice() {
            if let Advice::After(f) = advice {
                if let Err(e) = f(self.join_point) {
                    tracing::warn!("After advice of '{}' failed: {}", rule, e);
                    result = Err(interception(rule, AdviceKind::After, e));
                }
            }
        }
        result
    }
}

impl ProceedChain for Invocation<'_> {
    fn proceed_from(&self, index: usize) -> InvocationResult {
        if let Some((_, Advice::Around(f))) = self.arounds.get(index) {
            return f(
                self.join_point,
                Proceed {
                    chain: self,
                    next: index + 1,
                },
            );
        }

        let Some(operation) = self.operation.take() else {
            return Err(format!("{} was already invoked", self.join_point.signature()).into());
        };
        self.invoked.set(true);
        self.transition(InvocationState::Invoking);
        let result = operation();
        self.settle(&result);
        let result = match result {
            Ok(value) => self.run_after_return(value),
            Err(e) => self.run_after_throw(e),
        };
        self.transition(InvocationState::AfterRun);
        self.run_after(result)
    }
}

fn interception(rule: &str, kind: AdviceKind, source: InterceptorError) -> InterceptorError {
    Box::new(ContainerError::Interception {
        rule: rule.to_string(),
        kind,
        source,
    })
}
