use beanstack::prelude::*;

pub trait Calculator: Send + Sync {
    fn add(&self, a: i64, b: i64) -> std::result::Result<i64, InterceptorError>;
    fn div(&self, a: i64, b: i64) -> std::result::Result<i64, InterceptorError>;
}

struct MathCalculator;

impl Calculator for MathCalculator {
    fn add(&self, a: i64, b: i64) -> std::result::Result<i64, InterceptorError> {
        Ok(a + b)
    }

    fn div(&self, a: i64, b: i64) -> std::result::Result<i64, InterceptorError> {
        if b == 0 {
            return Err("division by zero".into());
        }
        Ok(a / b)
    }
}

struct CalculatorProxy {
    target: Arc<dyn Calculator>,
    advisor: Advisor,
}

impl Calculator for CalculatorProxy {
    fn add(&self, a: i64, b: i64) -> std::result::Result<i64, InterceptorError> {
        let jp = self.advisor.join_point("add").arg(&a).arg(&b);
        self.advisor.invoke(jp, || self.target.add(a, b))
    }

    fn div(&self, a: i64, b: i64) -> std::result::Result<i64, InterceptorError> {
        let jp = self.advisor.join_point("div").arg(&a).arg(&b);
        self.advisor.invoke(jp, || self.target.div(a, b))
    }
}

pub fn definition() -> beanstack::Result<Definition> {
    Definition::builder::<MathCalculator>("calculator")
        .constructor(|_| Ok(MathCalculator))
        .expose::<dyn Calculator, _>(|c| c as Arc<dyn Calculator>)
        .proxy::<dyn Calculator, _>(|target, advisor| {
            Arc::new(CalculatorProxy { target, advisor }) as Arc<dyn Calculator>
        })
        .build()
}

/// Logs every call and turns a failed division into a warning.
pub fn rules() -> beanstack::Result<Vec<InterceptionRule>> {
    Ok(vec![
        logging_rule("calculator-log", Pointcut::bean("calculator"))?,
        InterceptionRule::builder("division-guard", Pointcut::bean("calculator").operations("div"))
            .after_throwing(|jp, error| {
                tracing::warn!("{} failed: {}", jp, error);
                Ok(ThrowOutcome::Propagate)
            })
            .build()?,
    ])
}
