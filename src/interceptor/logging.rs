use crate::aspect::{InterceptionRule, Pointcut, ThrowOutcome};
use crate::error::Result;
use std::time::Instant;

/// A rule that logs every matching call with its timing.
///
/// ```text
/// --> calculator.div(10, 0)
/// <-- calculator.div ERROR: division by zero 12.5µs
/// ```
pub fn logging_rule(name: impl Into<String>, pointcut: Pointcut) -> Result<InterceptionRule> {
    InterceptionRule::builder(name, pointcut)
        .before(|jp| {
            tracing::debug!("before {}", jp.signature());
            Ok(())
        })
        .around(|jp, proceed| {
            let start = Instant::now();
            tracing::info!("--> {}", jp);

            match proceed.proceed() {
                Ok(value) => {
                    tracing::info!(
                        "<-- {} = {} {:?}",
                        jp.signature(),
                        value.repr(),
                        start.elapsed()
                    );
                    Ok(value)
                }
                Err(e) => {
                    tracing::info!("<-- {} ERROR: {} {:?}", jp.signature(), e, start.elapsed());
                    Err(e)
                }
            }
        })
        .after_returning(|jp, value| {
            tracing::debug!("after-return {} = {}", jp.signature(), value.repr());
            Ok(())
        })
        .after_throwing(|jp, error| {
            tracing::warn!("after-throw {}: {}", jp.signature(), error);
            Ok(ThrowOutcome::Propagate)
        })
        .after(|jp| {
            tracing::debug!("after {}", jp.signature());
            Ok(())
        })
        .build()
}
