//! Bean post-processing
//!
//! Post-processors observe (and may replace) every object the resolver
//! creates, on both sides of the init hooks.

use crate::di::Erased;
use std::any::Any;

/// Hook into the creation of every object.
///
/// Processors run in ascending [`order`](BeanPostProcessor::order); ties keep
/// registration order.
///
/// # Example
///
/// ```rust,ignore
/// use beanstack::lifecycle::BeanPostProcessor;
///
/// struct Tracer;
///
/// impl BeanPostProcessor for Tracer {
///     fn before_initialization(&self, id: &str, _bean: &mut dyn Any) -> anyhow::Result<()> {
///         tracing::info!("postProcessBeforeInitialization: {id}");
///         Ok(())
///     }
/// }
/// ```
pub trait BeanPostProcessor: Send + Sync {
    /// Runs before init hooks, while the object is still exclusively owned.
    fn before_initialization(&self, _id: &str, _bean: &mut dyn Any) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs after init hooks. The returned object replaces the original.
    fn after_initialization(&self, _id: &str, bean: Erased) -> anyhow::Result<Erased> {
        Ok(bean)
    }

    fn name(&self) -> &str {
        "BeanPostProcessor"
    }

    /// Lower runs first.
    fn order(&self) -> i32 {
        0
    }
}

/// Sort processors by order, keeping registration order for ties.
pub(crate) fn sort_by_order(processors: &mut [std::sync::Arc<dyn BeanPostProcessor>]) {
    processors.sort_by_key(|p| p.order());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct Ordered(&'static str, i32);

    impl BeanPostProcessor for Ordered {
        fn name(&self) -> &str {
            self.0
        }

        fn order(&self) -> i32 {
            self.1
        }
    }

    #[test]
    fn test_sort_is_stable() {
        let mut processors: Vec<Arc<dyn BeanPostProcessor>> = vec![
            Arc::new(Ordered("late", 10)),
            Arc::new(Ordered("first", 0)),
            Arc::new(Ordered("second", 0)),
            Arc::new(Ordered("early", -5)),
        ];
        sort_by_order(&mut processors);
        let names: Vec<&str> = processors.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["early", "first", "second", "late"]);
    }

    #[test]
    fn test_defaults_pass_through() {
        let processor = Ordered("noop", 0);
        let mut value = 7u32;
        processor.before_initialization("n", &mut value).unwrap();
        let bean: Erased = Arc::new(value);
        let out = processor.after_initialization("n", bean.clone()).unwrap();
        assert!(Arc::ptr_eq(&bean, &out));
    }
}
