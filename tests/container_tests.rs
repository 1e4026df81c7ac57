use beanstack::prelude::*;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Barrier, Mutex};
use std::thread;
use std::time::Duration;

type Log = Arc<Mutex<Vec<String>>>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}

fn push(log: &Log, entry: impl Into<String>) {
    log.lock().unwrap().push(entry.into());
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

#[derive(Debug)]
struct Service;

fn service(id: &str) -> Definition {
    Definition::builder::<Service>(id)
        .constructor(|_| Ok(Service))
        .build()
        .unwrap()
}

trait Animal: Send + Sync {
    fn name(&self) -> &'static str;
}

struct Cat;
struct Dog;

impl Animal for Cat {
    fn name(&self) -> &'static str {
        "cat"
    }
}

impl Animal for Dog {
    fn name(&self) -> &'static str {
        "dog"
    }
}

fn cat() -> beanstack::di::DefinitionBuilder<Cat> {
    Definition::builder::<Cat>("cat")
        .constructor(|_| Ok(Cat))
        .expose::<dyn Animal, _>(|c| c as Arc<dyn Animal>)
}

fn dog() -> beanstack::di::DefinitionBuilder<Dog> {
    Definition::builder::<Dog>("dog")
        .constructor(|_| Ok(Dog))
        .expose::<dyn Animal, _>(|d| d as Arc<dyn Animal>)
}

#[test]
fn test_singleton_identity() {
    let container = Container::builder()
        .register(service("svc"))
        .unwrap()
        .build()
        .unwrap();
    let first = container.resolve::<Service>("svc").unwrap();
    let second = container.resolve::<Service>("svc").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(container.state("svc").unwrap(), InstanceState::Ready);
}

#[test]
fn test_prototype_freshness() {
    let created = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&created);
    let container = Container::builder()
        .register(
            Definition::builder::<Service>("proto")
                .prototype()
                .constructor(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(Service)
                })
                .build()
                .unwrap(),
        )
        .unwrap()
        .build()
        .unwrap();
    // Prototypes are not created at startup.
    assert_eq!(created.load(Ordering::SeqCst), 0);

    let first = container.resolve::<Service>("proto").unwrap();
    let second = container.resolve::<Service>("proto").unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(created.load(Ordering::SeqCst), 2);
}

#[test]
fn test_cycle_is_detected() {
    init_tracing();
    let container = Container::builder()
        .register(
            Definition::builder::<Service>("a")
                .lazy()
                .depends_on(Dependency::id("b"))
                .constructor(|_| Ok(Service))
                .build()
                .unwrap(),
        )
        .unwrap()
        .register(
            Definition::builder::<Service>("b")
                .lazy()
                .depends_on(Dependency::id("a"))
                .constructor(|_| Ok(Service))
                .build()
                .unwrap(),
        )
        .unwrap()
        .build()
        .unwrap();

    let err = container.resolve::<Service>("a").unwrap_err();
    match err {
        ContainerError::CyclicDependency { cycle } => assert_eq!(cycle, "a -> b -> a"),
        other => panic!("expected a cycle, got {other}"),
    }
    assert_eq!(container.state("a").unwrap(), InstanceState::Uninitialized);
    assert_eq!(container.state("b").unwrap(), InstanceState::Uninitialized);
}

#[test]
fn test_eager_cycle_fails_build() {
    let result = Container::builder()
        .register(
            Definition::builder::<Service>("self")
                .depends_on(Dependency::id("self"))
                .constructor(|_| Ok(Service))
                .build()
                .unwrap(),
        )
        .unwrap()
        .build();
    assert!(matches!(result, Err(ContainerError::CyclicDependency { .. })));
}

#[test]
fn test_concurrent_cycle_fails_instead_of_deadlocking() {
    init_tracing();
    let container = Container::builder()
        .register(
            Definition::builder::<Service>("a")
                .lazy()
                .factory(|ctx| {
                    thread::sleep(Duration::from_millis(50));
                    ctx.resolve::<Service>("b")?;
                    Ok(Service)
                })
                .build()
                .unwrap(),
        )
        .unwrap()
        .register(
            Definition::builder::<Service>("b")
                .lazy()
                .factory(|ctx| {
                    thread::sleep(Duration::from_millis(50));
                    ctx.resolve::<Service>("a")?;
                    Ok(Service)
                })
                .build()
                .unwrap(),
        )
        .unwrap()
        .build()
        .unwrap();

    let barrier = Barrier::new(2);
    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = ["a", "b"]
            .into_iter()
            .map(|id| {
                let container = container.clone();
                let barrier = &barrier;
                s.spawn(move || {
                    barrier.wait();
                    container.resolve::<Service>(id).map(|_| ())
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for result in results {
        assert!(
            matches!(result, Err(ContainerError::CyclicDependency { .. })),
            "{result:?}"
        );
    }
}

#[test]
fn test_concurrent_first_resolution_constructs_once() {
    let created = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&created);
    let container = Container::builder()
        .register(
            Definition::builder::<Service>("slow")
                .lazy()
                .constructor(move |_| {
                    thread::sleep(Duration::from_millis(30));
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(Service)
                })
                .build()
                .unwrap(),
        )
        .unwrap()
        .build()
        .unwrap();

    let barrier = Barrier::new(8);
    let resolved: Vec<Arc<Service>> = thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    container.resolve::<Service>("slow").unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert!(resolved.iter().all(|s| Arc::ptr_eq(s, &resolved[0])));
}

fn chained(id: &str, dependency: Option<&str>, log: &Log) -> Definition {
    let log = Arc::clone(log);
    let name = id.to_string();
    let mut builder = Definition::builder::<Service>(id).constructor(|_| Ok(Service));
    if let Some(dependency) = dependency {
        builder = builder.depends_on(Dependency::id(dependency));
    }
    builder
        .destroy_hook("destroy", move |_| {
            push(&log, name.clone());
            Ok(())
        })
        .build()
        .unwrap()
}

#[test]
fn test_destroy_all_tears_down_dependents_first() {
    let log: Log = Arc::default();
    let container = Container::builder()
        .register(chained("a", Some("b"), &log))
        .unwrap()
        .register(chained("b", Some("c"), &log))
        .unwrap()
        .register(chained("c", None, &log))
        .unwrap()
        .build()
        .unwrap();

    assert_eq!(container.dependencies_of("a"), vec!["b"]);
    assert_eq!(container.destroy_all(), 3);
    assert_eq!(entries(&log), vec!["a", "b", "c"]);
    assert!(container.is_closed());
    assert_eq!(container.destroy_all(), 0);
    assert_eq!(entries(&log).len(), 3);
}

#[test]
fn test_dependency_through_prototype_orders_destruction() {
    let log: Log = Arc::default();
    let hook_log = Arc::clone(&log);
    let container = Container::builder()
        .register(
            Definition::builder::<Service>("session")
                .depends_on(Dependency::id("request"))
                .constructor(|_| Ok(Service))
                .destroy_hook("destroy", move |_| {
                    push(&hook_log, "session");
                    Ok(())
                })
                .build()
                .unwrap(),
        )
        .unwrap()
        .register(
            Definition::builder::<Service>("request")
                .prototype()
                .depends_on(Dependency::id("pool"))
                .constructor(|_| Ok(Service))
                .destroy_hook("never", |_| panic!("prototypes are not destroyed"))
                .build()
                .unwrap(),
        )
        .unwrap()
        .register(chained("pool", None, &log))
        .unwrap()
        .build()
        .unwrap();

    assert_eq!(container.dependencies_of("session"), vec!["pool"]);
    assert_eq!(container.destroy_order(), vec!["session", "pool"]);
    container.destroy_all();
    assert_eq!(entries(&log), vec!["session", "pool"]);
}

#[test]
fn test_destroy_is_idempotent() {
    let destroyed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&destroyed);
    let container = Container::builder()
        .register(
            Definition::builder::<Service>("svc")
                .constructor(|_| Ok(Service))
                .destroy_hook("close", move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .build()
                .unwrap(),
        )
        .unwrap()
        .build()
        .unwrap();

    container.destroy("svc").unwrap();
    container.destroy("svc").unwrap();
    assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    assert_eq!(container.state("svc").unwrap(), InstanceState::Destroyed);
    assert!(matches!(
        container.resolve::<Service>("svc"),
        Err(ContainerError::Destroyed { .. })
    ));
    // Already destroyed singletons are skipped by the sweep.
    assert_eq!(container.destroy_all(), 0);
    assert_eq!(destroyed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_destroy_errors() {
    let container = Container::builder()
        .register(
            Definition::builder::<Service>("proto")
                .prototype()
                .constructor(|_| Ok(Service))
                .build()
                .unwrap(),
        )
        .unwrap()
        .register(
            Definition::builder::<Service>("never-built")
                .lazy()
                .constructor(|_| Ok(Service))
                .build()
                .unwrap(),
        )
        .unwrap()
        .build()
        .unwrap();

    assert!(matches!(
        container.destroy("missing"),
        Err(ContainerError::NotFound { .. })
    ));
    assert!(matches!(
        container.destroy("proto"),
        Err(ContainerError::ScopeMismatch { .. })
    ));
    container.destroy("never-built").unwrap();
    assert_eq!(
        container.state("never-built").unwrap(),
        InstanceState::Uninitialized
    );
}

#[test]
fn test_failing_destroy_hook_still_destroys() {
    let container = Container::builder()
        .register(
            Definition::builder::<Service>("svc")
                .constructor(|_| Ok(Service))
                .destroy_hook("flush", |_| anyhow::bail!("disk full"))
                .build()
                .unwrap(),
        )
        .unwrap()
        .build()
        .unwrap();

    let err = container.destroy("svc").unwrap_err();
    assert!(matches!(err, ContainerError::HookFailed { ref id, .. } if id == "svc"));
    assert_eq!(container.state("svc").unwrap(), InstanceState::Destroyed);
}

#[test]
fn test_ambiguity_and_primary() {
    let ambiguous = Container::builder()
        .register(cat().build().unwrap())
        .unwrap()
        .register(dog().build().unwrap())
        .unwrap()
        .build()
        .unwrap();
    match ambiguous.resolve_by_type::<dyn Animal>() {
        Err(ContainerError::Ambiguous { candidates, .. }) => {
            assert_eq!(candidates, vec!["cat", "dog"]);
        }
        other => panic!("expected ambiguity, got {:?}", other.map(|a| a.name())),
    }
    assert_eq!(
        ambiguous.resolve_qualified::<dyn Animal>("dog").unwrap().name(),
        "dog"
    );

    let with_primary = Container::builder()
        .register(cat().build().unwrap())
        .unwrap()
        .register(dog().primary().build().unwrap())
        .unwrap()
        .build()
        .unwrap();
    assert_eq!(with_primary.resolve_by_type::<dyn Animal>().unwrap().name(), "dog");
}

#[test]
fn test_two_primaries_are_ambiguous() {
    let container = Container::builder()
        .register(cat().primary().build().unwrap())
        .unwrap()
        .register(dog().primary().build().unwrap())
        .unwrap()
        .build()
        .unwrap();
    assert!(matches!(
        container.resolve_by_type::<dyn Animal>(),
        Err(ContainerError::Ambiguous { .. })
    ));
    assert!(matches!(
        container.resolve_by_type::<String>(),
        Err(ContainerError::NotFound { .. })
    ));
}

struct Zoo {
    animals: Vec<Arc<dyn Animal>>,
}

#[test]
fn test_injection_by_type_and_qualifier() {
    let container = Container::builder()
        .register(cat().build().unwrap())
        .unwrap()
        .register(dog().build().unwrap())
        .unwrap()
        .register(
            Definition::builder::<Zoo>("zoo")
                .depends_on(Dependency::qualified::<dyn Animal>("dog"))
                .depends_on(Dependency::qualified::<dyn Animal>("cat"))
                .constructor(|args| {
                    Ok(Zoo {
                        animals: vec![args.get::<dyn Animal>(0)?, args.get::<dyn Animal>(1)?],
                    })
                })
                .build()
                .unwrap(),
        )
        .unwrap()
        .build()
        .unwrap();

    let zoo = container.resolve::<Zoo>("zoo").unwrap();
    let names: Vec<&str> = zoo.animals.iter().map(|a| a.name()).collect();
    assert_eq!(names, vec!["dog", "cat"]);
    assert_eq!(container.dependencies_of("zoo"), vec!["dog", "cat"]);
}

#[test]
fn test_construction_failure_can_be_retried() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let container = Container::builder()
        .register(
            Definition::builder::<Service>("flaky")
                .lazy()
                .constructor(move |_| {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        anyhow::bail!("connection refused");
                    }
                    Ok(Service)
                })
                .build()
                .unwrap(),
        )
        .unwrap()
        .build()
        .unwrap();

    let err = container.resolve::<Service>("flaky").unwrap_err();
    assert!(matches!(err, ContainerError::Construction { ref id, .. } if id == "flaky"));
    assert_eq!(container.state("flaky").unwrap(), InstanceState::Uninitialized);
    assert!(container.resolve::<Service>("flaky").is_ok());
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[test]
fn test_init_hooks_run_in_order_and_failures_reset() {
    struct Counter {
        steps: Vec<&'static str>,
    }

    let container = Container::builder()
        .register(
            Definition::builder::<Counter>("counter")
                .constructor(|_| Ok(Counter { steps: Vec::new() }))
                .init_hook("first", |c| {
                    c.steps.push("first");
                    Ok(())
                })
                .init_hook("second", |c| {
                    c.steps.push("second");
                    Ok(())
                })
                .build()
                .unwrap(),
        )
        .unwrap()
        .register(
            Definition::builder::<Service>("broken")
                .lazy()
                .constructor(|_| Ok(Service))
                .init_hook("connect", |_| anyhow::bail!("timeout"))
                .build()
                .unwrap(),
        )
        .unwrap()
        .build()
        .unwrap();

    assert_eq!(
        container.resolve::<Counter>("counter").unwrap().steps,
        vec!["first", "second"]
    );
    let err = container.resolve::<Service>("broken").unwrap_err();
    match &err {
        ContainerError::Construction { id, source } => {
            assert_eq!(id, "broken");
            assert!(source.to_string().contains("connect"), "{source}");
        }
        other => panic!("expected a construction error, got {other}"),
    }
    assert_eq!(container.state("broken").unwrap(), InstanceState::Uninitialized);
}

struct Tracer {
    log: Log,
}

impl BeanPostProcessor for Tracer {
    fn before_initialization(&self, id: &str, _bean: &mut dyn std::any::Any) -> anyhow::Result<()> {
        push(&self.log, format!("before {id}"));
        Ok(())
    }

    fn after_initialization(
        &self,
        id: &str,
        bean: beanstack::di::Erased,
    ) -> anyhow::Result<beanstack::di::Erased> {
        push(&self.log, format!("after {id}"));
        Ok(bean)
    }
}

#[test]
fn test_post_processors_wrap_init_hooks() {
    let log: Log = Arc::default();
    let hook_log = Arc::clone(&log);
    let _container = Container::builder()
        .bean_post_processor(Tracer {
            log: Arc::clone(&log),
        })
        .register(
            Definition::builder::<Service>("svc")
                .constructor(|_| Ok(Service))
                .init_hook("init", move |_| {
                    push(&hook_log, "init svc");
                    Ok(())
                })
                .build()
                .unwrap(),
        )
        .unwrap()
        .build()
        .unwrap();
    assert_eq!(entries(&log), vec!["before svc", "init svc", "after svc"]);
}

struct Parent {
    child: Arc<Child>,
}

struct Child {
    parent: Lazy<Parent>,
}

#[test]
fn test_lazy_handle_breaks_cycle() {
    let container = Container::builder()
        .register(
            Definition::builder::<Parent>("parent")
                .depends_on(Dependency::id("child"))
                .constructor(|args| Ok(Parent { child: args.get::<Child>(0)? }))
                .build()
                .unwrap(),
        )
        .unwrap()
        .register(
            Definition::builder::<Child>("child")
                .factory(|ctx| {
                    Ok(Child {
                        parent: ctx.lazy::<Parent>("parent"),
                    })
                })
                .build()
                .unwrap(),
        )
        .unwrap()
        .build()
        .unwrap();

    let parent = container.resolve::<Parent>("parent").unwrap();
    assert!(!parent.child.parent.is_resolved());
    let back = parent.child.parent.get().unwrap();
    assert!(Arc::ptr_eq(&parent, &back));
    assert!(parent.child.parent.is_resolved());
}

#[test]
fn test_lazy_defers_resolution() {
    let container = Container::builder()
        .register(
            Definition::builder::<Service>("svc")
                .lazy()
                .constructor(|_| Ok(Service))
                .build()
                .unwrap(),
        )
        .unwrap()
        .build()
        .unwrap();

    let handle = container.lazy::<Service>("svc");
    assert_eq!(container.state("svc").unwrap(), InstanceState::Uninitialized);
    let first = handle.get().unwrap();
    assert_eq!(container.state("svc").unwrap(), InstanceState::Ready);
    assert!(Arc::ptr_eq(&first, &handle.get().unwrap()));

    let orphan = container.lazy::<Service>("svc");
    drop(container);
    assert!(matches!(orphan.get(), Err(ContainerError::Closed)));
    // Already resolved handles keep their object.
    assert!(handle.get().is_ok());
}

#[test]
fn test_conditional_registration() {
    let container = Container::builder()
        .environment(Environment::new().with("os.name", "Linux"))
        .register(
            cat()
                .condition(Condition::property_contains("os.name", "linux"))
                .build()
                .unwrap(),
        )
        .unwrap()
        .register(
            dog()
                .condition(Condition::property_contains("os.name", "windows"))
                .build()
                .unwrap(),
        )
        .unwrap()
        .build()
        .unwrap();

    assert!(container.contains("cat"));
    assert!(!container.contains("dog"));
    assert_eq!(container.resolve_by_type::<dyn Animal>().unwrap().name(), "cat");
}

struct Repository {
    url: String,
}

#[test]
fn test_factory_reads_environment_and_publishes() {
    let seen: Log = Arc::default();
    let handler_log = Arc::clone(&seen);
    let container = Container::builder()
        .environment(Environment::new().with("db.url", "mem://test"))
        .subscribe(EventFilter::kind("repository.created"), move |event| {
            push(&handler_log, event.payload["url"].as_str().unwrap_or_default());
            Ok(())
        })
        .register(
            Definition::builder::<Repository>("repository")
                .factory(|ctx| {
                    let url = ctx.environment().get_or("db.url", "mem://default");
                    ctx.event_bus()
                        .publish(&Event::new("repository.created", json!({ "url": url })));
                    Ok(Repository { url })
                })
                .build()
                .unwrap(),
        )
        .unwrap()
        .build()
        .unwrap();

    assert_eq!(container.resolve::<Repository>("repository").unwrap().url, "mem://test");
    assert_eq!(entries(&seen), vec!["mem://test"]);
}

#[test]
fn test_event_fan_out_survives_failing_subscriber() {
    let container = Container::builder().build().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    for i in 0..3 {
        let calls = Arc::clone(&calls);
        container
            .event_bus()
            .subscribe(EventFilter::kind("K"), move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                if i == 0 {
                    anyhow::bail!("subscriber {i} failed");
                }
                Ok(())
            });
    }

    let invoked = container.event_bus().publish(&Event::new("K", json!({})));
    assert_eq!(invoked, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn test_closed_event_precedes_destroy_hooks() {
    let log: Log = Arc::default();
    let event_log = Arc::clone(&log);
    let hook_log = Arc::clone(&log);
    let container = Container::builder()
        .subscribe(ContainerEvent::Closed, move |event| {
            push(&event_log, event.kind.clone());
            Ok(())
        })
        .register(
            Definition::builder::<Service>("svc")
                .constructor(|_| Ok(Service))
                .destroy_hook("close", move |_| {
                    push(&hook_log, "destroy svc");
                    Ok(())
                })
                .build()
                .unwrap(),
        )
        .unwrap()
        .build()
        .unwrap();

    container.destroy_all();
    assert_eq!(entries(&log), vec!["container.closed", "destroy svc"]);
    assert!(matches!(
        container.resolve::<Service>("svc"),
        Err(ContainerError::Closed)
    ));
}

trait Calculator: Send + Sync {
    fn add(&self, a: i32, b: i32) -> Result<i32, InterceptorError>;
    fn div(&self, a: i32, b: i32) -> Result<i32, InterceptorError>;
}

struct BasicCalculator {
    log: Log,
}

impl Calculator for BasicCalculator {
    fn add(&self, a: i32, b: i32) -> Result<i32, InterceptorError> {
        push(&self.log, "operation");
        Ok(a + b)
    }

    fn div(&self, a: i32, b: i32) -> Result<i32, InterceptorError> {
        push(&self.log, "operation");
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
    fn add(&self, a: i32, b: i32) -> Result<i32, InterceptorError> {
        let jp = self.advisor.join_point("add").arg(&a).arg(&b);
        self.advisor.invoke(jp, || self.target.add(a, b))
    }

    fn div(&self, a: i32, b: i32) -> Result<i32, InterceptorError> {
        let jp = self.advisor.join_point("div").arg(&a).arg(&b);
        self.advisor.invoke(jp, || self.target.div(a, b))
    }
}

fn calculator(log: &Log) -> Definition {
    let log = Arc::clone(log);
    Definition::builder::<BasicCalculator>("calculator")
        .constructor(move |_| Ok(BasicCalculator { log: Arc::clone(&log) }))
        .expose::<dyn Calculator, _>(|c| c as Arc<dyn Calculator>)
        .proxy::<dyn Calculator, _>(|target, advisor| {
            Arc::new(CalculatorProxy { target, advisor }) as Arc<dyn Calculator>
        })
        .build()
        .unwrap()
}

fn advice_rules(log: &Log) -> Vec<InterceptionRule> {
    let target = || Pointcut::bean("calculator");
    let (b, a, r, t, f) = (
        Arc::clone(log),
        Arc::clone(log),
        Arc::clone(log),
        Arc::clone(log),
        Arc::clone(log),
    );
    vec![
        InterceptionRule::builder("before", target())
            .before(move |_| {
                push(&b, "before");
                Ok(())
            })
            .build()
            .unwrap(),
        InterceptionRule::builder("around", target())
            .around(move |_, proceed| {
                push(&a, "around-entry");
                let result = proceed.proceed();
                push(&a, if result.is_ok() { "around-exit" } else { "around-exit(rethrow)" });
                result
            })
            .build()
            .unwrap(),
        InterceptionRule::builder("after-return", target())
            .after_returning(move |_, _| {
                push(&r, "after-return");
                Ok(())
            })
            .build()
            .unwrap(),
        InterceptionRule::builder("after-throw", target())
            .after_throwing(move |_, _| {
                push(&t, "after-throw");
                Ok(ThrowOutcome::Propagate)
            })
            .build()
            .unwrap(),
        InterceptionRule::builder("after", target())
            .after(move |_| {
                push(&f, "after");
                Ok(())
            })
            .build()
            .unwrap(),
    ]
}

fn advised_container(log: &Log) -> Container {
    let mut builder = Container::builder().register(calculator(log)).unwrap();
    for rule in advice_rules(log) {
        builder = builder.rule(rule).unwrap();
    }
    builder.build().unwrap()
}

#[test]
fn test_advice_order_on_success() {
    init_tracing();
    let log: Log = Arc::default();
    let container = advised_container(&log);
    let calculator = container.resolve::<dyn Calculator>("calculator").unwrap();

    assert_eq!(calculator.add(2, 3).unwrap(), 5);
    assert_eq!(
        entries(&log),
        vec!["before", "around-entry", "operation", "after-return", "after", "around-exit"]
    );
}

#[test]
fn test_advice_order_on_failure() {
    let log: Log = Arc::default();
    let container = advised_container(&log);
    let calculator = container.resolve::<dyn Calculator>("calculator").unwrap();

    let err = calculator.div(1, 0).unwrap_err();
    assert_eq!(err.to_string(), "division by zero");
    assert_eq!(
        entries(&log),
        vec![
            "before",
            "around-entry",
            "operation",
            "after-throw",
            "after",
            "around-exit(rethrow)"
        ]
    );
}

#[test]
fn test_advised_object_hides_its_concrete_type() {
    let log: Log = Arc::default();
    let container = advised_container(&log);
    let instance = container.resolve_instance("calculator").unwrap();
    assert!(instance.is_advised());
    assert!(matches!(
        container.resolve::<BasicCalculator>("calculator"),
        Err(ContainerError::TypeMismatch { .. })
    ));
}

#[test]
fn test_rule_without_proxy_leaves_object_alone() {
    let container = Container::builder()
        .register(service("plain"))
        .unwrap()
        .rule(logging_rule("logging", Pointcut::bean("plain")).unwrap())
        .unwrap()
        .build()
        .unwrap();
    let instance = container.resolve_instance("plain").unwrap();
    assert!(!instance.is_advised());
    assert!(container.resolve::<Service>("plain").is_ok());
}

#[test]
fn test_after_throw_recovery_through_proxy() {
    let log: Log = Arc::default();
    let container = Container::builder()
        .register(calculator(&log))
        .unwrap()
        .rule(
            InterceptionRule::builder("safe-div", Pointcut::bean("calculator").operations("div"))
                .after_throwing(|_, _| Ok(ThrowOutcome::Recover(ReturnValue::new(0i32))))
                .build()
                .unwrap(),
        )
        .unwrap()
        .build()
        .unwrap();

    let calculator = container.resolve::<dyn Calculator>("calculator").unwrap();
    assert_eq!(calculator.div(4, 0).unwrap(), 0);
    assert_eq!(calculator.div(4, 2).unwrap(), 2);
}

#[test]
fn test_duplicate_rule_names_are_rejected() {
    let result = Container::builder()
        .rule(logging_rule("logging", Pointcut::type_name("*")).unwrap())
        .unwrap()
        .rule(logging_rule("logging", Pointcut::type_name("*")).unwrap());
    assert!(matches!(result, Err(ContainerError::InvalidRule { .. })));
}

#[derive(Default)]
struct Sensor {
    calibrated: bool,
}

impl Initialize for Sensor {
    fn initialize(&mut self) -> std::result::Result<(), LifecycleError> {
        Err(LifecycleError::init_failed("sensor not calibrated"))
    }
}

impl Dispose for Sensor {
    fn dispose(&self) -> std::result::Result<(), LifecycleError> {
        if self.calibrated {
            return Ok(());
        }
        Err(LifecycleError::shutdown_failed("sensor still attached"))
    }
}

#[test]
fn test_initialize_and_dispose_failures() {
    let container = Container::builder()
        .register(
            Definition::builder::<Sensor>("part")
                .lazy()
                .constructor(|_| Ok(Sensor::default()))
                .initializing()
                .build()
                .unwrap(),
        )
        .unwrap()
        .register(
            Definition::builder::<Sensor>("spare")
                .constructor(|_| Ok(Sensor::default()))
                .disposable()
                .build()
                .unwrap(),
        )
        .unwrap()
        .build()
        .unwrap();

    match container.resolve::<Sensor>("part") {
        Err(ContainerError::Construction { id, source }) => {
            assert_eq!(id, "part");
            assert!(source.to_string().contains("sensor not calibrated"), "{source}");
        }
        Err(other) => panic!("expected a construction error, got {other}"),
        Ok(_) => panic!("initialize should have failed"),
    }

    match container.destroy("spare") {
        Err(ContainerError::HookFailed { id, source }) => {
            assert_eq!(id, "spare");
            assert!(matches!(source, LifecycleError::HookFailed { ref hook, .. } if hook == "dispose"));
        }
        other => panic!("expected a destroy hook failure, got {other:?}"),
    }
    assert_eq!(container.state("spare").unwrap(), InstanceState::Destroyed);
}

#[derive(Default)]
struct ReservedIds;

impl Module for ReservedIds {
    fn register(&self, registrar: &mut Registrar<'_>) -> beanstack::Result<()> {
        registrar.register(service("svc"))?;
        Ok(())
    }
}

#[test]
fn test_module_reregistering_an_id_fails_as_duplicate() {
    let result = Container::builder()
        .register(service("svc"))
        .unwrap()
        .module::<ReservedIds>();
    assert!(matches!(result, Err(ContainerError::DuplicateId { ref id }) if id == "svc"));
}
