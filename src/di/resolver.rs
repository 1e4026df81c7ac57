use crate::config::Environment;
use crate::di::{Construction, Definition, Dependency, Erased, Instance, Lazy, Registry, Scope};
use crate::error::{ContainerError, Result};
use crate::interceptor::InterceptorChain;
use crate::lifecycle::{BeanPostProcessor, LifecycleError};
use crate::messaging::EventBus;
use dashmap::DashMap;
use serde::Serialize;
use std::any::TypeId;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, ThreadId};
use strum_macros::Display;

/// Observable state of a singleton's record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    Uninitialized,
    Constructing,
    Ready,
    Destroyed,
}

enum RecordState {
    Uninitialized,
    Constructing { owner: ThreadId },
    Ready(Instance),
    Destroyed,
}

impl RecordState {
    fn public(&self) -> InstanceState {
        match self {
            Self::Uninitialized => InstanceState::Uninitialized,
            Self::Constructing { .. } => InstanceState::Constructing,
            Self::Ready(_) => InstanceState::Ready,
            Self::Destroyed => InstanceState::Destroyed,
        }
    }
}

/// Per-singleton cell. Waiters block on `ready` while another thread constructs.
struct InstanceRecord {
    state: Mutex<RecordState>,
    ready: Condvar,
}

impl InstanceRecord {
    fn new() -> Self {
        Self {
            state: Mutex::new(RecordState::Uninitialized),
            ready: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RecordState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone)]
struct Frame {
    id: String,
    scope: Scope,
}

/// The chain of identifiers being resolved by one top-level call.
#[derive(Default)]
pub(crate) struct Resolution {
    frames: RefCell<Vec<Frame>>,
}

impl Resolution {
    fn path_to(&self, id: &str) -> String {
        let frames = self.frames.borrow();
        let start = frames.iter().position(|f| f.id == id).unwrap_or(0);
        frames[start..]
            .iter()
            .map(|f| f.id.as_str())
            .chain(std::iter::once(id))
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    /// `id` is already under construction further up this thread's stack.
    fn reentry_path(&self, id: &str) -> String {
        let frames = self.frames.borrow();
        std::iter::once(id)
            .chain(frames.iter().map(|f| f.id.as_str()))
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    fn contains(&self, id: &str) -> bool {
        self.frames.borrow().iter().any(|f| f.id == id)
    }

    /// Innermost singleton currently being built, the one that will hold `id`.
    fn nearest_singleton(&self) -> Option<String> {
        self.frames
            .borrow()
            .iter()
            .rev()
            .find(|f| f.scope == Scope::Singleton)
            .map(|f| f.id.clone())
    }

    fn enter(&self, id: &str, scope: Scope) -> Result<FrameGuard<'_>> {
        if self.contains(id) {
            return Err(ContainerError::CyclicDependency {
                cycle: self.path_to(id),
            });
        }
        self.frames.borrow_mut().push(Frame {
            id: id.to_string(),
            scope,
        });
        Ok(FrameGuard { resolution: self })
    }
}

struct FrameGuard<'r> {
    resolution: &'r Resolution,
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        self.resolution.frames.borrow_mut().pop();
    }
}

/// Declared dependencies of a definition, resolved in declaration order.
pub struct Args {
    values: Vec<Instance>,
}

impl Args {
    /// The `index`-th declared dependency as `U`.
    pub fn get<U: ?Sized + Send + Sync + 'static>(&self, index: usize) -> Result<Arc<U>> {
        self.values
            .get(index)
            .ok_or_else(|| ContainerError::not_found(format!("argument #{}", index)))?
            .try_get::<U>()
    }

    pub fn instance(&self, index: usize) -> Option<&Instance> {
        self.values.get(index)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// What a factory sees while its object is being constructed.
pub struct ResolutionContext<'a> {
    resolver: &'a Resolver,
    resolution: &'a Resolution,
    id: &'a str,
    args: &'a Args,
}

impl<'a> ResolutionContext<'a> {
    /// Identifier of the definition being constructed.
    pub fn id(&self) -> &str {
        self.id
    }

    pub fn args(&self) -> &Args {
        self.args
    }

    /// Resolve another object as part of this resolution; cycles are detected.
    pub fn resolve<U: ?Sized + Send + Sync + 'static>(&self, id: &str) -> Result<Arc<U>> {
        self.resolver
            .resolve_in(id, self.resolution)?
            .try_get::<U>()
    }

    pub fn resolve_by_type<U: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<U>> {
        let definition = self.resolver.select::<U>(None)?;
        self.resolve::<U>(definition.id())
    }

    pub fn resolve_qualified<U: ?Sized + Send + Sync + 'static>(
        &self,
        qualifier: &str,
    ) -> Result<Arc<U>> {
        let definition = self.resolver.select::<U>(Some(qualifier))?;
        self.resolve::<U>(definition.id())
    }

    /// A handle resolved on first use, which breaks construction cycles.
    pub fn lazy<U: ?Sized + Send + Sync + 'static>(&self, id: &str) -> Lazy<U> {
        Lazy::new(self.resolver.handle(), id)
    }

    pub fn environment(&self) -> &Environment {
        &self.resolver.environment
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.resolver.event_bus
    }
}

/// Materializes definitions into instances and owns the singleton cache.
pub(crate) struct Resolver {
    registry: Arc<Registry>,
    records: HashMap<String, InstanceRecord>,
    post_processors: Vec<Arc<dyn BeanPostProcessor>>,
    interceptors: InterceptorChain,
    environment: Environment,
    event_bus: EventBus,
    // Wait-for graph across threads: who builds what, who waits on what.
    constructing: DashMap<String, ThreadId>,
    waiting: DashMap<ThreadId, String>,
    // dependent -> dependencies, singletons only
    edges: DashMap<String, Vec<String>>,
    ready_order: Mutex<Vec<String>>,
    closed: AtomicBool,
    self_ref: Weak<Resolver>,
}

/// Resets a record that did not reach `Ready`, so the next call retries.
struct ConstructingGuard<'r> {
    resolver: &'r Resolver,
    record: &'r InstanceRecord,
    id: &'r str,
    completed: bool,
}

impl ConstructingGuard<'_> {
    fn complete(mut self, instance: Instance) {
        let mut state = self.record.lock();
        *state = RecordState::Ready(instance);
        self.resolver.constructing.remove(self.id);
        self.resolver
            .ready_order
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(self.id.to_string());
        self.completed = true;
        drop(state);
        self.record.ready.notify_all();
    }
}

impl Drop for ConstructingGuard<'_> {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        let mut state = self.record.lock();
        *state = RecordState::Uninitialized;
        self.resolver.constructing.remove(self.id);
        drop(state);
        self.record.ready.notify_all();
    }
}

impl Resolver {
    pub(crate) fn new(
        registry: Arc<Registry>,
        post_processors: Vec<Arc<dyn BeanPostProcessor>>,
        interceptors: InterceptorChain,
        environment: Environment,
        event_bus: EventBus,
    ) -> Arc<Self> {
        let records = registry
            .iter()
            .filter(|d| d.scope() == Scope::Singleton)
            .map(|d| (d.id().to_string(), InstanceRecord::new()))
            .collect();
        Arc::new_cyclic(|self_ref| Self {
            registry,
            records,
            post_processors,
            interceptors,
            environment,
            event_bus,
            constructing: DashMap::new(),
            waiting: DashMap::new(),
            edges: DashMap::new(),
            ready_order: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            self_ref: self_ref.clone(),
        })
    }

    pub(crate) fn registry(&self) -> &Registry {
        &self.registry
    }

    pub(crate) fn handle(&self) -> Weak<Resolver> {
        self.self_ref.clone()
    }

    pub(crate) fn environment(&self) -> &Environment {
        &self.environment
    }

    pub(crate) fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Stop serving resolutions. Returns `false` if already closed.
    pub(crate) fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn resolve(&self, id: &str) -> Result<Instance> {
        if self.is_closed() {
            return Err(ContainerError::Closed);
        }
        let resolution = Resolution::default();
        self.resolve_in(id, &resolution)
    }

    pub(crate) fn resolve_typed<T: ?Sized + Send + Sync + 'static>(
        &self,
        id: &str,
    ) -> Result<Arc<T>> {
        self.resolve(id)?.try_get::<T>()
    }

    /// Pick the single definition obtainable as `T`.
    ///
    /// A qualifier names the candidate outright; otherwise one candidate, or
    /// exactly one primary among several, wins.
    pub(crate) fn select<T: ?Sized + 'static>(&self, qualifier: Option<&str>) -> Result<&Definition> {
        self.select_by_type_id(
            TypeId::of::<T>(),
            std::any::type_name::<T>(),
            qualifier,
        )
    }

    fn select_by_type_id(
        &self,
        type_id: TypeId,
        type_name: &str,
        qualifier: Option<&str>,
    ) -> Result<&Definition> {
        let candidates = self.registry.find_by_type_id(type_id);
        if let Some(qualifier) = qualifier {
            return candidates
                .into_iter()
                .find(|d| d.id() == qualifier)
                .ok_or_else(|| {
                    ContainerError::not_found(format!("{} qualified by '{}'", type_name, qualifier))
                });
        }
        match candidates.as_slice() {
            [] => Err(ContainerError::not_found(format!("type {}", type_name))),
            [only] => Ok(*only),
            _ => {
                let primaries: Vec<&Definition> =
                    candidates.iter().copied().filter(|d| d.is_primary()).collect();
                match primaries.as_slice() {
                    [primary] => Ok(*primary),
                    _ => Err(ContainerError::Ambiguous {
                        type_name: type_name.to_string(),
                        candidates: candidates.iter().map(|d| d.id().to_string()).collect(),
                    }),
                }
            }
        }
    }

    pub(crate) fn resolve_in(&self, id: &str, resolution: &Resolution) -> Result<Instance> {
        let definition = self.registry.lookup(id)?;
        if definition.scope() == Scope::Singleton {
            if let Some(dependent) = resolution.nearest_singleton() {
                self.record_edge(&dependent, id);
            }
        }
        let _frame = resolution.enter(id, definition.scope())?;
        match definition.scope() {
            Scope::Singleton => self.singleton(definition, resolution),
            Scope::Prototype => {
                tracing::debug!("Creating prototype '{}'", id);
                self.create(definition, resolution)
            }
        }
    }

    fn record(&self, id: &str) -> Result<&InstanceRecord> {
        self.records
            .get(id)
            .ok_or_else(|| ContainerError::not_found(format!("singleton '{}'", id)))
    }

    fn record_edge(&self, dependent: &str, dependency: &str) {
        if dependent == dependency {
            return;
        }
        let mut deps = self.edges.entry(dependent.to_string()).or_default();
        if !deps.iter().any(|d| d == dependency) {
            deps.push(dependency.to_string());
        }
    }

    fn singleton(&self, definition: &Definition, resolution: &Resolution) -> Result<Instance> {
        let id = definition.id();
        let record = self.record(id)?;
        let current = thread::current().id();

        let mut state = record.lock();
        loop {
            match &*state {
                RecordState::Ready(instance) => return Ok(instance.clone()),
                RecordState::Destroyed => {
                    return Err(ContainerError::Destroyed { id: id.to_string() });
                }
                RecordState::Uninitialized => break,
                RecordState::Constructing { owner } if *owner == current => {
                    return Err(ContainerError::CyclicDependency {
                        cycle: resolution.reentry_path(id),
                    });
                }
                RecordState::Constructing { .. } => {}
            }
            self.waiting.insert(current, id.to_string());
            if let Some(cycle) = self.wait_cycle(current, id) {
                self.waiting.remove(&current);
                return Err(ContainerError::CyclicDependency { cycle });
            }
            tracing::debug!("Waiting for '{}' to finish construction", id);
            state = record
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
            self.waiting.remove(&current);
        }

        *state = RecordState::Constructing { owner: current };
        self.constructing.insert(id.to_string(), current);
        drop(state);

        let guard = ConstructingGuard {
            resolver: self,
            record,
            id,
            completed: false,
        };
        tracing::debug!("Creating singleton '{}'", id);
        let instance = self.create(definition, resolution)?;
        guard.complete(instance.clone());
        tracing::debug!("Singleton '{}' is ready", id);
        Ok(instance)
    }

    /// Follow "waits for" links from `id`; returns the cycle if it leads back to `current`.
    fn wait_cycle(&self, current: ThreadId, id: &str) -> Option<String> {
        let mut path = vec![id.to_string()];
        let mut target = id.to_string();
        for _ in 0..=self.constructing.len() {
            let owner = *self.constructing.get(&target)?;
            if owner == current {
                path.rotate_right(1);
                if let Some(first) = path.first().cloned() {
                    path.push(first);
                }
                return Some(path.join(" -> "));
            }
            target = self.waiting.get(&owner)?.value().clone();
            path.push(target.clone());
        }
        None
    }

    fn resolve_dependencies(&self, definition: &Definition, resolution: &Resolution) -> Result<Args> {
        let mut values = Vec::with_capacity(definition.dependencies().len());
        for dependency in definition.dependencies() {
            let instance = match dependency {
                Dependency::ById(id) => self.resolve_in(id, resolution)?,
                Dependency::ByType {
                    type_id,
                    type_name,
                    qualifier,
                } => {
                    let target =
                        self.select_by_type_id(*type_id, type_name, qualifier.as_deref())?;
                    self.resolve_in(target.id(), resolution)?
                }
            };
            values.push(instance);
        }
        Ok(Args { values })
    }

    /// The lifecycle chain, up to `Ready`.
    fn create(&self, definition: &Definition, resolution: &Resolution) -> Result<Instance> {
        let id = definition.id();
        let args = self.resolve_dependencies(definition, resolution)?;

        let constructed = match definition.construction() {
            Construction::Constructor(constructor) => constructor(&args),
            Construction::Factory(factory) => factory(&ResolutionContext {
                resolver: self,
                resolution,
                id,
                args: &args,
            }),
        };
        let mut object = constructed.map_err(|e| construction_error(id, e))?;

        for processor in &self.post_processors {
            processor
                .before_initialization(id, &mut *object)
                .map_err(|e| construction_error(id, e))?;
        }

        for hook in definition.init_hooks() {
            tracing::debug!("Running init hook '{}' on '{}'", hook.name, id);
            // A failed init hook is a failed construction; `HookFailed` is for destroy hooks.
            (hook.run)(&mut *object).map_err(|e| ContainerError::Construction {
                id: id.to_string(),
                source: Box::new(LifecycleError::hook_failed(hook.name.clone(), e)),
            })?;
        }

        let mut target: Erased = Arc::from(object);
        for processor in &self.post_processors {
            target = processor
                .after_initialization(id, target)
                .map_err(|e| construction_error(id, e))?;
        }

        let instance = Instance::new(definition, target)?;
        self.interceptors.wrap(instance, definition)
    }

    pub(crate) fn state(&self, id: &str) -> Result<InstanceState> {
        let definition = self.registry.lookup(id)?;
        if definition.scope() == Scope::Prototype {
            return Err(ContainerError::ScopeMismatch {
                message: format!("'{}' is a prototype and has no state", id),
            });
        }
        Ok(self.record(id)?.lock().public())
    }

    /// Run destroy hooks of a ready singleton. Returns whether anything was destroyed.
    pub(crate) fn destroy(&self, id: &str) -> Result<bool> {
        let definition = self.registry.lookup(id)?;
        if definition.scope() == Scope::Prototype {
            return Err(ContainerError::ScopeMismatch {
                message: format!("'{}' is a prototype; the container does not own it", id),
            });
        }
        let record = self.record(id)?;
        let instance = {
            let mut state = record.lock();
            if !matches!(&*state, RecordState::Ready(_)) {
                return Ok(false);
            }
            match std::mem::replace(&mut *state, RecordState::Destroyed) {
                RecordState::Ready(instance) => instance,
                _ => return Ok(false),
            }
        };

        let mut failure = None;
        for hook in definition.destroy_hooks() {
            tracing::debug!("Running destroy hook '{}' on '{}'", hook.name, id);
            if let Err(e) = (hook.run)(&**instance.target()) {
                tracing::error!("Destroy hook '{}' of '{}' failed: {}", hook.name, id, e);
                failure.get_or_insert(LifecycleError::hook_failed(hook.name.clone(), e));
            }
        }
        match failure {
            Some(source) => Err(ContainerError::HookFailed {
                id: id.to_string(),
                source,
            }),
            None => Ok(true),
        }
    }

    /// Dependencies recorded for `id` while it was constructed.
    pub(crate) fn dependencies_of(&self, id: &str) -> Vec<String> {
        self.edges
            .get(id)
            .map(|d| d.value().clone())
            .unwrap_or_default()
    }

    /// Ready singletons, each before everything it depends on.
    ///
    /// Unrelated singletons go in reverse order of readiness.
    pub(crate) fn destroy_order(&self) -> Vec<String> {
        let snapshot = self
            .ready_order
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let ready: Vec<String> = snapshot
            .into_iter()
            .filter(|id| {
                self.records
                    .get(id.as_str())
                    .is_some_and(|r| matches!(&*r.lock(), RecordState::Ready(_)))
            })
            .collect();

        let mut dependents: HashMap<&str, usize> = ready.iter().map(|id| (id.as_str(), 0)).collect();
        let deps: HashMap<&str, Vec<String>> = ready
            .iter()
            .map(|id| (id.as_str(), self.dependencies_of(id)))
            .collect();
        for targets in deps.values() {
            for target in targets {
                if let Some(count) = dependents.get_mut(target.as_str()) {
                    *count += 1;
                }
            }
        }

        let mut remaining: Vec<&str> = ready.iter().map(String::as_str).collect();
        let mut order = Vec::with_capacity(remaining.len());
        while !remaining.is_empty() {
            // Latest-ready node nobody still depends on; fall back to latest-ready.
            let pick = remaining
                .iter()
                .rposition(|id| dependents.get(id).copied().unwrap_or(0) == 0)
                .unwrap_or(remaining.len() - 1);
            let id = remaining.remove(pick);
            for target in deps.get(id).into_iter().flatten() {
                if let Some(count) = dependents.get_mut(target.as_str()) {
                    *count = count.saturating_sub(1);
                }
            }
            order.push(id.to_string());
        }
        order
    }
}

fn construction_error(id: &str, error: anyhow::Error) -> ContainerError {
    match error.downcast::<ContainerError>() {
        Ok(inner) => inner,
        Err(error) => ContainerError::Construction {
            id: id.to_string(),
            source: error.into(),
        },
    }
}
