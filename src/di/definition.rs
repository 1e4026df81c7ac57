use crate::config::Environment;
use crate::di::{Args, Erased, ResolutionContext};
use crate::error::{ContainerError, Result};
use crate::interceptor::Advisor;
use crate::lifecycle::{Dispose, Initialize};
use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use strum_macros::{Display, EnumString, IntoStaticStr};

/// Object produced by a construction strategy, before it is shared.
pub(crate) type Constructed = Box<dyn Any + Send + Sync>;

type ConstructorFn = dyn Fn(&Args) -> anyhow::Result<Constructed> + Send + Sync;
type FactoryFn = dyn Fn(&ResolutionContext<'_>) -> anyhow::Result<Constructed> + Send + Sync;
type InitFn = dyn Fn(&mut (dyn Any + Send + Sync + 'static)) -> anyhow::Result<()> + Send + Sync;
type DestroyFn = dyn Fn(&dyn Any) -> anyhow::Result<()> + Send + Sync;
type CastFn = dyn Fn(Erased) -> Option<Erased> + Send + Sync;
type ProxyFn = dyn Fn(Erased, Advisor) -> Option<Erased> + Send + Sync;
type ConditionFn = dyn Fn(&Environment) -> bool + Send + Sync;

/// How many instances a definition produces.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Display,
    EnumString,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// One shared instance per container.
    #[default]
    Singleton,
    /// A fresh instance on every resolution.
    Prototype,
}

/// Reference to another definition, declared up front.
#[derive(Debug, Clone)]
pub enum Dependency {
    ById(String),
    ByType {
        type_id: TypeId,
        type_name: &'static str,
        qualifier: Option<String>,
    },
}

impl Dependency {
    pub fn id(id: impl Into<String>) -> Self {
        Self::ById(id.into())
    }

    /// Any definition whose concrete type or an exposed view is `T`.
    pub fn of_type<T: ?Sized + 'static>() -> Self {
        Self::ByType {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            qualifier: None,
        }
    }

    /// Like [`of_type`](Self::of_type), but picks the candidate named `qualifier`.
    pub fn qualified<T: ?Sized + 'static>(qualifier: impl Into<String>) -> Self {
        Self::ByType {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            qualifier: Some(qualifier.into()),
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ById(id) => write!(f, "'{}'", id),
            Self::ByType {
                type_name,
                qualifier: Some(q),
                ..
            } => write!(f, "{} qualified by '{}'", type_name, q),
            Self::ByType { type_name, .. } => write!(f, "{}", type_name),
        }
    }
}

/// Construction strategy of a definition.
#[derive(Clone)]
pub enum Construction {
    /// Receives only the declared dependencies, in declaration order.
    Constructor(Arc<ConstructorFn>),
    /// Receives the full resolution context.
    Factory(Arc<FactoryFn>),
}

impl fmt::Debug for Construction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constructor(_) => f.write_str("Constructor"),
            Self::Factory(_) => f.write_str("Factory"),
        }
    }
}

#[derive(Clone)]
pub(crate) struct InitHook {
    pub(crate) name: String,
    pub(crate) run: Arc<InitFn>,
}

#[derive(Clone)]
pub(crate) struct DestroyHook {
    pub(crate) name: String,
    pub(crate) run: Arc<DestroyFn>,
}

/// A typed face of the object: its concrete type or a trait it implements.
#[derive(Clone)]
pub(crate) struct View {
    pub(crate) type_id: TypeId,
    pub(crate) type_name: &'static str,
    pub(crate) cast: Arc<CastFn>,
    pub(crate) proxy: Option<Arc<ProxyFn>>,
}

/// Registration-time predicate evaluated against the [`Environment`].
#[derive(Clone)]
pub struct Condition {
    name: String,
    test: Arc<ConditionFn>,
}

impl Condition {
    pub fn new<F>(name: impl Into<String>, test: F) -> Self
    where
        F: Fn(&Environment) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            test: Arc::new(test),
        }
    }

    /// Matches when `key` is present and contains `needle`, ignoring case.
    pub fn property_contains(key: &str, needle: &str) -> Self {
        let key = key.to_string();
        let needle = needle.to_lowercase();
        Self::new(format!("{} contains '{}'", key, needle), move |env| {
            env.get(&key)
                .is_some_and(|v| v.to_lowercase().contains(&needle))
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matches(&self, environment: &Environment) -> bool {
        (self.test)(environment)
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Condition").field(&self.name).finish()
    }
}

/// Declarative description of how to construct and manage one object.
///
/// Immutable once built; use [`Definition::builder`].
pub struct Definition {
    id: String,
    type_id: TypeId,
    type_name: &'static str,
    scope: Scope,
    construction: Construction,
    dependencies: Vec<Dependency>,
    init_hooks: Vec<InitHook>,
    destroy_hooks: Vec<DestroyHook>,
    views: Vec<View>,
    lazy: bool,
    primary: bool,
    condition: Option<Condition>,
}

impl Definition {
    /// Start describing an object of type `T` registered under `id`.
    pub fn builder<T: Send + Sync + 'static>(id: impl Into<String>) -> DefinitionBuilder<T> {
        DefinitionBuilder::new(id.into())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn construction(&self) -> &Construction {
        &self.construction
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    pub fn is_lazy(&self) -> bool {
        self.lazy
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    pub fn condition(&self) -> Option<&Condition> {
        self.condition.as_ref()
    }

    pub fn init_hook_names(&self) -> Vec<&str> {
        self.init_hooks.iter().map(|h| h.name.as_str()).collect()
    }

    pub fn destroy_hook_names(&self) -> Vec<&str> {
        self.destroy_hooks.iter().map(|h| h.name.as_str()).collect()
    }

    /// Whether the object can be obtained as `type_id` (its own type or an exposed view).
    pub fn is_assignable_to(&self, type_id: TypeId) -> bool {
        self.views.iter().any(|v| v.type_id == type_id)
    }

    /// Names of every type the object can be obtained as.
    pub fn exposed_type_names(&self) -> Vec<&'static str> {
        self.views.iter().map(|v| v.type_name).collect()
    }

    pub fn has_proxies(&self) -> bool {
        self.views.iter().any(|v| v.proxy.is_some())
    }

    pub(crate) fn init_hooks(&self) -> &[InitHook] {
        &self.init_hooks
    }

    pub(crate) fn destroy_hooks(&self) -> &[DestroyHook] {
        &self.destroy_hooks
    }

    pub(crate) fn views(&self) -> &[View] {
        &self.views
    }
}

impl fmt::Debug for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Definition")
            .field("id", &self.id)
            .field("type_name", &self.type_name)
            .field("scope", &self.scope)
            .field("construction", &self.construction)
            .field("dependencies", &self.dependencies)
            .field("init_hooks", &self.init_hook_names())
            .field("destroy_hooks", &self.destroy_hook_names())
            .field("exposes", &self.exposed_type_names())
            .field("lazy", &self.lazy)
            .field("primary", &self.primary)
            .field("condition", &self.condition)
            .finish()
    }
}

struct PendingProxy {
    type_id: TypeId,
    type_name: &'static str,
    proxy: Arc<ProxyFn>,
}

/// Builder for a [`Definition`] of type `T`.
///
/// # Example
/// ```
/// use beanstack::di::{Definition, Scope};
///
/// struct Engine;
///
/// let definition = Definition::builder::<Engine>("engine")
///     .scope(Scope::Prototype)
///     .constructor(|_| Ok(Engine))
///     .build()
///     .unwrap();
/// assert_eq!(definition.scope(), Scope::Prototype);
/// ```
pub struct DefinitionBuilder<T> {
    id: String,
    scope: Scope,
    construction: Option<Construction>,
    dependencies: Vec<Dependency>,
    init_hooks: Vec<InitHook>,
    destroy_hooks: Vec<DestroyHook>,
    views: Vec<View>,
    pending_proxies: Vec<PendingProxy>,
    lazy: bool,
    primary: bool,
    condition: Option<Condition>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> DefinitionBuilder<T> {
    fn new(id: String) -> Self {
        let own_view = View {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            cast: Arc::new(|target: Erased| {
                target
                    .downcast::<T>()
                    .ok()
                    .map(|concrete| Arc::new(concrete) as Erased)
            }),
            proxy: None,
        };
        Self {
            id,
            scope: Scope::Singleton,
            construction: None,
            dependencies: Vec::new(),
            init_hooks: Vec::new(),
            destroy_hooks: Vec::new(),
            views: vec![own_view],
            pending_proxies: Vec::new(),
            lazy: false,
            primary: false,
            condition: None,
            _marker: PhantomData,
        }
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn prototype(self) -> Self {
        self.scope(Scope::Prototype)
    }

    /// Skip eager instantiation at container startup.
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    /// Preferred candidate when several definitions match a type lookup.
    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    pub fn depends_on(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Build from the declared dependencies only.
    pub fn constructor<F>(mut self, f: F) -> Self
    where
        F: Fn(&Args) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.construction = Some(Construction::Constructor(Arc::new(move |args| {
            f(args).map(|value| Box::new(value) as Constructed)
        })));
        self
    }

    /// Build with access to the resolution context.
    pub fn factory<F>(mut self, f: F) -> Self
    where
        F: Fn(&ResolutionContext<'_>) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.construction = Some(Construction::Factory(Arc::new(move |ctx| {
            f(ctx).map(|value| Box::new(value) as Constructed)
        })));
        self
    }

    /// Build by cloning a prepared value.
    pub fn value(self, value: T) -> Self
    where
        T: Clone,
    {
        self.constructor(move |_| Ok(value.clone()))
    }

    /// Append a named init hook; hooks run in declaration order.
    pub fn init_hook<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let name = name.into();
        let hook_name = name.clone();
        self.init_hooks.push(InitHook {
            name,
            run: Arc::new(move |bean: &mut (dyn Any + Send + Sync + 'static)| {
                match bean.downcast_mut::<T>() {
                    Some(bean) => f(bean),
                    None => anyhow::bail!(
                        "init hook '{}' expected {}",
                        hook_name,
                        std::any::type_name::<T>()
                    ),
                }
            }),
        });
        self
    }

    /// Append a named destroy hook; hooks run in declaration order.
    pub fn destroy_hook<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let name = name.into();
        let hook_name = name.clone();
        self.destroy_hooks.push(DestroyHook {
            name,
            run: Arc::new(move |bean: &dyn Any| match bean.downcast_ref::<T>() {
                Some(bean) => f(bean),
                None => anyhow::bail!(
                    "destroy hook '{}' expected {}",
                    hook_name,
                    std::any::type_name::<T>()
                ),
            }),
        });
        self
    }

    /// Register [`Initialize::initialize`] as an init hook.
    pub fn initializing(self) -> Self
    where
        T: Initialize,
    {
        self.init_hook("initialize", |bean: &mut T| Ok(bean.initialize()?))
    }

    /// Register [`Dispose::dispose`] as a destroy hook.
    pub fn disposable(self) -> Self
    where
        T: Dispose,
    {
        self.destroy_hook("dispose", |bean: &T| Ok(bean.dispose()?))
    }

    pub fn condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Make the object obtainable as `U`, typically a trait object.
    ///
    /// ```
    /// use beanstack::di::Definition;
    /// use std::sync::Arc;
    ///
    /// trait Animal: Send + Sync {}
    /// struct Dog;
    /// impl Animal for Dog {}
    ///
    /// let definition = Definition::builder::<Dog>("dog")
    ///     .constructor(|_| Ok(Dog))
    ///     .expose::<dyn Animal, _>(|dog| dog as Arc<dyn Animal>)
    ///     .build()
    ///     .unwrap();
    /// assert!(definition.is_assignable_to(std::any::TypeId::of::<dyn Animal>()));
    /// ```
    pub fn expose<U, F>(mut self, cast: F) -> Self
    where
        U: ?Sized + Send + Sync + 'static,
        F: Fn(Arc<T>) -> Arc<U> + Send + Sync + 'static,
    {
        self.views.retain(|v| v.type_id != TypeId::of::<U>());
        self.views.push(View {
            type_id: TypeId::of::<U>(),
            type_name: std::any::type_name::<U>(),
            cast: Arc::new(move |target: Erased| {
                target
                    .downcast::<T>()
                    .ok()
                    .map(|concrete| Arc::new(cast(concrete)) as Erased)
            }),
            proxy: None,
        });
        self
    }

    /// Decorator used for view `U` when an interception rule matches.
    ///
    /// `U` must be exposed (or be `T` itself) by the time [`build`](Self::build) runs.
    pub fn proxy<U, F>(mut self, factory: F) -> Self
    where
        U: ?Sized + Send + Sync + 'static,
        F: Fn(Arc<U>, Advisor) -> Arc<U> + Send + Sync + 'static,
    {
        self.pending_proxies.push(PendingProxy {
            type_id: TypeId::of::<U>(),
            type_name: std::any::type_name::<U>(),
            proxy: Arc::new(move |view: Erased, advisor: Advisor| {
                view.downcast_ref::<Arc<U>>()
                    .map(|target| Arc::new(factory(Arc::clone(target), advisor)) as Erased)
            }),
        });
        self
    }

    pub fn build(self) -> Result<Definition> {
        let Self {
            id,
            scope,
            construction,
            dependencies,
            init_hooks,
            destroy_hooks,
            mut views,
            pending_proxies,
            lazy,
            primary,
            condition,
            _marker,
        } = self;

        if id.trim().is_empty() {
            return Err(ContainerError::InvalidDefinition {
                id,
                message: "identifier must not be empty".to_string(),
            });
        }
        let Some(construction) = construction else {
            return Err(ContainerError::InvalidDefinition {
                id,
                message: "no constructor or factory given".to_string(),
            });
        };
        for pending in pending_proxies {
            match views.iter_mut().find(|v| v.type_id == pending.type_id) {
                Some(view) => view.proxy = Some(pending.proxy),
                None => {
                    return Err(ContainerError::InvalidDefinition {
                        id,
                        message: format!("proxy for {} which is not exposed", pending.type_name),
                    });
                }
            }
        }

        Ok(Definition {
            id,
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            scope,
            construction,
            dependencies,
            init_hooks,
            destroy_hooks,
            views,
            lazy,
            primary,
            condition,
        })
    }
}
