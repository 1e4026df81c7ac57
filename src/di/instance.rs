use crate::di::{Definition, Erased};
use crate::error::{ContainerError, Result};
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A resolved object together with the typed views it can be obtained as.
///
/// Cloning is cheap and every clone refers to the same object.
#[derive(Clone)]
pub struct Instance {
    inner: Arc<InstanceInner>,
}

struct InstanceInner {
    id: String,
    type_name: &'static str,
    target: Erased,
    // Each value is an `Arc<V>` erased, where `V` is the view's type.
    views: HashMap<TypeId, Erased>,
    advised: bool,
}

impl Instance {
    /// Casts `target` into every view the definition exposes.
    pub(crate) fn new(definition: &Definition, target: Erased) -> Result<Self> {
        let mut views = HashMap::with_capacity(definition.views().len());
        for view in definition.views() {
            if let Some(erased) = (view.cast)(Arc::clone(&target)) {
                views.insert(view.type_id, erased);
            }
        }
        if views.is_empty() {
            return Err(ContainerError::TypeMismatch {
                id: definition.id().to_string(),
                type_name: definition.type_name().to_string(),
            });
        }
        Ok(Self {
            inner: Arc::new(InstanceInner {
                id: definition.id().to_string(),
                type_name: definition.type_name(),
                target,
                views,
                advised: false,
            }),
        })
    }

    /// Same object, seen only through the given (proxied) views.
    pub(crate) fn advised(&self, views: HashMap<TypeId, Erased>) -> Self {
        Self {
            inner: Arc::new(InstanceInner {
                id: self.inner.id.clone(),
                type_name: self.inner.type_name,
                target: Arc::clone(&self.inner.target),
                views,
                advised: true,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn type_name(&self) -> &'static str {
        self.inner.type_name
    }

    /// The object as `T`, if `T` is one of its views.
    pub fn get<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.inner
            .views
            .get(&TypeId::of::<T>())
            .and_then(|view| view.downcast_ref::<Arc<T>>())
            .cloned()
    }

    pub fn try_get<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.get::<T>().ok_or_else(|| ContainerError::TypeMismatch {
            id: self.inner.id.clone(),
            type_name: std::any::type_name::<T>().to_string(),
        })
    }

    pub fn exposes(&self, type_id: TypeId) -> bool {
        self.inner.views.contains_key(&type_id)
    }

    /// Whether interception rules wrap this object.
    pub fn is_advised(&self) -> bool {
        self.inner.advised
    }

    /// Whether both handles refer to the same constructed object.
    pub fn same_object(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.inner.target, &other.inner.target)
    }

    /// The unproxied object, as handed to destroy hooks.
    pub(crate) fn target(&self) -> &Erased {
        &self.inner.target
    }

    pub(crate) fn view(&self, type_id: TypeId) -> Option<&Erased> {
        self.inner.views.get(&type_id)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.inner.id)
            .field("type_name", &self.inner.type_name)
            .field("views", &self.inner.views.len())
            .field("advised", &self.inner.advised)
            .finish()
    }
}
