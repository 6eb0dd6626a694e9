use alloc::{collections::BTreeMap, sync::Arc, vec::Vec};
use core::{
    any::{type_name, Any, TypeId},
    cmp::Ordering,
    fmt::{self, Display, Formatter},
};

use crate::lifecycle::MethodTable;

#[derive(Debug, Clone, Copy)]
pub struct TypeInfo {
    pub name: &'static str,
    pub id: TypeId,
}

impl PartialEq for TypeInfo {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeInfo {}

impl PartialOrd for TypeInfo {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TypeInfo {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl Display for TypeInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl TypeInfo {
    #[inline]
    #[must_use]
    pub fn of<T>() -> Self
    where
        T: ?Sized + 'static,
    {
        Self {
            name: type_name::<T>(),
            id: TypeId::of::<T>(),
        }
    }

    /// Name without module path and generic arguments, e.g. `UserService` for `app::UserService<Pg>`
    #[inline]
    #[must_use]
    pub fn short_name(&self) -> &'static str {
        let name = self.name.trim_start_matches("dyn ");
        let name = name.split_once('<').map_or(name, |(base, _)| base);
        name.rsplit_once("::").map_or(name, |(_, name)| name)
    }
}

pub(crate) type RcAny = Arc<dyn Any + Send + Sync>;

/// Type-erased handle to a component object.
///
/// An instance is a set of *views* of one shared allocation: the concrete type it was created from
/// and every other type (usually trait objects) registered with [`Instance::view`].
/// Each view is stored as an `Arc<V>`, so getting a view never clones the object itself.
#[derive(Clone)]
pub struct Instance {
    type_info: TypeInfo,
    address: usize,
    views: Arc<BTreeMap<TypeInfo, RcAny>>,
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("type", &self.type_info.name)
            .field("views", &self.views.keys().map(|view| view.name).collect::<Vec<_>>())
            .finish()
    }
}

impl Instance {
    #[inline]
    #[must_use]
    pub fn new<T: Send + Sync + 'static>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    #[must_use]
    pub fn from_arc<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> Self {
        let type_info = TypeInfo::of::<T>();
        let address = Arc::as_ptr(&value).cast::<()>() as usize;

        let mut views = BTreeMap::new();
        views.insert(type_info, Arc::new(value) as RcAny);

        Self {
            type_info,
            address,
            views: Arc::new(views),
        }
    }

    /// Registers another view of the same object.
    /// `cast` must return a pointer to the same allocation, usually through an unsizing coercion:
    /// `instance.view(|service: Arc<Service>| service as Arc<dyn Greeter>)`.
    ///
    /// Does nothing if the instance can't be viewed as `C`.
    #[must_use]
    pub fn view<C, V>(mut self, cast: impl FnOnce(Arc<C>) -> Arc<V>) -> Self
    where
        C: ?Sized + Send + Sync + 'static,
        V: ?Sized + Send + Sync + 'static,
    {
        if let Some(source) = self.get::<C>() {
            let view = cast(source);
            Arc::make_mut(&mut self.views).insert(TypeInfo::of::<V>(), Arc::new(view) as RcAny);
        }
        self
    }

    /// Exposes the [`MethodTable`] of `C`, so lifecycle hooks can be resolved by method name
    #[inline]
    #[must_use]
    pub fn with_methods<C: MethodTable + 'static>(self) -> Self {
        self.view(|value: Arc<C>| value as Arc<dyn MethodTable>)
    }

    #[must_use]
    pub fn get<T: ?Sized + 'static>(&self) -> Option<Arc<T>> {
        self.views
            .get(&TypeInfo::of::<T>())
            .and_then(|view| view.downcast_ref::<Arc<T>>())
            .cloned()
    }

    #[inline]
    #[must_use]
    pub fn has_view(&self, type_info: &TypeInfo) -> bool {
        self.views.contains_key(type_info)
    }

    #[inline]
    pub fn views(&self) -> impl Iterator<Item = &TypeInfo> + '_ {
        self.views.keys()
    }

    /// Type the instance was created from
    #[inline]
    #[must_use]
    pub const fn type_info(&self) -> TypeInfo {
        self.type_info
    }

    /// Returns `true` if both instances are views of the same object
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}
