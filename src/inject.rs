use alloc::{string::String, sync::Arc, vec::Vec};
use anyhow::anyhow;
use core::{
    any::type_name,
    fmt::{self, Display, Formatter},
};
use parking_lot::RwLock;

use crate::{any::TypeInfo, errors::InjectionSpecErrorKind, Instance};

/// Marks a parameter or property as filled from the configuration, e.g. `${app.port:8080}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueMarker {
    pub key: String,
}

/// Marks a parameter or property as filled with another component.
/// ## Fields
/// - `name`:
///   If set, the dependency is looked up by name and must be assignable to the target type.
///   Otherwise it's looked up by type.
/// - `required`:
///   If `false`, an absent dependency is skipped instead of failing the build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutowiredMarker {
    pub name: Option<String>,
    pub required: bool,
}

impl Default for AutowiredMarker {
    fn default() -> Self {
        Self { name: None, required: true }
    }
}

/// How a single parameter or property gets its value
#[derive(Debug, Clone, Copy)]
pub enum Injection<'a> {
    Value(&'a ValueMarker),
    Bean(&'a AutowiredMarker),
}

/// One injection target: a creation parameter, a field or a setter.
///
/// Markers are what the discovery found on the target, so a `Param` may carry none or both of them.
/// Such params are rejected by [`Param::classify`] when the container reaches them.
#[derive(Debug, Clone)]
pub struct Param {
    target: TypeInfo,
    value: Option<ValueMarker>,
    autowired: Option<AutowiredMarker>,
}

impl Param {
    /// Param without any marker
    #[inline]
    #[must_use]
    pub const fn new(target: TypeInfo) -> Self {
        Self {
            target,
            value: None,
            autowired: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::new(TypeInfo::of::<T>())
    }

    /// Value from the configuration, converted to `T`
    #[inline]
    #[must_use]
    pub fn value<T: 'static>(key: impl Into<String>) -> Self {
        Self::of::<T>().with_value_marker(key)
    }

    /// Required component of type `T`
    #[inline]
    #[must_use]
    pub fn bean<T: ?Sized + 'static>() -> Self {
        Self::of::<T>().with_autowired_marker(AutowiredMarker::default())
    }

    /// Required component with the given name, which must be assignable to `T`
    #[inline]
    #[must_use]
    pub fn named<T: ?Sized + 'static>(name: impl Into<String>) -> Self {
        Self::of::<T>().with_autowired_marker(AutowiredMarker {
            name: Some(name.into()),
            required: true,
        })
    }

    /// Makes the autowired marker optional. Does nothing for value params.
    #[inline]
    #[must_use]
    pub fn optional(mut self) -> Self {
        if let Some(marker) = self.autowired.as_mut() {
            marker.required = false;
        }
        self
    }

    #[inline]
    #[must_use]
    pub fn with_value_marker(mut self, key: impl Into<String>) -> Self {
        self.value = Some(ValueMarker { key: key.into() });
        self
    }

    #[inline]
    #[must_use]
    pub fn with_autowired_marker(mut self, marker: AutowiredMarker) -> Self {
        self.autowired = Some(marker);
        self
    }

    #[inline]
    #[must_use]
    pub const fn target(&self) -> TypeInfo {
        self.target
    }

    /// # Errors
    /// Returns [`InjectionSpecErrorKind::NoMarker`] or [`InjectionSpecErrorKind::ConflictingMarkers`]
    /// unless exactly one marker is present
    pub fn classify(&self) -> Result<Injection<'_>, InjectionSpecErrorKind> {
        match (&self.value, &self.autowired) {
            (Some(value), None) => Ok(Injection::Value(value)),
            (None, Some(autowired)) => Ok(Injection::Bean(autowired)),
            (None, None) => Err(InjectionSpecErrorKind::NoMarker),
            (Some(_), Some(_)) => Err(InjectionSpecErrorKind::ConflictingMarkers),
        }
    }
}

/// Resolved arguments of a constructor or a factory method, in parameter order.
/// An argument is absent only for optional dependencies that weren't found.
pub struct Args {
    values: Vec<Option<Instance>>,
}

impl Args {
    #[inline]
    #[must_use]
    pub(crate) const fn new(values: Vec<Option<Instance>>) -> Self {
        Self { values }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn instance(&self, index: usize) -> Option<&Instance> {
        self.values.get(index).and_then(Option::as_ref)
    }

    #[inline]
    #[must_use]
    pub fn optional_bean<T: ?Sized + 'static>(&self, index: usize) -> Option<Arc<T>> {
        self.instance(index).and_then(Instance::get)
    }

    /// # Errors
    /// Returns an error if the argument is absent or can't be viewed as `T`
    pub fn bean<T: ?Sized + 'static>(&self, index: usize) -> anyhow::Result<Arc<T>> {
        self.optional_bean(index)
            .ok_or_else(|| anyhow!("argument #{index} isn't a `{}`", type_name::<T>()))
    }

    /// # Errors
    /// Returns an error if the argument is absent or isn't a `T`
    pub fn value<T: Clone + 'static>(&self, index: usize) -> anyhow::Result<T> {
        self.bean::<T>(index).map(|value| (*value).clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointKind {
    Field,
    Setter,
}

pub(crate) type ApplyFn = Arc<dyn Fn(&Instance, Instance) -> anyhow::Result<()> + Send + Sync>;

/// Field or setter filled after every component is created.
///
/// `level` is the depth of the type that declares the point: `0` for the component type itself,
/// `1` for a type it embeds, and so on. Points are injected from the most derived level up.
#[derive(Clone)]
pub struct PropertyPoint {
    name: String,
    kind: PointKind,
    level: u8,
    param: Param,
    apply: ApplyFn,
}

impl PropertyPoint {
    #[must_use]
    pub fn new<F>(kind: PointKind, name: impl Into<String>, param: Param, apply: F) -> Self
    where
        F: Fn(&Instance, Instance) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            kind,
            level: 0,
            param,
            apply: Arc::new(apply),
        }
    }

    #[inline]
    #[must_use]
    pub fn field<T, D, F>(name: impl Into<String>, param: Param, apply: F) -> Self
    where
        T: ?Sized + 'static,
        D: ?Sized + 'static,
        F: Fn(&T, Arc<D>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::typed(PointKind::Field, name, param, apply)
    }

    #[inline]
    #[must_use]
    pub fn setter<T, D, F>(name: impl Into<String>, param: Param, apply: F) -> Self
    where
        T: ?Sized + 'static,
        D: ?Sized + 'static,
        F: Fn(&T, Arc<D>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::typed(PointKind::Setter, name, param, apply)
    }

    #[inline]
    #[must_use]
    pub fn at_level(mut self, level: u8) -> Self {
        self.level = level;
        self
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub const fn kind(&self) -> PointKind {
        self.kind
    }

    #[inline]
    #[must_use]
    pub const fn level(&self) -> u8 {
        self.level
    }

    #[inline]
    #[must_use]
    pub const fn param(&self) -> &Param {
        &self.param
    }

    pub(crate) fn apply(&self, target: &Instance, value: Instance) -> anyhow::Result<()> {
        (self.apply)(target, value)
    }

    fn typed<T, D, F>(kind: PointKind, name: impl Into<String>, param: Param, apply: F) -> Self
    where
        T: ?Sized + 'static,
        D: ?Sized + 'static,
        F: Fn(&T, Arc<D>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::new(kind, name, param, move |target: &Instance, value: Instance| {
            let target = target
                .get::<T>()
                .ok_or_else(|| anyhow!("target isn't a `{}`", type_name::<T>()))?;
            let value = value
                .get::<D>()
                .ok_or_else(|| anyhow!("injected value isn't a `{}`", type_name::<D>()))?;
            apply(&target, value)
        })
    }
}

impl Display for PropertyPoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.kind {
            PointKind::Field => write!(f, "field `{}`", self.name),
            PointKind::Setter => write!(f, "setter `{}`", self.name),
        }
    }
}

/// Slot for a property injected after construction.
///
/// Components are shared through [`Arc`] as soon as they are created, so fields filled later
/// need interior mutability. Embed a `Wired<T>` and fill it from a [`PropertyPoint`].
pub struct Wired<T: ?Sized>(RwLock<Option<Arc<T>>>);

impl<T: ?Sized> Wired<T> {
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self(RwLock::new(None))
    }

    /// Stores the value, returning the previous one
    #[inline]
    pub fn set(&self, value: Arc<T>) -> Option<Arc<T>> {
        self.0.write().replace(value)
    }

    #[inline]
    #[must_use]
    pub fn get(&self) -> Option<Arc<T>> {
        self.0.read().clone()
    }

    #[inline]
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.0.read().is_some()
    }
}

impl<T: ?Sized> Default for Wired<T> {
    fn default() -> Self {
        Self::new()
    }
}
