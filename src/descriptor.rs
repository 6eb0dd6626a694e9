use alloc::{string::String, sync::Arc, vec::Vec};
use anyhow::anyhow;
use core::{
    any::type_name,
    fmt::{self, Debug, Formatter},
    marker::PhantomData,
};

use crate::{
    aop::{Around, ProxyFactory},
    any::TypeInfo,
    inject::{Args, Param, PropertyPoint},
    lifecycle::{Hook, LifecycleState},
    Instance,
};

/// Order of descriptors without a declared one, they are sorted last
pub const DEFAULT_ORDER: i32 = i32::MAX;

pub(crate) type ConstructFn = Arc<dyn Fn(&Args) -> anyhow::Result<Instance> + Send + Sync>;
pub(crate) type FactoryFn = Arc<dyn Fn(&Instance, &Args) -> anyhow::Result<Instance> + Send + Sync>;

/// How an instance of a descriptor is created
#[derive(Clone)]
pub enum CreationStrategy {
    Constructor {
        params: Vec<Param>,
        call: ConstructFn,
    },
    /// Method called on the instance of the `owner` descriptor
    Factory {
        owner: String,
        params: Vec<Param>,
        call: FactoryFn,
    },
}

impl CreationStrategy {
    #[inline]
    #[must_use]
    pub fn params(&self) -> &[Param] {
        match self {
            Self::Constructor { params, .. } | Self::Factory { params, .. } => params,
        }
    }

    #[inline]
    #[must_use]
    pub fn owner(&self) -> Option<&str> {
        match self {
            Self::Constructor { .. } => None,
            Self::Factory { owner, .. } => Some(owner),
        }
    }
}

/// Metadata for one creatable component, together with its instance slot.
///
/// Descriptors are immutable after registration, except for the instance and the lifecycle state
/// that are driven by the container.
#[derive(Clone)]
pub struct Descriptor {
    name: String,
    declared_type: TypeInfo,
    aliases: Vec<TypeInfo>,
    strategy: CreationStrategy,
    order: i32,
    is_primary: bool,
    is_factory_owner: bool,
    init_hook: Option<Hook>,
    destroy_hook: Option<Hook>,
    properties: Vec<PropertyPoint>,
    around: Option<Around>,
    pub(crate) instance: Option<Instance>,
    pub(crate) state: LifecycleState,
}

impl Descriptor {
    /// Starts a descriptor declared as `T`.
    /// Without [`DescriptorBuilder::name`] the descriptor is named after `T`: `UserService` becomes `userService`.
    #[inline]
    #[must_use]
    pub fn builder<T: ?Sized + 'static>() -> DescriptorBuilder<T> {
        DescriptorBuilder::new()
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub const fn declared_type(&self) -> TypeInfo {
        self.declared_type
    }

    #[inline]
    #[must_use]
    pub fn aliases(&self) -> &[TypeInfo] {
        &self.aliases
    }

    /// Declared type followed by aliases
    #[inline]
    pub fn types(&self) -> impl Iterator<Item = &TypeInfo> + '_ {
        core::iter::once(&self.declared_type).chain(self.aliases.iter())
    }

    #[inline]
    #[must_use]
    pub fn is_assignable_to(&self, type_info: &TypeInfo) -> bool {
        self.types().any(|declared| declared == type_info)
    }

    #[inline]
    #[must_use]
    pub const fn strategy(&self) -> &CreationStrategy {
        &self.strategy
    }

    #[inline]
    #[must_use]
    pub const fn order(&self) -> i32 {
        self.order
    }

    #[inline]
    #[must_use]
    pub const fn is_primary(&self) -> bool {
        self.is_primary
    }

    #[inline]
    #[must_use]
    pub const fn is_factory_owner(&self) -> bool {
        self.is_factory_owner
    }

    #[inline]
    #[must_use]
    pub const fn init_hook(&self) -> Option<&Hook> {
        self.init_hook.as_ref()
    }

    #[inline]
    #[must_use]
    pub const fn destroy_hook(&self) -> Option<&Hook> {
        self.destroy_hook.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn properties(&self) -> &[PropertyPoint] {
        &self.properties
    }

    #[inline]
    #[must_use]
    pub const fn around(&self) -> Option<&Around> {
        self.around.as_ref()
    }

    /// Current instance. After the post-processing it may be a substitute of the created one.
    #[inline]
    #[must_use]
    pub const fn instance(&self) -> Option<&Instance> {
        self.instance.as_ref()
    }

    #[inline]
    #[must_use]
    pub const fn state(&self) -> LifecycleState {
        self.state
    }
}

impl Debug for Descriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("name", &self.name)
            .field("declared_type", &self.declared_type.name)
            .field("aliases", &self.aliases.iter().map(|alias| alias.name).collect::<Vec<_>>())
            .field("order", &self.order)
            .field("is_primary", &self.is_primary)
            .field("is_factory_owner", &self.is_factory_owner)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

pub struct DescriptorBuilder<T: ?Sized> {
    name: Option<String>,
    aliases: Vec<TypeInfo>,
    params: Vec<Param>,
    order: i32,
    is_primary: bool,
    is_factory_owner: bool,
    init_hook: Option<Hook>,
    destroy_hook: Option<Hook>,
    properties: Vec<PropertyPoint>,
    around: Option<Around>,
    _declared: PhantomData<fn() -> Arc<T>>,
}

impl<T: ?Sized + 'static> DescriptorBuilder<T> {
    #[inline]
    #[must_use]
    fn new() -> Self {
        Self {
            name: None,
            aliases: Vec::new(),
            params: Vec::new(),
            order: DEFAULT_ORDER,
            is_primary: false,
            is_factory_owner: false,
            init_hook: None,
            destroy_hook: None,
            properties: Vec::new(),
            around: None,
            _declared: PhantomData,
        }
    }

    #[inline]
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Makes the descriptor assignable to `A` as well.
    /// The created instance must expose `A` through [`Instance::view`].
    #[inline]
    #[must_use]
    pub fn alias<A: ?Sized + 'static>(mut self) -> Self {
        self.aliases.push(TypeInfo::of::<A>());
        self
    }

    /// Adds a parameter of the constructor or the factory method
    #[inline]
    #[must_use]
    pub fn param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    #[inline]
    #[must_use]
    pub fn order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    #[inline]
    #[must_use]
    pub fn primary(mut self) -> Self {
        self.is_primary = true;
        self
    }

    /// Marks the descriptor as a host of factory methods. It's created before any other descriptor
    /// and may only receive values from the configuration.
    #[inline]
    #[must_use]
    pub fn factory_owner(mut self) -> Self {
        self.is_factory_owner = true;
        self
    }

    #[inline]
    #[must_use]
    pub fn init(mut self, hook: Hook) -> Self {
        self.init_hook = Some(hook);
        self
    }

    #[inline]
    #[must_use]
    pub fn destroy(mut self, hook: Hook) -> Self {
        self.destroy_hook = Some(hook);
        self
    }

    #[inline]
    #[must_use]
    pub fn property(mut self, point: PropertyPoint) -> Self {
        self.properties.push(point);
        self
    }

    /// Routes calls of the instance through the invocation handler registered as `handler`.
    /// Requires [`crate::aop::AroundPostProcessor`] to be registered.
    #[inline]
    #[must_use]
    pub fn around<F>(mut self, handler: impl Into<String>, factory: F) -> Self
    where
        T: Send + Sync,
        F: ProxyFactory<T> + 'static,
    {
        self.around = Some(Around::new::<T, F>(handler, factory));
        self
    }

    #[must_use]
    pub fn constructor<F>(mut self, call: F) -> Descriptor
    where
        F: Fn(&Args) -> anyhow::Result<Instance> + Send + Sync + 'static,
    {
        let params = core::mem::take(&mut self.params);
        self.finish(CreationStrategy::Constructor {
            params,
            call: Arc::new(call),
        })
    }

    #[must_use]
    pub fn factory<F>(mut self, owner: impl Into<String>, call: F) -> Descriptor
    where
        F: Fn(&Instance, &Args) -> anyhow::Result<Instance> + Send + Sync + 'static,
    {
        let params = core::mem::take(&mut self.params);
        self.finish(CreationStrategy::Factory {
            owner: owner.into(),
            params,
            call: Arc::new(call),
        })
    }

    /// Factory method of an owner viewed as `O`
    #[must_use]
    pub fn factory_method<O, F>(self, owner: impl Into<String>, call: F) -> Descriptor
    where
        O: ?Sized + 'static,
        F: Fn(&O, &Args) -> anyhow::Result<Instance> + Send + Sync + 'static,
    {
        self.factory(owner, move |owner: &Instance, args: &Args| {
            let owner = owner
                .get::<O>()
                .ok_or_else(|| anyhow!("factory owner isn't a `{}`", type_name::<O>()))?;
            call(&owner, args)
        })
    }

    /// Registers an already created instance
    #[must_use]
    pub fn singleton(self, instance: Instance) -> Descriptor {
        self.constructor(move |_| Ok(instance.clone()))
    }

    fn finish(self, strategy: CreationStrategy) -> Descriptor {
        let declared_type = TypeInfo::of::<T>();
        let name = self.name.unwrap_or_else(|| default_name(&declared_type));

        Descriptor {
            name,
            declared_type,
            aliases: self.aliases,
            strategy,
            order: self.order,
            is_primary: self.is_primary,
            is_factory_owner: self.is_factory_owner,
            init_hook: self.init_hook,
            destroy_hook: self.destroy_hook,
            properties: self.properties,
            around: self.around,
            instance: None,
            state: LifecycleState::Uninstantiated,
        }
    }
}

impl<T: Send + Sync + 'static> DescriptorBuilder<T> {
    /// Constructor returning the declared type itself
    #[must_use]
    pub fn provide<F>(self, call: F) -> Descriptor
    where
        F: Fn(&Args) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.constructor(move |args: &Args| call(args).map(Instance::new))
    }
}

fn default_name(type_info: &TypeInfo) -> String {
    let short_name = type_info.short_name();
    let mut chars = short_name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
