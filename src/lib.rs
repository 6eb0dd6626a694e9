extern crate alloc;

pub(crate) mod any;
pub(crate) mod aop;
pub(crate) mod container;
pub(crate) mod descriptor;
pub(crate) mod discovery;
pub(crate) mod errors;
pub(crate) mod inject;
pub(crate) mod injector;
pub(crate) mod instantiator;
pub(crate) mod lifecycle;
pub(crate) mod post_processor;
pub(crate) mod property;
pub(crate) mod registry;

pub use any::{Instance, TypeInfo};
pub use aop::{intercept, Around, AroundPostProcessor, Invocation, InvocationHandler, MethodSignature, ProxyFactory};
pub use container::{Container, ContainerBuilder, ShutdownReport};
pub use descriptor::{CreationStrategy, Descriptor, DescriptorBuilder, DEFAULT_ORDER};
pub use discovery::Discovery;
pub use errors::{
    BuildErrorKind, DefinitionErrorKind, InjectionSpecErrorKind, InterceptErrorKind, LifecycleErrorKind, PostProcessErrorKind,
    PropertyErrorKind, ResolveErrorKind, Stage,
};
pub use inject::{Args, AutowiredMarker, Injection, Param, PointKind, PropertyPoint, ValueMarker, Wired};
pub use instantiator::Instantiator;
pub use lifecycle::{DirectHook, Hook, LifecycleState, MethodTable};
pub use post_processor::PostProcessor;
pub use property::PropertyResolver;
pub use registry::Registry;
