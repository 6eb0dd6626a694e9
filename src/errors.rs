mod instantiator;
mod intercept;
mod lifecycle;
mod property;
mod registry;

pub use instantiator::{BuildErrorKind, InjectionSpecErrorKind, PostProcessErrorKind};
pub use intercept::InterceptErrorKind;
pub use lifecycle::{LifecycleErrorKind, Stage};
pub use property::PropertyErrorKind;
pub use registry::{DefinitionErrorKind, ResolveErrorKind};
