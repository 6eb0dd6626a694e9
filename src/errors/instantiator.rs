use alloc::{boxed::Box, string::String};

use super::{DefinitionErrorKind, LifecycleErrorKind, PropertyErrorKind, ResolveErrorKind};

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectionSpecErrorKind {
    #[error("neither value nor autowired marker present")]
    NoMarker,
    #[error("both value and autowired markers present")]
    ConflictingMarkers,
    #[error("factory owners can only receive values, not autowired dependencies")]
    AutowiredFactoryOwner,
}

#[derive(thiserror::Error, Debug)]
pub enum PostProcessErrorKind {
    #[error("returned nothing")]
    ReturnedNothing,
    #[error("returned a substitute that doesn't expose `{expected}`")]
    IncompatibleSubstitute { expected: &'static str },
    #[error("invocation handler `{handler}` not found")]
    NoHandler { handler: String },
    #[error("definition `{handler}` isn't an invocation handler")]
    NotAHandler { handler: String },
    #[error("proxy factory can't wrap an instance of `{actual}`")]
    Unwrappable { actual: &'static str },
    #[error(transparent)]
    Build(Box<BuildErrorKind>),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum BuildErrorKind {
    #[error(transparent)]
    Definition(#[from] DefinitionErrorKind),
    #[error(transparent)]
    Resolve(#[from] ResolveErrorKind),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleErrorKind),
    #[error("Value for `{name}` at {point} can't be resolved")]
    Property {
        name: String,
        point: String,
        #[source]
        source: PropertyErrorKind,
    },
    #[error("Circular dependency detected while creating `{name}`")]
    CircularDependency { name: String },
    #[error("Invalid injection spec of `{name}` at {point}: {kind}")]
    InvalidInjectionSpec {
        name: String,
        point: String,
        kind: InjectionSpecErrorKind,
    },
    #[error("Required dependency `{dependency}` of `{name}` at {point} not found")]
    MissingDependency {
        name: String,
        point: String,
        dependency: String,
    },
    #[error("Creation of `{name}` failed")]
    CreationFailure {
        name: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("Post-processor `{processor}` failed on `{name}`: {kind}")]
    PostProcessingFailure {
        name: String,
        processor: String,
        kind: PostProcessErrorKind,
    },
}
