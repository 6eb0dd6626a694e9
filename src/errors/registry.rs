use alloc::{string::String, vec::Vec};

#[derive(thiserror::Error, Debug)]
pub enum DefinitionErrorKind {
    #[error("Duplicate definition name `{name}`")]
    DuplicateDefinition { name: String },
    #[error("Factory owner `{owner}` of definition `{name}` not found")]
    MissingFactoryOwner { name: String, owner: String },
}

#[derive(thiserror::Error, Debug)]
pub enum ResolveErrorKind {
    #[error("Definition not found: {key}")]
    NoDefinition { key: String },
    #[error(
        "\
        Multiple definitions of type `{type_name}` found ({}), \
        but {primaries} of them marked as primary. Exactly one primary is required\
        ",
        candidates.join(", "),
    )]
    AmbiguousDependency {
        type_name: &'static str,
        candidates: Vec<String>,
        primaries: usize,
    },
    #[error("Definition `{name}` has type `{actual}` that isn't assignable to `{expected}`")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("Definition `{name}` isn't instantiated")]
    NotInstantiated { name: String },
    #[error("Instance of `{name}` can't be viewed as `{expected}`")]
    IncorrectType { name: String, expected: &'static str },
}
