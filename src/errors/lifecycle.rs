use alloc::string::String;
use core::fmt::{self, Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    Destroy,
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Init => f.write_str("init"),
            Stage::Destroy => f.write_str("destroy"),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum LifecycleErrorKind {
    #[error("Lifecycle method `{method}` not found on `{name}`")]
    MissingLifecycleMethod { name: String, method: String },
    #[error("The {stage} hook of `{name}` can't be applied: instance doesn't expose `{expected}`")]
    IncompatibleHook {
        name: String,
        stage: Stage,
        expected: &'static str,
    },
    #[error("The {stage} hook of `{name}` failed")]
    HookFailure {
        name: String,
        stage: Stage,
        #[source]
        source: anyhow::Error,
    },
}
