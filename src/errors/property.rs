use alloc::string::String;

#[derive(thiserror::Error, Debug)]
pub enum PropertyErrorKind {
    #[error("Property `{key}` not found and no default value given")]
    NotFound { key: String },
    #[error("No converter registered for `{type_name}` (property `{key}`)")]
    UnsupportedType { key: String, type_name: &'static str },
    #[error("Property `{key}` can't be converted to `{type_name}`")]
    Conversion {
        key: String,
        type_name: &'static str,
        #[source]
        source: anyhow::Error,
    },
}
