use alloc::string::String;

#[derive(thiserror::Error, Debug)]
pub enum InterceptErrorKind {
    #[error("Invocation handler returned a value of another type for `{method}`, expected `{expected}`")]
    ReturnTypeMismatch { method: String, expected: &'static str },
}
