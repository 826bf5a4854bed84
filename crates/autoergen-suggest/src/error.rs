#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    /// The description was empty or whitespace; the provider was not called.
    #[error("description is empty")]
    EmptyDescription,

    /// The provider answered with no text.
    #[error("model returned an empty response")]
    Empty,

    /// Transport or provider fault, with the underlying cause.
    #[error("generation failed: {0}")]
    Failed(String),

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("temperature {0} is outside [0, 1]")]
    InvalidTemperature(f32),
}

/// Model output did not parse as an ER specification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("could not parse model response: {message}")]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
