use thiserror::Error;

/// Raised while validating or loading a schema. Fatal at wrapper construction,
/// never during a request.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("destination '{0}' is declared more than once")]
    DuplicateDestination(String),
    /// Only one file can be streamed back as the response body.
    #[error("at most one output file parameter is allowed, found {}: {}", .0.len(), .0.join(", "))]
    MultipleOutputFiles(Vec<String>),
    #[error("invalid schema document: {0}")]
    Document(String),
    #[error("invalid hook '{key}': {reason}")]
    Hook { key: String, reason: String },
}

/// A raw form string, or a default value, could not be converted.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("cannot convert {raw:?} to {target}: {reason}")]
pub struct CoercionError {
    pub raw: String,
    pub target: String,
    pub reason: String,
}

impl CoercionError {
    pub fn new(raw: impl Into<String>, target: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            raw: raw.into(),
            target: target.into(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    /// A browser only ever submits the clicked button, so several submit
    /// actions in one body means the request was not produced by our form.
    #[error("conflicting submit actions posted: {}", .0.join(", "))]
    MultipleSubmitActions(Vec<String>),
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("unknown template '{0}'")]
    Unknown(String),
}

/// Error type returned by wrapped programs.
pub type ProgramError = Box<dyn std::error::Error + Send + Sync>;
