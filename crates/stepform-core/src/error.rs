use thiserror::Error;

/// Programmer errors raised while building forms and markup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("field role `{0}` declared twice in one form")]
    DuplicateField(String),

    #[error("no field with role `{0}` in this form")]
    UnknownField(String),

    #[error("field `{role}` is not a {expected}")]
    WrongKind { role: String, expected: &'static str },

    #[error("`{choice}` is not a choice of radio field `{role}`")]
    UnknownChoice { role: String, choice: String },
}

/// Failures of a single step invocation.
///
/// Only [`ActionError::Collaborator`] is recoverable: the step re-renders
/// with the message instead of failing the request.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("step `{0}` already reached a terminal transition")]
    StepFinished(String),

    #[error("step `{0}` is read-only and accepts no submissions")]
    ReadOnly(String),

    #[error("workflow payload was already cleared")]
    PayloadCleared,

    #[error("step `{step}` does not support transition `{transition}`")]
    UnsupportedTransition { step: String, transition: String },

    #[error("missing request parameter `{0}`")]
    MissingParameter(String),

    #[error("{0}")]
    Collaborator(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl ActionError {
    pub fn collaborator(message: impl Into<String>) -> Self {
        Self::Collaborator(message.into())
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Collaborator(_))
    }
}

pub type Result<T, E = ActionError> = std::result::Result<T, E>;
