use std::path::PathBuf;
use stepform_core::{ActionError, Token};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse site config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no live step for token `{0}`")]
    UnknownToken(Token),

    #[error("step `{0}` expired")]
    Expired(Token),

    #[error("delegation chain exceeded {0} hops")]
    TooManyDelegations(usize),

    #[error("step `{step}` failed: {source}")]
    Action {
        step: String,
        #[source]
        source: ActionError,
    },
}

impl DispatchError {
    /// The step is gone; the user followed an old link.
    pub fn is_gone(&self) -> bool {
        matches!(self, Self::UnknownToken(_) | Self::Expired(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store is full ({0} records)")]
    Full(usize),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    #[error("no recipient for message `{0}`")]
    NoRecipient(String),

    #[error("delivery failed: {0}")]
    Transport(String),
}
