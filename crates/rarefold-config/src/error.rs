use crate::value::ValueKind;
use thiserror::Error;

/// Errors raised while resolving or reading a model configuration.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid model name {0}")]
    UnknownVariant(String),

    #[error("override path `{0}` does not exist in the base config")]
    InvalidOverridePath(String),

    #[error("override `{path}` expects a {expected} value, found {found}")]
    OverrideTypeMismatch {
        path: String,
        expected: ValueKind,
        found: ValueKind,
    },

    #[error("config path `{path}`: {reason}")]
    InvalidConfig { path: String, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(path: &str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
