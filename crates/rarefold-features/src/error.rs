use crate::pipeline::PipelineError;
use rarefold_config::ConfigError;
use thiserror::Error;

/// Errors raised while turning a raw record into model features.
#[derive(Debug, Error)]
pub enum FeatureError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("required field `{0}` is missing from the input")]
    MissingField(String),

    #[error("feature `{name}`: {reason}")]
    InvalidFeature { name: String, reason: String },

    #[error("pipeline execution failed: {0}")]
    PipelineExecution(#[from] PipelineError),

    #[error("failed to materialize features: {0}")]
    Materialize(#[from] candle_core::Error),

    #[error("malformed serialized record: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FeatureError {
    pub(crate) fn invalid(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidFeature {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FeatureError>;
