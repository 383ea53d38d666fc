//! rarefold-config
//!
//! Hyperparameter trees for the structure prediction model.
//!
//! - [`base_config`]: the shared, read-only base template.
//! - [`ModelVariant`] / [`model_config`]: resolve one of the ten named
//!   variants into an independent [`Config`].
//! - [`Config::edit`]: the only way to derive a changed config.
//! - [`FeatureShape`]: shapes with residue / MSA / extra-MSA / template
//!   placeholders, bound per example through [`DimBindings`].
//!
//! ```
//! use rarefold_config::model_config;
//! let cfg = model_config("model_1_ptm").unwrap();
//! assert_eq!(cfg.int("data.common.max_extra_msa").unwrap(), 5120);
//! ```
mod base;
mod config;
mod error;
mod shape;
mod value;
mod variants;

pub use base::{base_config, TEMPLATE_FEATURES, UNSUPERVISED_FEATURES};
pub use config::{Config, ConfigEdit};
pub use error::{ConfigError, Result};
pub use shape::{
    Dim, DimBindings, FeatureShape, ShapeError, NUM_EXTRA_SEQ, NUM_MSA_SEQ, NUM_RES,
    NUM_TEMPLATES,
};
pub use value::{Value, ValueKind};
pub use variants::{model_config, ModelVariant};
