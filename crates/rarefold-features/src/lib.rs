//! # rarefold-features
//!
//! Turns raw sequence and alignment records into the fixed-shape numeric
//! features a resolved model config expects.
//!
//! - [`make_data_config`]: per-input data config and requested feature names
//! - [`from_record`] / [`from_array_mapping`]: the two preprocessing entry points
//! - [`InputPipeline`]: the default deterministic transform sequence
pub mod adapter;
pub mod array;
pub mod context;
pub mod error;
pub mod pipeline;
pub mod preprocess;
pub mod record;
pub mod residue_constants;
pub mod schema;
pub mod selector;

pub use adapter::{ArrayAdapter, ExampleAdapter, RecordAdapter, TensorDict};
pub use array::ArrayValue;
pub use context::{pipeline_device, ExecutionContext};
pub use error::{FeatureError, Result};
pub use pipeline::{InputPipeline, PipelineError, PipelineSettings, TensorPipeline};
pub use preprocess::{from_array_mapping, from_record, FeatureDict, Preprocessor};
pub use record::{ArrayMapping, Example, Feature};
pub use schema::{input_feature_schema, ElementKind, FeatureSpec, Layout};
pub use selector::make_data_config;
