//! The config-driven transform sequence applied to parsed input features.
//!
//! Transforms run on host arrays in a fixed order. Every random choice is
//! drawn from the [`ExecutionContext`] generator, so a given input, config
//! and seed always produce the same output.
mod transforms;

use crate::adapter::TensorDict;
use crate::array::ArrayValue;
use crate::context::ExecutionContext;
use crate::schema::ElementKind;
use rarefold_config::{Config, ConfigError, FeatureShape, ShapeError};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("feature `{0}` is required but was not produced")]
    MissingFeature(String),

    #[error("feature `{name}` holds {found} elements, expected {expected}")]
    WrongKind {
        name: String,
        expected: ElementKind,
        found: ElementKind,
    },

    #[error("feature `{name}` has shape {shape:?}: {reason}")]
    BadShape {
        name: String,
        shape: Vec<usize>,
        reason: String,
    },

    #[error("feature `{name}`: {reason}")]
    InvalidValue { name: String, reason: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Shape(#[from] ShapeError),
}

impl PipelineError {
    pub(crate) fn bad_shape(name: &str, shape: &[usize], reason: impl Into<String>) -> Self {
        Self::BadShape {
            name: name.to_string(),
            shape: shape.to_vec(),
            reason: reason.into(),
        }
    }
}

/// A deterministic transform from parsed input arrays to model features.
///
/// `config` is the data subtree (`common`, `eval`) produced by
/// [`make_data_config`](crate::make_data_config).
pub trait TensorPipeline: Send + Sync {
    fn process(
        &self,
        tensors: TensorDict,
        config: &Config,
        ctx: &mut ExecutionContext,
    ) -> Result<TensorDict, PipelineError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaskedMsa {
    pub profile_prob: f64,
    pub same_prob: f64,
    pub uniform_prob: f64,
}

/// The data-config values the input pipeline reads.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub use_templates: bool,
    pub msa_cluster_features: bool,
    pub max_extra_msa: usize,
    pub masked_msa: MaskedMsa,
    pub masked_msa_replace_fraction: f64,
    /// Cluster count after the optional template reduction.
    pub max_msa_clusters: usize,
    pub max_templates: usize,
    pub num_ensemble: usize,
    pub crop_size: usize,
    pub fixed_size: bool,
    pub subsample_templates: bool,
    pub feat: BTreeMap<String, FeatureShape>,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let max_templates = config.usize("eval.max_templates")?;
        let mut max_msa_clusters = config.usize("eval.max_msa_clusters")?;
        if config.bool("common.reduce_msa_clusters_by_max_templates")? {
            max_msa_clusters = max_msa_clusters.saturating_sub(max_templates);
        }
        let feat = config
            .tree("eval.feat")?
            .keys()
            .map(|name| {
                let shape = config.shape(&format!("eval.feat.{name}"))?;
                Ok((name.clone(), shape.clone()))
            })
            .collect::<Result<_, ConfigError>>()?;
        Ok(Self {
            use_templates: config.bool("common.use_templates")?,
            msa_cluster_features: config.bool("common.msa_cluster_features")?,
            max_extra_msa: config.usize("common.max_extra_msa")?,
            masked_msa: MaskedMsa {
                profile_prob: config.float("common.masked_msa.profile_prob")?,
                same_prob: config.float("common.masked_msa.same_prob")?,
                uniform_prob: config.float("common.masked_msa.uniform_prob")?,
            },
            masked_msa_replace_fraction: config.float("eval.masked_msa_replace_fraction")?,
            max_msa_clusters,
            max_templates,
            num_ensemble: config.usize("eval.num_ensemble")?,
            crop_size: config.usize("eval.crop_size")?,
            fixed_size: config.bool("eval.fixed_size")?,
            subsample_templates: config.bool("eval.subsample_templates")?,
            feat,
        })
    }
}

/// The standard input pipeline: shared preparation once per call, then
/// `eval.num_ensemble` independently sampled passes stacked along a new
/// leading batch axis.
#[derive(Debug, Default, Clone, Copy)]
pub struct InputPipeline;

impl TensorPipeline for InputPipeline {
    fn process(
        &self,
        tensors: TensorDict,
        config: &Config,
        ctx: &mut ExecutionContext,
    ) -> Result<TensorDict, PipelineError> {
        let settings = PipelineSettings::from_config(config)?;
        let prepared = self.nonensembled(tensors, &settings, ctx)?;
        let mut passes = Vec::with_capacity(settings.num_ensemble);
        for pass in 0..settings.num_ensemble {
            let mut rng = ctx.child_rng();
            debug!(pass, "running ensemble pass");
            passes.push(self.ensembled(prepared.clone(), &settings, &mut rng)?);
        }
        batch(passes)
    }
}

impl InputPipeline {
    fn nonensembled(
        &self,
        mut t: TensorDict,
        settings: &PipelineSettings,
        ctx: &mut ExecutionContext,
    ) -> Result<TensorDict, PipelineError> {
        transforms::add_distillation_flag(&mut t);
        transforms::correct_msa_restypes(&mut t)?;
        transforms::squeeze_features(&mut t)?;
        transforms::make_seq_mask(&mut t)?;
        transforms::make_msa_mask(&mut t)?;
        transforms::make_hhblits_profile(&mut t)?;
        if settings.use_templates {
            transforms::fix_templates_aatype(&mut t)?;
            transforms::make_template_mask(&mut t)?;
            transforms::make_pseudo_beta(&mut t, "template_")?;
        }
        transforms::make_atom14_masks(&mut t)?;
        transforms::make_random_crop_to_size_seed(&mut t, ctx.rng());
        debug!(features = t.len(), "prepared shared features");
        Ok(t)
    }

    fn ensembled<R: rand::Rng>(
        &self,
        mut t: TensorDict,
        settings: &PipelineSettings,
        rng: &mut R,
    ) -> Result<TensorDict, PipelineError> {
        transforms::sample_msa(&mut t, settings.max_msa_clusters, rng)?;
        transforms::make_masked_msa(
            &mut t,
            &settings.masked_msa,
            settings.masked_msa_replace_fraction,
            rng,
        )?;
        if settings.msa_cluster_features {
            transforms::nearest_neighbor_clusters(&mut t, 0.0)?;
            transforms::summarize_clusters(&mut t)?;
        }
        if settings.max_extra_msa > 0 {
            transforms::crop_extra_msa(&mut t, settings.max_extra_msa, rng)?;
        } else {
            transforms::delete_extra_msa(&mut t);
        }
        transforms::make_msa_feat(&mut t)?;
        transforms::select_feat(&mut t, &settings.feat);
        transforms::random_crop_to_size(&mut t, settings)?;
        if settings.fixed_size {
            transforms::make_fixed_size(&mut t, settings)?;
        }
        Ok(t)
    }
}

/// Stack the ensemble passes along a new leading axis.
fn batch(passes: Vec<TensorDict>) -> Result<TensorDict, PipelineError> {
    let Some(first) = passes.first() else {
        return Ok(TensorDict::new());
    };
    first
        .keys()
        .map(|name| {
            let values: Vec<ArrayValue> = passes
                .iter()
                .map(|pass| {
                    pass.get(name)
                        .cloned()
                        .ok_or_else(|| PipelineError::MissingFeature(name.clone()))
                })
                .collect::<Result<_, _>>()?;
            let stacked = ArrayValue::stack(&values).ok_or_else(|| {
                PipelineError::bad_shape(name, values[0].shape(), "differs between ensemble passes")
            })?;
            Ok((name.clone(), stacked))
        })
        .collect()
}
