//! The ten registered model variants.
//!
//! Each variant is the base template plus a sparse set of dotted-path
//! overrides (Jumper et al. 2021, Suppl. Table 5). The `_ptm` variants are
//! fine-tuned from their plain counterparts with an extra
//! predicted-aligned-error head.
use crate::base::base_config;
use crate::config::Config;
use crate::error::{ConfigError, Result};
use crate::value::Value;
use std::str::FromStr;
use strum::{AsRefStr, Display, EnumIter, EnumString};

const MAX_EXTRA_MSA: &str = "data.common.max_extra_msa";
const REDUCE_MSA_CLUSTERS: &str = "data.common.reduce_msa_clusters_by_max_templates";
const USE_TEMPLATES: &str = "data.common.use_templates";
const EMBED_TORSION_ANGLES: &str = "model.embeddings_and_evoformer.template.embed_torsion_angles";
const TEMPLATE_ENABLED: &str = "model.embeddings_and_evoformer.template.enabled";
const PAE_WEIGHT: &str = "model.heads.predicted_aligned_error.weight";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, AsRefStr)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum ModelVariant {
    #[strum(serialize = "model_1")]
    #[cfg_attr(feature = "clap", value(name = "model_1"))]
    Model1,
    #[strum(serialize = "model_2")]
    #[cfg_attr(feature = "clap", value(name = "model_2"))]
    Model2,
    #[strum(serialize = "model_3")]
    #[cfg_attr(feature = "clap", value(name = "model_3"))]
    Model3,
    #[strum(serialize = "model_4")]
    #[cfg_attr(feature = "clap", value(name = "model_4"))]
    Model4,
    #[strum(serialize = "model_5")]
    #[cfg_attr(feature = "clap", value(name = "model_5"))]
    Model5,
    #[strum(serialize = "model_1_ptm")]
    #[cfg_attr(feature = "clap", value(name = "model_1_ptm"))]
    Model1Ptm,
    #[strum(serialize = "model_2_ptm")]
    #[cfg_attr(feature = "clap", value(name = "model_2_ptm"))]
    Model2Ptm,
    #[strum(serialize = "model_3_ptm")]
    #[cfg_attr(feature = "clap", value(name = "model_3_ptm"))]
    Model3Ptm,
    #[strum(serialize = "model_4_ptm")]
    #[cfg_attr(feature = "clap", value(name = "model_4_ptm"))]
    Model4Ptm,
    #[strum(serialize = "model_5_ptm")]
    #[cfg_attr(feature = "clap", value(name = "model_5_ptm"))]
    Model5Ptm,
}

impl ModelVariant {
    /// The variant's override set, in application order.
    #[rustfmt::skip]
    pub fn overrides(&self) -> Vec<(&'static str, Value)> {
        let templated = || vec![
            (REDUCE_MSA_CLUSTERS, Value::Bool(true)),
            (USE_TEMPLATES, Value::Bool(false)),
            (EMBED_TORSION_ANGLES, Value::Bool(true)),
            (TEMPLATE_ENABLED, Value::Bool(true)),
        ];
        let extra_msa = (MAX_EXTRA_MSA, Value::Int(5120));
        let pae = (PAE_WEIGHT, Value::Float(0.1));

        match self {
            // Model 1.1.1
            Self::Model1 => [vec![extra_msa], templated()].concat(),
            // Model 1.1.2
            Self::Model2 => templated(),
            // Model 1.2.1
            Self::Model3 => vec![extra_msa],
            // Model 1.2.2
            Self::Model4 => vec![extra_msa],
            // Model 1.2.3
            Self::Model5 => vec![],
            Self::Model1Ptm => [vec![extra_msa], templated(), vec![pae]].concat(),
            Self::Model2Ptm => [templated(), vec![pae]].concat(),
            Self::Model3Ptm => vec![extra_msa, pae],
            Self::Model4Ptm => vec![extra_msa, pae],
            Self::Model5Ptm => vec![pae],
        }
    }

    /// Resolve this variant into a fresh config, independent of the base
    /// and of every other resolved config.
    pub fn config(&self) -> Result<Config> {
        let overrides = self.overrides();
        tracing::debug!(variant = %self, overrides = overrides.len(), "resolving model config");
        base_config().apply_overrides(overrides)
    }
}

/// Resolve a variant by name.
pub fn model_config(name: &str) -> Result<Config> {
    let variant =
        ModelVariant::from_str(name).map_err(|_| ConfigError::UnknownVariant(name.to_string()))?;
    variant.config()
}
