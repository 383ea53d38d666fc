//! The shared base template every model variant is resolved from.
use crate::config::Config;
use crate::shape::{NUM_EXTRA_SEQ, NUM_MSA_SEQ, NUM_RES, NUM_TEMPLATES};
use crate::value::Value;
use std::sync::OnceLock;

macro_rules! tree {
    ($($key:literal => $value:expr),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut node = ::std::collections::BTreeMap::new();
        $( node.insert($key.to_string(), $crate::value::Value::from($value)); )*
        node
    }};
}

macro_rules! feat {
    ($($dim:expr),* $(,)?) => {
        $crate::value::Value::Shape($crate::shape!($($dim),*))
    };
}

fn strs(items: &[&str]) -> Value {
    Value::List(items.iter().map(|s| Value::from(*s)).collect())
}

pub const UNSUPERVISED_FEATURES: [&str; 9] = [
    "aatype",
    "residue_index",
    "sequence",
    "msa",
    "domain_name",
    "num_alignments",
    "seq_length",
    "between_segment_residues",
    "deletion_matrix",
];

pub const TEMPLATE_FEATURES: [&str; 5] = [
    "template_all_atom_positions",
    "template_sum_probs",
    "template_aatype",
    "template_all_atom_masks",
    "template_domain_names",
];

/// The base template. Built once and shared read-only.
pub fn base_config() -> &'static Config {
    static BASE: OnceLock<Config> = OnceLock::new();
    BASE.get_or_init(build_base_config)
}

#[rustfmt::skip]
fn eval_feature_shapes() -> Value {
    Value::Tree(tree! {
        "aatype" => feat![NUM_RES],
        "all_atom_mask" => feat![NUM_RES, 37],
        "all_atom_positions" => feat![NUM_RES, 37, 3],
        "alt_chi_angles" => feat![NUM_RES, 4],
        "atom14_alt_gt_exists" => feat![NUM_RES, 14],
        "atom14_alt_gt_positions" => feat![NUM_RES, 14, 3],
        "atom14_atom_exists" => feat![NUM_RES, 14],
        "atom14_atom_is_ambiguous" => feat![NUM_RES, 14],
        "atom14_gt_exists" => feat![NUM_RES, 14],
        "atom14_gt_positions" => feat![NUM_RES, 14, 3],
        "atom37_atom_exists" => feat![NUM_RES, 37],
        "backbone_affine_mask" => feat![NUM_RES],
        "backbone_affine_tensor" => feat![NUM_RES, 7],
        "bert_mask" => feat![NUM_MSA_SEQ, NUM_RES],
        "chi_angles" => feat![NUM_RES, 4],
        "chi_mask" => feat![NUM_RES, 4],
        "extra_deletion_value" => feat![NUM_EXTRA_SEQ, NUM_RES],
        "extra_has_deletion" => feat![NUM_EXTRA_SEQ, NUM_RES],
        "extra_msa" => feat![NUM_EXTRA_SEQ, NUM_RES],
        "extra_msa_mask" => feat![NUM_EXTRA_SEQ, NUM_RES],
        "extra_msa_row_mask" => feat![NUM_EXTRA_SEQ],
        "is_distillation" => feat![],
        "msa_feat" => feat![NUM_MSA_SEQ, NUM_RES, 49],
        "msa_mask" => feat![NUM_MSA_SEQ, NUM_RES],
        "msa_row_mask" => feat![NUM_MSA_SEQ],
        "pseudo_beta" => feat![NUM_RES, 3],
        "pseudo_beta_mask" => feat![NUM_RES],
        "random_crop_to_size_seed" => feat![2],
        "residue_index" => feat![NUM_RES],
        "residx_atom14_to_atom37" => feat![NUM_RES, 14],
        "residx_atom37_to_atom14" => feat![NUM_RES, 37],
        "resolution" => feat![],
        "rigidgroups_alt_gt_frames" => feat![NUM_RES, 8, 12],
        "rigidgroups_group_exists" => feat![NUM_RES, 8],
        "rigidgroups_group_is_ambiguous" => feat![NUM_RES, 8],
        "rigidgroups_gt_exists" => feat![NUM_RES, 8],
        "rigidgroups_gt_frames" => feat![NUM_RES, 8, 12],
        "seq_length" => feat![],
        "seq_mask" => feat![NUM_RES],
        "target_feat" => feat![NUM_RES, 22],
        "template_aatype" => feat![NUM_TEMPLATES, NUM_RES],
        "template_all_atom_masks" => feat![NUM_TEMPLATES, NUM_RES, 37],
        "template_all_atom_positions" => feat![NUM_TEMPLATES, NUM_RES, 37, 3],
        "template_backbone_affine_mask" => feat![NUM_TEMPLATES, NUM_RES],
        "template_backbone_affine_tensor" => feat![NUM_TEMPLATES, NUM_RES, 7],
        "template_mask" => feat![NUM_TEMPLATES],
        "template_pseudo_beta" => feat![NUM_TEMPLATES, NUM_RES, 3],
        "template_pseudo_beta_mask" => feat![NUM_TEMPLATES, NUM_RES],
        "template_sum_probs" => feat![NUM_TEMPLATES, 1],
        "true_msa" => feat![NUM_MSA_SEQ, NUM_RES],
    })
}

fn data_config() -> Value {
    Value::Tree(tree! {
        "common" => tree! {
            "masked_msa" => tree! {
                "profile_prob" => 0.1,
                "same_prob" => 0.1,
                "uniform_prob" => 0.1,
            },
            "max_extra_msa" => 1024,
            "msa_cluster_features" => true,
            "num_recycle" => 100,
            "reduce_msa_clusters_by_max_templates" => false,
            "resample_msa_in_recycling" => true,
            "template_features" => strs(&TEMPLATE_FEATURES),
            "unsupervised_features" => strs(&UNSUPERVISED_FEATURES),
            "use_templates" => false,
        },
        "eval" => tree! {
            "feat" => eval_feature_shapes(),
            "fixed_size" => true,
            // top templates, not a random subset
            "subsample_templates" => false,
            "masked_msa_replace_fraction" => 0.15,
            "max_msa_clusters" => 128,
            "max_templates" => 1,
            "num_ensemble" => 1,
        },
    })
}

fn attention(dropout_rate: f64, num_head: i64, orientation: &str) -> Value {
    Value::Tree(tree! {
        "dropout_rate" => dropout_rate,
        "gating" => true,
        "num_head" => num_head,
        "orientation" => orientation,
        "shared_dropout" => true,
    })
}

fn keyed_attention(orientation: &str) -> Value {
    Value::Tree(tree! {
        "dropout_rate" => 0.25,
        "gating" => true,
        "key_dim" => 64,
        "num_head" => 4,
        "orientation" => orientation,
        "shared_dropout" => true,
        "value_dim" => 64,
    })
}

fn transition(num_intermediate_factor: i64) -> Value {
    Value::Tree(tree! {
        "dropout_rate" => 0.0,
        "num_intermediate_factor" => num_intermediate_factor,
        "orientation" => "per_row",
        "shared_dropout" => true,
    })
}

fn triangle_multiplication(equation: &str, num_intermediate_channel: i64) -> Value {
    Value::Tree(tree! {
        "dropout_rate" => 0.25,
        "equation" => equation,
        "num_intermediate_channel" => num_intermediate_channel,
        "orientation" => "per_row",
        "shared_dropout" => true,
    })
}

fn evoformer_config() -> Value {
    Value::Tree(tree! {
        "evoformer_num_block" => 48,
        "evoformer" => tree! {
            "msa_row_attention_with_pair_bias" => attention(0.15, 8, "per_row"),
            "msa_column_attention" => attention(0.0, 8, "per_column"),
            "msa_transition" => transition(4),
            "outer_product_mean" => tree! {
                "chunk_size" => 128,
                "dropout_rate" => 0.0,
                "num_outer_channel" => 32,
                "orientation" => "per_row",
                "shared_dropout" => true,
            },
            "triangle_attention_starting_node" => attention(0.25, 4, "per_row"),
            "triangle_attention_ending_node" => attention(0.25, 4, "per_column"),
            "triangle_multiplication_outgoing" => triangle_multiplication("ikc,jkc->ijc", 128),
            "triangle_multiplication_incoming" => triangle_multiplication("kjc,kic->ijc", 128),
            "pair_transition" => transition(4),
        },
        "extra_msa_channel" => 64,
        "extra_msa_stack_num_block" => 4,
        "max_relative_feature" => 32,
        "msa_channel" => 256,
        "pair_channel" => 128,
        "prev_pos" => tree! {
            "min_bin" => 3.25,
            "max_bin" => 20.75,
            "num_bins" => 15,
        },
        "recycle_features" => true,
        "recycle_pos" => true,
        "seq_channel" => 384,
        "template" => tree! {
            "attention" => tree! {
                "gating" => false,
                "key_dim" => 64,
                "num_head" => 4,
                "value_dim" => 64,
            },
            "dgram_features" => tree! {
                "min_bin" => 3.25,
                "max_bin" => 50.75,
                "num_bins" => 39,
            },
            "embed_torsion_angles" => false,
            "enabled" => false,
            "template_pair_stack" => tree! {
                "num_block" => 2,
                "triangle_attention_starting_node" => keyed_attention("per_row"),
                "triangle_attention_ending_node" => keyed_attention("per_column"),
                "triangle_multiplication_outgoing" => triangle_multiplication("ikc,jkc->ijc", 64),
                "triangle_multiplication_incoming" => triangle_multiplication("kjc,kic->ijc", 64),
                "pair_transition" => transition(2),
            },
            "max_templates" => 1,
            "subbatch_size" => 128,
            "use_template_unit_vector" => false,
        },
    })
}

fn heads_config() -> Value {
    Value::Tree(tree! {
        "distogram" => tree! {
            "first_break" => 2.3125,
            "last_break" => 21.6875,
            "num_bins" => 64,
            "weight" => 0.3,
        },
        "predicted_aligned_error" => tree! {
            // `num_bins - 1` bins cover [0, max_error_bin] in 0.5A steps,
            // the last bin is everything above.
            "max_error_bin" => 31.0,
            "num_bins" => 64,
            "num_channels" => 128,
            "filter_by_resolution" => false,
            "min_resolution" => 0.1,
            "max_resolution" => 3.0,
            "weight" => 0.0,
        },
        "experimentally_resolved" => tree! {
            "filter_by_resolution" => false,
            "max_resolution" => 3.0,
            "min_resolution" => 0.1,
            "weight" => 0,
        },
        "structure_module" => tree! {
            "num_layer" => 8,
            "fape" => tree! {
                "clamp_distance" => 10.0,
                "clamp_type" => "relu",
                "loss_unit_distance" => 10.0,
            },
            "angle_norm_weight" => 0.01,
            "chi_weight" => 0.5,
            "clash_overlap_tolerance" => 1.5,
            "compute_in_graph_metrics" => true,
            "dropout" => 0.1,
            "num_channel" => 384,
            "num_head" => 12,
            "num_layer_in_transition" => 3,
            "num_point_qk" => 4,
            "num_point_v" => 8,
            "num_scalar_qk" => 16,
            "num_scalar_v" => 16,
            "position_scale" => 10.0,
            "sidechain" => tree! {
                "atom_clamp_distance" => 10.0,
                "num_channel" => 128,
                "num_residual_block" => 2,
                "weight_frac" => 0.5,
                "length_scale" => 10.0,
            },
            "structural_violation_loss_weight" => 1.0,
            "violation_tolerance_factor" => 12.0,
            // FAPE and aux loss weights are applied inside the module
            "weight" => 1.0,
        },
        "predicted_lddt" => tree! {
            "filter_by_resolution" => false,
            "max_resolution" => 3.0,
            "min_resolution" => 0.1,
            "num_bins" => 50,
            "num_channels" => 128,
            "weight" => 0.01,
        },
        "masked_msa" => tree! {
            "num_output" => 23,
            "weight" => 2.0,
        },
    })
}

fn build_base_config() -> Config {
    Config::new(tree! {
        "data" => data_config(),
        "model" => tree! {
            "embeddings_and_evoformer" => evoformer_config(),
            "global_config" => tree! {
                "deterministic" => false,
                "subbatch_size" => 1,
                "use_remat" => true,
                "zero_init" => true,
            },
            "heads" => heads_config(),
            "num_recycle" => 100,
            "resample_msa_in_recycling" => true,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::Dim;

    #[test]
    fn test_base_feature_lists() {
        let base = base_config();
        assert_eq!(
            base.str_list("data.common.unsupervised_features").unwrap(),
            UNSUPERVISED_FEATURES
        );
        assert_eq!(
            base.str_list("data.common.template_features").unwrap(),
            TEMPLATE_FEATURES
        );
    }

    #[test]
    fn test_base_shape_table() {
        let base = base_config();
        let msa_feat = base.shape("data.eval.feat.msa_feat").unwrap();
        assert_eq!(
            msa_feat.dims(),
            &[Dim::NumMsaSeq, Dim::NumRes, Dim::Literal(49)]
        );
        assert_eq!(base.tree("data.eval.feat").unwrap().len(), 50);
        assert_eq!(base.shape("data.eval.feat.seq_length").unwrap().rank(), 0);
    }

    #[test]
    fn test_base_has_no_crop_size() {
        assert!(!base_config().contains("data.eval.crop_size"));
    }

    #[test]
    fn test_base_defaults() {
        let base = base_config();
        assert_eq!(base.int("data.common.max_extra_msa").unwrap(), 1024);
        assert!(!base.bool("data.common.use_templates").unwrap());
        assert_eq!(
            base.float("model.heads.predicted_aligned_error.weight").unwrap(),
            0.0
        );
        assert_eq!(
            base.str("model.embeddings_and_evoformer.evoformer.msa_column_attention.orientation")
                .unwrap(),
            "per_column"
        );
    }
}
