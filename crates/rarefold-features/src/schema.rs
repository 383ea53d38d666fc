//! Declared element kind and shape of every raw input feature.
use rarefold_config::{shape, FeatureShape, NUM_MSA_SEQ, NUM_RES, NUM_TEMPLATES};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use strum::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ElementKind {
    Int,
    Float,
    Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layout {
    /// Reshaped to the declared shape. At most one placeholder other than
    /// the residue count may be left for inference from the element count.
    Dense(FeatureShape),
    /// Per-example constant repeated in the raw data; only the first element
    /// is kept, as a scalar.
    FirstElement,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSpec {
    pub kind: ElementKind,
    pub layout: Layout,
}

impl FeatureSpec {
    fn dense(kind: ElementKind, shape: FeatureShape) -> Self {
        Self {
            kind,
            layout: Layout::Dense(shape),
        }
    }

    fn scalar(kind: ElementKind) -> Self {
        Self {
            kind,
            layout: Layout::FirstElement,
        }
    }
}

/// Schema for the raw features the record adapters understand.
#[rustfmt::skip]
pub fn input_feature_schema() -> &'static BTreeMap<&'static str, FeatureSpec> {
    use ElementKind::*;
    static SCHEMA: OnceLock<BTreeMap<&'static str, FeatureSpec>> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        BTreeMap::from([
            ("aatype",                      FeatureSpec::dense(Float, shape![NUM_RES, 21])),
            ("between_segment_residues",    FeatureSpec::dense(Int,   shape![NUM_RES])),
            ("deletion_matrix",             FeatureSpec::dense(Float, shape![NUM_MSA_SEQ, NUM_RES])),
            ("domain_name",                 FeatureSpec::dense(Bytes, shape![1])),
            ("msa",                         FeatureSpec::dense(Int,   shape![NUM_MSA_SEQ, NUM_RES])),
            ("num_alignments",              FeatureSpec::scalar(Int)),
            ("residue_index",               FeatureSpec::dense(Int,   shape![NUM_RES])),
            ("seq_length",                  FeatureSpec::scalar(Int)),
            ("sequence",                    FeatureSpec::dense(Bytes, shape![1])),
            ("template_aatype",             FeatureSpec::dense(Float, shape![NUM_TEMPLATES, NUM_RES, 22])),
            ("template_all_atom_masks",     FeatureSpec::dense(Float, shape![NUM_TEMPLATES, NUM_RES, 37])),
            ("template_all_atom_positions", FeatureSpec::dense(Float, shape![NUM_TEMPLATES, NUM_RES, 37, 3])),
            ("template_domain_names",       FeatureSpec::dense(Bytes, shape![NUM_TEMPLATES])),
            ("template_sum_probs",          FeatureSpec::dense(Float, shape![NUM_TEMPLATES, 1])),
        ])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rarefold_config::{TEMPLATE_FEATURES, UNSUPERVISED_FEATURES};

    #[test]
    fn test_schema_covers_feature_lists() {
        let schema = input_feature_schema();
        for name in UNSUPERVISED_FEATURES.iter().chain(TEMPLATE_FEATURES.iter()) {
            assert!(schema.contains_key(name), "{name}");
        }
    }

    #[test]
    fn test_schema_kinds() {
        let schema = input_feature_schema();
        assert_eq!(schema["msa"].kind, ElementKind::Int);
        assert_eq!(schema["sequence"].kind, ElementKind::Bytes);
        assert_eq!(schema["seq_length"].layout, Layout::FirstElement);
    }
}
