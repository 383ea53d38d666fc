use rarefold_config::{base_config, model_config, ConfigError, ModelVariant, Value, ValueKind};
use strum::IntoEnumIterator;

#[test]
fn test_every_variant_resolves() -> Result<(), ConfigError> {
    for variant in ModelVariant::iter() {
        let by_name = model_config(variant.as_ref())?;
        assert_eq!(by_name, variant.config()?);
    }
    Ok(())
}

#[test]
fn test_resolved_configs_are_independent() -> Result<(), ConfigError> {
    let base_before = base_config().clone();
    let first = model_config("model_3")?;
    let second = model_config("model_3")?;

    let edited = first.apply_overrides([("data.common.max_extra_msa", Value::Int(7))])?;
    assert_eq!(edited.int("data.common.max_extra_msa")?, 7);
    assert_eq!(first.int("data.common.max_extra_msa")?, 5120);
    assert_eq!(second.int("data.common.max_extra_msa")?, 5120);
    assert_eq!(base_config(), &base_before);
    assert_eq!(base_config().int("data.common.max_extra_msa")?, 1024);
    Ok(())
}

#[test]
fn test_unknown_variant_is_rejected() {
    let err = model_config("not_a_variant").unwrap_err();
    assert!(matches!(err, ConfigError::UnknownVariant(name) if name == "not_a_variant"));
}

#[test]
fn test_variant_differences() -> Result<(), ConfigError> {
    // (variant, max_extra_msa, templates enabled, pae weight)
    let expected = [
        ("model_1", 5120, true, 0.0),
        ("model_2", 1024, true, 0.0),
        ("model_3", 5120, false, 0.0),
        ("model_4", 5120, false, 0.0),
        ("model_5", 1024, false, 0.0),
        ("model_1_ptm", 5120, true, 0.1),
        ("model_2_ptm", 1024, true, 0.1),
        ("model_3_ptm", 5120, false, 0.1),
        ("model_4_ptm", 5120, false, 0.1),
        ("model_5_ptm", 1024, false, 0.1),
    ];
    for (name, max_extra_msa, templates, pae_weight) in expected {
        let cfg = model_config(name)?;
        assert_eq!(cfg.int("data.common.max_extra_msa")?, max_extra_msa, "{name}");
        assert_eq!(
            cfg.bool("model.embeddings_and_evoformer.template.enabled")?,
            templates,
            "{name}"
        );
        assert_eq!(
            cfg.bool("model.embeddings_and_evoformer.template.embed_torsion_angles")?,
            templates,
            "{name}"
        );
        assert_eq!(
            cfg.bool("data.common.reduce_msa_clusters_by_max_templates")?,
            templates,
            "{name}"
        );
        assert_eq!(
            cfg.float("model.heads.predicted_aligned_error.weight")?,
            pae_weight,
            "{name}"
        );
        // no registered variant feeds template features to the data pipeline
        assert!(!cfg.bool("data.common.use_templates")?, "{name}");
    }
    Ok(())
}

#[test]
fn test_variants_only_touch_their_overrides() -> Result<(), ConfigError> {
    let base_paths = base_config().paths();
    for variant in ModelVariant::iter() {
        let cfg = variant.config()?;
        assert_eq!(cfg.paths(), base_paths);
        let touched: Vec<&str> = variant.overrides().iter().map(|(p, _)| *p).collect();
        for (path, _) in base_paths.iter().filter(|(_, kind)| **kind != ValueKind::Tree) {
            if !touched.contains(&path.as_str()) {
                assert_eq!(cfg.get(path)?, base_config().get(path)?, "{variant}: {path}");
            }
        }
    }
    Ok(())
}

#[test]
fn test_config_serializes_to_json() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = model_config("model_1")?;
    let json: serde_json::Value = serde_json::from_str(&cfg.to_json_pretty()?)?;
    assert_eq!(json["data"]["common"]["max_extra_msa"], 5120);
    assert_eq!(
        json["data"]["eval"]["feat"]["msa_feat"],
        serde_json::json!(["msa placeholder", "num residues placeholder", 49])
    );
    Ok(())
}
