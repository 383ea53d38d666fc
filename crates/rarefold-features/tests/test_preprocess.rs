use candle_core::{DType, Tensor};
use rarefold_config::{model_config, Config, ModelVariant};
use rarefold_features::{
    from_array_mapping, from_record, ArrayValue, Example, Feature, FeatureDict, FeatureError,
};
use rarefold_test_data::TestFile;
use std::error::Error;

type TestResult = Result<(), Box<dyn Error>>;

fn record() -> Result<Example, FeatureError> {
    Example::from_bytes(TestFile::record_01().bytes())
}

fn legacy_record() -> Result<Example, FeatureError> {
    Example::from_bytes(TestFile::record_legacy_01().bytes())
}

fn with_templates(config: &Config) -> Config {
    let mut edit = config.edit();
    edit.set("data.common.use_templates", true).unwrap();
    edit.commit()
}

fn values(t: &Tensor) -> candle_core::Result<Vec<f64>> {
    t.flatten_all()?.to_dtype(DType::F64)?.to_vec1::<f64>()
}

fn assert_identical(a: &FeatureDict, b: &FeatureDict) -> TestResult {
    assert_eq!(a.keys().collect::<Vec<_>>(), b.keys().collect::<Vec<_>>());
    for (name, ta) in a {
        let tb = &b[name];
        assert_eq!(ta.dims(), tb.dims(), "{name}");
        assert_eq!(ta.dtype(), tb.dtype(), "{name}");
        assert_eq!(values(ta)?, values(tb)?, "{name}");
    }
    Ok(())
}

#[test]
fn test_fixed_shapes_for_model_1() -> TestResult {
    let config = model_config("model_1")?;
    let features = from_record(&record()?, &config, 0)?;
    let num_res = 8;
    assert_eq!(features["msa_feat"].dims(), &[1, 127, num_res, 49]);
    assert_eq!(features["target_feat"].dims(), &[1, num_res, 22]);
    assert_eq!(features["extra_msa"].dims(), &[1, 5120, num_res]);
    assert_eq!(features["extra_msa_row_mask"].dims(), &[1, 5120]);
    assert_eq!(features["bert_mask"].dims(), &[1, 127, num_res]);
    assert_eq!(features["seq_mask"].dims(), &[1, num_res]);
    assert_eq!(features["residx_atom14_to_atom37"].dims(), &[1, num_res, 14]);
    assert_eq!(features["random_crop_to_size_seed"].dims(), &[1, 2]);
    assert_eq!(features["seq_length"].dims(), &[1]);
    assert_eq!(features["aatype"].dtype(), DType::I64);
    assert_eq!(features["msa_feat"].dtype(), DType::F32);
    assert!(!features.contains_key("template_aatype"));
    Ok(())
}

#[test]
fn test_msa_rows_are_padded_not_invented() -> TestResult {
    let features = from_record(&record()?, &model_config("model_3")?, 0)?;
    let row_mask = values(&features["msa_row_mask"])?;
    assert_eq!(row_mask.len(), 128);
    assert_eq!(row_mask.iter().filter(|&&m| m == 1.0).count(), 4);
    assert!(row_mask[..4].iter().all(|&m| m == 1.0));
    let extra_rows = values(&features["extra_msa_row_mask"])?;
    assert!(extra_rows.iter().all(|&m| m == 0.0));
    Ok(())
}

#[test]
fn test_query_row_stays_first() -> TestResult {
    let features = from_record(&record()?, &model_config("model_5")?, 3)?;
    // MKTAYIAK in the model alphabet
    let expected = [12.0, 11.0, 16.0, 0.0, 18.0, 9.0, 0.0, 11.0];
    let true_msa = values(&features["true_msa"].get(0)?.get(0)?)?;
    assert_eq!(true_msa, expected);
    assert_eq!(values(&features["aatype"])?, expected);
    Ok(())
}

#[test]
fn test_same_seed_is_bit_identical() -> TestResult {
    let config = model_config("model_1_ptm")?;
    let rec = record()?;
    assert_identical(&from_record(&rec, &config, 42)?, &from_record(&rec, &config, 42)?)?;
    let mapping = rec.to_array_mapping();
    assert_identical(
        &from_array_mapping(&mapping, &config, 42)?,
        &from_array_mapping(&mapping, &config, 42)?,
    )?;
    Ok(())
}

#[test]
fn test_seed_changes_sampling() -> TestResult {
    let config = model_config("model_3")?;
    let rec = record()?;
    let a = from_record(&rec, &config, 1)?;
    let b = from_record(&rec, &config, 2)?;
    assert_ne!(
        values(&a["random_crop_to_size_seed"])?,
        values(&b["random_crop_to_size_seed"])?
    );
    Ok(())
}

#[test]
fn test_legacy_deletions_match_float_deletions() -> TestResult {
    let config = model_config("model_4")?;
    let migrated = from_record(&legacy_record()?, &config, 5)?;
    let plain = from_record(&record()?, &config, 5)?;
    assert!(!migrated.contains_key("deletion_matrix_int"));
    assert_identical(&migrated, &plain)?;

    let migrated = from_array_mapping(&legacy_record()?.to_array_mapping(), &config, 5)?;
    let plain = from_array_mapping(&record()?.to_array_mapping(), &config, 5)?;
    assert_identical(&migrated, &plain)?;
    Ok(())
}

#[test]
fn test_array_path_drops_batch_axis() -> TestResult {
    let config = model_config("model_2")?;
    let rec = record()?;
    let batched = from_record(&rec, &config, 9)?;
    let unbatched = from_array_mapping(&rec.to_array_mapping(), &config, 9)?;
    assert_eq!(batched.keys().collect::<Vec<_>>(), unbatched.keys().collect::<Vec<_>>());
    for (name, tensor) in &batched {
        assert_eq!(tensor.rank(), unbatched[name].rank() + 1, "{name}");
        assert_eq!(values(&tensor.get(0)?)?, values(&unbatched[name])?, "{name}");
    }
    Ok(())
}

#[test]
fn test_outputs_are_numeric() -> TestResult {
    let config = with_templates(&model_config("model_1")?);
    let features = from_record(&record()?, &config, 0)?;
    for (name, tensor) in &features {
        assert!(matches!(tensor.dtype(), DType::I64 | DType::F32), "{name}");
    }
    assert!(!features.contains_key("sequence"));
    assert!(!features.contains_key("domain_name"));
    assert!(!features.contains_key("template_domain_names"));
    Ok(())
}

#[test]
fn test_template_features() -> TestResult {
    let config = with_templates(&ModelVariant::Model1.config()?);
    let features = from_record(&record()?, &config, 0)?;
    assert_eq!(features["template_aatype"].dims(), &[1, 1, 8]);
    assert_eq!(features["template_pseudo_beta"].dims(), &[1, 1, 8, 3]);
    assert_eq!(features["template_pseudo_beta_mask"].dims(), &[1, 1, 8]);
    assert_eq!(features["template_mask"].dims(), &[1, 1]);
    assert_eq!(features["template_sum_probs"].dims(), &[1, 1, 1]);
    // the template is the query, so residue types carry over
    assert_eq!(
        values(&features["template_aatype"])?,
        values(&features["aatype"])?
    );
    Ok(())
}

#[test]
fn test_missing_seq_length() -> TestResult {
    let mut rec = record()?;
    rec.remove("seq_length");
    let config = model_config("model_1")?;
    let err = from_record(&rec, &config, 0).unwrap_err();
    assert!(matches!(err, FeatureError::MissingField(ref name) if name == "seq_length"));
    let err = from_array_mapping(&rec.to_array_mapping(), &config, 0).unwrap_err();
    assert!(matches!(err, FeatureError::MissingField(ref name) if name == "seq_length"));
    Ok(())
}

#[test]
fn test_missing_requested_feature() -> TestResult {
    let mut rec = record()?;
    rec.remove("msa");
    let err = from_record(&rec, &model_config("model_1")?, 0).unwrap_err();
    assert!(matches!(err, FeatureError::MissingField(ref name) if name == "msa"));
    Ok(())
}

#[test]
fn test_deletion_rows_must_match_msa_rows() -> TestResult {
    let config = model_config("model_3")?;
    let num_res = 8;
    for rows in [2, 6] {
        let rec = record()?.with("deletion_matrix", Feature::FloatList(vec![0.0; rows * num_res]));
        let err = from_record(&rec, &config, 0).unwrap_err();
        assert!(
            matches!(err, FeatureError::InvalidFeature { ref name, .. } if name == "deletion_matrix"),
            "{rows} rows: {err}"
        );
        let err = from_array_mapping(&rec.to_array_mapping(), &config, 0).unwrap_err();
        assert!(
            matches!(err, FeatureError::InvalidFeature { ref name, .. } if name == "deletion_matrix"),
            "{rows} rows: {err}"
        );
    }
    Ok(())
}

#[test]
fn test_float_seq_length_on_array_path() -> TestResult {
    let config = model_config("model_3")?;
    let rec = record()?;
    let mut mapping = rec.to_array_mapping();
    let lengths = match &mapping["seq_length"] {
        ArrayValue::Int(a) => a.mapv(|n| n as f32),
        other => panic!("unexpected seq_length {other:?}"),
    };
    mapping.insert("seq_length".into(), ArrayValue::Float(lengths));
    let features = from_array_mapping(&mapping, &config, 4)?;
    assert_identical(&features, &from_array_mapping(&rec.to_array_mapping(), &config, 4)?)?;
    Ok(())
}

#[test]
fn test_concurrent_calls_are_isolated() -> TestResult {
    let config = model_config("model_3")?;
    let rec = record()?;
    let expected = from_record(&rec, &config, 11)?;
    let results: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| s.spawn(|| from_record(&rec, &config, 11)))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    for result in results {
        assert_identical(&result?, &expected)?;
    }
    Ok(())
}
