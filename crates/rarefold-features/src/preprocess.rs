//! Raw record to model features.
//!
//! Both entry points run the same sequence:
//!
//! 1. read the residue count from `seq_length`
//! 2. specialize the data config for that count ([`make_data_config`])
//! 3. migrate a legacy integer `deletion_matrix_int` to `deletion_matrix`
//! 4. parse the requested features ([`RecordAdapter`])
//! 5. run the [`TensorPipeline`] in a fresh [`ExecutionContext`]
//! 6. materialize numeric outputs as tensors, dropping byte strings
//!
//! [`from_array_mapping`] additionally removes the leading batch axis.
use crate::adapter::{ArrayAdapter, ExampleAdapter, RecordAdapter, TensorDict};
use crate::array::ArrayValue;
use crate::context::ExecutionContext;
use crate::error::{FeatureError, Result};
use crate::pipeline::{InputPipeline, TensorPipeline};
use crate::record::{ArrayMapping, Example, Feature};
use crate::selector::make_data_config;
use bon::Builder;
use candle_core::{Device, Tensor};
use rarefold_config::Config;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Model-ready features: numeric tensors on the CPU, keyed by name.
pub type FeatureDict = BTreeMap<String, Tensor>;

const SEQ_LENGTH: &str = "seq_length";
const DELETION_MATRIX: &str = "deletion_matrix";
const LEGACY_DELETION_MATRIX: &str = "deletion_matrix_int";

/// Prepares features for one resolved model config.
///
/// ```ignore
/// let pre = Preprocessor::builder().config(model_config("model_1")?).seed(7).build();
/// let batched = pre.process_record(&record)?;
/// ```
#[derive(Builder)]
pub struct Preprocessor {
    config: Config,
    #[builder(default)]
    seed: u64,
    #[builder(default = default_pipeline())]
    pipeline: Arc<dyn TensorPipeline>,
}

fn default_pipeline() -> Arc<dyn TensorPipeline> {
    Arc::new(InputPipeline)
}

impl Preprocessor {
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Features for a serialized-record style input, batched.
    pub fn process_record(&self, record: &Example) -> Result<FeatureDict> {
        let num_res = record_num_res(record)?;
        let (data_config, feature_names) = make_data_config(&self.config, num_res)?;
        let record = migrate_record(record)?;
        let (out, device) =
            self.run(&ExampleAdapter, record.as_ref(), &data_config, &feature_names, num_res)?;
        materialize(out, &device, false)
    }

    /// Features for an in-memory array mapping, without the batch axis.
    pub fn process_array_mapping(&self, mapping: &ArrayMapping) -> Result<FeatureDict> {
        let num_res = mapping_num_res(mapping)?;
        let (data_config, feature_names) = make_data_config(&self.config, num_res)?;
        let mapping = migrate_mapping(mapping)?;
        let (out, device) =
            self.run(&ArrayAdapter, mapping.as_ref(), &data_config, &feature_names, num_res)?;
        materialize(out, &device, true)
    }

    fn run<A: RecordAdapter>(
        &self,
        adapter: &A,
        input: &A::Input,
        data_config: &Config,
        feature_names: &[String],
        num_res: usize,
    ) -> Result<(TensorDict, Device)> {
        debug!(?feature_names, "requesting input features");
        let tensors = adapter.to_tensor_dict(input, feature_names, num_res)?;
        let mut ctx = ExecutionContext::new(self.seed);
        let out = self.pipeline.process(tensors, data_config, &mut ctx)?;
        info!(num_res, seed = self.seed, features = out.len(), "prepared input features");
        Ok((out, ctx.device().clone()))
    }
}

/// Batched features for a serialized-record style input.
pub fn from_record(record: &Example, config: &Config, seed: u64) -> Result<FeatureDict> {
    preprocessor(config, seed).process_record(record)
}

/// Unbatched features for an in-memory array mapping.
pub fn from_array_mapping(mapping: &ArrayMapping, config: &Config, seed: u64) -> Result<FeatureDict> {
    preprocessor(config, seed).process_array_mapping(mapping)
}

fn preprocessor(config: &Config, seed: u64) -> Preprocessor {
    Preprocessor::builder().config(config.clone()).seed(seed).build()
}

fn check_num_res(value: i64) -> Result<usize> {
    match usize::try_from(value) {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(FeatureError::invalid(
            SEQ_LENGTH,
            format!("residue count must be positive, found {value}"),
        )),
    }
}

fn record_num_res(record: &Example) -> Result<usize> {
    match record.get(SEQ_LENGTH) {
        None => Err(FeatureError::MissingField(SEQ_LENGTH.into())),
        Some(Feature::Int64List(values)) => {
            let first = values
                .first()
                .ok_or_else(|| FeatureError::invalid(SEQ_LENGTH, "empty value list"))?;
            check_num_res(*first)
        }
        Some(_) => Err(FeatureError::invalid(SEQ_LENGTH, "expected an integer list")),
    }
}

fn mapping_num_res(mapping: &ArrayMapping) -> Result<usize> {
    match mapping.get(SEQ_LENGTH) {
        None => Err(FeatureError::MissingField(SEQ_LENGTH.into())),
        Some(ArrayValue::Bytes(_)) => Err(FeatureError::invalid(SEQ_LENGTH, "expected a numeric array")),
        Some(values) => {
            let first = values
                .first_int()
                .ok_or_else(|| FeatureError::invalid(SEQ_LENGTH, "empty array"))?;
            check_num_res(first)
        }
    }
}

/// Replace a legacy `deletion_matrix_int` with its float equivalent under
/// `deletion_matrix`. The input is only copied when it needs rewriting.
fn migrate_record(record: &Example) -> Result<Cow<'_, Example>> {
    let Some(legacy) = record.get(LEGACY_DELETION_MATRIX) else {
        return Ok(Cow::Borrowed(record));
    };
    let values = match legacy {
        Feature::Int64List(values) => values.iter().map(|&v| v as f32).collect(),
        Feature::FloatList(values) => values.clone(),
        Feature::BytesList(_) => {
            return Err(FeatureError::invalid(LEGACY_DELETION_MATRIX, "expected an integer list"))
        }
    };
    debug!("migrating {LEGACY_DELETION_MATRIX} to {DELETION_MATRIX}");
    let mut migrated = record.clone();
    migrated.remove(LEGACY_DELETION_MATRIX);
    migrated.insert(DELETION_MATRIX, Feature::FloatList(values));
    Ok(Cow::Owned(migrated))
}

fn migrate_mapping(mapping: &ArrayMapping) -> Result<Cow<'_, ArrayMapping>> {
    let Some(legacy) = mapping.get(LEGACY_DELETION_MATRIX) else {
        return Ok(Cow::Borrowed(mapping));
    };
    let values = match legacy {
        ArrayValue::Int(a) => a.mapv(|v| v as f32),
        ArrayValue::Float(a) => a.clone(),
        ArrayValue::Bytes(_) => {
            return Err(FeatureError::invalid(LEGACY_DELETION_MATRIX, "expected an integer array"))
        }
    };
    debug!("migrating {LEGACY_DELETION_MATRIX} to {DELETION_MATRIX}");
    let mut migrated = mapping.clone();
    migrated.remove(LEGACY_DELETION_MATRIX);
    migrated.insert(DELETION_MATRIX.to_string(), ArrayValue::Float(values));
    Ok(Cow::Owned(migrated))
}

/// Copy numeric outputs into CPU tensors, optionally taking the first entry
/// of the batch axis. Byte-string outputs are dropped.
fn materialize(out: TensorDict, device: &Device, unbatch: bool) -> Result<FeatureDict> {
    let mut features = FeatureDict::new();
    for (name, value) in out {
        let Some(tensor) = value.to_tensor(device)? else {
            debug!(feature = %name, "dropping non-numeric output");
            continue;
        };
        let tensor = if unbatch {
            if tensor.rank() == 0 {
                return Err(FeatureError::invalid(&name, "output has no batch axis"));
            }
            tensor.get(0)?
        } else {
            tensor
        };
        features.insert(name, tensor);
    }
    Ok(features)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineError;
    use ndarray::{ArrayD, IxDyn};
    use rarefold_config::model_config;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns its input unchanged and counts calls.
    #[derive(Default)]
    struct Passthrough {
        calls: AtomicUsize,
    }

    impl TensorPipeline for Passthrough {
        fn process(
            &self,
            tensors: TensorDict,
            _config: &Config,
            _ctx: &mut ExecutionContext,
        ) -> std::result::Result<TensorDict, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(tensors
                .into_iter()
                .map(|(k, v)| {
                    let batched = ArrayValue::stack(&[v]).expect("stackable");
                    (k, batched)
                })
                .collect())
        }
    }

    struct Failing;

    impl TensorPipeline for Failing {
        fn process(
            &self,
            _tensors: TensorDict,
            _config: &Config,
            _ctx: &mut ExecutionContext,
        ) -> std::result::Result<TensorDict, PipelineError> {
            Err(PipelineError::MissingFeature("msa_feat".into()))
        }
    }

    fn record() -> Example {
        let num_res = 3;
        let mut aatype = vec![0f32; num_res * 21];
        for r in 0..num_res {
            aatype[r * 21 + r] = 1.0;
        }
        Example::new()
            .with("aatype", Feature::FloatList(aatype))
            .with("between_segment_residues", Feature::Int64List(vec![0; num_res]))
            .with("domain_name", Feature::bytes([b"test".to_vec()]))
            .with("residue_index", Feature::Int64List(vec![0, 1, 2]))
            .with("seq_length", Feature::Int64List(vec![3; num_res]))
            .with("sequence", Feature::bytes([b"ARN".to_vec()]))
            .with("msa", Feature::Int64List(vec![0, 14, 11, 0, 21, 11]))
            .with("num_alignments", Feature::Int64List(vec![2; num_res]))
            .with(LEGACY_DELETION_MATRIX, Feature::Int64List(vec![1, 0, 2, 0, 0, 0]))
    }

    fn passthrough(calls: Arc<Passthrough>) -> Result<Preprocessor> {
        Ok(Preprocessor::builder()
            .config(model_config("model_3")?)
            .pipeline(calls)
            .build())
    }

    #[test]
    fn test_missing_seq_length_fails_before_pipeline() -> Result<()> {
        let pipeline = Arc::new(Passthrough::default());
        let pre = passthrough(pipeline.clone())?;
        let mut rec = record();
        rec.remove(SEQ_LENGTH);
        let err = pre.process_record(&rec).unwrap_err();
        assert!(matches!(err, FeatureError::MissingField(ref f) if f == SEQ_LENGTH));
        let err = pre.process_array_mapping(&rec.to_array_mapping()).unwrap_err();
        assert!(matches!(err, FeatureError::MissingField(ref f) if f == SEQ_LENGTH));
        assert_eq!(pipeline.calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[test]
    fn test_float_seq_length_on_array_path() -> Result<()> {
        let mut mapping = record().to_array_mapping();
        let lengths = mapping[SEQ_LENGTH].as_int().expect("int").mapv(|n| n as f32);
        mapping.insert(SEQ_LENGTH.into(), ArrayValue::Float(lengths));
        assert_eq!(mapping_num_res(&mapping)?, 3);

        mapping.insert(SEQ_LENGTH.into(), record().to_array_mapping()["sequence"].clone());
        let err = mapping_num_res(&mapping).unwrap_err();
        assert!(matches!(err, FeatureError::InvalidFeature { .. }));
        Ok(())
    }

    #[test]
    fn test_zero_residues_rejected() {
        let rec = record().with(SEQ_LENGTH, Feature::Int64List(vec![0]));
        let err = record_num_res(&rec).unwrap_err();
        assert!(matches!(err, FeatureError::InvalidFeature { .. }));
    }

    #[test]
    fn test_legacy_deletion_matrix_migrated() -> Result<()> {
        let pre = passthrough(Arc::new(Passthrough::default()))?;
        let out = pre.process_record(&record())?;
        assert!(!out.contains_key(LEGACY_DELETION_MATRIX));
        let deletions = out[DELETION_MATRIX].flatten_all()?.to_vec1::<f32>()?;
        assert_eq!(deletions, vec![1.0, 0.0, 2.0, 0.0, 0.0, 0.0]);
        Ok(())
    }

    #[test]
    fn test_migration_leaves_input_untouched() -> Result<()> {
        let rec = record();
        let migrated = migrate_record(&rec)?;
        assert!(rec.contains(LEGACY_DELETION_MATRIX));
        assert!(!migrated.contains(LEGACY_DELETION_MATRIX));

        let mut plain = rec.clone().with(DELETION_MATRIX, Feature::FloatList(vec![0.0; 6]));
        plain.remove(LEGACY_DELETION_MATRIX);
        assert!(matches!(migrate_record(&plain)?, Cow::Borrowed(_)));
        Ok(())
    }

    #[test]
    fn test_array_mapping_migration_casts() -> Result<()> {
        let mut mapping = ArrayMapping::new();
        let legacy = ArrayD::from_shape_vec(IxDyn(&[1, 3]), vec![1i64, 0, 2]).expect("shape");
        mapping.insert(LEGACY_DELETION_MATRIX.into(), ArrayValue::Int(legacy));
        let migrated = migrate_mapping(&mapping)?;
        let values = migrated[DELETION_MATRIX].as_float().expect("float");
        assert_eq!(values.iter().copied().collect::<Vec<_>>(), vec![1.0, 0.0, 2.0]);
        assert_eq!(values.shape(), &[1, 3]);
        Ok(())
    }

    #[test]
    fn test_non_numeric_outputs_dropped() -> Result<()> {
        let pre = passthrough(Arc::new(Passthrough::default()))?;
        let out = pre.process_record(&record())?;
        assert!(!out.contains_key("sequence"));
        assert!(!out.contains_key("domain_name"));
        assert!(out.contains_key("msa"));
        Ok(())
    }

    #[test]
    fn test_array_path_removes_batch_axis() -> Result<()> {
        let pre = passthrough(Arc::new(Passthrough::default()))?;
        let rec = record();
        let batched = pre.process_record(&rec)?;
        let unbatched = pre.process_array_mapping(&rec.to_array_mapping())?;
        assert_eq!(batched.keys().collect::<Vec<_>>(), unbatched.keys().collect::<Vec<_>>());
        for (name, tensor) in &batched {
            assert_eq!(tensor.dims()[0], 1, "{name}");
            assert_eq!(&tensor.dims()[1..], unbatched[name].dims(), "{name}");
        }
        Ok(())
    }

    #[test]
    fn test_pipeline_error_propagates() -> Result<()> {
        let pre = Preprocessor::builder()
            .config(model_config("model_1")?)
            .pipeline(Arc::new(Failing))
            .build();
        let err = pre.process_record(&record()).unwrap_err();
        assert!(matches!(
            err,
            FeatureError::PipelineExecution(PipelineError::MissingFeature(_))
        ));
        Ok(())
    }

    #[test]
    fn test_builder_defaults() -> Result<()> {
        let pre = Preprocessor::builder().config(model_config("model_5")?).build();
        assert_eq!(pre.seed(), 0);
        Ok(())
    }
}
