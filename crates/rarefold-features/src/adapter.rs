//! Parse raw inputs into the named arrays the pipeline consumes.
use crate::array::ArrayValue;
use crate::error::{FeatureError, Result};
use crate::record::{ArrayMapping, Example};
use crate::schema::{input_feature_schema, ElementKind, FeatureSpec, Layout};
use ndarray::{ArrayD, IxDyn};
use rarefold_config::DimBindings;
use std::collections::BTreeMap;
use tracing::debug;

/// Intermediate named arrays passed between the adapters and the pipeline.
pub type TensorDict = BTreeMap<String, ArrayValue>;

/// Converts one raw input representation into a [`TensorDict`].
///
/// Implementations must agree: equivalent logical inputs produce equal
/// dictionaries regardless of representation.
pub trait RecordAdapter {
    type Input: ?Sized;

    fn to_tensor_dict(
        &self,
        input: &Self::Input,
        features: &[String],
        num_res: usize,
    ) -> Result<TensorDict>;
}

/// Adapter for serialized-record style [`Example`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExampleAdapter;

/// Adapter for in-memory [`ArrayMapping`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArrayAdapter;

impl RecordAdapter for ExampleAdapter {
    type Input = Example;

    fn to_tensor_dict(
        &self,
        input: &Example,
        features: &[String],
        num_res: usize,
    ) -> Result<TensorDict> {
        adapt(features, num_res, |name| input.get(name).map(|f| f.to_array()))
    }
}

impl RecordAdapter for ArrayAdapter {
    type Input = ArrayMapping;

    fn to_tensor_dict(
        &self,
        input: &ArrayMapping,
        features: &[String],
        num_res: usize,
    ) -> Result<TensorDict> {
        adapt(features, num_res, |name| input.get(name).cloned())
    }
}

fn adapt<F>(features: &[String], num_res: usize, mut lookup: F) -> Result<TensorDict>
where
    F: FnMut(&str) -> Option<ArrayValue>,
{
    let schema = input_feature_schema();
    let mut bindings = DimBindings::with_num_res(num_res);
    let mut out = TensorDict::new();
    for name in features {
        let spec = schema
            .get(name.as_str())
            .ok_or_else(|| FeatureError::invalid(name, "no input schema entry"))?;
        let raw = lookup(name).ok_or_else(|| FeatureError::MissingField(name.clone()))?;
        let value = conform(name, spec, raw, &mut bindings)?;
        debug!(feature = %name, shape = ?value.shape(), "parsed input feature");
        out.insert(name.clone(), value);
    }
    Ok(out)
}

/// Cast `raw` to the declared element kind and lay it out in the declared
/// shape. Only the element order of `raw` matters, not its shape. A
/// placeholder inferred here is bound for every later feature, so all MSA
/// and template features must agree on their depth.
fn conform(
    name: &str,
    spec: &FeatureSpec,
    raw: ArrayValue,
    bindings: &mut DimBindings,
) -> Result<ArrayValue> {
    let value = cast(raw, spec.kind).ok_or_else(|| {
        FeatureError::invalid(name, format!("expected {} elements", spec.kind))
    })?;
    match &spec.layout {
        Layout::FirstElement => first_element(&value)
            .ok_or_else(|| FeatureError::invalid(name, "empty value list")),
        Layout::Dense(shape) => {
            let dims = shape
                .resolve_with_len(bindings, value.len())
                .map_err(|e| FeatureError::invalid(name, e.to_string()))?;
            for (&dim, &size) in shape.dims().iter().zip(&dims) {
                bindings.bind(dim, size);
            }
            reshape(value, &dims).ok_or_else(|| {
                FeatureError::invalid(name, format!("cannot reshape to {dims:?}"))
            })
        }
    }
}

fn cast(value: ArrayValue, kind: ElementKind) -> Option<ArrayValue> {
    match (value, kind) {
        (v @ ArrayValue::Int(_), ElementKind::Int) => Some(v),
        (v @ ArrayValue::Float(_), ElementKind::Float) => Some(v),
        (v @ ArrayValue::Bytes(_), ElementKind::Bytes) => Some(v),
        (ArrayValue::Int(a), ElementKind::Float) => Some(ArrayValue::Float(a.mapv(|x| x as f32))),
        (ArrayValue::Float(a), ElementKind::Int) => Some(ArrayValue::Int(a.mapv(|x| x as i64))),
        _ => None,
    }
}

fn first_element(value: &ArrayValue) -> Option<ArrayValue> {
    let scalar = IxDyn(&[]);
    match value {
        ArrayValue::Int(a) => a.iter().next().map(|&x| ArrayD::from_elem(scalar, x).into()),
        ArrayValue::Float(a) => a.iter().next().map(|&x| ArrayD::from_elem(scalar, x).into()),
        ArrayValue::Bytes(a) => a.iter().next().map(|x| ArrayD::from_elem(scalar, x.clone()).into()),
    }
}

fn reshape(value: ArrayValue, dims: &[usize]) -> Option<ArrayValue> {
    fn go<T: Clone>(a: ArrayD<T>, dims: &[usize]) -> Option<ArrayD<T>> {
        ArrayD::from_shape_vec(IxDyn(dims), a.iter().cloned().collect()).ok()
    }
    match value {
        ArrayValue::Int(a) => go(a, dims).map(ArrayValue::Int),
        ArrayValue::Float(a) => go(a, dims).map(ArrayValue::Float),
        ArrayValue::Bytes(a) => go(a, dims).map(ArrayValue::Bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Feature;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn example() -> Example {
        let mut one_hot = vec![0.0f32; 2 * 21];
        one_hot[0] = 1.0;
        one_hot[21 + 5] = 1.0;
        Example::new()
            .with("seq_length", Feature::Int64List(vec![2, 2]))
            .with("aatype", Feature::FloatList(one_hot))
            .with("msa", Feature::Int64List(vec![0, 5, 0, 21, 3, 3]))
            .with("deletion_matrix", Feature::FloatList(vec![0.0; 6]))
            .with("sequence", Feature::bytes([b"AQ".to_vec()]))
    }

    #[test]
    fn test_reshape_and_infer_msa_depth() -> Result<()> {
        let features = names(&["msa", "aatype", "seq_length", "sequence"]);
        let dict = ExampleAdapter.to_tensor_dict(&example(), &features, 2)?;
        assert_eq!(dict["msa"].shape(), &[3, 2]);
        assert_eq!(dict["aatype"].shape(), &[2, 21]);
        assert_eq!(dict["seq_length"].shape(), &[] as &[usize]);
        assert_eq!(dict["seq_length"].first_int(), Some(2));
        assert_eq!(dict["sequence"].shape(), &[1]);
        Ok(())
    }

    #[test]
    fn test_adapters_agree() -> Result<()> {
        let features = names(&["msa", "aatype", "deletion_matrix", "seq_length", "sequence"]);
        let ex = example();
        let from_record = ExampleAdapter.to_tensor_dict(&ex, &features, 2)?;
        let from_arrays = ArrayAdapter.to_tensor_dict(&ex.to_array_mapping(), &features, 2)?;
        assert_eq!(from_record, from_arrays);
        Ok(())
    }

    #[test]
    fn test_array_input_shape_is_ignored() -> Result<()> {
        let flat = ArrayAdapter.to_tensor_dict(&example().to_array_mapping(), &names(&["msa"]), 2)?;
        let mut mapping = example().to_array_mapping();
        let msa = ArrayD::from_shape_vec(IxDyn(&[3, 2]), vec![0i64, 5, 0, 21, 3, 3]).unwrap();
        mapping.insert("msa".into(), ArrayValue::Int(msa));
        let shaped = ArrayAdapter.to_tensor_dict(&mapping, &names(&["msa"]), 2)?;
        assert_eq!(shaped["msa"], flat["msa"]);
        Ok(())
    }

    #[test]
    fn test_missing_requested_feature() {
        let err = ExampleAdapter
            .to_tensor_dict(&example(), &names(&["residue_index"]), 2)
            .unwrap_err();
        assert!(matches!(err, FeatureError::MissingField(name) if name == "residue_index"));
    }

    #[test]
    fn test_kind_mismatch_rejected() {
        let ex = example().with("msa", Feature::bytes([b"xx".to_vec()]));
        let err = ExampleAdapter.to_tensor_dict(&ex, &names(&["msa"]), 2).unwrap_err();
        assert!(matches!(err, FeatureError::InvalidFeature { .. }));
    }

    #[test]
    fn test_bad_element_count_rejected() {
        let ex = example().with("residue_index", Feature::Int64List(vec![0, 1, 2]));
        let err = ExampleAdapter
            .to_tensor_dict(&ex, &names(&["residue_index"]), 2)
            .unwrap_err();
        assert!(matches!(err, FeatureError::InvalidFeature { .. }));
    }

    #[test]
    fn test_msa_depth_must_agree() {
        let features = names(&["msa", "deletion_matrix"]);
        for rows in [2, 6] {
            let ex = example().with("deletion_matrix", Feature::FloatList(vec![0.0; rows * 2]));
            let err = ExampleAdapter.to_tensor_dict(&ex, &features, 2).unwrap_err();
            assert!(
                matches!(&err, FeatureError::InvalidFeature { name, .. } if name == "deletion_matrix"),
                "{rows} rows: {err}"
            );
        }
    }
}
