//! Raw inputs: typed example records and in-memory array mappings.
use crate::array::ArrayValue;
use crate::error::Result;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;
use std::collections::BTreeMap;

/// One typed value list of an [`Example`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Int64List(Vec<i64>),
    FloatList(Vec<f32>),
    BytesList(Vec<ByteBuf>),
}

impl Feature {
    pub fn bytes<I, B>(values: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Vec<u8>>,
    {
        Feature::BytesList(values.into_iter().map(|b| ByteBuf::from(b.into())).collect())
    }

    pub fn len(&self) -> usize {
        match self {
            Feature::Int64List(v) => v.len(),
            Feature::FloatList(v) => v.len(),
            Feature::BytesList(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flat, one-dimensional array form of the list.
    pub fn to_array(&self) -> ArrayValue {
        match self {
            Feature::Int64List(v) => ArrayValue::Int(Array1::from(v.clone()).into_dyn()),
            Feature::FloatList(v) => ArrayValue::Float(Array1::from(v.clone()).into_dyn()),
            Feature::BytesList(v) => {
                ArrayValue::Bytes(v.iter().map(|b| b.to_vec()).collect::<Array1<_>>().into_dyn())
            }
        }
    }
}

/// A flat collection of named, typed value lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub features: BTreeMap<String, Feature>,
}

impl Example {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, feature: Feature) -> Self {
        self.features.insert(name.to_string(), feature);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Feature> {
        self.features.get(name)
    }

    pub fn insert(&mut self, name: &str, feature: Feature) -> Option<Feature> {
        self.features.insert(name.to_string(), feature)
    }

    pub fn remove(&mut self, name: &str) -> Option<Feature> {
        self.features.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.features.contains_key(name)
    }

    /// Serialized form of the record.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// The same logical example as an array mapping of flat arrays.
    pub fn to_array_mapping(&self) -> ArrayMapping {
        self.features
            .iter()
            .map(|(name, feature)| (name.clone(), feature.to_array()))
            .collect()
    }
}

/// In-memory example: feature name to dense array.
pub type ArrayMapping = BTreeMap<String, ArrayValue>;

#[cfg(test)]
mod tests {
    use super::*;

    fn example() -> Example {
        Example::new()
            .with("seq_length", Feature::Int64List(vec![3, 3, 3]))
            .with("deletion_matrix", Feature::FloatList(vec![0.0, 1.0, 2.0]))
            .with("sequence", Feature::bytes([b"MKV".to_vec()]))
    }

    #[test]
    fn test_serialized_record_round_trip() -> Result<()> {
        let ex = example();
        let restored = Example::from_bytes(&ex.to_bytes()?)?;
        assert_eq!(restored, ex);
        Ok(())
    }

    #[test]
    fn test_malformed_bytes_rejected() {
        assert!(Example::from_bytes(b"{not json").is_err());
    }

    #[test]
    fn test_to_array_mapping() {
        let mapping = example().to_array_mapping();
        assert_eq!(mapping["seq_length"].first_int(), Some(3));
        assert_eq!(mapping["deletion_matrix"].shape(), &[3]);
        assert!(!mapping["sequence"].is_numeric());
    }
}
