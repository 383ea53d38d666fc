//! Dense host arrays used for in-memory inputs and intermediate tensors.
use crate::schema::ElementKind;
use candle_core::{Device, Tensor};
use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn, Slice};

/// A named feature's value: a dense array of integers, floats or byte
/// strings.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayValue {
    Int(ArrayD<i64>),
    Float(ArrayD<f32>),
    Bytes(ArrayD<Vec<u8>>),
}

impl ArrayValue {
    pub fn shape(&self) -> &[usize] {
        match self {
            ArrayValue::Int(a) => a.shape(),
            ArrayValue::Float(a) => a.shape(),
            ArrayValue::Bytes(a) => a.shape(),
        }
    }

    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> ElementKind {
        match self {
            ArrayValue::Int(_) => ElementKind::Int,
            ArrayValue::Float(_) => ElementKind::Float,
            ArrayValue::Bytes(_) => ElementKind::Bytes,
        }
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, ArrayValue::Bytes(_))
    }

    pub fn as_int(&self) -> Option<&ArrayD<i64>> {
        match self {
            ArrayValue::Int(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<&ArrayD<f32>> {
        match self {
            ArrayValue::Float(a) => Some(a),
            _ => None,
        }
    }

    /// First element as an integer, if the array is numeric and non-empty.
    pub fn first_int(&self) -> Option<i64> {
        match self {
            ArrayValue::Int(a) => a.iter().next().copied(),
            ArrayValue::Float(a) => a.iter().next().map(|&v| v as i64),
            ArrayValue::Bytes(_) => None,
        }
    }

    /// Gather `indices` along `axis`.
    pub fn take(&self, axis: usize, indices: &[usize]) -> ArrayValue {
        match self {
            ArrayValue::Int(a) => ArrayValue::Int(take(a, axis, indices)),
            ArrayValue::Float(a) => ArrayValue::Float(take(a, axis, indices)),
            ArrayValue::Bytes(a) => ArrayValue::Bytes(take(a, axis, indices)),
        }
    }

    /// Keep `len` entries starting at `start` along `axis`.
    pub fn crop(&self, axis: usize, start: usize, len: usize) -> ArrayValue {
        match self {
            ArrayValue::Int(a) => ArrayValue::Int(crop(a.view(), axis, start, len)),
            ArrayValue::Float(a) => ArrayValue::Float(crop(a.view(), axis, start, len)),
            ArrayValue::Bytes(a) => ArrayValue::Bytes(crop(a.view(), axis, start, len)),
        }
    }

    /// Zero-pad (empty for byte strings) up to `target`. Returns `None` when
    /// the rank differs or a dimension already exceeds its target.
    pub fn pad_to(&self, target: &[usize]) -> Option<ArrayValue> {
        match self {
            ArrayValue::Int(a) => pad_to(a, target, 0).map(ArrayValue::Int),
            ArrayValue::Float(a) => pad_to(a, target, 0.0).map(ArrayValue::Float),
            ArrayValue::Bytes(a) => pad_to(a, target, Vec::new()).map(ArrayValue::Bytes),
        }
    }

    /// Stack same-kind, same-shape values along a new leading axis.
    pub fn stack(values: &[ArrayValue]) -> Option<ArrayValue> {
        let first = values.first()?;
        match first {
            ArrayValue::Int(_) => {
                let views: Option<Vec<_>> = values.iter().map(|v| v.as_int().map(|a| a.view())).collect();
                ndarray::stack(Axis(0), &views?).ok().map(ArrayValue::Int)
            }
            ArrayValue::Float(_) => {
                let views: Option<Vec<_>> = values.iter().map(|v| v.as_float().map(|a| a.view())).collect();
                ndarray::stack(Axis(0), &views?).ok().map(ArrayValue::Float)
            }
            ArrayValue::Bytes(_) => {
                let views: Option<Vec<_>> = values
                    .iter()
                    .map(|v| match v {
                        ArrayValue::Bytes(a) => Some(a.view()),
                        _ => None,
                    })
                    .collect();
                ndarray::stack(Axis(0), &views?).ok().map(ArrayValue::Bytes)
            }
        }
    }

    /// Copy into a CPU tensor. Byte strings have no tensor form.
    pub fn to_tensor(&self, device: &Device) -> candle_core::Result<Option<Tensor>> {
        match self {
            ArrayValue::Int(a) => {
                let data: Vec<i64> = a.iter().copied().collect();
                Tensor::from_vec(data, a.shape().to_vec(), device).map(Some)
            }
            ArrayValue::Float(a) => {
                let data: Vec<f32> = a.iter().copied().collect();
                Tensor::from_vec(data, a.shape().to_vec(), device).map(Some)
            }
            ArrayValue::Bytes(_) => Ok(None),
        }
    }
}

impl From<ArrayD<i64>> for ArrayValue {
    fn from(a: ArrayD<i64>) -> Self {
        ArrayValue::Int(a)
    }
}

impl From<ArrayD<f32>> for ArrayValue {
    fn from(a: ArrayD<f32>) -> Self {
        ArrayValue::Float(a)
    }
}

impl From<ArrayD<Vec<u8>>> for ArrayValue {
    fn from(a: ArrayD<Vec<u8>>) -> Self {
        ArrayValue::Bytes(a)
    }
}

fn take<T: Clone>(a: &ArrayD<T>, axis: usize, indices: &[usize]) -> ArrayD<T> {
    if indices.is_empty() {
        return a.slice_axis(Axis(axis), Slice::from(0..0)).to_owned();
    }
    a.select(Axis(axis), indices)
}

fn crop<T: Clone>(a: ArrayViewD<'_, T>, axis: usize, start: usize, len: usize) -> ArrayD<T> {
    a.slice_axis(Axis(axis), Slice::from(start..start + len))
        .to_owned()
}

fn pad_to<T: Clone>(a: &ArrayD<T>, target: &[usize], fill: T) -> Option<ArrayD<T>> {
    if a.ndim() != target.len() || a.shape().iter().zip(target).any(|(have, want)| have > want) {
        return None;
    }
    if a.shape() == target {
        return Some(a.clone());
    }
    let mut out = ArrayD::from_elem(IxDyn(target), fill);
    out.slice_each_axis_mut(|ax| Slice::from(0..a.shape()[ax.axis.index()]))
        .assign(a);
    Some(out)
}
