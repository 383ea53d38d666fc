//! Shape contracts with symbolic dimensions.
//!
//! A [`FeatureShape`] is declared once (in the base config or the input schema)
//! and bound to concrete sizes on every preprocessing call through a
//! [`DimBindings`].
use serde::{Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// One dimension of a declared feature shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dim {
    Literal(usize),
    NumRes,
    NumMsaSeq,
    NumExtraSeq,
    NumTemplates,
}

pub const NUM_RES: Dim = Dim::NumRes;
pub const NUM_MSA_SEQ: Dim = Dim::NumMsaSeq;
pub const NUM_EXTRA_SEQ: Dim = Dim::NumExtraSeq;
pub const NUM_TEMPLATES: Dim = Dim::NumTemplates;

impl From<usize> for Dim {
    fn from(n: usize) -> Self {
        Dim::Literal(n)
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dim::Literal(n) => write!(f, "{n}"),
            Dim::NumRes => f.write_str("num residues placeholder"),
            Dim::NumMsaSeq => f.write_str("msa placeholder"),
            Dim::NumExtraSeq => f.write_str("extra msa placeholder"),
            Dim::NumTemplates => f.write_str("num templates placeholder"),
        }
    }
}

impl Serialize for Dim {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Dim::Literal(n) => serializer.serialize_u64(*n as u64),
            other => serializer.collect_str(other),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ShapeError {
    #[error("shape {shape} uses {dim} but it is not bound")]
    Unbound { shape: FeatureShape, dim: Dim },

    #[error("shape {shape} has more than one unbound dimension")]
    Ambiguous { shape: FeatureShape },

    #[error("{len} elements cannot be arranged as {shape}")]
    Incompatible { shape: FeatureShape, len: usize },
}

/// Concrete sizes for the four placeholders of a single example.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DimBindings {
    pub num_res: Option<usize>,
    pub num_msa_seq: Option<usize>,
    pub num_extra_seq: Option<usize>,
    pub num_templates: Option<usize>,
}

impl DimBindings {
    pub fn with_num_res(num_res: usize) -> Self {
        Self {
            num_res: Some(num_res),
            ..Default::default()
        }
    }

    pub fn lookup(&self, dim: Dim) -> Option<usize> {
        match dim {
            Dim::Literal(n) => Some(n),
            Dim::NumRes => self.num_res,
            Dim::NumMsaSeq => self.num_msa_seq,
            Dim::NumExtraSeq => self.num_extra_seq,
            Dim::NumTemplates => self.num_templates,
        }
    }

    /// Record `size` for a placeholder that is still unbound. Literals and
    /// already bound placeholders keep their value.
    pub fn bind(&mut self, dim: Dim, size: usize) {
        let slot = match dim {
            Dim::Literal(_) => return,
            Dim::NumRes => &mut self.num_res,
            Dim::NumMsaSeq => &mut self.num_msa_seq,
            Dim::NumExtraSeq => &mut self.num_extra_seq,
            Dim::NumTemplates => &mut self.num_templates,
        };
        slot.get_or_insert(size);
    }
}

/// An ordered list of dimensions, each literal or symbolic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct FeatureShape(Vec<Dim>);

impl FeatureShape {
    pub fn new(dims: Vec<Dim>) -> Self {
        Self(dims)
    }

    pub fn dims(&self) -> &[Dim] {
        &self.0
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Bind every placeholder. Fails if one the shape uses is unbound.
    pub fn resolve(&self, bindings: &DimBindings) -> Result<Vec<usize>, ShapeError> {
        self.0
            .iter()
            .map(|&dim| {
                bindings.lookup(dim).ok_or_else(|| ShapeError::Unbound {
                    shape: self.clone(),
                    dim,
                })
            })
            .collect()
    }

    /// Bind the placeholders, inferring at most one unbound dimension from the
    /// total element count (the `-1` of a reshape).
    pub fn resolve_with_len(
        &self,
        bindings: &DimBindings,
        len: usize,
    ) -> Result<Vec<usize>, ShapeError> {
        let known: Vec<Option<usize>> = self.0.iter().map(|&d| bindings.lookup(d)).collect();
        let unknown = known.iter().filter(|d| d.is_none()).count();
        if unknown > 1 {
            return Err(ShapeError::Ambiguous {
                shape: self.clone(),
            });
        }
        let product: usize = known.iter().flatten().product();
        let incompatible = || ShapeError::Incompatible {
            shape: self.clone(),
            len,
        };
        let inferred = if unknown == 1 {
            if product == 0 || len % product != 0 {
                return Err(incompatible());
            }
            len / product
        } else {
            if product != len {
                return Err(incompatible());
            }
            0
        };
        Ok(known.into_iter().map(|d| d.unwrap_or(inferred)).collect())
    }
}

impl fmt::Display for FeatureShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, dim) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{dim}")?;
        }
        f.write_str("]")
    }
}

/// Build a [`FeatureShape`] from placeholders and literal sizes.
///
/// ```
/// use rarefold_config::{shape, FeatureShape, Dim, NUM_RES};
/// let s: FeatureShape = shape![NUM_RES, 37, 3];
/// assert_eq!(s.dims()[1], Dim::Literal(37));
/// ```
#[macro_export]
macro_rules! shape {
    ($($dim:expr),* $(,)?) => {
        $crate::FeatureShape::new(vec![$($crate::Dim::from($dim)),*])
    };
}
