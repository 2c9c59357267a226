//! Structural type descriptors for tensor-like values.

use std::{
    collections::BTreeMap,
    fmt::{self, Display, Formatter, Write as _},
};

use serde::{Deserialize, Serialize};

use crate::{
    dtype::DType,
    tensor::{Tensor, TensorKind},
};

/// Tensor shape where `None` marks a dimension unknown at trace time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TensorShape(pub Vec<Option<usize>>);

impl TensorShape {
    pub fn new(dims: Vec<Option<usize>>) -> Self {
        Self(dims)
    }

    pub fn scalar() -> Self {
        Self(Vec::new())
    }

    /// `[None]`: a 1-D tensor of unknown length.
    pub fn unknown_vector() -> Self {
        Self(vec![None])
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    pub fn dims(&self) -> &[Option<usize>] {
        &self.0
    }

    pub fn outer(&self) -> Option<Option<usize>> {
        self.0.first().copied()
    }

    /// Every known dimension matches; unknown dimensions match anything.
    pub fn is_compatible_with(&self, dims: &[Option<usize>]) -> bool {
        self.0.len() == dims.len()
            && self.0.iter().zip(dims).all(|(expected, got)| match (expected, got) {
                (Some(e), Some(g)) => e == g,
                _ => true,
            })
    }
}

impl Display for TensorShape {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_char('[')?;
        for (i, dim) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match dim {
                Some(d) => write!(f, "{d}")?,
                None => f.write_str("None")?,
            }
        }
        f.write_char(']')
    }
}

/// Shape, dtype and representation of a tensor-like value.
///
/// Specs are derived from traced graphs and never describe actual data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeSpec {
    Tensor { dtype: DType, shape: TensorShape },
    Ragged { dtype: DType, shape: TensorShape },
    Sparse { dtype: DType, shape: TensorShape },
}

impl TypeSpec {
    pub fn dense(dtype: DType, shape: TensorShape) -> Self {
        TypeSpec::Tensor { dtype, shape }
    }

    /// Rank-2 ragged spec with the given outer dimension.
    pub fn ragged(dtype: DType, nrows: Option<usize>) -> Self {
        TypeSpec::Ragged {
            dtype,
            shape: TensorShape(vec![nrows, None]),
        }
    }

    pub fn sparse(dtype: DType, shape: TensorShape) -> Self {
        TypeSpec::Sparse { dtype, shape }
    }

    pub fn kind(&self) -> TensorKind {
        match self {
            TypeSpec::Tensor { .. } => TensorKind::Dense,
            TypeSpec::Ragged { .. } => TensorKind::Ragged,
            TypeSpec::Sparse { .. } => TensorKind::Sparse,
        }
    }

    pub fn dtype(&self) -> DType {
        match self {
            TypeSpec::Tensor { dtype, .. }
            | TypeSpec::Ragged { dtype, .. }
            | TypeSpec::Sparse { dtype, .. } => *dtype,
        }
    }

    pub fn shape(&self) -> &TensorShape {
        match self {
            TypeSpec::Tensor { shape, .. }
            | TypeSpec::Ragged { shape, .. }
            | TypeSpec::Sparse { shape, .. } => shape,
        }
    }

    pub fn rank(&self) -> usize {
        self.shape().rank()
    }

    /// Whether this spec could describe a record index tensor.
    pub fn is_record_index_compatible(&self) -> bool {
        matches!(self.kind(), TensorKind::Ragged | TensorKind::Sparse)
            && self.rank() == 2
            && self.dtype().is_integral()
    }

    /// Whether a concrete value conforms to this spec.
    pub fn is_compatible_with(&self, value: &Tensor) -> bool {
        self.kind() == value.kind()
            && self.dtype() == value.dtype()
            && self.shape().is_compatible_with(&value.dims())
    }
}

impl Display for TypeSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self.kind() {
            TensorKind::Dense => "TensorSpec",
            TensorKind::Ragged => "RaggedTensorSpec",
            TensorKind::Sparse => "SparseTensorSpec",
        };
        write!(f, "{name}(shape={}, dtype={})", self.shape(), self.dtype())
    }
}

/// Output name -> spec mapping, ordered by name.
pub type TypeSpecs = BTreeMap<String, TypeSpec>;

/// Describe a concrete value; every dimension is known except ragged rows.
pub fn type_spec_from_value(value: &Tensor) -> TypeSpec {
    let shape = TensorShape(value.dims());
    match value.kind() {
        TensorKind::Dense => TypeSpec::dense(value.dtype(), shape),
        TensorKind::Ragged => TypeSpec::Ragged {
            dtype: value.dtype(),
            shape,
        },
        TensorKind::Sparse => TypeSpec::sparse(value.dtype(), shape),
    }
}

/// Render specs one per line: `name: RaggedTensorSpec(shape=[None, None], dtype=int64)`.
pub fn format_type_specs(specs: &TypeSpecs) -> Result<String, fmt::Error> {
    let mut out = String::new();
    for (name, spec) in specs {
        writeln!(out, "{name}: {spec}")?;
    }
    Ok(out)
}
