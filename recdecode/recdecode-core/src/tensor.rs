//! Arrow-independent tensor values produced by decode graphs.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{dtype::DType, error::TensorError};

/// Flat, typed element storage shared by all tensor representations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dtype", content = "values", rename_all = "snake_case")]
pub enum TensorData {
    Bool(Vec<bool>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    String(Vec<Arc<[u8]>>),
}

impl TensorData {
    pub fn empty(dtype: DType) -> Self {
        match dtype {
            DType::Bool => Self::Bool(Vec::new()),
            DType::Int32 => Self::Int32(Vec::new()),
            DType::Int64 => Self::Int64(Vec::new()),
            DType::Float32 => Self::Float32(Vec::new()),
            DType::Float64 => Self::Float64(Vec::new()),
            DType::String => Self::String(Vec::new()),
        }
    }

    /// Build string data from anything byte-like.
    pub fn strings<I, B>(items: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        Self::String(items.into_iter().map(|b| Arc::from(b.as_ref())).collect())
    }

    pub fn dtype(&self) -> DType {
        match self {
            Self::Bool(_) => DType::Bool,
            Self::Int32(_) => DType::Int32,
            Self::Int64(_) => DType::Int64,
            Self::Float32(_) => DType::Float32,
            Self::Float64(_) => DType::Float64,
            Self::String(_) => DType::String,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Bool(v) => v.len(),
            Self::Int32(v) => v.len(),
            Self::Int64(v) => v.len(),
            Self::Float32(v) => v.len(),
            Self::Float64(v) => v.len(),
            Self::String(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Gather elements at `indices`. Callers guarantee every index is in range.
    pub fn take(&self, indices: &[usize]) -> Self {
        fn pick<T: Clone>(v: &[T], indices: &[usize]) -> Vec<T> {
            indices.iter().map(|&i| v[i].clone()).collect()
        }
        match self {
            Self::Bool(v) => Self::Bool(pick(v, indices)),
            Self::Int32(v) => Self::Int32(pick(v, indices)),
            Self::Int64(v) => Self::Int64(pick(v, indices)),
            Self::Float32(v) => Self::Float32(pick(v, indices)),
            Self::Float64(v) => Self::Float64(pick(v, indices)),
            Self::String(v) => Self::String(pick(v, indices)),
        }
    }

    /// Copy of the contiguous range `start..end`.
    pub fn slice(&self, start: usize, end: usize) -> Self {
        match self {
            Self::Bool(v) => Self::Bool(v[start..end].to_vec()),
            Self::Int32(v) => Self::Int32(v[start..end].to_vec()),
            Self::Int64(v) => Self::Int64(v[start..end].to_vec()),
            Self::Float32(v) => Self::Float32(v[start..end].to_vec()),
            Self::Float64(v) => Self::Float64(v[start..end].to_vec()),
            Self::String(v) => Self::String(v[start..end].to_vec()),
        }
    }

    /// Integral elements widened to `i64`; `None` for non-integral data.
    pub fn to_i64_vec(&self) -> Option<Vec<i64>> {
        match self {
            Self::Int32(v) => Some(v.iter().map(|&x| i64::from(x)).collect()),
            Self::Int64(v) => Some(v.clone()),
            _ => None,
        }
    }

    pub fn as_strings(&self) -> Option<&[Arc<[u8]>]> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }
}

/// Row-major dense tensor. A rank-0 tensor is a scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseTensor {
    shape: Vec<usize>,
    data: TensorData,
}

impl DenseTensor {
    pub fn try_new(shape: Vec<usize>, data: TensorData) -> Result<Self, TensorError> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(TensorError::ShapeMismatch {
                shape,
                len: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    /// 1-D tensor holding `data`.
    pub fn vector(data: TensorData) -> Self {
        Self {
            shape: vec![data.len()],
            data,
        }
    }

    /// Scalar string tensor.
    pub fn scalar_string(value: impl AsRef<[u8]>) -> Self {
        Self {
            shape: Vec::new(),
            data: TensorData::strings([value]),
        }
    }

    pub fn scalar_i64(value: i64) -> Self {
        Self {
            shape: Vec::new(),
            data: TensorData::Int64(vec![value]),
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    pub fn into_data(self) -> TensorData {
        self.data
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }
}

/// Rank-2 tensor whose rows have variable length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaggedTensor {
    row_splits: Vec<i64>,
    values: TensorData,
}

impl RaggedTensor {
    pub fn try_new(row_splits: Vec<i64>, values: TensorData) -> Result<Self, TensorError> {
        let Some(&first) = row_splits.first() else {
            return Err(TensorError::InvalidRowSplits(
                "row_splits must not be empty".to_string(),
            ));
        };
        if first != 0 {
            return Err(TensorError::InvalidRowSplits(format!(
                "row_splits must start at 0, got {first}"
            )));
        }
        if row_splits.windows(2).any(|w| w[1] < w[0]) {
            return Err(TensorError::InvalidRowSplits(
                "row_splits must be non-decreasing".to_string(),
            ));
        }
        let last = row_splits[row_splits.len() - 1];
        if last != values.len() as i64 {
            return Err(TensorError::InvalidRowSplits(format!(
                "row_splits end at {last} but there are {} values",
                values.len()
            )));
        }
        Ok(Self { row_splits, values })
    }

    /// Build from per-row lengths over the flat `values`.
    pub fn from_row_lengths(row_lengths: &[usize], values: TensorData) -> Result<Self, TensorError> {
        let mut row_splits = Vec::with_capacity(row_lengths.len() + 1);
        let mut acc = 0i64;
        row_splits.push(acc);
        for &len in row_lengths {
            acc += len as i64;
            row_splits.push(acc);
        }
        Self::try_new(row_splits, values)
    }

    pub fn row_splits(&self) -> &[i64] {
        &self.row_splits
    }

    pub fn values(&self) -> &TensorData {
        &self.values
    }

    pub fn nrows(&self) -> usize {
        self.row_splits.len() - 1
    }

    pub fn row_bounds(&self, row: usize) -> (usize, usize) {
        (
            self.row_splits[row] as usize,
            self.row_splits[row + 1] as usize,
        )
    }

    pub fn row_lengths(&self) -> Vec<i64> {
        self.row_splits.windows(2).map(|w| w[1] - w[0]).collect()
    }

    /// Row index of every value.
    pub fn value_rowids(&self) -> Vec<i64> {
        let mut ids = Vec::with_capacity(self.values.len());
        for (row, w) in self.row_splits.windows(2).enumerate() {
            ids.extend(std::iter::repeat_n(row as i64, (w[1] - w[0]) as usize));
        }
        ids
    }
}

/// Coordinate-format sparse tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseTensor {
    /// Row-major `[nnz, rank]` coordinates.
    indices: Vec<i64>,
    values: TensorData,
    dense_shape: Vec<i64>,
}

impl SparseTensor {
    pub fn try_new(
        indices: Vec<i64>,
        values: TensorData,
        dense_shape: Vec<i64>,
    ) -> Result<Self, TensorError> {
        let rank = dense_shape.len();
        if rank == 0 {
            return Err(TensorError::InvalidSparse(
                "dense_shape must have rank >= 1".to_string(),
            ));
        }
        if indices.len() != values.len() * rank {
            return Err(TensorError::InvalidSparse(format!(
                "{} index components for {} values of rank {rank}",
                indices.len(),
                values.len()
            )));
        }
        for coords in indices.chunks(rank) {
            if coords
                .iter()
                .zip(&dense_shape)
                .any(|(&c, &dim)| c < 0 || c >= dim)
            {
                return Err(TensorError::InvalidSparse(format!(
                    "index {coords:?} out of bounds for dense_shape {dense_shape:?}"
                )));
            }
        }
        Ok(Self {
            indices,
            values,
            dense_shape,
        })
    }

    pub fn rank(&self) -> usize {
        self.dense_shape.len()
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn index(&self, i: usize) -> &[i64] {
        let rank = self.rank();
        &self.indices[i * rank..(i + 1) * rank]
    }

    pub fn indices(&self) -> &[i64] {
        &self.indices
    }

    pub fn values(&self) -> &TensorData {
        &self.values
    }

    pub fn dense_shape(&self) -> &[i64] {
        &self.dense_shape
    }
}

/// Representation kind of a tensor-like value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorKind {
    Dense,
    Ragged,
    Sparse,
}

impl TensorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TensorKind::Dense => "dense",
            TensorKind::Ragged => "ragged",
            TensorKind::Sparse => "sparse",
        }
    }
}

/// A dense tensor or a composite (ragged / sparse) tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Tensor {
    Dense(DenseTensor),
    Ragged(RaggedTensor),
    Sparse(SparseTensor),
}

impl Tensor {
    /// 1-D string tensor, the canonical decoder input.
    pub fn records<I, B>(records: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        Tensor::Dense(DenseTensor::vector(TensorData::strings(records)))
    }

    pub fn kind(&self) -> TensorKind {
        match self {
            Tensor::Dense(_) => TensorKind::Dense,
            Tensor::Ragged(_) => TensorKind::Ragged,
            Tensor::Sparse(_) => TensorKind::Sparse,
        }
    }

    pub fn dtype(&self) -> DType {
        match self {
            Tensor::Dense(t) => t.data().dtype(),
            Tensor::Ragged(t) => t.values().dtype(),
            Tensor::Sparse(t) => t.values().dtype(),
        }
    }

    pub fn rank(&self) -> usize {
        match self {
            Tensor::Dense(t) => t.rank(),
            Tensor::Ragged(_) => 2,
            Tensor::Sparse(t) => t.rank(),
        }
    }

    /// Size of the outermost dimension; `None` for scalars.
    pub fn outer_dim(&self) -> Option<usize> {
        match self {
            Tensor::Dense(t) => t.shape().first().copied(),
            Tensor::Ragged(t) => Some(t.nrows()),
            Tensor::Sparse(t) => t.dense_shape().first().map(|&d| d as usize),
        }
    }

    /// Concrete dimensions; ragged inner dimensions are `None`.
    pub fn dims(&self) -> Vec<Option<usize>> {
        match self {
            Tensor::Dense(t) => t.shape().iter().map(|&d| Some(d)).collect(),
            Tensor::Ragged(t) => vec![Some(t.nrows()), None],
            Tensor::Sparse(t) => t.dense_shape().iter().map(|&d| Some(d as usize)).collect(),
        }
    }

    /// Re-check structural invariants, e.g. after deserialization.
    pub fn validate(&self) -> Result<(), TensorError> {
        match self {
            Tensor::Dense(t) => DenseTensor::try_new(t.shape.clone(), t.data.clone()).map(drop),
            Tensor::Ragged(t) => RaggedTensor::try_new(t.row_splits.clone(), t.values.clone()).map(drop),
            Tensor::Sparse(t) => SparseTensor::try_new(
                t.indices.clone(),
                t.values.clone(),
                t.dense_shape.clone(),
            )
            .map(drop),
        }
    }

    pub fn as_dense(&self) -> Option<&DenseTensor> {
        match self {
            Tensor::Dense(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_ragged(&self) -> Option<&RaggedTensor> {
        match self {
            Tensor::Ragged(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_sparse(&self) -> Option<&SparseTensor> {
        match self {
            Tensor::Sparse(t) => Some(t),
            _ => None,
        }
    }
}

impl From<DenseTensor> for Tensor {
    fn from(value: DenseTensor) -> Self {
        Tensor::Dense(value)
    }
}

impl From<RaggedTensor> for Tensor {
    fn from(value: RaggedTensor) -> Self {
        Tensor::Ragged(value)
    }
}

impl From<SparseTensor> for Tensor {
    fn from(value: SparseTensor) -> Self {
        Tensor::Sparse(value)
    }
}
