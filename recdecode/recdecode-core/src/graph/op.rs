use serde::{Deserialize, Serialize};

use super::proto::ProtoField;
use crate::{
    dtype::DType,
    error::GraphError,
    spec::{TensorShape, TypeSpec, type_spec_from_value},
    tensor::{Tensor, TensorKind},
};

/// Graph operations.
///
/// Only these ops can appear in a decode graph. Conditionals are expressed
/// with [`Op::Select`] and filtering with [`Op::BooleanMask`]; there is no way
/// to embed host control flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    /// Function argument.
    Placeholder { spec: TypeSpec },
    Const { value: Tensor },
    Identity,
    /// Outer dimension of any tensor, as an int64 scalar.
    Size,
    /// `[0, n)` as int64 for an integral scalar `n`.
    Range,
    Cast { dtype: DType },
    ExpandDims { axis: usize },
    StringToNumber { dtype: DType },
    /// Byte length of each string, as int32.
    StringLength,
    /// Split each string of a 1-D tensor. An empty separator splits on ASCII
    /// whitespace and drops empty pieces.
    StringSplit { sep: String },
    RaggedValues,
    RaggedValueRowIds,
    RaggedRowLengths,
    /// Dense `[n, m]` to ragged `[n, (m)]`.
    RaggedFromTensor,
    RaggedToSparse,
    Equal,
    /// `select(cond, a, b)`: elementwise `a` where `cond` is true, else `b`.
    Select,
    Add,
    /// Gather rows of `params` (first input) at `indices` (second input).
    Gather,
    /// Keep the rows of the first input where the 1-D bool mask is true.
    BooleanMask,
    /// Decode one field of a protobuf message from each record.
    DecodeProtoField { field: ProtoField },
}

impl Op {
    pub fn name(&self) -> &'static str {
        match self {
            Op::Placeholder { .. } => "Placeholder",
            Op::Const { .. } => "Const",
            Op::Identity => "Identity",
            Op::Size => "Size",
            Op::Range => "Range",
            Op::Cast { .. } => "Cast",
            Op::ExpandDims { .. } => "ExpandDims",
            Op::StringToNumber { .. } => "StringToNumber",
            Op::StringLength => "StringLength",
            Op::StringSplit { .. } => "StringSplit",
            Op::RaggedValues => "RaggedValues",
            Op::RaggedValueRowIds => "RaggedValueRowIds",
            Op::RaggedRowLengths => "RaggedRowLengths",
            Op::RaggedFromTensor => "RaggedFromTensor",
            Op::RaggedToSparse => "RaggedToSparse",
            Op::Equal => "Equal",
            Op::Select => "Select",
            Op::Add => "Add",
            Op::Gather => "Gather",
            Op::BooleanMask => "BooleanMask",
            Op::DecodeProtoField { .. } => "DecodeProtoField",
        }
    }

    fn arity(&self) -> usize {
        match self {
            Op::Placeholder { .. } | Op::Const { .. } => 0,
            Op::Equal | Op::Add | Op::Gather | Op::BooleanMask => 2,
            Op::Select => 3,
            _ => 1,
        }
    }

    fn invalid(&self, detail: impl Into<String>) -> GraphError {
        GraphError::InvalidOperand {
            op: self.name(),
            detail: detail.into(),
        }
    }

    /// Infer the output spec from the input specs.
    pub fn infer(&self, inputs: &[&TypeSpec]) -> Result<TypeSpec, GraphError> {
        if inputs.len() != self.arity() {
            return Err(self.invalid(format!(
                "expects {} input(s), got {}",
                self.arity(),
                inputs.len()
            )));
        }

        match self {
            Op::Placeholder { spec } => Ok(spec.clone()),
            Op::Const { value } => Ok(type_spec_from_value(value)),
            Op::Identity => Ok(inputs[0].clone()),
            Op::Size => {
                if inputs[0].rank() == 0 {
                    return Err(self.invalid("input must have rank >= 1"));
                }
                Ok(TypeSpec::dense(DType::Int64, TensorShape::scalar()))
            }
            Op::Range => {
                let x = self.dense(inputs[0])?;
                if x.rank() != 0 || !x.dtype().is_integral() {
                    return Err(self.invalid(format!("expected an integral scalar, got {x}")));
                }
                Ok(TypeSpec::dense(DType::Int64, TensorShape::unknown_vector()))
            }
            Op::Cast { dtype } => {
                let x = inputs[0];
                if *dtype == DType::String || x.dtype() == DType::String {
                    return Err(self.invalid("cannot cast to or from string"));
                }
                self.with_dtype(x, *dtype)
            }
            Op::ExpandDims { axis } => {
                let x = self.dense(inputs[0])?;
                if *axis > x.rank() {
                    return Err(self.invalid(format!("axis {axis} out of range for {x}")));
                }
                let mut dims = x.shape().dims().to_vec();
                dims.insert(*axis, Some(1));
                Ok(TypeSpec::dense(x.dtype(), TensorShape::new(dims)))
            }
            Op::StringToNumber { dtype } => {
                if !dtype.is_numeric() {
                    return Err(self.invalid(format!("target dtype must be numeric, got {dtype}")));
                }
                self.expect_dtype(inputs[0], DType::String)?;
                self.with_dtype(inputs[0], *dtype)
            }
            Op::StringLength => {
                self.expect_dtype(inputs[0], DType::String)?;
                self.with_dtype(inputs[0], DType::Int32)
            }
            Op::StringSplit { .. } => {
                let x = self.vector(inputs[0])?;
                self.expect_dtype(x, DType::String)?;
                Ok(TypeSpec::ragged(DType::String, outer(x)))
            }
            Op::RaggedValues => {
                let x = self.ragged(inputs[0])?;
                Ok(TypeSpec::dense(x.dtype(), TensorShape::unknown_vector()))
            }
            Op::RaggedValueRowIds => {
                self.ragged(inputs[0])?;
                Ok(TypeSpec::dense(DType::Int64, TensorShape::unknown_vector()))
            }
            Op::RaggedRowLengths => {
                let x = self.ragged(inputs[0])?;
                Ok(TypeSpec::dense(DType::Int64, TensorShape::new(vec![outer(x)])))
            }
            Op::RaggedFromTensor => {
                let x = self.dense(inputs[0])?;
                if x.rank() != 2 {
                    return Err(self.invalid(format!("expected a rank-2 tensor, got {x}")));
                }
                Ok(TypeSpec::ragged(x.dtype(), outer(x)))
            }
            Op::RaggedToSparse => {
                let x = self.ragged(inputs[0])?;
                Ok(TypeSpec::sparse(x.dtype(), TensorShape::new(vec![outer(x), None])))
            }
            Op::Equal | Op::Add => {
                let (a, b) = (self.dense(inputs[0])?, self.dense(inputs[1])?);
                if a.dtype() != b.dtype() {
                    return Err(self.invalid(format!("dtype mismatch: {a} vs {b}")));
                }
                if matches!(self, Op::Add) && !a.dtype().is_numeric() {
                    return Err(self.invalid(format!("expected numeric operands, got {a}")));
                }
                let shape = if b.rank() == 0 {
                    a.shape().clone()
                } else {
                    merge_shapes(a.shape(), b.shape())
                        .ok_or_else(|| self.invalid(format!("incompatible shapes: {a} vs {b}")))?
                };
                let dtype = if matches!(self, Op::Equal) {
                    DType::Bool
                } else {
                    a.dtype()
                };
                Ok(TypeSpec::dense(dtype, shape))
            }
            Op::Select => {
                let cond = self.dense(inputs[0])?;
                let (a, b) = (self.dense(inputs[1])?, self.dense(inputs[2])?);
                self.expect_dtype(cond, DType::Bool)?;
                if a.dtype() != b.dtype() {
                    return Err(self.invalid(format!("branch dtype mismatch: {a} vs {b}")));
                }
                let shape = merge_shapes(a.shape(), b.shape())
                    .and_then(|s| merge_shapes(&s, cond.shape()))
                    .ok_or_else(|| {
                        self.invalid(format!("incompatible shapes: {cond}, {a}, {b}"))
                    })?;
                Ok(TypeSpec::dense(a.dtype(), shape))
            }
            Op::Gather => {
                let params = self.dense(inputs[0])?;
                let indices = self.vector(inputs[1])?;
                if params.rank() == 0 {
                    return Err(self.invalid("params must have rank >= 1"));
                }
                if !indices.dtype().is_integral() {
                    return Err(self.invalid(format!("indices must be integral, got {indices}")));
                }
                let mut dims = params.shape().dims().to_vec();
                dims[0] = outer(indices);
                Ok(TypeSpec::dense(params.dtype(), TensorShape::new(dims)))
            }
            Op::BooleanMask => {
                let x = self.dense(inputs[0])?;
                let mask = self.vector(inputs[1])?;
                self.expect_dtype(mask, DType::Bool)?;
                if x.rank() == 0 {
                    return Err(self.invalid("input must have rank >= 1"));
                }
                if merge_dims(outer(x), outer(mask)).is_none() {
                    return Err(self.invalid(format!("mask {mask} does not match {x}")));
                }
                let mut dims = x.shape().dims().to_vec();
                dims[0] = None;
                Ok(TypeSpec::dense(x.dtype(), TensorShape::new(dims)))
            }
            Op::DecodeProtoField { field } => {
                let x = self.vector(inputs[0])?;
                self.expect_dtype(x, DType::String)?;
                Ok(TypeSpec::ragged(field.dtype(), outer(x)))
            }
        }
    }

    fn dense<'a>(&self, spec: &'a TypeSpec) -> Result<&'a TypeSpec, GraphError> {
        match spec.kind() {
            TensorKind::Dense => Ok(spec),
            _ => Err(self.invalid(format!("expected a dense tensor, got {spec}"))),
        }
    }

    fn vector<'a>(&self, spec: &'a TypeSpec) -> Result<&'a TypeSpec, GraphError> {
        let spec = self.dense(spec)?;
        if spec.rank() != 1 {
            return Err(self.invalid(format!("expected a 1-D tensor, got {spec}")));
        }
        Ok(spec)
    }

    fn ragged<'a>(&self, spec: &'a TypeSpec) -> Result<&'a TypeSpec, GraphError> {
        match spec.kind() {
            TensorKind::Ragged => Ok(spec),
            _ => Err(self.invalid(format!("expected a ragged tensor, got {spec}"))),
        }
    }

    fn expect_dtype(&self, spec: &TypeSpec, dtype: DType) -> Result<(), GraphError> {
        if spec.dtype() != dtype {
            return Err(self.invalid(format!("expected dtype {dtype}, got {spec}")));
        }
        Ok(())
    }

    /// Same representation and shape with a new dtype. Sparse is not supported.
    fn with_dtype(&self, spec: &TypeSpec, dtype: DType) -> Result<TypeSpec, GraphError> {
        match spec {
            TypeSpec::Tensor { shape, .. } => Ok(TypeSpec::dense(dtype, shape.clone())),
            TypeSpec::Ragged { shape, .. } => Ok(TypeSpec::Ragged {
                dtype,
                shape: shape.clone(),
            }),
            TypeSpec::Sparse { .. } => Err(self.invalid(format!(
                "expected a dense or ragged tensor, got {spec}"
            ))),
        }
    }
}

fn outer(spec: &TypeSpec) -> Option<usize> {
    spec.shape().outer().flatten()
}

fn merge_dims(a: Option<usize>, b: Option<usize>) -> Option<Option<usize>> {
    match (a, b) {
        (Some(x), Some(y)) if x != y => None,
        (Some(x), _) | (_, Some(x)) => Some(Some(x)),
        (None, None) => Some(None),
    }
}

fn merge_shapes(a: &TensorShape, b: &TensorShape) -> Option<TensorShape> {
    if a.rank() != b.rank() {
        return None;
    }
    a.dims()
        .iter()
        .zip(b.dims())
        .map(|(&x, &y)| merge_dims(x, y))
        .collect::<Option<Vec<_>>>()
        .map(TensorShape::new)
}
