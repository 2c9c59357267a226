use std::sync::Arc;

use super::op::Op;
use crate::{
    dtype::DType,
    error::ExecutionError,
    tensor::{DenseTensor, RaggedTensor, SparseTensor, Tensor, TensorData},
};

/// Evaluate `op` on concrete inputs. Placeholders are fed by the caller.
pub(crate) fn evaluate(op: &Op, inputs: &[&Tensor]) -> Result<Tensor, ExecutionError> {
    let tensor = match op {
        Op::Placeholder { .. } => {
            return Err(kernel_error(op, "placeholders must be fed, not evaluated"));
        }
        Op::Const { value } => value.clone(),
        Op::Identity => inputs[0].clone(),
        Op::Size => {
            let outer = inputs[0]
                .outer_dim()
                .ok_or_else(|| kernel_error(op, "input is a scalar"))?;
            DenseTensor::scalar_i64(outer as i64).into()
        }
        Op::Range => {
            let n = scalar_i64(op, inputs[0])?;
            if n < 0 {
                return Err(kernel_error(op, format!("limit must be >= 0, got {n}")));
            }
            DenseTensor::vector(TensorData::Int64((0..n).collect())).into()
        }
        Op::Cast { dtype } => map_values(inputs[0], |data| cast(op, data, *dtype))?,
        Op::ExpandDims { axis } => {
            let x = dense(op, inputs[0])?;
            let mut shape = x.shape().to_vec();
            shape.insert(*axis, 1);
            DenseTensor::try_new(shape, x.data().clone())?.into()
        }
        Op::StringToNumber { dtype } => {
            map_values(inputs[0], |data| string_to_number(op, data, *dtype))?
        }
        Op::StringLength => map_values(inputs[0], |data| {
            let strings = strings(op, data)?;
            Ok(TensorData::Int32(
                strings.iter().map(|s| s.len() as i32).collect(),
            ))
        })?,
        Op::StringSplit { sep } => {
            let x = dense(op, inputs[0])?;
            string_split(strings(op, x.data())?, sep.as_bytes())?.into()
        }
        Op::RaggedValues => DenseTensor::vector(ragged(op, inputs[0])?.values().clone()).into(),
        Op::RaggedValueRowIds => {
            DenseTensor::vector(TensorData::Int64(ragged(op, inputs[0])?.value_rowids())).into()
        }
        Op::RaggedRowLengths => {
            DenseTensor::vector(TensorData::Int64(ragged(op, inputs[0])?.row_lengths())).into()
        }
        Op::RaggedFromTensor => {
            let x = dense(op, inputs[0])?;
            let (rows, cols) = (x.shape()[0], x.shape()[1]);
            RaggedTensor::from_row_lengths(&vec![cols; rows], x.data().clone())?.into()
        }
        Op::RaggedToSparse => {
            let x = ragged(op, inputs[0])?;
            let mut indices = Vec::with_capacity(x.values().len() * 2);
            let mut width = 0;
            for row in 0..x.nrows() {
                let (start, end) = x.row_bounds(row);
                width = width.max(end - start);
                for col in 0..end - start {
                    indices.push(row as i64);
                    indices.push(col as i64);
                }
            }
            SparseTensor::try_new(
                indices,
                x.values().clone(),
                vec![x.nrows() as i64, width as i64],
            )?
            .into()
        }
        Op::Equal => {
            let (a, b) = (dense(op, inputs[0])?, dense(op, inputs[1])?);
            let rhs = broadcast(op, a, b)?;
            DenseTensor::try_new(a.shape().to_vec(), TensorData::Bool(equal(op, a, b, rhs)?))?
                .into()
        }
        Op::Add => {
            let (a, b) = (dense(op, inputs[0])?, dense(op, inputs[1])?);
            let rhs = broadcast(op, a, b)?;
            DenseTensor::try_new(a.shape().to_vec(), add(op, a.data(), b.data(), rhs)?)?.into()
        }
        Op::Select => {
            let cond = dense(op, inputs[0])?;
            let (a, b) = (dense(op, inputs[1])?, dense(op, inputs[2])?);
            if cond.shape() != a.shape() || a.shape() != b.shape() {
                return Err(kernel_error(
                    op,
                    format!(
                        "shapes differ: cond {:?}, a {:?}, b {:?}",
                        cond.shape(),
                        a.shape(),
                        b.shape()
                    ),
                ));
            }
            let TensorData::Bool(mask) = cond.data() else {
                return Err(kernel_error(op, "condition must be bool"));
            };
            let picks: Vec<usize> = mask
                .iter()
                .enumerate()
                .map(|(i, &m)| if m { i } else { i + mask.len() })
                .collect();
            let both = concat(op, a.data(), b.data())?;
            DenseTensor::try_new(a.shape().to_vec(), both.take(&picks))?.into()
        }
        Op::Gather => {
            let params = dense(op, inputs[0])?;
            let indices = dense(op, inputs[1])?
                .data()
                .to_i64_vec()
                .ok_or_else(|| kernel_error(op, "indices must be integral"))?;
            let rows = params.shape()[0];
            let row_size: usize = params.shape()[1..].iter().product();
            let mut picks = Vec::with_capacity(indices.len() * row_size);
            for &index in &indices {
                let row = usize::try_from(index)
                    .ok()
                    .filter(|&r| r < rows)
                    .ok_or_else(|| {
                        kernel_error(op, format!("index {index} out of range [0, {rows})"))
                    })?;
                picks.extend(row * row_size..(row + 1) * row_size);
            }
            let mut shape = params.shape().to_vec();
            shape[0] = indices.len();
            DenseTensor::try_new(shape, params.data().take(&picks))?.into()
        }
        Op::BooleanMask => {
            let x = dense(op, inputs[0])?;
            let TensorData::Bool(mask) = dense(op, inputs[1])?.data() else {
                return Err(kernel_error(op, "mask must be bool"));
            };
            let rows = x.shape()[0];
            if mask.len() != rows {
                return Err(kernel_error(
                    op,
                    format!("mask has {} entries for {rows} rows", mask.len()),
                ));
            }
            let row_size: usize = x.shape()[1..].iter().product();
            let kept: Vec<usize> = (0..rows).filter(|&r| mask[r]).collect();
            let picks: Vec<usize> = kept
                .iter()
                .flat_map(|&r| r * row_size..(r + 1) * row_size)
                .collect();
            let mut shape = x.shape().to_vec();
            shape[0] = kept.len();
            DenseTensor::try_new(shape, x.data().take(&picks))?.into()
        }
        Op::DecodeProtoField { field } => {
            let x = dense(op, inputs[0])?;
            field.decode(strings(op, x.data())?)?.into()
        }
    };
    Ok(tensor)
}

fn kernel_error(op: &Op, detail: impl Into<String>) -> ExecutionError {
    ExecutionError::Kernel {
        op: op.name(),
        detail: detail.into(),
    }
}

fn dense<'a>(op: &Op, t: &'a Tensor) -> Result<&'a DenseTensor, ExecutionError> {
    t.as_dense()
        .ok_or_else(|| kernel_error(op, format!("expected a dense tensor, got {}", t.kind().as_str())))
}

fn ragged<'a>(op: &Op, t: &'a Tensor) -> Result<&'a RaggedTensor, ExecutionError> {
    t.as_ragged()
        .ok_or_else(|| kernel_error(op, format!("expected a ragged tensor, got {}", t.kind().as_str())))
}

fn strings<'a>(op: &Op, data: &'a TensorData) -> Result<&'a [Arc<[u8]>], ExecutionError> {
    data.as_strings()
        .ok_or_else(|| kernel_error(op, format!("expected strings, got {}", data.dtype())))
}

fn scalar_i64(op: &Op, t: &Tensor) -> Result<i64, ExecutionError> {
    let x = dense(op, t)?;
    match x.data().to_i64_vec().as_deref() {
        Some([v]) if x.rank() == 0 => Ok(*v),
        _ => Err(kernel_error(op, "expected an integral scalar")),
    }
}

/// Apply `f` to the flat values of a dense or ragged tensor, keeping its structure.
fn map_values(
    t: &Tensor,
    f: impl FnOnce(&TensorData) -> Result<TensorData, ExecutionError>,
) -> Result<Tensor, ExecutionError> {
    Ok(match t {
        Tensor::Dense(x) => DenseTensor::try_new(x.shape().to_vec(), f(x.data())?)?.into(),
        Tensor::Ragged(x) => RaggedTensor::try_new(x.row_splits().to_vec(), f(x.values())?)?.into(),
        Tensor::Sparse(x) => SparseTensor::try_new(
            x.indices().to_vec(),
            f(x.values())?,
            x.dense_shape().to_vec(),
        )?
        .into(),
    })
}

fn cast(op: &Op, data: &TensorData, to: DType) -> Result<TensorData, ExecutionError> {
    let widened;
    let data = match data {
        TensorData::Bool(v) => {
            widened = TensorData::Int64(v.iter().map(|&b| i64::from(b)).collect());
            &widened
        }
        other => other,
    };
    macro_rules! convert {
        ($v:expr) => {
            match to {
                DType::Bool => TensorData::Bool($v.iter().map(|&x| (x as f64) != 0.0).collect()),
                DType::Int32 => TensorData::Int32($v.iter().map(|&x| x as i32).collect()),
                DType::Int64 => TensorData::Int64($v.iter().map(|&x| x as i64).collect()),
                DType::Float32 => TensorData::Float32($v.iter().map(|&x| x as f32).collect()),
                DType::Float64 => TensorData::Float64($v.iter().map(|&x| x as f64).collect()),
                DType::String => return Err(kernel_error(op, "cannot cast to string")),
            }
        };
    }
    Ok(match data {
        TensorData::Int32(v) => convert!(v),
        TensorData::Int64(v) => convert!(v),
        TensorData::Float32(v) => convert!(v),
        TensorData::Float64(v) => convert!(v),
        TensorData::Bool(_) | TensorData::String(_) => {
            return Err(kernel_error(op, "cannot cast from string"));
        }
    })
}

fn string_to_number(op: &Op, data: &TensorData, to: DType) -> Result<TensorData, ExecutionError> {
    let strings = strings(op, data)?;
    fn parse_all<T: std::str::FromStr>(op: &Op, strings: &[Arc<[u8]>]) -> Result<Vec<T>, ExecutionError> {
        strings
            .iter()
            .map(|s| {
                std::str::from_utf8(s)
                    .ok()
                    .and_then(|text| text.parse::<T>().ok())
                    .ok_or_else(|| {
                        kernel_error(
                            op,
                            format!(
                                "could not convert string to number: '{}'",
                                String::from_utf8_lossy(s)
                            ),
                        )
                    })
            })
            .collect()
    }
    Ok(match to {
        DType::Int32 => TensorData::Int32(parse_all(op, strings)?),
        DType::Int64 => TensorData::Int64(parse_all(op, strings)?),
        DType::Float32 => TensorData::Float32(parse_all(op, strings)?),
        DType::Float64 => TensorData::Float64(parse_all(op, strings)?),
        DType::Bool | DType::String => {
            return Err(kernel_error(op, format!("unsupported target dtype {to}")));
        }
    })
}

fn string_split(strings: &[Arc<[u8]>], sep: &[u8]) -> Result<RaggedTensor, ExecutionError> {
    let mut pieces: Vec<Arc<[u8]>> = Vec::new();
    let mut row_lengths = Vec::with_capacity(strings.len());
    for s in strings {
        let before = pieces.len();
        if sep.is_empty() {
            pieces.extend(
                s.split(u8::is_ascii_whitespace)
                    .filter(|p| !p.is_empty())
                    .map(Arc::from),
            );
        } else {
            let mut start = 0;
            let mut i = 0;
            while i + sep.len() <= s.len() {
                if &s[i..i + sep.len()] == sep {
                    pieces.push(Arc::from(&s[start..i]));
                    i += sep.len();
                    start = i;
                } else {
                    i += 1;
                }
            }
            pieces.push(Arc::from(&s[start..]));
        }
        row_lengths.push(pieces.len() - before);
    }
    Ok(RaggedTensor::from_row_lengths(
        &row_lengths,
        TensorData::String(pieces),
    )?)
}

/// Returns true when `b` is a scalar broadcast over `a`.
fn broadcast(op: &Op, a: &DenseTensor, b: &DenseTensor) -> Result<bool, ExecutionError> {
    if b.rank() == 0 {
        return Ok(true);
    }
    if a.shape() != b.shape() {
        return Err(kernel_error(
            op,
            format!("shapes differ: {:?} vs {:?}", a.shape(), b.shape()),
        ));
    }
    Ok(false)
}

fn equal(op: &Op, a: &DenseTensor, b: &DenseTensor, scalar_rhs: bool) -> Result<Vec<bool>, ExecutionError> {
    let at = |i: usize| if scalar_rhs { 0 } else { i };
    macro_rules! compare {
        ($x:expr, $y:expr) => {
            $x.iter().enumerate().map(|(i, v)| *v == $y[at(i)]).collect()
        };
    }
    Ok(match (a.data(), b.data()) {
        (TensorData::Bool(x), TensorData::Bool(y)) => compare!(x, y),
        (TensorData::Int32(x), TensorData::Int32(y)) => compare!(x, y),
        (TensorData::Int64(x), TensorData::Int64(y)) => compare!(x, y),
        (TensorData::Float32(x), TensorData::Float32(y)) => compare!(x, y),
        (TensorData::Float64(x), TensorData::Float64(y)) => compare!(x, y),
        (TensorData::String(x), TensorData::String(y)) => compare!(x, y),
        (x, y) => {
            return Err(kernel_error(
                op,
                format!("dtype mismatch: {} vs {}", x.dtype(), y.dtype()),
            ));
        }
    })
}

fn add(op: &Op, a: &TensorData, b: &TensorData, scalar_rhs: bool) -> Result<TensorData, ExecutionError> {
    let at = |i: usize| if scalar_rhs { 0 } else { i };
    Ok(match (a, b) {
        (TensorData::Int32(x), TensorData::Int32(y)) => TensorData::Int32(
            x.iter().enumerate().map(|(i, v)| v.wrapping_add(y[at(i)])).collect(),
        ),
        (TensorData::Int64(x), TensorData::Int64(y)) => TensorData::Int64(
            x.iter().enumerate().map(|(i, v)| v.wrapping_add(y[at(i)])).collect(),
        ),
        (TensorData::Float32(x), TensorData::Float32(y)) => {
            TensorData::Float32(x.iter().enumerate().map(|(i, v)| v + y[at(i)]).collect())
        }
        (TensorData::Float64(x), TensorData::Float64(y)) => {
            TensorData::Float64(x.iter().enumerate().map(|(i, v)| v + y[at(i)]).collect())
        }
        (x, y) => {
            return Err(kernel_error(
                op,
                format!("cannot add {} and {}", x.dtype(), y.dtype()),
            ));
        }
    })
}

fn concat(op: &Op, a: &TensorData, b: &TensorData) -> Result<TensorData, ExecutionError> {
    fn join<T: Clone>(x: &[T], y: &[T]) -> Vec<T> {
        x.iter().chain(y).cloned().collect()
    }
    Ok(match (a, b) {
        (TensorData::Bool(x), TensorData::Bool(y)) => TensorData::Bool(join(x, y)),
        (TensorData::Int32(x), TensorData::Int32(y)) => TensorData::Int32(join(x, y)),
        (TensorData::Int64(x), TensorData::Int64(y)) => TensorData::Int64(join(x, y)),
        (TensorData::Float32(x), TensorData::Float32(y)) => TensorData::Float32(join(x, y)),
        (TensorData::Float64(x), TensorData::Float64(y)) => TensorData::Float64(join(x, y)),
        (TensorData::String(x), TensorData::String(y)) => TensorData::String(join(x, y)),
        (x, y) => {
            return Err(kernel_error(
                op,
                format!("dtype mismatch: {} vs {}", x.dtype(), y.dtype()),
            ));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(items: &[&str]) -> Tensor {
        Tensor::records(items.iter().map(|s| s.as_bytes()))
    }

    #[test]
    fn string_split_keeps_empty_pieces_with_explicit_separator() {
        let out = evaluate(&Op::StringSplit { sep: ",".into() }, &[&records(&["a,,b", ""])]).unwrap();
        let ragged = out.as_ragged().unwrap();
        assert_eq!(ragged.row_splits(), &[0, 3, 4]);
    }

    #[test]
    fn string_split_on_whitespace_drops_empty_pieces() {
        let out = evaluate(&Op::StringSplit { sep: String::new() }, &[&records(&["  a  b ", ""])]).unwrap();
        assert_eq!(out.as_ragged().unwrap().row_splits(), &[0, 2, 2]);
    }

    #[test]
    fn string_to_number_reports_the_offending_string() {
        let err = evaluate(&Op::StringToNumber { dtype: DType::Int64 }, &[&records(&["1", "x"])])
            .unwrap_err();
        assert!(err.to_string().contains("'x'"));
    }

    #[test]
    fn gather_checks_bounds() {
        let params = Tensor::from(DenseTensor::vector(TensorData::Int64(vec![10, 20])));
        let indices = Tensor::from(DenseTensor::vector(TensorData::Int64(vec![1, 2])));
        let err = evaluate(&Op::Gather, &[&params, &indices]).unwrap_err();
        assert!(err.to_string().contains("index 2 out of range"));
    }

    #[test]
    fn select_picks_elementwise() {
        let cond = Tensor::from(DenseTensor::vector(TensorData::Bool(vec![true, false])));
        let a = Tensor::from(DenseTensor::vector(TensorData::Int64(vec![1, 2])));
        let b = Tensor::from(DenseTensor::vector(TensorData::Int64(vec![-1, -2])));
        let out = evaluate(&Op::Select, &[&cond, &a, &b]).unwrap();
        assert_eq!(out.as_dense().unwrap().data(), &TensorData::Int64(vec![1, -2]));
    }

    #[test]
    fn ragged_to_sparse_uses_widest_row() {
        let ragged = RaggedTensor::from_row_lengths(&[1, 3], TensorData::Int64(vec![1, 2, 3, 4])).unwrap();
        let out = evaluate(&Op::RaggedToSparse, &[&Tensor::from(ragged)]).unwrap();
        let sparse = out.as_sparse().unwrap();
        assert_eq!(sparse.dense_shape(), &[2, 3]);
        assert_eq!(sparse.index(3), &[1, 2]);
    }
}
