//! The validated name -> tensor bundle returned by decoders.

use std::collections::{BTreeMap, btree_map};

use crate::{error::ContractError, tensor::Tensor};

/// Decoded outputs keyed by name.
///
/// Construction checks that every tensor has rank >= 1 and that all outer
/// dimensions agree. The shared outer dimension is the output batch size,
/// which need not equal the number of input records.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NamedTensors(BTreeMap<String, Tensor>);

impl NamedTensors {
    pub fn try_new(tensors: BTreeMap<String, Tensor>) -> Result<Self, ContractError> {
        let mut reference: Option<(&str, usize)> = None;
        for (name, tensor) in &tensors {
            let Some(outer) = tensor.outer_dim() else {
                return Err(ContractError::ScalarOutput { name: name.clone() });
            };
            match reference {
                None => reference = Some((name, outer)),
                Some((ref_name, expected)) if expected != outer => {
                    return Err(ContractError::BatchMisaligned {
                        name: name.clone(),
                        reference: ref_name.to_string(),
                        expected,
                        got: outer,
                    });
                }
                Some(_) => {}
            }
        }
        Ok(Self(tensors))
    }

    /// Shared outer dimension; `None` for an empty bundle.
    pub fn batch_size(&self) -> Option<usize> {
        self.0.values().next().and_then(Tensor::outer_dim)
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Tensor> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> BTreeMap<String, Tensor> {
        self.0
    }

    /// Keep only the named outputs. Unknown names are ignored.
    pub fn select<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Self {
        let selected = names
            .into_iter()
            .filter_map(|name| self.0.get(name).map(|t| (name.to_string(), t.clone())))
            .collect();
        Self(selected)
    }

    /// Check 1:1 alignment with `num_records` inputs.
    pub fn check_aligned(&self, num_records: usize) -> Result<(), ContractError> {
        match self.batch_size() {
            Some(rows) if rows != num_records => Err(ContractError::NotRecordAligned {
                rows,
                records: num_records,
            }),
            _ => Ok(()),
        }
    }

    /// Resolve the record index tensor `name` into one source record index per
    /// output row.
    ///
    /// The tensor must be a 2-D integral ragged or sparse tensor where every
    /// row holds at least one value, and every value must address one of the
    /// `num_records` inputs. Only the first value of each row is used.
    pub fn record_index(
        &self,
        name: &str,
        num_records: usize,
    ) -> Result<Vec<usize>, ContractError> {
        let invalid = |detail: String| ContractError::RecordIndexInvalid {
            name: name.to_string(),
            detail,
        };
        let tensor = self.0.get(name).ok_or_else(|| ContractError::RecordIndexMissing {
            name: name.to_string(),
            available: self.0.keys().cloned().collect(),
        })?;
        if tensor.rank() != 2 {
            return Err(invalid(format!("expected rank 2, got rank {}", tensor.rank())));
        }

        let first_values: Vec<Option<i64>> = match tensor {
            Tensor::Dense(_) => {
                return Err(invalid(
                    "expected a ragged or sparse tensor, got a dense tensor".to_string(),
                ));
            }
            Tensor::Ragged(ragged) => {
                let values = ragged.values().to_i64_vec().ok_or_else(|| {
                    invalid(format!("expected integral values, got {}", ragged.values().dtype()))
                })?;
                (0..ragged.nrows())
                    .map(|row| {
                        let (start, end) = ragged.row_bounds(row);
                        (start < end).then(|| values[start])
                    })
                    .collect()
            }
            Tensor::Sparse(sparse) => {
                let values = sparse.values().to_i64_vec().ok_or_else(|| {
                    invalid(format!("expected integral values, got {}", sparse.values().dtype()))
                })?;
                let nrows = sparse.dense_shape()[0] as usize;
                let mut first: Vec<Option<(i64, i64)>> = vec![None; nrows];
                for (i, &value) in values.iter().enumerate() {
                    let coords = sparse.index(i);
                    let slot = &mut first[coords[0] as usize];
                    if slot.is_none_or(|(col, _)| coords[1] < col) {
                        *slot = Some((coords[1], value));
                    }
                }
                first.into_iter().map(|f| f.map(|(_, v)| v)).collect()
            }
        };

        first_values
            .into_iter()
            .enumerate()
            .map(|(row, value)| {
                let value = value.ok_or_else(|| invalid(format!("row {row} has no value")))?;
                usize::try_from(value)
                    .ok()
                    .filter(|&v| v < num_records)
                    .ok_or_else(|| {
                        invalid(format!(
                            "row {row} refers to record {value}, but there are {num_records} records"
                        ))
                    })
            })
            .collect()
    }
}

impl<'a> IntoIterator for &'a NamedTensors {
    type Item = (&'a String, &'a Tensor);
    type IntoIter = btree_map::Iter<'a, String, Tensor>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl TryFrom<BTreeMap<String, Tensor>> for NamedTensors {
    type Error = ContractError;

    fn try_from(value: BTreeMap<String, Tensor>) -> Result<Self, Self::Error> {
        Self::try_new(value)
    }
}
