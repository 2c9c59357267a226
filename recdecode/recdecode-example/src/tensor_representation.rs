//! Tensor representations: how logical tensors are rebuilt from columns.
//!
//! A schema may carry explicit representations under a named group. When it
//! does not, representations are inferred from the features: fixed-shape
//! features become dense tensors and everything else a var-len sparse tensor.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{
    error::ExampleCodecError,
    schema::{Schema, TensorRepresentationGroup},
};

/// Group name used when none is given.
pub const DEFAULT_TENSOR_REPRESENTATION_GROUP: &str = "";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultValue {
    IntValue(i64),
    FloatValue(f64),
    BytesValue(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TensorRepresentation {
    DenseTensor {
        column_name: String,
        #[serde(default)]
        shape: Vec<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default_value: Option<DefaultValue>,
    },
    VarLenSparseTensor {
        column_name: String,
    },
    SparseTensor {
        dense_shape: Vec<usize>,
        index_column_names: Vec<String>,
        value_column_name: String,
    },
    RaggedTensor {
        feature_path: Vec<String>,
    },
}

pub type TensorRepresentations = BTreeMap<String, TensorRepresentation>;

/// Representations stored in `schema` under `group`, if the group exists.
pub fn get_tensor_representations_from_schema(
    schema: &Schema,
    group: &str,
) -> Option<TensorRepresentations> {
    schema
        .tensor_representation_group
        .get(group)
        .map(|g| g.tensor_representation.clone())
}

/// One representation per feature, named after the feature.
pub fn infer_tensor_representations_from_schema(schema: &Schema) -> TensorRepresentations {
    schema
        .feature
        .iter()
        .map(|feature| {
            let representation = match &feature.shape {
                Some(shape) => TensorRepresentation::DenseTensor {
                    column_name: feature.name.clone(),
                    shape: shape.dims(),
                    default_value: None,
                },
                None => TensorRepresentation::VarLenSparseTensor {
                    column_name: feature.name.clone(),
                },
            };
            (feature.name.clone(), representation)
        })
        .collect()
}

/// Explicit representations from the default group, otherwise inferred ones.
pub fn tensor_representations_for_schema(schema: &Schema) -> TensorRepresentations {
    get_tensor_representations_from_schema(schema, DEFAULT_TENSOR_REPRESENTATION_GROUP)
        .unwrap_or_else(|| infer_tensor_representations_from_schema(schema))
}

/// Names of the columns a representation reads.
pub fn get_source_columns_from_tensor_representation(
    representation: &TensorRepresentation,
) -> Vec<String> {
    match representation {
        TensorRepresentation::DenseTensor { column_name, .. }
        | TensorRepresentation::VarLenSparseTensor { column_name } => vec![column_name.clone()],
        TensorRepresentation::SparseTensor {
            index_column_names,
            value_column_name,
            ..
        } => index_column_names
            .iter()
            .chain(std::iter::once(value_column_name))
            .cloned()
            .collect(),
        TensorRepresentation::RaggedTensor { feature_path } => {
            feature_path.first().cloned().into_iter().collect()
        }
    }
}

/// Replace the representations stored under `group`.
pub fn set_tensor_representations_in_schema(
    schema: &mut Schema,
    representations: TensorRepresentations,
    group: &str,
) {
    schema.tensor_representation_group.insert(
        group.to_string(),
        TensorRepresentationGroup {
            tensor_representation: representations,
        },
    );
}

/// Reduce `schema` to the features needed by `tensor_names`.
///
/// Features keep their original order. The result carries exactly the requested
/// representations in the default group, so projecting it again is stable.
pub fn project_schema<S: AsRef<str>>(
    schema: &Schema,
    tensor_names: &[S],
) -> Result<Schema, ExampleCodecError> {
    let representations = tensor_representations_for_schema(schema);
    let requested: BTreeSet<&str> = tensor_names.iter().map(|s| s.as_ref()).collect();
    let unknown: Vec<String> = requested
        .iter()
        .copied()
        .filter(|name| !representations.contains_key(*name))
        .map(|name| name.to_string())
        .collect();
    if !unknown.is_empty() {
        return Err(ExampleCodecError::UnknownTensors {
            unknown,
            available: representations.keys().cloned().collect(),
        });
    }

    let projected: TensorRepresentations = representations
        .into_iter()
        .filter(|(name, _)| requested.contains(name.as_str()))
        .collect();
    let columns: BTreeSet<String> = projected
        .values()
        .flat_map(get_source_columns_from_tensor_representation)
        .collect();

    let mut result = Schema::new(
        schema
            .feature
            .iter()
            .filter(|f| columns.contains(&f.name))
            .cloned()
            .collect(),
    );
    set_tensor_representations_in_schema(
        &mut result,
        projected,
        DEFAULT_TENSOR_REPRESENTATION_GROUP,
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn representation_json_is_externally_tagged() {
        let json = r#"{ "sparse_tensor": {
            "dense_shape": [10],
            "index_column_names": ["idx"],
            "value_column_name": "val"
        } }"#;
        let representation: TensorRepresentation = serde_json::from_str(json).unwrap();
        assert_eq!(
            get_source_columns_from_tensor_representation(&representation),
            vec!["idx".to_string(), "val".to_string()]
        );
    }
}
