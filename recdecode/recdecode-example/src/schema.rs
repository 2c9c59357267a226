//! The dataset schema: the features a tf.Example batch is expected to carry.
//!
//! Schemas are plain JSON documents:
//!
//! ```json
//! {
//!   "feature": [
//!     { "name": "age", "type": "INT", "shape": { "dim": [{ "size": 1 }] } },
//!     { "name": "tags", "type": "BYTES" }
//!   ]
//! }
//! ```

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt, fs,
    path::Path,
};

use recdecode_core::DType;
use serde::{Deserialize, Serialize};

use crate::{error::ExampleCodecError, tensor_representation::TensorRepresentations};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FeatureType {
    Int,
    Float,
    Bytes,
}

impl FeatureType {
    /// Element dtype of a feature of this type.
    pub fn dtype(self) -> DType {
        match self {
            FeatureType::Int => DType::Int64,
            FeatureType::Float => DType::Float32,
            FeatureType::Bytes => DType::String,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FeatureType::Int => "INT",
            FeatureType::Float => "FLOAT",
            FeatureType::Bytes => "BYTES",
        }
    }
}

impl fmt::Display for FeatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedDim {
    pub size: usize,
}

/// Every example carries exactly `product(dim)` values for the feature.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedShape {
    #[serde(default)]
    pub dim: Vec<FixedDim>,
}

impl FixedShape {
    pub fn new(dims: impl IntoIterator<Item = usize>) -> Self {
        Self {
            dim: dims.into_iter().map(|size| FixedDim { size }).collect(),
        }
    }

    pub fn dims(&self) -> Vec<usize> {
        self.dim.iter().map(|d| d.size).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub name: String,
    #[serde(rename = "type")]
    pub feature_type: FeatureType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<FixedShape>,
}

impl Feature {
    pub fn new(name: impl Into<String>, feature_type: FeatureType) -> Self {
        Self {
            name: name.into(),
            feature_type,
            shape: None,
        }
    }

    pub fn with_shape(mut self, dims: impl IntoIterator<Item = usize>) -> Self {
        self.shape = Some(FixedShape::new(dims));
        self
    }
}

/// Named tensor representations attached to a schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TensorRepresentationGroup {
    #[serde(default)]
    pub tensor_representation: TensorRepresentations,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub feature: Vec<Feature>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tensor_representation_group: BTreeMap<String, TensorRepresentationGroup>,
}

impl Schema {
    pub fn new(feature: Vec<Feature>) -> Self {
        Self {
            feature,
            tensor_representation_group: BTreeMap::new(),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, ExampleCodecError> {
        let schema: Schema =
            serde_json::from_str(json).map_err(|source| ExampleCodecError::SchemaJson {
                path: None,
                source,
            })?;
        schema.validate()?;
        Ok(schema)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ExampleCodecError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| ExampleCodecError::SchemaFile {
            path: path.to_path_buf(),
            source,
        })?;
        let schema: Schema =
            serde_json::from_str(&json).map_err(|source| ExampleCodecError::SchemaJson {
                path: Some(path.to_path_buf()),
                source,
            })?;
        schema.validate()?;
        Ok(schema)
    }

    pub fn to_json_string(&self) -> Result<String, ExampleCodecError> {
        serde_json::to_string_pretty(self)
            .map_err(|source| ExampleCodecError::SchemaJson { path: None, source })
    }

    /// Feature names must be unique and non-empty.
    pub fn validate(&self) -> Result<(), ExampleCodecError> {
        let mut seen = BTreeSet::new();
        for feature in &self.feature {
            if feature.name.is_empty() {
                return Err(ExampleCodecError::EmptyFeatureName);
            }
            if !seen.insert(feature.name.as_str()) {
                return Err(ExampleCodecError::DuplicateFeature(feature.name.clone()));
            }
        }
        Ok(())
    }

    pub fn get_feature(&self, name: &str) -> Option<&Feature> {
        self.feature.iter().find(|f| f.name == name)
    }

    pub fn feature_names(&self) -> impl Iterator<Item = &str> {
        self.feature.iter().map(|f| f.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_documented_layout() {
        let schema = Schema::from_json_str(
            r#"{
                "feature": [
                    { "name": "age", "type": "INT", "shape": { "dim": [{ "size": 1 }] } },
                    { "name": "tags", "type": "BYTES" }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(
            schema.feature,
            vec![
                Feature::new("age", FeatureType::Int).with_shape([1]),
                Feature::new("tags", FeatureType::Bytes),
            ]
        );
        assert!(schema.tensor_representation_group.is_empty());
    }

    #[test]
    fn duplicate_feature_names_are_rejected() {
        let err = Schema::from_json_str(
            r#"{ "feature": [ { "name": "a", "type": "INT" }, { "name": "a", "type": "FLOAT" } ] }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ExampleCodecError::DuplicateFeature(ref n) if n == "a"));
    }
}
