//! `tf.Example` wire messages.
//!
//! Hand-written `prost` definitions matching `tensorflow/core/example/example.proto`
//! and `feature.proto`, so no build script or `protoc` is needed.

use std::collections::BTreeMap;

use crate::schema::FeatureType;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BytesList {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub value: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FloatList {
    #[prost(float, repeated, tag = "1")]
    pub value: Vec<f32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Int64List {
    #[prost(int64, repeated, tag = "1")]
    pub value: Vec<i64>,
}

/// One named feature: a list of bytes, floats or int64s.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Feature {
    #[prost(oneof = "feature::Kind", tags = "1, 2, 3")]
    pub kind: Option<feature::Kind>,
}

pub mod feature {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Kind {
        #[prost(message, tag = "1")]
        BytesList(super::BytesList),
        #[prost(message, tag = "2")]
        FloatList(super::FloatList),
        #[prost(message, tag = "3")]
        Int64List(super::Int64List),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Features {
    #[prost(btree_map = "string, message", tag = "1")]
    pub feature: BTreeMap<String, Feature>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Example {
    #[prost(message, optional, tag = "1")]
    pub features: Option<Features>,
}

impl Feature {
    pub fn bytes<I, B>(values: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        let value = values.into_iter().map(|v| v.as_ref().to_vec()).collect();
        Self {
            kind: Some(feature::Kind::BytesList(BytesList { value })),
        }
    }

    pub fn floats(values: impl IntoIterator<Item = f32>) -> Self {
        Self {
            kind: Some(feature::Kind::FloatList(FloatList {
                value: values.into_iter().collect(),
            })),
        }
    }

    pub fn int64s(values: impl IntoIterator<Item = i64>) -> Self {
        Self {
            kind: Some(feature::Kind::Int64List(Int64List {
                value: values.into_iter().collect(),
            })),
        }
    }

    /// The list kind that is set, if any.
    pub fn feature_type(&self) -> Option<FeatureType> {
        self.kind.as_ref().map(|kind| match kind {
            feature::Kind::BytesList(_) => FeatureType::Bytes,
            feature::Kind::FloatList(_) => FeatureType::Float,
            feature::Kind::Int64List(_) => FeatureType::Int,
        })
    }
}

impl Example {
    pub fn from_features<I, S>(features: I) -> Self
    where
        I: IntoIterator<Item = (S, Feature)>,
        S: Into<String>,
    {
        Self {
            features: Some(Features {
                feature: features.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            }),
        }
    }

    pub fn feature(&self, name: &str) -> Option<&Feature> {
        self.features.as_ref()?.feature.get(name)
    }

    /// Iterate over `(name, feature)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Feature)> {
        self.features.iter().flat_map(|f| f.feature.iter())
    }
}
