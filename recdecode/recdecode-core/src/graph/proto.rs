//! Descriptor-driven protobuf field extraction for `DecodeProtoField`.

use std::{fmt, sync::Arc};

use prost::Message as _;
use prost_reflect::{
    DescriptorPool, DynamicMessage, FieldDescriptor, Kind, MessageDescriptor, Value as ProtoValue,
};
use serde::{Deserialize, Serialize};

use crate::{
    dtype::DType,
    error::{ExecutionError, GraphError},
    tensor::{RaggedTensor, TensorData},
};

/// A protobuf field resolved against an embedded `FileDescriptorSet`.
///
/// Only the descriptor bytes and the names are persisted; descriptors are
/// resolved again when a graph is deserialized, so a saved graph never depends
/// on generated code.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "ProtoFieldRepr", into = "ProtoFieldRepr")]
pub struct ProtoField {
    repr: ProtoFieldRepr,
    message: MessageDescriptor,
    field: FieldDescriptor,
    dtype: DType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ProtoFieldRepr {
    descriptor_set: Vec<u8>,
    message_name: String,
    field_name: String,
}

impl ProtoField {
    /// Resolve `message_name.field_name` in the serialized `FileDescriptorSet`.
    pub fn new(
        descriptor_set: impl Into<Vec<u8>>,
        message_name: impl Into<String>,
        field_name: impl Into<String>,
    ) -> Result<Self, GraphError> {
        Self::try_from(ProtoFieldRepr {
            descriptor_set: descriptor_set.into(),
            message_name: message_name.into(),
            field_name: field_name.into(),
        })
    }

    pub fn message_name(&self) -> &str {
        &self.repr.message_name
    }

    pub fn field_name(&self) -> &str {
        &self.repr.field_name
    }

    /// Element dtype of the decoded values.
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Decode the field from every record into a `[n_records, (values)]` ragged tensor.
    ///
    /// Singular fields contribute one value when present and none otherwise.
    /// Message-typed fields yield the re-serialized sub-message bytes.
    pub(crate) fn decode(&self, records: &[Arc<[u8]>]) -> Result<RaggedTensor, ExecutionError> {
        let mut values = Vec::new();
        let mut row_lengths = Vec::with_capacity(records.len());
        for record in records {
            let message = DynamicMessage::decode(self.message.clone(), record.as_ref())
                .map_err(|e| ExecutionError::ProtoDecode {
                    message_name: self.repr.message_name.clone(),
                    source: Box::new(e),
                })?;
            let before = values.len();
            if self.field.is_list() {
                if let ProtoValue::List(items) = message.get_field(&self.field).as_ref() {
                    values.extend(items.iter().cloned());
                }
            } else if message.has_field(&self.field) {
                values.push(message.get_field(&self.field).into_owned());
            }
            row_lengths.push(values.len() - before);
        }
        let data = self.collect(values)?;
        Ok(RaggedTensor::from_row_lengths(&row_lengths, data)?)
    }

    fn collect(&self, values: Vec<ProtoValue>) -> Result<TensorData, ExecutionError> {
        let mismatch = |v: &ProtoValue| ExecutionError::Kernel {
            op: "DecodeProtoField",
            detail: format!(
                "field '{}' holds {v:?}, expected {}",
                self.repr.field_name, self.dtype
            ),
        };
        let data = match self.dtype {
            DType::Bool => TensorData::Bool(
                values
                    .iter()
                    .map(|v| v.as_bool().ok_or_else(|| mismatch(v)))
                    .collect::<Result<_, _>>()?,
            ),
            DType::Int32 => TensorData::Int32(
                values
                    .iter()
                    .map(|v| match v {
                        ProtoValue::I32(x) | ProtoValue::EnumNumber(x) => Ok(*x),
                        other => Err(mismatch(other)),
                    })
                    .collect::<Result<_, _>>()?,
            ),
            DType::Int64 => TensorData::Int64(
                values
                    .iter()
                    .map(|v| match v {
                        ProtoValue::I64(x) => Ok(*x),
                        ProtoValue::U32(x) => Ok(i64::from(*x)),
                        ProtoValue::U64(x) => i64::try_from(*x).map_err(|_| ExecutionError::Kernel {
                            op: "DecodeProtoField",
                            detail: format!("uint64 value {x} does not fit in int64"),
                        }),
                        other => Err(mismatch(other)),
                    })
                    .collect::<Result<_, _>>()?,
            ),
            DType::Float32 => TensorData::Float32(
                values
                    .iter()
                    .map(|v| v.as_f32().ok_or_else(|| mismatch(v)))
                    .collect::<Result<_, _>>()?,
            ),
            DType::Float64 => TensorData::Float64(
                values
                    .iter()
                    .map(|v| v.as_f64().ok_or_else(|| mismatch(v)))
                    .collect::<Result<_, _>>()?,
            ),
            DType::String => TensorData::String(
                values
                    .iter()
                    .map(|v| match v {
                        ProtoValue::String(s) => Ok(Arc::from(s.as_bytes())),
                        ProtoValue::Bytes(b) => Ok(Arc::from(b.as_ref())),
                        ProtoValue::Message(m) => Ok(Arc::from(m.encode_to_vec())),
                        other => Err(mismatch(other)),
                    })
                    .collect::<Result<_, _>>()?,
            ),
        };
        Ok(data)
    }
}

fn kind_to_dtype(kind: &Kind) -> DType {
    match kind {
        Kind::Double => DType::Float64,
        Kind::Float => DType::Float32,
        Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 | Kind::Enum(_) => DType::Int32,
        Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 => DType::Int64,
        Kind::Uint32 | Kind::Fixed32 | Kind::Uint64 | Kind::Fixed64 => DType::Int64,
        Kind::Bool => DType::Bool,
        Kind::String | Kind::Bytes | Kind::Message(_) => DType::String,
    }
}

impl TryFrom<ProtoFieldRepr> for ProtoField {
    type Error = GraphError;

    fn try_from(repr: ProtoFieldRepr) -> Result<Self, Self::Error> {
        let invalid = |detail: String| GraphError::Descriptor {
            message_name: repr.message_name.clone(),
            detail,
        };
        let pool = DescriptorPool::decode(repr.descriptor_set.as_slice())
            .map_err(|e| invalid(e.to_string()))?;
        let message = pool
            .get_message_by_name(&repr.message_name)
            .ok_or_else(|| invalid("message descriptor not found".to_string()))?;
        let field = message.get_field_by_name(&repr.field_name).ok_or_else(|| {
            let available: Vec<String> = message.fields().map(|f| f.name().to_string()).collect();
            invalid(format!(
                "field '{}' not found, available fields: {available:?}",
                repr.field_name
            ))
        })?;
        if field.is_map() {
            return Err(invalid(format!(
                "map field '{}' cannot be decoded into a tensor",
                repr.field_name
            )));
        }
        let dtype = kind_to_dtype(&field.kind());
        Ok(Self {
            repr,
            message,
            field,
            dtype,
        })
    }
}

impl From<ProtoField> for ProtoFieldRepr {
    fn from(value: ProtoField) -> Self {
        value.repr
    }
}

impl PartialEq for ProtoField {
    fn eq(&self, other: &Self) -> bool {
        self.repr == other.repr
    }
}

impl fmt::Debug for ProtoField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtoField")
            .field("message_name", &self.repr.message_name)
            .field("field_name", &self.repr.field_name)
            .field("dtype", &self.dtype)
            .finish()
    }
}
