//! tf.Example support for recdecode.
//!
//! [`ExamplesToRecordBatchDecoder`] turns batches of serialized tf.Examples
//! into Arrow record batches, optionally driven by a JSON [`Schema`]. The
//! [`tensor_representation`] module describes how logical tensors map onto
//! those columns and supports projecting a schema down to a tensor subset.
//!
//! ```
//! use prost::Message;
//! use recdecode_example::{
//!     ExamplesToRecordBatchDecoder, FeatureType, Schema, SchemaFeature,
//!     proto::{Example, Feature},
//! };
//!
//! let schema = Schema::new(vec![SchemaFeature::new("x", FeatureType::Int)]);
//! let decoder = ExamplesToRecordBatchDecoder::new(Some(&schema), false).unwrap();
//! let record = Example::from_features([("x", Feature::int64s([1, 2]))]).encode_to_vec();
//! let batch = decoder.decode_batch(&[record]).unwrap();
//! assert_eq!(batch.num_rows(), 1);
//! ```

mod decoder;
mod error;
pub mod proto;
mod schema;
pub mod tensor_representation;

pub use decoder::ExamplesToRecordBatchDecoder;
pub use error::ExampleCodecError;
pub use schema::{
    Feature as SchemaFeature, FeatureType, FixedDim, FixedShape, Schema, TensorRepresentationGroup,
};
pub use tensor_representation::{
    DEFAULT_TENSOR_REPRESENTATION_GROUP, DefaultValue, TensorRepresentation,
    TensorRepresentations, get_source_columns_from_tensor_representation,
    get_tensor_representations_from_schema, infer_tensor_representations_from_schema,
    project_schema, set_tensor_representations_in_schema, tensor_representations_for_schema,
};
