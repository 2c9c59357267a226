//! Arrow integration layer for `recdecode`.
//!
//! This crate has three responsibilities:
//! 1. Convert decoder output specs ([`TypeSpecs`](recdecode_core::TypeSpecs)) to an Arrow `Schema`.
//! 2. Convert decoded [`NamedTensors`](recdecode_core::NamedTensors) into a `RecordBatch`.
//! 3. Attach the raw input records to a batch as a passthrough column.
//!
//! Every conversion takes a `large` flag. When set, variable-width data uses
//! `LargeList` / `LargeBinary`; otherwise `List` / `Binary`.
//!
//! # Typical Flow
//! ```rust
//! use recdecode_arrow::{named_tensors_to_record_batch, type_specs_to_arrow_schema};
//! use recdecode_core::{NamedTensors, TypeSpecs};
//!
//! # let specs = TypeSpecs::new();
//! # let tensors = NamedTensors::default();
//! let schema = type_specs_to_arrow_schema(&specs, false).unwrap();
//! let batch = named_tensors_to_record_batch(&tensors, &specs, false).unwrap();
//! assert_eq!(batch.schema().as_ref(), &schema);
//! ```
pub mod arrow_convert;
pub mod error;
pub mod raw_record;
pub mod schema_convert;

pub use arrow_convert::{named_tensors_to_record_batch, tensor_to_array};
pub use error::ArrowConvertError;
pub use raw_record::append_raw_record_column;
pub use schema_convert::{
    dtype_to_arrow, raw_record_column_field, type_spec_to_arrow_field, type_spec_to_arrow_type,
    type_specs_to_arrow_schema,
};
