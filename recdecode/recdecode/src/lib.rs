//! Read TFRecord files into Arrow record batches.
//!
//! Two sources are provided:
//! - [`TfExampleRecord`] decodes tf.Example records, optionally with a schema
//!   (requires the `example` feature, on by default).
//! - [`GraphDecoderRecord`] runs any [`RecordDecoder`](recdecode_core::RecordDecoder),
//!   usually one restored with [`load_decoder`](recdecode_core::load_decoder).
//!
//! Both can attach the serialized records as an extra column and decode
//! batches in parallel.

pub mod batch_util;
mod error;
pub mod file_pattern;
mod graph_decoder_record;
#[cfg(feature = "example")]
mod tf_example_record;
pub mod tfrecord;

pub use batch_util::{BatchConfig, DEFAULT_BATCH_SIZE, batch_elements};
pub use error::RecordIoError;
pub use graph_decoder_record::{GraphDecoderRecord, GraphDecoderRecordBuilder};
pub use recdecode_arrow as arrow;
pub use recdecode_core as core;
#[cfg(feature = "example")]
pub use recdecode_example as example;
#[cfg(feature = "example")]
pub use tf_example_record::{DecodeBatchExamplesFn, TfExampleRecord, TfExampleRecordBuilder};
pub use tfrecord::{TfRecordFile, read_tfrecord_files, read_tfrecords, write_tfrecords};
