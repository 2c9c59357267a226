mod test_helpers;

use arrow::array::{Array, BinaryArray, Int64Array, ListArray};
use recdecode::{RecordIoError, TfExampleRecord};
use test_helpers::{example, example_schema, pattern, write_file};

fn two_files(dir: &std::path::Path) -> Vec<Vec<u8>> {
    let records = vec![example(1, &["a"]), example(2, &[]), example(3, &["b", "c"])];
    write_file(dir, "part-0.tfrecord", &records[..2]);
    write_file(dir, "part-1.tfrecord", &records[2..]);
    records
}

fn ids(batch: &arrow::record_batch::RecordBatch) -> Vec<i64> {
    let column = batch
        .column_by_name("id")
        .unwrap()
        .as_any()
        .downcast_ref::<ListArray>()
        .unwrap();
    column
        .values()
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap()
        .values()
        .to_vec()
}

#[test]
fn batches_follow_file_and_record_order() {
    let dir = tempfile::tempdir().unwrap();
    two_files(dir.path());
    let source = TfExampleRecord::builder(pattern(dir.path(), "part-*.tfrecord"))
        .with_schema(example_schema())
        .build()
        .unwrap();
    assert_eq!(source.files().len(), 2);

    let batches = source.record_batches(Some(2)).unwrap();
    let rows: Vec<_> = batches.iter().map(|b| b.num_rows()).collect();
    assert_eq!(rows, [2, 1]);
    assert_eq!(ids(&batches[0]), [1, 2]);
    assert_eq!(ids(&batches[1]), [3]);
    for batch in &batches {
        assert_eq!(batch.schema(), source.arrow_schema().unwrap());
    }
}

#[test]
fn raw_record_column_holds_the_serialized_examples() {
    let dir = tempfile::tempdir().unwrap();
    let records = two_files(dir.path());
    let source = TfExampleRecord::builder(pattern(dir.path(), "part-*.tfrecord"))
        .with_schema(example_schema())
        .with_raw_record_column_name("__raw__")
        .build()
        .unwrap();
    assert!(source.supports_attaching_raw_records());

    let batch = &source.record_batches(None).unwrap()[0];
    assert_eq!(batch.schema(), source.arrow_schema().unwrap());
    let raw = batch
        .column_by_name("__raw__")
        .unwrap()
        .as_any()
        .downcast_ref::<ListArray>()
        .unwrap();
    for (i, record) in records.iter().enumerate() {
        let row = raw.value(i);
        let row = row.as_any().downcast_ref::<BinaryArray>().unwrap();
        assert_eq!(row.value(0), record.as_slice());
    }
}

#[test]
fn schemaless_sources_infer_columns_but_have_no_arrow_schema() {
    let dir = tempfile::tempdir().unwrap();
    let records = two_files(dir.path());
    let source = TfExampleRecord::builder(pattern(dir.path(), "part-*.tfrecord"))
        .build()
        .unwrap();
    assert!(matches!(
        source.arrow_schema(),
        Err(RecordIoError::SchemaRequired { .. })
    ));
    assert!(source.tensor_representations().is_err());

    let batches = source.raw_records_to_record_batches(&records, None).unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].num_columns(), 2);
    assert_eq!(ids(&batches[0]), [1, 2, 3]);
}

#[test]
fn schema_for_decoding_requires_a_schema() {
    let dir = tempfile::tempdir().unwrap();
    two_files(dir.path());
    let err = TfExampleRecord::builder(pattern(dir.path(), "part-*.tfrecord"))
        .with_schema_for_decoding(example_schema())
        .build()
        .unwrap_err();
    assert!(matches!(err, RecordIoError::SchemaForDecodingWithoutSchema));
}

#[test]
fn projection_narrows_columns() {
    let dir = tempfile::tempdir().unwrap();
    two_files(dir.path());
    let source = TfExampleRecord::builder(pattern(dir.path(), "part-*.tfrecord"))
        .with_schema(example_schema())
        .with_telemetry_descriptors(["tests"])
        .build()
        .unwrap();

    let projected = source.project(&["id"]).unwrap();
    assert_eq!(projected.files(), source.files());
    assert_eq!(projected.telemetry_descriptors(), ["tests"]);
    let schema = projected.arrow_schema().unwrap();
    assert_eq!(schema.fields().len(), 1);
    assert_eq!(schema.field(0).name(), "id");
    assert_eq!(
        projected.tensor_representations().unwrap().keys().collect::<Vec<_>>(),
        ["id"]
    );

    let batches = projected.record_batches(None).unwrap();
    assert_eq!(batches[0].num_columns(), 1);

    let err = source.project(&["id", "missing"]).unwrap_err();
    assert!(err.to_string().contains("missing"));
}

#[test]
fn formats_and_defaults() {
    let dir = tempfile::tempdir().unwrap();
    two_files(dir.path());
    let source = TfExampleRecord::builder(pattern(dir.path(), "part-*.tfrecord"))
        .with_physical_format("tfrecords_gzip")
        .with_large_types(true)
        .build()
        .unwrap();
    assert_eq!(source.logical_format(), "tf_example");
    assert_eq!(source.physical_format(), "tfrecords_gzip");
    assert!(source.produces_large_types());
    assert!(source.validate());
    assert!(source.raw_record_column_name().is_none());
}

#[test]
fn unmatched_pattern_fails_only_when_validating() {
    let dir = tempfile::tempdir().unwrap();
    let missing = pattern(dir.path(), "*.tfrecord");
    assert!(matches!(
        TfExampleRecord::builder(missing.clone()).build(),
        Err(RecordIoError::NoMatchingFiles { .. })
    ));
    let source = TfExampleRecord::builder(missing)
        .with_validate(false)
        .build()
        .unwrap();
    assert!(source.record_batches(None).unwrap().is_empty());
}

#[test]
fn zero_batch_size_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    two_files(dir.path());
    let source = TfExampleRecord::builder(pattern(dir.path(), "part-*.tfrecord"))
        .build()
        .unwrap();
    assert!(matches!(
        source.record_batches(Some(0)),
        Err(RecordIoError::InvalidBatchSize)
    ));
}
