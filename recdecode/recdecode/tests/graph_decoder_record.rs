mod test_helpers;

use arrow::array::{Array, BinaryArray, Int64Array, ListArray};
use recdecode::{GraphDecoderRecord, RecordIoError};
use recdecode_core::{ContractError, RecordDecoder, TracedDecoder, load_decoder, save_decoder};
use test_helpers::{ExplodeDecoder, LengthDecoder, SparseExplodeDecoder, pattern, write_file};

fn raw_rows(batch: &arrow::record_batch::RecordBatch, name: &str) -> Vec<Vec<u8>> {
    let column = batch
        .column_by_name(name)
        .unwrap()
        .as_any()
        .downcast_ref::<ListArray>()
        .unwrap();
    (0..column.len())
        .map(|i| {
            let row = column.value(i);
            let row = row.as_any().downcast_ref::<BinaryArray>().unwrap();
            row.value(0).to_vec()
        })
        .collect()
}

fn int64_column(batch: &arrow::record_batch::RecordBatch, name: &str) -> Vec<i64> {
    batch
        .column_by_name(name)
        .unwrap()
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap()
        .values()
        .to_vec()
}

#[test]
fn aligned_decoder_attaches_records_row_by_row() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "data.tfrecord", &["a", "bcd", ""]);
    let source = GraphDecoderRecord::builder(
        pattern(dir.path(), "*.tfrecord"),
        TracedDecoder::new(LengthDecoder),
    )
    .with_raw_record_column_name("raw")
    .build()
    .unwrap();

    let batches = source.record_batches(None).unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].schema(), source.arrow_schema().unwrap());
    assert_eq!(int64_column(&batches[0], "len"), [1, 3, 0]);
    assert_eq!(
        raw_rows(&batches[0], "raw"),
        [b"a".to_vec(), b"bcd".to_vec(), b"".to_vec()]
    );
}

#[test]
fn raw_records_follow_the_record_index() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "data.tfrecord", &["1 2", "", "3"]);
    let source = GraphDecoderRecord::builder(
        pattern(dir.path(), "*.tfrecord"),
        TracedDecoder::new(ExplodeDecoder {
            record_index: Some("idx"),
        }),
    )
    .with_raw_record_column_name("raw")
    .build()
    .unwrap();

    let batch = &source.record_batches(None).unwrap()[0];
    assert_eq!(batch.num_rows(), 3);
    assert_eq!(int64_column(batch, "value"), [1, 2, 3]);
    assert_eq!(
        raw_rows(batch, "raw"),
        [b"1 2".to_vec(), b"1 2".to_vec(), b"3".to_vec()]
    );
}

#[test]
fn raw_records_follow_a_sparse_record_index() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = dir.path().join("decoder");
    save_decoder(&TracedDecoder::new(SparseExplodeDecoder), &artifact).unwrap();
    write_file(dir.path(), "data.tfrecord", &["7 8", "", "9"]);

    let source = GraphDecoderRecord::builder(
        pattern(dir.path(), "*.tfrecord"),
        load_decoder(&artifact).unwrap(),
    )
    .with_raw_record_column_name("raw")
    .build()
    .unwrap();

    let batch = &source.record_batches(None).unwrap()[0];
    assert_eq!(batch.schema(), source.arrow_schema().unwrap());
    assert_eq!(int64_column(batch, "value"), [7, 8, 9]);
    assert_eq!(
        raw_rows(batch, "raw"),
        [b"7 8".to_vec(), b"7 8".to_vec(), b"9".to_vec()]
    );
}

#[test]
fn unaligned_outputs_without_record_index_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "data.tfrecord", &["1 2"]);
    let source = GraphDecoderRecord::builder(
        pattern(dir.path(), "*.tfrecord"),
        TracedDecoder::new(ExplodeDecoder { record_index: None }),
    )
    .build()
    .unwrap();

    let err = source.record_batches(None).unwrap_err();
    assert!(matches!(
        err,
        RecordIoError::Contract(ContractError::NotRecordAligned {
            rows: 2,
            records: 1
        })
    ));
}

#[test]
fn projection_selects_outputs() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "data.tfrecord", &["4 5"]);
    let source = GraphDecoderRecord::builder(
        pattern(dir.path(), "*.tfrecord"),
        TracedDecoder::new(ExplodeDecoder {
            record_index: Some("idx"),
        }),
    )
    .build()
    .unwrap();

    let projected = source.project(&["value"]).unwrap();
    assert_eq!(
        projected.output_type_specs().keys().collect::<Vec<_>>(),
        ["value"]
    );
    let batch = &projected.record_batches(None).unwrap()[0];
    assert_eq!(batch.num_columns(), 1);
    assert_eq!(int64_column(batch, "value"), [4, 5]);

    let err = source.project(&["value", "nope"]).unwrap_err();
    match err {
        RecordIoError::UnknownTensors { unknown, available } => {
            assert_eq!(unknown, ["nope"]);
            assert_eq!(available, ["idx", "value"]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn raw_record_column_must_not_shadow_an_output() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "data.tfrecord", &["x"]);
    let err = GraphDecoderRecord::builder(
        pattern(dir.path(), "*.tfrecord"),
        TracedDecoder::new(LengthDecoder),
    )
    .with_raw_record_column_name("len")
    .build()
    .err()
    .unwrap();
    assert!(matches!(err, RecordIoError::RawRecordColumnClash(ref n) if n == "len"));
}

#[test]
fn loaded_decoders_drive_the_same_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = dir.path().join("decoder");
    save_decoder(
        &TracedDecoder::new(ExplodeDecoder {
            record_index: Some("idx"),
        }),
        &artifact,
    )
    .unwrap();
    let data = write_file(dir.path(), "data.tfrecord", &["7", "8 9"]);

    let source = GraphDecoderRecord::builder(
        data.to_string_lossy().into_owned(),
        load_decoder(&artifact).unwrap(),
    )
    .with_raw_record_column_name("raw")
    .with_large_types(true)
    .build()
    .unwrap();
    assert_eq!(source.decoder().record_index_tensor_name(), Some("idx"));

    let batches = source.record_batches(Some(1)).unwrap();
    let rows: Vec<_> = batches.iter().map(|b| b.num_rows()).collect();
    assert_eq!(rows, [1, 2]);
    assert_eq!(int64_column(&batches[1], "value"), [8, 9]);
    for batch in &batches {
        assert_eq!(batch.schema(), source.arrow_schema().unwrap());
    }
}
