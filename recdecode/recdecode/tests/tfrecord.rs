mod test_helpers;

use std::fs;

use recdecode::{RecordIoError, TfRecordFile, file_pattern, read_tfrecords, write_tfrecords};
use test_helpers::{pattern, write_file};

#[test]
fn records_round_trip_through_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let records: [&[u8]; 3] = [b"first", b"", b"\x00\x01\x02"];
    let path = write_file(dir.path(), "data.tfrecord", &records);

    // 12-byte header and 4-byte footer around each payload.
    assert_eq!(fs::metadata(&path).unwrap().len(), (3 * 16 + 5 + 3) as u64);
    assert_eq!(read_tfrecords(&path).unwrap(), records.map(<[u8]>::to_vec));
}

#[test]
fn empty_file_has_no_records() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file::<&[u8]>(dir.path(), "empty.tfrecord", &[]);
    let file = TfRecordFile::open(&path).unwrap();
    assert_eq!(file.records().count(), 0);
}

#[test]
fn corrupted_payload_fails_the_data_checksum() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "bad.tfrecord", &["hello", "world"]);
    let mut bytes = fs::read(&path).unwrap();
    // First byte of the second payload.
    bytes[16 + 5 + 12] ^= 0xff;
    fs::write(&path, bytes).unwrap();

    let file = TfRecordFile::open(&path).unwrap();
    let results: Vec<_> = file.records().collect();
    assert_eq!(results.len(), 2);
    assert_eq!(*results[0].as_ref().unwrap(), b"hello");
    assert!(matches!(
        results[1],
        Err(RecordIoError::Checksum { part: "data", offset: 21, .. })
    ));
}

#[test]
fn truncated_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "short.tfrecord", &["hello"]);
    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() - 2]).unwrap();

    let err = read_tfrecords(&path).unwrap_err();
    assert!(matches!(err, RecordIoError::Truncated { offset: 0, .. }));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = write_tfrecords(dir.path().join("no/such/dir/x"), &["a"]).unwrap_err();
    assert!(matches!(err, RecordIoError::Io { .. }));
    assert!(matches!(
        TfRecordFile::open(dir.path().join("absent")),
        Err(RecordIoError::Io { .. })
    ));
}

#[test]
fn patterns_resolve_sorted_matches() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "part-2.tfrecord", &["b"]);
    write_file(dir.path(), "part-1.tfrecord", &["a"]);
    write_file(dir.path(), "other.txt", &["c"]);

    let files = file_pattern::resolve(&pattern(dir.path(), "part-*.tfrecord"), true).unwrap();
    let names: Vec<_> = files
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, ["part-1.tfrecord", "part-2.tfrecord"]);

    let exact = file_pattern::resolve(&pattern(dir.path(), "other.txt"), true).unwrap();
    assert_eq!(exact.len(), 1);
}

#[test]
fn validation_controls_empty_matches() {
    let dir = tempfile::tempdir().unwrap();
    let missing = pattern(dir.path(), "*.tfrecord");
    assert!(matches!(
        file_pattern::resolve(&missing, true),
        Err(RecordIoError::NoMatchingFiles { .. })
    ));
    assert!(file_pattern::resolve(&missing, false).unwrap().is_empty());
    assert!(
        file_pattern::resolve(&pattern(dir.path(), "nope/*.tfrecord"), false)
            .unwrap()
            .is_empty()
    );
}

#[test]
fn wildcards_outside_the_file_name_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let err = file_pattern::resolve(&pattern(dir.path(), "*/data.tfrecord"), false).unwrap_err();
    assert!(matches!(err, RecordIoError::InvalidPattern { .. }));
}
