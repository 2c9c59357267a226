
use std::{collections::BTreeMap, fs};

use recdecode_core::{
    ExecutionMode, GraphError, GraphRecordDecoder, LoadError, LoadOptions, RecordDecoder,
    SAVED_MODULE_FILE, SaveError, Symbol, TracedDecoder, load_decoder, load_decoder_with_options,
    save_decoder, with_execution_mode,
};
use test_helpers::*;

#[test]
fn round_trip_preserves_specs_and_behavior() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("explode");
    let decoder = TracedDecoder::new(ExplodeDecoder::indexed());
    save_decoder(&decoder, &path).unwrap();

    let loaded = load_decoder(&path).unwrap();
    assert_eq!(
        loaded.output_type_specs().unwrap(),
        decoder.output_type_specs().unwrap()
    );
    assert_eq!(loaded.record_index_tensor_name(), Some("idx"));

    let records = ["7 8", "", "9"];
    let expected = decoder.decode(&records).unwrap();
    let actual = loaded.decode(&records).unwrap();
    assert_eq!(actual, expected);
    for (name, tensor) in &actual {
        assert!(decoder.output_type_specs().unwrap()[name].is_compatible_with(tensor));
    }
}

#[test]
fn decoder_without_record_index_has_no_name_function() {
    let dir = tempfile::tempdir().unwrap();
    save_decoder(&TracedDecoder::new(LengthDecoder), dir.path()).unwrap();

    let json = fs::read_to_string(dir.path().join(SAVED_MODULE_FILE)).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["format_version"], 1);
    assert!(value["functions"].get("decode_fun").is_some());
    assert!(value["functions"].get("record_index_tensor_name_fun").is_none());

    let loaded = load_decoder(dir.path()).unwrap();
    assert_eq!(loaded.record_index_tensor_name(), None);
}

#[test]
fn record_index_name_survives_graph_mode_loading() {
    let dir = tempfile::tempdir().unwrap();
    save_decoder(&TracedDecoder::new(FilterDecoder { keep_len: 1 }), dir.path()).unwrap();

    let loaded = with_execution_mode(ExecutionMode::Graph, || load_decoder(dir.path())).unwrap();
    assert_eq!(loaded.record_index_tensor_name(), Some("idx"));

    let options = LoadOptions::default().with_execution_mode(ExecutionMode::Graph);
    let loaded = load_decoder_with_options(dir.path(), options).unwrap();
    assert_eq!(loaded.record_index_tensor_name(), Some("idx"));
    assert!(recdecode_core::executing_eagerly());
}

#[test]
fn save_rejects_unknown_record_index_name() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("never-written");

    struct Misnamed;
    impl GraphRecordDecoder for Misnamed {
        fn decode_record<'g>(
            &self,
            records: &Symbol<'g>,
        ) -> Result<BTreeMap<String, Symbol<'g>>, GraphError> {
            LengthDecoder.decode_record(records)
        }

        fn record_index_tensor_name(&self) -> Option<&str> {
            Some("missing")
        }
    }

    let err = save_decoder(&TracedDecoder::new(Misnamed), &path).unwrap_err();
    assert!(matches!(err, SaveError::RecordIndexNotInOutputs { .. }));
    let message = err.to_string();
    assert!(message.contains("missing"), "{message}");
    assert!(message.contains(r#"["values"]"#), "{message}");
    assert!(!path.exists());
}

#[test]
fn save_rejects_empty_record_index_name() {
    let dir = tempfile::tempdir().unwrap();
    let decoder = TracedDecoder::new(ExplodeDecoder {
        record_index: Some(""),
    });
    let err = save_decoder(&decoder, dir.path().join("x")).unwrap_err();
    assert!(matches!(err, SaveError::EmptyRecordIndexName));
}

#[test]
fn save_rejects_dense_record_index() {
    let dir = tempfile::tempdir().unwrap();
    let decoder = TracedDecoder::new(ExplodeDecoder {
        record_index: Some("value"),
    });
    let err = save_decoder(&decoder, dir.path().join("x")).unwrap_err();
    assert!(matches!(err, SaveError::RecordIndexSpec { ref name, .. } if name == "value"));
}

#[test]
fn load_rejects_artifacts_without_decode_fun() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join(SAVED_MODULE_FILE),
        r#"{"format_version": 1, "functions": {}}"#,
    )
    .unwrap();
    let err = load_decoder(dir.path()).unwrap_err();
    assert!(matches!(err, LoadError::NotADecoder { slot: "decode_fun", .. }));
}

#[test]
fn load_rejects_unknown_format_version() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join(SAVED_MODULE_FILE),
        r#"{"format_version": 7, "functions": {}}"#,
    )
    .unwrap();
    let err = load_decoder(dir.path()).unwrap_err();
    assert!(matches!(err, LoadError::UnsupportedVersion { found: 7, supported: 1 }));
}

#[test]
fn load_reports_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_decoder(dir.path().join("absent")).unwrap_err();
    assert!(matches!(err, LoadError::Io { .. }));
}

#[test]
fn load_detects_tampered_specs() {
    let dir = tempfile::tempdir().unwrap();
    save_decoder(&TracedDecoder::new(LengthDecoder), dir.path()).unwrap();

    let file = dir.path().join(SAVED_MODULE_FILE);
    let mut value: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&file).unwrap()).unwrap();
    let nodes = value["functions"]["decode_fun"]["graph"]["nodes"]
        .as_array_mut()
        .unwrap();
    let last = nodes.last_mut().unwrap();
    last["spec"]["dtype"] = serde_json::Value::String("float32".to_string());
    fs::write(&file, serde_json::to_vec(&value).unwrap()).unwrap();

    let err = load_decoder(dir.path()).unwrap_err();
    assert!(
        matches!(err, LoadError::InvalidFunction { ref function, .. } if function == "decode_fun")
    );

    let options = LoadOptions::default().with_validate(false);
    assert!(load_decoder_with_options(dir.path(), options).is_ok());
}

#[test]
fn sparse_record_index_survives_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let decoder = TracedDecoder::new(SparseExplodeDecoder);
    save_decoder(&decoder, dir.path()).unwrap();

    let loaded = load_decoder(dir.path()).unwrap();
    assert_eq!(loaded.record_index_tensor_name(), Some("idx"));
    assert_eq!(
        loaded.output_type_specs().unwrap(),
        decoder.output_type_specs().unwrap()
    );

    let records = ["7 8", "", "9"];
    let out = loaded.decode(&records).unwrap();
    assert_eq!(out, decoder.decode(&records).unwrap());
    assert_eq!(out.record_index("idx", records.len()).unwrap(), vec![0, 0, 2]);
}

#[test]
fn load_rejects_dangling_node_ids_without_validation() {
    let dir = tempfile::tempdir().unwrap();
    save_decoder(&TracedDecoder::new(LengthDecoder), dir.path()).unwrap();

    let file = dir.path().join(SAVED_MODULE_FILE);
    let mut value: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&file).unwrap()).unwrap();
    value["functions"]["decode_fun"]["outputs"]["outputs"]["values"] = serde_json::json!(999);
    fs::write(&file, serde_json::to_vec(&value).unwrap()).unwrap();

    for validate in [true, false] {
        let options = LoadOptions::default().with_validate(validate);
        let err = load_decoder_with_options(dir.path(), options).unwrap_err();
        assert!(matches!(
            err,
            LoadError::InvalidFunction {
                ref function,
                source: GraphError::UnknownNode { node: 999 },
            } if function == "decode_fun"
        ));
    }
}

#[test]
fn load_rejects_forward_node_references_without_validation() {
    let dir = tempfile::tempdir().unwrap();
    save_decoder(&TracedDecoder::new(LengthDecoder), dir.path()).unwrap();

    let file = dir.path().join(SAVED_MODULE_FILE);
    let mut value: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&file).unwrap()).unwrap();
    let nodes = value["functions"]["decode_fun"]["graph"]["nodes"]
        .as_array_mut()
        .unwrap();
    nodes[1]["inputs"] = serde_json::json!([42]);
    fs::write(&file, serde_json::to_vec(&value).unwrap()).unwrap();

    let options = LoadOptions::default().with_validate(false);
    let err = load_decoder_with_options(dir.path(), options).unwrap_err();
    assert!(matches!(
        err,
        LoadError::InvalidFunction {
            source: GraphError::UnknownNode { node: 42 },
            ..
        }
    ));
}
