
use std::collections::BTreeMap;

use prost::Message;
use prost_reflect::{DescriptorPool, DynamicMessage, Value};
use prost_types::{DescriptorProto, field_descriptor_proto::Type};
use recdecode_core::{
    DType, DecoderError, ExecutionError, GraphError, GraphRecordDecoder, ProtoField,
    RecordDecoder, Symbol, TensorData, TracedDecoder, TypeSpec, load_decoder, save_decoder,
};
use test_helpers::*;

fn row_fds() -> Vec<u8> {
    build_fds(
        "row.proto",
        vec![DescriptorProto {
            name: Some("Row".to_string()),
            field: vec![
                scalar_field("id", 1, Type::Int64),
                repeated_field("tags", 2, Type::String),
                scalar_field("score", 3, Type::Float),
            ],
            ..Default::default()
        }],
    )
}

fn encode_row(fds: &[u8], id: i64, tags: &[&str]) -> Vec<u8> {
    let pool = DescriptorPool::decode(fds).unwrap();
    let desc = pool.get_message_by_name("test.Row").unwrap();
    let mut msg = DynamicMessage::new(desc);
    msg.set_field_by_name("id", Value::I64(id));
    msg.set_field_by_name(
        "tags",
        Value::List(tags.iter().map(|t| Value::String(t.to_string())).collect()),
    );
    msg.encode_to_vec()
}

struct RowDecoder {
    fds: Vec<u8>,
}

impl GraphRecordDecoder for RowDecoder {
    fn decode_record<'g>(
        &self,
        records: &Symbol<'g>,
    ) -> Result<BTreeMap<String, Symbol<'g>>, GraphError> {
        let field = |name: &str| ProtoField::new(self.fds.clone(), "test.Row", name);
        let id = records.decode_proto_field(field("id")?)?;
        let tags = records.decode_proto_field(field("tags")?)?;
        let score = records.decode_proto_field(field("score")?)?;
        Ok(BTreeMap::from([
            ("id".to_string(), id),
            ("tags".to_string(), tags),
            ("score".to_string(), score),
        ]))
    }
}

#[test]
fn proto_fields_decode_into_ragged_rows() {
    let fds = row_fds();
    let decoder = TracedDecoder::new(RowDecoder { fds: fds.clone() });
    let specs = decoder.output_type_specs().unwrap();
    assert_eq!(specs["id"], TypeSpec::ragged(DType::Int64, None));
    assert_eq!(specs["tags"], TypeSpec::ragged(DType::String, None));
    assert_eq!(specs["score"], TypeSpec::ragged(DType::Float32, None));

    // id 0 is the proto3 default and therefore absent on the wire.
    let records = [encode_row(&fds, 5, &["a", "b"]), encode_row(&fds, 0, &[])];
    let out = decoder.decode(&records).unwrap();

    let id = out.get("id").unwrap().as_ragged().unwrap();
    assert_eq!(id.row_splits(), &[0, 1, 1]);
    assert_eq!(id.values(), &TensorData::Int64(vec![5]));

    let tags = out.get("tags").unwrap().as_ragged().unwrap();
    assert_eq!(tags.row_splits(), &[0, 2, 2]);
    assert_eq!(tags.values(), &TensorData::strings(["a", "b"]));

    let score = out.get("score").unwrap().as_ragged().unwrap();
    assert_eq!(score.row_splits(), &[0, 0, 0]);
}

#[test]
fn descriptors_survive_save_and_load() {
    let fds = row_fds();
    let decoder = TracedDecoder::new(RowDecoder { fds: fds.clone() });
    let dir = tempfile::tempdir().unwrap();
    save_decoder(&decoder, dir.path()).unwrap();
    let loaded = load_decoder(dir.path()).unwrap();

    let records = [encode_row(&fds, 9, &["x"])];
    assert_eq!(
        loaded.decode(&records).unwrap(),
        decoder.decode(&records).unwrap()
    );
}

#[test]
fn unknown_fields_list_the_available_ones() {
    let err = ProtoField::new(row_fds(), "test.Row", "nope").unwrap_err();
    let message = err.to_string();
    assert!(message.contains("'nope'"), "{message}");
    assert!(message.contains(r#"["id", "tags", "score"]"#), "{message}");

    let err = ProtoField::new(row_fds(), "test.Missing", "id").unwrap_err();
    assert!(matches!(err, GraphError::Descriptor { .. }));
}

#[test]
fn malformed_records_are_not_masked() {
    let decoder = TracedDecoder::new(RowDecoder { fds: row_fds() });
    let err = decoder.decode(&[b"\xff".as_slice()]).unwrap_err();
    assert!(matches!(
        err,
        DecoderError::Execution(ExecutionError::ProtoDecode { ref message_name, .. })
            if message_name == "test.Row"
    ));
}
