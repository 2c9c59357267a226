
use recdecode_example::{
    DEFAULT_TENSOR_REPRESENTATION_GROUP, ExampleCodecError, FeatureType, Schema, SchemaFeature,
    TensorRepresentation, TensorRepresentations, get_tensor_representations_from_schema,
    infer_tensor_representations_from_schema, project_schema, set_tensor_representations_in_schema,
    tensor_representations_for_schema,
};
use test_helpers::people_schema;

#[test]
fn inference_uses_fixed_shapes() {
    let representations = infer_tensor_representations_from_schema(&people_schema());
    assert_eq!(representations.len(), 3);
    assert_eq!(
        representations["id"],
        TensorRepresentation::DenseTensor {
            column_name: "id".to_string(),
            shape: vec![1],
            default_value: None,
        }
    );
    assert_eq!(
        representations["tags"],
        TensorRepresentation::VarLenSparseTensor {
            column_name: "tags".to_string()
        }
    );
}

#[test]
fn explicit_group_wins_over_inference() {
    let mut schema = people_schema();
    assert!(get_tensor_representations_from_schema(&schema, "").is_none());

    let explicit = TensorRepresentations::from([(
        "ragged_tags".to_string(),
        TensorRepresentation::RaggedTensor {
            feature_path: vec!["tags".to_string()],
        },
    )]);
    set_tensor_representations_in_schema(
        &mut schema,
        explicit.clone(),
        DEFAULT_TENSOR_REPRESENTATION_GROUP,
    );
    assert_eq!(tensor_representations_for_schema(&schema), explicit);

    // Survives a JSON round trip.
    let reloaded = Schema::from_json_str(&schema.to_json_string().unwrap()).unwrap();
    assert_eq!(reloaded, schema);
}

#[test]
fn projection_keeps_needed_features_in_order() {
    let projected = project_schema(&people_schema(), &["score", "id"]).unwrap();
    let names: Vec<_> = projected.feature_names().collect();
    assert_eq!(names, ["id", "score"]);
    let representations = tensor_representations_for_schema(&projected);
    assert_eq!(
        representations.keys().collect::<Vec<_>>(),
        ["id", "score"]
    );
}

#[test]
fn projection_is_idempotent() {
    let schema = people_schema();
    let twice = project_schema(&project_schema(&schema, &["id", "tags"]).unwrap(), &["id"]).unwrap();
    let once = project_schema(&schema, &["id"]).unwrap();
    assert_eq!(twice, once);
}

#[test]
fn projection_rejects_unknown_names() {
    let err = project_schema(&people_schema(), &["id", "nope", "also_nope"]).unwrap_err();
    match &err {
        ExampleCodecError::UnknownTensors { unknown, available } => {
            assert_eq!(unknown, &["also_nope", "nope"]);
            assert_eq!(available, &["id", "score", "tags"]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("nope"));
}

#[test]
fn sparse_representation_pulls_every_source_column() {
    let mut schema = Schema::new(vec![
        SchemaFeature::new("idx", FeatureType::Int),
        SchemaFeature::new("val", FeatureType::Float),
        SchemaFeature::new("other", FeatureType::Bytes),
    ]);
    set_tensor_representations_in_schema(
        &mut schema,
        TensorRepresentations::from([(
            "sp".to_string(),
            TensorRepresentation::SparseTensor {
                dense_shape: vec![100],
                index_column_names: vec!["idx".to_string()],
                value_column_name: "val".to_string(),
            },
        )]),
        "",
    );
    let projected = project_schema(&schema, &["sp"]).unwrap();
    assert_eq!(projected.feature_names().collect::<Vec<_>>(), ["idx", "val"]);
}
