use crate::value::{Document, Value};

#[test]
fn json_numbers_split_into_int_and_float() {
    let doc = Document::from_json_str(r#"{"a": 3, "b": 2.5, "c": "x", "d": null, "e": true}"#)
        .expect("valid document");

    assert_eq!(doc.get("a"), Some(&Value::Int(3)));
    assert_eq!(doc.get("b"), Some(&Value::Float(2.5)));
    assert_eq!(doc.get("c"), Some(&Value::Text("x".to_string())));
    assert_eq!(doc.get("d"), Some(&Value::Null));
    assert_eq!(doc.get("e"), Some(&Value::Bool(true)));
}

#[test]
fn nested_maps_and_lists_parse() {
    let doc = Document::from_json_str(r#"{"tags": ["a", 1], "meta": {"depth": 2}}"#)
        .expect("valid document");

    assert_eq!(
        doc.get("tags"),
        Some(&Value::List(vec![Value::from("a"), Value::Int(1)]))
    );
    assert_eq!(
        doc.sub_document("meta").map(|meta| meta.integer_or("depth", 0)),
        Some(2)
    );
}

#[test]
fn non_object_json_is_rejected() {
    let err = Document::from_json_str("[1, 2]").expect_err("arrays are not documents");

    assert!(err.message.contains("not a JSON object"));
}

#[test]
fn number_or_zero_falls_back_for_missing_and_text() {
    let doc = Document::new().with("n", 4_i64).with("t", "four");

    assert!((doc.number_or_zero("n") - 4.0).abs() < f64::EPSILON);
    assert!(doc.number_or_zero("t").abs() < f64::EPSILON);
    assert!(doc.number_or_zero("missing").abs() < f64::EPSILON);
}

#[test]
fn integer_or_truncates_floats_toward_zero() {
    let doc = Document::new().with("up", 2.9).with("down", -2.9);

    assert_eq!(doc.integer_or("up", 0), 2);
    assert_eq!(doc.integer_or("down", 0), -2);
    assert_eq!(doc.integer_or("missing", 7), 7);
}

#[test]
fn nan_serializes_as_null() {
    let doc = Document::new().with("mean", f64::NAN);

    assert_eq!(doc.to_json_string().expect("serializes"), r#"{"mean":null}"#);
}

#[test]
fn sub_document_mut_replaces_non_map_values() {
    let mut doc = Document::new().with("_intermediate", 5_i64);
    doc.sub_document_mut("_intermediate").insert("x".to_string(), Value::Int(1));

    assert_eq!(
        doc.sub_document("_intermediate").and_then(|d| d.get("x")),
        Some(&Value::Int(1))
    );
}

#[test]
fn render_uses_round_trip_number_formatting() {
    assert_eq!(Value::Float(0.1).render(), "0.1");
    assert_eq!(Value::Float(3.0).render(), "3");
    assert_eq!(Value::Float(f64::NAN).render(), "NaN");
    assert_eq!(Value::Int(-12).render(), "-12");
    assert_eq!(Value::Null.render(), "");
    assert_eq!(Value::List(vec![Value::Int(1)]).render(), "[1]");
}

