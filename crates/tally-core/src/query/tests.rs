use crate::{
    error::{ErrorClass, ErrorOrigin, InternalError},
    key::Key,
    mapreduce::{DateFormat, Operator},
    query::{QueryError, QueryExpr, QueryResult, QueryResults, compile},
    store::{KeyValueStore, MemoryStore},
    value::{Document, Value},
};

#[test]
fn all_events_compiles_to_a_bare_count() {
    let pipeline = compile(&QueryExpr::all_events()).expect("compiles");

    assert_eq!(pipeline.root().map_operators(), &[Operator::CountDocuments]);
    assert!(pipeline.root().chain().is_none());
}

#[test]
fn operators_follow_application_order() {
    let expr = QueryExpr::all_events()
        .transform_date_format("When", "Day", "Days")
        .only("Type", "Click")
        .broken_down_by("Day", "Day");
    let pipeline = compile(&expr).expect("compiles");

    let verbs = pipeline
        .root()
        .map_operators()
        .iter()
        .map(Operator::verb)
        .collect::<Vec<_>>();
    assert_eq!(
        verbs,
        ["CountDocuments", "TransformDateFormat", "Only", "BrokenDownBy"]
    );
    assert_eq!(
        pipeline.root().map_operators()[1],
        Operator::TransformDateFormat {
            field: "When".to_string(),
            name: "Day".to_string(),
            format: DateFormat::Days,
        }
    );
}

#[test]
fn chain_introducing_verbs_build_chained_stages() {
    let expr = QueryExpr::all_events()
        .indexed_by("Type")
        .count_unique_values("UserId", "Users");
    let pipeline = compile(&expr).expect("compiles");

    assert_eq!(pipeline.root().depth(), 3);
    assert!(pipeline.is_indexed());
}

#[test]
fn unsupported_date_format_is_a_contract_violation() {
    let expr = QueryExpr::all_events().transform_date_format("When", "Day", "Weeks");
    let err = compile(&expr).expect_err("only days are supported");

    assert_eq!(
        err,
        QueryError::UnsupportedDateFormat {
            format: "Weeks".to_string()
        }
    );
}

#[test]
fn empty_arguments_are_rejected() {
    let err = compile(&QueryExpr::all_events().sum("", "Total")).expect_err("empty key");

    assert_eq!(
        err,
        QueryError::EmptyArgument {
            verb: "Sum",
            argument: "key"
        }
    );
}

#[test]
fn query_errors_convert_to_query_invariants() {
    let err: InternalError = QueryError::UnsupportedDateFormat {
        format: "Hours".to_string(),
    }
    .into();

    assert_eq!(err.origin, ErrorOrigin::Query);
    assert_eq!(err.class, ErrorClass::InvariantViolation);
}

#[test]
fn expressions_deserialize_from_nested_json() {
    let json = r#"{
        "verb": "BrokenDownBy",
        "key": "SessionId",
        "name": "Session",
        "applies_to": { "verb": "Only", "key": "Type", "value": "Click" }
    }"#;
    let expr: QueryExpr = serde_json::from_str(json).expect("valid query");

    assert_eq!(
        expr,
        QueryExpr::all_events()
            .only("Type", "Click")
            .broken_down_by("SessionId", "Session")
    );
    assert!(serde_json::from_str::<QueryExpr>(r#"{"verb": "Median", "key": "x"}"#).is_err());
}

#[test]
fn results_hide_private_fields_and_render_values() {
    let doc = Document::new()
        .with("Count", 4_i64)
        .with("Session", "s1")
        .with("Total", 2.5)
        .with("Avg", f64::NAN)
        .with("_intermediate", Document::new().with("x", 1_i64));
    let row = QueryResult::from_document(&doc);

    assert_eq!(row.event_count, 4);
    assert_eq!(row.columns.len(), 3);
    assert_eq!(row.column("Session"), Some("s1"));
    assert_eq!(row.column("Total"), Some("2.5"));
    assert_eq!(row.column("Avg"), Some("NaN"));
    assert_eq!(row.column("_intermediate"), None);
}

#[test]
fn results_stream_one_row_per_stored_bucket() {
    let store = MemoryStore::new();
    for (session, count) in [("s1", 3_i64), ("s2", 0)] {
        let doc = Document::new()
            .with("Count", count)
            .with("Session", Value::from(session));
        store
            .set_value(&Key::single(session), Some(&doc))
            .expect("write");
    }

    let rows = QueryResults::new(store.enumerate_all_values().expect("scan")).collect::<Vec<_>>();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows.iter().map(|row| row.event_count).sum::<i64>(), 3);
}
