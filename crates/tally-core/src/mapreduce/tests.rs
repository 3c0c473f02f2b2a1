use crate::{
    key::{Key, KeyPart},
    mapreduce::{
        COUNT_FIELD, ChainRole, Compositor, DateFormat, INTERMEDIATE_FIELD, KEY_FIELD, MapResult,
        Operator, Pipeline, Stage,
    },
    value::{Document, Value},
};
use proptest::prelude::*;

fn pipeline(ops: impl IntoIterator<Item = Operator>) -> Pipeline {
    ops.into_iter()
        .fold(Compositor::new(), Compositor::with)
        .build()
}

fn sum(field: &str, name: &str) -> Operator {
    Operator::Sum {
        field: field.to_string(),
        name: name.to_string(),
    }
}

fn mean(field: &str, name: &str) -> Operator {
    Operator::Mean {
        field: field.to_string(),
        name: name.to_string(),
    }
}

fn broken_down_by(field: &str, name: &str) -> Operator {
    Operator::BrokenDownBy {
        field: field.to_string(),
        name: name.to_string(),
    }
}

fn count_unique(field: &str, name: &str) -> Operator {
    Operator::CountUniqueValues {
        field: field.to_string(),
        name: name.to_string(),
    }
}

fn indexed_by(field: &str) -> Operator {
    Operator::IndexedBy {
        field: field.to_string(),
    }
}

fn mapped(stage: &Stage, docs: &[Document]) -> Vec<Document> {
    docs.iter()
        .filter_map(|doc| stage.map(doc))
        .map(|(_, doc)| doc)
        .collect()
}

// NaN never equals itself, so aggregates are compared by their JSON form.
fn json(doc: &Document) -> String {
    doc.to_json_string().expect("aggregate serializes")
}

///
/// MapResult
///

#[test]
fn index_keys_precede_normal_keys_and_emit_a_marker() {
    let mut result = MapResult::new();
    let session = result.add_key(KeyPart::from("s1"));
    result.add_index_key(KeyPart::from("Click"));
    let user = result.add_key(KeyPart::from("u1"));
    result.add_index_key(KeyPart::Int(7));

    assert_eq!((session, user), (0, 1));

    let (key, _) = result.finish().expect("not rejected");
    assert_eq!(key.canonical(), r#"["Click",7,"s1","u1",2]"#);
}

#[test]
fn removed_slots_are_nulled_not_shifted() {
    let mut result = MapResult::new();
    let first = result.add_key(KeyPart::from("a"));
    result.add_key(KeyPart::from("b"));
    result.add_index_key(KeyPart::from("i"));
    result.remove_key_at_index(first);

    let (key, _) = result.finish().expect("not rejected");
    assert_eq!(key.canonical(), r#"["i",null,"b",1]"#);
}

#[test]
fn removing_the_index_region_leaves_a_plain_key() {
    let mut result = MapResult::new();
    result.set_key(
        Key::from([KeyPart::from("Click"), KeyPart::from("s1"), KeyPart::Int(1)]),
        true,
    );
    result.remove_index_keys();

    let (key, _) = result.finish().expect("not rejected");
    assert_eq!(key, Key::single("s1"));
}

#[test]
fn set_key_without_marker_keeps_every_part() {
    let mut result = MapResult::new();
    result.set_key(Key::from([KeyPart::from("a"), KeyPart::Int(1)]), false);

    assert_eq!(result.key_parts().len(), 2);
    assert!(!result.is_rejected());
}

#[test]
fn malformed_index_marker_rejects() {
    let mut result = MapResult::new();
    result.set_key(Key::from([KeyPart::from("a"), KeyPart::from("b")]), true);
    assert!(result.is_rejected());

    let mut result = MapResult::new();
    result.set_key(Key::from([KeyPart::from("a"), KeyPart::Int(5)]), true);
    assert!(result.is_rejected());
}

#[test]
fn rejection_latches_and_suppresses_emit() {
    let mut result = MapResult::new();
    result.reject();
    result.add_key(KeyPart::from("late"));
    result.set_value("x", 1_i64);

    let mut target = Vec::new();
    result.emit(&mut target);

    assert!(target.is_empty());
}

#[test]
fn intermediate_values_nest_under_the_private_field() {
    let mut result = MapResult::new();
    result.set_value("visible", 1_i64);
    result.set_intermediate_value("Avg", Document::new().with("Count", 1_i64));
    result.remove_value("visible");

    let doc = result.document();
    assert!(doc.get("visible").is_none());
    assert_eq!(
        doc.sub_document(INTERMEDIATE_FIELD)
            .and_then(|state| state.sub_document("Avg"))
            .map(|state| state.integer_or("Count", 0)),
        Some(1)
    );
}

///
/// Operators
///

#[test]
fn only_requires_an_equal_string() {
    let stage = pipeline([Operator::Only {
        field: "Type".to_string(),
        value: "Click".to_string(),
    }]);

    let click = Document::new().with("Type", "Click");
    let view = Document::new().with("Type", "View");
    let numeric = Document::new().with("Type", 1_i64);

    assert!(stage.root().map(&click).is_some());
    assert!(stage.root().map(&view).is_none());
    assert!(stage.root().map(&numeric).is_none());
    assert!(stage.root().map(&Document::new()).is_none());
}

#[test]
fn broken_down_by_keys_on_scalars_only() {
    let stage = pipeline([broken_down_by("SessionId", "Session")]);

    let (key, doc) = stage
        .root()
        .map(&Document::new().with("SessionId", "s1"))
        .expect("scalar field");
    assert_eq!(key, Key::single("s1"));
    assert_eq!(doc.get("Session"), Some(&Value::from("s1")));
    assert_eq!(doc.get(COUNT_FIELD), Some(&Value::Int(1)));

    assert!(stage.root().map(&Document::new().with("SessionId", true)).is_none());
    assert!(stage.root().map(&Document::new()).is_none());
}

#[test]
fn sum_and_mean_fall_back_for_non_numeric_fields() {
    let stage = pipeline([sum("Value", "Total"), mean("Value", "Avg")]);

    let (_, doc) = stage
        .root()
        .map(&Document::new().with("Value", "n/a"))
        .expect("never rejects");
    assert_eq!(doc.get("Total"), Some(&Value::Float(0.0)));
    assert!(doc.get("Avg").and_then(Value::as_f64).is_some_and(f64::is_nan));

    let (_, doc) = stage
        .root()
        .map(&Document::new().with("Value", 2.5))
        .expect("never rejects");
    assert_eq!(doc.get("Total"), Some(&Value::Float(2.5)));
    assert_eq!(doc.get("Avg"), Some(&Value::Float(2.5)));
}

#[test]
fn date_transform_is_visible_to_later_operators() {
    let stage = pipeline([
        Operator::TransformDateFormat {
            field: "When".to_string(),
            name: "Day".to_string(),
            format: DateFormat::Days,
        },
        broken_down_by("Day", "Day"),
    ]);

    let (key, _) = stage
        .root()
        .map(&Document::new().with("When", "1970-01-03T05:00:00Z"))
        .expect("date parses");
    assert_eq!(key, Key::single(2_i64));

    // Unparsable dates leave the input untouched, so the breakdown rejects.
    assert!(stage.root().map(&Document::new().with("When", "soon")).is_none());
}

#[test]
fn count_unique_records_its_key_slot() {
    let stage = pipeline([broken_down_by("Type", "Type"), count_unique("User", "Users")]);

    let (key, doc) = stage
        .root()
        .map(&Document::new().with("Type", "Click").with("User", "u9"))
        .expect("scalar fields");
    assert_eq!(key, Key::from([KeyPart::from("Click"), KeyPart::from("u9")]));
    assert_eq!(doc.get("Users"), Some(&Value::Int(1)));
    assert_eq!(
        doc.sub_document(INTERMEDIATE_FIELD)
            .and_then(|state| state.sub_document("Users"))
            .map(|state| state.integer_or("KeyIndex", -1)),
        Some(1)
    );
}

#[test]
fn count_documents_honors_precounted_partials() {
    let stage = pipeline([]);
    let docs = [
        Document::new().with(COUNT_FIELD, 5_i64),
        Document::new(),
        Document::new().with(COUNT_FIELD, 2_i64),
    ];

    let out = stage.root().reduce(&docs).expect("non-empty group");
    assert_eq!(out.integer_or(COUNT_FIELD, 0), 8);
    assert!(stage.root().reduce(&[]).is_none());
}

#[test]
fn mean_retraction_to_empty_yields_nan() {
    let stage = pipeline([mean("Value", "Avg")]);
    let docs = mapped(
        stage.root(),
        &[
            Document::new().with("Value", 1_i64),
            Document::new().with("Value", 3_i64),
        ],
    );

    let mut stored = stage.root().reduce(&docs).expect("non-empty group");
    assert_eq!(stored.get("Avg"), Some(&Value::Float(2.0)));

    stage.root().unreduce(&mut stored, &docs);
    assert_eq!(stored.integer_or(COUNT_FIELD, -1), 0);
    assert!(stored.get("Avg").and_then(Value::as_f64).is_some_and(f64::is_nan));
}

///
/// Compositor
///

#[test]
fn plain_pipelines_have_no_chain() {
    let built = pipeline([broken_down_by("SessionId", "Session"), sum("Value", "Total")]);

    assert_eq!(built.root().depth(), 1);
    assert!(!built.is_indexed());
    assert_eq!(built.root().reduce_operators()[0], Operator::CountDocuments);
}

#[test]
fn index_stripping_chains_before_unique_collapses() {
    let built = pipeline([
        count_unique("User", "Users"),
        indexed_by("Type"),
        count_unique("Page", "Pages"),
    ]);
    let stages = built.stages().collect::<Vec<_>>();

    assert_eq!(stages.len(), 4);
    assert!(built.is_indexed());
    assert_eq!(stages[1].map_operators(), &[Operator::DropIndex]);
    assert!(stages[1].input().is_some_and(|input| input.strip_index_marker));
    assert_eq!(
        stages[2].map_operators(),
        &[Operator::UniqueTally {
            name: "Users".to_string()
        }]
    );
    assert!(stages[2].input().is_some_and(|input| !input.strip_index_marker));

    // The last stage tallies both unique counts.
    let tallies = stages[3]
        .reduce_operators()
        .iter()
        .filter(|op| matches!(op, Operator::UniqueTally { .. }))
        .count();
    assert_eq!(tallies, 2);
    assert_eq!(built.final_stage(), stages[3]);
}

#[test]
fn composing_concatenates_operators_and_chains() {
    let left = Compositor::new().with(indexed_by("Type"));
    let right = Compositor::new()
        .with(Operator::CountDocuments)
        .with(count_unique("User", "Users"));
    let composed = left.compose(right);

    assert_eq!(composed.operators().len(), 3);
    assert_eq!(
        composed
            .operators()
            .iter()
            .map(Operator::chain_role)
            .collect::<Vec<_>>(),
        vec![ChainRole::None, ChainRole::StripIndex, ChainRole::CollapseUnique]
    );
    assert_eq!(composed.build().root().depth(), 3);
}

#[test]
fn chained_stage_reads_the_forwarded_key() {
    let built = pipeline([count_unique("User", "Users")]);
    let root = built.root();
    let chain = root.chain().expect("unique counts chain");

    let (key, bucket) = root
        .map(&Document::new().with("User", "u1"))
        .expect("scalar user");
    let bucket = root.reduce(&[bucket]).expect("non-empty group");
    let tagged = bucket.clone().with(KEY_FIELD, key.to_value());

    let (chain_key, chain_doc) = chain.map(&tagged).expect("tagged bucket");
    assert_eq!(chain_key, Key::from([KeyPart::Null]));
    assert!(chain_doc.get(KEY_FIELD).is_none());
    assert_eq!(chain_doc.get("Users"), Some(&Value::Int(1)));

    // Buckets without a key tag cannot be chained.
    assert!(chain.map(&bucket).is_none());
}

///
/// Round trips
///

fn arb_value() -> impl Strategy<Value = Option<f64>> {
    prop_oneof![
        1 => Just(None),
        4 => (-40_i32..40).prop_map(|n| Some(f64::from(n) / 4.0)),
    ]
}

fn arb_events() -> impl Strategy<Value = Vec<Document>> {
    prop::collection::vec(arb_value(), 1..8).prop_map(|values| {
        values
            .into_iter()
            .map(|value| {
                let doc = Document::new().with("User", "u1").with("Type", "Click");
                match value {
                    Some(v) => doc.with("Value", v),
                    None => doc,
                }
            })
            .collect()
    })
}

// Every operator whose buckets for the generated events share one key.
fn round_trip_pipelines() -> Vec<Pipeline> {
    vec![
        pipeline([]),
        pipeline([broken_down_by("Type", "Type")]),
        pipeline([sum("Value", "Total")]),
        pipeline([mean("Value", "Avg")]),
        pipeline([count_unique("User", "Users")]),
        pipeline([indexed_by("Type"), sum("Value", "Total")]),
    ]
}

proptest! {
    #[test]
    fn rereduce_of_a_single_reduce_is_identity(events in arb_events()) {
        for built in round_trip_pipelines() {
            let stage = built.root();
            for doc in mapped(stage, &events) {
                let once = stage.reduce(std::slice::from_ref(&doc)).expect("one doc");
                let again = stage.rereduce(std::slice::from_ref(&once)).expect("one doc");
                prop_assert_eq!(json(&once), json(&again));
            }
        }
    }

    #[test]
    fn regrouping_does_not_change_the_reduction(
        left in arb_events(),
        right in arb_events(),
    ) {
        for built in round_trip_pipelines() {
            let stage = built.root();
            let left = mapped(stage, &left);
            let right = mapped(stage, &right);
            let all = [left.clone(), right.clone()].concat();

            let direct = stage.reduce(&all).expect("non-empty");
            let partials = [
                stage.reduce(&left).expect("non-empty"),
                stage.reduce(&right).expect("non-empty"),
            ];
            let regrouped = stage.rereduce(&partials).expect("non-empty");
            prop_assert_eq!(json(&direct), json(&regrouped));
        }
    }

    #[test]
    fn unreduce_retracts_exactly_the_removed_documents(
        kept in arb_events(),
        removed in arb_events(),
    ) {
        for built in round_trip_pipelines() {
            let stage = built.root();
            let kept = mapped(stage, &kept);
            let removed = mapped(stage, &removed);
            let all = [kept.clone(), removed.clone()].concat();

            let mut stored = stage.reduce(&all).expect("non-empty");
            stage.unreduce(&mut stored, &removed);
            let expected = stage.reduce(&kept).expect("non-empty");
            prop_assert_eq!(json(&stored), json(&expected));
        }
    }
}
