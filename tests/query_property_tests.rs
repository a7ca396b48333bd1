//! Property tests for query normalization, plus nondeterministic-mode
//! behavior.

use molten::query::{Query, QueryConfig};
use molten::{Environment, Value};
use proptest::prelude::*;
use serde_json::json;

fn int_array(len: usize) -> Value {
    Value::Array((0..len as i64).map(Value::Integer).collect())
}

fn find(path: &str, data: &Value, config: &QueryConfig) -> Vec<Value> {
    Query::parse(path, config)
        .unwrap()
        .find(data, config)
        .unwrap()
        .values()
}

proptest! {
    /// A negative index resolves to `len - |i|` exactly when it fits, and
    /// is a miss otherwise.
    #[test]
    fn prop_negative_index_normalization(len in 0usize..12, index in -15i64..15) {
        let config = QueryConfig::default();
        let mut root = molten::Object::new();
        root.insert("a".to_string(), int_array(len));
        let data = Value::Object(root);

        let found = find(&format!("a[{index}]"), &data, &config);

        let expected = if index >= 0 && (index as usize) < len {
            vec![Value::Integer(index)]
        } else if index < 0 && index.unsigned_abs() as usize <= len && len > 0 {
            vec![Value::Integer(len as i64 + index)]
        } else {
            vec![]
        };
        prop_assert_eq!(found, expected);
    }

    /// Slicing never invents elements and preserves source order for
    /// positive steps.
    #[test]
    fn prop_slice_is_an_ordered_subset(
        len in 0usize..10,
        start in -12i64..12,
        stop in -12i64..12,
        step in 1i64..4,
    ) {
        let config = QueryConfig::default();
        let mut root = molten::Object::new();
        root.insert("a".to_string(), int_array(len));
        let data = Value::Object(root);

        let found = find(&format!("a[{start}:{stop}:{step}]"), &data, &config);
        let values: Vec<i64> = found
            .iter()
            .map(|v| v.as_integer().expect("elements are integers"))
            .collect();

        // Strictly increasing and in bounds.
        prop_assert!(values.windows(2).all(|w| w[0] < w[1]));
        prop_assert!(values.iter().all(|v| *v >= 0 && (*v as usize) < len));
    }

    /// A negative-step slice over the whole sequence is the reverse of the
    /// positive-step slice.
    #[test]
    fn prop_reverse_slice(len in 0usize..10) {
        let config = QueryConfig::default();
        let mut root = molten::Object::new();
        root.insert("a".to_string(), int_array(len));
        let data = Value::Object(root);

        let forward = find("a[::1]", &data, &config);
        let mut backward = find("a[::-1]", &data, &config);
        backward.reverse();
        prop_assert_eq!(forward, backward);
    }

    /// Re-resolving a matched node's normalized path finds exactly that
    /// node's value.
    #[test]
    fn prop_path_round_trip(len in 1usize..8) {
        let config = QueryConfig::default();
        let mut inner = molten::Object::new();
        inner.insert("items".to_string(), int_array(len));
        let mut root = molten::Object::new();
        root.insert("data".to_string(), Value::Object(inner));
        let data = Value::Object(root);

        let query = Query::parse("data.items[*]", &config).unwrap();
        let nodes = query.find(&data, &config).unwrap();
        prop_assert_eq!(nodes.len(), len);
        for node in nodes.iter() {
            let reparsed = Query::parse(&node.path(), &config).unwrap();
            let found = reparsed.find(&data, &config).unwrap();
            prop_assert_eq!(found.len(), 1);
            prop_assert_eq!(found.values(), vec![node.value.clone()]);
        }
    }
}

#[test]
fn test_nondeterministic_mode_preserves_the_value_set() {
    let deterministic = QueryConfig::default();
    let nondeterministic = QueryConfig {
        nondeterministic: true,
        ..QueryConfig::default()
    };
    let data = Value::from(json!({
        "m": {"a": 1, "b": 2, "c": 3, "d": 4, "e": 5, "f": 6, "g": 7, "h": 8}
    }));

    let stable = find("m[*]", &data, &deterministic);
    for _ in 0..10 {
        let mut shuffled = find("m[*]", &data, &nondeterministic);
        let mut expected = stable.clone();
        shuffled.sort_by_key(|v| v.as_integer());
        expected.sort_by_key(|v| v.as_integer());
        assert_eq!(shuffled, expected);
    }

    // Sequence order is preserved even in nondeterministic mode.
    let data = Value::from(json!({"a": [1, 2, 3, 4, 5]}));
    assert_eq!(
        find("a[*]", &data, &nondeterministic),
        find("a[*]", &data, &deterministic)
    );
}

#[test]
fn test_wildcard_order_is_stable_with_nondeterminism_off() {
    let config = QueryConfig::default();
    let data = Value::from(json!({"m": {"z": 1, "y": 2, "x": 3}}));
    for _ in 0..5 {
        assert_eq!(
            find("m[*]", &data, &config),
            vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]
        );
    }
}

#[test]
fn test_filter_predicate_errors_carry_the_selector_span() {
    let env = Environment::new();
    let template = env
        .from_string("{{ items[?unknown_fn(@.x)] }}")
        .unwrap();
    let err = template
        .render(Value::from(json!({"items": [1, 2]})))
        .unwrap_err();
    match err {
        molten::TemplateError::Type { span, .. } => {
            assert!(span.is_some(), "type error should be annotated with a span");
        }
        other => panic!("expected a type error, found {other:?}"),
    }
}
