//! Property tests for canonical serialization

use flowhub_graph::{canonical_node, canonical_value, Node, NodeKind, OutputFormat, Position};
use proptest::prelude::*;
use serde_json::{json, Value};

fn arb_json(depth: u32) -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        "[a-z]{0,8}".prop_map(Value::String),
    ];
    leaf.prop_recursive(depth, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

proptest! {
    #[test]
    fn canonical_value_is_idempotent(value in arb_json(3)) {
        let once = canonical_value(&value);
        let twice = canonical_value(&once);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn canonical_value_is_insertion_order_free(
        entries in prop::collection::btree_map("[a-z]{1,6}", arb_json(2), 0..6)
    ) {
        let forward: Value = Value::Object(entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect());
        let reversed: Value = Value::Object(entries.into_iter().rev().collect());

        prop_assert_eq!(canonical_value(&forward), canonical_value(&reversed));
    }

    #[test]
    fn canonical_node_ignores_position(x in -1000.0f64..1000.0, y in -1000.0f64..1000.0) {
        let mut node = Node::new("n", NodeKind::Output { format: OutputFormat::Auto });
        let without = canonical_node(&node);
        node.position = Some(Position { x, y });
        prop_assert_eq!(without, canonical_node(&node));
    }
}
