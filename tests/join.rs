use proptest::prelude::*;
use txn_enrich::{
    config::{JoinConfig, default_mappings},
    frame::Frame,
    join::{JoinKind, join},
    mapping::apply_mappings,
};

fn raw() -> Frame {
    Frame::from_literal(
        "rawsource",
        &["TransactionId", "TransactionDate", "Amount", "MerchantId", "SKU"],
        &[
            &["T1", "2023-01-01", "10.00", "M1", "SKU-A"],
            &["T2", "2023-01-02", "5.00", "M2", "SKU-B"],
            &["T3", "2023-01-03", "7.50", "", "SKU-C"],
        ],
    )
    .expect("raw frame")
}

fn merchants() -> Frame {
    Frame::from_literal(
        "merchant",
        &[
            "MerchantIdentifier",
            "MerchantCity",
            "MerchantState",
            "Zip",
            "MerchantCategoryCode",
        ],
        &[
            &["M1", "Springfield", "IL", "62704", "5812"],
            &["M9", "Shelbyville", "IL", "62565", "5411"],
            &["", "Nowhere", "ZZ", "00000", "0000"],
        ],
    )
    .expect("merchant frame")
}

fn join_config(how: JoinKind) -> JoinConfig {
    JoinConfig {
        how,
        ..JoinConfig::default()
    }
}

#[test]
fn left_join_keeps_every_left_row_and_nulls_unmatched() {
    let outcome = join(&raw(), &merchants(), &join_config(JoinKind::Left), "joined").expect("join");
    let frame = outcome.frame;
    assert_eq!(frame.len(), 3);
    assert_eq!(outcome.matched_rows, 1);
    assert_eq!(frame.columns().len(), 10);
    assert_eq!(frame.value(0, "MerchantCity"), Some("Springfield"));
    assert_eq!(frame.value(1, "MerchantIdentifier"), None);
    assert_eq!(frame.value(1, "MerchantCity"), None);
    // null keys never match, not even other null keys
    assert_eq!(frame.value(2, "MerchantCity"), None);
    assert_eq!(frame.value(2, "SKU"), Some("SKU-C"));
}

#[test]
fn duplicate_right_keys_fan_out_in_right_order() {
    let mut merchants = merchants();
    merchants
        .push_row(vec![
            Some("M1".to_string()),
            Some("Capital City".to_string()),
            Some("IL".to_string()),
            None,
            None,
        ])
        .unwrap();
    let outcome = join(&raw(), &merchants, &join_config(JoinKind::Left), "joined").expect("join");
    assert_eq!(outcome.frame.len(), 4);
    assert_eq!(outcome.matched_rows, 2);
    assert_eq!(outcome.frame.value(0, "MerchantCity"), Some("Springfield"));
    assert_eq!(outcome.frame.value(1, "MerchantCity"), Some("Capital City"));
    assert_eq!(outcome.frame.value(2, "TransactionId"), Some("T2"));
}

#[test]
fn inner_right_and_outer_joins() {
    let inner = join(&raw(), &merchants(), &join_config(JoinKind::Inner), "j").unwrap();
    assert_eq!(inner.frame.len(), 1);

    let right = join(&raw(), &merchants(), &join_config(JoinKind::Right), "j").unwrap();
    assert_eq!(right.frame.len(), 3);
    assert_eq!(right.frame.value(1, "TransactionId"), None);
    assert_eq!(right.frame.value(1, "MerchantIdentifier"), Some("M9"));
    assert_eq!(right.frame.value(2, "MerchantCity"), Some("Nowhere"));

    let outer = join(&raw(), &merchants(), &join_config(JoinKind::Outer), "j").unwrap();
    assert_eq!(outer.frame.len(), 5);
}

#[test]
fn colliding_right_columns_are_renamed() {
    let left = Frame::from_literal("l", &["id", "city"], &[&["1", "a"]]).unwrap();
    let right = Frame::from_literal("r", &["id", "city"], &[&["1", "b"]]).unwrap();
    let config = JoinConfig {
        how: JoinKind::Left,
        left_keys: vec!["id".to_string()],
        right_keys: vec!["id".to_string()],
    };
    let outcome = join(&left, &right, &config, "j").unwrap();
    assert_eq!(
        outcome.frame.columns(),
        &["id", "city", "right_id_1", "right_city_1"]
    );
    assert_eq!(outcome.frame.value(0, "right_city_1"), Some("b"));
}

#[test]
fn composite_keys_match_on_every_part() {
    let left = Frame::from_literal("l", &["a", "b"], &[&["1", "x"], &["1", "y"]]).unwrap();
    let right = Frame::from_literal("r", &["c", "d", "v"], &[&["1", "y", "hit"]]).unwrap();
    let config = JoinConfig {
        how: JoinKind::Left,
        left_keys: vec!["a".to_string(), "b".to_string()],
        right_keys: vec!["c".to_string(), "d".to_string()],
    };
    let outcome = join(&left, &right, &config, "j").unwrap();
    assert_eq!(outcome.frame.value(0, "v"), None);
    assert_eq!(outcome.frame.value(1, "v"), Some("hit"));
}

#[test]
fn missing_key_column_is_an_error() {
    let left = Frame::from_literal("l", &["id"], &[&["1"]]).unwrap();
    let err = join(&left, &merchants(), &join_config(JoinKind::Left), "j").unwrap_err();
    assert!(err.to_string().contains("MerchantId"));
}

fn merchant_id() -> impl Strategy<Value = String> {
    prop_oneof!["M[0-9]", Just(String::new())]
}

proptest! {
    #[test]
    fn left_join_preserves_left_cardinality_with_unique_merchants(
        ids in proptest::collection::vec(merchant_id(), 0..40),
        known in proptest::collection::btree_set("M[0-9]", 0..10),
    ) {
        let mut raw = Frame::new(
            "rawsource",
            ["TransactionId", "TransactionDate", "Amount", "MerchantId", "SKU"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        );
        for (idx, id) in ids.iter().enumerate() {
            raw.push_row(vec![
                Some(format!("T{idx}")),
                Some("2023-01-01".to_string()),
                Some("1.00".to_string()),
                (!id.is_empty()).then(|| id.clone()),
                Some(format!("SKU-{idx}")),
            ]).unwrap();
        }
        let mut merchants = Frame::new(
            "merchant",
            ["MerchantIdentifier", "MerchantCity", "MerchantState", "Zip", "MerchantCategoryCode"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        );
        for id in &known {
            merchants.push_row(vec![
                Some(id.clone()),
                Some(format!("City-{id}")),
                Some("IL".to_string()),
                Some("62704".to_string()),
                Some("5812".to_string()),
            ]).unwrap();
        }

        let joined = join(&raw, &merchants, &JoinConfig::default(), "joined").unwrap();
        let output = apply_mappings(&joined.frame, &default_mappings(), "mapped").unwrap();
        prop_assert_eq!(output.len(), raw.len());

        for (row_idx, (out_row, raw_row)) in output.rows().iter().zip(raw.rows()).enumerate() {
            prop_assert_eq!(&out_row[..5], &raw_row[..]);
            let matched = raw_row[3].as_ref().map(|id| known.contains(id)).unwrap_or(false);
            if matched {
                prop_assert_eq!(output.value(row_idx, "MerchantIdentifier"), raw_row[3].as_deref());
            } else {
                prop_assert!(out_row[5..].iter().all(Option::is_none));
            }
        }
    }
}
