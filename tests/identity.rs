use tributary::core::identity::{resolve, resolve_id, IdentityResolver};
use tributary::LineageError;

#[test]
fn case_variants_resolve_to_one_id() {
    let lower = resolve_id("analytics.public.orders").unwrap();
    let mixed = resolve_id("Analytics.PUBLIC.Orders").unwrap();
    let padded = resolve_id("  ANALYTICS . public . orders ").unwrap();

    assert_eq!(lower, "ANALYTICS.PUBLIC.ORDERS");
    assert_eq!(lower, mixed);
    assert_eq!(lower, padded);
}

#[test]
fn four_parts_name_a_column() {
    let column = resolve("analytics.public.orders.amount").unwrap();

    assert!(column.is_column());
    assert_eq!(column.object_id(), "ANALYTICS.PUBLIC.ORDERS.AMOUNT");
    assert_eq!(column.table_id(), "ANALYTICS.PUBLIC.ORDERS");
    assert_eq!(column.object_name(), "AMOUNT");
}

#[test]
fn quoted_parts_keep_dots_and_spaces() {
    let quoted = resolve(r#""raw.db".staging."Order Lines""#).unwrap();

    assert_eq!(quoted.database, "RAW.DB");
    assert_eq!(quoted.schema, "STAGING");
    assert_eq!(quoted.table, "ORDER LINES");
    assert!(!quoted.is_column());
}

#[test]
fn dotted_quoted_part_keeps_a_distinct_id() {
    let table = resolve(r#""a.b".c.d"#).unwrap();
    let column = resolve("a.b.c.d").unwrap();

    assert_eq!(table.object_id(), r#""A.B".C.D"#);
    assert_eq!(column.object_id(), "A.B.C.D");
    assert_ne!(table.object_id(), column.object_id());
}

#[test]
fn object_ids_resolve_back_to_themselves() {
    for raw in [
        r#""raw.db".staging."Order Lines""#,
        r#"db.s."say ""hi""""#,
        r#"db."my schema".t.c"#,
        "db.s.t",
    ] {
        let object_ref = resolve(raw).unwrap();
        let id = object_ref.object_id();
        assert_eq!(resolve(&id).unwrap(), object_ref, "{raw:?}");
        assert_eq!(resolve_id(&id).unwrap(), id);
    }
}

#[test]
fn doubled_quote_is_an_escaped_quote() {
    let quoted = resolve(r#"db.s."say ""hi""""#).unwrap();
    assert_eq!(quoted.table, r#"SAY "HI""#);
}

#[test]
fn bare_and_partial_names_are_rejected() {
    for raw in ["orders", "public.orders", "", "   "] {
        let err = resolve(raw).unwrap_err();
        assert!(
            matches!(err, LineageError::Identity { .. }),
            "{raw:?} should be an identity error, got {err}"
        );
    }
}

#[test]
fn malformed_references_are_rejected() {
    for raw in [
        "a.b.c.d.e",
        "a..c",
        "1db.public.orders",
        "db.public.or-ders",
        r#""unterminated.public.orders"#,
        r#"db."x"y.t"#,
    ] {
        assert!(
            matches!(resolve(raw), Err(LineageError::Identity { .. })),
            "{raw:?} should be rejected"
        );
    }
}

#[test]
fn resolver_memoizes_raw_references() {
    let resolver = IdentityResolver::new();
    assert!(resolver.is_empty());

    let first = resolver.resolve("db.s.t").unwrap();
    let second = resolver.resolve("db.s.t").unwrap();
    assert_eq!(first, second);
    assert_eq!(resolver.len(), 1);

    assert!(resolver.resolve("t").is_err());
    assert_eq!(resolver.len(), 1);
}

#[test]
fn resolver_memo_is_bounded() {
    let resolver = IdentityResolver::with_capacity(2);
    for table in ["a", "b", "c", "d"] {
        resolver.resolve(&format!("db.s.{table}")).unwrap();
    }
    assert!(resolver.len() <= 2);
}
