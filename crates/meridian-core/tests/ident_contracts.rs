//! Contract tests for identifier parsing and tree navigation.

use meridian_core::{EntityType, Error, NameIdentifier, Namespace};

#[test]
fn parses_and_renders_dotted_identifiers() {
    let table = NameIdentifier::parse("lake.hive.db1.orders").unwrap();
    assert_eq!(table.depth(), 4);
    assert_eq!(table.name(), Some("orders"));
    assert_eq!(table.namespace(), Namespace::of(["lake", "hive", "db1"]).unwrap());
    assert_eq!(table.to_string(), "lake.hive.db1.orders");
    assert_eq!("lake.hive.db1.orders".parse::<NameIdentifier>().unwrap(), table);
}

#[test]
fn rejects_empty_levels() {
    for bad in ["", "lake..db1", ".lake", "lake."] {
        assert!(
            matches!(NameIdentifier::parse(bad), Err(Error::InvalidId { .. })),
            "{bad:?} should not parse"
        );
    }
    assert!(NameIdentifier::of_catalog("lake", "hi.ve").is_err());
}

#[test]
fn parent_chain_ends_at_the_root() {
    let column = NameIdentifier::of_column("lake", "hive", "db1", "orders", "id").unwrap();
    let mut chain = vec![column.to_string()];
    let mut current = column;
    while let Some(parent) = current.parent() {
        chain.push(parent.to_string());
        current = parent;
    }
    assert_eq!(
        chain,
        [
            "lake.hive.db1.orders.id",
            "lake.hive.db1.orders",
            "lake.hive.db1",
            "lake.hive",
            "lake",
            "[root]",
        ]
    );
    assert!(current.is_root());
}

#[test]
fn entity_type_depths_match_constructors() {
    let cases = [
        (NameIdentifier::of_metalake("lake").unwrap(), EntityType::Metalake),
        (NameIdentifier::of_catalog("lake", "hive").unwrap(), EntityType::Catalog),
        (NameIdentifier::of_schema("lake", "hive", "db1").unwrap(), EntityType::Schema),
        (NameIdentifier::of_table("lake", "hive", "db1", "t").unwrap(), EntityType::Table),
        (NameIdentifier::of_fileset("lake", "hive", "db1", "f").unwrap(), EntityType::Fileset),
        (NameIdentifier::of_topic("lake", "hive", "db1", "k").unwrap(), EntityType::Topic),
        (
            NameIdentifier::of_column("lake", "hive", "db1", "t", "c").unwrap(),
            EntityType::Column,
        ),
    ];
    for (ident, entity_type) in cases {
        entity_type.check(&ident).unwrap();
        if let Some(parent_type) = entity_type.parent_type() {
            parent_type.check(&ident.parent().unwrap()).unwrap();
        }
    }
    assert!(EntityType::Table.check(&NameIdentifier::of_schema("a", "b", "c").unwrap()).is_err());
}

#[test]
fn rebase_moves_a_subtree() {
    let from = NameIdentifier::parse("lake.hive.db1").unwrap();
    let to = NameIdentifier::parse("lake.hive.sales").unwrap();
    let table = NameIdentifier::parse("lake.hive.db1.orders").unwrap();

    assert_eq!(
        table.rebase(&from, &to).unwrap().to_string(),
        "lake.hive.sales.orders"
    );
    assert!(table.is_descendant_of(&from));
    assert!(!from.is_descendant_of(&from));
    assert!(to.rebase(&from, &to).is_none());
}
