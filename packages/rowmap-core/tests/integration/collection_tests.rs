//! Map, set and list values stored in synthetic collection tables.

use std::collections::{BTreeSet, HashMap};

use ntest::timeout;

use rowmap_core::marshal::SYNTHETIC_COLLECTION_INFIX;
use rowmap_core::{DataSourceError, MalformationError, TypeKey};

use super::helpers::{memory_source, Address, Inventory, Shelf, Tally, Warehouse};

fn synthetic_tables(tables: &[String]) -> Vec<&String> {
    tables
        .iter()
        .filter(|t| t.contains(SYNTHETIC_COLLECTION_INFIX))
        .collect()
}

fn sample_inventory() -> Inventory {
    let mut inventory = Inventory {
        owner: "ada".to_string(),
        readings: vec![10, 20, 30],
        addresses: vec![
            Address {
                street: "Main St".to_string(),
                zip: Some(1000),
            },
            Address {
                street: "Side St".to_string(),
                zip: None,
            },
        ],
        ..Default::default()
    };
    inventory.counts.insert("a".to_string(), 1);
    inventory.counts.insert("b".to_string(), 2);
    inventory.labels = BTreeSet::from(["x".to_string(), "y".to_string()]);
    inventory
}

#[timeout(1000)]
#[test]
fn test_collections_round_trip() -> anyhow::Result<()> {
    let (database, source) = memory_source("inventories")?;
    source.create_table::<Inventory>()?;

    let original = sample_inventory();
    source.commit(None, &original)?.push()?;

    let tables = database.table_names();
    assert_eq!(synthetic_tables(&tables).len(), 4);
    for table in synthetic_tables(&tables) {
        assert!(table.starts_with("inventories_XXSYNTHETIC_COLLECTION_"));
    }

    let mut pulled = Inventory {
        owner: "ada".to_string(),
        ..Default::default()
    };
    assert!(source.pull(&mut pulled)?);
    assert_eq!(
        pulled.counts,
        HashMap::from([("a".to_string(), 1), ("b".to_string(), 2)])
    );
    assert_eq!(pulled.readings, vec![10, 20, 30]);
    assert_eq!(pulled, original);
    Ok(())
}

#[timeout(1000)]
#[test]
fn test_side_table_layout() -> anyhow::Result<()> {
    let (database, source) = memory_source("inventories")?;
    source.create_table::<Inventory>()?;
    source.commit(None, &sample_inventory())?.push()?;

    let tables = database.table_names();
    let mut layouts: Vec<Vec<String>> = synthetic_tables(&tables)
        .into_iter()
        .filter_map(|t| database.column_names(t))
        .collect();
    layouts.sort();
    assert_eq!(
        layouts,
        vec![
            vec!["E".to_string()],
            vec!["E".to_string()],
            vec!["K".to_string(), "V".to_string()],
            vec!["street".to_string(), "zip".to_string()],
        ]
    );
    Ok(())
}

#[timeout(1000)]
#[test]
fn test_recommit_replaces_side_tables() -> anyhow::Result<()> {
    let (database, source) = memory_source("inventories")?;
    source.create_table::<Inventory>()?;

    let mut inventory = sample_inventory();
    source.commit(None, &inventory)?.push()?;
    inventory.readings = vec![7];
    inventory.counts.clear();
    source.commit(None, &inventory)?.push()?;

    let tables = database.table_names();
    assert_eq!(synthetic_tables(&tables).len(), 4);

    let mut pulled = Inventory {
        owner: "ada".to_string(),
        ..Default::default()
    };
    assert!(source.pull(&mut pulled)?);
    assert_eq!(pulled.readings, vec![7]);
    assert!(pulled.counts.is_empty());
    Ok(())
}

#[timeout(1000)]
#[test]
fn test_remove_drops_side_tables() -> anyhow::Result<()> {
    let (database, source) = memory_source("inventories")?;
    source.create_table::<Inventory>()?;
    source.commit(None, &sample_inventory())?.push()?;

    let lookup = Inventory {
        owner: "ada".to_string(),
        ..Default::default()
    };
    source.remove(None, &lookup)?.push()?;
    assert_eq!(database.table_names(), vec!["inventories".to_string()]);
    assert_eq!(database.row_count("inventories"), Some(0));
    Ok(())
}

#[timeout(1000)]
#[test]
fn test_nested_collections_round_trip() -> anyhow::Result<()> {
    let (database, source) = memory_source("warehouses")?;
    source.create_table::<Warehouse>()?;

    let warehouse = Warehouse {
        id: 1,
        shelves: vec![
            Shelf {
                label: "top".to_string(),
                items: vec!["bolt".to_string(), "nut".to_string()],
            },
            Shelf {
                label: "bottom".to_string(),
                items: vec![],
            },
        ],
    };
    source.commit(None, &warehouse)?.push()?;
    let tables = database.table_names();
    assert_eq!(synthetic_tables(&tables).len(), 3);

    let mut pulled = Warehouse {
        id: 1,
        ..Default::default()
    };
    assert!(source.pull(&mut pulled)?);
    assert_eq!(pulled, warehouse);

    let mut shared = Warehouse {
        id: 1,
        ..Default::default()
    };
    assert!(source.pull_with_signature(
        &mut shared,
        &[TypeKey::data_object::<Shelf>(), TypeKey::of::<String>()]
    )?);
    assert_eq!(shared, warehouse);

    source.clear::<Warehouse>(None)?.push()?;
    assert_eq!(database.table_names(), vec!["warehouses".to_string()]);
    Ok(())
}

#[timeout(1000)]
#[test]
fn test_signature_exhaustion_does_not_populate() -> anyhow::Result<()> {
    let (_database, source) = memory_source("tallies")?;
    source.create_table::<Tally>()?;

    let mut tally = Tally {
        id: 1,
        ..Default::default()
    };
    tally.counts.insert("stored".to_string(), 5);
    source.commit(None, &tally)?.push()?;

    let mut target = Tally {
        id: 1,
        ..Default::default()
    };
    target.counts.insert("kept".to_string(), 9);
    let result = source.pull_with_signature(&mut target, &[TypeKey::of::<String>()]);
    assert_eq!(
        result,
        Err(DataSourceError::Malformation(
            MalformationError::UncompletedSignature {
                required: 2,
                remaining: 1
            }
        ))
    );
    assert_eq!(target.counts, HashMap::from([("kept".to_string(), 9)]));
    Ok(())
}

#[timeout(1000)]
#[test]
fn test_commit_with_signature() -> anyhow::Result<()> {
    let (_database, source) = memory_source("tallies")?;
    source.create_table::<Tally>()?;

    let mut tally = Tally {
        id: 2,
        ..Default::default()
    };
    tally.counts.insert("k".to_string(), 3);
    let signature = [TypeKey::of::<String>(), TypeKey::of::<i32>()];
    source
        .commit_with_signature(None, &tally, &signature)?
        .push()?;

    let mut pulled = Tally {
        id: 2,
        ..Default::default()
    };
    assert!(source.pull_with_signature(&mut pulled, &signature)?);
    assert_eq!(pulled, tally);

    let wrong = [TypeKey::of::<String>(), TypeKey::of::<std::time::Duration>()];
    assert!(matches!(
        source.commit_with_signature(None, &tally, &wrong),
        Err(DataSourceError::UnsupportedValueType { .. })
    ));
    assert!(!source.is_busy()?);
    Ok(())
}

#[timeout(1000)]
#[test]
fn test_rows_never_share_side_tables() -> anyhow::Result<()> {
    let (database, source) = memory_source("tallies")?;
    source.create_table::<Tally>()?;

    // These ids agree under a 32-bit checksum of the row seed.
    let (a, b) = (6994740106603527851_i64, 1691847518051450946_i64);
    let mut first = Tally {
        id: a,
        ..Default::default()
    };
    first.counts.insert("a".to_string(), 1);
    let mut second = Tally {
        id: b,
        ..Default::default()
    };
    second.counts.insert("zzz".to_string(), 99);

    source.commit(None, &first)?.push()?;
    source.commit(None, &second)?.push()?;
    let tables = database.table_names();
    assert_eq!(synthetic_tables(&tables).len(), 2);

    let mut pulled = Tally {
        id: a,
        ..Default::default()
    };
    assert!(source.pull(&mut pulled)?);
    assert_eq!(pulled.counts, HashMap::from([("a".to_string(), 1)]));

    source.remove(None, &second)?.push()?;
    let mut pulled = Tally {
        id: a,
        ..Default::default()
    };
    assert!(source.pull(&mut pulled)?);
    assert_eq!(pulled, first);
    Ok(())
}
