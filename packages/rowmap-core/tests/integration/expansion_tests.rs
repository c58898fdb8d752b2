//! Values stored through expand rules, and extractor type checks.

use std::sync::Arc;

use ntest::timeout;

use rowmap_core::dataobject::{ExpandRule, ExpandRuleBuilder};
use rowmap_core::interpreter::{DataObject, Declaration};
use rowmap_core::sql::{MemoryDatabase, MemoryManipulator, RowCursor};
use rowmap_core::types::{
    AnyValue, DataExtractor, DataExtractorFactory, RegistryExtractorFactory, TypeKey,
};
use rowmap_core::{DataSource, DataSourceConfig, DataSourceError};

use super::helpers::{memory_source, sample_customer, Address, Customer};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Point {
    x: i32,
    y: i32,
}

impl Point {
    fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    fn y(&self) -> i32 {
        self.y
    }

    fn set_y(&mut self, y: i32) {
        self.y = y;
    }
}

fn point_rule() -> ExpandRuleBuilder<Point> {
    ExpandRule::builder::<Point>()
        .field::<i32>("x", |p| &p.x, |p| &mut p.x)
        .method("y", "y", Point::y, "set_y", Point::set_y)
}

fn seconds(stamp: &i64) -> i64 {
    stamp / 1000
}

fn set_seconds(stamp: &mut i64, seconds: i64) {
    *stamp = seconds * 1000 + *stamp % 1000;
}

fn millis(stamp: &i64) -> i64 {
    stamp % 1000
}

fn set_millis(stamp: &mut i64, millis: i64) {
    *stamp = *stamp / 1000 * 1000 + millis;
}

/// Keeps only the street of an address.
fn street_rule() -> ExpandRuleBuilder<Address> {
    ExpandRule::builder::<Address>().field::<String>("line", |a| &a.street, |a| &mut a.street)
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Sketch {
    pub id: i64,
    pub origin: Point,
    pub tip: Option<Point>,
    pub stamp: i64,
    pub billing: Address,
}

impl DataObject for Sketch {
    fn declare(d: &mut Declaration<Self>) {
        d.unique();
        d.field("id", |s| &s.id, |s| &mut s.id).key("");
        d.field("origin", |s| &s.origin, |s| &mut s.origin)
            .value("")
            .expandable(point_rule());
        d.optional_field("tip", |s| &s.tip, |s| &mut s.tip)
            .value("")
            .expandable(point_rule());
        d.field("stamp", |s| &s.stamp, |s| &mut s.stamp)
            .value("")
            .expand_forcibly()
            .expandable(
                ExpandRule::builder::<i64>()
                    .method::<i64>("seconds", "seconds", seconds, "set_seconds", set_seconds)
                    .method::<i64>("millis", "millis", millis, "set_millis", set_millis),
            );
        d.element_field("billing", |s| &s.billing, |s| &mut s.billing)
            .value("")
            .expand_forcibly()
            .expandable(street_rule());
    }
}

fn sample_sketch(id: i64) -> Sketch {
    Sketch {
        id,
        origin: Point::new(3, 4),
        tip: Some(Point::new(7, 8)),
        stamp: 12_345,
        billing: Address {
            street: "Dock Rd".to_string(),
            zip: Some(5),
        },
    }
}

#[timeout(1000)]
#[test]
fn test_expanded_columns() -> anyhow::Result<()> {
    let (_database, source) = memory_source("sketches")?;
    let schema = source.table_schema::<Sketch>()?;
    assert_eq!(
        schema.column_names(),
        vec![
            "id",
            "origin_x",
            "origin_y",
            "tip_x",
            "tip_y",
            "stamp_seconds",
            "stamp_millis",
            "billing_line",
        ]
    );
    Ok(())
}

#[timeout(1000)]
#[test]
fn test_expanded_values_round_trip_into_fresh_object() -> anyhow::Result<()> {
    let (_database, source) = memory_source("sketches")?;
    source.create_table::<Sketch>()?;
    source.commit(None, &sample_sketch(2))?.push()?;

    let mut pulled = Sketch {
        id: 2,
        ..Default::default()
    };
    assert!(source.pull(&mut pulled)?);
    assert_eq!(pulled.origin, Point::new(3, 4));
    assert_eq!(pulled.tip, Some(Point::new(7, 8)));
    assert_eq!(pulled.stamp, 12_345);
    assert_eq!(pulled.billing.street, "Dock Rd");
    assert_eq!(pulled.billing.zip, None);
    Ok(())
}

#[timeout(1000)]
#[test]
fn test_absent_optional_expansion() -> anyhow::Result<()> {
    let (_database, source) = memory_source("sketches")?;
    source.create_table::<Sketch>()?;
    let sketch = Sketch {
        tip: None,
        ..sample_sketch(3)
    };
    source.commit(None, &sketch)?.push()?;

    let mut pulled = Sketch {
        id: 3,
        tip: Some(Point::new(1, 1)),
        ..Default::default()
    };
    assert!(source.pull(&mut pulled)?);
    assert_eq!(pulled.tip, None);
    assert_eq!(pulled.origin, Point::new(3, 4));
    Ok(())
}

/// Hands back `i32` columns as `i64`.
struct WideningExtractors(RegistryExtractorFactory);

struct Widening(Box<dyn DataExtractor>);

impl DataExtractor for Widening {
    fn extract(&self, row: &dyn RowCursor) -> Result<Option<AnyValue>, DataSourceError> {
        Ok(self.0.extract(row)?.map(|value| match value.downcast::<i32>() {
            Ok(narrow) => Box::new(i64::from(*narrow)) as AnyValue,
            Err(other) => other,
        }))
    }
}

impl DataExtractorFactory for WideningExtractors {
    fn create(&self, type_key: &TypeKey, column: &str) -> Option<Box<dyn DataExtractor>> {
        let inner = self.0.create(type_key, column)?;
        if type_key.is::<i32>() {
            Some(Box::new(Widening(inner)))
        } else {
            Some(inner)
        }
    }
}

#[timeout(1000)]
#[test]
fn test_extracted_type_must_match_declaration() -> anyhow::Result<()> {
    let database = MemoryDatabase::new();
    let manipulator = MemoryManipulator::with_builtin_types()?;
    let registry = Arc::clone(manipulator.registry());
    let widening = WideningExtractors(RegistryExtractorFactory::new(Arc::clone(&registry)));
    let source = DataSource::builder(manipulator, database.connect())
        .config(DataSourceConfig::for_table("customers"))
        .codecs(registry)
        .extractors(Box::new(widening))
        .build()?;
    source.create_table::<Customer>()?;
    source.commit(None, &sample_customer(1))?.push()?;

    let mut pulled = Customer {
        id: 1,
        ..Default::default()
    };
    match source.pull(&mut pulled) {
        Err(DataSourceError::BadType { column, expected }) => {
            assert_eq!(column, "age");
            assert!(expected.contains("i32"));
        }
        other => panic!("unexpected {other:?}"),
    }
    Ok(())
}
