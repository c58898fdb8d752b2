//! Shared data objects and fixtures.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use rowmap_core::interpreter::{DataObject, Declaration};
use rowmap_core::sql::{MemoryDatabase, MemoryManipulator};
use rowmap_core::{DataSource, DataSourceConfig, TypeKey};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Address {
    pub street: String,
    pub zip: Option<i32>,
}

impl DataObject for Address {
    fn declare(d: &mut Declaration<Self>) {
        d.element();
        d.field("street", |a| &a.street, |a| &mut a.street).value("");
        d.optional_field("zip", |a| &a.zip, |a| &mut a.zip).value("");
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Customer {
    pub id: i64,
    pub name: String,
    pub age: i32,
    pub vip: bool,
    pub score: f64,
    pub nickname: Option<String>,
    pub home: Address,
    pub office: Option<Address>,
    /// Not mapped
    pub session: u32,
}

impl DataObject for Customer {
    fn declare(d: &mut Declaration<Self>) {
        d.unique();
        d.field("id", |c| &c.id, |c| &mut c.id).key("");
        d.field("name", |c| &c.name, |c| &mut c.name)
            .value("")
            .not_null();
        d.field("age", |c| &c.age, |c| &mut c.age).value("");
        d.field("vip", |c| &c.vip, |c| &mut c.vip).value("");
        d.field("score", |c| &c.score, |c| &mut c.score).value("");
        d.optional_field("nickname", |c| &c.nickname, |c| &mut c.nickname)
            .value("");
        d.element_field("home", |c| &c.home, |c| &mut c.home).value("");
        d.optional_element_field("office", |c| &c.office, |c| &mut c.office)
            .value("");
        d.field("session", |c| &c.session, |c| &mut c.session);
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Inventory {
    pub owner: String,
    pub counts: HashMap<String, i32>,
    pub readings: Vec<i32>,
    pub labels: BTreeSet<String>,
    pub addresses: Vec<Address>,
}

impl DataObject for Inventory {
    fn declare(d: &mut Declaration<Self>) {
        d.unique();
        d.field("owner", |i| &i.owner, |i| &mut i.owner).key("");
        d.map_field("counts", |i| &i.counts, |i| &mut i.counts)
            .value("")
            .signature(&[TypeKey::of::<String>(), TypeKey::of::<i32>()]);
        d.list_field("readings", |i| &i.readings, |i| &mut i.readings)
            .value("")
            .signature(&[TypeKey::of::<i32>()]);
        d.set_field("labels", |i| &i.labels, |i| &mut i.labels)
            .value("")
            .signature(&[TypeKey::of::<String>()]);
        d.list_field("addresses", |i| &i.addresses, |i| &mut i.addresses)
            .value("")
            .signature(&[TypeKey::data_object::<Address>()]);
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Shelf {
    pub label: String,
    pub items: Vec<String>,
}

impl DataObject for Shelf {
    fn declare(d: &mut Declaration<Self>) {
        d.element();
        d.field("label", |s| &s.label, |s| &mut s.label).value("");
        d.list_field("items", |s| &s.items, |s| &mut s.items)
            .value("")
            .signature(&[TypeKey::of::<String>()]);
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Warehouse {
    pub id: i64,
    pub shelves: Vec<Shelf>,
}

impl DataObject for Warehouse {
    fn declare(d: &mut Declaration<Self>) {
        d.unique();
        d.field("id", |w| &w.id, |w| &mut w.id).key("");
        d.list_field("shelves", |w| &w.shelves, |w| &mut w.shelves)
            .value("")
            .signature(&[TypeKey::data_object::<Shelf>()]);
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Tally {
    pub id: i64,
    pub counts: HashMap<String, i32>,
}

impl DataObject for Tally {
    fn declare(d: &mut Declaration<Self>) {
        d.unique();
        d.field("id", |t| &t.id, |t| &mut t.id).key("");
        d.map_field("counts", |t| &t.counts, |t| &mut t.counts)
            .value("")
            .signature(&[TypeKey::of::<String>(), TypeKey::of::<i32>()]);
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Enrollment {
    pub course: i64,
    pub student: Option<i64>,
    pub grade: i32,
}

impl DataObject for Enrollment {
    fn declare(d: &mut Declaration<Self>) {
        d.multiple();
        d.field("course", |e| &e.course, |e| &mut e.course)
            .primary_key("");
        d.optional_field("student", |e| &e.student, |e| &mut e.student)
            .secondary_key("");
        d.field("grade", |e| &e.grade, |e| &mut e.grade).value("");
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Profile {
    pub id: i64,
    pub handle: String,
}

impl DataObject for Profile {
    fn declare(d: &mut Declaration<Self>) {
        d.unique();
        d.field("id", |p| &p.id, |p| &mut p.id).key("");
        d.field("handle", |p| &p.handle, |p| &mut p.handle).value("");
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Member {
    pub profile: Profile,
    pub level: i32,
}

impl DataObject for Member {
    fn declare(d: &mut Declaration<Self>) {
        d.unique();
        d.inherit(|m| &m.profile, |m| &mut m.profile);
        d.field("level", |m| &m.level, |m| &mut m.level).value("");
    }
}

pub fn memory_source(
    table: &str,
) -> anyhow::Result<(Arc<MemoryDatabase>, DataSource<MemoryManipulator>)> {
    let database = MemoryDatabase::new();
    let source = DataSource::memory(&database, DataSourceConfig::for_table(table))?;
    Ok((database, source))
}

pub fn sample_customer(id: i64) -> Customer {
    Customer {
        id,
        name: format!("customer {}", id),
        age: 30 + id as i32,
        vip: id % 2 == 0,
        score: 1.5 * id as f64,
        nickname: Some("nick".to_string()),
        home: Address {
            street: "Main St".to_string(),
            zip: Some(1000 + id as i32),
        },
        office: None,
        session: 0,
    }
}
