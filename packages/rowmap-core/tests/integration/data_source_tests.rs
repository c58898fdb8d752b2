//! Row-level operations on scalar, element and keyed data objects.

use std::io::Write;

use ntest::timeout;

use rowmap_core::schema::Constraint;
use rowmap_core::sql::MemoryDatabase;
use rowmap_core::{DataSource, DataSourceConfig, DataSourceError};

use super::helpers::{
    memory_source, sample_customer, Address, Customer, Enrollment, Member, Profile,
};

#[timeout(1000)]
#[test]
fn test_scalar_round_trip() -> anyhow::Result<()> {
    let (database, source) = memory_source("customers")?;
    source.create_table::<Customer>()?;

    let original = sample_customer(7);
    source.commit(None, &original)?.push()?;
    assert_eq!(database.row_count("customers"), Some(1));

    let mut pulled = Customer {
        id: 7,
        ..Default::default()
    };
    assert!(source.pull(&mut pulled)?);
    assert_eq!(pulled, original);
    Ok(())
}

#[timeout(1000)]
#[test]
fn test_pull_missing_row_leaves_object_untouched() -> anyhow::Result<()> {
    let (_database, source) = memory_source("customers")?;
    source.create_table::<Customer>()?;

    let mut lookup = Customer {
        id: 99,
        name: "untouched".to_string(),
        ..Default::default()
    };
    assert!(!source.pull(&mut lookup)?);
    assert_eq!(lookup.name, "untouched");
    Ok(())
}

#[timeout(1000)]
#[test]
fn test_optional_element_absent_and_present() -> anyhow::Result<()> {
    let (_database, source) = memory_source("customers")?;
    source.create_table::<Customer>()?;

    let mut with_office = sample_customer(2);
    with_office.office = Some(Address {
        street: "Dock Rd".to_string(),
        zip: None,
    });
    with_office.nickname = None;
    let without_office = sample_customer(3);

    let transaction = source.begin()?;
    source.commit(Some(&transaction), &with_office)?;
    source.commit(Some(&transaction), &without_office)?;
    transaction.push()?;

    let mut pulled = Customer {
        id: 2,
        office: None,
        nickname: Some("stale".to_string()),
        ..Default::default()
    };
    assert!(source.pull(&mut pulled)?);
    assert_eq!(pulled.office, with_office.office);
    assert_eq!(pulled.nickname, None);

    let mut pulled = Customer {
        id: 3,
        office: Some(Address::default()),
        ..Default::default()
    };
    assert!(source.pull(&mut pulled)?);
    assert_eq!(pulled.office, None);
    Ok(())
}

#[timeout(1000)]
#[test]
fn test_commit_replaces_row() -> anyhow::Result<()> {
    let (database, source) = memory_source("customers")?;
    source.create_table::<Customer>()?;

    let mut customer = sample_customer(1);
    source.commit(None, &customer)?.push()?;
    customer.name = "renamed".to_string();
    source.commit(None, &customer)?.push()?;

    assert_eq!(database.row_count("customers"), Some(1));
    let all = source.pull_all::<Customer>()?;
    assert_eq!(all, vec![customer]);
    Ok(())
}

#[timeout(1000)]
#[test]
fn test_not_null_metadata_reaches_schema() -> anyhow::Result<()> {
    let (_database, source) = memory_source("customers")?;
    let schema = source.table_schema::<Customer>()?;
    assert!(schema.column("name").map(|c| c.is_not_null()).unwrap_or(false));
    assert!(!schema.column("nickname").map(|c| c.is_not_null()).unwrap_or(true));
    Ok(())
}

#[timeout(1000)]
#[test]
fn test_schema_aggregates_primary_and_secondary_keys() -> anyhow::Result<()> {
    let (_database, source) = memory_source("enrollments")?;
    let schema = source.table_schema::<Enrollment>()?;
    assert_eq!(schema.column_names(), vec!["course", "student", "grade"]);
    assert_eq!(
        schema.constraints,
        vec![Constraint::PrimaryKey(vec![
            "course".to_string(),
            "student".to_string()
        ])]
    );
    Ok(())
}

#[timeout(1000)]
#[test]
fn test_null_key_is_reported() -> anyhow::Result<()> {
    let (_database, source) = memory_source("enrollments")?;
    source.create_table::<Enrollment>()?;

    let mut lookup = Enrollment {
        course: 1,
        student: None,
        grade: 0,
    };
    let result = source.pull(&mut lookup);
    assert_eq!(
        result,
        Err(DataSourceError::NullKey {
            operation: "pull",
            role: "secondary key",
            name: "student".to_string(),
            shape: "multiple",
        })
    );
    assert!(matches!(
        source.commit(None, &lookup),
        Err(DataSourceError::NullKey {
            operation: "commit",
            ..
        })
    ));
    assert!(!source.is_busy()?);
    Ok(())
}

#[timeout(1000)]
#[test]
fn test_vague_pull_and_remove() -> anyhow::Result<()> {
    let (database, source) = memory_source("enrollments")?;
    source.create_table::<Enrollment>()?;

    let transaction = source.begin()?;
    for (course, student, grade) in [(1, 10, 3), (1, 11, 4), (2, 10, 5)] {
        let enrollment = Enrollment {
            course,
            student: Some(student),
            grade,
        };
        source.commit(Some(&transaction), &enrollment)?;
    }
    transaction.push()?;

    let lookup = Enrollment {
        course: 1,
        student: None,
        grade: 0,
    };
    let mut grades: Vec<i32> = source
        .pull_vaguely(&lookup)?
        .into_iter()
        .map(|e| e.grade)
        .collect();
    grades.sort();
    assert_eq!(grades, vec![3, 4]);

    source.remove_vaguely(None, &lookup)?.push()?;
    assert_eq!(database.row_count("enrollments"), Some(1));

    let last = Enrollment {
        course: 2,
        student: Some(10),
        grade: 0,
    };
    source.remove(None, &last)?.push()?;
    assert_eq!(database.row_count("enrollments"), Some(0));
    Ok(())
}

#[timeout(1000)]
#[test]
fn test_clear_empties_table() -> anyhow::Result<()> {
    let (database, source) = memory_source("customers")?;
    source.create_table::<Customer>()?;
    for id in 1..=3 {
        source.commit(None, &sample_customer(id))?.push()?;
    }
    source.clear::<Customer>(None)?.push()?;
    assert_eq!(database.row_count("customers"), Some(0));
    assert!(source.pull_all::<Customer>()?.is_empty());
    Ok(())
}

#[timeout(1000)]
#[test]
fn test_inherited_values_round_trip() -> anyhow::Result<()> {
    let (_database, source) = memory_source("members")?;
    assert!(source.create_table_if_not_exists::<Member>()?);
    assert!(!source.create_table_if_not_exists::<Member>()?);
    assert_eq!(
        source.table_schema::<Member>()?.column_names(),
        vec!["id", "handle", "level"]
    );

    let member = Member {
        profile: Profile {
            id: 5,
            handle: "ada".to_string(),
        },
        level: 9,
    };
    source.commit(None, &member)?.push()?;

    let mut pulled = Member::default();
    pulled.profile.id = 5;
    assert!(source.pull(&mut pulled)?);
    assert_eq!(pulled, member);
    Ok(())
}

#[timeout(1000)]
#[test]
fn test_element_type_cannot_own_a_table() -> anyhow::Result<()> {
    let (_database, source) = memory_source("addresses")?;
    assert!(source.create_table::<Address>().is_err());
    Ok(())
}

#[timeout(1000)]
#[test]
fn test_create_table_twice_fails() -> anyhow::Result<()> {
    let (_database, source) = memory_source("customers")?;
    source.create_table::<Customer>()?;
    assert!(matches!(
        source.create_table::<Customer>(),
        Err(DataSourceError::Sql(_))
    ));
    assert!(!source.is_busy()?);
    Ok(())
}

#[timeout(1000)]
#[test]
fn test_source_from_config_file() -> anyhow::Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    write!(
        file,
        r#"{{"table_name": "people", "transaction_wait_timeout_ms": 20}}"#
    )?;
    let config = DataSourceConfig::from_file(file.path())?;

    let database = MemoryDatabase::new();
    let source = DataSource::memory(&database, config)?;
    assert_eq!(source.table_name(), "people");
    source.create_table::<Customer>()?;
    assert_eq!(database.table_names(), vec!["people".to_string()]);
    Ok(())
}
