//! Transaction ownership, rollback and waiting.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ntest::timeout;

use rowmap_core::schema::{ColumnSpec, Constraint};
use rowmap_core::sql::{
    Connection, DatabaseManipulator, MemoryConnection, MemoryDatabase, MemoryManipulator,
    Predicate, RowCursor, TypeSupport,
};
use rowmap_core::types::{ColumnType, SqlValue};
use rowmap_core::{DataSource, DataSourceError, SqlError, TypeKey};

use super::helpers::{memory_source, sample_customer, Customer};

/// Memory connection whose rollback can be made to fail.
struct FlakyConnection {
    inner: MemoryConnection,
    refuse_rollback: Arc<AtomicBool>,
}

impl Connection for FlakyConnection {
    fn set_auto_commit(&mut self, auto_commit: bool) -> Result<(), SqlError> {
        self.inner.set_auto_commit(auto_commit)
    }

    fn commit(&mut self) -> Result<(), SqlError> {
        self.inner.commit()
    }

    fn rollback(&mut self) -> Result<(), SqlError> {
        if self.refuse_rollback.load(Ordering::SeqCst) {
            return Err(SqlError::Connection("rollback refused".to_string()));
        }
        self.inner.rollback()
    }
}

struct FlakyManipulator(MemoryManipulator);

impl TypeSupport for FlakyManipulator {
    fn column_type(&self, type_key: &TypeKey) -> Option<ColumnType> {
        self.0.column_type(type_key)
    }
}

impl DatabaseManipulator for FlakyManipulator {
    type Connection = FlakyConnection;

    fn query(
        &self,
        connection: &mut FlakyConnection,
        table: &str,
        keys: Option<Predicate<'_>>,
        columns: Option<&[String]>,
    ) -> Result<Box<dyn RowCursor>, SqlError> {
        self.0.query(&mut connection.inner, table, keys, columns)
    }

    fn create_table(
        &self,
        connection: &mut FlakyConnection,
        table: &str,
        columns: &[ColumnSpec],
        constraints: &[Constraint],
    ) -> Result<(), SqlError> {
        self.0
            .create_table(&mut connection.inner, table, columns, constraints)
    }

    fn create_table_if_not_exists(
        &self,
        connection: &mut FlakyConnection,
        table: &str,
        columns: &[ColumnSpec],
        constraints: &[Constraint],
    ) -> Result<bool, SqlError> {
        self.0
            .create_table_if_not_exists(&mut connection.inner, table, columns, constraints)
    }

    fn drop_table_if_exists(
        &self,
        connection: &mut FlakyConnection,
        table: &str,
    ) -> Result<bool, SqlError> {
        self.0.drop_table_if_exists(&mut connection.inner, table)
    }

    fn insert(
        &self,
        connection: &mut FlakyConnection,
        table: &str,
        row: &[(String, SqlValue)],
    ) -> Result<(), SqlError> {
        self.0.insert(&mut connection.inner, table, row)
    }

    fn delete(
        &self,
        connection: &mut FlakyConnection,
        table: &str,
        predicate: Option<Predicate<'_>>,
    ) -> Result<usize, SqlError> {
        self.0.delete(&mut connection.inner, table, predicate)
    }
}

#[timeout(1000)]
#[test]
fn test_busy_law() -> anyhow::Result<()> {
    let (_database, source) = memory_source("customers")?;
    source.create_table::<Customer>()?;

    let stale = source.begin()?;
    stale.push()?;

    let first = source.begin()?;
    assert!(source.is_busy()?);
    let customer = sample_customer(1);
    assert_eq!(source.commit(None, &customer), Err(DataSourceError::Busy));
    assert_eq!(
        source.commit(Some(&stale), &customer),
        Err(DataSourceError::Busy)
    );
    assert_eq!(source.begin(), Err(DataSourceError::Busy));
    assert!(matches!(
        source.create_table_if_not_exists::<Customer>(),
        Err(DataSourceError::Busy)
    ));

    let same = source.commit(Some(&first), &customer)?;
    assert_eq!(same, first);
    first.push()?;
    assert!(!first.is_valid());
    assert!(!source.is_busy()?);

    source.commit(None, &customer)?.push()?;
    Ok(())
}

#[timeout(1000)]
#[test]
fn test_cancel_discards_work() -> anyhow::Result<()> {
    let (database, source) = memory_source("customers")?;
    source.create_table::<Customer>()?;

    let transaction = source.commit(None, &sample_customer(1))?;
    transaction.cancel();
    transaction.cancel();
    assert_eq!(transaction.last_error(), None);
    assert_eq!(database.row_count("customers"), Some(0));

    let mut lookup = Customer {
        id: 1,
        ..Default::default()
    };
    assert!(!source.pull(&mut lookup)?);
    assert!(transaction.push().is_ok());
    assert_eq!(database.row_count("customers"), Some(0));
    Ok(())
}

#[timeout(1000)]
#[test]
fn test_dropped_transaction_rolls_back() -> anyhow::Result<()> {
    let (database, source) = memory_source("customers")?;
    source.create_table::<Customer>()?;

    {
        let _transaction = source.commit(None, &sample_customer(4))?;
        assert!(source.is_busy()?);
    }
    assert!(!source.is_busy()?);
    assert_eq!(database.row_count("customers"), Some(0));
    Ok(())
}

#[timeout(1000)]
#[test]
fn test_failed_operation_cancels_own_transaction() -> anyhow::Result<()> {
    let (_database, source) = memory_source("customers")?;

    let result = source.commit(None, &sample_customer(1));
    assert!(matches!(
        result,
        Err(DataSourceError::Sql(SqlError::TableNotFound { .. }))
    ));
    assert!(!source.is_busy()?);

    source.create_table::<Customer>()?;
    let outer = source.begin()?;
    source.remove(Some(&outer), &sample_customer(1))?;
    assert!(outer.is_valid());
    outer.push()?;
    Ok(())
}

#[timeout(1000)]
#[test]
fn test_rollback_failure_is_recorded() -> anyhow::Result<()> {
    let database = MemoryDatabase::new();
    let refuse_rollback = Arc::new(AtomicBool::new(false));
    let manipulator = FlakyManipulator(MemoryManipulator::with_builtin_types()?);
    let registry = Arc::clone(manipulator.0.registry());
    let connection = FlakyConnection {
        inner: database.connect(),
        refuse_rollback: Arc::clone(&refuse_rollback),
    };
    let source = DataSource::builder(manipulator, connection)
        .table_name("customers")
        .codecs(registry)
        .build()?;
    source.create_table::<Customer>()?;

    refuse_rollback.store(true, Ordering::SeqCst);
    let transaction = source.commit(None, &sample_customer(1))?;
    transaction.cancel();
    assert!(!transaction.is_valid());
    assert_eq!(
        transaction.last_error(),
        Some(DataSourceError::Sql(SqlError::Connection(
            "rollback refused".to_string()
        )))
    );
    assert!(!source.is_busy()?);
    Ok(())
}

#[timeout(2000)]
#[test]
fn test_wait_for_transaction() -> anyhow::Result<()> {
    let (_database, source) = memory_source("customers")?;
    source.create_table::<Customer>()?;
    assert!(source.wait_for_transaction(Some(Duration::from_millis(10)))?);

    let transaction = source.begin()?;
    assert!(!source.wait_for_transaction(Some(Duration::from_millis(20)))?);

    let remote = transaction.clone();
    let pusher = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        remote.push()
    });
    assert!(source.wait_for_transaction(Some(Duration::from_millis(1500)))?);
    assert!(!source.is_busy()?);
    assert!(pusher.join().map_err(|_| anyhow::anyhow!("pusher panicked"))?.is_ok());
    Ok(())
}
