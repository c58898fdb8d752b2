//! In-memory executor.
//!
//! Tables live in a copy-on-write snapshot. A connection works on a private
//! copy of the snapshot from its first write until commit or rollback, so
//! uncommitted changes are invisible to other connections. Concurrent
//! committers do not merge: the last commit wins.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

use super::manipulator::{Connection, DatabaseManipulator, Predicate, RowCursor, TypeSupport};
use crate::error::SqlError;
use crate::schema::{ColumnSpec, Constraint};
use crate::types::{ColumnType, SqlValue, TypeError, TypeKey, TypeRegistry};

#[derive(Debug, Clone)]
struct MemoryTable {
    columns: Vec<ColumnSpec>,
    /// Column indices of the primary key, in declaration order
    primary_key: Vec<usize>,
    rows: Vec<Vec<SqlValue>>,
}

impl MemoryTable {
    fn index_of(&self, table: &str, column: &str) -> Result<usize, SqlError> {
        self.columns
            .iter()
            .position(|c| c.name == column)
            .ok_or_else(|| SqlError::ColumnNotFound {
                table: table.to_string(),
                column: column.to_string(),
            })
    }

    fn compile(
        &self,
        table: &str,
        predicate: Option<Predicate<'_>>,
    ) -> Result<Vec<(usize, SqlValue)>, SqlError> {
        predicate
            .unwrap_or(&[])
            .iter()
            .map(|(column, value)| Ok((self.index_of(table, column)?, value.clone())))
            .collect()
    }

    fn is_not_null(&self, index: usize) -> bool {
        self.primary_key.contains(&index)
            || self.columns[index]
                .constraints
                .iter()
                .any(|c| matches!(c, Constraint::NotNull))
    }
}

/// NULL never matches.
fn matches(row: &[SqlValue], filter: &[(usize, SqlValue)]) -> bool {
    filter
        .iter()
        .all(|(index, value)| !value.is_null() && row[*index] == *value)
}

type Tables = HashMap<String, MemoryTable>;

/// Shared storage of in-memory tables.
#[derive(Debug)]
pub struct MemoryDatabase {
    committed: ArcSwap<Tables>,
}

impl MemoryDatabase {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            committed: ArcSwap::from_pointee(HashMap::new()),
        })
    }

    /// Opens a connection in auto-commit mode.
    pub fn connect(self: &Arc<Self>) -> MemoryConnection {
        MemoryConnection {
            database: Arc::clone(self),
            working: None,
            auto_commit: true,
        }
    }

    /// Committed table names, sorted.
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.committed.load().keys().cloned().collect();
        names.sort();
        names
    }

    /// Committed row count of a table.
    pub fn row_count(&self, table: &str) -> Option<usize> {
        self.committed.load().get(table).map(|t| t.rows.len())
    }

    /// Committed column names of a table.
    pub fn column_names(&self, table: &str) -> Option<Vec<String>> {
        self.committed
            .load()
            .get(table)
            .map(|t| t.columns.iter().map(|c| c.name.clone()).collect())
    }
}

/// A connection to a [`MemoryDatabase`].
pub struct MemoryConnection {
    database: Arc<MemoryDatabase>,
    /// Private copy holding uncommitted changes
    working: Option<Tables>,
    auto_commit: bool,
}

impl MemoryConnection {
    pub fn database(&self) -> &Arc<MemoryDatabase> {
        &self.database
    }

    pub fn is_auto_commit(&self) -> bool {
        self.auto_commit
    }

    /// Whether uncommitted changes exist.
    pub fn in_transaction(&self) -> bool {
        self.working.is_some()
    }

    fn read<R>(&self, f: impl FnOnce(&Tables) -> Result<R, SqlError>) -> Result<R, SqlError> {
        match &self.working {
            Some(working) => f(working),
            None => f(&self.database.committed.load_full()),
        }
    }

    /// Runs one statement against the working copy.
    ///
    /// Statements validate before they mutate, so a failed statement leaves
    /// the working copy as it was.
    fn write<R>(
        &mut self,
        f: impl FnOnce(&mut Tables) -> Result<R, SqlError>,
    ) -> Result<R, SqlError> {
        let mut working = match self.working.take() {
            Some(working) => working,
            None => (*self.database.committed.load_full()).clone(),
        };
        let result = f(&mut working);
        if self.auto_commit {
            if result.is_ok() {
                self.database.committed.store(Arc::new(working));
            }
        } else {
            self.working = Some(working);
        }
        result
    }
}

impl Connection for MemoryConnection {
    fn set_auto_commit(&mut self, auto_commit: bool) -> Result<(), SqlError> {
        if auto_commit && !self.auto_commit {
            self.commit()?;
        }
        self.auto_commit = auto_commit;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), SqlError> {
        if let Some(working) = self.working.take() {
            self.database.committed.store(Arc::new(working));
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), SqlError> {
        self.working = None;
        Ok(())
    }
}

impl std::fmt::Debug for MemoryConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryConnection")
            .field("auto_commit", &self.auto_commit)
            .field("in_transaction", &self.in_transaction())
            .finish()
    }
}

/// Materialized query result.
#[derive(Debug, Clone)]
pub struct MemoryCursor {
    columns: Vec<String>,
    rows: std::vec::IntoIter<Vec<SqlValue>>,
    current: Option<Vec<SqlValue>>,
}

impl MemoryCursor {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self {
            columns,
            rows: rows.into_iter(),
            current: None,
        }
    }
}

impl RowCursor for MemoryCursor {
    fn next(&mut self) -> Result<bool, SqlError> {
        self.current = self.rows.next();
        Ok(self.current.is_some())
    }

    fn get(&self, column: &str) -> Result<SqlValue, SqlError> {
        let row = self.current.as_ref().ok_or(SqlError::NoCurrentRow)?;
        let index = self
            .columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| SqlError::ColumnNotFound {
                table: "<result>".to_string(),
                column: column.to_string(),
            })?;
        Ok(row[index].clone())
    }

    fn columns(&self) -> &[String] {
        &self.columns
    }
}

/// Executor over [`MemoryConnection`]s.
///
/// Enforces column existence, column types, NOT NULL and primary key
/// uniqueness. Rows keep insertion order.
#[derive(Debug, Clone)]
pub struct MemoryManipulator {
    registry: Arc<TypeRegistry>,
}

impl MemoryManipulator {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self { registry }
    }

    pub fn with_builtin_types() -> Result<Self, TypeError> {
        Ok(Self::new(Arc::new(TypeRegistry::with_builtin_types()?)))
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    fn build_table(
        table: &str,
        columns: &[ColumnSpec],
        constraints: &[Constraint],
    ) -> Result<MemoryTable, SqlError> {
        for (index, column) in columns.iter().enumerate() {
            if columns[..index].iter().any(|c| c.name == column.name) {
                return Err(SqlError::DuplicatedColumn {
                    table: table.to_string(),
                    column: column.name.clone(),
                });
            }
        }
        let mut memory = MemoryTable {
            columns: columns.to_vec(),
            primary_key: Vec::new(),
            rows: Vec::new(),
        };
        for constraint in constraints {
            if let Constraint::PrimaryKey(names) = constraint {
                memory.primary_key = names
                    .iter()
                    .map(|name| memory.index_of(table, name))
                    .collect::<Result<_, _>>()?;
            }
        }
        Ok(memory)
    }
}

impl TypeSupport for MemoryManipulator {
    fn column_type(&self, type_key: &TypeKey) -> Option<ColumnType> {
        self.registry.column_type(type_key)
    }
}

fn table_not_found(table: &str) -> SqlError {
    SqlError::TableNotFound {
        table: table.to_string(),
    }
}

impl DatabaseManipulator for MemoryManipulator {
    type Connection = MemoryConnection;

    fn query(
        &self,
        connection: &mut MemoryConnection,
        table: &str,
        keys: Option<Predicate<'_>>,
        columns: Option<&[String]>,
    ) -> Result<Box<dyn RowCursor>, SqlError> {
        tracing::trace!("SELECT FROM {} (keys: {:?})", table, keys);
        connection.read(|tables| {
            let memory = tables.get(table).ok_or_else(|| table_not_found(table))?;
            let filter = memory.compile(table, keys)?;
            let projection: Vec<usize> = match columns {
                Some(columns) => columns
                    .iter()
                    .map(|c| memory.index_of(table, c))
                    .collect::<Result<_, _>>()?,
                None => (0..memory.columns.len()).collect(),
            };
            let names = projection
                .iter()
                .map(|i| memory.columns[*i].name.clone())
                .collect();
            let rows = memory
                .rows
                .iter()
                .filter(|row| matches(row, &filter))
                .map(|row| projection.iter().map(|i| row[*i].clone()).collect())
                .collect();
            Ok(Box::new(MemoryCursor::new(names, rows)) as Box<dyn RowCursor>)
        })
    }

    fn create_table(
        &self,
        connection: &mut MemoryConnection,
        table: &str,
        columns: &[ColumnSpec],
        constraints: &[Constraint],
    ) -> Result<(), SqlError> {
        let memory = Self::build_table(table, columns, constraints)?;
        connection.write(|tables| {
            if tables.contains_key(table) {
                return Err(SqlError::TableAlreadyExists(table.to_string()));
            }
            tables.insert(table.to_string(), memory);
            tracing::debug!("Created table {} ({} columns)", table, columns.len());
            Ok(())
        })
    }

    fn create_table_if_not_exists(
        &self,
        connection: &mut MemoryConnection,
        table: &str,
        columns: &[ColumnSpec],
        constraints: &[Constraint],
    ) -> Result<bool, SqlError> {
        if connection.read(|tables| Ok(tables.contains_key(table)))? {
            return Ok(false);
        }
        self.create_table(connection, table, columns, constraints)?;
        Ok(true)
    }

    fn drop_table_if_exists(
        &self,
        connection: &mut MemoryConnection,
        table: &str,
    ) -> Result<bool, SqlError> {
        if !connection.read(|tables| Ok(tables.contains_key(table)))? {
            return Ok(false);
        }
        connection.write(|tables| Ok(tables.remove(table).is_some()))
    }

    fn insert(
        &self,
        connection: &mut MemoryConnection,
        table: &str,
        row: &[(String, SqlValue)],
    ) -> Result<(), SqlError> {
        tracing::trace!("INSERT INTO {} ({} columns)", table, row.len());
        connection.write(|tables| {
            let memory = tables
                .get_mut(table)
                .ok_or_else(|| table_not_found(table))?;
            let mut values = vec![SqlValue::Null; memory.columns.len()];
            let mut assigned = vec![false; memory.columns.len()];
            for (column, value) in row {
                let index = memory.index_of(table, column)?;
                if assigned[index] {
                    return Err(SqlError::DuplicatedColumn {
                        table: table.to_string(),
                        column: column.clone(),
                    });
                }
                let expected = memory.columns[index].column_type;
                if let Some(got) = value.column_type() {
                    if got != expected {
                        return Err(SqlError::TypeMismatch {
                            column: column.clone(),
                            expected: expected.to_string(),
                            got: got.to_string(),
                        });
                    }
                }
                assigned[index] = true;
                values[index] = value.clone();
            }
            for (index, value) in values.iter().enumerate() {
                if value.is_null() && memory.is_not_null(index) {
                    return Err(SqlError::ConstraintViolation {
                        table: table.to_string(),
                        constraint: format!("NOT NULL ({})", memory.columns[index].name),
                    });
                }
            }
            if !memory.primary_key.is_empty() {
                let key: Vec<(usize, SqlValue)> = memory
                    .primary_key
                    .iter()
                    .map(|i| (*i, values[*i].clone()))
                    .collect();
                if memory.rows.iter().any(|existing| matches(existing, &key)) {
                    let names: Vec<&str> = memory
                        .primary_key
                        .iter()
                        .map(|i| memory.columns[*i].name.as_str())
                        .collect();
                    return Err(SqlError::ConstraintViolation {
                        table: table.to_string(),
                        constraint: format!("PRIMARY KEY ({})", names.join(", ")),
                    });
                }
            }
            memory.rows.push(values);
            Ok(())
        })
    }

    fn delete(
        &self,
        connection: &mut MemoryConnection,
        table: &str,
        predicate: Option<Predicate<'_>>,
    ) -> Result<usize, SqlError> {
        tracing::trace!("DELETE FROM {} (where: {:?})", table, predicate);
        connection.write(|tables| {
            let memory = tables
                .get_mut(table)
                .ok_or_else(|| table_not_found(table))?;
            let filter = memory.compile(table, predicate)?;
            let before = memory.rows.len();
            memory.rows.retain(|row| !matches(row, &filter));
            Ok(before - memory.rows.len())
        })
    }
}
