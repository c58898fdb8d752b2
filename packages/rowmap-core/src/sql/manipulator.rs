use crate::error::SqlError;
use crate::schema::{ColumnSpec, Constraint};
use crate::types::{ColumnType, SqlValue, TypeKey};

/// Native column types of an executor.
pub trait TypeSupport {
    /// Column type storing values of `type_key`, or `None` when the type
    /// has no native column and must be expanded.
    fn column_type(&self, type_key: &TypeKey) -> Option<ColumnType>;

    fn support_type(&self, type_key: &TypeKey) -> bool {
        self.column_type(type_key).is_some()
    }
}

/// A session with transactional control.
pub trait Connection: Send {
    fn set_auto_commit(&mut self, auto_commit: bool) -> Result<(), SqlError>;

    fn commit(&mut self) -> Result<(), SqlError>;

    fn rollback(&mut self) -> Result<(), SqlError>;
}

/// Forward-only cursor over a query result.
pub trait RowCursor {
    /// Advances to the next row. Returns `false` once exhausted.
    fn next(&mut self) -> Result<bool, SqlError>;

    /// Column value of the current row.
    fn get(&self, column: &str) -> Result<SqlValue, SqlError>;

    fn columns(&self) -> &[String];
}

/// Equality conjunction over named columns.
pub type Predicate<'a> = &'a [(String, SqlValue)];

/// SQL executor used by data sources.
///
/// Every operation runs on the caller's connection; transaction boundaries
/// belong to the caller.
pub trait DatabaseManipulator: TypeSupport + Send + Sync {
    type Connection: Connection + 'static;

    /// Selects rows of `table`.
    ///
    /// # Arguments
    /// * `keys` - Equality filter, `None` for every row
    /// * `columns` - Projection, `None` for every column
    fn query(
        &self,
        connection: &mut Self::Connection,
        table: &str,
        keys: Option<Predicate<'_>>,
        columns: Option<&[String]>,
    ) -> Result<Box<dyn RowCursor>, SqlError>;

    fn create_table(
        &self,
        connection: &mut Self::Connection,
        table: &str,
        columns: &[ColumnSpec],
        constraints: &[Constraint],
    ) -> Result<(), SqlError>;

    /// Returns `false` when the table already existed.
    fn create_table_if_not_exists(
        &self,
        connection: &mut Self::Connection,
        table: &str,
        columns: &[ColumnSpec],
        constraints: &[Constraint],
    ) -> Result<bool, SqlError>;

    /// Returns `false` when there was no such table.
    fn drop_table_if_exists(
        &self,
        connection: &mut Self::Connection,
        table: &str,
    ) -> Result<bool, SqlError>;

    fn insert(
        &self,
        connection: &mut Self::Connection,
        table: &str,
        row: &[(String, SqlValue)],
    ) -> Result<(), SqlError>;

    /// Deletes matching rows, every row when `predicate` is `None`.
    ///
    /// # Returns
    /// Number of deleted rows.
    fn delete(
        &self,
        connection: &mut Self::Connection,
        table: &str,
        predicate: Option<Predicate<'_>>,
    ) -> Result<usize, SqlError>;
}
