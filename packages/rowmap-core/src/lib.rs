//! Declarative mapping of data objects onto relational rows.
//!
//! Types declare their keys and values through [`interpreter::DataObject`];
//! the interpreter turns that into a sealed descriptor, the marshaller moves
//! objects into and out of rows, and [`source::DataSource`] runs it all
//! against a [`sql::DatabaseManipulator`]. Map, set and list values are
//! stored in synthetic side tables.

pub mod config;
pub mod dataobject;
pub mod error;
pub mod interpreter;
pub mod marshal;
pub mod schema;
pub mod source;
pub mod sql;
pub mod types;

pub use config::DataSourceConfig;
pub use error::{DataSourceError, InterpretationError, MalformationError, SqlError};
pub use interpreter::{DataObject, Declaration, Interpreter};
pub use source::{DataSource, Transaction};
pub use types::TypeKey;
