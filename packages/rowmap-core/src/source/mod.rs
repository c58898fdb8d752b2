//! Data sources: table-level pull, commit and removal of data objects.

mod data_source;
mod transaction;

pub use data_source::{DataSource, DataSourceBuilder};
pub use transaction::Transaction;
