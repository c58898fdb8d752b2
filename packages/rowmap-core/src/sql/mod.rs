//! Executor abstraction and the in-memory executor.

mod manipulator;
pub mod memory;

pub use manipulator::{Connection, DatabaseManipulator, Predicate, RowCursor, TypeSupport};
pub use memory::{MemoryConnection, MemoryCursor, MemoryDatabase, MemoryManipulator};
