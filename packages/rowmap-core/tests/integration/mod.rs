//! Integration test suite.
//!
//! Exercises data sources end to end over the in-memory executor:
//! scalar round trips, expand rules, synthetic collection tables,
//! transactions and configuration.

pub mod collection_tests;
pub mod data_source_tests;
pub mod expansion_tests;
pub mod helpers;
pub mod transaction_tests;
