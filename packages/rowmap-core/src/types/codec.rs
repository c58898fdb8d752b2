//! Scalar codec collaborators.
//!
//! The marshalling engine never converts scalars itself: arguments go
//! through a [`DataArgumentWrapper`] and column values come back through
//! extractors created by a [`DataExtractorFactory`]. The registry-backed
//! implementations below are the defaults used by a data source.

use std::any::Any;
use std::sync::Arc;

use super::sql_value::SqlValue;
use super::type_key::{AnyValue, TypeKey};
use super::type_registry::{ScalarCodec, TypeRegistry};
use crate::error::DataSourceError;
use crate::sql::RowCursor;

/// Converts a language-level scalar into a bound argument.
pub trait DataArgumentWrapper: Send + Sync {
    /// Returns `None` when the value's type is unsupported.
    fn wrap(&self, value: &dyn Any) -> Option<SqlValue>;
}

/// Creates column extractors per value type.
pub trait DataExtractorFactory: Send + Sync {
    /// Returns `None` when the type is unsupported.
    fn create(&self, type_key: &TypeKey, column: &str) -> Option<Box<dyn DataExtractor>>;
}

/// Reads one column of the current row.
pub trait DataExtractor {
    /// `Ok(None)` for a NULL column.
    fn extract(&self, row: &dyn RowCursor) -> Result<Option<AnyValue>, DataSourceError>;
}

#[derive(Debug, Clone)]
pub struct RegistryArgumentWrapper {
    registry: Arc<TypeRegistry>,
}

impl RegistryArgumentWrapper {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self { registry }
    }
}

impl DataArgumentWrapper for RegistryArgumentWrapper {
    fn wrap(&self, value: &dyn Any) -> Option<SqlValue> {
        self.registry.get_by_id(value.type_id())?.wrap(value)
    }
}

#[derive(Debug, Clone)]
pub struct RegistryExtractorFactory {
    registry: Arc<TypeRegistry>,
}

impl RegistryExtractorFactory {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self { registry }
    }
}

impl DataExtractorFactory for RegistryExtractorFactory {
    fn create(&self, type_key: &TypeKey, column: &str) -> Option<Box<dyn DataExtractor>> {
        let codec = self.registry.get(type_key)?;
        Some(Box::new(CodecExtractor {
            codec,
            column: column.to_string(),
        }))
    }
}

struct CodecExtractor {
    codec: ScalarCodec,
    column: String,
}

impl DataExtractor for CodecExtractor {
    fn extract(&self, row: &dyn RowCursor) -> Result<Option<AnyValue>, DataSourceError> {
        let value = row.get(&self.column)?;
        if value.is_null() {
            return Ok(None);
        }
        self.codec
            .unwrap(&value)
            .map(Some)
            .ok_or_else(|| DataSourceError::BadType {
                column: self.column.clone(),
                expected: self.codec.type_key().name().to_string(),
            })
    }
}
