//! Marshalling between object graphs and rows.
//!
//! Extraction reads one row into an object, recursing into element
//! composites and expanded values through prefixed column names. Map, set
//! and list values live in synthetic side tables named
//! `<owner table>_XXSYNTHETIC_COLLECTION_<identity>`, where the identity is
//! stored in the owner row. Assembly is the reverse walk and produces the
//! owner row plus every side table.

mod assemble;
mod collect;
mod extract;
mod prefix;
mod signature;

use std::any::Any;
use std::sync::Arc;

pub use assemble::{Assembled, CollectionTable};
pub use prefix::Prefix;
pub use signature::SignatureCursor;

use crate::dataobject::{DataObjectDescriptor, Structure, ValueDescriptor};
use crate::error::{DataSourceError, MalformationError, Rejection};
use crate::interpreter::{DataObjectCache, Interpreter};
use crate::schema::{is_flattened, SchemaGenerator, Slot};
use crate::sql::{DatabaseManipulator, RowCursor};
use crate::types::{AnyValue, DataArgumentWrapper, DataExtractorFactory, TypeKey};

/// Key column of map side tables.
pub const MAP_KEY_COLUMN: &str = "K";
/// Scalar value column of map side tables.
pub const MAP_VALUE_COLUMN: &str = "V";
/// Prefix of composite value columns of map side tables.
pub const MAP_VALUE_SEGMENT: &str = "V";
/// Scalar element column of set and list side tables.
pub const ELEMENT_COLUMN: &str = "E";
pub const SYNTHETIC_COLLECTION_INFIX: &str = "_XXSYNTHETIC_COLLECTION_";

/// Name of the side table holding the collection with `identity`.
pub fn collection_table_name(owner_table: &str, identity: &str) -> String {
    format!("{}{}{}", owner_table, SYNTHETIC_COLLECTION_INFIX, identity)
}

/// How a flattened value decomposes.
pub(crate) enum Expansion {
    Composite(Arc<DataObjectDescriptor>),
    Rule(Vec<ValueDescriptor>),
}

/// Resolved slots of one container value.
pub(crate) struct ContainerLayout {
    /// Map key, `None` for sets and lists
    pub(crate) key: Option<Slot>,
    pub(crate) element: Slot,
}

impl ContainerLayout {
    fn is_map(&self) -> bool {
        self.key.is_some()
    }
}

/// Picks the shared cursor, or opens one over the value's own signature.
fn signature_cursor<'c>(
    value: &ValueDescriptor,
    shared: Option<&'c mut SignatureCursor>,
    own: &'c mut Option<SignatureCursor>,
) -> Result<&'c mut SignatureCursor, MalformationError> {
    match shared {
        Some(cursor) => Ok(cursor),
        None => {
            let slots = value
                .signature()
                .ok_or_else(|| MalformationError::MissingSignature {
                    name: value.name().to_string(),
                })?;
            Ok(own.insert(SignatureCursor::new(slots)))
        }
    }
}

/// Marshals the values of one table.
///
/// Side tables are handled by child marshallers bound to the side table
/// name, so collections nested in collection elements get their own side
/// tables.
pub struct Marshaller<'a, M: DatabaseManipulator> {
    manipulator: &'a M,
    table: String,
    schema: SchemaGenerator<'a>,
    cache: &'a DataObjectCache,
    interpreter: &'a Interpreter,
    wrapper: &'a dyn DataArgumentWrapper,
    extractors: &'a dyn DataExtractorFactory,
}

impl<'a, M: DatabaseManipulator> Marshaller<'a, M> {
    pub fn new(
        manipulator: &'a M,
        table: impl Into<String>,
        cache: &'a DataObjectCache,
        interpreter: &'a Interpreter,
        wrapper: &'a dyn DataArgumentWrapper,
        extractors: &'a dyn DataExtractorFactory,
    ) -> Self {
        Self {
            manipulator,
            table: table.into(),
            schema: SchemaGenerator::new(manipulator, cache, interpreter),
            cache,
            interpreter,
            wrapper,
            extractors,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn schema(&self) -> &SchemaGenerator<'a> {
        &self.schema
    }

    fn for_table(&self, table: String) -> Self {
        Self::new(
            self.manipulator,
            table,
            self.cache,
            self.interpreter,
            self.wrapper,
            self.extractors,
        )
    }

    fn expansion_of(
        &self,
        rules: &DataObjectDescriptor,
        value: &ValueDescriptor,
    ) -> Result<Expansion, DataSourceError> {
        let value_type = value.value_type();
        if let Some(element) = self.schema.flattened_composite(value)? {
            return Ok(Expansion::Composite(element));
        }
        match rules.expand_rule_for(value) {
            Some(rule) => Ok(Expansion::Rule(rule.expand()?)),
            None => Err(DataSourceError::unsupported(
                value_type.name(),
                Rejection::Expansion,
            )),
        }
    }

    /// Consumes the key and element slots of a container value.
    ///
    /// Fails before consuming anything when too few slots remain.
    fn container_layout(
        &self,
        value: &ValueDescriptor,
        cursor: &mut SignatureCursor,
    ) -> Result<ContainerLayout, DataSourceError> {
        match value.structure() {
            Structure::Map => {
                cursor.require(2)?;
                let key = self.schema.key_slot(cursor.next_slot()?)?;
                let element = self.schema.slot(cursor.next_slot()?, Rejection::MapValue)?;
                Ok(ContainerLayout {
                    key: Some(key),
                    element,
                })
            }
            Structure::Set => Ok(ContainerLayout {
                key: None,
                element: self.schema.slot(cursor.next_slot()?, Rejection::SetElement)?,
            }),
            Structure::List => Ok(ContainerLayout {
                key: None,
                element: self.schema.slot(cursor.next_slot()?, Rejection::ListElement)?,
            }),
            Structure::Value => Err(DataSourceError::unsupported(
                value.value_type().name(),
                Rejection::Expansion,
            )),
        }
    }

    /// Advances `cursor` past every slot the containers nested in
    /// `descriptor` consume.
    pub(crate) fn consume_nested(
        &self,
        descriptor: &DataObjectDescriptor,
        cursor: &mut SignatureCursor,
    ) -> Result<(), DataSourceError> {
        for value in descriptor.iter_all() {
            if value.structure().is_container() {
                let layout = self.container_layout(value, cursor)?;
                if let Slot::Composite(element) = &layout.element {
                    self.consume_nested(element, cursor)?;
                }
            } else if is_flattened(&self.schema, value) {
                if let Some(element) = self.schema.flattened_composite(value)? {
                    self.consume_nested(&element, cursor)?;
                }
            }
        }
        Ok(())
    }

    /// Current value, unless the constructor is declared to always run.
    fn construct_or_reuse(
        &self,
        object: &dyn Any,
        value: &ValueDescriptor,
    ) -> Result<AnyValue, DataSourceError> {
        let constructor = value.constructor();
        if let Some(constructor) = constructor.filter(|c| c.is_always()) {
            return Ok(constructor.construct());
        }
        if let Some(current) = value.get(object)? {
            return Ok(current);
        }
        constructor
            .map(|c| c.construct())
            .ok_or_else(|| DataSourceError::Construction {
                name: value.name().to_string(),
            })
    }

    /// Reads one column through the extractor for `value_type`.
    fn extract_raw(
        &self,
        row: &dyn RowCursor,
        value_type: &TypeKey,
        column: &str,
    ) -> Result<Option<AnyValue>, DataSourceError> {
        let extractor = self
            .extractors
            .create(value_type, column)
            .ok_or_else(|| DataSourceError::unsupported(value_type.name(), Rejection::Extractor))?;
        let extracted = extractor.extract(row)?;
        if let Some(value) = &extracted {
            if !value_type.matches(&**value) {
                return Err(DataSourceError::BadType {
                    column: column.to_string(),
                    expected: value_type.name().to_string(),
                });
            }
        }
        Ok(extracted)
    }

    fn extract_identity(
        &self,
        row: &dyn RowCursor,
        column: &str,
    ) -> Result<Option<String>, DataSourceError> {
        self.extract_raw(row, &TypeKey::of::<String>(), column)?
            .map(|value| {
                value
                    .downcast::<String>()
                    .map(|identity| *identity)
                    .map_err(|_| DataSourceError::BadType {
                        column: column.to_string(),
                        expected: "String".to_string(),
                    })
            })
            .transpose()
    }
}
