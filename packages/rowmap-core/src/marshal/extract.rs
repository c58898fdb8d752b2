use std::any::Any;

use super::{
    collection_table_name, signature_cursor, Expansion, Marshaller, Prefix, SignatureCursor,
    ELEMENT_COLUMN, MAP_KEY_COLUMN, MAP_VALUE_COLUMN, MAP_VALUE_SEGMENT,
};
use crate::dataobject::{DataObjectDescriptor, Structure, ValueDescriptor};
use crate::error::{DataSourceError, Rejection};
use crate::schema::{is_flattened, Slot};
use crate::sql::{DatabaseManipulator, RowCursor};
use crate::types::AnyValue;

impl<'a, M: DatabaseManipulator> Marshaller<'a, M> {
    /// Populates `object` from the current row of `row`.
    ///
    /// # Arguments
    /// * `include_keys` - Also extract key values
    /// * `shared` - Cursor over the generic slots of every container in the
    ///   tree. `None` makes each container use its declared signature.
    pub fn extract_object(
        &self,
        connection: &mut M::Connection,
        row: &dyn RowCursor,
        object: &mut dyn Any,
        descriptor: &DataObjectDescriptor,
        include_keys: bool,
        mut shared: Option<&mut SignatureCursor>,
    ) -> Result<(), DataSourceError> {
        let prefix = Prefix::empty();
        if include_keys {
            for key in descriptor.keys() {
                self.extract_value(
                    connection,
                    row,
                    object,
                    descriptor,
                    key,
                    &prefix,
                    shared.as_deref_mut(),
                )?;
            }
        }
        for value in descriptor.values() {
            self.extract_value(
                connection,
                row,
                object,
                descriptor,
                value,
                &prefix,
                shared.as_deref_mut(),
            )?;
        }
        Ok(())
    }

    /// Extracts one value stored under `prefix`.
    ///
    /// `rules` is the descriptor whose expand rules apply to `value`.
    #[allow(clippy::too_many_arguments)]
    pub fn extract_value(
        &self,
        connection: &mut M::Connection,
        row: &dyn RowCursor,
        object: &mut dyn Any,
        rules: &DataObjectDescriptor,
        value: &ValueDescriptor,
        prefix: &Prefix,
        shared: Option<&mut SignatureCursor>,
    ) -> Result<(), DataSourceError> {
        match value.structure() {
            Structure::Value => {
                self.extract_scalar(connection, row, object, rules, value, prefix, shared)
            }
            Structure::Map | Structure::Set | Structure::List => {
                self.extract_container(connection, row, object, value, prefix, shared)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn extract_scalar(
        &self,
        connection: &mut M::Connection,
        row: &dyn RowCursor,
        object: &mut dyn Any,
        rules: &DataObjectDescriptor,
        value: &ValueDescriptor,
        prefix: &Prefix,
        mut shared: Option<&mut SignatureCursor>,
    ) -> Result<(), DataSourceError> {
        if !is_flattened(&self.schema, value) {
            let column = prefix.apply(value.name());
            let extracted = self.extract_raw(row, &value.value_type(), &column)?;
            value.set(object, extracted)?;
            return Ok(());
        }

        let expansion = self.expansion_of(rules, value)?;
        if value.metadata().optional && self.is_absent(row, rules, value, prefix)? {
            if let (Expansion::Composite(element), Some(cursor)) = (&expansion, shared) {
                self.consume_nested(element, cursor)?;
            }
            value.set(object, None)?;
            return Ok(());
        }

        let nested_prefix = prefix.append(value.name());
        let mut nested = self.construct_or_reuse(&*object, value)?;
        match &expansion {
            Expansion::Composite(element) => {
                for inner in element.values() {
                    self.extract_value(
                        connection,
                        row,
                        &mut *nested,
                        element,
                        inner,
                        &nested_prefix,
                        shared.as_deref_mut(),
                    )?;
                }
            }
            Expansion::Rule(expanded) => {
                for inner in expanded {
                    self.extract_value(
                        connection,
                        row,
                        &mut *nested,
                        rules,
                        inner,
                        &nested_prefix,
                        None,
                    )?;
                }
            }
        }
        value.set(object, Some(nested))?;
        Ok(())
    }

    /// Whether every column a flattened value occupies is NULL.
    fn is_absent(
        &self,
        row: &dyn RowCursor,
        rules: &DataObjectDescriptor,
        value: &ValueDescriptor,
        prefix: &Prefix,
    ) -> Result<bool, DataSourceError> {
        for column in self.schema.value_columns(rules, value, prefix)? {
            if !row.get(&column.name)?.is_null() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn extract_container(
        &self,
        connection: &mut M::Connection,
        row: &dyn RowCursor,
        object: &mut dyn Any,
        value: &ValueDescriptor,
        prefix: &Prefix,
        shared: Option<&mut SignatureCursor>,
    ) -> Result<(), DataSourceError> {
        let nested_shared = shared.is_some();
        let mut own = None;
        let cursor = signature_cursor(value, shared, &mut own)?;
        let layout = self.container_layout(value, cursor)?;

        // Every element reads its nested slots from the same position; the
        // lookahead records where they end.
        let mut lookahead = cursor.fork();
        if nested_shared {
            if let Slot::Composite(element) = &layout.element {
                self.consume_nested(element, &mut lookahead)?;
            }
        }

        let ops = value.container_ops().ok_or_else(|| {
            DataSourceError::unsupported(value.value_type().name(), Rejection::Expansion)
        })?;
        let mut container = value
            .constructor()
            .map(|c| c.construct())
            .ok_or_else(|| DataSourceError::Construction {
                name: value.name().to_string(),
            })?;

        let column = prefix.apply(value.name());
        if let Some(identity) = self.extract_identity(row, &column)? {
            let side = collection_table_name(&self.table, &identity);
            tracing::trace!("Reading synthetic collection {}", side);
            let mut rows = self.manipulator.query(connection, &side, None, None)?;
            let child = self.for_table(side);
            while rows.next()? {
                let mut fork = cursor.fork();
                let nested = if nested_shared { Some(&mut fork) } else { None };
                let element = child.extract_slot(
                    connection,
                    &*rows,
                    &layout.element,
                    layout.is_map(),
                    nested,
                )?;
                match &layout.key {
                    Some(Slot::Scalar(key_type, _)) => {
                        let key = self
                            .extract_raw(&*rows, key_type, MAP_KEY_COLUMN)?
                            .ok_or_else(|| DataSourceError::NullValue {
                                column: MAP_KEY_COLUMN.to_string(),
                            })?;
                        ops.insert_entry(&mut *container, key, element)?;
                    }
                    Some(Slot::Composite(descriptor)) => {
                        return Err(DataSourceError::unsupported(
                            descriptor.data_type().name(),
                            Rejection::Key,
                        ))
                    }
                    None => ops.insert_element(&mut *container, element)?,
                }
            }
        }

        if nested_shared {
            cursor.catch_up(&lookahead);
        }
        value.set(object, Some(container))?;
        Ok(())
    }

    /// Reads one map value, set element or list element from a side row.
    fn extract_slot(
        &self,
        connection: &mut M::Connection,
        row: &dyn RowCursor,
        slot: &Slot,
        map_value: bool,
        mut shared: Option<&mut SignatureCursor>,
    ) -> Result<AnyValue, DataSourceError> {
        match slot {
            Slot::Scalar(value_type, _) => {
                let column = if map_value {
                    MAP_VALUE_COLUMN
                } else {
                    ELEMENT_COLUMN
                };
                self.extract_raw(row, value_type, column)?
                    .ok_or_else(|| DataSourceError::NullValue {
                        column: column.to_string(),
                    })
            }
            Slot::Composite(descriptor) => {
                let prefix = if map_value {
                    Prefix::of(MAP_VALUE_SEGMENT)
                } else {
                    Prefix::empty()
                };
                let mut element = descriptor.construct();
                for inner in descriptor.values() {
                    self.extract_value(
                        connection,
                        row,
                        &mut *element,
                        descriptor,
                        inner,
                        &prefix,
                        shared.as_deref_mut(),
                    )?;
                }
                Ok(element)
            }
        }
    }
}
