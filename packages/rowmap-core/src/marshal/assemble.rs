use std::any::Any;

use super::{
    collection_table_name, signature_cursor, Expansion, Marshaller, Prefix, SignatureCursor,
    ELEMENT_COLUMN, MAP_KEY_COLUMN, MAP_VALUE_COLUMN, MAP_VALUE_SEGMENT,
};
use crate::dataobject::{DataObjectDescriptor, Structure, ValueDescriptor};
use crate::error::{DataSourceError, Rejection};
use crate::schema::{is_flattened, Slot, TableSchema};
use crate::sql::DatabaseManipulator;
use crate::types::{AnyValue, SqlValue};

/// Seed column distinguishing the elements of one collection.
const ROW_SEED: &str = "#row";

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// One synthetic collection table and its rows.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionTable {
    pub schema: TableSchema,
    pub rows: Vec<Vec<(String, SqlValue)>>,
}

/// Result of assembling one object: its row plus every side table it
/// owns, nested ones included.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assembled {
    pub columns: Vec<(String, SqlValue)>,
    pub collections: Vec<CollectionTable>,
}

impl Assembled {
    pub fn column(&self, name: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, value)| value)
    }

    /// Key columns of the assembled row, in `names` order.
    pub fn key_values(&self, names: &[String]) -> Vec<(String, SqlValue)> {
        names
            .iter()
            .filter_map(|name| self.column(name).map(|value| (name.clone(), value.clone())))
            .collect()
    }
}

impl<'a, M: DatabaseManipulator> Marshaller<'a, M> {
    /// Assembles the row of `object`, keys first.
    ///
    /// Side table identities are derived from the key columns, so equal
    /// keys always address the same side tables.
    pub fn assemble_object(
        &self,
        object: &dyn Any,
        descriptor: &DataObjectDescriptor,
        mut shared: Option<&mut SignatureCursor>,
    ) -> Result<Assembled, DataSourceError> {
        let prefix = Prefix::empty();
        let mut assembled = Assembled::default();
        for key in descriptor.keys() {
            self.assemble_value(
                object,
                descriptor,
                key,
                &prefix,
                &[],
                shared.as_deref_mut(),
                &mut assembled,
            )?;
        }
        let seed = assembled.columns.clone();
        for value in descriptor.values() {
            self.assemble_value(
                object,
                descriptor,
                value,
                &prefix,
                &seed,
                shared.as_deref_mut(),
                &mut assembled,
            )?;
        }
        Ok(assembled)
    }

    /// Key columns of `object`.
    ///
    /// Absent keys fail with `NullKey` naming `operation`, or are left out
    /// of the result when `vague` is set.
    pub fn key_columns(
        &self,
        object: &dyn Any,
        descriptor: &DataObjectDescriptor,
        operation: &'static str,
        vague: bool,
    ) -> Result<Vec<(String, SqlValue)>, DataSourceError> {
        let prefix = Prefix::empty();
        let mut keys = Assembled::default();
        for key in descriptor.keys() {
            if key.get(object)?.is_none() {
                if vague {
                    continue;
                }
                return Err(DataSourceError::NullKey {
                    operation,
                    role: key.key_role().map(|role| role.label()).unwrap_or("key"),
                    name: key.name().to_string(),
                    shape: descriptor.kind().label(),
                });
            }
            self.assemble_value(object, descriptor, key, &prefix, &[], None, &mut keys)?;
        }
        Ok(keys.columns)
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble_value(
        &self,
        object: &dyn Any,
        rules: &DataObjectDescriptor,
        value: &ValueDescriptor,
        prefix: &Prefix,
        seed: &[(String, SqlValue)],
        shared: Option<&mut SignatureCursor>,
        out: &mut Assembled,
    ) -> Result<(), DataSourceError> {
        let current = value.get(object)?;
        if current.is_none() && value.metadata().not_null {
            return Err(DataSourceError::NullValue {
                column: prefix.apply(value.name()),
            });
        }
        match value.structure() {
            Structure::Value => {
                self.assemble_scalar(current, rules, value, prefix, seed, shared, out)
            }
            Structure::Map | Structure::Set | Structure::List => {
                self.assemble_container(current, value, prefix, seed, shared, out)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble_scalar(
        &self,
        current: Option<AnyValue>,
        rules: &DataObjectDescriptor,
        value: &ValueDescriptor,
        prefix: &Prefix,
        seed: &[(String, SqlValue)],
        mut shared: Option<&mut SignatureCursor>,
        out: &mut Assembled,
    ) -> Result<(), DataSourceError> {
        if !is_flattened(&self.schema, value) {
            let argument = match current {
                Some(current) => self.wrap(&*current, value, Rejection::ArgumentWrapper)?,
                None => SqlValue::Null,
            };
            out.columns.push((prefix.apply(value.name()), argument));
            return Ok(());
        }

        let expansion = self.expansion_of(rules, value)?;
        let Some(nested) = current else {
            if let (Expansion::Composite(element), Some(cursor)) = (&expansion, shared) {
                self.consume_nested(element, cursor)?;
            }
            for column in self.schema.value_columns(rules, value, prefix)? {
                out.columns.push((column.name, SqlValue::Null));
            }
            return Ok(());
        };

        let nested_prefix = prefix.append(value.name());
        match &expansion {
            Expansion::Composite(element) => {
                for inner in element.values() {
                    self.assemble_value(
                        &*nested,
                        element,
                        inner,
                        &nested_prefix,
                        seed,
                        shared.as_deref_mut(),
                        out,
                    )?;
                }
            }
            Expansion::Rule(expanded) => {
                for inner in expanded {
                    self.assemble_value(&*nested, rules, inner, &nested_prefix, seed, None, out)?;
                }
            }
        }
        Ok(())
    }

    fn assemble_container(
        &self,
        current: Option<AnyValue>,
        value: &ValueDescriptor,
        prefix: &Prefix,
        seed: &[(String, SqlValue)],
        shared: Option<&mut SignatureCursor>,
        out: &mut Assembled,
    ) -> Result<(), DataSourceError> {
        let nested_shared = shared.is_some();
        let mut own = None;
        let cursor = signature_cursor(value, shared, &mut own)?;
        let layout = self.container_layout(value, cursor)?;

        let mut lookahead = cursor.fork();
        if nested_shared {
            if let Slot::Composite(element) = &layout.element {
                self.consume_nested(element, &mut lookahead)?;
            }
        }

        let column = prefix.apply(value.name());
        let Some(container) = current else {
            if nested_shared {
                cursor.catch_up(&lookahead);
            }
            out.columns.push((column, SqlValue::Null));
            return Ok(());
        };

        let ops = value.container_ops().ok_or_else(|| {
            DataSourceError::unsupported(value.value_type().name(), Rejection::Expansion)
        })?;
        let identity = self.identity(&column, seed);
        let side = collection_table_name(&self.table, &identity);
        let child = self.for_table(side.clone());
        let schema = self
            .schema
            .collection_schema(&side, layout.key.as_ref(), &layout.element)?;

        let mut rows = Vec::new();
        let mut nested_tables = Vec::new();
        match &layout.key {
            Some(Slot::Scalar(key_type, _)) => {
                for (key, element) in ops.entries(&*container)? {
                    let key = self
                        .wrapper
                        .wrap(&*key)
                        .ok_or_else(|| {
                            DataSourceError::unsupported(key_type.name(), Rejection::Key)
                        })?;
                    let mut fork = cursor.fork();
                    let element_seed = [(MAP_KEY_COLUMN.to_string(), key.clone())];
                    let mut row = vec![(MAP_KEY_COLUMN.to_string(), key)];
                    child.assemble_slot(
                        &*element,
                        &layout.element,
                        Rejection::MapValue,
                        &element_seed,
                        if nested_shared { Some(&mut fork) } else { None },
                        &mut row,
                        &mut nested_tables,
                    )?;
                    rows.push(row);
                }
            }
            Some(Slot::Composite(descriptor)) => {
                return Err(DataSourceError::unsupported(
                    descriptor.data_type().name(),
                    Rejection::Key,
                ))
            }
            None => {
                let rejection = if value.structure() == Structure::Set {
                    Rejection::SetElement
                } else {
                    Rejection::ListElement
                };
                for (index, element) in ops.elements(&*container)?.into_iter().enumerate() {
                    let mut fork = cursor.fork();
                    let element_seed = [(ROW_SEED.to_string(), SqlValue::BigInt(index as i64))];
                    let mut row = Vec::new();
                    child.assemble_slot(
                        &*element,
                        &layout.element,
                        rejection,
                        &element_seed,
                        if nested_shared { Some(&mut fork) } else { None },
                        &mut row,
                        &mut nested_tables,
                    )?;
                    rows.push(row);
                }
            }
        }

        if nested_shared {
            cursor.catch_up(&lookahead);
        }
        tracing::trace!("Assembled synthetic collection {} ({} rows)", side, rows.len());
        out.collections.push(CollectionTable { schema, rows });
        out.collections.extend(nested_tables);
        out.columns.push((column, SqlValue::Text(identity)));
        Ok(())
    }

    /// Appends the columns of one map value, set element or list element.
    #[allow(clippy::too_many_arguments)]
    fn assemble_slot(
        &self,
        element: &dyn Any,
        slot: &Slot,
        rejection: Rejection,
        seed: &[(String, SqlValue)],
        mut shared: Option<&mut SignatureCursor>,
        row: &mut Vec<(String, SqlValue)>,
        collections: &mut Vec<CollectionTable>,
    ) -> Result<(), DataSourceError> {
        match slot {
            Slot::Scalar(value_type, _) => {
                let column = if rejection == Rejection::MapValue {
                    MAP_VALUE_COLUMN
                } else {
                    ELEMENT_COLUMN
                };
                let argument = self
                    .wrapper
                    .wrap(element)
                    .ok_or_else(|| DataSourceError::unsupported(value_type.name(), rejection))?;
                row.push((column.to_string(), argument));
            }
            Slot::Composite(descriptor) => {
                let prefix = if rejection == Rejection::MapValue {
                    Prefix::of(MAP_VALUE_SEGMENT)
                } else {
                    Prefix::empty()
                };
                let mut nested = Assembled::default();
                for inner in descriptor.values() {
                    self.assemble_value(
                        element,
                        descriptor,
                        inner,
                        &prefix,
                        seed,
                        shared.as_deref_mut(),
                        &mut nested,
                    )?;
                }
                row.extend(nested.columns);
                collections.extend(nested.collections);
            }
        }
        Ok(())
    }

    fn wrap(
        &self,
        current: &dyn Any,
        value: &ValueDescriptor,
        rejection: Rejection,
    ) -> Result<SqlValue, DataSourceError> {
        self.wrapper
            .wrap(current)
            .ok_or_else(|| DataSourceError::unsupported(value.value_type().name(), rejection))
    }

    /// `<column>_<hex>` where the hex spells out the seed values.
    ///
    /// The owning table is already part of the side table name, so the seed
    /// alone keeps identities of different rows apart.
    fn identity(&self, column: &str, seed: &[(String, SqlValue)]) -> String {
        let mut bytes = Vec::new();
        for (_, value) in seed {
            value.encode_into(&mut bytes);
        }
        let mut identity = String::with_capacity(column.len() + 1 + bytes.len() * 2);
        identity.push_str(column);
        identity.push('_');
        for byte in bytes {
            identity.push(char::from(HEX_DIGITS[usize::from(byte >> 4)]));
            identity.push(char::from(HEX_DIGITS[usize::from(byte & 0x0f)]));
        }
        identity
    }
}
