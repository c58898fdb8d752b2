use super::{
    collection_table_name, signature_cursor, Expansion, Marshaller, Prefix, SignatureCursor,
    MAP_VALUE_SEGMENT,
};
use crate::dataobject::{DataObjectDescriptor, ValueDescriptor};
use crate::error::{DataSourceError, SqlError};
use crate::schema::{is_flattened, Slot};
use crate::sql::{DatabaseManipulator, RowCursor};

impl<'a, M: DatabaseManipulator> Marshaller<'a, M> {
    /// Names of every side table the current row of `row` refers to,
    /// nested ones included.
    pub fn collection_tables(
        &self,
        connection: &mut M::Connection,
        row: &dyn RowCursor,
        descriptor: &DataObjectDescriptor,
        mut shared: Option<&mut SignatureCursor>,
    ) -> Result<Vec<String>, DataSourceError> {
        let mut tables = Vec::new();
        let prefix = Prefix::empty();
        for value in descriptor.iter_all() {
            self.collect_value(
                connection,
                row,
                descriptor,
                value,
                &prefix,
                shared.as_deref_mut(),
                &mut tables,
            )?;
        }
        Ok(tables)
    }

    #[allow(clippy::too_many_arguments)]
    fn collect_value(
        &self,
        connection: &mut M::Connection,
        row: &dyn RowCursor,
        rules: &DataObjectDescriptor,
        value: &ValueDescriptor,
        prefix: &Prefix,
        mut shared: Option<&mut SignatureCursor>,
        out: &mut Vec<String>,
    ) -> Result<(), DataSourceError> {
        if value.structure().is_container() {
            return self.collect_container(connection, row, value, prefix, shared, out);
        }
        if !is_flattened(&self.schema, value) {
            return Ok(());
        }
        let nested_prefix = prefix.append(value.name());
        match self.expansion_of(rules, value)? {
            Expansion::Composite(element) => {
                for inner in element.values() {
                    self.collect_value(
                        connection,
                        row,
                        &element,
                        inner,
                        &nested_prefix,
                        shared.as_deref_mut(),
                        out,
                    )?;
                }
            }
            Expansion::Rule(expanded) => {
                for inner in &expanded {
                    self.collect_value(connection, row, rules, inner, &nested_prefix, None, out)?;
                }
            }
        }
        Ok(())
    }

    fn collect_container(
        &self,
        connection: &mut M::Connection,
        row: &dyn RowCursor,
        value: &ValueDescriptor,
        prefix: &Prefix,
        shared: Option<&mut SignatureCursor>,
        out: &mut Vec<String>,
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

        if let Some(identity) = self.extract_identity(row, &prefix.apply(value.name()))? {
            let side = collection_table_name(&self.table, &identity);
            if let Slot::Composite(element) = &layout.element {
                let element_prefix = if layout.is_map() {
                    Prefix::of(MAP_VALUE_SEGMENT)
                } else {
                    Prefix::empty()
                };
                match self.manipulator.query(connection, &side, None, None) {
                    Ok(mut rows) => {
                        let child = self.for_table(side.clone());
                        while rows.next()? {
                            let mut fork = cursor.fork();
                            for inner in element.values() {
                                child.collect_value(
                                    connection,
                                    &*rows,
                                    element,
                                    inner,
                                    &element_prefix,
                                    if nested_shared { Some(&mut fork) } else { None },
                                    out,
                                )?;
                            }
                        }
                    }
                    Err(SqlError::TableNotFound { .. }) => {
                        tracing::debug!("Synthetic collection {} is already gone", side);
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            out.push(side);
        }

        if nested_shared {
            cursor.catch_up(&lookahead);
        }
        Ok(())
    }
}
