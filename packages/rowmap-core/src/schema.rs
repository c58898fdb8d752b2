//! Table schemas derived from data object descriptors.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dataobject::{DataObjectDescriptor, DataObjectKind, Structure, ValueDescriptor};
use crate::error::{DataSourceError, Rejection};
use crate::interpreter::{DataObjectCache, Interpreter};
use crate::marshal::{Prefix, ELEMENT_COLUMN, MAP_KEY_COLUMN, MAP_VALUE_COLUMN, MAP_VALUE_SEGMENT};
use crate::sql::TypeSupport;
use crate::types::{ColumnType, TypeKey};

/// Column or table constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Constraint {
    NotNull,
    /// Aggregate key over the named columns, in order
    PrimaryKey(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub column_type: ColumnType,
    pub constraints: Vec<Constraint>,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            constraints: Vec::new(),
        }
    }

    pub fn not_null(mut self) -> Self {
        if !self.is_not_null() {
            self.constraints.push(Constraint::NotNull);
        }
        self
    }

    pub fn is_not_null(&self) -> bool {
        self.constraints.contains(&Constraint::NotNull)
    }
}

/// Declarative CREATE TABLE description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<ColumnSpec>,
    pub constraints: Vec<Constraint>,
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn primary_key(&self) -> Option<&[String]> {
        self.constraints.iter().find_map(|c| match c {
            Constraint::PrimaryKey(names) => Some(names.as_slice()),
            Constraint::NotNull => None,
        })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Storage of one signature slot: a native column or an element composite.
#[derive(Debug, Clone)]
pub(crate) enum Slot {
    Scalar(TypeKey, ColumnType),
    Composite(Arc<DataObjectDescriptor>),
}

/// Flattens descriptors into columns.
///
/// Values with a native column keep it. Everything else is replaced by its
/// expanded sub-values, recursively, named `<prefix>_<name>`. Container
/// values become one text column holding the synthetic table identity.
pub struct SchemaGenerator<'a> {
    types: &'a dyn TypeSupport,
    cache: &'a DataObjectCache,
    interpreter: &'a Interpreter,
}

impl<'a> SchemaGenerator<'a> {
    pub fn new(
        types: &'a dyn TypeSupport,
        cache: &'a DataObjectCache,
        interpreter: &'a Interpreter,
    ) -> Self {
        Self {
            types,
            cache,
            interpreter,
        }
    }

    /// Schema of the owning table: keys then values, with one aggregate
    /// primary key over every key column.
    pub fn generate(
        &self,
        table: &str,
        descriptor: &DataObjectDescriptor,
    ) -> Result<TableSchema, DataSourceError> {
        let prefix = Prefix::empty();
        let mut key_columns = Vec::new();
        for key in descriptor.keys() {
            self.push_value_columns(descriptor, key, &prefix, &mut key_columns)?;
        }
        let mut columns = Vec::new();
        for value in descriptor.values() {
            self.push_value_columns(descriptor, value, &prefix, &mut columns)?;
        }

        let mut constraints = Vec::new();
        if !key_columns.is_empty() {
            constraints.push(Constraint::PrimaryKey(
                key_columns.iter().map(|c| c.name.clone()).collect(),
            ));
        }
        key_columns.extend(columns);
        tracing::trace!(
            "Generated schema of {} ({} columns)",
            table,
            key_columns.len()
        );
        Ok(TableSchema {
            table: table.to_string(),
            columns: key_columns,
            constraints,
        })
    }

    /// Columns of every value of `descriptor`, keys first when requested.
    pub fn object_columns(
        &self,
        descriptor: &DataObjectDescriptor,
        prefix: &Prefix,
        include_keys: bool,
    ) -> Result<Vec<ColumnSpec>, DataSourceError> {
        let mut columns = Vec::new();
        if include_keys {
            for key in descriptor.keys() {
                self.push_value_columns(descriptor, key, prefix, &mut columns)?;
            }
        }
        for value in descriptor.values() {
            self.push_value_columns(descriptor, value, prefix, &mut columns)?;
        }
        Ok(columns)
    }

    /// Columns one value occupies under `prefix`.
    ///
    /// `rules` is the descriptor whose expand rules apply to `value`.
    pub fn value_columns(
        &self,
        rules: &DataObjectDescriptor,
        value: &ValueDescriptor,
        prefix: &Prefix,
    ) -> Result<Vec<ColumnSpec>, DataSourceError> {
        let mut columns = Vec::new();
        self.push_value_columns(rules, value, prefix, &mut columns)?;
        Ok(columns)
    }

    fn push_value_columns(
        &self,
        rules: &DataObjectDescriptor,
        value: &ValueDescriptor,
        prefix: &Prefix,
        out: &mut Vec<ColumnSpec>,
    ) -> Result<(), DataSourceError> {
        let name = prefix.apply(value.name());
        let constrain = |column: ColumnSpec| {
            if value.metadata().not_null {
                column.not_null()
            } else {
                column
            }
        };

        if value.structure().is_container() {
            out.push(constrain(ColumnSpec::new(name, self.identity_column_type())));
            return Ok(());
        }

        let value_type = value.value_type();
        if !value.metadata().expand_forcibly {
            if let Some(column_type) = self.types.column_type(&value_type) {
                out.push(constrain(ColumnSpec::new(name, column_type)));
                return Ok(());
            }
        }

        let nested = prefix.append(value.name());
        if let Some(element) = self.flattened_composite(value)? {
            for inner in element.values() {
                self.push_value_columns(&element, inner, &nested, out)?;
            }
            return Ok(());
        }
        match rules.expand_rule_for(value) {
            Some(rule) => {
                for inner in rule.expand()? {
                    self.push_value_columns(rules, &inner, &nested, out)?;
                }
                Ok(())
            }
            None => Err(DataSourceError::unsupported(
                value_type.name(),
                Rejection::Expansion,
            )),
        }
    }

    /// Schema of a synthetic collection table.
    ///
    /// # Arguments
    /// * `key` - Map key slot, `None` for sets and lists
    /// * `element` - Map value, set element or list element slot
    pub(crate) fn collection_schema(
        &self,
        table: &str,
        key: Option<&Slot>,
        element: &Slot,
    ) -> Result<TableSchema, DataSourceError> {
        let mut columns = Vec::new();
        let (scalar_name, composite_prefix) = match key {
            Some(Slot::Scalar(_, column_type)) => {
                columns.push(ColumnSpec::new(MAP_KEY_COLUMN, *column_type).not_null());
                (MAP_VALUE_COLUMN, Prefix::of(MAP_VALUE_SEGMENT))
            }
            Some(Slot::Composite(descriptor)) => {
                return Err(DataSourceError::unsupported(
                    descriptor.data_type().name(),
                    Rejection::Key,
                ))
            }
            None => (ELEMENT_COLUMN, Prefix::empty()),
        };
        match element {
            Slot::Scalar(_, column_type) => {
                columns.push(ColumnSpec::new(scalar_name, *column_type))
            }
            Slot::Composite(descriptor) => {
                columns.extend(self.object_columns(descriptor, &composite_prefix, false)?)
            }
        }
        Ok(TableSchema {
            table: table.to_string(),
            columns,
            constraints: Vec::new(),
        })
    }

    pub(crate) fn identity_column_type(&self) -> ColumnType {
        self.types
            .column_type(&TypeKey::of::<String>())
            .unwrap_or(ColumnType::Text)
    }

    pub(crate) fn supports(&self, type_key: &TypeKey) -> bool {
        self.types.support_type(type_key)
    }

    /// Element descriptor of a data object type, `None` for other types.
    pub(crate) fn composite_of(
        &self,
        type_key: &TypeKey,
        rejection: Rejection,
    ) -> Result<Option<Arc<DataObjectDescriptor>>, DataSourceError> {
        if !type_key.is_data_object() {
            return Ok(None);
        }
        let descriptor = self
            .cache
            .interpret_if_absent(type_key, self.interpreter)?;
        if descriptor.kind() != DataObjectKind::Element {
            return Err(DataSourceError::unsupported(type_key.name(), rejection));
        }
        Ok(Some(descriptor))
    }

    /// Element composite a flattened value expands into.
    ///
    /// Forcibly expanded values always go through their expand rule, even
    /// when their type is an element data object.
    pub(crate) fn flattened_composite(
        &self,
        value: &ValueDescriptor,
    ) -> Result<Option<Arc<DataObjectDescriptor>>, DataSourceError> {
        if value.metadata().expand_forcibly {
            return Ok(None);
        }
        self.composite_of(&value.value_type(), Rejection::Expansion)
    }

    /// Classifies a signature slot; rejects types that are neither native
    /// nor element composites.
    pub(crate) fn slot(
        &self,
        type_key: TypeKey,
        rejection: Rejection,
    ) -> Result<Slot, DataSourceError> {
        if let Some(column_type) = self.types.column_type(&type_key) {
            return Ok(Slot::Scalar(type_key, column_type));
        }
        match self.composite_of(&type_key, rejection)? {
            Some(descriptor) => Ok(Slot::Composite(descriptor)),
            None => Err(DataSourceError::unsupported(type_key.name(), rejection)),
        }
    }

    /// Scalar slot only; composites are rejected.
    pub(crate) fn key_slot(&self, type_key: TypeKey) -> Result<Slot, DataSourceError> {
        match self.types.column_type(&type_key) {
            Some(column_type) => Ok(Slot::Scalar(type_key, column_type)),
            None => Err(DataSourceError::unsupported(type_key.name(), Rejection::Key)),
        }
    }
}

/// Whether a value is stored flattened instead of in its own column.
pub(crate) fn is_flattened(schema: &SchemaGenerator<'_>, value: &ValueDescriptor) -> bool {
    value.structure() == Structure::Value
        && (value.metadata().expand_forcibly || !schema.supports(&value.value_type()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataobject::ExpandRule;
    use crate::interpreter::{DataObject, Declaration};
    use crate::sql::MemoryManipulator;
    use ntest::timeout;
    use std::collections::HashMap;

    #[derive(Debug, Default, Clone)]
    struct Span {
        start: i32,
        end: i32,
    }

    #[derive(Debug, Default, Clone)]
    struct Address {
        street: String,
        zip: Option<i32>,
    }

    impl DataObject for Address {
        fn declare(d: &mut Declaration<Self>) {
            d.element();
            d.field("street", |a| &a.street, |a| &mut a.street)
                .value("")
                .not_null();
            d.optional_field("zip", |a| &a.zip, |a| &mut a.zip).value("");
        }
    }

    #[derive(Debug, Default, Clone)]
    struct Booking {
        id: i64,
        room: i32,
        guest: String,
        stay: Span,
        home: Address,
        extras: HashMap<String, i32>,
    }

    impl DataObject for Booking {
        fn declare(d: &mut Declaration<Self>) {
            d.multiple();
            d.custom_expand_rule(
                ExpandRule::builder::<Span>()
                    .field::<i32>("start", |s| &s.start, |s| &mut s.start)
                    .field::<i32>("end", |s| &s.end, |s| &mut s.end),
            );
            d.field("id", |b| &b.id, |b| &mut b.id).primary_key("");
            d.field("room", |b| &b.room, |b| &mut b.room).secondary_key("");
            d.field("guest", |b| &b.guest, |b| &mut b.guest)
                .value("")
                .not_null();
            d.field("stay", |b| &b.stay, |b| &mut b.stay).value("");
            d.element_field("home", |b| &b.home, |b| &mut b.home).value("");
            d.map_field("extras", |b| &b.extras, |b| &mut b.extras)
                .value("")
                .signature(&[TypeKey::of::<String>(), TypeKey::of::<i32>()]);
        }
    }

    #[timeout(1000)]
    #[test]
    fn test_generate_flattens_and_aggregates_keys() {
        let types = MemoryManipulator::with_builtin_types().unwrap();
        let cache = DataObjectCache::new();
        let interpreter = Interpreter::new();
        let generator = SchemaGenerator::new(&types, &cache, &interpreter);
        let descriptor = interpreter.interpret::<Booking>().unwrap();

        let schema = generator.generate("bookings", &descriptor).unwrap();
        assert_eq!(
            schema.column_names(),
            vec![
                "id",
                "room",
                "guest",
                "stay_start",
                "stay_end",
                "home_street",
                "home_zip",
                "extras"
            ]
        );
        assert_eq!(
            schema.constraints,
            vec![Constraint::PrimaryKey(vec![
                "id".to_string(),
                "room".to_string()
            ])]
        );
        assert!(schema.column("guest").unwrap().is_not_null());
        assert!(schema.column("home_street").unwrap().is_not_null());
        assert!(!schema.column("home_zip").unwrap().is_not_null());
        assert_eq!(
            schema.column("extras").unwrap().column_type,
            ColumnType::Text
        );
        assert_eq!(
            schema.column("stay_start").unwrap().column_type,
            ColumnType::Integer
        );
    }

    #[timeout(1000)]
    #[test]
    fn test_collection_schema_columns() {
        let types = MemoryManipulator::with_builtin_types().unwrap();
        let cache = DataObjectCache::new();
        let interpreter = Interpreter::new();
        let generator = SchemaGenerator::new(&types, &cache, &interpreter);

        let key = generator.key_slot(TypeKey::of::<String>()).unwrap();
        let value = generator
            .slot(TypeKey::data_object::<Address>(), Rejection::MapValue)
            .unwrap();
        let map = generator
            .collection_schema("side", Some(&key), &value)
            .unwrap();
        assert_eq!(map.column_names(), vec!["K", "V_street", "V_zip"]);
        assert!(map.column("K").unwrap().is_not_null());

        let element = generator
            .slot(TypeKey::of::<i64>(), Rejection::ListElement)
            .unwrap();
        let list = generator.collection_schema("side", None, &element).unwrap();
        assert_eq!(list.column_names(), vec!["E"]);

        let composite = generator.collection_schema("side", None, &value).unwrap();
        assert_eq!(composite.column_names(), vec!["street", "zip"]);
    }

    #[timeout(1000)]
    #[test]
    fn test_unsupported_slots() {
        let types = MemoryManipulator::with_builtin_types().unwrap();
        let cache = DataObjectCache::new();
        let interpreter = Interpreter::new();
        let generator = SchemaGenerator::new(&types, &cache, &interpreter);

        assert!(matches!(
            generator.slot(TypeKey::of::<Span>(), Rejection::ListElement),
            Err(DataSourceError::UnsupportedValueType {
                cause: Rejection::ListElement,
                ..
            })
        ));
        assert!(matches!(
            generator.key_slot(TypeKey::data_object::<Address>()),
            Err(DataSourceError::UnsupportedValueType {
                cause: Rejection::Key,
                ..
            })
        ));
        assert!(matches!(
            generator.slot(TypeKey::data_object::<Booking>(), Rejection::MapValue),
            Err(DataSourceError::UnsupportedValueType {
                cause: Rejection::MapValue,
                ..
            })
        ));
    }

    #[timeout(1000)]
    #[test]
    fn test_schema_serializes() {
        let schema = TableSchema {
            table: "t".to_string(),
            columns: vec![ColumnSpec::new("id", ColumnType::BigInt).not_null()],
            constraints: vec![Constraint::PrimaryKey(vec!["id".to_string()])],
        };
        let json = schema.to_json().unwrap();
        let back: TableSchema = serde_json::from_str(&json).unwrap();
        assert_eq!(back, schema);
    }
}
