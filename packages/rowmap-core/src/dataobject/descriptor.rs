use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::expand::ExpandRule;
use super::value::{KeyRole, ValueDescriptor};
use crate::error::MalformationError;
use crate::types::{AnyValue, TypeKey};

/// Expand rules visible to the values of one descriptor, by expanding type.
pub type ExpandRules = HashMap<TypeKey, Arc<ExpandRule>>;

/// Key topology of a data object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataObjectKind {
    /// Nested composite without keys
    Element,
    /// Single key
    Unique,
    /// One primary key plus any number of secondary keys
    Multiple,
}

impl DataObjectKind {
    pub fn label(&self) -> &'static str {
        match self {
            DataObjectKind::Element => "element",
            DataObjectKind::Unique => "unique",
            DataObjectKind::Multiple => "multiple",
        }
    }
}

#[derive(Clone)]
enum Keys {
    Element,
    Unique(Option<ValueDescriptor>),
    Multiple {
        primary: Option<ValueDescriptor>,
        secondary: Vec<ValueDescriptor>,
    },
}

/// Structural description of one mapped type.
///
/// Names are unique across keys and values. Insertions that would collide
/// fail without touching the descriptor. After `seal` every mutation fails.
#[derive(Clone)]
pub struct DataObjectDescriptor {
    data_type: TypeKey,
    keys: Keys,
    values: Vec<ValueDescriptor>,
    expand_rules: ExpandRules,
    constructor: fn() -> AnyValue,
    sealed: bool,
}

impl DataObjectDescriptor {
    /// Creates an unsealed descriptor.
    ///
    /// # Arguments
    /// * `kind` - Key topology
    /// * `data_type` - Mapped type
    /// * `constructor` - Produces a default instance of the mapped type
    pub fn new(kind: DataObjectKind, data_type: TypeKey, constructor: fn() -> AnyValue) -> Self {
        let keys = match kind {
            DataObjectKind::Element => Keys::Element,
            DataObjectKind::Unique => Keys::Unique(None),
            DataObjectKind::Multiple => Keys::Multiple {
                primary: None,
                secondary: Vec::new(),
            },
        };
        Self {
            data_type,
            keys,
            values: Vec::new(),
            expand_rules: ExpandRules::new(),
            constructor,
            sealed: false,
        }
    }

    fn check_unsealed(&self) -> Result<(), MalformationError> {
        if self.sealed {
            return Err(MalformationError::Sealed {
                what: "data object descriptor",
            });
        }
        Ok(())
    }

    fn check_name_free(&self, value: &ValueDescriptor) -> Result<(), MalformationError> {
        if self.value_object(value.name()).is_some() {
            return Err(if value.is_key() {
                MalformationError::DuplicatedKey {
                    name: value.name().to_string(),
                }
            } else {
                MalformationError::DuplicatedValue {
                    name: value.name().to_string(),
                }
            });
        }
        Ok(())
    }

    /// Inserts a key value.
    ///
    /// # Returns
    /// `Err(MalformationError)` if the role is not supported by this shape,
    /// the slot is already taken, or the name collides.
    pub fn put_key(
        &mut self,
        role: KeyRole,
        mut value: ValueDescriptor,
    ) -> Result<(), MalformationError> {
        self.check_unsealed()?;
        value.set_key_role(Some(role))?;

        let shape = self.kind().label();
        let unsupported = || MalformationError::KeyRoleUnsupported {
            role: role.label(),
            shape,
            name: value.name().to_string(),
        };
        match (&self.keys, role) {
            (Keys::Element, _) => return Err(unsupported()),
            (Keys::Unique(_), KeyRole::Primary | KeyRole::Secondary) => return Err(unsupported()),
            (Keys::Multiple { .. }, KeyRole::Unique) => return Err(unsupported()),
            (Keys::Unique(Some(_)), KeyRole::Unique) => {
                return Err(MalformationError::DuplicatedKey {
                    name: value.name().to_string(),
                })
            }
            (
                Keys::Multiple {
                    primary: Some(_), ..
                },
                KeyRole::Primary,
            ) => {
                return Err(MalformationError::DuplicatedPrimaryKey {
                    name: value.name().to_string(),
                })
            }
            _ => {}
        }
        self.check_name_free(&value)?;

        match &mut self.keys {
            Keys::Unique(slot) => *slot = Some(value),
            Keys::Multiple { primary, .. } if role == KeyRole::Primary => *primary = Some(value),
            Keys::Multiple { secondary, .. } => secondary.push(value),
            Keys::Element => {}
        }
        Ok(())
    }

    /// Inserts a non-key value.
    pub fn put_value(&mut self, mut value: ValueDescriptor) -> Result<(), MalformationError> {
        self.check_unsealed()?;
        value.set_key_role(None)?;
        self.check_name_free(&value)?;
        self.values.push(value);
        Ok(())
    }

    pub(crate) fn set_expand_rules(&mut self, rules: ExpandRules) -> Result<(), MalformationError> {
        self.check_unsealed()?;
        self.expand_rules = rules;
        Ok(())
    }

    pub(crate) fn value_object_mut(&mut self, name: &str) -> Option<&mut ValueDescriptor> {
        if self.sealed {
            return None;
        }
        let in_keys = match &mut self.keys {
            Keys::Element => None,
            Keys::Unique(key) => key.as_mut().filter(|k| k.name() == name),
            Keys::Multiple { primary, secondary } => {
                match primary.as_mut().filter(|k| k.name() == name) {
                    Some(primary) => Some(primary),
                    None => secondary.iter_mut().find(|k| k.name() == name),
                }
            }
        };
        match in_keys {
            Some(value) => Some(value),
            None => self.values.iter_mut().find(|v| v.name() == name),
        }
    }

    /// Seals every value descriptor, then the descriptor itself.
    ///
    /// Every value is checked before any is sealed, so a failure leaves the
    /// descriptor untouched.
    pub fn seal(&mut self) -> Result<(), MalformationError> {
        if self.sealed {
            return Err(MalformationError::AlreadySealed {
                what: "data object descriptor",
            });
        }
        match &self.keys {
            Keys::Unique(None) => {
                return Err(MalformationError::KeyUndefined {
                    type_name: self.data_type.name().to_string(),
                })
            }
            Keys::Multiple { primary: None, .. } => {
                return Err(MalformationError::PrimaryKeyUndefined {
                    type_name: self.data_type.name().to_string(),
                })
            }
            _ => {}
        }
        for value in self.iter_all() {
            value.check_complete()?;
        }
        for value in self.iter_all_mut() {
            value.seal()?;
        }
        self.sealed = true;
        Ok(())
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn kind(&self) -> DataObjectKind {
        match self.keys {
            Keys::Element => DataObjectKind::Element,
            Keys::Unique(_) => DataObjectKind::Unique,
            Keys::Multiple { .. } => DataObjectKind::Multiple,
        }
    }

    pub fn data_type(&self) -> TypeKey {
        self.data_type
    }

    /// Key of a unique data object.
    pub fn key(&self) -> Option<&ValueDescriptor> {
        match &self.keys {
            Keys::Unique(key) => key.as_ref(),
            _ => None,
        }
    }

    pub fn primary_key(&self) -> Option<&ValueDescriptor> {
        match &self.keys {
            Keys::Multiple { primary, .. } => primary.as_ref(),
            _ => None,
        }
    }

    pub fn secondary_keys(&self) -> &[ValueDescriptor] {
        match &self.keys {
            Keys::Multiple { secondary, .. } => secondary,
            _ => &[],
        }
    }

    /// Every key in identifying order: the unique key, or the primary key
    /// followed by secondary keys in declaration order.
    pub fn keys(&self) -> Vec<&ValueDescriptor> {
        match &self.keys {
            Keys::Element => Vec::new(),
            Keys::Unique(key) => key.iter().collect(),
            Keys::Multiple { primary, secondary } => {
                primary.iter().chain(secondary.iter()).collect()
            }
        }
    }

    /// Non-key values in declaration order.
    pub fn values(&self) -> &[ValueDescriptor] {
        &self.values
    }

    /// Looks up a non-key value by name.
    pub fn value(&self, name: &str) -> Option<&ValueDescriptor> {
        self.values.iter().find(|v| v.name() == name)
    }

    /// Looks up a key or value by name.
    pub fn value_object(&self, name: &str) -> Option<&ValueDescriptor> {
        self.iter_all().find(|v| v.name() == name)
    }

    /// Keys then values.
    pub fn iter_all(&self) -> impl Iterator<Item = &ValueDescriptor> {
        let keys: Vec<&ValueDescriptor> = self.keys();
        keys.into_iter().chain(self.values.iter())
    }

    fn iter_all_mut(&mut self) -> impl Iterator<Item = &mut ValueDescriptor> {
        let keys: Vec<&mut ValueDescriptor> = match &mut self.keys {
            Keys::Element => Vec::new(),
            Keys::Unique(key) => key.iter_mut().collect(),
            Keys::Multiple { primary, secondary } => {
                primary.iter_mut().chain(secondary.iter_mut()).collect()
            }
        };
        keys.into_iter().chain(self.values.iter_mut())
    }

    pub fn expand_rules(&self) -> &ExpandRules {
        &self.expand_rules
    }

    /// The rule that expands `value`: its own rule first, then the
    /// descriptor-wide rule for its type.
    pub fn expand_rule_for(&self, value: &ValueDescriptor) -> Option<Arc<ExpandRule>> {
        value
            .expand_rule()
            .or_else(|| self.expand_rules.get(&value.value_type()))
            .cloned()
    }

    /// A fresh default instance of the mapped type.
    pub fn construct(&self) -> AnyValue {
        (self.constructor)()
    }
}

impl fmt::Debug for DataObjectDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataObjectDescriptor")
            .field("data_type", &self.data_type)
            .field("kind", &self.kind())
            .field("keys", &self.keys())
            .field("values", &self.values)
            .field("sealed", &self.sealed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataobject::value::{Accessor, Mutator};
    use ntest::timeout;

    #[derive(Debug, Default)]
    struct Row {
        id: i64,
        region: String,
        label: String,
    }

    fn construct_row() -> AnyValue {
        Box::new(Row::default())
    }

    fn string_value(
        name: &str,
        get: fn(&Row) -> &String,
        get_mut: fn(&mut Row) -> &mut String,
    ) -> ValueDescriptor {
        let mut value = ValueDescriptor::new(TypeKey::of::<String>(), TypeKey::of::<Row>());
        value.set_name(name).unwrap();
        value.set_owner(TypeKey::of::<Row>()).unwrap();
        value.set_accessor(Accessor::field(get)).unwrap();
        value.set_mutator(Mutator::field(get_mut)).unwrap();
        value
    }

    fn id_key() -> ValueDescriptor {
        let mut value = ValueDescriptor::new(TypeKey::of::<i64>(), TypeKey::of::<Row>());
        value.set_name("id").unwrap();
        value.set_owner(TypeKey::of::<Row>()).unwrap();
        value
            .set_accessor(Accessor::field::<Row, i64>(|r| &r.id))
            .unwrap();
        value
            .set_mutator(Mutator::field::<Row, i64>(|r| &mut r.id))
            .unwrap();
        value
    }

    #[timeout(1000)]
    #[test]
    fn test_duplicate_names_rejected_without_mutation() {
        let mut descriptor =
            DataObjectDescriptor::new(DataObjectKind::Unique, TypeKey::of::<Row>(), construct_row);
        descriptor.put_key(KeyRole::Unique, id_key()).unwrap();
        descriptor
            .put_value(string_value("label", |r| &r.label, |r| &mut r.label))
            .unwrap();

        let duplicate =
            descriptor.put_value(string_value("label", |r| &r.region, |r| &mut r.region));
        assert!(matches!(
            duplicate,
            Err(MalformationError::DuplicatedValue { .. })
        ));
        let shadowing = descriptor.put_value(string_value("id", |r| &r.region, |r| &mut r.region));
        assert!(matches!(
            shadowing,
            Err(MalformationError::DuplicatedValue { .. })
        ));
        assert_eq!(descriptor.values().len(), 1);
        assert_eq!(descriptor.iter_all().count(), 2);
    }

    #[timeout(1000)]
    #[test]
    fn test_shape_rejects_foreign_roles() {
        let mut unique =
            DataObjectDescriptor::new(DataObjectKind::Unique, TypeKey::of::<Row>(), construct_row);
        assert!(matches!(
            unique.put_key(KeyRole::Primary, id_key()),
            Err(MalformationError::KeyRoleUnsupported { .. })
        ));
        unique.put_key(KeyRole::Unique, id_key()).unwrap();
        let second = string_value("region", |r| &r.region, |r| &mut r.region);
        assert!(matches!(
            unique.put_key(KeyRole::Unique, second),
            Err(MalformationError::DuplicatedKey { .. })
        ));

        let mut multiple = DataObjectDescriptor::new(
            DataObjectKind::Multiple,
            TypeKey::of::<Row>(),
            construct_row,
        );
        assert!(matches!(
            multiple.put_key(KeyRole::Unique, id_key()),
            Err(MalformationError::KeyRoleUnsupported { .. })
        ));
        multiple.put_key(KeyRole::Primary, id_key()).unwrap();
        assert!(matches!(
            multiple.put_key(
                KeyRole::Primary,
                string_value("region", |r| &r.region, |r| &mut r.region)
            ),
            Err(MalformationError::DuplicatedPrimaryKey { .. })
        ));
        multiple
            .put_key(
                KeyRole::Secondary,
                string_value("region", |r| &r.region, |r| &mut r.region),
            )
            .unwrap();
        let names: Vec<&str> = multiple.keys().iter().map(|k| k.name()).collect();
        assert_eq!(names, vec!["id", "region"]);

        let mut element =
            DataObjectDescriptor::new(DataObjectKind::Element, TypeKey::of::<Row>(), construct_row);
        assert!(element.put_key(KeyRole::Secondary, id_key()).is_err());
    }

    #[timeout(1000)]
    #[test]
    fn test_seal_requires_keys_and_freezes() {
        let mut multiple = DataObjectDescriptor::new(
            DataObjectKind::Multiple,
            TypeKey::of::<Row>(),
            construct_row,
        );
        assert!(matches!(
            multiple.seal(),
            Err(MalformationError::PrimaryKeyUndefined { .. })
        ));

        let mut unique =
            DataObjectDescriptor::new(DataObjectKind::Unique, TypeKey::of::<Row>(), construct_row);
        assert!(matches!(
            unique.seal(),
            Err(MalformationError::KeyUndefined { .. })
        ));
        unique.put_key(KeyRole::Unique, id_key()).unwrap();
        unique.seal().unwrap();
        assert!(unique.iter_all().all(|v| v.is_sealed()));
        assert!(matches!(
            unique.put_value(string_value("label", |r| &r.label, |r| &mut r.label)),
            Err(MalformationError::Sealed { .. })
        ));
        assert!(matches!(
            unique.seal(),
            Err(MalformationError::AlreadySealed { .. })
        ));
    }

    #[timeout(1000)]
    #[test]
    fn test_seal_checks_values_before_sealing_any() {
        let mut descriptor =
            DataObjectDescriptor::new(DataObjectKind::Unique, TypeKey::of::<Row>(), construct_row);
        descriptor.put_key(KeyRole::Unique, id_key()).unwrap();
        let mut incomplete = ValueDescriptor::new(TypeKey::of::<String>(), TypeKey::of::<Row>());
        incomplete.set_name("label").unwrap();
        descriptor.put_value(incomplete).unwrap();

        assert!(matches!(
            descriptor.seal(),
            Err(MalformationError::OwnerUndefined { .. })
        ));
        assert!(!descriptor.is_sealed());
        assert!(descriptor.iter_all().all(|v| !v.is_sealed()));
    }
}
