//! Value descriptors: one mapped attribute of a data object.

use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;

use super::container::ContainerOps;
use super::expand::ExpandRule;
use crate::error::{DataObjectError, MalformationError};
use crate::types::{AnyValue, TypeKey};

pub(crate) type GetFn =
    Arc<dyn Fn(&dyn Any) -> Result<Option<AnyValue>, DataObjectError> + Send + Sync>;
pub(crate) type SetFn =
    Arc<dyn Fn(&mut dyn Any, Option<AnyValue>) -> Result<(), DataObjectError> + Send + Sync>;

pub(crate) fn get_fn<F>(f: F) -> GetFn
where
    F: Fn(&dyn Any) -> Result<Option<AnyValue>, DataObjectError> + Send + Sync + 'static,
{
    Arc::new(f)
}

pub(crate) fn set_fn<F>(f: F) -> SetFn
where
    F: Fn(&mut dyn Any, Option<AnyValue>) -> Result<(), DataObjectError> + Send + Sync + 'static,
{
    Arc::new(f)
}

fn owner_of<T: Any>(object: &dyn Any) -> Result<&T, DataObjectError> {
    object
        .downcast_ref::<T>()
        .ok_or(DataObjectError::IncapableObject {
            expected: type_name::<T>(),
        })
}

fn owner_of_mut<T: Any>(object: &mut dyn Any) -> Result<&mut T, DataObjectError> {
    object
        .downcast_mut::<T>()
        .ok_or(DataObjectError::IncapableObject {
            expected: type_name::<T>(),
        })
}

fn value_of<V: Any>(value: Option<AnyValue>) -> Result<Option<V>, DataObjectError> {
    match value {
        None => Ok(None),
        Some(value) => value
            .downcast::<V>()
            .map(|v| Some(*v))
            .map_err(|_| DataObjectError::IncapableValue {
                expected: type_name::<V>(),
            }),
    }
}

fn required<V: Any>(value: Option<V>) -> Result<V, DataObjectError> {
    value.ok_or(DataObjectError::NullValue {
        expected: type_name::<V>(),
    })
}

/// Where an accessor or mutator was declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Field,
    Method,
}

/// A method that replaced direct field access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub declared_by: TypeKey,
    pub method: String,
}

/// Read capability bound to one value.
#[derive(Clone)]
pub struct Accessor {
    get: GetFn,
    redirect: Option<Redirect>,
}

impl Accessor {
    /// Direct access to a non-nullable field.
    pub fn field<T: Any, V: Any + Send + Clone>(get: fn(&T) -> &V) -> Self {
        Self::from_fn(get_fn(move |object: &dyn Any| {
            Ok(Some(Box::new(get(owner_of::<T>(object)?).clone()) as AnyValue))
        }))
    }

    /// Direct access to a nullable field.
    pub fn optional_field<T: Any, V: Any + Send + Clone>(get: fn(&T) -> &Option<V>) -> Self {
        Self::from_fn(get_fn(move |object: &dyn Any| {
            Ok(get(owner_of::<T>(object)?)
                .clone()
                .map(|v| Box::new(v) as AnyValue))
        }))
    }

    /// Access through a computed getter.
    pub fn method<T: Any, V: Any + Send>(get: fn(&T) -> V) -> Self {
        Self::from_fn(get_fn(move |object: &dyn Any| {
            Ok(Some(Box::new(get(owner_of::<T>(object)?)) as AnyValue))
        }))
    }

    pub fn optional_method<T: Any, V: Any + Send>(get: fn(&T) -> Option<V>) -> Self {
        Self::from_fn(get_fn(move |object: &dyn Any| {
            Ok(get(owner_of::<T>(object)?).map(|v| Box::new(v) as AnyValue))
        }))
    }

    pub(crate) fn from_fn(get: GetFn) -> Self {
        Self {
            get,
            redirect: None,
        }
    }

    pub(crate) fn redirected(self, redirect: Redirect) -> Self {
        Self {
            redirect: Some(redirect),
            ..self
        }
    }

    pub(crate) fn get_fn(&self) -> &GetFn {
        &self.get
    }

    pub fn redirect(&self) -> Option<&Redirect> {
        self.redirect.as_ref()
    }

    pub fn get(&self, object: &dyn Any) -> Result<Option<AnyValue>, DataObjectError> {
        (self.get)(object)
    }
}

/// Write capability bound to one value.
#[derive(Clone)]
pub struct Mutator {
    set: SetFn,
    redirect: Option<Redirect>,
}

impl Mutator {
    /// Direct assignment of a non-nullable field. Assigning null fails.
    pub fn field<T: Any, V: Any + Send>(get_mut: fn(&mut T) -> &mut V) -> Self {
        Self::from_fn(set_fn(
            move |object: &mut dyn Any, value: Option<AnyValue>| {
                let value = required(value_of::<V>(value)?)?;
                *get_mut(owner_of_mut::<T>(object)?) = value;
                Ok(())
            },
        ))
    }

    pub fn optional_field<T: Any, V: Any + Send>(get_mut: fn(&mut T) -> &mut Option<V>) -> Self {
        Self::from_fn(set_fn(
            move |object: &mut dyn Any, value: Option<AnyValue>| {
                let value = value_of::<V>(value)?;
                *get_mut(owner_of_mut::<T>(object)?) = value;
                Ok(())
            },
        ))
    }

    /// Assignment through a setter method. Assigning null fails.
    pub fn method<T: Any, V: Any + Send>(set: fn(&mut T, V)) -> Self {
        Self::from_fn(set_fn(
            move |object: &mut dyn Any, value: Option<AnyValue>| {
                let value = required(value_of::<V>(value)?)?;
                set(owner_of_mut::<T>(object)?, value);
                Ok(())
            },
        ))
    }

    pub fn optional_method<T: Any, V: Any + Send>(set: fn(&mut T, Option<V>)) -> Self {
        Self::from_fn(set_fn(
            move |object: &mut dyn Any, value: Option<AnyValue>| {
                let value = value_of::<V>(value)?;
                set(owner_of_mut::<T>(object)?, value);
                Ok(())
            },
        ))
    }

    pub(crate) fn from_fn(set: SetFn) -> Self {
        Self {
            set,
            redirect: None,
        }
    }

    pub(crate) fn redirected(self, redirect: Redirect) -> Self {
        Self {
            redirect: Some(redirect),
            ..self
        }
    }

    pub(crate) fn set_fn(&self) -> &SetFn {
        &self.set
    }

    pub fn redirect(&self) -> Option<&Redirect> {
        self.redirect.as_ref()
    }

    pub fn set(
        &self,
        object: &mut dyn Any,
        value: Option<AnyValue>,
    ) -> Result<(), DataObjectError> {
        (self.set)(object, value)
    }
}

/// Produces fresh instances of a value type.
#[derive(Clone)]
pub struct Constructor {
    make: Arc<dyn Fn() -> AnyValue + Send + Sync>,
    always: bool,
}

impl Constructor {
    /// Constructor that only runs when the current value is absent.
    pub fn new<V: Any + Send>(make: fn() -> V) -> Self {
        Self {
            make: Arc::new(move || Box::new(make()) as AnyValue),
            always: false,
        }
    }

    pub fn default_of<V: Any + Send + Default>() -> Self {
        Self::new(V::default)
    }

    /// Runs even when a current value exists.
    pub fn always(self) -> Self {
        Self {
            always: true,
            ..self
        }
    }

    pub fn is_always(&self) -> bool {
        self.always
    }

    pub fn construct(&self) -> AnyValue {
        (self.make)()
    }
}

impl fmt::Debug for Constructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constructor")
            .field("always", &self.always)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyRole {
    /// The key of a unique data object
    Unique,
    Primary,
    Secondary,
}

impl KeyRole {
    pub fn label(&self) -> &'static str {
        match self {
            KeyRole::Unique => "key",
            KeyRole::Primary => "primary key",
            KeyRole::Secondary => "secondary key",
        }
    }
}

impl fmt::Display for KeyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Structural kind of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Structure {
    Value,
    Map,
    Set,
    List,
}

impl Structure {
    pub fn is_container(&self) -> bool {
        !matches!(self, Structure::Value)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValueMetadata {
    pub not_null: bool,
    pub expand_forcibly: bool,
    /// The value is bound to an `Option` and may be absent
    pub optional: bool,
}

/// Describes one mapped field and carries its bound accessors.
///
/// Built unsealed, then sealed once every required part is present. A sealed
/// descriptor rejects all further mutation.
#[derive(Clone)]
pub struct ValueDescriptor {
    name: Option<String>,
    value_type: TypeKey,
    owner_type: TypeKey,
    owner: Option<TypeKey>,
    key_role: Option<KeyRole>,
    structure: Structure,
    container: Option<ContainerOps>,
    accessor: Option<Accessor>,
    mutator: Option<Mutator>,
    constructor: Option<Constructor>,
    expand_rule: Option<Arc<ExpandRule>>,
    signature: Option<Vec<TypeKey>>,
    metadata: ValueMetadata,
    sealed: bool,
}

impl ValueDescriptor {
    /// Creates an unsealed scalar/composite value.
    ///
    /// # Arguments
    /// * `value_type` - Declared type of the value
    /// * `owner_type` - Type whose instances the accessors operate on
    pub fn new(value_type: TypeKey, owner_type: TypeKey) -> Self {
        Self {
            name: None,
            value_type,
            owner_type,
            owner: None,
            key_role: None,
            structure: Structure::Value,
            container: None,
            accessor: None,
            mutator: None,
            constructor: None,
            expand_rule: None,
            signature: None,
            metadata: ValueMetadata::default(),
            sealed: false,
        }
    }

    pub(crate) fn with_container(
        mut self,
        structure: Structure,
        ops: Option<ContainerOps>,
    ) -> Self {
        self.structure = structure;
        self.container = ops;
        self
    }

    fn check_unsealed(&self) -> Result<(), MalformationError> {
        if self.sealed {
            return Err(MalformationError::Sealed {
                what: "value descriptor",
            });
        }
        Ok(())
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> Result<(), MalformationError> {
        self.check_unsealed()?;
        self.name = Some(name.into());
        Ok(())
    }

    pub fn set_owner(&mut self, owner: TypeKey) -> Result<(), MalformationError> {
        self.check_unsealed()?;
        self.owner = Some(owner);
        Ok(())
    }

    pub fn set_accessor(&mut self, accessor: Accessor) -> Result<(), MalformationError> {
        self.check_unsealed()?;
        self.accessor = Some(accessor);
        Ok(())
    }

    pub fn set_mutator(&mut self, mutator: Mutator) -> Result<(), MalformationError> {
        self.check_unsealed()?;
        self.mutator = Some(mutator);
        Ok(())
    }

    pub fn set_constructor(&mut self, constructor: Constructor) -> Result<(), MalformationError> {
        self.check_unsealed()?;
        self.constructor = Some(constructor);
        Ok(())
    }

    pub fn set_expand_rule(&mut self, rule: Arc<ExpandRule>) -> Result<(), MalformationError> {
        self.check_unsealed()?;
        self.expand_rule = Some(rule);
        Ok(())
    }

    pub fn set_signature(&mut self, signature: Vec<TypeKey>) -> Result<(), MalformationError> {
        self.check_unsealed()?;
        self.signature = Some(signature);
        Ok(())
    }

    pub fn set_metadata(&mut self, metadata: ValueMetadata) -> Result<(), MalformationError> {
        self.check_unsealed()?;
        self.metadata = metadata;
        Ok(())
    }

    pub(crate) fn set_key_role(&mut self, role: Option<KeyRole>) -> Result<(), MalformationError> {
        self.check_unsealed()?;
        self.key_role = role;
        Ok(())
    }

    /// Checks that every required part is present without sealing.
    pub(crate) fn check_complete(&self) -> Result<(), MalformationError> {
        if self.sealed {
            return Err(MalformationError::AlreadySealed {
                what: "value descriptor",
            });
        }
        let name = match self.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => {
                return Err(MalformationError::ValueNameUndefined {
                    owner: self.owner_type.name().to_string(),
                })
            }
        };
        if self.owner.is_none() {
            return Err(MalformationError::OwnerUndefined {
                name: name.to_string(),
            });
        }
        if self.accessor.is_none() {
            return Err(MalformationError::GetterUndefined {
                name: name.to_string(),
            });
        }
        if self.mutator.is_none() {
            return Err(MalformationError::SetterUndefined {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Seals the descriptor.
    ///
    /// # Returns
    /// `Err(MalformationError)` if name, owner, accessor or mutator is unset,
    /// or if the descriptor was already sealed.
    pub fn seal(&mut self) -> Result<(), MalformationError> {
        self.check_complete()?;
        self.sealed = true;
        Ok(())
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Name of the value; empty until one is assigned.
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    pub fn value_type(&self) -> TypeKey {
        self.value_type
    }

    pub fn owner_type(&self) -> TypeKey {
        self.owner_type
    }

    pub fn owner(&self) -> Option<TypeKey> {
        self.owner
    }

    pub fn key_role(&self) -> Option<KeyRole> {
        self.key_role
    }

    pub fn is_key(&self) -> bool {
        self.key_role.is_some()
    }

    pub fn is_primary_key(&self) -> bool {
        self.key_role == Some(KeyRole::Primary)
    }

    pub fn is_secondary_key(&self) -> bool {
        self.key_role == Some(KeyRole::Secondary)
    }

    pub fn is_unique_key(&self) -> bool {
        self.key_role == Some(KeyRole::Unique)
    }

    pub fn structure(&self) -> Structure {
        self.structure
    }

    pub(crate) fn container_ops(&self) -> Option<&ContainerOps> {
        self.container.as_ref()
    }

    pub fn accessor(&self) -> Option<&Accessor> {
        self.accessor.as_ref()
    }

    pub fn mutator(&self) -> Option<&Mutator> {
        self.mutator.as_ref()
    }

    pub(crate) fn accessor_mut(&mut self) -> Option<&mut Accessor> {
        self.accessor.as_mut()
    }

    pub(crate) fn mutator_mut(&mut self) -> Option<&mut Mutator> {
        self.mutator.as_mut()
    }

    pub fn constructor(&self) -> Option<&Constructor> {
        self.constructor.as_ref()
    }

    pub fn expand_rule(&self) -> Option<&Arc<ExpandRule>> {
        self.expand_rule.as_ref()
    }

    pub fn signature(&self) -> Option<&[TypeKey]> {
        self.signature.as_deref()
    }

    pub fn metadata(&self) -> ValueMetadata {
        self.metadata
    }

    /// Reads the value from `object`.
    pub fn get(&self, object: &dyn Any) -> Result<Option<AnyValue>, DataObjectError> {
        match &self.accessor {
            Some(accessor) => accessor.get(object),
            None => Err(DataObjectError::Unbound {
                name: self.name().to_string(),
                capability: "getter",
            }),
        }
    }

    /// Writes `value` into `object`.
    pub fn set(
        &self,
        object: &mut dyn Any,
        value: Option<AnyValue>,
    ) -> Result<(), DataObjectError> {
        match &self.mutator {
            Some(mutator) => mutator.set(object, value),
            None => Err(DataObjectError::Unbound {
                name: self.name().to_string(),
                capability: "setter",
            }),
        }
    }
}

impl fmt::Debug for ValueDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueDescriptor")
            .field("name", &self.name)
            .field("value_type", &self.value_type)
            .field("owner_type", &self.owner_type)
            .field("key_role", &self.key_role)
            .field("structure", &self.structure)
            .field("signature", &self.signature)
            .field("metadata", &self.metadata)
            .field("sealed", &self.sealed)
            .finish()
    }
}
