use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::interpreter::declaration::{declare_erased, ClassDeclaration};
use crate::interpreter::DataObject;

/// Type-erased owned value moved between descriptors, codecs and objects.
pub type AnyValue = Box<dyn Any + Send>;

pub(crate) type DeclareFn = fn() -> ClassDeclaration;

/// Runtime identity of a mapped type.
///
/// Equality and hashing only consider the `TypeId`; keys built with
/// [`TypeKey::of`] and [`TypeKey::data_object`] for the same type are equal.
/// Data object keys additionally carry the type's declaration so nested
/// composites can be interpreted from a signature slot alone.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
    declare: Option<DeclareFn>,
}

impl TypeKey {
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            declare: None,
        }
    }

    pub fn data_object<T: DataObject>() -> Self {
        Self {
            declare: Some(declare_erased::<T>),
            ..Self::of::<T>()
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is<T: Any>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }

    /// Whether this key can be interpreted into a data object descriptor.
    pub fn is_data_object(&self) -> bool {
        self.declare.is_some()
    }

    pub(crate) fn declaration(&self) -> Option<DeclareFn> {
        self.declare
    }

    /// Whether the dynamic type of `value` is this type.
    pub fn matches(&self, value: &dyn Any) -> bool {
        value.type_id() == self.id
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({})", self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
