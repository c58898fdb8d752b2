//! Expand rules: decomposition of one opaque value into stored sub-fields.

use std::any::Any;
use std::marker::PhantomData;

use super::value::{Accessor, Mutator, Source, ValueDescriptor};
use crate::error::MalformationError;
use crate::types::TypeKey;

/// Location of an entry's getter or setter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct At {
    pub name: String,
    pub source: Source,
}

/// One sub-field produced by an expand rule.
#[derive(Clone)]
pub struct Entry {
    name: String,
    expanded_type: TypeKey,
    getter_info: At,
    setter_info: At,
    accessor: Accessor,
    mutator: Mutator,
}

impl Entry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn expanded_type(&self) -> TypeKey {
        self.expanded_type
    }

    pub fn getter_info(&self) -> &At {
        &self.getter_info
    }

    pub fn setter_info(&self) -> &At {
        &self.setter_info
    }
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry")
            .field("name", &self.name)
            .field("expanded_type", &self.expanded_type)
            .field("getter_info", &self.getter_info)
            .field("setter_info", &self.setter_info)
            .finish()
    }
}

/// A sealed decomposition recipe for one expanding type.
#[derive(Debug, Clone)]
pub struct ExpandRule {
    expanding_type: TypeKey,
    entries: Vec<Entry>,
}

impl ExpandRule {
    pub fn builder<V: Any>() -> ExpandRuleBuilder<V> {
        ExpandRuleBuilder {
            draft: RuleDraft {
                expanding_type: TypeKey::of::<V>(),
                entries: Vec::new(),
            },
            _marker: PhantomData,
        }
    }

    pub fn expanding_type(&self) -> TypeKey {
        self.expanding_type
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Synthesizes one sealed value descriptor per entry, in entry order.
    ///
    /// The descriptors operate on instances of the expanding type.
    pub fn expand(&self) -> Result<Vec<ValueDescriptor>, MalformationError> {
        self.entries
            .iter()
            .map(|entry| {
                let mut value = ValueDescriptor::new(entry.expanded_type, self.expanding_type);
                value.set_name(entry.name.clone())?;
                value.set_owner(self.expanding_type)?;
                value.set_accessor(entry.accessor.clone())?;
                value.set_mutator(entry.mutator.clone())?;
                value.seal()?;
                Ok(value)
            })
            .collect()
    }
}

/// Unsealed entries for one expanding type.
#[derive(Debug, Clone)]
pub(crate) struct RuleDraft {
    pub(crate) expanding_type: TypeKey,
    entries: Vec<Entry>,
}

impl RuleDraft {
    /// Seals the draft, failing with `empty` when no entry was declared.
    pub(crate) fn seal_with(
        self,
        empty: impl FnOnce() -> MalformationError,
    ) -> Result<ExpandRule, MalformationError> {
        if self.entries.is_empty() {
            return Err(empty());
        }
        Ok(ExpandRule {
            expanding_type: self.expanding_type,
            entries: self.entries,
        })
    }
}

/// Builder for [`ExpandRule`] over values of type `V`.
pub struct ExpandRuleBuilder<V> {
    draft: RuleDraft,
    _marker: PhantomData<fn() -> V>,
}

impl<V: Any> ExpandRuleBuilder<V> {
    /// Adds an entry stored as a plain field of `V`.
    pub fn field<E: Any + Send + Clone>(
        mut self,
        name: &str,
        get: fn(&V) -> &E,
        get_mut: fn(&mut V) -> &mut E,
    ) -> Self {
        let field = At {
            name: name.to_string(),
            source: Source::Field,
        };
        self.draft.entries.push(Entry {
            name: name.to_string(),
            expanded_type: TypeKey::of::<E>(),
            getter_info: field.clone(),
            setter_info: field,
            accessor: Accessor::field(get),
            mutator: Mutator::field(get_mut),
        });
        self
    }

    /// Adds an entry read and written through methods of `V`.
    pub fn method<E: Any + Send>(
        mut self,
        name: &str,
        getter: &str,
        get: fn(&V) -> E,
        setter: &str,
        set: fn(&mut V, E),
    ) -> Self {
        self.draft.entries.push(Entry {
            name: name.to_string(),
            expanded_type: TypeKey::of::<E>(),
            getter_info: At {
                name: getter.to_string(),
                source: Source::Method,
            },
            setter_info: At {
                name: setter.to_string(),
                source: Source::Method,
            },
            accessor: Accessor::method(get),
            mutator: Mutator::method(set),
        });
        self
    }

    pub fn build(self) -> Result<ExpandRule, MalformationError> {
        let target = format!("type {}", self.draft.expanding_type);
        self.draft
            .seal_with(|| MalformationError::EmptyExpandRule { target })
    }

    pub(crate) fn into_draft(self) -> RuleDraft {
        self.draft
    }
}
