//! Process-wide memo of interpreted descriptors.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use arc_swap::ArcSwap;

use super::engine::Interpreter;
use crate::dataobject::DataObjectDescriptor;
use crate::error::InterpretationError;
use crate::types::TypeKey;

type Entries = HashMap<TypeKey, Arc<DataObjectDescriptor>>;

/// Descriptor cache keyed by type.
///
/// Readers load a snapshot without locking. Writers publish a new map with
/// copy-on-write, so a lookup never observes a half-inserted entry. The
/// first descriptor published for a type wins; later interpretations of
/// the same type are discarded.
pub struct DataObjectCache {
    entries: ArcSwap<Entries>,
}

static GLOBAL: OnceLock<DataObjectCache> = OnceLock::new();

impl DataObjectCache {
    pub fn new() -> Self {
        Self {
            entries: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    /// Shared cache used when a data source is not given its own.
    pub fn global() -> &'static DataObjectCache {
        GLOBAL.get_or_init(DataObjectCache::new)
    }

    pub fn get(&self, type_key: &TypeKey) -> Option<Arc<DataObjectDescriptor>> {
        self.entries.load().get(type_key).cloned()
    }

    /// Returns the cached descriptor, interpreting and publishing it first
    /// when absent.
    ///
    /// Interpretation runs outside any lock. When two callers race, both
    /// receive the descriptor that was published first.
    pub fn interpret_if_absent(
        &self,
        type_key: &TypeKey,
        interpreter: &Interpreter,
    ) -> Result<Arc<DataObjectDescriptor>, InterpretationError> {
        if let Some(descriptor) = self.get(type_key) {
            return Ok(descriptor);
        }

        let descriptor = Arc::new(interpreter.interpret_type(type_key)?);
        self.entries.rcu(|current| {
            if current.contains_key(type_key) {
                Arc::clone(current)
            } else {
                let mut next = HashMap::clone(current);
                next.insert(*type_key, Arc::clone(&descriptor));
                Arc::new(next)
            }
        });
        tracing::trace!("Cached descriptor of {}", type_key);

        Ok(self.get(type_key).unwrap_or(descriptor))
    }

    pub fn len(&self) -> usize {
        self.entries.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.load().is_empty()
    }
}

impl Default for DataObjectCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DataObjectCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataObjectCache")
            .field("len", &self.len())
            .finish()
    }
}
