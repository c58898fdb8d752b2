use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use super::error::TypeError;
use super::sql_value::{ColumnType, SqlValue};
use super::type_key::{AnyValue, TypeKey};

type WrapFn = Arc<dyn Fn(&dyn Any) -> Option<SqlValue> + Send + Sync>;
type UnwrapFn = Arc<dyn Fn(&SqlValue) -> Option<AnyValue> + Send + Sync>;

/// Conversion between one scalar type and its column representation.
#[derive(Clone)]
pub struct ScalarCodec {
    type_key: TypeKey,
    column_type: ColumnType,
    wrap: WrapFn,
    unwrap: UnwrapFn,
}

impl ScalarCodec {
    /// Creates a codec for `V`.
    ///
    /// # Arguments
    /// * `column_type` - Native column type the value is stored as
    /// * `to_sql` - Converts a value into a bound argument
    /// * `from_sql` - Converts a fetched column value back; `None` on a type mismatch
    pub fn new<V: Any + Send>(
        column_type: ColumnType,
        to_sql: fn(&V) -> SqlValue,
        from_sql: fn(&SqlValue) -> Option<V>,
    ) -> Self {
        Self {
            type_key: TypeKey::of::<V>(),
            column_type,
            wrap: Arc::new(move |value: &dyn Any| value.downcast_ref::<V>().map(to_sql)),
            unwrap: Arc::new(move |value: &SqlValue| {
                from_sql(value).map(|v| Box::new(v) as AnyValue)
            }),
        }
    }

    pub fn type_key(&self) -> TypeKey {
        self.type_key
    }

    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    /// Converts a value of the codec's type. Returns `None` for other types.
    pub fn wrap(&self, value: &dyn Any) -> Option<SqlValue> {
        (self.wrap)(value)
    }

    /// Converts a non-null column value. Returns `None` on a type mismatch.
    pub fn unwrap(&self, value: &SqlValue) -> Option<AnyValue> {
        (self.unwrap)(value)
    }
}

impl fmt::Debug for ScalarCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScalarCodec")
            .field("type_key", &self.type_key)
            .field("column_type", &self.column_type)
            .finish()
    }
}

/// Registry for scalar codecs.
///
/// Stores registered codecs with lookup by type identity.
/// Provides thread-safe registration and retrieval.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    codecs: RwLock<HashMap<TypeId, ScalarCodec>>,
}

impl TypeRegistry {
    /// Creates a new empty type registry.
    pub fn new() -> Self {
        Self {
            codecs: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a registry holding every built-in scalar codec.
    pub fn with_builtin_types() -> Result<Self, TypeError> {
        let registry = Self::new();
        super::builtin_types::register_builtin_types(&registry)?;
        Ok(registry)
    }

    /// Registers a scalar codec.
    ///
    /// # Returns
    /// `Ok(())` if successful, `Err(TypeError)` if the type is already registered.
    pub fn register(&self, codec: ScalarCodec) -> Result<(), TypeError> {
        let mut codecs = self.codecs.write().map_err(|_| TypeError::LockPoisoned)?;

        let type_key = codec.type_key();
        if codecs.contains_key(&type_key.id()) {
            return Err(TypeError::AlreadyRegistered {
                type_name: type_key.name().to_string(),
            });
        }

        codecs.insert(type_key.id(), codec);
        Ok(())
    }

    /// Retrieves the codec of a type.
    pub fn get(&self, type_key: &TypeKey) -> Option<ScalarCodec> {
        self.get_by_id(type_key.id())
    }

    pub(crate) fn get_by_id(&self, id: TypeId) -> Option<ScalarCodec> {
        let codecs = self.codecs.read().ok()?;
        codecs.get(&id).cloned()
    }

    /// Checks if a type is registered.
    pub fn contains(&self, type_key: &TypeKey) -> bool {
        let codecs = match self.codecs.read() {
            Ok(guard) => guard,
            Err(_) => return false,
        };
        codecs.contains_key(&type_key.id())
    }

    /// Returns the names of all registered types.
    pub fn type_names(&self) -> Vec<&'static str> {
        let codecs = match self.codecs.read() {
            Ok(guard) => guard,
            Err(_) => return Vec::new(),
        };
        codecs.values().map(|codec| codec.type_key().name()).collect()
    }

    /// Removes a codec registration.
    ///
    /// # Returns
    /// `true` if the codec was removed, `false` if it wasn't found.
    pub fn remove(&self, type_key: &TypeKey) -> bool {
        let mut codecs = match self.codecs.write() {
            Ok(guard) => guard,
            Err(_) => return false,
        };
        codecs.remove(&type_key.id()).is_some()
    }

    /// Column type of a registered scalar type.
    pub fn column_type(&self, type_key: &TypeKey) -> Option<ColumnType> {
        self.get(type_key).map(|codec| codec.column_type())
    }
}
