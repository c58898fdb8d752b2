//! Native container capabilities for `Map`/`Set`/`List` values.

use std::any::{type_name, Any};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::Arc;

use crate::error::DataObjectError;
use crate::types::AnyValue;

type MapInsertFn =
    Arc<dyn Fn(&mut dyn Any, AnyValue, AnyValue) -> Result<(), DataObjectError> + Send + Sync>;
type MapEntriesFn =
    Arc<dyn Fn(&dyn Any) -> Result<Vec<(AnyValue, AnyValue)>, DataObjectError> + Send + Sync>;
type InsertFn = Arc<dyn Fn(&mut dyn Any, AnyValue) -> Result<(), DataObjectError> + Send + Sync>;
type ElementsFn = Arc<dyn Fn(&dyn Any) -> Result<Vec<AnyValue>, DataObjectError> + Send + Sync>;

/// A map type usable as a mapped field.
pub trait MapContainer: Any + Send + Clone + Default {
    type Key: Any + Send + Clone;
    type Value: Any + Send + Clone;

    fn put(&mut self, key: Self::Key, value: Self::Value);
    fn entries(&self) -> Vec<(Self::Key, Self::Value)>;
}

/// A set type usable as a mapped field.
pub trait SetContainer: Any + Send + Clone + Default {
    type Element: Any + Send + Clone;

    fn add(&mut self, element: Self::Element);
    fn elements(&self) -> Vec<Self::Element>;
}

/// An ordered sequence usable as a mapped field. Insertion order is preserved.
pub trait ListContainer: Any + Send + Clone + Default {
    type Element: Any + Send + Clone;

    fn push(&mut self, element: Self::Element);
    fn elements(&self) -> Vec<Self::Element>;
}

impl<K, V> MapContainer for HashMap<K, V>
where
    K: Any + Send + Clone + Eq + Hash,
    V: Any + Send + Clone,
{
    type Key = K;
    type Value = V;

    fn put(&mut self, key: K, value: V) {
        self.insert(key, value);
    }

    fn entries(&self) -> Vec<(K, V)> {
        self.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

impl<K, V> MapContainer for BTreeMap<K, V>
where
    K: Any + Send + Clone + Ord,
    V: Any + Send + Clone,
{
    type Key = K;
    type Value = V;

    fn put(&mut self, key: K, value: V) {
        self.insert(key, value);
    }

    fn entries(&self) -> Vec<(K, V)> {
        self.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

impl<E> SetContainer for HashSet<E>
where
    E: Any + Send + Clone + Eq + Hash,
{
    type Element = E;

    fn add(&mut self, element: E) {
        self.insert(element);
    }

    fn elements(&self) -> Vec<E> {
        self.iter().cloned().collect()
    }
}

impl<E> SetContainer for BTreeSet<E>
where
    E: Any + Send + Clone + Ord,
{
    type Element = E;

    fn add(&mut self, element: E) {
        self.insert(element);
    }

    fn elements(&self) -> Vec<E> {
        self.iter().cloned().collect()
    }
}

impl<E: Any + Send + Clone> ListContainer for Vec<E> {
    type Element = E;

    fn push(&mut self, element: E) {
        Vec::push(self, element);
    }

    fn elements(&self) -> Vec<E> {
        self.clone()
    }
}

impl<E: Any + Send + Clone> ListContainer for VecDeque<E> {
    type Element = E;

    fn push(&mut self, element: E) {
        self.push_back(element);
    }

    fn elements(&self) -> Vec<E> {
        self.iter().cloned().collect()
    }
}

fn downcast_value<T: Any>(value: AnyValue) -> Result<T, DataObjectError> {
    value
        .downcast::<T>()
        .map(|v| *v)
        .map_err(|_| DataObjectError::IncapableValue {
            expected: type_name::<T>(),
        })
}

fn downcast_container<T: Any>(container: &dyn Any) -> Result<&T, DataObjectError> {
    container
        .downcast_ref::<T>()
        .ok_or(DataObjectError::IncapableObject {
            expected: type_name::<T>(),
        })
}

fn downcast_container_mut<T: Any>(container: &mut dyn Any) -> Result<&mut T, DataObjectError> {
    container
        .downcast_mut::<T>()
        .ok_or(DataObjectError::IncapableObject {
            expected: type_name::<T>(),
        })
}

/// Type-erased insertion and enumeration of one container type.
#[derive(Clone)]
pub(crate) enum ContainerOps {
    Map {
        insert: MapInsertFn,
        entries: MapEntriesFn,
    },
    Set {
        insert: InsertFn,
        elements: ElementsFn,
    },
    List {
        insert: InsertFn,
        elements: ElementsFn,
    },
}

fn insert_entry_into<M: MapContainer>(
    container: &mut dyn Any,
    key: AnyValue,
    value: AnyValue,
) -> Result<(), DataObjectError> {
    let map = downcast_container_mut::<M>(container)?;
    map.put(downcast_value(key)?, downcast_value(value)?);
    Ok(())
}

fn add_element_to<S: SetContainer>(
    container: &mut dyn Any,
    element: AnyValue,
) -> Result<(), DataObjectError> {
    downcast_container_mut::<S>(container)?.add(downcast_value(element)?);
    Ok(())
}

fn push_element_to<L: ListContainer>(
    container: &mut dyn Any,
    element: AnyValue,
) -> Result<(), DataObjectError> {
    downcast_container_mut::<L>(container)?.push(downcast_value(element)?);
    Ok(())
}

impl ContainerOps {
    pub(crate) fn map<M: MapContainer>() -> Self {
        ContainerOps::Map {
            insert: Arc::new(insert_entry_into::<M>),
            entries: Arc::new(|container: &dyn Any| -> Result<_, DataObjectError> {
                let map = downcast_container::<M>(container)?;
                Ok(map
                    .entries()
                    .into_iter()
                    .map(|(k, v)| (Box::new(k) as AnyValue, Box::new(v) as AnyValue))
                    .collect())
            }),
        }
    }

    pub(crate) fn set<S: SetContainer>() -> Self {
        ContainerOps::Set {
            insert: Arc::new(add_element_to::<S>),
            elements: Arc::new(|container: &dyn Any| -> Result<_, DataObjectError> {
                Ok(downcast_container::<S>(container)?
                    .elements()
                    .into_iter()
                    .map(|e| Box::new(e) as AnyValue)
                    .collect())
            }),
        }
    }

    pub(crate) fn list<L: ListContainer>() -> Self {
        ContainerOps::List {
            insert: Arc::new(push_element_to::<L>),
            elements: Arc::new(|container: &dyn Any| -> Result<_, DataObjectError> {
                Ok(downcast_container::<L>(container)?
                    .elements()
                    .into_iter()
                    .map(|e| Box::new(e) as AnyValue)
                    .collect())
            }),
        }
    }

    pub(crate) fn insert_entry(
        &self,
        container: &mut dyn Any,
        key: AnyValue,
        value: AnyValue,
    ) -> Result<(), DataObjectError> {
        match self {
            ContainerOps::Map { insert, .. } => insert(container, key, value),
            ContainerOps::Set { .. } | ContainerOps::List { .. } => {
                Err(DataObjectError::IncapableObject { expected: "map" })
            }
        }
    }

    pub(crate) fn insert_element(
        &self,
        container: &mut dyn Any,
        element: AnyValue,
    ) -> Result<(), DataObjectError> {
        match self {
            ContainerOps::Set { insert, .. } | ContainerOps::List { insert, .. } => {
                insert(container, element)
            }
            ContainerOps::Map { .. } => Err(DataObjectError::IncapableObject {
                expected: "set or list",
            }),
        }
    }

    pub(crate) fn entries(
        &self,
        container: &dyn Any,
    ) -> Result<Vec<(AnyValue, AnyValue)>, DataObjectError> {
        match self {
            ContainerOps::Map { entries, .. } => entries(container),
            ContainerOps::Set { .. } | ContainerOps::List { .. } => {
                Err(DataObjectError::IncapableObject { expected: "map" })
            }
        }
    }

    pub(crate) fn elements(&self, container: &dyn Any) -> Result<Vec<AnyValue>, DataObjectError> {
        match self {
            ContainerOps::Set { elements, .. } | ContainerOps::List { elements, .. } => {
                elements(container)
            }
            ContainerOps::Map { .. } => Err(DataObjectError::IncapableObject {
                expected: "set or list",
            }),
        }
    }
}
