//! Data object model: descriptors for mapped types and their values.

pub mod container;
pub mod descriptor;
pub mod expand;
pub mod value;

pub use container::{ListContainer, MapContainer, SetContainer};
pub use descriptor::{DataObjectDescriptor, DataObjectKind, ExpandRules};
pub use expand::{At, Entry, ExpandRule, ExpandRuleBuilder};
pub use value::{
    Accessor, Constructor, KeyRole, Mutator, Redirect, Source, Structure, ValueDescriptor,
    ValueMetadata,
};
