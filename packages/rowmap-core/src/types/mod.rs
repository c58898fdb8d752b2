//! Type identity, column values and scalar codecs.

pub mod builtin_types;
pub mod codec;
pub mod error;
pub mod sql_value;
pub mod type_key;
pub mod type_registry;

pub use builtin_types::register_builtin_types;
pub use codec::{
    DataArgumentWrapper, DataExtractor, DataExtractorFactory, RegistryArgumentWrapper,
    RegistryExtractorFactory,
};
pub use error::TypeError;
pub use sql_value::{ColumnType, SqlValue};
pub use type_key::{AnyValue, TypeKey};
pub use type_registry::{ScalarCodec, TypeRegistry};
