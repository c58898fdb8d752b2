//! Error types for interpretation, marshalling and execution.

use std::fmt;

use thiserror::Error;

use crate::types::TypeError;

/// Structural errors in a data object declaration.
///
/// Raised while interpreting declarations or sealing descriptors. These are
/// never retried: the declaration itself has to be fixed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformationError {
    #[error("{what} already sealed")]
    AlreadySealed { what: &'static str },

    #[error("{what} is sealed and can no longer be modified")]
    Sealed { what: &'static str },

    #[error("Value name undefined (Owner: {owner})")]
    ValueNameUndefined { owner: String },

    #[error("Value \"{name}\" has a null owner")]
    OwnerUndefined { name: String },

    #[error("Value \"{name}\" has a null getter")]
    GetterUndefined { name: String },

    #[error("Value \"{name}\" has a null setter")]
    SetterUndefined { name: String },

    #[error("Key not defined (Type: {type_name})")]
    KeyUndefined { type_name: String },

    #[error("Primary key not defined (Type: {type_name})")]
    PrimaryKeyUndefined { type_name: String },

    #[error("{role} is not supported in {shape} data object (Value: {name})")]
    KeyRoleUnsupported {
        role: &'static str,
        shape: &'static str,
        name: String,
    },

    #[error("Primary key already exists (Value: {name})")]
    DuplicatedPrimaryKey { name: String },

    #[error("Key already exists (Value: {name})")]
    DuplicatedKey { name: String },

    #[error("Duplicated value object \"{name}\"")]
    DuplicatedValue { name: String },

    #[error("Duplicated value object metadata (Field: {field})")]
    DuplicatedValueMetadata { field: String },

    #[error("Value name of field \"{field}\" cannot be resolved")]
    UnresolvedName { field: String },

    #[error("Unsupported built-in expand rule (Type: {type_name})")]
    UnsupportedBuiltinRule { type_name: String },

    #[error("Duplicated expand rule declaration (Type: {type_name})")]
    DuplicatedExpandRule { type_name: String },

    #[error("Expand rule of {target} has no entry")]
    EmptyExpandRule { target: String },

    #[error("Multiple inheritance declared (Type: {type_name})")]
    MultipleInheritance { type_name: String },

    #[error("Inheritance cycle through {type_name}")]
    InheritanceCycle { type_name: String },

    #[error("Invalid {role}: No such value object (Method: {method}, Value: {name})")]
    NoSuchValue {
        role: &'static str,
        method: String,
        name: String,
    },

    #[error("Duplicated {role} (Method: {method}, Value: {name})")]
    DuplicatedRedirect {
        role: &'static str,
        method: String,
        name: String,
    },

    #[error("Using @{role} without @Inheritance (Method: {method})")]
    OverrideWithoutInheritance { role: &'static str, method: String },

    #[error("Overriding {role} of a non-existent value object (Method: {method}, Value: {name})")]
    OverrideOfNonexistent {
        role: &'static str,
        method: String,
        name: String,
    },

    #[error("Duplicated metadata (Method: {method}) @InheritedGetter & @InheritedSetter")]
    DuplicatedInheritanceMarker { method: String },

    #[error("Not inherited from any {role} but found @Inherited{marker} (Method: {method}, Type: {type_name})")]
    NotInherited {
        role: &'static str,
        marker: &'static str,
        method: String,
        type_name: String,
    },

    #[error("Incompatible {role} inheritance (Method: {method}, Pinned: {pinned}, Inherited: {inherited})")]
    IncompatibleInheritance {
        role: &'static str,
        method: String,
        pinned: String,
        inherited: String,
    },

    #[error("Duplicated method metadata of {method}")]
    DuplicatedMethodMetadata { method: String },

    #[error("{required} argument(s) required, {found} found ({role} {method})")]
    ArgumentCount {
        role: &'static str,
        method: String,
        required: usize,
        found: usize,
    },

    #[error("Invalid argument type at index {index} ({role} {method}, Declared: {declared}, Expected: {expected})")]
    ArgumentType {
        role: &'static str,
        method: String,
        index: usize,
        declared: String,
        expected: String,
    },

    #[error("Invalid getter return type (Name: {method}, Declared: {declared}, Expected: {expected})")]
    ReturnType {
        method: String,
        declared: String,
        expected: String,
    },

    #[error("Uncompleted signature ({required} slot(s) required, {remaining} remaining)")]
    UncompletedSignature { required: usize, remaining: usize },

    #[error("Container value \"{name}\" declares no signature")]
    MissingSignature { name: String },
}

/// Failure to turn a type into a data object descriptor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InterpretationError {
    #[error("Metadata annotation not found in type {type_name}")]
    NotAnnotated { type_name: String },

    #[error("Duplicated metadata annotation in type {type_name}")]
    AmbiguousShape { type_name: String },

    #[error("Type {type_name} is not a {expected} data object")]
    WrongShape {
        type_name: String,
        expected: &'static str,
    },

    #[error(transparent)]
    Malformed(#[from] MalformationError),
}

/// A bound accessor was handed an object or value of the wrong type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataObjectError {
    #[error("Object is not an instance of {expected}")]
    IncapableObject { expected: &'static str },

    #[error("Value is not an instance of {expected}")]
    IncapableValue { expected: &'static str },

    #[error("Null assigned to non-nullable {expected}")]
    NullValue { expected: &'static str },

    #[error("Value \"{name}\" has no bound {capability}")]
    Unbound {
        name: String,
        capability: &'static str,
    },
}

/// Errors raised by a SQL executor.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SqlError {
    #[error("Table '{table}' not found")]
    TableNotFound { table: String },

    #[error("Table '{0}' already exists")]
    TableAlreadyExists(String),

    #[error("Column '{column}' not found in table '{table}'")]
    ColumnNotFound { table: String, column: String },

    #[error("Duplicated column '{column}' in table '{table}'")]
    DuplicatedColumn { table: String, column: String },

    #[error("Constraint violation on table '{table}': {constraint}")]
    ConstraintViolation { table: String, constraint: String },

    #[error("Type mismatch on column '{column}': expected {expected}, got {got}")]
    TypeMismatch {
        column: String,
        expected: String,
        got: String,
    },

    #[error("Cursor is not positioned on a row")]
    NoCurrentRow,

    #[error("Lock poisoned")]
    LockPoisoned,

    #[error("Connection failure: {0}")]
    Connection(String),
}

/// The collaborator that refused a value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    ArgumentWrapper,
    Extractor,
    MapValue,
    ListElement,
    SetElement,
    Key,
    Expansion,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cause = match self {
            Rejection::ArgumentWrapper => "Caused by ArgumentWrapper",
            Rejection::Extractor => "Caused by Extractor",
            Rejection::MapValue => "As Map value",
            Rejection::ListElement => "As List element",
            Rejection::SetElement => "As Set element",
            Rejection::Key => "As key",
            Rejection::Expansion => "No expand rule",
        };
        f.write_str(cause)
    }
}

/// Errors surfaced by data source operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataSourceError {
    #[error("Data source is busy with another transaction")]
    Busy,

    #[error("Unsupported value type ({cause}) {type_name}")]
    UnsupportedValueType { type_name: String, cause: Rejection },

    #[error("({operation}) Null {role} \"{name}\" in {shape}")]
    NullKey {
        operation: &'static str,
        role: &'static str,
        name: String,
        shape: &'static str,
    },

    #[error("Null value of not-null column \"{column}\"")]
    NullValue { column: String },

    #[error("Extraction failure (Bad type): column \"{column}\" expected {expected}")]
    BadType { column: String, expected: String },

    #[error("No constructor available for \"{name}\"")]
    Construction { name: String },

    #[error("Lock poisoned")]
    LockPoisoned,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Interpretation(#[from] InterpretationError),

    #[error(transparent)]
    Malformation(#[from] MalformationError),

    #[error(transparent)]
    DataObject(#[from] DataObjectError),

    #[error("Executor failure: {0}")]
    Sql(#[from] SqlError),

    #[error(transparent)]
    Type(#[from] TypeError),
}

impl DataSourceError {
    pub(crate) fn unsupported(type_name: &str, cause: Rejection) -> Self {
        DataSourceError::UnsupportedValueType {
            type_name: type_name.to_string(),
            cause,
        }
    }
}
