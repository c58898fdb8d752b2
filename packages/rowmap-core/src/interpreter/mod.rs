//! Declarations of mapped types and their interpretation into descriptors.

pub mod cache;
pub mod declaration;
mod engine;

pub use cache::DataObjectCache;
pub use declaration::{
    DataObject, Declaration, FieldDeclaration, Method, MethodDeclaration, MethodSignature,
    Receiver,
};
pub use engine::Interpreter;
