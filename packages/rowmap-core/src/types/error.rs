/// Error type for scalar codec registration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TypeError {
    #[error("Type '{type_name}' already registered")]
    AlreadyRegistered { type_name: String },

    #[error("Type '{type_name}' not found")]
    NotFound { type_name: String },

    #[error("Type registry lock poisoned")]
    LockPoisoned,
}
