//! Registry error types

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// No live entry with this id (never inserted, or already removed)
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
}

impl RegistryError {
    pub(super) fn not_found(kind: &'static str, id: impl ToString) -> Self {
        RegistryError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}
