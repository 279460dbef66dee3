use thiserror::Error;

/// Result type for conversation graph operations.
pub type BraidResult<T> = Result<T, BraidError>;

/// Errors returned by the turn store, graph engine and head controller.
///
/// Every variant is recoverable by the caller; none leaves durable state
/// partially written.
#[derive(Debug, Error)]
pub enum BraidError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
    #[error("No conversation found with id={0}")]
    ConversationNotFound(String),
    #[error("No responses found in conversation {0}")]
    EmptyConversation(String),
    #[error("invalid conversation identifier: {0}")]
    InvalidIdentifier(String),
    #[error("No parent response found for {0}")]
    NoParent(String),
    #[error("No current head set")]
    HeadUnset,
    #[error("corrupt conversation graph: walk from {start} visited {visited} turns without reaching a root")]
    CorruptGraph { start: String, visited: usize },
    #[error("invalid turn: {0}")]
    Validation(String),
    #[error("invalid persisted value for '{field}': {value}")]
    InvalidPersistedValue { field: &'static str, value: String },
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Timestamp(#[from] chrono::ParseError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BraidError {
    pub(crate) fn turn_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "Response",
            id: id.into(),
        }
    }
}
