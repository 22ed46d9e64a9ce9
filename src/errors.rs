use thiserror::Error;

/// Error type for relgraph operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RelGraphError {
    #[error("schema error: {0}")]
    SchemaError(String),
    #[error("duplicate identifier conflict: {0}")]
    DuplicateIdentifierConflict(String),
    #[error("dangling reference: {0}")]
    DanglingReference(String),
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),
    #[error("unknown ordinal value: {0}")]
    UnknownOrdinalValue(String),
    #[error("invalid binary value: {0}")]
    InvalidBinaryValue(String),
    #[error("invalid numeric value: {0}")]
    InvalidNumericValue(String),
    #[error("empty seed set: {0}")]
    EmptySeed(String),
    #[error("assembly error: {0}")]
    AssemblyError(String),
    #[error("cancelled: {0}")]
    Cancelled(String),
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl RelGraphError {
    pub fn schema<T: Into<String>>(msg: T) -> Self {
        RelGraphError::SchemaError(msg.into())
    }

    pub fn duplicate_identifier<T: Into<String>>(msg: T) -> Self {
        RelGraphError::DuplicateIdentifierConflict(msg.into())
    }

    pub fn dangling<T: Into<String>>(msg: T) -> Self {
        RelGraphError::DanglingReference(msg.into())
    }

    pub fn shape<T: Into<String>>(msg: T) -> Self {
        RelGraphError::ShapeMismatch(msg.into())
    }

    pub fn unknown_ordinal<T: Into<String>>(msg: T) -> Self {
        RelGraphError::UnknownOrdinalValue(msg.into())
    }

    pub fn invalid_binary<T: Into<String>>(msg: T) -> Self {
        RelGraphError::InvalidBinaryValue(msg.into())
    }

    pub fn invalid_numeric<T: Into<String>>(msg: T) -> Self {
        RelGraphError::InvalidNumericValue(msg.into())
    }

    pub fn empty_seed<T: Into<String>>(msg: T) -> Self {
        RelGraphError::EmptySeed(msg.into())
    }

    pub fn assembly<T: Into<String>>(msg: T) -> Self {
        RelGraphError::AssemblyError(msg.into())
    }

    pub fn cancelled<T: Into<String>>(msg: T) -> Self {
        RelGraphError::Cancelled(msg.into())
    }

    pub fn timeout<T: Into<String>>(msg: T) -> Self {
        RelGraphError::Timeout(msg.into())
    }

    pub fn invalid_input<T: Into<String>>(msg: T) -> Self {
        RelGraphError::InvalidInput(msg.into())
    }

    /// True for the two signals a traversal raises when it is stopped early.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, RelGraphError::Cancelled(_) | RelGraphError::Timeout(_))
    }
}
