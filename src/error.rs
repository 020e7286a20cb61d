//! Error taxonomy of the query layer.

use thiserror::Error;

use crate::tokenizer::TokenizerError;

pub type QueryResult<T> = std::result::Result<T, QueryError>;

#[derive(Debug, Error)]
pub enum QueryError {
    /// A backing store file is missing, unreadable, or has the wrong schema.
    #[error("{0}")]
    StoreUnavailable(String),

    #[error(transparent)]
    Tokenizer(#[from] TokenizerError),

    /// Rejected before any store access.
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl QueryError {
    /// Machine-readable code used in JSON error bodies.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::Tokenizer(_) => "tokenizer_unavailable",
            Self::InvalidInput(_) => "bad_request",
            Self::NotFound(_) => "not_found",
            Self::Database(_) => "internal",
        }
    }

    /// Whether the failure is the service's environment rather than the request.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::Tokenizer(_))
    }
}
