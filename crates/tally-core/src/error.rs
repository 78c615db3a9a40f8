//! Shared error type across tally crates.

use thiserror::Error;

/// Client-facing error codes (stable API).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCode {
    /// The durable store could not serve the request.
    Database,
    /// Configuration rejected at startup.
    BadConfig,
    /// Internal server error.
    Internal,
}

impl ClientCode {
    /// String representation used in JSON responses.
    pub fn as_str(self) -> &'static str {
        match self {
            ClientCode::Database => "database error",
            ClientCode::BadConfig => "bad config",
            ClientCode::Internal => "internal",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, TallyError>;

/// Unified error type used by core and server.
#[derive(Debug, Error)]
pub enum TallyError {
    /// Connection or query failure against the durable store.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    /// No pooled connection became free within the acquire timeout.
    #[error("connection pool exhausted: {0}")]
    PoolExhausted(String),
    /// Startup schema/row creation did not complete.
    #[error("initialization skipped: {0}")]
    InitializationSkipped(String),
    #[error("bad config: {0}")]
    BadConfig(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl TallyError {
    /// Map internal error to a stable client-facing code.
    ///
    /// Pool exhaustion is reported in the same class as any other store
    /// failure; callers cannot act on the difference.
    pub fn client_code(&self) -> ClientCode {
        match self {
            TallyError::StoreUnavailable(_)
            | TallyError::PoolExhausted(_)
            | TallyError::InitializationSkipped(_) => ClientCode::Database,
            TallyError::BadConfig(_) => ClientCode::BadConfig,
            TallyError::Internal(_) => ClientCode::Internal,
        }
    }

    /// True for every error that originates in the store or its pool.
    pub fn is_store_error(&self) -> bool {
        self.client_code() == ClientCode::Database
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_exhaustion_surfaces_as_database_error() {
        let err = TallyError::PoolExhausted("timed out after 30s".into());
        assert_eq!(err.client_code().as_str(), "database error");
        assert!(err.is_store_error());
    }

    #[test]
    fn config_errors_are_not_store_errors() {
        let err = TallyError::BadConfig("DB_POOL_SIZE must be >= 1".into());
        assert!(!err.is_store_error());
        assert_eq!(err.to_string(), "bad config: DB_POOL_SIZE must be >= 1");
    }
}
