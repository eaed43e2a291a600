//! Common error types for SmartPlayer

use thiserror::Error;

/// Common result type for SmartPlayer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across SmartPlayer services
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input, including malformed stored values
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(found: bool) -> Result<()> {
        if found {
            Ok(())
        } else {
            Err(sqlx::Error::RowNotFound)?
        }
    }

    #[test]
    fn test_missing_row_is_database_error() {
        let err = lookup(false).unwrap_err();
        assert!(matches!(err, Error::Database(sqlx::Error::RowNotFound)));
        assert!(err.to_string().starts_with("Database error:"));
        assert!(lookup(true).is_ok());
    }
}
