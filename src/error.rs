//! Error types for the Kontos library.
//!
//! All fallible operations return [`Result`], whose error type is the
//! [`KontosError`] enum. Missing terms and missing documents are not
//! errors anywhere in the library; they yield empty postings and zero
//! counts instead.
//!
//! # Examples
//!
//! ```
//! use kontos::error::{KontosError, Result};
//!
//! fn example_operation() -> Result<()> {
//!     Err(KontosError::invalid_input("positions must be sorted"))
//! }
//!
//! match example_operation() {
//!     Ok(_) => println!("Success"),
//!     Err(e) => eprintln!("Error: {e}"),
//! }
//! ```

use anyhow;
use thiserror::Error;

/// The main error type for Kontos operations.
#[derive(Error, Debug)]
pub enum KontosError {
    /// A builder or the codec received malformed data (unsorted columns,
    /// mismatched lengths, or a position above `MAX_POSN`).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A query was malformed (e.g. a phrase with fewer than two terms).
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// An encoded posting array violated an internal invariant, which
    /// indicates corruption upstream of the query.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Generic error for other cases.
    #[error("Error: {0}")]
    Other(String),

    /// Generic anyhow error.
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Result type alias for operations that may fail with [`KontosError`].
pub type Result<T> = std::result::Result<T, KontosError>;

impl KontosError {
    /// Create a new invalid input error.
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        KontosError::InvalidInput(msg.into())
    }

    /// Create a new invalid query error.
    pub fn invalid_query<S: Into<String>>(msg: S) -> Self {
        KontosError::InvalidQuery(msg.into())
    }

    /// Create a new invariant violation error.
    pub fn invariant<S: Into<String>>(msg: S) -> Self {
        KontosError::InvariantViolation(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        KontosError::Other(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let error = KontosError::invalid_input("unsorted positions");
        assert_eq!(error.to_string(), "Invalid input: unsorted positions");

        let error = KontosError::invalid_query("too few terms");
        assert_eq!(error.to_string(), "Invalid query: too few terms");

        let error = KontosError::invariant("duplicate bucket");
        assert_eq!(error.to_string(), "Invariant violation: duplicate bucket");
    }

    #[test]
    fn test_anyhow_conversion() {
        let err = anyhow::anyhow!("something else");
        let kontos_error = KontosError::from(err);

        match kontos_error {
            KontosError::Anyhow(_) => {} // Expected
            _ => panic!("Expected anyhow error variant"),
        }
    }
}
