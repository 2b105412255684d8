//! Database error types

use thiserror::Error;
use walletctl_budget::BudgetError;
use walletctl_ledger::LedgerError;
use walletctl_permits::PermitError;

/// Database operation errors
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Query error: {0}")]
    Query(#[from] sqlx::Error),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),
}

/// Result type for database operations
pub type DbResult<T> = Result<T, DbError>;

impl From<DbError> for LedgerError {
    fn from(e: DbError) -> Self {
        LedgerError::Persistence {
            message: e.to_string(),
        }
    }
}

impl From<DbError> for PermitError {
    fn from(e: DbError) -> Self {
        PermitError::Store {
            message: e.to_string(),
        }
    }
}

impl From<DbError> for BudgetError {
    fn from(e: DbError) -> Self {
        BudgetError::Store {
            message: e.to_string(),
        }
    }
}
