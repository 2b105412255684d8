//! Funding backend interface

use async_trait::async_trait;
use thiserror::Error;
use walletctl_types::{PublicKey, Sats};

/// Errors from the funding backend
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("funding backend unavailable: {0}")]
    Unavailable(String),

    #[error("funding backend rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("invalid funding backend response: {0}")]
    Decode(String),

    #[error("funding backend timed out")]
    Timeout,
}

/// The custodian of the funds whose balance is disclosed
#[async_trait]
pub trait FundingBackend: Send + Sync {
    /// Raw spendable balance for `identity`, in sats
    async fn get_balance(&self, identity: &PublicKey) -> Result<Sats, BackendError>;
}
