//! Receipt backend boundary
//!
//! The pipeline only needs two authenticated operations: the next value of the
//! receipt counter and inserting a receipt for a public id.

pub mod client;
pub mod models;

pub use client::{authorization_header, ApiClient};
pub use models::{AuthToken, AuthenticationRequest, NewReceipt, Receipt, User};

use crate::id::PublicId;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: String, status: u16 },
    #[error("unexpected response from {endpoint}: {message}")]
    InvalidResponse { endpoint: String, message: String },
}

pub trait ReceiptBackend {
    /// Next value the backend will assign to a receipt.
    fn next_auto_increment(&mut self) -> Result<u64, BackendError>;

    fn insert_receipt(&mut self, public_id: &PublicId) -> Result<Receipt, BackendError>;
}
