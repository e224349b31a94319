//! Verification transport seam.

use crate::protocol::{FaceData, VerifyResponse};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    #[error("server returned HTTP {0}")]
    Status(u16),
    #[error("server error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl TransportError {
    /// Failures worth retrying: the request may succeed unchanged later.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Network(_) | TransportError::Timeout | TransportError::Rpc { .. } => {
                true
            }
            TransportError::Status(code) => *code >= 500 || *code == 408 || *code == 429,
            TransportError::InvalidResponse(_) => false,
        }
    }
}

/// One request/response exchange with the verification endpoint.
#[async_trait]
pub trait VerificationTransport: Send + Sync {
    async fn verify(&self, face: &FaceData) -> Result<VerifyResponse, TransportError>;
}
