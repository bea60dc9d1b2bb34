pub mod local;
pub mod remote;
pub mod traits;

use loyalty_client_common::config::{DecodeConfig, ScanConfig};
use std::sync::Arc;

pub use local::LocalDecoder;
pub use remote::RemoteDecoder;
pub use traits::Decoder;

/// Outcome of one decode attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanResult {
    Found { payload: String, method: String },
    NotFound,
    Error { reason: String },
}

impl ScanResult {
    pub fn found(payload: impl Into<String>, method: impl Into<String>) -> Self {
        ScanResult::Found {
            payload: payload.into(),
            method: method.into(),
        }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        ScanResult::Error {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecoderSetupError {
    #[error("unknown decode strategy '{0}', expected 'remote' or 'local'")]
    UnknownStrategy(String),
    #[error("failed to build HTTP client: {0}")]
    Client(reqwest::Error),
}

/// Pick the decode strategy named in `[scan] strategy`.
pub fn from_config(
    scan: &ScanConfig,
    decode: &DecodeConfig,
) -> Result<Arc<dyn Decoder>, DecoderSetupError> {
    match scan.strategy.as_str() {
        "remote" => Ok(Arc::new(RemoteDecoder::from_config(decode)?)),
        "local" => Ok(Arc::new(LocalDecoder::new(decode.enhance))),
        other => Err(DecoderSetupError::UnknownStrategy(other.to_string())),
    }
}
