use async_trait::async_trait;
use loyalty_client_common::frame::Frame;

use super::ScanResult;

/// Decode provider interface.
///
/// Implementations receive one captured frame and report whether a code was
/// found in it. "Nothing visible yet" is [`ScanResult::NotFound`], never an
/// error.
#[async_trait]
pub trait Decoder: Send + Sync {
    async fn decode(&self, frame: Frame) -> ScanResult;

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}
