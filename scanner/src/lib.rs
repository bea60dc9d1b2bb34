//! Camera-driven QR scanning: a camera stream is sampled on a fixed timer
//! and each frame is handed to a decode provider until one yields a code.

pub mod camera;
pub mod decode;
pub mod error;
pub mod sampler;
pub mod session;

pub use decode::{Decoder, ScanResult};
pub use error::ScanError;
pub use session::{ChannelObserver, ScanEvent, ScanObserver, ScanSession, ScanSettings, SessionState};
