//! EMG-Stream: serial EMG acquisition with a streaming RMS envelope
//!
//! This library acquires samples from a serial EMG acquisition device and
//! turns them into calibrated series ready for display. It features:
//!
//! - 13-byte frame validation with XOR checksums and short-read reassembly
//! - 24-bit two's-complement decoding in TEST (1 channel + counter) and
//!   NORMAL (2 channel) layouts
//! - Session sizing from the device's announcement frame
//! - Bounded per-channel buffering and an incrementally updated RMS envelope
//! - Device command handshake, serial link and a simulated device
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use emg_stream::acquisition::{AcquisitionSession, LogRenderer};
//! use emg_stream::config::SystemConfig;
//! use emg_stream::hal::SimulatedDevice;
//! use emg_stream::config::constants::session_magic::DATA_2D_PAYLOAD;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SystemConfig::default();
//!     let device = SimulatedDevice::recording(DATA_2D_PAYLOAD, 33 * 500)?;
//!
//!     let mut session = AcquisitionSession::new(device, &config)?;
//!     let report = session.run(&mut LogRenderer)?;
//!
//!     println!("{} samples, {}", report.samples, report.completion);
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_inception)]

pub mod acquisition;
pub mod config;
pub mod error;
pub mod hal;
pub mod processing;
pub mod protocol;
pub mod utils;

// Re-export commonly used types for convenience
pub use acquisition::{
    AcquisitionSession, Completion, Renderer, SessionReport, SessionSnapshot, SessionState,
    StopHandle,
};
pub use config::{ConfigLoader, SystemConfig};
pub use error::{EmgError, EmgResult};
pub use hal::{AcquisitionMode, ByteSource, SessionDescriptor};
pub use processing::{EnvelopeComputer, EnvelopeConfig, EnvelopeTracker};
pub use protocol::{Frame, FrameVerdict, SampleDecoder, ValidFrame};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get library information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: "Serial EMG frame protocol, calibrated decoding and streaming RMS envelope"
            .to_string(),
        features: vec![
            "Frame validation and reassembly".to_string(),
            "24-bit sample decoding".to_string(),
            "Incremental RMS envelope".to_string(),
            "Device handshake and serial link".to_string(),
        ],
    }
}

/// Library version information
#[derive(Debug, Clone)]
pub struct VersionInfo {
    /// Library name
    pub name: String,
    /// Version string
    pub version: String,
    /// Description
    pub description: String,
    /// List of features
    pub features: Vec<String>,
}
