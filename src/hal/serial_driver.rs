// src/hal/serial_driver.rs
//! Serial link to the acquisition device
//!
//! The device talks 8N1 at a fixed high baud rate with RTS/CTS flow control.
//! Only the parameters that vary between setups are configurable.

use crate::config::constants::acquisition::DEFAULT_READ_CHUNK_BYTES;
use crate::config::constants::serial::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Serial link settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SerialSettings {
    #[serde(default = "defaults::port_name")]
    pub port_name: String,

    #[serde(default = "defaults::baud_rate")]
    pub baud_rate: u32,

    /// Upper bound on one blocking read
    #[serde(default = "defaults::timeout_ms")]
    pub timeout_ms: u64,

    /// RTS/CTS
    #[serde(default = "defaults::hardware_flow_control")]
    pub hardware_flow_control: bool,

    /// Size of the buffer handed to each read
    #[serde(default = "defaults::read_chunk_bytes")]
    pub read_chunk_bytes: usize,
}

mod defaults {
    use super::*;

    pub fn port_name() -> String { DEFAULT_PORT_NAME.to_string() }
    pub fn baud_rate() -> u32 { DEFAULT_BAUD_RATE }
    pub fn timeout_ms() -> u64 { DEFAULT_TIMEOUT_MS }
    pub fn hardware_flow_control() -> bool { true }
    pub fn read_chunk_bytes() -> usize { DEFAULT_READ_CHUNK_BYTES }
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port_name: defaults::port_name(),
            baud_rate: defaults::baud_rate(),
            timeout_ms: defaults::timeout_ms(),
            hardware_flow_control: defaults::hardware_flow_control(),
            read_chunk_bytes: defaults::read_chunk_bytes(),
        }
    }
}

impl SerialSettings {
    /// Read timeout as a `Duration`
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.port_name.is_empty() {
            return Err("Port name cannot be empty".to_string());
        }

        if self.baud_rate == 0 || self.baud_rate > 4_000_000 {
            return Err(format!("Invalid baud rate: {}", self.baud_rate));
        }

        if self.timeout_ms == 0 || self.timeout_ms > MAX_TIMEOUT_MS {
            return Err(format!("Invalid timeout: {} ms", self.timeout_ms));
        }

        if self.read_chunk_bytes < crate::config::constants::protocol::FRAME_LEN {
            return Err(format!(
                "Read chunk of {} bytes cannot hold one frame",
                self.read_chunk_bytes
            ));
        }

        Ok(())
    }
}

#[cfg(feature = "serial")]
mod port {
    use super::SerialSettings;
    use crate::hal::{DeviceLink, LinkPort, SourceError};
    use serialport::{ClearBuffer, FlowControl, SerialPort};
    use std::io;
    use tracing::info;

    impl LinkPort for Box<dyn SerialPort> {
        fn discard_output(&mut self) -> io::Result<()> {
            self.clear(ClearBuffer::Output).map_err(io::Error::from)
        }
    }

    /// Open the device's serial port
    pub fn open_serial(settings: &SerialSettings) -> Result<DeviceLink<Box<dyn SerialPort>>, SourceError> {
        let flow_control = if settings.hardware_flow_control {
            FlowControl::Hardware
        } else {
            FlowControl::None
        };

        let port = serialport::new(settings.port_name.as_str(), settings.baud_rate)
            .timeout(settings.timeout())
            .flow_control(flow_control)
            .open()
            .map_err(|e| SourceError::Io(io::Error::from(e)))?;

        info!(
            port = %settings.port_name,
            baud = settings.baud_rate,
            "serial port opened"
        );
        Ok(DeviceLink::new(port))
    }
}

#[cfg(feature = "serial")]
pub use port::open_serial;
