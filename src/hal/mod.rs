// src/hal/mod.rs
//! Hardware Abstraction Layer for the acquisition device

pub mod device_link;
pub mod serial_driver;
pub mod simulator;
pub mod traits;
pub mod types;

pub use device_link::{Command, DeviceLink, HandshakeError, LinkPort};
#[cfg(feature = "serial")]
pub use serial_driver::open_serial;
pub use serial_driver::SerialSettings;
pub use simulator::{SimulatedDevice, SimulatorConfig, SimulatorLog};
pub use traits::*;
pub use types::*;
