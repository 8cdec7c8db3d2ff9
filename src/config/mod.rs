// src/config/mod.rs
//! Configuration for acquisition, calibration, envelope and link settings

pub mod constants;
pub mod loader;

pub use loader::{ConfigError, ConfigLoader};

use crate::acquisition::RefreshCadence;
use crate::hal::{AcquisitionMode, SerialSettings, SessionDescriptor};
use crate::processing::EnvelopeSettings;
use crate::protocol::{builtin_entries, Calibration, ResyncPolicy, SessionMagic, SessionMagicTable};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Complete system configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SystemConfig {
    #[serde(default)]
    pub acquisition: AcquisitionSettings,
    #[serde(default)]
    pub calibration: Calibration,
    #[serde(default)]
    pub envelope: EnvelopeSettings,
    #[serde(default)]
    pub protocol: ProtocolSettings,
    #[serde(default)]
    pub serial: SerialSettings,
    /// Known recordings announced by the first NORMAL-mode frame
    #[serde(default = "defaults::session_magic")]
    pub session_magic: Vec<SessionMagic>,
}

/// Session-level acquisition settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AcquisitionSettings {
    #[serde(default = "defaults::mode")]
    pub mode: AcquisitionMode,

    #[serde(default = "defaults::sample_rate_hz")]
    pub sample_rate_hz: u32,

    /// Recording length in TEST mode, where the device announces none
    #[serde(default = "defaults::test_duration_s")]
    pub test_duration_s: u32,

    /// Refresh the envelope every N samples; defaults to one second of signal
    #[serde(default)]
    pub refresh_every_samples: Option<usize>,

    /// Refresh the envelope on a wall-clock interval instead of a sample count
    #[serde(default)]
    pub refresh_interval_ms: Option<u64>,
}

/// Frame reassembly settings
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProtocolSettings {
    #[serde(default)]
    pub resync: ResyncPolicy,
}

/// Default value providers using constants
mod defaults {
    use crate::config::constants::*;
    use crate::hal::AcquisitionMode;
    use crate::protocol::SessionMagic;

    pub fn mode() -> AcquisitionMode { AcquisitionMode::Normal }
    pub fn sample_rate_hz() -> u32 { acquisition::DEFAULT_SAMPLE_RATE_HZ }
    pub fn test_duration_s() -> u32 { acquisition::DEFAULT_TEST_DURATION_S }

    pub fn session_magic() -> Vec<SessionMagic> { crate::protocol::builtin_entries() }
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            mode: defaults::mode(),
            sample_rate_hz: defaults::sample_rate_hz(),
            test_duration_s: defaults::test_duration_s(),
            refresh_every_samples: None,
            refresh_interval_ms: None,
        }
    }
}

impl AcquisitionSettings {
    /// Envelope refresh cadence; a wall-clock interval takes precedence
    pub fn cadence(&self) -> RefreshCadence {
        match (self.refresh_interval_ms, self.refresh_every_samples) {
            (Some(ms), _) => RefreshCadence::Every(Duration::from_millis(ms)),
            (None, Some(n)) => RefreshCadence::EverySamples(n),
            (None, None) => RefreshCadence::EverySamples(self.sample_rate_hz as usize),
        }
    }

    /// Descriptor used in TEST mode
    pub fn test_descriptor(&self) -> SessionDescriptor {
        SessionDescriptor::from_duration(self.test_duration_s, self.sample_rate_hz, None)
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            acquisition: AcquisitionSettings::default(),
            calibration: Calibration::default(),
            envelope: EnvelopeSettings::default(),
            protocol: ProtocolSettings::default(),
            serial: SerialSettings::default(),
            session_magic: builtin_entries(),
        }
    }
}

impl SystemConfig {
    /// Validate configuration consistency
    pub fn validate(&self) -> Result<(), Vec<String>> {
        use constants::acquisition::{MAX_SAMPLE_RATE_HZ, MIN_SAMPLE_RATE_HZ};

        let mut errors = Vec::new();
        let acquisition = &self.acquisition;

        if !(MIN_SAMPLE_RATE_HZ..=MAX_SAMPLE_RATE_HZ).contains(&acquisition.sample_rate_hz) {
            errors.push(format!(
                "Sample rate {} Hz outside [{}, {}]",
                acquisition.sample_rate_hz, MIN_SAMPLE_RATE_HZ, MAX_SAMPLE_RATE_HZ
            ));
        }

        if acquisition.mode == AcquisitionMode::Test && acquisition.test_duration_s == 0 {
            errors.push("TEST mode requires a non-zero test_duration_s".to_string());
        }

        if acquisition.refresh_every_samples == Some(0) {
            errors.push("refresh_every_samples must be greater than 0".to_string());
        }

        if acquisition.refresh_interval_ms == Some(0) {
            errors.push("refresh_interval_ms must be greater than 0".to_string());
        }

        if let Err(e) = self.calibration.validate() {
            errors.push(format!("Calibration: {}", e));
        }

        if let Err(e) = self.envelope.validate() {
            errors.push(format!("Envelope: {}", e));
        }

        if let ResyncPolicy::Slide { after: 0 } = self.protocol.resync {
            errors.push("Slide resync needs at least one invalid frame before scanning".to_string());
        }

        if let Err(e) = self.serial.validate() {
            errors.push(format!("Serial: {}", e));
        }

        let mut seen = HashSet::new();
        for entry in &self.session_magic {
            if !seen.insert(entry.payload) {
                errors.push(format!("Duplicate session magic payload for '{}'", entry.label));
            }
            if entry.duration_s == 0 {
                errors.push(format!("Session magic '{}' has zero duration", entry.label));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Magic table built from the configured entries
    pub fn magic_table(&self) -> SessionMagicTable {
        SessionMagicTable::new(self.session_magic.clone())
    }
}
