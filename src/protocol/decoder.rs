// src/protocol/decoder.rs
//! A/D code decoding and calibration
//!
//! Channel codes are 24-bit big-endian two's-complement integers. The scale
//! factor maps one code step to microvolts at the electrode, undoing the
//! amplifier gain:
//!
//! ```text
//! scale_uV = 1e6 * (Vref / (2^23 - 1)) / gain
//! ```

use crate::config::constants::calibration::{
    CODE_FULL_SCALE, CODE_SIGN_THRESHOLD, CODE_SPAN, DEFAULT_AMPLIFIER_GAIN,
    DEFAULT_REFERENCE_VOLTAGE_V, MICROVOLTS_PER_MILLIVOLT, MICROVOLTS_PER_VOLT,
};
use crate::config::constants::protocol::{
    BYTES_PER_CODE, CHANNEL1_OFFSET, CHANNEL2_OFFSET, COUNTER_OFFSET,
};
use crate::hal::AcquisitionMode;
use crate::protocol::ValidFrame;
use serde::{Deserialize, Serialize};

/// Largest number of analog channels a frame can carry
pub const MAX_CHANNELS: usize = 2;

/// Output unit for physical samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VoltageUnit {
    #[default]
    Microvolts,
    Millivolts,
}

/// Analog front-end calibration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    #[serde(default = "default_reference_voltage")]
    pub reference_voltage_v: f64,

    #[serde(default = "default_amplifier_gain")]
    pub amplifier_gain: f64,

    #[serde(default)]
    pub unit: VoltageUnit,
}

fn default_reference_voltage() -> f64 {
    DEFAULT_REFERENCE_VOLTAGE_V
}

fn default_amplifier_gain() -> f64 {
    DEFAULT_AMPLIFIER_GAIN
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            reference_voltage_v: DEFAULT_REFERENCE_VOLTAGE_V,
            amplifier_gain: DEFAULT_AMPLIFIER_GAIN,
            unit: VoltageUnit::Microvolts,
        }
    }
}

impl Calibration {
    /// Physical units per A/D code step
    pub fn scale_factor(&self) -> f64 {
        let microvolts =
            MICROVOLTS_PER_VOLT * (self.reference_voltage_v / CODE_FULL_SCALE) / self.amplifier_gain;
        match self.unit {
            VoltageUnit::Microvolts => microvolts,
            VoltageUnit::Millivolts => microvolts / MICROVOLTS_PER_MILLIVOLT,
        }
    }

    /// Check that the constants give a finite, non-zero scale
    pub fn validate(&self) -> Result<(), String> {
        if !(self.reference_voltage_v.is_finite() && self.reference_voltage_v > 0.0) {
            return Err(format!(
                "reference voltage must be positive, got {}",
                self.reference_voltage_v
            ));
        }
        if !(self.amplifier_gain.is_finite() && self.amplifier_gain > 0.0) {
            return Err(format!(
                "amplifier gain must be positive, got {}",
                self.amplifier_gain
            ));
        }
        Ok(())
    }
}

/// Reconstruct a signed 24-bit code from three big-endian bytes
pub fn decode_channel_code(bytes: [u8; BYTES_PER_CODE]) -> i32 {
    let code = (i32::from(bytes[0]) << 16) | (i32::from(bytes[1]) << 8) | i32::from(bytes[2]);
    if code >= CODE_SIGN_THRESHOLD {
        code - CODE_SPAN
    } else {
        code
    }
}

/// Inverse of [`decode_channel_code`]; `code` is clamped to the 24-bit range
pub fn encode_channel_code(code: i32) -> [u8; BYTES_PER_CODE] {
    let code = code.clamp(-CODE_SIGN_THRESHOLD, CODE_SIGN_THRESHOLD - 1);
    let raw = if code < 0 { code + CODE_SPAN } else { code };
    [(raw >> 16) as u8, (raw >> 8) as u8, raw as u8]
}

/// Physical values decoded from one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodedSample {
    values: [f64; MAX_CHANNELS],
    active: usize,
    counter: Option<u8>,
}

impl DecodedSample {
    /// Sample for a single-channel TEST frame
    pub fn test(channel1: f64, counter: u8) -> Self {
        Self {
            values: [channel1, 0.0],
            active: 1,
            counter: Some(counter),
        }
    }

    /// Sample for a two-channel NORMAL frame
    pub fn normal(channel1: f64, channel2: f64) -> Self {
        Self {
            values: [channel1, channel2],
            active: 2,
            counter: None,
        }
    }

    /// One value per active channel
    pub fn channels(&self) -> &[f64] {
        &self.values[..self.active]
    }

    /// Value of channel `index`, zero-based
    pub fn channel(&self, index: usize) -> Option<f64> {
        self.channels().get(index).copied()
    }

    /// TEST-mode counter byte
    pub fn counter(&self) -> Option<u8> {
        self.counter
    }
}

/// Converts validated frames into physical samples
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleDecoder {
    mode: AcquisitionMode,
    scale: f64,
}

impl SampleDecoder {
    pub fn new(mode: AcquisitionMode, calibration: &Calibration) -> Self {
        Self {
            mode,
            scale: calibration.scale_factor(),
        }
    }

    /// Frame layout this decoder interprets
    pub fn mode(&self) -> AcquisitionMode {
        self.mode
    }

    /// Units per code step
    pub fn scale_factor(&self) -> f64 {
        self.scale
    }

    /// Decode a validated frame. Total over its input; there is no error path.
    pub fn decode(&self, frame: &ValidFrame) -> DecodedSample {
        let payload = frame.payload();
        let channel1 = decode_channel_code(code_bytes(&payload, CHANNEL1_OFFSET));

        match self.mode {
            AcquisitionMode::Test => {
                DecodedSample::test(f64::from(channel1) * self.scale, payload[COUNTER_OFFSET])
            }
            AcquisitionMode::Normal => {
                let channel2 = decode_channel_code(code_bytes(&payload, CHANNEL2_OFFSET));
                DecodedSample::normal(
                    f64::from(channel1) * self.scale,
                    f64::from(channel2) * self.scale,
                )
            }
        }
    }
}

fn code_bytes(payload: &[u8], offset: usize) -> [u8; BYTES_PER_CODE] {
    [payload[offset], payload[offset + 1], payload[offset + 2]]
}
