// src/hal/simulator.rs
//! Simulated acquisition device
//!
//! Emits the same byte stream as the real device: an optional NORMAL-mode
//! announcement frame followed by one frame per sample of a synthetic EMG
//! signal (bursts of an 80 Hz carrier over uniform noise). Corruption,
//! misalignment and short reads can be injected to exercise the pipeline.

use crate::config::constants::acquisition::DEFAULT_SAMPLE_RATE_HZ;
use crate::config::constants::protocol::{CHECKSUM_INDEX, PAYLOAD_LEN};
use crate::hal::{AcquisitionMode, ByteSource, SourceError};
use crate::protocol::{encode_channel_code, Calibration, Frame};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

const CARRIER_HZ: f64 = 80.0;

/// Simulator configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SimulatorConfig {
    pub mode: AcquisitionMode,
    pub sample_rate_hz: u32,
    /// Sample frames emitted before the stream closes
    pub sample_frames: usize,
    /// Payload of the first frame in NORMAL mode
    pub magic_payload: Option<[u8; PAYLOAD_LEN]>,
    /// Peak burst amplitude in calibrated units
    pub burst_amplitude: f64,
    /// Peak uniform noise in calibrated units
    pub noise_amplitude: f64,
    /// Burst on for the first half of each period
    pub burst_period_s: f64,
    /// Probability that a sample frame has its checksum damaged
    pub corruption_probability: f64,
    /// Stray bytes sent before the first frame
    pub leading_garbage: usize,
    /// Largest number of bytes returned by one read
    pub max_chunk_bytes: usize,
    /// Probability that a read times out with no data
    pub idle_probability: f64,
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            mode: AcquisitionMode::Normal,
            sample_rate_hz: DEFAULT_SAMPLE_RATE_HZ,
            sample_frames: DEFAULT_SAMPLE_RATE_HZ as usize * 10,
            magic_payload: None,
            burst_amplitude: 500.0,
            noise_amplitude: 20.0,
            burst_period_s: 2.0,
            corruption_probability: 0.0,
            leading_garbage: 0,
            max_chunk_bytes: 4096,
            idle_probability: 0.0,
            seed: 0x5EED,
        }
    }
}

impl SimulatorConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate_hz == 0 {
            return Err("Simulator sample rate must be greater than 0".to_string());
        }
        if self.max_chunk_bytes == 0 {
            return Err("Simulator chunk size must be greater than 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.corruption_probability) {
            return Err("Simulator corruption probability must be between 0.0 and 1.0".to_string());
        }
        if !(0.0..1.0).contains(&self.idle_probability) {
            return Err("Simulator idle probability must be in [0.0, 1.0)".to_string());
        }
        if self.burst_period_s <= 0.0 {
            return Err("Simulator burst period must be positive".to_string());
        }
        Ok(())
    }
}

/// Frame-level record of what the simulator sent
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulatorLog {
    /// Channel 1 codes of intact sample frames, in order
    pub intact_channel1: Vec<i32>,
    /// Number of sample frames sent with a damaged checksum
    pub corrupted_frames: usize,
}

/// Byte source behaving like the acquisition device
pub struct SimulatedDevice {
    config: SimulatorConfig,
    scale: f64,
    rng: StdRng,
    pending: Vec<u8>,
    cursor: usize,
    next_sample: usize,
    preamble_sent: bool,
    log: SimulatorLog,
}

impl SimulatedDevice {
    pub fn new(config: SimulatorConfig, calibration: &Calibration) -> Result<Self, String> {
        config.validate()?;
        calibration.validate()?;

        Ok(Self {
            rng: StdRng::seed_from_u64(config.seed),
            scale: calibration.scale_factor(),
            config,
            pending: Vec::new(),
            cursor: 0,
            next_sample: 0,
            preamble_sent: false,
            log: SimulatorLog::default(),
        })
    }

    /// Device replaying a stored NORMAL-mode recording announced by `magic`
    pub fn recording(magic: [u8; PAYLOAD_LEN], sample_frames: usize) -> Result<Self, String> {
        Self::new(
            SimulatorConfig {
                mode: AcquisitionMode::Normal,
                magic_payload: Some(magic),
                sample_frames,
                ..SimulatorConfig::default()
            },
            &Calibration::default(),
        )
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn log(&self) -> &SimulatorLog {
        &self.log
    }

    /// True once every byte has been handed out
    pub fn is_exhausted(&self) -> bool {
        self.preamble_sent
            && self.next_sample >= self.config.sample_frames
            && self.cursor >= self.pending.len()
    }

    fn signal_at(&mut self, index: usize, phase: f64) -> f64 {
        let t = index as f64 / f64::from(self.config.sample_rate_hz);
        let active = (t % self.config.burst_period_s) < self.config.burst_period_s / 2.0;
        let burst = if active {
            self.config.burst_amplitude * (TAU * CARRIER_HZ * t + phase).sin()
        } else {
            0.0
        };
        let noise = if self.config.noise_amplitude > 0.0 {
            self.rng.gen_range(-1.0..=1.0) * self.config.noise_amplitude
        } else {
            0.0
        };
        burst + noise
    }

    fn to_code(&self, value: f64) -> i32 {
        (value / self.scale).round() as i32
    }

    fn sample_payload(&mut self, index: usize) -> ([u8; PAYLOAD_LEN], i32) {
        let value1 = self.signal_at(index, 0.0);
        let code1 = self.to_code(value1);
        let ch1 = encode_channel_code(code1);
        let mut payload = [0u8; PAYLOAD_LEN];
        payload[..3].copy_from_slice(&ch1);

        match self.config.mode {
            AcquisitionMode::Test => {
                payload[6] = index as u8;
            }
            AcquisitionMode::Normal => {
                let value2 = 0.5 * self.signal_at(index, TAU / 4.0);
                let code2 = self.to_code(value2);
                payload[3..6].copy_from_slice(&encode_channel_code(code2));
            }
        }
        // sign-clamped round trip, as the device would report it
        (payload, crate::protocol::decode_channel_code(ch1))
    }

    fn refill(&mut self, want: usize) {
        if self.cursor > 0 {
            self.pending.drain(..self.cursor);
            self.cursor = 0;
        }

        if !self.preamble_sent {
            self.pending.extend((0..self.config.leading_garbage).map(|i| i as u8 ^ 0xA5));
            if self.config.mode == AcquisitionMode::Normal {
                if let Some(magic) = self.config.magic_payload {
                    self.pending.extend_from_slice(Frame::encode(magic).as_bytes());
                }
            }
            self.preamble_sent = true;
        }

        while self.pending.len() < want && self.next_sample < self.config.sample_frames {
            let index = self.next_sample;
            self.next_sample += 1;

            let (payload, code1) = self.sample_payload(index);
            let mut bytes = *Frame::encode(payload).as_bytes();
            if self.config.corruption_probability > 0.0
                && self.rng.gen_bool(self.config.corruption_probability)
            {
                bytes[CHECKSUM_INDEX] ^= 0xFF;
                self.log.corrupted_frames += 1;
            } else {
                self.log.intact_channel1.push(code1);
            }
            self.pending.extend_from_slice(&bytes);
        }
    }
}

impl ByteSource for SimulatedDevice {
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize, SourceError> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.config.idle_probability > 0.0 && self.rng.gen_bool(self.config.idle_probability) {
            return Ok(0);
        }

        let want = buf.len().min(self.config.max_chunk_bytes);
        if self.pending.len() - self.cursor < want {
            self.refill(want);
        }

        let available = &self.pending[self.cursor..];
        if available.is_empty() {
            return Err(SourceError::Closed);
        }

        let n = available.len().min(want);
        buf[..n].copy_from_slice(&available[..n]);
        self.cursor += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::constants::protocol::FRAME_LEN;
    use crate::protocol::check;

    fn drain(device: &mut SimulatedDevice) -> Vec<u8> {
        let mut bytes = Vec::new();
        let mut buf = [0u8; 256];
        loop {
            match device.read_bytes(&mut buf) {
                Ok(n) => bytes.extend_from_slice(&buf[..n]),
                Err(SourceError::Closed) => return bytes,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
    }

    #[test]
    fn test_emits_valid_frames() {
        let config = SimulatorConfig {
            sample_frames: 50,
            ..SimulatorConfig::default()
        };
        let mut device = SimulatedDevice::new(config, &Calibration::default()).unwrap();
        let bytes = drain(&mut device);

        assert_eq!(bytes.len(), 50 * FRAME_LEN);
        assert!(bytes.chunks(FRAME_LEN).all(|chunk| check(chunk).is_valid()));
        assert_eq!(device.log().intact_channel1.len(), 50);
        assert!(device.is_exhausted());
    }

    #[test]
    fn test_recording_starts_with_magic() {
        let magic = [0x00, 0x00, 0x25, 0x00, 0x00, 0x00, 0x01, 0x59];
        let mut device = SimulatedDevice::recording(magic, 3).unwrap();
        let bytes = drain(&mut device);

        assert_eq!(bytes.len(), 4 * FRAME_LEN);
        assert_eq!(&bytes[..FRAME_LEN], Frame::encode(magic).as_bytes());
    }

    #[test]
    fn test_payload_carries_logged_codes() {
        let config = SimulatorConfig {
            mode: AcquisitionMode::Test,
            sample_frames: 40,
            ..SimulatorConfig::default()
        };
        let mut device = SimulatedDevice::new(config, &Calibration::default()).unwrap();
        let bytes = drain(&mut device);

        for (i, chunk) in bytes.chunks(FRAME_LEN).enumerate() {
            let payload = Frame::from_slice(chunk).unwrap().payload();
            let code = crate::protocol::decode_channel_code([payload[0], payload[1], payload[2]]);
            assert_eq!(code, device.log().intact_channel1[i]);
            assert_eq!(payload[6], i as u8);
        }
    }

    #[test]
    fn test_normal_mode_fills_second_channel() {
        let config = SimulatorConfig {
            mode: AcquisitionMode::Normal,
            sample_frames: 40,
            ..SimulatorConfig::default()
        };
        let mut device = SimulatedDevice::new(config, &Calibration::default()).unwrap();
        let bytes = drain(&mut device);

        assert!(bytes
            .chunks(FRAME_LEN)
            .map(|chunk| Frame::from_slice(chunk).unwrap().payload())
            .any(|payload| payload[3..6] != [0, 0, 0]));
    }

    #[test]
    fn test_chunking_limits_reads() {
        let config = SimulatorConfig {
            sample_frames: 4,
            max_chunk_bytes: 5,
            ..SimulatorConfig::default()
        };
        let mut device = SimulatedDevice::new(config, &Calibration::default()).unwrap();
        let mut buf = [0u8; 64];
        assert_eq!(device.read_bytes(&mut buf).unwrap(), 5);
    }

    #[test]
    fn test_corruption_is_logged() {
        let config = SimulatorConfig {
            sample_frames: 200,
            corruption_probability: 0.25,
            ..SimulatorConfig::default()
        };
        let mut device = SimulatedDevice::new(config, &Calibration::default()).unwrap();
        let bytes = drain(&mut device);

        let invalid = bytes
            .chunks(FRAME_LEN)
            .filter(|chunk| !check(chunk).is_valid())
            .count();
        assert_eq!(invalid, device.log().corrupted_frames);
        assert_eq!(device.log().intact_channel1.len() + invalid, 200);
        assert!(invalid > 0);
    }

    #[test]
    fn test_same_seed_same_stream() {
        let config = SimulatorConfig {
            sample_frames: 20,
            ..SimulatorConfig::default()
        };
        let mut a = SimulatedDevice::new(config.clone(), &Calibration::default()).unwrap();
        let mut b = SimulatedDevice::new(config, &Calibration::default()).unwrap();
        assert_eq!(drain(&mut a), drain(&mut b));
    }

    #[test]
    fn test_invalid_config() {
        let config = SimulatorConfig {
            corruption_probability: 1.5,
            ..SimulatorConfig::default()
        };
        assert!(SimulatedDevice::new(config, &Calibration::default()).is_err());
    }
}
