// src/hal/types.rs
//! Core types shared between the device layer and the acquisition session

use serde::{Deserialize, Serialize};
use std::fmt;

/// Frame layout selected on the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AcquisitionMode {
    /// One channel plus an auxiliary counter byte
    Test,
    /// Two channels; stored recordings announce their length in the first frame
    #[default]
    Normal,
}

impl AcquisitionMode {
    /// Number of analog channels carried per frame
    pub fn channel_count(self) -> usize {
        match self {
            AcquisitionMode::Test => 1,
            AcquisitionMode::Normal => 2,
        }
    }
}

impl fmt::Display for AcquisitionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcquisitionMode::Test => write!(f, "test"),
            AcquisitionMode::Normal => write!(f, "normal"),
        }
    }
}

/// Length and rate of one acquisition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescriptor {
    pub duration_s: u32,
    /// Samples per channel; 0 when the length is unknown
    pub expected_samples: usize,
    pub sample_rate_hz: u32,
    /// Recording name, when the device announced a known one
    pub label: Option<String>,
}

impl SessionDescriptor {
    /// Descriptor for a recording of known duration
    pub fn from_duration(duration_s: u32, sample_rate_hz: u32, label: Option<String>) -> Self {
        Self {
            duration_s,
            expected_samples: duration_s as usize * sample_rate_hz as usize,
            sample_rate_hz,
            label,
        }
    }

    /// Descriptor for a stream whose length the device did not announce
    pub fn unknown(sample_rate_hz: u32) -> Self {
        Self {
            duration_s: 0,
            expected_samples: 0,
            sample_rate_hz,
            label: None,
        }
    }

    /// Unknown length: progress cannot be reported and the buffer is unbounded
    pub fn is_degenerate(&self) -> bool {
        self.expected_samples == 0
    }

    /// Fraction of the expected samples received, if the length is known
    pub fn progress(&self, received: usize) -> Option<f64> {
        if self.is_degenerate() {
            None
        } else {
            Some((received as f64 / self.expected_samples as f64).min(1.0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_channel_count() {
        assert_eq!(AcquisitionMode::Test.channel_count(), 1);
        assert_eq!(AcquisitionMode::Normal.channel_count(), 2);
        assert_eq!(AcquisitionMode::Test.to_string(), "test");
    }

    #[test]
    fn test_descriptor_from_duration() {
        let descriptor = SessionDescriptor::from_duration(90, 500, Some("EMG DATA 1d".into()));
        assert_eq!(descriptor.expected_samples, 45_000);
        assert!(!descriptor.is_degenerate());
        assert_eq!(descriptor.progress(22_500), Some(0.5));
        assert_eq!(descriptor.progress(90_000), Some(1.0));
    }

    #[test]
    fn test_degenerate_descriptor() {
        let descriptor = SessionDescriptor::unknown(500);
        assert!(descriptor.is_degenerate());
        assert_eq!(descriptor.duration_s, 0);
        assert_eq!(descriptor.progress(100), None);
    }
}
