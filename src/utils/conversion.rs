// src/utils/conversion.rs
//! Sample index and time conversions

use std::time::Duration;

/// Time stamp in seconds of each of `len` samples taken at `sample_rate_hz`
///
/// Returns an empty axis for a zero rate.
pub fn time_axis(len: usize, sample_rate_hz: u32) -> Vec<f64> {
    if sample_rate_hz == 0 {
        return Vec::new();
    }
    let period = 1.0 / f64::from(sample_rate_hz);
    (0..len).map(|i| i as f64 * period).collect()
}

/// Signal duration covered by `samples` at `sample_rate_hz`
pub fn samples_to_duration(samples: usize, sample_rate_hz: u32) -> Duration {
    if sample_rate_hz == 0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(samples as f64 / f64::from(sample_rate_hz))
}
