// src/processing/envelope.rs
//! Sliding-window RMS envelope
//!
//! Windows of `W` samples start every `S = W - overlap` samples, at
//! `k = 0, S, 2S, ...` for as long as `k + W/2 < len`. Each window's RMS is
//! written over `[k, min(k + W, len))`; overlapping windows overwrite earlier
//! ones and indices no window has reached stay at zero.

use crate::config::constants::envelope::{DEFAULT_OVERLAP_DIVISOR, DEFAULT_WINDOW_DIVISOR};
use crate::error::{EmgError, EmgResult};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Window geometry in samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeConfig {
    window: usize,
    overlap: usize,
}

impl EnvelopeConfig {
    /// Requires `window >= 1` and `overlap < window`
    pub fn new(window: usize, overlap: usize) -> EmgResult<Self> {
        if window == 0 || overlap >= window {
            return Err(EmgError::InvalidEnvelope { window, overlap });
        }
        Ok(Self { window, overlap })
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Distance between consecutive window starts
    pub fn stride(&self) -> usize {
        self.window - self.overlap
    }

    fn half_window(&self) -> usize {
        self.window / 2
    }
}

/// Envelope sizing as configured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeSettings {
    /// window = expected samples / divisor
    #[serde(default = "defaults::window_divisor")]
    pub window_divisor: usize,

    /// overlap = window / divisor
    #[serde(default = "defaults::overlap_divisor")]
    pub overlap_divisor: usize,

    /// Fixed window length, overriding the divisor
    #[serde(default)]
    pub window_samples: Option<usize>,

    /// Fixed overlap, overriding the divisor
    #[serde(default)]
    pub overlap_samples: Option<usize>,
}

mod defaults {
    use super::*;

    pub fn window_divisor() -> usize { DEFAULT_WINDOW_DIVISOR }
    pub fn overlap_divisor() -> usize { DEFAULT_OVERLAP_DIVISOR }
}

impl Default for EnvelopeSettings {
    fn default() -> Self {
        Self {
            window_divisor: defaults::window_divisor(),
            overlap_divisor: defaults::overlap_divisor(),
            window_samples: None,
            overlap_samples: None,
        }
    }
}

impl EnvelopeSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.window_divisor == 0 {
            return Err("window_divisor must be greater than 0".to_string());
        }
        if self.overlap_divisor < 2 {
            return Err(format!(
                "overlap_divisor must be at least 2 so overlap stays below the window, got {}",
                self.overlap_divisor
            ));
        }
        if self.window_samples == Some(0) {
            return Err("window_samples must be greater than 0".to_string());
        }
        if let (Some(window), Some(overlap)) = (self.window_samples, self.overlap_samples) {
            if overlap >= window {
                return Err(format!(
                    "overlap_samples ({}) must be less than window_samples ({})",
                    overlap, window
                ));
            }
        }
        Ok(())
    }

    /// Window geometry for a session of `expected_samples`.
    ///
    /// `Ok(None)` when the window resolves to zero samples, which happens for
    /// sessions of unknown length without a fixed window. A fixed overlap that
    /// does not fit a derived window is clamped to `window - 1`.
    pub fn resolve(&self, expected_samples: usize) -> EmgResult<Option<EnvelopeConfig>> {
        let window = match self.window_samples {
            Some(window) => window,
            None => expected_samples / self.window_divisor.max(1),
        };
        if window == 0 {
            return Ok(None);
        }
        let overlap = match self.overlap_samples {
            Some(overlap) if overlap >= window && self.window_samples.is_none() => {
                warn!(overlap, window, "overlap does not fit the session window, clamping");
                window - 1
            }
            Some(overlap) => overlap,
            None => window / self.overlap_divisor.max(1),
        };
        EnvelopeConfig::new(window, overlap).map(Some)
    }
}

fn rms(slice: &[f64]) -> f64 {
    let sum_sq: f64 = slice.iter().map(|x| x * x).sum();
    (sum_sq / slice.len() as f64).sqrt()
}

/// Applies windows starting at `first`, returns the start of the first window
/// whose slice was clipped by the end of the series.
fn apply_windows(config: &EnvelopeConfig, series: &[f64], envelope: &mut [f64], first: usize) -> usize {
    let len = series.len();
    let stride = config.stride();
    let mut next_open = None;
    let mut k = first;

    while k + config.half_window() < len {
        let end = (k + config.window).min(len);
        let value = rms(&series[k..end]);
        envelope[k..end].fill(value);

        if end < k + config.window && next_open.is_none() {
            next_open = Some(k);
        }
        k += stride;
    }

    next_open.unwrap_or(k)
}

/// One-shot envelope computation
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeComputer {
    config: EnvelopeConfig,
}

impl EnvelopeComputer {
    pub fn new(config: EnvelopeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EnvelopeConfig {
        &self.config
    }

    /// Envelope over the whole series, same length as the input
    pub fn compute(&self, series: &[f64]) -> Vec<f64> {
        let mut envelope = vec![0.0; series.len()];
        apply_windows(&self.config, series, &mut envelope, 0);
        envelope
    }
}

/// Incremental envelope for one growing series
///
/// Windows whose slice is complete never change, so each update only
/// revisits windows from the first one that was clipped last time. The
/// result is identical to [`EnvelopeComputer::compute`] on the same series.
#[derive(Debug, Clone)]
pub struct EnvelopeTracker {
    config: EnvelopeConfig,
    envelope: Vec<f64>,
    next_window: usize,
}

impl EnvelopeTracker {
    pub fn new(config: EnvelopeConfig) -> Self {
        Self {
            config,
            envelope: Vec::new(),
            next_window: 0,
        }
    }

    pub fn config(&self) -> &EnvelopeConfig {
        &self.config
    }

    /// Bring the envelope up to date with `series`
    ///
    /// `series` must extend the previously seen one. A shorter series is
    /// treated as a new one.
    pub fn update(&mut self, series: &[f64]) -> &[f64] {
        if series.len() < self.envelope.len() {
            self.reset();
        }
        self.envelope.resize(series.len(), 0.0);
        self.next_window = apply_windows(&self.config, series, &mut self.envelope, self.next_window);
        &self.envelope
    }

    pub fn envelope(&self) -> &[f64] {
        &self.envelope
    }

    pub fn reset(&mut self) {
        self.envelope.clear();
        self.next_window = 0;
    }
}

/// Envelopes for every channel of a session
///
/// Without a window configuration the envelopes stay at zero.
#[derive(Debug, Clone)]
pub struct EnvelopeBank {
    trackers: Vec<EnvelopeTracker>,
    flat: Vec<Vec<f64>>,
    config: Option<EnvelopeConfig>,
}

impl EnvelopeBank {
    pub fn new(config: Option<EnvelopeConfig>, channels: usize) -> Self {
        let trackers = match config {
            Some(config) => (0..channels).map(|_| EnvelopeTracker::new(config)).collect(),
            None => Vec::new(),
        };
        Self {
            trackers,
            flat: vec![Vec::new(); if config.is_some() { 0 } else { channels }],
            config,
        }
    }

    pub fn config(&self) -> Option<EnvelopeConfig> {
        self.config
    }

    pub fn channel_count(&self) -> usize {
        self.trackers.len() + self.flat.len()
    }

    /// Update every channel, in parallel across channels
    pub fn update(&mut self, channels: &[&[f64]]) {
        if self.config.is_none() {
            for (envelope, series) in self.flat.iter_mut().zip(channels) {
                envelope.resize(series.len(), 0.0);
            }
            return;
        }

        self.trackers
            .par_iter_mut()
            .zip(channels.par_iter())
            .for_each(|(tracker, series)| {
                tracker.update(series);
            });
    }

    /// Current envelope of `channel`
    pub fn envelope(&self, channel: usize) -> Option<&[f64]> {
        match self.config {
            Some(_) => self.trackers.get(channel).map(EnvelopeTracker::envelope),
            None => self.flat.get(channel).map(Vec::as_slice),
        }
    }
}
