// src/acquisition/stream_buffer.rs
//! Bounded per-channel sample storage

use crate::protocol::{DecodedSample, MAX_CHANNELS};
use std::sync::Arc;

/// Result of offering a sample to the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Accepted,
    /// The expected count was already reached; nothing was stored
    Full,
}

/// Append-only channel series, capped at the session's expected count
///
/// A capacity of zero means the session length is unknown and the buffer
/// grows without bound.
#[derive(Debug, Clone)]
pub struct StreamBuffer {
    channels: Vec<Vec<f64>>,
    counters: Vec<u8>,
    capacity: usize,
}

/// Immutable copy of the buffer contents
#[derive(Debug, Clone, PartialEq)]
pub struct BufferSnapshot {
    pub channels: Vec<Arc<[f64]>>,
    pub counters: Arc<[u8]>,
}

impl BufferSnapshot {
    pub fn len(&self) -> usize {
        self.channels.first().map_or(0, |c| c.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StreamBuffer {
    pub fn new(channel_count: usize, capacity: usize) -> Self {
        let channel_count = channel_count.clamp(1, MAX_CHANNELS);
        Self {
            channels: (0..channel_count)
                .map(|_| Vec::with_capacity(capacity))
                .collect(),
            counters: Vec::new(),
            capacity,
        }
    }

    /// Store one decoded sample; channels beyond the buffer's count are ignored
    pub fn append(&mut self, sample: &DecodedSample) -> AppendOutcome {
        if self.is_full() {
            return AppendOutcome::Full;
        }

        for (index, series) in self.channels.iter_mut().enumerate() {
            series.push(sample.channel(index).unwrap_or(0.0));
        }
        if let Some(counter) = sample.counter() {
            self.counters.push(counter);
        }
        AppendOutcome::Accepted
    }

    /// Samples per channel
    pub fn len(&self) -> usize {
        self.channels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Expected sample count; zero when unbounded
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_bounded(&self) -> bool {
        self.capacity > 0
    }

    pub fn is_full(&self) -> bool {
        self.is_bounded() && self.len() >= self.capacity
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel(&self, index: usize) -> Option<&[f64]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    /// Every channel's series, in channel order
    pub fn channels(&self) -> Vec<&[f64]> {
        self.channels.iter().map(Vec::as_slice).collect()
    }

    /// TEST-mode counter bytes, one per stored sample
    pub fn counters(&self) -> &[u8] {
        &self.counters
    }

    pub fn snapshot(&self) -> BufferSnapshot {
        BufferSnapshot {
            channels: self.channels.iter().map(|c| Arc::from(c.as_slice())).collect(),
            counters: Arc::from(self.counters.as_slice()),
        }
    }
}
