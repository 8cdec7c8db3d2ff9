// src/protocol/magic.rs
//! Session sizing from the device's first NORMAL-mode frame
//!
//! When replaying a stored recording the device opens the stream with a
//! fixed payload that identifies it. The table maps those payloads to the
//! recording length; unknown payloads yield no entry and the session runs
//! with unknown bounds.

use crate::config::constants::protocol::PAYLOAD_LEN;
use crate::config::constants::session_magic::*;
use serde::{Deserialize, Serialize};

/// One known recording
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMagic {
    /// Human-readable recording name
    pub label: String,
    /// First-frame payload announcing the recording
    pub payload: [u8; PAYLOAD_LEN],
    /// Recording length in seconds
    pub duration_s: u32,
}

impl SessionMagic {
    pub fn new(label: impl Into<String>, payload: [u8; PAYLOAD_LEN], duration_s: u32) -> Self {
        Self {
            label: label.into(),
            payload,
            duration_s,
        }
    }
}

/// Lookup table keyed by first-frame payload
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionMagicTable {
    entries: Vec<SessionMagic>,
}

impl SessionMagicTable {
    /// Empty table: every session is of unknown length
    pub fn empty() -> Self {
        Self::default()
    }

    /// Table holding `entries`; on duplicate payloads the first entry wins
    pub fn new(entries: Vec<SessionMagic>) -> Self {
        Self { entries }
    }

    /// The device's three stored recordings
    pub fn builtin() -> Self {
        Self::new(builtin_entries())
    }

    /// Find the recording announced by `payload`
    pub fn lookup(&self, payload: &[u8; PAYLOAD_LEN]) -> Option<&SessionMagic> {
        self.entries.iter().find(|entry| &entry.payload == payload)
    }

    pub fn insert(&mut self, entry: SessionMagic) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[SessionMagic] {
        &self.entries
    }
}

/// Built-in table contents, also used as the configuration default
pub fn builtin_entries() -> Vec<SessionMagic> {
    vec![
        SessionMagic::new("EMG DATA 1d", DATA_1D_PAYLOAD, DATA_1D_DURATION_S),
        SessionMagic::new("EMG DATA 2d", DATA_2D_PAYLOAD, DATA_2D_DURATION_S),
        SessionMagic::new("EMG DATA 3d", DATA_3D_PAYLOAD, DATA_3D_DURATION_S),
    ]
}
