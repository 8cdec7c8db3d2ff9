// src/protocol/frame.rs
//! Frame recognition and authentication
//!
//! A frame is 13 bytes: `<<`, an 8-byte payload, an XOR checksum of the
//! payload, then `>>`. Validation is pure and never consumes input; the
//! caller decides how many bytes to drop after a verdict.

use crate::config::constants::protocol::{
    CHECKSUM_INDEX, END_BYTE, FRAME_LEN, PAYLOAD_END, PAYLOAD_LEN, PAYLOAD_START, START_BYTE,
};
use thiserror::Error;

/// Why a 13-byte window was rejected
///
/// Kept `Copy` and allocation-free: rejection happens at line rate and is
/// only ever counted or logged.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FrameFault {
    /// Input was not exactly one frame long
    #[error("frame must be {FRAME_LEN} bytes, got {actual}")]
    Length {
        /// Number of bytes supplied
        actual: usize,
    },
    /// Bytes 0-1 are not `<<`
    #[error("missing `<<` start marker")]
    StartMarker,
    /// Bytes 11-12 are not `>>`
    #[error("missing `>>` end marker")]
    EndMarker,
    /// XOR of the payload does not match byte 10
    #[error("checksum mismatch: computed 0x{expected:02X}, frame carries 0x{actual:02X}")]
    Checksum {
        /// Checksum computed from the payload
        expected: u8,
        /// Checksum byte found in the frame
        actual: u8,
    },
}

/// Outcome of checking one candidate frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameVerdict {
    /// Markers and checksum all match
    Valid,
    /// Discard the frame
    Invalid(FrameFault),
}

impl FrameVerdict {
    /// True for [`FrameVerdict::Valid`]
    pub fn is_valid(self) -> bool {
        matches!(self, FrameVerdict::Valid)
    }
}

/// XOR of all bytes
pub fn xor_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &byte| acc ^ byte)
}

/// Check an arbitrary byte slice against the frame layout
pub fn check(bytes: &[u8]) -> FrameVerdict {
    match <&[u8; FRAME_LEN]>::try_from(bytes) {
        Ok(raw) => match verify(raw) {
            Ok(()) => FrameVerdict::Valid,
            Err(fault) => FrameVerdict::Invalid(fault),
        },
        Err(_) => FrameVerdict::Invalid(FrameFault::Length {
            actual: bytes.len(),
        }),
    }
}

fn verify(raw: &[u8; FRAME_LEN]) -> Result<(), FrameFault> {
    if raw[0] != START_BYTE || raw[1] != START_BYTE {
        return Err(FrameFault::StartMarker);
    }
    if raw[FRAME_LEN - 2] != END_BYTE || raw[FRAME_LEN - 1] != END_BYTE {
        return Err(FrameFault::EndMarker);
    }

    let computed = xor_checksum(&raw[PAYLOAD_START..PAYLOAD_END]);
    let carried = raw[CHECKSUM_INDEX];
    if computed != carried {
        return Err(FrameFault::Checksum {
            expected: computed,
            actual: carried,
        });
    }

    Ok(())
}

/// One unauthenticated 13-byte frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Frame([u8; FRAME_LEN]);

impl Frame {
    /// Wrap raw bytes without checking them
    pub const fn from_bytes(bytes: [u8; FRAME_LEN]) -> Self {
        Self(bytes)
    }

    /// Copy a frame out of a slice; `None` unless the slice is exactly 13 bytes
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; FRAME_LEN]>::try_from(bytes).ok().map(Self)
    }

    /// Build a well-formed frame around `payload`
    pub fn encode(payload: [u8; PAYLOAD_LEN]) -> Self {
        let mut bytes = [0u8; FRAME_LEN];
        bytes[0] = START_BYTE;
        bytes[1] = START_BYTE;
        bytes[PAYLOAD_START..PAYLOAD_END].copy_from_slice(&payload);
        bytes[CHECKSUM_INDEX] = xor_checksum(&payload);
        bytes[FRAME_LEN - 2] = END_BYTE;
        bytes[FRAME_LEN - 1] = END_BYTE;
        Self(bytes)
    }

    /// Raw frame bytes
    pub fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.0
    }

    /// The 8 payload bytes (frame bytes 2..=9)
    pub fn payload(&self) -> [u8; PAYLOAD_LEN] {
        let mut payload = [0u8; PAYLOAD_LEN];
        payload.copy_from_slice(&self.0[PAYLOAD_START..PAYLOAD_END]);
        payload
    }

    /// Verdict without consuming the frame
    pub fn verdict(&self) -> FrameVerdict {
        match verify(&self.0) {
            Ok(()) => FrameVerdict::Valid,
            Err(fault) => FrameVerdict::Invalid(fault),
        }
    }

    /// Authenticate the frame
    pub fn validate(self) -> Result<ValidFrame, FrameFault> {
        verify(&self.0).map(|()| ValidFrame(self))
    }
}

/// A frame whose markers and checksum have been verified
///
/// Only obtainable through [`Frame::validate`], so decoding never sees
/// unauthenticated bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValidFrame(Frame);

impl ValidFrame {
    /// The 8 payload bytes
    pub fn payload(&self) -> [u8; PAYLOAD_LEN] {
        self.0.payload()
    }

    /// Underlying frame
    pub fn frame(&self) -> &Frame {
        &self.0
    }
}
