// src/protocol/assembler.rs
//! Reassembles frames from short, timeout-bounded reads
//!
//! The serial source hands over whatever arrived within its timeout, which
//! may be zero bytes, half a frame or many frames. The assembler buffers the
//! remainder between reads and yields one verdict per 13-byte window.

use crate::config::constants::protocol::FRAME_LEN;
use crate::protocol::{Frame, FrameFault, ValidFrame};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// What to do with the byte cursor after an invalid frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "policy", rename_all = "lowercase")]
pub enum ResyncPolicy {
    /// Always drop exactly one frame length. Matches the device firmware's
    /// framing assumptions, but a lost byte desynchronizes the rest of the
    /// session.
    #[default]
    Fixed,
    /// After `after` consecutive invalid frames, advance one byte at a time
    /// until a valid frame is found again.
    Slide {
        /// Consecutive invalid frames tolerated before scanning
        after: u32,
    },
}

/// One verdict produced by the assembler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEvent {
    /// Markers and checksum verified
    Valid(ValidFrame),
    /// Rejected frame, with the first check it failed
    Invalid(FrameFault),
}

/// Byte and frame counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssemblerStats {
    /// Bytes pushed into the assembler
    pub bytes_received: u64,
    /// Frames that passed validation
    pub frames_valid: u64,
    /// Frames rejected by marker or checksum checks
    pub frames_invalid: u64,
    /// Bytes dropped one at a time while rescanning
    pub bytes_skipped: u64,
}

/// Frame reassembly buffer
#[derive(Debug, Clone)]
pub struct FrameAssembler {
    pending: Vec<u8>,
    cursor: usize,
    policy: ResyncPolicy,
    consecutive_invalid: u32,
    searching: bool,
    stats: AssemblerStats,
}

impl FrameAssembler {
    pub fn new(policy: ResyncPolicy) -> Self {
        Self {
            pending: Vec::with_capacity(FRAME_LEN * 64),
            cursor: 0,
            policy,
            consecutive_invalid: 0,
            searching: false,
            stats: AssemblerStats::default(),
        }
    }

    /// Append freshly read bytes
    pub fn push(&mut self, bytes: &[u8]) {
        if self.cursor > 0 {
            self.pending.drain(..self.cursor);
            self.cursor = 0;
        }
        self.pending.extend_from_slice(bytes);
        self.stats.bytes_received += bytes.len() as u64;
    }

    /// Next verdict, or `None` until at least one more frame's worth of bytes arrives
    pub fn next_event(&mut self) -> Option<FrameEvent> {
        loop {
            let window = self.pending.get(self.cursor..self.cursor + FRAME_LEN)?;
            let frame = Frame::from_slice(window)?;

            match frame.validate() {
                Ok(valid) => {
                    if self.searching {
                        debug!(
                            skipped = self.stats.bytes_skipped,
                            "frame alignment recovered"
                        );
                    }
                    self.cursor += FRAME_LEN;
                    self.consecutive_invalid = 0;
                    self.searching = false;
                    self.stats.frames_valid += 1;
                    return Some(FrameEvent::Valid(valid));
                }
                Err(_) if self.searching => {
                    self.cursor += 1;
                    self.stats.bytes_skipped += 1;
                }
                Err(fault) => {
                    self.consecutive_invalid = self.consecutive_invalid.saturating_add(1);
                    self.stats.frames_invalid += 1;
                    trace!(%fault, "discarding frame");

                    match self.policy {
                        ResyncPolicy::Slide { after } if self.consecutive_invalid >= after => {
                            debug!(
                                consecutive = self.consecutive_invalid,
                                "scanning for frame alignment"
                            );
                            self.searching = true;
                            self.cursor += 1;
                            self.stats.bytes_skipped += 1;
                        }
                        _ => self.cursor += FRAME_LEN,
                    }
                    return Some(FrameEvent::Invalid(fault));
                }
            }
        }
    }

    /// Bytes buffered but not yet consumed
    pub fn pending_len(&self) -> usize {
        self.pending.len() - self.cursor
    }

    pub fn policy(&self) -> ResyncPolicy {
        self.policy
    }

    pub fn stats(&self) -> AssemblerStats {
        self.stats
    }

    /// Drop buffered bytes and alignment state; counters are kept
    pub fn clear(&mut self) {
        self.pending.clear();
        self.cursor = 0;
        self.consecutive_invalid = 0;
        self.searching = false;
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new(ResyncPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(count: u8) -> Vec<u8> {
        (0..count)
            .flat_map(|i| Frame::encode([0, 0, i, 0, 0, 0, i, 0]).as_bytes().to_vec())
            .collect()
    }

    fn drain(assembler: &mut FrameAssembler) -> (usize, usize) {
        let mut valid = 0;
        let mut invalid = 0;
        while let Some(event) = assembler.next_event() {
            match event {
                FrameEvent::Valid(_) => valid += 1,
                FrameEvent::Invalid(_) => invalid += 1,
            }
        }
        (valid, invalid)
    }

    #[test]
    fn test_short_reads_are_buffered() {
        let stream = frames(4);
        let mut assembler = FrameAssembler::default();

        assembler.push(&stream[..7]);
        assert!(assembler.next_event().is_none());
        assert_eq!(assembler.pending_len(), 7);

        assembler.push(&stream[7..20]);
        assert!(matches!(assembler.next_event(), Some(FrameEvent::Valid(_))));
        assert!(assembler.next_event().is_none());
        assert_eq!(assembler.pending_len(), 7);

        assembler.push(&stream[20..]);
        assert_eq!(drain(&mut assembler), (3, 0));
        assert_eq!(assembler.pending_len(), 0);
        assert_eq!(assembler.stats().bytes_received, stream.len() as u64);
    }

    #[test]
    fn test_byte_at_a_time_delivery() {
        let stream = frames(5);
        let mut assembler = FrameAssembler::default();
        let mut valid = 0;
        for byte in &stream {
            assembler.push(std::slice::from_ref(byte));
            valid += drain(&mut assembler).0;
        }
        assert_eq!(valid, 5);
    }

    #[test]
    fn test_fixed_policy_drops_whole_frame() {
        let mut stream = frames(3);
        stream[13 + 10] ^= 0xFF; // corrupt checksum of the second frame

        let mut assembler = FrameAssembler::new(ResyncPolicy::Fixed);
        assembler.push(&stream);
        assert_eq!(drain(&mut assembler), (2, 1));
        assert_eq!(assembler.stats().frames_invalid, 1);
    }

    #[test]
    fn test_fixed_policy_never_recovers_from_misalignment() {
        let mut stream = vec![0x00];
        stream.extend(frames(6));

        let mut assembler = FrameAssembler::new(ResyncPolicy::Fixed);
        assembler.push(&stream);
        let (valid, invalid) = drain(&mut assembler);
        assert_eq!(valid, 0);
        assert_eq!(invalid, 6);
    }

    #[test]
    fn test_slide_policy_recovers_alignment() {
        let mut stream = vec![0x00, 0x3C, 0x3C];
        stream.extend(frames(6));

        let mut assembler = FrameAssembler::new(ResyncPolicy::Slide { after: 1 });
        assembler.push(&stream);
        let (valid, invalid) = drain(&mut assembler);
        assert_eq!(valid, 6);
        assert_eq!(invalid, 1);
        assert_eq!(assembler.stats().bytes_skipped, 3);
    }

    #[test]
    fn test_slide_policy_tolerates_isolated_corruption() {
        let mut stream = frames(4);
        stream[13 + 10] ^= 0xFF;

        let mut assembler = FrameAssembler::new(ResyncPolicy::Slide { after: 2 });
        assembler.push(&stream);
        assert_eq!(drain(&mut assembler), (3, 1));
        assert_eq!(assembler.stats().bytes_skipped, 0);
    }

    #[test]
    fn test_clear_resets_buffer() {
        let stream = frames(2);
        let mut assembler = FrameAssembler::default();
        assembler.push(&stream[..5]);
        assembler.clear();
        assert_eq!(assembler.pending_len(), 0);
        assembler.push(&stream);
        assert_eq!(drain(&mut assembler), (2, 0));
    }
}
