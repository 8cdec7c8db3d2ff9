// src/config/constants.rs
//! System-wide configuration constants

/// Wire protocol constants
pub mod protocol {
    /// Total frame length in bytes
    pub const FRAME_LEN: usize = 13;
    /// Payload length in bytes
    pub const PAYLOAD_LEN: usize = 8;
    /// ASCII `<`
    pub const START_BYTE: u8 = 0x3C;
    /// ASCII `>`
    pub const END_BYTE: u8 = 0x3E;
    pub const PAYLOAD_START: usize = 2;
    pub const PAYLOAD_END: usize = PAYLOAD_START + PAYLOAD_LEN;
    pub const CHECKSUM_INDEX: usize = 10;

    /// Payload offset of the TEST-mode counter byte
    pub const COUNTER_OFFSET: usize = 6;
    pub const CHANNEL1_OFFSET: usize = 0;
    pub const CHANNEL2_OFFSET: usize = 3;
    pub const BYTES_PER_CODE: usize = 3;

    pub const ACK_LEN: usize = 6;
    /// Device acknowledgement for every accepted command
    pub const ACK_OK: &[u8; ACK_LEN] = b"<<OK>>";
    pub const COMMAND_TERMINATOR: u8 = b'\n';
}

/// ADC and analog front-end calibration constants
pub mod calibration {
    pub const DEFAULT_REFERENCE_VOLTAGE_V: f64 = 4.5;
    pub const DEFAULT_AMPLIFIER_GAIN: f64 = 24.0;

    /// 2^23, first code that folds into the negative range
    pub const CODE_SIGN_THRESHOLD: i32 = 8_388_608;
    /// 2^24
    pub const CODE_SPAN: i32 = 16_777_216;
    /// 2^23 - 1, full-scale positive code
    pub const CODE_FULL_SCALE: f64 = 8_388_607.0;
    pub const MICROVOLTS_PER_VOLT: f64 = 1_000_000.0;
    pub const MICROVOLTS_PER_MILLIVOLT: f64 = 1_000.0;
}

/// Acquisition session constants
pub mod acquisition {
    pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 500;
    pub const MIN_SAMPLE_RATE_HZ: u32 = 1;
    pub const MAX_SAMPLE_RATE_HZ: u32 = 16_000;
    /// Recording length used in TEST mode, where the device reports none
    pub const DEFAULT_TEST_DURATION_S: u32 = 10;
    pub const DEFAULT_READ_CHUNK_BYTES: usize = 4096;
}

/// Envelope sizing constants
pub mod envelope {
    /// window = expected samples / divisor
    pub const DEFAULT_WINDOW_DIVISOR: usize = 150;
    /// overlap = window / divisor
    pub const DEFAULT_OVERLAP_DIVISOR: usize = 2;
}

/// Serial link constants
pub mod serial {
    pub const DEFAULT_PORT_NAME: &str = "/dev/ttyUSB0";
    pub const DEFAULT_BAUD_RATE: u32 = 921_600;
    pub const DEFAULT_TIMEOUT_MS: u64 = 1000;
    pub const MAX_TIMEOUT_MS: u64 = 60_000;
    /// Pause between `<<STOP>>` and draining the input
    pub const STOP_SETTLE_MS: u64 = 100;
    /// Upper bound on bytes discarded while waiting for the stop acknowledgement
    pub const STOP_DRAIN_LIMIT_BYTES: usize = 1 << 20;
}

/// Known first-frame payloads of the device's stored recordings
pub mod session_magic {
    pub const DATA_1D_PAYLOAD: [u8; 8] = [0x00, 0x00, 0x11, 0x00, 0x00, 0x00, 0x01, 0x5A];
    pub const DATA_1D_DURATION_S: u32 = 90;
    pub const DATA_2D_PAYLOAD: [u8; 8] = [0x00, 0x00, 0x25, 0x00, 0x00, 0x00, 0x01, 0x59];
    pub const DATA_2D_DURATION_S: u32 = 33;
    pub const DATA_3D_PAYLOAD: [u8; 8] = [0x00, 0x00, 0x0F, 0x00, 0x00, 0x00, 0x01, 0x56];
    pub const DATA_3D_DURATION_S: u32 = 15;
}

/// Configuration file locations
pub mod paths {
    pub const DEFAULT_CONFIG_FILE: &str = "config/default.toml";
    pub const LOCAL_CONFIG_FILE: &str = "config/local.toml";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_layout_constants() {
        assert_eq!(protocol::PAYLOAD_END, protocol::CHECKSUM_INDEX);
        assert_eq!(protocol::CHECKSUM_INDEX + 3, protocol::FRAME_LEN);
        assert!(protocol::COUNTER_OFFSET < protocol::PAYLOAD_LEN);
    }

    #[test]
    fn test_code_constants() {
        assert_eq!(calibration::CODE_SIGN_THRESHOLD, 1 << 23);
        assert_eq!(calibration::CODE_SPAN, 1 << 24);
        assert_eq!(calibration::CODE_FULL_SCALE, ((1 << 23) - 1) as f64);
    }
}
