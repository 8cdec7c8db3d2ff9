// src/hal/device_link.rs
//! Command handshake with the acquisition device
//!
//! Commands are ASCII `<<NAME>>` or `<<NAME:VALUE>>` lines, each answered by
//! the 6-byte `<<OK>>`. A failed command is reported, never retried. Once
//! acquisition has started the same link serves as the session's byte source.

use crate::config::constants::protocol::{ACK_LEN, ACK_OK, COMMAND_TERMINATOR};
use crate::config::constants::serial::{STOP_DRAIN_LIMIT_BYTES, STOP_SETTLE_MS};
use crate::hal::traits::{is_timeout, map_read_result};
use crate::hal::{AcquisitionMode, ByteSource, SourceError};
use std::fmt;
use std::io::{self, Read, Write};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Device commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Power both amplifier channels
    ChannelsOn,
    ChannelsOff,
    SampleRate(u32),
    TestMode,
    NormalMode,
    Start,
    Stop,
}

impl Command {
    /// Bytes written to the link, terminator included
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = format!("<<{}>>", self).into_bytes();
        bytes.push(COMMAND_TERMINATOR);
        bytes
    }

    /// Mode-selection command for `mode`
    pub fn for_mode(mode: AcquisitionMode) -> Self {
        match mode {
            AcquisitionMode::Test => Command::TestMode,
            AcquisitionMode::Normal => Command::NormalMode,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::ChannelsOn => write!(f, "CHs:ON"),
            Command::ChannelsOff => write!(f, "CHs:OFF"),
            Command::SampleRate(hz) => write!(f, "F:{}", hz),
            Command::TestMode => write!(f, "TEST"),
            Command::NormalMode => write!(f, "NORMAL"),
            Command::Start => write!(f, "START"),
            Command::Stop => write!(f, "STOP"),
        }
    }
}

/// Handshake failures
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The device answered something other than `<<OK>>`
    #[error("device rejected {command}: answered {response:?}")]
    Rejected {
        command: Command,
        response: String,
    },

    /// Nothing came back within the link timeout
    #[error("no acknowledgement for {command}")]
    NoResponse { command: Command },

    /// The stop acknowledgement never appeared in the drained input
    #[error("stop not acknowledged after draining {drained} bytes")]
    StopNotAcknowledged { drained: usize },

    #[error("link I/O failure: {0}")]
    Io(#[from] io::Error),
}

/// Port operations beyond plain read/write
pub trait LinkPort: Read + Write {
    /// Discard bytes queued for transmission. No-op where unsupported.
    fn discard_output(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Command/response link to the device
pub struct DeviceLink<T> {
    port: T,
    settle: Duration,
    drain_limit: usize,
}

impl<T: LinkPort> DeviceLink<T> {
    pub fn new(port: T) -> Self {
        Self {
            port,
            settle: Duration::from_millis(STOP_SETTLE_MS),
            drain_limit: STOP_DRAIN_LIMIT_BYTES,
        }
    }

    /// Override the pause between `<<STOP>>` and draining
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Override the stop drain budget
    pub fn with_drain_limit(mut self, limit: usize) -> Self {
        self.drain_limit = limit;
        self
    }

    /// Send one command and require `<<OK>>`
    pub fn command(&mut self, command: Command) -> Result<(), HandshakeError> {
        debug!(%command, "sending command");
        self.port.write_all(&command.encode())?;
        self.port.flush()?;

        let mut response = [0u8; ACK_LEN];
        let received = self.read_response(&mut response)?;
        if received == 0 {
            return Err(HandshakeError::NoResponse { command });
        }
        if &response[..received] != ACK_OK.as_slice() {
            return Err(HandshakeError::Rejected {
                command,
                response: String::from_utf8_lossy(&response[..received]).into_owned(),
            });
        }

        info!(%command, "device acknowledged");
        Ok(())
    }

    /// Power on, set the rate, select the mode and start streaming
    pub fn begin(&mut self, mode: AcquisitionMode, sample_rate_hz: u32) -> Result<(), HandshakeError> {
        self.command(Command::ChannelsOn)?;
        self.start_streaming(mode, sample_rate_hz)
    }

    /// Run `acquire` between the start handshake and the stop/power-off teardown.
    ///
    /// Once `<<CHs:ON>>` is acknowledged the teardown always runs, whether the
    /// rest of the handshake or `acquire` failed. A failed stop is only logged;
    /// a failed power-off is returned when nothing failed before it.
    pub fn with_acquisition<R, E, F>(
        &mut self,
        mode: AcquisitionMode,
        sample_rate_hz: u32,
        acquire: F,
    ) -> Result<R, E>
    where
        E: From<HandshakeError>,
        F: FnOnce(&mut Self) -> Result<R, E>,
    {
        self.command(Command::ChannelsOn)?;

        let result = match self.start_streaming(mode, sample_rate_hz) {
            Ok(()) => acquire(self),
            Err(e) => Err(e.into()),
        };

        if let Err(e) = self.stop() {
            warn!(error = %e, "device did not confirm stop");
        }
        match self.power_off() {
            Ok(()) => result,
            Err(e) => {
                error!(error = %e, "device did not confirm power off");
                result.and(Err(e.into()))
            }
        }
    }

    /// Stop streaming and discard in-flight frames until the device acknowledges
    pub fn stop(&mut self) -> Result<(), HandshakeError> {
        debug!(command = %Command::Stop, "sending command");
        self.port.write_all(&Command::Stop.encode())?;
        self.port.flush()?;
        self.port.discard_output()?;
        if !self.settle.is_zero() {
            std::thread::sleep(self.settle);
        }

        let mut window: Vec<u8> = Vec::with_capacity(ACK_LEN + 1);
        let mut chunk = [0u8; 64];
        let mut drained = 0usize;

        while drained < self.drain_limit {
            let n = match self.port.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if is_timeout(&e) => break,
                Err(e) => return Err(e.into()),
            };
            drained += n;

            for &byte in &chunk[..n] {
                window.push(byte);
                if window.len() > ACK_LEN {
                    window.remove(0);
                }
                if window.as_slice() == ACK_OK.as_slice() {
                    info!(drained, "acquisition stopped");
                    return Ok(());
                }
            }
        }

        warn!(drained, "stop acknowledgement not found");
        Err(HandshakeError::StopNotAcknowledged { drained })
    }

    /// Power the amplifiers down
    pub fn power_off(&mut self) -> Result<(), HandshakeError> {
        self.command(Command::ChannelsOff)
    }

    fn start_streaming(&mut self, mode: AcquisitionMode, sample_rate_hz: u32) -> Result<(), HandshakeError> {
        self.command(Command::SampleRate(sample_rate_hz))?;
        self.command(Command::for_mode(mode))?;
        self.command(Command::Start)
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.port
    }

    pub fn into_inner(self) -> T {
        self.port
    }

    fn read_response(&mut self, buf: &mut [u8]) -> Result<usize, HandshakeError> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.port.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if is_timeout(&e) => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }
}

impl<T: LinkPort> ByteSource for DeviceLink<T> {
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize, SourceError> {
        map_read_result(self.port.read(buf), buf.len())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Cursor;

    /// In-memory port: scripted device output, captured host writes
    pub(crate) struct ScriptedPort {
        pub input: Cursor<Vec<u8>>,
        pub written: Vec<u8>,
    }

    impl ScriptedPort {
        pub fn new(input: &[u8]) -> Self {
            Self {
                input: Cursor::new(input.to_vec()),
                written: Vec::new(),
            }
        }
    }

    impl Read for ScriptedPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for ScriptedPort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LinkPort for ScriptedPort {}

    fn link(input: &[u8]) -> DeviceLink<ScriptedPort> {
        DeviceLink::new(ScriptedPort::new(input)).with_settle(Duration::ZERO)
    }

    #[test]
    fn test_command_encoding() {
        assert_eq!(Command::ChannelsOn.encode(), b"<<CHs:ON>>\n");
        assert_eq!(Command::SampleRate(500).encode(), b"<<F:500>>\n");
        assert_eq!(Command::for_mode(AcquisitionMode::Test).encode(), b"<<TEST>>\n");
        assert_eq!(Command::Stop.encode(), b"<<STOP>>\n");
    }

    #[test]
    fn test_begin_sequence() {
        let mut link = link(b"<<OK>><<OK>><<OK>><<OK>>");
        link.begin(AcquisitionMode::Normal, 500).unwrap();
        assert_eq!(
            link.get_mut().written,
            b"<<CHs:ON>>\n<<F:500>>\n<<NORMAL>>\n<<START>>\n"
        );
    }

    #[test]
    fn test_teardown_after_rejected_handshake() {
        let mut link = link(b"<<OK>><<NO>><<OK>><<OK>>");
        let result: Result<(), HandshakeError> =
            link.with_acquisition(AcquisitionMode::Test, 500, |_| panic!("acquired after rejection"));

        assert!(matches!(result, Err(HandshakeError::Rejected { .. })));
        assert_eq!(
            link.get_mut().written,
            b"<<CHs:ON>>\n<<F:500>>\n<<STOP>>\n<<CHs:OFF>>\n"
        );
    }

    #[test]
    fn test_teardown_after_failed_acquisition() {
        let mut link = link(b"<<OK>><<OK>><<OK>><<OK>><<OK>><<OK>>");
        let result: Result<(), HandshakeError> = link.with_acquisition(AcquisitionMode::Normal, 500, |_| {
            Err(HandshakeError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged")))
        });

        assert!(matches!(result, Err(HandshakeError::Io(_))));
        assert!(link.get_mut().written.ends_with(b"<<START>>\n<<STOP>>\n<<CHs:OFF>>\n"));
    }

    /// Start acknowledgements, in-flight frames ending in the stop ack, then the power-off ack
    fn full_session_script() -> Vec<u8> {
        let mut input = b"<<OK>><<OK>><<OK>><<OK>>".to_vec();
        // the stop drain reads 64-byte chunks
        input.extend_from_slice(&[0u8; 58]);
        input.extend_from_slice(b"<<OK>><<OK>>");
        input
    }

    #[test]
    fn test_acquisition_result_returned() {
        let mut link = link(&full_session_script());
        let samples: Result<usize, HandshakeError> =
            link.with_acquisition(AcquisitionMode::Test, 250, |_| Ok(42));

        assert_eq!(samples.unwrap(), 42);
        assert_eq!(
            link.get_mut().written,
            b"<<CHs:ON>>\n<<F:250>>\n<<TEST>>\n<<START>>\n<<STOP>>\n<<CHs:OFF>>\n"
        );
    }

    #[test]
    fn test_power_off_failure_surfaces_after_success() {
        let mut script = full_session_script();
        script.truncate(script.len() - 6);
        let mut link = link(&script);
        let result: Result<(), HandshakeError> =
            link.with_acquisition(AcquisitionMode::Test, 250, |_| Ok(()));

        assert!(matches!(
            result,
            Err(HandshakeError::NoResponse { command: Command::ChannelsOff })
        ));
    }

    #[test]
    fn test_no_teardown_without_power_on() {
        let mut link = link(b"");
        let result: Result<(), HandshakeError> =
            link.with_acquisition(AcquisitionMode::Test, 500, |_| Ok(()));

        assert!(matches!(result, Err(HandshakeError::NoResponse { .. })));
        assert_eq!(link.get_mut().written, b"<<CHs:ON>>\n");
    }

    #[test]
    fn test_rejected_command() {
        let mut link = link(b"<<NO>>");
        let error = link.command(Command::Start).unwrap_err();
        match error {
            HandshakeError::Rejected { command, response } => {
                assert_eq!(command, Command::Start);
                assert_eq!(response, "<<NO>>");
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_silent_device() {
        let mut link = link(b"");
        assert!(matches!(
            link.command(Command::ChannelsOn),
            Err(HandshakeError::NoResponse { .. })
        ));
    }

    #[test]
    fn test_stop_drains_until_ack() {
        let mut input = Vec::new();
        for _ in 0..10 {
            input.extend_from_slice(b"<<\x00\x00\x10\x00\x00\x00\x00\x01\x11>>");
        }
        input.extend_from_slice(b"<<OK>>");
        let mut link = link(&input);

        link.stop().unwrap();
        assert_eq!(link.get_mut().written, b"<<STOP>>\n");
    }

    #[test]
    fn test_stop_without_ack() {
        let mut link = link(&[0u8; 40]).with_drain_limit(16);
        assert!(matches!(
            link.stop(),
            Err(HandshakeError::StopNotAcknowledged { .. })
        ));
    }

    #[test]
    fn test_link_as_byte_source() {
        let mut link = link(&[1, 2, 3]);
        let mut buf = [0u8; 13];
        assert_eq!(link.read_bytes(&mut buf).unwrap(), 3);
        assert!(matches!(link.read_bytes(&mut buf), Err(SourceError::Closed)));
    }
}
