// src/acquisition/session.rs
//! Acquisition session state machine
//!
//! Drives bytes from a [`ByteSource`] through frame reassembly, validation,
//! decoding and buffering, refreshes the envelopes at a coarse cadence and
//! reports progress to a [`Renderer`].
//!
//! ```text
//! Idle -> AwaitingFirstFrame -> Streaming -> Completed(..)
//! ```

use crate::acquisition::render::Renderer;
use crate::acquisition::stream_buffer::{AppendOutcome, BufferSnapshot, StreamBuffer};
use crate::config::{AcquisitionSettings, SystemConfig};
use crate::error::{EmgError, EmgResult};
use crate::hal::{AcquisitionMode, ByteSource, SessionDescriptor, SourceError};
use crate::processing::{EnvelopeBank, EnvelopeSettings};
use crate::protocol::{
    FrameAssembler, FrameEvent, SampleDecoder, SessionMagicTable, ValidFrame,
};
use crate::utils::{time_axis, SystemTimeProvider, TimeProvider};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, trace, warn};

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The buffer holds the expected number of samples
    ExpectedCountReached,
    /// A [`StopHandle`] fired
    Stopped,
    /// The byte source reached end of stream
    SourceClosed,
    /// The byte source failed
    Aborted(String),
}

impl fmt::Display for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Completion::ExpectedCountReached => write!(f, "expected sample count reached"),
            Completion::Stopped => write!(f, "stopped"),
            Completion::SourceClosed => write!(f, "source closed"),
            Completion::Aborted(reason) => write!(f, "aborted: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingFirstFrame,
    Streaming,
    /// Terminal
    Completed(Completion),
}

impl SessionState {
    pub fn is_completed(&self) -> bool {
        matches!(self, SessionState::Completed(_))
    }
}

/// When to recompute envelopes and notify the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshCadence {
    /// After this many newly stored samples
    EverySamples(usize),
    /// After this much wall-clock time, if new samples arrived
    Every(Duration),
}

/// Cross-thread stop request
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Session counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub bytes_received: u64,
    pub frames_valid: u64,
    pub frames_invalid: u64,
    /// Bytes dropped while resynchronizing
    pub bytes_skipped: u64,
    pub samples_stored: u64,
    /// Valid frames already received when the buffer filled, never stored
    pub samples_rejected: u64,
    pub envelope_refreshes: u64,
    /// Reads that returned nothing within the source timeout
    pub empty_reads: u64,
}

/// Read-only view handed to renderers
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub descriptor: Option<SessionDescriptor>,
    pub samples: BufferSnapshot,
    /// Envelope per channel as of the last refresh
    pub envelopes: Vec<Arc<[f64]>>,
    pub stats: SessionStats,
}

impl SessionSnapshot {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Fraction of expected samples received, when the length is known
    pub fn progress(&self) -> Option<f64> {
        self.descriptor.as_ref().and_then(|d| d.progress(self.len()))
    }

    /// Seconds at each stored sample
    pub fn time_axis(&self) -> Vec<f64> {
        let rate = self.descriptor.as_ref().map_or(0, |d| d.sample_rate_hz);
        time_axis(self.len(), rate)
    }
}

/// Outcome of [`AcquisitionSession::run`]
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    pub completion: Completion,
    pub descriptor: Option<SessionDescriptor>,
    pub samples: usize,
    pub stats: SessionStats,
}

/// One acquisition from a byte source
pub struct AcquisitionSession<S> {
    source: S,
    settings: AcquisitionSettings,
    envelope_settings: EnvelopeSettings,
    cadence: RefreshCadence,
    decoder: SampleDecoder,
    assembler: FrameAssembler,
    magic: SessionMagicTable,
    clock: Arc<dyn TimeProvider>,
    stop: StopHandle,

    state: SessionState,
    descriptor: Option<SessionDescriptor>,
    buffer: StreamBuffer,
    envelopes: EnvelopeBank,
    stats: SessionStats,

    read_buf: Vec<u8>,
    samples_since_refresh: usize,
    last_refresh_nanos: u64,
    completion_reported: bool,
}

impl<S: ByteSource> AcquisitionSession<S> {
    pub fn new(source: S, config: &SystemConfig) -> EmgResult<Self> {
        config
            .validate()
            .map_err(|errors| EmgError::Config(crate::config::ConfigError::Validation(errors)))?;

        let settings = config.acquisition.clone();
        let channels = settings.mode.channel_count();

        Ok(Self {
            source,
            cadence: settings.cadence(),
            decoder: SampleDecoder::new(settings.mode, &config.calibration),
            assembler: FrameAssembler::new(config.protocol.resync),
            magic: config.magic_table(),
            envelope_settings: config.envelope,
            clock: Arc::new(SystemTimeProvider::new()),
            stop: StopHandle::new(),
            state: SessionState::Idle,
            descriptor: None,
            buffer: StreamBuffer::new(channels, 0),
            envelopes: EnvelopeBank::new(None, channels),
            stats: SessionStats::default(),
            read_buf: vec![0u8; config.serial.read_chunk_bytes],
            samples_since_refresh: 0,
            last_refresh_nanos: 0,
            completion_reported: false,
            settings,
        })
    }

    /// Use `clock` for wall-clock refresh cadences
    pub fn with_clock(mut self, clock: Arc<dyn TimeProvider>) -> Self {
        self.clock = clock;
        self
    }

    /// Share an externally created stop handle
    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_cadence(mut self, cadence: RefreshCadence) -> Self {
        self.cadence = cadence;
        self
    }

    /// Idle -> AwaitingFirstFrame
    pub fn start(&mut self) -> EmgResult<()> {
        if self.state != SessionState::Idle {
            return Err(self.invalid_state("start"));
        }

        if self.settings.mode == AcquisitionMode::Test {
            self.configure(self.settings.test_descriptor())?;
        }
        self.last_refresh_nanos = self.clock.now_nanos();
        self.state = SessionState::AwaitingFirstFrame;
        info!(mode = %self.settings.mode, "acquisition session started");
        Ok(())
    }

    /// Read once from the source and process what arrived.
    ///
    /// Returns the number of samples stored. Source failures complete the
    /// session rather than returning an error.
    pub fn poll<R: Renderer + ?Sized>(&mut self, renderer: &mut R) -> EmgResult<usize> {
        match self.state {
            SessionState::Idle => return Err(self.invalid_state("poll")),
            SessionState::Completed(_) => return Ok(0),
            _ => {}
        }

        if self.stop.is_stopped() {
            self.complete(Completion::Stopped);
            self.report_completion(renderer);
            return Ok(0);
        }

        let mut buf = std::mem::take(&mut self.read_buf);
        let read = self.source.read_bytes(&mut buf);
        let result = match read {
            Ok(0) => {
                trace!("no bytes within source timeout");
                self.stats.empty_reads += 1;
                Ok(0)
            }
            Ok(n) => self.process(&buf[..n]),
            Err(SourceError::Closed) => {
                self.complete(Completion::SourceClosed);
                Ok(0)
            }
            Err(SourceError::Io(e)) => {
                error!(error = %e, "byte source failed, aborting session");
                self.complete(Completion::Aborted(e.to_string()));
                Ok(0)
            }
        };
        self.read_buf = buf;

        let stored = result?;
        self.notify(renderer);
        Ok(stored)
    }

    /// Feed bytes that were read elsewhere. Ignored once completed.
    pub fn ingest(&mut self, bytes: &[u8]) -> EmgResult<usize> {
        match self.state {
            SessionState::Idle => return Err(self.invalid_state("ingest")),
            SessionState::Completed(_) => return Ok(0),
            _ => {}
        }
        if self.stop.is_stopped() {
            self.complete(Completion::Stopped);
            return Ok(0);
        }

        let stored = self.process(bytes)?;
        if self.refresh_due() {
            self.refresh_envelopes();
        }
        Ok(stored)
    }

    /// Poll until the session completes
    #[instrument(skip_all, fields(mode = %self.settings.mode))]
    pub fn run<R: Renderer + ?Sized>(&mut self, renderer: &mut R) -> EmgResult<SessionReport> {
        if self.state == SessionState::Idle {
            self.start()?;
        }

        while !self.state.is_completed() {
            self.poll(renderer)?;
        }
        self.report_completion(renderer);

        let report = self.report();
        info!(
            completion = %report.completion,
            samples = report.samples,
            frames_invalid = report.stats.frames_invalid,
            "acquisition session finished"
        );
        Ok(report)
    }

    /// Bring every channel's envelope up to date with the buffer
    pub fn refresh_envelopes(&mut self) {
        let channels = self.buffer.channels();
        self.envelopes.update(&channels);
        self.samples_since_refresh = 0;
        self.last_refresh_nanos = self.clock.now_nanos();
        self.stats.envelope_refreshes += 1;
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state.clone(),
            descriptor: self.descriptor.clone(),
            samples: self.buffer.snapshot(),
            envelopes: (0..self.buffer.channel_count())
                .map(|i| Arc::from(self.envelopes.envelope(i).unwrap_or(&[])))
                .collect(),
            stats: self.stats(),
        }
    }

    pub fn report(&self) -> SessionReport {
        let completion = match &self.state {
            SessionState::Completed(completion) => completion.clone(),
            _ => Completion::Stopped,
        };
        SessionReport {
            completion,
            descriptor: self.descriptor.clone(),
            samples: self.buffer.len(),
            stats: self.stats(),
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Known once the first frame (NORMAL) or `start` (TEST) resolved it
    pub fn descriptor(&self) -> Option<&SessionDescriptor> {
        self.descriptor.as_ref()
    }

    pub fn stats(&self) -> SessionStats {
        let assembler = self.assembler.stats();
        SessionStats {
            bytes_received: assembler.bytes_received,
            frames_valid: assembler.frames_valid,
            frames_invalid: assembler.frames_invalid,
            bytes_skipped: assembler.bytes_skipped,
            ..self.stats
        }
    }

    pub fn buffer(&self) -> &StreamBuffer {
        &self.buffer
    }

    /// Envelope of `channel` as of the last refresh
    pub fn envelope(&self, channel: usize) -> Option<&[f64]> {
        self.envelopes.envelope(channel)
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn into_source(self) -> S {
        self.source
    }

    fn process(&mut self, bytes: &[u8]) -> EmgResult<usize> {
        self.assembler.push(bytes);
        let mut stored = 0;

        while !self.state.is_completed() {
            let Some(event) = self.assembler.next_event() else {
                break;
            };
            match event {
                FrameEvent::Invalid(fault) => {
                    debug!(%fault, "frame discarded");
                }
                FrameEvent::Valid(frame) => {
                    if self.state == SessionState::AwaitingFirstFrame {
                        if self.settings.mode == AcquisitionMode::Normal {
                            self.resolve_magic(&frame)?;
                            self.state = SessionState::Streaming;
                            continue;
                        }
                        self.state = SessionState::Streaming;
                    }
                    stored += self.store(&frame);
                }
            }
        }

        if self.state == SessionState::Completed(Completion::ExpectedCountReached) {
            self.reject_pending();
        }
        Ok(stored)
    }

    /// Count the valid frames that arrived after the buffer filled
    fn reject_pending(&mut self) {
        while let Some(event) = self.assembler.next_event() {
            if let FrameEvent::Valid(_) = event {
                self.stats.samples_rejected += 1;
            }
        }
        if self.stats.samples_rejected > 0 {
            debug!(rejected = self.stats.samples_rejected, "samples beyond the expected count");
        }
    }

    fn store(&mut self, frame: &ValidFrame) -> usize {
        let sample = self.decoder.decode(frame);
        match self.buffer.append(&sample) {
            AppendOutcome::Accepted => {
                self.stats.samples_stored += 1;
                self.samples_since_refresh += 1;
                if self.buffer.is_full() {
                    self.complete(Completion::ExpectedCountReached);
                }
                1
            }
            AppendOutcome::Full => {
                self.stats.samples_rejected += 1;
                self.complete(Completion::ExpectedCountReached);
                0
            }
        }
    }

    fn resolve_magic(&mut self, frame: &ValidFrame) -> EmgResult<()> {
        let payload = frame.payload();
        let rate = self.settings.sample_rate_hz;

        let descriptor = match self.magic.lookup(&payload) {
            Some(entry) => {
                info!(label = %entry.label, duration_s = entry.duration_s, "recording announced");
                SessionDescriptor::from_duration(entry.duration_s, rate, Some(entry.label.clone()))
            }
            None => {
                warn!(?payload, "unrecognized session magic, session length unknown");
                SessionDescriptor::unknown(rate)
            }
        };
        self.configure(descriptor)
    }

    fn configure(&mut self, descriptor: SessionDescriptor) -> EmgResult<()> {
        let channels = self.settings.mode.channel_count();
        let envelope = self.envelope_settings.resolve(descriptor.expected_samples)?;

        match envelope {
            Some(config) => debug!(
                window = config.window(),
                overlap = config.overlap(),
                "envelope configured"
            ),
            None => debug!("envelope disabled for session of unknown length"),
        }

        self.buffer = StreamBuffer::new(channels, descriptor.expected_samples);
        self.envelopes = EnvelopeBank::new(envelope, channels);
        info!(
            expected_samples = descriptor.expected_samples,
            duration_s = descriptor.duration_s,
            "session sized"
        );
        self.descriptor = Some(descriptor);
        Ok(())
    }

    fn complete(&mut self, completion: Completion) {
        if self.state.is_completed() {
            return;
        }
        match &completion {
            Completion::Aborted(_) => {}
            other => info!(completion = %other, samples = self.buffer.len(), "session completed"),
        }
        self.state = SessionState::Completed(completion);
        self.refresh_envelopes();
    }

    fn refresh_due(&self) -> bool {
        if self.samples_since_refresh == 0 {
            return false;
        }
        match self.cadence {
            RefreshCadence::EverySamples(n) => self.samples_since_refresh >= n.max(1),
            RefreshCadence::Every(interval) => {
                self.clock.elapsed_since(self.last_refresh_nanos) >= interval
            }
        }
    }

    fn notify<R: Renderer + ?Sized>(&mut self, renderer: &mut R) {
        if self.state.is_completed() {
            self.report_completion(renderer);
        } else if self.refresh_due() {
            self.refresh_envelopes();
            renderer.on_progress(&self.snapshot());
        }
    }

    fn report_completion<R: Renderer + ?Sized>(&mut self, renderer: &mut R) {
        if !self.completion_reported {
            self.completion_reported = true;
            renderer.on_complete(&self.snapshot());
        }
    }

    fn invalid_state(&self, operation: &'static str) -> EmgError {
        EmgError::InvalidState {
            operation,
            state: self.state.clone(),
        }
    }
}

impl<S> fmt::Debug for AcquisitionSession<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcquisitionSession")
            .field("mode", &self.settings.mode)
            .field("state", &self.state)
            .field("descriptor", &self.descriptor)
            .field("samples", &self.buffer.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::render::NullRenderer;
    use crate::config::constants::session_magic::DATA_3D_PAYLOAD;
    use crate::hal::ReaderSource;
    use crate::processing::EnvelopeConfig;
    use crate::protocol::{encode_channel_code, Frame};
    use crate::utils::MockTimeProvider;
    use std::io::Cursor;

    fn test_frame(code: i32, counter: u8) -> Vec<u8> {
        let c = encode_channel_code(code);
        Frame::encode([c[0], c[1], c[2], 0, 0, 0, counter, 0])
            .as_bytes()
            .to_vec()
    }

    fn test_config(duration_s: u32, rate: u32) -> SystemConfig {
        let mut config = SystemConfig::default();
        config.acquisition.mode = AcquisitionMode::Test;
        config.acquisition.test_duration_s = duration_s;
        config.acquisition.sample_rate_hz = rate;
        config
    }

    fn empty_source() -> ReaderSource<Cursor<Vec<u8>>> {
        ReaderSource::new(Cursor::new(Vec::new()))
    }

    #[test]
    fn test_start_transitions() {
        let mut session = AcquisitionSession::new(empty_source(), &test_config(1, 10)).unwrap();
        assert_eq!(session.state(), &SessionState::Idle);
        assert!(matches!(
            session.ingest(&[0u8; 13]),
            Err(EmgError::InvalidState { operation: "ingest", .. })
        ));

        session.start().unwrap();
        assert_eq!(session.state(), &SessionState::AwaitingFirstFrame);
        assert_eq!(session.descriptor().unwrap().expected_samples, 10);
        assert!(matches!(session.start(), Err(EmgError::InvalidState { .. })));
    }

    #[test]
    fn test_test_mode_first_frame_is_a_sample() {
        let mut session = AcquisitionSession::new(empty_source(), &test_config(1, 10)).unwrap();
        session.start().unwrap();

        assert_eq!(session.ingest(&test_frame(16, 3)).unwrap(), 1);
        assert_eq!(session.state(), &SessionState::Streaming);
        assert_eq!(session.buffer().counters(), &[3]);
        let scale = crate::protocol::Calibration::default().scale_factor();
        assert_eq!(session.buffer().channel(0).unwrap(), &[16.0 * scale]);
    }

    #[test]
    fn test_completes_at_expected_count() {
        let mut session = AcquisitionSession::new(empty_source(), &test_config(1, 4)).unwrap();
        session.start().unwrap();

        let mut bytes = Vec::new();
        for i in 0..6 {
            bytes.extend(test_frame(i, i as u8));
        }
        assert_eq!(session.ingest(&bytes).unwrap(), 4);
        assert_eq!(
            session.state(),
            &SessionState::Completed(Completion::ExpectedCountReached)
        );
        assert_eq!(session.stats().samples_rejected, 2);
        assert_eq!(session.stats().frames_valid, 6);
        assert_eq!(session.ingest(&test_frame(1, 1)).unwrap(), 0);
        assert_eq!(session.buffer().len(), 4);
    }

    #[test]
    fn test_overlap_clamped_once_length_is_known() {
        let mut config = SystemConfig::default();
        config.envelope.overlap_samples = Some(100);
        let mut session = AcquisitionSession::new(empty_source(), &config).unwrap();
        session.start().unwrap();

        let mut bytes = Frame::encode(DATA_3D_PAYLOAD).as_bytes().to_vec();
        for i in 0..20u8 {
            bytes.extend(Frame::encode([0, 0, i, 0, 0, i, 0, 0]).as_bytes());
        }
        assert_eq!(session.ingest(&bytes).unwrap(), 20);

        assert_eq!(session.state(), &SessionState::Streaming);
        assert_eq!(session.descriptor().unwrap().expected_samples, 7_500);
        assert!(session.buffer().is_bounded());
        assert_eq!(
            session.envelopes.config(),
            Some(EnvelopeConfig::new(50, 49).unwrap())
        );
    }

    #[test]
    fn test_normal_mode_consumes_magic() {
        let mut config = SystemConfig::default();
        config.acquisition.sample_rate_hz = 2;
        let mut session = AcquisitionSession::new(empty_source(), &config).unwrap();
        session.start().unwrap();

        let mut bytes = Frame::encode(DATA_3D_PAYLOAD).as_bytes().to_vec();
        bytes.extend(Frame::encode([0, 0, 1, 0, 0, 2, 0, 0]).as_bytes());
        session.ingest(&bytes).unwrap();

        let descriptor = session.descriptor().unwrap();
        assert_eq!(descriptor.duration_s, 15);
        assert_eq!(descriptor.expected_samples, 30);
        assert_eq!(descriptor.label.as_deref(), Some("EMG DATA 3d"));
        assert_eq!(session.buffer().len(), 1);
        assert_eq!(session.buffer().channel_count(), 2);
    }

    #[test]
    fn test_unknown_magic_is_degenerate() {
        let mut session =
            AcquisitionSession::new(empty_source(), &SystemConfig::default()).unwrap();
        session.start().unwrap();
        session
            .ingest(Frame::encode([9; 8]).as_bytes())
            .unwrap();

        let descriptor = session.descriptor().unwrap();
        assert!(descriptor.is_degenerate());
        assert!(!session.buffer().is_bounded());
        assert_eq!(session.state(), &SessionState::Streaming);
    }

    #[test]
    fn test_stop_handle() {
        let mut session = AcquisitionSession::new(empty_source(), &test_config(10, 10)).unwrap();
        session.start().unwrap();
        session.stop_handle().stop();

        session.poll(&mut NullRenderer).unwrap();
        assert_eq!(
            session.state(),
            &SessionState::Completed(Completion::Stopped)
        );
    }

    #[test]
    fn test_source_closed() {
        let bytes: Vec<u8> = (0..3).flat_map(|i| test_frame(i, i as u8)).collect();
        let source = ReaderSource::new(Cursor::new(bytes));
        let mut session = AcquisitionSession::new(source, &test_config(10, 10)).unwrap();

        let report = session.run(&mut NullRenderer).unwrap();
        assert_eq!(report.completion, Completion::SourceClosed);
        assert_eq!(report.samples, 3);
        assert_eq!(report.stats.frames_valid, 3);
    }

    #[test]
    fn test_wall_clock_cadence() {
        let clock = Arc::new(MockTimeProvider::new(0));
        let mut session = AcquisitionSession::new(empty_source(), &test_config(10, 10))
            .unwrap()
            .with_clock(clock.clone())
            .with_cadence(RefreshCadence::Every(Duration::from_secs(1)));
        session.start().unwrap();

        session.ingest(&test_frame(5, 0)).unwrap();
        assert_eq!(session.stats().envelope_refreshes, 0);

        clock.advance(Duration::from_secs(1));
        session.ingest(&test_frame(5, 1)).unwrap();
        assert_eq!(session.stats().envelope_refreshes, 1);
        assert_eq!(session.envelope(0).unwrap().len(), 2);
    }
}
