// src/hal/traits.rs
//! Byte source abstraction for the acquisition device

use std::io::{self, Read};
use thiserror::Error;

/// Failures that end a byte stream
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source reached end of stream (port closed, replay exhausted)
    #[error("byte source closed")]
    Closed,

    /// Hard I/O failure, e.g. the device was unplugged
    #[error("byte source disconnected: {0}")]
    Io(#[from] io::Error),
}

/// Blocking-with-timeout stream of bytes from the device
pub trait ByteSource {
    /// Read whatever is available into `buf`.
    ///
    /// Blocks for at most the source's timeout. `Ok(0)` means nothing arrived
    /// within it, which is not an error.
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize, SourceError>;
}

impl<S: ByteSource + ?Sized> ByteSource for &mut S {
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize, SourceError> {
        (**self).read_bytes(buf)
    }
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize, SourceError> {
        (**self).read_bytes(buf)
    }
}

/// Map a `std::io::Read` result onto the byte source contract
///
/// Timeouts and interrupted reads become `Ok(0)`; a zero-length read on a
/// non-empty buffer is end of stream.
pub(crate) fn map_read_result(result: io::Result<usize>, requested: usize) -> Result<usize, SourceError> {
    match result {
        Ok(0) if requested > 0 => Err(SourceError::Closed),
        Ok(n) => Ok(n),
        Err(e) if is_timeout(&e) => Ok(0),
        Err(e) => Err(SourceError::Io(e)),
    }
}

pub(crate) fn is_timeout(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// Adapts any reader (file replay, socket, in-memory capture) into a byte source
#[derive(Debug)]
pub struct ReaderSource<R> {
    inner: R,
}

impl<R: Read> ReaderSource<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> ByteSource for ReaderSource<R> {
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize, SourceError> {
        map_read_result(self.inner.read(buf), buf.len())
    }
}
