// src/acquisition/mod.rs
//! Acquisition session, sample storage and progress reporting

pub mod render;
pub mod session;
pub mod stream_buffer;

pub use render::*;
pub use session::*;
pub use stream_buffer::*;
