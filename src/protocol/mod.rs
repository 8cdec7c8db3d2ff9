// src/protocol/mod.rs
//! Device wire protocol: frame validation, reassembly and sample decoding

pub mod assembler;
pub mod decoder;
pub mod frame;
pub mod magic;

pub use assembler::*;
pub use decoder::*;
pub use frame::*;
pub use magic::*;
