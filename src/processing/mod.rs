// src/processing/mod.rs
//! Signal processing for acquired EMG series

pub mod envelope;

pub use envelope::*;
