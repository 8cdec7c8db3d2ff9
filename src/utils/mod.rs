//! Common utility functions shared across the pipeline
//!
//! - Injectable clocks for wall-clock refresh cadences
//! - Sample/time conversions for plotting axes and progress reports

pub mod conversion;
pub mod time;

pub use conversion::{samples_to_duration, time_axis};
pub use time::{MockTimeProvider, SystemTimeProvider, TimeProvider};
