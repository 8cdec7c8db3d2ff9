//! Acquire one session from the EMG device
//!
//! Usage:
//!   emg-acquire --port /dev/ttyUSB0 --mode normal
//!
//! Without hardware, replay a simulated recording:
//!   emg-acquire --simulate --mode test --log-level debug

use clap::{Parser, ValueEnum};
use emg_stream::acquisition::{AcquisitionSession, LogRenderer, SessionReport};
use emg_stream::config::constants::session_magic::{DATA_1D_DURATION_S, DATA_1D_PAYLOAD};
use emg_stream::config::{ConfigLoader, SystemConfig};
use emg_stream::error::EmgError;
use emg_stream::hal::{open_serial, AcquisitionMode, SimulatedDevice, SimulatorConfig};
use std::path::PathBuf;
use tracing::info;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    Test,
    Normal,
}

impl From<ModeArg> for AcquisitionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Test => AcquisitionMode::Test,
            ModeArg::Normal => AcquisitionMode::Normal,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration files, lowest precedence first
    #[arg(short, long)]
    config: Vec<PathBuf>,

    /// Serial port, overriding the configuration
    #[arg(short, long)]
    port: Option<String>,

    /// Acquisition mode, overriding the configuration
    #[arg(short, long, value_enum)]
    mode: Option<ModeArg>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Use the simulated device instead of the serial port
    #[arg(long)]
    simulate: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
        )
        .init();

    let loader = if args.config.is_empty() {
        ConfigLoader::new()
    } else {
        ConfigLoader::with_paths(args.config.clone())
    };
    let mut loader = loader.with_env_prefix("EMG_");
    let mut config = loader.load()?;

    if let Some(port) = &args.port {
        config.serial.port_name = port.clone();
    }
    if let Some(mode) = args.mode {
        config.acquisition.mode = mode.into();
    }

    let report = if args.simulate {
        acquire_simulated(&config)?
    } else {
        acquire_serial(&config)?
    };

    info!(
        completion = %report.completion,
        samples = report.samples,
        frames_valid = report.stats.frames_valid,
        frames_invalid = report.stats.frames_invalid,
        "done"
    );
    Ok(())
}

fn acquire_serial(config: &SystemConfig) -> Result<SessionReport, Box<dyn std::error::Error>> {
    let acquisition = &config.acquisition;
    let mut link = open_serial(&config.serial)?;

    let report = link.with_acquisition(
        acquisition.mode,
        acquisition.sample_rate_hz,
        |link| -> Result<SessionReport, EmgError> {
            let mut session = AcquisitionSession::new(link, config)?;
            session.run(&mut LogRenderer)
        },
    )?;
    Ok(report)
}

fn acquire_simulated(config: &SystemConfig) -> Result<SessionReport, Box<dyn std::error::Error>> {
    let acquisition = &config.acquisition;
    let duration_s = match acquisition.mode {
        AcquisitionMode::Test => acquisition.test_duration_s,
        AcquisitionMode::Normal => DATA_1D_DURATION_S,
    };

    let simulator = SimulatorConfig {
        mode: acquisition.mode,
        sample_rate_hz: acquisition.sample_rate_hz,
        sample_frames: duration_s as usize * acquisition.sample_rate_hz as usize,
        magic_payload: Some(DATA_1D_PAYLOAD),
        ..SimulatorConfig::default()
    };
    let device = SimulatedDevice::new(simulator, &config.calibration)?;

    let mut session = AcquisitionSession::new(device, config)?;
    Ok(session.run(&mut LogRenderer)?)
}
