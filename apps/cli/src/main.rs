use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ads_core::protocol::{CalibrationStep, DeviceType, SampleRate, WAKE_DELAY_MS};
use ads_core::{AdsHal, AdsSession, Channel, Packet, Samples, SessionConfig, SimulatedDevice};
use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "ADS angular displacement sensor tool", long_about = None)]
struct Args {
    /// Session configuration (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Hardware variant the simulated sensor reports
    #[arg(long, value_enum, default_value_t = Variant::OneAxisV1)]
    device: Variant,

    /// Firmware version the simulated sensor runs
    #[arg(long, default_value_t = 1)]
    device_firmware: u16,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Identify the sensor and print its firmware version
    Info,
    /// Stream free-run samples
    Stream {
        /// Sample rate in Hz (1, 10, 20, 50, 100, 200, 333, 500)
        #[arg(short, long)]
        rate: Option<u32>,
        /// Number of samples to print
        #[arg(short = 'n', long, default_value_t = 20)]
        count: usize,
        /// Also measure stretch
        #[arg(long)]
        stretch: bool,
        /// Bend angle the simulated sensor reports, degrees
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        angle: f32,
    },
    /// Read samples in polled mode
    Poll {
        #[arg(short = 'n', long, default_value_t = 5)]
        count: usize,
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        angle: f32,
    },
    /// Record a calibration point
    Calibrate {
        #[arg(value_enum)]
        step: Step,
        /// Degrees for bend steps, millimetres for stretch steps
        #[arg(default_value_t = 0)]
        parameter: u8,
    },
    /// Move the sensor to a new bus address
    SetAddress {
        #[arg(value_parser = parse_address)]
        address: u8,
    },
    /// Upload the configured firmware image if it is newer than the device's
    Update {
        /// Upload even if the device already runs this version
        #[arg(long)]
        force: bool,
    },
    /// Write a default configuration file
    ConfigInit {
        #[arg(default_value = "ads.toml")]
        path: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Variant {
    OneAxisV1,
    OneAxisV2,
    TwoAxisV1,
}

impl From<Variant> for DeviceType {
    fn from(v: Variant) -> Self {
        match v {
            Variant::OneAxisV1 => DeviceType::OneAxisV1,
            Variant::OneAxisV2 => DeviceType::OneAxisV2,
            Variant::TwoAxisV1 => DeviceType::TwoAxisV1,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Step {
    First,
    Second,
    Clear,
    StretchZero,
    StretchSecond,
}

impl From<Step> for CalibrationStep {
    fn from(s: Step) -> Self {
        match s {
            Step::First => CalibrationStep::First,
            Step::Second => CalibrationStep::Second,
            Step::Clear => CalibrationStep::Clear,
            Step::StretchZero => CalibrationStep::StretchZero,
            Step::StretchSecond => CalibrationStep::StretchSecond,
        }
    }
}

fn parse_address(s: &str) -> std::result::Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid bus address '{}': {}", s, e))
}

fn print_sample(samples: &Samples, channel: Channel) {
    match channel {
        Channel::Bend => println!("bend    {:8.2} deg", samples.bend),
        Channel::Stretch => println!("stretch {:8.2} mm", samples.stretch),
    }
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!("Starting ADS tool (simulated sensor)...");

    if let Err(e) = run(args) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    if let Cmd::ConfigInit { path } = &args.command {
        SessionConfig::default()
            .save_to_file(path)
            .with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "Wrote default configuration");
        return Ok(());
    }

    let config = match &args.config {
        Some(path) => SessionConfig::load_from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SessionConfig::default(),
    };
    let registry = config.load_registry()?;

    let sim = SimulatedDevice::new(args.device.into(), args.device_firmware).realtime(true);
    if let Some(address) = config.address {
        // Move the simulated sensor to the configured address first.
        sim.write_packet(&Packet::set_address(address))?;
    }
    let mut session = AdsSession::new(sim.clone(), config, registry, Arc::new(print_sample));
    let device = session.init()?;

    match args.command {
        Cmd::Info => {
            let version = session.get_firmware_version()?;
            println!("device   {}", device);
            println!("firmware {}", version);
            println!("address  0x{:02X}", session.address());
            println!("rate     {}", session.config().sample_rate);
        }
        Cmd::Stream {
            rate,
            count,
            stretch,
            angle,
        } => {
            if let Some(hz) = rate {
                let rate = SampleRate::from_hz(hz)
                    .ok_or_else(|| anyhow!("unsupported sample rate {} Hz", hz))?;
                session.set_sample_rate(rate)?;
            }
            sim.set_angle(angle);
            sim.set_stretch(angle / 10.0);
            if stretch {
                session.set_stretch_enabled(true)?;
            }
            session.set_run(true)?;
            let period = Duration::from_millis(sim.sample_period_ms());
            for _ in 0..count {
                thread::sleep(period);
                if !sim.tick() {
                    warn!("Sample-ready line did not fire");
                }
            }
            session.set_run(false)?;
        }
        Cmd::Poll { count, angle } => {
            sim.set_angle(angle);
            session.set_polled(true)?;
            for _ in 0..count {
                let (value, channel) = session.read_polled()?;
                println!("{:?} {:.2}", channel, value);
            }
            session.set_polled(false)?;
        }
        Cmd::Calibrate { step, parameter } => {
            session.calibrate(step.into(), parameter)?;
            println!("calibration step {:?} recorded", step);
        }
        Cmd::SetAddress { address } => {
            session.set_address(address)?;
            println!("address  0x{:02X}", session.address());
        }
        Cmd::Update { force } => {
            if session.registry().get(device).is_none() {
                bail!("no firmware configured for {}", device);
            }
            if !force && !session.check_update_needed(device)? {
                println!("firmware is up to date");
                return Ok(());
            }
            session.reset_to_bootloader()?;
            session.hal().delay(WAKE_DELAY_MS);
            session.update(device)?;
            println!("firmware updated");
        }
        Cmd::ConfigInit { .. } => {}
    }

    Ok(())
}
