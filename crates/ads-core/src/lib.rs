//! ADS-Core: driver for the single-axis angular displacement sensor.
//!
//! The sensor talks fixed 3-byte packets over a two-wire bus and raises a
//! sample-ready line when a free-run sample is waiting. This crate drives it
//! through a hardware abstraction the host platform implements.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Command/packet codes, packet codec, sample scaling
//! - **HAL**: Bus/pin abstraction (`AdsHal`), a scripted mock and a simulated device
//! - **State**: Device mode tracking and the DFU page plan
//! - **Dispatch**: Sample-ready packets to the application's handler
//! - **DFU**: Firmware registry and the bootloader upload engine
//! - **Events**: Observer pattern for update progress
//! - **Session**: High-level orchestrator
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ads_core::{AdsSession, Channel, FirmwareRegistry, Samples, SessionConfig, SimulatedDevice};
//! use ads_core::protocol::DeviceType;
//!
//! let hal = SimulatedDevice::new(DeviceType::OneAxisV1, 1);
//! let handler = |samples: &Samples, channel: Channel| {
//!     println!("{:?}: {:.2}", channel, samples.get(channel));
//! };
//!
//! let mut session = AdsSession::new(
//!     hal,
//!     SessionConfig::default(),
//!     FirmwareRegistry::new(),
//!     Arc::new(handler),
//! );
//! session.init().expect("ADS init failed");
//! session.set_run(true).expect("free-run failed");
//! ```

pub mod dfu;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod guard;
pub mod hal;
pub mod protocol;
pub mod session;
pub mod state;

// Re-exports for convenience
pub use dfu::{DfuEngine, FirmwareEntry, FirmwareImage, FirmwareRegistry};
pub use dispatch::{Channel, NullHandler, SampleDispatcher, SampleHandler, Samples};
pub use error::{AdsError, Result};
pub use events::{DfuEvent, DfuObserver, NullObserver, TracingObserver};
pub use hal::{AdsHal, HalError, MockHal, PacketCallback, SimulatedDevice};
pub use protocol::{CalibrationStep, DeviceType, Packet, SampleRate};
pub use session::{AdsSession, SessionConfig};
pub use state::{DfuState, Mode};
