//! Hardware access layer module.

pub mod mock;
pub mod sim;
pub mod traits;

pub use mock::MockHal;
pub use sim::SimulatedDevice;
pub use traits::{AdsHal, HalError, PacketCallback};
