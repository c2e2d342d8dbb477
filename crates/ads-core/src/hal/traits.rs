//! Hardware access layer abstraction.
//!
//! Defines the `AdsHal` trait the driver core consumes, allowing different
//! implementations (platform bus drivers, the simulator, the scripted mock).

use std::sync::Arc;

use thiserror::Error;

use crate::protocol::{ADS_TRANSFER_SIZE, Packet};

#[derive(Error, Debug)]
pub enum HalError {
    #[error("No acknowledge from address 0x{address:02X}")]
    Nack { address: u8 },

    #[error("Short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("HAL not initialized")]
    NotInitialized,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Callback the HAL invokes from its sample-ready context with the packet it
/// just read off the bus.
pub type PacketCallback = Arc<dyn Fn(Packet) + Send + Sync>;

/// Abstract hardware interface for one sensor.
///
/// Implementations must serialise bus access internally: the sample-ready
/// callback may run on another thread than the session.
pub trait AdsHal: Send + Sync {
    /// One-time setup binding the reset/ready pins and the packet callback.
    fn init(
        &self,
        callback: PacketCallback,
        reset_pin: u32,
        ready_pin: u32,
    ) -> Result<(), HalError>;

    /// Blocking millisecond delay.
    fn delay(&self, ms: u16);

    /// Transmit all of `data` to the current bus address.
    fn write(&self, data: &[u8]) -> Result<(), HalError>;

    /// Read exactly `len` bytes from the current bus address.
    fn read(&self, len: usize) -> Result<Vec<u8>, HalError>;

    /// Pulse the device reset line.
    fn reset(&self);

    /// Bus address the HAL is currently talking to.
    fn address(&self) -> u8;

    /// Change the local bus address; no traffic is generated.
    fn set_address(&self, address: u8);

    /// Arm or disarm the sample-ready notification.
    fn enable_signal(&self, enable: bool);

    /// Read one full transfer unit.
    fn read_packet(&self) -> Result<Packet, HalError> {
        let bytes = self.read(ADS_TRANSFER_SIZE)?;
        Packet::from_bytes(&bytes).ok_or(HalError::ShortRead {
            expected: ADS_TRANSFER_SIZE,
            actual: bytes.len(),
        })
    }

    /// Write one full transfer unit.
    fn write_packet(&self, packet: &Packet) -> Result<(), HalError> {
        self.write(packet.as_bytes())
    }
}
