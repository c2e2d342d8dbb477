//! Driver error kinds.

use thiserror::Error;

use crate::hal::HalError;
use crate::protocol::DeviceType;
use crate::state::Mode;

#[derive(Error, Debug)]
pub enum AdsError {
    /// Bus write/read failed or returned the wrong byte count.
    #[error("Bus I/O failed: {0}")]
    Io(#[from] HalError),

    /// Device-id query failed or reported a non one-axis device.
    #[error("Device identity check failed: got {got}")]
    DeviceIdentity { got: DeviceType },

    /// A reply arrived with a packet type the exchange did not expect.
    #[error("Unexpected packet type 0x{code:02X} ({context})")]
    Generic { code: u8, context: &'static str },

    /// No firmware image is registered for this variant.
    #[error("No firmware image for device {0}")]
    DeviceUnsupported(DeviceType),

    /// Bootloader acknowledgment never arrived.
    #[error("No bootloader acknowledgment after {attempts} reads")]
    Timeout { attempts: u8 },

    /// Operation issued in a mode where it has no meaning.
    #[error("Operation requires {expected} mode, device is {actual}")]
    WrongMode { expected: Mode, actual: Mode },
}

pub type Result<T> = std::result::Result<T, AdsError>;
