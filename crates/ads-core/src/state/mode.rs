//! Device operating modes.

use std::fmt;

use crate::protocol::Command;

/// Operating mode of the sensor as last commanded by the driver.
///
/// The driver never observes device-side mode changes; this is what it last
/// successfully asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Powered, not producing samples.
    #[default]
    Idle,
    /// Interrupt-driven sampling at the configured rate.
    FreeRun,
    /// A new sample is taken on every read.
    Polled,
    /// Lowest power state; needs a hardware reset to wake.
    Shutdown,
    /// Waiting for a firmware image at the bootloader address.
    Bootloader,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Idle => write!(f, "IDLE"),
            Mode::FreeRun => write!(f, "FREE_RUN"),
            Mode::Polled => write!(f, "POLLED"),
            Mode::Shutdown => write!(f, "SHUTDOWN"),
            Mode::Bootloader => write!(f, "BOOTLOADER"),
        }
    }
}

impl Mode {
    /// Mode the device enters after successfully accepting `command` with
    /// flag `active`, or `None` if the command leaves the mode alone.
    pub fn after(self, command: Command, active: bool) -> Option<Mode> {
        match command {
            Command::Run => Some(if active { Mode::FreeRun } else { Mode::Idle }),
            Command::Polled => Some(if active { Mode::Polled } else { Mode::Idle }),
            Command::Shutdown => Some(Mode::Shutdown),
            Command::EnterBootloader => Some(Mode::Bootloader),
            Command::SoftwareReset => Some(Mode::Idle),
            _ => None,
        }
    }

    /// Whether the device is producing samples.
    pub fn is_sampling(&self) -> bool {
        matches!(self, Mode::FreeRun | Mode::Polled)
    }
}
