//! Command, packet-type and parameter enumerations.

use std::fmt;

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

use super::constants::SAMPLE_RATE_CLOCK;

/// Command codes (byte 0 of host -> device packets).
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Command {
    /// Free-run interrupt mode on/off.
    Run = 0,
    /// Free-run sample rate, payload is a u16 tick divisor.
    SetSampleRate = 1,
    SoftwareReset = 2,
    /// Reboot into the bootloader.
    EnterBootloader = 3,
    SetAddress = 4,
    /// Polled mode on/off.
    Polled = 5,
    GetFirmwareVersion = 6,
    Calibrate = 7,
    /// Simultaneous bend + stretch measurement on/off.
    EnableStretch = 8,
    /// Lowest power state, only a hardware reset wakes the device.
    Shutdown = 9,
    GetDeviceId = 10,
}

/// Packet type codes (byte 0 of device -> host packets).
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum PacketType {
    BendSample = 0,
    FirmwareVersion = 1,
    DeviceId = 2,
    StretchSample = 3,
}

/// Hardware variant reported by the device-id query.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    IntoPrimitive,
    TryFromPrimitive,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "kebab-case")]
#[repr(u8)]
pub enum DeviceType {
    Unknown = 0,
    OneAxisV1 = 1,
    TwoAxisV1 = 2,
    OneAxisV2 = 12,
}

impl DeviceType {
    /// Decode a raw id byte, mapping anything unrecognised to `Unknown`.
    pub fn from_id(id: u8) -> Self {
        Self::try_from(id).unwrap_or(DeviceType::Unknown)
    }

    /// Single-axis variants are the only ones this driver talks to.
    pub fn is_one_axis(&self) -> bool {
        matches!(self, DeviceType::OneAxisV1 | DeviceType::OneAxisV2)
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceType::Unknown => write!(f, "unknown"),
            DeviceType::OneAxisV1 => write!(f, "one-axis v1"),
            DeviceType::TwoAxisV1 => write!(f, "two-axis v1"),
            DeviceType::OneAxisV2 => write!(f, "one-axis v2"),
        }
    }
}

/// Calibration steps (byte 1 of a `Calibrate` command).
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum CalibrationStep {
    /// First bend point, typically 0 degrees.
    First = 0,
    /// Second bend point, 45-255 degrees (90 recommended).
    Second = 1,
    /// Drop user calibration and restore the factory one.
    Clear = 2,
    /// 0 mm stretch point.
    StretchZero = 3,
    /// Second stretch point, typically 30 mm.
    StretchSecond = 4,
}

/// Free-run sample rates.
///
/// The tick divisors are the device's published table: `16384 / sps`
/// truncated toward zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleRate {
    Hz1,
    Hz10,
    Hz20,
    Hz50,
    #[default]
    Hz100,
    /// Highest rate that supports bend and stretch together.
    Hz200,
    Hz333,
    Hz500,
}

impl SampleRate {
    pub const ALL: [SampleRate; 8] = [
        SampleRate::Hz1,
        SampleRate::Hz10,
        SampleRate::Hz20,
        SampleRate::Hz50,
        SampleRate::Hz100,
        SampleRate::Hz200,
        SampleRate::Hz333,
        SampleRate::Hz500,
    ];

    pub fn as_hz(&self) -> u32 {
        match self {
            SampleRate::Hz1 => 1,
            SampleRate::Hz10 => 10,
            SampleRate::Hz20 => 20,
            SampleRate::Hz50 => 50,
            SampleRate::Hz100 => 100,
            SampleRate::Hz200 => 200,
            SampleRate::Hz333 => 333,
            SampleRate::Hz500 => 500,
        }
    }

    /// Tick divisor sent in the `SetSampleRate` payload.
    pub fn ticks(&self) -> u16 {
        (SAMPLE_RATE_CLOCK / self.as_hz()) as u16
    }

    pub fn from_hz(hz: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_hz() == hz)
    }
}

impl fmt::Display for SampleRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz", self.as_hz())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_rate_ticks_match_device_table() {
        let expected = [16384, 1638, 819, 327, 163, 81, 49, 32];
        for (rate, ticks) in SampleRate::ALL.iter().zip(expected) {
            assert_eq!(rate.ticks(), ticks, "{}", rate);
        }
    }

    #[test]
    fn test_sample_rate_from_hz() {
        assert_eq!(SampleRate::from_hz(500), Some(SampleRate::Hz500));
        assert_eq!(SampleRate::from_hz(42), None);
    }

    #[test]
    fn test_device_type_from_id() {
        assert_eq!(DeviceType::from_id(1), DeviceType::OneAxisV1);
        assert_eq!(DeviceType::from_id(12), DeviceType::OneAxisV2);
        assert_eq!(DeviceType::from_id(2), DeviceType::TwoAxisV1);
        assert_eq!(DeviceType::from_id(7), DeviceType::Unknown);
        assert!(DeviceType::OneAxisV2.is_one_axis());
        assert!(!DeviceType::TwoAxisV1.is_one_axis());
    }

    #[test]
    fn test_command_codes() {
        assert_eq!(u8::from(Command::Run), 0);
        assert_eq!(u8::from(Command::GetFirmwareVersion), 6);
        assert_eq!(u8::from(Command::GetDeviceId), 10);
        assert_eq!(PacketType::try_from(3).ok(), Some(PacketType::StretchSample));
        assert!(PacketType::try_from(4).is_err());
    }
}
