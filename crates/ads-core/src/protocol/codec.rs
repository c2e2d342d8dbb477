//! Fixed 3-byte packet codec.
//!
//! Byte 0 is the command (outbound) or packet type (inbound); bytes 1-2 are
//! the payload. Payload fields are 16-bit little-endian.

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};

use super::constants::{ADS_TRANSFER_SIZE, SAMPLE_SCALE};
use super::types::{CalibrationStep, Command, PacketType};

/// Encode a u16 payload field.
pub fn encode_u16(value: u16) -> [u8; 2] {
    let mut buf = [0u8; 2];
    LittleEndian::write_u16(&mut buf, value);
    buf
}

/// Decode a u16 payload field.
pub fn decode_u16(bytes: &[u8; 2]) -> u16 {
    LittleEndian::read_u16(bytes)
}

/// Decode a signed payload field.
///
/// Low byte first, then the high byte sign-extended into the upper half.
/// Kept separate from `decode_u16` to stay bit-compatible with the device
/// firmware's own encoder.
pub fn decode_i16(bytes: &[u8; 2]) -> i16 {
    ((bytes[1] as i8 as i16) << 8) | bytes[0] as i16
}

/// Convert raw sample ticks to degrees (bend) or millimetres (stretch).
pub fn ticks_to_sample(ticks: i16) -> f32 {
    ticks as f32 / SAMPLE_SCALE
}

/// One bus transfer unit.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Packet([u8; ADS_TRANSFER_SIZE]);

impl Packet {
    pub const fn from_raw(bytes: [u8; ADS_TRANSFER_SIZE]) -> Self {
        Self(bytes)
    }

    /// Build a packet from a bus read; `None` unless exactly 3 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        <[u8; ADS_TRANSFER_SIZE]>::try_from(bytes).ok().map(Self)
    }

    /// Command with an empty payload.
    pub fn command(cmd: Command) -> Self {
        Self([cmd.into(), 0, 0])
    }

    /// Command whose first payload byte is an on/off flag.
    pub fn flag(cmd: Command, active: bool) -> Self {
        Self([cmd.into(), active as u8, 0])
    }

    /// Command with a u16 payload.
    pub fn with_u16(cmd: Command, value: u16) -> Self {
        let [lo, hi] = encode_u16(value);
        Self([cmd.into(), lo, hi])
    }

    pub fn calibrate(step: CalibrationStep, parameter: u8) -> Self {
        Self([Command::Calibrate.into(), step.into(), parameter])
    }

    pub fn set_address(address: u8) -> Self {
        Self([Command::SetAddress.into(), address, 0])
    }

    /// Device -> host packet, mostly useful for test doubles.
    pub fn reply(kind: PacketType, payload: [u8; 2]) -> Self {
        Self([kind.into(), payload[0], payload[1]])
    }

    /// Sample packet carrying `ticks`.
    pub fn sample(kind: PacketType, ticks: i16) -> Self {
        Self::reply(kind, ticks.to_le_bytes())
    }

    pub fn code(&self) -> u8 {
        self.0[0]
    }

    /// Classify an inbound packet; the raw code is returned if unknown.
    pub fn kind(&self) -> Result<PacketType, u8> {
        PacketType::try_from(self.0[0]).map_err(|_| self.0[0])
    }

    pub fn payload(&self) -> [u8; 2] {
        [self.0[1], self.0[2]]
    }

    pub fn payload_u16(&self) -> u16 {
        decode_u16(&self.payload())
    }

    pub fn payload_i16(&self) -> i16 {
        decode_i16(&self.payload())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Packet({:02X} {:02X} {:02X})",
            self.0[0], self.0[1], self.0[2]
        )
    }
}
