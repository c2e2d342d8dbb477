//! Protocol module - ADS bus definitions.

pub mod codec;
pub mod constants;
pub mod types;

pub use codec::{Packet, decode_i16, decode_u16, encode_u16, ticks_to_sample};
pub use constants::*;
pub use types::{CalibrationStep, Command, DeviceType, PacketType, SampleRate};
