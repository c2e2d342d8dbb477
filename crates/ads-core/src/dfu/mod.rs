//! Device firmware update module.
//!
//! - `registry`: firmware images available per hardware variant
//! - `engine`: version check and bootloader upload

pub mod engine;
pub mod registry;

pub use engine::DfuEngine;
pub use registry::{FirmwareEntry, FirmwareImage, FirmwareRegistry};
