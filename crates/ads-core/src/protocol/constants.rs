//! Wire-level constants for the ADS command/response bus.

/// Every command and response on the bus is exactly this many bytes.
pub const ADS_TRANSFER_SIZE: usize = 3;

/// Application bus address the sensor ships with.
pub const DEFAULT_ADDRESS: u8 = 0x12;

/// Address the bootloader listens on after `ADS_DFU`.
pub const BOOTLOADER_ADDRESS: u8 = 0x13;

/// Raw samples are signed ticks; 64 ticks per degree (or millimetre).
pub const SAMPLE_SCALE: f32 = 64.0;

/// Sample rate divisor: `ticks = 16384 / samples_per_second`.
pub const SAMPLE_RATE_CLOCK: u32 = 16384;

// Settle delays (ms)
pub const RESPONSE_DELAY_MS: u16 = 2;
pub const SETTLE_DELAY_MS: u16 = 2;
pub const WAKE_DELAY_MS: u16 = 100;

// Bootloader transfer
pub const DFU_PAGE_SIZE: usize = 64;
/// The bootloader cannot take a full page in one bus transaction.
pub const DFU_SUB_WRITE_SIZE: usize = DFU_PAGE_SIZE / 2;
pub const DFU_LENGTH_HEADER_SIZE: usize = 4;
/// Acknowledgment byte sent by the bootloader ('s').
pub const DFU_ACK: u8 = b's';
/// Number of one-byte reads before an acknowledgment wait gives up.
///
/// This is an iteration count, not a wall-clock bound: the real timeout
/// depends on how long a single bus read takes on the host.
pub const DFU_ACK_ATTEMPTS: u8 = 254;
