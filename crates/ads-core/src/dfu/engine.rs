//! Bootloader upload of a firmware image.
//!
//! Protocol, all at the bootloader address:
//!
//! 1. 4-byte little-endian image length, then one ack.
//! 2. Each full 64-byte page as two 32-byte writes, then one ack.
//! 3. The remainder as one or two writes, then a final ack.
//!
//! An ack is the single byte `'s'`, polled for with one-byte reads.

use byteorder::{ByteOrder, LittleEndian};
use tracing::{debug, info, instrument, trace, warn};

use crate::error::{AdsError, Result};
use crate::events::{DfuEvent, DfuObserver};
use crate::guard::SignalGuard;
use crate::hal::AdsHal;
use crate::protocol::{
    BOOTLOADER_ADDRESS, Command, DFU_ACK, DFU_ACK_ATTEMPTS, DFU_LENGTH_HEADER_SIZE, DeviceType,
    Packet, PacketType, RESPONSE_DELAY_MS,
};
use crate::state::{DfuContext, DfuState, PagePlan, sub_writes};

use super::registry::FirmwareRegistry;

/// Runs version checks and uploads against one HAL.
///
/// Not reentrant: one update at a time per device.
pub struct DfuEngine<'a, H: AdsHal + ?Sized, O: DfuObserver + ?Sized> {
    hal: &'a H,
    registry: &'a FirmwareRegistry,
    observer: &'a O,
    bootloader_address: u8,
    signal_enabled: bool,
}

impl<'a, H: AdsHal + ?Sized, O: DfuObserver + ?Sized> DfuEngine<'a, H, O> {
    pub fn new(hal: &'a H, registry: &'a FirmwareRegistry, observer: &'a O) -> Self {
        Self {
            hal,
            registry,
            observer,
            bootloader_address: BOOTLOADER_ADDRESS,
            signal_enabled: true,
        }
    }

    pub fn with_bootloader_address(mut self, address: u8) -> Self {
        self.bootloader_address = address;
        self
    }

    /// Sample-ready state to put back once an upload finishes.
    pub fn with_signal_enabled(mut self, enabled: bool) -> Self {
        self.signal_enabled = enabled;
        self
    }

    fn emit(&self, event: DfuEvent) {
        self.observer.on_event(&event);
    }

    fn goto_state(&self, ctx: &mut DfuContext, state: DfuState) {
        self.emit(DfuEvent::StateChanged {
            from: ctx.state,
            to: state,
        });
        ctx.goto_state(state);
    }

    /// Ask the device for its firmware version.
    ///
    /// `signal_enabled` is the sample-ready state to restore afterwards.
    pub fn firmware_version(&self, signal_enabled: bool) -> Result<u16> {
        let reply = {
            let _guard = SignalGuard::acquire(self.hal, signal_enabled);
            self.hal.write_packet(&Packet::command(Command::GetFirmwareVersion))?;
            self.hal.delay(RESPONSE_DELAY_MS);
            self.hal.read_packet()?
        };
        match reply.kind() {
            Ok(PacketType::FirmwareVersion) => Ok(reply.payload_u16()),
            _ => Err(AdsError::Generic {
                code: reply.code(),
                context: "expected firmware version",
            }),
        }
    }

    /// Whether the registered image for `variant` is newer than the firmware
    /// on the device.
    ///
    /// False if the device does not answer with a version packet or no image
    /// is registered for the variant. Bus failures are still errors.
    #[instrument(skip(self))]
    pub fn check_update_needed(&self, variant: DeviceType, signal_enabled: bool) -> Result<bool> {
        let device_version = match self.firmware_version(signal_enabled) {
            Ok(version) => version,
            Err(AdsError::Generic { code, .. }) => {
                warn!(code, "Version query answered with wrong packet type");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };
        let needed = self.registry.is_newer_than(variant, device_version);
        info!(
            device_version,
            image_version = self.registry.get(variant).map(|i| i.version()),
            needed,
            "Firmware version check"
        );
        Ok(needed)
    }

    /// Reboot the device into its bootloader.
    pub fn reset_to_bootloader(&self) -> Result<()> {
        info!("Resetting device into bootloader");
        self.hal.write_packet(&Packet::command(Command::EnterBootloader))?;
        Ok(())
    }

    /// Upload the registered image for `variant`.
    ///
    /// The device must already be in its bootloader. The HAL address is
    /// switched to the bootloader address for the transfer and is always
    /// put back before returning, whatever the outcome. Partially written
    /// flash is not rolled back.
    #[instrument(skip(self))]
    pub fn update(&self, variant: DeviceType) -> Result<()> {
        let image = self
            .registry
            .get(variant)
            .filter(|image| !image.is_empty())
            .ok_or(AdsError::DeviceUnsupported(variant))?;

        info!(
            variant = %variant,
            version = image.version(),
            bytes = image.len(),
            "Starting firmware update"
        );

        // No sample reads while the bus points at the bootloader.
        let guard = SignalGuard::acquire(self.hal, self.signal_enabled);
        let original = self.hal.address();
        self.hal.set_address(self.bootloader_address);
        self.emit(DfuEvent::AddressChanged {
            from: original,
            to: self.bootloader_address,
        });

        let mut ctx = DfuContext::new();
        let result = self.transfer(image.data(), &mut ctx);

        self.hal.set_address(original);
        self.emit(DfuEvent::AddressChanged {
            from: self.bootloader_address,
            to: original,
        });
        drop(guard);

        match &result {
            Ok(()) => {
                self.goto_state(&mut ctx, DfuState::Done);
                self.emit(DfuEvent::Complete {
                    variant,
                    bytes: image.len(),
                });
            }
            Err(e) => {
                self.goto_state(&mut ctx, DfuState::Failed);
                self.emit(DfuEvent::Failed {
                    message: e.to_string(),
                });
            }
        }
        result
    }

    fn transfer(&self, image: &[u8], ctx: &mut DfuContext) -> Result<()> {
        let plan = PagePlan::new(image.len());
        let total = image.len() as u64;
        debug!(
            pages = plan.full_pages,
            remainder = plan.remainder,
            "Page plan"
        );

        let mut header = [0u8; DFU_LENGTH_HEADER_SIZE];
        LittleEndian::write_u32(&mut header, image.len() as u32);
        self.hal.write(&header)?;
        self.goto_state(ctx, DfuState::AwaitingLengthAck);
        self.wait_ack(ctx)?;

        self.goto_state(ctx, DfuState::TransferringPages);
        for (index, page) in plan.pages(image).enumerate() {
            for chunk in sub_writes(page) {
                self.hal.write(chunk)?;
            }
            self.wait_ack(ctx)?;
            ctx.pages_done += 1;
            ctx.bytes_done += page.len();
            trace!(page = index, "Page acknowledged");
            self.emit(DfuEvent::Progress {
                current: ctx.bytes_done as u64,
                total,
            });
        }

        let remainder = plan.remainder(image);
        for chunk in sub_writes(remainder) {
            self.hal.write(chunk)?;
        }
        self.goto_state(ctx, DfuState::AwaitingFinalAck);
        self.wait_ack(ctx)?;
        ctx.bytes_done += remainder.len();
        self.emit(DfuEvent::Progress {
            current: ctx.bytes_done as u64,
            total,
        });
        Ok(())
    }

    /// Poll one-byte reads until the ack byte shows up.
    ///
    /// Bounded by read count only; failed reads count as attempts.
    fn wait_ack(&self, ctx: &mut DfuContext) -> Result<()> {
        for attempt in 1..=DFU_ACK_ATTEMPTS {
            match self.hal.read(1) {
                Ok(bytes) if bytes.first() == Some(&DFU_ACK) => {
                    ctx.acks += 1;
                    self.emit(DfuEvent::AckReceived { attempts: attempt });
                    return Ok(());
                }
                Ok(bytes) => trace!(attempt, ?bytes, "Not an ACK"),
                Err(e) => trace!(attempt, error = %e, "ACK poll read failed"),
            }
        }
        self.emit(DfuEvent::AckTimeout {
            attempts: DFU_ACK_ATTEMPTS,
        });
        Err(AdsError::Timeout {
            attempts: DFU_ACK_ATTEMPTS,
        })
    }
}
