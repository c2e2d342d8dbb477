//! Behavioural model of an ADS one-axis sensor.
//!
//! Answers every command the driver sends, produces samples in free-run and
//! polled modes, and runs the bootloader page/ack protocol. Traffic sent to
//! an address the device is not listening on is refused, which makes
//! address-tracking mistakes in the driver visible.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use byteorder::{ByteOrder, LittleEndian};
use tracing::{debug, trace, warn};

use super::traits::{AdsHal, HalError, PacketCallback};
use crate::protocol::{
    ADS_TRANSFER_SIZE, BOOTLOADER_ADDRESS, CalibrationStep, Command, DEFAULT_ADDRESS, DFU_ACK,
    DFU_LENGTH_HEADER_SIZE, DFU_PAGE_SIZE, DeviceType, Packet, PacketType, SAMPLE_SCALE,
    SampleRate,
};
use crate::state::Mode;

#[derive(Debug, Default)]
struct Bootloader {
    expected: Option<usize>,
    image: Vec<u8>,
    page: Vec<u8>,
    acks: usize,
    /// Zero-length write seen after the image completed.
    probed: bool,
}

impl Bootloader {
    fn is_complete(&self) -> bool {
        self.expected.is_some_and(|len| self.image.len() == len)
    }

    fn ready_to_reboot(&self) -> bool {
        self.is_complete()
            && self.acks == 0
            && (self.image.len() % DFU_PAGE_SIZE != 0 || self.probed)
    }
}

struct SimState {
    host_address: u8,
    device_address: u8,
    device_type: DeviceType,
    firmware_version: u16,
    mode: Mode,
    stretch: bool,
    sample_ticks: u16,
    bend_ticks: i16,
    stretch_ticks: i16,
    stretch_next: bool,
    replies: VecDeque<Packet>,
    bootloader: Option<Bootloader>,
    flashed: Option<Vec<u8>>,
    calibrations: Vec<(CalibrationStep, u8)>,
    signal_enabled: bool,
    callback: Option<PacketCallback>,
    elapsed_ms: u64,
}

impl SimState {
    fn listening_address(&self) -> u8 {
        if self.bootloader.is_some() {
            BOOTLOADER_ADDRESS
        } else {
            self.device_address
        }
    }

    fn check_address(&self) -> Result<(), HalError> {
        if self.mode == Mode::Shutdown || self.host_address != self.listening_address() {
            return Err(HalError::Nack {
                address: self.host_address,
            });
        }
        Ok(())
    }

    fn power_on(&mut self) {
        self.mode = Mode::Idle;
        self.bootloader = None;
        self.replies.clear();
        self.stretch = false;
        self.stretch_next = false;
    }

    fn next_sample(&mut self) -> Packet {
        if self.stretch && self.stretch_next {
            self.stretch_next = false;
            Packet::sample(PacketType::StretchSample, self.stretch_ticks)
        } else {
            self.stretch_next = self.stretch;
            Packet::sample(PacketType::BendSample, self.bend_ticks)
        }
    }

    fn handle_command(&mut self, data: &[u8]) -> Result<(), HalError> {
        let packet = Packet::from_bytes(data).ok_or_else(|| {
            HalError::WriteFailed(format!(
                "expected {} byte command, got {}",
                ADS_TRANSFER_SIZE,
                data.len()
            ))
        })?;
        let [arg0, arg1] = packet.payload();
        let Ok(command) = Command::try_from(packet.code()) else {
            warn!(code = packet.code(), "Simulator ignoring unknown command");
            return Ok(());
        };
        debug!(?command, arg0, arg1, "Simulator command");

        match command {
            Command::Run => self.mode = if arg0 != 0 { Mode::FreeRun } else { Mode::Idle },
            Command::SetSampleRate => self.sample_ticks = packet.payload_u16(),
            Command::SoftwareReset => self.power_on(),
            Command::EnterBootloader => {
                self.replies.clear();
                self.bootloader = Some(Bootloader::default());
                self.mode = Mode::Bootloader;
            }
            Command::SetAddress => self.device_address = arg0,
            Command::Polled => self.mode = if arg0 != 0 { Mode::Polled } else { Mode::Idle },
            Command::GetFirmwareVersion => self.replies.push_back(Packet::reply(
                PacketType::FirmwareVersion,
                self.firmware_version.to_le_bytes(),
            )),
            Command::Calibrate => {
                if let Ok(step) = CalibrationStep::try_from(arg0) {
                    self.calibrations.push((step, arg1));
                }
            }
            Command::EnableStretch => self.stretch = arg0 != 0,
            Command::Shutdown => self.mode = Mode::Shutdown,
            Command::GetDeviceId => self.replies.push_back(Packet::reply(
                PacketType::DeviceId,
                [self.device_type.into(), 0],
            )),
        }
        Ok(())
    }

    fn bootloader_write(&mut self, data: &[u8]) -> Result<(), HalError> {
        let Some(boot) = self.bootloader.as_mut() else {
            return Ok(());
        };
        let Some(expected) = boot.expected else {
            if data.len() != DFU_LENGTH_HEADER_SIZE {
                return Err(HalError::WriteFailed("bootloader expects length".into()));
            }
            boot.expected = Some(LittleEndian::read_u32(data) as usize);
            boot.acks += 1;
            return Ok(());
        };

        if data.is_empty() {
            if boot.is_complete() {
                boot.probed = true;
                boot.acks += 1;
            }
            return Ok(());
        }

        boot.page.extend_from_slice(data);
        if boot.page.len() > DFU_PAGE_SIZE || boot.image.len() + boot.page.len() > expected {
            return Err(HalError::WriteFailed("bootloader page overflow".into()));
        }
        if boot.page.len() == DFU_PAGE_SIZE || boot.image.len() + boot.page.len() == expected {
            let page = std::mem::take(&mut boot.page);
            boot.image.extend_from_slice(&page);
            boot.acks += 1;
            trace!(received = boot.image.len(), expected, "Simulator page stored");
        }
        Ok(())
    }

    fn bootloader_read(&mut self, len: usize) -> Result<Vec<u8>, HalError> {
        if len != 1 {
            return Err(HalError::ShortRead {
                expected: len,
                actual: 0,
            });
        }
        let Some(boot) = self.bootloader.as_mut() else {
            return Ok(vec![0]);
        };
        if boot.acks == 0 {
            return Ok(vec![0]);
        }
        boot.acks -= 1;
        if boot.ready_to_reboot() {
            debug!(bytes = boot.image.len(), "Simulator flashed image, rebooting");
            self.flashed = Some(std::mem::take(&mut boot.image));
            self.power_on();
        }
        Ok(vec![DFU_ACK])
    }
}

/// Simulated sensor implementing [`AdsHal`].
///
/// Clones share the same device.
#[derive(Clone)]
pub struct SimulatedDevice {
    state: Arc<Mutex<SimState>>,
    realtime: bool,
}

impl SimulatedDevice {
    pub fn new(device_type: DeviceType, firmware_version: u16) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                host_address: DEFAULT_ADDRESS,
                device_address: DEFAULT_ADDRESS,
                device_type,
                firmware_version,
                mode: Mode::Idle,
                stretch: false,
                sample_ticks: SampleRate::default().ticks(),
                bend_ticks: 0,
                stretch_ticks: 0,
                stretch_next: false,
                replies: VecDeque::new(),
                bootloader: None,
                flashed: None,
                calibrations: Vec::new(),
                signal_enabled: false,
                callback: None,
                elapsed_ms: 0,
            })),
            realtime: false,
        }
    }

    /// Make `delay` actually sleep.
    pub fn realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        // A poisoned simulator is still a usable simulator.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Set the bend angle the sensor reports, in degrees.
    pub fn set_angle(&self, degrees: f32) {
        self.lock().bend_ticks = (degrees * SAMPLE_SCALE).round() as i16;
    }

    /// Set the stretch the sensor reports, in millimetres.
    pub fn set_stretch(&self, mm: f32) {
        self.lock().stretch_ticks = (mm * SAMPLE_SCALE).round() as i16;
    }

    pub fn set_firmware_version(&self, version: u16) {
        self.lock().firmware_version = version;
    }

    pub fn mode(&self) -> Mode {
        self.lock().mode
    }

    pub fn device_address(&self) -> u8 {
        self.lock().device_address
    }

    pub fn sample_ticks(&self) -> u16 {
        self.lock().sample_ticks
    }

    pub fn stretch_enabled(&self) -> bool {
        self.lock().stretch
    }

    pub fn calibrations(&self) -> Vec<(CalibrationStep, u8)> {
        self.lock().calibrations.clone()
    }

    /// Image received by the last completed bootloader session.
    pub fn flashed_image(&self) -> Option<Vec<u8>> {
        self.lock().flashed.clone()
    }

    /// Total milliseconds spent in `delay`.
    pub fn elapsed_ms(&self) -> u64 {
        self.lock().elapsed_ms
    }

    /// Advance one sample period.
    ///
    /// In free-run mode with the ready line armed, the HAL reads the next
    /// pending packet and hands it to the registered callback. Returns
    /// whether the callback ran.
    pub fn tick(&self) -> bool {
        let (callback, packet) = {
            let mut state = self.lock();
            if state.mode != Mode::FreeRun || !state.signal_enabled {
                return false;
            }
            let Some(callback) = state.callback.clone() else {
                return false;
            };
            let packet = match state.replies.pop_front() {
                Some(reply) => reply,
                None => state.next_sample(),
            };
            (callback, packet)
        };
        trace!(?packet, "Simulator sample ready");
        callback(packet);
        true
    }

    /// Sample period in milliseconds for the configured rate.
    pub fn sample_period_ms(&self) -> u64 {
        let ticks = self.lock().sample_ticks.max(1) as u64;
        (ticks * 1000 / crate::protocol::SAMPLE_RATE_CLOCK as u64).max(1)
    }
}

impl AdsHal for SimulatedDevice {
    fn init(
        &self,
        callback: PacketCallback,
        reset_pin: u32,
        ready_pin: u32,
    ) -> Result<(), HalError> {
        debug!(reset_pin, ready_pin, "Simulator HAL init");
        let mut state = self.lock();
        state.callback = Some(callback);
        state.signal_enabled = true;
        Ok(())
    }

    fn delay(&self, ms: u16) {
        self.lock().elapsed_ms += ms as u64;
        if self.realtime {
            thread::sleep(Duration::from_millis(ms as u64));
        }
    }

    fn write(&self, data: &[u8]) -> Result<(), HalError> {
        let mut state = self.lock();
        state.check_address()?;
        if state.bootloader.is_some() {
            state.bootloader_write(data)
        } else {
            state.handle_command(data)
        }
    }

    fn read(&self, len: usize) -> Result<Vec<u8>, HalError> {
        let mut state = self.lock();
        state.check_address()?;
        if state.bootloader.is_some() {
            return state.bootloader_read(len);
        }
        if len != ADS_TRANSFER_SIZE {
            return Err(HalError::ShortRead {
                expected: len,
                actual: 0,
            });
        }
        let packet = match state.replies.pop_front() {
            Some(reply) => reply,
            None if state.mode.is_sampling() => state.next_sample(),
            None => {
                return Err(HalError::ShortRead {
                    expected: len,
                    actual: 0,
                });
            }
        };
        Ok(packet.as_bytes().to_vec())
    }

    fn reset(&self) {
        self.lock().power_on();
    }

    fn address(&self) -> u8 {
        self.lock().host_address
    }

    fn set_address(&self, address: u8) {
        self.lock().host_address = address;
    }

    fn enable_signal(&self, enable: bool) {
        self.lock().signal_enabled = enable;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sim_answers_device_id() {
        let sim = SimulatedDevice::new(DeviceType::OneAxisV2, 5);
        sim.write_packet(&Packet::command(Command::GetDeviceId)).unwrap();
        let reply = sim.read_packet().unwrap();
        assert_eq!(reply.kind(), Ok(PacketType::DeviceId));
        assert_eq!(reply.payload()[0], 12);
    }

    #[test]
    fn test_sim_refuses_wrong_address() {
        let sim = SimulatedDevice::new(DeviceType::OneAxisV1, 1);
        sim.set_address(0x40);
        assert!(matches!(
            sim.write_packet(&Packet::command(Command::GetDeviceId)),
            Err(HalError::Nack { address: 0x40 })
        ));
    }

    #[test]
    fn test_sim_polled_samples() {
        let sim = SimulatedDevice::new(DeviceType::OneAxisV1, 1);
        sim.set_angle(20.0);
        sim.write_packet(&Packet::flag(Command::Polled, true)).unwrap();
        let sample = sim.read_packet().unwrap();
        assert_eq!(sample.kind(), Ok(PacketType::BendSample));
        assert_eq!(sample.payload_i16(), 1280);
    }

    #[test]
    fn test_sim_shutdown_until_reset() {
        let sim = SimulatedDevice::new(DeviceType::OneAxisV1, 1);
        sim.write_packet(&Packet::command(Command::Shutdown)).unwrap();
        assert!(sim.write_packet(&Packet::command(Command::GetDeviceId)).is_err());
        sim.reset();
        assert!(sim.write_packet(&Packet::command(Command::GetDeviceId)).is_ok());
    }

    #[test]
    fn test_sim_bootloader_acks_pages() {
        let sim = SimulatedDevice::new(DeviceType::OneAxisV1, 1);
        sim.write_packet(&Packet::command(Command::EnterBootloader)).unwrap();
        sim.set_address(BOOTLOADER_ADDRESS);

        sim.write(&70u32.to_le_bytes()).unwrap();
        assert_eq!(sim.read(1).unwrap(), vec![DFU_ACK]);
        assert_eq!(sim.read(1).unwrap(), vec![0]);

        sim.write(&[0xAA; 32]).unwrap();
        sim.write(&[0xAA; 32]).unwrap();
        assert_eq!(sim.read(1).unwrap(), vec![DFU_ACK]);
        sim.write(&[0xBB; 6]).unwrap();
        assert_eq!(sim.read(1).unwrap(), vec![DFU_ACK]);

        assert_eq!(sim.flashed_image().map(|i| i.len()), Some(70));
        assert_eq!(sim.mode(), Mode::Idle);
    }
}
