//! ADS Session - the driver's view of one sensor.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::dfu::{DfuEngine, FirmwareEntry, FirmwareRegistry};
use crate::dispatch::{Channel, SampleDispatcher, SampleHandler, Samples, classify};
use crate::error::{AdsError, Result};
use crate::events::{DfuObserver, TracingObserver};
use crate::guard::SignalGuard;
use crate::hal::{AdsHal, PacketCallback};
use crate::protocol::{
    BOOTLOADER_ADDRESS, CalibrationStep, Command, DeviceType, Packet, PacketType,
    RESPONSE_DELAY_MS, SETTLE_DELAY_MS, SampleRate, WAKE_DELAY_MS,
};
use crate::state::Mode;

/// Configuration for an ADS session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Bus address to talk to; `None` keeps the HAL's default.
    pub address: Option<u8>,
    /// Pin wired to the sensor's reset line.
    pub reset_pin: u32,
    /// Pin wired to the sensor's data-ready line.
    pub ready_pin: u32,
    /// Free-run sample rate programmed at init.
    pub sample_rate: SampleRate,
    /// Check the device firmware at init and update it if an image is newer.
    pub auto_update: bool,
    /// Address the bootloader listens on.
    pub bootloader_address: u8,
    /// Firmware images, one per variant.
    pub firmware: Vec<FirmwareEntry>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            address: None,
            reset_pin: 0,
            ready_pin: 0,
            sample_rate: SampleRate::default(),
            auto_update: false,
            bootloader_address: BOOTLOADER_ADDRESS,
            firmware: Vec::new(),
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SessionConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load the firmware images this configuration lists.
    pub fn load_registry(&self) -> anyhow::Result<FirmwareRegistry> {
        FirmwareRegistry::from_config(&self.firmware)
    }
}

/// ADS Session - owns the HAL, the current mode and the sample handler.
pub struct AdsSession<H: AdsHal, O: DfuObserver = TracingObserver> {
    hal: H,
    config: SessionConfig,
    registry: FirmwareRegistry,
    observer: Arc<O>,
    dispatcher: Arc<SampleDispatcher>,
    mode: Mode,
    signal_enabled: bool,
    device_type: DeviceType,
}

impl<H: AdsHal> AdsSession<H, TracingObserver> {
    /// Create a new session with default tracing observer.
    pub fn new(
        hal: H,
        config: SessionConfig,
        registry: FirmwareRegistry,
        handler: Arc<dyn SampleHandler>,
    ) -> Self {
        Self::with_observer(hal, config, registry, handler, Arc::new(TracingObserver))
    }
}

impl<H: AdsHal, O: DfuObserver> AdsSession<H, O> {
    /// Create a new session with a custom DFU observer.
    pub fn with_observer(
        hal: H,
        config: SessionConfig,
        registry: FirmwareRegistry,
        handler: Arc<dyn SampleHandler>,
        observer: Arc<O>,
    ) -> Self {
        Self {
            hal,
            config,
            registry,
            observer,
            dispatcher: Arc::new(SampleDispatcher::new(handler)),
            mode: Mode::Idle,
            signal_enabled: false,
            device_type: DeviceType::Unknown,
        }
    }

    pub fn hal(&self) -> &H {
        &self.hal
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn registry(&self) -> &FirmwareRegistry {
        &self.registry
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Bus address the session is talking to.
    pub fn address(&self) -> u8 {
        self.hal.address()
    }

    pub fn signal_enabled(&self) -> bool {
        self.signal_enabled
    }

    /// Variant detected by the last identity check.
    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    /// Latest sample of both channels.
    pub fn samples(&self) -> Samples {
        self.dispatcher.samples()
    }

    fn engine(&self) -> DfuEngine<'_, H, O> {
        DfuEngine::new(&self.hal, &self.registry, self.observer.as_ref())
            .with_bootloader_address(self.config.bootloader_address)
            .with_signal_enabled(self.signal_enabled)
    }

    fn send(&self, packet: Packet) -> Result<()> {
        debug!(?packet, "TX");
        self.hal.write_packet(&packet)?;
        Ok(())
    }

    fn goto_mode(&mut self, mode: Mode) {
        if self.mode != mode {
            info!(from = %self.mode, to = %mode, "Mode transition");
            self.mode = mode;
        }
    }

    /// Send an on/off command and record the mode it leads to.
    fn send_flag(&mut self, command: Command, active: bool) -> Result<()> {
        self.send(Packet::flag(command, active))?;
        if let Some(next) = self.mode.after(command, active) {
            self.goto_mode(next);
        }
        Ok(())
    }

    /// Bring the sensor up.
    ///
    /// Programs the configured address, initializes the HAL with the sample
    /// dispatcher, resets the device, checks it is a one-axis sensor,
    /// optionally updates its firmware and sets the sample rate. Stops at the
    /// first failing step.
    #[instrument(skip(self))]
    pub fn init(&mut self) -> Result<DeviceType> {
        if let Some(address) = self.config.address {
            info!(address = %format!("0x{:02X}", address), "Using configured bus address");
            self.hal.set_address(address);
        }

        let dispatcher = self.dispatcher.clone();
        let callback: PacketCallback = Arc::new(move |packet: Packet| {
            dispatcher.dispatch(packet);
        });
        self.hal
            .init(callback, self.config.reset_pin, self.config.ready_pin)?;
        self.signal_enabled = true;

        self.hal.reset();
        self.hal.delay(WAKE_DELAY_MS);
        self.dispatcher.set_stretch_enabled(false);
        self.goto_mode(Mode::Idle);

        let device_type = self.get_device_id()?;
        self.hal.delay(SETTLE_DELAY_MS);

        if self.config.auto_update {
            self.update_firmware()?;
        }

        self.set_sample_rate(self.config.sample_rate)?;
        self.hal.delay(SETTLE_DELAY_MS);

        info!(device = %device_type, rate = %self.config.sample_rate, "ADS initialized");
        Ok(device_type)
    }

    /// Free-run interrupt mode on, or back to idle.
    pub fn set_run(&mut self, active: bool) -> Result<()> {
        self.send_flag(Command::Run, active)
    }

    /// Polled mode on, or back to idle.
    pub fn set_polled(&mut self, active: bool) -> Result<()> {
        self.send_flag(Command::Polled, active)
    }

    /// Measure stretch alongside bend.
    pub fn set_stretch_enabled(&mut self, active: bool) -> Result<()> {
        self.send_flag(Command::EnableStretch, active)?;
        self.dispatcher.set_stretch_enabled(active);
        Ok(())
    }

    /// Lowest power mode; only `wake` brings the device back.
    pub fn shutdown(&mut self) -> Result<()> {
        self.send_flag(Command::Shutdown, true)
    }

    /// Hardware-reset the device out of shutdown.
    ///
    /// All device settings return to their defaults.
    pub fn wake(&mut self) -> Result<()> {
        self.hal.reset();
        self.hal.delay(WAKE_DELAY_MS);
        self.dispatcher.set_stretch_enabled(false);
        self.goto_mode(Mode::Idle);
        Ok(())
    }

    /// Software reset; settings return to their defaults.
    pub fn reset(&mut self) -> Result<()> {
        self.send_flag(Command::SoftwareReset, true)?;
        self.hal.delay(WAKE_DELAY_MS);
        self.dispatcher.set_stretch_enabled(false);
        Ok(())
    }

    /// Set the free-run sample rate.
    pub fn set_sample_rate(&mut self, rate: SampleRate) -> Result<()> {
        debug!(rate = %rate, ticks = rate.ticks(), "Setting sample rate");
        self.send(Packet::with_u16(Command::SetSampleRate, rate.ticks()))
    }

    /// Move the device to a new bus address.
    ///
    /// The session follows only once the device accepted the command.
    #[instrument(skip(self))]
    pub fn set_address(&mut self, address: u8) -> Result<()> {
        let old = self.hal.address();
        self.send(Packet::set_address(address))?;
        self.hal.set_address(address);
        info!(
            from = %format!("0x{:02X}", old),
            to = %format!("0x{:02X}", address),
            "Device address updated"
        );
        Ok(())
    }

    /// Arm or disarm the sample-ready signal.
    pub fn enable_interrupt(&mut self, enable: bool) {
        self.hal.enable_signal(enable);
        self.signal_enabled = enable;
    }

    /// Query the hardware variant.
    pub fn get_device_type(&mut self) -> Result<DeviceType> {
        let reply = {
            let _guard = SignalGuard::acquire(&self.hal, self.signal_enabled);
            self.send(Packet::command(Command::GetDeviceId))?;
            self.hal.delay(RESPONSE_DELAY_MS);
            self.hal.read_packet()?
        };

        if reply.kind() != Ok(PacketType::DeviceId) {
            warn!(?reply, "Device id query answered with wrong packet type");
            return Err(AdsError::DeviceIdentity {
                got: DeviceType::Unknown,
            });
        }
        let device_type = DeviceType::from_id(reply.payload()[0]);
        if device_type == DeviceType::Unknown {
            return Err(AdsError::DeviceIdentity { got: device_type });
        }
        self.device_type = device_type;
        Ok(device_type)
    }

    /// Confirm the device is a one-axis sensor and return its variant.
    #[instrument(skip(self))]
    pub fn get_device_id(&mut self) -> Result<DeviceType> {
        let device_type = self.get_device_type()?;
        if !device_type.is_one_axis() {
            return Err(AdsError::DeviceIdentity { got: device_type });
        }
        info!(device = %device_type, "Device identified");
        Ok(device_type)
    }

    /// Firmware version running on the device.
    pub fn get_firmware_version(&self) -> Result<u16> {
        self.engine().firmware_version(self.signal_enabled)
    }

    /// Read one sample in polled mode.
    pub fn read_polled(&mut self) -> Result<(f32, Channel)> {
        if self.mode != Mode::Polled {
            return Err(AdsError::WrongMode {
                expected: Mode::Polled,
                actual: self.mode,
            });
        }
        let packet = self.hal.read_packet()?;
        let (channel, value) = classify(&packet).ok_or(AdsError::Generic {
            code: packet.code(),
            context: "expected sample",
        })?;
        self.dispatcher.record(channel, value);
        Ok((value, channel))
    }

    /// Record a calibration point. The device does not confirm it.
    ///
    /// `parameter` is degrees for bend steps and millimetres for stretch
    /// steps.
    pub fn calibrate(&self, step: CalibrationStep, parameter: u8) -> Result<()> {
        info!(?step, parameter, "Calibrating");
        self.send(Packet::calibrate(step, parameter))
    }

    /// Whether a newer image than the device's firmware is registered.
    pub fn check_update_needed(&self, variant: DeviceType) -> Result<bool> {
        self.engine().check_update_needed(variant, self.signal_enabled)
    }

    /// Reboot the device into its bootloader.
    pub fn reset_to_bootloader(&mut self) -> Result<()> {
        self.engine().reset_to_bootloader()?;
        self.goto_mode(Mode::Bootloader);
        Ok(())
    }

    /// Upload the registered image for `variant`; the device must be in its
    /// bootloader.
    pub fn update(&mut self, variant: DeviceType) -> Result<()> {
        self.engine().update(variant)?;
        // The bootloader starts the new application once the image is in.
        self.goto_mode(Mode::Idle);
        Ok(())
    }

    /// Check the device firmware and update it if a newer image is
    /// registered for the detected variant. Returns whether it updated.
    #[instrument(skip(self))]
    pub fn update_firmware(&mut self) -> Result<bool> {
        let variant = self.device_type;
        if !self.check_update_needed(variant)? {
            return Ok(false);
        }
        self.reset_to_bootloader()?;
        self.hal.delay(WAKE_DELAY_MS);
        self.update(variant)?;
        self.hal.delay(WAKE_DELAY_MS);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::dfu::FirmwareImage;
    use crate::dispatch::NullHandler;
    use crate::events::NullObserver;
    use crate::hal::{HalError, MockHal, SimulatedDevice};
    use crate::protocol::DEFAULT_ADDRESS;

    fn mock_session(config: SessionConfig) -> (AdsSession<MockHal, NullObserver>, MockHal) {
        let hal = MockHal::new();
        let session = AdsSession::with_observer(
            hal.clone(),
            config,
            FirmwareRegistry::new(),
            Arc::new(NullHandler),
            Arc::new(NullObserver),
        );
        (session, hal)
    }

    fn device_id(variant: DeviceType) -> Packet {
        Packet::reply(PacketType::DeviceId, [variant.into(), 0])
    }

    #[test]
    fn test_init_sequence() {
        let config = SessionConfig {
            reset_pin: 7,
            ready_pin: 8,
            ..Default::default()
        };
        let (mut session, hal) = mock_session(config);
        hal.queue_packet(device_id(DeviceType::OneAxisV1));

        assert_eq!(session.init().unwrap(), DeviceType::OneAxisV1);

        assert_eq!(hal.pins(), Some((7, 8)));
        assert_eq!(hal.resets(), 1);
        assert_eq!(hal.get_writes(), vec![vec![10, 0, 0], vec![1, 163, 0]]);
        assert_eq!(hal.delays(), vec![100, 2, 2, 2]);
        assert_eq!(session.mode(), Mode::Idle);
        assert!(session.signal_enabled());
        assert_eq!(session.device_type(), DeviceType::OneAxisV1);
    }

    #[test]
    fn test_init_uses_configured_address() {
        let config = SessionConfig {
            address: Some(0x2A),
            ..Default::default()
        };
        let (mut session, hal) = mock_session(config);
        hal.queue_packet(device_id(DeviceType::OneAxisV2));

        session.init().unwrap();
        assert!(hal.get_addressed_writes().iter().all(|(a, _)| *a == 0x2A));
    }

    #[test]
    fn test_init_rejects_two_axis_device() {
        let (mut session, hal) = mock_session(SessionConfig::default());
        hal.queue_packet(device_id(DeviceType::TwoAxisV1));

        let err = session.init().unwrap_err();
        assert!(matches!(
            err,
            AdsError::DeviceIdentity {
                got: DeviceType::TwoAxisV1
            }
        ));
        // Sample rate never sent.
        assert_eq!(hal.get_writes(), vec![vec![10, 0, 0]]);
    }

    #[test]
    fn test_init_rejects_wrong_reply_type() {
        let (mut session, hal) = mock_session(SessionConfig::default());
        hal.queue_packet(Packet::sample(PacketType::BendSample, 100));

        assert!(matches!(
            session.init(),
            Err(AdsError::DeviceIdentity { .. })
        ));
    }

    #[test]
    fn test_init_aborts_on_bus_error() {
        let (mut session, hal) = mock_session(SessionConfig::default());
        hal.fail_writes();

        assert!(matches!(
            session.init(),
            Err(AdsError::Io(HalError::Nack { .. }))
        ));
        // Signal came back on despite the failed exchange.
        assert!(hal.signal_enabled());
    }

    #[test]
    fn test_get_device_id_guards_signal_once() {
        let (mut session, hal) = mock_session(SessionConfig::default());
        hal.queue_packet(device_id(DeviceType::OneAxisV1));
        session.init().unwrap();
        let before = hal.signal_log().len();

        hal.queue_packet(device_id(DeviceType::OneAxisV2));
        assert_eq!(session.get_device_id().unwrap(), DeviceType::OneAxisV2);

        assert_eq!(hal.signal_log()[before..], [false, true]);
        assert!(hal.delays().ends_with(&[2]));
    }

    #[test]
    fn test_set_address_only_follows_on_success() {
        let (mut session, hal) = mock_session(SessionConfig::default());

        session.set_address(0x30).unwrap();
        assert_eq!(session.address(), 0x30);
        assert_eq!(
            hal.get_addressed_writes(),
            vec![(DEFAULT_ADDRESS, vec![4, 0x30, 0])]
        );

        hal.fail_writes();
        assert!(session.set_address(0x40).is_err());
        assert_eq!(session.address(), 0x30);
    }

    #[test]
    fn test_sample_rate_encoding() {
        let (mut session, hal) = mock_session(SessionConfig::default());
        session.set_sample_rate(SampleRate::Hz100).unwrap();
        session.set_sample_rate(SampleRate::Hz500).unwrap();
        assert_eq!(hal.get_writes(), vec![vec![1, 163, 0], vec![1, 32, 0]]);
    }

    #[test]
    fn test_mode_changes_only_on_success() {
        let (mut session, hal) = mock_session(SessionConfig::default());

        session.set_run(true).unwrap();
        assert_eq!(session.mode(), Mode::FreeRun);
        session.set_run(false).unwrap();
        assert_eq!(session.mode(), Mode::Idle);
        session.set_polled(true).unwrap();
        assert_eq!(session.mode(), Mode::Polled);
        session.shutdown().unwrap();
        assert_eq!(session.mode(), Mode::Shutdown);

        hal.fail_writes();
        assert!(session.set_run(true).is_err());
        assert_eq!(session.mode(), Mode::Shutdown);

        assert_eq!(
            hal.get_writes(),
            vec![vec![0, 1, 0], vec![0, 0, 0], vec![5, 1, 0], vec![9, 1, 0]]
        );
    }

    #[test]
    fn test_wake_resets_without_reading() {
        let (mut session, hal) = mock_session(SessionConfig::default());
        session.shutdown().unwrap();
        session.wake().unwrap();

        assert_eq!(hal.resets(), 1);
        assert_eq!(hal.delays(), vec![100]);
        assert_eq!(hal.read_attempts(), 0);
        assert_eq!(session.mode(), Mode::Idle);
    }

    #[test]
    fn test_software_reset_returns_to_defaults() {
        let (mut session, hal) = mock_session(SessionConfig::default());
        hal.queue_packet(device_id(DeviceType::OneAxisV1));
        session.init().unwrap();
        session.set_stretch_enabled(true).unwrap();
        hal.queue_packet(Packet::sample(PacketType::StretchSample, 320));
        assert!(hal.fire_signal());
        assert_eq!(session.samples().stretch, 5.0);
        session.set_run(true).unwrap();

        session.reset().unwrap();

        assert_eq!(hal.get_writes().last(), Some(&vec![2, 1, 0]));
        assert_eq!(hal.delays().last(), Some(&100));
        assert_eq!(session.mode(), Mode::Idle);
        hal.queue_packet(Packet::sample(PacketType::BendSample, 64));
        assert!(hal.fire_signal());
        assert_eq!(session.samples(), Samples { bend: 1.0, stretch: 0.0 });
    }

    #[test]
    fn test_enable_interrupt_survives_exchanges() {
        let (mut session, hal) = mock_session(SessionConfig::default());
        hal.queue_packet(device_id(DeviceType::OneAxisV1));
        session.init().unwrap();

        session.enable_interrupt(false);
        assert!(!session.signal_enabled());
        let before = hal.signal_log().len();

        hal.queue_packet(device_id(DeviceType::OneAxisV1));
        session.get_device_id().unwrap();
        assert_eq!(hal.signal_log()[before..], [false, false]);
        assert!(!hal.signal_enabled());

        hal.queue_packet(Packet::sample(PacketType::BendSample, 64));
        assert!(!hal.fire_signal());
        session.enable_interrupt(true);
        assert!(hal.fire_signal());
        assert_eq!(session.samples().bend, 1.0);
    }

    #[test]
    fn test_read_polled() {
        let (mut session, hal) = mock_session(SessionConfig::default());
        assert!(matches!(
            session.read_polled(),
            Err(AdsError::WrongMode { .. })
        ));

        session.set_polled(true).unwrap();
        hal.clear_writes();
        hal.queue_packet(Packet::sample(PacketType::BendSample, 1280));
        assert_eq!(session.read_polled().unwrap(), (20.0, Channel::Bend));
        // Polling is a bare read.
        assert!(hal.get_writes().is_empty());
        assert_eq!(session.samples().bend, 20.0);

        hal.queue_packet(Packet::reply(PacketType::FirmwareVersion, [1, 0]));
        assert!(matches!(
            session.read_polled(),
            Err(AdsError::Generic { code: 1, .. })
        ));
    }

    #[test]
    fn test_calibrate_is_fire_and_forget() {
        let (mut session, hal) = mock_session(SessionConfig::default());
        session.set_run(true).unwrap();
        session.calibrate(CalibrationStep::Second, 90).unwrap();
        session
            .calibrate(CalibrationStep::StretchSecond, 30)
            .unwrap();

        assert_eq!(hal.get_writes()[1..], [vec![7, 1, 90], vec![7, 4, 30]]);
        assert_eq!(session.mode(), Mode::FreeRun);
        assert_eq!(hal.read_attempts(), 0);
    }

    #[test]
    fn test_async_samples_reach_handler() {
        let seen: Arc<Mutex<Vec<(Samples, Channel)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let hal = MockHal::new();
        let mut session = AdsSession::with_observer(
            hal.clone(),
            SessionConfig::default(),
            FirmwareRegistry::new(),
            Arc::new(move |s: &Samples, c: Channel| sink.lock().unwrap().push((*s, c))),
            Arc::new(NullObserver),
        );
        hal.queue_packet(device_id(DeviceType::OneAxisV1));
        session.init().unwrap();
        session.set_stretch_enabled(true).unwrap();

        hal.queue_packet(Packet::sample(PacketType::BendSample, 64));
        hal.queue_packet(Packet::reply(PacketType::FirmwareVersion, [1, 0]));
        hal.queue_packet(Packet::sample(PacketType::StretchSample, 320));
        assert!(hal.fire_signal());
        assert!(hal.fire_signal());
        assert!(hal.fire_signal());

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1], (Samples { bend: 1.0, stretch: 5.0 }, Channel::Stretch));
    }

    #[test]
    fn test_init_with_auto_update_against_simulator() {
        let sim = SimulatedDevice::new(DeviceType::OneAxisV2, 3);
        let mut registry = FirmwareRegistry::new();
        let image: Vec<u8> = (0..777u32).map(|i| (i * 7) as u8).collect();
        registry.insert(DeviceType::OneAxisV2, FirmwareImage::new(4, image.clone()));

        let config = SessionConfig {
            auto_update: true,
            sample_rate: SampleRate::Hz200,
            ..Default::default()
        };
        let mut session = AdsSession::with_observer(
            sim.clone(),
            config,
            registry,
            Arc::new(NullHandler),
            Arc::new(NullObserver),
        );

        assert_eq!(session.init().unwrap(), DeviceType::OneAxisV2);
        assert_eq!(sim.flashed_image(), Some(image));
        assert_eq!(sim.sample_ticks(), 81);
        assert_eq!(session.address(), DEFAULT_ADDRESS);
        assert_eq!(session.mode(), Mode::Idle);
    }

    #[test]
    fn test_free_run_against_simulator() {
        let sim = SimulatedDevice::new(DeviceType::OneAxisV1, 1);
        let seen: Arc<Mutex<Vec<f32>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut session = AdsSession::with_observer(
            sim.clone(),
            SessionConfig::default(),
            FirmwareRegistry::new(),
            Arc::new(move |s: &Samples, _c: Channel| sink.lock().unwrap().push(s.bend)),
            Arc::new(NullObserver),
        );
        session.init().unwrap();
        sim.set_angle(45.0);
        session.set_run(true).unwrap();

        assert!(sim.tick());
        assert!(sim.tick());
        session.set_run(false).unwrap();
        assert!(!sim.tick());

        assert_eq!(*seen.lock().unwrap(), vec![45.0, 45.0]);
    }

    #[test]
    fn test_reinit_clears_stretch_channel() {
        let sim = SimulatedDevice::new(DeviceType::OneAxisV1, 1);
        let mut session = AdsSession::with_observer(
            sim.clone(),
            SessionConfig::default(),
            FirmwareRegistry::new(),
            Arc::new(NullHandler),
            Arc::new(NullObserver),
        );
        session.init().unwrap();
        session.set_stretch_enabled(true).unwrap();
        assert!(sim.stretch_enabled());
        sim.set_stretch(5.0);
        session.set_run(true).unwrap();
        assert!(sim.tick());
        assert!(sim.tick());
        assert_eq!(session.samples().stretch, 5.0);

        session.init().unwrap();
        assert!(!sim.stretch_enabled());
        sim.set_angle(10.0);
        session.set_run(true).unwrap();
        assert!(sim.tick());

        assert_eq!(session.samples(), Samples { bend: 10.0, stretch: 0.0 });
    }

    #[test]
    fn test_calibration_and_version_against_simulator() {
        let sim = SimulatedDevice::new(DeviceType::OneAxisV1, 3);
        let mut registry = FirmwareRegistry::new();
        registry.insert(DeviceType::OneAxisV1, FirmwareImage::new(4, vec![0u8; 10]));
        let mut session = AdsSession::with_observer(
            sim.clone(),
            SessionConfig::default(),
            registry,
            Arc::new(NullHandler),
            Arc::new(NullObserver),
        );
        session.init().unwrap();
        // Reset, id response, settle, sample-rate settle.
        assert_eq!(sim.elapsed_ms(), 106);

        session.calibrate(CalibrationStep::First, 0).unwrap();
        session.calibrate(CalibrationStep::Second, 90).unwrap();
        assert_eq!(
            sim.calibrations(),
            vec![(CalibrationStep::First, 0), (CalibrationStep::Second, 90)]
        );

        assert_eq!(session.get_firmware_version().unwrap(), 3);
        assert!(session.check_update_needed(DeviceType::OneAxisV1).unwrap());
        sim.set_firmware_version(4);
        assert!(!session.check_update_needed(DeviceType::OneAxisV1).unwrap());
    }

    #[test]
    fn test_session_follows_device_to_new_address() {
        let sim = SimulatedDevice::new(DeviceType::OneAxisV1, 1);
        let mut session = AdsSession::with_observer(
            sim.clone(),
            SessionConfig::default(),
            FirmwareRegistry::new(),
            Arc::new(NullHandler),
            Arc::new(NullObserver),
        );
        session.init().unwrap();
        session.set_address(0x33).unwrap();

        assert_eq!(sim.device_address(), 0x33);
        assert_eq!(session.get_device_id().unwrap(), DeviceType::OneAxisV1);
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ads.toml");
        let config = SessionConfig {
            address: Some(0x14),
            reset_pin: 5,
            ready_pin: 6,
            sample_rate: SampleRate::Hz333,
            auto_update: true,
            bootloader_address: BOOTLOADER_ADDRESS,
            firmware: vec![FirmwareEntry {
                variant: DeviceType::OneAxisV1,
                version: 9,
                path: "fw/ads_fw.bin".into(),
            }],
        };
        config.save_to_file(&path).unwrap();
        assert_eq!(SessionConfig::load_from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_config_partial_toml_uses_defaults() {
        let config: SessionConfig = toml::from_str(
            r#"
            sample_rate = "hz500"
            address = 0x13

            [[firmware]]
            variant = "one-axis-v2"
            version = 2
            path = "ads_fw_v2.bin"
            "#,
        )
        .unwrap();

        assert_eq!(config.sample_rate, SampleRate::Hz500);
        assert_eq!(config.address, Some(0x13));
        assert!(!config.auto_update);
        assert_eq!(config.firmware[0].variant, DeviceType::OneAxisV2);
    }
}
