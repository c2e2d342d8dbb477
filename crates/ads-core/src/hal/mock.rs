//! Scripted HAL for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use super::traits::{AdsHal, HalError, PacketCallback};
use crate::protocol::{DEFAULT_ADDRESS, Packet};

#[derive(Default)]
struct MockState {
    /// Queued replies returned by `read`, in order.
    read_queue: VecDeque<Vec<u8>>,
    /// Captured writes with the address they were sent to.
    write_log: Vec<(u8, Vec<u8>)>,
    /// Every `enable_signal` call.
    signal_log: Vec<bool>,
    signal_enabled: bool,
    delays: Vec<u16>,
    address: u8,
    read_attempts: usize,
    resets: usize,
    /// Writes with an index >= this fail.
    fail_writes_from: Option<usize>,
    callback: Option<PacketCallback>,
    pins: Option<(u32, u32)>,
}

/// Mock HAL for unit testing session and DFU logic.
///
/// Clones share state, so a test can keep a handle after moving one into a
/// session.
#[derive(Clone)]
pub struct MockHal {
    state: Arc<Mutex<MockState>>,
}

impl MockHal {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                address: DEFAULT_ADDRESS,
                ..Default::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// Queue raw bytes to be returned on the next read.
    pub fn queue_read(&self, bytes: &[u8]) {
        self.lock().read_queue.push_back(bytes.to_vec());
    }

    /// Queue a full reply packet.
    pub fn queue_packet(&self, packet: Packet) {
        self.queue_read(packet.as_bytes());
    }

    /// Queue `count` single-byte bootloader acknowledgments.
    pub fn queue_acks(&self, count: usize) {
        for _ in 0..count {
            self.queue_read(&[crate::protocol::DFU_ACK]);
        }
    }

    pub fn pending_reads(&self) -> usize {
        self.lock().read_queue.len()
    }

    /// Get all captured writes.
    pub fn get_writes(&self) -> Vec<Vec<u8>> {
        self.lock().write_log.iter().map(|(_, w)| w.clone()).collect()
    }

    /// Captured writes paired with the bus address they targeted.
    pub fn get_addressed_writes(&self) -> Vec<(u8, Vec<u8>)> {
        self.lock().write_log.clone()
    }

    pub fn clear_writes(&self) {
        self.lock().write_log.clear();
    }

    pub fn signal_log(&self) -> Vec<bool> {
        self.lock().signal_log.clone()
    }

    pub fn signal_enabled(&self) -> bool {
        self.lock().signal_enabled
    }

    pub fn delays(&self) -> Vec<u16> {
        self.lock().delays.clone()
    }

    pub fn read_attempts(&self) -> usize {
        self.lock().read_attempts
    }

    pub fn resets(&self) -> usize {
        self.lock().resets
    }

    pub fn pins(&self) -> Option<(u32, u32)> {
        self.lock().pins
    }

    /// Make every write fail.
    pub fn fail_writes(&self) {
        self.fail_writes_from(0);
    }

    /// Make the `index`-th write (0-based) and every later one fail.
    pub fn fail_writes_from(&self, index: usize) {
        self.lock().fail_writes_from = Some(index);
    }

    /// Simulate the sample-ready line firing: if armed, the next queued read
    /// is consumed and handed to the registered callback.
    ///
    /// Returns whether the callback ran.
    pub fn fire_signal(&self) -> bool {
        let (callback, bytes) = {
            let mut state = self.lock();
            if !state.signal_enabled {
                return false;
            }
            let Some(callback) = state.callback.clone() else {
                return false;
            };
            let Some(bytes) = state.read_queue.pop_front() else {
                return false;
            };
            (callback, bytes)
        };
        match Packet::from_bytes(&bytes) {
            Some(packet) => {
                callback(packet);
                true
            }
            None => false,
        }
    }
}

impl Default for MockHal {
    fn default() -> Self {
        Self::new()
    }
}

impl AdsHal for MockHal {
    fn init(
        &self,
        callback: PacketCallback,
        reset_pin: u32,
        ready_pin: u32,
    ) -> Result<(), HalError> {
        let mut state = self.lock();
        state.callback = Some(callback);
        state.pins = Some((reset_pin, ready_pin));
        state.signal_enabled = true;
        Ok(())
    }

    fn delay(&self, ms: u16) {
        self.lock().delays.push(ms);
    }

    fn write(&self, data: &[u8]) -> Result<(), HalError> {
        let mut state = self.lock();
        let index = state.write_log.len();
        if state.fail_writes_from.is_some_and(|from| index >= from) {
            return Err(HalError::Nack {
                address: state.address,
            });
        }
        let address = state.address;
        state.write_log.push((address, data.to_vec()));
        Ok(())
    }

    fn read(&self, len: usize) -> Result<Vec<u8>, HalError> {
        let mut state = self.lock();
        state.read_attempts += 1;
        let bytes = state.read_queue.pop_front().unwrap_or_default();
        if bytes.len() != len {
            return Err(HalError::ShortRead {
                expected: len,
                actual: bytes.len(),
            });
        }
        Ok(bytes)
    }

    fn reset(&self) {
        self.lock().resets += 1;
    }

    fn address(&self) -> u8 {
        self.lock().address
    }

    fn set_address(&self, address: u8) {
        self.lock().address = address;
    }

    fn enable_signal(&self, enable: bool) {
        let mut state = self.lock();
        state.signal_log.push(enable);
        state.signal_enabled = enable;
    }
}
