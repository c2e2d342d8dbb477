//! Exclusive access to the bus around synchronous exchanges.
//!
//! While a request/response exchange is waiting for its reply, the
//! sample-ready handler must not run: it would read the reply off the bus
//! and treat it as a sample. `SignalGuard` disarms the signal for its
//! lifetime and restores the previous state on drop, including when the
//! exchange bails out early with `?`.

use tracing::trace;

use crate::hal::AdsHal;

pub struct SignalGuard<'a, H: AdsHal + ?Sized> {
    hal: &'a H,
    restore: bool,
}

impl<'a, H: AdsHal + ?Sized> SignalGuard<'a, H> {
    /// Disarm the signal; `restore` is the state to put back on drop.
    pub fn acquire(hal: &'a H, restore: bool) -> Self {
        trace!("Sample signal disarmed");
        hal.enable_signal(false);
        Self { hal, restore }
    }
}

impl<H: AdsHal + ?Sized> Drop for SignalGuard<'_, H> {
    fn drop(&mut self) {
        trace!(enable = self.restore, "Sample signal restored");
        self.hal.enable_signal(self.restore);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::{HalError, MockHal};

    fn failing_exchange(hal: &MockHal) -> Result<(), HalError> {
        let _guard = SignalGuard::acquire(hal, true);
        hal.read_packet()?;
        Ok(())
    }

    #[test]
    fn test_guard_restores_on_error() {
        let hal = MockHal::new();
        assert!(failing_exchange(&hal).is_err());
        assert_eq!(hal.signal_log(), vec![false, true]);
        assert!(hal.signal_enabled());
    }

    #[test]
    fn test_guard_keeps_disabled_signal_disabled() {
        let hal = MockHal::new();
        drop(SignalGuard::acquire(&hal, false));
        assert_eq!(hal.signal_log(), vec![false, false]);
    }
}
