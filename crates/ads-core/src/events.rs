//! Event system for firmware update progress.
//!
//! Lets the CLI (or any host application) follow an update without the
//! engine knowing how progress is displayed.

use crate::protocol::DeviceType;
use crate::state::DfuState;

/// Events emitted by the DFU engine.
#[derive(Debug, Clone)]
pub enum DfuEvent {
    /// Transfer state changed.
    StateChanged { from: DfuState, to: DfuState },
    /// Bus address switched for (or restored after) the bootloader session.
    AddressChanged { from: u8, to: u8 },
    /// Bytes acknowledged by the bootloader so far.
    Progress { current: u64, total: u64 },
    /// Acknowledgment received after this many reads.
    AckReceived { attempts: u8 },
    /// Acknowledgment poll exhausted.
    AckTimeout { attempts: u8 },
    /// Update finished successfully.
    Complete { variant: DeviceType, bytes: usize },
    /// Update aborted.
    Failed { message: String },
}

/// Observer trait for receiving DFU events.
pub trait DfuObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &DfuEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl DfuObserver for NullObserver {
    fn on_event(&self, _event: &DfuEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl DfuObserver for TracingObserver {
    fn on_event(&self, event: &DfuEvent) {
        match event {
            DfuEvent::StateChanged { from, to } => {
                tracing::info!(from = %from, to = %to, "DFU state changed");
            }
            DfuEvent::AddressChanged { from, to } => {
                tracing::info!(
                    from = %format!("0x{:02X}", from),
                    to = %format!("0x{:02X}", to),
                    "Bus address changed"
                );
            }
            DfuEvent::Progress { current, total } => {
                let pct = if *total > 0 {
                    (*current * 100) / *total
                } else {
                    0
                };
                tracing::debug!(progress = %format!("{}%", pct), current, total, "DFU progress");
            }
            DfuEvent::AckReceived { attempts } => {
                tracing::trace!(attempts, "Bootloader ACK");
            }
            DfuEvent::AckTimeout { attempts } => {
                tracing::warn!(attempts, "Bootloader ACK timeout");
            }
            DfuEvent::Complete { variant, bytes } => {
                tracing::info!(variant = %variant, bytes, "Firmware update complete");
            }
            DfuEvent::Failed { message } => {
                tracing::error!("Firmware update failed: {}", message);
            }
        }
    }
}
