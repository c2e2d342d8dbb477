//! Sample dispatch from the sample-ready context.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{trace, warn};

use crate::protocol::{Packet, PacketType, ticks_to_sample};

/// Which measurement a sample belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Angular displacement, degrees.
    Bend,
    /// Linear displacement, millimetres.
    Stretch,
}

impl Channel {
    pub fn from_packet_type(kind: PacketType) -> Option<Self> {
        match kind {
            PacketType::BendSample => Some(Channel::Bend),
            PacketType::StretchSample => Some(Channel::Stretch),
            _ => None,
        }
    }
}

/// Latest value of both channels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Samples {
    pub bend: f32,
    pub stretch: f32,
}

impl Samples {
    pub fn get(&self, channel: Channel) -> f32 {
        match channel {
            Channel::Bend => self.bend,
            Channel::Stretch => self.stretch,
        }
    }

    fn set(&mut self, channel: Channel, value: f32) {
        match channel {
            Channel::Bend => self.bend = value,
            Channel::Stretch => self.stretch = value,
        }
    }
}

/// Application hook for new samples.
///
/// Called from the HAL's sample-ready context, so implementations should
/// return quickly.
pub trait SampleHandler: Send + Sync {
    fn on_sample(&self, samples: &Samples, channel: Channel);
}

impl<F> SampleHandler for F
where
    F: Fn(&Samples, Channel) + Send + Sync,
{
    fn on_sample(&self, samples: &Samples, channel: Channel) {
        self(samples, channel)
    }
}

/// Handler that discards all samples.
pub struct NullHandler;

impl SampleHandler for NullHandler {
    fn on_sample(&self, _samples: &Samples, _channel: Channel) {}
}

/// Classify a packet as a sample, returning its channel and scaled value.
pub fn classify(packet: &Packet) -> Option<(Channel, f32)> {
    let channel = Channel::from_packet_type(packet.kind().ok()?)?;
    Some((channel, ticks_to_sample(packet.payload_i16())))
}

/// Turns raw sample packets into handler calls.
pub struct SampleDispatcher {
    handler: Arc<dyn SampleHandler>,
    samples: Mutex<Samples>,
    stretch_enabled: AtomicBool,
}

impl SampleDispatcher {
    pub fn new(handler: Arc<dyn SampleHandler>) -> Self {
        Self {
            handler,
            samples: Mutex::new(Samples::default()),
            stretch_enabled: AtomicBool::new(false),
        }
    }

    /// While stretch is off, the stretch channel reads zero.
    pub fn set_stretch_enabled(&self, enabled: bool) {
        self.stretch_enabled.store(enabled, Ordering::Release);
    }

    pub fn samples(&self) -> Samples {
        *self.samples.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store a sample without notifying the handler.
    pub fn record(&self, channel: Channel, value: f32) -> Samples {
        let mut samples = self.samples.lock().unwrap_or_else(|e| e.into_inner());
        if !self.stretch_enabled.load(Ordering::Acquire) {
            samples.stretch = 0.0;
        }
        samples.set(channel, value);
        *samples
    }

    /// Handle one packet from the sample-ready context.
    ///
    /// Non-sample packets are dropped: there is no way to report an error
    /// back to the interrupt context. Returns the channel that was updated.
    pub fn dispatch(&self, packet: Packet) -> Option<Channel> {
        let Some((channel, value)) = classify(&packet) else {
            warn!(?packet, "Dropping non-sample packet from sample-ready line");
            return None;
        };
        let snapshot = self.record(channel, value);
        trace!(?channel, value, "Sample");
        self.handler.on_sample(&snapshot, channel);
        Some(channel)
    }
}
