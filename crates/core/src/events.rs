//! Event System
//!
//! Provides a pub/sub event bus carrying the container lifecycle signals.

use std::sync::{Arc, Weak};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::RwLock;
use tracing::debug;

use crate::bridge::SharedBridge;
use crate::config::AndroidSdk;
use crate::device::Device;

/// Lifecycle signals exchanged with the surrounding framework
#[derive(Debug, Clone)]
pub enum Event {
    /// Container configuration is loaded and the SDK is known
    ContainerConfigured { sdk: AndroidSdk, force: bool },
    /// A virtual device is available to be started
    VirtualDeviceAvailable,
    /// The device is being shut down
    DeviceShutdown,
    /// The bridge is connected and published
    BridgeInitialized(SharedBridge),
    /// The bridge was disconnected
    BridgeTerminated,
    /// Request to provision the auxiliary storage image
    SdCardCreate { spec: Option<String> },
    /// The emulator is online and booted
    DeviceReady(Device),
}

impl Event {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Event::ContainerConfigured { .. } => "ContainerConfigured",
            Event::VirtualDeviceAvailable => "VirtualDeviceAvailable",
            Event::DeviceShutdown => "DeviceShutdown",
            Event::BridgeInitialized(_) => "BridgeInitialized",
            Event::BridgeTerminated => "BridgeTerminated",
            Event::SdCardCreate { .. } => "SdCardCreate",
            Event::DeviceReady(_) => "DeviceReady",
        }
    }
}

/// Subscriber handle for receiving events
#[derive(Clone)]
pub struct EventSubscription {
    receiver: Receiver<Event>,
    _alive: Arc<()>,
}

impl EventSubscription {
    /// Receive the next event (blocking)
    pub fn recv(&self) -> Result<Event, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking)
    pub fn try_recv(&self) -> Result<Event, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Drain every event received so far
    pub fn drain(&self) -> Vec<Event> {
        self.receiver.try_iter().collect()
    }
}

struct Subscriber {
    sender: Sender<Event>,
    alive: Weak<()>,
}

/// Event bus for publish/subscribe pattern
pub struct EventBus {
    subscribers: RwLock<Vec<Subscriber>>,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> EventSubscription {
        let (sender, receiver) = unbounded();
        let alive = Arc::new(());
        self.subscribers.write().push(Subscriber {
            sender,
            alive: Arc::downgrade(&alive),
        });
        EventSubscription {
            receiver,
            _alive: alive,
        }
    }

    /// Emit an event to all subscribers
    ///
    /// Subscribers whose receiving side has been dropped are pruned.
    pub fn emit(&self, event: Event) -> usize {
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|s| s.sender.send(event.clone()).is_ok());
        let delivered = subscribers.len();

        debug!("Event {} delivered to {} subscribers", event.name(), delivered);
        delivered
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Drop subscribers whose subscription is gone, returning how many
    pub fn cleanup(&self) -> usize {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|s| s.alive.strong_count() > 0);
        before - subscribers.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceState;

    #[test]
    fn test_event_bus() {
        let bus = EventBus::new();
        let sub1 = bus.subscribe();
        let sub2 = bus.subscribe();

        assert_eq!(bus.subscriber_count(), 2);

        let delivered = bus.emit(Event::BridgeTerminated);
        assert_eq!(delivered, 2);

        assert!(sub1.try_recv().is_ok());
        assert!(sub2.try_recv().is_ok());
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let bus = EventBus::new();
        let kept = bus.subscribe();
        drop(bus.subscribe());

        assert_eq!(bus.emit(Event::VirtualDeviceAvailable), 1);
        assert_eq!(bus.subscriber_count(), 1);
        assert!(kept.try_recv().is_ok());
    }

    #[test]
    fn test_cleanup_without_emitting() {
        let bus = EventBus::new();
        let kept = bus.subscribe();
        let cloned = kept.clone();
        drop(bus.subscribe());

        assert_eq!(bus.cleanup(), 1);
        assert_eq!(bus.subscriber_count(), 1);

        drop(kept);
        assert_eq!(bus.cleanup(), 0);

        drop(cloned);
        assert_eq!(bus.cleanup(), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_drain_keeps_emission_order() {
        let bus = EventBus::new();
        let sub = bus.subscribe();

        bus.emit(Event::SdCardCreate { spec: None });
        bus.emit(Event::DeviceReady(Device::new("emulator-5554", DeviceState::Online)));

        let names: Vec<_> = sub.drain().iter().map(Event::name).collect();
        assert_eq!(names, vec!["SdCardCreate", "DeviceReady"]);
        assert!(sub.try_recv().is_err());
    }
}
