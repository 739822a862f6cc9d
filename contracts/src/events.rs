//! Structured events emitted on every committed state change.
//!
//! Events go out on a `tokio::sync::broadcast` channel. Publishing never
//! fails: with no subscribers the event is dropped, and a subscriber that
//! falls behind by more than the channel capacity sees `RecvError::Lagged`
//! instead of stalling the registry.
//!
//! The JSON shape is internally tagged:
//!
//! ```json
//! {"type":"recovery_committed","did":"ab..","epoch":2,...}
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use bftdid_protocol::identity::{DidId, DocRef, Identity};

/// A committed change to registry state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RegistryEvent {
    #[serde(rename = "did_created")]
    DidCreated {
        did: DidId,
        controller: Identity,
        doc_ref: DocRef,
    },

    /// Controller or document changed, by an update or by a recovery.
    #[serde(rename = "did_updated")]
    DidUpdated {
        did: DidId,
        controller: Identity,
        doc_ref: DocRef,
        version: u64,
    },

    #[serde(rename = "did_deactivated")]
    DidDeactivated { did: DidId, version: u64 },

    #[serde(rename = "watcher_set_updated")]
    WatcherSetUpdated {
        did: DidId,
        epoch: u64,
        threshold: u32,
        watchers: usize,
    },

    #[serde(rename = "recovery_committed")]
    RecoveryCommitted {
        did: DidId,
        epoch: u64,
        previous_controller: Identity,
        new_controller: Identity,
        signers: usize,
    },
}

impl RegistryEvent {
    /// The DID this event concerns.
    pub fn did(&self) -> DidId {
        match self {
            RegistryEvent::DidCreated { did, .. }
            | RegistryEvent::DidUpdated { did, .. }
            | RegistryEvent::DidDeactivated { did, .. }
            | RegistryEvent::WatcherSetUpdated { did, .. }
            | RegistryEvent::RecoveryCommitted { did, .. } => *did,
        }
    }
}

/// Fan-out of [`RegistryEvent`]s to any number of subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<RegistryEvent>,
}

impl EventBus {
    /// A zero `capacity` is raised to 1.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: RegistryEvent) {
        // Err only means nobody is listening right now.
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_capacity_still_delivers() {
        let bus = EventBus::new(0);
        let mut rx = bus.subscribe();
        bus.publish(RegistryEvent::DidDeactivated {
            did: DidId::from_bytes([2; 32]),
            version: 1,
        });
        assert!(matches!(
            rx.try_recv(),
            Ok(RegistryEvent::DidDeactivated { version: 1, .. })
        ));
    }

    #[test]
    fn json_is_tagged() {
        let event = RegistryEvent::WatcherSetUpdated {
            did: DidId::from_bytes([1; 32]),
            epoch: 4,
            threshold: 3,
            watchers: 4,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "watcher_set_updated");
        assert_eq!(json["epoch"], 4);
        assert_eq!(json["did"], "01".repeat(32));
        let back: RegistryEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let bus = EventBus::new(4);
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(RegistryEvent::DidDeactivated {
            did: DidId::ZERO,
            version: 1,
        });
    }

    #[tokio::test]
    async fn subscribers_receive_in_order() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        for version in 1..=3 {
            bus.publish(RegistryEvent::DidDeactivated {
                did: DidId::ZERO,
                version,
            });
        }
        for version in 1..=3 {
            match rx.recv().await.unwrap() {
                RegistryEvent::DidDeactivated { version: v, .. } => assert_eq!(v, version),
                other => panic!("unexpected event {other:?}"),
            }
        }
    }
}
