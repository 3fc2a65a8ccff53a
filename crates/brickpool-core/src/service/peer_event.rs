// Peer change event handling
// Reports observed peer transitions to the owning application; this layer
// detects and publishes, it never decides what to do about a change

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Type of peer change event
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PeerChangeType {
    /// A peer relation was established
    PeerJoined,
    /// A peer's address and brick list are both known
    PeerAvailable,
    /// A peer's advertised brick set differs from the last observation
    BricksChanged,
    /// A peer relation was torn down
    PeerDeparted,
}

impl std::fmt::Display for PeerChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeerChangeType::PeerJoined => write!(f, "PEER_JOINED"),
            PeerChangeType::PeerAvailable => write!(f, "PEER_AVAILABLE"),
            PeerChangeType::BricksChanged => write!(f, "BRICKS_CHANGED"),
            PeerChangeType::PeerDeparted => write!(f, "PEER_DEPARTED"),
        }
    }
}

/// Peer change event
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PeerChangeEvent {
    /// Type of change
    pub change_type: PeerChangeType,
    /// Normalized name of the affected peer
    pub peer: String,
    /// Brick paths that appeared in this observation
    pub added: Vec<String>,
    /// Brick paths that disappeared in this observation
    pub removed: Vec<String>,
    /// Timestamp of the event
    pub timestamp: i64,
}

impl PeerChangeEvent {
    pub fn peer_joined(peer: &str) -> Self {
        Self::new(PeerChangeType::PeerJoined, peer, vec![], vec![])
    }

    pub fn peer_available(peer: &str) -> Self {
        Self::new(PeerChangeType::PeerAvailable, peer, vec![], vec![])
    }

    pub fn bricks_changed(peer: &str, added: Vec<String>, removed: Vec<String>) -> Self {
        Self::new(PeerChangeType::BricksChanged, peer, added, removed)
    }

    pub fn peer_departed(peer: &str) -> Self {
        Self::new(PeerChangeType::PeerDeparted, peer, vec![], vec![])
    }

    fn new(
        change_type: PeerChangeType,
        peer: &str,
        added: Vec<String>,
        removed: Vec<String>,
    ) -> Self {
        Self {
            change_type,
            peer: peer.to_string(),
            added,
            removed,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Trait for handling peer change events
pub trait PeerChangeListener: Send + Sync {
    /// Called when a peer change event occurs
    fn on_peer_change(&self, event: &PeerChangeEvent);
}

/// Peer change event publisher
/// Manages subscriptions and broadcasts events to listeners
pub struct PeerChangeEventPublisher {
    /// Broadcast sender for events
    broadcast_tx: broadcast::Sender<PeerChangeEvent>,
    /// Registered listeners
    listeners: RwLock<Vec<Arc<dyn PeerChangeListener>>>,
}

impl PeerChangeEventPublisher {
    /// Create a new event publisher
    pub fn new(queue_size: usize) -> Self {
        let (broadcast_tx, _) = broadcast::channel(queue_size);

        Self {
            broadcast_tx,
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Register a listener for peer change events
    pub fn register_listener(&self, listener: Arc<dyn PeerChangeListener>) {
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        listeners.push(listener);
        debug!("Registered peer change listener, total: {}", listeners.len());
    }

    /// Publish a peer change event
    pub fn publish(&self, event: PeerChangeEvent) {
        debug!(
            "Publishing peer change event: {} for {}",
            event.change_type, event.peer
        );

        // Broadcast to subscribers; send fails only when nobody listens
        let _ = self.broadcast_tx.send(event.clone());

        let listeners = self.listeners.read().unwrap_or_else(|e| e.into_inner());
        for listener in listeners.iter() {
            listener.on_peer_change(&event);
        }
    }

    /// Subscribe to peer change events
    pub fn subscribe(&self) -> broadcast::Receiver<PeerChangeEvent> {
        self.broadcast_tx.subscribe()
    }
}

impl std::fmt::Debug for PeerChangeEventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let listener_count = self
            .listeners
            .read()
            .map(|l| l.len())
            .unwrap_or_default();
        f.debug_struct("PeerChangeEventPublisher")
            .field("listeners", &listener_count)
            .finish()
    }
}

/// A simple logging listener for debugging
pub struct LoggingPeerChangeListener;

impl PeerChangeListener for LoggingPeerChangeListener {
    fn on_peer_change(&self, event: &PeerChangeEvent) {
        match event.change_type {
            PeerChangeType::PeerJoined => {
                info!("[PeerEvent] Peer joined: {}", event.peer);
            }
            PeerChangeType::PeerAvailable => {
                info!("[PeerEvent] Peer available: {}", event.peer);
            }
            PeerChangeType::BricksChanged => {
                info!(
                    "[PeerEvent] Bricks changed on {}: {} added, {} removed",
                    event.peer,
                    event.added.len(),
                    event.removed.len()
                );
            }
            PeerChangeType::PeerDeparted => {
                info!("[PeerEvent] Peer departed: {}", event.peer);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_publisher() {
        let publisher = PeerChangeEventPublisher::new(100);
        let mut receiver = publisher.subscribe();

        publisher.publish(PeerChangeEvent::peer_joined("brickpool-1"));

        let received = receiver.try_recv().unwrap();
        assert_eq!(received.change_type, PeerChangeType::PeerJoined);
        assert_eq!(received.peer, "brickpool-1");
    }

    #[test]
    fn test_listener_invocation() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct CountingListener(AtomicUsize);

        impl PeerChangeListener for CountingListener {
            fn on_peer_change(&self, _event: &PeerChangeEvent) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let publisher = PeerChangeEventPublisher::new(16);
        let listener = Arc::new(CountingListener(AtomicUsize::new(0)));
        publisher.register_listener(listener.clone());

        publisher.publish(PeerChangeEvent::peer_departed("brickpool-2"));
        publisher.publish(PeerChangeEvent::bricks_changed(
            "brickpool-2",
            vec!["/dev/sdd".to_string()],
            vec![],
        ));

        assert_eq!(listener.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_event_creation() {
        let join = PeerChangeEvent::peer_joined("brickpool-0");
        assert_eq!(join.change_type, PeerChangeType::PeerJoined);
        assert!(join.added.is_empty());

        let delta = PeerChangeEvent::bricks_changed(
            "brickpool-0",
            vec!["/dev/sdd".to_string()],
            vec!["/dev/sdb".to_string()],
        );
        assert_eq!(delta.change_type, PeerChangeType::BricksChanged);
        assert_eq!(delta.added, vec!["/dev/sdd".to_string()]);
        assert_eq!(delta.removed, vec!["/dev/sdb".to_string()]);
    }
}
