// Peer convergence engine
// Consumes relation lifecycle events, applies completeness and brick-delta
// rules, and exposes aggregate views of the peer set

use std::collections::{BTreeMap, HashSet};

use serde_json::Value;
use tracing::{debug, info, warn};

use brickpool_common::{
    BRICKS_KEY, PoolError, Result, address_key, bricks_cache_key, is_valid_unit_name,
    normalize_unit_name,
};

use crate::model::{
    Configuration, Flag, PeerView, bricks_from_value, bricks_to_value, is_empty_value,
};

use super::{
    peer_event::{PeerChangeEvent, PeerChangeEventPublisher, PeerChangeListener},
    registry::{Conversation, ConversationRegistry, DataView},
    store::UnitStore,
};

const DEFAULT_EVENT_QUEUE_SIZE: usize = 1024;

/// Peer convergence engine
///
/// Owns the conversation registry and the durable unit store. The transport
/// feeds peer advertisements into the registry and invokes the `on_*` event
/// handlers; the owning application polls the aggregate views. Handlers and
/// commands take `&mut self`, so event processing is serialized by
/// construction.
#[derive(Debug)]
pub struct ConvergenceEngine<S: UnitStore> {
    local_unit: String,
    local_address: String,
    registry: ConversationRegistry,
    store: S,
    events: PeerChangeEventPublisher,
}

impl<S: UnitStore> ConvergenceEngine<S> {
    pub fn new(config: &Configuration, store: S) -> Result<Self> {
        Self::build(
            &config.unit_name(),
            &config.advertise_address(),
            config.event_queue_size(),
            store,
        )
    }

    /// Construct with an explicit identity instead of a configuration
    pub fn with_identity(unit_name: &str, local_address: &str, store: S) -> Result<Self> {
        Self::build(unit_name, local_address, DEFAULT_EVENT_QUEUE_SIZE, store)
    }

    fn build(
        unit_name: &str,
        local_address: &str,
        event_queue_size: usize,
        store: S,
    ) -> Result<Self> {
        if !is_valid_unit_name(unit_name) {
            return Err(PoolError::Config(format!(
                "invalid unit name '{}'",
                unit_name
            )));
        }

        let local_unit = normalize_unit_name(unit_name);
        info!(
            "Convergence engine for unit '{}' advertising {}",
            local_unit, local_address
        );

        Ok(Self {
            local_unit,
            local_address: local_address.to_string(),
            registry: ConversationRegistry::new(),
            store,
            events: PeerChangeEventPublisher::new(event_queue_size),
        })
    }

    // ===================== Relation lifecycle events =====================

    /// A peer relation was established; marks the conversation connected
    pub fn on_joined(&mut self, conversation_id: &str) {
        let Some(conversation) = self.registry.get_mut(conversation_id) else {
            debug!("Join event for unknown conversation '{}'", conversation_id);
            return;
        };

        conversation.set_flag(Flag::Connected);
        let peer = conversation.peer_name();

        if let Some(peer) = peer {
            info!("Peer '{}' joined", peer);
            self.events.publish(PeerChangeEvent::peer_joined(&peer));
        }
    }

    /// A peer changed its advertised data
    ///
    /// Runs brick-delta evaluation unconditionally, then marks the
    /// conversation available once both address and bricks are known.
    /// Idempotent: a repeat with unchanged remote data changes nothing.
    pub fn on_changed(&mut self, conversation_id: &str) -> Result<()> {
        let Some(conversation) = self.registry.get_mut(conversation_id) else {
            debug!("Change event for unknown conversation '{}'", conversation_id);
            return Ok(());
        };

        conversation.set_flag(Flag::Connected);
        let was_available = conversation.has_flag(Flag::Available);

        self.evaluate_brick_delta(conversation_id)?;

        if self.is_complete(conversation_id)
            && let Some(conversation) = self.registry.get_mut(conversation_id)
        {
            conversation.set_flag(Flag::Available);
            let peer = conversation.peer_name();
            if !was_available && let Some(peer) = peer {
                info!("Peer '{}' is available", peer);
                self.events.publish(PeerChangeEvent::peer_available(&peer));
            }
        }

        Ok(())
    }

    /// A peer relation is going away; clears connected, and clears available
    /// unless the remote data still satisfies the completeness predicate
    pub fn on_departed(&mut self, conversation_id: &str) {
        let complete = self.is_complete(conversation_id);

        let Some(conversation) = self.registry.get_mut(conversation_id) else {
            debug!(
                "Departure event for unknown conversation '{}'",
                conversation_id
            );
            return;
        };

        conversation.clear_flag(Flag::Connected);
        if !complete {
            conversation.clear_flag(Flag::Available);
        }
        let peer = conversation.peer_name();

        if let Some(peer) = peer {
            info!("Peer '{}' departed", peer);
            self.events.publish(PeerChangeEvent::peer_departed(&peer));
        }
    }

    /// A peer relation broke; same handling as departure
    pub fn on_broken(&mut self, conversation_id: &str) {
        self.on_departed(conversation_id);
    }

    // ===================== Completeness and brick delta =====================

    /// Whether the peer has advertised both its address and a non-empty
    /// brick list. Pure predicate, no side effects.
    pub fn is_complete(&self, conversation_id: &str) -> bool {
        self.registry
            .get(conversation_id)
            .is_some_and(conversation_complete)
    }

    /// Compare the peer's advertised brick set against the durably cached
    /// prior observation
    ///
    /// Raises `bricks.removed` for paths that disappeared and
    /// `bricks.available` for paths that appeared (both may be raised at
    /// once), then overwrites the cache with the new observation and flushes
    /// it in the same step. A cache write failure fails the event.
    pub fn evaluate_brick_delta(&mut self, conversation_id: &str) -> Result<()> {
        let Some(conversation) = self.registry.get(conversation_id) else {
            debug!(
                "Brick delta for unknown conversation '{}'",
                conversation_id
            );
            return Ok(());
        };
        let Some(peer) = conversation.peer_name() else {
            warn!(
                "Skipping brick delta for conversation '{}' with unknown scope",
                conversation_id
            );
            return Ok(());
        };

        let remote = bricks_from_value(conversation.get(DataView::Remote, BRICKS_KEY));
        let cache_key = bricks_cache_key(&peer);
        let cached = bricks_from_value(self.store.get(&cache_key)?.as_ref());
        let (added, removed) = brick_delta(&cached, &remote);

        self.store.set(&cache_key, bricks_to_value(&remote))?;
        self.store.flush()?;

        if added.is_empty() && removed.is_empty() {
            return Ok(());
        }

        if let Some(conversation) = self.registry.get_mut(conversation_id) {
            if !removed.is_empty() {
                info!("Peer '{}' dropped bricks: {:?}", peer, removed);
                conversation.set_flag(Flag::BricksRemoved);
            }
            if !added.is_empty() {
                info!("Peer '{}' offers new bricks: {:?}", peer, added);
                conversation.set_flag(Flag::BricksAvailable);
            }
        }

        self.events
            .publish(PeerChangeEvent::bricks_changed(&peer, added, removed));
        Ok(())
    }

    // ===================== Outbound commands =====================

    /// Advertise an address of the given type to every peer
    pub fn advertise_address(&mut self, address_type: &str, address: &str) {
        let key = address_key(address_type);
        debug!(
            "Advertising {}={} to {} conversations",
            key,
            address,
            self.registry.len()
        );

        for conversation in self.registry.iter_mut() {
            conversation.publish(&key, Value::String(address.to_string()));
        }
    }

    /// Advertise this unit's brick list to every peer and persist it as the
    /// local unit's own inventory
    pub fn advertise_bricks(&mut self, bricks: &[String]) -> Result<()> {
        let value = bricks_to_value(bricks);

        for conversation in self.registry.iter_mut() {
            conversation.publish(BRICKS_KEY, value.clone());
        }

        let cache_key = bricks_cache_key(&self.local_unit);
        self.store.set(&cache_key, value)?;
        self.store.flush()?;

        info!("Advertised {} local bricks for '{}'", bricks.len(), self.local_unit);
        Ok(())
    }

    /// Advertise an arbitrary settings mapping to every peer
    ///
    /// With `store_local`, the same mapping is also written into each
    /// conversation's own local view, one independent copy per conversation.
    pub fn broadcast(&mut self, settings: &BTreeMap<String, Value>, store_local: bool) -> Result<()> {
        debug!(
            "Broadcasting {} settings to {} conversations (store_local: {})",
            settings.len(),
            self.registry.len(),
            store_local
        );

        for conversation in self.registry.iter_mut() {
            for (key, value) in settings {
                conversation.publish(key, value.clone());
                if store_local {
                    conversation.set(DataView::Local, key, value.clone())?;
                }
            }
        }

        Ok(())
    }

    // ===================== Aggregate views =====================

    /// Peer addresses under the given address key, one entry per
    /// conversation with a known scope, in enumeration order
    pub fn address_map(&self, address_key: &str) -> Vec<(String, Option<String>)> {
        let mut nodes = Vec::new();

        for conversation in self.registry.iter() {
            let Some(peer) = conversation.peer_name() else {
                debug!(
                    "Skipping conversation '{}' with unknown scope",
                    conversation.id()
                );
                continue;
            };
            let address = conversation
                .get(DataView::Remote, address_key)
                .and_then(Value::as_str)
                .map(str::to_string);
            nodes.push((peer, address));
        }

        nodes
    }

    /// Bricks per peer, plus exactly one entry for the local unit sourced
    /// from the durable cache
    pub fn brick_map(&self) -> BTreeMap<String, Vec<String>> {
        let mut map = BTreeMap::new();

        for conversation in self.registry.iter() {
            let Some(peer) = conversation.peer_name() else {
                debug!(
                    "Skipping conversation '{}' with unknown scope",
                    conversation.id()
                );
                continue;
            };
            map.insert(
                peer,
                bricks_from_value(conversation.get(DataView::Remote, BRICKS_KEY)),
            );
        }

        map.insert(
            self.local_unit.clone(),
            self.cached_bricks(&bricks_cache_key(&self.local_unit)),
        );
        map
    }

    /// Merged address-and-bricks view per peer, including the local unit
    ///
    /// Conversations whose scope is unknown (a departing peer) are logged
    /// and skipped, never an error.
    pub fn peer_info(&self, address_key: &str) -> BTreeMap<String, PeerView> {
        let mut map = BTreeMap::new();

        for conversation in self.registry.iter() {
            let Some(peer) = conversation.peer_name() else {
                warn!(
                    "Skipping conversation '{}' with unknown scope",
                    conversation.id()
                );
                continue;
            };
            map.insert(
                peer,
                PeerView {
                    address: conversation
                        .get(DataView::Remote, address_key)
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    bricks: bricks_from_value(conversation.get(DataView::Remote, BRICKS_KEY)),
                },
            );
        }

        map.insert(
            self.local_unit.clone(),
            PeerView {
                address: Some(self.local_address.clone()),
                bricks: self.cached_bricks(&bricks_cache_key(&self.local_unit)),
            },
        );
        map
    }

    /// Non-empty values cached under `key` in any conversation's local view
    pub fn local_values(&self, key: &str) -> Vec<Value> {
        self.collect_values(DataView::Local, key)
    }

    /// Non-empty values advertised under `key` by any peer
    pub fn remote_values(&self, key: &str) -> Vec<Value> {
        self.collect_values(DataView::Remote, key)
    }

    fn collect_values(&self, view: DataView, key: &str) -> Vec<Value> {
        self.registry
            .iter()
            .filter_map(|conversation| conversation.get(view, key))
            .filter(|value| !is_empty_value(value))
            .cloned()
            .collect()
    }

    /// Counts of conversations per convergence stage
    pub fn summary(&self) -> PoolSummary {
        let mut summary = PoolSummary::default();

        for conversation in self.registry.iter() {
            summary.total += 1;
            if conversation.has_flag(Flag::Connected) {
                summary.connected += 1;
            }
            if conversation.has_flag(Flag::Available) {
                summary.available += 1;
            }
        }

        summary
    }

    fn cached_bricks(&self, key: &str) -> Vec<String> {
        match self.store.get(key) {
            Ok(value) => bricks_from_value(value.as_ref()),
            Err(e) => {
                warn!("Unit store read failed for '{}': {}", key, e);
                Vec::new()
            }
        }
    }

    // ===================== Accessors =====================

    /// Normalized name of the local unit
    pub fn local_unit(&self) -> &str {
        &self.local_unit
    }

    /// Address the local unit advertises
    pub fn local_address(&self) -> &str {
        &self.local_address
    }

    /// The conversation registry, for the transport to drive
    pub fn registry(&self) -> &ConversationRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ConversationRegistry {
        &mut self.registry
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Subscribe to peer change events
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<PeerChangeEvent> {
        self.events.subscribe()
    }

    /// Register a peer change listener
    pub fn register_listener(&self, listener: std::sync::Arc<dyn PeerChangeListener>) {
        self.events.register_listener(listener);
    }
}

/// Completeness predicate over one conversation's remote view
fn conversation_complete(conversation: &Conversation) -> bool {
    let has_address = conversation
        .get(DataView::Remote, brickpool_common::PRIVATE_ADDRESS_KEY)
        .and_then(Value::as_str)
        .is_some_and(|address| !address.is_empty());
    let has_bricks =
        !bricks_from_value(conversation.get(DataView::Remote, BRICKS_KEY)).is_empty();

    has_address && has_bricks
}

/// Set differences between the cached and newly observed brick lists,
/// as `(added, removed)` in observation order
fn brick_delta(cached: &[String], remote: &[String]) -> (Vec<String>, Vec<String>) {
    let cached_set: HashSet<&str> = cached.iter().map(String::as_str).collect();
    let remote_set: HashSet<&str> = remote.iter().map(String::as_str).collect();

    let added = remote
        .iter()
        .filter(|brick| !cached_set.contains(brick.as_str()))
        .cloned()
        .collect();
    let removed = cached
        .iter()
        .filter(|brick| !remote_set.contains(brick.as_str()))
        .cloned()
        .collect();

    (added, removed)
}

/// Pool convergence summary
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolSummary {
    pub total: usize,
    pub connected: usize,
    pub available: usize,
}

impl PoolSummary {
    pub fn all_available(&self) -> bool {
        self.available == self.total
    }
}
