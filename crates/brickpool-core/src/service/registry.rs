// Conversation registry for peer relations
// One conversation per remote cluster member, holding the peer's advertised
// data, this node's outbound advertisements, and locally cached values

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde_json::Value;
use tracing::{debug, info};

use brickpool_common::{PoolError, Result, normalize_unit_name};

use crate::model::{Flag, FlagSet};

/// The two readable key/value views of a conversation
///
/// The remote view holds what the peer advertised and is read-only from this
/// side; the local view holds what this node caches about the peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataView {
    Remote,
    Local,
}

impl Display for DataView {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DataView::Remote => write!(f, "remote"),
            DataView::Local => write!(f, "local"),
        }
    }
}

/// Communication context for exactly one peer
#[derive(Clone, Debug, Default)]
pub struct Conversation {
    id: String,
    /// Stable unit name of the peer; absent during the departing-peer race
    scope: Option<String>,
    /// Data the peer advertised (transport-written, read-only here)
    remote: BTreeMap<String, Value>,
    /// Data this node advertises to the peer
    outbound: BTreeMap<String, Value>,
    /// Data this node caches about the peer
    local: BTreeMap<String, Value>,
    flags: FlagSet,
}

impl Conversation {
    pub fn new(id: &str, scope: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            scope: scope.map(str::to_string),
            ..Self::default()
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// Normalized peer name, or `None` while the scope is unknown
    pub fn peer_name(&self) -> Option<String> {
        self.scope.as_deref().map(normalize_unit_name)
    }

    /// Read a named field from the remote or local view
    pub fn get(&self, view: DataView, key: &str) -> Option<&Value> {
        match view {
            DataView::Remote => self.remote.get(key),
            DataView::Local => self.local.get(key),
        }
    }

    /// Write a named field into a view
    ///
    /// Only the local view is writable; a write against the remote view is a
    /// programming error and fails loudly.
    pub fn set(&mut self, view: DataView, key: &str, value: Value) -> Result<()> {
        match view {
            DataView::Remote => Err(PoolError::ReadOnlyView(key.to_string())),
            DataView::Local => {
                self.local.insert(key.to_string(), value);
                Ok(())
            }
        }
    }

    /// Advertise a named field to the peer
    pub fn publish(&mut self, key: &str, value: Value) {
        self.outbound.insert(key.to_string(), value);
    }

    /// Read back a field previously advertised to the peer
    pub fn published(&self, key: &str) -> Option<&Value> {
        self.outbound.get(key)
    }

    pub fn set_flag(&mut self, flag: Flag) {
        if !self.flags.contains(flag) {
            debug!("Conversation '{}' gained flag '{}'", self.id, flag);
        }
        self.flags.set(flag);
    }

    pub fn clear_flag(&mut self, flag: Flag) {
        if self.flags.contains(flag) {
            debug!("Conversation '{}' dropped flag '{}'", self.id, flag);
        }
        self.flags.clear(flag);
    }

    pub fn has_flag(&self, flag: Flag) -> bool {
        self.flags.contains(flag)
    }

    pub fn flags(&self) -> FlagSet {
        self.flags
    }

    /// Transport-side write into the remote view
    pub(crate) fn observe(&mut self, key: &str, value: Value) {
        self.remote.insert(key.to_string(), value);
    }

    pub(crate) fn set_scope(&mut self, scope: &str) {
        self.scope = Some(scope.to_string());
    }
}

/// The set of active peer conversations, keyed by conversation id
///
/// The transport drives the lifecycle: `open` on relation establishment,
/// `observe_remote` as peer advertisements arrive, `remove` once the
/// relation is fully torn down. Enumeration order is stable (keyed order).
#[derive(Debug, Default)]
pub struct ConversationRegistry {
    conversations: BTreeMap<String, Conversation>,
}

impl ConversationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a conversation for a newly established relation, or refresh
    /// the scope of an existing one
    pub fn open(&mut self, id: &str, scope: Option<&str>) -> &mut Conversation {
        let conversation = self
            .conversations
            .entry(id.to_string())
            .or_insert_with(|| {
                info!("Opened conversation '{}'", id);
                Conversation::new(id, None)
            });

        if let Some(scope) = scope {
            conversation.set_scope(scope);
        }

        conversation
    }

    /// Record a field the peer advertised
    pub fn observe_remote(&mut self, id: &str, key: &str, value: Value) -> Result<()> {
        match self.conversations.get_mut(id) {
            Some(conversation) => {
                conversation.observe(key, value);
                Ok(())
            }
            None => Err(PoolError::ConversationNotFound(id.to_string())),
        }
    }

    /// Drop a conversation whose relation is gone
    pub fn remove(&mut self, id: &str) -> Option<Conversation> {
        let removed = self.conversations.remove(id);
        if removed.is_some() {
            info!("Removed conversation '{}'", id);
        }
        removed
    }

    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.conversations.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Conversation> {
        self.conversations.get_mut(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Conversation> {
        self.conversations.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Conversation> {
        self.conversations.values_mut()
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }
}
