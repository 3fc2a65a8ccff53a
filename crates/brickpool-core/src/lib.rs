//! brickpool Core - Peer membership and brick inventory convergence
//!
//! This crate provides:
//! - The conversation registry (one conversation per remote cluster member)
//! - The peer convergence engine (completeness and brick-delta rules,
//!   aggregate views, outbound advertisement)
//! - Durable unit store implementations
//! - Peer change event publishing

pub mod model;
pub mod service;

// Re-export commonly used types
pub use model::{Configuration, Flag, FlagSet, PeerView};
pub use service::engine::{ConvergenceEngine, PoolSummary};
pub use service::peer_event::{
    LoggingPeerChangeListener, PeerChangeEvent, PeerChangeEventPublisher, PeerChangeListener,
    PeerChangeType,
};
pub use service::registry::{Conversation, ConversationRegistry, DataView};
pub use service::store::{FileUnitStore, MemoryUnitStore, UnitStore};

// Re-export common functions
pub use brickpool_common::{local_ip, normalize_unit_name};
