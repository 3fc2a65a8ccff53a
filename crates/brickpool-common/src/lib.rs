//! brickpool Common - Shared types, errors, and utilities
//!
//! This crate provides the foundational pieces used across all brickpool
//! components:
//! - Error types
//! - Wire-level key constants for the peer relation channel
//! - Utility functions

pub mod error;
pub mod utils;

// Re-exports for convenience
pub use error::{PoolError, Result};
pub use utils::{is_valid_unit_name, local_ip, normalize_unit_name};

/// Relation-channel key under which a unit advertises its brick list
pub const BRICKS_KEY: &str = "bricks";

/// Default relation-channel key under which a unit advertises its address
pub const PRIVATE_ADDRESS_KEY: &str = "private-address";

/// Suffix appended to an address type to form its relation-channel key,
/// e.g. `internal` advertises under `internal-address`
pub const ADDRESS_KEY_SUFFIX: &str = "-address";

/// Suffix appended to a normalized unit name to form its durable-cache key
pub const BRICKS_CACHE_SUFFIX: &str = ".bricks";

/// Build the relation-channel key for an address type
///
/// # Examples
///
/// ```
/// use brickpool_common::address_key;
///
/// assert_eq!(address_key("internal"), "internal-address");
/// assert_eq!(address_key("private"), "private-address");
/// ```
pub fn address_key(address_type: &str) -> String {
    format!("{}{}", address_type, ADDRESS_KEY_SUFFIX)
}

/// Build the durable-cache key for a unit's brick list
///
/// # Examples
///
/// ```
/// use brickpool_common::bricks_cache_key;
///
/// assert_eq!(bricks_cache_key("brickpool-0"), "brickpool-0.bricks");
/// ```
pub fn bricks_cache_key(unit: &str) -> String {
    format!("{}{}", unit, BRICKS_CACHE_SUFFIX)
}
