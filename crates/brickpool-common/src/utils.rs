//! Utility functions for brickpool
//!
//! Common helper functions used across the codebase.

use std::sync::LazyLock;

use if_addrs::IfAddr;

/// Regex pattern for validating unit names
static UNIT_NAME_PATTERN: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new("^[a-zA-Z0-9_.:/-]+$").expect("Invalid regex pattern"));

/// Validate that a string is a plausible unit name
///
/// Allowed characters: alphanumeric, underscore, dot, colon, hyphen, and the
/// path separator that `normalize_unit_name` rewrites.
///
/// # Examples
///
/// ```
/// use brickpool_common::is_valid_unit_name;
///
/// assert!(is_valid_unit_name("brickpool/0"));
/// assert!(is_valid_unit_name("storage-node.internal:1"));
/// assert!(!is_valid_unit_name("with spaces"));
/// assert!(!is_valid_unit_name(""));
/// ```
pub fn is_valid_unit_name(name: &str) -> bool {
    UNIT_NAME_PATTERN.is_match(name)
}

/// Normalize a unit name for display and map keys
///
/// Path separators are rewritten to hyphens, so `brickpool/0` becomes
/// `brickpool-0`. Used for every peer identifier surfaced by aggregate
/// views and for durable-cache keys.
///
/// # Examples
///
/// ```
/// use brickpool_common::normalize_unit_name;
///
/// assert_eq!(normalize_unit_name("brickpool/0"), "brickpool-0");
/// assert_eq!(normalize_unit_name("storage-node"), "storage-node");
/// ```
pub fn normalize_unit_name(name: &str) -> String {
    name.replace('/', "-")
}

/// Get the local IP address
///
/// Returns the first non-loopback IPv4 address found,
/// or "127.0.0.1" as fallback.
pub fn local_ip() -> String {
    if_addrs::get_if_addrs()
        .ok()
        .and_then(|addrs| {
            addrs
                .into_iter()
                .find(|iface| !iface.is_loopback() && matches!(iface.addr, IfAddr::V4(_)))
                .and_then(|iface| match iface.addr {
                    IfAddr::V4(addr) => Some(addr.ip.to_string()),
                    _ => None,
                })
        })
        .unwrap_or_else(|| "127.0.0.1".to_string())
}
