// Core data models and structures
// This file defines the flag set, peer view types, and configuration wrapper

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use brickpool_common::local_ip;

/// State flags a conversation can carry
///
/// The flags are not mutually exclusive; a conversation holds any subset of
/// them at a time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Flag {
    /// The peer relation has been established
    Connected,
    /// The peer has advertised both its address and its brick list
    Available,
    /// The last observed advertisement contained bricks not previously cached
    BricksAvailable,
    /// The last observed advertisement dropped bricks that were previously cached
    BricksRemoved,
}

impl Flag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Flag::Connected => "connected",
            Flag::Available => "available",
            Flag::BricksAvailable => "bricks.available",
            Flag::BricksRemoved => "bricks.removed",
        }
    }
}

impl Display for Flag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Flag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "connected" => Ok(Flag::Connected),
            "available" => Ok(Flag::Available),
            "bricks.available" => Ok(Flag::BricksAvailable),
            "bricks.removed" => Ok(Flag::BricksRemoved),
            _ => Err(format!("Invalid flag: {}", s)),
        }
    }
}

/// The set of state flags held by one conversation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagSet {
    pub connected: bool,
    pub available: bool,
    pub bricks_available: bool,
    pub bricks_removed: bool,
}

impl FlagSet {
    pub fn set(&mut self, flag: Flag) {
        match flag {
            Flag::Connected => self.connected = true,
            Flag::Available => self.available = true,
            Flag::BricksAvailable => self.bricks_available = true,
            Flag::BricksRemoved => self.bricks_removed = true,
        }
    }

    pub fn clear(&mut self, flag: Flag) {
        match flag {
            Flag::Connected => self.connected = false,
            Flag::Available => self.available = false,
            Flag::BricksAvailable => self.bricks_available = false,
            Flag::BricksRemoved => self.bricks_removed = false,
        }
    }

    pub fn contains(&self, flag: Flag) -> bool {
        match flag {
            Flag::Connected => self.connected,
            Flag::Available => self.available,
            Flag::BricksAvailable => self.bricks_available,
            Flag::BricksRemoved => self.bricks_removed,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.connected || self.available || self.bricks_available || self.bricks_removed)
    }

    /// The flags currently held, in declaration order
    pub fn active(&self) -> Vec<Flag> {
        [
            Flag::Connected,
            Flag::Available,
            Flag::BricksAvailable,
            Flag::BricksRemoved,
        ]
        .into_iter()
        .filter(|f| self.contains(*f))
        .collect()
    }
}

/// Merged per-peer view surfaced by `peer_info`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerView {
    /// Advertised address under the requested address key, if any
    pub address: Option<String>,
    /// Advertised brick device paths, empty when none
    pub bricks: Vec<String>,
}

/// Decode a relation-channel brick value into a list of device paths
///
/// The wire contract is a JSON array of strings; anything else (absent,
/// null, wrong type) decodes as the empty list.
pub fn bricks_from_value(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Encode a list of device paths as its relation-channel value
pub fn bricks_to_value(bricks: &[String]) -> Value {
    Value::Array(bricks.iter().map(|b| Value::String(b.clone())).collect())
}

/// Whether a relation-channel value counts as empty for value collection
///
/// Null, the empty string, the empty array, and the empty object are empty;
/// everything else is a value worth surfacing.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// Application configuration wrapper
/// Provides access to configuration values for the convergence engine
#[derive(Clone, Debug)]
pub struct Configuration {
    pub config: config::Config,
}

impl Configuration {
    /// Create a new configuration from a Config instance
    pub fn from_config(config: config::Config) -> Self {
        Self { config }
    }

    /// Get the local unit name (default: hostname)
    pub fn unit_name(&self) -> String {
        self.config
            .get_string("brickpool.unit.name")
            .unwrap_or_else(|_| {
                hostname::get()
                    .ok()
                    .and_then(|h| h.into_string().ok())
                    .unwrap_or_else(|| "localhost".to_string())
            })
    }

    /// Get the durable unit store path (default: data/peer-cache.json)
    pub fn store_path(&self) -> String {
        self.config
            .get_string("brickpool.store.path")
            .unwrap_or_else(|_| "data/peer-cache.json".to_string())
    }

    /// Get the address this unit advertises (default: first non-loopback IPv4)
    pub fn advertise_address(&self) -> String {
        self.config
            .get_string("brickpool.advertise.address")
            .unwrap_or_else(|_| local_ip())
    }

    /// Get the default address type (default: private)
    pub fn address_type(&self) -> String {
        self.config
            .get_string("brickpool.address.type")
            .unwrap_or_else(|_| "private".to_string())
    }

    /// Get the peer event queue size (default: 1024)
    pub fn event_queue_size(&self) -> usize {
        self.config
            .get_int("brickpool.event.queue.size")
            .unwrap_or(1024) as usize
    }
}
