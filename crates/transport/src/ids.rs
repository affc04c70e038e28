//! Strongly typed identifiers shared across the transport layer.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Logical channel a payload is sent on. Channel semantics (reliability,
/// ordering) are defined by the transport implementation.
pub type ChannelId = u8;

/// Identifier of a single server-side connection.
///
/// Connection ids are only meaningful relative to the transport that issued
/// them; layers that aggregate several transports re-key them before handing
/// them out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self(0)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
