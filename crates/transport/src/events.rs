//! Event and capability types surfaced by transport implementations.

use bytes::Bytes;

use crate::ids::{ChannelId, ConnectionId};

/// Reasons why a peer might be disconnected from the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    Graceful,
    Timeout,
    Kicked,
    TransportError,
}

/// Client-side events emitted by a transport implementation.
#[derive(Debug)]
pub enum ClientEvent {
    /// The connection to the server was established.
    Connected,
    /// A payload arrived from the server.
    Message { channel: ChannelId, payload: Bytes },
    /// The connection to the server was closed.
    Disconnected { reason: DisconnectReason },
}

/// Server-side events emitted by a transport implementation.
///
/// Connection ids are local to the emitting transport; aggregating layers
/// re-key them before surfacing events further up.
#[derive(Debug)]
pub enum ServerEvent {
    /// A client established a connection.
    Connected { connection: ConnectionId },
    /// A payload arrived from a connected client.
    Message {
        connection: ConnectionId,
        channel: ChannelId,
        payload: Bytes,
    },
    /// A client connection was closed.
    Disconnected {
        connection: ConnectionId,
        reason: DisconnectReason,
    },
}

/// Capability description for a concrete transport implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportCapabilities {
    pub supports_reliable_streams: bool,
    pub supports_unreliable_streams: bool,
    pub supports_datagrams: bool,
    pub max_channels: u16,
    pub max_packet_size: usize,
}

impl TransportCapabilities {
    /// Capability set supported by both `self` and `other`.
    ///
    /// Feature flags are ANDed and limits take the smaller value, so a
    /// payload acceptable under the intersection is acceptable to either
    /// side.
    pub fn intersect(self, other: Self) -> Self {
        Self {
            supports_reliable_streams: self.supports_reliable_streams
                && other.supports_reliable_streams,
            supports_unreliable_streams: self.supports_unreliable_streams
                && other.supports_unreliable_streams,
            supports_datagrams: self.supports_datagrams && other.supports_datagrams,
            max_channels: self.max_channels.min(other.max_channels),
            max_packet_size: self.max_packet_size.min(other.max_packet_size),
        }
    }
}

impl Default for TransportCapabilities {
    fn default() -> Self {
        Self {
            supports_reliable_streams: true,
            supports_unreliable_streams: true,
            supports_datagrams: true,
            max_channels: u8::MAX as u16,
            max_packet_size: 64 * 1024,
        }
    }
}
