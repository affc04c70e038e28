//! Transport capability contract shared by backends and aggregating layers.
//!
//! This crate hosts the pieces every transport implementation has in common:
//! - the [`Transport`] trait covering the client and server roles
//! - event enums delivered through registered handlers
//! - shared error and identifier types
//!
//! Keep this crate lean: no I/O, no runtime, only the contract.

pub mod error;
pub mod events;
pub mod ids;

pub use error::{TransportError, TransportResult};
pub use events::{ClientEvent, DisconnectReason, ServerEvent, TransportCapabilities};
pub use ids::{ChannelId, ConnectionId};

use std::fmt::Debug;

use bytes::Bytes;
use url::Url;

/// Handler invoked for client-side transport events.
pub type ClientEventHandler = Box<dyn FnMut(ClientEvent) + Send>;
/// Handler invoked for server-side transport events.
pub type ServerEventHandler = Box<dyn FnMut(ServerEvent) + Send>;

/// Common interface implemented by all transports (e.g. TCP, WebSocket,
/// in-memory) and by layers that aggregate them.
///
/// Events are pushed through the handlers registered via
/// [`Transport::on_client_event`] / [`Transport::on_server_event`].
/// Implementations invoke handlers synchronously on whatever thread produced
/// the event; handlers must be `Send` and must not re-enter an operation
/// that fires the same handler slot.
pub trait Transport: Send + Debug {
    /// Whether the transport can run in the current environment.
    fn available(&self) -> bool;

    /// Connects to the given address, e.g. `"tcp://host:7777"` or a bare
    /// host name.
    ///
    /// Returns [`TransportError::UnsupportedScheme`] if the address format
    /// is not one this transport handles.
    fn client_connect(&mut self, address: &str) -> TransportResult<()>;

    /// Connects to a structured address.
    ///
    /// The default forwards to [`Transport::client_connect`];
    /// implementations with scheme-specific validation override this.
    fn client_connect_url(&mut self, url: &Url) -> TransportResult<()> {
        self.client_connect(url.as_str())
    }

    /// Whether a client-role connection is currently established.
    fn client_connected(&self) -> bool;

    /// Sends a payload to the connected server.
    fn client_send(&mut self, channel: ChannelId, payload: Bytes) -> TransportResult<()>;

    /// Disconnects from the current server.
    fn client_disconnect(&mut self) -> TransportResult<()>;

    /// Starts listening for incoming connections.
    fn server_start(&mut self) -> TransportResult<()>;

    /// Whether the server role is currently listening.
    fn server_active(&self) -> bool;

    /// Sends a payload to a connected client.
    fn server_send(
        &mut self,
        connection: ConnectionId,
        channel: ChannelId,
        payload: Bytes,
    ) -> TransportResult<()>;

    /// Requests that the given client gets disconnected.
    fn server_disconnect(&mut self, connection: ConnectionId) -> TransportResult<()>;

    /// Returns the transport's notion of the peer address for a connection.
    fn server_client_address(&self, connection: ConnectionId) -> TransportResult<String>;

    /// Stops listening and disconnects all peers.
    fn server_stop(&mut self) -> TransportResult<()>;

    /// Registers the handler receiving client-side events, replacing any
    /// previous one.
    fn on_client_event(&mut self, handler: ClientEventHandler);

    /// Registers the handler receiving server-side events, replacing any
    /// previous one.
    fn on_server_event(&mut self, handler: ServerEventHandler);

    /// Advertises the capabilities supported by the transport implementation.
    fn capabilities(&self) -> TransportCapabilities {
        TransportCapabilities::default()
    }

    /// Releases both roles' resources. Best effort; called once at teardown.
    fn shutdown(&mut self);
}
