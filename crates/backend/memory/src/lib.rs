//! In-memory transport for same-process client-server communication.
//!
//! A [`MemoryPair`] holds two endpoints sharing state behind an `Arc`,
//! without touching the network stack. This is primarily used for local
//! testing and embedded client-server runs. Events are delivered
//! synchronously on the calling thread through the peer endpoint's
//! registered handlers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use tracing::{debug, warn};
use transport::{
    ChannelId, ClientEvent, ClientEventHandler, ConnectionId, DisconnectReason, ServerEvent,
    ServerEventHandler, Transport, TransportCapabilities, TransportError, TransportResult,
};
use url::Url;

/// Scheme accepted by default, as in `mem://session`.
pub const MEMORY_SCHEME: &str = "mem";

/// Memory transport capabilities.
///
/// Everything in-process is reliable, so unreliable streams are not
/// offered; packet size is effectively unbounded.
const MEMORY_CAPABILITIES: TransportCapabilities = TransportCapabilities {
    supports_reliable_streams: true,
    supports_unreliable_streams: false,
    supports_datagrams: true,
    max_channels: u8::MAX as u16,
    max_packet_size: usize::MAX,
};

/// Endpoint of a pair. Either side may take the client or the listener
/// role; the names follow the intended use in [`MemoryPair`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Client,
    Server,
}

impl Side {
    fn peer(self) -> Side {
        match self {
            Side::Client => Side::Server,
            Side::Server => Side::Client,
        }
    }
}

/// The single live connection a pair can carry.
#[derive(Debug, Clone, Copy)]
struct Live {
    client_side: Side,
    connection: ConnectionId,
}

#[derive(Default)]
struct EndpointSlots {
    client: Mutex<Option<ClientEventHandler>>,
    server: Mutex<Option<ServerEventHandler>>,
}

struct PairState {
    scheme: String,
    listener: Mutex<Option<Side>>,
    live: Mutex<Option<Live>>,
    next_connection: AtomicU64,
    client_endpoint: EndpointSlots,
    server_endpoint: EndpointSlots,
}

impl PairState {
    fn new(scheme: String) -> Self {
        Self {
            scheme,
            listener: Mutex::new(None),
            live: Mutex::new(None),
            next_connection: AtomicU64::new(1),
            client_endpoint: EndpointSlots::default(),
            server_endpoint: EndpointSlots::default(),
        }
    }

    fn slots(&self, side: Side) -> &EndpointSlots {
        match side {
            Side::Client => &self.client_endpoint,
            Side::Server => &self.server_endpoint,
        }
    }

    fn fire_client(&self, side: Side, event: ClientEvent) {
        if let Ok(mut slot) = self.slots(side).client.lock() {
            match slot.as_mut() {
                Some(handler) => handler(event),
                None => {
                    if matches!(event, ClientEvent::Message { .. }) {
                        warn!("memory transport dropped {event:?}: no client handler registered");
                    }
                }
            }
        }
    }

    fn fire_server(&self, side: Side, event: ServerEvent) {
        if let Ok(mut slot) = self.slots(side).server.lock() {
            match slot.as_mut() {
                Some(handler) => handler(event),
                None => {
                    if matches!(event, ServerEvent::Message { .. }) {
                        warn!("memory transport dropped {event:?}: no server handler registered");
                    }
                }
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> TransportResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| TransportError::Other("memory transport state poisoned".into()))
}

/// A pair of connected in-memory transports.
pub struct MemoryPair {
    pub client: MemoryTransport,
    pub server: MemoryTransport,
}

impl MemoryPair {
    /// Creates a pair accepting the default `mem` scheme.
    pub fn new() -> Self {
        Self::with_scheme(MEMORY_SCHEME)
    }

    /// Creates a pair accepting a custom scheme, for setups running several
    /// pairs side by side.
    pub fn with_scheme(scheme: impl Into<String>) -> Self {
        let state = Arc::new(PairState::new(scheme.into()));
        Self {
            client: MemoryTransport {
                side: Side::Client,
                state: Arc::clone(&state),
            },
            server: MemoryTransport {
                side: Side::Server,
                state,
            },
        }
    }
}

impl Default for MemoryPair {
    fn default() -> Self {
        Self::new()
    }
}

/// One endpoint of a [`MemoryPair`].
pub struct MemoryTransport {
    side: Side,
    state: Arc<PairState>,
}

impl MemoryTransport {
    /// The address scheme this endpoint accepts.
    pub fn scheme(&self) -> &str {
        &self.state.scheme
    }

    fn connect_internal(&self) -> TransportResult<()> {
        let peer = self.side.peer();
        if *lock(&self.state.listener)? != Some(peer) {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "memory pair peer is not listening",
            )));
        }

        let connection = {
            let mut live = lock(&self.state.live)?;
            if live.is_some() {
                return Err(TransportError::Other(
                    "memory transport already connected".into(),
                ));
            }
            let connection =
                ConnectionId::new(self.state.next_connection.fetch_add(1, Ordering::Relaxed));
            *live = Some(Live {
                client_side: self.side,
                connection,
            });
            connection
        };

        debug!("memory transport connected, connection {connection}");
        self.state.fire_client(self.side, ClientEvent::Connected);
        self.state
            .fire_server(peer, ServerEvent::Connected { connection });
        Ok(())
    }

    fn current_connection(&self) -> TransportResult<ConnectionId> {
        let live = lock(&self.state.live)?;
        match &*live {
            Some(live) if live.client_side == self.side => Ok(live.connection),
            _ => Err(TransportError::NotConnected),
        }
    }

    /// Looks up the live connection a server-role call refers to and
    /// returns the side holding the client end.
    fn server_connection(&self, connection: ConnectionId) -> TransportResult<Side> {
        let live = lock(&self.state.live)?;
        match &*live {
            Some(live)
                if live.connection == connection && live.client_side == self.side.peer() =>
            {
                Ok(live.client_side)
            }
            _ => Err(TransportError::InvalidConnection(connection)),
        }
    }
}

impl Transport for MemoryTransport {
    fn available(&self) -> bool {
        true
    }

    fn client_connect(&mut self, address: &str) -> TransportResult<()> {
        if let Some((scheme, _)) = address.split_once("://") {
            if scheme != self.state.scheme {
                return Err(TransportError::unsupported_scheme(scheme));
            }
        }
        self.connect_internal()
    }

    fn client_connect_url(&mut self, url: &Url) -> TransportResult<()> {
        if url.scheme() != self.state.scheme {
            return Err(TransportError::unsupported_scheme(url.scheme()));
        }
        self.connect_internal()
    }

    fn client_connected(&self) -> bool {
        self.state
            .live
            .lock()
            .map(|live| matches!(&*live, Some(live) if live.client_side == self.side))
            .unwrap_or(false)
    }

    fn client_send(&mut self, channel: ChannelId, payload: Bytes) -> TransportResult<()> {
        let connection = self.current_connection()?;
        self.state.fire_server(
            self.side.peer(),
            ServerEvent::Message {
                connection,
                channel,
                payload,
            },
        );
        Ok(())
    }

    fn client_disconnect(&mut self) -> TransportResult<()> {
        let connection = {
            let mut live = lock(&self.state.live)?;
            match &*live {
                Some(current) if current.client_side == self.side => {
                    let connection = current.connection;
                    *live = None;
                    connection
                }
                _ => return Err(TransportError::NotConnected),
            }
        };

        self.state.fire_client(
            self.side,
            ClientEvent::Disconnected {
                reason: DisconnectReason::Graceful,
            },
        );
        self.state.fire_server(
            self.side.peer(),
            ServerEvent::Disconnected {
                connection,
                reason: DisconnectReason::Graceful,
            },
        );
        Ok(())
    }

    fn server_start(&mut self) -> TransportResult<()> {
        *lock(&self.state.listener)? = Some(self.side);
        debug!("memory transport listening on `{}`", self.state.scheme);
        Ok(())
    }

    fn server_active(&self) -> bool {
        self.state
            .listener
            .lock()
            .map(|listener| *listener == Some(self.side))
            .unwrap_or(false)
    }

    fn server_send(
        &mut self,
        connection: ConnectionId,
        channel: ChannelId,
        payload: Bytes,
    ) -> TransportResult<()> {
        let client_side = self.server_connection(connection)?;
        self.state.fire_client(
            client_side,
            ClientEvent::Message { channel, payload },
        );
        Ok(())
    }

    fn server_disconnect(&mut self, connection: ConnectionId) -> TransportResult<()> {
        let client_side = self.server_connection(connection)?;
        *lock(&self.state.live)? = None;

        self.state.fire_client(
            client_side,
            ClientEvent::Disconnected {
                reason: DisconnectReason::Kicked,
            },
        );
        self.state.fire_server(
            self.side,
            ServerEvent::Disconnected {
                connection,
                reason: DisconnectReason::Kicked,
            },
        );
        Ok(())
    }

    fn server_client_address(&self, connection: ConnectionId) -> TransportResult<String> {
        self.server_connection(connection)?;
        Ok(format!("{}://local", self.state.scheme))
    }

    fn server_stop(&mut self) -> TransportResult<()> {
        {
            let mut listener = lock(&self.state.listener)?;
            if *listener == Some(self.side) {
                *listener = None;
            }
        }

        let live = {
            let mut live = lock(&self.state.live)?;
            match &*live {
                Some(current) if current.client_side == self.side.peer() => live.take(),
                _ => None,
            }
        };
        if let Some(live) = live {
            self.state.fire_client(
                live.client_side,
                ClientEvent::Disconnected {
                    reason: DisconnectReason::Graceful,
                },
            );
        }
        Ok(())
    }

    fn on_client_event(&mut self, handler: ClientEventHandler) {
        if let Ok(mut slot) = self.state.slots(self.side).client.lock() {
            *slot = Some(handler);
        }
    }

    fn on_server_event(&mut self, handler: ServerEventHandler) {
        if let Ok(mut slot) = self.state.slots(self.side).server.lock() {
            *slot = Some(handler);
        }
    }

    fn capabilities(&self) -> TransportCapabilities {
        MEMORY_CAPABILITIES
    }

    fn shutdown(&mut self) {
        if let Ok(mut listener) = self.state.listener.lock() {
            if *listener == Some(self.side) {
                *listener = None;
            }
        }

        let live = self
            .state
            .live
            .lock()
            .ok()
            .and_then(|mut live| live.take());
        if let Some(live) = live {
            if live.client_side == self.side {
                self.state.fire_server(
                    self.side.peer(),
                    ServerEvent::Disconnected {
                        connection: live.connection,
                        reason: DisconnectReason::TransportError,
                    },
                );
            } else {
                self.state.fire_client(
                    live.client_side,
                    ClientEvent::Disconnected {
                        reason: DisconnectReason::TransportError,
                    },
                );
            }
        }
    }
}

impl fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("scheme", &self.state.scheme)
            .field("side", &self.side)
            .field("connected", &self.client_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_client(events: &Arc<Mutex<Vec<ClientEvent>>>) -> ClientEventHandler {
        let events = Arc::clone(events);
        Box::new(move |event| events.lock().unwrap().push(event))
    }

    fn record_server(events: &Arc<Mutex<Vec<ServerEvent>>>) -> ServerEventHandler {
        let events = Arc::clone(events);
        Box::new(move |event| events.lock().unwrap().push(event))
    }

    struct Harness {
        pair: MemoryPair,
        client_events: Arc<Mutex<Vec<ClientEvent>>>,
        server_events: Arc<Mutex<Vec<ServerEvent>>>,
    }

    fn listening_pair() -> Harness {
        let mut pair = MemoryPair::new();
        let client_events = Arc::new(Mutex::new(Vec::new()));
        let server_events = Arc::new(Mutex::new(Vec::new()));
        pair.client.on_client_event(record_client(&client_events));
        pair.server.on_server_event(record_server(&server_events));
        pair.server.server_start().unwrap();
        Harness {
            pair,
            client_events,
            server_events,
        }
    }

    fn connected_pair() -> (Harness, ConnectionId) {
        let mut harness = listening_pair();
        harness.pair.client.client_connect("mem://session").unwrap();
        harness.client_events.lock().unwrap().clear();
        let connection = match harness.server_events.lock().unwrap().drain(..).next() {
            Some(ServerEvent::Connected { connection }) => connection,
            other => panic!("expected connected event, got {other:?}"),
        };
        (harness, connection)
    }

    #[test]
    fn connect_emits_events_on_both_sides() {
        let mut harness = listening_pair();
        harness.pair.client.client_connect("mem://session").unwrap();

        assert!(matches!(
            harness.client_events.lock().unwrap().as_slice(),
            [ClientEvent::Connected]
        ));
        assert!(matches!(
            harness.server_events.lock().unwrap().as_slice(),
            [ServerEvent::Connected { .. }]
        ));
        assert!(harness.pair.client.client_connected());
    }

    #[test]
    fn connect_is_refused_without_listener() {
        let mut pair = MemoryPair::new();
        let err = pair.client.client_connect("mem://session").unwrap_err();
        assert!(matches!(
            err,
            TransportError::Io(ref io) if io.kind() == std::io::ErrorKind::ConnectionRefused
        ));
        assert!(!pair.client.client_connected());
    }

    #[test]
    fn rejects_foreign_schemes() {
        let mut harness = listening_pair();

        let err = harness.pair.client.client_connect("tcp://host").unwrap_err();
        assert!(matches!(
            err,
            TransportError::UnsupportedScheme { ref scheme } if scheme == "tcp"
        ));

        let url = Url::parse("ws://host").unwrap();
        let err = harness.pair.client.client_connect_url(&url).unwrap_err();
        assert!(err.is_unsupported_scheme());

        assert!(harness.server_events.lock().unwrap().is_empty());
    }

    #[test]
    fn accepts_bare_host_names() {
        let mut harness = listening_pair();
        harness.pair.client.client_connect("some.server.com").unwrap();
        assert!(harness.pair.client.client_connected());
    }

    #[test]
    fn send_round_trip() {
        let (mut harness, connection) = connected_pair();

        harness
            .pair
            .client
            .client_send(3, Bytes::from_static(&[1, 2, 3]))
            .unwrap();
        assert!(matches!(
            harness.server_events.lock().unwrap().as_slice(),
            [ServerEvent::Message { connection: got, channel: 3, payload }]
                if *got == connection && payload.as_ref() == [1, 2, 3]
        ));

        harness
            .pair
            .server
            .server_send(connection, 5, Bytes::from_static(b"pong"))
            .unwrap();
        assert!(matches!(
            harness.client_events.lock().unwrap().as_slice(),
            [ClientEvent::Message { channel: 5, payload }] if payload.as_ref() == b"pong"
        ));
    }

    #[test]
    fn disconnect_lifecycle() {
        let (mut harness, _) = connected_pair();

        harness.pair.client.client_disconnect().unwrap();
        assert!(matches!(
            harness.client_events.lock().unwrap().as_slice(),
            [ClientEvent::Disconnected {
                reason: DisconnectReason::Graceful
            }]
        ));
        assert!(matches!(
            harness.server_events.lock().unwrap().as_slice(),
            [ServerEvent::Disconnected {
                reason: DisconnectReason::Graceful,
                ..
            }]
        ));

        assert!(!harness.pair.client.client_connected());
        assert!(matches!(
            harness.pair.client.client_send(0, Bytes::new()),
            Err(TransportError::NotConnected)
        ));
    }

    #[test]
    fn second_connect_while_live_is_rejected() {
        let (mut harness, _) = connected_pair();
        let err = harness.pair.client.client_connect("mem://again").unwrap_err();
        assert!(matches!(err, TransportError::Other(_)));
    }

    #[test]
    fn server_disconnect_kicks_the_client() {
        let (mut harness, connection) = connected_pair();

        harness.pair.server.server_disconnect(connection).unwrap();
        assert!(matches!(
            harness.client_events.lock().unwrap().as_slice(),
            [ClientEvent::Disconnected {
                reason: DisconnectReason::Kicked
            }]
        ));
        assert!(matches!(
            harness.server_events.lock().unwrap().as_slice(),
            [ServerEvent::Disconnected {
                reason: DisconnectReason::Kicked,
                ..
            }]
        ));
        assert!(!harness.pair.client.client_connected());
    }

    #[test]
    fn server_stop_disconnects_the_peer() {
        let (mut harness, _) = connected_pair();

        harness.pair.server.server_stop().unwrap();
        assert!(!harness.pair.server.server_active());
        assert!(matches!(
            harness.client_events.lock().unwrap().as_slice(),
            [ClientEvent::Disconnected {
                reason: DisconnectReason::Graceful
            }]
        ));
        assert!(!harness.pair.client.client_connected());
    }

    #[test]
    fn server_send_on_unknown_connection_fails() {
        let (mut harness, connection) = connected_pair();
        let bogus = ConnectionId::new(connection.get() + 1);
        assert!(matches!(
            harness.pair.server.server_send(bogus, 0, Bytes::new()),
            Err(TransportError::InvalidConnection(got)) if got == bogus
        ));
    }

    #[test]
    fn server_client_address_reports_scheme() {
        let (harness, connection) = connected_pair();
        let address = harness.pair.server.server_client_address(connection).unwrap();
        assert_eq!(address, "mem://local");
    }
}
