//! Aggregates several transports behind a single [`Transport`] facade.
//!
//! Client-role calls go through one inner transport at a time: connect walks
//! the configured list in priority order and binds to the first transport
//! that is available and accepts the address, and every later client call
//! routes to that selection. Server-role calls fan out to all inner
//! transports, with each transport's local connection ids re-keyed into a
//! shared id space so callers can address any client through one surface.

pub mod striping;

pub use striping::ConnectionStriping;

use std::fmt;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tracing::debug;
use transport::{
    ChannelId, ClientEvent, ClientEventHandler, ConnectionId, ServerEvent, ServerEventHandler,
    Transport, TransportCapabilities, TransportError, TransportResult,
};
use url::Url;

type HandlerSlot<E> = Arc<Mutex<Option<Box<dyn FnMut(E) + Send>>>>;

/// A [`Transport`] built from an ordered list of inner transports.
///
/// The list is supplied once at construction and is immutable afterwards:
/// its order defines client-side selection priority and server-side
/// connection-id striping (see [`ConnectionStriping`]).
///
/// Forwarding handlers are registered on every inner transport at
/// construction. Client events pass through unchanged, whichever inner
/// transport fires them; server events are re-keyed with the emitting
/// transport's index before they reach the handler registered on the
/// multiplexer.
pub struct MultiplexTransport {
    transports: Vec<Box<dyn Transport>>,
    striping: ConnectionStriping,
    /// Index of the inner transport serving the client role, if any.
    active: Option<usize>,
    client_events: HandlerSlot<ClientEvent>,
    server_events: HandlerSlot<ServerEvent>,
}

impl MultiplexTransport {
    pub fn new(mut transports: Vec<Box<dyn Transport>>) -> Self {
        let striping = ConnectionStriping::new(transports.len());
        let client_events: HandlerSlot<ClientEvent> = Arc::new(Mutex::new(None));
        let server_events: HandlerSlot<ServerEvent> = Arc::new(Mutex::new(None));

        for (index, transport) in transports.iter_mut().enumerate() {
            let slot = Arc::clone(&client_events);
            transport.on_client_event(Box::new(move |event| {
                if let Ok(mut handler) = slot.lock() {
                    if let Some(handler) = handler.as_mut() {
                        handler(event);
                    }
                }
            }));

            let slot = Arc::clone(&server_events);
            transport.on_server_event(Box::new(move |event| {
                let event = globalize(striping, index, event);
                if let Ok(mut handler) = slot.lock() {
                    if let Some(handler) = handler.as_mut() {
                        handler(event);
                    }
                }
            }));
        }

        Self {
            transports,
            striping,
            active: None,
            client_events,
            server_events,
        }
    }

    /// The connection-id mapping in effect for this multiplexer.
    pub fn striping(&self) -> ConnectionStriping {
        self.striping
    }

    fn active_mut(&mut self) -> TransportResult<&mut Box<dyn Transport>> {
        let index = self.active.ok_or(TransportError::NotConnected)?;
        self.transports
            .get_mut(index)
            .ok_or(TransportError::NotConnected)
    }

    /// Walks the inner transports in priority order and binds to the first
    /// that is available and does not reject the address format.
    ///
    /// Scheme rejections fall through to the next transport; any other
    /// connect failure aborts the walk and propagates unchanged.
    fn connect_first_match(
        &mut self,
        address: &str,
        mut connect: impl FnMut(&mut dyn Transport) -> TransportResult<()>,
    ) -> TransportResult<()> {
        self.active = None;
        for (index, transport) in self.transports.iter_mut().enumerate() {
            if !transport.available() {
                debug!("skipping transport #{index}: unavailable");
                continue;
            }
            match connect(transport.as_mut()) {
                Ok(()) => {
                    debug!("transport #{index} accepted `{address}`");
                    self.active = Some(index);
                    return Ok(());
                }
                Err(err) if err.is_unsupported_scheme() => {
                    debug!("transport #{index} rejected `{address}`: {err}");
                }
                Err(err) => return Err(err),
            }
        }
        Err(TransportError::NoTransportAvailable {
            address: address.to_string(),
        })
    }
}

impl Transport for MultiplexTransport {
    fn available(&self) -> bool {
        self.transports.iter().any(|transport| transport.available())
    }

    fn client_connect(&mut self, address: &str) -> TransportResult<()> {
        self.connect_first_match(address, |transport| transport.client_connect(address))
    }

    fn client_connect_url(&mut self, url: &Url) -> TransportResult<()> {
        self.connect_first_match(url.as_str(), |transport| transport.client_connect_url(url))
    }

    fn client_connected(&self) -> bool {
        self.active
            .and_then(|index| self.transports.get(index))
            .is_some_and(|transport| transport.client_connected())
    }

    fn client_send(&mut self, channel: ChannelId, payload: Bytes) -> TransportResult<()> {
        self.active_mut()?.client_send(channel, payload)
    }

    fn client_disconnect(&mut self) -> TransportResult<()> {
        let index = self.active.take().ok_or(TransportError::NotConnected)?;
        match self.transports.get_mut(index) {
            Some(transport) => transport.client_disconnect(),
            None => Err(TransportError::NotConnected),
        }
    }

    fn server_start(&mut self) -> TransportResult<()> {
        for (index, transport) in self.transports.iter_mut().enumerate() {
            debug!("starting server on transport #{index}");
            transport.server_start()?;
        }
        Ok(())
    }

    fn server_active(&self) -> bool {
        self.transports
            .iter()
            .all(|transport| transport.server_active())
    }

    fn server_send(
        &mut self,
        connection: ConnectionId,
        channel: ChannelId,
        payload: Bytes,
    ) -> TransportResult<()> {
        let (index, local) = self
            .striping
            .decode(connection)
            .ok_or(TransportError::InvalidConnection(connection))?;
        let transport = self
            .transports
            .get_mut(index)
            .ok_or(TransportError::InvalidConnection(connection))?;
        transport.server_send(local, channel, payload)
    }

    fn server_disconnect(&mut self, connection: ConnectionId) -> TransportResult<()> {
        let (index, local) = self
            .striping
            .decode(connection)
            .ok_or(TransportError::InvalidConnection(connection))?;
        let transport = self
            .transports
            .get_mut(index)
            .ok_or(TransportError::InvalidConnection(connection))?;
        transport.server_disconnect(local)
    }

    fn server_client_address(&self, connection: ConnectionId) -> TransportResult<String> {
        let (index, local) = self
            .striping
            .decode(connection)
            .ok_or(TransportError::InvalidConnection(connection))?;
        let transport = self
            .transports
            .get(index)
            .ok_or(TransportError::InvalidConnection(connection))?;
        transport.server_client_address(local)
    }

    fn server_stop(&mut self) -> TransportResult<()> {
        for transport in &mut self.transports {
            transport.server_stop()?;
        }
        Ok(())
    }

    fn on_client_event(&mut self, handler: ClientEventHandler) {
        if let Ok(mut slot) = self.client_events.lock() {
            *slot = Some(handler);
        }
    }

    fn on_server_event(&mut self, handler: ServerEventHandler) {
        if let Ok(mut slot) = self.server_events.lock() {
            *slot = Some(handler);
        }
    }

    fn capabilities(&self) -> TransportCapabilities {
        self.transports
            .iter()
            .map(|transport| transport.capabilities())
            .reduce(TransportCapabilities::intersect)
            .unwrap_or_default()
    }

    fn shutdown(&mut self) {
        self.active = None;
        for transport in &mut self.transports {
            transport.shutdown();
        }
    }
}

impl fmt::Debug for MultiplexTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiplexTransport")
            .field("transports", &self.transports)
            .field("active", &self.active)
            .finish()
    }
}

/// Re-keys an inner transport's event into the multiplexer's id space.
fn globalize(striping: ConnectionStriping, index: usize, event: ServerEvent) -> ServerEvent {
    match event {
        ServerEvent::Connected { connection } => ServerEvent::Connected {
            connection: striping.encode(index, connection),
        },
        ServerEvent::Message {
            connection,
            channel,
            payload,
        } => ServerEvent::Message {
            connection: striping.encode(index, connection),
            channel,
            payload,
        },
        ServerEvent::Disconnected { connection, reason } => ServerEvent::Disconnected {
            connection: striping.encode(index, connection),
            reason,
        },
    }
}
