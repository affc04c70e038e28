//! Connection-id striping across a fixed set of transports.

use transport::ConnectionId;

/// Maps transport-local connection ids to multiplexer-global ids and back.
///
/// With `count` configured transports, local id `L` issued by the transport
/// at `index` becomes global id `L * count + index`; decoding takes the
/// remainder and quotient. The mapping is a bijection over
/// `(index, local id)` pairs, so ids from different transports never
/// collide, and it stays fixed for the lifetime of the multiplexer because
/// global ids cross the event boundary to external callers.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionStriping {
    count: u64,
}

impl ConnectionStriping {
    pub fn new(count: usize) -> Self {
        Self {
            count: count as u64,
        }
    }

    pub fn encode(&self, index: usize, local: ConnectionId) -> ConnectionId {
        ConnectionId::new(local.get() * self.count + index as u64)
    }

    /// Recovers `(transport index, local id)` from a global id.
    ///
    /// Returns `None` only when no transports are configured.
    pub fn decode(&self, global: ConnectionId) -> Option<(usize, ConnectionId)> {
        if self.count == 0 {
            return None;
        }
        let index = (global.get() % self.count) as usize;
        let local = ConnectionId::new(global.get() / self.count);
        Some((index, local))
    }
}
