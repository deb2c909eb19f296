//! Registry of live connections.
//!
//! The `SessionRegistry` mirrors the set of open transport connections.
//! Each entry pairs the session state with the sending half of that
//! connection's bounded outbound queue. The registry does no I/O and no
//! locking of its own; the broadcast engine owns it behind its
//! serialization point.

use std::collections::{BTreeMap, HashMap};

use murmur_types::error::RelayError;
use murmur_types::protocol::ServerEvent;
use murmur_types::session::{ConnectionId, Session};
use tokio::sync::mpsc;
use tracing::{debug, error};

/// Outbound half of a connection's event queue.
pub type Outbound = mpsc::Sender<ServerEvent>;

struct Entry {
    session: Session,
    outbound: Outbound,
}

/// Live sessions in registration order.
#[derive(Default)]
pub struct SessionRegistry {
    /// Registration sequence -> entry. Iteration order is registration order.
    entries: BTreeMap<u64, Entry>,
    /// Connection ID -> registration sequence.
    index: HashMap<ConnectionId, u64>,
    next_seq: u64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection with no display name.
    ///
    /// Registering an ID that is already present is an invariant violation:
    /// it is logged, the old entry is replaced (its outbound queue is
    /// dropped), and `DuplicateConnection` is returned. The new session is
    /// registered in either case.
    pub fn register(&mut self, id: ConnectionId, outbound: Outbound) -> Result<(), RelayError> {
        let duplicate = match self.index.remove(&id) {
            Some(old_seq) => {
                self.entries.remove(&old_seq);
                error!(connection_id = %id, "connection registered twice, replacing session");
                true
            }
            None => false,
        };

        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(
            seq,
            Entry {
                session: Session::new(id),
                outbound,
            },
        );
        self.index.insert(id, seq);
        debug!(connection_id = %id, sessions = self.entries.len(), "session registered");

        if duplicate {
            Err(RelayError::DuplicateConnection(id))
        } else {
            Ok(())
        }
    }

    /// Record the display name a connection declared. Unknown IDs are ignored.
    pub fn set_display_name(&mut self, id: ConnectionId, name: &str) {
        if let Some(entry) = self.entry_mut(id) {
            entry.session.display_name = Some(name.to_string());
        }
    }

    /// Update a connection's typing flag. Unknown IDs are ignored.
    pub fn set_typing(&mut self, id: ConnectionId, typing: bool) {
        if let Some(entry) = self.entry_mut(id) {
            entry.session.typing = typing;
        }
    }

    /// Remove a connection, returning its last session state.
    ///
    /// Idempotent: removing an absent ID returns `None`.
    pub fn unregister(&mut self, id: ConnectionId) -> Option<Session> {
        let seq = self.index.remove(&id)?;
        let entry = self.entries.remove(&seq)?;
        debug!(connection_id = %id, sessions = self.entries.len(), "session unregistered");
        Some(entry.session)
    }

    /// Whether a connection is currently registered.
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.index.contains_key(&id)
    }

    /// Current state of one session.
    pub fn get(&self, id: ConnectionId) -> Option<&Session> {
        let seq = self.index.get(&id)?;
        self.entries.get(seq).map(|entry| &entry.session)
    }

    /// Consistent point-in-time copy of every session, in registration order.
    pub fn snapshot(&self) -> Vec<Session> {
        self.entries.values().map(|e| e.session.clone()).collect()
    }

    /// Outbound queues of every session, in registration order.
    pub fn outbounds(&self) -> impl Iterator<Item = (ConnectionId, &Outbound)> {
        self.entries
            .values()
            .map(|e| (e.session.connection_id, &e.outbound))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn entry_mut(&mut self, id: ConnectionId) -> Option<&mut Entry> {
        let seq = self.index.get(&id)?;
        self.entries.get_mut(seq)
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.entries.len())
            .finish()
    }
}
