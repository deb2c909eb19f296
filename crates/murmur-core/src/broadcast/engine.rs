//! Broadcast engine: the single serialization point for client intents.
//!
//! Every intent is processed to completion -- validated, persisted, and fanned
//! out -- while holding one async mutex over the [`SessionRegistry`]. Two
//! sends from different connections therefore never interleave their
//! append-then-broadcast sequences, and every connected client observes
//! `newMessage` events in store append order.
//!
//! Fan-out never waits on a client. Each connection has a bounded outbound
//! queue; an event that does not fit evicts that connection from the
//! registry (dropping its queue, which closes its socket) instead of
//! stalling delivery to everyone else.

use murmur_types::chat::ChatMessage;
use murmur_types::config::{HISTORY_LIMIT, RelayConfig};
use murmur_types::error::RelayError;
use murmur_types::protocol::{ClientIntent, ServerEvent};
use murmur_types::session::{ConnectionId, Session};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

use super::retry::StoreRetryPolicy;
use crate::repository::message::MessageStore;
use crate::session::registry::SessionRegistry;

/// Receiving side of one registered connection.
///
/// The transport adapter drains `events` into its socket. When the engine
/// unregisters, evicts, or replaces the connection, `events` yields `None`.
#[derive(Debug)]
pub struct SessionHandle {
    pub connection_id: ConnectionId,
    pub events: mpsc::Receiver<ServerEvent>,
    /// Upgradable only while the registry still holds this handle's queue.
    registration: mpsc::WeakSender<ServerEvent>,
}

/// Which registered sessions an event goes to.
#[derive(Debug, Clone, Copy)]
enum Audience {
    Everyone,
    Only(ConnectionId),
    AllExcept(ConnectionId),
}

impl Audience {
    fn includes(self, id: ConnectionId) -> bool {
        match self {
            Audience::Everyone => true,
            Audience::Only(target) => id == target,
            Audience::AllExcept(excluded) => id != excluded,
        }
    }
}

/// Tunables the engine reads from [`RelayConfig`].
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub outbound_buffer: usize,
    pub max_body_chars: usize,
    pub retry: StoreRetryPolicy,
}

impl EngineSettings {
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            outbound_buffer: config.outbound_buffer.max(1),
            max_body_chars: config.max_body_chars,
            retry: StoreRetryPolicy::from_config(config),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&RelayConfig::default())
    }
}

/// Accepts intents, persists messages, and fans events out to sessions.
pub struct BroadcastEngine<S: MessageStore> {
    store: S,
    registry: Mutex<SessionRegistry>,
    settings: EngineSettings,
}

impl<S: MessageStore> BroadcastEngine<S> {
    pub fn new(store: S, settings: EngineSettings) -> Self {
        Self {
            store,
            registry: Mutex::new(SessionRegistry::new()),
            settings,
        }
    }

    /// The message store backing this engine.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Register a newly opened connection and hand back its event stream.
    ///
    /// A duplicate ID replaces the existing session; the violation is logged
    /// by the registry and does not fail the connection.
    pub async fn connect(&self, connection_id: ConnectionId) -> SessionHandle {
        let (tx, events) = mpsc::channel(self.settings.outbound_buffer);
        let registration = tx.downgrade();
        let mut registry = self.registry.lock().await;
        if let Err(err) = registry.register(connection_id, tx) {
            warn!(%connection_id, error = %err, "replaced existing session on connect");
        }
        info!(%connection_id, sessions = registry.len(), "client connected");
        SessionHandle {
            connection_id,
            events,
            registration,
        }
    }

    /// Process one intent from a connection.
    ///
    /// Failures are reported to the originating connection as an `error`
    /// event and returned to the caller; they never affect other sessions.
    pub async fn dispatch(
        &self,
        connection_id: ConnectionId,
        intent: ClientIntent,
    ) -> Result<(), RelayError> {
        let mut registry = self.registry.lock().await;
        debug!(%connection_id, intent = intent.name(), "processing intent");

        let result = match intent {
            ClientIntent::Send { author, body } => self
                .send_locked(&mut registry, Some(connection_id), &author, &body)
                .await
                .map(|_| ()),
            // The remaining intents only matter to a live session.
            _ if !registry.contains(connection_id) => {
                Err(RelayError::UnknownConnection(connection_id))
            }
            ClientIntent::RequestHistory => self.history_locked(&mut registry, connection_id).await,
            ClientIntent::TypingStart { author } => {
                self.typing_locked(&mut registry, connection_id, &author, true)
            }
            ClientIntent::TypingStop { author } => {
                self.typing_locked(&mut registry, connection_id, &author, false)
            }
            ClientIntent::Ping => {
                self.fan_out(&mut registry, ServerEvent::Pong, Audience::Only(connection_id));
                Ok(())
            }
        };

        if let Err(err) = &result {
            self.report(&mut registry, connection_id, err);
        }
        result
    }

    /// Validate, persist, and broadcast a message to every session,
    /// including the sender.
    pub async fn handle_send(
        &self,
        connection_id: ConnectionId,
        author: &str,
        body: &str,
    ) -> Result<(), RelayError> {
        self.dispatch(
            connection_id,
            ClientIntent::Send {
                author: author.to_string(),
                body: body.to_string(),
            },
        )
        .await
    }

    /// Deliver the most recent messages to the requesting connection only.
    pub async fn handle_history_request(&self, connection_id: ConnectionId) -> Result<(), RelayError> {
        self.dispatch(connection_id, ClientIntent::RequestHistory).await
    }

    /// Mark the connection as typing and tell every other session.
    pub async fn handle_typing_start(
        &self,
        connection_id: ConnectionId,
        display_name: &str,
    ) -> Result<(), RelayError> {
        self.dispatch(
            connection_id,
            ClientIntent::TypingStart {
                author: display_name.to_string(),
            },
        )
        .await
    }

    /// Clear the typing flag and tell every other session.
    pub async fn handle_typing_stop(
        &self,
        connection_id: ConnectionId,
        display_name: &str,
    ) -> Result<(), RelayError> {
        self.dispatch(
            connection_id,
            ClientIntent::TypingStop {
                author: display_name.to_string(),
            },
        )
        .await
    }

    /// Unregister the connection `handle` was handed out for. Idempotent.
    ///
    /// Only the registration created by the matching [`connect`](Self::connect)
    /// is removed: if the engine already evicted the session, or a later
    /// `connect` with the same ID replaced it, this is a no-op.
    ///
    /// No "user left" event is sent. A session that closes mid-typing has
    /// its indicator cleared for everyone else.
    pub async fn handle_disconnect(&self, handle: &SessionHandle) {
        let connection_id = handle.connection_id;
        let mut registry = self.registry.lock().await;
        if handle.registration.upgrade().is_none() {
            debug!(%connection_id, "disconnect for released session ignored");
            return;
        }
        let Some(session) = registry.unregister(connection_id) else {
            debug!(%connection_id, "disconnect for unknown connection ignored");
            return;
        };
        info!(%connection_id, sessions = registry.len(), "client disconnected");

        if let (true, Some(author)) = (session.typing, session.display_name) {
            self.fan_out(
                &mut registry,
                ServerEvent::UserStopTyping { author },
                Audience::AllExcept(connection_id),
            );
        }
    }

    /// Persist and broadcast a message that did not come from a connection
    /// (the REST endpoint). Every session receives it.
    pub async fn post_message(&self, author: &str, body: &str) -> Result<ChatMessage, RelayError> {
        let mut registry = self.registry.lock().await;
        self.send_locked(&mut registry, None, author, body).await
    }

    /// Point-in-time view of every connected session.
    pub async fn sessions(&self) -> Vec<Session> {
        self.registry.lock().await.snapshot()
    }

    /// Number of connected sessions.
    pub async fn session_count(&self) -> usize {
        self.registry.lock().await.len()
    }

    // -----------------------------------------------------------------------
    // Intent processing (registry lock held)
    // -----------------------------------------------------------------------

    async fn send_locked(
        &self,
        registry: &mut SessionRegistry,
        origin: Option<ConnectionId>,
        author: &str,
        body: &str,
    ) -> Result<ChatMessage, RelayError> {
        if author.trim().is_empty() {
            return Err(RelayError::EmptyAuthor);
        }
        if body.trim().is_empty() {
            return Err(RelayError::EmptyMessage);
        }
        let len = body.chars().count();
        if len > self.settings.max_body_chars {
            return Err(RelayError::MessageTooLong {
                len,
                max: self.settings.max_body_chars,
            });
        }
        if let Some(id) = origin {
            registry.set_display_name(id, author);
        }

        let created_at = self
            .settings
            .retry
            .run(|| self.store.append(author, body))
            .await?;
        let message = ChatMessage::new(author, body, created_at);

        let recipients = self.fan_out(
            registry,
            ServerEvent::NewMessage(message.clone()),
            Audience::Everyone,
        );
        debug!(author, recipients, "message broadcast");
        Ok(message)
    }

    async fn history_locked(
        &self,
        registry: &mut SessionRegistry,
        connection_id: ConnectionId,
    ) -> Result<(), RelayError> {
        let (messages, result) = match self.store.read_recent(HISTORY_LIMIT).await {
            Ok(messages) => (messages, Ok(())),
            Err(err) => {
                warn!(%connection_id, error = %err, "history read failed, sending empty history");
                (Vec::new(), Err(RelayError::from(err)))
            }
        };
        self.fan_out(
            registry,
            ServerEvent::History { messages },
            Audience::Only(connection_id),
        );
        result
    }

    fn typing_locked(
        &self,
        registry: &mut SessionRegistry,
        connection_id: ConnectionId,
        author: &str,
        typing: bool,
    ) -> Result<(), RelayError> {
        if author.trim().is_empty() {
            return Err(RelayError::EmptyAuthor);
        }
        registry.set_display_name(connection_id, author);
        registry.set_typing(connection_id, typing);

        let author = author.to_string();
        let event = if typing {
            ServerEvent::UserTyping { author }
        } else {
            ServerEvent::UserStopTyping { author }
        };
        self.fan_out(registry, event, Audience::AllExcept(connection_id));
        Ok(())
    }

    /// Surface a failed intent to its originator.
    fn report(&self, registry: &mut SessionRegistry, connection_id: ConnectionId, err: &RelayError) {
        match err {
            RelayError::UnknownConnection(_) => {
                debug!(%connection_id, "intent from closed connection swallowed");
                return;
            }
            err if err.is_validation() => {
                debug!(%connection_id, error = %err, "intent rejected");
            }
            err => {
                warn!(%connection_id, error = %err, "intent failed");
            }
        }

        let event = ServerEvent::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        };
        self.fan_out(registry, event, Audience::Only(connection_id));
    }

    /// Queue `event` for every session in `audience`.
    ///
    /// Returns the number of sessions the event was queued for. Sessions
    /// whose queue is full or closed are unregistered.
    fn fan_out(&self, registry: &mut SessionRegistry, event: ServerEvent, audience: Audience) -> usize {
        let mut delivered = 0;
        let mut evicted = Vec::new();

        for (id, outbound) in registry.outbounds() {
            if !audience.includes(id) {
                continue;
            }
            match outbound.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        connection_id = %id,
                        event = event.name(),
                        "outbound queue full, disconnecting slow client"
                    );
                    evicted.push(id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(connection_id = %id, "outbound queue closed, dropping session");
                    evicted.push(id);
                }
            }
        }

        for id in evicted {
            registry.unregister(id);
        }
        delivered
    }
}

impl<S: MessageStore> std::fmt::Debug for BroadcastEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastEngine")
            .field("settings", &self.settings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use chrono::{DateTime, Utc};
    use murmur_types::error::RepositoryError;

    use crate::repository::memory::InMemoryMessageStore;

    fn engine() -> BroadcastEngine<InMemoryMessageStore> {
        BroadcastEngine::new(InMemoryMessageStore::new(), EngineSettings::default())
    }

    fn drain(handle: &mut SessionHandle) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = handle.events.try_recv() {
            events.push(event);
        }
        events
    }

    fn new_messages(events: &[ServerEvent]) -> Vec<ChatMessage> {
        events
            .iter()
            .filter_map(|e| match e {
                ServerEvent::NewMessage(m) => Some(m.clone()),
                _ => None,
            })
            .collect()
    }

    /// Store that fails a fixed number of appends, then delegates.
    struct FlakyStore {
        inner: InMemoryMessageStore,
        failures_left: AtomicU32,
        reads_fail: bool,
    }

    impl FlakyStore {
        fn new(failures: u32, reads_fail: bool) -> Self {
            Self {
                inner: InMemoryMessageStore::new(),
                failures_left: AtomicU32::new(failures),
                reads_fail,
            }
        }
    }

    impl MessageStore for FlakyStore {
        async fn append(&self, author: &str, body: &str) -> Result<DateTime<Utc>, RepositoryError> {
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(RepositoryError::Connection);
            }
            self.inner.append(author, body).await
        }

        async fn read_recent(&self, limit: u32) -> Result<Vec<ChatMessage>, RepositoryError> {
            if self.reads_fail {
                return Err(RepositoryError::Connection);
            }
            self.inner.read_recent(limit).await
        }

        async fn read_all(&self) -> Result<Vec<ChatMessage>, RepositoryError> {
            self.inner.read_all().await
        }

        async fn count(&self) -> Result<u64, RepositoryError> {
            self.inner.count().await
        }
    }

    fn quick_retry(attempts: u32) -> EngineSettings {
        EngineSettings {
            retry: StoreRetryPolicy::new(attempts, Duration::ZERO),
            ..EngineSettings::default()
        }
    }

    #[tokio::test]
    async fn send_reaches_everyone_with_same_timestamp_and_history_replays_it() {
        let engine = engine();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        let mut ha = engine.connect(a).await;
        let mut hb = engine.connect(b).await;

        engine.handle_send(a, "alice", "hi").await.unwrap();

        let got_a = new_messages(&drain(&mut ha));
        let got_b = new_messages(&drain(&mut hb));
        assert_eq!(got_a.len(), 1);
        assert_eq!(got_a, got_b);
        assert_eq!(got_a[0].author, "alice");
        assert_eq!(got_a[0].body, "hi");

        engine.handle_history_request(b).await.unwrap();
        let events = drain(&mut hb);
        assert_eq!(
            events,
            vec![ServerEvent::History {
                messages: got_a.clone()
            }]
        );
        // History goes to the requester only.
        assert!(drain(&mut ha).is_empty());
    }

    #[tokio::test]
    async fn typing_is_never_echoed_to_originator() {
        let engine = engine();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        let mut ha = engine.connect(a).await;
        let mut hb = engine.connect(b).await;

        engine.handle_typing_start(a, "alice").await.unwrap();
        assert_eq!(
            drain(&mut hb),
            vec![ServerEvent::UserTyping {
                author: "alice".into()
            }]
        );
        assert!(drain(&mut ha).is_empty());

        engine.handle_typing_stop(a, "alice").await.unwrap();
        assert_eq!(
            drain(&mut hb),
            vec![ServerEvent::UserStopTyping {
                author: "alice".into()
            }]
        );
        assert!(drain(&mut ha).is_empty());
    }

    #[tokio::test]
    async fn typing_updates_registry_state() {
        let engine = engine();
        let a = ConnectionId::new();
        let _ha = engine.connect(a).await;

        engine.handle_typing_start(a, "alice").await.unwrap();
        let sessions = engine.sessions().await;
        assert_eq!(sessions[0].display_name.as_deref(), Some("alice"));
        assert!(sessions[0].typing);

        engine.handle_typing_stop(a, "alice").await.unwrap();
        assert!(!engine.sessions().await[0].typing);
    }

    #[tokio::test]
    async fn empty_message_is_rejected_without_broadcast_or_append() {
        let engine = engine();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        let mut ha = engine.connect(a).await;
        let mut hb = engine.connect(b).await;

        let result = engine.handle_send(a, "alice", "   \n\t").await;
        assert!(matches!(result, Err(RelayError::EmptyMessage)));

        assert_eq!(engine.store().count().await.unwrap(), 0);
        assert!(drain(&mut hb).is_empty());
        let events = drain(&mut ha);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], ServerEvent::Error { code, .. } if code == "EMPTY_MESSAGE"));
    }

    #[tokio::test]
    async fn overlong_message_is_rejected() {
        let engine = BroadcastEngine::new(
            InMemoryMessageStore::new(),
            EngineSettings {
                max_body_chars: 5,
                ..EngineSettings::default()
            },
        );
        let a = ConnectionId::new();
        let mut ha = engine.connect(a).await;

        let result = engine.handle_send(a, "alice", "too long").await;
        assert!(matches!(result, Err(RelayError::MessageTooLong { len: 8, max: 5 })));
        assert!(new_messages(&drain(&mut ha)).is_empty());
        assert_eq!(engine.store().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn concurrent_sends_are_observed_in_append_order_by_everyone() {
        let engine = Arc::new(engine());
        let ids: Vec<ConnectionId> = (0..3).map(|_| ConnectionId::new()).collect();
        let mut handles = Vec::new();
        for id in &ids {
            handles.push(engine.connect(*id).await);
        }

        let mut tasks = Vec::new();
        for (n, id) in ids.iter().enumerate() {
            for i in 0..20 {
                let engine = Arc::clone(&engine);
                let id = *id;
                tasks.push(tokio::spawn(async move {
                    engine
                        .handle_send(id, &format!("user{n}"), &format!("msg {n}-{i}"))
                        .await
                }));
            }
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let stored = engine.store().read_all().await.unwrap();
        assert_eq!(stored.len(), 60);
        for handle in &mut handles {
            let seen = new_messages(&drain(handle));
            assert_eq!(seen, stored);
        }
        assert!(stored.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    }

    #[tokio::test]
    async fn history_is_capped_and_chronological() {
        let engine = engine();
        for i in 0..75 {
            engine.post_message("alice", &format!("msg {i}")).await.unwrap();
        }
        let a = ConnectionId::new();
        let mut ha = engine.connect(a).await;

        engine.handle_history_request(a).await.unwrap();
        let events = drain(&mut ha);
        let ServerEvent::History { messages } = &events[0] else {
            panic!("expected history, got {events:?}");
        };
        assert_eq!(messages.len(), HISTORY_LIMIT as usize);
        assert_eq!(messages[0].body, "msg 25");
        assert_eq!(messages[49].body, "msg 74");
        assert!(messages.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    }

    #[tokio::test]
    async fn store_outage_on_history_sends_empty_history_and_error() {
        let engine = BroadcastEngine::new(FlakyStore::new(0, true), EngineSettings::default());
        let a = ConnectionId::new();
        let mut ha = engine.connect(a).await;

        let result = engine.handle_history_request(a).await;
        assert!(matches!(result, Err(RelayError::StoreUnavailable(_))));

        let events = drain(&mut ha);
        assert_eq!(events[0], ServerEvent::History { messages: vec![] });
        assert!(matches!(&events[1], ServerEvent::Error { code, .. } if code == "STORE_UNAVAILABLE"));
    }

    #[tokio::test]
    async fn transient_append_failure_is_retried() {
        let engine = BroadcastEngine::new(FlakyStore::new(2, false), quick_retry(3));
        let a = ConnectionId::new();
        let mut ha = engine.connect(a).await;

        engine.handle_send(a, "alice", "eventually").await.unwrap();

        let seen = new_messages(&drain(&mut ha));
        assert_eq!(seen.len(), 1);
        assert_eq!(engine.store().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn persistent_append_failure_never_broadcasts() {
        let engine = BroadcastEngine::new(FlakyStore::new(10, false), quick_retry(3));
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        let mut ha = engine.connect(a).await;
        let mut hb = engine.connect(b).await;

        let result = engine.handle_send(a, "alice", "lost").await;
        assert!(matches!(result, Err(RelayError::StoreUnavailable(_))));

        assert!(drain(&mut hb).is_empty());
        let events = drain(&mut ha);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], ServerEvent::Error { code, .. } if code == "STORE_UNAVAILABLE"));
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let engine = engine();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        let mut ha = engine.connect(a).await;
        let _hb = engine.connect(b).await;

        engine.handle_disconnect(&ha).await;
        engine.handle_disconnect(&ha).await;

        let sessions = engine.sessions().await;
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].connection_id, b);
        // Queue sender dropped: the transport sees end of stream.
        assert!(ha.events.recv().await.is_none());
    }

    #[tokio::test]
    async fn disconnect_while_typing_clears_indicator_for_others() {
        let engine = engine();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        let ha = engine.connect(a).await;
        let mut hb = engine.connect(b).await;

        engine.handle_typing_start(a, "alice").await.unwrap();
        drain(&mut hb);

        engine.handle_disconnect(&ha).await;
        assert_eq!(
            drain(&mut hb),
            vec![ServerEvent::UserStopTyping {
                author: "alice".into()
            }]
        );

        engine.handle_disconnect(&ha).await;
        assert!(drain(&mut hb).is_empty());
    }

    #[tokio::test]
    async fn registry_mirrors_open_connections() {
        let engine = engine();
        let ids: Vec<ConnectionId> = (0..5).map(|_| ConnectionId::new()).collect();
        let mut handles = Vec::new();
        for id in &ids {
            handles.push(engine.connect(*id).await);
        }
        engine.handle_disconnect(&handles[1]).await;
        engine.handle_disconnect(&handles[3]).await;

        let open: Vec<ConnectionId> = engine
            .sessions()
            .await
            .iter()
            .map(|s| s.connection_id)
            .collect();
        assert_eq!(open, vec![ids[0], ids[2], ids[4]]);
    }

    #[tokio::test]
    async fn slow_client_is_evicted_without_blocking_others() {
        let engine = BroadcastEngine::new(
            InMemoryMessageStore::new(),
            EngineSettings {
                outbound_buffer: 2,
                ..EngineSettings::default()
            },
        );
        let slow = ConnectionId::new();
        let fast = ConnectionId::new();
        let mut slow_handle = engine.connect(slow).await;
        let mut fast_handle = engine.connect(fast).await;

        for i in 0..3 {
            engine.handle_send(fast, "bob", &format!("msg {i}")).await.unwrap();
            assert_eq!(new_messages(&drain(&mut fast_handle)).len(), 1);
        }

        let open: Vec<ConnectionId> = engine
            .sessions()
            .await
            .iter()
            .map(|s| s.connection_id)
            .collect();
        assert_eq!(open, vec![fast]);

        // The slow client keeps what was queued, then sees end of stream.
        assert_eq!(new_messages(&drain(&mut slow_handle)).len(), 2);
        assert!(slow_handle.events.recv().await.is_none());
    }

    #[tokio::test]
    async fn dropped_receiver_is_pruned_on_next_fan_out() {
        let engine = engine();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        let handle_a = engine.connect(a).await;
        let mut hb = engine.connect(b).await;
        drop(handle_a);

        engine.handle_send(b, "bob", "anyone?").await.unwrap();

        assert_eq!(engine.session_count().await, 1);
        assert_eq!(new_messages(&drain(&mut hb)).len(), 1);
    }

    #[tokio::test]
    async fn send_from_closed_connection_still_completes() {
        let engine = engine();
        let gone = ConnectionId::new();
        let b = ConnectionId::new();
        let mut hb = engine.connect(b).await;

        engine.handle_send(gone, "ghost", "late").await.unwrap();

        assert_eq!(new_messages(&drain(&mut hb)).len(), 1);
        assert_eq!(engine.session_count().await, 1);
    }

    #[tokio::test]
    async fn send_declares_display_name() {
        let engine = engine();
        let a = ConnectionId::new();
        let _ha = engine.connect(a).await;

        engine.handle_send(a, "alice", "hello").await.unwrap();

        assert_eq!(
            engine.sessions().await[0].display_name.as_deref(),
            Some("alice")
        );
    }

    #[tokio::test]
    async fn ping_answers_only_the_caller() {
        let engine = engine();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        let mut ha = engine.connect(a).await;
        let mut hb = engine.connect(b).await;

        engine.dispatch(a, ClientIntent::Ping).await.unwrap();

        assert_eq!(drain(&mut ha), vec![ServerEvent::Pong]);
        assert!(drain(&mut hb).is_empty());
    }

    #[tokio::test]
    async fn post_message_reaches_every_session() {
        let engine = engine();
        let a = ConnectionId::new();
        let mut ha = engine.connect(a).await;

        let message = engine.post_message("api", "from rest").await.unwrap();

        assert_eq!(new_messages(&drain(&mut ha)), vec![message]);
    }

    #[tokio::test]
    async fn duplicate_connect_keeps_single_session() {
        let engine = engine();
        let a = ConnectionId::new();
        let mut first = engine.connect(a).await;
        let _second = engine.connect(a).await;

        assert_eq!(engine.session_count().await, 1);
        assert!(first.events.recv().await.is_none());
    }

    #[tokio::test]
    async fn replaced_handle_does_not_unregister_its_successor() {
        let engine = engine();
        let a = ConnectionId::new();
        let first = engine.connect(a).await;
        let mut second = engine.connect(a).await;

        engine.handle_disconnect(&first).await;
        assert_eq!(engine.session_count().await, 1);

        engine.handle_send(a, "alice", "still here").await.unwrap();
        assert_eq!(new_messages(&drain(&mut second)).len(), 1);

        engine.handle_disconnect(&second).await;
        assert_eq!(engine.session_count().await, 0);
    }

    #[tokio::test]
    async fn evicted_handle_disconnect_is_a_noop() {
        let engine = BroadcastEngine::new(
            InMemoryMessageStore::new(),
            EngineSettings {
                outbound_buffer: 1,
                ..EngineSettings::default()
            },
        );
        let slow = ConnectionId::new();
        let slow_handle = engine.connect(slow).await;
        engine.post_message("bob", "one").await.unwrap();
        engine.post_message("bob", "two").await.unwrap();
        assert_eq!(engine.session_count().await, 0);

        engine.handle_disconnect(&slow_handle).await;
        assert_eq!(engine.session_count().await, 0);
    }

    #[tokio::test]
    async fn empty_author_is_rejected_without_broadcast_or_append() {
        let engine = engine();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        let mut ha = engine.connect(a).await;
        let mut hb = engine.connect(b).await;

        let result = engine.handle_send(a, "  ", "hello").await;
        assert!(matches!(result, Err(RelayError::EmptyAuthor)));
        assert_eq!(engine.store().count().await.unwrap(), 0);
        assert!(drain(&mut hb).is_empty());
        assert!(matches!(
            &drain(&mut ha)[..],
            [ServerEvent::Error { code, .. }] if code == "EMPTY_AUTHOR"
        ));

        let result = engine.post_message("", "hello").await;
        assert!(matches!(result, Err(RelayError::EmptyAuthor)));
        assert_eq!(engine.store().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn typing_without_author_is_rejected() {
        let engine = engine();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        let mut ha = engine.connect(a).await;
        let mut hb = engine.connect(b).await;

        let result = engine.handle_typing_start(a, "").await;
        assert!(matches!(result, Err(RelayError::EmptyAuthor)));
        assert!(drain(&mut hb).is_empty());
        assert!(!engine.sessions().await[0].typing);
        assert_eq!(drain(&mut ha).len(), 1);
    }

    #[tokio::test]
    async fn intents_other_than_send_from_closed_connection_are_dropped() {
        let engine = engine();
        let gone = ConnectionId::new();
        let b = ConnectionId::new();
        let mut hb = engine.connect(b).await;

        let result = engine.handle_typing_start(gone, "ghost").await;
        assert!(matches!(result, Err(RelayError::UnknownConnection(id)) if id == gone));
        let result = engine.handle_history_request(gone).await;
        assert!(matches!(result, Err(RelayError::UnknownConnection(_))));

        assert!(drain(&mut hb).is_empty());
        assert_eq!(engine.session_count().await, 1);
    }

    #[tokio::test]
    async fn query_failures_are_not_retried() {
        struct BrokenStore {
            attempts: AtomicU32,
        }

        impl MessageStore for BrokenStore {
            async fn append(&self, _: &str, _: &str) -> Result<DateTime<Utc>, RepositoryError> {
                self.attempts.fetch_add(1, Ordering::SeqCst);
                Err(RepositoryError::Query("CHECK constraint failed".into()))
            }
            async fn read_recent(&self, _: u32) -> Result<Vec<ChatMessage>, RepositoryError> {
                Ok(Vec::new())
            }
            async fn read_all(&self) -> Result<Vec<ChatMessage>, RepositoryError> {
                Ok(Vec::new())
            }
            async fn count(&self) -> Result<u64, RepositoryError> {
                Ok(0)
            }
        }

        let engine = BroadcastEngine::new(
            BrokenStore {
                attempts: AtomicU32::new(0),
            },
            quick_retry(5),
        );
        let a = ConnectionId::new();
        let _ha = engine.connect(a).await;

        let result = engine.handle_send(a, "alice", "hi").await;
        assert!(matches!(result, Err(RelayError::StoreUnavailable(_))));
        assert_eq!(engine.store().attempts.load(Ordering::SeqCst), 1);
    }
}
