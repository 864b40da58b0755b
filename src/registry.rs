//! Registry of connected WebSocket sessions
//!
//! Each session owns a bounded outbound queue drained by a writer task. A session counts as open
//! while that writer is still alive, which is what broadcast checks before sending. A session
//! whose queue fills up has stopped reading and is evicted.

use axum::extract::ws::Message;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};

use crate::error::{RelayError, RelayResult};
use crate::protocol::ServerMessage;

/// Messages that may wait for a single client's writer before it counts as stalled
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

pub type ClientSender = mpsc::Sender<Message>;
pub type ClientReceiver = mpsc::Receiver<Message>;

/// Identifier of a connected client, increasing in connection order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId(u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// One live WebSocket session as seen by the registry
#[derive(Debug, Clone)]
pub struct Session {
    id: ClientId,
    sender: ClientSender,
}

enum Delivery {
    Queued,
    Closed,
    Stalled,
}

impl Session {
    pub fn new(id: ClientId, sender: ClientSender) -> Self {
        Self { id, sender }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Whether the transport behind this session can still accept messages
    pub fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }

    fn deliver(&self, message: Message) -> Delivery {
        match self.sender.try_send(message) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
            Err(TrySendError::Full(_)) => Delivery::Stalled,
        }
    }

    fn transport_error(&self, reason: &str) -> RelayError {
        RelayError::Transport {
            client_id: self.id,
            reason: reason.to_string(),
        }
    }
}

/// Outcome of a single broadcast
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    /// Sessions that were closed, closing, or stalled (the latter are also evicted)
    pub skipped: usize,
}

/// Set of sessions currently eligible to receive broadcasts
#[derive(Debug, Clone)]
pub struct ConnectionRegistry {
    sessions: Arc<RwLock<BTreeMap<ClientId, Session>>>,
    next_id: Arc<AtomicU64>,
    queue_capacity: usize,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::with_queue_capacity(OUTBOUND_QUEUE_CAPACITY)
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry whose sessions buffer at most `capacity` outbound messages each
    pub fn with_queue_capacity(capacity: usize) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(BTreeMap::new())),
            next_id: Arc::new(AtomicU64::new(0)),
            queue_capacity: capacity.max(1),
        }
    }

    /// Allocate a fresh client ID
    pub fn next_client_id(&self) -> ClientId {
        ClientId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Create a session with its outbound queue and register it
    pub async fn open_session(&self) -> (Session, ClientReceiver) {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let session = Session::new(self.next_client_id(), tx);
        self.register(session.clone()).await;
        (session, rx)
    }

    /// Add a session. Registering the same ID twice keeps a single entry.
    pub async fn register(&self, session: Session) {
        let mut sessions = self.sessions.write().await;
        if sessions.insert(session.id, session).is_some() {
            tracing::debug!("Session re-registered, replaced previous entry");
        }
    }

    /// Remove a session. Returns whether it was registered; removing twice is a no-op.
    pub async fn unregister(&self, id: ClientId) -> bool {
        self.sessions.write().await.remove(&id).is_some()
    }

    /// Send to every open session in registration order, optionally skipping one
    ///
    /// Sessions that have closed, or close while the broadcast runs, are counted as skipped and
    /// never abort delivery to the rest. Sessions whose queue is full are skipped and evicted.
    pub async fn broadcast(
        &self,
        message: &ServerMessage,
        exclude: Option<ClientId>,
    ) -> RelayResult<BroadcastReport> {
        let json = message.to_json()?;
        let mut report = BroadcastReport::default();
        let mut stalled = Vec::new();

        {
            let sessions = self.sessions.read().await;
            for session in sessions.values() {
                if Some(session.id) == exclude {
                    continue;
                }
                if !session.is_open() {
                    report.skipped += 1;
                    continue;
                }
                match session.deliver(Message::Text(json.clone().into())) {
                    Delivery::Queued => report.delivered += 1,
                    Delivery::Closed => {
                        let err = session.transport_error("closed during broadcast");
                        tracing::warn!(error = %err, "Skipping closing session");
                        report.skipped += 1;
                    }
                    Delivery::Stalled => {
                        report.skipped += 1;
                        stalled.push(session.id);
                    }
                }
            }
        }

        self.evict(&stalled).await;
        Ok(report)
    }

    /// Queue a message for a single session. Returns false if it is gone, closed or stalled.
    pub async fn send_to(&self, id: ClientId, message: &ServerMessage) -> RelayResult<bool> {
        let json = message.to_json()?;

        let delivery = {
            let sessions = self.sessions.read().await;
            let Some(session) = sessions.get(&id) else {
                tracing::debug!(client_id = %id, "Direct send to unknown session");
                return Ok(false);
            };
            session.deliver(Message::Text(json.into()))
        };

        match delivery {
            Delivery::Queued => Ok(true),
            Delivery::Closed => {
                tracing::warn!(client_id = %id, "Direct send to closing session");
                Ok(false)
            }
            Delivery::Stalled => {
                self.evict(&[id]).await;
                Ok(false)
            }
        }
    }

    async fn evict(&self, ids: &[ClientId]) {
        if ids.is_empty() {
            return;
        }
        let mut sessions = self.sessions.write().await;
        for id in ids {
            if let Some(session) = sessions.remove(id) {
                let err = session.transport_error("outbound queue full");
                tracing::warn!(
                    error = %err,
                    capacity = self.queue_capacity,
                    "Evicting session that stopped reading"
                );
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub async fn contains(&self, id: ClientId) -> bool {
        self.sessions.read().await.contains_key(&id)
    }
}
