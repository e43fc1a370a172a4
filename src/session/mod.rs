pub mod handlers;

use crate::protocol::Envelope;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Operator-plane view of a live implant session. The transport attaches
/// the egress channel and response table; the operator plane enqueues
/// envelopes and awaits replies by request id.
pub struct Session {
    pub id: u32,
    pub transport: String,
    pub remote_address: String,
    pub started: DateTime<Utc>,
    send: mpsc::UnboundedSender<Envelope>,
    resp: RwLock<HashMap<u64, mpsc::Sender<Envelope>>>,
    last_checkin: Mutex<DateTime<Utc>>,
}

impl Session {
    pub fn update_checkin(&self) {
        *self.last_checkin.lock() = Utc::now();
    }

    pub fn last_checkin(&self) -> DateTime<Utc> {
        *self.last_checkin.lock()
    }

    /// Enqueue an envelope for the implant; delivered by the next long poll.
    pub fn send(&self, envelope: Envelope) -> bool {
        self.send.send(envelope).is_ok()
    }

    /// Open a single-shot reply slot for a request id. The caller owns the
    /// receiver and must deregister the id once it has its reply.
    pub fn register_resp(&self, id: u64) -> mpsc::Receiver<Envelope> {
        let (tx, rx) = mpsc::channel(1);
        self.resp.write().insert(id, tx);
        rx
    }

    pub fn deregister_resp(&self, id: u64) {
        self.resp.write().remove(&id);
    }

    /// Deliver an implant reply to the waiting caller. The table entry is
    /// left in place; removal is the receiving caller's job.
    pub fn dispatch_resp(&self, envelope: Envelope) -> bool {
        let resp = self.resp.read();
        match resp.get(&envelope.id) {
            Some(tx) => tx.try_send(envelope).is_ok(),
            None => false,
        }
    }
}

/// Process-wide registry of implant sessions, shared by every transport.
pub struct SessionRegistry {
    sessions: DashMap<u32, Arc<Session>>,
    next_id: AtomicU32,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            next_id: AtomicU32::new(1),
        }
    }

    /// Register a new session; the returned receiver is the transport's
    /// end of the egress queue.
    pub fn add(
        &self,
        transport: impl Into<String>,
        remote_address: impl Into<String>,
    ) -> (Arc<Session>, mpsc::UnboundedReceiver<Envelope>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Arc::new(Session {
            id,
            transport: transport.into(),
            remote_address: remote_address.into(),
            started: Utc::now(),
            send: tx,
            resp: RwLock::new(HashMap::new()),
            last_checkin: Mutex::new(Utc::now()),
        });
        self.sessions.insert(id, session.clone());
        tracing::info!(
            session = id,
            transport = %session.transport,
            remote = %session.remote_address,
            "Session registered"
        );
        (session, rx)
    }

    pub fn get(&self, id: u32) -> Option<Arc<Session>> {
        self.sessions.get(&id).map(|s| s.clone())
    }

    pub fn remove(&self, id: u32) -> Option<Arc<Session>> {
        let removed = self.sessions.remove(&id).map(|(_, s)| s);
        if removed.is_some() {
            tracing::info!(session = id, "Session removed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MSG_PING;

    #[tokio::test]
    async fn test_egress_queue_delivery() {
        let registry = SessionRegistry::new();
        let (session, mut rx) = registry.add("http(s)", "127.0.0.1:9999");
        assert!(session.send(Envelope::new(0, MSG_PING, vec![1, 2, 3])));
        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.data, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_resp_table_single_shot() {
        let registry = SessionRegistry::new();
        let (session, _rx) = registry.add("http(s)", "127.0.0.1:9999");

        let mut reply_rx = session.register_resp(42);
        assert!(session.dispatch_resp(Envelope::new(42, 0, b"reply".to_vec())));
        let reply = reply_rx.recv().await.unwrap();
        assert_eq!(reply.data, b"reply");

        // The entry survives delivery; the caller removes it.
        session.deregister_resp(42);
        assert!(!session.dispatch_resp(Envelope::new(42, 0, Vec::new())));
    }

    #[test]
    fn test_dispatch_without_waiter() {
        let registry = SessionRegistry::new();
        let (session, _rx) = registry.add("http(s)", "127.0.0.1:9999");
        assert!(!session.dispatch_resp(Envelope::new(99, 0, Vec::new())));
    }

    #[test]
    fn test_ids_are_unique() {
        let registry = SessionRegistry::new();
        let (a, _rx_a) = registry.add("http(s)", "a");
        let (b, _rx_b) = registry.add("http(s)", "b");
        assert_ne!(a.id, b.id);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_remove() {
        let registry = SessionRegistry::new();
        let (session, _rx) = registry.add("http(s)", "a");
        assert!(registry.remove(session.id).is_some());
        assert!(registry.get(session.id).is_none());
        assert!(registry.remove(session.id).is_none());
    }

    #[tokio::test]
    async fn test_concurrent_add_remove_get() {
        let registry = Arc::new(SessionRegistry::new());
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..250 {
                    let (session, _rx) = registry.add("http(s)", "stress");
                    let seen = registry.get(session.id).expect("just added");
                    // Never observe a partially constructed session.
                    assert_eq!(seen.transport, "http(s)");
                    assert_eq!(seen.remote_address, "stress");
                    registry.remove(session.id);
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert!(registry.is_empty());
    }
}
