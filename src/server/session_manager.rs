use crate::crypto::{sha256_digest, AesKey};
use crate::protocol::Envelope;
use crate::session::Session;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Replay digests retained per session. Detection holds for at least this
/// many messages; older digests are evicted oldest-first.
pub const REPLAY_CACHE_DIGESTS: usize = 65_536;

/// Transport-side state for one established HTTP session. The symmetric key
/// is installed at construction and never changes.
pub struct HttpSession {
    pub id: String,
    key: AesKey,
    pub started: DateTime<Utc>,
    /// Operator-plane session this transport feeds.
    pub session: Arc<Session>,
    /// Receiving end of the egress queue, drained by long polls. Concurrent
    /// polls on one session serialize on this lock.
    pub egress: tokio::sync::Mutex<mpsc::UnboundedReceiver<Envelope>>,
    replay: Mutex<ReplayFilter>,
}

impl HttpSession {
    pub fn new(
        key: AesKey,
        session: Arc<Session>,
        egress: mpsc::UnboundedReceiver<Envelope>,
    ) -> Self {
        Self {
            id: new_session_id(),
            key,
            started: Utc::now(),
            session,
            egress: tokio::sync::Mutex::new(egress),
            replay: Mutex::new(ReplayFilter::new(REPLAY_CACHE_DIGESTS)),
        }
    }

    pub fn key(&self) -> &AesKey {
        &self.key
    }

    /// True iff this exact ciphertext blob was already accepted on the
    /// session. The digest is recorded before decryption so a concurrent
    /// retry of the same blob sees the observation.
    pub fn is_replay(&self, ciphertext: &[u8]) -> bool {
        if ciphertext.is_empty() {
            return false;
        }
        self.replay.lock().observe(sha256_digest(ciphertext))
    }
}

struct ReplayFilter {
    seen: HashSet<[u8; 32]>,
    order: VecDeque<[u8; 32]>,
    capacity: usize,
}

impl ReplayFilter {
    fn new(capacity: usize) -> Self {
        Self {
            seen: HashSet::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    fn observe(&mut self, digest: [u8; 32]) -> bool {
        if self.seen.contains(&digest) {
            return true;
        }
        self.seen.insert(digest);
        self.order.push_back(digest);
        if self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        false
    }
}

/// 128-bit random session id rendered as hex.
pub fn new_session_id() -> String {
    let mut buf = [0u8; 16];
    crate::crypto::secure_random(&mut buf);
    hex::encode(buf)
}

/// All currently open HTTP sessions, keyed by session id. Reads clone the
/// Arc so no reference outlives a removal; writes serialize per shard.
pub struct HttpSessionStore {
    active: DashMap<String, Arc<HttpSession>>,
}

impl HttpSessionStore {
    pub fn new() -> Self {
        Self {
            active: DashMap::new(),
        }
    }

    pub fn add(&self, session: Arc<HttpSession>) {
        self.active.insert(session.id.clone(), session);
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<HttpSession>> {
        self.active.get(session_id).map(|s| s.clone())
    }

    pub fn remove(&self, session_id: &str) -> Option<Arc<HttpSession>> {
        self.active.remove(session_id).map(|(_, s)| s)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

impl Default for HttpSessionStore {
    fn default() -> Self {
        Self::new()
    }
}
