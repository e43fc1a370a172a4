use super::Session;
use crate::protocol::{MSG_PING, MSG_REGISTER};
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::Arc;

/// Handler for unsolicited envelopes (id == 0), keyed by envelope kind.
pub type SessionHandler = fn(&Arc<Session>, &[u8]);

lazy_static! {
    static ref SESSION_HANDLERS: HashMap<u32, SessionHandler> = {
        let mut handlers: HashMap<u32, SessionHandler> = HashMap::new();
        handlers.insert(MSG_PING, ping_handler);
        handlers.insert(MSG_REGISTER, register_handler);
        handlers
    };
}

pub fn session_handlers() -> &'static HashMap<u32, SessionHandler> {
    &SESSION_HANDLERS
}

fn ping_handler(session: &Arc<Session>, _data: &[u8]) {
    tracing::debug!(session = session.id, "Ping");
    session.update_checkin();
}

fn register_handler(session: &Arc<Session>, data: &[u8]) {
    tracing::info!(
        session = session.id,
        bytes = data.len(),
        "Registration metadata received"
    );
    session.update_checkin();
}
