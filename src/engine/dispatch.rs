//! Reply routing shared between the receive loop and all live sessions.
//!
//! Each session registers its probe id here before sending anything; the
//! receive loop looks the id up to hand a decoded reply to the right waiter.
//! The entry is removed when the session ends, however it ends.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::PingError;
use crate::probe::Tag;

/// Delivery channel depth. One probe is outstanding per session at a time,
/// but a burst of stale replies between driver polls must not shadow the
/// genuine one, so a few extra slots absorb it. The driver drains and
/// discards stale entries by sequence id.
const CHANNEL_DEPTH: usize = 4;

/// A decoded echo reply on its way to the owning session
#[derive(Debug, Clone, Copy)]
pub(crate) struct Reply {
    pub sequence_id: u32,
    pub received_at: Instant,
}

/// Probe id -> delivery channel registry, cloneable across tasks
#[derive(Clone, Default)]
pub(crate) struct Dispatch {
    entries: Arc<RwLock<HashMap<u32, mpsc::Sender<Reply>>>>,
}

impl Dispatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a probe id and obtain its delivery channel.
    ///
    /// Fails with `DuplicateProbe` if the id is already live; the caller
    /// regenerates and retries.
    pub fn register(&self, probe_id: u32) -> Result<mpsc::Receiver<Reply>, PingError> {
        let mut entries = self.entries.write();
        if entries.contains_key(&probe_id) {
            return Err(PingError::DuplicateProbe(probe_id));
        }

        let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
        entries.insert(probe_id, tx);
        Ok(rx)
    }

    /// Route a reply to the session that owns its probe id.
    ///
    /// Never blocks: an unknown id (expired session, foreign traffic) drops
    /// the reply, and so does a full channel — stalling here would hold up
    /// replies for every other session.
    pub fn deliver(&self, tag: Tag, received_at: Instant) {
        let entries = self.entries.read();
        match entries.get(&tag.probe_id) {
            Some(tx) => {
                let reply = Reply {
                    sequence_id: tag.sequence_id,
                    received_at,
                };
                if tx.try_send(reply).is_err() {
                    trace!(probe_id = tag.probe_id, "delivery channel full or closed, reply dropped");
                }
            }
            None => {
                trace!(probe_id = tag.probe_id, "reply for unknown probe, dropped");
            }
        }
    }

    /// Remove a probe id. Idempotent; safe against a concurrent `deliver`
    /// (which then sees either the entry or its absence, both fine).
    pub fn unregister(&self, probe_id: u32) {
        self.entries.write().remove(&probe_id);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.read().len()
    }
}
