//! DashMap-based idle session cache.
//!
//! Sessions are keyed by their session id. Capacity is enforced with an
//! atomic slot counter reserved before insertion, so concurrent releases
//! never push the cache past its bound.

use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use uuid::Uuid;

use crate::fossology::session::RemoteSession;

use super::traits::IdleSessionStorage;

/// DashMap-based implementation of [`IdleSessionStorage`].
pub struct DashMapIdleSessions {
    sessions: DashMap<Uuid, Box<dyn RemoteSession>>,
    reserved: AtomicUsize,
    capacity: usize,
}

impl DashMapIdleSessions {
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: DashMap::with_capacity(capacity),
            reserved: AtomicUsize::new(0),
            capacity,
        }
    }

    fn try_reserve(&self) -> bool {
        self.reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.capacity).then_some(n + 1)
            })
            .is_ok()
    }

    fn free_slot(&self) {
        self.reserved.fetch_sub(1, Ordering::AcqRel);
    }
}

impl IdleSessionStorage for DashMapIdleSessions {
    fn push(&self, session: Box<dyn RemoteSession>) -> Result<(), Box<dyn RemoteSession>> {
        if !self.try_reserve() {
            return Err(session);
        }
        let id = session.info().session_id;
        self.sessions.insert(id, session);
        Ok(())
    }

    fn pop(&self) -> Option<Box<dyn RemoteSession>> {
        loop {
            // Key is copied out so the shard guard is released before removal
            let id = self.sessions.iter().next().map(|entry| *entry.key())?;
            if let Some((_, session)) = self.sessions.remove(&id) {
                self.free_slot();
                return Some(session);
            }
        }
    }

    fn drain(&self) -> Vec<Box<dyn RemoteSession>> {
        let mut drained = Vec::with_capacity(self.len());
        while let Some(session) = self.pop() {
            drained.push(session);
        }
        drained
    }

    fn len(&self) -> usize {
        self.sessions.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}
