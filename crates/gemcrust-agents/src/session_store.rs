use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::session::SessionKey;

/// Session types whose accumulated state can be discarded in place.
pub trait Resettable {
    fn reset(&self);
}

/// In-memory map from [`SessionKey`] to a shared session object.
///
/// Backed by a sharded map: operations on unrelated keys do not wait on a
/// single global lock, and creation of a missing entry happens under the
/// shard lock so only one session is ever installed per key.
pub struct SessionStore<S> {
    sessions: DashMap<SessionKey, Arc<S>>,
}

impl<S> Default for SessionStore<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> SessionStore<S> {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    pub fn get(&self, key: &SessionKey) -> Option<Arc<S>> {
        self.sessions.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Return the session for `key`, building it with `factory` if absent.
    ///
    /// Concurrent callers for the same key all receive the same `Arc`; the
    /// factory runs at most once per installed entry.
    pub fn get_or_create<F>(&self, key: SessionKey, factory: F) -> Arc<S>
    where
        F: FnOnce() -> S,
    {
        let entry = self.sessions.entry(key).or_insert_with(|| {
            debug!("no session found, creating a new one");
            Arc::new(factory())
        });
        Arc::clone(entry.value())
    }

    /// Install `session` under `key`, returning the previous one.
    pub fn replace(&self, key: SessionKey, session: S) -> Option<Arc<S>> {
        self.sessions.insert(key, Arc::new(session))
    }

    pub fn remove(&self, key: &SessionKey) -> Option<Arc<S>> {
        self.sessions.remove(key).map(|(_, session)| session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl<S: Resettable> SessionStore<S> {
    /// Discard the history of the session under `key`, keeping the slot.
    /// Returns whether a session existed.
    pub fn clear(&self, key: &SessionKey) -> bool {
        match self.get(key) {
            Some(session) => {
                session.reset();
                true
            }
            None => false,
        }
    }
}
