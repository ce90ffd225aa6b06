//! Session registry
//!
//! The listener tracks every live session under a unique identifier so the
//! whole set can be torn down at shutdown and so a finished session can
//! deregister itself. Identifiers are allocated by a wrap-around cursor
//! with an occupancy check, so an id is never handed out twice while its
//! session is alive.

use std::collections::HashMap;
use std::sync::Mutex;
use tokio::task::AbortHandle;
use tracing::info;

/// Identifier of a live session, unique within one registry
pub type SessionId = u64;

struct RegistryInner {
    next_id: SessionId,
    sessions: HashMap<SessionId, Option<AbortHandle>>,
}

/// Registry of the sessions spawned by one listener.
///
/// The registry holds the strong side of the relation: sessions keep only a
/// `Weak` handle back to it, used for self-removal, and survive the
/// registry being dropped. All operations are short map manipulations under
/// a mutex and are safe from any task.
pub struct SessionRegistry {
    inner: Mutex<RegistryInner>,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        SessionRegistry {
            inner: Mutex::new(RegistryInner {
                next_id: 0,
                sessions: HashMap::new(),
            }),
        }
    }

    /// Reserve the next free session identifier.
    ///
    /// The slot is held from this call on, so the id stays unique even if
    /// the session task finishes before its abort handle is attached.
    /// Returns `None` when every identifier is occupied.
    pub fn acquire_id(&self) -> Option<SessionId> {
        let mut inner = self.inner.lock().unwrap();
        let start = inner.next_id;

        loop {
            let id = inner.next_id;
            inner.next_id = inner.next_id.wrapping_add(1);

            if !inner.sessions.contains_key(&id) {
                inner.sessions.insert(id, None);
                return Some(id);
            }

            if inner.next_id == start {
                return None;
            }
        }
    }

    /// Attach the session task's abort handle to a reserved identifier.
    ///
    /// A no-op when the session already removed itself, which can happen
    /// when a client disconnects before the listener finishes registration.
    pub fn attach(&self, id: SessionId, handle: AbortHandle) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(slot) = inner.sessions.get_mut(&id) {
            *slot = Some(handle);
        }
    }

    /// Remove a session from the registry.
    ///
    /// Returns true when the identifier was present. Called exactly once
    /// per session, on its own way out.
    pub fn remove(&self, id: SessionId) -> bool {
        let removed = self.inner.lock().unwrap().sessions.remove(&id).is_some();
        if removed {
            info!("Session {} removed", id);
        }
        removed
    }

    /// Stop every live session by aborting its task.
    ///
    /// Aborting drops the session future and with it every socket it owns,
    /// so in-flight operations resolve as cancelled.
    pub fn stop_all(&self) {
        let mut inner = self.inner.lock().unwrap();
        for (_, handle) in inner.sessions.drain() {
            if let Some(handle) = handle {
                handle.abort();
            }
        }
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().sessions.len()
    }

    /// True when no session is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
