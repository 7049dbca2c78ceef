//! Storage trait for idle sessions.

use crate::fossology::session::RemoteSession;

/// Bounded cache of idle sessions.
///
/// Implementations must be thread-safe (`Send + Sync`) for use across
/// async tasks.
pub trait IdleSessionStorage: Send + Sync {
    /// Cache a session. A full cache hands the session back to the caller.
    fn push(&self, session: Box<dyn RemoteSession>) -> Result<(), Box<dyn RemoteSession>>;

    /// Take any cached session.
    fn pop(&self) -> Option<Box<dyn RemoteSession>>;

    /// Remove and return every cached session.
    fn drain(&self) -> Vec<Box<dyn RemoteSession>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn capacity(&self) -> usize;
}
