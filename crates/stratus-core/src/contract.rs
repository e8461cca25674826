//! The store contract shared by every state backend.
//!
//! A backend reads, writes, refreshes and persists one [`StateDocument`].
//! Backends that support mutual exclusion also implement [`Locker`]. The
//! local filesystem backend lives in `stratus-local`; remote backends only
//! need to implement these traits.

use crate::state::StateDocument;

/// Associates a backend with its document and error types.
pub trait StateBackend {
    type Document: StateDocument;
    type Error: std::error::Error + Send + Sync + 'static;
}

pub trait StateReader: StateBackend {
    /// A deep copy of the in-memory document, `None` if nothing is loaded.
    fn state(&self) -> Option<Self::Document>;
}

pub trait StateWriter: StateBackend {
    /// Replace the in-memory document. `None` clears it.
    fn write_state(&mut self, doc: Option<Self::Document>) -> Result<(), Self::Error>;
}

pub trait StateRefresher: StateBackend {
    /// Reload the in-memory document from the backing store.
    fn refresh_state(&mut self) -> Result<(), Self::Error>;
}

pub trait StatePersister: StateBackend {
    /// Flush whatever `write_state` staged to the backing store.
    fn persist_state(&mut self) -> Result<(), Self::Error>;
}

/// Everything a caller needs to drive a state backend.
pub trait StateManager: StateReader + StateWriter + StateRefresher + StatePersister {}

impl<T> StateManager for T where T: StateReader + StateWriter + StateRefresher + StatePersister {}

/// Advisory mutual exclusion over a backend's state.
///
/// `lock` hands back a value that must be passed to `unlock`; a backend may
/// refuse to release a lock acquired by somebody else.
pub trait Locker {
    type Lock;
    type Error: std::error::Error + Send + Sync + 'static;

    fn lock(&self, reason: &str) -> Result<Self::Lock, Self::Error>;

    fn unlock(&self, lock: Self::Lock) -> Result<(), Self::Error>;
}
