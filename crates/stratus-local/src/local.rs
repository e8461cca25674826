//! LocalState — the local backend handle.
//!
//! Bundles a [`StateStore`] and a [`LocalLocker`] over the same state path.
//! The two never call into each other; callers lock, refresh, write and
//! unlock in that order themselves.

use std::path::PathBuf;

use stratus_core::{
    Locker, StateBackend, StateCodec, StatePersister, StateReader, StateRefresher, StateWriter,
    StratusConfig,
};

use crate::error::{LockError, LockResult, StoreError, StoreResult};
use crate::lock::{LocalLocker, LockHandle, LockInfo};
use crate::store::StateStore;

pub struct LocalState<C: StateCodec> {
    store: StateStore<C>,
    locker: LocalLocker,
}

impl<C: StateCodec> LocalState<C> {
    pub fn new(path: impl Into<PathBuf>, codec: C) -> Self {
        let path = path.into();
        Self {
            locker: LocalLocker::new(path.clone()),
            store: StateStore::new(path, codec),
        }
    }

    /// Build from a parsed `stratus.toml`.
    pub fn from_config(config: &StratusConfig, codec: C) -> Result<Self, stratus_core::ConfigError> {
        let mut local = Self::new(config.state.path.clone(), codec);
        if let Some(out) = &config.state.output {
            local.store = local.store.with_output(out.clone());
        }
        local.locker = local.locker.with_expiry(config.lock_expiry()?);
        Ok(local)
    }

    pub fn with_output(mut self, path_out: impl Into<PathBuf>) -> Self {
        self.store = self.store.with_output(path_out);
        self
    }

    pub fn with_locker(mut self, locker: LocalLocker) -> Self {
        self.locker = locker;
        self
    }

    pub fn store(&self) -> &StateStore<C> {
        &self.store
    }

    pub fn locker(&self) -> &LocalLocker {
        &self.locker
    }

    pub fn set_state(&mut self, doc: Option<C::Document>) {
        self.store.set_state(doc);
    }

    pub fn state(&self) -> Option<C::Document> {
        self.store.state()
    }

    pub fn refresh_state(&mut self) -> StoreResult<()> {
        self.store.refresh_state()
    }

    pub fn write_state(&mut self, doc: Option<C::Document>) -> StoreResult<()> {
        self.store.write_state(doc)
    }

    pub fn persist_state(&mut self) -> StoreResult<()> {
        self.store.persist_state()
    }

    pub fn lock(&self, reason: &str) -> LockResult<LockHandle> {
        self.locker.lock(reason)
    }

    pub fn unlock(&self, handle: LockHandle) -> LockResult<()> {
        self.locker.unlock(handle)
    }

    pub fn force_unlock(&self) -> LockResult<()> {
        self.locker.force_unlock()
    }

    pub fn lock_info(&self) -> LockResult<Option<LockInfo>> {
        self.locker.lock_info()
    }
}

impl<C: StateCodec> StateBackend for LocalState<C> {
    type Document = C::Document;
    type Error = StoreError;
}

impl<C: StateCodec> StateReader for LocalState<C> {
    fn state(&self) -> Option<C::Document> {
        LocalState::state(self)
    }
}

impl<C: StateCodec> StateWriter for LocalState<C> {
    fn write_state(&mut self, doc: Option<C::Document>) -> StoreResult<()> {
        LocalState::write_state(self, doc)
    }
}

impl<C: StateCodec> StateRefresher for LocalState<C> {
    fn refresh_state(&mut self) -> StoreResult<()> {
        LocalState::refresh_state(self)
    }
}

impl<C: StateCodec> StatePersister for LocalState<C> {
    fn persist_state(&mut self) -> StoreResult<()> {
        LocalState::persist_state(self)
    }
}

impl<C: StateCodec> Locker for LocalState<C> {
    type Lock = LockHandle;
    type Error = LockError;

    fn lock(&self, reason: &str) -> LockResult<LockHandle> {
        LocalState::lock(self, reason)
    }

    fn unlock(&self, lock: LockHandle) -> LockResult<()> {
        LocalState::unlock(self, lock)
    }
}
