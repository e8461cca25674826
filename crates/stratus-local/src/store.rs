//! StateStore — single-document state persistence on the local filesystem.
//!
//! The store keeps the in-memory document, the copy last read (or written),
//! and whether this handle has written yet. Writes go straight to disk; the
//! store does no locking of its own, see [`crate::lock`].

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use stratus_core::{
    StateBackend, StateCodec, StateDocument, StatePersister, StateReader, StateRefresher,
    StateWriter,
};
use tracing::debug;

use crate::error::{StoreError, StoreResult};

/// File-backed state store.
///
/// Reads come from `path`. Writes go to `path_out` when set, otherwise to
/// `path`; once this handle has written, `path_out` is also where later
/// refreshes read from.
pub struct StateStore<C: StateCodec> {
    path: PathBuf,
    path_out: Option<PathBuf>,
    codec: C,
    state: Option<C::Document>,
    read_state: Option<C::Document>,
    written: bool,
}

impl<C: StateCodec> StateStore<C> {
    pub fn new(path: impl Into<PathBuf>, codec: C) -> Self {
        Self {
            path: path.into(),
            path_out: None,
            codec,
            state: None,
            read_state: None,
            written: false,
        }
    }

    /// Write to `path_out` instead of the primary path. An empty path means
    /// no separate output.
    pub fn with_output(mut self, path_out: impl Into<PathBuf>) -> Self {
        let path_out = path_out.into();
        self.path_out = (!path_out.as_os_str().is_empty()).then_some(path_out);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn path_out(&self) -> Option<&Path> {
        self.path_out.as_deref()
    }

    /// Where the next write lands.
    pub fn write_path(&self) -> &Path {
        self.path_out.as_deref().unwrap_or(&self.path)
    }

    /// Where the next refresh reads from.
    pub fn read_path(&self) -> &Path {
        match &self.path_out {
            Some(out) if self.written => out,
            _ => &self.path,
        }
    }

    pub fn has_written(&self) -> bool {
        self.written
    }

    /// Force the in-memory document without touching disk.
    pub fn set_state(&mut self, doc: Option<C::Document>) {
        self.read_state = doc.clone();
        self.state = doc;
    }

    /// Independent copy of the in-memory document.
    pub fn state(&self) -> Option<C::Document> {
        self.state.clone()
    }

    /// Load the document from disk. A missing file loads as `None`.
    pub fn refresh_state(&mut self) -> StoreResult<()> {
        let path = self.read_path().to_path_buf();

        let state = match File::open(&path) {
            Ok(file) => Some(self.codec.decode(&mut BufReader::new(file))?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(StoreError::io("open", &path)(e)),
        };

        debug!(
            ?path,
            found = state.is_some(),
            serial = state.as_ref().map(StateDocument::serial),
            "state refreshed"
        );
        self.read_state = state.clone();
        self.state = state;
        Ok(())
    }

    /// Replace the in-memory document and persist it.
    ///
    /// `None` deletes the state file. Otherwise the serial is advanced if
    /// the document diverged from the last one read or written, and the
    /// file is rewritten in place.
    pub fn write_state(&mut self, doc: Option<C::Document>) -> StoreResult<()> {
        self.state = doc;
        let path = self.write_path().to_path_buf();

        let Some(state) = self.state.as_mut() else {
            return match fs::remove_file(&path) {
                Ok(()) => {
                    debug!(?path, "state file removed");
                    Ok(())
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(StoreError::io("remove", &path)(e)),
            };
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(StoreError::io("create directory", parent))?;
        }

        // Held until the encode completes.
        let file = File::create(&path).map_err(StoreError::io("create", &path))?;

        state.increment_serial_maybe(self.read_state.as_ref());
        self.read_state = Some(state.clone());

        let mut writer = BufWriter::new(file);
        self.codec.encode(state, &mut writer)?;
        let file = writer
            .into_inner()
            .map_err(|e| StoreError::io("write", &path)(e.into_error()))?;
        file.sync_all().map_err(StoreError::io("sync", &path))?;

        debug!(?path, serial = state.serial(), "state written");
        self.written = true;
        Ok(())
    }

    /// No-op: [`write_state`](Self::write_state) already persisted.
    pub fn persist_state(&mut self) -> StoreResult<()> {
        Ok(())
    }
}

impl<C: StateCodec> StateBackend for StateStore<C> {
    type Document = C::Document;
    type Error = StoreError;
}

impl<C: StateCodec> StateReader for StateStore<C> {
    fn state(&self) -> Option<C::Document> {
        StateStore::state(self)
    }
}

impl<C: StateCodec> StateWriter for StateStore<C> {
    fn write_state(&mut self, doc: Option<C::Document>) -> StoreResult<()> {
        StateStore::write_state(self, doc)
    }
}

impl<C: StateCodec> StateRefresher for StateStore<C> {
    fn refresh_state(&mut self) -> StoreResult<()> {
        StateStore::refresh_state(self)
    }
}

impl<C: StateCodec> StatePersister for StateStore<C> {
    fn persist_state(&mut self) -> StoreResult<()> {
        StateStore::persist_state(self)
    }
}
