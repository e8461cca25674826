//! Advisory cross-process lock over a state file.
//!
//! Given a state file at `dir/name.ext` the lock uses two siblings:
//!
//! ```text
//! dir/.name.ext.lock        marker; its existence is the lock
//! dir/.name.ext.lock.info   JSON LockInfo of the current holder
//! ```
//!
//! Acquiring creates the marker first (atomic, see [`LockMarker`]) and then
//! writes the info file. Between those two steps a competitor sees a marker
//! with no info and gets [`LockError::LockedWithoutInfo`]; it never waits or
//! retries. Expiration in [`LockInfo`] is advisory: stale locks are only
//! cleared by [`LocalLocker::force_unlock`].

mod info;
mod marker;

pub use info::LockInfo;
#[cfg(unix)]
pub use marker::SymlinkMarker;
pub use marker::{ExclusiveFileMarker, LockMarker, default_marker};

use std::ffi::{OsStr, OsString};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use stratus_core::Locker;
use stratus_core::config::DEFAULT_LOCK_EXPIRY;
use tracing::{debug, warn};

use crate::error::{LockError, LockResult};

/// Marker and info paths derived from a state path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockPaths {
    pub marker: PathBuf,
    pub info: PathBuf,
}

impl LockPaths {
    /// `dir/name` becomes `dir/.name.lock` and `dir/.name.lock.info`. One
    /// leading dot on `name` is dropped so hidden state files do not get
    /// doubly dotted lock files.
    pub fn for_state(state_path: &Path) -> LockResult<Self> {
        let name = state_path
            .file_name()
            .ok_or_else(|| LockError::InvalidPath(state_path.to_path_buf()))?;
        let name = strip_leading_dot(name);
        let dir = state_path.parent().unwrap_or_else(|| Path::new(""));

        let mut marker = OsString::from(".");
        marker.push(name);
        marker.push(".lock");
        let mut info = marker.clone();
        info.push(".info");

        Ok(Self {
            marker: dir.join(marker),
            info: dir.join(info),
        })
    }
}

#[cfg(unix)]
fn strip_leading_dot(name: &OsStr) -> &OsStr {
    use std::os::unix::ffi::OsStrExt;

    let bytes = name.as_bytes();
    OsStr::from_bytes(bytes.strip_prefix(b".").unwrap_or(bytes))
}

#[cfg(not(unix))]
fn strip_leading_dot(name: &OsStr) -> &OsStr {
    match name.to_str() {
        Some(s) => OsStr::new(s.strip_prefix('.').unwrap_or(s)),
        None => name,
    }
}

/// Proof of a successful [`LocalLocker::lock`], required to release it.
#[derive(Debug)]
#[must_use = "a lock is only released by passing its handle to unlock"]
pub struct LockHandle {
    paths: LockPaths,
    token: String,
}

impl LockHandle {
    pub fn paths(&self) -> &LockPaths {
        &self.paths
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

/// Lock manager for a single state path.
pub struct LocalLocker {
    path: PathBuf,
    expiry: Duration,
    marker: Box<dyn LockMarker>,
}

impl LocalLocker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            expiry: DEFAULT_LOCK_EXPIRY,
            marker: default_marker(),
        }
    }

    /// Advisory lifetime recorded in new lock info.
    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.expiry = expiry;
        self
    }

    pub fn with_marker(mut self, marker: Box<dyn LockMarker>) -> Self {
        self.marker = marker;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Try once to take the lock. Contention is an error, never a wait.
    pub fn lock(&self, reason: &str) -> LockResult<LockHandle> {
        let paths = LockPaths::for_state(&self.path)?;

        match self.marker.create(&paths.marker, &paths.info) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let err = self.contended(&paths);
                warn!(path = ?self.path, error = %err, "state already locked");
                return Err(err);
            }
            Err(source) => {
                return Err(LockError::Acquire {
                    path: self.path.clone(),
                    source,
                });
            }
        }

        // The marker is ours from here on. Competitors arriving before the
        // info file exists get LockedWithoutInfo.
        let info = LockInfo::new(&self.path, reason, self.expiry);
        if let Err(e) = self.write_info(&paths.info, &info) {
            remove_quietly(&paths.marker);
            return Err(e);
        }

        debug!(
            path = ?self.path,
            marker = self.marker.name(),
            id = %info.id,
            reason,
            "state locked"
        );
        Ok(LockHandle {
            paths,
            token: info.id,
        })
    }

    /// Release a lock taken with [`lock`](Self::lock).
    ///
    /// Refuses if the info file names a different holder. Files that are
    /// already gone are not an error.
    pub fn unlock(&self, handle: LockHandle) -> LockResult<()> {
        if let Ok(data) = fs::read(&handle.paths.info) {
            if let Ok(current) = LockInfo::from_json(&data) {
                if current.id != handle.token {
                    return Err(LockError::TokenMismatch {
                        path: self.path.clone(),
                        held_by: current.id,
                        presented: handle.token,
                    });
                }
            }
        }

        remove_lock_files(&handle.paths);
        debug!(path = ?self.path, id = %handle.token, "state unlocked");
        Ok(())
    }

    /// Remove the marker and info file regardless of who holds them.
    ///
    /// This is the operator's recovery path for locks left behind by a
    /// crashed process. A no-op when the state is not locked.
    pub fn force_unlock(&self) -> LockResult<()> {
        let paths = LockPaths::for_state(&self.path)?;
        if remove_lock_files(&paths) {
            warn!(path = ?self.path, "state lock force-released");
        } else {
            debug!(path = ?self.path, "force unlock: state was not locked");
        }
        Ok(())
    }

    /// Current holder, without trying to acquire. `None` when unlocked.
    pub fn lock_info(&self) -> LockResult<Option<LockInfo>> {
        let paths = LockPaths::for_state(&self.path)?;
        match fs::symlink_metadata(&paths.marker) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(LockError::Inspect {
                    path: self.path.clone(),
                    source,
                });
            }
        }
        match self.contended(&paths) {
            LockError::Locked { info, .. } => Ok(Some(*info)),
            err => Err(err),
        }
    }

    /// Describe the current holder for a failed acquire.
    fn contended(&self, paths: &LockPaths) -> LockError {
        let data = match fs::read(&paths.info) {
            Ok(data) => data,
            Err(e) => {
                return LockError::LockedWithoutInfo {
                    path: self.path.clone(),
                    detail: e.to_string(),
                };
            }
        };
        match LockInfo::from_json(&data) {
            Ok(info) => LockError::Locked {
                path: self.path.clone(),
                info: Box::new(info),
            },
            Err(e) => LockError::LockedWithoutInfo {
                path: self.path.clone(),
                detail: format!("could not decode lock info: {e}"),
            },
        }
    }

    fn write_info(&self, info_path: &Path, info: &LockInfo) -> LockResult<()> {
        let data = info.to_json().map_err(|source| LockError::Encode {
            path: self.path.clone(),
            source,
        })?;

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        options
            .open(info_path)
            .and_then(|mut f| f.write_all(&data))
            .map_err(|source| LockError::WriteInfo {
                path: self.path.clone(),
                source,
            })
    }
}

impl Locker for LocalLocker {
    type Lock = LockHandle;
    type Error = LockError;

    fn lock(&self, reason: &str) -> Result<LockHandle, LockError> {
        LocalLocker::lock(self, reason)
    }

    fn unlock(&self, lock: LockHandle) -> Result<(), LockError> {
        LocalLocker::unlock(self, lock)
    }
}

/// Info first: once the marker is gone a new holder may write its own info.
/// Returns whether either file was actually removed.
fn remove_lock_files(paths: &LockPaths) -> bool {
    let info = remove_quietly(&paths.info);
    let marker = remove_quietly(&paths.marker);
    info || marker
}

fn remove_quietly(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) => {
            warn!(?path, error = %e, "failed to remove lock file");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locker_in(dir: &Path) -> LocalLocker {
        LocalLocker::new(dir.join("terraform.tfstate"))
    }

    // ── Path derivation ────────────────────────────────────────────

    #[test]
    fn paths_are_hidden_siblings() {
        let paths = LockPaths::for_state(Path::new("dir/name.ext")).unwrap();
        assert_eq!(paths.marker, PathBuf::from("dir/.name.ext.lock"));
        assert_eq!(paths.info, PathBuf::from("dir/.name.ext.lock.info"));
    }

    #[test]
    fn paths_strip_one_leading_dot() {
        let paths = LockPaths::for_state(Path::new("dir/.hidden")).unwrap();
        assert_eq!(paths.marker, PathBuf::from("dir/.hidden.lock"));
        assert_eq!(paths.info, PathBuf::from("dir/.hidden.lock.info"));
    }

    #[test]
    fn paths_for_bare_file_name() {
        let paths = LockPaths::for_state(Path::new("state.json")).unwrap();
        assert_eq!(paths.marker, PathBuf::from(".state.json.lock"));
    }

    #[test]
    fn paths_are_deterministic() {
        let a = LockPaths::for_state(Path::new("/x/y/s.tfstate")).unwrap();
        let b = LockPaths::for_state(Path::new("/x/y/s.tfstate")).unwrap();
        assert_eq!(a, b);
    }

    #[cfg(unix)]
    #[test]
    fn paths_keep_non_utf8_names_distinct() {
        use std::os::unix::ffi::OsStrExt;

        let a = LockPaths::for_state(Path::new(OsStr::from_bytes(b"d/\xffa.tfstate"))).unwrap();
        let b = LockPaths::for_state(Path::new(OsStr::from_bytes(b"d/\xfea.tfstate"))).unwrap();
        assert_ne!(a.marker, b.marker);
        assert_ne!(a.info, b.info);
        assert_eq!(a.marker.as_os_str().as_bytes(), b"d/.\xffa.tfstate.lock");
        assert_eq!(a.info.as_os_str().as_bytes(), b"d/.\xffa.tfstate.lock.info");

        let hidden = LockPaths::for_state(Path::new(OsStr::from_bytes(b"d/.\xffh"))).unwrap();
        assert_eq!(hidden.marker.as_os_str().as_bytes(), b"d/.\xffh.lock");
    }

    #[test]
    fn empty_path_is_rejected() {
        let err = LockPaths::for_state(Path::new("")).unwrap_err();
        assert!(matches!(err, LockError::InvalidPath(_)));
        let err = LocalLocker::new("").lock("x").unwrap_err();
        assert!(matches!(err, LockError::InvalidPath(_)));
    }

    // ── Acquire / release ──────────────────────────────────────────

    #[test]
    fn lock_writes_marker_and_info() {
        let dir = tempfile::tempdir().unwrap();
        let locker = locker_in(dir.path());

        let handle = locker.lock("apply").unwrap();
        assert!(handle.paths().marker.symlink_metadata().is_ok());

        let info = LockInfo::from_json(&fs::read(&handle.paths().info).unwrap()).unwrap();
        assert_eq!(info.reason, "apply");
        assert_eq!(info.id, handle.token());
        assert!(info.expires > info.time);
    }

    #[cfg(unix)]
    #[test]
    fn info_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let handle = locker_in(dir.path()).lock("x").unwrap();
        let mode = fs::metadata(&handle.paths().info).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn second_lock_reports_first_holder() {
        let dir = tempfile::tempdir().unwrap();
        let locker = locker_in(dir.path());

        let _held = locker.lock("a").unwrap();
        let err = locker.lock("b").unwrap_err();

        assert!(err.is_contention());
        assert_eq!(err.holder().unwrap().reason, "a");
        let msg = err.to_string();
        assert!(msg.contains("reason: a"), "{msg}");
        assert!(!msg.contains("reason: b"), "{msg}");
    }

    #[test]
    fn lock_unlock_lock() {
        let dir = tempfile::tempdir().unwrap();
        let locker = locker_in(dir.path());

        let handle = locker.lock("first").unwrap();
        let paths = handle.paths().clone();
        locker.unlock(handle).unwrap();
        assert!(paths.marker.symlink_metadata().is_err());
        assert!(!paths.info.exists());

        let handle = locker.lock("second").unwrap();
        locker.unlock(handle).unwrap();
    }

    #[test]
    fn unlock_after_files_removed_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let locker = locker_in(dir.path());

        let handle = locker.lock("x").unwrap();
        locker.force_unlock().unwrap();
        locker.unlock(handle).unwrap();
    }

    #[test]
    fn unlock_with_foreign_token_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let locker = locker_in(dir.path());

        let stale = locker.lock("old").unwrap();
        locker.force_unlock().unwrap();
        let current = locker.lock("new").unwrap();

        let err = locker.unlock(stale).unwrap_err();
        assert!(matches!(err, LockError::TokenMismatch { .. }));
        // The current holder keeps the lock.
        assert_eq!(locker.lock_info().unwrap().unwrap().reason, "new");

        locker.unlock(current).unwrap();
        assert!(locker.lock_info().unwrap().is_none());
    }

    #[test]
    fn force_unlock_without_lock_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        locker_in(dir.path()).force_unlock().unwrap();
    }

    #[test]
    fn removal_reports_whether_a_lock_existed() {
        let dir = tempfile::tempdir().unwrap();
        let locker = locker_in(dir.path());
        let paths = LockPaths::for_state(locker.path()).unwrap();
        assert!(!remove_lock_files(&paths));

        let _abandoned = locker.lock("x").unwrap();
        assert!(remove_lock_files(&paths));
        assert!(!remove_lock_files(&paths));

        // A bare marker left by a crash between create and info write.
        default_marker().create(&paths.marker, &paths.info).unwrap();
        assert!(remove_lock_files(&paths));
    }

    #[test]
    fn force_unlock_clears_foreign_lock() {
        let dir = tempfile::tempdir().unwrap();
        let a = locker_in(dir.path());
        let b = locker_in(dir.path());

        let _abandoned = a.lock("crashed").unwrap();
        b.force_unlock().unwrap();
        let handle = b.lock("recovered").unwrap();
        b.unlock(handle).unwrap();
    }

    // ── Contention without metadata ────────────────────────────────

    #[test]
    fn marker_without_info_is_degraded_contention() {
        let dir = tempfile::tempdir().unwrap();
        let locker = locker_in(dir.path());
        let paths = LockPaths::for_state(locker.path()).unwrap();
        default_marker().create(&paths.marker, &paths.info).unwrap();

        let err = locker.lock("b").unwrap_err();
        assert!(matches!(err, LockError::LockedWithoutInfo { .. }));
        assert!(err.is_contention());
        assert!(err.holder().is_none());
    }

    #[test]
    fn corrupt_info_is_degraded_contention() {
        let dir = tempfile::tempdir().unwrap();
        let locker = locker_in(dir.path());
        let handle = locker.lock("a").unwrap();
        fs::write(&handle.paths().info, b"{not json").unwrap();

        let err = locker.lock("b").unwrap_err();
        match err {
            LockError::LockedWithoutInfo { detail, .. } => {
                assert!(detail.contains("decode"), "{detail}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    // ── Failure paths ──────────────────────────────────────────────

    #[test]
    fn missing_directory_is_acquire_error() {
        let dir = tempfile::tempdir().unwrap();
        let locker = LocalLocker::new(dir.path().join("missing/terraform.tfstate"));
        let err = locker.lock("x").unwrap_err();
        assert!(matches!(err, LockError::Acquire { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn lock_info_failure_is_inspect_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        fs::write(&file, b"").unwrap();

        let err = LocalLocker::new(file.join("terraform.tfstate")).lock_info().unwrap_err();
        assert!(matches!(err, LockError::Inspect { .. }), "{err}");
        assert!(!err.is_contention());
        assert!(err.to_string().contains("inspect"), "{err}");
    }

    #[test]
    fn failed_info_write_releases_marker() {
        let dir = tempfile::tempdir().unwrap();
        let locker = locker_in(dir.path());
        let paths = LockPaths::for_state(locker.path()).unwrap();
        fs::create_dir(&paths.info).unwrap();

        let err = locker.lock("x").unwrap_err();
        assert!(matches!(err, LockError::WriteInfo { .. }));
        assert!(paths.marker.symlink_metadata().is_err());
    }

    #[test]
    fn exclusive_file_marker_locks_too() {
        let dir = tempfile::tempdir().unwrap();
        let locker = locker_in(dir.path()).with_marker(Box::new(ExclusiveFileMarker));

        let handle = locker.lock("a").unwrap();
        assert_eq!(locker.lock("b").unwrap_err().holder().unwrap().reason, "a");
        locker.unlock(handle).unwrap();
        locker.unlock(locker.lock("c").unwrap()).unwrap();
    }

    #[test]
    fn configured_expiry_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let locker = locker_in(dir.path()).with_expiry(Duration::from_secs(600));
        let _handle = locker.lock("x").unwrap();

        let info = locker.lock_info().unwrap().unwrap();
        assert_eq!(info.expires - info.time, chrono::Duration::minutes(10));
    }
}
