//! Platform implementations of the atomic lock marker.
//!
//! Creating the marker is the single point of mutual exclusion: when two
//! processes race, the filesystem lets exactly one create succeed and the
//! other gets [`io::ErrorKind::AlreadyExists`].

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use tracing::warn;

/// Atomically creates a marker at `marker` that points at `info`.
pub trait LockMarker: Send + Sync {
    /// Fails with [`io::ErrorKind::AlreadyExists`] if the marker is present.
    fn create(&self, marker: &Path, info: &Path) -> io::Result<()>;

    fn name(&self) -> &'static str;
}

/// Dangling symlink from marker to info path. Does not depend on filesystem
/// support for exclusive create.
#[cfg(unix)]
#[derive(Debug, Clone, Copy, Default)]
pub struct SymlinkMarker;

#[cfg(unix)]
impl LockMarker for SymlinkMarker {
    fn create(&self, marker: &Path, info: &Path) -> io::Result<()> {
        std::os::unix::fs::symlink(info, marker)
    }

    fn name(&self) -> &'static str {
        "symlink"
    }
}

/// Regular file created with `O_EXCL` semantics, holding the info path.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExclusiveFileMarker;

impl LockMarker for ExclusiveFileMarker {
    fn create(&self, marker: &Path, info: &Path) -> io::Result<()> {
        let file = OpenOptions::new().write(true).create_new(true).open(marker)?;
        fill_marker(marker, file, info)
    }

    fn name(&self) -> &'static str {
        "exclusive-file"
    }
}

/// Write the info path into a freshly created marker. A marker that could
/// not be filled is removed so a failed create leaves nothing behind.
fn fill_marker(marker: &Path, mut file: impl Write, info: &Path) -> io::Result<()> {
    let Err(e) = file.write_all(info.to_string_lossy().as_bytes()) else {
        return Ok(());
    };
    drop(file);
    if let Err(rm) = fs::remove_file(marker) {
        warn!(path = ?marker, error = %rm, "failed to remove unfilled lock marker");
    }
    Err(e)
}

/// The marker used on this platform.
pub fn default_marker() -> Box<dyn LockMarker> {
    #[cfg(unix)]
    {
        Box::new(SymlinkMarker)
    }
    #[cfg(not(unix))]
    {
        Box::new(ExclusiveFileMarker)
    }
}
