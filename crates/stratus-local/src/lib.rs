//! stratus-local — local filesystem backend for Stratus state.
//!
//! Stores one state document in a file and guards it with an advisory lock
//! that works across independently started processes.
//!
//! # Architecture
//!
//! ```text
//! LocalState
//!   ├── StateStore   read / refresh / write / persist the state file
//!   └── LocalLocker  marker + info file next to the state file
//!         └── LockMarker (symlink on unix, exclusive create elsewhere)
//! ```
//!
//! Typical use:
//!
//! ```no_run
//! use stratus_core::{JsonCodec, State};
//! use stratus_local::LocalState;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut local = LocalState::new("terraform.tfstate", JsonCodec);
//! let lock = local.lock("apply")?;
//! local.refresh_state()?;
//! let state = local.state().unwrap_or_else(|| State::new("lineage"));
//! local.write_state(Some(state))?;
//! local.unlock(lock)?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod local;
pub mod lock;
pub mod store;

pub use error::{LockError, LockResult, StoreError, StoreResult};
pub use local::LocalState;
pub use lock::{LocalLocker, LockHandle, LockInfo, LockMarker, LockPaths};
pub use store::StateStore;
