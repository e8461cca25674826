//! Lock metadata written next to the lock marker.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who holds a lock, since when, and why.
///
/// `expires` is advisory: it is recorded for operators and never acted on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockInfo {
    /// Opaque token identifying this acquisition.
    pub id: String,
    pub time: DateTime<Utc>,
    pub expires: DateTime<Utc>,
    pub reason: String,
    /// `user@host` of the acquiring process.
    #[serde(default)]
    pub who: String,
    /// State file the lock protects.
    #[serde(default)]
    pub path: String,
}

impl LockInfo {
    pub fn new(state_path: &Path, reason: &str, expiry: Duration) -> Self {
        let time = Utc::now();
        let expires = chrono::Duration::from_std(expiry)
            .ok()
            .and_then(|d| time.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            id: new_token(),
            time,
            expires,
            reason: reason.to_string(),
            who: who(),
            path: state_path.display().to_string(),
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }

    pub fn from_json(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

/// 16 random bytes, hex encoded. Falls back to time and pid if the OS RNG
/// is unavailable.
fn new_token() -> String {
    let mut buf = [0u8; 16];
    if getrandom::getrandom(&mut buf).is_err() {
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        buf[..8].copy_from_slice(&nanos.to_le_bytes());
        buf[8..12].copy_from_slice(&std::process::id().to_le_bytes());
    }
    hex::encode(buf)
}

fn who() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());
    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    format!("{user}@{host}")
}
