//! The state document and the codec that moves it on and off disk.
//!
//! Stores treat the document as opaque: they only clone it, ask whether it
//! has diverged from the last copy they read, and hand it to a
//! [`StateCodec`]. [`State`] and [`JsonCodec`] are the shipped
//! implementations.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Current on-disk format version written by [`JsonCodec`].
pub const STATE_VERSION: u32 = 1;

/// A versioned snapshot whose serial number is managed by the document itself.
pub trait StateDocument: Clone {
    /// Current serial number.
    fn serial(&self) -> u64;

    /// True if the content differs from `previous` in any way that should
    /// produce a new serial.
    fn has_diverged(&self, previous: &Self) -> bool;

    /// Advance the serial relative to `previous`.
    fn advance_serial(&mut self, previous: &Self);

    /// Bump the serial if and only if the document diverged from `previous`.
    ///
    /// Nothing happens without a baseline, or when this document is already
    /// ahead of it.
    fn increment_serial_maybe(&mut self, previous: Option<&Self>) {
        let Some(previous) = previous else {
            return;
        };
        if self.serial() > previous.serial() {
            return;
        }
        if self.has_diverged(previous) {
            self.advance_serial(previous);
        }
    }
}

/// Errors produced while encoding or decoding a state document.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("state encoding error: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("state decoding error: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("unsupported state version {found} (max supported {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("state I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Serializes a [`StateDocument`] to and from a byte stream.
pub trait StateCodec {
    type Document: StateDocument;

    fn encode(&self, doc: &Self::Document, writer: &mut dyn Write) -> Result<(), CodecError>;

    fn decode(&self, reader: &mut dyn Read) -> Result<Self::Document, CodecError>;
}

/// Last-known configuration of managed resources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub version: u32,
    pub serial: u64,
    /// Identity of this state's history; unrelated states have distinct lineages.
    #[serde(default)]
    pub lineage: String,
    #[serde(default)]
    pub resources: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub outputs: BTreeMap<String, serde_json::Value>,
}

impl State {
    pub fn new(lineage: impl Into<String>) -> Self {
        Self {
            version: STATE_VERSION,
            serial: 0,
            lineage: lineage.into(),
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    pub fn with_resource(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.resources.insert(name.into(), value);
        self
    }

    pub fn with_output(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.outputs.insert(name.into(), value);
        self
    }

    /// True if no resources or outputs are recorded.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty() && self.outputs.is_empty()
    }
}

impl StateDocument for State {
    fn serial(&self) -> u64 {
        self.serial
    }

    fn has_diverged(&self, previous: &Self) -> bool {
        self.version != previous.version
            || self.lineage != previous.lineage
            || self.resources != previous.resources
            || self.outputs != previous.outputs
    }

    fn advance_serial(&mut self, previous: &Self) {
        self.serial = self.serial.max(previous.serial) + 1;
    }
}

/// Pretty-printed JSON codec for [`State`].
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl StateCodec for JsonCodec {
    type Document = State;

    fn encode(&self, doc: &State, writer: &mut dyn Write) -> Result<(), CodecError> {
        serde_json::to_writer_pretty(&mut *writer, doc).map_err(CodecError::Encode)?;
        writer.write_all(b"\n")?;
        Ok(())
    }

    fn decode(&self, reader: &mut dyn Read) -> Result<State, CodecError> {
        let state: State = serde_json::from_reader(reader).map_err(CodecError::Decode)?;
        if state.version > STATE_VERSION {
            return Err(CodecError::UnsupportedVersion {
                found: state.version,
                supported: STATE_VERSION,
            });
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_state() -> State {
        State::new("lineage-1").with_resource("aws_instance.web", json!({"id": "i-123"}))
    }

    #[test]
    fn json_codec_round_trip() {
        let state = test_state().with_output("ip", json!("10.0.0.1"));
        let mut buf = Vec::new();
        JsonCodec.encode(&state, &mut buf).unwrap();

        let decoded = JsonCodec.decode(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, state);
    }

    #[test]
    fn decode_garbage_fails() {
        let err = JsonCodec.decode(&mut &b"not json"[..]).unwrap_err();
        assert!(matches!(err, CodecError::Decode(_)));
    }

    #[test]
    fn decode_rejects_future_version() {
        let data = br#"{"version": 99, "serial": 1}"#;
        let err = JsonCodec.decode(&mut &data[..]).unwrap_err();
        assert!(matches!(
            err,
            CodecError::UnsupportedVersion { found: 99, supported: 1 }
        ));
    }

    #[test]
    fn serial_ignored_when_comparing() {
        let a = test_state();
        let mut b = a.clone();
        b.serial = 7;
        assert!(!b.has_diverged(&a));
    }

    #[test]
    fn increment_serial_on_change() {
        let previous = test_state();
        let mut next = previous.clone().with_resource("aws_eip.ip", json!({}));
        next.increment_serial_maybe(Some(&previous));
        assert_eq!(next.serial, 1);
    }

    #[test]
    fn increment_serial_skipped_when_equal() {
        let previous = test_state();
        let mut next = previous.clone();
        next.increment_serial_maybe(Some(&previous));
        assert_eq!(next.serial, 0);
    }

    #[test]
    fn increment_serial_skipped_without_baseline() {
        let mut state = test_state();
        state.increment_serial_maybe(None);
        assert_eq!(state.serial, 0);
    }

    #[test]
    fn increment_serial_catches_up_to_previous() {
        let mut previous = test_state();
        previous.serial = 5;
        let mut next = test_state().with_output("x", json!(1));
        next.serial = 5;
        next.increment_serial_maybe(Some(&previous));
        assert_eq!(next.serial, 6);
    }

    #[test]
    fn increment_serial_skipped_when_already_ahead() {
        let previous = test_state();
        let mut next = test_state().with_output("x", json!(1));
        next.serial = 3;
        next.increment_serial_maybe(Some(&previous));
        assert_eq!(next.serial, 3);
    }
}
