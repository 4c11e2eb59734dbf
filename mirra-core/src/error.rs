//! Domain-specific error types for mirra.
//!
//! All fallible operations return `Result<T, MirrorError>`.
//! Bootstrap failures are grouped under [`MirrorError::is_connection_error`];
//! "would block" reads never surface as errors (see [`crate::channel::ReadOutcome`]).

use std::time::Duration;
use thiserror::Error;

use crate::events::EventKind;

/// Error type returned by subscriber callbacks.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type returned by subscriber callbacks.
pub type CallbackResult = Result<(), CallbackError>;

/// The canonical error type for mirra.
#[derive(Debug, Error)]
pub enum MirrorError {
    // ── Bootstrap (connection) errors ────────────────────────────
    /// The video channel could not be opened within the retry budget.
    #[error("bootstrap timeout: no channel after {attempts} attempts ({elapsed:?})")]
    BootstrapTimeout { attempts: u32, elapsed: Duration },

    /// The server accepted the video channel but never sent the liveness byte.
    #[error("missing liveness marker")]
    MissingLivenessMarker,

    /// The device name field was empty after stripping NUL padding.
    #[error("missing device identity")]
    MissingDeviceIdentity,

    /// The device name field was not valid UTF-8.
    #[error("invalid device name: {0}")]
    InvalidDeviceName(#[from] std::str::Utf8Error),

    /// A fixed-size handshake field arrived short.
    #[error("short read on {field}: expected {expected} bytes, got {actual}")]
    ShortRead {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    /// The channel failed while a handshake field was being read.
    #[error("handshake i/o error on {field}: {source}")]
    HandshakeIo {
        field: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// The device transport failed to open a channel, launch or push.
    #[error("transport error: {0}")]
    Transport(String),

    // ── Streaming errors ─────────────────────────────────────────
    /// The channel layer reported an error other than "would block".
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The server closed the video channel while the session was alive.
    #[error("video stream closed by remote")]
    StreamClosed,

    /// The frame decoder rejected its input.
    #[error("decoder error: {0}")]
    Decoder(String),

    /// A subscriber callback returned an error, aborting the dispatch pass.
    #[error("{kind} callback failed: {source}")]
    Callback {
        kind: EventKind,
        #[source]
        source: CallbackError,
    },

    /// `stop` was called while the session was still starting.
    #[error("session stopped during start")]
    Stopped,

    // ── Control errors ───────────────────────────────────────────
    /// The control channel is not open (session not started or stopped).
    #[error("control channel not connected")]
    NotConnected,
}

impl MirrorError {
    /// Whether this error belongs to the bootstrap (connection) family,
    /// which is always fatal to `start` and never retried.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            MirrorError::BootstrapTimeout { .. }
                | MirrorError::MissingLivenessMarker
                | MirrorError::MissingDeviceIdentity
                | MirrorError::InvalidDeviceName(_)
                | MirrorError::ShortRead { .. }
                | MirrorError::HandshakeIo { .. }
                | MirrorError::Transport(_)
        )
    }
}

// ── Tests ────────────────────────────────────────────────────────
