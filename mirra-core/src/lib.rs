//! # mirra-core
//!
//! Client-side driver for screen-mirroring servers running on a remote
//! device.
//!
//! This crate contains:
//! - **Session**: lifecycle (`run` / `spawn` / `stop`) and shared state
//! - **Handshake**: the two-channel bootstrap and its fixed wire layout
//! - **Engine**: the non-blocking stream loop feeding a `FrameDecoder`
//! - **Change**: mean-difference change detection between frames
//! - **Events**: ordered init / frame / change callbacks
//! - **Control**: serialized writes on the control channel
//! - **Transport**: `DeviceTransport` with adb and direct TCP backends
//! - **Error**: `MirrorError`, a typed `thiserror` error hierarchy

pub mod change;
pub mod channel;
pub mod config;
pub mod control;
pub mod decoder;
mod engine;
pub mod error;
pub mod events;
pub mod frame;
pub mod handshake;
pub mod session;
pub mod transport;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use change::{is_changed, mean_abs_diff};
pub use channel::{Channel, ReadOutcome};
pub use config::{ServerParams, SessionConfig};
pub use control::ControlSender;
pub use decoder::{FrameDecoder, RawFrameDecoder};
pub use error::{CallbackError, CallbackResult, MirrorError};
pub use events::{EventKind, EventRegistry, FrameKind, ListenerId};
pub use frame::{FrameBuffer, Resolution};
pub use handshake::HandshakeHeader;
pub use session::{Session, StreamHandle, StreamSnapshot, StreamStats};
pub use transport::{AdbTransport, DeviceTransport, DirectTransport, RemoteProcess};
