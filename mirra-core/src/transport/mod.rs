//! Device transport: how channels to the remote server are opened and
//! how the server process is started.
//!
//! | Module   | Purpose                                              |
//! |----------|------------------------------------------------------|
//! | `adb`    | Android debug bridge: push, shell, host protocol     |
//! | `direct` | Plain TCP to an already-reachable server socket      |

use std::path::Path;
use std::sync::Arc;

use crate::channel::Channel;
use crate::error::MirrorError;

pub mod adb;
pub mod direct;

pub use adb::AdbTransport;
pub use direct::DirectTransport;

/// Opens channels to, and launches, the remote server.
///
/// Every failure is reported as a [`MirrorError::Transport`] (or an
/// I/O error), which the session treats as a connection error.
pub trait DeviceTransport: Send + Sync {
    /// Open a new bidirectional channel to the listener named `name`.
    fn open_channel(&self, name: &str) -> Result<Arc<dyn Channel>, MirrorError>;

    /// Start the remote server with the given command line.
    fn launch_process(&self, command: &[String]) -> Result<Box<dyn RemoteProcess>, MirrorError>;

    /// Copy a local file onto the device.
    fn push_file(&self, local: &Path, remote: &str) -> Result<(), MirrorError>;
}

impl<T: DeviceTransport + ?Sized> DeviceTransport for Arc<T> {
    fn open_channel(&self, name: &str) -> Result<Arc<dyn Channel>, MirrorError> {
        (**self).open_channel(name)
    }

    fn launch_process(&self, command: &[String]) -> Result<Box<dyn RemoteProcess>, MirrorError> {
        (**self).launch_process(command)
    }

    fn push_file(&self, local: &Path, remote: &str) -> Result<(), MirrorError> {
        (**self).push_file(local, remote)
    }
}

/// Handle to a launched remote process.
pub trait RemoteProcess: Send {
    /// Terminate the process. Calling it again is a no-op.
    fn close(&mut self) -> Result<(), MirrorError>;
}

/// Process handle for transports where the server runs independently.
#[derive(Debug, Default)]
pub struct DetachedProcess;

impl RemoteProcess for DetachedProcess {
    fn close(&mut self) -> Result<(), MirrorError> {
        Ok(())
    }
}
