//! Android debug bridge transport.
//!
//! Channels are opened by talking the adb host protocol directly to the
//! local adb server: select the device, then ask it to connect to the
//! abstract socket. The server answers `FAIL` while nothing listens on
//! that name yet, which is what makes the bootstrap retry loop useful.
//!
//! ## Host protocol
//!
//! ```text
//! request:  [4 ASCII hex digits: payload length][payload]
//! reply:    "OKAY"
//!         | "FAIL" [4 ASCII hex digits: message length][message]
//! ```
//!
//! Pushing files and launching the server go through the `adb` binary.

use std::io::Read;
use std::net::{SocketAddr, TcpStream};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::channel::{Channel, read_full};
use crate::error::MirrorError;
use crate::transport::{DeviceTransport, RemoteProcess};

/// Default address of the local adb server.
pub const DEFAULT_ADB_SERVER: &str = "127.0.0.1:5037";

const DEFAULT_ADB_PORT: u16 = 5037;

// ── AdbTransport ─────────────────────────────────────────────────

/// Transport backed by a local adb server and the `adb` executable.
#[derive(Debug, Clone)]
pub struct AdbTransport {
    adb_path: PathBuf,
    serial: Option<String>,
    server_addr: SocketAddr,
}

impl AdbTransport {
    /// Target `serial`, or whichever single device adb knows about when `None`.
    pub fn new(serial: Option<String>) -> Self {
        Self {
            adb_path: PathBuf::from("adb"),
            serial,
            server_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_ADB_PORT)),
        }
    }

    /// Use a specific `adb` executable.
    pub fn with_adb_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.adb_path = path.into();
        self
    }

    /// Talk to an adb server other than the default one.
    pub fn with_server_addr(mut self, addr: SocketAddr) -> Self {
        self.server_addr = addr;
        self
    }

    pub fn serial(&self) -> Option<&str> {
        self.serial.as_deref()
    }

    fn adb(&self) -> Command {
        let mut cmd = Command::new(&self.adb_path);
        if let Some(serial) = &self.serial {
            cmd.arg("-s").arg(serial);
        }
        cmd
    }

    fn transport_request(&self) -> String {
        match &self.serial {
            Some(serial) => format!("host:transport:{serial}"),
            None => "host:transport-any".into(),
        }
    }
}

impl DeviceTransport for AdbTransport {
    fn open_channel(&self, name: &str) -> Result<Arc<dyn Channel>, MirrorError> {
        let server_error = |e: std::io::Error| {
            MirrorError::Transport(format!("adb server {}: {e}", self.server_addr))
        };
        let stream = TcpStream::connect(self.server_addr).map_err(server_error)?;
        stream.set_nodelay(true).map_err(server_error)?;

        host_request(&stream, &self.transport_request())?;
        host_request(&stream, &format!("localabstract:{name}"))?;
        debug!("adb channel open: localabstract:{name}");

        Ok(Arc::new(stream))
    }

    fn launch_process(&self, command: &[String]) -> Result<Box<dyn RemoteProcess>, MirrorError> {
        info!("launching remote server: {}", command.join(" "));
        let child = self
            .adb()
            .arg("shell")
            .args(command)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| MirrorError::Transport(format!("adb shell: {e}")))?;
        Ok(Box::new(AdbProcess { child: Some(child) }))
    }

    fn push_file(&self, local: &Path, remote: &str) -> Result<(), MirrorError> {
        info!("pushing {} to {remote}", local.display());
        let output = self
            .adb()
            .arg("push")
            .arg(local)
            .arg(remote)
            .output()
            .map_err(|e| MirrorError::Transport(format!("adb push: {e}")))?;
        if !output.status.success() {
            return Err(MirrorError::Transport(format!(
                "adb push {} failed: {}",
                local.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

// ── AdbProcess ───────────────────────────────────────────────────

/// The `adb shell` child running the server.
struct AdbProcess {
    child: Option<Child>,
}

impl RemoteProcess for AdbProcess {
    fn close(&mut self) -> Result<(), MirrorError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        if let Err(e) = child.kill() {
            // Already exited.
            debug!("adb shell kill: {e}");
        }
        child
            .wait()
            .map_err(|e| MirrorError::Transport(format!("adb shell wait: {e}")))?;
        Ok(())
    }
}

impl Drop for AdbProcess {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("failed to reap adb shell: {e}");
        }
    }
}

// ── Host protocol ────────────────────────────────────────────────

/// Frame a host-protocol request.
pub fn encode_request(payload: &str) -> Vec<u8> {
    format!("{:04x}{payload}", payload.len()).into_bytes()
}

/// Send one request and wait for `OKAY`.
fn host_request(stream: &TcpStream, payload: &str) -> Result<(), MirrorError> {
    Channel::write_all(stream, &encode_request(payload))?;

    let mut status = [0u8; 4];
    let n = read_full(stream, &mut status)?;
    match &status[..n] {
        b"OKAY" => Ok(()),
        b"FAIL" => Err(MirrorError::Transport(format!(
            "{payload}: {}",
            read_failure_message(stream)?
        ))),
        other => Err(MirrorError::Transport(format!(
            "{payload}: unexpected adb reply {:?}",
            String::from_utf8_lossy(other)
        ))),
    }
}

fn read_failure_message(mut stream: &TcpStream) -> Result<String, MirrorError> {
    let mut len_hex = [0u8; 4];
    if read_full(stream, &mut len_hex)? != 4 {
        return Ok(String::from("(no message)"));
    }
    let len = std::str::from_utf8(&len_hex)
        .ok()
        .and_then(|s| usize::from_str_radix(s, 16).ok())
        .ok_or_else(|| MirrorError::Transport("malformed FAIL length".into()))?;
    let mut message = Vec::with_capacity(len);
    stream.by_ref().take(len as u64).read_to_end(&mut message)?;
    Ok(String::from_utf8_lossy(&message).into_owned())
}

// ── Tests ────────────────────────────────────────────────────────
