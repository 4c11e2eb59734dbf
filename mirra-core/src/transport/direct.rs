//! Direct TCP transport.
//!
//! For servers that are already reachable over TCP (an `adb forward`
//! set up by hand, an emulator bridge, or a test harness). Every
//! channel is a fresh connection to the same address; the channel name
//! is ignored. The server is assumed to be running already.

use std::net::{SocketAddr, TcpStream};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::channel::Channel;
use crate::error::MirrorError;
use crate::transport::{DetachedProcess, DeviceTransport, RemoteProcess};

/// Transport that connects straight to `addr`.
#[derive(Debug, Clone)]
pub struct DirectTransport {
    addr: SocketAddr,
    connect_timeout: Duration,
}

impl DirectTransport {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            connect_timeout: Duration::from_secs(1),
        }
    }

    /// Bound each connection attempt.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl DeviceTransport for DirectTransport {
    fn open_channel(&self, name: &str) -> Result<Arc<dyn Channel>, MirrorError> {
        let stream = TcpStream::connect_timeout(&self.addr, self.connect_timeout)
            .map_err(|e| MirrorError::Transport(format!("connect {} ({name}): {e}", self.addr)))?;
        stream.set_nodelay(true)?;
        debug!("direct channel open: {}", self.addr);
        Ok(Arc::new(stream))
    }

    fn launch_process(&self, _command: &[String]) -> Result<Box<dyn RemoteProcess>, MirrorError> {
        Ok(Box::new(DetachedProcess))
    }

    fn push_file(&self, local: &Path, _remote: &str) -> Result<(), MirrorError> {
        Err(MirrorError::Transport(format!(
            "direct transport cannot push {}",
            local.display()
        )))
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn opens_independent_connections() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let transport = DirectTransport::new(listener.local_addr().unwrap());

        let _a = transport.open_channel("scrcpy").unwrap();
        let _b = transport.open_channel("scrcpy").unwrap();
        assert!(listener.accept().is_ok());
        assert!(listener.accept().is_ok());
    }

    #[test]
    fn refused_connection_is_transport_error() {
        let addr = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
        let err = DirectTransport::new(addr).open_channel("scrcpy").err().unwrap();
        assert!(err.is_connection_error());
    }

    #[test]
    fn launch_is_detached_and_push_unsupported() {
        let addr = "127.0.0.1:9".parse().unwrap();
        let transport = DirectTransport::new(addr);
        let mut process = transport.launch_process(&["true".into()]).unwrap();
        process.close().unwrap();
        process.close().unwrap();
        assert!(transport.push_file(Path::new("server.jar"), "/data/local/tmp/").is_err());
    }
}
