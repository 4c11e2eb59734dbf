//! Control channel sender.
//!
//! Control messages (input injection and the like) are encoded by the
//! caller; this module only guarantees that each message reaches the
//! channel whole. Every write holds the session's control mutex, so
//! messages from concurrent senders never interleave.

use tracing::trace;

use crate::error::MirrorError;
use crate::session::Session;

/// Writes pre-encoded control messages to a session's control channel.
///
/// Cheap to clone; clones may be used from any thread.
#[derive(Debug, Clone)]
pub struct ControlSender {
    session: Session,
}

impl ControlSender {
    pub(crate) fn new(session: Session) -> Self {
        Self { session }
    }

    /// Write one message. Fails with [`MirrorError::NotConnected`] when
    /// the session is not alive.
    pub fn send(&self, message: &[u8]) -> Result<(), MirrorError> {
        let _serial = self.session.control_write_lock();
        if !self.session.is_alive() {
            return Err(MirrorError::NotConnected);
        }
        let channel = self
            .session
            .control_channel()
            .ok_or(MirrorError::NotConnected)?;

        match channel.write_all(message) {
            Ok(()) => {
                trace!("control message: {} bytes", message.len());
                Ok(())
            }
            // The channel was closed under us by `stop`.
            Err(_) if !self.session.is_alive() => Err(MirrorError::NotConnected),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether messages can currently be sent.
    pub fn is_connected(&self) -> bool {
        self.session.is_alive() && self.session.control_channel().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::decoder::RawFrameDecoder;
    use crate::transport::DirectTransport;

    #[test]
    fn send_before_start_is_not_connected() {
        let addr = "127.0.0.1:9".parse().unwrap();
        let session = Session::new(
            DirectTransport::new(addr),
            RawFrameDecoder::new(),
            SessionConfig::default(),
        );
        let control = session.control();
        assert!(!control.is_connected());
        assert!(matches!(
            control.send(b"\x00"),
            Err(MirrorError::NotConnected)
        ));
    }
}
