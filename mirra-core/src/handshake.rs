//! Session bootstrap: the fixed-offset handshake that opens the video
//! and control channels and reads the device identity.
//!
//! ## Wire format (video channel, server → client)
//!
//! ```text
//! liveness:     u8        (1)   any value; its presence is the signal
//! device name:  [u8; 64]  (64)  UTF-8, NUL-padded
//! width:        u16 BE    (2)
//! height:       u16 BE    (2)
//! video stream: [u8]      (unbounded)
//! ```
//!
//! The control channel is opened between the liveness byte and the
//! device name, as a second connection to the same listener.

use std::sync::Arc;
use std::thread;
use std::time::Instant;

use tracing::{debug, info};

use crate::channel::{Channel, read_full};
use crate::config::SessionConfig;
use crate::error::MirrorError;
use crate::frame::Resolution;
use crate::transport::DeviceTransport;

/// Length of the NUL-padded device name field.
pub const DEVICE_NAME_LEN: usize = 64;

/// Length of the resolution field.
pub const RESOLUTION_LEN: usize = 4;

// ── HandshakeHeader ──────────────────────────────────────────────

/// The device metadata that follows the liveness byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeHeader {
    pub device_name: String,
    pub resolution: Resolution,
}

impl HandshakeHeader {
    /// Encoded size on the wire (without the liveness byte).
    pub const SIZE: usize = DEVICE_NAME_LEN + RESOLUTION_LEN;

    /// Parse the name and resolution fields from a contiguous buffer.
    pub fn parse(data: &[u8]) -> Result<Self, MirrorError> {
        if data.len() < Self::SIZE {
            return Err(MirrorError::ShortRead {
                field: "handshake header",
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        let device_name = parse_device_name(&data[..DEVICE_NAME_LEN])?;
        let resolution = parse_resolution(&data[DEVICE_NAME_LEN..Self::SIZE]);
        Ok(Self {
            device_name,
            resolution,
        })
    }

    /// Serialize as the server would send it. Names longer than the
    /// field are truncated at a character boundary.
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        let mut end = self.device_name.len().min(DEVICE_NAME_LEN);
        while !self.device_name.is_char_boundary(end) {
            end -= 1;
        }
        buf[..end].copy_from_slice(&self.device_name.as_bytes()[..end]);
        buf[DEVICE_NAME_LEN..DEVICE_NAME_LEN + 2]
            .copy_from_slice(&self.resolution.width.to_be_bytes());
        buf[DEVICE_NAME_LEN + 2..].copy_from_slice(&self.resolution.height.to_be_bytes());
        buf
    }
}

/// Decode the device name field, dropping trailing NUL padding.
pub fn parse_device_name(field: &[u8]) -> Result<String, MirrorError> {
    let name = std::str::from_utf8(field)?.trim_end_matches('\0');
    if name.is_empty() {
        return Err(MirrorError::MissingDeviceIdentity);
    }
    Ok(name.to_owned())
}

/// Decode the big-endian `(width, height)` pair.
pub fn parse_resolution(field: &[u8]) -> Resolution {
    Resolution::new(
        u16::from_be_bytes([field[0], field[1]]),
        u16::from_be_bytes([field[2], field[3]]),
    )
}

// ── Bootstrap ────────────────────────────────────────────────────

/// Everything the handshake produced, moved into the session.
pub struct Bootstrapped {
    pub video: Arc<dyn Channel>,
    pub control: Arc<dyn Channel>,
    pub device_name: String,
    pub resolution: Resolution,
}

/// Run the handshake. Channels opened before a failure are shut down.
pub fn bootstrap(
    transport: &dyn DeviceTransport,
    config: &SessionConfig,
) -> Result<Bootstrapped, MirrorError> {
    let video = open_video_channel(transport, config)?;

    match handshake(transport, config, video.as_ref()) {
        Ok((header, control)) => {
            info!(
                "connected to {} at {}",
                header.device_name, header.resolution
            );
            Ok(Bootstrapped {
                video,
                control,
                device_name: header.device_name,
                resolution: header.resolution,
            })
        }
        Err(e) => {
            if let Err(close) = video.shutdown() {
                debug!("closing video channel after failed handshake: {close}");
            }
            Err(e)
        }
    }
}

fn handshake(
    transport: &dyn DeviceTransport,
    config: &SessionConfig,
    video: &dyn Channel,
) -> Result<(HandshakeHeader, Arc<dyn Channel>), MirrorError> {
    video
        .set_read_timeout(config.handshake_timeout())
        .map_err(|source| MirrorError::HandshakeIo {
            field: "read timeout",
            source,
        })?;

    let mut marker = [0u8; 1];
    match read_full(video, &mut marker) {
        Ok(1) => {}
        Ok(_) => return Err(MirrorError::MissingLivenessMarker),
        Err(e) if is_timeout(&e) => return Err(MirrorError::MissingLivenessMarker),
        Err(source) => {
            return Err(MirrorError::HandshakeIo {
                field: "liveness marker",
                source,
            });
        }
    }

    let control = transport
        .open_channel(&config.socket_name)
        .map_err(as_connection_error)?;

    match read_metadata(video) {
        Ok(header) => Ok((header, control)),
        Err(e) => {
            if let Err(close) = control.shutdown() {
                debug!("closing control channel after failed handshake: {close}");
            }
            Err(e)
        }
    }
}

/// Device name and resolution, then switch the video channel to polling.
fn read_metadata(video: &dyn Channel) -> Result<HandshakeHeader, MirrorError> {
    let mut name = [0u8; DEVICE_NAME_LEN];
    let n = read_field(video, "device name", &mut name)?;
    if n == 0 {
        return Err(MirrorError::MissingDeviceIdentity);
    }
    expect_len("device name", DEVICE_NAME_LEN, n)?;
    let device_name = parse_device_name(&name)?;

    let mut res = [0u8; RESOLUTION_LEN];
    let n = read_field(video, "resolution", &mut res)?;
    expect_len("resolution", RESOLUTION_LEN, n)?;
    let resolution = parse_resolution(&res);

    video
        .set_read_timeout(None)
        .and_then(|()| video.set_nonblocking(true))
        .map_err(|source| MirrorError::HandshakeIo {
            field: "non-blocking mode",
            source,
        })?;

    Ok(HandshakeHeader {
        device_name,
        resolution,
    })
}

/// Try to open the video channel, retrying on any transport failure.
fn open_video_channel(
    transport: &dyn DeviceTransport,
    config: &SessionConfig,
) -> Result<Arc<dyn Channel>, MirrorError> {
    let started = Instant::now();
    let attempts = config.connect_attempts.max(1);
    for attempt in 1..=attempts {
        match transport.open_channel(&config.socket_name) {
            Ok(channel) => {
                debug!("video channel open after {attempt} attempt(s)");
                return Ok(channel);
            }
            Err(e) => {
                debug!("video channel attempt {attempt}/{attempts} failed: {e}");
                if attempt < attempts {
                    thread::sleep(config.connect_retry_delay());
                }
            }
        }
    }
    Err(MirrorError::BootstrapTimeout {
        attempts,
        elapsed: started.elapsed(),
    })
}

fn read_field(channel: &dyn Channel, field: &'static str, buf: &mut [u8]) -> Result<usize, MirrorError> {
    read_full(channel, buf).map_err(|source| MirrorError::HandshakeIo { field, source })
}

/// Blocking reads past their timeout report one of these, depending on
/// the platform.
fn is_timeout(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

fn expect_len(field: &'static str, expected: usize, actual: usize) -> Result<(), MirrorError> {
    if actual < expected {
        return Err(MirrorError::ShortRead {
            field,
            expected,
            actual,
        });
    }
    Ok(())
}

fn as_connection_error(e: MirrorError) -> MirrorError {
    if e.is_connection_error() {
        e
    } else {
        MirrorError::Transport(e.to_string())
    }
}

// ── Tests ────────────────────────────────────────────────────────
