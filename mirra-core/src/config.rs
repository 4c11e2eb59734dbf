//! Session configuration.
//!
//! Every struct uses `#[serde(default)]` so a partial TOML table (or
//! none at all) yields the stock values below.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Abstract socket name the server listens on.
pub const DEFAULT_SOCKET_NAME: &str = "scrcpy";

/// Remote directory the server jar is pushed to.
pub const REMOTE_SERVER_DIR: &str = "/data/local/tmp/";

/// Remote path of the server jar once pushed.
pub const REMOTE_SERVER_PATH: &str = "/data/local/tmp/scrcpy-server.jar";

/// Screen orientation lock value meaning "not locked".
pub const ORIENTATION_UNLOCKED: i32 = -1;

// ── SessionConfig ────────────────────────────────────────────────

/// Tunables for bootstrap, streaming and change detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Abstract name shared by the video and control channels.
    pub socket_name: String,
    /// How many times to try opening the video channel.
    pub connect_attempts: u32,
    /// Delay between video channel attempts, in milliseconds.
    pub connect_retry_delay_ms: u64,
    /// Longest wait for each handshake field once the video channel is
    /// open, in milliseconds. `0` waits forever.
    pub handshake_timeout_ms: u64,
    /// Maximum bytes read from the video channel per iteration.
    pub chunk_size: usize,
    /// Sleep when no video data is available, in milliseconds.
    pub idle_interval_ms: u64,
    /// When `true`, frame callbacks only fire for decoded frames.
    /// When `false`, they also fire with `None` on every idle tick.
    pub frame_gating: bool,
    /// Mean per-byte difference above which a frame counts as changed.
    pub change_threshold: f64,
    /// Server launch parameters.
    pub server: ServerParams,
}

impl SessionConfig {
    pub fn connect_retry_delay(&self) -> Duration {
        Duration::from_millis(self.connect_retry_delay_ms)
    }

    pub fn handshake_timeout(&self) -> Option<Duration> {
        (self.handshake_timeout_ms > 0).then(|| Duration::from_millis(self.handshake_timeout_ms))
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            socket_name: DEFAULT_SOCKET_NAME.into(),
            connect_attempts: 30,
            connect_retry_delay_ms: 100,
            handshake_timeout_ms: 3000,
            chunk_size: 0x10000,
            idle_interval_ms: 10,
            frame_gating: false,
            change_threshold: 100.0,
            server: ServerParams::default(),
        }
    }
}

// ── ServerParams ─────────────────────────────────────────────────

/// Parameters rendered into the remote server's launch command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerParams {
    /// Local server jar to push before launching. `None` skips the push.
    pub jar: Option<PathBuf>,
    /// Protocol version string the server expects.
    pub version: String,
    /// Server log level ("info", "verbose", ...).
    pub log_level: String,
    /// Longest video side in pixels; 0 keeps the device resolution.
    pub max_size: u32,
    /// Video bitrate in bits per second.
    pub bitrate: u32,
    /// Frame rate cap; 0 means uncapped.
    pub max_fps: u32,
    /// Orientation lock, [`ORIENTATION_UNLOCKED`] for none.
    pub lock_screen_orientation: i32,
    /// Display to mirror.
    pub display_id: u32,
    pub show_touches: bool,
    /// Keep the device awake while the session is alive.
    pub stay_awake: bool,
    pub power_off_on_close: bool,
}

impl Default for ServerParams {
    fn default() -> Self {
        Self {
            jar: None,
            version: "1.20".into(),
            log_level: "info".into(),
            max_size: 0,
            bitrate: 8_000_000,
            max_fps: 0,
            lock_screen_orientation: ORIENTATION_UNLOCKED,
            display_id: 0,
            show_touches: false,
            stay_awake: false,
            power_off_on_close: false,
        }
    }
}

impl ServerParams {
    /// Render the remote launch command line, one argument per entry.
    pub fn command_line(&self) -> Vec<String> {
        vec![
            format!("CLASSPATH={REMOTE_SERVER_PATH}"),
            "app_process".into(),
            "/".into(),
            "com.genymobile.scrcpy.Server".into(),
            self.version.clone(),
            self.log_level.clone(),
            self.max_size.to_string(),
            self.bitrate.to_string(),
            self.max_fps.to_string(),
            self.lock_screen_orientation.to_string(),
            // tunnel forward
            "true".into(),
            // crop
            "-".into(),
            // send frame meta
            "false".into(),
            // control
            "true".into(),
            self.display_id.to_string(),
            self.show_touches.to_string(),
            self.stay_awake.to_string(),
            // codec options
            "-".into(),
            // encoder name
            "-".into(),
            self.power_off_on_close.to_string(),
        ]
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_budget() {
        let cfg = SessionConfig::default();
        assert_eq!(cfg.connect_attempts, 30);
        assert_eq!(cfg.connect_retry_delay(), Duration::from_millis(100));
        assert_eq!(cfg.chunk_size, 65536);
        assert_eq!(cfg.idle_interval(), Duration::from_millis(10));
        assert!(!cfg.frame_gating);
        assert_eq!(cfg.socket_name, "scrcpy");
    }

    #[test]
    fn command_line_layout() {
        let params = ServerParams {
            max_size: 1024,
            stay_awake: true,
            ..ServerParams::default()
        };
        let cmd = params.command_line();
        assert_eq!(cmd.len(), 20);
        assert_eq!(cmd[0], "CLASSPATH=/data/local/tmp/scrcpy-server.jar");
        assert_eq!(cmd[3], "com.genymobile.scrcpy.Server");
        assert_eq!(cmd[4], "1.20");
        assert_eq!(cmd[6], "1024");
        assert_eq!(cmd[7], "8000000");
        assert_eq!(cmd[9], "-1");
        assert_eq!(cmd[16], "true");
        assert_eq!(cmd[19], "false");
    }

    #[test]
    fn zero_handshake_timeout_waits_forever() {
        let mut cfg = SessionConfig::default();
        assert_eq!(cfg.handshake_timeout(), Some(Duration::from_secs(3)));
        cfg.handshake_timeout_ms = 0;
        assert_eq!(cfg.handshake_timeout(), None);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let cfg: SessionConfig = toml::from_str(
            r#"
            change_threshold = 12.5
            frame_gating = true

            [server]
            max_fps = 30
            "#,
        )
        .unwrap();
        assert_eq!(cfg.change_threshold, 12.5);
        assert!(cfg.frame_gating);
        assert_eq!(cfg.server.max_fps, 30);
        assert_eq!(cfg.server.bitrate, 8_000_000);
        assert_eq!(cfg.connect_attempts, 30);
    }
}
