//! Viewer configuration.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use mirra_core::SessionConfig;
use mirra_core::transport::adb::DEFAULT_ADB_SERVER;

/// Top-level configuration for the viewer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Which device to mirror and how to reach it.
    pub device: DeviceConfig,
    /// Session tuning passed straight to `mirra-core`.
    pub session: SessionConfig,
    /// Where changed frames are written.
    pub output: OutputConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

/// Device selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// adb serial. Empty picks the only attached device.
    pub serial: String,
    /// Path or name of the adb executable.
    pub adb_path: PathBuf,
    /// adb server address.
    pub adb_server: String,
    /// Connect straight to an already forwarded socket instead of going
    /// through adb. Empty disables.
    pub direct: String,
}

/// Snapshot output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for PPM snapshots of changed frames. Empty disables.
    pub snapshot_dir: String,
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level, overridden by `RUST_LOG`.
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            serial: String::new(),
            adb_path: PathBuf::from("adb"),
            adb_server: DEFAULT_ADB_SERVER.into(),
            direct: String::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Accessors ────────────────────────────────────────────────────

impl DeviceConfig {
    pub fn serial(&self) -> Option<String> {
        (!self.serial.is_empty()).then(|| self.serial.clone())
    }

    /// Parsed direct address, if one is configured.
    pub fn direct_addr(&self) -> Result<Option<SocketAddr>, std::net::AddrParseError> {
        if self.direct.is_empty() {
            return Ok(None);
        }
        self.direct.parse().map(Some)
    }

    pub fn adb_server_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.adb_server.parse()
    }
}

impl OutputConfig {
    pub fn snapshot_dir(&self) -> Option<&Path> {
        (!self.snapshot_dir.is_empty()).then(|| Path::new(&self.snapshot_dir))
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ViewerConfig {
    /// Load from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write default config to a file.
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }
}

// ── Tests ────────────────────────────────────────────────────────
