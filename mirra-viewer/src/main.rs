//! mirra viewer entry point.
//!
//! ```text
//! mirra-viewer                         Mirror the only attached device
//! mirra-viewer --serial <serial>       Pick a device by adb serial
//! mirra-viewer --direct <host:port>    Use an already forwarded socket
//! mirra-viewer --snapshot-dir <dir>    Save every changed frame as PPM
//! mirra-viewer --gen-config            Dump default config and exit
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use mirra_core::{AdbTransport, DirectTransport, MirrorError, RawFrameDecoder, Session};

use mirra_viewer::config::ViewerConfig;
use mirra_viewer::snapshot::SnapshotWriter;

// ── CLI ──────────────────────────────────────────────────────────

/// The viewer only decodes raw frames. The server started through adb
/// streams H.264, which needs a codec-backed `FrameDecoder`.
const RAW_STREAM_NOTE: &str = "Frames are decoded as raw BGR24 \
([u16 BE width][u16 BE height][pixels]). A server launched through adb \
sends H.264 and needs a codec-backed decoder; use --direct with a raw \
frame source.";

#[derive(Parser, Debug)]
#[command(
    name = "mirra-viewer",
    about = "Mirror a remote device screen",
    after_help = RAW_STREAM_NOTE
)]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "mirra-viewer.toml")]
    config: PathBuf,

    /// adb serial of the device (overrides config). adb mode launches
    /// the H.264 server, which the raw frame decoder cannot read.
    #[arg(short, long)]
    serial: Option<String>,

    /// Connect to an already forwarded socket instead of using adb.
    /// Example: 127.0.0.1:27183
    #[arg(short, long)]
    direct: Option<String>,

    /// Write each changed frame as a PPM file into this directory.
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ViewerConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = ViewerConfig::load(&cli.config);
    if let Some(serial) = cli.serial {
        config.device.serial = serial;
    }
    if let Some(addr) = cli.direct {
        config.device.direct = addr;
    }
    if let Some(dir) = cli.snapshot_dir {
        config.output.snapshot_dir = dir.to_string_lossy().into_owned();
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("mirra-viewer v{}", env!("CARGO_PKG_VERSION"));

    // ── 1. Build the session ────────────────────────────────────

    let session = match config.device.direct_addr()? {
        Some(addr) => {
            info!("connecting directly to {addr}");
            Session::new(
                DirectTransport::new(addr),
                RawFrameDecoder::new(),
                config.session.clone(),
            )
        }
        None => {
            let transport = AdbTransport::new(config.device.serial())
                .with_adb_path(&config.device.adb_path)
                .with_server_addr(config.device.adb_server_addr()?);
            info!(
                "connecting through adb to {}",
                transport.serial().unwrap_or("the attached device")
            );
            warn!("adb mode streams H.264; the raw frame decoder will reject it");
            Session::new(transport, RawFrameDecoder::new(), config.session.clone())
        }
    };

    // ── 2. Subscribe ────────────────────────────────────────────

    session.on_init(|s| {
        info!(
            "device {} at {}",
            s.device_name().unwrap_or("<unknown>"),
            s.resolution().map(|r| r.to_string()).unwrap_or_default()
        );
        Ok(())
    });

    let snapshots = config
        .output
        .snapshot_dir()
        .map(SnapshotWriter::new)
        .transpose()?;
    if let Some(writer) = &snapshots {
        info!("saving changed frames to {}", writer.dir().display());
    }

    session.on_change(move |s, frame| {
        let Some(frame) = frame else {
            return Ok(());
        };
        info!(
            "frame changed ({}), {} changes so far",
            frame.resolution(),
            s.stats().changes
        );
        if let Some(writer) = &snapshots {
            let path = writer.save(frame)?;
            info!("snapshot {}", path.display());
        }
        Ok(())
    });

    // ── 3. Start streaming ──────────────────────────────────────

    let starter = session.clone();
    let handle = tokio::task::spawn_blocking(move || starter.spawn()).await??;
    let mut join = tokio::task::spawn_blocking(move || handle.join());

    // ── 4. Wait for Ctrl-C or the stream to end ─────────────────

    let result = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!("ctrl-c handler failed: {e}");
            }
            info!("interrupted; stopping");
            session.stop();
            (&mut join).await?
        }
        joined = &mut join => joined?,
    };

    // ── 5. Shutdown ─────────────────────────────────────────────

    session.stop();
    let stats = session.stats();
    info!(
        "received {} bytes, {} frames, {} changes",
        stats.bytes_received, stats.frames_decoded, stats.changes
    );

    match result {
        Ok(()) => Ok(()),
        Err(MirrorError::StreamClosed) => {
            warn!("device closed the stream");
            Ok(())
        }
        Err(e) => {
            error!("stream failed: {e}");
            Err(e.into())
        }
    }
}
