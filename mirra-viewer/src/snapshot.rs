//! Binary PPM (P6) snapshots of changed frames.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use mirra_core::FrameBuffer;
use mirra_core::frame::BYTES_PER_PIXEL;

/// Encode `frame` as a P6 image. Frames are BGR; PPM wants RGB.
pub fn write_ppm<W: Write>(out: &mut W, frame: &FrameBuffer) -> io::Result<()> {
    write!(out, "P6\n{} {}\n255\n", frame.width(), frame.height())?;
    for y in 0..frame.height() {
        let row: Vec<u8> = frame
            .row(y)
            .chunks_exact(BYTES_PER_PIXEL)
            .flat_map(|bgr| [bgr[2], bgr[1], bgr[0]])
            .collect();
        out.write_all(&row)?;
    }
    Ok(())
}

/// Writes numbered snapshots into one directory.
#[derive(Debug)]
pub struct SnapshotWriter {
    dir: PathBuf,
    next: AtomicU64,
}

impl SnapshotWriter {
    /// Create `dir` if needed.
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            next: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the next snapshot and return its path.
    pub fn save(&self, frame: &FrameBuffer) -> io::Result<PathBuf> {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        let path = self.dir.join(format!("change-{n:06}.ppm"));
        let mut out = BufWriter::new(File::create(&path)?);
        write_ppm(&mut out, frame)?;
        out.flush()?;
        Ok(path)
    }
}
