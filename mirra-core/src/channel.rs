//! Byte-stream channels to the remote server.
//!
//! A [`Channel`] is shared between the thread running the streaming loop
//! and whichever thread calls `Session::stop`, so every method takes
//! `&self`. Closing is a `shutdown` on the shared handle: the blocked or
//! polling reader observes it on its next read.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;
#[cfg(unix)]
use std::os::unix::net::UnixStream;

// ── ReadOutcome ──────────────────────────────────────────────────

/// Result of a single non-blocking read attempt.
#[derive(Debug)]
pub enum ReadOutcome {
    /// `n` bytes were read into the buffer.
    Data(usize),
    /// Nothing available right now.
    Pending,
    /// The peer closed the stream (end of file).
    Closed,
    /// Any other I/O failure.
    Failed(io::Error),
}

impl From<io::Result<usize>> for ReadOutcome {
    fn from(result: io::Result<usize>) -> Self {
        match result {
            Ok(0) => ReadOutcome::Closed,
            Ok(n) => ReadOutcome::Data(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => ReadOutcome::Pending,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => ReadOutcome::Pending,
            Err(e) => ReadOutcome::Failed(e),
        }
    }
}

// ── Channel ──────────────────────────────────────────────────────

/// A bidirectional byte stream to the remote server.
pub trait Channel: Send + Sync {
    /// Read up to `buf.len()` bytes. `Ok(0)` means end of stream.
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write the whole buffer.
    fn write_all(&self, buf: &[u8]) -> io::Result<()>;

    /// Switch between blocking and non-blocking reads.
    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()>;

    /// Bound how long a blocking read may wait. `None` waits forever.
    fn set_read_timeout(&self, _timeout: Option<Duration>) -> io::Result<()> {
        Ok(())
    }

    /// Close both directions. Closing twice must not fail loudly.
    fn shutdown(&self) -> io::Result<()>;

    /// Attempt one read and classify the result.
    fn poll_read(&self, buf: &mut [u8]) -> ReadOutcome {
        self.read(buf).into()
    }
}

/// Read exactly `buf.len()` bytes, returning how many arrived before
/// end of stream.
pub fn read_full(channel: &dyn Channel, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match channel.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// `NotConnected` is what a second shutdown reports; treat it as done.
fn shutdown_quietly(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
        other => other,
    }
}

impl Channel for TcpStream {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(&mut &*self, buf)
    }

    fn write_all(&self, buf: &[u8]) -> io::Result<()> {
        let mut stream = &*self;
        Write::write_all(&mut stream, buf)?;
        Write::flush(&mut stream)
    }

    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        TcpStream::set_nonblocking(self, nonblocking)
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }

    fn shutdown(&self) -> io::Result<()> {
        shutdown_quietly(TcpStream::shutdown(self, Shutdown::Both))
    }
}

#[cfg(unix)]
impl Channel for UnixStream {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(&mut &*self, buf)
    }

    fn write_all(&self, buf: &[u8]) -> io::Result<()> {
        let mut stream = &*self;
        Write::write_all(&mut stream, buf)?;
        Write::flush(&mut stream)
    }

    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        UnixStream::set_nonblocking(self, nonblocking)
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        UnixStream::set_read_timeout(self, timeout)
    }

    fn shutdown(&self) -> io::Result<()> {
        shutdown_quietly(UnixStream::shutdown(self, Shutdown::Both))
    }
}

// ── Tests ────────────────────────────────────────────────────────
