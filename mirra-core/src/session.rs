//! Session state and lifecycle.
//!
//! A [`Session`] is a cheap, cloneable handle. Clones share one state:
//! the caller keeps one, the background stream thread keeps one, and
//! every callback receives one, so any of them can read the latest
//! frame or call [`Session::stop`].
//!
//! ```text
//!  new ──► run()/spawn() ──► push + launch ──► bootstrap ──► Init callbacks
//!                                                               │
//!            stop() ──► alive = false ──► close channels        ▼
//!                              ▲                          stream loop
//!                              └──── loop observes flag ◄─────┘
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, RwLock};
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use crate::channel::Channel;
use crate::config::{REMOTE_SERVER_DIR, SessionConfig};
use crate::control::ControlSender;
use crate::decoder::FrameDecoder;
use crate::engine;
use crate::error::{CallbackResult, MirrorError};
use crate::events::{EventKind, EventRegistry, ListenerId};
use crate::frame::{FrameBuffer, Resolution};
use crate::handshake;
use crate::transport::{DeviceTransport, RemoteProcess};

/// Name of the background stream thread.
pub const STREAM_THREAD_NAME: &str = "mirra-stream";

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn close_quietly(what: &str, result: Result<(), MirrorError>) {
    if let Err(e) = result {
        warn!("closing {what}: {e}");
    }
}

// ── Snapshot ─────────────────────────────────────────────────────

/// The latest frame together with the resolution it was decoded at.
///
/// Published as a whole on every decoded frame; readers never see a
/// resolution from one frame paired with pixels from another.
#[derive(Debug, Clone, Default)]
pub struct StreamSnapshot {
    pub resolution: Option<Resolution>,
    pub last_frame: Option<FrameBuffer>,
}

// ── StreamStats ──────────────────────────────────────────────────

/// Counters maintained by the stream loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Bytes read from the video channel.
    pub bytes_received: u64,
    /// Frames produced by the decoder.
    pub frames_decoded: u64,
    /// Frames reported as changed.
    pub changes: u64,
    /// Idle ticks delivered to frame callbacks without a frame.
    pub empty_ticks: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    bytes_received: AtomicU64,
    frames_decoded: AtomicU64,
    changes: AtomicU64,
    empty_ticks: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn add_bytes(&self, n: usize) {
        self.bytes_received.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn add_frame(&self) {
        self.frames_decoded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_change(&self) {
        self.changes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_empty_tick(&self) {
        self.empty_ticks.fetch_add(1, Ordering::Relaxed);
    }

    fn load(&self) -> StreamStats {
        StreamStats {
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            changes: self.changes.load(Ordering::Relaxed),
            empty_ticks: self.empty_ticks.load(Ordering::Relaxed),
        }
    }
}

// ── Session ──────────────────────────────────────────────────────

struct Shared {
    config: SessionConfig,
    transport: Box<dyn DeviceTransport>,
    decoder: Mutex<Option<Box<dyn FrameDecoder>>>,
    events: EventRegistry<Session>,

    started: AtomicBool,
    stopped: AtomicBool,
    alive: AtomicBool,
    /// Serializes committing a bootstrap against `stop`.
    lifecycle: Mutex<()>,

    device_name: OnceLock<String>,
    snapshot: RwLock<Arc<StreamSnapshot>>,
    stats: StatsCounters,

    video: Mutex<Option<Arc<dyn Channel>>>,
    control: Mutex<Option<Arc<dyn Channel>>>,
    /// Held for the whole of each control write.
    control_write: Mutex<()>,
    process: Mutex<Option<Box<dyn RemoteProcess>>>,
}

/// A mirroring session with one remote server.
///
/// Sessions start inert. [`run`](Self::run) or [`spawn`](Self::spawn)
/// starts one exactly once; [`stop`](Self::stop) ends it for good.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Shared>,
}

impl Session {
    /// Create an inert session.
    pub fn new<T, D>(transport: T, decoder: D, config: SessionConfig) -> Self
    where
        T: DeviceTransport + 'static,
        D: FrameDecoder + 'static,
    {
        Self {
            inner: Arc::new(Shared {
                config,
                transport: Box::new(transport),
                decoder: Mutex::new(Some(Box::new(decoder))),
                events: EventRegistry::new(),
                started: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                alive: AtomicBool::new(false),
                lifecycle: Mutex::new(()),
                device_name: OnceLock::new(),
                snapshot: RwLock::new(Arc::new(StreamSnapshot::default())),
                stats: StatsCounters::default(),
                video: Mutex::new(None),
                control: Mutex::new(None),
                control_write: Mutex::new(()),
                process: Mutex::new(None),
            }),
        }
    }

    // ── Subscriptions ────────────────────────────────────────────

    /// Run `callback` once the session is connected, before any frame.
    ///
    /// Returns the ids of every init callback, in invocation order.
    pub fn on_init<F>(&self, callback: F) -> Vec<ListenerId>
    where
        F: Fn(&Session) -> CallbackResult + Send + Sync + 'static,
    {
        self.inner.events.subscribe_init(callback)
    }

    /// Run `callback` for every decoded frame, and with `None` on idle
    /// ticks unless frame gating is on.
    pub fn on_frame<F>(&self, callback: F) -> Vec<ListenerId>
    where
        F: Fn(&Session, Option<&FrameBuffer>) -> CallbackResult + Send + Sync + 'static,
    {
        self.inner.events.subscribe_frame(callback)
    }

    /// Run `callback` for every frame the change policy reports as new.
    /// The frame is always `Some`.
    pub fn on_change<F>(&self, callback: F) -> Vec<ListenerId>
    where
        F: Fn(&Session, Option<&FrameBuffer>) -> CallbackResult + Send + Sync + 'static,
    {
        self.inner.events.subscribe_change(callback)
    }

    /// Ids of the callbacks registered for `kind`.
    pub fn listeners(&self, kind: EventKind) -> Vec<ListenerId> {
        self.inner.events.listeners(kind)
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Start the session and stream on the calling thread until
    /// [`stop`](Self::stop) is called or the stream fails.
    ///
    /// # Panics
    ///
    /// Panics if the session was started before.
    pub fn run(&self) -> Result<(), MirrorError> {
        let (video, decoder) = self.launch()?;
        self.stream(video, decoder)
    }

    /// Start the session and stream on one background thread.
    ///
    /// Bootstrap and init callbacks still run on the calling thread, so
    /// connection errors are returned here.
    ///
    /// # Panics
    ///
    /// Panics if the session was started before.
    pub fn spawn(&self) -> Result<StreamHandle, MirrorError> {
        let (video, decoder) = self.launch()?;
        let session = self.clone();
        let join = thread::Builder::new()
            .name(STREAM_THREAD_NAME.into())
            .spawn(move || session.stream(video, decoder));
        match join {
            Ok(join) => Ok(StreamHandle {
                session: self.clone(),
                join,
            }),
            Err(e) => {
                self.stop();
                Err(e.into())
            }
        }
    }

    /// Stop streaming and release the channels and remote process.
    ///
    /// Idempotent, callable from any thread (including a callback on the
    /// stream thread), and never waits for the stream loop: the loop sees
    /// the flag on its next iteration and exits quietly.
    pub fn stop(&self) {
        let (control, video, process, was_alive) = {
            let _guard = lock(&self.inner.lifecycle);
            self.inner.stopped.store(true, Ordering::SeqCst);
            let was_alive = self.inner.alive.swap(false, Ordering::SeqCst);
            (
                lock(&self.inner.control).take(),
                lock(&self.inner.video).take(),
                lock(&self.inner.process).take(),
                was_alive,
            )
        };

        if let Some(control) = control {
            close_quietly("control channel", control.shutdown().map_err(MirrorError::from));
        }
        if let Some(video) = video {
            close_quietly("video channel", video.shutdown().map_err(MirrorError::from));
        }
        if let Some(mut process) = process {
            close_quietly("remote process", process.close());
        }

        if was_alive {
            info!("session stopped");
        }
    }

    fn launch(&self) -> Result<(Arc<dyn Channel>, Box<dyn FrameDecoder>), MirrorError> {
        assert!(
            !self.inner.started.swap(true, Ordering::SeqCst),
            "session already started; sessions cannot be restarted"
        );
        if self.inner.stopped.load(Ordering::SeqCst) {
            return Err(MirrorError::Stopped);
        }
        let decoder = lock(&self.inner.decoder)
            .take()
            .ok_or(MirrorError::NotConnected)?;

        let config = &self.inner.config;
        let transport = self.inner.transport.as_ref();

        if let Some(jar) = &config.server.jar {
            transport.push_file(jar, REMOTE_SERVER_DIR)?;
        }
        let mut process = transport.launch_process(&config.server.command_line())?;
        {
            let guard = lock(&self.inner.lifecycle);
            if self.inner.stopped.load(Ordering::SeqCst) {
                drop(guard);
                close_quietly("remote process", process.close());
                return Err(MirrorError::Stopped);
            }
            *lock(&self.inner.process) = Some(process);
        }

        let boot = match handshake::bootstrap(transport, config) {
            Ok(boot) => boot,
            Err(e) => {
                self.stop();
                return Err(e);
            }
        };

        let committed = {
            let _guard = lock(&self.inner.lifecycle);
            let stopped = self.inner.stopped.load(Ordering::SeqCst);
            if !stopped {
                let _ = self.inner.device_name.set(boot.device_name);
                self.publish(StreamSnapshot {
                    resolution: Some(boot.resolution),
                    last_frame: None,
                });
                *lock(&self.inner.video) = Some(Arc::clone(&boot.video));
                *lock(&self.inner.control) = Some(Arc::clone(&boot.control));
                self.inner.alive.store(true, Ordering::SeqCst);
            }
            !stopped
        };
        if !committed {
            close_quietly("control channel", boot.control.shutdown().map_err(MirrorError::from));
            close_quietly("video channel", boot.video.shutdown().map_err(MirrorError::from));
            // `stop` already took and closed the process.
            return Err(MirrorError::Stopped);
        }

        if !self.is_alive() {
            return Err(MirrorError::Stopped);
        }
        if let Err(e) = self.inner.events.dispatch_init(self) {
            self.stop();
            return Err(e);
        }
        Ok((boot.video, decoder))
    }

    /// Run the stream loop; a fatal error releases the session.
    fn stream(
        &self,
        video: Arc<dyn Channel>,
        decoder: Box<dyn FrameDecoder>,
    ) -> Result<(), MirrorError> {
        let result = engine::run_loop(self, video, decoder);
        if let Err(e) = &result {
            warn!("stream loop failed: {e}");
            self.stop();
        } else {
            debug!("stream loop finished");
        }
        result
    }

    // ── State ────────────────────────────────────────────────────

    /// Whether the session is connected and streaming.
    pub fn is_alive(&self) -> bool {
        self.inner.alive.load(Ordering::SeqCst)
    }

    /// Device name announced during the handshake.
    pub fn device_name(&self) -> Option<&str> {
        self.inner.device_name.get().map(String::as_str)
    }

    /// Current resolution: the handshake's, then the latest frame's.
    pub fn resolution(&self) -> Option<Resolution> {
        self.snapshot().resolution
    }

    /// The most recently decoded frame.
    pub fn last_frame(&self) -> Option<FrameBuffer> {
        self.snapshot().last_frame.clone()
    }

    /// A consistent view of the latest frame and resolution.
    pub fn snapshot(&self) -> Arc<StreamSnapshot> {
        self.inner
            .snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn stats(&self) -> StreamStats {
        self.inner.stats.load()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// A sender for pre-encoded control messages.
    pub fn control(&self) -> ControlSender {
        ControlSender::new(self.clone())
    }

    // ── Crate-internal ───────────────────────────────────────────

    pub(crate) fn events(&self) -> &EventRegistry<Session> {
        &self.inner.events
    }

    pub(crate) fn counters(&self) -> &StatsCounters {
        &self.inner.stats
    }

    /// Swap in the snapshot for a freshly decoded frame.
    pub(crate) fn publish_frame(&self, frame: FrameBuffer) {
        self.publish(StreamSnapshot {
            resolution: Some(frame.resolution()),
            last_frame: Some(frame),
        });
    }

    fn publish(&self, snapshot: StreamSnapshot) {
        *self
            .inner
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(snapshot);
    }

    pub(crate) fn control_channel(&self) -> Option<Arc<dyn Channel>> {
        lock(&self.inner.control).clone()
    }

    pub(crate) fn control_write_lock(&self) -> MutexGuard<'_, ()> {
        lock(&self.inner.control_write)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("alive", &self.is_alive())
            .field("device_name", &self.device_name())
            .field("resolution", &self.resolution())
            .finish_non_exhaustive()
    }
}

// ── StreamHandle ─────────────────────────────────────────────────

/// Handle to the background stream thread started by [`Session::spawn`].
pub struct StreamHandle {
    session: Session,
    join: JoinHandle<Result<(), MirrorError>>,
}

impl StreamHandle {
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Whether the stream thread has exited.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the stream thread and return how the loop ended.
    ///
    /// A panic raised by a callback on the stream thread is resumed here.
    pub fn join(self) -> Result<(), MirrorError> {
        match self.join.join() {
            Ok(result) => result,
            Err(payload) => std::panic::resume_unwind(payload),
        }
    }

    /// Stop the session and wait for the stream thread.
    pub fn stop_and_join(self) -> Result<(), MirrorError> {
        self.session.stop();
        self.join()
    }
}

// ── Tests ────────────────────────────────────────────────────────
