//! Subscriber registry for session events.
//!
//! Callbacks are kept per [`EventKind`] in insertion order and invoked
//! synchronously on the dispatching thread. There is no isolation
//! between callbacks: the first one to return an error stops the pass
//! and the error propagates to the streaming loop. Panics propagate the
//! same way.
//!
//! Dispatch iterates over a snapshot of the list, so a callback may
//! subscribe new callbacks (of any kind) without deadlocking. A callback
//! added during a pass over its own kind first runs on the next pass.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{CallbackResult, MirrorError};
use crate::frame::FrameBuffer;

// ── EventKind ────────────────────────────────────────────────────

/// The events a session emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Bootstrap finished; fired once before any frame.
    Init,
    /// A frame was decoded, or an idle tick passed without one.
    Frame,
    /// A decoded frame differs materially from the previous one.
    Change,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EventKind::Init => "init",
            EventKind::Frame => "frame",
            EventKind::Change => "change",
        })
    }
}

/// The events whose callbacks receive a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Frame,
    Change,
}

impl From<FrameKind> for EventKind {
    fn from(kind: FrameKind) -> Self {
        match kind {
            FrameKind::Frame => EventKind::Frame,
            FrameKind::Change => EventKind::Change,
        }
    }
}

/// Identifies one registered callback. Ids increase in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    pub fn get(self) -> u64 {
        self.0
    }
}

// ── Callback types ───────────────────────────────────────────────

/// Callback for [`EventKind::Init`], receiving the context.
pub type InitCallback<C> = dyn Fn(&C) -> CallbackResult + Send + Sync;

/// Callback for [`EventKind::Frame`] and [`EventKind::Change`].
///
/// The frame is `None` on idle ticks when frame gating is off.
pub type FrameCallback<C> = dyn Fn(&C, Option<&FrameBuffer>) -> CallbackResult + Send + Sync;

struct Listener<F: ?Sized> {
    id: ListenerId,
    callback: Arc<F>,
}

impl<F: ?Sized> Clone for Listener<F> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            callback: Arc::clone(&self.callback),
        }
    }
}

type ListenerList<F> = RwLock<Vec<Listener<F>>>;

fn push<F: ?Sized>(list: &ListenerList<F>, listener: Listener<F>) -> Vec<ListenerId> {
    let mut guard = list.write().unwrap_or_else(PoisonError::into_inner);
    guard.push(listener);
    guard.iter().map(|l| l.id).collect()
}

fn snapshot<F: ?Sized>(list: &ListenerList<F>) -> Vec<Listener<F>> {
    list.read().unwrap_or_else(PoisonError::into_inner).clone()
}

// ── EventRegistry ────────────────────────────────────────────────

/// Ordered callback lists keyed by [`EventKind`].
///
/// `C` is the context handed to every callback as its first argument.
pub struct EventRegistry<C> {
    next_id: AtomicU64,
    init: ListenerList<InitCallback<C>>,
    frame: ListenerList<FrameCallback<C>>,
    change: ListenerList<FrameCallback<C>>,
}

impl<C> EventRegistry<C> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            init: RwLock::new(Vec::new()),
            frame: RwLock::new(Vec::new()),
            change: RwLock::new(Vec::new()),
        }
    }

    fn next_id(&self) -> ListenerId {
        ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn frame_list(&self, kind: FrameKind) -> &ListenerList<FrameCallback<C>> {
        match kind {
            FrameKind::Frame => &self.frame,
            FrameKind::Change => &self.change,
        }
    }

    /// Append an init callback; returns the ids of all init callbacks in order.
    pub fn subscribe_init<F>(&self, callback: F) -> Vec<ListenerId>
    where
        F: Fn(&C) -> CallbackResult + Send + Sync + 'static,
    {
        let listener = Listener {
            id: self.next_id(),
            callback: Arc::new(callback) as Arc<InitCallback<C>>,
        };
        push(&self.init, listener)
    }

    /// Append a frame callback; returns the ids of all frame callbacks in order.
    pub fn subscribe_frame<F>(&self, callback: F) -> Vec<ListenerId>
    where
        F: Fn(&C, Option<&FrameBuffer>) -> CallbackResult + Send + Sync + 'static,
    {
        self.subscribe_frame_kind(FrameKind::Frame, callback)
    }

    /// Append a change callback; returns the ids of all change callbacks in order.
    pub fn subscribe_change<F>(&self, callback: F) -> Vec<ListenerId>
    where
        F: Fn(&C, Option<&FrameBuffer>) -> CallbackResult + Send + Sync + 'static,
    {
        self.subscribe_frame_kind(FrameKind::Change, callback)
    }

    fn subscribe_frame_kind<F>(&self, kind: FrameKind, callback: F) -> Vec<ListenerId>
    where
        F: Fn(&C, Option<&FrameBuffer>) -> CallbackResult + Send + Sync + 'static,
    {
        let listener = Listener {
            id: self.next_id(),
            callback: Arc::new(callback) as Arc<FrameCallback<C>>,
        };
        push(self.frame_list(kind), listener)
    }

    /// Ids currently registered for `kind`, in invocation order.
    pub fn listeners(&self, kind: EventKind) -> Vec<ListenerId> {
        match kind {
            EventKind::Init => snapshot(&self.init).iter().map(|l| l.id).collect(),
            EventKind::Frame => snapshot(&self.frame).iter().map(|l| l.id).collect(),
            EventKind::Change => snapshot(&self.change).iter().map(|l| l.id).collect(),
        }
    }

    /// Run every init callback in order.
    pub fn dispatch_init(&self, ctx: &C) -> Result<(), MirrorError> {
        for listener in snapshot(&self.init) {
            (listener.callback)(ctx).map_err(|source| MirrorError::Callback {
                kind: EventKind::Init,
                source,
            })?;
        }
        Ok(())
    }

    /// Run every callback registered for `kind` in order.
    pub fn dispatch_frame(
        &self,
        kind: FrameKind,
        ctx: &C,
        frame: Option<&FrameBuffer>,
    ) -> Result<(), MirrorError> {
        for listener in snapshot(self.frame_list(kind)) {
            (listener.callback)(ctx, frame).map_err(|source| MirrorError::Callback {
                kind: kind.into(),
                source,
            })?;
        }
        Ok(())
    }
}

impl<C> Default for EventRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    type Log = Mutex<Vec<&'static str>>;

    #[test]
    fn dispatch_follows_insertion_order() {
        let registry: EventRegistry<Log> = EventRegistry::new();
        registry.subscribe_frame(|log: &Log, _| {
            log.lock().unwrap().push("a");
            Ok(())
        });
        let ids = registry.subscribe_frame(|log: &Log, _| {
            log.lock().unwrap().push("b");
            Ok(())
        });
        assert_eq!(ids.len(), 2);
        assert!(ids[0] < ids[1]);

        let log = Log::default();
        for _ in 0..3 {
            registry.dispatch_frame(FrameKind::Frame, &log, None).unwrap();
        }
        assert_eq!(*log.lock().unwrap(), ["a", "b", "a", "b", "a", "b"]);
    }

    #[test]
    fn kinds_are_separate() {
        let registry: EventRegistry<Log> = EventRegistry::new();
        registry.subscribe_init(|log: &Log| {
            log.lock().unwrap().push("init");
            Ok(())
        });
        registry.subscribe_change(|log: &Log, frame| {
            assert!(frame.is_some());
            log.lock().unwrap().push("change");
            Ok(())
        });

        let log = Log::default();
        registry.dispatch_frame(FrameKind::Frame, &log, None).unwrap();
        assert!(log.lock().unwrap().is_empty());

        registry.dispatch_init(&log).unwrap();
        let frame = FrameBuffer::filled(1, 1, 0);
        registry
            .dispatch_frame(FrameKind::Change, &log, Some(&frame))
            .unwrap();
        assert_eq!(*log.lock().unwrap(), ["init", "change"]);
        assert_eq!(registry.listeners(EventKind::Init).len(), 1);
        assert!(registry.listeners(EventKind::Frame).is_empty());
    }

    #[test]
    fn failing_callback_aborts_the_pass() {
        let registry: EventRegistry<Log> = EventRegistry::new();
        registry.subscribe_frame(|log: &Log, _| {
            log.lock().unwrap().push("first");
            Ok(())
        });
        registry.subscribe_frame(|_: &Log, _| Err("boom".into()));
        registry.subscribe_frame(|log: &Log, _| {
            log.lock().unwrap().push("never");
            Ok(())
        });

        let log = Log::default();
        let err = registry
            .dispatch_frame(FrameKind::Frame, &log, None)
            .unwrap_err();
        assert!(matches!(
            err,
            MirrorError::Callback {
                kind: EventKind::Frame,
                ..
            }
        ));
        assert_eq!(*log.lock().unwrap(), ["first"]);
    }

    #[test]
    fn no_deduplication() {
        let registry: EventRegistry<Log> = EventRegistry::new();
        let callback = |log: &Log| -> CallbackResult {
            log.lock().unwrap().push("x");
            Ok(())
        };
        registry.subscribe_init(callback);
        let ids = registry.subscribe_init(callback);
        assert_eq!(ids.len(), 2);

        let log = Log::default();
        registry.dispatch_init(&log).unwrap();
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[test]
    fn subscribing_during_dispatch_does_not_deadlock() {
        let registry: Arc<EventRegistry<Log>> = Arc::new(EventRegistry::new());
        let inner = Arc::clone(&registry);
        registry.subscribe_frame(move |_: &Log, _| {
            inner.subscribe_frame(|log: &Log, _| {
                log.lock().unwrap().push("late");
                Ok(())
            });
            inner.subscribe_change(|_: &Log, _| Ok(()));
            Ok(())
        });

        let log = Log::default();
        registry.dispatch_frame(FrameKind::Frame, &log, None).unwrap();
        assert!(log.lock().unwrap().is_empty());

        registry.dispatch_frame(FrameKind::Frame, &log, None).unwrap();
        assert_eq!(*log.lock().unwrap(), ["late"]);
        assert_eq!(registry.listeners(EventKind::Change).len(), 2);
    }

    #[test]
    fn frame_kinds_keep_separate_lists() {
        let registry: EventRegistry<Log> = EventRegistry::new();
        registry.subscribe_frame(|log: &Log, _| {
            log.lock().unwrap().push("frame");
            Ok(())
        });
        registry.subscribe_change(|_: &Log, _| Err("change rejected".into()));
        let log = Log::default();

        registry.dispatch_frame(FrameKind::Frame, &log, None).unwrap();
        assert_eq!(*log.lock().unwrap(), ["frame"]);

        let err = registry
            .dispatch_frame(FrameKind::Change, &log, None)
            .unwrap_err();
        assert!(matches!(
            err,
            MirrorError::Callback {
                kind: EventKind::Change,
                ..
            }
        ));
        assert_eq!(*log.lock().unwrap(), ["frame"]);
    }
}
