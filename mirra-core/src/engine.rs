//! The stream loop.
//!
//! Polls the non-blocking video channel, feeds the decoder, publishes
//! each decoded frame and dispatches frame and change callbacks. It is
//! the only reader of the video channel and the only writer of the
//! latest-frame snapshot.
//!
//! The loop never closes anything. `Session::stop` clears the alive
//! flag and shuts the channels down; any read failure that follows is
//! the loop's own doing and ends it quietly.

use std::sync::Arc;
use std::thread;

use tracing::{debug, trace};

use crate::change;
use crate::channel::{Channel, ReadOutcome};
use crate::decoder::FrameDecoder;
use crate::error::MirrorError;
use crate::events::FrameKind;
use crate::frame::FrameBuffer;
use crate::session::Session;

/// Run until the session stops. Returns an error only for failures
/// that happen while the session is alive.
pub(crate) fn run_loop(
    session: &Session,
    video: Arc<dyn Channel>,
    mut decoder: Box<dyn FrameDecoder>,
) -> Result<(), MirrorError> {
    let config = session.config();
    let mut buf = vec![0u8; config.chunk_size.max(1)];
    let mut previous: Option<FrameBuffer> = None;

    while session.is_alive() {
        match video.poll_read(&mut buf) {
            ReadOutcome::Data(n) => {
                session.counters().add_bytes(n);
                let frames = match decoder.feed(&buf[..n]) {
                    Ok(frames) => frames,
                    Err(_) if !session.is_alive() => break,
                    Err(e) => return Err(e),
                };
                for frame in frames {
                    deliver(session, &mut previous, frame)?;
                }
            }
            ReadOutcome::Pending => {
                thread::sleep(config.idle_interval());
                if !config.frame_gating && session.is_alive() {
                    session.counters().add_empty_tick();
                    session
                        .events()
                        .dispatch_frame(FrameKind::Frame, session, None)?;
                }
            }
            ReadOutcome::Closed => {
                if session.is_alive() {
                    return Err(MirrorError::StreamClosed);
                }
                break;
            }
            ReadOutcome::Failed(e) => {
                if session.is_alive() {
                    return Err(e.into());
                }
                debug!("read after stop: {e}");
                break;
            }
        }
    }

    Ok(())
}

/// Publish one decoded frame, then run frame and change callbacks.
fn deliver(
    session: &Session,
    previous: &mut Option<FrameBuffer>,
    frame: FrameBuffer,
) -> Result<(), MirrorError> {
    if !session.is_alive() {
        return Ok(());
    }
    session.counters().add_frame();
    session.publish_frame(frame.clone());
    trace!("frame {}", frame.resolution());

    session
        .events()
        .dispatch_frame(FrameKind::Frame, session, Some(&frame))?;

    let changed = change::is_changed(
        previous.as_ref(),
        &frame,
        session.config().change_threshold,
    );
    *previous = Some(frame);

    if changed && session.is_alive() {
        session.counters().add_change();
        session
            .events()
            .dispatch_frame(FrameKind::Change, session, previous.as_ref())?;
    }
    Ok(())
}
