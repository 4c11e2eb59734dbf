//! Whole-frame change detection.
//!
//! A frame counts as changed when the mean absolute difference of every
//! byte (every pixel, every channel) against the previous frame exceeds
//! a threshold. It is a global heuristic: a small localized change can
//! fall under the mean and go unreported.

use crate::frame::FrameBuffer;

/// Mean absolute per-byte difference between two frames of equal size.
///
/// Returns `None` when the dimensions differ. Two empty frames have a
/// difference of `0.0`.
pub fn mean_abs_diff(a: &FrameBuffer, b: &FrameBuffer) -> Option<f64> {
    if a.width() != b.width() || a.height() != b.height() {
        return None;
    }
    let len = a.data().len();
    if len == 0 {
        return Some(0.0);
    }
    let total: u64 = a
        .data()
        .iter()
        .zip(b.data())
        .map(|(&x, &y)| x.abs_diff(y) as u64)
        .sum();
    Some(total as f64 / len as f64)
}

/// Whether `current` differs materially from `previous`.
///
/// The first frame (`previous == None`) and any resize always count as
/// changes.
pub fn is_changed(previous: Option<&FrameBuffer>, current: &FrameBuffer, threshold: f64) -> bool {
    let Some(previous) = previous else {
        return true;
    };
    match mean_abs_diff(previous, current) {
        Some(mean) => mean > threshold,
        None => true,
    }
}

// ── Tests ────────────────────────────────────────────────────────
