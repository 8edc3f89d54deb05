//! Minimal metrics scaffolding for the runtime core.
//! Counters are process-wide atomics; a snapshot is exposed for tests and
//! the `status` log line the binary prints on shutdown.

use std::sync::atomic::{AtomicU64, Ordering};

static MESSAGES_DISPATCHED: AtomicU64 = AtomicU64::new(0);
static HANDLER_ERRORS: AtomicU64 = AtomicU64::new(0);
static TIMERS_FIRED: AtomicU64 = AtomicU64::new(0);
static TIMERS_CANCELLED: AtomicU64 = AtomicU64::new(0);
static FUTURES_SUBMITTED: AtomicU64 = AtomicU64::new(0);
static FUTURES_COMPLETED: AtomicU64 = AtomicU64::new(0);
static FRAMES_DISPLAYED: AtomicU64 = AtomicU64::new(0);
static TELEMETRY_FRAMES: AtomicU64 = AtomicU64::new(0);

pub fn inc_messages_dispatched() {
    MESSAGES_DISPATCHED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_handler_errors() {
    HANDLER_ERRORS.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_timers_fired() {
    TIMERS_FIRED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_timers_cancelled() {
    TIMERS_CANCELLED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_futures_submitted() {
    FUTURES_SUBMITTED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_futures_completed() {
    FUTURES_COMPLETED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_frames_displayed() {
    FRAMES_DISPLAYED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_telemetry_frames() {
    TELEMETRY_FRAMES.fetch_add(1, Ordering::Relaxed);
}

/// Point-in-time view of the runtime counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub messages_dispatched: u64,
    pub handler_errors: u64,
    pub timers_fired: u64,
    pub timers_cancelled: u64,
    pub futures_submitted: u64,
    pub futures_completed: u64,
    pub frames_displayed: u64,
    pub telemetry_frames: u64,
}

pub fn snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        messages_dispatched: MESSAGES_DISPATCHED.load(Ordering::Relaxed),
        handler_errors: HANDLER_ERRORS.load(Ordering::Relaxed),
        timers_fired: TIMERS_FIRED.load(Ordering::Relaxed),
        timers_cancelled: TIMERS_CANCELLED.load(Ordering::Relaxed),
        futures_submitted: FUTURES_SUBMITTED.load(Ordering::Relaxed),
        futures_completed: FUTURES_COMPLETED.load(Ordering::Relaxed),
        frames_displayed: FRAMES_DISPLAYED.load(Ordering::Relaxed),
        telemetry_frames: TELEMETRY_FRAMES.load(Ordering::Relaxed),
    }
}
