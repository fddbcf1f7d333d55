//! Progress reporting and the pause/queue gate.
//!
//! A `ProgressModel` is shared by exactly one worker thread (the writer)
//! and the UI loop (the reader). Everything crossing threads sits behind
//! one mutex; the worker parks on the paired condition variable while the
//! job is paused or queued.
//!
//! Routine changes (status, details, fraction) are not pushed to the UI
//! one by one. The model marks them dirty and posts a single `Flush`
//! message; the UI loop collects the latest values no more often than the
//! configured interval. Start and held notifications go out immediately.
//!
//! The `ProgressListener` trait is the UI-side subscriber. It is only
//! ever called from the UI loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use tracing::debug;

use crate::error::Cancelled;
use crate::job::{JobId, JobOutcome};
use crate::scheduler::{RowState, UiMessage};

/// Shared cancellation flag for one job.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why a worker is parked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hold {
    Pause,
    Queue,
}

/// Fractional progress, or "busy" when totals are not known yet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressValue {
    Indeterminate,
    Fraction(f64),
}

/// A coherent copy of the model's user-visible fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub status: String,
    pub details: String,
    pub progress: ProgressValue,
    pub started: bool,
    pub finished: bool,
    pub paused: bool,
}

/// Which routine fields changed since the last delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Changes {
    pub status: bool,
    pub details: bool,
    pub progress: bool,
}

impl Changes {
    pub fn any(&self) -> bool {
        self.status || self.details || self.progress
    }
}

#[derive(Debug)]
struct ProgressState {
    status: String,
    details: String,
    progress: ProgressValue,
    started: bool,
    finished: bool,
    paused: bool,
    waiting: bool,
    hold_request: Option<Hold>,
    dirty: Changes,
    flush_scheduled: bool,
    last_flush: Option<Instant>,
}

/// Observable state of one job plus its pause/queue gate.
#[derive(Debug)]
pub struct ProgressModel {
    id: JobId,
    state: Mutex<ProgressState>,
    wake: Condvar,
    cancel: CancellationToken,
    ui: Sender<UiMessage>,
}

impl ProgressModel {
    pub(crate) fn new(id: JobId, ui: Sender<UiMessage>) -> Self {
        ProgressModel {
            id,
            state: Mutex::new(ProgressState {
                status: String::new(),
                details: String::new(),
                progress: ProgressValue::Indeterminate,
                started: false,
                finished: false,
                paused: false,
                waiting: false,
                hold_request: None,
                dirty: Changes::default(),
                flush_scheduled: false,
                last_flush: None,
            }),
            wake: Condvar::new(),
            cancel: CancellationToken::new(),
            ui,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ProgressState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn mark_dirty(&self, state: &mut ProgressState) {
        if !state.flush_scheduled {
            state.flush_scheduled = true;
            let _ = self.ui.send(UiMessage::Flush(self.id));
        }
    }

    // ---- writer side (worker thread) ----

    pub fn start(&self) {
        let mut state = self.lock();
        if state.started {
            return;
        }
        state.started = true;
        let _ = self.ui.send(UiMessage::Started(self.id));
    }

    pub fn set_status(&self, status: impl Into<String>) {
        let status = status.into();
        let mut state = self.lock();
        if state.status != status {
            state.status = status;
            state.dirty.status = true;
            self.mark_dirty(&mut state);
        }
    }

    pub fn set_details(&self, details: impl Into<String>) {
        let details = details.into();
        let mut state = self.lock();
        if state.details != details {
            state.details = details;
            state.dirty.details = true;
            self.mark_dirty(&mut state);
        }
    }

    /// Set determinate progress. Clamped to 0..=1.
    pub fn set_fraction(&self, fraction: f64) {
        let value = ProgressValue::Fraction(fraction.clamp(0.0, 1.0));
        let mut state = self.lock();
        if state.progress != value {
            state.progress = value;
            state.dirty.progress = true;
            self.mark_dirty(&mut state);
        }
    }

    /// Switch to an indeterminate "busy" indicator.
    pub fn pulse(&self) {
        let mut state = self.lock();
        if state.progress != ProgressValue::Indeterminate {
            state.progress = ProgressValue::Indeterminate;
            state.dirty.progress = true;
            self.mark_dirty(&mut state);
        }
    }

    pub(crate) fn finish(&self) {
        let mut state = self.lock();
        state.finished = true;
        state.waiting = false;
        state.paused = false;
        state.hold_request = None;
    }

    /// Block here while the job is paused or queued.
    ///
    /// Consumes a pending hold request first: the worker reports that it
    /// reached a checkpoint and parks until `release` or `cancel`.
    pub fn checkpoint(&self) -> Result<(), Cancelled> {
        self.park().1
    }

    /// `checkpoint`, also returning how long the worker was parked.
    pub(crate) fn park(&self) -> (Duration, Result<(), Cancelled>) {
        if self.cancel.is_cancelled() {
            return (Duration::ZERO, Err(Cancelled));
        }

        let mut state = self.lock();
        if let Some(hold) = state.hold_request.take() {
            state.waiting = true;
            state.paused = true;
            debug!("Job {} held at checkpoint ({:?})", self.id, hold);
            let _ = self.ui.send(UiMessage::Held(self.id, hold));
        }
        let parked_at = Instant::now();
        let mut parked = Duration::ZERO;
        while state.waiting && !self.cancel.is_cancelled() {
            state = self.wake.wait(state).unwrap_or_else(PoisonError::into_inner);
            parked = parked_at.elapsed();
        }
        drop(state);

        if self.cancel.is_cancelled() {
            (parked, Err(Cancelled))
        } else {
            (parked, Ok(()))
        }
    }

    // ---- control side (UI thread / scheduler) ----

    /// Ask the worker to park at its next checkpoint.
    pub(crate) fn request_hold(&self, hold: Hold) {
        let mut state = self.lock();
        if state.finished || state.waiting {
            return;
        }
        state.hold_request = Some(hold);
    }

    /// Park the worker before it starts (queued at submission).
    pub(crate) fn hold_now(&self) {
        let mut state = self.lock();
        state.waiting = true;
        state.paused = true;
    }

    /// Clear any pending or active hold and wake the worker.
    pub(crate) fn release(&self) {
        let mut state = self.lock();
        state.hold_request = None;
        state.waiting = false;
        state.paused = false;
        self.wake.notify_all();
    }

    /// Cancel the job and wake the worker if it is parked.
    pub fn cancel(&self) {
        self.cancel.cancel();
        let _state = self.lock();
        self.wake.notify_all();
    }

    // ---- reader side (UI loop) ----

    pub fn snapshot(&self) -> ProgressSnapshot {
        let state = self.lock();
        ProgressSnapshot {
            status: state.status.clone(),
            details: state.details.clone(),
            progress: state.progress,
            started: state.started,
            finished: state.finished,
            paused: state.paused,
        }
    }

    pub fn is_waiting(&self) -> bool {
        self.lock().waiting
    }

    /// When the next routine delivery may happen.
    pub(crate) fn next_flush_due(&self, interval: Duration) -> Instant {
        let state = self.lock();
        match state.last_flush {
            Some(last) => last + interval,
            None => Instant::now(),
        }
    }

    /// Take the pending routine changes, if any, with the current values.
    pub(crate) fn take_changes(&self) -> Option<(ProgressSnapshot, Changes)> {
        let mut state = self.lock();
        state.flush_scheduled = false;
        if !state.dirty.any() {
            return None;
        }
        let changes = std::mem::take(&mut state.dirty);
        state.last_flush = Some(Instant::now());
        let snapshot = ProgressSnapshot {
            status: state.status.clone(),
            details: state.details.clone(),
            progress: state.progress,
            started: state.started,
            finished: state.finished,
            paused: state.paused,
        };
        Some((snapshot, changes))
    }
}

/// Subscriber for per-job progress events. Called on the UI loop only.
pub trait ProgressListener {
    fn on_row_added(&mut self, _job: JobId, _title: &str) {}
    fn on_row_state(&mut self, _job: JobId, _state: RowState) {}
    fn on_started(&mut self, _job: JobId) {}
    fn on_status(&mut self, _job: JobId, _status: &str) {}
    fn on_details(&mut self, _job: JobId, _details: &str) {}
    fn on_progress(&mut self, _job: JobId, _progress: ProgressValue) {}
    fn on_finished(&mut self, _job: JobId, _outcome: &JobOutcome) {}
}

/// Listener that ignores everything.
#[derive(Debug, Default)]
pub struct NullListener;

impl ProgressListener for NullListener {}

/// Elapsed-time clock that can be stopped while a dialog is open.
#[derive(Debug, Clone)]
pub struct JobTimer {
    accumulated: Duration,
    running_since: Option<Instant>,
    /// Time spent parked at checkpoints, reported after the fact
    excluded: Duration,
}

impl JobTimer {
    pub fn new() -> Self {
        JobTimer {
            accumulated: Duration::ZERO,
            running_since: None,
            excluded: Duration::ZERO,
        }
    }

    /// Drop `interval` from the elapsed time.
    pub fn exclude(&mut self, interval: Duration) {
        self.excluded += interval;
    }

    pub fn start(&mut self) {
        if self.running_since.is_none() {
            self.running_since = Some(Instant::now());
        }
    }

    pub fn pause(&mut self) {
        if let Some(since) = self.running_since.take() {
            self.accumulated += since.elapsed();
        }
    }

    pub fn resume(&mut self) {
        self.start();
    }

    pub fn elapsed(&self) -> Duration {
        let total = match self.running_since {
            Some(since) => self.accumulated + since.elapsed(),
            None => self.accumulated,
        };
        total.saturating_sub(self.excluded)
    }
}

impl Default for JobTimer {
    fn default() -> Self {
        Self::new()
    }
}
