//! Job scheduler and the UI-thread event loop.
//!
//! `Scheduler` is the control half: it creates a row and a progress model
//! per submitted job, spawns the job's worker thread and implements the
//! pause / queue / resume / cancel transitions. It is cheap to clone and
//! may be used from any thread.
//!
//! `UiLoop` is the UI-thread half. Workers never call the presenter or
//! the listener themselves; they post `UiMessage`s and the loop handles
//! them in order: dialogs are shown and answered, routine progress is
//! delivered at most once per `progress_interval_ms`, and finished jobs
//! get their undo transaction committed, their completion notice sent and
//! their deferred callback run.
//!
//! Row lifecycle:
//!
//! ```text
//! Initialized -> Running | Queued
//! Running -> Pausing -> Paused       Running | Pausing -> Queuing -> Queued
//! Paused -> Queued                   Paused | Queued | Pausing | Queuing -> Running
//! any -> Finished
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::dialog::{ConflictRequest, ConflictResponse, DialogPresenter, MessageRequest};
use crate::error::EngineError;
use crate::format::{files, format_bytes};
use crate::job::{JobCore, JobId, JobOutcome, JobRequest};
use crate::progress::{Hold, ProgressListener, ProgressModel, ProgressSnapshot};
use crate::services::{Notification, Services, UndoTransaction};

/// Idle wait of the UI loop when no progress delivery is pending.
const IDLE_POLL: Duration = Duration::from_millis(50);

/// Messages from workers and the scheduler to the UI loop.
#[derive(Debug)]
pub enum UiMessage {
    /// Routine progress changed; collect it when the interval allows
    Flush(JobId),
    Started(JobId),
    /// The worker parked at a checkpoint
    Held(JobId, Hold),
    Ask(JobId, MessageRequest, Sender<usize>),
    Conflict(JobId, ConflictRequest, Sender<ConflictResponse>),
    Finished(JobId, Box<JobOutcome>, Option<UndoTransaction>),
    RowAdded(JobId, String),
    RowChanged(JobId, RowState),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowState {
    Initialized,
    Running,
    Pausing,
    Paused,
    Queuing,
    Queued,
    Finished,
}

impl RowState {
    /// Rows that count against `max_running_jobs`.
    pub fn is_active(self) -> bool {
        matches!(self, RowState::Running | RowState::Pausing | RowState::Queuing)
    }
}

type Completion = Box<dyn FnOnce(&JobOutcome) + Send>;

struct Row {
    seq: u64,
    title: String,
    state: RowState,
    can_pause: bool,
    model: Arc<ProgressModel>,
    callback: Option<Completion>,
    worker: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct Rows {
    rows: HashMap<JobId, Row>,
    next_seq: u64,
    job_counter: u64,
}

impl Rows {
    fn active_count(&self) -> usize {
        self.rows.values().filter(|row| row.state.is_active()).count()
    }
}

struct Inner {
    config: Arc<EngineConfig>,
    services: Services,
    ui: Sender<UiMessage>,
    rows: Mutex<Rows>,
}

/// Owns every submitted job until the UI loop has delivered its result.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.inner.config)
            .field("active", &self.active_count())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Create a scheduler and the UI loop that serves it.
    pub fn new(config: EngineConfig, services: Services) -> (Scheduler, UiLoop) {
        let (tx, rx) = unbounded();
        let scheduler = Scheduler {
            inner: Arc::new(Inner {
                config: Arc::new(config.normalized()),
                services,
                ui: tx,
                rows: Mutex::new(Rows::default()),
            }),
        };
        let ui_loop = UiLoop {
            scheduler: scheduler.clone(),
            rx,
            pending_flush: HashMap::new(),
        };
        (scheduler, ui_loop)
    }

    fn lock(&self) -> MutexGuard<'_, Rows> {
        self.inner.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn submit(&self, request: JobRequest) -> Result<JobHandle, EngineError> {
        self.start_job(request, None)
    }

    /// Submit a job whose `callback` runs on the UI loop once it finished.
    pub fn submit_with_callback(
        &self,
        request: JobRequest,
        callback: impl FnOnce(&JobOutcome) + Send + 'static,
    ) -> Result<JobHandle, EngineError> {
        self.start_job(request, Some(Box::new(callback)))
    }

    fn start_job(&self, request: JobRequest, callback: Option<Completion>) -> Result<JobHandle, EngineError> {
        request.validate()?;

        let id = Uuid::new_v4();
        let title = request.label().to_string();
        let can_pause = request.can_pause();
        let model = Arc::new(ProgressModel::new(id, self.inner.ui.clone()));
        let config = Arc::clone(&self.inner.config);

        let mut rows = self.lock();
        let queue = config.queue_new_jobs && can_pause && rows.active_count() >= config.max_running_jobs;
        if queue {
            model.hold_now();
        }

        rows.job_counter += 1;
        let seq = rows.next_seq;
        rows.next_seq += 1;
        let state = if queue { RowState::Queued } else { RowState::Running };
        rows.rows.insert(
            id,
            Row {
                seq,
                title: title.clone(),
                state,
                can_pause,
                model: Arc::clone(&model),
                callback,
                worker: None,
            },
        );
        // Sent before the worker exists so the row precedes its progress.
        let _ = self.inner.ui.send(UiMessage::RowAdded(id, title.clone()));
        let _ = self.inner.ui.send(UiMessage::RowChanged(id, state));

        let worker_model = Arc::clone(&model);
        let services = self.inner.services.clone();
        let ui = self.inner.ui.clone();
        let spawned = thread::Builder::new()
            .name(format!("fileops-job-{}", rows.job_counter))
            .spawn(move || {
                let core = JobCore::new(id, worker_model, services, config, ui.clone());
                let (outcome, transaction) = core.execute(request);
                let _ = ui.send(UiMessage::Finished(id, Box::new(outcome), transaction));
            });
        match spawned {
            Ok(worker) => {
                if let Some(row) = rows.rows.get_mut(&id) {
                    row.worker = Some(worker);
                }
            }
            Err(err) => {
                rows.rows.remove(&id);
                let _ = self.inner.ui.send(UiMessage::RowChanged(id, RowState::Finished));
                warn!("Failed to spawn worker for {}: {}", title, err);
                return Err(EngineError::Spawn(err));
            }
        }
        drop(rows);

        info!("Submitted job {} ({}) as {:?}", id, title, state);
        Ok(JobHandle {
            id,
            scheduler: self.clone(),
            model,
        })
    }

    fn set_state(&self, rows: &mut Rows, id: JobId, state: RowState) {
        if let Some(row) = rows.rows.get_mut(&id) {
            if row.state != state {
                debug!("Job {} {:?} -> {:?}", id, row.state, state);
                row.state = state;
                let _ = self.inner.ui.send(UiMessage::RowChanged(id, state));
            }
        }
    }

    /// Ask a running job to park at its next checkpoint.
    pub fn pause(&self, id: JobId) {
        let mut rows = self.lock();
        let Some((state, can_pause, model)) = rows
            .rows
            .get(&id)
            .map(|row| (row.state, row.can_pause, Arc::clone(&row.model)))
        else {
            return;
        };
        if !can_pause || state != RowState::Running {
            return;
        }
        model.request_hold(Hold::Pause);
        self.set_state(&mut rows, id, RowState::Pausing);
    }

    /// Move a job to the back of the queue.
    pub fn queue(&self, id: JobId) {
        let mut rows = self.lock();
        let Some((state, can_pause, model)) = rows
            .rows
            .get(&id)
            .map(|row| (row.state, row.can_pause, Arc::clone(&row.model)))
        else {
            return;
        };
        if !can_pause {
            return;
        }
        match state {
            RowState::Running | RowState::Pausing => {
                model.request_hold(Hold::Queue);
                self.set_state(&mut rows, id, RowState::Queuing);
            }
            RowState::Paused => {
                self.set_state(&mut rows, id, RowState::Queued);
                self.promote_queued(&mut rows);
            }
            _ => {}
        }
    }

    pub fn resume(&self, id: JobId) {
        let mut rows = self.lock();
        let Some((state, model)) = rows.rows.get(&id).map(|row| (row.state, Arc::clone(&row.model))) else {
            return;
        };
        if matches!(
            state,
            RowState::Paused | RowState::Queued | RowState::Pausing | RowState::Queuing
        ) {
            model.release();
            self.set_state(&mut rows, id, RowState::Running);
        }
    }

    /// Cancel a job. A parked worker wakes up and finishes as cancelled.
    pub fn cancel(&self, id: JobId) {
        if let Some(row) = self.lock().rows.get(&id) {
            info!("Cancelling job {}", id);
            row.model.cancel();
        }
    }

    /// Cancel every job that has not finished.
    pub fn cancel_all(&self) {
        for row in self.lock().rows.values() {
            row.model.cancel();
        }
    }

    /// `None` once the UI loop has delivered the job's result.
    pub fn row_state(&self, id: JobId) -> Option<RowState> {
        self.lock().rows.get(&id).map(|row| row.state)
    }

    pub fn active_count(&self) -> usize {
        self.lock().active_count()
    }

    /// No jobs left, finished ones included until their result is delivered.
    pub fn is_idle(&self) -> bool {
        self.lock().rows.is_empty()
    }

    /// Start the oldest queued rows while fewer than the limit are active.
    fn promote_queued(&self, rows: &mut Rows) {
        while rows.active_count() < self.inner.config.max_running_jobs {
            let next = rows
                .rows
                .iter()
                .filter(|(_, row)| row.state == RowState::Queued)
                .min_by_key(|(_, row)| row.seq)
                .map(|(id, row)| (*id, Arc::clone(&row.model)));
            let Some((id, model)) = next else {
                break;
            };
            info!("Starting queued job {}", id);
            model.release();
            self.set_state(rows, id, RowState::Running);
        }
    }

    /// A worker reported that it parked.
    fn on_held(&self, id: JobId, hold: Hold) {
        let mut rows = self.lock();
        let Some(state) = rows.rows.get(&id).map(|row| row.state) else {
            return;
        };
        let next = match state {
            RowState::Pausing => RowState::Paused,
            RowState::Queuing => RowState::Queued,
            // Resumed before the report arrived
            _ => {
                debug!("Job {} held ({:?}) while {:?}", id, hold, state);
                return;
            }
        };
        self.set_state(&mut rows, id, next);
        self.promote_queued(&mut rows);
    }

    fn model(&self, id: JobId) -> Option<Arc<ProgressModel>> {
        self.lock().rows.get(&id).map(|row| Arc::clone(&row.model))
    }

    fn take_finished(&self, id: JobId) -> Option<Row> {
        let mut rows = self.lock();
        let row = rows.rows.remove(&id);
        self.promote_queued(&mut rows);
        row
    }
}

/// Caller-side handle to one submitted job.
#[derive(Clone)]
pub struct JobHandle {
    id: JobId,
    scheduler: Scheduler,
    model: Arc<ProgressModel>,
}

impl fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHandle").field("id", &self.id).finish()
    }
}

impl JobHandle {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn cancel(&self) {
        self.scheduler.cancel(self.id);
        self.model.cancel();
    }

    pub fn pause(&self) {
        self.scheduler.pause(self.id);
    }

    pub fn queue(&self) {
        self.scheduler.queue(self.id);
    }

    pub fn resume(&self) {
        self.scheduler.resume(self.id);
    }

    pub fn state(&self) -> RowState {
        self.scheduler.row_state(self.id).unwrap_or(RowState::Finished)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.model.snapshot()
    }
}

/// The UI-thread half of the scheduler.
pub struct UiLoop {
    scheduler: Scheduler,
    rx: Receiver<UiMessage>,
    /// Deferred deliveries: job -> earliest delivery time
    pending_flush: HashMap<JobId, Instant>,
}

impl UiLoop {
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Handle messages until every submitted job has been delivered.
    pub fn run_until_idle(&mut self, presenter: &mut dyn DialogPresenter, listener: &mut dyn ProgressListener) {
        while !self.scheduler.is_idle() {
            self.pump(presenter, listener, IDLE_POLL);
        }
        // Row notifications sent after the last job finished
        while let Ok(message) = self.rx.try_recv() {
            self.handle(message, presenter, listener);
        }
    }

    /// Wait up to `timeout` for work, then handle everything available.
    /// Returns true if anything was handled.
    pub fn pump(
        &mut self,
        presenter: &mut dyn DialogPresenter,
        listener: &mut dyn ProgressListener,
        timeout: Duration,
    ) -> bool {
        let now = Instant::now();
        let wait = self
            .pending_flush
            .values()
            .min()
            .map(|due| due.saturating_duration_since(now).min(timeout))
            .unwrap_or(timeout);

        let mut handled = false;
        match self.rx.recv_timeout(wait) {
            Ok(message) => {
                self.handle(message, presenter, listener);
                handled = true;
                while let Ok(message) = self.rx.try_recv() {
                    self.handle(message, presenter, listener);
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return false,
        }

        let now = Instant::now();
        let due: Vec<JobId> = self
            .pending_flush
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in due {
            self.pending_flush.remove(&id);
            self.deliver(id, listener);
            handled = true;
        }
        handled
    }

    fn handle(&mut self, message: UiMessage, presenter: &mut dyn DialogPresenter, listener: &mut dyn ProgressListener) {
        match message {
            UiMessage::Flush(id) => {
                if self.pending_flush.contains_key(&id) {
                    return;
                }
                let Some(model) = self.scheduler.model(id) else {
                    return;
                };
                let due = model.next_flush_due(self.scheduler.config().progress_interval());
                if due <= Instant::now() {
                    self.deliver(id, listener);
                } else {
                    self.pending_flush.insert(id, due);
                }
            }
            UiMessage::Started(id) => listener.on_started(id),
            UiMessage::Held(id, hold) => self.scheduler.on_held(id, hold),
            UiMessage::Ask(id, request, reply) => {
                debug!("Job {} asks: {}", id, request.primary);
                let index = presenter.show_message(&request);
                let _ = reply.send(index);
            }
            UiMessage::Conflict(id, request, reply) => {
                debug!("Job {} conflict at {}", id, request.destination.path.display());
                let response = presenter.show_conflict(&request);
                let _ = reply.send(response);
            }
            UiMessage::RowAdded(id, title) => listener.on_row_added(id, &title),
            UiMessage::RowChanged(id, state) => listener.on_row_state(id, state),
            UiMessage::Finished(id, outcome, transaction) => {
                self.finish(id, *outcome, transaction, listener);
            }
        }
    }

    /// Push the latest routine changes of `id` to the listener.
    fn deliver(&mut self, id: JobId, listener: &mut dyn ProgressListener) {
        let Some(model) = self.scheduler.model(id) else {
            return;
        };
        let Some((snapshot, changes)) = model.take_changes() else {
            return;
        };
        if changes.status {
            listener.on_status(id, &snapshot.status);
        }
        if changes.details {
            listener.on_details(id, &snapshot.details);
        }
        if changes.progress {
            listener.on_progress(id, snapshot.progress);
        }
    }

    fn finish(
        &mut self,
        id: JobId,
        outcome: JobOutcome,
        transaction: Option<UndoTransaction>,
        listener: &mut dyn ProgressListener,
    ) {
        self.pending_flush.remove(&id);
        self.deliver(id, listener);

        let Some(mut row) = self.scheduler.take_finished(id) else {
            warn!("Finished message for unknown job {}", id);
            return;
        };
        listener.on_row_state(id, RowState::Finished);

        let services = &self.scheduler.inner.services;
        if let Some(transaction) = transaction {
            debug!("Committing {} undo records for job {}", transaction.records.len(), id);
            services.undo.commit(transaction);
        }

        if !outcome.is_cancelled() && outcome.elapsed >= self.scheduler.config().completion_notice_after() {
            services.notifier.notify(Notification::OperationComplete {
                title: format!("{} finished", row.title),
                body: format!(
                    "{} ({})",
                    files(outcome.transfer_info.num_files),
                    format_bytes(outcome.transfer_info.num_bytes)
                ),
            });
        }

        listener.on_finished(id, &outcome);
        if let Some(callback) = row.callback.take() {
            callback(&outcome);
        }
        if let Some(worker) = row.worker.take() {
            if worker.join().is_err() {
                warn!("Worker of job {} panicked", id);
            }
        }
        info!("Job {} delivered", id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::TransferRequest;
    use crate::progress::NullListener;
    use crate::testing::{MemoryBackend, Op, RecordingListener, RecordingNotifier, RecordingPower, ScriptedPresenter};
    use std::path::PathBuf;
    use std::sync::OnceLock;

    fn copy(source: &str, dest: &str) -> JobRequest {
        JobRequest::Copy(TransferRequest::new(vec![PathBuf::from(source)], dest))
    }

    fn queueing(max_running_jobs: usize) -> EngineConfig {
        EngineConfig {
            queue_new_jobs: true,
            max_running_jobs,
            ..EngineConfig::default()
        }
    }

    fn backend_with_sources(count: usize) -> Arc<MemoryBackend> {
        let backend = MemoryBackend::new();
        for i in 0..count {
            backend.add_file(&format!("/src{}/file", i), b"data");
        }
        backend.add_dir("/dst");
        Arc::new(backend)
    }

    #[test]
    fn test_queued_job_waits_for_running_one() {
        let backend = backend_with_sources(2);
        let (scheduler, mut ui_loop) = Scheduler::new(queueing(1), Services::new(backend.clone()));

        let first = scheduler.submit(copy("/src0", "/dst")).expect("submit");
        let second = scheduler.submit(copy("/src1", "/dst")).expect("submit");
        assert_eq!(first.state(), RowState::Running);
        assert_eq!(second.state(), RowState::Queued);

        ui_loop.run_until_idle(&mut ScriptedPresenter::new(), &mut NullListener);

        assert_eq!(second.state(), RowState::Finished);
        assert!(backend.exists("/dst/src1/file"));
        let calls = backend.calls();
        let last_first = calls
            .iter()
            .rposition(|c| c.path.starts_with("/src0") || c.path.starts_with("/dst/src0"))
            .expect("first job ran");
        let first_second = calls
            .iter()
            .position(|c| c.path.starts_with("/src1"))
            .expect("second job ran");
        assert!(last_first < first_second, "queued job made no calls before promotion");
    }

    #[test]
    fn test_at_most_k_jobs_start_on_their_own() {
        let backend = backend_with_sources(4);
        let (scheduler, mut ui_loop) = Scheduler::new(queueing(2), Services::new(backend.clone()));

        let handles: Vec<JobHandle> = (0..4)
            .map(|i| scheduler.submit(copy(&format!("/src{}", i), "/dst")).expect("submit"))
            .collect();
        let states: Vec<RowState> = handles.iter().map(JobHandle::state).collect();
        assert_eq!(
            states,
            vec![RowState::Running, RowState::Running, RowState::Queued, RowState::Queued]
        );

        let mut listener = RecordingListener::default();
        ui_loop.run_until_idle(&mut ScriptedPresenter::new(), &mut listener);
        assert_eq!(listener.finished.len(), 4);
        assert_eq!(scheduler.active_count(), 0);
    }

    #[test]
    fn test_jobs_that_cannot_pause_are_never_queued() {
        let backend = backend_with_sources(1);
        backend.add_file("/apps/x.desktop", b"");
        let (scheduler, mut ui_loop) = Scheduler::new(queueing(1), Services::new(backend.clone()));

        scheduler.submit(copy("/src0", "/dst")).expect("submit");
        let trust = scheduler
            .submit(JobRequest::MarkTrusted {
                path: PathBuf::from("/apps/x.desktop"),
                interactive: false,
            })
            .expect("submit");
        assert_eq!(trust.state(), RowState::Running);
        ui_loop.run_until_idle(&mut ScriptedPresenter::new(), &mut NullListener);
    }

    #[test]
    fn test_no_mutation_after_cancellation() {
        let backend = MemoryBackend::new();
        for name in ["a", "b", "c", "d", "e"] {
            backend.add_file(&format!("/src/{}", name), b"x");
        }
        backend.add_dir("/dst");
        let backend = Arc::new(backend);

        let handle_slot: Arc<OnceLock<JobHandle>> = Arc::new(OnceLock::new());
        let copies = Arc::new(Mutex::new(0usize));
        {
            let handle_slot = Arc::clone(&handle_slot);
            let copies = Arc::clone(&copies);
            backend.set_hook(move |call| {
                if call.op != Op::CopyFile {
                    return;
                }
                let Some(handle) = wait_for(&handle_slot) else {
                    return;
                };
                let mut copies = copies.lock().unwrap_or_else(PoisonError::into_inner);
                *copies += 1;
                if *copies == 2 {
                    handle.cancel();
                }
            });
        }

        let (scheduler, mut ui_loop) = Scheduler::new(EngineConfig::default(), Services::new(backend.clone()));
        let sources = ["a", "b", "c", "d", "e"]
            .iter()
            .map(|n| PathBuf::from(format!("/src/{}", n)))
            .collect();
        let outcome: Arc<Mutex<Option<JobOutcome>>> = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&outcome);
        let handle = scheduler
            .submit_with_callback(JobRequest::Copy(TransferRequest::new(sources, "/dst")), move |o| {
                *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(o.clone());
            })
            .expect("submit");
        handle_slot.set(handle).expect("handle set once");

        ui_loop.run_until_idle(&mut ScriptedPresenter::new(), &mut NullListener);

        let outcome = outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .expect("callback ran");
        assert!(outcome.is_cancelled());
        assert_eq!(backend.calls_of(Op::CopyFile).len(), 2, "only the in-flight copy finished");
        assert_eq!(backend.mutation_count(), 2);
    }

    fn wait_for(slot: &OnceLock<JobHandle>) -> Option<&JobHandle> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if let Some(handle) = slot.get() {
                return Some(handle);
            }
            thread::sleep(Duration::from_millis(1));
        }
        None
    }

    #[test]
    fn test_pause_parks_worker_until_resumed() {
        let backend = backend_with_sources(1);
        let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(1);
        let gate_rx = Mutex::new(Some(gate_rx));
        backend.set_hook(move |call| {
            if call.op == Op::Stat {
                if let Some(rx) = gate_rx.lock().unwrap_or_else(PoisonError::into_inner).take() {
                    let _ = rx.recv_timeout(Duration::from_secs(5));
                }
            }
        });

        let (scheduler, mut ui_loop) = Scheduler::new(EngineConfig::default(), Services::new(backend.clone()));
        let handle = scheduler.submit(copy("/src0", "/dst")).expect("submit");
        handle.pause();
        assert_eq!(handle.state(), RowState::Pausing);
        gate_tx.send(()).expect("gate open");

        let mut presenter = ScriptedPresenter::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        while handle.state() != RowState::Paused && Instant::now() < deadline {
            ui_loop.pump(&mut presenter, &mut NullListener, Duration::from_millis(10));
        }
        assert_eq!(handle.state(), RowState::Paused);
        assert!(handle.snapshot().paused);
        assert_eq!(backend.mutation_count(), 0);

        handle.resume();
        ui_loop.run_until_idle(&mut presenter, &mut NullListener);
        assert!(backend.exists("/dst/src0/file"));
    }

    #[test]
    fn test_completion_notice_and_power_inhibit() {
        let backend = backend_with_sources(1);
        let notifier = Arc::new(RecordingNotifier::default());
        let power = Arc::new(RecordingPower::default());
        let services = Services::new(backend)
            .with_notifier(notifier.clone())
            .with_power(power.clone());
        let config = EngineConfig {
            completion_notice_after_ms: 0,
            ..EngineConfig::default()
        };
        let (scheduler, mut ui_loop) = Scheduler::new(config, services);

        scheduler.submit(copy("/src0", "/dst")).expect("submit");
        let mut listener = RecordingListener::default();
        ui_loop.run_until_idle(&mut ScriptedPresenter::new(), &mut listener);

        assert_eq!(notifier.notifications().len(), 1);
        assert_eq!(power.inhibit_count(), 1);
        assert_eq!(power.active(), 0);
        assert_eq!(listener.started.len(), 1);
        assert!(listener.rows.iter().any(|(_, state)| *state == RowState::Finished));
        assert!(!listener.statuses.is_empty());
    }

    #[test]
    fn test_invalid_request_is_rejected_synchronously() {
        let (scheduler, _ui_loop) = Scheduler::new(EngineConfig::default(), Services::new(backend_with_sources(0)));
        let result = scheduler.submit(JobRequest::Delete { paths: Vec::new() });
        assert!(matches!(result, Err(EngineError::InvalidRequest { .. })));
        assert!(scheduler.is_idle());
    }
}
