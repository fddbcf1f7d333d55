//! Job requests, shared per-job state and the worker-side entry point.
//!
//! This module provides:
//! - `JobRequest`: one variant per operation kind
//! - `JobCore`: state every executor works with (progress, skip registry,
//!   sticky answers, undo records, collaborators) and the blocking dialog
//!   round trip to the UI loop
//! - `JobOutcome`: what the completion callback receives
//!
//! A `JobCore` lives on its job's worker thread and is never shared.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use crossbeam_channel::{bounded, Sender};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::StorageBackend;
use crate::config::EngineConfig;
use crate::dialog::{Button, ConflictRequest, ConflictResolution, MessageKind, MessageRequest};
use crate::error::{Cancelled, EngineError, JobError};
use crate::model::{IconPosition, SourceInfo, TransferInfo};
use crate::progress::{JobTimer, ProgressModel};
use crate::registry::{SkipRegistry, StickyFlags};
use crate::scheduler::UiMessage;
use crate::services::{InhibitCookie, Services, UndoRecord, UndoTransaction};
use crate::{copy, create, delete, link, permissions, trust, unmount};

pub type JobId = Uuid;

/// Sources and destination of a copy, move or link job.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransferRequest {
    pub sources: Vec<PathBuf>,
    pub destination: PathBuf,
    /// Placement hints for debuting items, keyed by source path
    pub positions: HashMap<PathBuf, IconPosition>,
}

impl TransferRequest {
    pub fn new(sources: Vec<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        TransferRequest {
            sources,
            destination: destination.into(),
            positions: HashMap::new(),
        }
    }

    pub fn with_position(mut self, source: impl Into<PathBuf>, position: IconPosition) -> Self {
        self.positions.insert(source.into(), position);
        self
    }
}

/// What a create job makes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateKind {
    Folder,
    /// A new file, empty unless contents are given
    File { contents: Option<Vec<u8>> },
    /// A copy of a template file
    FromTemplate(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRequest {
    pub parent: PathBuf,
    /// Defaults to "Untitled Folder" / "new file" / the template's name
    pub name: Option<String>,
    pub kind: CreateKind,
    pub position: Option<IconPosition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionChange {
    pub file_permissions: u32,
    pub file_mask: u32,
    pub dir_permissions: u32,
    pub dir_mask: u32,
}

/// One requested operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobRequest {
    Copy(TransferRequest),
    Move(TransferRequest),
    /// Copy each source next to itself under a duplicate name
    Duplicate {
        sources: Vec<PathBuf>,
        positions: HashMap<PathBuf, IconPosition>,
    },
    Link(TransferRequest),
    Delete { paths: Vec<PathBuf> },
    Trash { paths: Vec<PathBuf> },
    EmptyTrash { confirm: bool },
    Create(CreateRequest),
    SetPermissions { root: PathBuf, change: PermissionChange },
    MarkTrusted { path: PathBuf, interactive: bool },
    Unmount { mount: PathBuf, eject: bool, check_trash: bool },
}

impl JobRequest {
    /// Row title and undo label.
    pub fn label(&self) -> &'static str {
        match self {
            JobRequest::Copy(_) => "Copy",
            JobRequest::Move(_) => "Move",
            JobRequest::Duplicate { .. } => "Duplicate",
            JobRequest::Link(_) => "Create Links",
            JobRequest::Delete { .. } => "Delete",
            JobRequest::Trash { .. } => "Move to Trash",
            JobRequest::EmptyTrash { .. } => "Empty Trash",
            JobRequest::Create(_) => "Create",
            JobRequest::SetPermissions { .. } => "Change Permissions",
            JobRequest::MarkTrusted { .. } => "Mark as Trusted",
            JobRequest::Unmount { .. } => "Unmount",
        }
    }

    /// Short jobs that cannot be paused or queued.
    pub fn can_pause(&self) -> bool {
        !matches!(
            self,
            JobRequest::Create(_) | JobRequest::MarkTrusted { .. } | JobRequest::Unmount { .. }
        )
    }

    /// Jobs that keep the machine awake while running.
    pub fn inhibits_power(&self) -> bool {
        matches!(
            self,
            JobRequest::Copy(_)
                | JobRequest::Move(_)
                | JobRequest::Duplicate { .. }
                | JobRequest::Delete { .. }
                | JobRequest::Trash { .. }
                | JobRequest::EmptyTrash { .. }
        )
    }

    /// Reject requests no executor could make sense of.
    pub fn validate(&self) -> Result<(), EngineError> {
        let empty = match self {
            JobRequest::Copy(r) | JobRequest::Move(r) | JobRequest::Link(r) => r.sources.is_empty(),
            JobRequest::Duplicate { sources, .. } => sources.is_empty(),
            JobRequest::Delete { paths } | JobRequest::Trash { paths } => paths.is_empty(),
            _ => false,
        };
        if empty {
            return Err(EngineError::InvalidRequest {
                reason: format!("{} needs at least one item", self.label()),
            });
        }
        if let JobRequest::Create(CreateRequest { name: Some(name), .. }) = self {
            if name.is_empty() || name.contains('/') {
                return Err(EngineError::InvalidRequest {
                    reason: format!("invalid file name {:?}", name),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Completed,
    Cancelled,
}

/// Result handed to the completion callback.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub status: JobStatus,
    pub source_info: Option<SourceInfo>,
    pub transfer_info: TransferInfo,
    /// Items skipped after an error or conflict, and free-space overrides
    pub skipped: Vec<JobError>,
    /// Path made by a create job
    pub created: Option<PathBuf>,
    /// Running time, excluding time spent in dialogs
    pub elapsed: Duration,
}

impl JobOutcome {
    pub fn is_cancelled(&self) -> bool {
        self.status == JobStatus::Cancelled
    }
}

/// State shared by every executor of one job.
pub struct JobCore {
    id: JobId,
    progress: Arc<ProgressModel>,
    timer: JobTimer,
    services: Services,
    config: Arc<EngineConfig>,
    ui: Sender<UiMessage>,
    inhibit: Option<InhibitCookie>,
    undo: Vec<UndoRecord>,
    skipped: Vec<JobError>,
    created: Option<PathBuf>,
    /// Decisions already made for individual items
    pub skip: SkipRegistry,
    /// "Apply to all" answers
    pub flags: StickyFlags,
    pub source_info: Option<SourceInfo>,
    pub transfer: TransferInfo,
}

impl JobCore {
    pub(crate) fn new(
        id: JobId,
        progress: Arc<ProgressModel>,
        services: Services,
        config: Arc<EngineConfig>,
        ui: Sender<UiMessage>,
    ) -> Self {
        JobCore {
            id,
            progress,
            timer: JobTimer::new(),
            services,
            config,
            ui,
            inhibit: None,
            undo: Vec::new(),
            skipped: Vec::new(),
            created: None,
            skip: SkipRegistry::new(),
            flags: StickyFlags::default(),
            source_info: None,
            transfer: TransferInfo::new(),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn progress(&self) -> &ProgressModel {
        &self.progress
    }

    pub fn backend(&self) -> &dyn StorageBackend {
        self.services.backend.as_ref()
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn elapsed(&self) -> Duration {
        self.timer.elapsed()
    }

    /// Park while paused or queued; fail once cancelled.
    ///
    /// Time spent parked does not count towards the elapsed time.
    pub fn checkpoint(&mut self) -> Result<(), Cancelled> {
        let (parked, result) = self.progress.park();
        if !parked.is_zero() {
            debug!("Job {} resumed after {:?}", self.id, parked);
            self.timer.exclude(parked);
        }
        result
    }

    /// Guard in front of every mutating backend call.
    pub fn ensure_not_cancelled(&self) -> Result<(), Cancelled> {
        if self.progress.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.progress.is_cancelled()
    }

    pub fn cancel(&self) {
        self.progress.cancel();
    }

    /// Show a message dialog on the UI loop and wait for the answer.
    ///
    /// The elapsed clock stops while the dialog is open. Cancel, an
    /// out-of-range answer or a vanished UI all cancel the job.
    pub fn ask(
        &mut self,
        kind: MessageKind,
        primary: impl Into<String>,
        secondary: impl Into<String>,
        detail: Option<String>,
        buttons: &[Button],
    ) -> Button {
        if self.is_cancelled() {
            return Button::Cancel;
        }

        let request = MessageRequest {
            kind,
            primary: primary.into(),
            secondary: secondary.into(),
            detail,
            buttons: buttons.iter().map(|b| b.label().to_string()).collect(),
        };

        self.timer.pause();
        let (reply_tx, reply_rx) = bounded(1);
        let answer = match self.ui.send(UiMessage::Ask(self.id, request, reply_tx)) {
            Ok(()) => reply_rx.recv().ok(),
            Err(_) => None,
        };
        self.timer.resume();

        let button = answer
            .and_then(|index| buttons.get(index).copied())
            .unwrap_or(Button::Cancel);
        debug!("Job {} answered {:?}", self.id, button);
        if button == Button::Cancel {
            self.cancel();
        }
        button
    }

    /// Show the file conflict dialog on the UI loop and wait for the answer.
    pub fn ask_conflict(&mut self, request: ConflictRequest) -> ConflictResolution {
        if self.is_cancelled() {
            return ConflictResolution::Cancel;
        }

        let is_merge = request.is_merge;
        self.timer.pause();
        let (reply_tx, reply_rx) = bounded(1);
        let answer = match self.ui.send(UiMessage::Conflict(self.id, request, reply_tx)) {
            Ok(()) => reply_rx.recv().ok(),
            Err(_) => None,
        };
        self.timer.resume();

        let resolution = answer
            .map(|response| ConflictResolution::from_response(response, is_merge))
            .unwrap_or(ConflictResolution::Cancel);
        debug!("Job {} resolved conflict: {:?}", self.id, resolution);
        if resolution == ConflictResolution::Cancel {
            self.cancel();
        }
        resolution
    }

    pub fn add_undo(&mut self, record: UndoRecord) {
        self.undo.push(record);
    }

    /// Remember an item that ended up skipped.
    pub fn record_skip(&mut self, error: JobError) {
        debug!("Job {} skipped: {}", self.id, error);
        self.skipped.push(error);
    }

    pub fn set_created(&mut self, path: &Path) {
        self.created = Some(path.to_path_buf());
    }

    fn inhibit_power(&mut self, reason: &str) {
        self.inhibit = self.services.power.inhibit(reason);
    }

    fn uninhibit_power(&mut self) {
        if let Some(cookie) = self.inhibit.take() {
            self.services.power.uninhibit(cookie);
        }
    }

    /// Run `request` to completion on the current (worker) thread.
    pub(crate) fn execute(mut self, request: JobRequest) -> (JobOutcome, Option<UndoTransaction>) {
        let label = request.label();

        // A job queued at submission parks here before touching storage.
        let result = self.checkpoint().and_then(|()| {
            self.progress.start();
            self.timer.start();
            info!("Job {} started: {}", self.id, label);
            if request.inhibits_power() {
                self.inhibit_power(label);
            }
            dispatch(&mut self, request)
        });

        self.timer.pause();
        self.uninhibit_power();
        self.progress.finish();

        let status = if result.is_err() || self.is_cancelled() {
            JobStatus::Cancelled
        } else {
            JobStatus::Completed
        };
        match status {
            JobStatus::Completed => info!(
                "Job {} finished: {} files, {} bytes, {} skipped",
                self.id,
                self.transfer.num_files,
                self.transfer.num_bytes,
                self.skipped.len()
            ),
            JobStatus::Cancelled => warn!("Job {} cancelled", self.id),
        }

        let transaction = if self.undo.is_empty() {
            None
        } else {
            Some(UndoTransaction {
                job_id: self.id,
                label: label.to_string(),
                finished_at: Utc::now(),
                records: std::mem::take(&mut self.undo),
            })
        };

        let outcome = JobOutcome {
            status,
            source_info: self.source_info,
            transfer_info: self.transfer.clone(),
            skipped: std::mem::take(&mut self.skipped),
            created: self.created.take(),
            elapsed: self.timer.elapsed(),
        };
        (outcome, transaction)
    }
}

fn dispatch(core: &mut JobCore, request: JobRequest) -> Result<(), Cancelled> {
    match request {
        JobRequest::Copy(r) => copy::copy_files(core, r.sources, Some(r.destination), r.positions),
        JobRequest::Move(r) => copy::move_files(core, r.sources, r.destination, r.positions),
        JobRequest::Duplicate { sources, positions } => copy::copy_files(core, sources, None, positions),
        JobRequest::Link(r) => link::link_files(core, r.sources, r.destination, r.positions),
        JobRequest::Delete { paths } => delete::delete_files(core, paths, false),
        JobRequest::Trash { paths } => delete::delete_files(core, paths, true),
        JobRequest::EmptyTrash { confirm } => delete::empty_trash(core, confirm),
        JobRequest::Create(r) => create::create_item(core, r),
        JobRequest::SetPermissions { root, change } => permissions::set_permissions(core, root, change),
        JobRequest::MarkTrusted { path, interactive } => trust::mark_trusted(core, path, interactive),
        JobRequest::Unmount { mount, eject, check_trash } => {
            unmount::unmount_mount(core, mount, eject, check_trash)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialog::{ConflictAction, ConflictResponse};
    use crate::model::{FileInfo, FileKind};
    use crate::testing::MemoryBackend;
    use crossbeam_channel::unbounded;
    use std::thread;

    fn core() -> (JobCore, crossbeam_channel::Receiver<UiMessage>) {
        let (tx, rx) = unbounded();
        let id = Uuid::new_v4();
        let model = Arc::new(ProgressModel::new(id, tx.clone()));
        let services = Services::new(Arc::new(MemoryBackend::new()));
        let core = JobCore::new(id, model, services, Arc::new(EngineConfig::default()), tx);
        (core, rx)
    }

    fn answer_next_message(rx: crossbeam_channel::Receiver<UiMessage>, index: usize) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            for message in rx.iter() {
                if let UiMessage::Ask(_, request, reply) = message {
                    assert_eq!(request.buttons[0], "Cancel");
                    reply.send(index).expect("Failed to reply");
                    return;
                }
            }
        })
    }

    #[test]
    fn test_ask_returns_chosen_button() {
        let (mut core, rx) = core();
        let ui = answer_next_message(rx, 2);
        let button = core.ask(
            MessageKind::Error,
            "Error",
            "details",
            None,
            &[Button::Cancel, Button::SkipAll, Button::Skip],
        );
        ui.join().expect("UI thread panicked");
        assert_eq!(button, Button::Skip);
        assert!(!core.is_cancelled());
    }

    #[test]
    fn test_out_of_range_answer_cancels() {
        let (mut core, rx) = core();
        let ui = answer_next_message(rx, 7);
        let button = core.ask(MessageKind::Error, "Error", "", None, &[Button::Cancel, Button::Skip]);
        ui.join().expect("UI thread panicked");
        assert_eq!(button, Button::Cancel);
        assert!(core.is_cancelled());
    }

    #[test]
    fn test_dropped_ui_cancels() {
        let (mut core, rx) = core();
        drop(rx);
        let button = core.ask(MessageKind::Error, "Error", "", None, &[Button::Cancel, Button::Retry]);
        assert_eq!(button, Button::Cancel);
        assert!(core.is_cancelled());
    }

    #[test]
    fn test_ask_conflict_folds_apply_to_all() {
        let (mut core, rx) = core();
        let ui = thread::spawn(move || {
            for message in rx.iter() {
                if let UiMessage::Conflict(_, request, reply) = message {
                    assert!(request.is_merge);
                    reply
                        .send(ConflictResponse::new(ConflictAction::Overwrite).for_all())
                        .expect("Failed to reply");
                    return;
                }
            }
        });

        let dir = |path: &str| FileInfo {
            path: PathBuf::from(path),
            kind: FileKind::Directory,
            size: 0,
            mode: None,
            modified: None,
        };
        let resolution = core.ask_conflict(ConflictRequest {
            source: dir("/a/photos"),
            destination: dir("/b/photos"),
            dest_dir: PathBuf::from("/b"),
            is_merge: true,
        });
        ui.join().expect("UI thread panicked");
        assert_eq!(resolution, ConflictResolution::MergeAll);
    }

    #[test]
    fn test_parked_time_is_not_elapsed() {
        let (mut core, _rx) = core();
        core.timer.start();
        core.progress.hold_now();

        let model = Arc::clone(&core.progress);
        let releaser = thread::spawn(move || {
            thread::sleep(Duration::from_millis(150));
            model.release();
        });
        assert_eq!(core.checkpoint(), Ok(()));
        releaser.join().expect("releaser panicked");

        assert!(
            core.elapsed() < Duration::from_millis(100),
            "elapsed {:?} includes the parked interval",
            core.elapsed()
        );
    }

    #[test]
    fn test_validate_rejects_empty_sources() {
        let request = JobRequest::Copy(TransferRequest::new(Vec::new(), "/dst"));
        assert!(request.validate().is_err());

        let request = JobRequest::Trash {
            paths: vec![PathBuf::from("/a")],
        };
        assert!(request.validate().is_ok());
        assert!(request.can_pause());
        assert!(!JobRequest::MarkTrusted {
            path: PathBuf::from("/a"),
            interactive: false
        }
        .can_pause());
    }
}
