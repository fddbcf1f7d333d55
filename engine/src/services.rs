//! Contracts for the collaborators a job reports to, and the bundle the
//! scheduler hands to every worker.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::StorageBackend;
use crate::job::JobId;
use crate::model::IconPosition;

/// One undoable step recorded by a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UndoRecord {
    Copy { src: PathBuf, dst: PathBuf },
    Move { src: PathBuf, dst: PathBuf },
    CreateLink { src: PathBuf, dst: PathBuf },
    Trash { path: PathBuf, mtime: Option<SystemTime> },
    PermissionChange { path: PathBuf, old_mode: u32 },
    CreateFile { path: PathBuf, template: Option<PathBuf>, contents: Option<Vec<u8>> },
    CreateFolder { path: PathBuf },
    RecursiveSetPermissions {
        root: PathBuf,
        file_permissions: u32,
        file_mask: u32,
        dir_permissions: u32,
        dir_mask: u32,
        previous: Vec<(PathBuf, u32)>,
    },
}

/// Everything one job recorded, committed to the ledger when it finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoTransaction {
    pub job_id: JobId,
    pub label: String,
    pub finished_at: DateTime<Utc>,
    pub records: Vec<UndoRecord>,
}

/// Receives undo transactions. Called on the UI loop.
pub trait UndoLedger: Send + Sync {
    fn commit(&self, transaction: UndoTransaction);
}

/// Desktop icon placement and file-change notification sink.
pub trait PlacementSink: Send + Sync {
    fn file_added(&self, path: &std::path::Path);
    fn file_removed(&self, path: &std::path::Path);
    fn file_moved(&self, from: &std::path::Path, to: &std::path::Path);
    fn set_icon_position(&self, path: &std::path::Path, position: IconPosition);
    fn remove_icon_position(&self, path: &std::path::Path);
}

/// Opaque handle for an active power-management inhibition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InhibitCookie(pub u64);

/// Keeps the machine awake while long operations run.
pub trait PowerManager: Send + Sync {
    fn inhibit(&self, reason: &str) -> Option<InhibitCookie>;
    fn uninhibit(&self, cookie: InhibitCookie);
}

/// Fire-and-forget OS notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    OperationComplete { title: String, body: String },
    SafeToRemove { name: String },
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Collaborators that ignore everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct Noop;

impl UndoLedger for Noop {
    fn commit(&self, _transaction: UndoTransaction) {}
}

impl PlacementSink for Noop {
    fn file_added(&self, _path: &std::path::Path) {}
    fn file_removed(&self, _path: &std::path::Path) {}
    fn file_moved(&self, _from: &std::path::Path, _to: &std::path::Path) {}
    fn set_icon_position(&self, _path: &std::path::Path, _position: IconPosition) {}
    fn remove_icon_position(&self, _path: &std::path::Path) {}
}

impl PowerManager for Noop {
    fn inhibit(&self, _reason: &str) -> Option<InhibitCookie> {
        None
    }
    fn uninhibit(&self, _cookie: InhibitCookie) {}
}

impl Notifier for Noop {
    fn notify(&self, _notification: Notification) {}
}

/// Thread-safe collaborators shared by all jobs of a scheduler.
#[derive(Clone)]
pub struct Services {
    pub backend: Arc<dyn StorageBackend>,
    pub undo: Arc<dyn UndoLedger>,
    pub placement: Arc<dyn PlacementSink>,
    pub power: Arc<dyn PowerManager>,
    pub notifier: Arc<dyn Notifier>,
}

impl Services {
    /// A backend with no-op collaborators.
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Services {
            backend,
            undo: Arc::new(Noop),
            placement: Arc::new(Noop),
            power: Arc::new(Noop),
            notifier: Arc::new(Noop),
        }
    }

    pub fn with_undo(mut self, undo: Arc<dyn UndoLedger>) -> Self {
        self.undo = undo;
        self
    }

    pub fn with_placement(mut self, placement: Arc<dyn PlacementSink>) -> Self {
        self.placement = placement;
        self
    }

    pub fn with_power(mut self, power: Arc<dyn PowerManager>) -> Self {
        self.power = power;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}
