//! # fileops Engine - File Operation Jobs
//!
//! A headless engine that runs file-manager operations as background jobs
//! and reports back to a single UI thread. Designed as the foundation for
//! multiple front-ends (CLI, desktop shell, automation).
//!
//! ## Overview
//!
//! Every operation runs on its own worker thread and talks to the UI only
//! through the scheduler's message loop:
//! - Copy, move, duplicate and symlink creation with conflict dialogs
//! - Delete, trash and empty-trash with confirmation
//! - New folders, new files and files from templates
//! - Recursive permission changes and launcher trust marking
//! - Unmount/eject with an optional trash clean-up
//! - Pause, queue, resume and cancel of running jobs
//! - Rate-limited progress, undo records and completion notices
//!
//! ## Basic Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use engine::{EngineConfig, JobRequest, LocalBackend, NullListener, Scheduler, Services, TransferRequest};
//! # use engine::{ConflictRequest, ConflictResponse, ConflictAction, DialogPresenter, MessageRequest};
//! # struct AlwaysCancel;
//! # impl DialogPresenter for AlwaysCancel {
//! #     fn show_message(&mut self, _: &MessageRequest) -> usize { 0 }
//! #     fn show_conflict(&mut self, _: &ConflictRequest) -> ConflictResponse {
//! #         ConflictResponse::new(ConflictAction::Cancel)
//! #     }
//! # }
//!
//! let services = Services::new(Arc::new(LocalBackend::new()));
//! let (scheduler, mut ui_loop) = Scheduler::new(EngineConfig::default(), services);
//!
//! let request = TransferRequest::new(vec!["/home/me/report.pdf".into()], "/media/usb");
//! let job = scheduler.submit(JobRequest::Copy(request)).expect("valid request");
//!
//! // Dialogs and progress are delivered on the thread that pumps the loop.
//! ui_loop.run_until_idle(&mut AlwaysCancel, &mut NullListener);
//! println!("{:?}", job.state());
//! ```
//!
//! ## Modules
//!
//! - **backend**: The storage backend trait executors talk to
//! - **fs_ops**: Local filesystem backend
//! - **scheduler**: Job rows, queueing and the UI message loop
//! - **job**: Job requests, outcomes and the shared executor context
//! - **copy** / **delete** / **link** / **create** / **permissions** /
//!   **trust** / **unmount**: One executor per operation
//! - **progress**: Rate-limited progress model and pause gate
//! - **dialog**: Message and conflict dialogs
//! - **services**: Undo, placement, power and notification collaborators
//! - **testing**: In-memory backend and recording collaborators

pub mod backend;
pub mod config;
pub mod copy;
pub mod create;
pub mod delete;
pub mod dialog;
pub mod error;
pub mod format;
pub mod fs_ops;
pub mod job;
pub mod link;
pub mod model;
pub mod names;
pub mod permissions;
pub mod progress;
pub mod registry;
pub mod scan;
pub mod scheduler;
pub mod services;
pub mod testing;
pub mod trust;
pub mod unmount;

// Re-export main types
pub use backend::StorageBackend;
pub use config::EngineConfig;
pub use dialog::{
    Button, ConflictAction, ConflictRequest, ConflictResponse, DialogPresenter, MessageKind, MessageRequest,
};
pub use error::{BackendError, EngineError, ErrorKind, JobError};
pub use format::{format_bytes, format_duration};
pub use fs_ops::LocalBackend;
pub use job::{
    CreateKind, CreateRequest, JobId, JobOutcome, JobRequest, JobStatus, PermissionChange, TransferRequest,
};
pub use model::{FileInfo, FileKind, IconPosition};
pub use progress::{NullListener, ProgressListener, ProgressSnapshot, ProgressValue};
pub use scheduler::{JobHandle, RowState, Scheduler, UiLoop};
pub use services::{Notification, Notifier, PlacementSink, PowerManager, Services, UndoLedger, UndoRecord, UndoTransaction};
