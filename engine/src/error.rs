//! Error types for the job engine.
//!
//! Three layers:
//! - `BackendError`: a storage primitive failed. Carries a classified
//!   `ErrorKind` so executors can decide between retrying, prompting and
//!   falling back without looking at OS codes.
//! - `JobError`: a recoverable problem a job ran into and resolved by
//!   skipping, or the reason a job stopped. These end up in
//!   `JobOutcome::skipped` for the completion callback.
//! - `EngineError`: the engine itself could not do what was asked
//!   (bad request, unreadable config, worker spawn failure).

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of storage backend failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    NotFound,
    PermissionDenied,
    Exists,
    IsDirectory,
    NotDirectory,
    /// Copying a directory needs a recursive copy.
    WouldRecurse,
    /// Moving or copying a directory onto an existing directory.
    WouldMerge,
    /// The primitive is not available here (e.g. atomic move across filesystems).
    NotSupported,
    NotEmpty,
    InvalidFilename,
    NoSpace,
    ReadOnly,
    Cancelled,
    Other,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            ErrorKind::NotFound => "No such file or directory",
            ErrorKind::PermissionDenied => "Permission denied",
            ErrorKind::Exists => "File exists",
            ErrorKind::IsDirectory => "Is a directory",
            ErrorKind::NotDirectory => "Not a directory",
            ErrorKind::WouldRecurse => "Can't recursively copy directory",
            ErrorKind::WouldMerge => "Can't merge directories",
            ErrorKind::NotSupported => "Operation not supported",
            ErrorKind::NotEmpty => "Directory not empty",
            ErrorKind::InvalidFilename => "Invalid filename",
            ErrorKind::NoSpace => "No space left on device",
            ErrorKind::ReadOnly => "Read-only file system",
            ErrorKind::Cancelled => "Operation was cancelled",
            ErrorKind::Other => "Input/output error",
        };
        f.write_str(text)
    }
}

/// A failed storage primitive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}: {}", path.display())]
pub struct BackendError {
    pub kind: ErrorKind,
    pub path: PathBuf,
    pub message: String,
}

pub type BackendResult<T> = Result<T, BackendError>;

impl BackendError {
    pub fn new(kind: ErrorKind, path: impl Into<PathBuf>) -> Self {
        BackendError {
            kind,
            path: path.into(),
            message: kind.to_string(),
        }
    }

    pub fn with_message(kind: ErrorKind, path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        BackendError {
            kind,
            path: path.into(),
            message: message.into(),
        }
    }

    /// Classify an OS error raised while operating on `path`.
    pub fn from_io(err: &io::Error, path: &Path) -> Self {
        BackendError::with_message(classify_io(err), path, err.to_string())
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

fn classify_io(err: &io::Error) -> ErrorKind {
    #[cfg(unix)]
    if let Some(code) = err.raw_os_error() {
        match code {
            libc::ENOENT => return ErrorKind::NotFound,
            libc::EACCES | libc::EPERM => return ErrorKind::PermissionDenied,
            libc::EEXIST => return ErrorKind::Exists,
            libc::EISDIR => return ErrorKind::IsDirectory,
            libc::ENOTDIR => return ErrorKind::NotDirectory,
            libc::EXDEV | libc::ENOTSUP => return ErrorKind::NotSupported,
            libc::ENOTEMPTY => return ErrorKind::NotEmpty,
            libc::EINVAL | libc::EILSEQ | libc::ENAMETOOLONG => return ErrorKind::InvalidFilename,
            libc::ENOSPC | libc::EDQUOT => return ErrorKind::NoSpace,
            libc::EROFS => return ErrorKind::ReadOnly,
            libc::ECANCELED => return ErrorKind::Cancelled,
            _ => {}
        }
    }

    match err.kind() {
        io::ErrorKind::NotFound => ErrorKind::NotFound,
        io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
        io::ErrorKind::AlreadyExists => ErrorKind::Exists,
        io::ErrorKind::Unsupported => ErrorKind::NotSupported,
        io::ErrorKind::InvalidInput => ErrorKind::InvalidFilename,
        _ => ErrorKind::Other,
    }
}

/// Problems a job ran into, as reported to its completion callback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    /// Enumerating or querying a source failed during the scan phase.
    #[error("could not scan {}: {source}", path.display())]
    Scan { path: PathBuf, source: BackendError },

    /// The target already existed, or the item would be copied into itself.
    #[error("conflict at {}: {reason}", path.display())]
    Conflict { path: PathBuf, reason: String },

    /// The backend rejected a transfer, delete or attribute change.
    #[error("could not process {}: {source}", path.display())]
    Transfer { path: PathBuf, source: BackendError },

    /// Not enough free space at the destination.
    #[error("{required} bytes required but only {available} available")]
    Capacity { required: u64, available: u64 },

    /// The user cancelled the job. Never prompted about.
    #[error("operation cancelled")]
    Cancelled,
}

/// Marker returned through executors once the job has been cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation cancelled")]
pub struct Cancelled;

impl From<Cancelled> for JobError {
    fn from(_: Cancelled) -> Self {
        JobError::Cancelled
    }
}

/// Errors raised by the engine itself rather than by a running job.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("failed to read config {}", path.display())]
    ConfigRead { path: PathBuf, source: io::Error },

    #[error("failed to parse config {}", path.display())]
    ConfigParse { path: PathBuf, source: serde_json::Error },

    #[error("failed to start worker thread")]
    Spawn(#[source] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_errors_are_classified() {
        let path = Path::new("/tmp/x");
        let not_found = io::Error::from(io::ErrorKind::NotFound);
        assert_eq!(BackendError::from_io(&not_found, path).kind, ErrorKind::NotFound);

        let exists = io::Error::from(io::ErrorKind::AlreadyExists);
        assert_eq!(BackendError::from_io(&exists, path).kind, ErrorKind::Exists);

        #[cfg(unix)]
        {
            let xdev = io::Error::from_raw_os_error(libc::EXDEV);
            assert_eq!(BackendError::from_io(&xdev, path).kind, ErrorKind::NotSupported);

            let not_empty = io::Error::from_raw_os_error(libc::ENOTEMPTY);
            assert_eq!(BackendError::from_io(&not_empty, path).kind, ErrorKind::NotEmpty);
        }
    }

    #[test]
    fn test_backend_error_display_includes_path() {
        let err = BackendError::new(ErrorKind::PermissionDenied, "/srv/data");
        assert_eq!(err.to_string(), "Permission denied: /srv/data");
    }

    #[test]
    fn test_cancelled_converts_to_job_error() {
        let err: JobError = Cancelled.into();
        assert_eq!(err, JobError::Cancelled);
    }
}
