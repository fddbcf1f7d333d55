//! Core data model shared by the executors.
//!
//! - FileInfo / FileKind: what the storage backend reports about an item
//! - FilesystemInfo: what the backend reports about the volume holding a path
//! - SourceInfo / TransferInfo: the scan result and the running counters
//! - TransferFlags / IconPosition: inputs to backend calls and placement hints

use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime};

use serde::{Deserialize, Serialize};

/// Kind of a filesystem item. Symlinks are never followed by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileKind {
    File,
    Directory,
    Symlink,
    Other,
}

/// Attributes of a single item, as returned by `stat` and `enumerate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub path: PathBuf,
    pub kind: FileKind,
    /// Size in bytes (0 for directories)
    pub size: u64,
    /// Unix permission bits, when the backend knows them
    pub mode: Option<u32>,
    pub modified: Option<SystemTime>,
}

impl FileInfo {
    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }

    /// The final path component, lossily converted for display and naming.
    pub fn name(&self) -> String {
        display_name(&self.path)
    }
}

/// Last path component as a String (the whole path if there is none).
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Volume information for a path.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilesystemInfo {
    /// Opaque identity; two paths with the same id share a filesystem
    pub id: Option<String>,
    /// e.g. "ext4", "vfat"
    pub fs_type: Option<String>,
    pub free_bytes: Option<u64>,
    pub read_only: bool,
    /// Longest allowed file name in bytes
    pub max_name_length: Option<usize>,
}

/// Which operation a scan is preparing for. Only affects status text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpKind {
    Copy,
    Move,
    Delete,
    Trash,
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpKind::Copy => write!(f, "copy"),
            OpKind::Move => write!(f, "move"),
            OpKind::Delete => write!(f, "delete"),
            OpKind::Trash => write!(f, "trash"),
        }
    }
}

/// Aggregate counts computed by the scan phase. Immutable once produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceInfo {
    pub num_files: u64,
    pub num_bytes: u64,
    pub op: OpKind,
}

impl SourceInfo {
    pub fn empty(op: OpKind) -> Self {
        SourceInfo {
            num_files: 0,
            num_bytes: 0,
            op,
        }
    }
}

/// Counters updated while a job transfers items. Owned by the worker.
#[derive(Debug, Clone)]
pub struct TransferInfo {
    pub num_files: u64,
    pub num_bytes: u64,
    /// When progress was last pushed to the progress model
    pub last_report_time: Option<Instant>,
    /// Files-left value shown in the last status text
    pub last_reported_files_left: Option<u64>,
}

impl TransferInfo {
    pub fn new() -> Self {
        TransferInfo {
            num_files: 0,
            num_bytes: 0,
            last_report_time: None,
            last_reported_files_left: None,
        }
    }

    /// Record one finished item of `bytes` bytes.
    pub fn add_file(&mut self, bytes: u64) {
        self.num_files += 1;
        self.num_bytes += bytes;
    }
}

impl Default for TransferInfo {
    fn default() -> Self {
        Self::new()
    }
}

/// Flags for `StorageBackend::move_item` and `copy_file`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransferFlags {
    /// Replace an existing target
    pub overwrite: bool,
    /// Fail with NotSupported instead of copying when an atomic move is impossible
    pub no_fallback_for_move: bool,
    /// Give the target default permissions instead of the source's
    pub target_default_perms: bool,
}

/// Placement hint for a newly created top-level item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IconPosition {
    pub x: i32,
    pub y: i32,
    pub screen: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_info_counts() {
        let mut info = TransferInfo::new();
        info.add_file(10);
        info.add_file(0);
        assert_eq!(info.num_files, 2);
        assert_eq!(info.num_bytes, 10);
    }

    #[test]
    fn test_display_name_falls_back_to_path() {
        assert_eq!(display_name(Path::new("/a/b.txt")), "b.txt");
        assert_eq!(display_name(Path::new("/")), "/");
    }
}
