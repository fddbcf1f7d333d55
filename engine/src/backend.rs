//! Storage backend contract.
//!
//! Executors only ever touch storage through this trait. The semantics of
//! `copy_file` and `move_item` follow the usual desktop VFS conventions so
//! that executors can branch on the returned `ErrorKind`:
//!
//! | source    | target          | overwrite | result                   |
//! |-----------|-----------------|-----------|--------------------------|
//! | any       | exists          | no        | `Exists`                 |
//! | file      | directory       | yes       | `IsDirectory`            |
//! | directory | directory       | yes       | `WouldMerge`             |
//! | directory | missing or file | -         | `WouldRecurse` (copy)    |
//!
//! `move_item` with `no_fallback_for_move` returns `NotSupported` when an
//! atomic rename is impossible, and `WouldRecurse` for a directory that
//! would have to be copied.

use std::path::{Path, PathBuf};

use crate::error::BackendResult;
use crate::model::{FileInfo, FilesystemInfo, TransferFlags};

pub trait StorageBackend: Send + Sync {
    /// Attributes of `path`. Symlinks are not followed.
    fn stat(&self, path: &Path) -> BackendResult<FileInfo>;

    /// Direct children of `dir`.
    fn enumerate(&self, dir: &Path) -> BackendResult<Vec<FileInfo>>;

    fn move_item(&self, src: &Path, dst: &Path, flags: TransferFlags) -> BackendResult<()>;

    /// Copy one non-directory item. `progress` receives (copied, total) bytes.
    fn copy_file(
        &self,
        src: &Path,
        dst: &Path,
        flags: TransferFlags,
        progress: &mut dyn FnMut(u64, u64),
    ) -> BackendResult<()>;

    /// Remove a file, a symlink or an empty directory.
    fn delete(&self, path: &Path) -> BackendResult<()>;

    fn make_dir(&self, path: &Path) -> BackendResult<()>;

    fn make_symlink(&self, path: &Path, target: &Path) -> BackendResult<()>;

    /// Create a new file with `contents`. Fails with `Exists` if present.
    fn create_file(&self, path: &Path, contents: &[u8]) -> BackendResult<()>;

    fn read_file(&self, path: &Path) -> BackendResult<Vec<u8>>;

    fn replace_contents(&self, path: &Path, contents: &[u8]) -> BackendResult<()>;

    fn set_mode(&self, path: &Path, mode: u32) -> BackendResult<()>;

    /// Best-effort copy of permissions and timestamps.
    fn copy_attributes(&self, src: &Path, dst: &Path) -> BackendResult<()>;

    fn trash(&self, path: &Path) -> BackendResult<()>;

    /// Roots of the trash directories this backend manages.
    fn trash_dirs(&self) -> Vec<PathBuf>;

    fn query_filesystem(&self, path: &Path) -> BackendResult<FilesystemInfo>;

    fn unmount(&self, mount: &Path, eject: bool) -> BackendResult<()>;
}
