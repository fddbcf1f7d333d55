//! Local filesystem backend.
//!
//! This module provides the `StorageBackend` used outside of tests:
//! - Attribute queries and enumeration via `std::fs` (symlinks not followed)
//! - Chunked file copies with progress callbacks and mtime preservation
//! - freedesktop.org style trash (`files/` + `info/*.trashinfo`)
//! - Volume queries through `statvfs` and `/proc/self/mounts` on unix

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{debug, warn};

use crate::backend::StorageBackend;
use crate::error::{BackendError, BackendResult, ErrorKind};
use crate::model::{FileInfo, FileKind, FilesystemInfo, TransferFlags};

const COPY_CHUNK: usize = 64 * 1024;

/// Backend operating on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    trash_root: PathBuf,
}

impl LocalBackend {
    /// Use the user's home trash (`$XDG_DATA_HOME/Trash`).
    pub fn new() -> Self {
        LocalBackend {
            trash_root: default_trash_root(),
        }
    }

    /// Use `trash_root` as the trash directory.
    pub fn with_trash_dir(trash_root: impl Into<PathBuf>) -> Self {
        LocalBackend {
            trash_root: trash_root.into(),
        }
    }

    pub fn trash_root(&self) -> &Path {
        &self.trash_root
    }

    fn trash_files_dir(&self) -> PathBuf {
        self.trash_root.join("files")
    }

    fn trash_info_dir(&self) -> PathBuf {
        self.trash_root.join("info")
    }
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn default_trash_root() -> PathBuf {
    if let Some(data) = std::env::var_os("XDG_DATA_HOME").filter(|v| !v.is_empty()) {
        return PathBuf::from(data).join("Trash");
    }
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".local/share/Trash"),
        None => std::env::temp_dir().join("Trash"),
    }
}

fn io_err(path: &Path) -> impl Fn(io::Error) -> BackendError + '_ {
    move |e| BackendError::from_io(&e, path)
}

fn info_from_metadata(path: &Path, metadata: &fs::Metadata) -> FileInfo {
    let file_type = metadata.file_type();
    let kind = if file_type.is_symlink() {
        FileKind::Symlink
    } else if file_type.is_dir() {
        FileKind::Directory
    } else if file_type.is_file() {
        FileKind::File
    } else {
        FileKind::Other
    };

    #[cfg(unix)]
    let mode = {
        use std::os::unix::fs::PermissionsExt;
        Some(metadata.permissions().mode() & 0o7777)
    };
    #[cfg(not(unix))]
    let mode = None;

    FileInfo {
        path: path.to_path_buf(),
        kind,
        size: if kind == FileKind::Directory { 0 } else { metadata.len() },
        mode,
        modified: metadata.modified().ok(),
    }
}

/// Metadata without following symlinks, `None` when nothing is there.
fn lstat_opt(path: &Path) -> BackendResult<Option<fs::Metadata>> {
    match fs::symlink_metadata(path) {
        Ok(m) => Ok(Some(m)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(BackendError::from_io(&e, path)),
    }
}

fn remove_any(path: &Path, metadata: &fs::Metadata) -> BackendResult<()> {
    if metadata.is_dir() {
        fs::remove_dir(path).map_err(io_err(path))
    } else {
        fs::remove_file(path).map_err(io_err(path))
    }
}

fn copy_contents(
    src: &Path,
    dst: &Path,
    overwrite: bool,
    progress: &mut dyn FnMut(u64, u64),
) -> BackendResult<u64> {
    let mut input = fs::File::open(src).map_err(io_err(src))?;
    let total = input.metadata().map_err(io_err(src))?.len();

    let mut options = fs::OpenOptions::new();
    options.write(true);
    if overwrite {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    let mut output = options.open(dst).map_err(io_err(dst))?;

    let mut buffer = vec![0u8; COPY_CHUNK];
    let mut copied = 0u64;
    progress(0, total);
    loop {
        let n = match input.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(BackendError::from_io(&e, src)),
        };
        output.write_all(&buffer[..n]).map_err(io_err(dst))?;
        copied += n as u64;
        progress(copied, total);
    }
    output.flush().map_err(io_err(dst))?;
    Ok(copied)
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> BackendResult<()> {
    let target = fs::read_link(src).map_err(io_err(src))?;
    std::os::unix::fs::symlink(&target, dst).map_err(io_err(dst))
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, _dst: &Path) -> BackendResult<()> {
    Err(BackendError::new(ErrorKind::NotSupported, src))
}

fn preserve_mtime(src: &fs::Metadata, dst: &Path) {
    if let Ok(mtime) = src.modified() {
        if let Err(e) = filetime::set_file_mtime(dst, filetime::FileTime::from_system_time(mtime)) {
            debug!("Could not preserve mtime on {}: {}", dst.display(), e);
        }
    }
}

/// Percent-encode a path for a `.trashinfo` file.
fn encode_trash_path(path: &Path) -> String {
    let raw = path.to_string_lossy();
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

impl StorageBackend for LocalBackend {
    fn stat(&self, path: &Path) -> BackendResult<FileInfo> {
        let metadata = fs::symlink_metadata(path).map_err(io_err(path))?;
        Ok(info_from_metadata(path, &metadata))
    }

    fn enumerate(&self, dir: &Path) -> BackendResult<Vec<FileInfo>> {
        let mut children = Vec::new();
        for entry in fs::read_dir(dir).map_err(io_err(dir))? {
            let entry = entry.map_err(io_err(dir))?;
            let path = entry.path();
            let metadata = fs::symlink_metadata(&path).map_err(io_err(&path))?;
            children.push(info_from_metadata(&path, &metadata));
        }
        children.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(children)
    }

    fn move_item(&self, src: &Path, dst: &Path, flags: TransferFlags) -> BackendResult<()> {
        let source = fs::symlink_metadata(src).map_err(io_err(src))?;
        if let Some(target) = lstat_opt(dst)? {
            if !flags.overwrite {
                return Err(BackendError::new(ErrorKind::Exists, dst));
            }
            match (source.is_dir(), target.is_dir()) {
                (true, true) => return Err(BackendError::new(ErrorKind::WouldMerge, dst)),
                (false, true) => return Err(BackendError::new(ErrorKind::IsDirectory, dst)),
                (true, false) => return Err(BackendError::new(ErrorKind::WouldRecurse, src)),
                (false, false) => {}
            }
        }

        match fs::rename(src, dst) {
            Ok(()) => Ok(()),
            Err(e) => {
                let err = BackendError::from_io(&e, src);
                if !err.is(ErrorKind::NotSupported) {
                    return Err(err);
                }
                if flags.no_fallback_for_move {
                    return Err(err);
                }
                if source.is_dir() {
                    return Err(BackendError::new(ErrorKind::WouldRecurse, src));
                }
                self.copy_file(src, dst, flags, &mut |_, _| {})?;
                fs::remove_file(src).map_err(io_err(src))
            }
        }
    }

    fn copy_file(
        &self,
        src: &Path,
        dst: &Path,
        flags: TransferFlags,
        progress: &mut dyn FnMut(u64, u64),
    ) -> BackendResult<()> {
        let source = fs::symlink_metadata(src).map_err(io_err(src))?;
        let target = lstat_opt(dst)?;

        if source.is_dir() {
            return match target {
                Some(_) if !flags.overwrite => Err(BackendError::new(ErrorKind::Exists, dst)),
                Some(t) if t.is_dir() => Err(BackendError::new(ErrorKind::WouldMerge, dst)),
                _ => Err(BackendError::new(ErrorKind::WouldRecurse, src)),
            };
        }

        if let Some(t) = &target {
            if !flags.overwrite {
                return Err(BackendError::new(ErrorKind::Exists, dst));
            }
            if t.is_dir() {
                return Err(BackendError::new(ErrorKind::IsDirectory, dst));
            }
            if t.file_type().is_symlink() || source.file_type().is_symlink() {
                fs::remove_file(dst).map_err(io_err(dst))?;
            }
        }

        if source.file_type().is_symlink() {
            return copy_symlink(src, dst);
        }

        copy_contents(src, dst, flags.overwrite, progress)?;

        if !flags.target_default_perms {
            if let Err(e) = fs::set_permissions(dst, source.permissions()) {
                debug!("Could not copy permissions to {}: {}", dst.display(), e);
            }
        }
        preserve_mtime(&source, dst);
        Ok(())
    }

    fn delete(&self, path: &Path) -> BackendResult<()> {
        let metadata = fs::symlink_metadata(path).map_err(io_err(path))?;
        remove_any(path, &metadata)
    }

    fn make_dir(&self, path: &Path) -> BackendResult<()> {
        fs::create_dir(path).map_err(io_err(path))
    }

    #[cfg(unix)]
    fn make_symlink(&self, path: &Path, target: &Path) -> BackendResult<()> {
        std::os::unix::fs::symlink(target, path).map_err(io_err(path))
    }

    #[cfg(not(unix))]
    fn make_symlink(&self, path: &Path, _target: &Path) -> BackendResult<()> {
        Err(BackendError::new(ErrorKind::NotSupported, path))
    }

    fn create_file(&self, path: &Path, contents: &[u8]) -> BackendResult<()> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(io_err(path))?;
        file.write_all(contents).map_err(io_err(path))
    }

    fn read_file(&self, path: &Path) -> BackendResult<Vec<u8>> {
        fs::read(path).map_err(io_err(path))
    }

    fn replace_contents(&self, path: &Path, contents: &[u8]) -> BackendResult<()> {
        let file_name = path
            .file_name()
            .ok_or_else(|| BackendError::new(ErrorKind::InvalidFilename, path))?;
        let mut temp_name = std::ffi::OsString::from(".");
        temp_name.push(file_name);
        temp_name.push(".tmp");
        let temp = path.with_file_name(temp_name);

        fs::write(&temp, contents).map_err(io_err(&temp))?;
        if let Ok(metadata) = fs::metadata(path) {
            let _ = fs::set_permissions(&temp, metadata.permissions());
        }
        fs::rename(&temp, path).map_err(|e| {
            let _ = fs::remove_file(&temp);
            BackendError::from_io(&e, path)
        })
    }

    #[cfg(unix)]
    fn set_mode(&self, path: &Path, mode: u32) -> BackendResult<()> {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(io_err(path))
    }

    #[cfg(not(unix))]
    fn set_mode(&self, path: &Path, _mode: u32) -> BackendResult<()> {
        Err(BackendError::new(ErrorKind::NotSupported, path))
    }

    fn copy_attributes(&self, src: &Path, dst: &Path) -> BackendResult<()> {
        let source = fs::symlink_metadata(src).map_err(io_err(src))?;
        if source.file_type().is_symlink() {
            return Ok(());
        }
        fs::set_permissions(dst, source.permissions()).map_err(io_err(dst))?;
        preserve_mtime(&source, dst);
        Ok(())
    }

    fn trash(&self, path: &Path) -> BackendResult<()> {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir().map_err(io_err(path))?.join(path)
        };
        fs::symlink_metadata(&absolute).map_err(io_err(path))?;

        let files = self.trash_files_dir();
        let info = self.trash_info_dir();
        fs::create_dir_all(&files).map_err(io_err(&files))?;
        fs::create_dir_all(&info).map_err(io_err(&info))?;

        let base = absolute
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| BackendError::new(ErrorKind::InvalidFilename, path))?;

        // Reserve the info file first so two trash calls never pick the same name
        let mut counter = 1u32;
        let (name, info_path) = loop {
            let candidate = if counter == 1 {
                base.clone()
            } else {
                format!("{}.{}", base, counter)
            };
            let info_path = info.join(format!("{}.trashinfo", candidate));
            if !files.join(&candidate).exists() {
                match fs::OpenOptions::new().write(true).create_new(true).open(&info_path) {
                    Ok(mut file) => {
                        let body = format!(
                            "[Trash Info]\nPath={}\nDeletionDate={}\n",
                            encode_trash_path(&absolute),
                            Local::now().format("%Y-%m-%dT%H:%M:%S")
                        );
                        file.write_all(body.as_bytes()).map_err(io_err(&info_path))?;
                        break (candidate, info_path);
                    }
                    Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                    Err(e) => return Err(BackendError::from_io(&e, &info_path)),
                }
            }
            counter += 1;
        };

        if let Err(e) = fs::rename(&absolute, files.join(&name)) {
            let _ = fs::remove_file(&info_path);
            return Err(BackendError::from_io(&e, path));
        }
        debug!("Trashed {} as {}", absolute.display(), name);
        Ok(())
    }

    fn trash_dirs(&self) -> Vec<PathBuf> {
        vec![self.trash_files_dir(), self.trash_info_dir()]
    }

    fn query_filesystem(&self, path: &Path) -> BackendResult<FilesystemInfo> {
        // Query the closest existing ancestor
        let mut existing = path.to_path_buf();
        while lstat_opt(&existing)?.is_none() {
            if !existing.pop() {
                return Err(BackendError::new(ErrorKind::NotFound, path));
            }
        }
        query_volume(&existing)
    }

    fn unmount(&self, mount: &Path, _eject: bool) -> BackendResult<()> {
        warn!("Unmounting is not supported by the local backend: {}", mount.display());
        Err(BackendError::new(ErrorKind::NotSupported, mount))
    }
}

#[cfg(unix)]
fn query_volume(path: &Path) -> BackendResult<FilesystemInfo> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;
    use std::os::unix::fs::MetadataExt;

    let metadata = fs::metadata(path).map_err(io_err(path))?;
    let mut info = FilesystemInfo {
        id: Some(format!("dev:{}", metadata.dev())),
        fs_type: mount_fs_type(path),
        ..FilesystemInfo::default()
    };

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| BackendError::new(ErrorKind::InvalidFilename, path))?;
    let mut stats = std::mem::MaybeUninit::<libc::statvfs>::uninit();
    // SAFETY: c_path is NUL terminated and stats is a valid out pointer
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), stats.as_mut_ptr()) };
    if rc == 0 {
        // SAFETY: statvfs returned success so the struct is initialized
        let stats = unsafe { stats.assume_init() };
        info.free_bytes = Some((stats.f_bavail as u64).saturating_mul(stats.f_frsize as u64));
        info.read_only = (stats.f_flag as u64 & libc::ST_RDONLY as u64) != 0;
        info.max_name_length = Some(stats.f_namemax as usize);
    } else {
        debug!("statvfs failed for {}: {}", path.display(), io::Error::last_os_error());
    }
    Ok(info)
}

#[cfg(not(unix))]
fn query_volume(_path: &Path) -> BackendResult<FilesystemInfo> {
    Ok(FilesystemInfo::default())
}

/// Filesystem type of the longest mount point containing `path`.
#[cfg(unix)]
fn mount_fs_type(path: &Path) -> Option<String> {
    let absolute = fs::canonicalize(path).ok()?;
    let mounts = fs::read_to_string("/proc/self/mounts").ok()?;
    mounts
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let _device = fields.next()?;
            let mount_point = fields.next()?.replace("\\040", " ");
            let fs_type = fields.next()?;
            Some((PathBuf::from(mount_point), fs_type.to_string()))
        })
        .filter(|(mount_point, _)| absolute.starts_with(mount_point))
        .max_by_key(|(mount_point, _)| mount_point.as_os_str().len())
        .map(|(_, fs_type)| fs_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, contents: &[u8]) {
        fs::write(path, contents).expect("Failed to write file");
    }

    #[test]
    fn test_stat_and_enumerate() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        fs::create_dir(&src).expect("Failed to create src dir");
        write(&src.join("file1.txt"), b"test data 1");
        fs::create_dir(src.join("sub")).expect("Failed to create subdir");

        let backend = LocalBackend::with_trash_dir(temp_dir.path().join("Trash"));
        let children = backend.enumerate(&src).expect("Failed to enumerate");
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].kind, FileKind::File);
        assert_eq!(children[0].size, 11);
        assert_eq!(children[1].kind, FileKind::Directory);
        assert_eq!(children[1].size, 0);

        let err = backend.stat(&src.join("missing")).expect_err("stat should fail");
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[test]
    fn test_copy_file_reports_progress_and_conflicts() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("source.txt");
        let dst = temp_dir.path().join("dest.txt");
        write(&src, b"test content");

        let backend = LocalBackend::with_trash_dir(temp_dir.path().join("Trash"));
        let mut last = (0, 0);
        backend
            .copy_file(&src, &dst, TransferFlags::default(), &mut |done, total| last = (done, total))
            .expect("Failed to copy");
        assert_eq!(last, (12, 12));
        assert_eq!(fs::read_to_string(&dst).expect("Failed to read dest"), "test content");

        let err = backend
            .copy_file(&src, &dst, TransferFlags::default(), &mut |_, _| {})
            .expect_err("second copy should conflict");
        assert_eq!(err.kind, ErrorKind::Exists);

        write(&src, b"newer");
        let overwrite = TransferFlags {
            overwrite: true,
            ..TransferFlags::default()
        };
        backend
            .copy_file(&src, &dst, overwrite, &mut |_, _| {})
            .expect("Failed to overwrite");
        assert_eq!(fs::read_to_string(&dst).expect("Failed to read dest"), "newer");
    }

    #[test]
    fn test_copy_directory_needs_recursion_or_merge() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("dir");
        let dst = temp_dir.path().join("out");
        fs::create_dir(&src).expect("Failed to create src dir");

        let backend = LocalBackend::with_trash_dir(temp_dir.path().join("Trash"));
        let err = backend
            .copy_file(&src, &dst, TransferFlags::default(), &mut |_, _| {})
            .expect_err("directory copy must not succeed");
        assert_eq!(err.kind, ErrorKind::WouldRecurse);

        fs::create_dir(&dst).expect("Failed to create dst dir");
        let overwrite = TransferFlags {
            overwrite: true,
            ..TransferFlags::default()
        };
        let err = backend
            .copy_file(&src, &dst, overwrite, &mut |_, _| {})
            .expect_err("directory merge must not succeed");
        assert_eq!(err.kind, ErrorKind::WouldMerge);
    }

    #[test]
    fn test_copy_preserves_mtime() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("old.txt");
        let dst = temp_dir.path().join("copy.txt");
        write(&src, b"x");
        let old = filetime::FileTime::from_unix_time(1_000_000_000, 0);
        filetime::set_file_mtime(&src, old).expect("Failed to set mtime");

        let backend = LocalBackend::with_trash_dir(temp_dir.path().join("Trash"));
        backend
            .copy_file(&src, &dst, TransferFlags::default(), &mut |_, _| {})
            .expect("Failed to copy");
        let copied = fs::metadata(&dst).expect("Failed to stat copy");
        assert_eq!(filetime::FileTime::from_last_modification_time(&copied), old);
    }

    #[test]
    fn test_move_conflicts() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let a = temp_dir.path().join("a");
        let b = temp_dir.path().join("b");
        fs::create_dir(&a).expect("Failed to create a");
        fs::create_dir(&b).expect("Failed to create b");

        let backend = LocalBackend::with_trash_dir(temp_dir.path().join("Trash"));
        let err = backend
            .move_item(&a, &b, TransferFlags::default())
            .expect_err("move onto existing dir");
        assert_eq!(err.kind, ErrorKind::Exists);

        let overwrite = TransferFlags {
            overwrite: true,
            ..TransferFlags::default()
        };
        let err = backend.move_item(&a, &b, overwrite).expect_err("merge needed");
        assert_eq!(err.kind, ErrorKind::WouldMerge);

        let c = temp_dir.path().join("c");
        backend
            .move_item(&a, &c, TransferFlags::default())
            .expect("Failed to rename");
        assert!(c.is_dir());
        assert!(!a.exists());
    }

    #[test]
    fn test_delete_non_empty_directory_fails() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let dir = temp_dir.path().join("full");
        fs::create_dir(&dir).expect("Failed to create dir");
        write(&dir.join("f"), b"1");

        let backend = LocalBackend::with_trash_dir(temp_dir.path().join("Trash"));
        let err = backend.delete(&dir).expect_err("non-empty delete");
        assert_eq!(err.kind, ErrorKind::NotEmpty);

        backend.delete(&dir.join("f")).expect("Failed to delete file");
        backend.delete(&dir).expect("Failed to delete dir");
        assert!(!dir.exists());
    }

    #[test]
    fn test_trash_writes_info_and_avoids_collisions() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let trash = temp_dir.path().join("Trash");
        let backend = LocalBackend::with_trash_dir(&trash);

        let first = temp_dir.path().join("report.txt");
        write(&first, b"1");
        backend.trash(&first).expect("Failed to trash first");
        write(&first, b"2");
        backend.trash(&first).expect("Failed to trash second");

        assert!(!first.exists());
        assert!(trash.join("files/report.txt").exists());
        assert!(trash.join("files/report.txt.2").exists());

        let info = fs::read_to_string(trash.join("info/report.txt.trashinfo"))
            .expect("Failed to read trashinfo");
        assert!(info.starts_with("[Trash Info]\nPath="));
        assert!(info.contains("DeletionDate="));
        assert_eq!(backend.trash_dirs(), vec![trash.join("files"), trash.join("info")]);
    }

    #[test]
    fn test_create_file_refuses_existing() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("new file");
        let backend = LocalBackend::with_trash_dir(temp_dir.path().join("Trash"));

        backend.create_file(&path, b"hello").expect("Failed to create file");
        let err = backend.create_file(&path, b"again").expect_err("create twice");
        assert_eq!(err.kind, ErrorKind::Exists);

        backend.replace_contents(&path, b"replaced").expect("Failed to replace");
        assert_eq!(backend.read_file(&path).expect("Failed to read"), b"replaced");
    }

    #[cfg(unix)]
    #[test]
    fn test_query_filesystem_walks_up_to_existing_parent() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let backend = LocalBackend::with_trash_dir(temp_dir.path().join("Trash"));

        let info = backend
            .query_filesystem(&temp_dir.path().join("not/yet/there"))
            .expect("Failed to query filesystem");
        let here = backend
            .query_filesystem(temp_dir.path())
            .expect("Failed to query filesystem");
        assert!(info.id.is_some());
        assert_eq!(info.id, here.id);
        assert!(info.free_bytes.is_some());
    }

    #[test]
    fn test_encode_trash_path() {
        assert_eq!(encode_trash_path(Path::new("/a b/c%.txt")), "/a%20b/c%25.txt");
    }
}
