//! Scan phase: count what a job is about to touch before it starts.
//!
//! Walks the sources depth first with an explicit stack. Directories count
//! as files of zero bytes; files and symlinks count with their size.
//! Symlinks are never followed.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::dialog::{Button, MessageKind};
use crate::error::{BackendError, Cancelled, ErrorKind, JobError};
use crate::format::{files, format_bytes};
use crate::job::JobCore;
use crate::model::{display_name, FileInfo, OpKind, SourceInfo};

/// Dialog title for errors during an operation of kind `op`.
pub(crate) fn error_title(op: OpKind) -> &'static str {
    match op {
        OpKind::Copy => "Error while copying.",
        OpKind::Move => "Error while moving.",
        OpKind::Delete => "Error while deleting.",
        OpKind::Trash => "Error while moving files to the Trash.",
    }
}

enum ScanDecision {
    Skip,
    Retry,
}

/// Count files and bytes under `roots`.
///
/// Items the user skips here are remembered in the skip registry so the
/// transfer phase passes over them silently. Cancelling aborts the job.
pub fn scan_sources(core: &mut JobCore, roots: &[PathBuf], op: OpKind) -> Result<SourceInfo, Cancelled> {
    let mut info = SourceInfo::empty(op);
    core.progress().pulse();
    report_preparing(core, &info);

    for root in roots {
        core.checkpoint()?;
        if core.skip.should_skip_file(root) {
            continue;
        }
        let Some(item) = stat_root(core, root, op)? else {
            continue;
        };
        count(&mut info, &item);
        if item.is_dir() {
            scan_dir(core, item.path, op, &mut info)?;
        }
        report_preparing(core, &info);
    }

    debug!(
        "Scan for job {} found {} files, {} bytes",
        core.id(),
        info.num_files,
        info.num_bytes
    );
    Ok(info)
}

fn count(info: &mut SourceInfo, item: &FileInfo) {
    info.num_files += 1;
    if !item.is_dir() {
        info.num_bytes += item.size;
    }
}

fn stat_root(core: &mut JobCore, path: &Path, op: OpKind) -> Result<Option<FileInfo>, Cancelled> {
    loop {
        match core.backend().stat(path) {
            Ok(item) => return Ok(Some(item)),
            Err(err) => match scan_error(core, path, &err, false, op)? {
                ScanDecision::Retry => continue,
                ScanDecision::Skip => {
                    core.skip.skip_file(path);
                    core.record_skip(JobError::Scan {
                        path: path.to_path_buf(),
                        source: err,
                    });
                    return Ok(None);
                }
            },
        }
    }
}

fn scan_dir(core: &mut JobCore, root: PathBuf, op: OpKind, info: &mut SourceInfo) -> Result<(), Cancelled> {
    let mut stack = vec![root];
    while let Some(dir) = stack.pop() {
        core.checkpoint()?;

        let children = loop {
            match core.backend().enumerate(&dir) {
                Ok(children) => break Some(children),
                Err(err) => match scan_error(core, &dir, &err, true, op)? {
                    ScanDecision::Retry => continue,
                    ScanDecision::Skip => {
                        core.skip.skip_readdir_error(&dir);
                        core.record_skip(JobError::Scan {
                            path: dir.clone(),
                            source: err,
                        });
                        break None;
                    }
                },
            }
        };

        for child in children.into_iter().flatten() {
            if core.skip.should_skip_file(&child.path) {
                continue;
            }
            count(info, &child);
            if child.is_dir() {
                stack.push(child.path);
            }
        }
        report_preparing(core, info);
    }
    Ok(())
}

fn scan_error(
    core: &mut JobCore,
    path: &Path,
    err: &BackendError,
    is_dir: bool,
    op: OpKind,
) -> Result<ScanDecision, Cancelled> {
    if core.flags.skip_all_error {
        return Ok(ScanDecision::Skip);
    }

    let name = display_name(path);
    let secondary = match (is_dir, err.kind) {
        (true, ErrorKind::PermissionDenied) => format!(
            "Files in the folder \"{}\" cannot be handled because you do not have permissions to see them.",
            name
        ),
        (true, _) => format!("There was an error getting information about the files in the folder \"{}\".", name),
        (false, ErrorKind::PermissionDenied) => format!(
            "The file \"{}\" cannot be handled because you do not have permissions to read it.",
            name
        ),
        (false, _) => format!("There was an error getting information about \"{}\".", name),
    };

    let answer = core.ask(
        MessageKind::Error,
        error_title(op),
        secondary,
        Some(err.message.clone()),
        &[Button::Cancel, Button::SkipAll, Button::Skip, Button::Retry],
    );
    match answer {
        Button::Retry => Ok(ScanDecision::Retry),
        Button::SkipAll => {
            core.flags.skip_all_error = true;
            Ok(ScanDecision::Skip)
        }
        Button::Skip => Ok(ScanDecision::Skip),
        _ => Err(Cancelled),
    }
}

fn report_preparing(core: &JobCore, info: &SourceInfo) {
    let status = match info.op {
        OpKind::Copy | OpKind::Move => format!(
            "Preparing to {} {} ({})",
            info.op,
            files(info.num_files),
            format_bytes(info.num_bytes)
        ),
        OpKind::Delete => format!("Preparing to delete {}", files(info.num_files)),
        OpKind::Trash => format!("Preparing to trash {}", files(info.num_files)),
    };
    core.progress().set_status(status);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobRequest, TransferRequest};
    use crate::testing::{Harness, MemoryBackend, Op};

    fn tree() -> MemoryBackend {
        let backend = MemoryBackend::new();
        backend.add_file("/src/a.txt", b"12345");
        backend.add_file("/src/sub/b.txt", b"123");
        backend.add_file("/src/sub/deeper/c.txt", b"1");
        backend.add_dir("/dst");
        backend
    }

    #[test]
    fn test_scan_counts_directories_as_empty_files() {
        let mut harness = Harness::new(tree());
        let outcome = harness
            .run(JobRequest::Copy(TransferRequest::new(vec!["/src".into()], "/dst")))
            .expect("job finished");

        let info = outcome.source_info.expect("scan ran");
        assert_eq!(info.num_files, 6, "3 directories and 3 files");
        assert_eq!(info.num_bytes, 9);
        assert_eq!(outcome.transfer_info.num_files, info.num_files);
        assert_eq!(outcome.transfer_info.num_bytes, info.num_bytes);
    }

    #[test]
    fn test_skipped_directory_is_not_prompted_again() {
        let backend = tree();
        backend.fail(Op::Enumerate, "/src/sub", ErrorKind::PermissionDenied);
        let mut harness = Harness::new(backend);
        harness.presenter.push_button("Skip");

        let outcome = harness
            .run(JobRequest::Copy(TransferRequest::new(vec!["/src".into()], "/dst")))
            .expect("job finished");

        assert_eq!(harness.presenter.messages.len(), 1, "only the scan prompted");
        let info = outcome.source_info.expect("scan ran");
        assert_eq!(info.num_files, 3);
        assert_eq!(info.num_bytes, 5);
        assert!(harness.backend.exists("/dst/src/a.txt"));
        assert!(!harness.backend.exists("/dst/src/sub/b.txt"));
    }

    #[test]
    fn test_retry_after_transient_error() {
        let backend = tree();
        backend.fail_once(Op::Stat, "/src", ErrorKind::Other);
        let mut harness = Harness::new(backend);
        harness.presenter.push_button("Retry");

        let outcome = harness
            .run(JobRequest::Copy(TransferRequest::new(vec!["/src".into()], "/dst")))
            .expect("job finished");
        assert!(!outcome.is_cancelled());
        assert_eq!(outcome.source_info.expect("scan ran").num_files, 6);
    }

    #[test]
    fn test_cancel_during_scan_aborts_before_transfer() {
        let backend = tree();
        backend.fail(Op::Stat, "/src", ErrorKind::PermissionDenied);
        let mut harness = Harness::new(backend);
        harness.presenter.push_button("Cancel");

        let outcome = harness
            .run(JobRequest::Copy(TransferRequest::new(vec!["/src".into()], "/dst")))
            .expect("job finished");
        assert!(outcome.is_cancelled());
        assert_eq!(harness.backend.mutation_count(), 0);
    }
}
