//! Delete, trash and empty-trash executors.
//!
//! Items are partitioned first: anything already inside a trash directory
//! or under a transient root is deleted permanently, the rest is trashed
//! or deleted depending on the job. Items that cannot be trashed can be
//! deleted on the spot.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::dialog::{Button, MessageKind};
use crate::error::{Cancelled, ErrorKind, JobError};
use crate::format::files;
use crate::job::JobCore;
use crate::model::{display_name, OpKind, SourceInfo};
use crate::scan::{error_title, scan_sources};
use crate::services::UndoRecord;

const REPORT_INTERVAL: Duration = Duration::from_millis(100);

/// Delete `paths` permanently, or move them to the trash when `try_trash`.
pub fn delete_files(core: &mut JobCore, paths: Vec<PathBuf>, try_trash: bool) -> Result<(), Cancelled> {
    let trash_dirs = core.backend().trash_dirs();
    let mut from_trash = Vec::new();
    let mut transient = Vec::new();
    let mut rest = Vec::new();
    for path in paths {
        if trash_dirs.iter().any(|dir| path.starts_with(dir)) {
            from_trash.push(path);
        } else if core.config().is_transient(&path) {
            transient.push(path);
        } else {
            rest.push(path);
        }
    }

    if !from_trash.is_empty() {
        confirm(core, &from_trash, Confirm::DeleteFromTrash)?;
    }

    let mut to_delete = from_trash;
    to_delete.extend(transient);
    let mut to_trash = Vec::new();
    if try_trash {
        if !rest.is_empty() && core.config().confirm_trash {
            confirm(core, &rest, Confirm::Trash)?;
        }
        to_trash = rest;
    } else {
        if !rest.is_empty() && core.config().confirm_delete {
            confirm(core, &rest, Confirm::Delete)?;
        }
        to_delete.extend(rest);
    }

    if !to_delete.is_empty() {
        delete_permanently(core, &to_delete)?;
    }
    if !to_trash.is_empty() {
        trash_files(core, &to_trash)?;
    }
    Ok(())
}

enum Confirm {
    DeleteFromTrash,
    Delete,
    Trash,
}

fn confirm(core: &mut JobCore, paths: &[PathBuf], what: Confirm) -> Result<(), Cancelled> {
    let subject = match paths {
        [single] => format!("\"{}\"", display_name(single)),
        _ => format!("the {} selected items", paths.len()),
    };
    let (primary, secondary, accept) = match what {
        Confirm::DeleteFromTrash => (
            format!("Are you sure you want to permanently delete {} from the trash?", subject),
            "If you delete an item, it will be permanently lost.",
            Button::Delete,
        ),
        Confirm::Delete => (
            format!("Are you sure you want to permanently delete {}?", subject),
            "If you delete an item, it will be permanently lost.",
            Button::Delete,
        ),
        Confirm::Trash => (
            format!("Are you sure you want to move {} to the trash?", subject),
            "Items in the trash can be restored until the trash is emptied.",
            Button::Trash,
        ),
    };
    match core.ask(MessageKind::Question, primary, secondary, None, &[Button::Cancel, accept]) {
        answer if answer == accept => Ok(()),
        _ => Err(Cancelled),
    }
}

/// Scan and permanently delete `paths`.
fn delete_permanently(core: &mut JobCore, paths: &[PathBuf]) -> Result<(), Cancelled> {
    let info = scan_sources(core, paths, OpKind::Delete)?;
    core.source_info = Some(info);
    let mut progress = DeleteProgress::new(info, paths);
    progress.report(core, true);

    for path in paths {
        core.checkpoint()?;
        let size = core.backend().stat(path).map(|item| item.size).unwrap_or(0);
        let mut skipped = false;
        delete_file(core, &mut progress, path, size, &mut skipped)?;
    }
    progress.report(core, true);
    Ok(())
}

/// Delete one item, recursing into non-empty directories.
fn delete_file(
    core: &mut JobCore,
    progress: &mut DeleteProgress,
    path: &Path,
    size: u64,
    skipped: &mut bool,
) -> Result<(), Cancelled> {
    if core.skip.should_skip_file(path) {
        *skipped = true;
        return Ok(());
    }

    core.checkpoint()?;
    core.ensure_not_cancelled()?;
    let err = match core.backend().delete(path) {
        Ok(()) => {
            debug!("Deleted {}", path.display());
            core.transfer.add_file(size);
            core.services().placement.file_removed(path);
            progress.report(core, false);
            return Ok(());
        }
        Err(err) => err,
    };

    if err.is(ErrorKind::NotEmpty) {
        return delete_dir(core, progress, path, skipped);
    }

    *skipped = true;
    let detail = err.message.clone();
    core.record_skip(JobError::Transfer {
        path: path.to_path_buf(),
        source: err,
    });
    if core.flags.skip_all_error {
        return Ok(());
    }
    let secondary = format!("There was an error deleting \"{}\".", display_name(path));
    match core.ask(
        MessageKind::Error,
        error_title(OpKind::Delete),
        secondary,
        Some(detail),
        &[Button::Cancel, Button::SkipAll, Button::Skip],
    ) {
        Button::SkipAll => {
            core.flags.skip_all_error = true;
            Ok(())
        }
        Button::Skip => Ok(()),
        _ => Err(Cancelled),
    }
}

fn delete_dir(
    core: &mut JobCore,
    progress: &mut DeleteProgress,
    dir: &Path,
    parent_skipped: &mut bool,
) -> Result<(), Cancelled> {
    let mut local_skipped = false;

    loop {
        core.checkpoint()?;
        match core.backend().enumerate(dir) {
            Ok(children) => {
                for child in children {
                    core.checkpoint()?;
                    if let Err(err) = core.backend().stat(&child.path) {
                        if err.is(ErrorKind::NotFound) {
                            continue;
                        }
                        local_skipped = true;
                        if core.flags.skip_all_error {
                            continue;
                        }
                        let secondary = format!(
                            "There was an error getting information about the files in the folder \"{}\".",
                            display_name(dir)
                        );
                        match core.ask(
                            MessageKind::Error,
                            error_title(OpKind::Delete),
                            secondary,
                            Some(err.message.clone()),
                            &[Button::Cancel, Button::SkipFiles],
                        ) {
                            Button::SkipFiles => {
                                core.record_skip(JobError::Transfer {
                                    path: child.path.clone(),
                                    source: err,
                                });
                                continue;
                            }
                            _ => return Err(Cancelled),
                        }
                    }
                    delete_file(core, progress, &child.path, child.size, &mut local_skipped)?;
                }
                break;
            }
            Err(err) => {
                local_skipped = true;
                if core.skip.should_skip_readdir_error(dir) || core.flags.skip_all_error {
                    break;
                }
                let secondary = if err.is(ErrorKind::PermissionDenied) {
                    format!(
                        "Files in the folder \"{}\" cannot be deleted because you do not have permissions to see them.",
                        display_name(dir)
                    )
                } else {
                    format!("There was an error reading the folder \"{}\".", display_name(dir))
                };
                match core.ask(
                    MessageKind::Error,
                    error_title(OpKind::Delete),
                    secondary,
                    Some(err.message.clone()),
                    &[Button::Cancel, Button::Skip, Button::Retry],
                ) {
                    Button::Retry => {
                        local_skipped = false;
                        continue;
                    }
                    Button::Skip => {
                        core.skip.skip_readdir_error(dir);
                        core.record_skip(JobError::Transfer {
                            path: dir.to_path_buf(),
                            source: err,
                        });
                        break;
                    }
                    _ => return Err(Cancelled),
                }
            }
        }
    }

    if local_skipped {
        *parent_skipped = true;
        return Ok(());
    }

    core.ensure_not_cancelled()?;
    match core.backend().delete(dir) {
        Ok(()) => {
            core.transfer.add_file(0);
            core.services().placement.file_removed(dir);
            progress.report(core, false);
            Ok(())
        }
        Err(err) => {
            *parent_skipped = true;
            let detail = err.message.clone();
            core.record_skip(JobError::Transfer {
                path: dir.to_path_buf(),
                source: err,
            });
            if core.flags.skip_all_error {
                return Ok(());
            }
            let secondary = format!("Could not remove the folder \"{}\".", display_name(dir));
            match core.ask(
                MessageKind::Error,
                error_title(OpKind::Delete),
                secondary,
                Some(detail),
                &[Button::Cancel, Button::SkipAll, Button::Skip],
            ) {
                Button::SkipAll => {
                    core.flags.skip_all_error = true;
                    Ok(())
                }
                Button::Skip => Ok(()),
                _ => Err(Cancelled),
            }
        }
    }
}

/// Move each item to the trash, offering a permanent delete on failure.
fn trash_files(core: &mut JobCore, paths: &[PathBuf]) -> Result<(), Cancelled> {
    let total = paths.len();
    core.progress().set_status(match paths {
        [single] => format!("Trashing \"{}\"", display_name(single)),
        _ => format!("Trashing {}", files(total as u64)),
    });

    for (index, path) in paths.iter().enumerate() {
        core.checkpoint()?;
        core.progress().set_details(format!("{} of {}", index, total));
        core.progress().set_fraction(index as f64 / total as f64);
        if core.skip.should_skip_file(path) {
            continue;
        }

        let mtime = core.backend().stat(path).ok().and_then(|info| info.modified);
        core.ensure_not_cancelled()?;
        let err = match core.backend().trash(path) {
            Ok(()) => {
                debug!("Trashed {}", path.display());
                core.add_undo(UndoRecord::Trash {
                    path: path.clone(),
                    mtime,
                });
                core.services().placement.file_removed(path);
                continue;
            }
            Err(err) => err,
        };

        if core.flags.delete_all {
            delete_immediately(core, path)?;
            continue;
        }
        if core.flags.skip_all_error {
            core.record_skip(JobError::Transfer {
                path: path.clone(),
                source: err,
            });
            continue;
        }

        let buttons: &[Button] = if total - index > 1 {
            &[Button::Cancel, Button::SkipAll, Button::Skip, Button::DeleteAll, Button::Delete]
        } else {
            &[Button::Cancel, Button::Skip, Button::Delete]
        };
        let answer = core.ask(
            MessageKind::Question,
            "Cannot move file to trash, do you want to delete immediately?",
            format!("The file \"{}\" cannot be moved to the trash.", display_name(path)),
            Some(err.message.clone()),
            buttons,
        );
        match answer {
            Button::Delete => delete_immediately(core, path)?,
            Button::DeleteAll => {
                core.flags.delete_all = true;
                delete_immediately(core, path)?;
            }
            Button::SkipAll => {
                core.flags.skip_all_error = true;
                core.record_skip(JobError::Transfer {
                    path: path.clone(),
                    source: err,
                });
            }
            Button::Skip => core.record_skip(JobError::Transfer {
                path: path.clone(),
                source: err,
            }),
            _ => return Err(Cancelled),
        }
    }

    core.progress().set_details(format!("{} of {}", total, total));
    core.progress().set_fraction(1.0);
    Ok(())
}

fn delete_immediately(core: &mut JobCore, path: &Path) -> Result<(), Cancelled> {
    info!("Job {}: deleting {} instead of trashing it", core.id(), path.display());
    let single = [path.to_path_buf()];
    let mut progress = DeleteProgress::new(SourceInfo::empty(OpKind::Delete), &single);
    let size = core.backend().stat(path).map(|item| item.size).unwrap_or(0);
    let mut skipped = false;
    delete_file(core, &mut progress, path, size, &mut skipped)
}

/// Permanently delete everything in every trash directory. Errors are
/// logged and skipped without asking.
pub fn empty_trash(core: &mut JobCore, confirm: bool) -> Result<(), Cancelled> {
    if confirm {
        let answer = core.ask(
            MessageKind::Question,
            "Empty all items from Trash?",
            "All items in the Trash will be permanently deleted.",
            None,
            &[Button::Cancel, Button::EmptyTrash],
        );
        if answer != Button::EmptyTrash {
            return Err(Cancelled);
        }
    }

    core.progress().set_status("Emptying Trash");
    core.progress().pulse();

    for dir in core.backend().trash_dirs() {
        core.checkpoint()?;
        let children = match core.backend().enumerate(&dir) {
            Ok(children) => children,
            Err(err) if err.is(ErrorKind::NotFound) => continue,
            Err(err) => {
                warn!("Could not read trash directory {}: {}", dir.display(), err);
                continue;
            }
        };
        for child in children {
            core.checkpoint()?;
            if remove_tree(core, &child.path)? {
                core.transfer.add_file(child.size);
            } else {
                warn!("Could not remove {} from the trash", child.path.display());
            }
        }
    }
    Ok(())
}

/// Remove `path` and everything below it without asking.
/// Returns false when something could not be removed.
pub(crate) fn remove_tree(core: &JobCore, path: &Path) -> Result<bool, Cancelled> {
    core.ensure_not_cancelled()?;
    match core.backend().delete(path) {
        Ok(()) => Ok(true),
        Err(err) if err.is(ErrorKind::NotEmpty) => {
            let children = match core.backend().enumerate(path) {
                Ok(children) => children,
                Err(err) => {
                    debug!("Could not list {}: {}", path.display(), err);
                    return Ok(false);
                }
            };
            for child in children {
                if !remove_tree(core, &child.path)? {
                    return Ok(false);
                }
            }
            core.ensure_not_cancelled()?;
            Ok(core.backend().delete(path).is_ok())
        }
        Err(err) => {
            debug!("Could not remove {}: {}", path.display(), err);
            Ok(false)
        }
    }
}

/// `3 of 10 files`.
fn delete_details(done: u64, total: u64) -> String {
    format!("{} of {}", done, files(total))
}

/// Progress text for permanent deletes, throttled like copy progress.
struct DeleteProgress {
    info: SourceInfo,
    subject: String,
    last_report: Option<Instant>,
}

impl DeleteProgress {
    fn new(info: SourceInfo, paths: &[PathBuf]) -> Self {
        let subject = match paths {
            [single] => format!("\"{}\"", display_name(single)),
            _ => files(paths.len() as u64),
        };
        DeleteProgress {
            info,
            subject,
            last_report: None,
        }
    }

    fn report(&mut self, core: &JobCore, force: bool) {
        let now = Instant::now();
        if !force {
            if let Some(last) = self.last_report {
                if now.duration_since(last) < REPORT_INTERVAL {
                    return;
                }
            }
        }
        self.last_report = Some(now);

        let done = core.transfer.num_files;
        let total = self.info.num_files.max(done);
        core.progress().set_status(format!("Deleting {}", self.subject));
        core.progress().set_details(delete_details(done, total));
        if total > 0 {
            core.progress().set_fraction(done as f64 / total as f64);
        }
    }
}
