//! Recursive permission change.
//!
//! Every item gets `(mode & !mask) | permissions`, with separate
//! permission/mask pairs for files and directories. Symlinks are left
//! alone. Modes are only written when they actually change, and the old
//! mode of every written item is kept for undo.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::dialog::{Button, MessageKind};
use crate::error::{BackendError, Cancelled, JobError};
use crate::job::{JobCore, PermissionChange};
use crate::model::{display_name, FileInfo, FileKind};
use crate::services::UndoRecord;

enum Decision {
    Skip,
    Retry,
}

pub fn set_permissions(core: &mut JobCore, root: PathBuf, change: PermissionChange) -> Result<(), Cancelled> {
    core.progress().set_status(format!("Setting permissions of \"{}\"", display_name(&root)));
    core.progress().pulse();

    let Some(root_info) = stat(core, &root)? else {
        return Ok(());
    };
    let root_is_dir = root_info.is_dir();

    let mut previous: Vec<(PathBuf, u32)> = Vec::new();
    let mut stack = vec![root_info];
    while let Some(item) = stack.pop() {
        core.checkpoint()?;

        if let Some(old) = apply(core, &item, change)? {
            previous.push((item.path.clone(), old));
        }
        core.transfer.add_file(0);

        if item.is_dir() {
            if let Some(children) = enumerate(core, &item.path)? {
                // Reverse so children are visited in listing order.
                stack.extend(children.into_iter().rev());
            }
        }
    }

    debug!("Changed permissions of {} items under {}", previous.len(), root.display());
    if root_is_dir {
        core.add_undo(UndoRecord::RecursiveSetPermissions {
            root,
            file_permissions: change.file_permissions,
            file_mask: change.file_mask,
            dir_permissions: change.dir_permissions,
            dir_mask: change.dir_mask,
            previous,
        });
    } else if let Some((path, old_mode)) = previous.pop() {
        core.add_undo(UndoRecord::PermissionChange { path, old_mode });
    }
    Ok(())
}

/// New mode for an item currently at `mode`.
fn new_mode(kind: FileKind, mode: u32, change: PermissionChange) -> u32 {
    let (permissions, mask) = match kind {
        FileKind::Directory => (change.dir_permissions, change.dir_mask),
        _ => (change.file_permissions, change.file_mask),
    };
    (mode & !mask) | permissions
}

/// Write the new mode of `item`. Returns the old mode if it was changed.
fn apply(core: &mut JobCore, item: &FileInfo, change: PermissionChange) -> Result<Option<u32>, Cancelled> {
    if item.kind == FileKind::Symlink {
        return Ok(None);
    }
    let Some(old) = item.mode else {
        return Ok(None);
    };
    let mode = new_mode(item.kind, old, change);
    if mode == old {
        return Ok(None);
    }

    loop {
        core.ensure_not_cancelled()?;
        match core.backend().set_mode(&item.path, mode) {
            Ok(()) => return Ok(Some(old)),
            Err(err) => match error(core, &item.path, err)? {
                Decision::Retry => continue,
                Decision::Skip => return Ok(None),
            },
        }
    }
}

fn stat(core: &mut JobCore, path: &Path) -> Result<Option<FileInfo>, Cancelled> {
    loop {
        match core.backend().stat(path) {
            Ok(info) => return Ok(Some(info)),
            Err(err) => match error(core, path, err)? {
                Decision::Retry => continue,
                Decision::Skip => return Ok(None),
            },
        }
    }
}

fn enumerate(core: &mut JobCore, dir: &Path) -> Result<Option<Vec<FileInfo>>, Cancelled> {
    loop {
        match core.backend().enumerate(dir) {
            Ok(children) => return Ok(Some(children)),
            Err(err) => match error(core, dir, err)? {
                Decision::Retry => continue,
                Decision::Skip => return Ok(None),
            },
        }
    }
}

fn error(core: &mut JobCore, path: &Path, err: BackendError) -> Result<Decision, Cancelled> {
    if core.flags.skip_all_error {
        core.record_skip(JobError::Transfer {
            path: path.to_path_buf(),
            source: err,
        });
        return Ok(Decision::Skip);
    }

    let answer = core.ask(
        MessageKind::Error,
        "Error while setting permissions.",
        format!("There was an error changing the permissions of \"{}\".", display_name(path)),
        Some(err.message.clone()),
        &[Button::Cancel, Button::SkipAll, Button::Skip, Button::Retry],
    );
    match answer {
        Button::Retry => Ok(Decision::Retry),
        Button::SkipAll | Button::Skip => {
            if answer == Button::SkipAll {
                core.flags.skip_all_error = true;
            }
            core.record_skip(JobError::Transfer {
                path: path.to_path_buf(),
                source: err,
            });
            Ok(Decision::Skip)
        }
        _ => Err(Cancelled),
    }
}
