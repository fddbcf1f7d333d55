//! Copy, move and duplicate executors.
//!
//! Copy and duplicate run scan -> verify destination -> transfer. Move
//! first tries an atomic rename of every top-level item; the items that
//! cannot be renamed (other filesystem, directory over file, merges) are
//! collected as fallbacks, scanned and then copied and deleted.
//!
//! Every backend error is resolved through a dialog unless a sticky
//! "apply to all" answer already covers it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::delete::remove_tree;
use crate::dialog::{Button, ConflictRequest, ConflictResolution, MessageKind};
use crate::error::{BackendError, Cancelled, ErrorKind, JobError};
use crate::format::{files, format_bytes, format_duration};
use crate::job::JobCore;
use crate::model::{display_name, FileInfo, FileKind, IconPosition, OpKind, SourceInfo, TransferFlags};
use crate::names::{is_plain_name, make_name_valid_for_fs, next_duplicate_name};
use crate::scan::{error_title, scan_sources};
use crate::services::UndoRecord;

const REPORT_INTERVAL: Duration = Duration::from_millis(100);
const SHOW_RATE_AFTER: Duration = Duration::from_secs(10);

/// Per-job transfer settings and lazily queried destination facts.
struct Transfer<'a> {
    op: OpKind,
    duplicate: bool,
    positions: &'a HashMap<PathBuf, IconPosition>,
    destination: Option<PathBuf>,
    first_source: String,
    source_count: usize,
    source_info: SourceInfo,
    /// Destination filesystem type, known once an invalid name was hit
    dest_fs_type: Option<String>,
    max_name_length: Option<usize>,
}

impl Transfer<'_> {
    fn is_move(&self) -> bool {
        self.op == OpKind::Move
    }

    fn files_left(&self, core: &JobCore) -> u64 {
        self.source_info.num_files.saturating_sub(core.transfer.num_files)
    }
}

/// Copy `sources` into `destination`, or next to themselves under
/// duplicate names when `destination` is `None`.
pub fn copy_files(
    core: &mut JobCore,
    sources: Vec<PathBuf>,
    destination: Option<PathBuf>,
    positions: HashMap<PathBuf, IconPosition>,
) -> Result<(), Cancelled> {
    let info = scan_sources(core, &sources, OpKind::Copy)?;
    core.source_info = Some(info);

    let mut transfer = Transfer {
        op: OpKind::Copy,
        duplicate: destination.is_none(),
        positions: &positions,
        destination: destination.clone(),
        first_source: sources.first().map(|s| display_name(s)).unwrap_or_default(),
        source_count: sources.len(),
        source_info: info,
        dest_fs_type: None,
        max_name_length: None,
    };

    let verify_dir = match &destination {
        Some(dest) => Some(dest.clone()),
        None => sources.first().and_then(|s| s.parent()).map(Path::to_path_buf),
    };
    if let Some(dir) = &verify_dir {
        verify_destination(core, "copying", dir, Some(info.num_bytes))?;
    }

    report_copy_progress(core, &transfer, 0, true);

    for source in &sources {
        core.checkpoint()?;
        if core.skip.should_skip_file(source) {
            continue;
        }

        let dest_dir = match &destination {
            Some(dest) => dest.clone(),
            None => match source.parent() {
                Some(parent) => parent.to_path_buf(),
                None => continue,
            },
        };

        let dest_fs = core.backend().query_filesystem(&dest_dir).ok();
        let source_fs = source
            .parent()
            .and_then(|parent| core.backend().query_filesystem(parent).ok());
        let same_fs = match (&dest_fs, &source_fs) {
            (Some(d), Some(s)) => d.id.is_some() && d.id == s.id,
            _ => false,
        };
        transfer.max_name_length = dest_fs.and_then(|fs| fs.max_name_length);

        let mut unique_name_nr = 1;
        let mut skipped = false;
        copy_move_file(
            core,
            &mut transfer,
            source,
            &dest_dir,
            same_fs,
            &mut unique_name_nr,
            false,
            true,
            &mut skipped,
        )?;
    }

    report_copy_progress(core, &transfer, 0, true);
    Ok(())
}

struct Fallback {
    path: PathBuf,
    overwrite: bool,
}

/// Move `sources` into `destination`.
pub fn move_files(
    core: &mut JobCore,
    sources: Vec<PathBuf>,
    destination: PathBuf,
    positions: HashMap<PathBuf, IconPosition>,
) -> Result<(), Cancelled> {
    let mut transfer = Transfer {
        op: OpKind::Move,
        duplicate: false,
        positions: &positions,
        destination: Some(destination.clone()),
        first_source: sources.first().map(|s| display_name(s)).unwrap_or_default(),
        source_count: sources.len(),
        source_info: SourceInfo::empty(OpKind::Move),
        dest_fs_type: None,
        max_name_length: None,
    };

    verify_destination(core, "moving", &destination, None)?;

    core.progress().pulse();
    core.progress().set_status(format!(
        "Preparing to move to \"{}\"",
        display_name(&destination)
    ));

    let mut fallbacks = Vec::new();
    let total = sources.len();
    for (index, source) in sources.iter().enumerate() {
        core.checkpoint()?;
        move_file_prepare(core, &mut transfer, source, &destination, &mut fallbacks, total - index)?;
    }

    if fallbacks.is_empty() {
        return Ok(());
    }

    debug!("Job {}: {} items need copy and delete", core.id(), fallbacks.len());
    let fallback_paths: Vec<PathBuf> = fallbacks.iter().map(|f| f.path.clone()).collect();
    let info = scan_sources(core, &fallback_paths, OpKind::Move)?;
    core.source_info = Some(info);
    transfer.source_info = info;
    verify_destination(core, "moving", &destination, Some(info.num_bytes))?;
    transfer.max_name_length = core
        .backend()
        .query_filesystem(&destination)
        .ok()
        .and_then(|fs| fs.max_name_length);

    report_copy_progress(core, &transfer, 0, true);

    for fallback in &fallbacks {
        core.checkpoint()?;
        let mut unique_name_nr = 1;
        let mut skipped = false;
        copy_move_file(
            core,
            &mut transfer,
            &fallback.path,
            &destination,
            false,
            &mut unique_name_nr,
            fallback.overwrite,
            true,
            &mut skipped,
        )?;
    }

    report_copy_progress(core, &transfer, 0, true);
    Ok(())
}

/// Check the destination exists, is a writable directory and has room
/// for `required` bytes. `verb` names the operation in dialog titles.
pub(crate) fn verify_destination(
    core: &mut JobCore,
    verb: &str,
    dest: &Path,
    required: Option<u64>,
) -> Result<(), Cancelled> {
    let primary = format!("Error while {} to \"{}\".", verb, display_name(dest));

    loop {
        let secondary = match core.backend().stat(dest) {
            Ok(info) if info.is_dir() => None,
            Ok(_) => Some(("The destination is not a folder.".to_string(), None)),
            Err(err) => {
                let text = match err.kind {
                    ErrorKind::NotFound => "The destination folder does not exist.",
                    ErrorKind::PermissionDenied => "You do not have permissions to access the destination folder.",
                    _ => "There was an error getting information about the destination.",
                };
                Some((text.to_string(), Some(err.message)))
            }
        };
        if let Some((secondary, detail)) = secondary {
            match core.ask(MessageKind::Error, &primary, secondary, detail, &[Button::Cancel, Button::Retry]) {
                Button::Retry => continue,
                _ => return Err(Cancelled),
            }
        }

        let fs = match core.backend().query_filesystem(dest) {
            Ok(fs) => fs,
            Err(err) => {
                debug!("No filesystem info for {}: {}", dest.display(), err);
                return Ok(());
            }
        };

        if let (Some(free), Some(required)) = (fs.free_bytes, required) {
            if free < required {
                let answer = core.ask(
                    MessageKind::Error,
                    &primary,
                    "There is not enough space on the destination. Try to remove files to make space.",
                    Some(format!(
                        "{} available, but {} required.",
                        format_bytes(free),
                        format_bytes(required)
                    )),
                    &[Button::Cancel, Button::CopyAnyway, Button::Retry],
                );
                match answer {
                    Button::Retry => continue,
                    Button::CopyAnyway => {
                        warn!("Job {}: continuing without enough free space", core.id());
                        core.record_skip(JobError::Capacity {
                            required,
                            available: free,
                        });
                    }
                    _ => return Err(Cancelled),
                }
            }
        }

        if fs.read_only {
            core.ask(
                MessageKind::Error,
                &primary,
                "The destination is read-only.",
                None,
                &[Button::Cancel],
            );
            return Err(Cancelled);
        }
        return Ok(());
    }
}

/// Name for `src` inside `dest_dir`, sanitized when the filesystem type is known.
fn target_name(transfer: &Transfer, src: &Path, same_fs: bool, unique_name_nr: u64) -> String {
    let basename = display_name(src);
    let name = if transfer.duplicate {
        next_duplicate_name(&basename, unique_name_nr, transfer.max_name_length)
    } else {
        basename
    };
    if same_fs {
        name
    } else {
        make_name_valid_for_fs(&name, transfer.dest_fs_type.as_deref())
    }
}

/// Query the destination filesystem type once and re-sanitize `name`.
/// Returns the new target when sanitizing changed it.
fn resanitize(core: &JobCore, transfer: &mut Transfer, dest_dir: &Path, dest: &Path) -> Option<PathBuf> {
    if transfer.dest_fs_type.is_none() {
        transfer.dest_fs_type = core.backend().query_filesystem(dest_dir).ok().and_then(|fs| fs.fs_type);
    }
    let current = display_name(dest);
    let valid = make_name_valid_for_fs(&current, transfer.dest_fs_type.as_deref());
    if valid != current {
        Some(dest_dir.join(valid))
    } else {
        None
    }
}

fn stat_or_placeholder(core: &JobCore, path: &Path) -> FileInfo {
    core.backend().stat(path).unwrap_or_else(|_| FileInfo {
        path: path.to_path_buf(),
        kind: FileKind::File,
        size: 0,
        mode: None,
        modified: None,
    })
}

/// `dest` is `src` itself or one of its ancestors.
fn is_same_or_ancestor(dest: &Path, src: &Path) -> bool {
    src.starts_with(dest)
}

/// Refuse to copy a folder into itself or a file over itself.
/// Returns false when the item must be skipped.
fn check_self_containment(
    core: &mut JobCore,
    transfer: &Transfer,
    src: &FileInfo,
    dest_dir: &Path,
    dest: &Path,
    skipped: &mut bool,
) -> Result<bool, Cancelled> {
    let verb = if transfer.is_move() { "move" } else { "copy" };
    let (primary, secondary) = if src.is_dir() && dest_dir.starts_with(&src.path) {
        (
            format!("You cannot {} a folder into itself.", verb),
            "The destination folder is inside the source folder.",
        )
    } else if is_same_or_ancestor(dest, &src.path) {
        (
            format!("You cannot {} a file over itself.", verb),
            "The source file would be overwritten by the destination.",
        )
    } else {
        return Ok(true);
    };

    core.record_skip(JobError::Conflict {
        path: src.path.clone(),
        reason: primary.clone(),
    });
    *skipped = true;
    if core.flags.skip_all_error {
        return Ok(false);
    }
    let buttons = error_buttons(transfer.files_left(core));
    match core.ask(MessageKind::Error, primary, secondary, None, &buttons) {
        Button::SkipAll => {
            core.flags.skip_all_error = true;
            Ok(false)
        }
        Button::Skip => Ok(false),
        _ => Err(Cancelled),
    }
}

/// {Cancel, Skip All, Skip}, without Skip All when only one item is left.
fn error_buttons(files_left: u64) -> Vec<Button> {
    if files_left > 1 {
        vec![Button::Cancel, Button::SkipAll, Button::Skip]
    } else {
        vec![Button::Cancel, Button::Skip]
    }
}

/// Ask about a failed item. `Ok(())` means skip it, honoring Skip All.
fn skip_after_error(
    core: &mut JobCore,
    transfer: &Transfer,
    path: &Path,
    secondary: String,
    err: BackendError,
    skipped: &mut bool,
) -> Result<(), Cancelled> {
    *skipped = true;
    let detail = err.message.clone();
    core.record_skip(JobError::Transfer {
        path: path.to_path_buf(),
        source: err,
    });
    if core.flags.skip_all_error {
        return Ok(());
    }
    let buttons = error_buttons(transfer.files_left(core));
    match core.ask(MessageKind::Error, error_title(transfer.op), secondary, Some(detail), &buttons) {
        Button::SkipAll => {
            core.flags.skip_all_error = true;
            Ok(())
        }
        Button::Skip => Ok(()),
        _ => Err(Cancelled),
    }
}

/// Placement, icon position and undo bookkeeping for a finished item.
fn record_done(core: &mut JobCore, transfer: &Transfer, src: &Path, dest: &Path, top_level: bool) {
    let placement = Arc::clone(&core.services().placement);
    if transfer.is_move() {
        placement.file_moved(src, dest);
    } else {
        placement.file_added(dest);
    }

    if top_level {
        match transfer.positions.get(src) {
            Some(position) => placement.set_icon_position(dest, *position),
            None => placement.remove_icon_position(dest),
        }
        let record = if transfer.is_move() {
            UndoRecord::Move {
                src: src.to_path_buf(),
                dst: dest.to_path_buf(),
            }
        } else {
            UndoRecord::Copy {
                src: src.to_path_buf(),
                dst: dest.to_path_buf(),
            }
        };
        core.add_undo(record);
    }
}

#[allow(clippy::too_many_arguments)]
fn copy_move_file(
    core: &mut JobCore,
    transfer: &mut Transfer,
    src: &Path,
    dest_dir: &Path,
    same_fs: bool,
    unique_name_nr: &mut u64,
    mut overwrite: bool,
    top_level: bool,
    skipped: &mut bool,
) -> Result<(), Cancelled> {
    if core.skip.should_skip_file(src) {
        *skipped = true;
        return Ok(());
    }

    let source = match core.backend().stat(src) {
        Ok(info) => info,
        Err(err) => {
            let secondary = format!("There was an error getting information about \"{}\".", display_name(src));
            return skip_after_error(core, transfer, src, secondary, err, skipped);
        }
    };

    let mut dest = dest_dir.join(target_name(transfer, src, same_fs, *unique_name_nr));
    if !check_self_containment(core, transfer, &source, dest_dir, &dest, skipped)? {
        return Ok(());
    }

    let mut handled_invalid_filename = false;
    loop {
        core.ensure_not_cancelled()?;
        let flags = TransferFlags {
            overwrite,
            ..TransferFlags::default()
        };

        let backend = Arc::clone(&core.services().backend);
        let result = if transfer.is_move() {
            backend.move_item(src, &dest, flags)
        } else {
            backend.copy_file(src, &dest, flags, &mut |done, _total| {
                report_copy_progress(core, transfer, done, false);
            })
        };

        let err = match result {
            Ok(()) => {
                debug!("{} -> {}", src.display(), dest.display());
                core.transfer.add_file(source.size);
                record_done(core, transfer, src, &dest, top_level);
                report_copy_progress(core, transfer, 0, false);
                return Ok(());
            }
            Err(err) => err,
        };

        if err.is(ErrorKind::InvalidFilename) && !handled_invalid_filename {
            handled_invalid_filename = true;
            if let Some(valid) = resanitize(core, transfer, dest_dir, &dest) {
                dest = valid;
                continue;
            }
        }

        match err.kind {
            ErrorKind::Exists if !overwrite => {
                if transfer.duplicate {
                    *unique_name_nr += 1;
                    dest = dest_dir.join(target_name(transfer, src, same_fs, *unique_name_nr));
                    continue;
                }

                let destination = stat_or_placeholder(core, &dest);
                let is_merge = source.is_dir() && destination.is_dir();
                if core.flags.overwrite_for(is_merge) {
                    overwrite = true;
                    continue;
                }
                if core.flags.skip_all_conflict {
                    *skipped = true;
                    core.record_skip(conflict_error(&dest));
                    return Ok(());
                }

                let resolution = core.ask_conflict(ConflictRequest {
                    source: source.clone(),
                    destination,
                    dest_dir: dest_dir.to_path_buf(),
                    is_merge,
                });
                match resolution {
                    ConflictResolution::Replace | ConflictResolution::Merge => overwrite = true,
                    ConflictResolution::ReplaceAll => {
                        core.flags.replace_all = true;
                        overwrite = true;
                    }
                    ConflictResolution::MergeAll => {
                        core.flags.merge_all = true;
                        overwrite = true;
                    }
                    ConflictResolution::Rename(name) if is_plain_name(&name) => dest = dest_dir.join(name),
                    ConflictResolution::Rename(name) => {
                        warn!("Ignoring rename to {:?}: not a plain file name", name);
                    }
                    ConflictResolution::SkipAll => {
                        core.flags.skip_all_conflict = true;
                        *skipped = true;
                        core.record_skip(conflict_error(&dest));
                        return Ok(());
                    }
                    ConflictResolution::Skip | ConflictResolution::Delete | ConflictResolution::DeleteAll => {
                        *skipped = true;
                        core.record_skip(conflict_error(&dest));
                        return Ok(());
                    }
                    ConflictResolution::Cancel => return Err(Cancelled),
                }
            }

            ErrorKind::IsDirectory if overwrite => {
                if remove_tree(core, &dest)? {
                    continue;
                }
                let secondary = format!(
                    "Could not remove the already existing file with the same name in \"{}\".",
                    display_name(dest_dir)
                );
                return skip_after_error(core, transfer, &dest, secondary, err, skipped);
            }

            ErrorKind::WouldRecurse | ErrorKind::WouldMerge => {
                let is_merge = err.is(ErrorKind::WouldMerge);
                if overwrite && !is_merge {
                    core.ensure_not_cancelled()?;
                    if let Err(delete_err) = core.backend().delete(&dest) {
                        if !delete_err.is(ErrorKind::NotFound) {
                            let secondary = format!(
                                "Could not remove the already existing file with the same name in \"{}\".",
                                display_name(dest_dir)
                            );
                            return skip_after_error(core, transfer, &dest, secondary, delete_err, skipped);
                        }
                    }
                }

                let same_fs = same_fs && !is_merge;
                let created = copy_move_directory(core, transfer, &source, &mut dest, same_fs, !is_merge, skipped)?;
                if created {
                    if top_level {
                        record_done(core, transfer, src, &dest, true);
                    } else if !transfer.is_move() {
                        core.services().placement.file_added(&dest);
                    }
                }
                return Ok(());
            }

            _ => {
                let secondary = format!(
                    "There was an error {} the file into \"{}\".",
                    if transfer.is_move() { "moving" } else { "copying" },
                    display_name(dest_dir)
                );
                return skip_after_error(core, transfer, src, secondary, err, skipped);
            }
        }
    }
}

fn conflict_error(dest: &Path) -> JobError {
    JobError::Conflict {
        path: dest.to_path_buf(),
        reason: "target already exists".to_string(),
    }
}

/// Create the destination directory, re-sanitizing the name once.
/// Returns false when the user chose to skip the directory.
fn create_dest_dir(
    core: &mut JobCore,
    transfer: &mut Transfer,
    src: &Path,
    dest: &mut PathBuf,
    skipped: &mut bool,
) -> Result<bool, Cancelled> {
    let mut handled_invalid_filename = false;
    loop {
        core.ensure_not_cancelled()?;
        let err = match core.backend().make_dir(dest) {
            Ok(()) => return Ok(true),
            Err(err) => err,
        };

        if err.is(ErrorKind::InvalidFilename) && !handled_invalid_filename {
            handled_invalid_filename = true;
            if let Some(parent) = dest.parent().map(Path::to_path_buf) {
                if let Some(valid) = resanitize(core, transfer, &parent, dest) {
                    *dest = valid;
                    continue;
                }
            }
        }

        *skipped = true;
        if core.flags.skip_all_error {
            core.record_skip(JobError::Transfer {
                path: src.to_path_buf(),
                source: err,
            });
            return Ok(false);
        }

        let secondary = if err.is(ErrorKind::PermissionDenied) {
            format!(
                "The folder \"{}\" cannot be handled because you do not have permissions to create it in the destination.",
                display_name(src)
            )
        } else {
            format!("There was an error creating the folder \"{}\".", display_name(src))
        };
        let answer = core.ask(
            MessageKind::Error,
            error_title(transfer.op),
            secondary,
            Some(err.message.clone()),
            &[Button::Cancel, Button::Skip, Button::Retry],
        );
        match answer {
            Button::Retry => {
                *skipped = false;
                continue;
            }
            Button::Skip => {
                core.record_skip(JobError::Transfer {
                    path: src.to_path_buf(),
                    source: err,
                });
                return Ok(false);
            }
            _ => return Err(Cancelled),
        }
    }
}

/// Transfer a directory child by child. Returns false when the
/// destination directory could not be created.
fn copy_move_directory(
    core: &mut JobCore,
    transfer: &mut Transfer,
    source: &FileInfo,
    dest: &mut PathBuf,
    same_fs: bool,
    create_dest: bool,
    parent_skipped: &mut bool,
) -> Result<bool, Cancelled> {
    if create_dest && !create_dest_dir(core, transfer, &source.path, dest, parent_skipped)? {
        return Ok(false);
    }

    core.transfer.add_file(0);
    report_copy_progress(core, transfer, 0, false);

    let mut local_skipped = false;
    core.checkpoint()?;
    loop {
        match core.backend().enumerate(&source.path) {
            Ok(children) => {
                for child in children {
                    core.checkpoint()?;
                    let mut unique_name_nr = 1;
                    copy_move_file(
                        core,
                        transfer,
                        &child.path,
                        dest,
                        same_fs,
                        &mut unique_name_nr,
                        false,
                        false,
                        &mut local_skipped,
                    )?;
                }
                break;
            }
            Err(err) => {
                local_skipped = true;
                if core.skip.should_skip_readdir_error(&source.path) || core.flags.skip_all_error {
                    break;
                }
                let secondary = if err.is(ErrorKind::PermissionDenied) {
                    format!(
                        "Files in the folder \"{}\" cannot be handled because you do not have permissions to see them.",
                        source.name()
                    )
                } else {
                    format!(
                        "There was an error getting information about the files in the folder \"{}\".",
                        source.name()
                    )
                };
                let answer = core.ask(
                    MessageKind::Error,
                    error_title(transfer.op),
                    secondary,
                    Some(err.message.clone()),
                    &[Button::Cancel, Button::SkipFiles, Button::Retry],
                );
                match answer {
                    Button::Retry => {
                        local_skipped = false;
                        continue;
                    }
                    Button::SkipFiles => {
                        core.skip.skip_readdir_error(&source.path);
                        core.record_skip(JobError::Transfer {
                            path: source.path.clone(),
                            source: err,
                        });
                        break;
                    }
                    _ => return Err(Cancelled),
                }
            }
        }
    }

    if create_dest {
        core.ensure_not_cancelled()?;
        if let Err(err) = core.backend().copy_attributes(&source.path, dest) {
            debug!("Could not copy attributes to {}: {}", dest.display(), err);
        }
    }

    if transfer.is_move() && !local_skipped {
        core.ensure_not_cancelled()?;
        match core.backend().delete(&source.path) {
            Ok(()) => core.services().placement.file_removed(&source.path),
            Err(err) => {
                let secondary = format!("Could not remove the source folder \"{}\".", source.name());
                let mut ignored = false;
                skip_after_error(core, transfer, &source.path, secondary, err, &mut ignored)?;
                local_skipped = true;
            }
        }
    }

    if local_skipped {
        *parent_skipped = true;
    }
    Ok(true)
}

/// Phase one of a move: try an atomic rename, collect what needs copying.
fn move_file_prepare(
    core: &mut JobCore,
    transfer: &mut Transfer,
    src: &Path,
    dest_dir: &Path,
    fallbacks: &mut Vec<Fallback>,
    files_left: usize,
) -> Result<(), Cancelled> {
    if core.skip.should_skip_file(src) {
        return Ok(());
    }
    let mut skipped = false;

    let source = match core.backend().stat(src) {
        Ok(info) => info,
        Err(err) => {
            let secondary = format!("There was an error getting information about \"{}\".", display_name(src));
            return prepare_error(core, transfer, src, secondary, err, files_left);
        }
    };

    let mut dest = dest_dir.join(target_name(transfer, src, true, 1));
    // Nothing is scanned yet; dialogs count the top-level items still to go.
    transfer.source_info.num_files = files_left as u64;
    if !check_self_containment(core, transfer, &source, dest_dir, &dest, &mut skipped)? {
        return Ok(());
    }

    let mut overwrite = false;
    let mut handled_invalid_filename = false;
    loop {
        core.ensure_not_cancelled()?;
        let flags = TransferFlags {
            overwrite,
            no_fallback_for_move: true,
            ..TransferFlags::default()
        };

        let err = match core.backend().move_item(src, &dest, flags) {
            Ok(()) => {
                debug!("Renamed {} -> {}", src.display(), dest.display());
                core.transfer.add_file(if source.is_dir() { 0 } else { source.size });
                record_done(core, transfer, src, &dest, true);
                return Ok(());
            }
            Err(err) => err,
        };

        if err.is(ErrorKind::InvalidFilename) && !handled_invalid_filename {
            handled_invalid_filename = true;
            if let Some(valid) = resanitize(core, transfer, dest_dir, &dest) {
                dest = valid;
                continue;
            }
        }

        match err.kind {
            ErrorKind::Exists if !overwrite => {
                let destination = stat_or_placeholder(core, &dest);
                let is_merge = source.is_dir() && destination.is_dir();
                if core.flags.overwrite_for(is_merge) {
                    overwrite = true;
                    continue;
                }
                if core.flags.skip_all_conflict {
                    core.record_skip(conflict_error(&dest));
                    return Ok(());
                }
                let resolution = core.ask_conflict(ConflictRequest {
                    source: source.clone(),
                    destination,
                    dest_dir: dest_dir.to_path_buf(),
                    is_merge,
                });
                match resolution {
                    ConflictResolution::Replace | ConflictResolution::Merge => overwrite = true,
                    ConflictResolution::ReplaceAll => {
                        core.flags.replace_all = true;
                        overwrite = true;
                    }
                    ConflictResolution::MergeAll => {
                        core.flags.merge_all = true;
                        overwrite = true;
                    }
                    ConflictResolution::Rename(name) if is_plain_name(&name) => dest = dest_dir.join(name),
                    ConflictResolution::Rename(name) => {
                        warn!("Ignoring rename to {:?}: not a plain file name", name);
                    }
                    ConflictResolution::SkipAll => {
                        core.flags.skip_all_conflict = true;
                        core.record_skip(conflict_error(&dest));
                        return Ok(());
                    }
                    ConflictResolution::Skip | ConflictResolution::Delete | ConflictResolution::DeleteAll => {
                        core.record_skip(conflict_error(&dest));
                        return Ok(());
                    }
                    ConflictResolution::Cancel => return Err(Cancelled),
                }
            }

            ErrorKind::NotSupported | ErrorKind::WouldRecurse | ErrorKind::IsDirectory => {
                fallbacks.push(Fallback {
                    path: src.to_path_buf(),
                    overwrite,
                });
                return Ok(());
            }

            ErrorKind::WouldMerge => {
                fallbacks.push(Fallback {
                    path: src.to_path_buf(),
                    overwrite: true,
                });
                return Ok(());
            }

            _ => {
                let secondary = format!("There was an error moving the file into \"{}\".", display_name(dest_dir));
                return prepare_error(core, transfer, src, secondary, err, files_left);
            }
        }
    }
}

fn prepare_error(
    core: &mut JobCore,
    transfer: &mut Transfer,
    src: &Path,
    secondary: String,
    err: BackendError,
    files_left: usize,
) -> Result<(), Cancelled> {
    transfer.source_info.num_files = files_left as u64;
    let mut skipped = false;
    skip_after_error(core, transfer, src, secondary, err, &mut skipped)
}

/// Push status, details and fraction to the progress model.
///
/// Throttled to one update per `REPORT_INTERVAL` unless `force`d. The
/// status only changes when the number of files left changes.
fn report_copy_progress(core: &mut JobCore, transfer: &Transfer, in_flight: u64, force: bool) {
    let now = Instant::now();
    if !force {
        if let Some(last) = core.transfer.last_report_time {
            if now.duration_since(last) < REPORT_INTERVAL {
                return;
            }
        }
    }
    core.transfer.last_report_time = Some(now);

    let info = transfer.source_info;
    let files_left = info.num_files.saturating_sub(core.transfer.num_files);
    if core.transfer.last_reported_files_left != Some(files_left) {
        core.transfer.last_reported_files_left = Some(files_left);
        core.progress().set_status(copy_status(transfer));
    }

    let done = core.transfer.num_bytes + in_flight;
    let total = info.num_bytes.max(done);
    let elapsed = core.elapsed();
    let details = if elapsed < SHOW_RATE_AFTER || done == 0 {
        format!("{} of {}", format_bytes(done), format_bytes(total))
    } else {
        let rate = done as f64 / elapsed.as_secs_f64();
        let remaining = Duration::from_secs_f64((total - done) as f64 / rate);
        format!(
            "{} of {} - {} left ({}/sec)",
            format_bytes(done),
            format_bytes(total),
            format_duration(remaining),
            format_bytes(rate as u64)
        )
    };
    core.progress().set_details(details);

    let fraction = if total > 0 {
        done as f64 / total as f64
    } else if info.num_files > 0 {
        core.transfer.num_files as f64 / info.num_files as f64
    } else {
        1.0
    };
    core.progress().set_fraction(fraction);
}

fn copy_status(transfer: &Transfer) -> String {
    let verb = match (transfer.op, transfer.duplicate) {
        (OpKind::Move, _) => "Moving",
        (_, true) => "Duplicating",
        _ => "Copying",
    };
    let subject = if transfer.source_count == 1 {
        format!("\"{}\"", transfer.first_source)
    } else {
        files(transfer.source_count as u64)
    };
    match &transfer.destination {
        Some(dest) if !transfer.duplicate => format!("{} {} to \"{}\"", verb, subject, display_name(dest)),
        _ => format!("{} {}", verb, subject),
    }
}
