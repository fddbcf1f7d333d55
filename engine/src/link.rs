//! Link executor: one symlink per source inside the destination folder.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::copy::verify_destination;
use crate::dialog::{Button, MessageKind};
use crate::error::{Cancelled, ErrorKind, JobError};
use crate::job::JobCore;
use crate::model::{display_name, IconPosition};
use crate::names::{make_name_valid_for_fs, next_link_name};
use crate::services::UndoRecord;

/// Create a symlink to each of `sources` in `destination`.
pub fn link_files(
    core: &mut JobCore,
    sources: Vec<PathBuf>,
    destination: PathBuf,
    positions: HashMap<PathBuf, IconPosition>,
) -> Result<(), Cancelled> {
    verify_destination(core, "creating links", &destination, None)?;

    core.progress().set_status(format!(
        "Creating links in \"{}\"",
        display_name(&destination)
    ));

    let total = sources.len();
    for (index, source) in sources.iter().enumerate() {
        core.checkpoint()?;
        link_file(core, source, &destination, positions.get(source).copied(), total - index)?;
        core.progress().set_fraction(core.transfer.num_files as f64 / total as f64);
    }
    Ok(())
}

fn link_file(
    core: &mut JobCore,
    source: &Path,
    dest_dir: &Path,
    position: Option<IconPosition>,
    files_left: usize,
) -> Result<(), Cancelled> {
    let basename = display_name(source);
    let target = absolute(source);
    let max_name_length = core
        .backend()
        .query_filesystem(dest_dir)
        .ok()
        .and_then(|fs| fs.max_name_length);

    // Links made in the source's own folder need a distinct name from the start.
    let mut count: u64 = if source.parent() == Some(dest_dir) { 1 } else { 0 };
    let mut fs_type: Option<String> = None;
    let mut handled_invalid_filename = false;

    loop {
        let name = make_name_valid_for_fs(
            &next_link_name(&basename, count, max_name_length),
            fs_type.as_deref(),
        );
        let dest = dest_dir.join(&name);

        core.ensure_not_cancelled()?;
        let err = match core.backend().make_symlink(&dest, &target) {
            Ok(()) => {
                debug!("Linked {} -> {}", dest.display(), target.display());
                let placement = Arc::clone(&core.services().placement);
                placement.file_added(&dest);
                match position {
                    Some(position) => placement.set_icon_position(&dest, position),
                    None => placement.remove_icon_position(&dest),
                }
                core.add_undo(UndoRecord::CreateLink {
                    src: source.to_path_buf(),
                    dst: dest,
                });
                core.transfer.add_file(0);
                return Ok(());
            }
            Err(err) => err,
        };

        match err.kind {
            ErrorKind::InvalidFilename if !handled_invalid_filename => {
                handled_invalid_filename = true;
                fs_type = core.backend().query_filesystem(dest_dir).ok().and_then(|fs| fs.fs_type);
                if make_name_valid_for_fs(&name, fs_type.as_deref()) != name {
                    continue;
                }
            }
            ErrorKind::Exists => {
                count += 1;
                continue;
            }
            _ => {}
        }

        let secondary = match err.kind {
            ErrorKind::NotSupported => "The target doesn't support symbolic links.".to_string(),
            _ => format!(
                "There was an error creating the symlink in \"{}\".",
                display_name(dest_dir)
            ),
        };
        let detail = err.message.clone();
        core.record_skip(JobError::Transfer {
            path: source.to_path_buf(),
            source: err,
        });
        if core.flags.skip_all_error {
            return Ok(());
        }

        let buttons: &[Button] = if files_left > 1 {
            &[Button::Cancel, Button::SkipAll, Button::Skip]
        } else {
            &[Button::Cancel, Button::Skip]
        };
        let primary = format!("Error while creating link to {}.", basename);
        return match core.ask(MessageKind::Error, primary, secondary, Some(detail), buttons) {
            Button::SkipAll => {
                core.flags.skip_all_error = true;
                Ok(())
            }
            Button::Skip => Ok(()),
            _ => Err(Cancelled),
        };
    }
}

/// Symlinks always point at an absolute path.
fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobRequest, TransferRequest};
    use crate::model::FilesystemInfo;
    use crate::testing::{Harness, MemoryBackend, Op, PlacementEvent};

    fn link(sources: &[&str], dest: &str) -> JobRequest {
        JobRequest::Link(TransferRequest::new(
            sources.iter().map(PathBuf::from).collect(),
            dest,
        ))
    }

    #[test]
    fn test_link_in_same_folder_uses_link_names() {
        let backend = MemoryBackend::new();
        backend.add_file("/docs/report.txt", b"x");
        let mut harness = Harness::new(backend);

        harness.run(link(&["/docs/report.txt"], "/docs")).expect("job finished");
        harness.run(link(&["/docs/report.txt"], "/docs")).expect("job finished");

        assert!(harness.backend.exists("/docs/Link to report.txt"));
        assert!(harness.backend.exists("/docs/Another link to report.txt"));
        assert_eq!(
            harness.backend.link_target("/docs/Link to report.txt"),
            Some(PathBuf::from("/docs/report.txt"))
        );
    }

    #[test]
    fn test_link_into_other_folder_keeps_name_until_taken() {
        let backend = MemoryBackend::new();
        backend.add_file("/docs/report.txt", b"x");
        backend.add_file("/desk/report.txt", b"y");
        let mut harness = Harness::new(backend);

        let outcome = harness.run(link(&["/docs/report.txt"], "/desk")).expect("job finished");
        assert!(!outcome.is_cancelled());
        assert!(harness.backend.exists("/desk/Link to report.txt"));
        assert_eq!(harness.backend.contents("/desk/report.txt"), Some(b"y".to_vec()));

        let transactions = harness.ledger.transactions();
        assert_eq!(
            transactions[0].records,
            vec![UndoRecord::CreateLink {
                src: PathBuf::from("/docs/report.txt"),
                dst: PathBuf::from("/desk/Link to report.txt"),
            }]
        );
        assert!(harness
            .placement
            .events()
            .contains(&PlacementEvent::Added(PathBuf::from("/desk/Link to report.txt"))));
    }

    #[test]
    fn test_invalid_link_name_is_sanitized() {
        let backend = MemoryBackend::new();
        backend.add_file("/docs/what?.txt", b"x");
        backend.add_dir("/stick");
        backend.set_filesystem(
            "/stick",
            FilesystemInfo {
                id: Some("stick".into()),
                fs_type: Some("vfat".into()),
                ..FilesystemInfo::default()
            },
        );
        backend.reject_names_containing('?');
        let mut harness = Harness::new(backend);

        harness.run(link(&["/docs/what?.txt"], "/stick")).expect("job finished");
        assert!(harness.backend.exists("/stick/what_.txt"));
        assert!(harness.presenter.messages.is_empty());
    }

    #[test]
    fn test_unsupported_symlink_offers_skip() {
        let backend = MemoryBackend::new();
        backend.add_file("/docs/a", b"x");
        backend.add_file("/docs/b", b"x");
        backend.add_dir("/dst");
        backend.fail(Op::MakeSymlink, "/dst/a", ErrorKind::NotSupported);
        let mut harness = Harness::new(backend);
        harness.presenter.push_button("Skip");

        let outcome = harness.run(link(&["/docs/a", "/docs/b"], "/dst")).expect("job finished");
        assert!(!outcome.is_cancelled());
        assert_eq!(harness.presenter.messages.len(), 1);
        assert_eq!(
            harness.presenter.messages[0].buttons,
            vec!["Cancel", "Skip All", "Skip"]
        );
        assert_eq!(harness.presenter.messages[0].secondary, "The target doesn't support symbolic links.");
        assert!(!harness.backend.exists("/dst/a"));
        assert!(harness.backend.exists("/dst/b"));
        assert_eq!(outcome.skipped.len(), 1);
    }
}
