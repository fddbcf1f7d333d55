//! Create executor: a new folder, an empty file, a file with given
//! contents or a copy of a template.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::dialog::{Button, MessageKind};
use crate::error::{BackendResult, Cancelled, ErrorKind, JobError};
use crate::job::{CreateKind, CreateRequest, JobCore};
use crate::model::{display_name, IconPosition, TransferFlags};
use crate::names::{make_name_valid_for_fs, next_duplicate_name, next_folder_name};
use crate::services::UndoRecord;

const DEFAULT_FOLDER_NAME: &str = "Untitled Folder";
const DEFAULT_FILE_NAME: &str = "new file";

pub fn create_item(core: &mut JobCore, request: CreateRequest) -> Result<(), Cancelled> {
    let CreateRequest {
        parent,
        name,
        kind,
        position,
    } = request;

    let fs = core.backend().query_filesystem(&parent).ok();
    let max_name_length = fs.as_ref().and_then(|fs| fs.max_name_length);
    let mut fs_type = fs.and_then(|fs| fs.fs_type);

    let base = name.unwrap_or_else(|| match &kind {
        CreateKind::Folder => DEFAULT_FOLDER_NAME.to_string(),
        CreateKind::File { .. } => DEFAULT_FILE_NAME.to_string(),
        CreateKind::FromTemplate(template) => display_name(template),
    });
    let mut base = make_name_valid_for_fs(&base, fs_type.as_deref());
    let mut handled_invalid_filename = false;
    let mut attempt: u64 = 0;

    core.progress().set_status(match kind {
        CreateKind::Folder => "Creating folder",
        _ => "Creating file",
    });

    loop {
        let name = match (&kind, attempt) {
            (_, 0) => base.clone(),
            (CreateKind::Folder, n) => next_folder_name(&base, n + 1, max_name_length),
            (_, n) => next_duplicate_name(&base, n, max_name_length),
        };
        let dest = parent.join(&name);

        core.ensure_not_cancelled()?;
        let err = match make(core, &kind, &dest) {
            Ok(bytes) => {
                finish(core, &kind, &dest, bytes, position);
                return Ok(());
            }
            Err(err) => err,
        };

        match err.kind {
            ErrorKind::InvalidFilename if !handled_invalid_filename => {
                handled_invalid_filename = true;
                if fs_type.is_none() {
                    fs_type = core.backend().query_filesystem(&parent).ok().and_then(|fs| fs.fs_type);
                }
                let valid = make_name_valid_for_fs(&base, fs_type.as_deref());
                if valid != base {
                    base = valid;
                    continue;
                }
            }
            ErrorKind::Exists => {
                attempt += 1;
                continue;
            }
            _ => {}
        }

        let (primary, secondary) = match kind {
            CreateKind::Folder => (
                format!("Error while creating directory {}.", name),
                format!(
                    "There was an error creating the directory in \"{}\".",
                    display_name(&parent)
                ),
            ),
            _ => (
                format!("Error while creating file {}.", name),
                format!(
                    "There was an error creating the file in \"{}\".",
                    display_name(&parent)
                ),
            ),
        };
        let detail = err.message.clone();
        core.record_skip(JobError::Transfer { path: dest, source: err });
        return match core.ask(
            MessageKind::Error,
            primary,
            secondary,
            Some(detail),
            &[Button::Cancel, Button::Skip],
        ) {
            Button::Skip => Ok(()),
            _ => Err(Cancelled),
        };
    }
}

/// Create `dest`, returning the number of bytes written.
fn make(core: &JobCore, kind: &CreateKind, dest: &Path) -> BackendResult<u64> {
    match kind {
        CreateKind::Folder => core.backend().make_dir(dest).map(|()| 0),
        CreateKind::File { contents } => {
            let data = contents.as_deref().unwrap_or_default();
            core.backend().create_file(dest, data).map(|()| data.len() as u64)
        }
        CreateKind::FromTemplate(template) => {
            let flags = TransferFlags {
                target_default_perms: true,
                ..TransferFlags::default()
            };
            let mut total = 0;
            let result = core.backend().copy_file(template, dest, flags, &mut |_, size| total = size);
            result.map(|()| total)
        }
    }
}

fn finish(
    core: &mut JobCore,
    kind: &CreateKind,
    dest: &Path,
    bytes: u64,
    position: Option<IconPosition>,
) {
    debug!("Created {}", dest.display());
    let placement = Arc::clone(&core.services().placement);
    placement.file_added(dest);
    match position {
        Some(position) => placement.set_icon_position(dest, position),
        None => placement.remove_icon_position(dest),
    }

    let path: PathBuf = dest.to_path_buf();
    let record = match kind {
        CreateKind::Folder => UndoRecord::CreateFolder { path },
        CreateKind::File { contents } => UndoRecord::CreateFile {
            path,
            template: None,
            contents: contents.clone(),
        },
        CreateKind::FromTemplate(template) => UndoRecord::CreateFile {
            path,
            template: Some(template.clone()),
            contents: None,
        },
    };
    core.add_undo(record);
    core.set_created(dest);
    core.transfer.add_file(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobRequest;
    use crate::model::FilesystemInfo;
    use crate::testing::{Harness, MemoryBackend, Op, PlacementEvent};

    fn create(parent: &str, name: Option<&str>, kind: CreateKind) -> JobRequest {
        JobRequest::Create(CreateRequest {
            parent: PathBuf::from(parent),
            name: name.map(str::to_string),
            kind,
            position: None,
        })
    }

    #[test]
    fn test_new_folders_get_numbered_names() {
        let backend = MemoryBackend::new();
        backend.add_dir("/home");
        let mut harness = Harness::new(backend);

        let first = harness
            .run(create("/home", None, CreateKind::Folder))
            .expect("job finished");
        let second = harness
            .run(create("/home", None, CreateKind::Folder))
            .expect("job finished");

        assert_eq!(first.created, Some(PathBuf::from("/home/Untitled Folder")));
        assert_eq!(second.created, Some(PathBuf::from("/home/Untitled Folder 2")));
        assert_eq!(
            harness.ledger.transactions()[1].records,
            vec![UndoRecord::CreateFolder {
                path: PathBuf::from("/home/Untitled Folder 2")
            }]
        );
    }

    #[test]
    fn test_new_file_with_contents_avoids_existing_name() {
        let backend = MemoryBackend::new();
        backend.add_file("/home/notes.txt", b"old");
        let mut harness = Harness::new(backend);

        let outcome = harness
            .run(create(
                "/home",
                Some("notes.txt"),
                CreateKind::File {
                    contents: Some(b"hello".to_vec()),
                },
            ))
            .expect("job finished");

        assert_eq!(outcome.created, Some(PathBuf::from("/home/notes (copy).txt")));
        assert_eq!(harness.backend.contents("/home/notes (copy).txt"), Some(b"hello".to_vec()));
        assert_eq!(harness.backend.contents("/home/notes.txt"), Some(b"old".to_vec()));
        assert_eq!(outcome.transfer_info.num_bytes, 5);
    }

    #[test]
    fn test_template_copy_records_template() {
        let backend = MemoryBackend::new();
        backend.add_file("/templates/Letter.odt", b"template");
        backend.add_dir("/home");
        let mut harness = Harness::new(backend);

        let request = JobRequest::Create(CreateRequest {
            parent: PathBuf::from("/home"),
            name: None,
            kind: CreateKind::FromTemplate(PathBuf::from("/templates/Letter.odt")),
            position: Some(IconPosition { x: 10, y: 20, screen: 0 }),
        });
        let outcome = harness.run(request).expect("job finished");

        assert_eq!(outcome.created, Some(PathBuf::from("/home/Letter.odt")));
        assert_eq!(harness.backend.contents("/home/Letter.odt"), Some(b"template".to_vec()));
        assert_eq!(
            harness.ledger.transactions()[0].records,
            vec![UndoRecord::CreateFile {
                path: PathBuf::from("/home/Letter.odt"),
                template: Some(PathBuf::from("/templates/Letter.odt")),
                contents: None,
            }]
        );
        assert!(harness.placement.events().contains(&PlacementEvent::Position(
            PathBuf::from("/home/Letter.odt"),
            IconPosition { x: 10, y: 20, screen: 0 }
        )));
    }

    #[test]
    fn test_name_is_sanitized_on_restricted_filesystem() {
        let backend = MemoryBackend::new();
        backend.add_dir("/stick");
        backend.set_filesystem(
            "/stick",
            FilesystemInfo {
                id: Some("stick".into()),
                fs_type: Some("vfat".into()),
                ..FilesystemInfo::default()
            },
        );
        let mut harness = Harness::new(backend);

        let outcome = harness
            .run(create("/stick", Some("a:b"), CreateKind::Folder))
            .expect("job finished");
        assert_eq!(outcome.created, Some(PathBuf::from("/stick/a_b")));
    }

    #[test]
    fn test_create_error_offers_skip() {
        let backend = MemoryBackend::new();
        backend.add_dir("/ro");
        backend.fail(Op::MakeDir, "/ro/Untitled Folder", ErrorKind::PermissionDenied);
        let mut harness = Harness::new(backend);
        harness.presenter.push_button("Skip");

        let outcome = harness
            .run(create("/ro", None, CreateKind::Folder))
            .expect("job finished");
        assert!(!outcome.is_cancelled());
        assert_eq!(outcome.created, None);
        assert_eq!(harness.presenter.messages[0].buttons, vec!["Cancel", "Skip"]);
        assert!(harness.ledger.transactions().is_empty());
    }
}
