//! Unmount or eject a volume, optionally emptying its trash first.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::delete::remove_tree;
use crate::dialog::{Button, MessageKind};
use crate::error::Cancelled;
use crate::job::JobCore;
use crate::model::display_name;
use crate::services::Notification;

pub fn unmount_mount(core: &mut JobCore, mount: PathBuf, eject: bool, check_trash: bool) -> Result<(), Cancelled> {
    if check_trash {
        offer_empty_trash(core, &mount)?;
    }

    let name = display_name(&mount);
    core.progress().set_status(format!(
        "{} \"{}\"",
        if eject { "Ejecting" } else { "Unmounting" },
        name
    ));

    loop {
        core.ensure_not_cancelled()?;
        match core.backend().unmount(&mount, eject) {
            Ok(()) => {
                info!("Unmounted {}", mount.display());
                core.services().notifier.notify(Notification::SafeToRemove { name });
                return Ok(());
            }
            Err(err) => {
                let primary = if eject {
                    format!("Unable to eject {}", name)
                } else {
                    format!("Unable to unmount {}", name)
                };
                let answer = core.ask(
                    MessageKind::Error,
                    primary,
                    err.message.clone(),
                    None,
                    &[Button::Cancel, Button::Retry],
                );
                if answer != Button::Retry {
                    return Err(Cancelled);
                }
            }
        }
    }
}

/// Trash directories that live on the volume mounted at `mount`.
fn trash_dirs_on(core: &JobCore, mount: &Path) -> Vec<PathBuf> {
    core.backend()
        .trash_dirs()
        .into_iter()
        .filter(|dir| dir.starts_with(mount))
        .collect()
}

fn offer_empty_trash(core: &mut JobCore, mount: &Path) -> Result<(), Cancelled> {
    let dirs = trash_dirs_on(core, mount);
    let has_entries = dirs
        .iter()
        .any(|dir| core.backend().enumerate(dir).map(|c| !c.is_empty()).unwrap_or(false));
    if !has_entries {
        return Ok(());
    }

    let answer = core.ask(
        MessageKind::Question,
        "Do you want to empty the trash before you unmount?",
        "In order to regain the free space on this volume the trash must be emptied. \
         All trashed items on the volume will be permanently lost.",
        None,
        &[Button::DoNotEmptyTrash, Button::Cancel, Button::EmptyTrash],
    );
    match answer {
        Button::DoNotEmptyTrash => Ok(()),
        Button::EmptyTrash => {
            core.progress().set_status("Emptying Trash");
            for dir in dirs {
                let children = match core.backend().enumerate(&dir) {
                    Ok(children) => children,
                    Err(err) => {
                        warn!("Cannot list trash {}: {}", dir.display(), err);
                        continue;
                    }
                };
                for child in children {
                    if !remove_tree(core, &child.path)? {
                        warn!("Could not remove {} from the trash", child.path.display());
                    }
                }
            }
            Ok(())
        }
        _ => Err(Cancelled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::job::JobRequest;
    use crate::testing::{Harness, MemoryBackend, Op};

    fn unmount(mount: &str, check_trash: bool) -> JobRequest {
        JobRequest::Unmount {
            mount: PathBuf::from(mount),
            eject: false,
            check_trash,
        }
    }

    fn with_trash() -> MemoryBackend {
        let backend = MemoryBackend::new();
        backend.add_file("/.Trash/old.txt", b"old");
        backend
    }

    #[test]
    fn test_unmount_notifies_safe_to_remove() {
        let mut harness = Harness::new(MemoryBackend::new());
        let outcome = harness.run(unmount("/", true)).expect("job finished");
        assert!(!outcome.is_cancelled());
        assert!(harness.presenter.messages.is_empty());
        assert_eq!(harness.backend.calls_of(Op::Unmount).len(), 1);
        assert_eq!(harness.notifier.notifications().len(), 1);
    }

    #[test]
    fn test_empty_trash_before_unmount() {
        let mut harness = Harness::new(with_trash());
        harness.presenter.push_button("Empty Trash");

        harness.run(unmount("/", true)).expect("job finished");
        assert!(!harness.backend.exists("/.Trash/old.txt"));
        assert_eq!(harness.backend.calls_of(Op::Unmount).len(), 1);
    }

    #[test]
    fn test_keep_trash_and_unmount() {
        let mut harness = Harness::new(with_trash());
        harness.presenter.push_button("Do not Empty Trash");

        harness.run(unmount("/", true)).expect("job finished");
        assert!(harness.backend.exists("/.Trash/old.txt"));
        assert_eq!(harness.backend.calls_of(Op::Unmount).len(), 1);
    }

    #[test]
    fn test_cancel_at_trash_prompt_leaves_volume_mounted() {
        let mut harness = Harness::new(with_trash());
        harness.presenter.push_button("Cancel");

        let outcome = harness.run(unmount("/", true)).expect("job finished");
        assert!(outcome.is_cancelled());
        assert!(harness.backend.calls_of(Op::Unmount).is_empty());
        assert_eq!(harness.backend.mutation_count(), 0);
    }

    #[test]
    fn test_failed_unmount_can_be_retried() {
        let backend = MemoryBackend::new();
        backend.fail_once(Op::Unmount, "/", ErrorKind::Other);
        let mut harness = Harness::new(backend);
        harness.presenter.push_button("Retry");

        let outcome = harness.run(unmount("/", false)).expect("job finished");
        assert!(!outcome.is_cancelled());
        assert_eq!(harness.backend.calls_of(Op::Unmount).len(), 2);
        assert_eq!(harness.notifier.notifications().len(), 1);
    }
}
