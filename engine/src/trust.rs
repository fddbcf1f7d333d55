//! Mark a desktop launcher as trusted: give it a shebang line and make it
//! executable for everyone.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::dialog::{Button, MessageKind};
use crate::error::{BackendResult, Cancelled, JobError};
use crate::job::JobCore;
use crate::model::display_name;

const SHEBANG: &[u8] = b"#!/usr/bin/env xdg-open\n";
const EXECUTE_ALL: u32 = 0o111;

/// With `interactive` unset failures are logged and dropped.
pub fn mark_trusted(core: &mut JobCore, path: PathBuf, interactive: bool) -> Result<(), Cancelled> {
    core.progress().set_status(format!("Marking \"{}\" as trusted", display_name(&path)));

    loop {
        core.ensure_not_cancelled()?;
        let err = match try_mark_trusted(core, &path) {
            Ok(()) => {
                debug!("Marked {} as trusted", path.display());
                core.transfer.add_file(0);
                return Ok(());
            }
            Err(err) => err,
        };

        if !interactive {
            warn!("Could not mark {} as trusted: {}", path.display(), err);
            core.record_skip(JobError::Transfer { path, source: err });
            return Ok(());
        }

        let answer = core.ask(
            MessageKind::Error,
            "Unable to mark launcher trusted (executable)",
            err.message.clone(),
            None,
            &[Button::Cancel, Button::Retry],
        );
        if answer != Button::Retry {
            return Err(Cancelled);
        }
    }
}

fn try_mark_trusted(core: &JobCore, path: &Path) -> BackendResult<()> {
    let contents = core.backend().read_file(path)?;
    if !contents.starts_with(b"#!") {
        let mut updated = Vec::with_capacity(SHEBANG.len() + contents.len());
        updated.extend_from_slice(SHEBANG);
        updated.extend_from_slice(&contents);
        core.backend().replace_contents(path, &updated)?;
    }

    let info = core.backend().stat(path)?;
    let mode = info.mode.unwrap_or(0o644);
    if mode & EXECUTE_ALL != EXECUTE_ALL {
        core.backend().set_mode(path, mode | EXECUTE_ALL)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::job::JobRequest;
    use crate::testing::{Harness, MemoryBackend, Op};

    fn trust(path: &str, interactive: bool) -> JobRequest {
        JobRequest::MarkTrusted {
            path: PathBuf::from(path),
            interactive,
        }
    }

    #[test]
    fn test_shebang_is_prepended_and_mode_set() {
        let backend = MemoryBackend::new();
        backend.add_file("/apps/editor.desktop", b"[Desktop Entry]\n");
        backend.set_mode_of("/apps/editor.desktop", 0o640);
        let mut harness = Harness::new(backend);

        harness.run(trust("/apps/editor.desktop", true)).expect("job finished");
        assert_eq!(
            harness.backend.contents("/apps/editor.desktop"),
            Some(b"#!/usr/bin/env xdg-open\n[Desktop Entry]\n".to_vec())
        );
        assert_eq!(harness.backend.mode_of("/apps/editor.desktop"), Some(0o751));
    }

    #[test]
    fn test_existing_shebang_is_kept() {
        let backend = MemoryBackend::new();
        backend.add_file("/apps/run.desktop", b"#!/bin/sh\n");
        backend.set_mode_of("/apps/run.desktop", 0o755);
        let mut harness = Harness::new(backend);

        harness.run(trust("/apps/run.desktop", true)).expect("job finished");
        assert_eq!(harness.backend.contents("/apps/run.desktop"), Some(b"#!/bin/sh\n".to_vec()));
        assert!(harness.backend.calls_of(Op::ReplaceContents).is_empty());
        assert!(harness.backend.calls_of(Op::SetMode).is_empty());
    }

    #[test]
    fn test_failure_is_silent_when_not_interactive() {
        let backend = MemoryBackend::new();
        backend.add_file("/apps/x.desktop", b"");
        backend.fail(Op::ReplaceContents, "/apps/x.desktop", ErrorKind::ReadOnly);
        let mut harness = Harness::new(backend);

        let outcome = harness.run(trust("/apps/x.desktop", false)).expect("job finished");
        assert!(harness.presenter.messages.is_empty());
        assert!(!outcome.is_cancelled());
        assert_eq!(outcome.skipped.len(), 1);
    }

    #[test]
    fn test_retry_after_failure() {
        let backend = MemoryBackend::new();
        backend.add_file("/apps/x.desktop", b"");
        backend.fail_once(Op::SetMode, "/apps/x.desktop", ErrorKind::PermissionDenied);
        let mut harness = Harness::new(backend);
        harness.presenter.push_button("Retry");

        let outcome = harness.run(trust("/apps/x.desktop", true)).expect("job finished");
        assert!(!outcome.is_cancelled());
        assert_eq!(harness.presenter.messages[0].buttons, vec!["Cancel", "Retry"]);
        assert_eq!(
            harness.backend.contents("/apps/x.desktop"),
            Some(b"#!/usr/bin/env xdg-open\n".to_vec()),
            "shebang is not added twice"
        );
    }
}
