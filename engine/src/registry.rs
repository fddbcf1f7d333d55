//! Per-job memory of decisions already made: items the user chose to
//! skip and "apply to all" answers. Owned by the job's worker thread.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Items that already produced a prompt and must now be skipped silently.
#[derive(Debug, Default)]
pub struct SkipRegistry {
    files: HashSet<PathBuf>,
    readdir_errors: HashSet<PathBuf>,
}

impl SkipRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip `path` wherever a later phase meets it again.
    pub fn skip_file(&mut self, path: &Path) {
        self.files.insert(path.to_path_buf());
    }

    pub fn should_skip_file(&self, path: &Path) -> bool {
        self.files.contains(path)
    }

    /// Enumeration errors inside `dir` were already answered with "skip".
    pub fn skip_readdir_error(&mut self, dir: &Path) {
        self.readdir_errors.insert(dir.to_path_buf());
    }

    pub fn should_skip_readdir_error(&self, dir: &Path) -> bool {
        self.readdir_errors.contains(dir)
    }

    pub fn skipped_files(&self) -> usize {
        self.files.len()
    }
}

/// "Apply to all" answers, cached for the rest of the job.
///
/// Merge and replace are separate: answering "replace all" for a file
/// conflict says nothing about directory merges and vice versa.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StickyFlags {
    pub skip_all_error: bool,
    pub skip_all_conflict: bool,
    pub merge_all: bool,
    pub replace_all: bool,
    pub delete_all: bool,
}

impl StickyFlags {
    /// Whether a conflict of this shape is already answered with overwrite.
    pub fn overwrite_for(&self, is_merge: bool) -> bool {
        if is_merge {
            self.merge_all
        } else {
            self.replace_all
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_registry() {
        let mut registry = SkipRegistry::new();
        assert!(!registry.should_skip_file(Path::new("/a")));

        registry.skip_file(Path::new("/a"));
        registry.skip_readdir_error(Path::new("/dir"));

        assert!(registry.should_skip_file(Path::new("/a")));
        assert!(!registry.should_skip_file(Path::new("/dir")));
        assert!(registry.should_skip_readdir_error(Path::new("/dir")));
        assert_eq!(registry.skipped_files(), 1);
    }

    #[test]
    fn test_overwrite_is_scoped_per_shape() {
        let flags = StickyFlags {
            merge_all: true,
            ..StickyFlags::default()
        };
        assert!(flags.overwrite_for(true));
        assert!(!flags.overwrite_for(false));
    }
}
