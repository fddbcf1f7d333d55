//! Types of the interactive resolution protocol.
//!
//! A job never shows a dialog itself. It builds a request, hands it to the
//! UI loop and blocks until the presenter has answered (see
//! `JobCore::ask` and `JobCore::ask_conflict`).

use std::path::PathBuf;

use crate::model::FileInfo;

/// Severity/style of a message dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Error,
    Warning,
    Question,
}

/// The answers a job can offer. The presenter only sees labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    Cancel,
    Skip,
    SkipAll,
    /// "Skip files": used when part of a folder's contents could not be listed
    SkipFiles,
    Retry,
    Delete,
    DeleteAll,
    CopyAnyway,
    Trash,
    DeletePermanently,
    EmptyTrash,
    DoNotEmptyTrash,
}

impl Button {
    pub fn label(&self) -> &'static str {
        match self {
            Button::Cancel => "Cancel",
            Button::Skip => "Skip",
            Button::SkipAll => "Skip All",
            Button::SkipFiles => "Skip Files",
            Button::Retry => "Retry",
            Button::Delete => "Delete",
            Button::DeleteAll => "Delete All",
            Button::CopyAnyway => "Copy Anyway",
            Button::Trash => "Move to Trash",
            Button::DeletePermanently => "Delete Permanently",
            Button::EmptyTrash => "Empty Trash",
            Button::DoNotEmptyTrash => "Do not Empty Trash",
        }
    }
}

/// A message dialog to show on the UI thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRequest {
    pub kind: MessageKind,
    pub primary: String,
    pub secondary: String,
    pub detail: Option<String>,
    pub buttons: Vec<String>,
}

impl MessageRequest {
    /// Index of the button with this label.
    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.buttons.iter().position(|b| b == label)
    }
}

/// A target-exists dialog to show on the UI thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictRequest {
    pub source: FileInfo,
    pub destination: FileInfo,
    pub dest_dir: PathBuf,
    /// Both sides are directories, so the overwrite answer means "merge"
    pub is_merge: bool,
}

/// What the conflict dialog lets the user pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictAction {
    Cancel,
    Skip,
    /// Replace, or merge when both sides are directories
    Overwrite,
    Rename,
}

/// The conflict dialog's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictResponse {
    pub action: ConflictAction,
    /// Set when action is Rename
    pub new_name: Option<String>,
    pub apply_to_all: bool,
}

impl ConflictResponse {
    pub fn new(action: ConflictAction) -> Self {
        ConflictResponse {
            action,
            new_name: None,
            apply_to_all: false,
        }
    }

    pub fn rename(new_name: impl Into<String>) -> Self {
        ConflictResponse {
            action: ConflictAction::Rename,
            new_name: Some(new_name.into()),
            apply_to_all: false,
        }
    }

    pub fn for_all(mut self) -> Self {
        self.apply_to_all = true;
        self
    }
}

/// A resolved conflict or error decision, as executors consume it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictResolution {
    Cancel,
    Skip,
    SkipAll,
    Replace,
    ReplaceAll,
    Merge,
    MergeAll,
    Rename(String),
    Delete,
    DeleteAll,
}

impl ConflictResolution {
    /// Fold a conflict dialog answer into a resolution.
    pub fn from_response(response: ConflictResponse, is_merge: bool) -> Self {
        match (response.action, response.apply_to_all) {
            (ConflictAction::Cancel, _) => ConflictResolution::Cancel,
            (ConflictAction::Skip, false) => ConflictResolution::Skip,
            (ConflictAction::Skip, true) => ConflictResolution::SkipAll,
            (ConflictAction::Overwrite, all) => match (is_merge, all) {
                (true, false) => ConflictResolution::Merge,
                (true, true) => ConflictResolution::MergeAll,
                (false, false) => ConflictResolution::Replace,
                (false, true) => ConflictResolution::ReplaceAll,
            },
            (ConflictAction::Rename, _) => match response.new_name {
                Some(name) if !name.is_empty() => ConflictResolution::Rename(name),
                _ => ConflictResolution::Cancel,
            },
        }
    }
}

/// Shows dialogs. Lives on the UI thread; never called by workers directly.
pub trait DialogPresenter {
    /// Show a message dialog and return the index of the chosen button.
    fn show_message(&mut self, request: &MessageRequest) -> usize;

    /// Show the file conflict dialog.
    fn show_conflict(&mut self, request: &ConflictRequest) -> ConflictResponse;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_response_folding() {
        let replace = ConflictResponse::new(ConflictAction::Overwrite);
        assert_eq!(
            ConflictResolution::from_response(replace.clone(), false),
            ConflictResolution::Replace
        );
        assert_eq!(
            ConflictResolution::from_response(replace.clone(), true),
            ConflictResolution::Merge
        );
        assert_eq!(
            ConflictResolution::from_response(replace.for_all(), true),
            ConflictResolution::MergeAll
        );
        assert_eq!(
            ConflictResolution::from_response(ConflictResponse::new(ConflictAction::Skip).for_all(), false),
            ConflictResolution::SkipAll
        );
        assert_eq!(
            ConflictResolution::from_response(ConflictResponse::rename("b.txt"), false),
            ConflictResolution::Rename("b.txt".to_string())
        );
    }

    #[test]
    fn test_rename_without_name_cancels() {
        let response = ConflictResponse {
            action: ConflictAction::Rename,
            new_name: None,
            apply_to_all: false,
        };
        assert_eq!(ConflictResolution::from_response(response, false), ConflictResolution::Cancel);
    }

    #[test]
    fn test_index_of_label() {
        let request = MessageRequest {
            kind: MessageKind::Error,
            primary: "p".into(),
            secondary: "s".into(),
            detail: None,
            buttons: vec![Button::Cancel.label().into(), Button::Skip.label().into()],
        };
        assert_eq!(request.index_of("Skip"), Some(1));
        assert_eq!(request.index_of("Retry"), None);
    }
}
