//! In-memory storage backend, scripted presenter and recording
//! collaborators.
//!
//! `MemoryBackend` follows the same `ErrorKind` conventions as the local
//! backend, logs every call, can run a hook at the start of each call and
//! can be told to fail specific calls. `Harness` wires all of it to a
//! `Scheduler` and runs one job at a time to completion.

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use crate::backend::StorageBackend;
use crate::config::EngineConfig;
use crate::dialog::{ConflictAction, ConflictRequest, ConflictResponse, DialogPresenter, MessageRequest};
use crate::error::{BackendError, BackendResult, ErrorKind};
use crate::job::{JobId, JobOutcome, JobRequest};
use crate::model::{FileInfo, FileKind, FilesystemInfo, IconPosition, TransferFlags};
use crate::progress::{ProgressListener, ProgressValue};
use crate::scheduler::{RowState, Scheduler, UiLoop};
use crate::services::{
    InhibitCookie, Notification, Notifier, PlacementSink, PowerManager, Services, UndoLedger, UndoTransaction,
};

const FILE_MODE: u32 = 0o644;
const DIR_MODE: u32 = 0o755;
const LINK_MODE: u32 = 0o777;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Backend operations, as recorded in the call log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Stat,
    Enumerate,
    MoveItem,
    CopyFile,
    Delete,
    MakeDir,
    MakeSymlink,
    CreateFile,
    ReadFile,
    ReplaceContents,
    SetMode,
    CopyAttributes,
    Trash,
    QueryFilesystem,
    Unmount,
}

impl Op {
    pub fn is_mutation(self) -> bool {
        !matches!(self, Op::Stat | Op::Enumerate | Op::ReadFile | Op::QueryFilesystem)
    }
}

/// One logged backend call. `path` is the primary path (the source for
/// copies and moves).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendCall {
    pub op: Op,
    pub path: PathBuf,
    pub target: Option<PathBuf>,
}

#[derive(Debug, Clone)]
enum Node {
    File { contents: Vec<u8>, mode: u32, modified: SystemTime },
    Dir { mode: u32, modified: SystemTime },
    Symlink { target: PathBuf, modified: SystemTime },
}

impl Node {
    fn is_dir(&self) -> bool {
        matches!(self, Node::Dir { .. })
    }

    fn dir() -> Node {
        Node::Dir {
            mode: DIR_MODE,
            modified: SystemTime::now(),
        }
    }
}

struct Fault {
    op: Op,
    path: PathBuf,
    kind: ErrorKind,
    once: bool,
}

#[derive(Default)]
struct State {
    nodes: BTreeMap<PathBuf, Node>,
    faults: Vec<Fault>,
    calls: Vec<BackendCall>,
    filesystems: Vec<(PathBuf, FilesystemInfo)>,
    rejected_chars: Vec<char>,
}

impl State {
    fn node(&self, path: &Path) -> BackendResult<&Node> {
        self.nodes
            .get(path)
            .ok_or_else(|| BackendError::new(ErrorKind::NotFound, path))
    }

    fn child_paths(&self, dir: &Path) -> Vec<PathBuf> {
        self.nodes
            .keys()
            .filter(|path| path.parent() == Some(dir))
            .cloned()
            .collect()
    }

    fn info(&self, path: &Path, node: &Node) -> FileInfo {
        let (kind, size, mode, modified) = match node {
            Node::File { contents, mode, modified } => (FileKind::File, contents.len() as u64, *mode, *modified),
            Node::Dir { mode, modified } => (FileKind::Directory, 0, *mode, *modified),
            Node::Symlink { target, modified } => (
                FileKind::Symlink,
                target.as_os_str().len() as u64,
                LINK_MODE,
                *modified,
            ),
        };
        FileInfo {
            path: path.to_path_buf(),
            kind,
            size,
            mode: Some(mode),
            modified: Some(modified),
        }
    }

    fn filesystem(&self, path: &Path) -> FilesystemInfo {
        self.filesystems
            .iter()
            .filter(|(root, _)| path.starts_with(root))
            .max_by_key(|(root, _)| root.as_os_str().len())
            .map(|(_, info)| info.clone())
            .unwrap_or_else(|| FilesystemInfo {
                id: Some("mem".to_string()),
                ..FilesystemInfo::default()
            })
    }

    fn check_writable(&self, path: &Path) -> BackendResult<()> {
        if self.filesystem(path).read_only {
            return Err(BackendError::new(ErrorKind::ReadOnly, path));
        }
        Ok(())
    }

    /// Parent exists and is a directory, and the name is acceptable.
    fn check_new_entry(&self, path: &Path) -> BackendResult<()> {
        let parent = path
            .parent()
            .ok_or_else(|| BackendError::new(ErrorKind::PermissionDenied, path))?;
        match self.nodes.get(parent) {
            Some(node) if node.is_dir() => {}
            Some(_) => return Err(BackendError::new(ErrorKind::NotDirectory, parent)),
            None => return Err(BackendError::new(ErrorKind::NotFound, parent)),
        }
        let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        if name.chars().any(|c| self.rejected_chars.contains(&c)) {
            return Err(BackendError::with_message(
                ErrorKind::InvalidFilename,
                path,
                "Invalid filename",
            ));
        }
        self.check_writable(path)
    }

    /// Re-key `src` and everything below it to `dst`.
    fn move_subtree(&mut self, src: &Path, dst: &Path) {
        let keys: Vec<PathBuf> = self.nodes.keys().filter(|p| p.starts_with(src)).cloned().collect();
        for key in keys {
            if let Some(node) = self.nodes.remove(&key) {
                let rest = key.strip_prefix(src).map(Path::to_path_buf).unwrap_or_default();
                let new_key = if rest.as_os_str().is_empty() { dst.to_path_buf() } else { dst.join(rest) };
                self.nodes.insert(new_key, node);
            }
        }
    }

    fn insert_dirs(&mut self, path: &Path) {
        for ancestor in path.ancestors().collect::<Vec<_>>().into_iter().rev() {
            self.nodes.entry(ancestor.to_path_buf()).or_insert_with(Node::dir);
        }
    }
}

type Hook = Arc<dyn Fn(&BackendCall) + Send + Sync>;

/// A storage backend that keeps everything in memory.
///
/// The root is `/`. Trashed items are moved directly into `/.Trash`.
pub struct MemoryBackend {
    state: Mutex<State>,
    hook: Mutex<Option<Hook>>,
    trash_root: PathBuf,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("nodes", &lock(&self.state).nodes.len())
            .finish_non_exhaustive()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        let mut state = State::default();
        state.nodes.insert(PathBuf::from("/"), Node::dir());
        MemoryBackend {
            state: Mutex::new(state),
            hook: Mutex::new(None),
            trash_root: PathBuf::from("/.Trash"),
        }
    }

    // ---- setup ----

    /// Add a file, creating missing parent directories.
    pub fn add_file(&self, path: &str, contents: &[u8]) {
        let path = PathBuf::from(path);
        let mut state = lock(&self.state);
        if let Some(parent) = path.parent() {
            state.insert_dirs(parent);
        }
        state.nodes.insert(
            path,
            Node::File {
                contents: contents.to_vec(),
                mode: FILE_MODE,
                modified: SystemTime::now(),
            },
        );
    }

    pub fn add_dir(&self, path: &str) {
        lock(&self.state).insert_dirs(Path::new(path));
    }

    pub fn add_symlink(&self, path: &str, target: &str) {
        let path = PathBuf::from(path);
        let mut state = lock(&self.state);
        if let Some(parent) = path.parent() {
            state.insert_dirs(parent);
        }
        state.nodes.insert(
            path,
            Node::Symlink {
                target: PathBuf::from(target),
                modified: SystemTime::now(),
            },
        );
    }

    pub fn set_mode_of(&self, path: &str, new_mode: u32) {
        if let Some(Node::File { mode, .. } | Node::Dir { mode, .. }) = lock(&self.state).nodes.get_mut(Path::new(path)) {
            *mode = new_mode;
        }
    }

    /// Make every `op` call on `path` fail with `kind`.
    pub fn fail(&self, op: Op, path: &str, kind: ErrorKind) {
        self.add_fault(op, path, kind, false);
    }

    /// Make the next `op` call on `path` fail with `kind`.
    pub fn fail_once(&self, op: Op, path: &str, kind: ErrorKind) {
        self.add_fault(op, path, kind, true);
    }

    fn add_fault(&self, op: Op, path: &str, kind: ErrorKind, once: bool) {
        lock(&self.state).faults.push(Fault {
            op,
            path: PathBuf::from(path),
            kind,
            once,
        });
    }

    /// Paths under `root` belong to a filesystem described by `info`.
    pub fn set_filesystem(&self, root: &str, info: FilesystemInfo) {
        lock(&self.state).filesystems.push((PathBuf::from(root), info));
    }

    /// New entries whose name contains `c` fail with `InvalidFilename`.
    pub fn reject_names_containing(&self, c: char) {
        lock(&self.state).rejected_chars.push(c);
    }

    /// Run `hook` at the start of every call, before faults apply.
    pub fn set_hook(&self, hook: impl Fn(&BackendCall) + Send + Sync + 'static) {
        *lock(&self.hook) = Some(Arc::new(hook));
    }

    // ---- inspection ----

    pub fn exists(&self, path: &str) -> bool {
        lock(&self.state).nodes.contains_key(Path::new(path))
    }

    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        match lock(&self.state).nodes.get(Path::new(path)) {
            Some(Node::File { contents, .. }) => Some(contents.clone()),
            _ => None,
        }
    }

    pub fn children(&self, path: &str) -> Vec<PathBuf> {
        lock(&self.state).child_paths(Path::new(path))
    }

    pub fn mode_of(&self, path: &str) -> Option<u32> {
        match lock(&self.state).nodes.get(Path::new(path)) {
            Some(Node::File { mode, .. } | Node::Dir { mode, .. }) => Some(*mode),
            Some(Node::Symlink { .. }) => Some(LINK_MODE),
            None => None,
        }
    }

    pub fn link_target(&self, path: &str) -> Option<PathBuf> {
        match lock(&self.state).nodes.get(Path::new(path)) {
            Some(Node::Symlink { target, .. }) => Some(target.clone()),
            _ => None,
        }
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        lock(&self.state).calls.clone()
    }

    pub fn calls_of(&self, op: Op) -> Vec<BackendCall> {
        lock(&self.state).calls.iter().filter(|c| c.op == op).cloned().collect()
    }

    /// Number of mutating calls attempted, failed ones included.
    pub fn mutation_count(&self) -> usize {
        lock(&self.state).calls.iter().filter(|c| c.op.is_mutation()).count()
    }

    /// Log the call, run the hook and apply any matching fault.
    fn begin(&self, op: Op, path: &Path, target: Option<&Path>) -> BackendResult<()> {
        let call = BackendCall {
            op,
            path: path.to_path_buf(),
            target: target.map(Path::to_path_buf),
        };
        lock(&self.state).calls.push(call.clone());

        let hook = lock(&self.hook).clone();
        if let Some(hook) = hook {
            hook(&call);
        }

        let mut state = lock(&self.state);
        let Some(index) = state.faults.iter().position(|f| f.op == op && f.path == path) else {
            return Ok(());
        };
        let kind = state.faults[index].kind;
        if state.faults[index].once {
            state.faults.remove(index);
        }
        Err(BackendError::with_message(kind, path, format!("injected {:?}", kind)))
    }

    fn unique_trash_path(&self, state: &State, name: &str) -> PathBuf {
        let mut candidate = self.trash_root.join(name);
        let mut n = 2;
        while state.nodes.contains_key(&candidate) {
            candidate = self.trash_root.join(format!("{}.{}", name, n));
            n += 1;
        }
        candidate
    }
}

impl StorageBackend for MemoryBackend {
    fn stat(&self, path: &Path) -> BackendResult<FileInfo> {
        self.begin(Op::Stat, path, None)?;
        let state = lock(&self.state);
        let node = state.node(path)?;
        Ok(state.info(path, node))
    }

    fn enumerate(&self, dir: &Path) -> BackendResult<Vec<FileInfo>> {
        self.begin(Op::Enumerate, dir, None)?;
        let state = lock(&self.state);
        if !state.node(dir)?.is_dir() {
            return Err(BackendError::new(ErrorKind::NotDirectory, dir));
        }
        let mut children = Vec::new();
        for path in state.child_paths(dir) {
            let node = state.node(&path)?;
            children.push(state.info(&path, node));
        }
        Ok(children)
    }

    fn move_item(&self, src: &Path, dst: &Path, flags: TransferFlags) -> BackendResult<()> {
        self.begin(Op::MoveItem, src, Some(dst))?;
        let mut state = lock(&self.state);
        let src_is_dir = state.node(src)?.is_dir();
        state.check_writable(src)?;
        if dst.starts_with(src) {
            return Err(BackendError::with_message(
                ErrorKind::Other,
                dst,
                "Cannot move a folder into itself",
            ));
        }

        if let Some(existing) = state.nodes.get(dst) {
            if !flags.overwrite {
                return Err(BackendError::new(ErrorKind::Exists, dst));
            }
            match (src_is_dir, existing.is_dir()) {
                (true, true) => return Err(BackendError::new(ErrorKind::WouldMerge, dst)),
                (true, false) => return Err(BackendError::new(ErrorKind::WouldRecurse, src)),
                (false, true) => return Err(BackendError::new(ErrorKind::IsDirectory, dst)),
                (false, false) => {}
            }
        }

        let dest_dir = dst.parent().unwrap_or(dst);
        let same_fs = {
            let from = state.filesystem(src).id;
            from.is_some() && from == state.filesystem(dest_dir).id
        };
        if !same_fs {
            if flags.no_fallback_for_move {
                return Err(BackendError::new(ErrorKind::NotSupported, src));
            }
            if src_is_dir {
                return Err(BackendError::new(ErrorKind::WouldRecurse, src));
            }
        }

        state.check_new_entry(dst)?;
        state.nodes.remove(dst);
        state.move_subtree(src, dst);
        Ok(())
    }

    fn copy_file(
        &self,
        src: &Path,
        dst: &Path,
        flags: TransferFlags,
        progress: &mut dyn FnMut(u64, u64),
    ) -> BackendResult<()> {
        self.begin(Op::CopyFile, src, Some(dst))?;
        let node = {
            let mut state = lock(&self.state);
            let source = state.node(src)?.clone();
            let existing = state.nodes.get(dst).map(Node::is_dir);

            if source.is_dir() {
                return Err(match existing {
                    Some(_) if !flags.overwrite => BackendError::new(ErrorKind::Exists, dst),
                    Some(true) => BackendError::new(ErrorKind::WouldMerge, dst),
                    _ => BackendError::new(ErrorKind::WouldRecurse, src),
                });
            }
            match existing {
                Some(_) if !flags.overwrite => return Err(BackendError::new(ErrorKind::Exists, dst)),
                Some(true) => return Err(BackendError::new(ErrorKind::IsDirectory, dst)),
                _ => {}
            }
            state.check_new_entry(dst)?;

            let node = match source {
                Node::File { contents, mode, modified } => Node::File {
                    contents,
                    mode: if flags.target_default_perms { FILE_MODE } else { mode },
                    modified,
                },
                other => other,
            };
            state.nodes.insert(dst.to_path_buf(), node.clone());
            node
        };

        let size = match &node {
            Node::File { contents, .. } => contents.len() as u64,
            _ => 0,
        };
        progress(0, size);
        progress(size, size);
        Ok(())
    }

    fn delete(&self, path: &Path) -> BackendResult<()> {
        self.begin(Op::Delete, path, None)?;
        let mut state = lock(&self.state);
        let is_dir = state.node(path)?.is_dir();
        state.check_writable(path)?;
        if is_dir && !state.child_paths(path).is_empty() {
            return Err(BackendError::new(ErrorKind::NotEmpty, path));
        }
        if path == Path::new("/") {
            return Err(BackendError::new(ErrorKind::PermissionDenied, path));
        }
        state.nodes.remove(path);
        Ok(())
    }

    fn make_dir(&self, path: &Path) -> BackendResult<()> {
        self.begin(Op::MakeDir, path, None)?;
        let mut state = lock(&self.state);
        if state.nodes.contains_key(path) {
            return Err(BackendError::new(ErrorKind::Exists, path));
        }
        state.check_new_entry(path)?;
        state.nodes.insert(path.to_path_buf(), Node::dir());
        Ok(())
    }

    fn make_symlink(&self, path: &Path, target: &Path) -> BackendResult<()> {
        self.begin(Op::MakeSymlink, path, Some(target))?;
        let mut state = lock(&self.state);
        if state.nodes.contains_key(path) {
            return Err(BackendError::new(ErrorKind::Exists, path));
        }
        state.check_new_entry(path)?;
        state.nodes.insert(
            path.to_path_buf(),
            Node::Symlink {
                target: target.to_path_buf(),
                modified: SystemTime::now(),
            },
        );
        Ok(())
    }

    fn create_file(&self, path: &Path, contents: &[u8]) -> BackendResult<()> {
        self.begin(Op::CreateFile, path, None)?;
        let mut state = lock(&self.state);
        if state.nodes.contains_key(path) {
            return Err(BackendError::new(ErrorKind::Exists, path));
        }
        state.check_new_entry(path)?;
        state.nodes.insert(
            path.to_path_buf(),
            Node::File {
                contents: contents.to_vec(),
                mode: FILE_MODE,
                modified: SystemTime::now(),
            },
        );
        Ok(())
    }

    fn read_file(&self, path: &Path) -> BackendResult<Vec<u8>> {
        self.begin(Op::ReadFile, path, None)?;
        let state = lock(&self.state);
        match state.node(path)? {
            Node::File { contents, .. } => Ok(contents.clone()),
            Node::Dir { .. } => Err(BackendError::new(ErrorKind::IsDirectory, path)),
            Node::Symlink { target, .. } => match state.node(target)? {
                Node::File { contents, .. } => Ok(contents.clone()),
                _ => Err(BackendError::new(ErrorKind::IsDirectory, target)),
            },
        }
    }

    fn replace_contents(&self, path: &Path, contents: &[u8]) -> BackendResult<()> {
        self.begin(Op::ReplaceContents, path, None)?;
        let mut state = lock(&self.state);
        state.check_writable(path)?;
        let mode = match state.nodes.get(path) {
            Some(Node::File { mode, .. }) => *mode,
            Some(_) => return Err(BackendError::new(ErrorKind::IsDirectory, path)),
            None => {
                state.check_new_entry(path)?;
                FILE_MODE
            }
        };
        state.nodes.insert(
            path.to_path_buf(),
            Node::File {
                contents: contents.to_vec(),
                mode,
                modified: SystemTime::now(),
            },
        );
        Ok(())
    }

    fn set_mode(&self, path: &Path, new_mode: u32) -> BackendResult<()> {
        self.begin(Op::SetMode, path, None)?;
        let mut state = lock(&self.state);
        state.check_writable(path)?;
        match state.nodes.get_mut(path) {
            Some(Node::File { mode, .. } | Node::Dir { mode, .. }) => {
                *mode = new_mode;
                Ok(())
            }
            Some(Node::Symlink { .. }) => Err(BackendError::new(ErrorKind::NotSupported, path)),
            None => Err(BackendError::new(ErrorKind::NotFound, path)),
        }
    }

    fn copy_attributes(&self, src: &Path, dst: &Path) -> BackendResult<()> {
        self.begin(Op::CopyAttributes, src, Some(dst))?;
        let mut state = lock(&self.state);
        let (src_mode, src_modified) = match state.node(src)? {
            Node::File { mode, modified, .. } | Node::Dir { mode, modified } => (*mode, *modified),
            Node::Symlink { .. } => return Ok(()),
        };
        match state.nodes.get_mut(dst) {
            Some(Node::File { mode, modified, .. } | Node::Dir { mode, modified }) => {
                *mode = src_mode;
                *modified = src_modified;
                Ok(())
            }
            Some(Node::Symlink { .. }) => Ok(()),
            None => Err(BackendError::new(ErrorKind::NotFound, dst)),
        }
    }

    fn trash(&self, path: &Path) -> BackendResult<()> {
        self.begin(Op::Trash, path, None)?;
        let mut state = lock(&self.state);
        state.node(path)?;
        state.check_writable(path)?;
        if path.starts_with(&self.trash_root) {
            return Err(BackendError::with_message(
                ErrorKind::NotSupported,
                path,
                "Item is already in the trash",
            ));
        }
        state.insert_dirs(&self.trash_root);
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let target = self.unique_trash_path(&state, &name);
        state.move_subtree(path, &target);
        Ok(())
    }

    fn trash_dirs(&self) -> Vec<PathBuf> {
        vec![self.trash_root.clone()]
    }

    fn query_filesystem(&self, path: &Path) -> BackendResult<FilesystemInfo> {
        self.begin(Op::QueryFilesystem, path, None)?;
        Ok(lock(&self.state).filesystem(path))
    }

    fn unmount(&self, mount: &Path, _eject: bool) -> BackendResult<()> {
        self.begin(Op::Unmount, mount, None)
    }
}

/// Answers dialogs from a script. Unscripted dialogs are cancelled.
#[derive(Debug, Default)]
pub struct ScriptedPresenter {
    buttons: VecDeque<String>,
    conflict_answers: VecDeque<ConflictResponse>,
    pub messages: Vec<MessageRequest>,
    pub conflicts: Vec<ConflictRequest>,
}

impl ScriptedPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer the next message dialog with the button labelled `label`.
    pub fn push_button(&mut self, label: &str) {
        self.buttons.push_back(label.to_string());
    }

    pub fn push_conflict(&mut self, response: ConflictResponse) {
        self.conflict_answers.push_back(response);
    }
}

impl DialogPresenter for ScriptedPresenter {
    fn show_message(&mut self, request: &MessageRequest) -> usize {
        self.messages.push(request.clone());
        self.buttons
            .pop_front()
            .and_then(|label| request.index_of(&label))
            .unwrap_or(request.buttons.len())
    }

    fn show_conflict(&mut self, request: &ConflictRequest) -> ConflictResponse {
        self.conflicts.push(request.clone());
        self.conflict_answers
            .pop_front()
            .unwrap_or_else(|| ConflictResponse::new(ConflictAction::Cancel))
    }
}

#[derive(Debug, Default)]
pub struct RecordingLedger {
    transactions: Mutex<Vec<UndoTransaction>>,
}

impl RecordingLedger {
    pub fn transactions(&self) -> Vec<UndoTransaction> {
        lock(&self.transactions).clone()
    }
}

impl UndoLedger for RecordingLedger {
    fn commit(&self, transaction: UndoTransaction) {
        lock(&self.transactions).push(transaction);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementEvent {
    Added(PathBuf),
    Removed(PathBuf),
    Moved(PathBuf, PathBuf),
    Position(PathBuf, IconPosition),
    RemovePosition(PathBuf),
}

#[derive(Debug, Default)]
pub struct RecordingPlacement {
    events: Mutex<Vec<PlacementEvent>>,
}

impl RecordingPlacement {
    pub fn events(&self) -> Vec<PlacementEvent> {
        lock(&self.events).clone()
    }

    fn push(&self, event: PlacementEvent) {
        lock(&self.events).push(event);
    }
}

impl PlacementSink for RecordingPlacement {
    fn file_added(&self, path: &Path) {
        self.push(PlacementEvent::Added(path.to_path_buf()));
    }

    fn file_removed(&self, path: &Path) {
        self.push(PlacementEvent::Removed(path.to_path_buf()));
    }

    fn file_moved(&self, from: &Path, to: &Path) {
        self.push(PlacementEvent::Moved(from.to_path_buf(), to.to_path_buf()));
    }

    fn set_icon_position(&self, path: &Path, position: IconPosition) {
        self.push(PlacementEvent::Position(path.to_path_buf(), position));
    }

    fn remove_icon_position(&self, path: &Path) {
        self.push(PlacementEvent::RemovePosition(path.to_path_buf()));
    }
}

#[derive(Debug, Default)]
pub struct RecordingPower {
    next_cookie: AtomicU64,
    active: Mutex<Vec<InhibitCookie>>,
}

impl RecordingPower {
    /// Inhibitions taken so far.
    pub fn inhibit_count(&self) -> u64 {
        self.next_cookie.load(Ordering::SeqCst)
    }

    /// Inhibitions not yet released.
    pub fn active(&self) -> usize {
        lock(&self.active).len()
    }
}

impl PowerManager for RecordingPower {
    fn inhibit(&self, _reason: &str) -> Option<InhibitCookie> {
        let cookie = InhibitCookie(self.next_cookie.fetch_add(1, Ordering::SeqCst) + 1);
        lock(&self.active).push(cookie);
        Some(cookie)
    }

    fn uninhibit(&self, cookie: InhibitCookie) {
        lock(&self.active).retain(|c| *c != cookie);
    }
}

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notifications: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn notifications(&self) -> Vec<Notification> {
        lock(&self.notifications).clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        lock(&self.notifications).push(notification);
    }
}

#[derive(Debug, Default)]
pub struct RecordingListener {
    pub titles: Vec<(JobId, String)>,
    pub rows: Vec<(JobId, RowState)>,
    pub started: Vec<JobId>,
    pub statuses: Vec<(JobId, String)>,
    pub details: Vec<(JobId, String)>,
    pub progress: Vec<(JobId, ProgressValue)>,
    pub finished: Vec<JobId>,
}

impl ProgressListener for RecordingListener {
    fn on_row_added(&mut self, job: JobId, title: &str) {
        self.titles.push((job, title.to_string()));
    }

    fn on_row_state(&mut self, job: JobId, state: RowState) {
        self.rows.push((job, state));
    }

    fn on_started(&mut self, job: JobId) {
        self.started.push(job);
    }

    fn on_status(&mut self, job: JobId, status: &str) {
        self.statuses.push((job, status.to_string()));
    }

    fn on_details(&mut self, job: JobId, details: &str) {
        self.details.push((job, details.to_string()));
    }

    fn on_progress(&mut self, job: JobId, progress: ProgressValue) {
        self.progress.push((job, progress));
    }

    fn on_finished(&mut self, job: JobId, _outcome: &JobOutcome) {
        self.finished.push(job);
    }
}

/// A scheduler over a `MemoryBackend` with every collaborator recording.
pub struct Harness {
    pub backend: Arc<MemoryBackend>,
    pub presenter: ScriptedPresenter,
    pub listener: RecordingListener,
    pub ledger: Arc<RecordingLedger>,
    pub placement: Arc<RecordingPlacement>,
    pub notifier: Arc<RecordingNotifier>,
    pub power: Arc<RecordingPower>,
    pub scheduler: Scheduler,
    ui_loop: UiLoop,
}

impl Harness {
    pub fn new(backend: MemoryBackend) -> Self {
        Self::with_config(backend, EngineConfig::default())
    }

    pub fn with_config(backend: MemoryBackend, config: EngineConfig) -> Self {
        let backend = Arc::new(backend);
        let ledger = Arc::new(RecordingLedger::default());
        let placement = Arc::new(RecordingPlacement::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let power = Arc::new(RecordingPower::default());
        let services = Services::new(backend.clone())
            .with_undo(ledger.clone())
            .with_placement(placement.clone())
            .with_notifier(notifier.clone())
            .with_power(power.clone());
        let (scheduler, ui_loop) = Scheduler::new(config, services);

        Harness {
            backend,
            presenter: ScriptedPresenter::new(),
            listener: RecordingListener::default(),
            ledger,
            placement,
            notifier,
            power,
            scheduler,
            ui_loop,
        }
    }

    /// Run `request` to completion. `None` if it was rejected.
    pub fn run(&mut self, request: JobRequest) -> Option<JobOutcome> {
        let slot: Arc<Mutex<Option<JobOutcome>>> = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&slot);
        self.scheduler
            .submit_with_callback(request, move |outcome| {
                *lock(&sink) = Some(outcome.clone());
            })
            .ok()?;
        self.ui_loop.run_until_idle(&mut self.presenter, &mut self.listener);
        let outcome = lock(&slot).take();
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_semantics_follow_backend_contract() {
        let backend = MemoryBackend::new();
        backend.add_file("/a/file", b"x");
        backend.add_dir("/a/dir");
        backend.add_dir("/b/dir");
        let mut noop = |_: u64, _: u64| {};
        let plain = TransferFlags::default();
        let overwrite = TransferFlags {
            overwrite: true,
            ..TransferFlags::default()
        };

        let kind = |r: BackendResult<()>| r.err().map(|e| e.kind);
        assert_eq!(kind(backend.copy_file(Path::new("/a/dir"), Path::new("/b/dir"), plain, &mut noop)), Some(ErrorKind::Exists));
        assert_eq!(
            kind(backend.copy_file(Path::new("/a/dir"), Path::new("/b/dir"), overwrite, &mut noop)),
            Some(ErrorKind::WouldMerge)
        );
        assert_eq!(
            kind(backend.copy_file(Path::new("/a/dir"), Path::new("/b/new"), plain, &mut noop)),
            Some(ErrorKind::WouldRecurse)
        );
        assert_eq!(
            kind(backend.copy_file(Path::new("/a/file"), Path::new("/b/dir"), overwrite, &mut noop)),
            Some(ErrorKind::IsDirectory)
        );
        assert_eq!(kind(backend.copy_file(Path::new("/a/file"), Path::new("/b/file"), plain, &mut noop)), None);
    }

    #[test]
    fn test_cross_filesystem_move() {
        let backend = MemoryBackend::new();
        backend.add_file("/a/file", b"x");
        backend.add_dir("/a/dir");
        backend.add_dir("/mnt");
        backend.set_filesystem(
            "/mnt",
            FilesystemInfo {
                id: Some("mnt".into()),
                ..FilesystemInfo::default()
            },
        );
        let no_fallback = TransferFlags {
            no_fallback_for_move: true,
            ..TransferFlags::default()
        };

        let err = backend
            .move_item(Path::new("/a/file"), Path::new("/mnt/file"), no_fallback)
            .expect_err("no atomic move across filesystems");
        assert_eq!(err.kind, ErrorKind::NotSupported);
        let err = backend
            .move_item(Path::new("/a/dir"), Path::new("/mnt/dir"), TransferFlags::default())
            .expect_err("directories are not copied");
        assert_eq!(err.kind, ErrorKind::WouldRecurse);

        backend
            .move_item(Path::new("/a/file"), Path::new("/mnt/file"), TransferFlags::default())
            .expect("Failed to move file");
        assert!(backend.exists("/mnt/file"));
        assert!(!backend.exists("/a/file"));
    }

    #[test]
    fn test_fail_once_fires_once() {
        let backend = MemoryBackend::new();
        backend.add_file("/f", b"");
        backend.fail_once(Op::Stat, "/f", ErrorKind::PermissionDenied);
        assert!(backend.stat(Path::new("/f")).is_err());
        assert!(backend.stat(Path::new("/f")).is_ok());
        assert_eq!(backend.calls_of(Op::Stat).len(), 2);
        assert_eq!(backend.mutation_count(), 0);
    }

    #[test]
    fn test_trash_moves_into_trash_root() {
        let backend = MemoryBackend::new();
        backend.add_file("/a/x", b"1");
        backend.add_file("/b/x", b"2");
        backend.trash(Path::new("/a/x")).expect("Failed to trash");
        backend.trash(Path::new("/b/x")).expect("Failed to trash");
        assert_eq!(
            backend.children("/.Trash"),
            vec![PathBuf::from("/.Trash/x"), PathBuf::from("/.Trash/x.2")]
        );
    }

    #[test]
    fn test_scripted_presenter_cancels_when_unscripted() {
        let mut presenter = ScriptedPresenter::new();
        let request = MessageRequest {
            kind: crate::dialog::MessageKind::Error,
            primary: "p".into(),
            secondary: "s".into(),
            detail: None,
            buttons: vec!["Cancel".into(), "Skip".into()],
        };
        presenter.push_button("Skip");
        assert_eq!(presenter.show_message(&request), 1);
        assert_eq!(presenter.show_message(&request), 2);
        assert_eq!(presenter.messages.len(), 2);
    }
}
