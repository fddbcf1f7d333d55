//! fileops - Command-line front-end for the file operations engine.
//!
//! Runs one job per invocation. Dialogs become numbered menus on stdin
//! and progress is drawn on stderr.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use engine::{
    format_bytes, format_duration, ConflictAction, ConflictRequest, ConflictResponse, CreateKind, CreateRequest,
    DialogPresenter, EngineConfig, JobId, JobOutcome, JobRequest, LocalBackend, MessageRequest, Notification,
    Notifier, PermissionChange, ProgressListener, ProgressValue, Scheduler, Services, TransferRequest,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// fileops - copy, move, delete and otherwise manage files
#[derive(Parser, Debug)]
#[command(name = "fileops")]
#[command(version = "0.1.0")]
#[command(about = "Run file operations with progress and conflict dialogs")]
struct Args {
    /// JSON engine configuration
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Trash directory to use instead of the user's trash
    #[arg(long, value_name = "DIR", global = true)]
    trash_dir: Option<PathBuf>,

    /// Answer every prompt with its first non-cancel choice
    #[arg(long, short = 'y', global = true)]
    yes: bool,

    /// Enable verbose output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Copy items into a directory
    Copy {
        #[arg(required = true, value_name = "SRC")]
        sources: Vec<PathBuf>,
        #[arg(long, value_name = "DIR")]
        to: PathBuf,
    },
    /// Move items into a directory
    Move {
        #[arg(required = true, value_name = "SRC")]
        sources: Vec<PathBuf>,
        #[arg(long, value_name = "DIR")]
        to: PathBuf,
    },
    /// Copy items next to themselves
    Duplicate {
        #[arg(required = true, value_name = "SRC")]
        sources: Vec<PathBuf>,
    },
    /// Create symbolic links to items in a directory
    Link {
        #[arg(required = true, value_name = "SRC")]
        sources: Vec<PathBuf>,
        #[arg(long, value_name = "DIR")]
        to: PathBuf,
    },
    /// Delete items permanently
    Delete {
        #[arg(required = true, value_name = "PATH")]
        paths: Vec<PathBuf>,
    },
    /// Move items to the trash
    Trash {
        #[arg(required = true, value_name = "PATH")]
        paths: Vec<PathBuf>,
    },
    /// Permanently delete everything in the trash
    EmptyTrash,
    /// Create a new folder
    Mkdir {
        dir: PathBuf,
        #[arg(long)]
        name: Option<String>,
    },
    /// Create a new file, optionally from a template
    Touch {
        dir: PathBuf,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, value_name = "FILE")]
        template: Option<PathBuf>,
    },
    /// Change permissions recursively (octal modes)
    Chmod {
        root: PathBuf,
        #[arg(long, value_parser = parse_mode, default_value = "0")]
        file_mode: u32,
        #[arg(long, value_parser = parse_mode, default_value = "0")]
        file_mask: u32,
        #[arg(long, value_parser = parse_mode, default_value = "0")]
        dir_mode: u32,
        #[arg(long, value_parser = parse_mode, default_value = "0")]
        dir_mask: u32,
    },
    /// Mark a desktop launcher as trusted
    Trust { file: PathBuf },
}

fn parse_mode(s: &str) -> Result<u32, String> {
    let mode = u32::from_str_radix(s.trim_start_matches("0o"), 8).map_err(|_| format!("'{}' is not an octal mode", s))?;
    if mode > 0o7777 {
        return Err(format!("mode {:o} is out of range", mode));
    }
    Ok(mode)
}

/// Dialogs as numbered menus on stdin.
struct StdinPresenter {
    assume_yes: bool,
}

impl StdinPresenter {
    fn read_line() -> Option<String> {
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim().to_string()),
        }
    }

    /// Index of the chosen entry, or `None` on end of input.
    fn choose(labels: &[&str]) -> Option<usize> {
        loop {
            for (i, label) in labels.iter().enumerate() {
                eprintln!("  {}) {}", i + 1, label);
            }
            eprint!("Choice: ");
            let _ = io::stderr().flush();

            let line = Self::read_line()?;
            match line.parse::<usize>() {
                Ok(n) if n >= 1 && n <= labels.len() => return Some(n - 1),
                _ => eprintln!("Please enter a number between 1 and {}", labels.len()),
            }
        }
    }
}

impl DialogPresenter for StdinPresenter {
    fn show_message(&mut self, request: &MessageRequest) -> usize {
        eprintln!();
        eprintln!("{}", request.primary);
        if !request.secondary.is_empty() {
            eprintln!("{}", request.secondary);
        }
        if let Some(detail) = &request.detail {
            eprintln!("  ({})", detail);
        }

        if self.assume_yes {
            let index = request.buttons.iter().position(|b| b != "Cancel").unwrap_or(0);
            debug!("Answering {:?} with {:?}", request.primary, request.buttons.get(index));
            return index;
        }
        let labels: Vec<&str> = request.buttons.iter().map(String::as_str).collect();
        Self::choose(&labels).unwrap_or(request.buttons.len())
    }

    fn show_conflict(&mut self, request: &ConflictRequest) -> ConflictResponse {
        let what = if request.is_merge { "A folder" } else { "An item" };
        eprintln!();
        eprintln!(
            "{} named \"{}\" already exists in \"{}\".",
            what,
            request.destination.name(),
            request.dest_dir.display()
        );
        eprintln!(
            "  Original: {}   Replacement: {}",
            format_bytes(request.destination.size),
            format_bytes(request.source.size)
        );

        if self.assume_yes {
            return ConflictResponse::new(ConflictAction::Skip);
        }
        let (replace, replace_all) = if request.is_merge {
            ("Merge", "Merge All")
        } else {
            ("Replace", "Replace All")
        };
        let labels = ["Cancel", "Skip", replace, "Rename", "Skip All", replace_all];
        match Self::choose(&labels) {
            Some(1) => ConflictResponse::new(ConflictAction::Skip),
            Some(2) => ConflictResponse::new(ConflictAction::Overwrite),
            Some(3) => {
                eprint!("New name: ");
                let _ = io::stderr().flush();
                match Self::read_line() {
                    Some(name) if !name.is_empty() => ConflictResponse::rename(name),
                    _ => ConflictResponse::new(ConflictAction::Cancel),
                }
            }
            Some(4) => ConflictResponse::new(ConflictAction::Skip).for_all(),
            Some(5) => ConflictResponse::new(ConflictAction::Overwrite).for_all(),
            _ => ConflictResponse::new(ConflictAction::Cancel),
        }
    }
}

/// Progress bar and status lines on stderr.
struct CliProgress {
    verbose: bool,
    start_time: Instant,
    last_progress_update: Option<Instant>,
    status: String,
    details: String,
}

impl CliProgress {
    fn new(verbose: bool) -> Self {
        CliProgress {
            verbose,
            start_time: Instant::now(),
            last_progress_update: None,
            status: String::new(),
            details: String::new(),
        }
    }

    fn print_progress_bar(percent: u32) -> String {
        let filled = (percent.min(100) / 5) as usize;
        let empty = 20 - filled;
        format!("[{}{}] {}%", "=".repeat(filled), " ".repeat(empty), percent)
    }
}

impl ProgressListener for CliProgress {
    fn on_row_added(&mut self, _job: JobId, title: &str) {
        info!("{} started", title);
    }

    fn on_status(&mut self, _job: JobId, status: &str) {
        self.status = status.to_string();
        if self.verbose {
            eprintln!("\r{}", status);
        }
    }

    fn on_details(&mut self, _job: JobId, details: &str) {
        self.details = details.to_string();
    }

    fn on_progress(&mut self, _job: JobId, progress: ProgressValue) {
        // Throttle progress updates to avoid spam (max once per 200ms)
        if let Some(last) = self.last_progress_update {
            if last.elapsed() < Duration::from_millis(200) {
                return;
            }
        }
        self.last_progress_update = Some(Instant::now());

        match progress {
            ProgressValue::Fraction(fraction) => {
                let percent = (fraction * 100.0) as u32;
                eprint!("\rProgress: {} | {}", Self::print_progress_bar(percent), self.details);
            }
            ProgressValue::Indeterminate => eprint!("\r{}...", self.status),
        }
        let _ = io::stderr().flush();
    }

    fn on_finished(&mut self, _job: JobId, outcome: &JobOutcome) {
        eprintln!();
        if outcome.is_cancelled() {
            eprintln!("Cancelled.");
        } else {
            eprintln!("Done!");
        }

        eprintln!(
            "Summary: {} items processed, {} skipped",
            outcome.transfer_info.num_files,
            outcome.skipped.len()
        );
        if outcome.transfer_info.num_bytes > 0 {
            eprintln!("Bytes copied: {}", format_bytes(outcome.transfer_info.num_bytes));
        }
        if let Some(created) = &outcome.created {
            eprintln!("Created: {}", created.display());
        }
        eprintln!("Elapsed: {}", format_duration(self.start_time.elapsed()));

        if !outcome.skipped.is_empty() {
            eprintln!();
            eprintln!("Skipped items:");
            for error in &outcome.skipped {
                eprintln!("  {}", error);
            }
        }
    }
}

/// Desktop notifications become stderr lines.
struct CliNotifier;

impl Notifier for CliNotifier {
    fn notify(&self, notification: Notification) {
        match notification {
            Notification::OperationComplete { title, body } => eprintln!("{}: {}", title, body),
            Notification::SafeToRemove { name } => eprintln!("{} can be safely removed", name),
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

/// Parse and validate command-line arguments, then run the job
fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    let exit_code = match run_cli(&args) {
        Ok(outcome) if outcome.is_cancelled() || !outcome.skipped.is_empty() => 1,
        Ok(_) => 0,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            2
        }
    };

    std::process::exit(exit_code);
}

fn require_existing(paths: &[PathBuf]) -> Result<(), String> {
    for path in paths {
        if path.symlink_metadata().is_err() {
            return Err(format!("No such file or directory: {}", path.display()));
        }
    }
    Ok(())
}

fn require_dir(path: &Path) -> Result<(), String> {
    if !path.is_dir() {
        return Err(format!("Not a directory: {}", path.display()));
    }
    Ok(())
}

/// Turn the subcommand into a job request, rejecting bad paths up front.
fn build_request(command: &Command) -> Result<JobRequest, String> {
    let request = match command {
        Command::Copy { sources, to } | Command::Move { sources, to } | Command::Link { sources, to } => {
            require_existing(sources)?;
            require_dir(to)?;
            let transfer = TransferRequest::new(sources.clone(), to.clone());
            match command {
                Command::Copy { .. } => JobRequest::Copy(transfer),
                Command::Move { .. } => JobRequest::Move(transfer),
                _ => JobRequest::Link(transfer),
            }
        }
        Command::Duplicate { sources } => {
            require_existing(sources)?;
            JobRequest::Duplicate {
                sources: sources.clone(),
                positions: Default::default(),
            }
        }
        Command::Delete { paths } => {
            require_existing(paths)?;
            JobRequest::Delete { paths: paths.clone() }
        }
        Command::Trash { paths } => {
            require_existing(paths)?;
            JobRequest::Trash { paths: paths.clone() }
        }
        Command::EmptyTrash => JobRequest::EmptyTrash { confirm: true },
        Command::Mkdir { dir, name } => {
            require_dir(dir)?;
            JobRequest::Create(CreateRequest {
                parent: dir.clone(),
                name: name.clone(),
                kind: CreateKind::Folder,
                position: None,
            })
        }
        Command::Touch { dir, name, template } => {
            require_dir(dir)?;
            let kind = match template {
                Some(template) => {
                    require_existing(std::slice::from_ref(template))?;
                    CreateKind::FromTemplate(template.clone())
                }
                None => CreateKind::File { contents: None },
            };
            JobRequest::Create(CreateRequest {
                parent: dir.clone(),
                name: name.clone(),
                kind,
                position: None,
            })
        }
        Command::Chmod {
            root,
            file_mode,
            file_mask,
            dir_mode,
            dir_mask,
        } => {
            require_existing(std::slice::from_ref(root))?;
            JobRequest::SetPermissions {
                root: root.clone(),
                change: PermissionChange {
                    file_permissions: *file_mode,
                    file_mask: *file_mask | *file_mode,
                    dir_permissions: *dir_mode,
                    dir_mask: *dir_mask | *dir_mode,
                },
            }
        }
        Command::Trust { file } => {
            require_existing(std::slice::from_ref(file))?;
            JobRequest::MarkTrusted {
                path: file.clone(),
                interactive: true,
            }
        }
    };
    Ok(request)
}

/// Main CLI logic - separated for testability
fn run_cli(args: &Args) -> Result<JobOutcome, String> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::load_from(path).map_err(|e| e.to_string())?,
        None => EngineConfig::default(),
    };
    if let Some(dir) = &args.trash_dir {
        config.trash_dir = Some(dir.clone());
    }

    let request = build_request(&args.command)?;

    let backend = match &config.trash_dir {
        Some(dir) => LocalBackend::with_trash_dir(dir),
        None => LocalBackend::new(),
    };
    debug!("Using trash directory {}", backend.trash_root().display());
    let services = Services::new(Arc::new(backend)).with_notifier(Arc::new(CliNotifier));
    let (scheduler, mut ui_loop) = Scheduler::new(config, services);

    let outcome: Arc<Mutex<Option<JobOutcome>>> = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&outcome);
    scheduler
        .submit_with_callback(request, move |o| {
            *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(o.clone());
        })
        .map_err(|e| e.to_string())?;

    let mut presenter = StdinPresenter { assume_yes: args.yes };
    let mut progress = CliProgress::new(args.verbose);
    ui_loop.run_until_idle(&mut presenter, &mut progress);

    let result = outcome.lock().unwrap_or_else(PoisonError::into_inner).take();
    result.ok_or_else(|| "Job finished without reporting an outcome".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn args(trash: &TempDir, command: Command) -> Args {
        Args {
            config: None,
            trash_dir: Some(trash.path().join("Trash")),
            yes: true,
            verbose: false,
            command,
        }
    }

    #[test]
    fn test_cli_copies_into_directory() {
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let dst_dir = TempDir::new().expect("Failed to create temp dir");
        let trash = TempDir::new().expect("Failed to create temp dir");
        let file = src_dir.path().join("test.txt");
        std::fs::write(&file, "hello").expect("Failed to write file");

        let outcome = run_cli(&args(
            &trash,
            Command::Copy {
                sources: vec![file],
                to: dst_dir.path().to_path_buf(),
            },
        ))
        .expect("CLI should succeed with valid paths");

        assert!(!outcome.is_cancelled());
        let copied = std::fs::read_to_string(dst_dir.path().join("test.txt")).expect("Failed to read copy");
        assert_eq!(copied, "hello");
    }

    #[test]
    fn test_cli_conflict_is_skipped_with_yes() {
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let dst_dir = TempDir::new().expect("Failed to create temp dir");
        let trash = TempDir::new().expect("Failed to create temp dir");
        let file = src_dir.path().join("test.txt");
        std::fs::write(&file, "new").expect("Failed to write file");
        std::fs::write(dst_dir.path().join("test.txt"), "old").expect("Failed to write file");

        let outcome = run_cli(&args(
            &trash,
            Command::Copy {
                sources: vec![file],
                to: dst_dir.path().to_path_buf(),
            },
        ))
        .expect("CLI should run");

        assert!(!outcome.is_cancelled());
        let kept = std::fs::read_to_string(dst_dir.path().join("test.txt")).expect("Failed to read file");
        assert_eq!(kept, "old");
    }

    #[test]
    fn test_cli_mkdir_uses_default_name() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let trash = TempDir::new().expect("Failed to create temp dir");

        let outcome = run_cli(&args(
            &trash,
            Command::Mkdir {
                dir: dir.path().to_path_buf(),
                name: None,
            },
        ))
        .expect("CLI should succeed");

        assert_eq!(outcome.created, Some(dir.path().join("Untitled Folder")));
        assert!(dir.path().join("Untitled Folder").is_dir());
    }

    #[test]
    fn test_cli_trash_then_delete_is_confirmed_by_yes() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let trash = TempDir::new().expect("Failed to create temp dir");
        let file = dir.path().join("junk.txt");
        std::fs::write(&file, "junk").expect("Failed to write file");

        let outcome = run_cli(&args(&trash, Command::Trash { paths: vec![file.clone()] })).expect("CLI should run");
        assert!(!outcome.is_cancelled());
        assert!(!file.exists());

        let other = dir.path().join("other.txt");
        std::fs::write(&other, "x").expect("Failed to write file");
        let outcome = run_cli(&args(&trash, Command::Delete { paths: vec![other.clone()] })).expect("CLI should run");
        assert!(!outcome.is_cancelled());
        assert!(!other.exists());
    }

    #[test]
    fn test_cli_rejects_missing_source() {
        let dst_dir = TempDir::new().expect("Failed to create temp dir");
        let trash = TempDir::new().expect("Failed to create temp dir");

        let result = run_cli(&args(
            &trash,
            Command::Copy {
                sources: vec![PathBuf::from("/nonexistent/path")],
                to: dst_dir.path().to_path_buf(),
            },
        ));
        assert!(result.is_err(), "CLI should reject missing source");
    }

    #[test]
    fn test_cli_rejects_file_destination() {
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let trash = TempDir::new().expect("Failed to create temp dir");
        let file = src_dir.path().join("a.txt");
        std::fs::write(&file, "a").expect("Failed to write file");

        let result = run_cli(&args(
            &trash,
            Command::Move {
                sources: vec![file.clone()],
                to: file,
            },
        ));
        assert!(result.is_err(), "CLI should reject a file as destination");
    }

    #[test]
    fn test_cli_rejects_bad_config() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let trash = TempDir::new().expect("Failed to create temp dir");
        let config = dir.path().join("config.json");
        std::fs::write(&config, "{ not json").expect("Failed to write config");

        let mut args = args(&trash, Command::EmptyTrash);
        args.config = Some(config);
        assert!(run_cli(&args).is_err(), "CLI should reject a malformed config");
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!(parse_mode("755"), Ok(0o755));
        assert_eq!(parse_mode("0o644"), Ok(0o644));
        assert!(parse_mode("9").is_err());
        assert!(parse_mode("17777").is_err());
    }

    #[test]
    fn test_subcommands_parse() {
        let args = Args::try_parse_from(["fileops", "--yes", "copy", "a", "b", "--to", "dst"]).expect("copy parses");
        assert!(args.yes);
        match args.command {
            Command::Copy { sources, to } => {
                assert_eq!(sources, vec![PathBuf::from("a"), PathBuf::from("b")]);
                assert_eq!(to, PathBuf::from("dst"));
            }
            other => panic!("unexpected command {:?}", other),
        }

        let args = Args::try_parse_from(["fileops", "chmod", "x", "--file-mode", "600", "--file-mask", "777"])
            .expect("chmod parses");
        assert!(matches!(args.command, Command::Chmod { file_mode: 0o600, file_mask: 0o777, .. }));

        assert!(Args::try_parse_from(["fileops", "copy", "a"]).is_err(), "--to is required");
        assert!(Args::try_parse_from(["fileops", "delete"]).is_err(), "paths are required");
    }
}
