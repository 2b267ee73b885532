//! One organization pass over a source directory.
//!
//! A [`BatchRun`] validates its request, lists the source once, classifies
//! and relocates every entry, and reports what happened through a
//! [`BatchListener`]. Events arrive in a fixed order: progress values in item
//! order, then the unclassified aggregate (only when something was left
//! behind), then exactly one status message, then the terminal event.

use crate::category::{CategoryId, CategorySet, ItemKind};
use crate::classifier::{classify, file_suffix};
use crate::config::{EntryFilter, Settings};
use crate::error::{PreconditionError, RelocateError};
use crate::relocate::{CollisionPolicy, MoveRecord, relocate};
use crate::undo::{BatchRecord, UndoLog};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, mpsc};

/// Which entry kinds a batch looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Files,
    Folders,
    #[default]
    Both,
}

impl Mode {
    pub fn applies_to(&self, kind: ItemKind) -> bool {
        match self {
            Mode::Files => kind == ItemKind::File,
            Mode::Folders => kind == ItemKind::Folder,
            Mode::Both => true,
        }
    }

    fn kinds(&self) -> &'static [ItemKind] {
        match self {
            Mode::Files => &[ItemKind::File],
            Mode::Folders => &[ItemKind::Folder],
            Mode::Both => &[ItemKind::File, ItemKind::Folder],
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "files" | "file" => Ok(Mode::Files),
            "folders" | "folder" => Ok(Mode::Folders),
            "both" | "all" => Ok(Mode::Both),
            other => Err(format!(
                "unknown mode '{}': expected files, folders or both",
                other
            )),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Files => write!(f, "files"),
            Mode::Folders => write!(f, "folders"),
            Mode::Both => write!(f, "both"),
        }
    }
}

/// What the caller asks a batch to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    pub source_dir: PathBuf,
    pub destination_root: PathBuf,
    /// Exactly these categories are active for the run.
    pub active: BTreeSet<CategoryId>,
    pub mode: Mode,
    /// Classification order. Empty means alphabetical over all categories.
    pub priority: Vec<CategoryId>,
}

impl BatchRequest {
    pub fn new(
        source_dir: impl Into<PathBuf>,
        destination_root: impl Into<PathBuf>,
        active: impl IntoIterator<Item = CategoryId>,
    ) -> Self {
        Self {
            source_dir: source_dir.into(),
            destination_root: destination_root.into(),
            active: active.into_iter().collect(),
            mode: Mode::default(),
            priority: Vec::new(),
        }
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_priority(mut self, priority: Vec<CategoryId>) -> Self {
        self.priority = priority;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchState {
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl BatchState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BatchState::Completed | BatchState::Cancelled | BatchState::Failed
        )
    }
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BatchState::Idle => "idle",
            BatchState::Running => "running",
            BatchState::Completed => "completed",
            BatchState::Cancelled => "cancelled",
            BatchState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Info,
    Warning,
    Error,
    Success,
}

/// Cooperative cancellation flag shared between a batch and its caller.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Items a batch left in the source because nothing claimed them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Unclassified {
    /// Lowercase suffixes with their dot; `""` for files without one.
    pub extensions: BTreeSet<String>,
    /// Folder names, as found.
    pub folders: BTreeSet<String>,
}

impl Unclassified {
    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty() && self.folders.is_empty()
    }

    pub fn len(&self) -> usize {
        self.extensions.len() + self.folders.len()
    }

    /// Renders the aggregate for display. At most `limit` names are listed,
    /// extensions first; the rest are summarized as "... and N more".
    pub fn describe(&self, limit: usize) -> String {
        let extensions: Vec<&str> = self
            .extensions
            .iter()
            .map(|e| if e.is_empty() { "(no extension)" } else { e.as_str() })
            .collect();
        let folders: Vec<&str> = self.folders.iter().map(String::as_str).collect();

        let mut lines = vec!["Some items were not categorized:".to_string()];
        let mut budget = limit;
        let mut hidden = 0;
        for (label, items) in [
            ("Uncategorized file extensions", extensions),
            ("Uncategorized folders", folders),
        ] {
            let shown = items.len().min(budget);
            budget -= shown;
            hidden += items.len() - shown;
            if shown > 0 {
                lines.push(format!("{}: {}", label, items[..shown].join(", ")));
            }
        }
        if hidden > 0 {
            lines.push(format!("... and {} more", hidden));
        }
        lines.push("These items remain in the source directory.".to_string());
        lines.join("\n")
    }
}

/// An item the batch tried and failed to move. The item stays where it was.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub item_name: String,
    pub path: PathBuf,
    pub reason: String,
}

/// Everything a finished batch reports.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub state: BatchState,
    pub files_moved: usize,
    pub folders_moved: usize,
    pub processed: usize,
    pub total: usize,
    pub failures: Vec<ItemFailure>,
    pub unclassified: Unclassified,
    pub moves: Vec<MoveRecord>,
    pub message: String,
}

impl BatchSummary {
    pub(crate) fn failed(message: String) -> Self {
        Self {
            state: BatchState::Failed,
            files_moved: 0,
            folders_moved: 0,
            processed: 0,
            total: 0,
            failures: Vec::new(),
            unclassified: Unclassified::default(),
            moves: Vec::new(),
            message,
        }
    }

    pub fn moved(&self) -> usize {
        self.files_moved + self.folders_moved
    }
}

/// Receives batch notifications. Every method defaults to doing nothing.
pub trait BatchListener {
    fn on_progress(&mut self, _percent: u8) {}

    fn on_status(&mut self, _message: &str, _level: StatusLevel) {}

    fn on_unclassified(&mut self, _extensions: &BTreeSet<String>, _folders: &BTreeSet<String>) {}

    fn on_terminal(&mut self, _state: BatchState, _summary: &BatchSummary) {}
}

/// Listener that ignores everything.
impl BatchListener for () {}

/// Channel form of the [`BatchListener`] callbacks.
#[derive(Debug, Clone)]
pub enum BatchEvent {
    Progress(u8),
    Status {
        message: String,
        level: StatusLevel,
    },
    Unclassified {
        extensions: BTreeSet<String>,
        folders: BTreeSet<String>,
    },
    Terminal {
        state: BatchState,
        summary: Box<BatchSummary>,
    },
}

/// Forwards callbacks into an mpsc channel. A dropped receiver is ignored.
#[derive(Debug, Clone)]
pub struct ChannelListener {
    sender: mpsc::Sender<BatchEvent>,
}

impl ChannelListener {
    pub fn new(sender: mpsc::Sender<BatchEvent>) -> Self {
        Self { sender }
    }

    fn send(&self, event: BatchEvent) {
        let _ = self.sender.send(event);
    }
}

impl BatchListener for ChannelListener {
    fn on_progress(&mut self, percent: u8) {
        self.send(BatchEvent::Progress(percent));
    }

    fn on_status(&mut self, message: &str, level: StatusLevel) {
        self.send(BatchEvent::Status {
            message: message.to_string(),
            level,
        });
    }

    fn on_unclassified(&mut self, extensions: &BTreeSet<String>, folders: &BTreeSet<String>) {
        self.send(BatchEvent::Unclassified {
            extensions: extensions.clone(),
            folders: folders.clone(),
        });
    }

    fn on_terminal(&mut self, state: BatchState, summary: &BatchSummary) {
        self.send(BatchEvent::Terminal {
            state,
            summary: Box::new(summary.clone()),
        });
    }
}

struct Entry {
    name: String,
    path: PathBuf,
    kind: ItemKind,
}

/// A single batch over a snapshot of the category set.
pub struct BatchRun {
    request: BatchRequest,
    categories: CategorySet,
    policy: CollisionPolicy,
    clear_undo_on_start: bool,
    filter: EntryFilter,
    state: BatchState,
}

impl BatchRun {
    pub fn new(request: BatchRequest, categories: CategorySet, settings: &Settings) -> Self {
        Self {
            request,
            categories,
            policy: settings.on_collision,
            clear_undo_on_start: settings.clear_undo_on_start,
            filter: EntryFilter::default(),
            state: BatchState::Idle,
        }
    }

    /// Restricts which source entries are considered at all.
    pub fn with_filter(mut self, filter: EntryFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    /// Runs the batch and emits every event, terminal included.
    pub fn run<L>(self, listener: &mut L, cancel: &CancelToken, undo: &Mutex<UndoLog>) -> BatchSummary
    where
        L: BatchListener + ?Sized,
    {
        let summary = self.execute(listener, cancel, undo);
        listener.on_terminal(summary.state, &summary);
        summary
    }

    /// Runs the batch and emits every event except the terminal one.
    ///
    /// A non-empty record of the moves is pushed to `undo` when the batch
    /// completes or is cancelled, never when it fails. With
    /// `clear_undo_on_start`, older records are dropped only once the
    /// preconditions hold and the source has been listed.
    pub fn execute<L>(
        mut self,
        listener: &mut L,
        cancel: &CancelToken,
        undo: &Mutex<UndoLog>,
    ) -> BatchSummary
    where
        L: BatchListener + ?Sized,
    {
        self.state = BatchState::Running;
        tracing::info!(
            source = %self.request.source_dir.display(),
            dest = %self.request.destination_root.display(),
            mode = %self.request.mode,
            "starting organization"
        );

        if let Err(e) = self.check_preconditions() {
            tracing::warn!(error = %e, "batch refused");
            return self.finish_failed(listener, e.to_string());
        }

        let entries = match self.list_entries() {
            Ok(entries) => entries,
            Err(e) => {
                let message = format!("Error organizing items: {}", e);
                return self.finish_failed(listener, message);
            }
        };

        if self.clear_undo_on_start {
            undo.lock().unwrap_or_else(|e| e.into_inner()).clear();
        }

        let priority = if self.request.priority.is_empty() {
            self.categories.default_priority()
        } else {
            self.request.priority.clone()
        };

        let total = entries.len();
        let mut processed = 0;
        let mut record = BatchRecord::new();
        let mut failures = Vec::new();
        let mut unclassified = Unclassified::default();
        let mut fatal: Option<String> = None;
        let mut cancelled = false;

        if total == 0 {
            listener.on_progress(100);
        }

        for entry in &entries {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            match classify(&entry.name, entry.kind, &self.categories, &priority) {
                Some(id) if self.categories.is_active(&id) => {
                    match relocate(
                        &entry.path,
                        &self.request.destination_root,
                        &id,
                        &self.categories,
                        self.policy,
                    ) {
                        Ok(moved) => record.add(moved),
                        Err(e) => {
                            tracing::warn!(item = %entry.name, error = %e, "could not move item");
                            let stop = self.policy == CollisionPolicy::FailBatch
                                && matches!(e, RelocateError::NameCollision { .. });
                            if stop {
                                fatal = Some(format!("Error organizing items: {}", e));
                            }
                            failures.push(ItemFailure {
                                item_name: entry.name.clone(),
                                path: entry.path.clone(),
                                reason: e.to_string(),
                            });
                        }
                    }
                }
                _ => match entry.kind {
                    ItemKind::File => {
                        unclassified.extensions.insert(file_suffix(&entry.name));
                    }
                    ItemKind::Folder => {
                        unclassified.folders.insert(entry.name.clone());
                    }
                },
            }

            processed += 1;
            listener.on_progress((processed * 100 / total) as u8);

            if fatal.is_some() {
                break;
            }
        }

        self.state = if fatal.is_some() {
            BatchState::Failed
        } else if cancelled {
            BatchState::Cancelled
        } else {
            BatchState::Completed
        };

        let moves = record.moves().to_vec();
        let files_moved = moves.iter().filter(|m| m.kind == ItemKind::File).count();
        let folders_moved = moves.len() - files_moved;

        if self.state != BatchState::Failed && !record.is_empty() {
            undo.lock().unwrap_or_else(|e| e.into_inner()).push(record);
        }

        if !unclassified.is_empty() {
            listener.on_unclassified(&unclassified.extensions, &unclassified.folders);
        }

        let (message, level) = match (self.state, fatal) {
            (BatchState::Failed, Some(message)) => (message, StatusLevel::Error),
            (BatchState::Cancelled, _) => (
                "Organization cancelled by user.".to_string(),
                StatusLevel::Warning,
            ),
            _ => {
                let message = completion_message(files_moved, folders_moved, failures.len());
                let level = if failures.is_empty() {
                    StatusLevel::Success
                } else {
                    StatusLevel::Warning
                };
                (message, level)
            }
        };
        listener.on_status(&message, level);

        tracing::info!(
            state = %self.state,
            files_moved,
            folders_moved,
            processed,
            total,
            failures = failures.len(),
            "organization finished"
        );

        BatchSummary {
            state: self.state,
            files_moved,
            folders_moved,
            processed,
            total,
            failures,
            unclassified,
            moves,
            message,
        }
    }

    fn finish_failed<L>(&mut self, listener: &mut L, message: String) -> BatchSummary
    where
        L: BatchListener + ?Sized,
    {
        self.state = BatchState::Failed;
        listener.on_status(&message, StatusLevel::Error);
        BatchSummary::failed(message)
    }

    /// Validates the request and prepares the destination root. Applies the
    /// requested active set to the snapshot.
    fn check_preconditions(&mut self) -> Result<(), PreconditionError> {
        let request = &self.request;
        if request.source_dir.as_os_str().is_empty() {
            return Err(PreconditionError::EmptySource);
        }
        if request.destination_root.as_os_str().is_empty() {
            return Err(PreconditionError::EmptyDestination);
        }
        if !request.source_dir.exists() {
            return Err(PreconditionError::SourceMissing(request.source_dir.clone()));
        }
        if !request.source_dir.is_dir() {
            return Err(PreconditionError::SourceNotDirectory(
                request.source_dir.clone(),
            ));
        }

        self.categories
            .activate_only(request.active.iter().map(String::as_str))
            .map_err(|_| {
                let unknown = request
                    .active
                    .iter()
                    .find(|id| !self.categories.contains(id))
                    .cloned()
                    .unwrap_or_default();
                PreconditionError::UnknownCategory(unknown)
            })?;

        let applicable = request
            .mode
            .kinds()
            .iter()
            .any(|kind| self.categories.has_active_kind(*kind));
        if !applicable {
            return Err(PreconditionError::NoActiveCategories);
        }

        fs::create_dir_all(&request.destination_root).map_err(|source| {
            PreconditionError::DestinationCreate {
                path: request.destination_root.clone(),
                source,
            }
        })
    }

    /// Reads the source once, sorted by name. Entries the filter rejects,
    /// entries outside the mode, the destination root (or an ancestor of
    /// it) and existing category folders under the destination are dropped.
    fn list_entries(&self) -> std::io::Result<Vec<Entry>> {
        let destination = fs::canonicalize(&self.request.destination_root)?;
        let reserved: HashSet<String> = self
            .categories
            .iter()
            .map(|c| self.categories.resolve_destination_name(c.id()))
            .collect();

        let mut entries = Vec::new();
        for dir_entry in fs::read_dir(&self.request.source_dir)? {
            let dir_entry = dir_entry?;
            let name = dir_entry.file_name().to_string_lossy().into_owned();
            let path = dir_entry.path();
            let kind = if path.is_dir() {
                ItemKind::Folder
            } else {
                ItemKind::File
            };

            if !self.filter.allows(&name) || !self.request.mode.applies_to(kind) {
                continue;
            }
            if is_reserved(&path, &name, &destination, &reserved) {
                tracing::debug!(item = %name, "skipping destination folder");
                continue;
            }

            entries.push(Entry { name, path, kind });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

fn is_reserved(path: &Path, name: &str, destination: &Path, reserved: &HashSet<String>) -> bool {
    let Ok(canonical) = fs::canonicalize(path) else {
        return false;
    };
    if destination.starts_with(&canonical) {
        return true;
    }
    canonical.parent() == Some(destination) && reserved.contains(name)
}

fn completion_message(files: usize, folders: usize, failures: usize) -> String {
    let mut message = String::from("Organization complete! ");
    if files == 0 && folders == 0 {
        message.push_str("Nothing needed organizing.");
    } else {
        if files > 0 {
            message.push_str(&format!("{} file(s) ", files));
        }
        if folders > 0 {
            message.push_str(&format!("{} folder(s) ", folders));
        }
        message.push_str("organized successfully!");
    }
    if failures > 0 {
        message.push_str(&format!(" {} item(s) could not be moved.", failures));
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::Preset;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
        progress: Vec<u8>,
        cancel_after: Option<(usize, CancelToken)>,
    }

    impl BatchListener for Recorder {
        fn on_progress(&mut self, percent: u8) {
            self.progress.push(percent);
            self.events.push("progress".into());
            if let Some((k, token)) = &self.cancel_after
                && self.progress.len() == *k
            {
                token.cancel();
            }
        }

        fn on_status(&mut self, message: &str, _level: StatusLevel) {
            self.events.push(format!("status:{}", message));
        }

        fn on_unclassified(&mut self, _e: &BTreeSet<String>, _f: &BTreeSet<String>) {
            self.events.push("unclassified".into());
        }

        fn on_terminal(&mut self, state: BatchState, _summary: &BatchSummary) {
            self.events.push(format!("terminal:{}", state));
        }
    }

    fn media() -> CategorySet {
        Preset::Media.load().unwrap()
    }

    fn active(ids: &[&str]) -> Vec<CategoryId> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn run(request: BatchRequest, listener: &mut Recorder, cancel: &CancelToken) -> (BatchSummary, UndoLog) {
        let undo = Mutex::new(UndoLog::new(10));
        let summary =
            BatchRun::new(request, media(), &Settings::default()).run(listener, cancel, &undo);
        (summary, undo.into_inner().unwrap())
    }

    #[test]
    fn test_videos_only_files_mode() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("in");
        let dest = temp_dir.path().join("out");
        fs::create_dir(&src).unwrap();
        for name in ["a.mp4", "b.txt", "c.unknownext"] {
            fs::write(src.join(name), name).unwrap();
        }

        let request = BatchRequest::new(&src, &dest, active(&["Videos"])).with_mode(Mode::Files);
        let mut recorder = Recorder::default();
        let (summary, undo) = run(request, &mut recorder, &CancelToken::new());

        assert_eq!(summary.state, BatchState::Completed);
        assert_eq!(summary.files_moved, 1);
        assert!(dest.join("Videos").join("a.mp4").is_file());
        assert!(src.join("b.txt").is_file());
        assert_eq!(
            summary.unclassified.extensions,
            BTreeSet::from([".txt".to_string(), ".unknownext".to_string()])
        );
        assert_eq!(undo.len(), 1);
        assert_eq!(recorder.progress, vec![33, 66, 100]);
        assert_eq!(
            &recorder.events[3..],
            &[
                "unclassified".to_string(),
                "status:Organization complete! 1 file(s) organized successfully!".to_string(),
                "terminal:completed".to_string(),
            ]
        );
    }

    #[test]
    fn test_cancel_after_k_items() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("in");
        let dest = temp_dir.path().join("out");
        fs::create_dir(&src).unwrap();
        for i in 0..5 {
            fs::write(src.join(format!("clip{}.mp4", i)), "v").unwrap();
        }

        let cancel = CancelToken::new();
        let mut recorder = Recorder {
            cancel_after: Some((2, cancel.clone())),
            ..Default::default()
        };
        let request = BatchRequest::new(&src, &dest, active(&["Videos"]));
        let (summary, undo) = run(request, &mut recorder, &cancel);

        assert_eq!(summary.state, BatchState::Cancelled);
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.total, 5);
        assert_eq!(fs::read_dir(&src).unwrap().count(), 3);
        assert_eq!(undo.len(), 1);
        assert_eq!(undo.peek().unwrap().len(), 2);
        assert!(recorder
            .events
            .contains(&"status:Organization cancelled by user.".to_string()));
    }

    #[test]
    fn test_empty_source_reports_single_full_progress() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("out");
        let request = BatchRequest::new(temp_dir.path(), &dest, active(&["Videos"]));
        let mut recorder = Recorder::default();
        let (summary, undo) = run(request, &mut recorder, &CancelToken::new());

        assert_eq!(summary.state, BatchState::Completed);
        assert_eq!(summary.total, 0);
        assert_eq!(recorder.progress, vec![100]);
        assert!(undo.is_empty());
    }

    #[test]
    fn test_preconditions_fail_without_side_effects() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("out");

        let cases = [
            BatchRequest::new("", &dest, active(&["Videos"])),
            BatchRequest::new(temp_dir.path(), "", active(&["Videos"])),
            BatchRequest::new(temp_dir.path().join("missing"), &dest, active(&["Videos"])),
            BatchRequest::new(temp_dir.path(), &dest, active(&[])),
            BatchRequest::new(temp_dir.path(), &dest, active(&["Nope"])),
            BatchRequest::new(temp_dir.path(), &dest, active(&["Videos"])).with_mode(Mode::Folders),
        ];

        for request in cases {
            let mut recorder = Recorder::default();
            let (summary, undo) = run(request, &mut recorder, &CancelToken::new());
            assert_eq!(summary.state, BatchState::Failed);
            assert!(recorder.progress.is_empty());
            assert_eq!(recorder.events.len(), 2);
            assert!(undo.is_empty());
            assert!(!dest.exists());
        }
    }

    #[test]
    fn test_destination_inside_source_is_not_organized() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path();
        fs::write(src.join("a.mp4"), "v").unwrap();
        fs::create_dir(src.join("Videos")).unwrap();

        let request = BatchRequest::new(src, src, active(&["Videos"]));
        let (summary, _) = run(request, &mut Recorder::default(), &CancelToken::new());

        assert_eq!(summary.total, 1);
        assert!(src.join("Videos").join("a.mp4").is_file());
        assert!(!src.join("Videos").join("Videos").exists());
    }

    #[test]
    fn test_collision_fail_batch_stops_and_skips_undo() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("in");
        let dest = temp_dir.path().join("out");
        fs::create_dir_all(dest.join("Videos")).unwrap();
        fs::create_dir(&src).unwrap();
        fs::write(src.join("a.mp4"), "new").unwrap();
        fs::write(src.join("b.mp4"), "new").unwrap();
        fs::write(dest.join("Videos").join("b.mp4"), "old").unwrap();
        fs::write(src.join("c.mp4"), "new").unwrap();

        let settings = Settings {
            on_collision: CollisionPolicy::FailBatch,
            ..Settings::default()
        };
        let undo = Mutex::new(UndoLog::new(10));
        let request = BatchRequest::new(&src, &dest, active(&["Videos"]));
        let summary = BatchRun::new(request, media(), &settings).run(
            &mut (),
            &CancelToken::new(),
            &undo,
        );

        assert_eq!(summary.state, BatchState::Failed);
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.moves.len(), 1);
        assert!(src.join("c.mp4").exists());
        assert!(undo.lock().unwrap().is_empty());
    }

    #[test]
    fn test_skip_collision_is_reported_and_batch_continues() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("in");
        let dest = temp_dir.path().join("out");
        fs::create_dir_all(dest.join("Videos")).unwrap();
        fs::create_dir(&src).unwrap();
        fs::write(src.join("a.mp4"), "new").unwrap();
        fs::write(dest.join("Videos").join("a.mp4"), "old").unwrap();
        fs::write(src.join("b.mp4"), "new").unwrap();

        let request = BatchRequest::new(&src, &dest, active(&["Videos"]));
        let (summary, _) = run(request, &mut Recorder::default(), &CancelToken::new());

        assert_eq!(summary.state, BatchState::Completed);
        assert_eq!(summary.files_moved, 1);
        assert_eq!(summary.failures[0].item_name, "a.mp4");
        assert!(summary.message.contains("1 item(s) could not be moved"));
        assert_eq!(fs::read_to_string(dest.join("Videos/a.mp4")).unwrap(), "old");
    }

    #[test]
    fn test_filtered_entries_are_not_counted() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("in");
        fs::create_dir(&src).unwrap();
        fs::write(src.join(".hidden.mp4"), "v").unwrap();
        fs::write(src.join("shown.mp4"), "v").unwrap();

        let filter = EntryFilter::new(&crate::config::FilterRules {
            include_hidden: false,
            exclude: Default::default(),
        })
        .unwrap();
        let undo = Mutex::new(UndoLog::new(10));
        let request = BatchRequest::new(&src, temp_dir.path().join("out"), active(&["Videos"]));
        let summary = BatchRun::new(request, media(), &Settings::default())
            .with_filter(filter)
            .run(&mut (), &CancelToken::new(), &undo);

        assert_eq!(summary.total, 1);
        assert!(src.join(".hidden.mp4").exists());
    }

    #[test]
    fn test_describe_caps_listed_items() {
        let mut unclassified = Unclassified::default();
        unclassified.extensions.insert(String::new());
        for i in 0..25 {
            unclassified.folders.insert(format!("dir{:02}", i));
        }

        let text = unclassified.describe(20);
        assert!(text.contains("(no extension)"));
        assert!(text.contains("dir18"));
        assert!(!text.contains("dir19"));
        assert!(text.contains("... and 6 more"));
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("Files".parse::<Mode>(), Ok(Mode::Files));
        assert_eq!("both".parse::<Mode>(), Ok(Mode::Both));
        assert!("everything".parse::<Mode>().is_err());
        assert!(Mode::Folders.applies_to(ItemKind::Folder));
        assert!(!Mode::Folders.applies_to(ItemKind::File));
    }
}
