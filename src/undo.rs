/// Undo support for reverting batches of moves.
///
/// Every batch that moved at least one item leaves a [`BatchRecord`] in the
/// [`UndoLog`]. Undoing pops the newest record and moves each item back to
/// where it came from.
use crate::error::{RelocateError, UndoError};
use crate::relocate::{MoveRecord, entry_exists, move_entry};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;

/// Number of batches kept when no capacity is configured.
pub const DEFAULT_UNDO_CAPACITY: usize = 10;

/// The moves made by one batch, in the order they happened.
#[derive(Debug, Clone, Serialize)]
pub struct BatchRecord {
    started_at: DateTime<Utc>,
    moves: Vec<MoveRecord>,
}

impl BatchRecord {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            moves: Vec::new(),
        }
    }

    /// Appends a move. If an item with the same name was already recorded,
    /// the newer record replaces it in place.
    pub fn add(&mut self, record: MoveRecord) {
        match self
            .moves
            .iter_mut()
            .find(|m| m.item_name == record.item_name)
        {
            Some(existing) => *existing = record,
            None => self.moves.push(record),
        }
    }

    pub fn get(&self, item_name: &str) -> Option<&MoveRecord> {
        self.moves.iter().find(|m| m.item_name == item_name)
    }

    pub fn moves(&self) -> &[MoveRecord] {
        &self.moves
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }
}

impl Default for BatchRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// The result of undoing one batch.
#[derive(Debug, Default)]
pub struct UndoReport {
    /// Items moved back to their original location.
    pub restored: usize,
    /// Recorded destinations that no longer exist.
    pub missing: Vec<PathBuf>,
    /// Original locations that are occupied by something else now.
    pub conflicts: Vec<PathBuf>,
}

impl UndoReport {
    pub fn skipped(&self) -> usize {
        self.missing.len() + self.conflicts.len()
    }

    /// One-line description for the status area.
    pub fn message(&self) -> String {
        let mut message = format!(
            "Undone: {} item(s) restored to original location.",
            self.restored
        );
        if self.skipped() > 0 {
            message.push_str(&format!(" {} item(s) skipped.", self.skipped()));
        }
        message
    }
}

/// Bounded LIFO of batch records. Pushing past the capacity evicts the
/// oldest record.
#[derive(Debug, Clone)]
pub struct UndoLog {
    records: VecDeque<BatchRecord>,
    capacity: usize,
}

impl UndoLog {
    /// Creates a log holding at most `capacity` batches (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Newest record, without removing it.
    pub fn peek(&self) -> Option<&BatchRecord> {
        self.records.back()
    }

    /// Records from newest to oldest.
    pub fn iter(&self) -> impl Iterator<Item = &BatchRecord> {
        self.records.iter().rev()
    }

    /// Pushes a record. Empty records are ignored.
    pub fn push(&mut self, record: BatchRecord) {
        if record.is_empty() {
            return;
        }
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Reverses the most recent batch.
    ///
    /// Items whose recorded destination is gone, or whose original location
    /// is occupied again, are skipped and counted in the report. Any other
    /// failure discards the whole history, since the remaining records may
    /// no longer describe the filesystem.
    ///
    /// # Errors
    ///
    /// * [`UndoError::NothingToUndo`] if the log is empty. No filesystem
    ///   access happens in that case.
    /// * [`UndoError::Inconsistency`] if a move back fails.
    pub fn undo_last(&mut self) -> Result<UndoReport, UndoError> {
        let record = self.records.pop_back().ok_or(UndoError::NothingToUndo)?;

        match restore_batch(&record) {
            Ok(report) => {
                tracing::info!(
                    restored = report.restored,
                    skipped = report.skipped(),
                    "undo complete"
                );
                Ok(report)
            }
            Err((path, source)) => {
                let discarded = self.records.len();
                self.records.clear();
                tracing::warn!(path = %path.display(), error = %source, discarded, "undo failed, history cleared");
                Err(UndoError::Inconsistency {
                    path,
                    source,
                    discarded,
                })
            }
        }
    }
}

impl Default for UndoLog {
    fn default() -> Self {
        Self::new(DEFAULT_UNDO_CAPACITY)
    }
}

fn restore_batch(record: &BatchRecord) -> Result<UndoReport, (PathBuf, std::io::Error)> {
    let mut report = UndoReport::default();

    for movement in record.moves().iter().rev() {
        if !entry_exists(&movement.destination_path) {
            tracing::debug!(path = %movement.destination_path.display(), "destination gone, skipping");
            report.missing.push(movement.destination_path.clone());
            continue;
        }
        if entry_exists(&movement.original_path) {
            tracing::debug!(path = %movement.original_path.display(), "original location occupied, skipping");
            report.conflicts.push(movement.original_path.clone());
            continue;
        }

        if let Some(parent) = movement.original_path.parent() {
            fs::create_dir_all(parent).map_err(|e| (parent.to_path_buf(), e))?;
        }

        move_entry(&movement.destination_path, &movement.original_path).map_err(|e| match e {
            RelocateError::Io { path, source } => (path, source),
            RelocateError::NameCollision { path } => (
                path,
                std::io::Error::new(std::io::ErrorKind::AlreadyExists, "entry already exists"),
            ),
        })?;
        report.restored += 1;
    }

    Ok(report)
}
