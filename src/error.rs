//! Error types for shelver.
//!
//! Each layer has its own enum so callers can tell a precondition problem
//! (nothing happened) from a per-item failure (the batch kept going) or an
//! undo problem (history was discarded).

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading configuration or category tables.
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Invalid glob pattern '{0}': expected *.ext or dir/**")]
    InvalidGlob(String),

    #[error("Invalid regex pattern '{pattern}': {reason}")]
    InvalidRegex { pattern: String, reason: String },

    #[error("IO error reading configuration: {0}")]
    Io(String),

    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    #[error("Category defined twice: {0}")]
    DuplicateCategory(String),
}

/// Reasons a batch refuses to start. No filesystem change has happened when
/// one of these is reported.
#[derive(Error, Debug)]
pub enum PreconditionError {
    #[error("Please select a source folder.")]
    EmptySource,

    #[error("Please select a destination folder.")]
    EmptyDestination,

    #[error("Source directory does not exist: {}", .0.display())]
    SourceMissing(PathBuf),

    #[error("Source is not a directory: {}", .0.display())]
    SourceNotDirectory(PathBuf),

    #[error("Please select at least one category to organize.")]
    NoActiveCategories,

    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    #[error("Error creating destination directory {}: {source}", path.display())]
    DestinationCreate {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Errors produced by relocating a single item.
#[derive(Error, Debug)]
pub enum RelocateError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("an entry already exists at {}", path.display())]
    NameCollision { path: PathBuf },
}

impl RelocateError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The path the failure is about.
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::Io { path, .. } | Self::NameCollision { path } => path,
        }
    }
}

/// Errors returned by the undo operation.
#[derive(Error, Debug)]
pub enum UndoError {
    #[error("Nothing to undo.")]
    NothingToUndo,

    #[error("Cannot undo while an organization is running.")]
    BatchRunning,

    #[error(
        "Error undoing last action at {}: {source}. Undo history was cleared ({discarded} batch(es) discarded).",
        path.display()
    )]
    Inconsistency {
        path: PathBuf,
        source: std::io::Error,
        discarded: usize,
    },
}

/// Errors from the session API.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("An organization is already running.")]
    BatchInProgress,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to start worker thread: {0}")]
    Spawn(#[source] std::io::Error),
}
