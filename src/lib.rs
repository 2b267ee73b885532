//! shelver - sort the contents of a directory into category folders
//!
//! This library classifies files by extension and folders by name keywords,
//! moves them into per-category folders under a destination root, and keeps
//! a bounded in-memory history so recent batches can be reverted. Batches run
//! on a worker thread, can be cancelled between items, and report progress
//! through a listener or a channel.

pub mod batch;
pub mod category;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod error;
pub mod output;
pub mod relocate;
pub mod session;
pub mod undo;

pub use batch::{
    BatchEvent, BatchListener, BatchRequest, BatchRun, BatchState, BatchSummary, CancelToken,
    ChannelListener, ItemFailure, Mode, StatusLevel, Unclassified,
};
pub use category::{Category, CategoryId, CategorySet, ItemKind, Preset, sanitize_folder_name};
pub use classifier::classify;
pub use config::{EntryFilter, Settings, ShelverConfig};
pub use error::{ConfigError, PreconditionError, RelocateError, SessionError, UndoError};
pub use relocate::{CollisionPolicy, MoveRecord, relocate};
pub use session::{BatchHandle, Session};
pub use undo::{BatchRecord, UndoLog, UndoReport};

pub use cli::{Cli, run_cli};
