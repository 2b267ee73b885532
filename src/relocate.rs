//! Moves classified items into their category folder.
//!
//! The engine creates `destination_root/<category folder>` on demand, moves
//! the entry there and returns a [`MoveRecord`] describing what happened.
//! It never overwrites an existing entry: collisions are resolved according
//! to a [`CollisionPolicy`]. It does not touch the undo log.

use crate::category::{CategoryId, CategorySet, ItemKind};
use crate::error::RelocateError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use walkdir::WalkDir;

/// One successful relocation. Immutable once created; consumed by undo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveRecord {
    /// Name of the entry as it was found in the source directory.
    pub item_name: String,
    /// Absolute path the entry was moved from.
    pub original_path: PathBuf,
    /// Absolute path the entry was moved to.
    pub destination_path: PathBuf,
    /// Category that matched.
    pub category: CategoryId,
    pub kind: ItemKind,
}

/// What to do when the destination path is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CollisionPolicy {
    /// Leave the item where it is and report the collision.
    #[default]
    Skip,
    /// Move under the first free `name_N.ext`.
    Rename,
    /// Report the collision and stop the batch.
    FailBatch,
}

impl FromStr for CollisionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "rename" => Ok(Self::Rename),
            "fail" | "fail-batch" => Ok(Self::FailBatch),
            other => Err(format!(
                "unknown collision policy '{}': expected skip, rename or fail",
                other
            )),
        }
    }
}

/// Moves `source` into the folder of `category` under `destination_root`.
///
/// # Errors
///
/// * [`RelocateError::NameCollision`] if an entry already exists at the
///   target path and the policy is not [`CollisionPolicy::Rename`].
/// * [`RelocateError::Io`] for any filesystem failure, naming the path that
///   could not be created, read or moved.
///
/// # Examples
///
/// ```no_run
/// use shelver::category::{Category, CategorySet};
/// use shelver::relocate::{relocate, CollisionPolicy};
/// use std::path::Path;
///
/// let mut set = CategorySet::new();
/// set.insert(Category::files("Videos", [".mp4"]));
///
/// let record = relocate(
///     Path::new("/home/me/Downloads/clip.mp4"),
///     Path::new("/home/me/Sorted"),
///     "Videos",
///     &set,
///     CollisionPolicy::Skip,
/// )?;
/// assert_eq!(record.destination_path, Path::new("/home/me/Sorted/Videos/clip.mp4"));
/// # Ok::<(), shelver::error::RelocateError>(())
/// ```
pub fn relocate(
    source: &Path,
    destination_root: &Path,
    category: &str,
    names: &CategorySet,
    policy: CollisionPolicy,
) -> Result<MoveRecord, RelocateError> {
    let metadata = fs::metadata(source).map_err(|e| RelocateError::io(source, e))?;
    let kind = if metadata.is_dir() {
        ItemKind::Folder
    } else {
        ItemKind::File
    };

    let item_name = source
        .file_name()
        .ok_or_else(|| {
            RelocateError::io(
                source,
                io::Error::new(io::ErrorKind::InvalidInput, "path has no name component"),
            )
        })?
        .to_owned();

    let destination_dir = destination_root.join(names.resolve_destination_name(category));
    fs::create_dir_all(&destination_dir).map_err(|e| RelocateError::io(&destination_dir, e))?;

    let mut destination_path = destination_dir.join(&item_name);
    if entry_exists(&destination_path) {
        match policy {
            CollisionPolicy::Rename => destination_path = unique_path(&destination_path)?,
            CollisionPolicy::Skip | CollisionPolicy::FailBatch => {
                return Err(RelocateError::NameCollision {
                    path: destination_path,
                });
            }
        }
    }

    move_entry(source, &destination_path)?;
    tracing::debug!(
        src = %source.display(),
        dest = %destination_path.display(),
        category,
        "moved {}",
        kind
    );

    Ok(MoveRecord {
        item_name: item_name.to_string_lossy().into_owned(),
        original_path: source.to_path_buf(),
        destination_path,
        category: category.to_string(),
        kind,
    })
}

/// True if anything (including a dangling symlink) occupies `path`.
pub(crate) fn entry_exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Renames `from` to `to`, falling back to copy and delete when the two
/// paths are on different filesystems.
pub(crate) fn move_entry(from: &Path, to: &Path) -> Result<(), RelocateError> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            tracing::debug!(error = %e, src = %from.display(), "rename crossed devices, copying instead");
            copy_then_remove(from, to)
        }
        Err(e) => Err(RelocateError::io(from, e)),
    }
}

/// `to` must not exist beforehand. A copy that fails partway is removed so
/// the destination is left as it was.
fn copy_then_remove(from: &Path, to: &Path) -> Result<(), RelocateError> {
    let is_dir = fs::metadata(from).map_err(|e| RelocateError::io(from, e))?.is_dir();
    let copied = if is_dir { copy_tree(from, to) } else { copy_file(from, to) };

    if let Err(e) = copied {
        let cleanup = if is_dir { fs::remove_dir_all(to) } else { fs::remove_file(to) };
        if let Err(cleanup_err) = cleanup
            && entry_exists(to)
        {
            tracing::warn!(path = %to.display(), error = %cleanup_err, "could not remove partial copy");
        }
        return Err(e);
    }

    if is_dir {
        fs::remove_dir_all(from).map_err(|e| RelocateError::io(from, e))
    } else {
        fs::remove_file(from).map_err(|e| RelocateError::io(from, e))
    }
}

fn copy_file(from: &Path, to: &Path) -> Result<(), RelocateError> {
    fs::copy(from, to).map(|_| ()).map_err(|e| RelocateError::io(from, e))
}

fn copy_tree(from: &Path, to: &Path) -> Result<(), RelocateError> {
    for entry in WalkDir::new(from) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(from).to_path_buf();
            RelocateError::io(path, e.into())
        })?;
        let rel = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| RelocateError::io(entry.path(), io::Error::other(e)))?;
        let target = to.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| RelocateError::io(&target, e))?;
        } else {
            copy_file(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// First free `stem_N.ext` next to `path`, N starting at 1.
fn unique_path(path: &Path) -> Result<PathBuf, RelocateError> {
    let parent = path.parent().unwrap_or(Path::new("."));
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "item".to_string());
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();

    for i in 1..10_000 {
        let candidate = if extension.is_empty() {
            parent.join(format!("{}_{}", stem, i))
        } else {
            parent.join(format!("{}_{}.{}", stem, i, extension))
        };
        if !entry_exists(&candidate) {
            return Ok(candidate);
        }
    }

    Err(RelocateError::NameCollision {
        path: path.to_path_buf(),
    })
}
