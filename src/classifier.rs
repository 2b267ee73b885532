//! Decides which category an item belongs to.
//!
//! Classification looks at names only, never at file contents. The order in
//! which categories are tried is an explicit input: an extension can be
//! registered under several categories (`.png` is both an image and an
//! overlay in the media table) and the first active match in `priority`
//! wins.

use crate::category::{CategoryId, CategorySet, ItemKind};

/// Returns the lowercase suffix of a file name, including the dot.
///
/// The suffix starts at the last `.`. Dots that only lead the name
/// (`.bashrc`, `..hidden`) do not start a suffix.
///
/// ```
/// use shelver::classifier::file_suffix;
///
/// assert_eq!(file_suffix("Clip.MP4"), ".mp4");
/// assert_eq!(file_suffix("backup.tar.gz"), ".gz");
/// assert_eq!(file_suffix("README"), "");
/// assert_eq!(file_suffix(".bashrc"), "");
/// ```
pub fn file_suffix(name: &str) -> String {
    let stem_start = name.len() - name.trim_start_matches('.').len();
    match name[stem_start..].rfind('.') {
        Some(idx) => name[stem_start + idx..].to_lowercase(),
        None => String::new(),
    }
}

/// Classifies an item by name.
///
/// Files match the first active extension category in `priority` whose
/// table contains the item's suffix. Folders match the first active keyword
/// category in `priority` with a keyword contained in the lowercased name;
/// when none does, the set's catch-all category is returned if it has one.
///
/// Identifiers in `priority` that the set does not know are ignored.
/// Categories missing from `priority` are never considered, except the
/// catch-all: it applies to any unmatched folder whether listed or not.
pub fn classify(
    item_name: &str,
    kind: ItemKind,
    categories: &CategorySet,
    priority: &[CategoryId],
) -> Option<CategoryId> {
    let candidates = priority
        .iter()
        .filter_map(|id| categories.get(id))
        .filter(|c| c.kind() == kind && categories.is_active(c.id()));

    match kind {
        ItemKind::File => {
            let suffix = file_suffix(item_name);
            if suffix.is_empty() {
                return None;
            }
            candidates
                .into_iter()
                .find(|c| c.matches_suffix(&suffix))
                .map(|c| c.id().to_string())
        }
        ItemKind::Folder => {
            let lowered = item_name.to_lowercase();
            candidates
                .into_iter()
                .find(|c| c.matches_folder_name(&lowered))
                .or_else(|| categories.catch_all())
                .map(|c| c.id().to_string())
        }
    }
}
