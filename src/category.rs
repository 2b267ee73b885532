//! Category registry: the tables that decide where things go.
//!
//! A category maps to a set of file extensions (for files) or to a set of
//! keyword substrings (for folders). Each category also has a destination
//! folder name, which defaults to its identifier and can be overridden.
//!
//! Tables are data: the built-in presets are TOML documents embedded in the
//! binary and parsed with the same code that reads user configuration.
//!
//! # Examples
//!
//! ```
//! use shelver::category::{Category, CategorySet};
//!
//! let mut set = CategorySet::new();
//! set.insert(Category::files("Videos", [".mp4", "MKV"]));
//! set.set_override("Videos", "My: Videos").unwrap();
//! assert_eq!(set.resolve_destination_name("Videos"), "My_ Videos");
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

/// Identifier of a category, unique within a [`CategorySet`].
pub type CategoryId = String;

/// Characters that are replaced by `_` in destination folder names.
pub const ILLEGAL_NAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// The kind of a directory entry being organized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    File,
    Folder,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKind::File => write!(f, "file"),
            ItemKind::Folder => write!(f, "folder"),
        }
    }
}

/// What a category matches against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher {
    /// Lowercase file suffixes, each starting with `.`.
    Extensions(Vec<String>),
    /// Lowercase substrings searched for in folder names.
    Keywords(Vec<String>),
}

/// A single category definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    id: CategoryId,
    matcher: Matcher,
    catch_all: bool,
}

impl Category {
    /// Creates a file category. Extensions are lowercased and given a
    /// leading `.` when it is missing; duplicates keep their first position.
    pub fn files<I, S>(id: impl Into<String>, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = dedup(extensions.into_iter().filter_map(|ext| {
            let ext = ext.as_ref().trim().to_lowercase();
            match ext.as_str() {
                "" | "." => None,
                _ if ext.starts_with('.') => Some(ext),
                _ => Some(format!(".{}", ext)),
            }
        }));

        Self {
            id: id.into(),
            matcher: Matcher::Extensions(extensions),
            catch_all: false,
        }
    }

    /// Creates a folder category matched by lowercase keyword substrings.
    pub fn folders<I, S>(id: impl Into<String>, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = dedup(
            keywords
                .into_iter()
                .map(|kw| kw.as_ref().trim().to_lowercase())
                .filter(|kw| !kw.is_empty()),
        );

        Self {
            id: id.into(),
            matcher: Matcher::Keywords(keywords),
            catch_all: false,
        }
    }

    /// Creates the reserved folder category that receives folders no
    /// keyword matched. It is never matched directly.
    pub fn folder_catch_all(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            matcher: Matcher::Keywords(Vec::new()),
            catch_all: true,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    pub fn is_catch_all(&self) -> bool {
        self.catch_all
    }

    /// The kind of item this category organizes.
    pub fn kind(&self) -> ItemKind {
        match self.matcher {
            Matcher::Extensions(_) => ItemKind::File,
            Matcher::Keywords(_) => ItemKind::Folder,
        }
    }

    /// Returns true if `suffix` (lowercase, with leading dot) is registered.
    pub fn matches_suffix(&self, suffix: &str) -> bool {
        match &self.matcher {
            Matcher::Extensions(exts) => exts.iter().any(|e| e == suffix),
            Matcher::Keywords(_) => false,
        }
    }

    /// Returns true if any keyword occurs in `lowercase_name`.
    /// The catch-all never matches.
    pub fn matches_folder_name(&self, lowercase_name: &str) -> bool {
        match &self.matcher {
            Matcher::Keywords(keywords) if !self.catch_all => {
                keywords.iter().any(|kw| lowercase_name.contains(kw.as_str()))
            }
            _ => false,
        }
    }
}

fn dedup(values: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    values.filter(|v| seen.insert(v.clone())).collect()
}

/// Replaces characters that are illegal in path segments with `_` after
/// trimming surrounding whitespace.
///
/// No other validation (length, reserved device names) is performed.
///
/// ```
/// use shelver::category::sanitize_folder_name;
///
/// assert_eq!(sanitize_folder_name("  a/b:c  "), "a_b_c");
/// let once = sanitize_folder_name("x?y");
/// assert_eq!(sanitize_folder_name(&once), once);
/// ```
pub fn sanitize_folder_name(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| if ILLEGAL_NAME_CHARS.contains(&c) { '_' } else { c })
        .collect()
}

/// A category entry as written in TOML tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryDef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
    #[serde(default)]
    pub catch_all: bool,
}

impl CategoryDef {
    /// Validates the definition and builds a [`Category`].
    pub fn into_category(self) -> Result<Category, ConfigError> {
        if self.id.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "category id must not be empty".to_string(),
            ));
        }

        match (self.extensions, self.keywords, self.catch_all) {
            (Some(_), Some(_), _) => Err(ConfigError::Invalid(format!(
                "category '{}' sets both extensions and keywords",
                self.id
            ))),
            (Some(_), None, true) => Err(ConfigError::Invalid(format!(
                "category '{}': only folder categories can be a catch-all",
                self.id
            ))),
            (Some(exts), None, false) => Ok(Category::files(self.id, exts)),
            (None, _, true) => Ok(Category::folder_catch_all(self.id)),
            (None, Some(keywords), false) => Ok(Category::folders(self.id, keywords)),
            (None, None, false) => Err(ConfigError::Invalid(format!(
                "category '{}' needs either extensions or keywords",
                self.id
            ))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CategoryTable {
    #[serde(default)]
    categories: Vec<CategoryDef>,
}

const PERSONAL_TABLE: &str = include_str!("presets/personal.toml");
const MEDIA_TABLE: &str = include_str!("presets/media.toml");

/// Built-in category tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    /// Everyday files plus folder keyword categories.
    #[default]
    Personal,
    /// Creator tables with overlapping extensions; files only.
    Media,
}

impl Preset {
    pub const ALL: [Preset; 2] = [Preset::Personal, Preset::Media];

    pub fn name(&self) -> &'static str {
        match self {
            Preset::Personal => "personal",
            Preset::Media => "media",
        }
    }

    fn table(&self) -> &'static str {
        match self {
            Preset::Personal => PERSONAL_TABLE,
            Preset::Media => MEDIA_TABLE,
        }
    }

    /// Parses the embedded table into a category set with every category
    /// active.
    pub fn load(&self) -> Result<CategorySet, ConfigError> {
        CategorySet::from_toml(self.table())
    }
}

impl FromStr for Preset {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Preset::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::Invalid(format!("unknown preset '{}'", s)))
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The categories known to a session, their active flags, and the
/// destination-name overrides.
///
/// Iteration is alphabetical by identifier. Classification order is never
/// taken from iteration; it is always passed in explicitly.
#[derive(Debug, Clone, Default)]
pub struct CategorySet {
    categories: BTreeMap<CategoryId, Category>,
    active: BTreeMap<CategoryId, bool>,
    overrides: HashMap<CategoryId, String>,
}

impl CategorySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a TOML document with `[[categories]]` entries.
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        let table: CategoryTable =
            toml::from_str(source).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Self::from_defs(table.categories)
    }

    /// Builds a set from definitions, rejecting duplicate identifiers.
    pub fn from_defs(defs: impl IntoIterator<Item = CategoryDef>) -> Result<Self, ConfigError> {
        let mut set = Self::new();
        for def in defs {
            let category = def.into_category()?;
            if set.contains(category.id()) {
                return Err(ConfigError::DuplicateCategory(category.id().to_string()));
            }
            set.insert(category);
        }
        Ok(set)
    }

    /// Adds or replaces a category. New categories start active; a replaced
    /// category keeps its active flag and override.
    pub fn insert(&mut self, category: Category) -> Option<Category> {
        let id = category.id().to_string();
        self.active.entry(id.clone()).or_insert(true);
        self.categories.insert(id, category)
    }

    pub fn get(&self, id: &str) -> Option<&Category> {
        self.categories.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.categories.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Categories in alphabetical order.
    pub fn iter(&self) -> impl Iterator<Item = &Category> {
        self.categories.values()
    }

    /// Alphabetical id order, the order the built-in tables are walked in
    /// when the caller has no preference.
    pub fn default_priority(&self) -> Vec<CategoryId> {
        self.categories.keys().cloned().collect()
    }

    /// The catch-all folder category, if the set has one.
    pub fn catch_all(&self) -> Option<&Category> {
        self.categories.values().find(|c| c.is_catch_all())
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.active.get(id).copied().unwrap_or(false)
    }

    pub fn set_active(&mut self, id: &str, active: bool) -> Result<(), ConfigError> {
        match self.active.get_mut(id) {
            Some(flag) => {
                *flag = active;
                Ok(())
            }
            None => Err(ConfigError::UnknownCategory(id.to_string())),
        }
    }

    /// Marks exactly the given identifiers active. Fails without changing
    /// anything if one of them is unknown.
    pub fn activate_only<'a>(
        &mut self,
        ids: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), ConfigError> {
        let ids: BTreeSet<&str> = ids.into_iter().collect();
        if let Some(unknown) = ids.iter().find(|id| !self.contains(id)) {
            return Err(ConfigError::UnknownCategory(unknown.to_string()));
        }
        for (id, flag) in self.active.iter_mut() {
            *flag = ids.contains(id.as_str());
        }
        Ok(())
    }

    pub fn active_ids(&self) -> Vec<CategoryId> {
        self.active
            .iter()
            .filter(|(_, active)| **active)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Returns true if at least one active category organizes `kind`.
    pub fn has_active_kind(&self, kind: ItemKind) -> bool {
        self.iter().any(|c| c.kind() == kind && self.is_active(c.id()))
    }

    /// Sets the destination folder name for a category. Whitespace-only
    /// names restore the default.
    pub fn set_override(&mut self, id: &str, name: &str) -> Result<(), ConfigError> {
        if !self.contains(id) {
            return Err(ConfigError::UnknownCategory(id.to_string()));
        }
        let sanitized = sanitize_folder_name(name);
        if sanitized.is_empty() {
            self.overrides.remove(id);
        } else {
            self.overrides.insert(id.to_string(), sanitized);
        }
        Ok(())
    }

    pub fn clear_overrides(&mut self) {
        self.overrides.clear();
    }

    /// The folder name used under the destination root for `id`.
    ///
    /// Returns the sanitized override, or the identifier when there is no
    /// override or the override sanitizes to an empty string.
    pub fn resolve_destination_name(&self, id: &str) -> String {
        self.overrides
            .get(id)
            .map(|name| sanitize_folder_name(name))
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| id.to_string())
    }
}
