//! Configuration: organizer settings, entry filters and custom category
//! tables, loaded from TOML.
//!
//! # Configuration File Format
//!
//! ```toml
//! priority = ["Overlays", "Images"]
//!
//! [organizer]
//! preset = "media"
//! undo_capacity = 10
//! clear_undo_on_start = false
//! on_collision = "skip"          # skip | rename | fail-batch
//! unclassified_display_limit = 20
//!
//! [filters]
//! include_hidden = true
//!
//! [filters.exclude]
//! filenames = [".DS_Store", "Thumbs.db"]
//! patterns = ["*.part", "~*"]
//! regex = []
//!
//! [overrides]
//! Videos = "Footage"
//!
//! [[categories]]
//! id = "Stems"
//! extensions = [".stem", ".mogg"]
//! ```
//!
//! Custom `[[categories]]` are added to the preset; an entry whose id already
//! exists in the preset replaces it.

use crate::category::{CategoryDef, CategoryId, CategorySet, Preset};
use crate::error::ConfigError;
use crate::relocate::CollisionPolicy;
use crate::undo::DEFAULT_UNDO_CAPACITY;
use glob::Pattern;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Number of unclassified items listed verbatim before "... and N more".
pub const DEFAULT_DISPLAY_LIMIT: usize = 20;

/// Name of the per-directory configuration file.
pub const LOCAL_CONFIG_NAME: &str = ".shelverrc.toml";

/// The whole configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShelverConfig {
    #[serde(default)]
    pub organizer: Settings,

    #[serde(default)]
    pub filters: FilterRules,

    /// Destination folder names by category id.
    #[serde(default)]
    pub overrides: BTreeMap<CategoryId, String>,

    /// Extra or replacement categories.
    #[serde(default)]
    pub categories: Vec<CategoryDef>,

    /// Classification order. Categories not listed are appended
    /// alphabetically.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Vec<CategoryId>>,
}

/// Behaviour of batches and of the undo log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub preset: Preset,

    #[serde(default = "default_undo_capacity")]
    pub undo_capacity: usize,

    /// Drop all undo history whenever a new batch starts.
    #[serde(default)]
    pub clear_undo_on_start: bool,

    #[serde(default)]
    pub on_collision: CollisionPolicy,

    #[serde(default = "default_display_limit")]
    pub unclassified_display_limit: usize,
}

fn default_undo_capacity() -> usize {
    DEFAULT_UNDO_CAPACITY
}

fn default_display_limit() -> usize {
    DEFAULT_DISPLAY_LIMIT
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            preset: Preset::default(),
            undo_capacity: DEFAULT_UNDO_CAPACITY,
            clear_undo_on_start: false,
            on_collision: CollisionPolicy::default(),
            unclassified_display_limit: DEFAULT_DISPLAY_LIMIT,
        }
    }
}

/// Which source entries are looked at at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterRules {
    /// Whether entries starting with "." are organized. Defaults to true.
    #[serde(default = "default_include_hidden")]
    pub include_hidden: bool,

    #[serde(default)]
    pub exclude: ExcludeRules,
}

fn default_include_hidden() -> bool {
    true
}

impl Default for FilterRules {
    fn default() -> Self {
        Self {
            include_hidden: true,
            exclude: ExcludeRules::default(),
        }
    }
}

/// Entries matching any of these are left alone and not counted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExcludeRules {
    /// Exact entry names (e.g. "desktop.ini").
    #[serde(default)]
    pub filenames: Vec<String>,

    /// Glob patterns matched against the entry name.
    #[serde(default)]
    pub patterns: Vec<String>,

    /// Regular expressions matched against the entry name.
    #[serde(default)]
    pub regex: Vec<String>,
}

impl ShelverConfig {
    /// Load configuration from a file, with fallback to defaults.
    ///
    /// Attempts to load configuration in the following order:
    /// 1. If `config_path` is provided, load from that file
    /// 2. Look for `.shelverrc.toml` in the current directory
    /// 3. Look for `~/.config/shelver/config.toml` in home directory
    /// 4. Fall back to default configuration
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file is explicitly provided but cannot be read,
    /// or if any file found cannot be parsed.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let local_config = PathBuf::from(LOCAL_CONFIG_NAME);
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Ok(home) = std::env::var("HOME") {
            let home_config = PathBuf::from(home)
                .join(".config")
                .join("shelver")
                .join("config.toml");
            if home_config.exists() {
                return Self::load_from_file(&home_config);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let config = Self::from_toml(&content)?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Builds the category set: the preset, then custom categories, then
    /// overrides.
    pub fn build_categories(&self) -> Result<CategorySet, ConfigError> {
        let mut set = self.organizer.preset.load()?;

        let mut seen = HashSet::new();
        for def in &self.categories {
            if !seen.insert(def.id.clone()) {
                return Err(ConfigError::DuplicateCategory(def.id.clone()));
            }
            set.insert(def.clone().into_category()?);
        }

        for (id, name) in &self.overrides {
            set.set_override(id, name)?;
        }

        Ok(set)
    }

    /// The configured priority order, completed with any category it does
    /// not mention (alphabetically). Unknown ids are rejected.
    pub fn priority(&self, set: &CategorySet) -> Result<Vec<CategoryId>, ConfigError> {
        complete_priority(self.priority.as_deref().unwrap_or(&[]), set)
    }

    /// Compile the filter rules into matchers.
    pub fn compile_filters(&self) -> Result<EntryFilter, ConfigError> {
        EntryFilter::new(&self.filters)
    }
}

/// Puts `preferred` first and appends every other category of `set` in
/// alphabetical order.
pub fn complete_priority(
    preferred: &[CategoryId],
    set: &CategorySet,
) -> Result<Vec<CategoryId>, ConfigError> {
    let mut order: Vec<CategoryId> = Vec::with_capacity(set.len());
    for id in preferred {
        if !set.contains(id) {
            return Err(ConfigError::UnknownCategory(id.clone()));
        }
        if !order.contains(id) {
            order.push(id.clone());
        }
    }
    for id in set.default_priority() {
        if !order.contains(&id) {
            order.push(id);
        }
    }
    Ok(order)
}

/// Compiled filter rules.
#[derive(Debug, Clone)]
pub struct EntryFilter {
    include_hidden: bool,
    exclude_filenames: HashSet<String>,
    exclude_patterns: Vec<Pattern>,
    exclude_regexes: Vec<Regex>,
}

impl Default for EntryFilter {
    fn default() -> Self {
        Self {
            include_hidden: true,
            exclude_filenames: HashSet::new(),
            exclude_patterns: Vec::new(),
            exclude_regexes: Vec::new(),
        }
    }
}

impl EntryFilter {
    /// # Errors
    ///
    /// Returns an error if any glob or regex pattern is invalid.
    pub fn new(rules: &FilterRules) -> Result<Self, ConfigError> {
        let exclude_patterns = rules
            .exclude
            .patterns
            .iter()
            .map(|pattern| {
                Pattern::new(pattern).map_err(|_| ConfigError::InvalidGlob(pattern.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let exclude_regexes = rules
            .exclude
            .regex
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| ConfigError::InvalidRegex {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            include_hidden: rules.include_hidden,
            exclude_filenames: rules.exclude.filenames.iter().cloned().collect(),
            exclude_patterns,
            exclude_regexes,
        })
    }

    /// Check if an entry name should be organized.
    ///
    /// Checks are performed in this order, with early termination:
    /// 1. Hidden entry filter
    /// 2. Exact name match
    /// 3. Glob pattern match
    /// 4. Regex pattern match
    pub fn allows(&self, entry_name: &str) -> bool {
        if !self.include_hidden && entry_name.starts_with('.') {
            return false;
        }

        if self.exclude_filenames.contains(entry_name) {
            return false;
        }

        if self.exclude_patterns.iter().any(|p| p.matches(entry_name)) {
            return false;
        }

        !self.exclude_regexes.iter().any(|r| r.is_match(entry_name))
    }
}
