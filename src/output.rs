//! Output formatting and styling module.
//!
//! Provides a centralized interface for all CLI output, including colored output,
//! progress tracking, and formatted tables.

use crate::batch::{BatchListener, BatchState, BatchSummary, StatusLevel, Unclassified};
use crate::category::{CategorySet, ItemKind, Matcher};
use crate::undo::UndoReport;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::{BTreeMap, BTreeSet};

/// Manages all CLI output with consistent styling and formatting.
///
/// This struct provides methods for:
/// - Success messages (green with ✓)
/// - Error messages (red with ✗)
/// - Warning messages (yellow with ⚠)
/// - Info messages (cyan)
/// - Progress bars for batches
/// - Summary tables with statistics
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use shelver::output::OutputFormatter;
    /// OutputFormatter::success("Organization complete!");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red with an X mark.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Prints a warning message in yellow with a warning symbol.
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    /// Prints an info message in cyan.
    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    pub fn plain(message: &str) {
        println!("{}", message);
    }

    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Prints a status line styled by its level.
    pub fn status(message: &str, level: StatusLevel) {
        match level {
            StatusLevel::Info => Self::info(message),
            StatusLevel::Warning => Self::warning(message),
            StatusLevel::Error => Self::error(message),
            StatusLevel::Success => Self::success(message),
        }
    }

    /// Creates a progress bar that counts percent, 0 to 100.
    ///
    /// ```no_run
    /// use shelver::output::OutputFormatter;
    /// let pb = OutputFormatter::create_progress_bar();
    /// pb.set_position(40);
    /// pb.finish_and_clear();
    /// ```
    pub fn create_progress_bar() -> ProgressBar {
        let pb = ProgressBar::new(100);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");
        pb.set_style(style);
        pb
    }

    /// Prints the moves of a batch grouped by destination folder.
    pub fn summary_table(summary: &BatchSummary, categories: &CategorySet) {
        Self::header("SUMMARY");

        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for record in &summary.moves {
            *counts
                .entry(categories.resolve_destination_name(&record.category))
                .or_default() += 1;
        }

        let max_category_len = counts.keys().map(|name| name.len()).max().unwrap_or(0).max(8); // At least "Category" width

        println!(
            "{:<width$} | {}",
            "Category".bold(),
            "Items".bold(),
            width = max_category_len
        );
        println!("{}", "-".repeat(max_category_len + 10));

        for (category, count) in &counts {
            println!(
                "{:<width$} | {} {}",
                category,
                count.to_string().green(),
                plural(*count, "item"),
                width = max_category_len
            );
        }

        println!("{}", "-".repeat(max_category_len + 10));
        println!(
            "{:<width$} | {} {} ({} of {} processed)",
            "Total".bold(),
            summary.moved().to_string().green().bold(),
            plural(summary.moved(), "item"),
            summary.processed,
            summary.total,
            width = max_category_len
        );

        if !summary.failures.is_empty() {
            Self::header("NOT MOVED");
            for failure in &summary.failures {
                println!("  {} {}", "✗".red(), failure.reason);
            }
        }
    }

    /// Prints the aggregated list of items nothing claimed.
    pub fn unclassified(unclassified: &Unclassified, limit: usize) {
        if unclassified.is_empty() {
            return;
        }
        println!();
        for line in unclassified.describe(limit).lines() {
            println!("{}", line.yellow());
        }
    }

    pub fn undo_report(report: &UndoReport) {
        Self::success(&report.message());
        for path in &report.missing {
            Self::warning(&format!("No longer exists: {}", path.display()));
        }
        for path in &report.conflicts {
            Self::warning(&format!("Original location is occupied: {}", path.display()));
        }
    }

    /// Lists every category with its destination folder and what it matches.
    pub fn category_table(categories: &CategorySet) {
        for kind in [ItemKind::File, ItemKind::Folder] {
            let mut rows = categories.iter().filter(|c| c.kind() == kind).peekable();
            if rows.peek().is_none() {
                continue;
            }
            Self::header(match kind {
                ItemKind::File => "FILE CATEGORIES",
                ItemKind::Folder => "FOLDER CATEGORIES",
            });
            for category in rows {
                let folder = categories.resolve_destination_name(category.id());
                let mut name = category.id().bold().to_string();
                if folder != category.id() {
                    name = format!("{} → {}", name, folder.cyan());
                }
                if !categories.is_active(category.id()) {
                    name = format!("{} {}", name, "(inactive)".dimmed());
                }
                let matches = match category.matcher() {
                    _ if category.is_catch_all() => "everything else".italic().to_string(),
                    Matcher::Extensions(items) | Matcher::Keywords(items) => items.join(" "),
                };
                println!("  {}\n      {}", name, matches);
            }
        }
    }
}

fn plural(count: usize, word: &str) -> String {
    if count == 1 {
        word.to_string()
    } else {
        format!("{}s", word)
    }
}

/// Draws batch progress on a terminal progress bar and prints the closing
/// status line. The unclassified aggregate is kept for the caller.
pub struct ProgressListener {
    bar: Option<ProgressBar>,
    unclassified: Unclassified,
}

impl ProgressListener {
    pub fn new(show_bar: bool) -> Self {
        Self {
            bar: show_bar.then(OutputFormatter::create_progress_bar),
            unclassified: Unclassified::default(),
        }
    }

    pub fn unclassified(&self) -> &Unclassified {
        &self.unclassified
    }

    fn clear(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

impl BatchListener for ProgressListener {
    fn on_progress(&mut self, percent: u8) {
        if let Some(bar) = &self.bar {
            bar.set_position(u64::from(percent));
        }
    }

    fn on_status(&mut self, message: &str, level: StatusLevel) {
        self.clear();
        OutputFormatter::status(message, level);
    }

    fn on_unclassified(&mut self, extensions: &BTreeSet<String>, folders: &BTreeSet<String>) {
        self.unclassified = Unclassified {
            extensions: extensions.clone(),
            folders: folders.clone(),
        };
    }

    fn on_terminal(&mut self, state: BatchState, _summary: &BatchSummary) {
        self.clear();
        tracing::debug!(%state, "batch finished");
    }
}
