//! Command-line interface module for shelver.
//!
//! This module handles all CLI-related functionality including:
//! - Command parsing and validation
//! - Translating arguments into batch requests
//! - Running batches with a progress bar and Ctrl+C cancellation
//! - The interactive shell that keeps undo history between batches

use crate::batch::{BatchListener, BatchRequest, BatchState, BatchSummary, CancelToken, Mode};
use crate::category::{CategoryId, Preset};
use crate::config::{ShelverConfig, complete_priority};
use crate::output::{OutputFormatter, ProgressListener};
use crate::relocate::CollisionPolicy;
use crate::session::Session;
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use colored::*;
use std::collections::BTreeSet;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    name = "shelver",
    about = "Sort files and folders into category folders, with undo"
)]
pub struct Cli {
    /// Show debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Organize a directory once
    Organize {
        #[command(flatten)]
        batch: BatchArgs,

        #[command(flatten)]
        config: ConfigArgs,

        /// Destination folder name for a category
        #[arg(long = "rename", value_name = "CATEGORY=NAME")]
        renames: Vec<String>,

        /// Print the summary as JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// List categories and what they match
    Categories {
        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Interactive session with undo history
    Shell {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

/// What to organize and how.
#[derive(Args, Debug, Clone)]
pub struct BatchArgs {
    /// Directory whose entries are organized
    #[arg(value_hint = clap::ValueHint::DirPath)]
    pub source: PathBuf,

    /// Where category folders are created [default: SOURCE]
    #[arg(value_hint = clap::ValueHint::DirPath)]
    pub dest: Option<PathBuf>,

    /// Entry kinds to organize: files, folders or both
    #[arg(short, long, default_value_t = Mode::Both)]
    pub mode: Mode,

    /// Only use these categories (repeatable)
    #[arg(long = "only", value_name = "CATEGORY")]
    pub only: Vec<String>,

    /// Leave these categories out (repeatable)
    #[arg(long = "skip", value_name = "CATEGORY")]
    pub skip: Vec<String>,

    /// Classification order, comma separated
    #[arg(long, value_delimiter = ',', value_name = "CATEGORY,...")]
    pub priority: Vec<String>,
}

/// Where configuration comes from, plus the settings the command line can
/// override.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Configuration file [default: ./.shelverrc.toml, ~/.config/shelver/config.toml]
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Built-in category table: personal or media
    #[arg(short, long)]
    pub preset: Option<Preset>,

    /// What to do when the destination already exists: skip, rename or fail
    #[arg(long, value_name = "POLICY")]
    pub on_collision: Option<CollisionPolicy>,
}

impl ConfigArgs {
    pub fn load(&self) -> Result<ShelverConfig, String> {
        let mut config = ShelverConfig::load(self.config.as_deref())
            .map_err(|e| format!("Error loading configuration: {}", e))?;
        if let Some(preset) = self.preset {
            config.organizer.preset = preset;
        }
        if let Some(policy) = self.on_collision {
            config.organizer.on_collision = policy;
        }
        Ok(config)
    }

    fn session(&self) -> Result<(ShelverConfig, Session), String> {
        let config = self.load()?;
        let session = Session::from_config(&config).map_err(|e| e.to_string())?;
        Ok((config, session))
    }
}

/// Runs the parsed command line.
///
/// # Examples
///
/// ```no_run
/// use clap::Parser;
/// use shelver::cli::{Cli, run_cli};
///
/// let cli = Cli::parse_from(["shelver", "organize", "/home/me/Downloads"]);
/// let code = run_cli(cli);
/// ```
pub fn run_cli(cli: Cli) -> Result<ExitCode, String> {
    let show_bar = !cli.quiet;
    match cli.command {
        Command::Organize {
            batch,
            config,
            renames,
            json,
        } => organize_once(&batch, &config, &renames, json, show_bar),
        Command::Categories { config } => {
            let (_, session) = config.session()?;
            OutputFormatter::category_table(session.categories());
            Ok(ExitCode::SUCCESS)
        }
        Command::Shell { config } => run_shell(&config, show_bar),
    }
}

fn organize_once(
    args: &BatchArgs,
    config_args: &ConfigArgs,
    renames: &[String],
    json: bool,
    show_bar: bool,
) -> Result<ExitCode, String> {
    let (config, mut session) = config_args.session()?;
    for rename in renames {
        let (id, name) = parse_rename(rename)?;
        session
            .set_category_override(id, name)
            .map_err(|e| e.to_string())?;
    }

    let request = build_request(&session, &config, args)?;
    let interrupt = Interrupt::install();
    let summary = if json {
        run_batch(&session, request, &interrupt, &mut ())?
    } else {
        OutputFormatter::info(&format!("Organizing contents of: {}", args.source.display()));
        let mut listener = ProgressListener::new(show_bar);
        let summary = run_batch(&session, request, &interrupt, &mut listener)?;
        print_summary(&session, &summary, &listener);
        if summary.moved() > 0 {
            OutputFormatter::plain(&format!(
                "Undo history is kept in memory; use '{}' to organize with undo.",
                "shelver shell".bold()
            ));
        }
        summary
    };

    if json {
        let rendered = serde_json::to_string_pretty(&summary)
            .map_err(|e| format!("Error rendering summary: {}", e))?;
        println!("{}", rendered);
    }

    Ok(exit_code(&summary))
}

fn exit_code(summary: &BatchSummary) -> ExitCode {
    match summary.state {
        BatchState::Failed => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    }
}

fn run_batch<L>(
    session: &Session,
    request: BatchRequest,
    interrupt: &Interrupt,
    listener: &mut L,
) -> Result<BatchSummary, String>
where
    L: BatchListener,
{
    let handle = session.start_batch(request).map_err(|e| e.to_string())?;
    interrupt.arm(handle.cancel_token());
    let summary = handle.drive(listener);
    interrupt.disarm();
    Ok(summary)
}

fn print_summary(session: &Session, summary: &BatchSummary, listener: &ProgressListener) {
    if summary.moved() > 0 || !summary.failures.is_empty() {
        OutputFormatter::summary_table(summary, session.categories());
    }
    OutputFormatter::unclassified(
        listener.unclassified(),
        session.settings().unclassified_display_limit,
    );
}

/// Turns command-line arguments into a request against the session's
/// categories.
pub fn build_request(
    session: &Session,
    config: &ShelverConfig,
    args: &BatchArgs,
) -> Result<BatchRequest, String> {
    let categories = session.categories();
    if let Some(unknown) = args
        .only
        .iter()
        .chain(&args.skip)
        .find(|id| !categories.contains(id))
    {
        return Err(format!("Unknown category: {}", unknown));
    }

    let mut active: BTreeSet<CategoryId> = if args.only.is_empty() {
        categories.active_ids().into_iter().collect()
    } else {
        args.only.iter().cloned().collect()
    };
    for id in &args.skip {
        active.remove(id);
    }

    let preferred = if args.priority.is_empty() {
        config.priority.clone().unwrap_or_default()
    } else {
        args.priority.clone()
    };
    let priority = complete_priority(&preferred, categories).map_err(|e| e.to_string())?;

    let destination = args.dest.clone().unwrap_or_else(|| args.source.clone());
    Ok(BatchRequest::new(&args.source, destination, active)
        .with_mode(args.mode)
        .with_priority(priority))
}

/// Splits `CATEGORY=NAME`.
pub fn parse_rename(raw: &str) -> Result<(&str, &str), String> {
    raw.split_once('=')
        .map(|(id, name)| (id.trim(), name))
        .filter(|(id, _)| !id.is_empty())
        .ok_or_else(|| format!("Invalid rename '{}': expected CATEGORY=NAME", raw))
}

/// Routes Ctrl+C to the running batch. A second Ctrl+C, or one while no
/// batch is running, exits.
#[derive(Clone, Default)]
struct Interrupt(Arc<Mutex<Option<CancelToken>>>);

impl Interrupt {
    fn install() -> Self {
        let interrupt = Self::default();
        let handler = interrupt.clone();
        if let Err(e) = ctrlc::set_handler(move || handler.fire()) {
            tracing::warn!(error = %e, "could not install Ctrl+C handler");
        }
        interrupt
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<CancelToken>> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn fire(&self) {
        match self.slot().as_ref() {
            Some(token) if !token.is_cancelled() => {
                eprintln!(
                    "\n{}",
                    "Received Ctrl+C, stopping after the current item...".yellow().bold()
                );
                token.cancel();
            }
            _ => std::process::exit(130),
        }
    }

    fn arm(&self, token: CancelToken) {
        *self.slot() = Some(token);
    }

    fn disarm(&self) {
        *self.slot() = None;
    }
}

/// A line typed into the interactive shell.
#[derive(Parser, Debug)]
#[command(no_binary_name = true, name = "shelver>", disable_version_flag = true)]
struct ShellLine {
    #[command(subcommand)]
    command: ShellCommand,
}

#[derive(Subcommand, Debug)]
enum ShellCommand {
    /// Organize a directory (undoable)
    Organize {
        #[command(flatten)]
        batch: BatchArgs,
    },

    /// Revert the most recent organization
    Undo,

    /// Set a category's destination folder name; no name restores the default
    Rename {
        category: String,
        name: Vec<String>,
    },

    /// Restore every default destination folder name
    ResetNames,

    /// List categories and what they match
    Categories,

    /// Show undoable organizations, newest first
    History,

    /// Leave the shell
    #[command(alias = "exit")]
    Quit,
}

enum ShellFlow {
    Continue,
    Quit,
}

fn run_shell(config_args: &ConfigArgs, show_bar: bool) -> Result<ExitCode, String> {
    let (config, mut session) = config_args.session()?;
    let interrupt = Interrupt::install();

    OutputFormatter::info("shelver interactive shell. Type 'help' for commands, 'quit' to leave.");
    let stdin = io::stdin();
    loop {
        print!("{} ", "shelver>".bold());
        io::stdout()
            .flush()
            .map_err(|e| format!("Error writing prompt: {}", e))?;

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => return Err(format!("Error reading input: {}", e)),
        }

        let words = split_words(&line);
        if words.is_empty() {
            continue;
        }
        let parsed = match ShellLine::try_parse_from(&words) {
            Ok(parsed) => parsed,
            Err(e) => {
                let _ = e.print();
                continue;
            }
        };

        match shell_command(&mut session, &config, &interrupt, parsed.command, show_bar) {
            Ok(ShellFlow::Continue) => {}
            Ok(ShellFlow::Quit) => break,
            Err(e) => OutputFormatter::error(&e),
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn shell_command(
    session: &mut Session,
    config: &ShelverConfig,
    interrupt: &Interrupt,
    command: ShellCommand,
    show_bar: bool,
) -> Result<ShellFlow, String> {
    match command {
        ShellCommand::Organize { batch } => {
            let request = build_request(session, config, &batch)?;
            let mut listener = ProgressListener::new(show_bar);
            let summary = run_batch(session, request, interrupt, &mut listener)?;
            print_summary(session, &summary, &listener);
        }
        ShellCommand::Undo => match session.undo_last() {
            Ok(report) => OutputFormatter::undo_report(&report),
            Err(e) => OutputFormatter::warning(&e.to_string()),
        },
        ShellCommand::Rename { category, name } => {
            let name = name.join(" ");
            session
                .set_category_override(&category, &name)
                .map_err(|e| e.to_string())?;
            OutputFormatter::success(&format!(
                "{} → {}",
                category,
                session.categories().resolve_destination_name(&category)
            ));
        }
        ShellCommand::ResetNames => {
            session.reset_category_names();
            OutputFormatter::success("Folder names restored to defaults.");
        }
        ShellCommand::Categories => OutputFormatter::category_table(session.categories()),
        ShellCommand::History => {
            let history = session.history();
            if history.is_empty() {
                OutputFormatter::plain("Nothing to undo.");
            }
            for (i, (started_at, moved)) in history.iter().enumerate() {
                OutputFormatter::plain(&format!(
                    "{:>2}. {}  {} item(s)",
                    i + 1,
                    started_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
                    moved
                ));
            }
        }
        ShellCommand::Quit => return Ok(ShellFlow::Quit),
    }
    Ok(ShellFlow::Continue)
}

/// Splits a shell line on whitespace. Single or double quotes group words.
fn split_words(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;

    for c in line.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_word = true;
            }
            None if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            None => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use std::path::Path;

    fn session() -> Session {
        Session::new(Preset::Media.load().unwrap(), Settings::default())
    }

    fn batch_args(extra: &[&str]) -> BatchArgs {
        let mut argv = vec!["shelver", "organize", "/tmp/in"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Organize { batch, .. } => batch,
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_organize_flags() {
        let cli = Cli::try_parse_from([
            "shelver",
            "-v",
            "organize",
            "/tmp/in",
            "/tmp/out",
            "--mode",
            "files",
            "--preset",
            "media",
            "--on-collision",
            "rename",
            "--rename",
            "Videos=Footage",
            "--json",
        ])
        .unwrap();

        assert!(cli.verbose);
        match cli.command {
            Command::Organize {
                batch,
                config,
                renames,
                json,
            } => {
                assert_eq!(batch.dest.as_deref(), Some(Path::new("/tmp/out")));
                assert_eq!(batch.mode, Mode::Files);
                assert_eq!(config.preset, Some(Preset::Media));
                assert_eq!(config.on_collision, Some(CollisionPolicy::Rename));
                assert_eq!(renames, vec!["Videos=Footage".to_string()]);
                assert!(json);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["shelver", "-v", "-q", "categories"]).is_err());
    }

    #[test]
    fn test_build_request_defaults() {
        let session = session();
        let request =
            build_request(&session, &ShelverConfig::default(), &batch_args(&[])).unwrap();

        assert_eq!(request.destination_root, PathBuf::from("/tmp/in"));
        assert_eq!(request.active.len(), session.categories().len());
        assert_eq!(request.priority, session.categories().default_priority());
    }

    #[test]
    fn test_build_request_only_skip_and_priority() {
        let session = session();
        let args = batch_args(&[
            "--only",
            "Images",
            "--only",
            "Overlays",
            "--skip",
            "Images",
            "--priority",
            "Overlays,Images",
        ]);
        let request = build_request(&session, &ShelverConfig::default(), &args).unwrap();

        assert_eq!(request.active, BTreeSet::from(["Overlays".to_string()]));
        assert_eq!(&request.priority[..2], &["Overlays".to_string(), "Images".to_string()]);
    }

    #[test]
    fn test_build_request_rejects_unknown_category() {
        let session = session();
        let err = build_request(
            &session,
            &ShelverConfig::default(),
            &batch_args(&["--only", "Nope"]),
        )
        .unwrap_err();
        assert!(err.contains("Nope"));
    }

    #[test]
    fn test_parse_rename() {
        assert_eq!(parse_rename("Videos=My Clips"), Ok(("Videos", "My Clips")));
        assert_eq!(parse_rename("Videos="), Ok(("Videos", "")));
        assert!(parse_rename("Videos").is_err());
        assert!(parse_rename("=x").is_err());
    }

    #[test]
    fn test_split_words_handles_quotes() {
        assert_eq!(
            split_words(r#"rename "Sound Effects" 'My SFX'  "#),
            vec!["rename", "Sound Effects", "My SFX"]
        );
        assert_eq!(split_words("organize ''"), vec!["organize", ""]);
        assert!(split_words("   \n").is_empty());
    }

    #[test]
    fn test_shell_line_parsing() {
        let line = ShellLine::try_parse_from(split_words("rename Videos")).unwrap();
        assert!(matches!(
            line.command,
            ShellCommand::Rename { ref name, .. } if name.is_empty()
        ));
        assert!(matches!(
            ShellLine::try_parse_from(["exit"]).unwrap().command,
            ShellCommand::Quit
        ));
        assert!(ShellLine::try_parse_from(["reset-names"]).is_ok());
    }

    #[test]
    fn test_shell_rename_and_undo_commands() {
        let mut session = session();
        let interrupt = Interrupt::default();
        let config = ShelverConfig::default();

        let flow = shell_command(
            &mut session,
            &config,
            &interrupt,
            ShellCommand::Rename {
                category: "Videos".to_string(),
                name: vec!["My".to_string(), "Clips".to_string()],
            },
            false,
        );
        assert!(matches!(flow, Ok(ShellFlow::Continue)));
        assert_eq!(session.categories().resolve_destination_name("Videos"), "My Clips");

        assert!(shell_command(
            &mut session,
            &config,
            &interrupt,
            ShellCommand::Rename {
                category: "Nope".to_string(),
                name: vec![],
            },
            false,
        )
        .is_err());

        assert!(matches!(
            shell_command(&mut session, &config, &interrupt, ShellCommand::Undo, false),
            Ok(ShellFlow::Continue)
        ));
        assert!(matches!(
            shell_command(&mut session, &config, &interrupt, ShellCommand::Quit, false),
            Ok(ShellFlow::Quit)
        ));
    }

    #[test]
    fn test_shell_organize_without_bar_then_undo() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("clip.mp4"), "v").unwrap();
        let mut session = session();
        let interrupt = Interrupt::default();
        let config = ShelverConfig::default();

        let batch = BatchArgs {
            source: temp_dir.path().to_path_buf(),
            dest: None,
            mode: Mode::Files,
            only: vec!["Videos".to_string()],
            skip: vec![],
            priority: vec![],
        };
        let flow = shell_command(
            &mut session,
            &config,
            &interrupt,
            ShellCommand::Organize { batch },
            false,
        );
        assert!(matches!(flow, Ok(ShellFlow::Continue)));
        assert!(temp_dir.path().join("Videos").join("clip.mp4").is_file());

        shell_command(&mut session, &config, &interrupt, ShellCommand::Undo, false).unwrap();
        assert!(temp_dir.path().join("clip.mp4").is_file());
    }

    #[test]
    fn test_interrupt_cancels_armed_token() {
        let interrupt = Interrupt::default();
        let token = CancelToken::new();
        interrupt.arm(token.clone());
        interrupt.fire();
        assert!(token.is_cancelled());
        interrupt.disarm();
    }
}
