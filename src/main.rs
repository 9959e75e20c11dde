use anchor_patch::config::{
    apply_edits, effective_root, load_from_path, patch_files, target_path, ApplicationError,
    EditMode, EditSpec, Locator, PatchList, PatchResult, Verify,
};
use anchor_patch::locator::{CaptureGroup, LocateError, MatchPolicy};
use anchor_patch::logging;
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use similar::{ChangeTag, TextDiff};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "anchor-patch")]
#[command(about = "Insert or replace literal text at regex or line anchors", long_about = None)]
#[command(version)]
struct Cli {
    /// Log to stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Insert the payload right after the anchor match
    InsertAfter(PatternCommand),

    /// Insert the payload right before the anchor match
    InsertBefore(PatternCommand),

    /// Replace the anchor match with the payload
    ReplaceMatch(PatternCommand),

    /// Insert the payload as a block before a 0-based line
    InsertAtLine {
        /// File to edit
        file: PathBuf,

        /// 0-based line index (the line count appends)
        #[arg(short, long)]
        line: usize,

        #[command(flatten)]
        payload: PayloadArgs,
    },

    /// Replace a 0-based line range with the payload
    ReplaceLines {
        /// File to edit
        file: PathBuf,

        /// First line to replace
        #[arg(short, long)]
        start: usize,

        /// Last line to replace (inclusive unless --exclusive-end)
        #[arg(short, long)]
        end: usize,

        /// Treat --end as one past the last line
        #[arg(long)]
        exclusive_end: bool,

        /// Refuse to edit unless the lines currently read exactly this
        #[arg(long)]
        expect: Option<String>,

        #[command(flatten)]
        payload: PayloadArgs,
    },

    /// Apply one or more TOML patch lists
    Apply {
        /// Patch list files, or directories holding *.toml patch lists
        #[arg(required = true)]
        patches: Vec<PathBuf>,

        /// Root that targets resolve against and must stay inside
        #[arg(short, long)]
        root: Option<PathBuf>,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,
    },
}

#[derive(Args)]
struct PatternCommand {
    /// File to edit
    file: PathBuf,

    /// Anchor regex, matched against the whole file
    #[arg(short, long)]
    pattern: String,

    /// Let `.` match newlines so the anchor can span lines
    #[arg(long)]
    dotall: bool,

    /// Let `^` and `$` match at line boundaries
    #[arg(long)]
    multi_line: bool,

    /// Case-insensitive anchor
    #[arg(short = 'i', long)]
    ignore_case: bool,

    /// Anchor on a capture group (index or name) instead of the whole match
    #[arg(short, long)]
    group: Option<CaptureGroup>,

    /// Take the first match even if the anchor matches more than once
    #[arg(long)]
    first: bool,

    /// Refuse to edit unless the anchor text is exactly this
    #[arg(long)]
    expect: Option<String>,

    #[command(flatten)]
    payload: PayloadArgs,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct PayloadArgs {
    /// Literal text to splice in
    #[arg(long)]
    payload: Option<String>,

    /// Read the text to splice in from a file
    #[arg(long)]
    payload_file: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match cli.command {
        Commands::InsertAfter(cmd) => cmd_pattern(EditMode::InsertAfter, cmd),
        Commands::InsertBefore(cmd) => cmd_pattern(EditMode::InsertBefore, cmd),
        Commands::ReplaceMatch(cmd) => cmd_pattern(EditMode::ReplaceMatch, cmd),
        Commands::InsertAtLine {
            file,
            line,
            payload,
        } => run_single(EditSpec {
            id: EditMode::InsertAtLineIndex.to_string(),
            file,
            mode: EditMode::InsertAtLineIndex,
            locator: Locator::Line { index: line },
            payload: payload.payload,
            payload_file: payload.payload_file,
            verify: None,
        }),
        Commands::ReplaceLines {
            file,
            start,
            end,
            exclusive_end,
            expect,
            payload,
        } => run_single(EditSpec {
            id: EditMode::ReplaceRange.to_string(),
            file,
            mode: EditMode::ReplaceRange,
            locator: Locator::Lines {
                start,
                end,
                end_inclusive: !exclusive_end,
            },
            payload: payload.payload,
            payload_file: payload.payload_file,
            verify: expect.map(|expected_text| Verify::ExactMatch { expected_text }),
        }),
        Commands::Apply {
            patches,
            root,
            diff,
        } => cmd_apply(patches, root, diff),
    }
}

fn cmd_pattern(mode: EditMode, cmd: PatternCommand) -> Result<()> {
    let policy = if cmd.first {
        MatchPolicy::First
    } else {
        MatchPolicy::Unique
    };

    run_single(EditSpec {
        id: mode.to_string(),
        file: cmd.file,
        mode,
        locator: Locator::Pattern {
            regex: cmd.pattern,
            dot_matches_newline: cmd.dotall,
            multi_line: cmd.multi_line,
            case_insensitive: cmd.ignore_case,
            capture: cmd.group,
            policy,
        },
        payload: cmd.payload.payload,
        payload_file: cmd.payload.payload_file,
        verify: cmd.expect.map(|expected_text| Verify::ExactMatch { expected_text }),
    })
}

/// Run one ad hoc edit as a single-entry patch list.
fn run_single(edit: EditSpec) -> Result<()> {
    let list = PatchList {
        edits: vec![edit],
        ..PatchList::default()
    };
    if let Err(e) = list.validate() {
        eprintln!("{} {}", "✗".red(), e);
        std::process::exit(1);
    }

    let mut tally = Tally::default();
    for (id, result) in apply_edits(&list, None) {
        tally.report(&id, result);
    }

    if tally.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// Resolve the root override.
///
/// Priority order:
/// 1. Explicit --root flag
/// 2. ANCHOR_PATCH_ROOT environment variable
///
/// Without either, each patch list falls back to its own `meta.root`.
fn resolve_root(cli_root: Option<PathBuf>) -> Result<Option<PathBuf>> {
    if let Some(path) = cli_root {
        return Ok(Some(path.canonicalize()?));
    }

    if let Ok(env_path) = env::var("ANCHOR_PATCH_ROOT") {
        let path = PathBuf::from(&env_path);
        if path.exists() {
            return Ok(Some(path.canonicalize()?));
        }
        eprintln!(
            "{}",
            format!(
                "Warning: ANCHOR_PATCH_ROOT is set but path doesn't exist: {}",
                env_path
            )
            .yellow()
        );
    }

    Ok(None)
}

/// Helper: Show unified diff between original and modified content
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (patched)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);
    for hunk in diff.unified_diff().context_radius(3).iter_hunks() {
        println!("{}", hunk.header().to_string().cyan());
        for change in hunk.iter_changes() {
            let line = match change.tag() {
                ChangeTag::Delete => format!("-{}", change).red(),
                ChangeTag::Insert => format!("+{}", change).green(),
                ChangeTag::Equal => format!(" {}", change).normal(),
            };
            print!("{}", line);
            if change.missing_newline() {
                println!();
            }
        }
    }
}

#[derive(Default)]
struct Tally {
    applied: usize,
    already_applied: usize,
    aborted: usize,
    failed: usize,
}

impl Tally {
    fn report(&mut self, id: &str, result: Result<PatchResult, ApplicationError>) {
        match result {
            Ok(PatchResult::Applied { file }) => {
                println!("{} {}: Applied to {}", "✓".green(), id, file.display());
                self.applied += 1;
            }
            Ok(PatchResult::AlreadyApplied { file }) => {
                println!(
                    "{} {}: Already applied to {}",
                    "⊙".yellow(),
                    id,
                    file.display()
                );
                self.already_applied += 1;
            }
            Ok(PatchResult::Aborted { file, reason }) => {
                println!("{} {}: Aborted ({})", "⊘".cyan(), id, reason);
                println!("  File: {}", file.display());
                self.aborted += 1;
            }
            Err(e) => {
                eprintln!("{} {}: Error - {}", "✗".red(), id, e);
                self.failed += 1;

                // Conflict diagnostics
                match &e {
                    ApplicationError::Locate {
                        file,
                        source: LocateError::AnchorNotFound { .. },
                    } => {
                        eprintln!("  {}", "CONFLICT: Anchor matched no locations".red());
                        eprintln!("  File: {} (left unchanged)", file.display());
                        eprintln!("  Possible causes:");
                        eprintln!("    - The anchored code was edited or removed");
                        eprintln!("    - Whitespace or line endings differ from the pattern");
                    }
                    ApplicationError::Locate {
                        file,
                        source: LocateError::AmbiguousAnchor { count, .. },
                    } => {
                        eprintln!(
                            "  {}",
                            format!("CONFLICT: Anchor matched {} locations (expected 1)", count)
                                .red()
                        );
                        eprintln!("  File: {} (left unchanged)", file.display());
                        eprintln!("  Action: Make the pattern more specific, or pass --first");
                    }
                    ApplicationError::Mismatch { file, .. } => {
                        eprintln!("  {}", "CONFLICT: Anchor text drifted".red());
                        eprintln!("  File: {} (left unchanged)", file.display());
                    }
                    _ => {}
                }
            }
        }
    }
}

fn cmd_apply(patches: Vec<PathBuf>, root: Option<PathBuf>, show_diff: bool) -> Result<()> {
    let root = resolve_root(root)?;
    let files = patch_files(&patches)?;

    if let Some(root) = &root {
        println!("Root: {}", root.display());
        println!();
    }

    let mut tally = Tally::default();

    for patch_file in files {
        println!("Loading edits from {}...", patch_file.display());

        let list = match load_from_path(&patch_file) {
            Ok(list) => list,
            Err(e) => {
                eprintln!("{} {}", "✗".red(), e);
                tally.failed += 1;
                println!();
                continue;
            }
        };

        // Snapshot targets before applying (for diff output)
        let mut before: HashMap<PathBuf, String> = HashMap::new();
        if show_diff {
            let list_root = effective_root(&list, root.as_deref());
            for edit in &list.edits {
                let path = target_path(&list, list_root.as_deref(), edit);
                if before.contains_key(&path) {
                    continue;
                }
                if let Ok(content) = fs::read_to_string(&path) {
                    before.insert(path, content);
                }
            }
        }

        let mut written: Vec<PathBuf> = Vec::new();
        for (id, result) in apply_edits(&list, root.as_deref()) {
            if let Ok(PatchResult::Applied { file }) = &result {
                if !written.contains(file) {
                    written.push(file.clone());
                }
            }
            tally.report(&id, result);
        }

        if show_diff {
            for file in &written {
                let Some(original) = before.get(file) else {
                    continue;
                };
                if let Ok(modified) = fs::read_to_string(file) {
                    if original != &modified {
                        display_diff(file, original, &modified);
                    }
                }
            }
        }

        println!();
    }

    println!("{}", "Summary:".bold());
    println!("  {} applied", format!("{}", tally.applied).green());
    println!(
        "  {} already applied",
        format!("{}", tally.already_applied).yellow()
    );
    println!("  {} aborted", format!("{}", tally.aborted).cyan());
    println!("  {} failed", format!("{}", tally.failed).red());

    if tally.failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}
