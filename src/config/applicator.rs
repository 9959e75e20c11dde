//! Patch list application.
//!
//! A patch list is applied in two phases:
//! - Stage: read every target once and run its edits, in declaration order,
//!   against an in-memory buffer. Each edit locates its anchor in the buffer
//!   left by the edits before it.
//! - Commit: only if every edit staged cleanly, write each changed buffer
//!   back atomically.
//!
//! A single failure anywhere aborts the batch and no file is written.

use crate::config::schema::{EditMode, EditSpec, Locator, PatchList, Verify};
use crate::edit::{hash_hex, read_text, write_back, Edit, EditError, EditResult, EditVerification};
use crate::lines::{insert_at_line_index, replace_lines, split_lines, RangeError};
use crate::locator::{find_anchor, LocateError};
use crate::safety::{SafetyError, TargetGuard};
use crate::splice::Span;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// Result of applying a single edit
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "PatchResult should be checked for success/failure"]
pub enum PatchResult {
    /// Edit was applied and its file written
    Applied { file: PathBuf },
    /// Payload was already in place; nothing to do
    AlreadyApplied { file: PathBuf },
    /// Edit was fine on its own but the batch did not go through
    Aborted { file: PathBuf, reason: String },
}

impl fmt::Display for PatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchResult::Applied { file } => write!(f, "Applied to {}", file.display()),
            PatchResult::AlreadyApplied { file } => {
                write!(f, "Already applied to {}", file.display())
            }
            PatchResult::Aborted { file, reason } => {
                write!(f, "Aborted on {}: {}", file.display(), reason)
            }
        }
    }
}

impl From<EditResult> for PatchResult {
    fn from(result: EditResult) -> Self {
        match result {
            EditResult::Applied { file, .. } => PatchResult::Applied { file },
            EditResult::AlreadyApplied { file } => PatchResult::AlreadyApplied { file },
        }
    }
}

/// Errors during edit application
#[derive(Debug)]
pub enum ApplicationError {
    /// Target could not be read or written
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// `payload_file` could not be read
    Payload {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Pattern anchor missing, ambiguous, or invalid
    Locate { file: PathBuf, source: LocateError },
    /// Line index or range outside the file
    Range { file: PathBuf, source: RangeError },
    /// Byte-span edit rejected
    Edit { file: PathBuf, source: EditError },
    /// `verify` did not match the anchor text
    Mismatch { file: PathBuf, found_hash: String },
    /// Target outside the root or in a forbidden directory
    Unsafe(SafetyError),
    /// Edit spec that validation should have rejected
    Invalid { reason: String },
}

impl fmt::Display for ApplicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplicationError::Io { path, source } => {
                write!(f, "I/O error on {}: {}", path.display(), source)
            }
            ApplicationError::Payload { path, source } => {
                write!(f, "cannot read payload {}: {}", path.display(), source)
            }
            ApplicationError::Locate { file, source } => {
                write!(f, "{} in {}", source, file.display())
            }
            ApplicationError::Range { file, source } => {
                write!(f, "{} in {}", source, file.display())
            }
            ApplicationError::Edit { file, source } => {
                write!(f, "edit error on {}: {}", file.display(), source)
            }
            ApplicationError::Mismatch { file, found_hash } => write!(
                f,
                "anchor text in {} does not match verify (found text hashes to {})",
                file.display(),
                found_hash
            ),
            ApplicationError::Unsafe(e) => write!(f, "refusing to edit: {}", e),
            ApplicationError::Invalid { reason } => write!(f, "invalid edit: {}", reason),
        }
    }
}

impl std::error::Error for ApplicationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApplicationError::Io { source, .. } => Some(source),
            ApplicationError::Payload { source, .. } => Some(source),
            ApplicationError::Locate { source, .. } => Some(source),
            ApplicationError::Range { source, .. } => Some(source),
            ApplicationError::Edit { source, .. } => Some(source),
            ApplicationError::Unsafe(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SafetyError> for ApplicationError {
    fn from(e: SafetyError) -> Self {
        ApplicationError::Unsafe(e)
    }
}

pub type EditOutcome = Result<PatchResult, ApplicationError>;

/// Root that relative targets resolve against and are confined to.
///
/// `root_override` (command line or environment) wins over `meta.root`. A
/// relative `meta.root` is taken relative to the patch list's directory.
pub fn effective_root(list: &PatchList, root_override: Option<&Path>) -> Option<PathBuf> {
    if let Some(root) = root_override {
        return Some(root.to_path_buf());
    }
    let root = list.meta.root.as_ref()?;
    match &list.source_dir {
        Some(dir) if root.is_relative() => Some(dir.join(root)),
        _ => Some(root.clone()),
    }
}

/// Path an edit will touch.
///
/// Without a root, relative targets resolve against the patch list's
/// directory (or the current directory for lists not loaded from a file).
pub fn target_path(list: &PatchList, root: Option<&Path>, edit: &EditSpec) -> PathBuf {
    if edit.file.is_absolute() {
        return edit.file.clone();
    }
    match (root, &list.source_dir) {
        (Some(root), _) => root.join(&edit.file),
        (None, Some(dir)) => dir.join(&edit.file),
        (None, None) => edit.file.clone(),
    }
}

struct FileGroup {
    path: PathBuf,
    edits: Vec<usize>,
}

struct Staged {
    path: PathBuf,
    original: String,
    updated: String,
    edits: Vec<usize>,
}

/// Apply a patch list.
///
/// Returns one result per edit, in declaration order.
pub fn apply_edits(
    list: &PatchList,
    root_override: Option<&Path>,
) -> Vec<(String, EditOutcome)> {
    let root = effective_root(list, root_override);

    let guard = match root.as_deref().map(TargetGuard::new).transpose() {
        Ok(guard) => guard,
        Err(e) => {
            let reason = e.to_string();
            return list
                .edits
                .iter()
                .map(|edit| {
                    (
                        edit.id.clone(),
                        Err(ApplicationError::Invalid {
                            reason: format!("unusable root: {reason}"),
                        }),
                    )
                })
                .collect();
        }
    };
    if let Some(guard) = &guard {
        debug!(root = %guard.root().display(), "confining edits to root");
    }

    // Group by target, keeping first-appearance order
    let mut groups: Vec<FileGroup> = Vec::new();
    for (idx, edit) in list.edits.iter().enumerate() {
        let path = target_path(list, root.as_deref(), edit);
        match groups.iter_mut().find(|group| group.path == path) {
            Some(group) => group.edits.push(idx),
            None => groups.push(FileGroup {
                path,
                edits: vec![idx],
            }),
        }
    }

    let mut results: Vec<Option<EditOutcome>> = list.edits.iter().map(|_| None).collect();
    let staged: Vec<Staged> = groups
        .into_iter()
        .filter_map(|group| stage_file(list, group, guard.as_ref(), &mut results))
        .collect();

    let failures = results
        .iter()
        .filter(|slot| matches!(slot, Some(Err(_))))
        .count();

    if failures > 0 {
        warn!(failures, "aborting batch, no files written");
        abort_applied(
            results.iter_mut(),
            &format!("batch aborted: {failures} edit(s) failed"),
        );
    } else {
        commit(&staged, guard.as_ref(), &mut results);
    }

    list.edits
        .iter()
        .zip(results)
        .map(|(edit, slot)| {
            let outcome = slot.unwrap_or_else(|| {
                Err(ApplicationError::Invalid {
                    reason: "edit was never staged".to_string(),
                })
            });
            (edit.id.clone(), outcome)
        })
        .collect()
}

/// Read one target and run its edits in memory. Returns `None` if any of
/// them failed; the failures are recorded in `results`.
fn stage_file(
    list: &PatchList,
    group: FileGroup,
    guard: Option<&TargetGuard>,
    results: &mut [Option<EditOutcome>],
) -> Option<Staged> {
    let (first, rest) = group.edits.split_first()?;

    let original = guard
        .map(|guard| guard.check(&group.path).map(|_| ()))
        .transpose()
        .map_err(ApplicationError::from)
        .and_then(|_| {
            read_text(&group.path).map_err(|e| match e {
                EditError::Io(source) => ApplicationError::Io {
                    path: group.path.clone(),
                    source,
                },
                other => ApplicationError::Edit {
                    file: group.path.clone(),
                    source: other,
                },
            })
        });

    let original = match original {
        Ok(content) => content,
        Err(err) => {
            error!(file = %group.path.display(), error = %err, "cannot stage target");
            results[*first] = Some(Err(err));
            for &idx in rest {
                results[idx] = Some(Ok(PatchResult::Aborted {
                    file: group.path.clone(),
                    reason: "target could not be read".to_string(),
                }));
            }
            return None;
        }
    };

    let mut buffer = original.clone();
    let mut broken = false;

    for &idx in &group.edits {
        let edit = &list.edits[idx];
        if broken {
            results[idx] = Some(Ok(PatchResult::Aborted {
                file: group.path.clone(),
                reason: "an earlier edit to this file failed".to_string(),
            }));
            continue;
        }

        let outcome = load_payload(list, edit)
            .and_then(|payload| apply_edit(&mut buffer, edit, &payload, &group.path));
        if let Err(err) = &outcome {
            error!(id = %edit.id, error = %err, "edit failed");
            broken = true;
        }
        results[idx] = Some(outcome);
    }

    if broken {
        None
    } else {
        Some(Staged {
            path: group.path,
            original,
            updated: buffer,
            edits: group.edits,
        })
    }
}

fn commit(staged: &[Staged], guard: Option<&TargetGuard>, results: &mut [Option<EditOutcome>]) {
    for (pos, target) in staged.iter().enumerate() {
        if target.updated == target.original {
            debug!(file = %target.path.display(), "unchanged, not rewriting");
            continue;
        }

        let written = guard
            .map(|guard| guard.check(&target.path).map(|_| ()))
            .transpose()
            .map_err(ApplicationError::from)
            .and_then(|_| {
                write_back(&target.path, &target.updated).map_err(|source| {
                    ApplicationError::Io {
                        path: target.path.clone(),
                        source,
                    }
                })
            });

        if let Err(err) = written {
            error!(file = %target.path.display(), error = %err, "write failed");

            // The first edit carries the error, the rest of this file and
            // every later file are reported as aborted.
            let mut err = Some(err);
            for &idx in &target.edits {
                if let Some(Ok(PatchResult::Applied { file })) = &mut results[idx] {
                    let file = std::mem::take(file);
                    results[idx] = Some(match err.take() {
                        Some(err) => Err(err),
                        None => Ok(PatchResult::Aborted {
                            file,
                            reason: "write of target failed".to_string(),
                        }),
                    });
                }
            }
            for later in &staged[pos + 1..] {
                for &idx in &later.edits {
                    abort_slot(&mut results[idx], "stopped after an earlier write failed");
                }
            }
            return;
        }
    }
}

/// Turn every `Applied` outcome into `Aborted`.
fn abort_applied<'a>(slots: impl Iterator<Item = &'a mut Option<EditOutcome>>, reason: &str) {
    for slot in slots {
        abort_slot(slot, reason);
    }
}

fn abort_slot(slot: &mut Option<EditOutcome>, reason: &str) {
    if let Some(Ok(PatchResult::Applied { file })) = slot {
        let file = std::mem::take(file);
        *slot = Some(Ok(PatchResult::Aborted {
            file,
            reason: reason.to_string(),
        }));
    }
}

fn load_payload(list: &PatchList, edit: &EditSpec) -> Result<String, ApplicationError> {
    match (&edit.payload, &edit.payload_file) {
        (Some(text), _) => Ok(text.clone()),
        (None, Some(file)) => {
            let path = match &list.source_dir {
                Some(dir) if file.is_relative() => dir.join(file),
                _ => file.clone(),
            };
            let text = fs::read_to_string(&path).map_err(|source| ApplicationError::Payload {
                path: path.clone(),
                source,
            })?;
            if text.is_empty() && edit.mode.is_insertion() {
                return Err(ApplicationError::Invalid {
                    reason: format!(
                        "edit '{}' inserts nothing: {} is empty",
                        edit.id,
                        path.display()
                    ),
                });
            }
            Ok(text)
        }
        (None, None) => Err(ApplicationError::Invalid {
            reason: format!("edit '{}' has no payload", edit.id),
        }),
    }
}

fn check_verify(
    verify: Option<&Verify>,
    anchor_text: &str,
    file: &Path,
) -> Result<(), ApplicationError> {
    let Some(verify) = verify else {
        return Ok(());
    };
    let verification = verify.to_verification().ok_or_else(|| ApplicationError::Invalid {
        reason: "unparseable verify hash".to_string(),
    })?;
    if verification.matches(anchor_text) {
        Ok(())
    } else {
        Err(ApplicationError::Mismatch {
            file: file.to_path_buf(),
            found_hash: hash_hex(anchor_text),
        })
    }
}

/// Apply one edit to `buffer`. On error `buffer` is left untouched.
fn apply_edit(
    buffer: &mut String,
    edit: &EditSpec,
    payload: &str,
    file: &Path,
) -> EditOutcome {
    match edit.mode {
        EditMode::InsertAfter | EditMode::InsertBefore | EditMode::ReplaceMatch => {
            apply_pattern_edit(buffer, edit, payload, file)
        }
        EditMode::InsertAtLineIndex => {
            let Locator::Line { index } = edit.locator else {
                return Err(ApplicationError::Invalid {
                    reason: format!("edit '{}' needs a line locator", edit.id),
                });
            };

            let lines = split_lines(buffer);
            let inserted = insert_at_line_index(&lines, index, payload).map_err(|source| {
                ApplicationError::Range {
                    file: file.to_path_buf(),
                    source,
                }
            })?;

            // Checked before verify: once applied, the line at `index` is the
            // payload's first line, not the verified one.
            let offset: usize = lines[..index].iter().map(|line| line.len()).sum();
            if buffer[offset..].starts_with(payload) {
                return Ok(PatchResult::AlreadyApplied {
                    file: file.to_path_buf(),
                });
            }

            check_verify(
                edit.verify.as_ref(),
                lines.get(index).copied().unwrap_or(""),
                file,
            )?;

            let updated = inserted.concat();
            debug!(id = %edit.id, line = index, "inserted block at line");
            *buffer = updated;
            Ok(PatchResult::Applied {
                file: file.to_path_buf(),
            })
        }
        EditMode::ReplaceRange => {
            let Some(range) = edit.locator.line_range() else {
                return Err(ApplicationError::Invalid {
                    reason: format!("edit '{}' needs a lines locator", edit.id),
                });
            };

            let lines = split_lines(buffer);
            let bounds = range
                .bounds(lines.len())
                .map_err(|source| ApplicationError::Range {
                    file: file.to_path_buf(),
                    source,
                })?;
            let current = lines[bounds.clone()].concat();
            if current == payload {
                return Ok(PatchResult::AlreadyApplied {
                    file: file.to_path_buf(),
                });
            }

            check_verify(edit.verify.as_ref(), &current, file)?;

            let updated = replace_lines(&lines, range, &[payload])
                .map_err(|source| ApplicationError::Range {
                    file: file.to_path_buf(),
                    source,
                })?
                .concat();
            debug!(
                id = %edit.id,
                start = bounds.start,
                end = bounds.end,
                "replaced line range"
            );
            *buffer = updated;
            Ok(PatchResult::Applied {
                file: file.to_path_buf(),
            })
        }
    }
}

fn apply_pattern_edit(
    buffer: &mut String,
    edit: &EditSpec,
    payload: &str,
    file: &Path,
) -> EditOutcome {
    let locator = match edit.locator.pattern_locator() {
        Some(Ok(locator)) => locator,
        Some(Err(source)) => {
            return Err(ApplicationError::Locate {
                file: file.to_path_buf(),
                source,
            })
        }
        None => {
            return Err(ApplicationError::Invalid {
                reason: format!("edit '{}' needs a pattern locator", edit.id),
            })
        }
    };

    let anchor = match find_anchor(buffer, &locator) {
        Ok(span) => span,
        Err(source) => {
            return Err(ApplicationError::Locate {
                file: file.to_path_buf(),
                source,
            })
        }
    };
    debug!(
        id = %edit.id,
        span = %anchor,
        policy = ?locator.match_policy(),
        "located anchor"
    );

    check_verify(
        edit.verify.as_ref(),
        &buffer[anchor.start..anchor.end],
        file,
    )?;

    let span = match edit.mode {
        EditMode::InsertAfter => {
            if buffer[anchor.end..].starts_with(payload) {
                return Ok(PatchResult::AlreadyApplied {
                    file: file.to_path_buf(),
                });
            }
            Span::empty(anchor.end)
        }
        EditMode::InsertBefore => {
            if buffer[..anchor.start].ends_with(payload) {
                return Ok(PatchResult::AlreadyApplied {
                    file: file.to_path_buf(),
                });
            }
            Span::empty(anchor.start)
        }
        _ => {
            // A replacement that keeps and extends the anchor text still
            // matches on the next run.
            if payload.len() >= anchor.len() && buffer[anchor.start..].starts_with(payload) {
                return Ok(PatchResult::AlreadyApplied {
                    file: file.to_path_buf(),
                });
            }
            anchor
        }
    };

    let expected = EditVerification::ExactMatch(buffer[span.start..span.end].to_string());
    let primitive = Edit::with_verification(file, span, payload, expected);
    primitive
        .apply_to(buffer)
        .map(PatchResult::from)
        .map_err(|source| ApplicationError::Edit {
            file: file.to_path_buf(),
            source,
        })
}
