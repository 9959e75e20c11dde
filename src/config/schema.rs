use crate::edit::EditVerification;
use crate::lines::LineRange;
use crate::locator::{CaptureGroup, LocateError, MatchPolicy, PatternLocator, PatternOptions};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

/// An ordered list of edits, applied as one batch.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct PatchList {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub edits: Vec<EditSpec>,
    /// Directory of the file this list was loaded from.
    #[serde(skip)]
    pub source_dir: Option<PathBuf>,
}

impl PatchList {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.edits.is_empty() {
            issues.push(ValidationIssue::EmptyEditList);
        }

        let mut seen = HashSet::new();
        for edit in &self.edits {
            if edit.id.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    edit_id: None,
                    field: "id",
                });
            } else if !seen.insert(edit.id.as_str()) {
                issues.push(ValidationIssue::DuplicateId(edit.id.clone()));
            }
            if edit.file.as_os_str().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    edit_id: Some(edit.id.clone()),
                    field: "file",
                });
            }

            match (&edit.payload, &edit.payload_file) {
                (Some(_), Some(_)) => issues.push(ValidationIssue::InvalidCombo {
                    edit_id: Some(edit.id.clone()),
                    message: "payload and payload_file are mutually exclusive".to_string(),
                }),
                (None, None) => issues.push(ValidationIssue::MissingField {
                    edit_id: Some(edit.id.clone()),
                    field: "payload",
                }),
                (Some(text), None) if text.is_empty() && edit.mode.is_insertion() => {
                    issues.push(ValidationIssue::MissingField {
                        edit_id: Some(edit.id.clone()),
                        field: "payload",
                    })
                }
                _ => {}
            }

            match &edit.locator {
                Locator::Pattern { regex, .. } => {
                    if regex.is_empty() {
                        issues.push(ValidationIssue::MissingField {
                            edit_id: Some(edit.id.clone()),
                            field: "locator.regex",
                        });
                    } else if let Some(Err(err)) = edit.locator.pattern_locator() {
                        issues.push(ValidationIssue::InvalidCombo {
                            edit_id: Some(edit.id.clone()),
                            message: err.to_string(),
                        });
                    }
                }
                Locator::Line { .. } => {}
                Locator::Lines { start, end, .. } => {
                    if start > end {
                        issues.push(ValidationIssue::InvalidCombo {
                            edit_id: Some(edit.id.clone()),
                            message: format!("line range start {start} is after end {end}"),
                        });
                    }
                }
            }

            if !edit.mode.accepts(&edit.locator) {
                issues.push(ValidationIssue::InvalidCombo {
                    edit_id: Some(edit.id.clone()),
                    message: format!(
                        "mode {} requires a {} locator",
                        edit.mode,
                        edit.mode.locator_kind()
                    ),
                });
            }

            if let Some(Verify::Hash { expected, .. }) = &edit.verify {
                if EditVerification::parse_hash(expected).is_none() {
                    issues.push(ValidationIssue::InvalidCombo {
                        edit_id: Some(edit.id.clone()),
                        message: format!("invalid hash value: {expected}"),
                    });
                }
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Directory relative `file` entries resolve against. Targets must stay
    /// inside it.
    #[serde(default)]
    pub root: Option<PathBuf>,
}

/// One edit: where, how, and what to splice in.
#[derive(Debug, Deserialize, Clone)]
pub struct EditSpec {
    pub id: String,
    pub file: PathBuf,
    pub mode: EditMode,
    pub locator: Locator,
    #[serde(default)]
    pub payload: Option<String>,
    /// Payload read from a file, relative to the patch list's directory.
    #[serde(default)]
    pub payload_file: Option<PathBuf>,
    #[serde(default)]
    pub verify: Option<Verify>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum EditMode {
    InsertAfter,
    InsertBefore,
    ReplaceMatch,
    #[serde(rename = "insert-at-line")]
    InsertAtLineIndex,
    ReplaceRange,
}

impl EditMode {
    /// Modes that add text without removing any.
    pub fn is_insertion(self) -> bool {
        matches!(
            self,
            EditMode::InsertAfter | EditMode::InsertBefore | EditMode::InsertAtLineIndex
        )
    }

    pub fn accepts(self, locator: &Locator) -> bool {
        matches!(
            (self, locator),
            (
                EditMode::InsertAfter | EditMode::InsertBefore | EditMode::ReplaceMatch,
                Locator::Pattern { .. }
            ) | (EditMode::InsertAtLineIndex, Locator::Line { .. })
                | (EditMode::ReplaceRange, Locator::Lines { .. })
        )
    }

    fn locator_kind(self) -> &'static str {
        match self {
            EditMode::InsertAfter | EditMode::InsertBefore | EditMode::ReplaceMatch => "pattern",
            EditMode::InsertAtLineIndex => "line",
            EditMode::ReplaceRange => "lines",
        }
    }
}

impl fmt::Display for EditMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EditMode::InsertAfter => "insert-after",
            EditMode::InsertBefore => "insert-before",
            EditMode::ReplaceMatch => "replace-match",
            EditMode::InsertAtLineIndex => "insert-at-line",
            EditMode::ReplaceRange => "replace-range",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Locator {
    /// Regex over the whole file content.
    Pattern {
        regex: String,
        #[serde(default)]
        dot_matches_newline: bool,
        #[serde(default)]
        multi_line: bool,
        #[serde(default)]
        case_insensitive: bool,
        #[serde(default)]
        capture: Option<CaptureGroup>,
        #[serde(default, rename = "match")]
        policy: MatchPolicy,
    },
    /// A single 0-based line index.
    Line { index: usize },
    /// 0-based line range.
    Lines {
        start: usize,
        end: usize,
        #[serde(default = "default_true")]
        end_inclusive: bool,
    },
}

fn default_true() -> bool {
    true
}

impl Locator {
    /// Compile a pattern locator; `None` for line locators.
    pub fn pattern_locator(&self) -> Option<Result<PatternLocator, LocateError>> {
        let Locator::Pattern {
            regex,
            dot_matches_newline,
            multi_line,
            case_insensitive,
            capture,
            policy,
        } = self
        else {
            return None;
        };

        let options = PatternOptions {
            dot_matches_newline: *dot_matches_newline,
            multi_line: *multi_line,
            case_insensitive: *case_insensitive,
        };
        let compiled = PatternLocator::with_options(regex, options).map(|locator| {
            let locator = locator.policy(*policy);
            match capture {
                Some(group) => locator.capture(group.clone()),
                None => locator,
            }
        });
        Some(compiled)
    }

    pub fn line_range(&self) -> Option<LineRange> {
        match self {
            Locator::Lines {
                start,
                end,
                end_inclusive,
            } => Some(LineRange {
                start: *start,
                end: *end,
                end_inclusive: *end_inclusive,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Verify {
    ExactMatch {
        expected_text: String,
    },
    Hash {
        #[serde(default)]
        algorithm: Option<HashAlgorithm>,
        expected: String,
    },
}

impl Verify {
    pub fn to_verification(&self) -> Option<EditVerification> {
        match self {
            Verify::ExactMatch { expected_text } => {
                Some(EditVerification::ExactMatch(expected_text.clone()))
            }
            Verify::Hash { expected, .. } => EditVerification::parse_hash(expected),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum HashAlgorithm {
    Xxh3,
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    EmptyEditList,
    DuplicateId(String),
    MissingField {
        edit_id: Option<String>,
        field: &'static str,
    },
    InvalidCombo {
        edit_id: Option<String>,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyEditList => write!(f, "patch list contains no edits"),
            ValidationIssue::DuplicateId(id) => write!(f, "edit id '{id}' is used more than once"),
            ValidationIssue::MissingField { edit_id, field } => match edit_id {
                Some(id) => write!(f, "edit '{id}' missing required field '{field}'"),
                None => write!(f, "edit missing required field '{field}'"),
            },
            ValidationIssue::InvalidCombo { edit_id, message } => match edit_id {
                Some(id) => write!(f, "edit '{id}' has invalid configuration: {message}"),
                None => write!(f, "invalid patch list: {message}"),
            },
        }
    }
}
