use crate::splice::{self, Span};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use xxhash_rust::xxh3::xxh3_64;

/// The fundamental edit primitive: byte-span replacement with verification.
///
/// Pattern-anchored insertions and replacements compile down to this. An
/// insertion is a zero-width span whose `new_text` is the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "Edit does nothing until applied"]
pub struct Edit {
    /// Path to the file to edit
    pub file: PathBuf,
    /// Starting byte offset (inclusive)
    pub byte_start: usize,
    /// Ending byte offset (exclusive)
    pub byte_end: usize,
    /// New text to put at [byte_start, byte_end)
    pub new_text: String,
    /// What we expect to find at the span before applying
    pub expected_before: EditVerification,
}

/// Verification strategy for edit safety.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditVerification {
    /// Exact text match required
    ExactMatch(String),
    /// xxh3 hash of expected text (cheaper to carry for large spans)
    Hash(u64),
}

impl EditVerification {
    /// Check if the provided text matches the verification criteria.
    pub fn matches(&self, text: &str) -> bool {
        match self {
            EditVerification::ExactMatch(expected) => text == expected,
            EditVerification::Hash(expected_hash) => xxh3_64(text.as_bytes()) == *expected_hash,
        }
    }

    /// Create verification from text, using hash for text over 1KB.
    pub fn from_text(text: &str) -> Self {
        if text.len() > 1024 {
            EditVerification::Hash(xxh3_64(text.as_bytes()))
        } else {
            EditVerification::ExactMatch(text.to_string())
        }
    }

    /// Parse a hex xxh3 digest, with or without a `0x` prefix.
    pub fn parse_hash(hex: &str) -> Option<Self> {
        u64::from_str_radix(hex.trim().trim_start_matches("0x"), 16)
            .ok()
            .map(EditVerification::Hash)
    }
}

/// Hex xxh3 digest of `text`, in the form [`EditVerification::parse_hash`] reads.
pub fn hash_hex(text: &str) -> String {
    format!("0x{:016x}", xxh3_64(text.as_bytes()))
}

#[derive(Error, Debug)]
pub enum EditError {
    #[error("Before-text verification failed at {file}:{byte_start}")]
    BeforeTextMismatch {
        file: PathBuf,
        byte_start: usize,
        byte_end: usize,
        expected: String,
        found: String,
    },

    #[error("Invalid byte range: [{byte_start}, {byte_end}) in file of length {file_len}")]
    InvalidByteRange {
        byte_start: usize,
        byte_end: usize,
        file_len: usize,
    },

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("UTF-8 validation error: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

/// Result of applying an edit.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "EditResult should be checked for success/already-applied"]
pub enum EditResult {
    /// Edit was successfully applied
    Applied { file: PathBuf, bytes_changed: usize },
    /// Edit was already applied (current text matches new_text)
    AlreadyApplied { file: PathBuf },
}

impl Edit {
    /// Create a new edit with automatic verification generation.
    pub fn new(
        file: impl Into<PathBuf>,
        byte_start: usize,
        byte_end: usize,
        new_text: impl Into<String>,
        expected_before: impl Into<String>,
    ) -> Self {
        let expected = expected_before.into();
        Self {
            file: file.into(),
            byte_start,
            byte_end,
            new_text: new_text.into(),
            expected_before: EditVerification::from_text(&expected),
        }
    }

    /// Create an edit with explicit verification strategy.
    pub fn with_verification(
        file: impl Into<PathBuf>,
        span: Span,
        new_text: impl Into<String>,
        verification: EditVerification,
    ) -> Self {
        Self {
            file: file.into(),
            byte_start: span.start,
            byte_end: span.end,
            new_text: new_text.into(),
            expected_before: verification,
        }
    }

    pub fn span(&self) -> Span {
        Span {
            start: self.byte_start,
            end: self.byte_end,
        }
    }

    /// Validate the edit against `content`.
    ///
    /// Returns the current text at [byte_start, byte_end) if validation succeeds.
    fn validate<'a>(&self, content: &'a str) -> Result<&'a str, EditError> {
        if !self.span().fits(content) {
            return Err(EditError::InvalidByteRange {
                byte_start: self.byte_start,
                byte_end: self.byte_end,
                file_len: content.len(),
            });
        }

        let current_text = &content[self.byte_start..self.byte_end];

        // Already applied
        if current_text == self.new_text {
            return Ok(current_text);
        }

        if !self.expected_before.matches(current_text) {
            return Err(EditError::BeforeTextMismatch {
                file: self.file.clone(),
                byte_start: self.byte_start,
                byte_end: self.byte_end,
                expected: format!("{:?}", self.expected_before),
                found: current_text.to_string(),
            });
        }

        Ok(current_text)
    }

    /// Apply this edit to an in-memory buffer.
    pub fn apply_to(&self, content: &mut String) -> Result<EditResult, EditError> {
        let current_text = self.validate(content.as_str())?;

        if current_text == self.new_text {
            return Ok(EditResult::AlreadyApplied {
                file: self.file.clone(),
            });
        }

        *content = splice::replace_span(content.as_str(), self.span(), &self.new_text);

        Ok(EditResult::Applied {
            file: self.file.clone(),
            bytes_changed: self.new_text.len(),
        })
    }

    /// Apply this edit to the file system atomically.
    pub fn apply(&self) -> Result<EditResult, EditError> {
        let mut content = read_text(&self.file)?;
        let result = self.apply_to(&mut content)?;
        if matches!(result, EditResult::Applied { .. }) {
            write_back(&self.file, &content)?;
        }
        Ok(result)
    }
}

/// Read a whole file as UTF-8 text.
pub fn read_text(path: &Path) -> Result<String, EditError> {
    let bytes = fs::read(path)?;
    String::from_utf8(bytes).map_err(|e| EditError::Utf8(e.utf8_error()))
}

/// Overwrite `path` with `content`: tempfile in the same directory, fsync,
/// rename into place.
///
/// Bytes are written as given, with no line-ending translation. The existing
/// file's permissions carry over. A symlink is written through: its target
/// is replaced and the link stays. On any error the temporary file is
/// removed and `path` is left as it was.
pub fn write_back(path: &Path, content: &str) -> std::io::Result<()> {
    let resolved;
    let path = match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => {
            resolved = fs::canonicalize(path)?;
            resolved.as_path()
        }
        _ => path,
    };

    // Same directory keeps the rename on one filesystem
    let parent = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        Some(_) => Path::new("."),
        None => {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Path has no parent directory",
            ))
        }
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    debug!(temp = %temp.path().display(), target = %path.display(), "staging write");

    temp.write_all(content.as_bytes())?;
    if let Ok(meta) = fs::metadata(path) {
        temp.as_file().set_permissions(meta.permissions())?;
    }
    temp.as_file().sync_all()?;

    temp.persist(path).map_err(|e| e.error)?;
    info!(file = %path.display(), bytes = content.len(), "wrote file");

    Ok(())
}
