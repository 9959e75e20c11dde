//! Anchor Patch: literal text edits at regex or line anchors
//!
//! Splices a literal payload into a file that is treated as opaque text.
//! The anchor is found with a regular expression over the whole content or
//! given as a line number or line range.
//!
//! # Architecture
//!
//! - [`locator`] finds an anchor and refuses to guess: no match and more
//!   than one match are both errors unless first-match is requested.
//! - [`splice`] and [`lines`] are the pure transforms.
//! - [`Edit`] is the verified byte-span replacement pattern edits compile to.
//! - [`config`] applies an ordered patch list as one batch: everything is
//!   located and transformed in memory before any file is written.
//!
//! # Safety
//!
//! - Atomic file writes (tempfile + fsync + rename)
//! - Ambiguous anchors and out-of-range lines are rejected before slicing
//! - Optional anchor verification (exact text or xxh3 hash)
//! - Targets confined to a root directory when one is given
//!
//! # Example
//!
//! ```no_run
//! use anchor_patch::{find_anchor, insert_after, write_back, PatternLocator};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let path = Path::new("resources/js/Pages/Admin/Settings.jsx");
//! let content = std::fs::read_to_string(path)?;
//!
//! let locator = PatternLocator::new(r"const \[resources, setResources\] = useState\([^)]*\);")?;
//! let span = find_anchor(&content, &locator)?;
//! let updated = insert_after(&content, span, "\n    const [timeline, setTimeline] = useState([]);");
//!
//! write_back(path, &updated)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod edit;
pub mod lines;
pub mod locator;
pub mod logging;
pub mod safety;
pub mod splice;

// Re-exports
pub use config::{
    apply_edits, load_from_path, load_from_str, ApplicationError, ConfigError, EditMode, EditSpec,
    Locator, PatchList, PatchResult,
};
pub use edit::{write_back, Edit, EditError, EditResult, EditVerification};
pub use lines::{insert_at_line_index, replace_lines, replace_range, split_lines, LineRange, RangeError};
pub use locator::{find_anchor, CaptureGroup, LocateError, MatchPolicy, PatternLocator, PatternOptions};
pub use safety::{SafetyError, TargetGuard};
pub use splice::{insert_after, insert_before, replace_span, Span};
