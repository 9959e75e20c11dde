pub mod applicator;
pub mod loader;
pub mod schema;

pub use applicator::{
    apply_edits, effective_root, target_path, ApplicationError, EditOutcome, PatchResult,
};
pub use loader::{load_from_path, load_from_str, patch_files, ConfigError};
pub use schema::{
    EditMode, EditSpec, HashAlgorithm, Locator, Metadata, PatchList, ValidationError,
    ValidationIssue, Verify,
};
