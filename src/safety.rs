use std::path::{Path, PathBuf};
use thiserror::Error;

/// Directory names under the root that patch lists may never touch.
const FORBIDDEN_DIRS: &[&str] = &[".git"];

/// Keeps edit targets inside a root directory.
///
/// Targets are canonicalised first, so `..` components and symlinks that
/// lead out of the root are rejected.
#[derive(Debug, Clone)]
pub struct TargetGuard {
    root: PathBuf,
    forbidden: Vec<PathBuf>,
}

#[derive(Error, Debug)]
pub enum SafetyError {
    #[error("Path is outside root: {path} (root: {root})")]
    OutsideRoot { path: PathBuf, root: PathBuf },

    #[error("Path is in forbidden directory: {path} (forbidden: {forbidden})")]
    ForbiddenPath { path: PathBuf, forbidden: PathBuf },

    #[error("Failed to canonicalize path: {0}")]
    Canonicalize(#[from] std::io::Error),
}

impl TargetGuard {
    pub fn new(root: impl AsRef<Path>) -> Result<Self, SafetyError> {
        let root = root.as_ref().canonicalize()?;
        let forbidden = FORBIDDEN_DIRS.iter().map(|dir| root.join(dir)).collect();
        Ok(Self { root, forbidden })
    }

    /// Check that `path` may be edited. Returns its canonical form.
    ///
    /// Run again right before writing; the answer can change in between.
    pub fn check(&self, path: impl AsRef<Path>) -> Result<PathBuf, SafetyError> {
        let path = path.as_ref();
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        let canonical = absolute.canonicalize()?;

        if !canonical.starts_with(&self.root) {
            return Err(SafetyError::OutsideRoot {
                path: canonical,
                root: self.root.clone(),
            });
        }

        if let Some(forbidden) = self.forbidden.iter().find(|dir| canonical.starts_with(dir)) {
            return Err(SafetyError::ForbiddenPath {
                path: canonical,
                forbidden: forbidden.clone(),
            });
        }

        Ok(canonical)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
