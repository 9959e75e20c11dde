use crate::config::schema::{PatchList, ValidationError};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Toml {
        path: Option<PathBuf>,
        source: toml_edit::de::Error,
    },
    Validation {
        path: Option<PathBuf>,
        source: ValidationError,
    },
    /// A patch directory could not be listed
    Discovery {
        path: PathBuf,
        source: walkdir::Error,
    },
    /// A patch directory holds no `*.toml` files
    NoPatchFiles { dir: PathBuf },
}

impl ConfigError {
    fn with_path(self, path: &Path) -> Self {
        let path = path.to_path_buf();
        match self {
            ConfigError::Toml { path: None, source } => ConfigError::Toml {
                path: Some(path),
                source,
            },
            ConfigError::Validation { path: None, source } => ConfigError::Validation {
                path: Some(path),
                source,
            },
            other => other,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(
                    f,
                    "failed to read patch list from {}: {}",
                    path.display(),
                    source
                )
            }
            ConfigError::Toml { path, source } => match path {
                Some(path) => write!(
                    f,
                    "failed to parse patch list TOML ({}): {}",
                    path.display(),
                    source
                ),
                None => write!(f, "failed to parse patch list TOML: {}", source),
            },
            ConfigError::Validation { path, source } => match path {
                Some(path) => write!(f, "invalid patch list ({}):\n{}", path.display(), source),
                None => write!(f, "invalid patch list:\n{}", source),
            },
            ConfigError::Discovery { path, source } => {
                write!(f, "failed to list patch lists in {}: {}", path.display(), source)
            }
            ConfigError::NoPatchFiles { dir } => {
                write!(f, "no .toml patch lists found in {}", dir.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Toml { source, .. } => Some(source),
            ConfigError::Validation { source, .. } => Some(source),
            ConfigError::Discovery { source, .. } => Some(source),
            ConfigError::NoPatchFiles { .. } => None,
        }
    }
}

/// Parse and validate a patch list. Relative paths in it resolve against
/// the current directory unless `meta.root` says otherwise.
pub fn load_from_str(input: &str) -> Result<PatchList, ConfigError> {
    let list: PatchList = toml_edit::de::from_str(input)
        .map_err(|source| ConfigError::Toml { path: None, source })?;
    list.validate()
        .map_err(|source| ConfigError::Validation { path: None, source })?;
    Ok(list)
}

/// Load a patch list file. Relative paths in it resolve against the file's
/// own directory.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<PatchList, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut list = load_from_str(&contents).map_err(|error| error.with_path(path))?;
    list.source_dir = path.parent().map(Path::to_path_buf);
    Ok(list)
}

/// Expand patch-list arguments into files.
///
/// Files are taken as given. A directory contributes its own `*.toml` files
/// (not those of subdirectories), sorted by name so numeric prefixes set
/// the order. A directory without any is an error.
pub fn patch_files(inputs: &[PathBuf]) -> Result<Vec<PathBuf>, ConfigError> {
    let mut files = Vec::new();
    for input in inputs {
        if !input.is_dir() {
            files.push(input.clone());
            continue;
        }

        let mut found = Vec::new();
        for entry in WalkDir::new(input).max_depth(1) {
            let entry = entry.map_err(|source| ConfigError::Discovery {
                path: input.clone(),
                source,
            })?;
            if entry.file_type().is_file()
                && entry.path().extension().and_then(|s| s.to_str()) == Some("toml")
            {
                found.push(entry.path().to_path_buf());
            }
        }
        if found.is_empty() {
            return Err(ConfigError::NoPatchFiles { dir: input.clone() });
        }
        found.sort();
        files.extend(found);
    }
    Ok(files)
}
