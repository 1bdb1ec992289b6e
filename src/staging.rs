//! Staging sink for daybreak files.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::StagingError;

/// Somewhere named byte content can be written.
pub trait StagingSink {
    /// Write (overwrite) `filename` with `data`, returning where it landed.
    fn write(&self, filename: &str, data: &[u8]) -> Result<PathBuf, StagingError>;
}

/// Writes files into a single directory, creating it on first use.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl StagingSink for DirectorySink {
    fn write(&self, filename: &str, data: &[u8]) -> Result<PathBuf, StagingError> {
        // Plain file names only; nothing may escape the staging directory.
        let name = Path::new(filename);
        if filename.is_empty() || name.file_name().is_none_or(|n| n != name.as_os_str()) {
            return Err(StagingError::InvalidFilename(filename.to_string()));
        }

        fs::create_dir_all(&self.dir).map_err(|source| StagingError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let path = self.dir.join(name);
        fs::write(&path, data).map_err(|source| StagingError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}
