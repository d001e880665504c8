//! Include file lookup.

use super::error::TemplateError;
use std::path::{Path, PathBuf};

/// Ordered list of directories include files are searched in.
#[derive(Debug, Clone, Default)]
pub struct IncludePath {
    dirs: Vec<PathBuf>,
}

impl IncludePath {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    /// Find an include file by name.
    ///
    /// Absolute names are used as-is; relative names are tried against each
    /// directory in order and the first existing file wins.
    pub fn find(&self, name: &str, required_by: &str) -> Result<PathBuf, TemplateError> {
        let candidate = Path::new(name);
        if candidate.is_absolute() && candidate.is_file() {
            return Ok(candidate.to_path_buf());
        }

        self.dirs
            .iter()
            .map(|dir| dir.join(name))
            .find(|path| path.is_file())
            .ok_or_else(|| TemplateError::IncludeNotFound {
                name: name.to_string(),
                searched: self.dirs.clone(),
                required_by: required_by.to_string(),
            })
    }

    /// Find and read an include file.
    pub fn read(&self, name: &str, required_by: &str) -> Result<(PathBuf, String), TemplateError> {
        let path = self.find(name, required_by)?;
        let text = read_file(&path)?;
        Ok((path, text))
    }
}

/// Read a template file.
pub fn read_file(path: &Path) -> Result<String, TemplateError> {
    std::fs::read_to_string(path).map_err(|e| TemplateError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
