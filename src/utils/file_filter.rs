use glob::Pattern;
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::AppError;
use crate::upload::LocalFile;

/// Turns command-line paths into the ordered list of files to upload.
///
/// Directories are walked honoring `.gitignore` and hidden-file rules; the
/// include patterns then apply to the walked files relative to their root.
/// Files named explicitly are always kept.
#[derive(Debug, Default, Clone)]
pub struct FileFilter {
    include: Vec<Pattern>,
}

impl FileFilter {
    pub fn new(patterns: &[String]) -> Result<Self, AppError> {
        let include = patterns
            .iter()
            .map(|pattern| {
                let processed = if pattern.starts_with("**/") {
                    pattern.to_string()
                } else {
                    format!("**/{}", pattern)
                };
                Pattern::new(&processed).map_err(|source| AppError::Pattern {
                    pattern: pattern.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { include })
    }

    pub fn matches(&self, relative_path: &Path) -> bool {
        self.include.is_empty() || self.include.iter().any(|p| p.matches_path(relative_path))
    }

    pub fn collect(&self, paths: &[PathBuf]) -> Result<Vec<LocalFile>, AppError> {
        let mut files = Vec::new();

        for path in paths {
            if path.is_dir() {
                self.walk(path, &mut files)?;
            } else {
                files.push(read_file(path)?);
            }
        }

        debug!(count = files.len(), "Collected files for upload");
        Ok(files)
    }

    fn walk(&self, root: &Path, files: &mut Vec<LocalFile>) -> Result<(), AppError> {
        let walker = WalkBuilder::new(root)
            .sort_by_file_name(|a, b| a.cmp(b))
            .build();

        for result in walker {
            let entry = match result {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(root = %root.display(), error = %e, "Error walking directory");
                    continue;
                }
            };

            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let relative = path.strip_prefix(root).unwrap_or(path);
            if self.matches(relative) {
                files.push(read_file(path)?);
            } else {
                debug!(path = %relative.display(), "Skipped by include patterns");
            }
        }

        Ok(())
    }
}

fn read_file(path: &Path) -> Result<LocalFile, AppError> {
    LocalFile::from_path(path).map_err(|e| AppError::Input {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
