use crate::error::TransferError;
use std::path::{Component, Path, PathBuf};

/// Confines caller-supplied relative paths to a fixed data directory.
#[derive(Debug, Clone)]
pub struct PathSandbox {
    root: PathBuf,
}

fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

impl PathSandbox {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = if root.is_absolute() {
            root
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(&root))
                .unwrap_or(root)
        };
        Self {
            root: normalize(&root),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, user_path: &str) -> Result<PathBuf, TransferError> {
        let trimmed = user_path.trim();
        if trimmed.is_empty() {
            return Err(TransferError::Config("File path is required.".to_string()));
        }

        if trimmed.contains("..") || trimmed.starts_with('/') || trimmed.starts_with('\\') {
            log::warn!("Rejected potentially unsafe path: {}", trimmed);
            return Err(TransferError::Config(format!(
                "Invalid file path: '{}'. Paths must be relative to the data directory.",
                trimmed
            )));
        }

        let resolved = normalize(&self.root.join(trimmed));
        if !resolved.starts_with(&self.root) || resolved == self.root {
            log::warn!(
                "Path '{}' resolved outside the data directory: {}",
                trimmed,
                resolved.display()
            );
            return Err(TransferError::Config(format!(
                "Invalid file path: '{}'. Paths must stay inside the data directory.",
                trimmed
            )));
        }

        Ok(resolved)
    }
}
