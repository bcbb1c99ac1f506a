//! Allowed-directory sandbox.
//!
//! Every path is canonicalized (symlinks resolved) before it is compared with
//! the allowed roots, so a link planted inside a root cannot reach outside it.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{FsError, FsResult};

/// The canonicalized set of directories a server may touch.
#[derive(Debug, Clone)]
pub struct Sandbox {
    roots: Vec<PathBuf>,
    home_dir: Option<PathBuf>,
}

impl Sandbox {
    /// Build the sandbox from directory arguments.
    ///
    /// Each directory must exist; duplicates (after canonicalization) collapse.
    pub fn new(directories: impl IntoIterator<Item = impl AsRef<str>>) -> FsResult<Self> {
        let home_dir = dirs::home_dir();
        let mut roots: Vec<PathBuf> = Vec::new();

        for dir in directories {
            let expanded = expand_home(dir.as_ref(), home_dir.as_deref());
            let canonical = expanded
                .canonicalize()
                .map_err(|e| FsError::Config(format!("{}: {e}", expanded.display())))?;
            if !canonical.is_dir() {
                return Err(FsError::Config(format!(
                    "{} is not a directory",
                    canonical.display()
                )));
            }
            if !roots.contains(&canonical) {
                roots.push(canonical);
            }
        }

        if roots.is_empty() {
            return Err(FsError::Config(
                "at least one allowed directory is required".to_string(),
            ));
        }

        Ok(Self { roots, home_dir })
    }

    /// Canonical allowed roots, in argument order.
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Whether a canonical path equals or descends from an allowed root.
    pub fn contains(&self, canonical: &Path) -> bool {
        self.roots.iter().any(|root| canonical.starts_with(root))
    }

    /// Resolve a path that must already exist.
    pub fn resolve_existing(&self, path: &str) -> FsResult<PathBuf> {
        let absolute = self.absolute(path)?;

        match absolute.canonicalize() {
            Ok(canonical) => {
                self.check(&canonical)?;
                Ok(canonical)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(self.missing(&absolute)),
            Err(e) => Err(FsError::Io(e)),
        }
    }

    /// Resolve a path that is about to be created or overwritten.
    ///
    /// For a file that does not exist yet the parent directory is
    /// canonicalized and checked instead.
    pub fn resolve_for_write(&self, path: &str) -> FsResult<PathBuf> {
        let absolute = self.absolute(path)?;

        match absolute.canonicalize() {
            Ok(canonical) => {
                self.check(&canonical)?;
                Ok(canonical)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                // A dangling link could point anywhere once written through.
                if absolute.symlink_metadata().is_ok() {
                    return Err(FsError::AccessDenied(format!(
                        "{} is a symlink to a missing target",
                        absolute.display()
                    )));
                }

                let file_name = absolute
                    .file_name()
                    .ok_or_else(|| FsError::InvalidPath(format!("{} has no file name", absolute.display())))?;
                let parent = absolute
                    .parent()
                    .ok_or_else(|| FsError::InvalidPath(format!("{} has no parent", absolute.display())))?;

                let canonical_parent = match parent.canonicalize() {
                    Ok(p) => p,
                    Err(e) if e.kind() == ErrorKind::NotFound => return Err(self.missing(parent)),
                    Err(e) => return Err(FsError::Io(e)),
                };
                self.check(&canonical_parent)?;

                Ok(canonical_parent.join(file_name))
            }
            Err(e) => Err(FsError::Io(e)),
        }
    }

    fn check(&self, canonical: &Path) -> FsResult<()> {
        if self.contains(canonical) {
            Ok(())
        } else {
            Err(FsError::AccessDenied(format!(
                "{} is outside the allowed directories",
                canonical.display()
            )))
        }
    }

    /// Error for a path that does not exist: `NotFound` only when its nearest
    /// existing ancestor lies inside the sandbox.
    fn missing(&self, absolute: &Path) -> FsError {
        let inside = absolute
            .ancestors()
            .skip(1)
            .find_map(|ancestor| ancestor.canonicalize().ok())
            .is_some_and(|ancestor| self.contains(&ancestor));

        if inside {
            FsError::NotFound(absolute.display().to_string())
        } else {
            FsError::AccessDenied(format!(
                "{} is outside the allowed directories",
                absolute.display()
            ))
        }
    }

    fn absolute(&self, path: &str) -> FsResult<PathBuf> {
        if path.is_empty() {
            return Err(FsError::InvalidPath("empty path".to_string()));
        }
        if path.contains('\0') {
            return Err(FsError::InvalidPath("path contains null byte".to_string()));
        }

        let expanded = expand_home(path, self.home_dir.as_deref());
        if expanded.is_absolute() {
            Ok(expanded)
        } else {
            Ok(std::env::current_dir()?.join(expanded))
        }
    }
}

fn expand_home(path: &str, home_dir: Option<&Path>) -> PathBuf {
    match home_dir {
        Some(home) if path == "~" => home.to_path_buf(),
        Some(home) => match path.strip_prefix("~/") {
            Some(stripped) => home.join(stripped),
            None => PathBuf::from(path),
        },
        None => PathBuf::from(path),
    }
}
