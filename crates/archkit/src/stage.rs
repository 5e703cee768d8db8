//! Staging workspace for one target
//!
//! Each processed target gets its own temporary directory. Renamed
//! sources are presented there as symlinks and compression schemes write
//! their output there. The directory is removed when the [`Stage`] is
//! dropped, whatever happened in between.

use crate::compress::{SchemeRegistry, link_into, staged_path};
use crate::error::{Error, Result};
use crate::model::Target;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Temporary workspace scoped to one target
pub struct Stage {
    dir: TempDir,
}

impl Stage {
    /// Create a workspace under `root`, or the system temp directory
    pub fn new(root: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("arkive-");
        let dir = match root {
            Some(root) => builder.tempdir_in(root).map_err(|e| Error::io(root, e))?,
            None => builder
                .tempdir()
                .map_err(|e| Error::io(std::env::temp_dir(), e))?,
        };
        log::debug!("Created staging workspace {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Rename and compress the sources of `target`
    ///
    /// Returns the paths to hand to the archive command.
    pub fn prepare(&self, target: &mut Target, registry: &SchemeRegistry) -> Result<Vec<PathBuf>> {
        if target.needs_rename() {
            for source in target.sources.values_mut() {
                let link = staged_path(self.path(), &source.name);
                link_into(&source.orig_path, &link)?;
                source.path = link;
            }
        }

        if let Some(scheme) = target.compress_scheme.clone() {
            let handler = registry.get(&scheme).ok_or_else(|| Error::Compression {
                scheme: scheme.clone(),
                message: "scheme is not registered".to_string(),
            })?;
            handler.compress_sources(target, self.path())?;
        }

        Ok(target.effective_sources())
    }
}
