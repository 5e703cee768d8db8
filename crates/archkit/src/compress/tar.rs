//! Whole-target archives built with `tar` or `pax`

use super::{CompressionScheme, link_into, run_tool, staged_name};
use crate::error::Result;
use crate::model::Target;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// External archiver used to build the consolidated file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Tar,
    Pax,
}

impl ArchiveFormat {
    fn extension(&self) -> &'static str {
        match self {
            Self::Tar => "tar",
            Self::Pax => "pax",
        }
    }

    /// Command that writes `archive` from names relative to the current directory
    fn command(&self, archive: &Path) -> Command {
        let mut cmd = match self {
            Self::Tar => {
                let mut cmd = Command::new("tar");
                cmd.args(["-c", "-h", "-f"]);
                cmd
            }
            Self::Pax => {
                let mut cmd = Command::new("pax");
                cmd.args(["-w", "-L", "-f"]);
                cmd
            }
        };
        cmd.arg(archive).stdin(Stdio::null());
        cmd
    }
}

/// Pack all sources of a target into one archive file
///
/// Sources are laid out under `<work_dir>/content/<name>` so the archive
/// stores them under their (possibly renamed) names, made relative. The resulting file
/// becomes the target's `work_source_path`.
pub struct Tarball {
    format: ArchiveFormat,
    gzip: bool,
}

impl Tarball {
    pub fn new(format: ArchiveFormat, gzip: bool) -> Self {
        Self { format, gzip }
    }
}

impl CompressionScheme for Tarball {
    fn compress_sources(&self, target: &mut Target, work_dir: &Path) -> Result<()> {
        let scheme = target
            .compress_scheme
            .clone()
            .unwrap_or_else(|| self.format.extension().to_string());

        let content = work_dir.join("content");
        let mut names: Vec<PathBuf> = Vec::with_capacity(target.sources.len());
        for source in target.sources.values() {
            let name = staged_name(&source.name);
            link_into(&source.path, &content.join(&name))?;
            names.push(name);
        }
        names.sort_unstable();

        let archive = work_dir.join(format!("archive.{}", self.format.extension()));
        run_tool(
            &scheme,
            self.format
                .command(&std::path::absolute(&archive).unwrap_or_else(|_| archive.clone()))
                .args(&names)
                .current_dir(&content),
        )?;

        let archive = if self.gzip {
            run_tool(&scheme, Command::new("gzip").arg(&archive).stdin(Stdio::null()))?;
            let mut gz = archive.into_os_string();
            gz.push(".gz");
            PathBuf::from(gz)
        } else {
            archive
        };

        target.work_source_path = Some(archive);
        Ok(())
    }
}
