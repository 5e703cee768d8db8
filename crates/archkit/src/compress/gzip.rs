//! Per-source gzip compression

use super::{CompressionScheme, run_tool, staged_path};
use crate::error::{Error, Result};
use crate::model::Target;
use std::fs::{self, File};
use std::path::Path;
use std::process::{Command, Stdio};

/// Compress every source individually with `gzip -c`
///
/// Sources already carrying the scheme's extension are passed through.
/// Compressed copies land in the workspace as `<name>.gz`.
pub struct Gzip;

impl CompressionScheme for Gzip {
    fn compress_sources(&self, target: &mut Target, work_dir: &Path) -> Result<()> {
        let scheme = target.compress_scheme.clone().unwrap_or_else(|| "gz".to_string());
        let suffix = format!(".{scheme}");

        for source in target.sources.values_mut() {
            if source.path.to_string_lossy().ends_with(&suffix) {
                continue;
            }

            let out = staged_path(work_dir, &format!("{}.gz", source.name));
            if let Some(parent) = out.parent() {
                fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
            }
            let file = File::create(&out).map_err(|e| Error::io(&out, e))?;

            run_tool(
                &scheme,
                Command::new("gzip")
                    .arg("-c")
                    .arg(&source.path)
                    .stdin(Stdio::null())
                    .stdout(file),
            )?;
            source.path = out;
        }

        Ok(())
    }
}
