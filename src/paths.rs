//! Path resolution for arkive
//!
//! # Environment Variables
//!
//! - `ARKIVE_SUITE_NAME` - Suite being archived; without it a run is a no-op
//! - `ARKIVE_SUITE_DIR` - Explicit working directory for the suite
//! - `ARKIVE_RUN_DIR` - Root holding one working directory per suite
//! - `ARKIVE_TASK_CYCLE_POINT` - Cycle point for rename templates
//!
//! # Working Directory Priority
//!
//! 1. `--suite-dir` / `ARKIVE_SUITE_DIR`
//! 2. `<run dir>/<suite name>`, where the run dir is `ARKIVE_RUN_DIR` or
//!    `~/arkive-run`

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable naming the suite
pub const ENV_SUITE_NAME: &str = "ARKIVE_SUITE_NAME";

/// Environment variable overriding the suite working directory
pub const ENV_SUITE_DIR: &str = "ARKIVE_SUITE_DIR";

/// Environment variable for the root of all suite directories
pub const ENV_RUN_DIR: &str = "ARKIVE_RUN_DIR";

/// Environment variable carrying the cycle point
pub const ENV_CYCLE_POINT: &str = "ARKIVE_TASK_CYCLE_POINT";

/// Default configuration file name inside the suite directory
pub const CONFIG_FILE: &str = "arch.toml";

/// Root directory holding one working directory per suite
pub fn run_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_RUN_DIR) {
        let path = expand(&dir);
        log::debug!("Using run dir from {}: {}", ENV_RUN_DIR, path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join("arkive-run"))
}

/// Working directory of a suite
///
/// An explicit directory wins; otherwise the suite lives under [`run_dir`].
pub fn suite_dir(suite: &str, explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(expand(&dir.to_string_lossy()));
    }
    Ok(run_dir()?.join(suite))
}

/// Configuration file to load: an explicit path, else `arch.toml` in `dir`
pub fn config_file(explicit: Option<&Path>, dir: &Path) -> PathBuf {
    match explicit {
        Some(path) => expand(&path.to_string_lossy()),
        None => dir.join(CONFIG_FILE),
    }
}

/// Expand `~` and environment variables in a path string
///
/// Unknown variables are left untouched.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}
