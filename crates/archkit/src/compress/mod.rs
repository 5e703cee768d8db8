//! Compression scheme registry
//!
//! A scheme transforms a target's sources inside its staging workspace
//! before the archive command runs. Schemes are looked up by name; the
//! built-in ones shell out to `gzip`, `tar` and `pax`.

mod gzip;
mod tar;

pub use gzip::Gzip;
pub use tar::{ArchiveFormat, Tarball};

use crate::error::{Error, Result};
use crate::model::Target;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

/// A named transform applied to a target's sources
pub trait CompressionScheme: Send + Sync {
    /// Transform the sources of `target` using `work_dir` for output
    ///
    /// A scheme may rewrite source paths, or set
    /// `target.work_source_path` to hand a single consolidated file to
    /// the archive command instead of the individual sources.
    fn compress_sources(&self, target: &mut Target, work_dir: &Path) -> Result<()>;
}

/// Mapping from scheme name to handler
#[derive(Clone, Default)]
pub struct SchemeRegistry {
    handlers: BTreeMap<String, Arc<dyn CompressionScheme>>,
}

impl SchemeRegistry {
    /// Registry with no schemes
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the gzip, tar and pax schemes
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(&["gz", "gzip"], Gzip);
        registry.register(&["tar"], Tarball::new(ArchiveFormat::Tar, false));
        registry.register(&["tar.gz", "tgz"], Tarball::new(ArchiveFormat::Tar, true));
        registry.register(&["pax"], Tarball::new(ArchiveFormat::Pax, false));
        registry.register(&["pax.gz"], Tarball::new(ArchiveFormat::Pax, true));
        registry
    }

    /// Register a handler under one or more names
    pub fn register(&mut self, names: &[&str], handler: impl CompressionScheme + 'static) {
        let handler: Arc<dyn CompressionScheme> = Arc::new(handler);
        for name in names {
            self.handlers.insert((*name).to_string(), Arc::clone(&handler));
        }
    }

    /// Look up a handler; `None` means the scheme is not registered
    pub fn get(&self, name: &str) -> Option<&dyn CompressionScheme> {
        self.handlers.get(name).map(|h| h.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered scheme names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Infer a scheme from a target name's extension
    ///
    /// Everything after the first `.` of the final path segment is
    /// looked up, so `logs/out.tar.gz` selects `tar.gz`.
    pub fn infer(&self, target_name: &str) -> Option<String> {
        let base = target_name.rsplit('/').next().unwrap_or(target_name);
        let (_, ext) = base.split_once('.')?;
        self.contains(ext).then(|| ext.to_string())
    }
}

impl std::fmt::Debug for SchemeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.handlers.keys()).finish()
    }
}

/// Run an external tool, turning a non-zero exit into a scheme error
pub(crate) fn run_tool(scheme: &str, cmd: &mut Command) -> Result<()> {
    log::debug!("{}: running {:?}", scheme, cmd);
    let output = cmd.output().map_err(|e| Error::Compression {
        scheme: scheme.to_string(),
        message: format!("failed to execute {:?}: {}", cmd.get_program(), e),
    })?;

    if output.status.success() {
        Ok(())
    } else {
        Err(Error::Compression {
            scheme: scheme.to_string(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// Location of a source name inside a staging workspace
///
/// Only normal components survive, so absolute names and `..` segments
/// stay under `work_dir`.
pub(crate) fn staged_path(work_dir: &Path, name: &str) -> PathBuf {
    work_dir.join(staged_name(name))
}

/// Relative form of a source name, as stored inside an archive
pub(crate) fn staged_name(name: &str) -> PathBuf {
    let name: PathBuf = Path::new(name)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect();
    if name.as_os_str().is_empty() {
        PathBuf::from("_")
    } else {
        name
    }
}

/// Symlink `original` at `link`, creating parent directories
pub(crate) fn link_into(original: &Path, link: &Path) -> Result<()> {
    if let Some(parent) = link.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    let original = std::path::absolute(original).map_err(|e| Error::io(original, e))?;
    symlink_file(&original, link).map_err(|e| Error::io(link, e))
}

#[cfg(unix)]
fn symlink_file(original: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

#[cfg(windows)]
fn symlink_file(original: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(original, link)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    impl CompressionScheme for Noop {
        fn compress_sources(&self, _target: &mut Target, _work_dir: &Path) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_builtin_names() {
        let registry = SchemeRegistry::builtin();
        let names: Vec<_> = registry.names().collect();
        assert_eq!(names, vec!["gz", "gzip", "pax", "pax.gz", "tar", "tar.gz", "tgz"]);
        assert!(registry.get("zip").is_none());
    }

    #[test]
    fn test_infer() {
        let registry = SchemeRegistry::builtin();
        assert_eq!(registry.infer("out.tar.gz").as_deref(), Some("tar.gz"));
        assert_eq!(registry.infer("dir.v1/out.tgz").as_deref(), Some("tgz"));
        assert_eq!(registry.infer("file.gz").as_deref(), Some("gz"));
        assert_eq!(registry.infer("file.txt"), None);
        assert_eq!(registry.infer("file.nc.gz"), None);
        assert_eq!(registry.infer("noext"), None);
    }

    #[test]
    fn test_register_custom() {
        let mut registry = SchemeRegistry::new();
        registry.register(&["noop"], Noop);
        assert!(registry.contains("noop"));
        assert_eq!(registry.infer("x.noop").as_deref(), Some("noop"));
    }

    #[test]
    fn test_staged_path_stays_in_workspace() {
        let work = Path::new("/stage/arkive-x");
        assert_eq!(staged_path(work, "data/a.txt"), work.join("data/a.txt"));
        assert_eq!(staged_path(work, "/srv/data/a.txt"), work.join("srv/data/a.txt"));
        assert_eq!(staged_path(work, "../../etc/passwd"), work.join("etc/passwd"));
        assert_eq!(staged_path(work, "./a/./b"), work.join("a/b"));
        assert_eq!(staged_path(work, "/"), work.join("_"));
        assert_eq!(staged_name("/srv/a.txt"), PathBuf::from("srv/a.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_tool_failure() {
        let err = run_tool("test", Command::new("sh").args(["-c", "echo broken >&2; exit 3"]))
            .unwrap_err();
        match err {
            Error::Compression { scheme, message } => {
                assert_eq!(scheme, "test");
                assert_eq!(message, "broken");
            }
            other => panic!("Expected Compression error, got: {:?}", other),
        }
    }
}
