//! # Checksum
//!
//! Content fingerprints for files and directory trees.
//!
//! A fingerprint is a string identity that stays the same across runs
//! as long as the content (or, for the `mtime+size` policy, the file
//! metadata) is unchanged. The policy is pluggable through the
//! [`Checksum`] trait; [`ChecksumMethod`] provides the built-in ones.
//!
//! ## Example
//!
//! ```no_run
//! use checksum::{scan, ChecksumMethod};
//! use std::path::Path;
//!
//! for entry in scan(Path::new("data"), &ChecksumMethod::Blake3)? {
//!     match entry.checksum {
//!         Some(sum) => println!("{} {}", sum, entry.path.display()),
//!         None => println!("{}/", entry.path.display()),
//!     }
//! }
//! # Ok::<(), checksum::Error>(())
//! ```

mod error;

pub use error::{Error, Result};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::UNIX_EPOCH;
use walkdir::WalkDir;

/// Size of the read buffer used while hashing
const CHUNK_SIZE: usize = 64 * 1024;

/// A policy that turns one file into a fingerprint string
pub trait Checksum: Send + Sync {
    /// Name of the policy, as written in configuration
    fn name(&self) -> &str;

    /// Fingerprint the file at `path`
    ///
    /// `label` is the file's name relative to the scanned root (or the
    /// scanned path itself for a single file). Content policies ignore it.
    fn checksum(&self, path: &Path, label: &Path) -> Result<String>;
}

/// Built-in fingerprint policies
///
/// Content and metadata policies produce incomparable values; a store
/// must only ever hold fingerprints from one of them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChecksumMethod {
    /// BLAKE3 digest of the file bytes
    #[default]
    #[serde(rename = "blake3")]
    Blake3,
    /// SHA-256 digest of the file bytes
    #[serde(rename = "sha256")]
    Sha256,
    /// Relative name, modification time and size
    #[serde(rename = "mtime+size")]
    MtimeSize,
}

impl ChecksumMethod {
    pub const ALL: [Self; 3] = [Self::Blake3, Self::Sha256, Self::MtimeSize];

    /// Configuration name of the method
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blake3 => "blake3",
            Self::Sha256 => "sha256",
            Self::MtimeSize => "mtime+size",
        }
    }
}

impl fmt::Display for ChecksumMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChecksumMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "blake3" => Ok(Self::Blake3),
            "sha256" | "sha256sum" => Ok(Self::Sha256),
            "mtime+size" => Ok(Self::MtimeSize),
            other => Err(Error::UnknownMethod(other.to_string())),
        }
    }
}

impl Checksum for ChecksumMethod {
    fn name(&self) -> &str {
        self.as_str()
    }

    fn checksum(&self, path: &Path, label: &Path) -> Result<String> {
        match self {
            Self::Blake3 => {
                let mut hasher = blake3::Hasher::new();
                stream_file(path, |chunk| {
                    hasher.update(chunk);
                })?;
                Ok(hasher.finalize().to_hex().to_string())
            }
            Self::Sha256 => {
                let mut hasher = Sha256::new();
                stream_file(path, |chunk| hasher.update(chunk))?;
                Ok(format!("{:x}", hasher.finalize()))
            }
            Self::MtimeSize => mtime_and_size(path, label),
        }
    }
}

/// One path found under a scanned root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Path relative to the scanned root; empty for the root itself
    pub path: PathBuf,
    /// Fingerprint of a file; `None` for a directory
    pub checksum: Option<String>,
    /// File mode bits; `None` for a directory or on non-Unix platforms
    pub mode: Option<u32>,
}

impl Entry {
    /// Whether this entry is a directory
    pub fn is_dir(&self) -> bool {
        self.checksum.is_none()
    }
}

/// Fingerprint a file, or every file below a directory
///
/// A regular file yields a single entry with an empty relative path.
/// A directory yields one entry per descendant (including the root,
/// as `""`), sorted by file name; directories carry no fingerprint.
pub fn scan(path: &Path, method: &dyn Checksum) -> Result<Vec<Entry>> {
    scan_as(path, path, method)
}

/// Like [`scan`], but a regular file is labelled `label` instead of its path
///
/// Metadata fingerprints embed the label, so callers pass a name that
/// stays stable when the tree is moved. Files below a directory are
/// always labelled by their path relative to that directory.
pub fn scan_as(path: &Path, label: &Path, method: &dyn Checksum) -> Result<Vec<Entry>> {
    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::NotFound(path.to_path_buf()));
        }
        Err(source) => {
            return Err(Error::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    if !meta.is_dir() {
        return Ok(vec![Entry {
            path: PathBuf::new(),
            checksum: Some(method.checksum(path, label)?),
            mode: file_mode(&meta),
        }]);
    }

    let mut entries = Vec::new();
    for entry in WalkDir::new(path).follow_links(true).sort_by_file_name() {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(path)
            .unwrap_or(entry.path())
            .to_path_buf();

        if entry.file_type().is_dir() {
            entries.push(Entry {
                path: rel,
                checksum: None,
                mode: None,
            });
            continue;
        }

        let meta = entry.metadata()?;
        entries.push(Entry {
            checksum: Some(method.checksum(entry.path(), &rel)?),
            path: rel,
            mode: file_mode(&meta),
        });
    }

    Ok(entries)
}

/// Feed the bytes of a file to `update` in bounded chunks
fn stream_file(path: &Path, mut update: impl FnMut(&[u8])) -> Result<()> {
    let io_err = |source| Error::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(io_err)?;
    let mut reader = BufReader::with_capacity(CHUNK_SIZE, file);
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let bytes_read = reader.read(&mut buffer).map_err(io_err)?;
        if bytes_read == 0 {
            break;
        }
        update(&buffer[..bytes_read]);
    }
    Ok(())
}

fn mtime_and_size(path: &Path, label: &Path) -> Result<String> {
    let meta = fs::metadata(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .unwrap_or_default();
    Ok(format!(
        "source={}:mtime={}.{:09}:size={}",
        label.display(),
        mtime.as_secs(),
        mtime.subsec_nanos(),
        meta.len()
    ))
}

#[cfg(unix)]
fn file_mode(meta: &fs::Metadata) -> Option<u32> {
    use std::os::unix::fs::MetadataExt;
    Some(meta.mode())
}

#[cfg(not(unix))]
fn file_mode(_meta: &fs::Metadata) -> Option<u32> {
    None
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_path() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope");

        match scan(&missing, &ChecksumMethod::Blake3) {
            Err(Error::NotFound(path)) => assert_eq!(path, missing),
            other => panic!("Expected NotFound error, got: {:?}", other),
        }
    }

    #[test]
    fn test_single_file() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("a.txt");
        std::fs::write(&file, "hello").unwrap();

        let entries = scan(&file, &ChecksumMethod::Blake3).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, PathBuf::new());
        assert_eq!(
            entries[0].checksum.as_deref(),
            Some(blake3::hash(b"hello").to_hex().as_str())
        );
        #[cfg(unix)]
        assert!(entries[0].mode.is_some());
    }

    #[test]
    fn test_sha256_known_value() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("a.txt");
        std::fs::write(&file, "hello").unwrap();

        let sum = ChecksumMethod::Sha256.checksum(&file, &file).unwrap();
        assert_eq!(
            sum,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_identical_content_same_checksum() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a.txt");
        let b = tmp.path().join("b.txt");
        std::fs::write(&a, "same").unwrap();
        std::fs::write(&b, "same").unwrap();

        let sum_a = ChecksumMethod::Blake3.checksum(&a, &a).unwrap();
        let sum_b = ChecksumMethod::Blake3.checksum(&b, &b).unwrap();
        assert_eq!(sum_a, sum_b);

        std::fs::write(&b, "samf").unwrap();
        let sum_b = ChecksumMethod::Blake3.checksum(&b, &b).unwrap();
        assert_ne!(sum_a, sum_b);
    }

    #[test]
    fn test_large_file_streams() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("big.bin");
        let data = vec![7u8; CHUNK_SIZE * 3 + 11];
        std::fs::write(&file, &data).unwrap();

        let sum = ChecksumMethod::Blake3.checksum(&file, &file).unwrap();
        assert_eq!(sum, blake3::hash(&data).to_hex().to_string());
    }

    #[test]
    fn test_directory_walk() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("tree");
        std::fs::create_dir_all(root.join("sub")).unwrap();
        std::fs::write(root.join("b.txt"), "b").unwrap();
        std::fs::write(root.join("a.txt"), "a").unwrap();
        std::fs::write(root.join("sub").join("c.txt"), "c").unwrap();

        let entries = scan(&root, &ChecksumMethod::Blake3).unwrap();
        let paths: Vec<_> = entries.iter().map(|e| e.path.clone()).collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::new(),
                PathBuf::from("a.txt"),
                PathBuf::from("b.txt"),
                PathBuf::from("sub"),
                PathBuf::from("sub").join("c.txt"),
            ]
        );
        assert!(entries[0].is_dir());
        assert!(entries[3].is_dir());
        assert_eq!(entries[3].mode, None);
        assert!(!entries[4].is_dir());
    }

    #[test]
    fn test_mtime_size_includes_label() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("a.txt");
        std::fs::write(&file, "hello").unwrap();

        let sum = ChecksumMethod::MtimeSize
            .checksum(&file, Path::new("a.txt"))
            .unwrap();
        assert!(sum.starts_with("source=a.txt:mtime="));
        assert!(sum.ends_with(":size=5"));
    }

    #[test]
    fn test_file_label_survives_relocation() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        let a = first.path().join("a.txt");
        let b = second.path().join("a.txt");
        std::fs::write(&a, "hello").unwrap();
        std::fs::copy(&a, &b).unwrap();
        let mtime = std::fs::metadata(&a).unwrap().modified().unwrap();
        File::options()
            .write(true)
            .open(&b)
            .unwrap()
            .set_modified(mtime)
            .unwrap();

        let label = Path::new("data/a.txt");
        let in_first = scan_as(&a, label, &ChecksumMethod::MtimeSize).unwrap();
        let in_second = scan_as(&b, label, &ChecksumMethod::MtimeSize).unwrap();
        assert_eq!(in_first[0].checksum, in_second[0].checksum);
        assert!(
            in_first[0]
                .checksum
                .as_deref()
                .unwrap()
                .starts_with("source=data/a.txt:")
        );

        let absolute = scan(&a, &ChecksumMethod::MtimeSize).unwrap();
        assert_ne!(absolute[0].checksum, in_first[0].checksum);
    }

    #[test]
    fn test_method_names() {
        for method in ChecksumMethod::ALL {
            assert_eq!(method.as_str().parse::<ChecksumMethod>().unwrap(), method);
        }
        assert_eq!(
            "SHA256".parse::<ChecksumMethod>().unwrap(),
            ChecksumMethod::Sha256
        );
        assert!(matches!(
            "md4".parse::<ChecksumMethod>(),
            Err(Error::UnknownMethod(_))
        ));
    }
}
