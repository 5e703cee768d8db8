//! Target resolution
//!
//! Turns configured [`TargetSpec`]s into [`Target`]s: expands source
//! globs, fingerprints every matched file, picks the compression scheme
//! and applies rename rules. Resolution performs no writes; it depends
//! only on the configuration, the filesystem and the cycle point.

use crate::compress::SchemeRegistry;
use crate::config::TargetSpec;
use crate::error::{Error, Result};
use crate::model::{Source, Target};
use crate::template::{self, Vars};
use checksum::Checksum;
use glob::MatchOptions;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Inputs shared by every target of a run
pub struct Resolver<'a> {
    /// Directory relative source patterns are resolved against
    pub base_dir: &'a Path,
    /// Cycle point made available to rename templates
    pub cycle: Option<&'a str>,
    pub checksum: &'a dyn Checksum,
    pub registry: &'a SchemeRegistry,
}

impl Resolver<'_> {
    /// Resolve every target, rejecting duplicate names
    pub fn resolve_all(&self, specs: &[TargetSpec]) -> Result<Vec<Target>> {
        let mut seen = HashSet::new();
        let mut targets = Vec::with_capacity(specs.len());
        for spec in specs {
            let target = self.resolve(spec)?;
            if !seen.insert(target.name.clone()) {
                return Err(Error::config(
                    &spec.section,
                    "target-prefix",
                    format!("duplicate target name: {}", target.name),
                ));
            }
            targets.push(target);
        }
        Ok(targets)
    }

    /// Resolve one target
    pub fn resolve(&self, spec: &TargetSpec) -> Result<Target> {
        let mut target = Target::new(spec.target_name(), spec.command_format.clone());
        template::render_command(&spec.command_format, &[] as &[&str], &target.name)
            .map_err(|e| Error::config(&spec.section, "command-format", e))?;

        for pattern in &spec.sources {
            for (name, path) in self.expand(spec, pattern)? {
                // Label files by their location under the base so metadata
                // fingerprints do not change when the suite moves
                let label = path.strip_prefix(self.base_dir).unwrap_or(&path);
                for entry in checksum::scan_as(&path, label, self.checksum)? {
                    let Some(sum) = entry.checksum else {
                        continue;
                    };
                    let source = if entry.path.as_os_str().is_empty() {
                        Source::new(sum, name.clone(), path.clone())
                    } else {
                        Source::new(
                            sum,
                            Path::new(&name).join(&entry.path).to_string_lossy(),
                            path.join(&entry.path),
                        )
                    };
                    target.add_source(source);
                }
            }
        }

        if target.sources.is_empty() {
            return Err(Error::config(
                &spec.section,
                "source",
                format!("no files match: {}", spec.sources.join(" ")),
            ));
        }

        target.compress_scheme = match &spec.compress {
            Some(scheme) if self.registry.contains(scheme) => Some(scheme.clone()),
            Some(scheme) => {
                return Err(Error::config(
                    &spec.section,
                    "compress",
                    format!("unknown compression scheme: {scheme}"),
                ));
            }
            None => self.registry.infer(&target.name),
        };

        if let Some(format) = &spec.rename_format {
            self.rename(spec, format, &mut target)?;
        }

        log::debug!(
            "Resolved {} with {} source(s)",
            target.name,
            target.sources.len()
        );
        Ok(target)
    }

    /// Expand one pattern into `(name, path)` pairs, sorted by path
    ///
    /// The name is the matched path with the base directory and source
    /// prefix removed.
    fn expand(&self, spec: &TargetSpec, pattern: &str) -> Result<Vec<(String, PathBuf)>> {
        let joined = format!("{}{}", spec.source_prefix, pattern);
        let (root, full) = if Path::new(&joined).is_absolute() {
            (spec.source_prefix.clone(), joined)
        } else {
            let base = self.base_dir.to_string_lossy();
            let sep = if base.ends_with('/') { "" } else { "/" };
            (
                format!("{base}{sep}{}", spec.source_prefix),
                format!("{}{sep}{joined}", glob::Pattern::escape(&base)),
            )
        };

        let options = MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: true,
        };
        let paths = glob::glob_with(&full, options)
            .map_err(|e| Error::config(&spec.section, "source", format!("{pattern}: {e}")))?;

        let mut matches = Vec::new();
        for path in paths {
            let path = path.map_err(|e| Error::io(e.path().to_path_buf(), e.into_error()))?;
            let text = path.to_string_lossy();
            let name = text.strip_prefix(root.as_str()).unwrap_or(&text).to_string();
            if !name.is_empty() {
                matches.push((name, path));
            }
        }
        matches.sort_by(|a, b| a.1.cmp(&b.1));
        Ok(matches)
    }

    fn rename(&self, spec: &TargetSpec, format: &str, target: &mut Target) -> Result<()> {
        let parser = spec
            .rename_parser
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| Error::config(&spec.section, "rename-parser", e.to_string()))?;

        for source in target.sources.values_mut() {
            let mut vars = Vars::new();
            if let Some(cycle) = self.cycle {
                vars.insert("cycle".to_string(), cycle.to_string());
            }
            vars.insert("name".to_string(), source.name.clone());

            // Groups only count when the parser matches at the start of the name
            let caps = parser.as_ref().and_then(|p| {
                p.captures(&source.name)
                    .filter(|c| c.get(0).is_some_and(|m| m.start() == 0))
                    .map(|c| (p, c))
            });
            if let Some((parser, caps)) = caps {
                for group in parser.capture_names().flatten() {
                    let value = caps.name(group).map_or("", |m| m.as_str());
                    vars.insert(group.to_string(), value.to_string());
                }
            }

            source.name = template::render(format, &vars)
                .map_err(|e| Error::config(&spec.section, "rename-format", e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use checksum::ChecksumMethod;
    use std::fs;
    use tempfile::TempDir;

    fn spec(name: &str, sources: &[&str]) -> TargetSpec {
        TargetSpec {
            section: format!("arch:{name}"),
            name: name.to_string(),
            sources: sources.iter().map(|s| s.to_string()).collect(),
            source_prefix: String::new(),
            target_prefix: String::new(),
            command_format: "tar -cf %(target)s %(sources)s".to_string(),
            compress: None,
            rename_format: None,
            rename_parser: None,
        }
    }

    fn resolve(base: &Path, spec: &TargetSpec, cycle: Option<&str>) -> Result<Target> {
        let registry = SchemeRegistry::builtin();
        let resolver = Resolver {
            base_dir: base,
            cycle,
            checksum: &ChecksumMethod::Blake3,
            registry: &registry,
        };
        resolver.resolve(spec)
    }

    fn names(target: &Target) -> Vec<String> {
        let mut names: Vec<_> = target.sources.values().map(|s| s.name.clone()).collect();
        names.sort();
        names
    }

    #[test]
    fn test_identical_content_deduplicated() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("data")).unwrap();
        fs::write(tmp.path().join("data/a.txt"), "hello").unwrap();
        fs::write(tmp.path().join("data/b.txt"), "hello").unwrap();

        let target = resolve(tmp.path(), &spec("foo", &["data/*.txt"]), None).unwrap();
        assert_eq!(target.name, "foo");
        assert_eq!(target.sources.len(), 1);
        // Sorted expansion: the later path wins the collision
        assert_eq!(names(&target), vec!["data/b.txt"]);
        let source = target.sources.values().next().unwrap();
        assert_eq!(source.path, tmp.path().join("data/b.txt"));
    }

    #[test]
    fn test_directory_sources() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("out/sub")).unwrap();
        fs::write(tmp.path().join("out/a.txt"), "a").unwrap();
        fs::write(tmp.path().join("out/sub/b.txt"), "b").unwrap();

        let target = resolve(tmp.path(), &spec("dir", &["out"]), None).unwrap();
        assert_eq!(names(&target), vec!["out/a.txt", "out/sub/b.txt"]);
        let b = target
            .sources
            .values()
            .find(|s| s.name == "out/sub/b.txt")
            .unwrap();
        assert_eq!(b.path, tmp.path().join("out").join("sub").join("b.txt"));
    }

    #[test]
    fn test_source_prefix_stripped() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("share/data")).unwrap();
        fs::write(tmp.path().join("share/data/x.nc"), "x").unwrap();

        let mut s = spec("p", &["data/*.nc"]);
        s.source_prefix = "share/".to_string();
        s.target_prefix = "remote/".to_string();
        let target = resolve(tmp.path(), &s, None).unwrap();
        assert_eq!(target.name, "remote/p");
        assert_eq!(names(&target), vec!["data/x.nc"]);
    }

    #[test]
    fn test_absolute_prefix() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("x.txt"), "x").unwrap();
        let elsewhere = TempDir::new().unwrap();

        let mut s = spec("abs", &["*.txt"]);
        s.source_prefix = format!("{}/", tmp.path().display());
        let target = resolve(elsewhere.path(), &s, None).unwrap();
        assert_eq!(names(&target), vec!["x.txt"]);
    }

    #[test]
    fn test_mtime_size_fingerprint_independent_of_suite_location() {
        let registry = SchemeRegistry::builtin();
        let mtime = std::time::UNIX_EPOCH + std::time::Duration::from_secs(1_700_000_000);
        let mut sums = Vec::new();
        for _ in 0..2 {
            let tmp = TempDir::new().unwrap();
            fs::create_dir_all(tmp.path().join("data")).unwrap();
            let file = tmp.path().join("data/a.txt");
            fs::write(&file, "hello").unwrap();
            fs::File::options()
                .write(true)
                .open(&file)
                .unwrap()
                .set_modified(mtime)
                .unwrap();

            let resolver = Resolver {
                base_dir: tmp.path(),
                cycle: None,
                checksum: &ChecksumMethod::MtimeSize,
                registry: &registry,
            };
            let target = resolver.resolve(&spec("m", &["data/*.txt"])).unwrap();
            let source = target.sources.values().next().unwrap();
            assert!(!source.checksum.contains(&*tmp.path().to_string_lossy()));
            sums.push(source.checksum.clone());
        }
        assert_eq!(sums[0], sums[1]);
    }

    #[test]
    fn test_hidden_files_need_literal_dot() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(".hidden"), "h").unwrap();
        fs::write(tmp.path().join("shown"), "s").unwrap();

        let target = resolve(tmp.path(), &spec("h", &["*"]), None).unwrap();
        assert_eq!(names(&target), vec!["shown"]);
    }

    #[test]
    fn test_no_match_is_config_error() {
        let tmp = TempDir::new().unwrap();
        let err = resolve(tmp.path(), &spec("empty", &["nothing/*"]), None).unwrap_err();
        assert!(matches!(err, Error::Config { ref key, .. } if key == "source"));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_compression_inferred_and_validated() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), "a").unwrap();

        let target = resolve(tmp.path(), &spec("out.tar.gz", &["a.txt"]), None).unwrap();
        assert_eq!(target.compress_scheme.as_deref(), Some("tar.gz"));

        let target = resolve(tmp.path(), &spec("out.txt", &["a.txt"]), None).unwrap();
        assert_eq!(target.compress_scheme, None);

        let mut s = spec("out", &["a.txt"]);
        s.compress = Some("gzip".into());
        let target = resolve(tmp.path(), &s, None).unwrap();
        assert_eq!(target.compress_scheme.as_deref(), Some("gzip"));

        s.compress = Some("rar".into());
        let err = resolve(tmp.path(), &s, None).unwrap_err();
        assert!(matches!(err, Error::Config { ref key, .. } if key == "compress"));
    }

    #[test]
    fn test_rename_with_parser() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("out-01.nc"), "1").unwrap();
        fs::write(tmp.path().join("out-02.nc"), "2").unwrap();

        let mut s = spec("r", &["out-*.nc"]);
        s.rename_format = Some("%(cycle)s/member%(member)s.nc".into());
        s.rename_parser = Some(r"^out-(?P<member>\d+)\.nc$".into());
        let target = resolve(tmp.path(), &s, Some("20240101T00")).unwrap();

        assert_eq!(
            names(&target),
            vec!["20240101T00/member01.nc", "20240101T00/member02.nc"]
        );
        assert!(target.needs_rename());
        for source in target.sources.values() {
            assert!(source.orig_name.starts_with("out-"));
        }
    }

    #[test]
    fn test_rename_errors() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), "a").unwrap();

        let mut s = spec("r", &["a.txt"]);
        s.rename_format = Some("%(cycle)s/%(name)s".into());
        let err = resolve(tmp.path(), &s, None).unwrap_err();
        assert!(matches!(err, Error::Config { ref key, .. } if key == "rename-format"));

        s.rename_format = Some("%(name)s".into());
        s.rename_parser = Some("(unclosed".into());
        let err = resolve(tmp.path(), &s, None).unwrap_err();
        assert!(matches!(err, Error::Config { ref key, .. } if key == "rename-parser"));
    }

    #[test]
    fn test_bad_command_format() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), "a").unwrap();

        let mut s = spec("c", &["a.txt"]);
        s.command_format = "cp %(source)s %(target)s".into();
        let err = resolve(tmp.path(), &s, None).unwrap_err();
        assert!(matches!(err, Error::Config { ref key, .. } if key == "command-format"));

        let mut s = spec("nul\0name", &["a.txt"]);
        s.section = "arch:nul".into();
        let err = resolve(tmp.path(), &s, None).unwrap_err();
        assert!(matches!(err, Error::Config { ref key, .. } if key == "command-format"));
    }

    #[test]
    fn test_duplicate_target_names() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), "a").unwrap();
        let registry = SchemeRegistry::builtin();
        let resolver = Resolver {
            base_dir: tmp.path(),
            cycle: None,
            checksum: &ChecksumMethod::Blake3,
            registry: &registry,
        };

        let mut first = spec("x", &["a.txt"]);
        first.target_prefix = "p/".into();
        let mut second = spec("p/x", &["a.txt"]);
        second.section = "arch:other".into();
        second.name = "p/x".into();

        let err = resolver.resolve_all(&[first, second]).unwrap_err();
        assert!(err.to_string().contains("duplicate target name"));
    }
}
