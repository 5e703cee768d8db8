//! Archive configuration
//!
//! Targets are declared as TOML sections named `arch:<name>`. The plain
//! `[arch]` section supplies defaults for every target key and holds the
//! run-level settings:
//!
//! ```toml
//! [arch]
//! command-format = "cp %(sources)s /archive/%(target)s"
//! checksum-method = "blake3"
//! command-timeout = 600
//!
//! ["arch:logs.tar.gz"]
//! source = "log/job/*/out log/job/*/err"
//! rename-format = "%(cycle)s/%(name)s"
//! ```
//!
//! Every string value has `$VAR` / `${VAR}` references expanded; an unset
//! variable is a configuration error.

use crate::error::{Error, Result};
use checksum::ChecksumMethod;
use std::path::Path;
use std::time::Duration;
use toml::{Table, Value};

/// Name of the configuration section family
pub const SECTION: &str = "arch";

/// Resolved settings for one archive target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    /// Full section name, e.g. `arch:logs.tar.gz`
    pub section: String,
    /// Section name without the `arch:` head
    pub name: String,
    /// Glob patterns selecting the sources
    pub sources: Vec<String>,
    pub source_prefix: String,
    pub target_prefix: String,
    pub command_format: String,
    /// Explicit compression scheme
    pub compress: Option<String>,
    pub rename_format: Option<String>,
    /// Regex whose named groups feed `rename_format`
    pub rename_parser: Option<String>,
}

impl TargetSpec {
    /// Target name after applying the target prefix
    pub fn target_name(&self) -> String {
        format!("{}{}", self.target_prefix, self.name)
    }
}

/// Settings that apply to a whole run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    pub checksum_method: ChecksumMethod,
    /// Per-command timeout; `None` waits forever
    pub command_timeout: Option<Duration>,
    /// Number of targets processed in parallel
    pub jobs: usize,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            checksum_method: ChecksumMethod::default(),
            command_timeout: None,
            jobs: 1,
        }
    }
}

/// Fully resolved archive configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchConfig {
    pub settings: RunSettings,
    /// Targets in section-name order
    pub targets: Vec<TargetSpec>,
}

impl ArchConfig {
    /// Load a configuration file, expanding variables from the process environment
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_toml_str(&text, &|var| std::env::var(var).ok())
    }

    /// Parse configuration text with an explicit variable lookup
    pub fn from_toml_str(text: &str, env: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let table: Table = toml::from_str(text)?;
        Self::from_table(&table, env)
    }

    /// Build the configuration from a parsed TOML table
    pub fn from_table(table: &Table, env: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let empty = Table::new();
        let root = match table.get(SECTION) {
            Some(Value::Table(t)) => t,
            Some(_) => return Err(Error::config(SECTION, "", "must be a table")),
            None => &empty,
        };
        let reader = Reader { root, env };

        let settings = reader.settings()?;

        let mut keys: Vec<&String> = table.keys().collect();
        keys.sort();

        let mut targets = Vec::new();
        for key in keys {
            let Some((head, tail)) = key.split_once(':') else {
                continue;
            };
            if head != SECTION || tail.is_empty() {
                continue;
            }
            let Some(Value::Table(node)) = table.get(key.as_str()) else {
                log::debug!("Ignoring non-table entry {}", key);
                continue;
            };
            targets.push(reader.target(key, tail, node)?);
        }

        Ok(Self { settings, targets })
    }
}

struct Reader<'a> {
    root: &'a Table,
    env: &'a dyn Fn(&str) -> Option<String>,
}

impl Reader<'_> {
    fn settings(&self) -> Result<RunSettings> {
        let mut settings = RunSettings::default();

        if let Some(method) = self.string(SECTION, self.root, "checksum-method")? {
            settings.checksum_method = method
                .parse()
                .map_err(|e: checksum::Error| Error::config(SECTION, "checksum-method", e.to_string()))?;
        }

        if let Some(value) = self.root.get("command-timeout") {
            let secs = match value {
                Value::Integer(i) if *i > 0 => *i as f64,
                Value::Float(f) if *f > 0.0 => *f,
                Value::String(s) => self
                    .expand(SECTION, "command-timeout", s)?
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|f| *f > 0.0)
                    .ok_or_else(|| {
                        Error::config(SECTION, "command-timeout", "expected a positive number of seconds")
                    })?,
                _ => {
                    return Err(Error::config(
                        SECTION,
                        "command-timeout",
                        "expected a positive number of seconds",
                    ));
                }
            };
            settings.command_timeout = Some(Duration::from_secs_f64(secs));
        }

        if let Some(value) = self.root.get("jobs") {
            settings.jobs = match value {
                Value::Integer(i) if *i >= 1 => *i as usize,
                _ => return Err(Error::config(SECTION, "jobs", "expected an integer >= 1")),
            };
        }

        Ok(settings)
    }

    fn target(&self, section: &str, name: &str, node: &Table) -> Result<TargetSpec> {
        let command_format = self
            .lookup(section, node, "command-format")?
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::config(section, "command-format", "compulsory setting is missing"))?;

        let sources = self.sources(section, node)?;
        if sources.is_empty() {
            return Err(Error::config(section, "source", "compulsory setting is missing"));
        }

        Ok(TargetSpec {
            section: section.to_string(),
            name: name.to_string(),
            sources,
            source_prefix: self.lookup(section, node, "source-prefix")?.unwrap_or_default(),
            target_prefix: self.lookup(section, node, "target-prefix")?.unwrap_or_default(),
            command_format,
            compress: self.lookup(section, node, "compress")?.filter(|v| !v.is_empty()),
            rename_format: self.lookup(section, node, "rename-format")?.filter(|v| !v.is_empty()),
            rename_parser: self.lookup(section, node, "rename-parser")?.filter(|v| !v.is_empty()),
        })
    }

    /// `source` is either a shell-style word list or an array of patterns
    fn sources(&self, section: &str, node: &Table) -> Result<Vec<String>> {
        let value = node.get("source").or_else(|| self.root.get("source"));
        match value {
            None => Ok(Vec::new()),
            Some(Value::String(s)) => {
                let expanded = self.expand(section, "source", s)?;
                shlex::split(&expanded)
                    .ok_or_else(|| Error::config(section, "source", "unbalanced quotes"))
            }
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => self.expand(section, "source", s),
                    _ => Err(Error::config(section, "source", "expected an array of strings")),
                })
                .collect(),
            Some(_) => Err(Error::config(section, "source", "expected a string or array")),
        }
    }

    /// Per-target value, falling back to the `[arch]` default
    fn lookup(&self, section: &str, node: &Table, key: &str) -> Result<Option<String>> {
        match self.string(section, node, key)? {
            Some(value) => Ok(Some(value)),
            None => self.string(section, self.root, key),
        }
    }

    fn string(&self, section: &str, table: &Table, key: &str) -> Result<Option<String>> {
        match table.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => self.expand(section, key, s).map(Some),
            Some(_) => Err(Error::config(section, key, "expected a string")),
        }
    }

    fn expand(&self, section: &str, key: &str, value: &str) -> Result<String> {
        shellexpand::env_with_context(value, |var| {
            (self.env)(var)
                .map(Some)
                .ok_or(std::env::VarError::NotPresent)
        })
        .map(|v| v.into_owned())
        .map_err(|e| Error::config(section, key, format!("unbound variable ${}", e.var_name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn parse(text: &str) -> Result<ArchConfig> {
        ArchConfig::from_toml_str(text, &no_env)
    }

    #[test]
    fn test_targets_sorted_with_defaults() {
        let config = parse(
            r#"
            [arch]
            command-format = "cp %(sources)s %(target)s"
            target-prefix = "out/"

            ["arch:b"]
            source = "b/*"

            ["arch:a"]
            source = "a/* 'with space/*'"
            command-format = "tar -cf %(target)s %(sources)s"

            ["!arch:ignored"]
            source = "x"

            [other]
            key = "value"
            "#,
        )
        .unwrap();

        assert_eq!(config.settings, RunSettings::default());
        assert_eq!(config.targets.len(), 2);

        let a = &config.targets[0];
        assert_eq!(a.section, "arch:a");
        assert_eq!(a.target_name(), "out/a");
        assert_eq!(a.sources, vec!["a/*", "with space/*"]);
        assert_eq!(a.command_format, "tar -cf %(target)s %(sources)s");

        let b = &config.targets[1];
        assert_eq!(b.command_format, "cp %(sources)s %(target)s");
        assert_eq!(b.compress, None);
    }

    #[test]
    fn test_source_array() {
        let config = parse(
            r#"
            ["arch:a"]
            source = ["data/my file.txt", "*.log"]
            command-format = "true"
            "#,
        )
        .unwrap();
        assert_eq!(config.targets[0].sources, vec!["data/my file.txt", "*.log"]);
    }

    #[test]
    fn test_missing_command_format() {
        let err = parse(
            r#"
            ["arch:a"]
            source = "x"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config { ref key, .. } if key == "command-format"));
    }

    #[test]
    fn test_missing_source() {
        let err = parse(
            r#"
            ["arch:a"]
            command-format = "true"
            source = ""
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config { ref key, .. } if key == "source"));
    }

    #[test]
    fn test_env_expansion() {
        let env = |var: &str| (var == "ROOT").then(|| "/srv/data".to_string());
        let config = ArchConfig::from_toml_str(
            r#"
            ["arch:a"]
            source = "*.txt"
            source-prefix = "${ROOT}/"
            command-format = "true"
            "#,
            &env,
        )
        .unwrap();
        assert_eq!(config.targets[0].source_prefix, "/srv/data/");

        let err = ArchConfig::from_toml_str(
            r#"
            ["arch:a"]
            source = "$MISSING/*.txt"
            command-format = "true"
            "#,
            &env,
        )
        .unwrap_err();
        assert!(err.to_string().contains("MISSING"));
    }

    #[test]
    fn test_run_settings() {
        let config = parse(
            r#"
            [arch]
            checksum-method = "mtime+size"
            command-timeout = 2.5
            jobs = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.settings.checksum_method, ChecksumMethod::MtimeSize);
        assert_eq!(config.settings.command_timeout, Some(Duration::from_millis(2500)));
        assert_eq!(config.settings.jobs, 4);
        assert!(config.targets.is_empty());

        assert!(parse("[arch]\nchecksum-method = \"crc\"\n").is_err());
        assert!(parse("[arch]\njobs = 0\n").is_err());
        assert!(parse("[arch]\ncommand-timeout = -1\n").is_err());
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(parse("[arch"), Err(Error::Parse(_))));
    }
}
