//! Targets and sources

use ledger::TargetRecord;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// One physical input of a target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    /// Content fingerprint
    pub checksum: String,
    /// Name before any rename
    pub orig_name: String,
    /// Location before any staging
    pub orig_path: PathBuf,
    /// Name the archive command should see
    pub name: String,
    /// Location handed to the archive command
    pub path: PathBuf,
}

impl Source {
    pub fn new(checksum: impl Into<String>, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let name = name.into();
        let path = path.into();
        Self {
            checksum: checksum.into(),
            orig_name: name.clone(),
            orig_path: path.clone(),
            name,
            path,
        }
    }

    /// Whether a rename rule changed the name
    pub fn is_renamed(&self) -> bool {
        self.name != self.orig_name
    }
}

/// Outcome of a target in the current run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetStatus {
    /// Resolved but not processed yet
    Pending,
    /// Identical to the stored snapshot, nothing to do
    Unchanged,
    /// Archived successfully in this run
    Fresh,
    /// Archive command (or staging) failed
    Failed,
}

impl TargetStatus {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Pending => "?",
            Self::Unchanged => "=",
            Self::Fresh => "+",
            Self::Failed => "!",
        }
    }
}

impl fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A named unit of archiving work
#[derive(Debug, Clone)]
pub struct Target {
    /// Unique name, including any target prefix
    pub name: String,
    /// Archive command template with `%(sources)s` and `%(target)s`
    pub command_format: String,
    /// Registered compression scheme, if any
    pub compress_scheme: Option<String>,
    /// Sources keyed by fingerprint
    pub sources: BTreeMap<String, Source>,
    pub status: TargetStatus,
    /// Exit code of the last archive command; 0 before a run
    pub exit_code: i32,
    /// Single consolidated input set by a compression scheme
    pub work_source_path: Option<PathBuf>,
}

impl Target {
    pub fn new(name: impl Into<String>, command_format: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command_format: command_format.into(),
            compress_scheme: None,
            sources: BTreeMap::new(),
            status: TargetStatus::Pending,
            exit_code: 0,
            work_source_path: None,
        }
    }

    /// Add a source, replacing any source with the same fingerprint
    pub fn add_source(&mut self, source: Source) {
        self.sources.insert(source.checksum.clone(), source);
    }

    /// Whether any source has to be presented under a new name
    pub fn needs_rename(&self) -> bool {
        self.sources.values().any(Source::is_renamed)
    }

    /// Paths to hand to the archive command
    pub fn effective_sources(&self) -> Vec<PathBuf> {
        match &self.work_source_path {
            Some(path) => vec![path.clone()],
            None => self.sources.values().map(|s| s.path.clone()).collect(),
        }
    }

    /// Snapshot in the form the ledger persists
    pub fn to_record(&self) -> TargetRecord {
        TargetRecord {
            name: self.name.clone(),
            compress_scheme: self.compress_scheme.clone(),
            command_format: self.command_format.clone(),
            exit_code: self.exit_code,
            sources: self
                .sources
                .iter()
                .map(|(sum, source)| (sum.clone(), source.name.clone()))
                .collect(),
        }
    }

    /// Whether the stored snapshot describes exactly this target
    pub fn matches(&self, record: &TargetRecord) -> bool {
        self.to_record() == *record
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} (compress={})",
            self.status,
            self.name,
            self.compress_scheme.as_deref().unwrap_or("none")
        )?;
        if self.status != TargetStatus::Unchanged {
            let mut sources: Vec<&Source> = self.sources.values().collect();
            sources.sort_by(|a, b| a.name.cmp(&b.name));
            for source in sources {
                write!(f, "\n      {} ({})", source.name, source.orig_path.display())?;
            }
        }
        Ok(())
    }
}
