//! Row types for the ledger crate

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Flattened snapshot of one archive target as persisted by a run
///
/// Equality covers exactly what decides whether a target must be
/// reprocessed: name, scheme, command template, exit code and the
/// fingerprint-to-name mapping of its sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRecord {
    /// Unique target name
    pub name: String,
    /// Compression scheme, if any
    pub compress_scheme: Option<String>,
    /// Command template the target was archived with
    pub command_format: String,
    /// Exit code of the last archive command
    pub exit_code: i32,
    /// Source names keyed by fingerprint
    pub sources: BTreeMap<String, String>,
}

impl TargetRecord {
    /// Whether the last recorded command succeeded
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}
