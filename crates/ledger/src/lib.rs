//! # Ledger
//!
//! Persisted previous-run state for incremental archiving.
//!
//! The ledger is the only record of what a previous run archived. It
//! holds one row per target plus one row per (fingerprint, source name)
//! pair, and every mutation is committed as a single transaction so an
//! interrupted run leaves each target either fully old or fully new.
//!
//! ## Example
//!
//! ```no_run
//! use ledger::{Ledger, TargetRecord};
//! use std::collections::BTreeMap;
//! use std::path::Path;
//!
//! let mut ledger = Ledger::open(Path::new(".arkive-arch.db"))?;
//! let record = TargetRecord {
//!     name: "logs.tar.gz".into(),
//!     compress_scheme: Some("tar.gz".into()),
//!     command_format: "cp %(sources)s %(target)s".into(),
//!     exit_code: 1,
//!     sources: BTreeMap::new(),
//! };
//! ledger.insert(&record)?;
//! ledger.update_exit_code(&record.name, 0)?;
//! assert!(ledger.lookup("logs.tar.gz")?.unwrap().is_success());
//! # Ok::<(), ledger::Error>(())
//! ```

mod error;
mod types;

pub use error::{Error, Result};
pub use types::TargetRecord;

use rusqlite::{Connection, OptionalExtension, params};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

/// Default file name of the store inside a working directory
pub const FILE_NAME: &str = ".arkive-arch.db";

const META_CHECKSUM_METHOD: &str = "checksum-method";

/// Handle on the persisted target store
///
/// The connection is owned by the handle and closed when it is dropped.
pub struct Ledger {
    conn: Connection,
}

impl Ledger {
    /// Open or create a store at the given path
    ///
    /// Creates the database file and its tables if they don't exist.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;
        log::debug!("Opened ledger {}", db_path.display());
        Self::init(conn)
    }

    /// Open a store that lives only as long as the handle
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS targets (
                target_name TEXT NOT NULL PRIMARY KEY,
                compress_scheme TEXT,
                command_format TEXT NOT NULL,
                command_rc INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sources (
                target_name TEXT NOT NULL,
                source_name TEXT NOT NULL,
                checksum TEXT NOT NULL,
                UNIQUE(target_name, checksum)
            );

            CREATE TABLE IF NOT EXISTS meta (
                key TEXT NOT NULL PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )?;

        Ok(Self { conn })
    }

    /// Tie the store to a checksum method
    ///
    /// Fingerprints from different methods are not comparable, so if the
    /// store was written with another method every row is dropped and
    /// `true` is returned.
    pub fn bind_checksum_method(&mut self, method: &str) -> Result<bool> {
        let tx = self.conn.transaction()?;
        let current: Option<String> = tx
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                [META_CHECKSUM_METHOD],
                |row| row.get(0),
            )
            .optional()?;

        let reset = matches!(&current, Some(m) if m != method);
        if reset {
            log::warn!(
                "Checksum method changed from {} to {}, discarding stored targets",
                current.as_deref().unwrap_or_default(),
                method
            );
            tx.execute("DELETE FROM targets", [])?;
            tx.execute("DELETE FROM sources", [])?;
        }
        tx.execute(
            "INSERT INTO meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![META_CHECKSUM_METHOD, method],
        )?;
        tx.commit()?;
        Ok(reset)
    }

    /// Reconstruct the stored snapshot of a target
    ///
    /// Returns `None` if the target has never been recorded.
    pub fn lookup(&self, name: &str) -> Result<Option<TargetRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT compress_scheme, command_format, command_rc
                 FROM targets WHERE target_name = ?1",
                [name],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i32>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((compress_scheme, command_format, exit_code)) = row else {
            return Ok(None);
        };

        Ok(Some(TargetRecord {
            name: name.to_string(),
            compress_scheme,
            command_format,
            exit_code,
            sources: self.sources_of(name)?,
        }))
    }

    /// All stored targets, sorted by name
    pub fn list(&self) -> Result<Vec<TargetRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT target_name FROM targets ORDER BY target_name")?;
        let names: Vec<String> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;

        let mut records = Vec::with_capacity(names.len());
        for name in names {
            if let Some(record) = self.lookup(&name)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Remove a target and its sources
    pub fn delete(&mut self, name: &str) -> Result<()> {
        let tx = self.conn.transaction()?;
        delete_rows(&tx, name)?;
        tx.commit()?;
        Ok(())
    }

    /// Remove every target whose name is not in `keep`
    ///
    /// Orphaned source rows are removed as well. Returns the number of
    /// target names that were pruned.
    pub fn delete_all_except<'a, I>(&mut self, keep: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let keep: HashSet<&str> = keep.into_iter().collect();
        let tx = self.conn.transaction()?;

        let mut stale = BTreeSet::new();
        {
            let mut stmt = tx.prepare(
                "SELECT target_name FROM targets
                 UNION
                 SELECT target_name FROM sources",
            )?;
            for name in stmt.query_map([], |row| row.get::<_, String>(0))? {
                let name = name?;
                if !keep.contains(name.as_str()) {
                    stale.insert(name);
                }
            }
        }

        for name in &stale {
            log::debug!("Pruning stale target {}", name);
            delete_rows(&tx, name)?;
        }
        tx.commit()?;

        Ok(stale.len())
    }

    /// Record a target snapshot
    ///
    /// Fails if the target is already present; see [`Ledger::replace`].
    pub fn insert(&mut self, record: &TargetRecord) -> Result<()> {
        let tx = self.conn.transaction()?;
        insert_rows(&tx, record)?;
        tx.commit()?;
        Ok(())
    }

    /// Swap any stored snapshot of `record.name` for `record`
    ///
    /// Delete and insert commit together, so a failure keeps the old rows.
    pub fn replace(&mut self, record: &TargetRecord) -> Result<()> {
        let tx = self.conn.transaction()?;
        delete_rows(&tx, &record.name)?;
        insert_rows(&tx, record)?;
        tx.commit()?;
        Ok(())
    }

    /// Record the exit code of a target's archive command
    pub fn update_exit_code(&mut self, name: &str, exit_code: i32) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "UPDATE targets SET command_rc = ?1 WHERE target_name = ?2",
            params![exit_code, name],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn sources_of(&self, name: &str) -> Result<BTreeMap<String, String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT checksum, source_name FROM sources WHERE target_name = ?1")?;
        let sources = stmt
            .query_map([name], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<_>>()?;
        Ok(sources)
    }
}

fn delete_rows(conn: &Connection, name: &str) -> Result<()> {
    conn.execute("DELETE FROM targets WHERE target_name = ?1", [name])?;
    conn.execute("DELETE FROM sources WHERE target_name = ?1", [name])?;
    Ok(())
}

fn insert_rows(conn: &Connection, record: &TargetRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO targets (target_name, compress_scheme, command_format, command_rc)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            record.name,
            record.compress_scheme,
            record.command_format,
            record.exit_code
        ],
    )?;
    let mut stmt = conn
        .prepare("INSERT INTO sources (target_name, source_name, checksum) VALUES (?1, ?2, ?3)")?;
    for (checksum, source_name) in &record.sources {
        stmt.execute(params![record.name, source_name, checksum])?;
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
